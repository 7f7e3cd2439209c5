use std::sync::Arc;

use cu::pre::*;
use gimli::constants::*;
use model::{GoffMap, Namespace, Scope};

use crate::dwarf::{self, DieNode, DwarfContext, Unit};

/// Scope data for every DIE, built by one prepass walk per unit
///
/// DWARF entries carry no parent pointer, so qualified-name rendering and
/// namespace back-references are resolved through these maps instead of
/// walking up the tree.
#[derive(Default)]
pub struct ScopeMaps {
    /// Goff to the qualifier chain enclosing that DIE. The chain contains
    /// namespaces and named types, since nested types are qualified by
    /// their enclosing class.
    pub qualifiers: GoffMap<Scope>,
    /// Goff to the innermost namespace enclosing that DIE
    pub enclosing: GoffMap<Option<Arc<Namespace>>>,
    /// Goff of a namespace DIE to the namespace it declares
    pub namespaces: GoffMap<Arc<Namespace>>,
}

#[derive(Default)]
struct LoadScopeCtx {
    // the qualifier chain includes named types, the namespace chain
    // only namespaces
    qualifier: Scope,
    namespace: Option<Arc<Namespace>>,
    maps: ScopeMaps,
}

impl LoadScopeCtx {
    fn register(&mut self, node: &DieNode<'_, '_>) {
        let offset = node.goff();
        self.maps.qualifiers.insert(offset, self.qualifier.clone());
        self.maps.enclosing.insert(offset, self.namespace.clone());
    }
}

/// Load the scope maps for every unit of the context
pub fn load_scopes(ctx: &DwarfContext) -> cu::Result<ScopeMaps> {
    let mut load = LoadScopeCtx::default();
    for unit in ctx.type_units() {
        load_unit(unit, &mut load)?;
    }
    for unit in ctx.compile_units() {
        load_unit(unit, &mut load)?;
    }
    Ok(load.maps)
}

fn load_unit(unit: &Unit, ctx: &mut LoadScopeCtx) -> cu::Result<()> {
    cu::debug!("loading scopes for {unit}");
    let mut tree = unit.tree()?;
    let root = cu::check!(tree.root(), "failed to load scopes for {unit}")?;
    root.for_each_child(|child| load_scope_recur(child, ctx))
}

fn load_scope_recur(node: DieNode<'_, '_>, ctx: &mut LoadScopeCtx) -> cu::Result<()> {
    let entry = node.entry();
    let tag = entry.tag();
    ctx.register(&node);
    match tag {
        DW_TAG_namespace => {
            let name: Arc<str> = entry.name_opt()?.unwrap_or_default().into();
            let is_inline = entry.flag(DW_AT_export_symbols)?;
            let namespace = Arc::new(Namespace {
                name: name.clone(),
                parent: ctx.namespace.clone(),
                is_inline,
            });
            ctx.maps.namespaces.insert(node.goff(), Arc::clone(&namespace));
            let prev = ctx.namespace.replace(namespace);
            ctx.qualifier.push(name);
            node.for_each_child(|child| load_scope_recur(child, ctx))?;
            ctx.qualifier.pop();
            ctx.namespace = prev;
        }
        tag if dwarf::is_composite_tag(tag) => {
            // nested types are qualified by the enclosing class
            let name: Arc<str> = entry.name_opt()?.unwrap_or_default().into();
            ctx.qualifier.push(name);
            node.for_each_child(|child| load_scope_recur(child, ctx))?;
            ctx.qualifier.pop();
        }
        _ => {
            node.for_each_child(|child| load_scope_recur(child, ctx))?;
        }
    }
    Ok(())
}
