use std::collections::hash_map::Entry;
use std::sync::Arc;

use cu::pre::*;
use gimli::constants::*;
use model::{Function, Head, Object, Parameter, Template, TemplateParameter};

use crate::dwarf::{self, Die};
use crate::printer::type_chain_has_const;
use crate::visitor::Visitor;

impl Visitor<'_> {
    /// Build a Function from a subprogram DIE.
    ///
    /// A DIE carrying a specification reference is an out-of-scope
    /// definition: the declaration is visited first and supplies the
    /// return type, constness and the fully qualified name.
    pub(crate) fn visit_subprogram(&mut self, die: &Die<'_, '_>) -> cu::Result<()> {
        let goff = die.goff();
        if die.decl_file()?.is_none()
            || die.decl_line()?.unwrap_or(0) == 0
            || die.name_opt()?.is_none()
        {
            self.objects.insert(goff, None);
            return Ok(());
        }
        let ctx = self.ctx;

        let spec_ref = die.ref_opt(ctx, DW_AT_specification)?;
        let mut function = if let Some(spec) = spec_ref {
            let spec_die = ctx.die_at(spec)?;
            cu::ensure!(
                spec_die.tag() == DW_TAG_subprogram,
                "expecting DW_AT_specification to reference a subprogram, at {goff}"
            )?;
            self.visit(&spec_die)?;
            let Some(declaration) = self.objects.get(&spec).and_then(|x| x.as_ref()) else {
                self.objects.insert(goff, None);
                return Ok(());
            };
            let Object::Function(declaration) = declaration else {
                cu::bail!(
                    "specification of subprogram at {goff} resolved to a {} object",
                    declaration.kind_name()
                );
            };
            // definition outside the declaring scope: use the fully
            // qualified name of the declaration
            let scope = self
                .scopes
                .qualifiers
                .get(&spec)
                .map(|s| s.prefix())
                .unwrap_or_default();
            let name = format!("{scope}{}", spec_die.name()?);
            Function {
                head: Head::named(name),
                returns: declaration.returns.clone(),
                is_const: declaration.is_const,
                ..Default::default()
            }
        } else {
            if die.flag(DW_AT_artificial)? {
                self.objects.insert(goff, None);
                return Ok(());
            }
            let returns = match die.ref_opt(ctx, DW_AT_type)? {
                None => "void".to_string(),
                Some(target) => self.type_joined(target)?,
            };
            let mut function = Function {
                head: Head::named(die.name()?),
                returns: Some(returns),
                ..Default::default()
            };
            // constness of a member function lives on the object pointer's
            // type chain
            if let Some(object_pointer) = die.ref_opt(ctx, DW_AT_object_pointer)? {
                let pointer_die = ctx.die_at(object_pointer)?;
                if let Some(ty) = pointer_die.ref_opt(ctx, DW_AT_type)? {
                    function.is_const = type_chain_has_const(ctx, ty)?;
                }
            }
            function
        };

        die.for_each_attr(|attr| match attr {
            DW_AT_linkage_name
            | DW_AT_name
            | DW_AT_decl_file
            | DW_AT_decl_line
            | DW_AT_low_pc
            | DW_AT_high_pc
            | DW_AT_frame_base
            | DW_AT_call_all_calls
            | DW_AT_calling_convention
            | DW_AT_declaration
            | DW_AT_prototyped
            | DW_AT_artificial
            | DW_AT_specification
            | DW_AT_vtable_elem_location
            | DW_AT_containing_type
            | DW_AT_reference
            | DW_AT_rvalue_reference
            | DW_AT_external
            | DW_AT_type
            | DW_AT_object_pointer
            | DW_AT_abstract_origin
            | DW_AT_inline
            | DW_AT_noreturn
            | DW_AT_explicit
            | DW_AT_accessibility
            | DW_AT_virtuality
            | DW_AT_deleted => Ok(()),
            attr => cu::bail!("unhandled attribute {attr} for subprogram at {goff}"),
        })?;
        function.is_inline = die.is_declared_inline()?;
        function.noreturn = die.flag(DW_AT_noreturn)?;
        function.is_explicit = die.flag(DW_AT_explicit)?;
        function.is_deleted = die.flag(DW_AT_deleted)?;
        function.virtuality = die.virtuality()?;
        function.head.access = die.access()?;

        let mut params: Vec<TemplateParameter> = Vec::new();
        die.for_each_child(|child| {
            let entry = child.entry();
            let tag = entry.tag();
            match tag {
                DW_TAG_formal_parameter => {
                    if entry.flag(DW_AT_artificial)? {
                        // compiler-generated implicit parameters (this, vtt)
                        return Ok(());
                    }
                    let ty = cu::check!(
                        entry.ref_opt(self.ctx, DW_AT_type)?,
                        "missing type for parameter of subprogram at {goff}"
                    )?;
                    let name = entry.name_opt()?.map(Into::into);
                    let ty = self.type_joined(ty)?;
                    function.parameters.push(Parameter::positional(name, ty));
                    Ok(())
                }
                DW_TAG_unspecified_parameters => {
                    function.parameters.push(Parameter::variadic());
                    Ok(())
                }
                // local declarations inside function bodies are not
                // reconstructed
                DW_TAG_label
                | DW_TAG_lexical_block
                | DW_TAG_variable
                | DW_TAG_inlined_subroutine
                | DW_TAG_call_site
                | DW_TAG_GNU_call_site
                | DW_TAG_typedef
                | DW_TAG_imported_module
                | DW_TAG_imported_declaration
                | DW_TAG_enumeration_type
                | DW_TAG_class_type
                | DW_TAG_structure_type
                | DW_TAG_union_type => Ok(()),
                tag if dwarf::is_template_param_tag(tag) => {
                    params.push(self.build_template_param(&entry)?);
                    Ok(())
                }
                tag => cu::bail!("unhandled child tag {tag} for subprogram at {goff}"),
            }
        })?;

        if !params.is_empty() {
            let base = match function.head.name.find('<') {
                Some(i) => function.head.name[..i].to_string(),
                None => function.head.name.to_string(),
            };
            let mut stub = Function {
                head: Head::named(base),
                ..Default::default()
            };
            stub.head.is_declaration = true;
            function.head.template =
                Some(Box::new(Template::new(Object::Function(stub), params)));
        }

        // register the union of parameter names for this signature
        let linkage = die.str_opt(DW_AT_linkage_name)?;
        let key: Arc<str> = format!(
            "{}@{}",
            linkage.unwrap_or(die.name()?),
            function.parameters.len()
        )
        .into();
        function.index_key = Some(key.clone());
        match self.param_names.entry(key.clone()) {
            Entry::Vacant(entry) => {
                entry.insert(function.parameters.iter().map(|p| p.name.clone()).collect());
            }
            Entry::Occupied(mut entry) => {
                let names = entry.get_mut();
                cu::ensure!(
                    names.len() == function.parameters.len(),
                    "parameter count mismatch for function index key '{key}' at {goff}"
                )?;
                for (name, param) in names.iter_mut().zip(&function.parameters) {
                    if name.is_none() {
                        *name = param.name.clone();
                    }
                }
            }
        }

        self.objects.insert(goff, Some(Object::Function(function)));
        Ok(())
    }
}
