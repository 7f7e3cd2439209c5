use cu::pre::*;
use gimli::constants::*;
use model::{Composite, CompositeKind, Object, Template, TemplateParameter};

use crate::dwarf::{self, Die};
use crate::visitor::{MEMBER_BUCKET_CAP, Visitor};

impl Visitor<'_> {
    /// Build a Composite from a struct, class or union DIE.
    ///
    /// The entry is cached before the children are collected so that the
    /// type graph cannot recurse back into it.
    pub(crate) fn visit_composite(&mut self, die: &Die<'_, '_>) -> cu::Result<()> {
        let goff = die.goff();
        let kind = match die.tag() {
            DW_TAG_class_type => CompositeKind::Class,
            DW_TAG_union_type => CompositeKind::Union,
            DW_TAG_structure_type => CompositeKind::Struct,
            tag => cu::bail!("expecting a composite type tag, got {tag} at {goff}"),
        };
        die.for_each_attr(|attr| match attr {
            DW_AT_name
            | DW_AT_decl_file
            | DW_AT_decl_line
            | DW_AT_calling_convention
            | DW_AT_byte_size
            | DW_AT_declaration
            | DW_AT_containing_type
            | DW_AT_export_symbols
            | DW_AT_signature
            | DW_AT_accessibility
            | DW_AT_alignment => Ok(()),
            attr => {
                cu::bail!("unhandled attribute {attr} for {} at {goff}", kind.keyword())
            }
        })?;

        let name = die.name_opt()?.unwrap_or_default();
        let mut comp = Composite::new(kind, &name);
        comp.alignment = die.uint_opt(DW_AT_alignment)?;
        // the un-templated base name, for ctor/dtor detection
        let class_name = match name.find('<') {
            Some(i) => name[..i].to_string(),
            None => name.clone(),
        };
        let default_access = kind.default_access();

        self.objects.insert(goff, None);

        let mut params: Vec<TemplateParameter> = Vec::new();
        die.for_each_child(|child| {
            let entry = child.entry();
            let tag = entry.tag();
            if tag == DW_TAG_member || dwarf::is_declared_tag(tag) {
                let Some(line) = entry.decl_line()? else {
                    return Ok(());
                };
                let bucket = comp.members.entry(line).or_default();
                if bucket.len() >= MEMBER_BUCKET_CAP {
                    // too many members on a single line (template instantiations)
                    return Ok(());
                }
                self.visit(&entry)?;
                let member_goff = entry.goff();
                let Some(Some(member)) = self.objects.get(&member_goff) else {
                    return Ok(());
                };
                let mut member = member.clone();
                if let Some(head) = member.head_mut()
                    && head.access.is_none()
                {
                    head.access = Some(default_access);
                }
                if let Object::Function(function) = &mut member {
                    // ctors, dtors and operators have no return type
                    let short = entry.name_opt()?.unwrap_or_default();
                    if short.starts_with("operator ") {
                        function.returns = None;
                    } else if !class_name.is_empty() {
                        let base = match short.find('<') {
                            Some(i) => &short[..i],
                            None => short.as_str(),
                        };
                        if base == class_name || base == format!("~{class_name}") {
                            function.returns = None;
                        }
                    }
                    // member functions without an object pointer are static
                    if entry.ref_opt(self.ctx, DW_AT_object_pointer)?.is_none() {
                        function.is_static = true;
                    }
                }
                comp.members.entry(line).or_default().push(member);
                return Ok(());
            }
            if dwarf::is_template_param_tag(tag) {
                params.push(self.build_template_param(&entry)?);
                return Ok(());
            }
            match tag {
                DW_TAG_inheritance => {
                    entry.for_each_attr(|attr| match attr {
                        DW_AT_type
                        | DW_AT_data_member_location
                        | DW_AT_accessibility
                        | DW_AT_virtuality => Ok(()),
                        attr => cu::bail!(
                            "unhandled attribute {attr} for inheritance at {}",
                            entry.goff()
                        ),
                    })?;
                    let base_goff = entry.ref_(self.ctx, DW_AT_type)?;
                    let mut base = self.type_joined(base_goff)?;
                    let access = entry.access()?;
                    if entry.virtuality()?.is_some() {
                        base = format!("virtual {base}");
                    }
                    comp.bases.push((base, access));
                    Ok(())
                }
                tag => cu::bail!(
                    "unhandled child tag {tag} for {} at {goff}",
                    kind.keyword()
                ),
            }
        })?;

        if !params.is_empty() {
            // the generic declaration this instantiation was stamped from
            let mut stub = comp.clone();
            stub.head.name = class_name.into();
            stub.head.is_declaration = true;
            stub.bases.clear();
            stub.members.clear();
            stub.alignment = None;
            comp.head.template = Some(Box::new(Template::new(Object::Composite(stub), params)));
        }

        self.objects.insert(goff, Some(Object::Composite(comp)));

        // a signature reference has its definition in a type unit
        if die.signature()?.is_some() {
            let ctx = self.ctx;
            let def = ctx.resolve_type_unit_reference(ctx.die_at(goff)?)?;
            self.visit(&def)?;
        }
        Ok(())
    }
}
