use cu::pre::*;
use gimli::constants::*;
use model::{Goff, Object, TemplateParameter, TemplateParameterKind};

use crate::dwarf::Die;
use crate::visitor::Visitor;

impl Visitor<'_> {
    /// Build a TemplateParameter from a template-parameter DIE
    pub(crate) fn build_template_param(
        &mut self,
        die: &Die<'_, '_>,
    ) -> cu::Result<TemplateParameter> {
        let goff = die.goff();
        let ctx = self.ctx;
        match die.tag() {
            DW_TAG_template_type_parameter => {
                let mut param = TemplateParameter::new(TemplateParameterKind::Type);
                param.name = die.name_opt()?.map(Into::into);
                if let Some(ty) = die.ref_opt(ctx, DW_AT_type)? {
                    param.arg = Some(self.type_joined(ty)?);
                }
                if die.flag(DW_AT_default_value)? {
                    param.default = param.arg.clone();
                }
                Ok(param)
            }
            DW_TAG_template_value_parameter => {
                let mut param = TemplateParameter::new(TemplateParameterKind::Constant);
                param.name = die.name_opt()?.map(Into::into);
                if let Some(ty) = die.ref_opt(ctx, DW_AT_type)? {
                    param.ty = Some(self.type_joined(ty)?);
                }
                if let Some(value) = die.const_int_opt()? {
                    let rendered = match param.ty.as_deref() {
                        Some("bool") => if value != 0 { "true" } else { "false" }.to_string(),
                        _ => value.to_string(),
                    };
                    param.arg = Some(rendered);
                }
                if die.flag(DW_AT_default_value)? {
                    param.default = param.arg.clone();
                }
                Ok(param)
            }
            DW_TAG_GNU_template_template_param => {
                let mut param = TemplateParameter::new(TemplateParameterKind::Template);
                param.name = die.name_opt()?.map(Into::into);
                param.arg = die.str_opt(DW_AT_GNU_template_name)?;
                if die.flag(DW_AT_default_value)? {
                    param.default = param.arg.clone();
                }
                Ok(param)
            }
            DW_TAG_GNU_template_parameter_pack => {
                let mut param = TemplateParameter::new(TemplateParameterKind::Pack);
                param.name = die.name_opt()?.map(Into::into);
                die.for_each_child(|child| {
                    let entry = child.entry();
                    let inner = self.build_template_param(&entry)?;
                    param.inner.push(inner);
                    Ok(())
                })?;
                // a homogeneous value pack is elevated to its member type
                let homogeneous = !param.inner.is_empty()
                    && param.inner.iter().all(|p| {
                        p.ty.is_some() && p.arg.is_some() && p.ty == param.inner[0].ty
                    });
                if homogeneous {
                    param.ty = param.inner[0].ty.clone();
                }
                Ok(param)
            }
            tag => cu::bail!("unhandled template parameter tag {tag} at {goff}"),
        }
    }

    /// File-level dedup of templated declarations: a Composite or
    /// Attribute carrying template parameters files its generic Template
    /// once per (enclosing scope, line); further instantiations only
    /// back-fill parameter defaults into the registered declaration.
    pub(crate) fn reduce_templated(
        &mut self,
        goff: Goff,
        obj: Object,
        line: u64,
    ) -> Option<Object> {
        if !matches!(&obj, Object::Composite(_) | Object::Attribute(_)) {
            return Some(obj);
        }
        let bound = obj
            .head()
            .and_then(|head| Some((head.template.as_ref()?.to_generic(), head.parent.clone())));
        let Some((mut generic, parent)) = bound else {
            return Some(obj);
        };
        if let Some(head) = generic.declaration.head_mut() {
            head.parent = parent;
        }
        let scope = self
            .scopes
            .qualifiers
            .get(&goff)
            .map(|s| s.prefix())
            .unwrap_or_default();
        let list = self.templates.entry((scope, line)).or_default();
        for existing in list.iter_mut() {
            if existing == &generic || existing.merge(&generic) {
                return None;
            }
        }
        list.push(generic.clone());
        Some(Object::Template(generic))
    }
}
