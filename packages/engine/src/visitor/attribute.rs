use cu::pre::*;
use gimli::constants::*;
use model::{Attribute, Head, Object, Template, TemplateParameter, TypeRef, Value};

use crate::dwarf::{self, Die};
use crate::visitor::Visitor;

impl Visitor<'_> {
    /// Build an Attribute from a variable or member DIE
    pub(crate) fn visit_attribute_die(&mut self, die: &Die<'_, '_>) -> cu::Result<()> {
        let goff = die.goff();
        if die.decl_file()?.is_none()
            || die.decl_line()?.unwrap_or(0) == 0
            || die.name_opt()?.is_none()
        {
            self.objects.insert(goff, None);
            return Ok(());
        }
        let ctx = self.ctx;

        // the definition side of a static member carries a specification;
        // the declaration-side record is authoritative
        if let Some(spec) = die.ref_opt(ctx, DW_AT_specification)? {
            let spec_die = ctx.die_at(spec)?;
            cu::ensure!(
                spec_die.tag() == DW_TAG_member,
                "expecting DW_AT_specification of a variable to reference a member, at {goff}"
            )?;
            self.objects.insert(goff, None);
            return Ok(());
        }

        die.for_each_attr(|attr| match attr {
            DW_AT_decl_file
            | DW_AT_decl_line
            | DW_AT_name
            | DW_AT_linkage_name
            | DW_AT_location
            | DW_AT_declaration
            | DW_AT_byte_size
            | DW_AT_bit_offset
            | DW_AT_data_bit_offset
            | DW_AT_data_member_location
            | DW_AT_specification
            | DW_AT_external
            | DW_AT_type
            | DW_AT_const_value
            | DW_AT_alignment
            | DW_AT_accessibility
            | DW_AT_bit_size => Ok(()),
            attr => cu::bail!("unhandled attribute {attr} for variable at {goff}"),
        })?;

        let mut attribute = Attribute {
            head: Head::named(die.name()?),
            ..Default::default()
        };
        attribute.alignment = die.uint_opt(DW_AT_alignment)?;
        attribute.bit_size = die.uint_opt(DW_AT_bit_size)?;
        attribute.head.access = die.access()?;
        // a member with external linkage is a static data member
        if die.tag() == DW_TAG_member && die.flag(DW_AT_external)? {
            attribute.is_static = true;
        }

        let mut type_text = String::new();
        if let Some(target) = die.ref_opt(ctx, DW_AT_type)? {
            let target_die = ctx.die_at(target)?;
            let in_place =
                target_die.name_opt()?.is_none() && dwarf::is_embeddable_tag(target_die.tag());
            if in_place {
                self.visit(&target_die)?;
                let value = self.objects.get(&target).and_then(|x| x.as_ref());
                let value = cu::check!(
                    value,
                    "in-place type at {target} produced no object for variable at {goff}"
                )?;
                let mut value = value.clone();
                if let Some(head) = value.head_mut() {
                    head.is_implicit = true;
                }
                attribute.ty = Some(TypeRef::Inline(Box::new(value)));
            } else {
                let rendered = self.type_split(target)?;
                type_text = rendered.joined();
                attribute.ty = Some(TypeRef::Text(rendered));
            }
        }

        let const_bits = die.const_int_opt()?;

        let mut params: Vec<TemplateParameter> = Vec::new();
        die.for_each_child(|child| {
            let entry = child.entry();
            let tag = entry.tag();
            if dwarf::is_template_param_tag(tag) {
                params.push(self.build_template_param(&entry)?);
                Ok(())
            } else {
                cu::bail!("unhandled child tag {tag} for variable at {goff}")
            }
        })?;

        if params.is_empty() {
            if let Some(bits) = const_bits {
                attribute.default_value = Some(decode_const_value(bits, &type_text));
            }
        } else {
            // a variable template: the constant belongs to the
            // instantiation, not the declaration
            let mut stub = attribute.clone();
            let base = match stub.head.name.find('<') {
                Some(i) => stub.head.name[..i].to_string(),
                None => stub.head.name.to_string(),
            };
            stub.head.name = base.into();
            stub.head.is_declaration = true;
            attribute.head.template =
                Some(Box::new(Template::new(Object::Attribute(stub), params)));
        }

        self.objects.insert(goff, Some(Object::Attribute(attribute)));
        Ok(())
    }
}

/// Decode a DW_AT_const_value by inspecting the rendered type: integer
/// bits are reinterpreted as IEEE-754 for floating types
fn decode_const_value(bits: i64, ty: &str) -> Value {
    if ty.contains("float") {
        Value::Float(f32::from_bits(bits as u32))
    } else if ty.contains("double") {
        Value::Double(f64::from_bits(bits as u64))
    } else if ty.contains("bool") {
        Value::Bool(bits != 0)
    } else {
        Value::Int(bits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_const_value() {
        assert_eq!(decode_const_value(1, "bool"), Value::Bool(true));
        assert_eq!(decode_const_value(42, "int"), Value::Int(42));
        let bits = 1.5f32.to_bits() as i64;
        assert_eq!(decode_const_value(bits, "float"), Value::Float(1.5));
        let bits = 2.5f64.to_bits() as i64;
        assert_eq!(decode_const_value(bits, "double"), Value::Double(2.5));
    }

    #[test]
    fn test_decode_const_value_formats() {
        let bits = 0.25f32.to_bits() as i64;
        assert_eq!(decode_const_value(bits, "const float").to_string(), "0.25");
        assert_eq!(decode_const_value(7, "unsigned int").to_string(), "7");
    }
}
