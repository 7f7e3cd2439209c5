use crate::{Attribute, Composite, Function, Object, Template};

impl Object {
    /// Try to absorb `other` into `self`, unifying repeated DWARF
    /// descriptions of the same entity. Returns whether it was absorbed.
    pub fn merge(&mut self, other: &Object) -> bool {
        match (self, other) {
            (Object::Attribute(a), Object::Attribute(b)) => a.merge(b),
            (Object::Function(a), Object::Function(b)) => a.merge(b),
            (Object::Composite(a), Object::Composite(b)) => a.merge(b),
            (Object::Template(a), Object::Template(b)) => a.merge(b),
            _ => false,
        }
    }
}

impl Attribute {
    /// Merge a repeated description of the same variable or member.
    /// Requires matching name and rendered type; absent fields are filled
    /// from `other`.
    pub fn merge(&mut self, other: &Self) -> bool {
        if self.head.name != other.head.name || self.ty != other.ty {
            return false;
        }
        if self.default_value.is_none() {
            self.default_value = other.default_value;
        }
        if self.alignment.is_none() {
            self.alignment = other.alignment;
        }
        if self.bit_size.is_none() {
            self.bit_size = other.bit_size;
        }
        self.is_static |= other.is_static;
        true
    }
}

impl Function {
    /// Merge a declaration and a definition (or two repeats) of the same
    /// function. Requires matching name, return type and positional
    /// signature; parameter names are back-filled and flags OR-combined.
    pub fn merge(&mut self, other: &Self) -> bool {
        if self.head.name != other.head.name || self.returns != other.returns {
            return false;
        }
        if self.parameters.len() != other.parameters.len() {
            return false;
        }
        let signatures_match = self
            .parameters
            .iter()
            .zip(&other.parameters)
            .all(|(a, b)| a.kind == b.kind && a.ty == b.ty);
        if !signatures_match {
            return false;
        }
        for (param, from) in self.parameters.iter_mut().zip(&other.parameters) {
            if param.name.is_none() {
                param.name = from.name.clone();
            }
        }
        self.noreturn |= other.noreturn;
        self.is_explicit |= other.is_explicit;
        self.is_deleted |= other.is_deleted;
        self.is_inline |= other.is_inline;
        self.is_static |= other.is_static;
        self.is_const |= other.is_const;
        if self.virtuality.is_none() {
            self.virtuality = other.virtuality;
        }
        true
    }
}

impl Composite {
    /// Merge a repeated description of the same struct, class or union.
    /// Requires matching kind, name and base list; per-line member lists
    /// are concatenated and reduced.
    pub fn merge(&mut self, other: &Self) -> bool {
        if self.kind != other.kind
            || self.head.name != other.head.name
            || self.bases != other.bases
        {
            return false;
        }
        for (line, members) in &other.members {
            let bucket = self.members.entry(*line).or_default();
            for member in members {
                push_reduced(bucket, member.clone());
            }
        }
        if self.alignment.is_none() {
            self.alignment = other.alignment;
        }
        true
    }
}

impl Template {
    /// Merge two generic template declarations reconstructed from distinct
    /// instantiations. Only unbound templates merge; missing parameter
    /// defaults are back-filled.
    pub fn merge(&mut self, other: &Self) -> bool {
        if self.declaration != other.declaration {
            return false;
        }
        if self.parameters.len() != other.parameters.len() {
            return false;
        }
        let any_bound = self
            .parameters
            .iter()
            .chain(&other.parameters)
            .any(|p| p.is_bound());
        if any_bound {
            return false;
        }
        for (param, from) in self.parameters.iter_mut().zip(&other.parameters) {
            if param.default.is_none() {
                param.default = from.default.clone();
            }
        }
        true
    }
}

/// Add an object to a line bucket: equal objects are dropped, compatible
/// objects merge into the last accepted one, the rest are appended
pub fn push_reduced(bucket: &mut Vec<Object>, obj: Object) {
    if bucket.contains(&obj) {
        return;
    }
    if let Some(last) = bucket.last_mut()
        && last.merge(&obj)
    {
        return;
    }
    bucket.push(obj);
}

/// Fully reduce a line bucket, left to right
pub fn reduce_bucket(objects: Vec<Object>) -> Vec<Object> {
    let mut result = Vec::with_capacity(objects.len());
    for obj in objects {
        push_reduced(&mut result, obj);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Head, Parameter, SplitType, TypeRef};

    fn func(name: &str, param_names: &[Option<&str>]) -> Function {
        Function {
            head: Head::named(name),
            parameters: param_names
                .iter()
                .map(|n| Parameter::positional(n.map(Into::into), "int".to_string()))
                .collect(),
            returns: Some("void".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_function_merge_backfills_parameter_names() {
        let mut a = func("f", &[Some("x"), None]);
        let b = func("f", &[None, Some("y")]);
        assert!(a.merge(&b));
        let names: Vec<_> = a
            .parameters
            .iter()
            .map(|p| p.name.as_ref().map(|n| n.to_string()))
            .collect();
        assert_eq!(names, vec![Some("x".to_string()), Some("y".to_string())]);
    }

    #[test]
    fn test_function_merge_requires_signature_match() {
        let mut a = func("f", &[Some("x")]);
        let b = func("f", &[Some("x"), Some("y")]);
        assert!(!a.merge(&b));
        let mut c = func("f", &[Some("x")]);
        let mut d = func("g", &[Some("x")]);
        assert!(!c.merge(&d));
        d.head.name = "f".into();
        d.returns = Some("int".to_string());
        assert!(!c.merge(&d));
    }

    #[test]
    fn test_attribute_merge_fills_absent_fields() {
        let ty = Some(TypeRef::Text(SplitType::plain("int")));
        let mut a = Attribute {
            head: Head::named("count"),
            ty: ty.clone(),
            ..Default::default()
        };
        let b = Attribute {
            head: Head::named("count"),
            ty,
            alignment: Some(8),
            is_static: true,
            ..Default::default()
        };
        assert!(a.merge(&b));
        assert_eq!(a.alignment, Some(8));
        assert!(a.is_static);
    }

    #[test]
    fn test_attribute_merge_requires_same_type() {
        let mut a = Attribute {
            head: Head::named("count"),
            ty: Some(TypeRef::Text(SplitType::plain("int"))),
            ..Default::default()
        };
        let b = Attribute {
            head: Head::named("count"),
            ty: Some(TypeRef::Text(SplitType::plain("long"))),
            ..Default::default()
        };
        assert!(!a.merge(&b));
    }

    #[test]
    fn test_composite_merge_reduces_member_lines() {
        use crate::CompositeKind;
        let mut a = Composite::new(CompositeKind::Struct, "S");
        a.members
            .entry(3)
            .or_default()
            .push(Object::Function(func("f", &[Some("x"), None])));
        let mut b = Composite::new(CompositeKind::Struct, "S");
        b.members
            .entry(3)
            .or_default()
            .push(Object::Function(func("f", &[None, Some("y")])));
        assert!(a.merge(&b));
        let bucket = &a.members[&3];
        assert_eq!(bucket.len(), 1);
        let Object::Function(merged) = &bucket[0] else {
            panic!("expected a function");
        };
        assert!(merged.parameters.iter().all(|p| p.name.is_some()));
    }

    #[test]
    fn test_reduce_bucket_is_fully_reduced() {
        let objects = vec![
            Object::Function(func("f", &[Some("x")])),
            Object::Function(func("f", &[Some("x")])),
            Object::Function(func("f", &[None])),
            Object::Function(func("g", &[None])),
        ];
        let reduced = reduce_bucket(objects);
        assert_eq!(reduced.len(), 2);
        for pair in reduced.windows(2) {
            let mut left = pair[0].clone();
            assert_ne!(pair[0], pair[1]);
            assert!(!left.merge(&pair[1]));
        }
    }
}
