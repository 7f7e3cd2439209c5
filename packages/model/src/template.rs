use std::sync::Arc;

use cu::pre::*;

use crate::Object;

/// The kind of a template parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TemplateParameterKind {
    /// A non-type parameter (`int N`)
    Constant,
    /// A type parameter (`typename T`)
    Type,
    /// A template template parameter
    Template,
    /// A parameter pack
    Pack,
}

/// One parameter of a template declaration
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateParameter {
    pub name: Option<Arc<str>>,
    pub kind: TemplateParameterKind,
    /// Rendered type of a constant parameter
    pub ty: Option<String>,
    /// Concrete argument bound by the instantiation this parameter was
    /// reconstructed from
    pub arg: Option<String>,
    /// Rendered default, taken from the type or the value by kind
    pub default: Option<String>,
    /// Parameters inside a pack
    pub inner: Vec<TemplateParameter>,
}

impl TemplateParameter {
    pub fn new(kind: TemplateParameterKind) -> Self {
        Self {
            name: None,
            kind,
            ty: None,
            arg: None,
            default: None,
            inner: Vec::new(),
        }
    }

    /// Whether this parameter (or any pack member) carries a concrete
    /// instantiation argument
    pub fn is_bound(&self) -> bool {
        self.arg.is_some() || self.inner.iter().any(|p| p.is_bound())
    }

    /// Drop the concrete instantiation arguments, leaving the generic form
    pub fn unbind(&mut self) {
        self.arg = None;
        for p in &mut self.inner {
            p.unbind();
        }
    }
}

/// A template wrapper around a generic declaration
///
/// `declaration` is the generic form reconstructed from an instantiation: a
/// composite or attribute stub with `is_declaration` set, no bases, no
/// members and the un-templated base name.
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    pub declaration: Box<Object>,
    pub parameters: Vec<TemplateParameter>,
}

impl Template {
    pub fn new(declaration: Object, parameters: Vec<TemplateParameter>) -> Self {
        Self {
            declaration: Box::new(declaration),
            parameters,
        }
    }

    /// A copy with every instantiation argument stripped
    pub fn to_generic(&self) -> Self {
        let mut generic = self.clone();
        for p in &mut generic.parameters {
            p.unbind();
        }
        generic
    }
}
