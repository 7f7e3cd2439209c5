use std::collections::BTreeMap;
use std::sync::Arc;

use cu::pre::*;

use crate::{Namespace, Template, TypeRef, Value};

/// Access of a member declaration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Access {
    Public,
    Private,
    Protected,
}

impl Access {
    pub fn keyword(self) -> &'static str {
        match self {
            Access::Public => "public",
            Access::Private => "private",
            Access::Protected => "protected",
        }
    }
}

/// Virtuality of a member function or a base class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Virtuality {
    Virtual,
    PureVirtual,
}

/// Objects declared at each source line, in the order they were filed
pub type LineMap = BTreeMap<u64, Vec<Object>>;

/// Common header shared by every model object
///
/// `parent` is a back-reference into the namespace chain and is excluded
/// from equality; two objects reconstructed from different compile units
/// compare equal when their declarations agree.
#[derive(Debug, Clone)]
pub struct Head {
    /// Declared name, empty for anonymous objects
    pub name: Arc<str>,
    /// Enclosing namespace
    pub parent: Option<Arc<Namespace>>,
    /// Set for inline type declarations nested inside a typedef or attribute
    pub is_implicit: bool,
    /// Set for template primary declarations carrying no body
    pub is_declaration: bool,
    pub access: Option<Access>,
    /// The template governing this object, if any
    pub template: Option<Box<Template>>,
}

impl Head {
    pub fn named(name: impl Into<Arc<str>>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

impl Default for Head {
    fn default() -> Self {
        Self {
            name: Arc::from(""),
            parent: None,
            is_implicit: false,
            is_declaration: false,
            access: None,
            template: None,
        }
    }
}

impl PartialEq for Head {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.is_implicit == other.is_implicit
            && self.is_declaration == other.is_declaration
            && self.access == other.access
            && self.template == other.template
    }
}

/// One reconstructed declaration
#[derive(Debug, Clone, PartialEq)]
pub enum Object {
    Namespace(Arc<Namespace>),
    ImportedModule(ImportedModule),
    ImportedDeclaration(ImportedDeclaration),
    Attribute(Attribute),
    Function(Function),
    Composite(Composite),
    Enum(Enum),
    TypeDef(TypeDef),
    Template(Template),
}

impl Object {
    pub fn head(&self) -> Option<&Head> {
        match self {
            Object::Namespace(_) => None,
            Object::ImportedModule(x) => Some(&x.head),
            Object::ImportedDeclaration(x) => Some(&x.head),
            Object::Attribute(x) => Some(&x.head),
            Object::Function(x) => Some(&x.head),
            Object::Composite(x) => Some(&x.head),
            Object::Enum(x) => Some(&x.head),
            Object::TypeDef(x) => Some(&x.head),
            Object::Template(x) => x.declaration.head(),
        }
    }

    pub fn head_mut(&mut self) -> Option<&mut Head> {
        match self {
            Object::Namespace(_) => None,
            Object::ImportedModule(x) => Some(&mut x.head),
            Object::ImportedDeclaration(x) => Some(&mut x.head),
            Object::Attribute(x) => Some(&mut x.head),
            Object::Function(x) => Some(&mut x.head),
            Object::Composite(x) => Some(&mut x.head),
            Object::Enum(x) => Some(&mut x.head),
            Object::TypeDef(x) => Some(&mut x.head),
            Object::Template(x) => x.declaration.head_mut(),
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Object::Namespace(_) => "namespace",
            Object::ImportedModule(_) => "imported_module",
            Object::ImportedDeclaration(_) => "imported_declaration",
            Object::Attribute(_) => "attribute",
            Object::Function(_) => "function",
            Object::Composite(x) => x.kind.keyword(),
            Object::Enum(_) => "enum",
            Object::TypeDef(_) => "typedef",
            Object::Template(_) => "template",
        }
    }

    /// Set the enclosing namespace. An object is filed into exactly one
    /// scope; a second assignment is a shape violation.
    pub fn set_parent(&mut self, ns: &Arc<Namespace>) -> cu::Result<()> {
        let Some(head) = self.head_mut() else {
            return Ok(());
        };
        cu::ensure!(
            head.parent.is_none(),
            "object '{}' already has a parent namespace",
            head.name
        )?;
        head.parent = Some(Arc::clone(ns));
        Ok(())
    }
}

/// `using namespace X;`
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ImportedModule {
    pub head: Head,
    pub import: Option<Arc<Namespace>>,
}

/// The target of a `using` declaration
#[derive(Debug, Clone, PartialEq)]
pub enum Import {
    Namespace(Arc<Namespace>),
    Type(String),
}

/// `using X::name;`
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ImportedDeclaration {
    pub head: Head,
    pub import: Option<Import>,
}

/// A variable or data member
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Attribute {
    pub head: Head,
    pub ty: Option<TypeRef>,
    pub default_value: Option<Value>,
    pub alignment: Option<u64>,
    pub bit_size: Option<u64>,
    pub is_static: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ParameterKind {
    Positional,
    Variadic,
}

/// One formal parameter of a function
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub name: Option<Arc<str>>,
    /// Rendered type, empty for the variadic sentinel
    pub ty: String,
    pub kind: ParameterKind,
}

impl Parameter {
    pub fn positional(name: Option<Arc<str>>, ty: String) -> Self {
        Self {
            name,
            ty,
            kind: ParameterKind::Positional,
        }
    }

    /// The `...` sentinel
    pub fn variadic() -> Self {
        Self {
            name: None,
            ty: String::new(),
            kind: ParameterKind::Variadic,
        }
    }
}

/// A free or member function
#[derive(Debug, Default, Clone)]
pub struct Function {
    pub head: Head,
    pub parameters: Vec<Parameter>,
    /// Rendered return type; None for ctors, dtors and conversion operators
    pub returns: Option<String>,
    pub noreturn: bool,
    pub is_explicit: bool,
    pub is_deleted: bool,
    pub is_inline: bool,
    pub is_static: bool,
    pub is_const: bool,
    pub virtuality: Option<Virtuality>,
    /// Key into the parameter-name index. Not part of equality.
    pub index_key: Option<Arc<str>>,
}

impl PartialEq for Function {
    fn eq(&self, other: &Self) -> bool {
        self.head == other.head
            && self.parameters == other.parameters
            && self.returns == other.returns
            && self.noreturn == other.noreturn
            && self.is_explicit == other.is_explicit
            && self.is_deleted == other.is_deleted
            && self.is_inline == other.is_inline
            && self.is_static == other.is_static
            && self.is_const == other.is_const
            && self.virtuality == other.virtuality
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CompositeKind {
    Struct,
    Class,
    Union,
}

impl CompositeKind {
    pub fn keyword(self) -> &'static str {
        match self {
            CompositeKind::Struct => "struct",
            CompositeKind::Class => "class",
            CompositeKind::Union => "union",
        }
    }

    /// Members of a class are private unless declared otherwise
    pub fn default_access(self) -> Access {
        match self {
            CompositeKind::Class => Access::Private,
            CompositeKind::Struct | CompositeKind::Union => Access::Public,
        }
    }
}

/// A struct, class or union
#[derive(Debug, Clone, PartialEq)]
pub struct Composite {
    pub head: Head,
    pub kind: CompositeKind,
    /// (rendered base type, access), in declaration order. Virtual
    /// inheritance prefixes `virtual ` to the rendered base.
    pub bases: Vec<(String, Option<Access>)>,
    /// Members keyed by declaration line
    pub members: LineMap,
    pub alignment: Option<u64>,
}

impl Composite {
    pub fn new(kind: CompositeKind, name: &str) -> Self {
        Self {
            head: Head::named(name),
            kind,
            bases: Vec::new(),
            members: LineMap::new(),
            alignment: None,
        }
    }
}

/// An enumeration
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Enum {
    pub head: Head,
    /// Rendered underlying type
    pub base: Option<String>,
    /// Enumerators in declaration order
    pub values: Vec<(Arc<str>, i64)>,
    /// Set for scoped (`enum class`) enumerations
    pub is_class: bool,
}

/// A typedef
#[derive(Debug, Default, Clone, PartialEq)]
pub struct TypeDef {
    pub head: Head,
    pub value: Option<TypeRef>,
    pub alignment: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_access() {
        assert_eq!(CompositeKind::Class.default_access(), Access::Private);
        assert_eq!(CompositeKind::Struct.default_access(), Access::Public);
        assert_eq!(CompositeKind::Union.default_access(), Access::Public);
    }

    #[test]
    fn test_head_equality_ignores_parent() {
        let ns = Arc::new(Namespace::new("ns", None, false));
        let mut a = Head::named("x");
        let b = Head::named("x");
        a.parent = Some(ns);
        assert_eq!(a, b);
    }

    #[test]
    fn test_parent_set_once() -> cu::Result<()> {
        let ns = Arc::new(Namespace::new("ns", None, false));
        let mut obj = Object::Enum(Enum {
            head: Head::named("E"),
            ..Default::default()
        });
        obj.set_parent(&ns)?;
        assert!(obj.set_parent(&ns).is_err());
        Ok(())
    }
}
