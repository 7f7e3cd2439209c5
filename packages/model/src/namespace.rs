use std::sync::Arc;

/// A namespace in the reconstructed model
///
/// Namespaces chain through `parent` from the innermost out. The chains are
/// built once per unit by the scope prepass and shared (via `Arc`) by every
/// object declared inside. Names are plain `Arc<str>` so the chains and the
/// objects hanging off them can share them cheaply.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Namespace {
    /// Name of the namespace, empty for an anonymous namespace
    pub name: Arc<str>,
    pub parent: Option<Arc<Namespace>>,
    /// Set for `inline namespace` (DW_AT_export_symbols)
    pub is_inline: bool,
}

impl Namespace {
    pub fn new(name: &str, parent: Option<Arc<Namespace>>, is_inline: bool) -> Self {
        Self {
            name: name.into(),
            parent,
            is_inline,
        }
    }

    /// The `::`-joined chain from the outermost named ancestor down.
    /// Anonymous segments are skipped.
    pub fn qualified_name(&self) -> String {
        let mut segs = Vec::new();
        let mut curr = Some(self);
        while let Some(ns) = curr {
            if !ns.name.is_empty() {
                segs.push(ns.name.as_ref());
            }
            curr = ns.parent.as_deref();
        }
        segs.reverse();
        segs.join("::")
    }
}

/// The chain of namespaces enclosing an object, outermost first
pub fn namespace_chain(ns: &Arc<Namespace>) -> Vec<Arc<Namespace>> {
    let mut chain = Vec::new();
    let mut curr = Some(ns);
    while let Some(ns) = curr {
        chain.push(Arc::clone(ns));
        curr = ns.parent.as_ref();
    }
    chain.reverse();
    chain
}

/// Qualifier chain used when printing scoped names (`A::B::Name`)
///
/// Unlike [`Namespace`], a scope also contains enclosing named types, since
/// nested types are qualified by their enclosing class. Anonymous segments
/// are stored as empty strings and skipped when printing.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Scope(pub Vec<Arc<str>>);

impl Scope {
    pub fn push(&mut self, seg: Arc<str>) {
        self.0.push(seg);
    }

    pub fn pop(&mut self) {
        self.0.pop();
    }

    /// The `A::B::` prefix for a name declared in this scope.
    /// Empty for the global scope.
    pub fn prefix(&self) -> String {
        let mut s = String::new();
        for seg in &self.0 {
            if seg.is_empty() {
                continue;
            }
            s.push_str(seg);
            s.push_str("::");
        }
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qualified_name_chain() {
        let a = Arc::new(Namespace::new("a", None, false));
        let b = Arc::new(Namespace::new("b", Some(Arc::clone(&a)), false));
        let c = Namespace::new("c", Some(Arc::clone(&b)), false);
        assert_eq!(c.qualified_name(), "a::b::c");
        assert_eq!(a.qualified_name(), "a");
    }

    #[test]
    fn test_qualified_name_skips_anonymous() {
        let a = Arc::new(Namespace::new("a", None, false));
        let anon = Arc::new(Namespace::new("", Some(Arc::clone(&a)), false));
        let d = Namespace::new("detail", Some(anon), true);
        assert_eq!(d.qualified_name(), "a::detail");
    }

    #[test]
    fn test_scope_prefix() {
        let mut scope = Scope::default();
        assert_eq!(scope.prefix(), "");
        scope.push("A".into());
        scope.push("".into());
        scope.push("B".into());
        assert_eq!(scope.prefix(), "A::B::");
    }
}
