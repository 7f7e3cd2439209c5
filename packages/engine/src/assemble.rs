use std::sync::Arc;

use cu::pre::*;
use fxhash::FxHashMap;
use model::{LineMap, Object, TypeRef, reduce_bucket};

use crate::paths;
use crate::visitor::{SourceLines, Visitor};

/// One reconstructed declaration file
pub struct SourceFile {
    /// POSIX path relative to the base directory
    pub path: String,
    /// Fully reduced line buckets
    pub lines: LineMap,
}

/// Normalise the per-file line buckets collected by the visitor:
/// back-fill parameter names from definitions into declarations, drop
/// files escaping the base directory, and reduce every bucket to a
/// deduplicated sequence of maximal objects.
pub(crate) fn assemble(visitor: Visitor<'_>) -> cu::Result<Vec<SourceFile>> {
    let Visitor {
        base_dir,
        files,
        param_names,
        ..
    } = visitor;
    Ok(assemble_files(files, &param_names, &base_dir))
}

pub(crate) fn assemble_files(
    files: Vec<SourceLines>,
    param_names: &FxHashMap<Arc<str>, Vec<Option<Arc<str>>>>,
    base_dir: &str,
) -> Vec<SourceFile> {
    let mut out = Vec::with_capacity(files.len());
    for SourceLines { path, lines } in files {
        let rel = paths::relative_to(&path, base_dir);
        if rel == ".." || rel.starts_with("../") {
            cu::debug!("skipping {path}: outside the base directory");
            continue;
        }
        let mut reduced = LineMap::new();
        for (line, mut bucket) in lines {
            for obj in &mut bucket {
                backfill_parameters(obj, param_names);
            }
            reduced.insert(line, reduce_bucket(bucket));
        }
        out.push(SourceFile {
            path: rel,
            lines: reduced,
        });
    }
    out
}

/// Fill missing parameter names from the union of names observed for the
/// same signature, recursing through nested declarations
fn backfill_parameters(obj: &mut Object, param_names: &FxHashMap<Arc<str>, Vec<Option<Arc<str>>>>) {
    match obj {
        Object::Function(function) => {
            let Some(key) = &function.index_key else {
                return;
            };
            let Some(names) = param_names.get(key) else {
                return;
            };
            for (param, name) in function.parameters.iter_mut().zip(names) {
                if param.name.is_none() {
                    param.name = name.clone();
                }
            }
        }
        Object::Composite(comp) => {
            for bucket in comp.members.values_mut() {
                for member in bucket {
                    backfill_parameters(member, param_names);
                }
            }
        }
        Object::TypeDef(typedef) => {
            if let Some(TypeRef::Inline(inner)) = &mut typedef.value {
                backfill_parameters(inner, param_names);
            }
        }
        Object::Attribute(attribute) => {
            if let Some(TypeRef::Inline(inner)) = &mut attribute.ty {
                backfill_parameters(inner, param_names);
            }
        }
        Object::Template(template) => {
            backfill_parameters(&mut template.declaration, param_names);
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use model::{Function, Head, Parameter};

    fn func(name: &str, key: &str, param_names: &[Option<&str>]) -> Function {
        Function {
            head: Head::named(name),
            parameters: param_names
                .iter()
                .map(|n| Parameter::positional(n.map(Into::into), "int".to_string()))
                .collect(),
            returns: Some("void".to_string()),
            index_key: Some(key.into()),
            ..Default::default()
        }
    }

    fn names_index(
        key: &str,
        names: &[Option<&str>],
    ) -> FxHashMap<Arc<str>, Vec<Option<Arc<str>>>> {
        let mut map = FxHashMap::default();
        map.insert(
            Arc::from(key),
            names.iter().map(|n| n.map(Arc::from)).collect(),
        );
        map
    }

    #[test]
    fn test_backfill_reaches_nested_members() {
        use model::{Composite, CompositeKind};
        let index = names_index("f@2", &[Some("x"), Some("y")]);
        let mut comp = Composite::new(CompositeKind::Class, "C");
        comp.members
            .entry(4)
            .or_default()
            .push(Object::Function(func("f", "f@2", &[None, None])));
        let mut obj = Object::Composite(comp);
        backfill_parameters(&mut obj, &index);
        let Object::Composite(comp) = obj else {
            unreachable!()
        };
        let Object::Function(f) = &comp.members[&4][0] else {
            panic!("expected a function");
        };
        let names: Vec<_> = f.parameters.iter().map(|p| p.name.clone()).collect();
        assert_eq!(names, vec![Some("x".into()), Some("y".into())]);
    }

    #[test]
    fn test_assemble_skips_paths_outside_base() {
        let index = FxHashMap::default();
        let inside = SourceLines::new("/base/src/a.h".to_string());
        let outside = SourceLines::new("/elsewhere/b.h".to_string());
        let files = vec![inside, outside];
        let out = assemble_files(files, &index, "/base");
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].path, "src/a.h");
    }

    #[test]
    fn test_assemble_merges_declaration_and_definition() {
        let index = names_index("f@2", &[Some("x"), Some("y")]);
        let mut lines = SourceLines::new("/base/a.h".to_string());
        lines.push(10, Object::Function(func("f", "f@2", &[Some("x"), None])));
        lines.push(10, Object::Function(func("f", "f@2", &[None, Some("y")])));
        let out = assemble_files(vec![lines], &index, "/base");
        let bucket = &out[0].lines[&10];
        assert_eq!(bucket.len(), 1);
        let Object::Function(f) = &bucket[0] else {
            panic!("expected a function");
        };
        let names: Vec<_> = f.parameters.iter().map(|p| p.name.clone()).collect();
        assert_eq!(names, vec![Some("x".into()), Some("y".into())]);
    }
}
