use std::sync::Arc;

use engine::SourceFile;
use model::{
    Attribute, Composite, Enum, Function, Import, ImportedDeclaration, ImportedModule, Namespace,
    Object, Parameter, ParameterKind, Template, TemplateParameter, TemplateParameterKind, TypeDef,
    TypeRef, Virtuality, namespace_chain,
};

/// Render one reconstructed file: declarations are placed back at their
/// original line numbers, with namespaces opened and closed between them.
pub fn render_file(file: &SourceFile) -> String {
    let mut w = Writer::default();
    let mut open: Vec<Arc<Namespace>> = Vec::new();
    for (line, objects) in &file.lines {
        for obj in objects {
            let chain = match obj.head().and_then(|h| h.parent.as_ref()) {
                Some(ns) => namespace_chain(ns),
                None => Vec::new(),
            };
            apply_ns_actions(&mut w, &open, &chain);
            open = chain;
            w.pad_to(*line);
            render_object(&mut w, obj, open.len());
        }
    }
    apply_ns_actions(&mut w, &open, &[]);
    w.out
}

#[derive(Default)]
struct Writer {
    out: String,
    /// lines emitted so far
    line: u64,
}

impl Writer {
    fn push_line(&mut self, indent: usize, text: &str) {
        for _ in 0..indent {
            self.out.push_str("    ");
        }
        self.out.push_str(text);
        self.out.push('\n');
        self.line += 1;
    }

    /// Emit blank lines so the next line lands at `line` (1-based)
    fn pad_to(&mut self, line: u64) {
        while self.line + 1 < line {
            self.out.push('\n');
            self.line += 1;
        }
    }
}

/// Close and open namespace braces between two consecutive declarations
fn apply_ns_actions(w: &mut Writer, prev: &[Arc<Namespace>], curr: &[Arc<Namespace>]) {
    let mut common = 0;
    while common < prev.len()
        && common < curr.len()
        && prev[common].name == curr[common].name
        && prev[common].is_inline == curr[common].is_inline
    {
        common += 1;
    }
    for i in (common..prev.len()).rev() {
        let ns = &prev[i];
        if ns.name.is_empty() {
            w.push_line(i, "} // namespace");
        } else {
            w.push_line(i, &format!("}} // namespace {}", ns.name));
        }
    }
    for (i, ns) in curr.iter().enumerate().skip(common) {
        let keyword = if ns.is_inline {
            "inline namespace"
        } else {
            "namespace"
        };
        if ns.name.is_empty() {
            w.push_line(i, &format!("{keyword} {{"));
        } else {
            w.push_line(i, &format!("{keyword} {} {{", ns.name));
        }
    }
}

fn render_object(w: &mut Writer, obj: &Object, indent: usize) {
    match obj {
        Object::Namespace(_) => {}
        Object::ImportedModule(x) => w.push_line(indent, &text_imported_module(x)),
        Object::ImportedDeclaration(x) => w.push_line(indent, &text_imported_declaration(x)),
        Object::Attribute(x) => render_attribute(w, x, indent),
        Object::Function(x) => w.push_line(indent, &text_function(x)),
        Object::Composite(x) => render_composite(w, x, indent, "", None),
        Object::Enum(x) => render_enum(w, x, indent, "", None),
        Object::TypeDef(x) => render_typedef(w, x, indent),
        Object::Template(x) => render_template_decl(w, x, indent),
    }
}

fn text_imported_module(import: &ImportedModule) -> String {
    match &import.import {
        Some(ns) => format!("using namespace {};", ns.qualified_name()),
        None => "using namespace;".to_string(),
    }
}

fn text_imported_declaration(import: &ImportedDeclaration) -> String {
    match &import.import {
        Some(Import::Namespace(ns)) => {
            let qualified = ns.qualified_name();
            let name = import.head.name.as_ref();
            if name.is_empty() {
                format!("using {qualified};")
            } else if qualified.is_empty() {
                format!("using {name};")
            } else {
                format!("using {qualified}::{name};")
            }
        }
        Some(Import::Type(ty)) => format!("using {ty};"),
        None => "using;".to_string(),
    }
}

fn render_attribute(w: &mut Writer, attribute: &Attribute, indent: usize) {
    match &attribute.ty {
        Some(TypeRef::Inline(inner)) => {
            // an anonymous composite declared in place with the variable
            let name = attribute.head.name.as_ref();
            match inner.as_ref() {
                Object::Composite(c) => render_composite(w, c, indent, "", Some(name)),
                Object::Enum(e) => render_enum(w, e, indent, "", Some(name)),
                other => render_object(w, other, indent),
            }
        }
        _ => w.push_line(indent, &text_attribute(attribute)),
    }
}

fn text_attribute(attribute: &Attribute) -> String {
    let mut s = String::new();
    if let Some(t) = &attribute.head.template {
        s.push_str(&format!("template <{}> ", text_template_params(&t.parameters)));
    }
    if attribute.is_static {
        s.push_str("static ");
    }
    if let Some(alignment) = attribute.alignment {
        s.push_str(&format!("alignas({alignment}) "));
    }
    match &attribute.ty {
        Some(TypeRef::Text(t)) => s.push_str(&t.declare(&attribute.head.name)),
        _ => s.push_str(&attribute.head.name),
    }
    if let Some(bits) = attribute.bit_size {
        s.push_str(&format!(" : {bits}"));
    }
    if let Some(value) = &attribute.default_value {
        s.push_str(&format!(" = {value}"));
    }
    s.push(';');
    s
}

fn text_parameter(parameter: &Parameter) -> String {
    if parameter.kind == ParameterKind::Variadic {
        return "...".to_string();
    }
    match &parameter.name {
        Some(name) => format!("{} {name}", parameter.ty),
        None => parameter.ty.clone(),
    }
}

fn text_function(function: &Function) -> String {
    let mut s = String::new();
    if let Some(t) = &function.head.template {
        s.push_str(&format!("template <{}> ", text_template_params(&t.parameters)));
    }
    if function.noreturn {
        s.push_str("[[noreturn]] ");
    }
    if function.is_static {
        s.push_str("static ");
    }
    if function.virtuality.is_some() {
        s.push_str("virtual ");
    }
    if function.is_explicit {
        s.push_str("explicit ");
    }
    if let Some(returns) = &function.returns {
        s.push_str(returns);
        s.push(' ');
    }
    s.push_str(&function.head.name);
    s.push('(');
    let params: Vec<String> = function.parameters.iter().map(text_parameter).collect();
    s.push_str(&params.join(", "));
    s.push(')');
    if function.is_const {
        s.push_str(" const");
    }
    if function.virtuality == Some(Virtuality::PureVirtual) {
        s.push_str(" = 0");
    }
    if function.is_deleted {
        s.push_str(" = delete");
    }
    s.push(';');
    s
}

fn render_composite(
    w: &mut Writer,
    comp: &Composite,
    indent: usize,
    prefix: &str,
    trailing: Option<&str>,
) {
    let mut decl = String::new();
    decl.push_str(prefix);
    if let Some(t) = &comp.head.template {
        decl.push_str(&format!("template <{}> ", text_template_params(&t.parameters)));
    }
    if let Some(alignment) = comp.alignment {
        decl.push_str(&format!("alignas({alignment}) "));
    }
    decl.push_str(comp.kind.keyword());
    if !comp.head.name.is_empty() {
        decl.push(' ');
        decl.push_str(&comp.head.name);
    }
    if comp.head.is_declaration {
        decl.push(';');
        w.push_line(indent, &decl);
        return;
    }
    if !comp.bases.is_empty() {
        decl.push_str(" : ");
        let bases: Vec<String> = comp
            .bases
            .iter()
            .map(|(base, access)| match access {
                Some(access) => format!("{} {base}", access.keyword()),
                None => base.clone(),
            })
            .collect();
        decl.push_str(&bases.join(", "));
    }
    decl.push_str(" {");
    w.push_line(indent, &decl);
    let mut current = comp.kind.default_access();
    for (line, bucket) in &comp.members {
        for member in bucket {
            if let Some(access) = member.head().and_then(|h| h.access)
                && access != current
            {
                w.push_line(indent, &format!("{}:", access.keyword()));
                current = access;
            }
            w.pad_to(*line);
            render_object(w, member, indent + 1);
        }
    }
    match trailing {
        Some(name) if !name.is_empty() => w.push_line(indent, &format!("}} {name};")),
        _ => w.push_line(indent, "};"),
    }
}

fn render_enum(w: &mut Writer, enum_: &Enum, indent: usize, prefix: &str, trailing: Option<&str>) {
    let mut decl = String::new();
    decl.push_str(prefix);
    decl.push_str(if enum_.is_class { "enum class" } else { "enum" });
    if !enum_.head.name.is_empty() {
        decl.push(' ');
        decl.push_str(&enum_.head.name);
    }
    if let Some(base) = &enum_.base {
        decl.push_str(&format!(" : {base}"));
    }
    decl.push_str(" {");
    w.push_line(indent, &decl);
    for (name, value) in &enum_.values {
        w.push_line(indent + 1, &format!("{name} = {value},"));
    }
    match trailing {
        Some(name) if !name.is_empty() => w.push_line(indent, &format!("}} {name};")),
        _ => w.push_line(indent, "};"),
    }
}

fn render_typedef(w: &mut Writer, typedef: &TypeDef, indent: usize) {
    match &typedef.value {
        Some(TypeRef::Text(t)) => {
            w.push_line(indent, &format!("typedef {};", t.declare(&typedef.head.name)));
        }
        Some(TypeRef::Inline(inner)) => {
            let name = typedef.head.name.as_ref();
            match inner.as_ref() {
                Object::Composite(c) => render_composite(w, c, indent, "typedef ", Some(name)),
                Object::Enum(e) => render_enum(w, e, indent, "typedef ", Some(name)),
                other => render_object(w, other, indent),
            }
        }
        None => w.push_line(indent, &format!("typedef {};", typedef.head.name)),
    }
}

fn render_template_decl(w: &mut Writer, template: &Template, indent: usize) {
    let params = text_template_params(&template.parameters);
    match template.declaration.as_ref() {
        Object::Composite(c) => {
            w.push_line(
                indent,
                &format!("template <{params}> {} {};", c.kind.keyword(), c.head.name),
            );
        }
        Object::Attribute(a) => {
            let mut text = format!("template <{params}> ");
            match &a.ty {
                Some(TypeRef::Text(t)) => text.push_str(&t.declare(&a.head.name)),
                _ => text.push_str(&a.head.name),
            }
            text.push(';');
            w.push_line(indent, &text);
        }
        other => render_object(w, other, indent),
    }
}

fn text_template_params(params: &[TemplateParameter]) -> String {
    let rendered: Vec<String> = params.iter().map(text_template_param).collect();
    rendered.join(", ")
}

fn text_template_param(param: &TemplateParameter) -> String {
    let mut s = match param.kind {
        TemplateParameterKind::Type => "typename".to_string(),
        TemplateParameterKind::Constant => {
            param.ty.clone().unwrap_or_else(|| "auto".to_string())
        }
        TemplateParameterKind::Template => "template <typename...> typename".to_string(),
        TemplateParameterKind::Pack => match &param.ty {
            Some(ty) => format!("{ty}..."),
            None => "typename...".to_string(),
        },
    };
    if let Some(name) = &param.name {
        s.push(' ');
        s.push_str(name);
    }
    if let Some(default) = &param.default {
        s.push_str(&format!(" = {default}"));
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;
    use model::{Head, LineMap};

    fn ns(name: &str, parent: Option<Arc<Namespace>>) -> Arc<Namespace> {
        Arc::new(Namespace::new(name, parent, false))
    }

    #[test]
    fn test_ns_actions_diff() {
        let a = ns("a", None);
        let ab = ns("b", Some(Arc::clone(&a)));
        let ac = ns("c", Some(Arc::clone(&a)));
        let mut w = Writer::default();
        apply_ns_actions(&mut w, &namespace_chain(&ab), &namespace_chain(&ac));
        assert_eq!(w.out, "    } // namespace b\n    namespace c {\n");
    }

    #[test]
    fn test_render_places_objects_at_their_lines() {
        let mut lines = LineMap::new();
        let mut e = Enum {
            head: Head::named("Color"),
            is_class: true,
            base: Some("int".to_string()),
            ..Default::default()
        };
        e.values.push(("Red".into(), 0));
        e.values.push(("Green".into(), 1));
        lines.insert(3, vec![Object::Enum(e)]);
        let file = SourceFile {
            path: "color.h".to_string(),
            lines,
        };
        let text = render_file(&file);
        let rendered: Vec<&str> = text.lines().collect();
        assert_eq!(rendered[0], "");
        assert_eq!(rendered[1], "");
        assert_eq!(rendered[2], "enum class Color : int {");
        assert_eq!(rendered[3], "    Red = 0,");
        assert_eq!(rendered[4], "    Green = 1,");
        assert_eq!(rendered[5], "};");
    }

    #[test]
    fn test_function_text() {
        let f = Function {
            head: Head::named("advance"),
            parameters: vec![
                Parameter::positional(Some("ticks".into()), "int".to_string()),
                Parameter::variadic(),
            ],
            returns: Some("void".to_string()),
            is_const: true,
            virtuality: Some(Virtuality::PureVirtual),
            ..Default::default()
        };
        assert_eq!(
            text_function(&f),
            "virtual void advance(int ticks, ...) const = 0;"
        );
    }
}
