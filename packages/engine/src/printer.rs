use cu::pre::*;
use gimli::constants::*;
use model::{Goff, GoffMap, SplitType};

use crate::ScopeMaps;
use crate::dwarf::{self, Die, DwarfContext};

/// Renders C++ type expressions for type DIEs, memoised on DIE identity
///
/// Rendering is split-mode: a `(before, after)` pair that wraps around a
/// declared name, which is what makes arrays, function pointers and
/// pointers-to-member come out in valid declarator grammar.
pub struct TypePrinter {
    cache: GoffMap<SplitType>,
}

impl TypePrinter {
    pub fn new() -> Self {
        Self {
            cache: GoffMap::new(),
        }
    }

    /// Render the type at `goff` as a single joined string
    pub fn joined(
        &mut self,
        ctx: &DwarfContext,
        scopes: &ScopeMaps,
        goff: Goff,
    ) -> cu::Result<String> {
        Ok(self.split(ctx, scopes, goff)?.joined())
    }

    /// Render the type at `goff` in split declarator form
    pub fn split(
        &mut self,
        ctx: &DwarfContext,
        scopes: &ScopeMaps,
        goff: Goff,
    ) -> cu::Result<SplitType> {
        if let Some(cached) = self.cache.get(&goff) {
            return Ok(cached.clone());
        }
        let die = ctx.die_at(goff)?;
        let die = ctx.resolve_type_unit_reference(die)?;
        let rendered = self.render(ctx, scopes, &die)?;
        self.cache.insert(goff, rendered.clone());
        Ok(rendered)
    }

    fn render(
        &mut self,
        ctx: &DwarfContext,
        scopes: &ScopeMaps,
        die: &Die<'_, '_>,
    ) -> cu::Result<SplitType> {
        let offset = die.goff();
        match die.tag() {
            DW_TAG_base_type | DW_TAG_unspecified_type => {
                Ok(SplitType::plain(die.name()?))
            }
            DW_TAG_structure_type
            | DW_TAG_class_type
            | DW_TAG_union_type
            | DW_TAG_enumeration_type
            | DW_TAG_typedef => self.render_named(ctx, scopes, die),
            DW_TAG_pointer_type => {
                let inner = self.split_of(ctx, scopes, die, DW_AT_type)?;
                Ok(pointer_around(&inner, "*"))
            }
            DW_TAG_reference_type => {
                let inner = self.split_of(ctx, scopes, die, DW_AT_type)?;
                Ok(pointer_around(&inner, "&"))
            }
            DW_TAG_rvalue_reference_type => {
                let inner = self.split_of(ctx, scopes, die, DW_AT_type)?;
                Ok(pointer_around(&inner, "&&"))
            }
            DW_TAG_const_type => {
                let inner = self.split_of(ctx, scopes, die, DW_AT_type)?;
                Ok(qualified(&inner, "const"))
            }
            DW_TAG_volatile_type => {
                let inner = self.split_of(ctx, scopes, die, DW_AT_type)?;
                Ok(qualified(&inner, "volatile"))
            }
            DW_TAG_restrict_type => {
                let inner = self.split_of(ctx, scopes, die, DW_AT_type)?;
                Ok(qualified(&inner, "restrict"))
            }
            DW_TAG_atomic_type => {
                let inner = self.split_of(ctx, scopes, die, DW_AT_type)?;
                Ok(qualified(&inner, "_Atomic"))
            }
            DW_TAG_array_type => {
                let element = cu::check!(
                    die.ref_opt(ctx, DW_AT_type)?,
                    "missing element type for array type at {offset}"
                )?;
                let inner = self.split(ctx, scopes, element)?;
                let dims = render_array_dims(die)?;
                Ok(array_of(&inner, &dims))
            }
            DW_TAG_subroutine_type => self.render_subroutine(ctx, scopes, die, false),
            DW_TAG_ptr_to_member_type => self.render_member_pointer(ctx, scopes, die),
            tag => cu::bail!("unhandled type tag {tag} for entry at {offset}"),
        }
    }

    /// A named leaf: scope prefix, name, and synthesised template
    /// arguments when the name does not embed them
    fn render_named(
        &mut self,
        ctx: &DwarfContext,
        scopes: &ScopeMaps,
        die: &Die<'_, '_>,
    ) -> cu::Result<SplitType> {
        let offset = die.goff();
        let prefix = scopes
            .qualifiers
            .get(&offset)
            .map(|s| s.prefix())
            .unwrap_or_default();
        let name = match die.name_opt()? {
            Some(name) => name,
            None => "(anonymous)".to_string(),
        };
        let mut full = format!("{prefix}{name}");
        if dwarf::is_composite_tag(die.tag()) && !name.contains('<') {
            if let Some(args) = self.render_template_args(ctx, scopes, die)? {
                full.push_str(&args);
            }
        }
        Ok(SplitType::plain(full))
    }

    fn render_template_args(
        &mut self,
        ctx: &DwarfContext,
        scopes: &ScopeMaps,
        die: &Die<'_, '_>,
    ) -> cu::Result<Option<String>> {
        let mut args: Vec<String> = Vec::new();
        let mut found = false;
        die.for_each_child(|child| {
            let entry = child.entry();
            if dwarf::is_template_param_tag(entry.tag()) {
                found = true;
                self.render_template_arg(ctx, scopes, &entry, &mut args)?;
            }
            Ok(())
        })?;
        if !found {
            return Ok(None);
        }
        Ok(Some(format!("<{}>", args.join(", "))))
    }

    fn render_template_arg(
        &mut self,
        ctx: &DwarfContext,
        scopes: &ScopeMaps,
        die: &Die<'_, '_>,
        out: &mut Vec<String>,
    ) -> cu::Result<()> {
        let offset = die.goff();
        match die.tag() {
            DW_TAG_template_type_parameter => {
                if let Some(ty) = die.ref_opt(ctx, DW_AT_type)? {
                    out.push(self.joined(ctx, scopes, ty)?);
                }
            }
            DW_TAG_template_value_parameter => {
                let value = die.const_int_opt()?;
                let value = cu::check!(
                    value,
                    "missing DW_AT_const_value for template value parameter at {offset}"
                )?;
                let is_bool = match die.ref_opt(ctx, DW_AT_type)? {
                    Some(ty) => self.joined(ctx, scopes, ty)? == "bool",
                    None => false,
                };
                if is_bool {
                    out.push(if value != 0 { "true" } else { "false" }.to_string());
                } else {
                    out.push(value.to_string());
                }
            }
            DW_TAG_GNU_template_template_param => {
                let name = die.str_opt(DW_AT_GNU_template_name)?;
                let name = cu::check!(
                    name,
                    "missing DW_AT_GNU_template_name for template template parameter at {offset}"
                )?;
                out.push(name);
            }
            DW_TAG_GNU_template_parameter_pack => {
                die.for_each_child(|child| {
                    let entry = child.entry();
                    self.render_template_arg(ctx, scopes, &entry, out)
                })?;
            }
            tag => cu::bail!("unhandled template parameter tag {tag} at {offset}"),
        }
        Ok(())
    }

    /// A subroutine type. For member subroutines (behind a
    /// pointer-to-member), the artificial object pointer is dropped from
    /// the parameter list and carries the member constness.
    fn render_subroutine(
        &mut self,
        ctx: &DwarfContext,
        scopes: &ScopeMaps,
        die: &Die<'_, '_>,
        is_member: bool,
    ) -> cu::Result<SplitType> {
        let offset = die.goff();
        let ret = self.split_of(ctx, scopes, die, DW_AT_type)?;
        let mut params: Vec<String> = Vec::new();
        let mut is_const = false;
        let mut first = true;
        die.for_each_child(|child| {
            let entry = child.entry();
            match entry.tag() {
                DW_TAG_formal_parameter => {
                    let ty = cu::check!(
                        entry.ref_opt(ctx, DW_AT_type)?,
                        "missing type for parameter of subroutine type at {offset}"
                    )?;
                    if is_member && first && entry.flag(DW_AT_artificial)? {
                        is_const = type_chain_has_const(ctx, ty)?;
                    } else {
                        params.push(self.joined(ctx, scopes, ty)?);
                    }
                    first = false;
                }
                DW_TAG_unspecified_parameters => params.push("...".to_string()),
                tag => cu::bail!("unhandled child tag {tag} in subroutine type at {offset}"),
            }
            Ok(())
        })?;
        let mut quals = String::new();
        if is_const {
            quals.push_str(" const");
        }
        if die.flag(DW_AT_reference)? {
            quals.push_str(" &");
        }
        if die.flag(DW_AT_rvalue_reference)? {
            quals.push_str(" &&");
        }
        Ok(SplitType::new(
            ret.before,
            format!("({}){}{}", params.join(", "), quals, ret.after),
        ))
    }

    fn render_member_pointer(
        &mut self,
        ctx: &DwarfContext,
        scopes: &ScopeMaps,
        die: &Die<'_, '_>,
    ) -> cu::Result<SplitType> {
        let offset = die.goff();
        let containing = cu::check!(
            die.ref_opt(ctx, DW_AT_containing_type)?,
            "missing containing type for pointer-to-member type at {offset}"
        )?;
        let class_name = self.joined(ctx, scopes, containing)?;
        let Some(pointee) = die.ref_opt(ctx, DW_AT_type)? else {
            return Ok(member_pointer(&SplitType::plain("void"), &class_name));
        };
        let pointee_die = ctx.die_at(pointee)?;
        let pointee_die = ctx.resolve_type_unit_reference(pointee_die)?;
        if pointee_die.tag() == DW_TAG_subroutine_type {
            let inner = self.render_subroutine(ctx, scopes, &pointee_die, true)?;
            Ok(member_pointer(&inner, &class_name))
        } else {
            let inner = self.split(ctx, scopes, pointee)?;
            Ok(member_pointer(&inner, &class_name))
        }
    }

    /// The type referenced by `attr`, or `void` when absent
    fn split_of(
        &mut self,
        ctx: &DwarfContext,
        scopes: &ScopeMaps,
        die: &Die<'_, '_>,
        attr: DwAt,
    ) -> cu::Result<SplitType> {
        match die.ref_opt(ctx, attr)? {
            None => Ok(SplitType::plain("void")),
            Some(goff) => self.split(ctx, scopes, goff),
        }
    }
}

impl Default for TypePrinter {
    fn default() -> Self {
        Self::new()
    }
}

fn render_array_dims(die: &Die<'_, '_>) -> cu::Result<String> {
    let offset = die.goff();
    let mut dims = String::new();
    die.for_each_child(|child| {
        let entry = child.entry();
        match entry.tag() {
            DW_TAG_subrange_type => {
                let count = match entry.uint_opt(DW_AT_count)? {
                    Some(count) => Some(count),
                    None => entry.uint_opt(DW_AT_upper_bound)?.map(|u| u + 1),
                };
                match count {
                    Some(count) => dims.push_str(&format!("[{count}]")),
                    None => dims.push_str("[]"),
                }
            }
            tag => cu::bail!("unhandled child tag {tag} in array type at {offset}"),
        }
        Ok(())
    })?;
    if dims.is_empty() {
        dims.push_str("[]");
    }
    Ok(dims)
}

/// Walk a type-modifier chain looking for a const qualifier. This is how
/// const member functions are detected from their object pointer.
pub fn type_chain_has_const(ctx: &DwarfContext, goff: Goff) -> cu::Result<bool> {
    let mut curr = Some(goff);
    while let Some(goff) = curr {
        let die = ctx.die_at(goff)?;
        match die.tag() {
            DW_TAG_const_type => return Ok(true),
            DW_TAG_pointer_type
            | DW_TAG_reference_type
            | DW_TAG_rvalue_reference_type
            | DW_TAG_volatile_type
            | DW_TAG_restrict_type
            | DW_TAG_atomic_type
            | DW_TAG_typedef => {
                curr = die.ref_opt(ctx, DW_AT_type)?;
            }
            _ => return Ok(false),
        }
    }
    Ok(false)
}

/// Wrap a pointer (or reference) marker around an inner type. Function and
/// array suffixes bind tighter than the marker, so those get parenthesised.
fn pointer_around(inner: &SplitType, marker: &str) -> SplitType {
    if needs_wrap(inner) {
        return SplitType::new(
            format!("{} ({marker}", inner.before),
            format!("){}", inner.after),
        );
    }
    let before = if inner.before.ends_with('*') || inner.before.ends_with('&') {
        format!("{}{marker}", inner.before)
    } else {
        format!("{} {marker}", inner.before)
    };
    SplitType::new(before, inner.after.clone())
}

/// Apply a cv qualifier: west placement for leaves (`const int`), inboard
/// placement behind a pointer marker (`int *const`)
fn qualified(inner: &SplitType, qualifier: &str) -> SplitType {
    if inner.before.ends_with('*') || inner.before.ends_with('&') {
        SplitType::new(format!("{}{qualifier}", inner.before), inner.after.clone())
    } else {
        SplitType::new(format!("{qualifier} {}", inner.before), inner.after.clone())
    }
}

fn array_of(inner: &SplitType, dims: &str) -> SplitType {
    SplitType::new(inner.before.clone(), format!("{dims}{}", inner.after))
}

/// `T Cls::*` for data members, `T (Cls::*)(args)` for member functions
fn member_pointer(inner: &SplitType, class_name: &str) -> SplitType {
    if needs_wrap(inner) {
        SplitType::new(
            format!("{} ({class_name}::*", inner.before),
            format!("){}", inner.after),
        )
    } else {
        SplitType::new(
            format!("{} {class_name}::*", inner.before),
            inner.after.clone(),
        )
    }
}

fn needs_wrap(inner: &SplitType) -> bool {
    inner.after.starts_with('(') || inner.after.starts_with('[')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_function_pointer_declarator() {
        // void (*)(int, int)
        let subroutine = SplitType::new("void", "(int, int)");
        let ptr = pointer_around(&subroutine, "*");
        assert_eq!(ptr.before, "void (*");
        assert_eq!(ptr.after, ")(int, int)");
        assert_eq!(ptr.declare("cb"), "void (*cb)(int, int)");
        assert_eq!(ptr.joined(), "void (*)(int, int)");
    }

    #[test]
    fn test_array_declarator() {
        let element = SplitType::plain("int");
        let arr = array_of(&array_of(&element, "[8]"), "[4]");
        assert_eq!(arr.declare("grid"), "int grid[4][8]");
        assert_eq!(arr.joined(), "int[4][8]");
    }

    #[test]
    fn test_pointer_to_array_is_parenthesised() {
        let arr = array_of(&SplitType::plain("int"), "[4]");
        let ptr = pointer_around(&arr, "*");
        assert_eq!(ptr.declare("p"), "int (*p)[4]");
    }

    #[test]
    fn test_pointer_chains_share_no_space() {
        let p1 = pointer_around(&SplitType::plain("int"), "*");
        let p2 = pointer_around(&p1, "*");
        assert_eq!(p2.joined(), "int **");
        let r = pointer_around(&p1, "&");
        assert_eq!(r.joined(), "int *&");
    }

    #[test]
    fn test_cv_qualifier_placement() {
        let leaf = qualified(&SplitType::plain("int"), "const");
        assert_eq!(leaf.joined(), "const int");
        let ptr = pointer_around(&SplitType::plain("int"), "*");
        let inboard = qualified(&ptr, "const");
        assert_eq!(inboard.joined(), "int *const");
        let ptr_to_const = pointer_around(&leaf, "*");
        assert_eq!(ptr_to_const.joined(), "const int *");
    }

    #[test]
    fn test_member_pointer_declarators() {
        let data = member_pointer(&SplitType::plain("int"), "Cls");
        assert_eq!(data.declare("pm"), "int Cls::*pm");
        let func = member_pointer(&SplitType::new("void", "(int) const &"), "Cls");
        assert_eq!(func.before, "void (Cls::*");
        assert_eq!(func.after, ")(int) const &");
        assert_eq!(func.declare("pmf"), "void (Cls::*pmf)(int) const &");
    }

    #[test]
    fn test_split_matches_joined_with_name_omitted() {
        let shapes = [
            pointer_around(&SplitType::new("void", "(int, int)"), "*"),
            array_of(&SplitType::plain("int"), "[4][8]"),
            member_pointer(&SplitType::plain("int"), "Cls"),
            qualified(&pointer_around(&SplitType::plain("char"), "*"), "const"),
        ];
        for shape in shapes {
            let joined = shape.joined();
            let with_name = shape.declare("");
            assert_eq!(joined, with_name);
        }
    }
}
