use cu::pre::*;
use gimli::constants::*;
use model::Goff;

pub type In = gimli::EndianArcSlice<gimli::LittleEndian>;
pub type Tag = gimli::DwTag;

/// Tags that produce a declaration filed under a source line
pub fn is_declared_tag(tag: Tag) -> bool {
    match tag {
        DW_TAG_typedef
        | DW_TAG_class_type
        | DW_TAG_enumeration_type
        | DW_TAG_union_type
        | DW_TAG_structure_type
        | DW_TAG_variable
        | DW_TAG_subprogram
        | DW_TAG_imported_module
        | DW_TAG_imported_declaration => true,
        _tag => false,
    }
}

/// Tags that can appear at unit level without producing a declaration
pub fn is_ignored_unit_child(tag: Tag) -> bool {
    match tag {
        DW_TAG_base_type
        | DW_TAG_array_type
        | DW_TAG_const_type
        | DW_TAG_pointer_type
        | DW_TAG_reference_type
        | DW_TAG_rvalue_reference_type
        | DW_TAG_atomic_type
        | DW_TAG_volatile_type
        | DW_TAG_restrict_type
        | DW_TAG_unspecified_type
        | DW_TAG_subroutine_type
        | DW_TAG_ptr_to_member_type
        | DW_TAG_label => true,
        _tag => false,
    }
}

/// Composite type tags (struct, class, union)
pub fn is_composite_tag(tag: Tag) -> bool {
    matches!(
        tag,
        DW_TAG_structure_type | DW_TAG_class_type | DW_TAG_union_type
    )
}

/// Tags that may be embedded in place when anonymous (typedef targets,
/// attribute types)
pub fn is_embeddable_tag(tag: Tag) -> bool {
    is_composite_tag(tag) || tag == DW_TAG_enumeration_type
}

/// Template parameter tags collected by the template builder
pub fn is_template_param_tag(tag: Tag) -> bool {
    matches!(
        tag,
        DW_TAG_template_type_parameter
            | DW_TAG_template_value_parameter
            | DW_TAG_GNU_template_parameter_pack
            | DW_TAG_GNU_template_template_param
    )
}

/// Local offset into a unit in DWARF
#[rustfmt::skip]
#[derive(
    DebugCustom, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord,
    Into, Display
)]
#[display("local(0x{:08x})", self.0)]
#[debug("local(0x{:08x})", self.0)]
pub struct Loff(usize);

impl From<gimli::UnitOffset<usize>> for Loff {
    fn from(value: gimli::UnitOffset<usize>) -> Self {
        Self(value.0)
    }
}

impl From<Loff> for gimli::UnitOffset<usize> {
    fn from(value: Loff) -> Self {
        Self(value.0)
    }
}

impl Loff {
    /// Convert unit-local offset to section-global offset
    #[inline(always)]
    pub fn to_global(self, unit_offset: usize, is_type_unit: bool) -> Goff {
        Goff {
            offset: self.0 + unit_offset,
            is_type_unit,
        }
    }
}
