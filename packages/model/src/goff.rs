use std::collections::BTreeMap;

/// Global identity of a DIE in one DWARF image
///
/// A DIE is identified by its section-global offset plus a flag telling
/// which section the offset points into, since `.debug_types` offsets can
/// collide with `.debug_info` offsets. A Goff is unique within one run but
/// not stable across binaries.
#[derive(Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct Goff {
    pub offset: usize,
    /// The offset points into `.debug_types` instead of `.debug_info`
    pub is_type_unit: bool,
}

impl Goff {
    pub const fn info(offset: usize) -> Self {
        Self {
            offset,
            is_type_unit: false,
        }
    }

    pub const fn type_unit(offset: usize) -> Self {
        Self {
            offset,
            is_type_unit: true,
        }
    }
}

impl std::fmt::Display for Goff {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_type_unit {
            write!(f, "type(0x{:08x})", self.offset)
        } else {
            write!(f, "0x{:08x}", self.offset)
        }
    }
}

impl std::fmt::Debug for Goff {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(self, f)
    }
}

pub type GoffMap<T> = BTreeMap<Goff, T>;
