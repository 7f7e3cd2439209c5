use std::borrow::Cow;
use std::sync::Arc;

use cu::pre::*;
use elf::ElfBytes;
use elf::endian::LittleEndian as ElfLittleEndian;
use fxhash::FxHashMap;
use gimli::{AttributeValue, DwAt, DwarfFileType, Reader, UnitSectionOffset, UnitType};
use model::Goff;

use crate::dwarf::{Die, EntriesTree, In, Loff};
use crate::paths;

/// All units of one DWARF image, with cross-unit lookup.
///
/// Each DWARF section is copied out of the ELF image into its own
/// `Arc`-backed reader, so the context and its units own their bytes and
/// nothing borrows the input buffer. Units are collected eagerly so that
/// `DW_AT_signature` and cross-unit references can be resolved: type units
/// come from `.debug_types` (DWARF4) or from `.debug_info` headers
/// carrying a type unit marker (DWARF5).
pub struct DwarfContext {
    units: Vec<Unit>,
    /// (section offset, unit index) sorted, for .debug_info lookups
    info_index: Vec<(usize, usize)>,
    /// (section offset, unit index) sorted, for .debug_types lookups
    types_index: Vec<(usize, usize)>,
    /// type signature to the definition DIE inside its type unit
    signatures: FxHashMap<u64, Goff>,
}

impl DwarfContext {
    /// Parse the DWARF sections out of an ELF image and collect its units
    pub fn load(bytes: &[u8]) -> cu::Result<Self> {
        let elf_data = cu::check!(
            ElfBytes::<ElfLittleEndian>::minimal_parse(bytes),
            "failed to parse ELF"
        )?;
        let mut dwarf = gimli::Dwarf::load(|section| {
            let name = section.name();
            let header = cu::check!(
                elf_data.section_header_by_name(name),
                "cannot read ELF section header for section {name}"
            )?;
            let data: Arc<[u8]> = match header {
                Some(header) => {
                    let start = header.sh_offset as usize;
                    let end = start + header.sh_size as usize;
                    let section_bytes = cu::check!(
                        bytes.get(start..end),
                        "section {name} lies outside the ELF image"
                    )?;
                    cu::debug!("loaded ELF section {name} ({} bytes)", section_bytes.len());
                    section_bytes.into()
                }
                None => Arc::from(&[][..]),
            };
            cu::Ok(In::new(data, gimli::LittleEndian))
        })
        .context("failed to load DWARF from ELF")?;
        dwarf.file_type = DwarfFileType::Main;
        let dwarf = Arc::new(dwarf);

        let mut units = Vec::new();
        let mut iter = dwarf.debug_types.units();
        while let Some(header) = cu::check!(iter.next(), "failed to read next type unit header")? {
            units.push(Unit::new(&dwarf, header)?);
        }
        let mut iter = dwarf.debug_info.units();
        while let Some(header) = cu::check!(iter.next(), "failed to read next unit header")? {
            units.push(Unit::new(&dwarf, header)?);
        }

        let mut info_index = Vec::new();
        let mut types_index = Vec::new();
        let mut signatures = FxHashMap::default();
        for (i, unit) in units.iter().enumerate() {
            if unit.offset.is_type_unit {
                types_index.push((unit.offset.offset, i));
            } else {
                info_index.push((unit.offset.offset, i));
            }
            if let (Some(sig), Some(toff)) = (unit.type_signature, unit.type_offset) {
                let def = toff.to_global(unit.offset.offset, unit.offset.is_type_unit);
                signatures.insert(sig, def);
            }
        }
        info_index.sort_unstable();
        types_index.sort_unstable();

        cu::debug!(
            "loaded {} units ({} type units)",
            units.len(),
            signatures.len()
        );
        Ok(Self {
            units,
            info_index,
            types_index,
            signatures,
        })
    }

    /// All type units, in section order
    pub fn type_units(&self) -> impl Iterator<Item = &Unit> {
        self.units.iter().filter(|u| u.is_type_unit)
    }

    /// All compile units, in section order
    pub fn compile_units(&self) -> impl Iterator<Item = &Unit> {
        self.units.iter().filter(|u| !u.is_type_unit)
    }

    /// Find the unit containing the entry at `goff`
    pub fn unit_for(&self, goff: Goff) -> cu::Result<&Unit> {
        let index = if goff.is_type_unit {
            &self.types_index
        } else {
            &self.info_index
        };
        let i = index.partition_point(|(offset, _)| *offset <= goff.offset);
        let entry = i.checked_sub(1).and_then(|i| index.get(i));
        let (_, unit_i) = *cu::check!(entry, "no unit contains entry at {goff}")?;
        Ok(&self.units[unit_i])
    }

    /// Read the entry at a global offset
    pub fn die_at(&self, goff: Goff) -> cu::Result<Die<'_, '_>> {
        let unit = self.unit_for(goff)?;
        let loff = Loff::from(gimli::UnitOffset(goff.offset - unit.offset.offset));
        unit.entry_at(loff)
    }

    /// The definition DIE registered for a type signature
    pub fn resolve_signature(&self, signature: u64) -> Option<Goff> {
        self.signatures.get(&signature).copied()
    }

    /// Replace a signature-only declaration DIE with the definition DIE
    /// inside the referenced type unit. DIEs without a DW_AT_signature pass
    /// through unchanged.
    pub fn resolve_type_unit_reference<'x>(&'x self, die: Die<'x, 'x>) -> cu::Result<Die<'x, 'x>> {
        let offset = die.goff();
        let Some(sig) = die.signature()? else {
            return Ok(die);
        };
        let target = cu::check!(
            self.resolve_signature(sig),
            "cannot resolve type signature 0x{sig:016x} referenced at {offset}"
        )?;
        self.die_at(target)
    }

    /// Resolve any reference-form attribute value to a global offset
    pub(crate) fn reference_to_goff(
        &self,
        unit: &Unit,
        attr: DwAt,
        offset: Goff,
        value: AttributeValue<In>,
    ) -> cu::Result<Goff> {
        match value {
            AttributeValue::UnitRef(loff) => Ok(unit.goff(loff.into())),
            AttributeValue::DebugInfoRef(o) => Ok(Goff::info(o.0)),
            AttributeValue::DebugTypesRef(sig) => {
                let target = cu::check!(
                    self.resolve_signature(sig.0),
                    "cannot resolve type signature 0x{:016x} for {attr} at {offset}",
                    sig.0
                )?;
                Ok(target)
            }
            _ => cu::bail!("expecting {attr} to be a reference at {offset}"),
        }
    }
}

/// Holder of a unit in .debug_info or .debug_types
#[derive(Display)]
#[display("{} at {} ({})", self.kind_str(), self.offset, self.name)]
pub struct Unit {
    pub(crate) unit: gimli::Unit<In>,
    dwarf: Arc<gimli::Dwarf<In>>,
    /// name of the unit (typically the primary source file)
    pub name: String,
    /// compilation directory, empty for type units
    pub comp_dir: String,
    /// section-global offset of the unit
    pub offset: Goff,
    /// whether this is a type unit (either section)
    pub is_type_unit: bool,
    pub(crate) type_signature: Option<u64>,
    pub(crate) type_offset: Option<Loff>,
}

impl Unit {
    fn new(dwarf: &Arc<gimli::Dwarf<In>>, header: gimli::UnitHeader<In>) -> cu::Result<Self> {
        let offset = match header.offset() {
            UnitSectionOffset::DebugInfoOffset(o) => Goff::info(o.0),
            UnitSectionOffset::DebugTypesOffset(o) => Goff::type_unit(o.0),
        };
        let (is_type_unit, type_signature, type_offset) = match header.type_() {
            UnitType::Compilation => (false, None, None),
            UnitType::Type {
                type_signature,
                type_offset,
            } => (true, Some(type_signature.0), Some(Loff::from(type_offset))),
            other => cu::bail!("unsupported unit type {other:?} for unit at {offset}"),
        };
        let unit = cu::check!(
            gimli::Unit::new(dwarf, header),
            "failed to create unit at {offset}"
        )?;
        let name = match &unit.name {
            Some(r) => {
                let name = cu::check!(r.to_string(), "failed to decode name of unit at {offset}")?;
                name.into_owned()
            }
            None => String::new(),
        };
        let comp_dir = match &unit.comp_dir {
            Some(r) => {
                let dir = cu::check!(
                    r.to_string(),
                    "failed to decode compilation dir of unit at {offset}"
                )?;
                paths::to_posix(&dir)
            }
            None => String::new(),
        };
        Ok(Self {
            unit,
            dwarf: Arc::clone(dwarf),
            name,
            comp_dir,
            offset,
            is_type_unit,
            type_signature,
            type_offset,
        })
    }

    pub fn tree(&self) -> cu::Result<EntriesTree<'_>> {
        self.entries_tree(None)
    }

    pub fn tree_at(&self, loff: Loff) -> cu::Result<EntriesTree<'_>> {
        self.entries_tree(Some(loff))
    }

    fn entries_tree(&self, loff: Option<Loff>) -> cu::Result<EntriesTree<'_>> {
        let tree = match loff {
            None => cu::check!(
                self.unit.entries_tree(None),
                "failed to parse root for {self}"
            )?,
            Some(loff) => cu::check!(
                self.unit.entries_tree(Some(loff.into())),
                "failed to parse tree at {} for {self}",
                self.goff(loff)
            )?,
        };
        Ok(EntriesTree { unit: self, tree })
    }

    /// Get a single entry at offset
    pub fn entry_at<'x>(&'x self, loff: Loff) -> cu::Result<Die<'x, 'x>> {
        let entry = self.unit.entry(loff.into());
        let entry = cu::check!(
            entry,
            "failed to read entry at {} for {self}",
            self.goff(loff)
        )?;
        Ok(Die {
            unit: self,
            entry: Cow::Owned(entry),
        })
    }

    /// Convert a local offset in this unit to a global offset
    pub fn goff(&self, loff: Loff) -> Goff {
        loff.to_global(self.offset.offset, self.offset.is_type_unit)
    }

    fn kind_str(&self) -> &'static str {
        if self.is_type_unit {
            "type unit"
        } else {
            "compilation unit"
        }
    }

    /// Resolve a DW_AT_decl_file index through the unit's line program
    /// into an absolute POSIX path
    pub fn decl_file_path(&self, index: u64) -> cu::Result<Option<String>> {
        let Some(program) = &self.unit.line_program else {
            return Ok(None);
        };
        let header = program.header();
        let Some(file) = header.file(index) else {
            return Ok(None);
        };
        let name = cu::check!(
            self.attr_string(file.path_name()),
            "failed to read file name for decl_file {index} in {self}"
        )?;
        let mut path = paths::to_posix(&name);
        if !paths::is_absolute(&path) {
            let mut dir = String::new();
            if let Some(d) = file.directory(header) {
                let d = cu::check!(
                    self.attr_string(d),
                    "failed to read directory for decl_file {index} in {self}"
                )?;
                dir = paths::to_posix(&d);
            }
            if !paths::is_absolute(&dir) {
                dir = paths::join(&self.comp_dir, &dir);
            }
            path = paths::join(&dir, &path);
        }
        Ok(Some(paths::normalize(&path)))
    }

    /// Get an attribute value as an owned string
    pub(crate) fn attr_string(&self, value: AttributeValue<In>) -> cu::Result<String> {
        let value = cu::check!(
            self.dwarf.attr_string(&self.unit, value),
            "failed to get attribute value as string in {self}"
        )?;
        let value = cu::check!(
            value.to_string(),
            "failed to decode attribute value as string in {self}"
        )?;
        Ok(value.into_owned())
    }
}
