use std::borrow::Cow;

use cu::pre::*;
use gimli::AttributeValue;
use gimli::constants::*;
use model::{Access, Goff, Virtuality};

use crate::dwarf::{DwarfContext, In, Tag, Unit};

pub struct EntriesTree<'x> {
    pub(crate) unit: &'x Unit,
    pub(crate) tree: gimli::EntriesTree<'x, 'x, In>,
}

impl<'x> EntriesTree<'x> {
    pub fn root(&mut self) -> cu::Result<DieNode<'x, '_>> {
        let node = cu::check!(
            self.tree.root(),
            "failed to parse the root entry of {}",
            self.unit
        )?;
        Ok(DieNode {
            unit: self.unit,
            node,
        })
    }
}

pub struct DieNode<'x, 't> {
    pub(crate) node: gimli::EntriesTreeNode<'x, 'x, 't, In>,
    pub(crate) unit: &'x Unit,
}

impl<'x> DieNode<'x, '_> {
    pub fn entry(&self) -> Die<'x, '_> {
        Die {
            unit: self.unit,
            entry: Cow::Borrowed(self.node.entry()),
        }
    }

    pub fn goff(&self) -> Goff {
        self.unit.goff(self.node.entry().offset().into())
    }

    /// Execute f on each direct child node (does not include this node)
    pub fn for_each_child<F>(self, mut f: F) -> cu::Result<()>
    where
        F: for<'t> FnMut(DieNode<'x, 't>) -> cu::Result<()>,
    {
        let parent = self.goff();
        let mut children = self.node.children();
        loop {
            let next = cu::check!(
                children.next(),
                "failed to read the children of entry at {parent} in {}",
                self.unit
            )?;
            let Some(node) = next else {
                return Ok(());
            };
            let child = DieNode {
                node,
                unit: self.unit,
            };
            let offset = child.goff();
            cu::check!(f(child), "failed while processing entry at {offset}, child of {parent}")?;
        }
    }
}

/// One DWARF entry.
///
/// Every accessor funnels through [`Die::attr`], so any read failure names
/// the attribute, the entry offset and the owning unit, and each accessor
/// only decides how to decode the normalised value gimli hands back.
pub struct Die<'x, 'n> {
    pub(crate) unit: &'x Unit,
    pub(crate) entry: Cow<'n, gimli::DebuggingInformationEntry<'x, 'x, In, usize>>,
}

impl<'x> Die<'x, '_> {
    /// Get the global offset of this entry
    pub fn goff(&self) -> Goff {
        self.unit.goff(self.entry.offset().into())
    }

    pub fn tag(&self) -> Tag {
        self.entry.tag()
    }

    /// Read one attribute value, in gimli's normalised form
    fn attr(&self, attr: DwAt) -> cu::Result<Option<AttributeValue<In>>> {
        cu::check!(
            self.entry.attr_value(attr),
            "failed to read {attr} for entry at {} in {}",
            self.goff(),
            self.unit
        )
    }

    /// Unwrap an attribute value that must be present
    fn expect<T>(&self, attr: DwAt, value: Option<T>) -> cu::Result<T> {
        cu::check!(
            value,
            "entry at {} in {} is missing {attr}",
            self.goff(),
            self.unit
        )
    }

    pub fn name(&self) -> cu::Result<String> {
        let name = self.name_opt()?;
        self.expect(DW_AT_name, name)
    }

    pub fn name_opt(&self) -> cu::Result<Option<String>> {
        self.str_opt(DW_AT_name)
    }

    pub fn str_opt(&self, attr: DwAt) -> cu::Result<Option<String>> {
        match self.attr(attr)? {
            None => Ok(None),
            Some(value) => {
                let text = cu::check!(
                    self.unit.attr_string(value),
                    "failed to decode {attr} for entry at {}",
                    self.goff()
                )?;
                Ok(Some(text))
            }
        }
    }

    /// A required integer attribute (enumerator values)
    pub fn int(&self, attr: DwAt) -> cu::Result<i64> {
        match self.attr(attr)? {
            None => self.expect(attr, None),
            Some(value) => match scalar_int(&value) {
                Some(v) => Ok(v),
                None => cu::bail!("expecting integer data for {attr} at {}", self.goff()),
            },
        }
    }

    pub fn uint_opt(&self, attr: DwAt) -> cu::Result<Option<u64>> {
        match self.attr(attr)? {
            None => Ok(None),
            Some(value) => match scalar_uint(&value) {
                Some(v) => Ok(Some(v)),
                None => cu::bail!("expecting unsigned data for {attr} at {}", self.goff()),
            },
        }
    }

    pub fn flag(&self, attr: DwAt) -> cu::Result<bool> {
        match self.attr(attr)? {
            None => Ok(false),
            Some(AttributeValue::Flag(x)) => Ok(x),
            Some(_) => cu::bail!("expecting a flag for {attr} at {}", self.goff()),
        }
    }

    /// Read an attribute expecting any reference form, returning the
    /// referenced entry's global offset
    pub fn ref_opt(&self, ctx: &DwarfContext, attr: DwAt) -> cu::Result<Option<Goff>> {
        match self.attr(attr)? {
            None => Ok(None),
            Some(value) => {
                let goff = ctx.reference_to_goff(self.unit, attr, self.goff(), value)?;
                Ok(Some(goff))
            }
        }
    }

    /// Read a required reference attribute
    pub fn ref_(&self, ctx: &DwarfContext, attr: DwAt) -> cu::Result<Goff> {
        let goff = self.ref_opt(ctx, attr)?;
        self.expect(attr, goff)
    }

    /// DW_AT_const_value as an integer, when it has an integral form.
    /// Block and string forms (aggregate constants) yield None.
    pub fn const_int_opt(&self) -> cu::Result<Option<i64>> {
        Ok(self.attr(DW_AT_const_value)?.as_ref().and_then(scalar_int))
    }

    /// The type signature of a signature-only declaration
    pub fn signature(&self) -> cu::Result<Option<u64>> {
        match self.attr(DW_AT_signature)? {
            None => Ok(None),
            Some(AttributeValue::DebugTypesRef(sig)) => Ok(Some(sig.0)),
            Some(_) => cu::bail!(
                "expecting a type signature for DW_AT_signature at {}",
                self.goff()
            ),
        }
    }

    /// The declaration line of the entry
    pub fn decl_line(&self) -> cu::Result<Option<u64>> {
        self.uint_opt(DW_AT_decl_line)
    }

    /// The declaration file of the entry, resolved through the unit's
    /// line program into an absolute POSIX path
    pub fn decl_file(&self) -> cu::Result<Option<String>> {
        match self.uint_opt(DW_AT_decl_file)? {
            None => Ok(None),
            Some(index) => self.unit.decl_file_path(index),
        }
    }

    /// The declared access of a member, if present
    pub fn access(&self) -> cu::Result<Option<Access>> {
        match self.attr(DW_AT_accessibility)? {
            None => Ok(None),
            Some(AttributeValue::Accessibility(DW_ACCESS_public)) => Ok(Some(Access::Public)),
            Some(AttributeValue::Accessibility(DW_ACCESS_private)) => Ok(Some(Access::Private)),
            Some(AttributeValue::Accessibility(DW_ACCESS_protected)) => {
                Ok(Some(Access::Protected))
            }
            Some(_) => cu::bail!(
                "expecting an access attribute for DW_AT_accessibility at {}",
                self.goff()
            ),
        }
    }

    /// The declared virtuality of a member function or base, if present
    pub fn virtuality(&self) -> cu::Result<Option<Virtuality>> {
        match self.attr(DW_AT_virtuality)? {
            None | Some(AttributeValue::Virtuality(DW_VIRTUALITY_none)) => Ok(None),
            Some(AttributeValue::Virtuality(DW_VIRTUALITY_virtual)) => {
                Ok(Some(Virtuality::Virtual))
            }
            Some(AttributeValue::Virtuality(DW_VIRTUALITY_pure_virtual)) => {
                Ok(Some(Virtuality::PureVirtual))
            }
            Some(_) => cu::bail!(
                "expecting a virtuality for DW_AT_virtuality at {}",
                self.goff()
            ),
        }
    }

    /// Whether the entry carries a "declared inline" inline attribute
    pub fn is_declared_inline(&self) -> cu::Result<bool> {
        match self.attr(DW_AT_inline)? {
            None => Ok(false),
            Some(AttributeValue::Inline(x)) => Ok(matches!(
                x,
                DW_INL_declared_not_inlined | DW_INL_declared_inlined
            )),
            Some(_) => cu::bail!(
                "expecting an inline attribute for DW_AT_inline at {}",
                self.goff()
            ),
        }
    }

    /// Execute f on the name of each attribute present on the entry.
    /// Handlers use this to reject attributes outside their allowlist.
    pub fn for_each_attr<F>(&self, mut f: F) -> cu::Result<()>
    where
        F: FnMut(DwAt) -> cu::Result<()>,
    {
        let offset = self.goff();
        let mut attrs = self.entry.attrs();
        loop {
            let next = cu::check!(
                attrs.next(),
                "failed to read the attributes of entry at {offset}"
            )?;
            let Some(attr) = next else {
                return Ok(());
            };
            // DW_AT_sibling is pure tree structure, never surfaced
            if attr.name() != DW_AT_sibling {
                f(attr.name())?;
            }
        }
    }

    /// Execute f on each direct child node (does not include this node)
    pub fn for_each_child<F>(&self, f: F) -> cu::Result<()>
    where
        F: for<'t> FnMut(DieNode<'x, 't>) -> cu::Result<()>,
    {
        let mut tree = self.unit.tree_at(self.entry.offset().into())?;
        tree.root()?.for_each_child(f)
    }
}

/// The integral attribute forms, signed
fn scalar_int(value: &AttributeValue<In>) -> Option<i64> {
    match value {
        AttributeValue::Data1(x) => Some(*x as i64),
        AttributeValue::Data2(x) => Some(*x as i64),
        AttributeValue::Data4(x) => Some(*x as i64),
        AttributeValue::Data8(x) => Some(*x as i64),
        AttributeValue::Udata(x) => Some(*x as i64),
        AttributeValue::Sdata(x) => Some(*x),
        _ => None,
    }
}

/// The integral attribute forms, unsigned. Line-table file indices and
/// addresses decode here as well.
fn scalar_uint(value: &AttributeValue<In>) -> Option<u64> {
    match value {
        AttributeValue::Data1(x) => Some(*x as u64),
        AttributeValue::Data2(x) => Some(*x as u64),
        AttributeValue::Data4(x) => Some(*x as u64),
        AttributeValue::Data8(x) => Some(*x),
        AttributeValue::Udata(x) => Some(*x),
        AttributeValue::Addr(x) => Some(*x),
        AttributeValue::FileIndex(x) => Some(*x),
        _ => None,
    }
}
