//! Lookups and the compiler that encodes them.
//!
//! A [`Lookup`] groups subtables of one lookup type. The [`LayoutCompiler`] owns the
//! [`LayoutContext`] every subtable was populated against, assigns lookup-list indices and
//! encodes all lookups of both tables along with the variation store their anchors feed.

pub mod anchor;
pub mod coverage;

use bitflags::bitflags;
use log::{debug, warn};

use crate::binary::write::{WriteBinary, WriteBuffer, WriteContext};
use crate::binary::U16Be;
use crate::chaining::ChainingContext;
use crate::context::{LayoutContext, TableKind};
use crate::error::{CompileError, ResolveError, WriteError};
use crate::gpos::{CursivePos, MarkBasePos, SinglePos};
use crate::gsub::{LigatureSubst, MultipleSubst, SingleSubst};
use crate::size;
use crate::variations::DeltaSetAllocator;

use self::coverage::OffsetCursor;

/// State shared by the subtables of one lookup while they encode.
pub struct EncodeContext<'a> {
    pub layout: &'a LayoutContext,
    pub deltas: &'a mut DeltaSetAllocator,
    /// Name of the lookup being encoded, the scope of nested lookup references.
    pub lookup: &'a str,
    pub table: TableKind,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum LookupType {
    SingleSubst,
    MultipleSubst,
    LigatureSubst,
    ChainingSubst,
    SinglePos,
    CursivePos,
    MarkToBase,
    MarkToMark,
    ChainingPos,
}

impl LookupType {
    pub fn table(self) -> TableKind {
        match self {
            LookupType::SingleSubst
            | LookupType::MultipleSubst
            | LookupType::LigatureSubst
            | LookupType::ChainingSubst => TableKind::Gsub,
            LookupType::SinglePos
            | LookupType::CursivePos
            | LookupType::MarkToBase
            | LookupType::MarkToMark
            | LookupType::ChainingPos => TableKind::Gpos,
        }
    }

    /// The `lookupType` field of the lookup table.
    pub fn value(self) -> u16 {
        match self {
            LookupType::SingleSubst => 1,
            LookupType::MultipleSubst => 2,
            LookupType::LigatureSubst => 4,
            LookupType::ChainingSubst => 6,
            LookupType::SinglePos => 1,
            LookupType::CursivePos => 3,
            LookupType::MarkToBase => 4,
            LookupType::MarkToMark => 6,
            LookupType::ChainingPos => 8,
        }
    }

    fn accepts(self, subtable: &Subtable) -> bool {
        matches!(
            (self, subtable),
            (LookupType::SingleSubst, Subtable::SingleSubst(_))
                | (LookupType::MultipleSubst, Subtable::MultipleSubst(_))
                | (LookupType::LigatureSubst, Subtable::LigatureSubst(_))
                | (LookupType::SinglePos, Subtable::SinglePos(_))
                | (LookupType::CursivePos, Subtable::CursivePos(_))
                | (LookupType::MarkToBase, Subtable::MarkBasePos(_))
                | (LookupType::MarkToMark, Subtable::MarkBasePos(_))
                | (LookupType::ChainingSubst, Subtable::Chaining(_))
                | (LookupType::ChainingPos, Subtable::Chaining(_))
        )
    }
}

bitflags! {
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
    pub struct LookupFlag: u16 {
        const RIGHT_TO_LEFT = 0x0001;
        const IGNORE_BASE_GLYPHS = 0x0002;
        const IGNORE_LIGATURES = 0x0004;
        const IGNORE_MARKS = 0x0008;
        const USE_MARK_FILTERING_SET = 0x0010;
        const MARK_ATTACHMENT_TYPE = 0xFF00;
    }
}

#[derive(Clone, Debug)]
pub enum Subtable {
    SingleSubst(SingleSubst),
    MultipleSubst(MultipleSubst),
    LigatureSubst(LigatureSubst),
    SinglePos(SinglePos),
    CursivePos(CursivePos),
    MarkBasePos(MarkBasePos),
    Chaining(ChainingContext),
}

impl Subtable {
    pub fn encode(&self, ecx: &mut EncodeContext<'_>) -> Result<Vec<u8>, CompileError> {
        match self {
            Subtable::SingleSubst(subtable) => subtable.encode(ecx),
            Subtable::MultipleSubst(subtable) => subtable.encode(ecx),
            Subtable::LigatureSubst(subtable) => subtable.encode(ecx),
            Subtable::SinglePos(subtable) => subtable.encode(ecx),
            Subtable::CursivePos(subtable) => subtable.encode(ecx),
            Subtable::MarkBasePos(subtable) => subtable.encode(ecx),
            Subtable::Chaining(subtable) => subtable.encode(ecx),
        }
    }
}

macro_rules! subtable_from {
    ($($variant:ident($ty:ty)),* $(,)?) => {
        $(
            impl From<$ty> for Subtable {
                fn from(subtable: $ty) -> Self {
                    Subtable::$variant(subtable)
                }
            }
        )*
    };
}

subtable_from! {
    SingleSubst(SingleSubst),
    MultipleSubst(MultipleSubst),
    LigatureSubst(LigatureSubst),
    SinglePos(SinglePos),
    CursivePos(CursivePos),
    MarkBasePos(MarkBasePos),
    Chaining(ChainingContext),
}

#[derive(Clone, Debug)]
struct SubtableSlot {
    subtable: Subtable,
    // None until encoded, and again after each change to the subtable
    encoded: Option<Vec<u8>>,
}

#[derive(Clone, Debug)]
pub struct Lookup {
    name: String,
    lookup_type: LookupType,
    flags: LookupFlag,
    mark_filtering_set: Option<u16>,
    slots: Vec<SubtableSlot>,
}

impl Lookup {
    pub fn new(name: impl Into<String>, lookup_type: LookupType, flags: LookupFlag) -> Lookup {
        Lookup {
            name: name.into(),
            lookup_type,
            flags,
            mark_filtering_set: None,
            slots: Vec::new(),
        }
    }

    pub fn with_mark_filtering_set(mut self, set: u16) -> Lookup {
        self.flags |= LookupFlag::USE_MARK_FILTERING_SET;
        self.mark_filtering_set = Some(set);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn lookup_type(&self) -> LookupType {
        self.lookup_type
    }

    pub fn flags(&self) -> LookupFlag {
        self.flags
    }

    pub fn table(&self) -> TableKind {
        self.lookup_type.table()
    }

    /// Append a subtable, which must be of a kind this lookup type holds.
    pub fn push(&mut self, subtable: impl Into<Subtable>) -> Result<(), CompileError> {
        let subtable = subtable.into();
        if !self.lookup_type.accepts(&subtable) {
            return Err(CompileError::SubtableMismatch {
                lookup: self.name.clone(),
            });
        }
        self.slots.push(SubtableSlot {
            subtable,
            encoded: None,
        });
        Ok(())
    }

    pub fn subtables(&self) -> impl Iterator<Item = &Subtable> + '_ {
        self.slots.iter().map(|slot| &slot.subtable)
    }

    /// Mutable access to a subtable. Its cached encoding is discarded.
    pub fn subtable_mut(&mut self, index: usize) -> Option<&mut Subtable> {
        self.slots.get_mut(index).map(|slot| {
            slot.encoded = None;
            &mut slot.subtable
        })
    }

    /// Whether any subtable needs to be encoded again.
    pub fn is_dirty(&self) -> bool {
        self.slots.iter().any(|slot| slot.encoded.is_none())
    }

    /// Encode the lookup table followed by its subtables.
    ///
    /// Subtables encoded by an earlier call and unchanged since are not encoded again.
    pub fn encode(&mut self, layout: &LayoutContext, deltas: &mut DeltaSetAllocator) -> Result<Vec<u8>, CompileError> {
        let table = self.table();
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if slot.encoded.is_some() {
                continue;
            }
            let mut ecx = EncodeContext {
                layout,
                deltas: &mut *deltas,
                lookup: &self.name,
                table,
            };
            let encoded = slot.subtable.encode(&mut ecx).map_err(|error| CompileError::Lookup {
                lookup: self.name.clone(),
                subtable: index,
                error: Box::new(error),
            })?;
            debug!("{} lookup '{}' subtable {}: {} bytes", table, self.name, index, encoded.len());
            slot.encoded = Some(encoded);
        }

        let subtable_count = self.slots.len();
        let header_size = 3 * size::U16
            + subtable_count * size::OFFSET16
            + self.mark_filtering_set.map_or(0, |_| size::U16);
        let mut offsets = OffsetCursor::new(header_size);

        let mut ctxt = WriteBuffer::new();
        U16Be::write(&mut ctxt, self.lookup_type.value())?;
        U16Be::write(&mut ctxt, self.flags.bits())?;
        U16Be::write(&mut ctxt, u16::try_from(subtable_count)?)?;
        for slot in &self.slots {
            let len = slot.encoded.as_ref().map_or(0, Vec::len);
            U16Be::write(&mut ctxt, offsets.advance(len)?)?;
        }
        if let Some(set) = self.mark_filtering_set {
            U16Be::write(&mut ctxt, set)?;
        }
        for encoded in self.slots.iter().filter_map(|slot| slot.encoded.as_ref()) {
            ctxt.write_bytes(encoded)?;
        }
        Ok(ctxt.into_inner())
    }
}

/// The encoded lookups of both tables.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CompiledLayout {
    pub gsub_lookups: Vec<Vec<u8>>,
    pub gpos_lookups: Vec<Vec<u8>>,
    /// ItemVariationStore referenced by variable anchors, if any anchor varies.
    pub variation_store: Option<Vec<u8>>,
}

impl CompiledLayout {
    pub fn lookups(&self, table: TableKind) -> &[Vec<u8>] {
        match table {
            TableKind::Gsub => &self.gsub_lookups,
            TableKind::Gpos => &self.gpos_lookups,
        }
    }

    /// Encode the LookupList of `table`: `lookupCount | offsets | lookups`.
    pub fn lookup_list(&self, table: TableKind) -> Result<Vec<u8>, WriteError> {
        let lookups = self.lookups(table);
        let mut offsets = OffsetCursor::new(size::U16 + lookups.len() * size::OFFSET16);
        let mut ctxt = WriteBuffer::new();
        U16Be::write(&mut ctxt, u16::try_from(lookups.len())?)?;
        for lookup in lookups {
            U16Be::write(&mut ctxt, offsets.advance(lookup.len())?)?;
        }
        for lookup in lookups {
            ctxt.write_bytes(lookup)?;
        }
        Ok(ctxt.into_inner())
    }
}

/// A compile session.
///
/// The delta set allocator lives as long as the compiler so that cached subtable encodings
/// keep referring to valid delta sets when only some lookups are encoded again.
#[derive(Debug)]
pub struct LayoutCompiler {
    context: LayoutContext,
    deltas: DeltaSetAllocator,
    gsub: Vec<Option<Lookup>>,
    gpos: Vec<Option<Lookup>>,
}

impl LayoutCompiler {
    pub fn new(context: LayoutContext) -> LayoutCompiler {
        let deltas = context.delta_set_allocator();
        LayoutCompiler {
            context,
            deltas,
            gsub: Vec::new(),
            gpos: Vec::new(),
        }
    }

    pub fn context(&self) -> &LayoutContext {
        &self.context
    }

    /// Register `name` in the lookup list of `table` ahead of adding the lookup itself, so
    /// that chaining rules populated earlier can refer to it.
    pub fn declare_lookup(&mut self, table: TableKind, name: &str) -> Result<u16, CompileError> {
        Ok(self.context.register_lookup(table, name)?)
    }

    /// Add `lookup` to its table and return its lookup-list index.
    pub fn add_lookup(&mut self, lookup: Lookup) -> Result<u16, CompileError> {
        let table = lookup.table();
        let index = self.context.register_lookup(table, lookup.name())?;
        let slot = usize::from(index);
        let lookups = self.lookups_mut(table);
        if lookups.len() <= slot {
            lookups.resize_with(slot + 1, || None);
        }
        if lookups[slot].is_some() {
            warn!("{} lookup '{}' defined twice, using the later one", table, lookup.name());
        }
        lookups[slot] = Some(lookup);
        Ok(index)
    }

    pub fn lookup(&self, table: TableKind, name: &str) -> Option<&Lookup> {
        self.lookups(table).find(|lookup| lookup.name() == name)
    }

    pub fn lookup_mut(&mut self, table: TableKind, name: &str) -> Option<&mut Lookup> {
        self.lookups_mut(table)
            .iter_mut()
            .flatten()
            .find(|lookup| lookup.name() == name)
    }

    /// The lookups added to `table`, in lookup-list order.
    pub fn lookups(&self, table: TableKind) -> impl Iterator<Item = &Lookup> + '_ {
        let lookups = match table {
            TableKind::Gsub => &self.gsub,
            TableKind::Gpos => &self.gpos,
        };
        lookups.iter().flatten()
    }

    fn lookups_mut(&mut self, table: TableKind) -> &mut Vec<Option<Lookup>> {
        match table {
            TableKind::Gsub => &mut self.gsub,
            TableKind::Gpos => &mut self.gpos,
        }
    }

    /// Encode every lookup of both tables.
    ///
    /// A lookup that was declared but never added is an unknown lookup.
    pub fn compile(&mut self) -> Result<CompiledLayout, CompileError> {
        for table in [TableKind::Gsub, TableKind::Gpos] {
            let declared = self.context.lookup_count(table);
            let lookups = self.lookups_mut(table);
            if lookups.len() < declared {
                lookups.resize_with(declared, || None);
            }
        }

        let mut layout = CompiledLayout::default();
        for (table, lookups, encoded) in [
            (TableKind::Gsub, &mut self.gsub, &mut layout.gsub_lookups),
            (TableKind::Gpos, &mut self.gpos, &mut layout.gpos_lookups),
        ] {
            for (index, lookup) in lookups.iter_mut().enumerate() {
                let lookup = match lookup {
                    Some(lookup) => lookup,
                    None => {
                        let name = self.context.lookup_name(table, index).unwrap_or_default();
                        return Err(CompileError::Resolve(ResolveError::UnknownLookup {
                            owner: table.to_string(),
                            name: name.to_owned(),
                        }));
                    }
                };
                encoded.push(lookup.encode(&self.context, &mut self.deltas)?);
            }
            debug!("{}: {} lookups", table, encoded.len());
        }

        if !self.deltas.is_empty() {
            debug!(
                "variation store: {} delta sets over {} regions",
                self.deltas.delta_set_count(),
                self.deltas.region_count()
            );
            layout.variation_store = Some(self.deltas.write_store()?);
        }
        Ok(layout)
    }
}
