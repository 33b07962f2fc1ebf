//! Glyph positioning (`gpos`) subtables.
//!
//! > The Glyph Positioning table (GPOS) provides precise control over glyph placement for
//! > sophisticated text layout and rendering in each script and language system that a font
//! > supports.
//!
//! <https://docs.microsoft.com/en-us/typography/opentype/spec/gpos>
//!
//! Cursive and mark attachment anchors may depend on how far a glyph is elongated. Such
//! anchors are encoded as variable anchors, see [`variable_anchor`].

use std::collections::BTreeMap;
use std::fmt;

use indexmap::IndexMap;
use log::{debug, warn};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::binary::write::{offset16, WriteBinary, WriteBuffer, WriteContext};
use crate::binary::{I16Be, U16Be};
use crate::classes::GlyphSet;
use crate::context::{AnchorFn, LayoutContext};
use crate::error::{CompileError, WriteError};
use crate::glyph::{GlyphId, Point};
use crate::layout::anchor::{variable_anchor, AnchorTable};
use crate::layout::coverage::{Coverage, OffsetCursor};
use crate::layout::EncodeContext;
use crate::size;
use crate::variations::DeltaSetAllocator;

/// Value format with all of xPlacement, yPlacement, xAdvance and yAdvance present.
pub const VALUE_FORMAT_ALL: u16 = 0x000F;

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(from = "[i16; 4]", into = "[i16; 4]")]
pub struct ValueRecord {
    pub x_placement: i16,
    pub y_placement: i16,
    pub x_advance: i16,
    pub y_advance: i16,
}

impl ValueRecord {
    pub fn is_zero(&self) -> bool {
        *self == ValueRecord::default()
    }

    pub fn checked_add(self, other: ValueRecord) -> Result<ValueRecord, WriteError> {
        let add = |a: i16, b: i16| a.checked_add(b).ok_or(WriteError::BadValue);
        Ok(ValueRecord {
            x_placement: add(self.x_placement, other.x_placement)?,
            y_placement: add(self.y_placement, other.y_placement)?,
            x_advance: add(self.x_advance, other.x_advance)?,
            y_advance: add(self.y_advance, other.y_advance)?,
        })
    }
}

impl From<[i16; 4]> for ValueRecord {
    fn from([x_placement, y_placement, x_advance, y_advance]: [i16; 4]) -> Self {
        ValueRecord {
            x_placement,
            y_placement,
            x_advance,
            y_advance,
        }
    }
}

impl From<ValueRecord> for [i16; 4] {
    fn from(record: ValueRecord) -> Self {
        [
            record.x_placement,
            record.y_placement,
            record.x_advance,
            record.y_advance,
        ]
    }
}

impl WriteBinary for ValueRecord {
    type Output = ();

    fn write<C: WriteContext>(ctxt: &mut C, record: ValueRecord) -> Result<(), WriteError> {
        I16Be::write(ctxt, record.x_placement)?;
        I16Be::write(ctxt, record.y_placement)?;
        I16Be::write(ctxt, record.x_advance)?;
        I16Be::write(ctxt, record.y_advance)?;
        Ok(())
    }
}

/// Value records by class name, `{ "class": [xPlacement, yPlacement, xAdvance, yAdvance] }`.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(transparent)]
pub struct SinglePosRule {
    pub records: IndexMap<String, ValueRecord>,
}

/// Per-glyph adjustments added to the value records of a `SinglePos`.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct SinglePosParameters {
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub parameters: IndexMap<String, ValueRecord>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SinglePos {
    records: BTreeMap<GlyphId, ValueRecord>,
    parameters: BTreeMap<GlyphId, ValueRecord>,
}

impl SinglePos {
    pub fn populate(rule: &SinglePosRule, context: &LayoutContext) -> Result<SinglePos, CompileError> {
        let mut records = BTreeMap::new();
        for (class, record) in &rule.records {
            for &glyph in context.resolve_class(class)?.iter() {
                records.insert(glyph, *record);
            }
        }
        Ok(SinglePos {
            records,
            parameters: BTreeMap::new(),
        })
    }

    pub fn set_parameter(&mut self, glyph: GlyphId, adjustment: ValueRecord) {
        self.parameters.insert(glyph, adjustment);
    }

    pub fn read_parameters(&mut self, parameters: &SinglePosParameters, context: &LayoutContext) -> Result<(), CompileError> {
        for (glyph, adjustment) in &parameters.parameters {
            self.parameters.insert(context.glyph_id(glyph)?, *adjustment);
        }
        Ok(())
    }

    pub fn save_parameters(&self, context: &LayoutContext) -> Result<SinglePosParameters, CompileError> {
        let mut parameters = IndexMap::new();
        for (&glyph, adjustment) in &self.parameters {
            if !adjustment.is_zero() {
                parameters.insert(context.glyph_name(glyph)?.to_owned(), *adjustment);
            }
        }
        Ok(SinglePosParameters { parameters })
    }

    pub fn encode(&self, _ecx: &mut EncodeContext<'_>) -> Result<Vec<u8>, CompileError> {
        let mut ctxt = WriteBuffer::new();
        U16Be::write(&mut ctxt, 2u16)?; // format
        let coverage_offset = ctxt.placeholder::<U16Be, _>()?;
        U16Be::write(&mut ctxt, VALUE_FORMAT_ALL)?;
        U16Be::write(&mut ctxt, u16::try_from(self.records.len())?)?;
        for (glyph, record) in &self.records {
            let record = match self.parameters.get(glyph) {
                Some(adjustment) => record.checked_add(*adjustment)?,
                None => *record,
            };
            ValueRecord::write(&mut ctxt, record)?;
        }
        ctxt.write_placeholder(coverage_offset, offset16(&ctxt, 0)?)?;
        Coverage::write(&mut ctxt, &Coverage::new(self.records.keys().copied()))?;
        Ok(ctxt.into_inner())
    }
}

/// An explicit anchor point or the name of an anchor of the glyph.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum AnchorRef {
    Point(Point),
    Name(String),
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct EntryExitRule {
    #[serde(default)]
    pub entry: Option<AnchorRef>,
    #[serde(default)]
    pub exit: Option<AnchorRef>,
}

/// Entry and exit anchors by class name.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct CursiveRule {
    #[serde(default)]
    pub anchors: IndexMap<String, EntryExitRule>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EntryExit {
    pub entry: Option<Point>,
    pub exit: Option<Point>,
    pub entry_name: Option<String>,
    pub exit_name: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CursiveParameters {
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub entry_parameters: IndexMap<String, Point>,
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub exit_parameters: IndexMap<String, Point>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Side {
    Entry,
    Exit,
}

#[derive(Clone, Debug, PartialEq)]
pub struct CursivePos {
    name: String,
    anchors: BTreeMap<GlyphId, EntryExit>,
    entry_parameters: BTreeMap<GlyphId, Point>,
    exit_parameters: BTreeMap<GlyphId, Point>,
}

impl CursivePos {
    /// Build a cursive subtable. Alternate shapes are searched for an anchor called `name`
    /// when the entry or exit anchor has no name of its own.
    pub fn populate(
        name: impl Into<String>,
        rule: &CursiveRule,
        context: &LayoutContext,
    ) -> Result<CursivePos, CompileError> {
        let mut anchors = BTreeMap::new();
        for (class, entry_exit) in &rule.anchors {
            let mut value = EntryExit::default();
            match &entry_exit.entry {
                Some(AnchorRef::Point(point)) => value.entry = Some(*point),
                Some(AnchorRef::Name(name)) => value.entry_name = Some(name.clone()),
                None => {}
            }
            match &entry_exit.exit {
                Some(AnchorRef::Point(point)) => value.exit = Some(*point),
                Some(AnchorRef::Name(name)) => value.exit_name = Some(name.clone()),
                None => {}
            }
            for &glyph in context.resolve_class(class)?.iter() {
                anchors.insert(glyph, value.clone());
            }
        }
        Ok(CursivePos {
            name: name.into(),
            anchors,
            entry_parameters: BTreeMap::new(),
            exit_parameters: BTreeMap::new(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn read_parameters(&mut self, parameters: &CursiveParameters, context: &LayoutContext) -> Result<(), CompileError> {
        for (glyph, adjustment) in &parameters.entry_parameters {
            self.entry_parameters.insert(context.glyph_id(glyph)?, *adjustment);
        }
        for (glyph, adjustment) in &parameters.exit_parameters {
            self.exit_parameters.insert(context.glyph_id(glyph)?, *adjustment);
        }
        Ok(())
    }

    pub fn save_parameters(&self, context: &LayoutContext) -> Result<CursiveParameters, CompileError> {
        let named = |adjustments: &BTreeMap<GlyphId, Point>| -> Result<IndexMap<String, Point>, CompileError> {
            let mut named = IndexMap::new();
            for (&glyph, adjustment) in adjustments {
                if !adjustment.is_zero() {
                    named.insert(context.glyph_name(glyph)?.to_owned(), *adjustment);
                }
            }
            Ok(named)
        };
        Ok(CursiveParameters {
            entry_parameters: named(&self.entry_parameters)?,
            exit_parameters: named(&self.exit_parameters)?,
        })
    }

    /// The entry anchor of `glyph` at the given elongation.
    pub fn entry(&self, glyph: GlyphId, left: f64, right: f64, context: &LayoutContext) -> Result<Option<Point>, CompileError> {
        match self.base_anchor(Side::Entry, glyph, context)? {
            Some(base) => self.anchor_at(Side::Entry, glyph, base, left, right, context).map(Some),
            None => Ok(None),
        }
    }

    /// The exit anchor of `glyph` at the given elongation.
    pub fn exit(&self, glyph: GlyphId, left: f64, right: f64, context: &LayoutContext) -> Result<Option<Point>, CompileError> {
        match self.base_anchor(Side::Exit, glyph, context)? {
            Some(base) => self.anchor_at(Side::Exit, glyph, base, left, right, context).map(Some),
            None => Ok(None),
        }
    }

    // Explicit point, else the named anchor of the glyph's default shape
    fn base_anchor(&self, side: Side, glyph: GlyphId, context: &LayoutContext) -> Result<Option<Point>, CompileError> {
        let entry_exit = match self.anchors.get(&glyph) {
            Some(entry_exit) => entry_exit,
            None => return Ok(None),
        };
        let (point, name) = match side {
            Side::Entry => (entry_exit.entry, &entry_exit.entry_name),
            Side::Exit => (entry_exit.exit, &entry_exit.exit_name),
        };
        match (point, name) {
            (Some(point), _) => Ok(Some(point)),
            (None, Some(name)) => Ok(context.shape(glyph, 0.0, 0.0)?.anchor(name)),
            (None, None) => Ok(None),
        }
    }

    fn anchor_at(
        &self,
        side: Side,
        glyph: GlyphId,
        base: Point,
        left: f64,
        right: f64,
        context: &LayoutContext,
    ) -> Result<Point, CompileError> {
        let adjustment = match side {
            Side::Entry => self.entry_parameters.get(&glyph),
            Side::Exit => self.exit_parameters.get(&glyph),
        }
        .copied()
        .unwrap_or_default();
        if left == 0.0 && right == 0.0 {
            return Ok(base + adjustment);
        }

        let alternate = context.shape(glyph, left, right)?;
        let side_name = self.anchors.get(&glyph).and_then(|entry_exit| match side {
            Side::Entry => entry_exit.entry_name.as_deref(),
            Side::Exit => entry_exit.exit_name.as_deref(),
        });
        let derived = side_name
            .and_then(|name| alternate.anchor(name))
            .or_else(|| alternate.anchor(&self.name));
        match (derived, side) {
            // The alternate's own anchor replaces the adjusted one
            (Some(point), _) => Ok(point),
            // The entry follows the change in advance width of the alternate
            (None, Side::Entry) => {
                let default = context.shape(glyph, 0.0, 0.0)?;
                let shift = (alternate.width - default.width).round() as i32;
                Ok(base + adjustment + Point::new(shift, 0))
            }
            (None, Side::Exit) => Ok(base + adjustment),
        }
    }

    fn anchor_table(
        &self,
        side: Side,
        glyph: GlyphId,
        context: &LayoutContext,
        deltas: &mut DeltaSetAllocator,
    ) -> Result<Option<AnchorTable>, CompileError> {
        let base = match self.base_anchor(side, glyph, context)? {
            Some(base) => base,
            None => return Ok(None),
        };
        let default = self.anchor_at(side, glyph, base, 0.0, 0.0, context)?;
        let glyph_name = context.glyph_name(glyph)?;
        let anchor = variable_anchor(context, deltas, glyph_name, default, |left, right| {
            self.anchor_at(side, glyph, base, left, right, context)
        })?;
        Ok(Some(anchor))
    }

    pub fn encode(&self, ecx: &mut EncodeContext<'_>) -> Result<Vec<u8>, CompileError> {
        let mut records = Vec::with_capacity(self.anchors.len());
        for &glyph in self.anchors.keys() {
            let entry = self.anchor_table(Side::Entry, glyph, ecx.layout, ecx.deltas)?;
            let exit = self.anchor_table(Side::Exit, glyph, ecx.layout, ecx.deltas)?;
            records.push((entry, exit));
        }

        let count = self.anchors.len();
        let coverage = Coverage::new(self.anchors.keys().copied());
        let coverage_offset = 3 * size::U16 + count * 2 * size::OFFSET16;
        let mut anchor_offsets = OffsetCursor::new(coverage_offset + coverage.size());

        let mut ctxt = WriteBuffer::new();
        U16Be::write(&mut ctxt, 1u16)?; // format
        U16Be::write(&mut ctxt, u16::try_from(coverage_offset)?)?;
        U16Be::write(&mut ctxt, u16::try_from(count)?)?;
        for (entry, exit) in &records {
            for anchor in [entry, exit] {
                // An absent anchor is a null offset, not an anchor at the origin
                let offset = match anchor {
                    Some(anchor) => anchor_offsets.advance(anchor.size())?,
                    None => 0,
                };
                U16Be::write(&mut ctxt, offset)?;
            }
        }
        Coverage::write(&mut ctxt, &coverage)?;
        for anchor in records.iter().flat_map(|(entry, exit)| [entry, exit]).flatten() {
            AnchorTable::write(&mut ctxt, anchor)?;
        }
        debug!("cursive subtable '{}': {} glyphs, {} bytes", self.name, count, ctxt.len());
        Ok(ctxt.into_inner())
    }
}

/// One glyph name or a list of them.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum GlyphNames {
    One(String),
    Many(Vec<String>),
}

impl GlyphNames {
    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        let names: &[String] = match self {
            GlyphNames::One(name) => std::slice::from_ref(name),
            GlyphNames::Many(names) => names,
        };
        names.iter().map(String::as_str)
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct MarkClassRule {
    pub mark: GlyphNames,
    #[serde(default)]
    pub basefunction: Option<String>,
    #[serde(default)]
    pub markfunction: Option<String>,
    #[serde(default)]
    pub baseparameters: IndexMap<String, Point>,
    #[serde(default)]
    pub markparameters: IndexMap<String, Point>,
    #[serde(default)]
    pub baseanchors: IndexMap<String, Point>,
    #[serde(default)]
    pub markanchors: IndexMap<String, Point>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct MarkBaseRule {
    pub base: GlyphNames,
    pub classes: IndexMap<String, MarkClassRule>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct MarkClassParameters {
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub baseparameters: IndexMap<String, Point>,
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub markparameters: IndexMap<String, Point>,
}

/// Adjustments by mark class name.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(transparent)]
pub struct MarkBaseParameters {
    pub classes: IndexMap<String, MarkClassParameters>,
}

#[derive(Clone)]
struct NamedAnchorFn {
    name: String,
    function: AnchorFn,
}

impl fmt::Debug for NamedAnchorFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AnchorFn({})", self.name)
    }
}

impl NamedAnchorFn {
    fn resolve(name: &Option<String>, context: &LayoutContext) -> Result<Option<NamedAnchorFn>, CompileError> {
        match name {
            Some(name) => Ok(Some(NamedAnchorFn {
                name: name.clone(),
                function: context.anchor_function(name)?,
            })),
            None => Ok(None),
        }
    }
}

/// Anchors of one side (base or mark) of a mark class.
#[derive(Clone, Debug, Default)]
struct ClassAnchors {
    function: Option<NamedAnchorFn>,
    anchors: IndexMap<String, Point>,
    parameters: IndexMap<String, Point>,
}

impl ClassAnchors {
    // Adjustment, plus the explicit anchor if there is one, else what the function computes
    // from the adjustment
    fn anchor_table(
        &self,
        class_name: &str,
        glyph: &str,
        context: &LayoutContext,
        deltas: &mut DeltaSetAllocator,
    ) -> Result<AnchorTable, CompileError> {
        let adjustment = self.parameters.get(glyph).copied().unwrap_or_default();
        match (self.anchors.get(glyph), &self.function) {
            (Some(anchor), _) => Ok(AnchorTable::fixed(adjustment + *anchor)?),
            (None, Some(NamedAnchorFn { function, .. })) => {
                let default = function(glyph, class_name, adjustment, 0.0, 0.0);
                variable_anchor(context, deltas, glyph, default, |left, right| {
                    Ok(function(glyph, class_name, adjustment, left, right))
                })
            }
            (None, None) => Ok(AnchorTable::fixed(adjustment)?),
        }
    }
}

#[derive(Clone, Debug)]
pub struct MarkClass {
    marks: GlyphSet,
    base: ClassAnchors,
    mark: ClassAnchors,
}

impl MarkClass {
    pub fn marks(&self) -> &GlyphSet {
        &self.marks
    }
}

/// Mark-to-base attachment, also used for mark-to-mark attachment.
#[derive(Clone, Debug)]
pub struct MarkBasePos {
    base_glyphs: Vec<GlyphId>,
    classes: BTreeMap<String, MarkClass>,
    mark_classes: BTreeMap<GlyphId, u16>,
}

impl MarkBasePos {
    pub fn populate(rule: &MarkBaseRule, context: &LayoutContext) -> Result<MarkBasePos, CompileError> {
        let base_glyphs = context.resolve_classes(rule.base.names())?;

        let mut classes = BTreeMap::new();
        for (name, class) in &rule.classes {
            let marks = context.resolve_classes(class.mark.names())?;
            let mark_class = MarkClass {
                marks,
                base: ClassAnchors {
                    function: NamedAnchorFn::resolve(&class.basefunction, context)?,
                    anchors: class.baseanchors.clone(),
                    parameters: class.baseparameters.clone(),
                },
                mark: ClassAnchors {
                    function: NamedAnchorFn::resolve(&class.markfunction, context)?,
                    anchors: class.markanchors.clone(),
                    parameters: class.markparameters.clone(),
                },
            };
            classes.insert(name.clone(), mark_class);
        }

        // Classes are numbered in name order
        let mut mark_classes = BTreeMap::new();
        let mut owners: FxHashMap<GlyphId, &str> = FxHashMap::default();
        for (index, (name, class)) in classes.iter().enumerate() {
            let index = u16::try_from(index)?;
            for &mark in &class.marks {
                if let Some(previous) = owners.insert(mark, name) {
                    warn!(
                        "mark glyph {} is in classes '{}' and '{}', using '{}'",
                        mark, previous, name, name
                    );
                }
                mark_classes.insert(mark, index);
            }
        }

        Ok(MarkBasePos {
            base_glyphs: base_glyphs.into_iter().collect(),
            classes,
            mark_classes,
        })
    }

    /// Sorted base glyphs, the union of the base classes.
    pub fn base_glyphs(&self) -> &[GlyphId] {
        &self.base_glyphs
    }

    pub fn class_names(&self) -> impl Iterator<Item = &str> + '_ {
        self.classes.keys().map(String::as_str)
    }

    pub fn class(&self, name: &str) -> Option<&MarkClass> {
        self.classes.get(name)
    }

    pub fn read_parameters(&mut self, parameters: &MarkBaseParameters) {
        for (name, class_parameters) in &parameters.classes {
            match self.classes.get_mut(name) {
                Some(class) => {
                    class
                        .base
                        .parameters
                        .extend(class_parameters.baseparameters.iter().map(|(g, p)| (g.clone(), *p)));
                    class
                        .mark
                        .parameters
                        .extend(class_parameters.markparameters.iter().map(|(g, p)| (g.clone(), *p)));
                }
                None => warn!("parameters for unknown mark class '{}' ignored", name),
            }
        }
    }

    pub fn save_parameters(&self) -> MarkBaseParameters {
        let non_zero = |parameters: &IndexMap<String, Point>| -> IndexMap<String, Point> {
            parameters
                .iter()
                .filter(|(_, point)| !point.is_zero())
                .map(|(glyph, point)| (glyph.clone(), *point))
                .collect()
        };
        let mut classes = IndexMap::new();
        for (name, class) in &self.classes {
            let class_parameters = MarkClassParameters {
                baseparameters: non_zero(&class.base.parameters),
                markparameters: non_zero(&class.mark.parameters),
            };
            if class_parameters != MarkClassParameters::default() {
                classes.insert(name.clone(), class_parameters);
            }
        }
        MarkBaseParameters { classes }
    }

    pub fn encode(&self, ecx: &mut EncodeContext<'_>) -> Result<Vec<u8>, CompileError> {
        let context = ecx.layout;

        // Base anchors are resolved, and their delta sets allocated, before the mark anchors
        let mut base_anchors = Vec::with_capacity(self.base_glyphs.len() * self.classes.len());
        for &base in &self.base_glyphs {
            let base_name = context.glyph_name(base)?;
            for (class_name, class) in &self.classes {
                base_anchors.push(class.base.anchor_table(class_name, base_name, context, ecx.deltas)?);
            }
        }

        let class_names: Vec<&String> = self.classes.keys().collect();
        let mut mark_anchors = Vec::with_capacity(self.mark_classes.len());
        for (&mark, &class_index) in &self.mark_classes {
            let class_name = class_names[usize::from(class_index)];
            let class = &self.classes[class_name];
            let mark_name = context.glyph_name(mark)?;
            mark_anchors.push((
                class_index,
                class.mark.anchor_table(class_name, mark_name, context, ecx.deltas)?,
            ));
        }

        let mut ctxt = WriteBuffer::new();
        U16Be::write(&mut ctxt, 1u16)?; // format
        let mark_coverage_offset = ctxt.placeholder::<U16Be, _>()?;
        let base_coverage_offset = ctxt.placeholder::<U16Be, _>()?;
        U16Be::write(&mut ctxt, u16::try_from(self.classes.len())?)?;
        let mark_array_offset = ctxt.placeholder::<U16Be, _>()?;
        let base_array_offset = ctxt.placeholder::<U16Be, _>()?;

        ctxt.write_placeholder(mark_coverage_offset, offset16(&ctxt, 0)?)?;
        Coverage::write(&mut ctxt, &Coverage::new(self.mark_classes.keys().copied()))?;
        ctxt.write_placeholder(base_coverage_offset, offset16(&ctxt, 0)?)?;
        Coverage::write(&mut ctxt, &Coverage::new(self.base_glyphs.iter().copied()))?;

        // MarkArray, anchor offsets relative to the MarkArray
        ctxt.write_placeholder(mark_array_offset, offset16(&ctxt, 0)?)?;
        let mark_count = mark_anchors.len();
        let mut offsets = OffsetCursor::new(size::U16 + mark_count * 2 * size::U16);
        U16Be::write(&mut ctxt, u16::try_from(mark_count)?)?;
        for (class_index, anchor) in &mark_anchors {
            U16Be::write(&mut ctxt, *class_index)?;
            U16Be::write(&mut ctxt, offsets.advance(anchor.size())?)?;
        }
        for (_, anchor) in &mark_anchors {
            AnchorTable::write(&mut ctxt, anchor)?;
        }

        // BaseArray, base-major, class-minor
        ctxt.write_placeholder(base_array_offset, offset16(&ctxt, 0)?)?;
        let mut offsets = OffsetCursor::new(size::U16 + base_anchors.len() * size::OFFSET16);
        U16Be::write(&mut ctxt, u16::try_from(self.base_glyphs.len())?)?;
        for anchor in &base_anchors {
            U16Be::write(&mut ctxt, offsets.advance(anchor.size())?)?;
        }
        for anchor in &base_anchors {
            AnchorTable::write(&mut ctxt, anchor)?;
        }

        debug!(
            "mark attachment subtable: {} marks, {} bases, {} classes, {} bytes",
            mark_count,
            self.base_glyphs.len(),
            self.classes.len(),
            ctxt.len()
        );
        Ok(ctxt.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binary::read::ReadScope;
    use crate::context::TableKind;
    use crate::error::ResolveError;
    use crate::glyph::{GlyphShape, ShapeTable};
    use crate::tests::{encode_with, layout_context};
    use crate::variations::{AxisLimits, DeltaSetIndex};
    use std::rc::Rc;

    #[test]
    fn test_single_pos_with_parameters() {
        let context = layout_context();
        let rule: SinglePosRule = serde_json::from_str(
            r#"{ "fatha": [0, 10, 0, 0], "beh.init": [5, 0, 100, 0] }"#,
        )
        .unwrap();
        let mut pos = SinglePos::populate(&rule, &context).unwrap();
        let parameters: SinglePosParameters =
            serde_json::from_str(r#"{ "parameters": { "fatha": [1, 2, 3, 4] } }"#).unwrap();
        pos.read_parameters(&parameters, &context).unwrap();
        let data = encode_with(&context, TableKind::Gpos, |ecx| pos.encode(ecx)).unwrap();

        let scope = ReadScope::new(&data);
        let mut ctxt = scope.ctxt();
        assert_eq!(ctxt.read_u16be().unwrap(), 2);
        let coverage_offset = usize::from(ctxt.read_u16be().unwrap());
        assert_eq!(coverage_offset, 8 + 8 * 2);
        assert_eq!(ctxt.read_u16be().unwrap(), VALUE_FORMAT_ALL);
        assert_eq!(ctxt.read_u16be().unwrap(), 2);
        let values: Vec<i16> = (0..8).map(|_| ctxt.read_i16be().unwrap()).collect();
        assert_eq!(values, vec![5, 0, 100, 0, 1, 12, 3, 4]);
        let coverage = scope.offset(coverage_offset).read::<Coverage>().unwrap();
        assert_eq!(coverage.glyphs(), &[2, 9]);

        assert_eq!(pos.save_parameters(&context).unwrap(), parameters);
    }

    #[test]
    fn test_single_pos_overflow() {
        let context = layout_context();
        let rule: SinglePosRule = serde_json::from_str(r#"{ "fatha": [0, 32000, 0, 0] }"#).unwrap();
        let mut pos = SinglePos::populate(&rule, &context).unwrap();
        pos.set_parameter(9, ValueRecord::from([0, 1000, 0, 0]));
        assert_eq!(
            encode_with(&context, TableKind::Gpos, |ecx| pos.encode(ecx)),
            Err(CompileError::Write(WriteError::BadValue))
        );
    }

    #[test]
    fn test_cursive_null_anchor() {
        let context = layout_context();
        let rule: CursiveRule = serde_json::from_str(
            r#"{
                "anchors": {
                    "beh.medi": { "entry": [0, 0] },
                    "hah.isol": { "entry": "missing" }
                }
            }"#,
        )
        .unwrap();
        let mut shapes = ShapeTable::new();
        shapes.insert(4, 0.0, 0.0, GlyphShape::new(4, 300.0));
        let context = context.with_shapes(shapes);
        let cursive = CursivePos::populate("cursive", &rule, &context).unwrap();
        let data = encode_with(&context, TableKind::Gpos, |ecx| cursive.encode(ecx)).unwrap();

        let scope = ReadScope::new(&data);
        let mut ctxt = scope.ctxt();
        assert_eq!(ctxt.read_u16be().unwrap(), 1);
        let coverage_offset = usize::from(ctxt.read_u16be().unwrap());
        assert_eq!(coverage_offset, 6 + 4 * 2);
        assert_eq!(ctxt.read_u16be().unwrap(), 2);
        let offsets = ctxt.read_u16be_vec(4).unwrap();
        let anchors_start = coverage_offset + Coverage::size_for(2);
        // beh.medi: entry at the origin, no exit; hah.isol: its named anchor does not exist
        assert_eq!(offsets, vec![anchors_start as u16, 0, 0, 0]);
        assert_eq!(
            scope.offset(anchors_start).read::<AnchorTable>(),
            Ok(AnchorTable::Format1 { x: 0, y: 0 })
        );
    }

    #[test]
    fn test_cursive_entry_fallback_and_exit() {
        let mut context = layout_context();
        context
            .axis_limits
            .insert("beh.init", AxisLimits::new(-1.0, 2.0, 0.0, 0.0));
        let mut shapes = ShapeTable::new();
        shapes.insert(2, 0.0, 0.0, GlyphShape::new(2, 200.0).with_anchor("exit", Point::new(10, 20)));
        shapes.insert(2, 2.0, 0.0, GlyphShape::new(2, 260.0).with_anchor("exit", Point::new(15, 20)));
        shapes.insert(2, -1.0, 0.0, GlyphShape::new(2, 180.0));
        let context = context.with_shapes(shapes);

        let rule: CursiveRule = serde_json::from_str(
            r#"{ "anchors": { "beh.init": { "entry": [200, 40], "exit": "exit" } } }"#,
        )
        .unwrap();
        let mut cursive = CursivePos::populate("cursive", &rule, &context).unwrap();
        cursive
            .read_parameters(
                &serde_json::from_str(r#"{ "entryParameters": { "beh.init": [0, 5] } }"#).unwrap(),
                &context,
            )
            .unwrap();

        // Entry shifts with the advance width, exit keeps its position without a named anchor
        assert_eq!(cursive.entry(2, 0.0, 0.0, &context), Ok(Some(Point::new(200, 45))));
        assert_eq!(cursive.entry(2, 2.0, 0.0, &context), Ok(Some(Point::new(260, 45))));
        assert_eq!(cursive.entry(2, -1.0, 0.0, &context), Ok(Some(Point::new(180, 45))));
        assert_eq!(cursive.exit(2, 2.0, 0.0, &context), Ok(Some(Point::new(15, 20))));
        assert_eq!(cursive.exit(2, -1.0, 0.0, &context), Ok(Some(Point::new(10, 20))));

        let data = encode_with(&context, TableKind::Gpos, |ecx| cursive.encode(ecx)).unwrap();
        let scope = ReadScope::new(&data);
        let mut ctxt = scope.ctxt();
        ctxt.read_u16be_vec(3).unwrap();
        let offsets = ctxt.read_u16be_vec(2).unwrap();
        assert_eq!(offsets[1] - offsets[0], 22);
        assert_eq!(
            scope.offset(usize::from(offsets[0])).read::<AnchorTable>(),
            Ok(AnchorTable::Format3 {
                x: 200,
                y: 45,
                x_variation: DeltaSetIndex { outer: 0, inner: 0 },
                y_variation: DeltaSetIndex { outer: 0, inner: 1 },
            })
        );
        assert!(matches!(
            scope.offset(usize::from(offsets[1])).read::<AnchorTable>(),
            Ok(AnchorTable::Format3 { x: 10, y: 20, .. })
        ));
    }

    #[test]
    fn test_cursive_alternate_anchor_ignores_parameters() {
        let mut context = layout_context();
        context
            .axis_limits
            .insert("beh.init", AxisLimits::new(0.0, 2.0, 0.0, 0.0));
        let mut shapes = ShapeTable::new();
        shapes.insert(2, 0.0, 0.0, GlyphShape::new(2, 200.0));
        shapes.insert(2, 2.0, 0.0, GlyphShape::new(2, 260.0).with_anchor("cursive", Point::new(300, 40)));
        let context = context.with_shapes(shapes);

        let rule: CursiveRule =
            serde_json::from_str(r#"{ "anchors": { "beh.init": { "entry": [200, 40] } } }"#).unwrap();
        let mut cursive = CursivePos::populate("cursive", &rule, &context).unwrap();
        cursive
            .read_parameters(
                &serde_json::from_str(r#"{ "entryParameters": { "beh.init": [0, 5] } }"#).unwrap(),
                &context,
            )
            .unwrap();

        assert_eq!(cursive.entry(2, 0.0, 0.0, &context), Ok(Some(Point::new(200, 45))));
        assert_eq!(cursive.entry(2, 2.0, 0.0, &context), Ok(Some(Point::new(300, 40))));

        // The variation runs from the adjusted default to the alternate's anchor
        let data = encode_with(&context, TableKind::Gpos, |ecx| cursive.encode(ecx)).unwrap();
        let scope = ReadScope::new(&data);
        let mut ctxt = scope.ctxt();
        ctxt.read_u16be_vec(3).unwrap();
        let entry_offset = ctxt.read_u16be().unwrap();
        assert!(matches!(
            scope.offset(usize::from(entry_offset)).read::<AnchorTable>(),
            Ok(AnchorTable::Format3 { x: 200, y: 45, .. })
        ));
    }

    #[test]
    fn test_cursive_parameters_round_trip() {
        let context = layout_context();
        let cursive_rule = CursiveRule::default();
        let mut cursive = CursivePos::populate("cursive", &cursive_rule, &context).unwrap();
        let parameters: CursiveParameters = serde_json::from_str(
            r#"{ "exitParameters": { "noon.fina": [3, -2], "beh.medi": [0, 0] } }"#,
        )
        .unwrap();
        cursive.read_parameters(&parameters, &context).unwrap();
        let saved = cursive.save_parameters(&context).unwrap();
        assert_eq!(
            serde_json::to_string(&saved).unwrap(),
            r#"{"exitParameters":{"noon.fina":[3,-2]}}"#
        );
    }

    #[test]
    fn test_mark_base_classes_in_name_order() {
        let mut context = layout_context();
        context.register_anchor_function(
            "above",
            Rc::new(|_: &str, _: &str, adjustment: Point, _: f64, _: f64| adjustment + Point::new(50, 400)),
        );
        let rule: MarkBaseRule = serde_json::from_str(
            r#"{
                "base": ["beh.init", "meem.fina"],
                "classes": {
                    "top": { "mark": ["fatha", "shadda"], "basefunction": "above", "markanchors": { "fatha": [5, 5] } },
                    "bottom": { "mark": "kasra", "baseanchors": { "beh.init": [60, -80] }, "baseparameters": { "beh.init": [1, 1] } }
                }
            }"#,
        )
        .unwrap();
        let markbase = MarkBasePos::populate(&rule, &context).unwrap();
        assert_eq!(markbase.class_names().collect::<Vec<_>>(), vec!["bottom", "top"]);
        assert_eq!(markbase.base_glyphs(), &[2, 5]);

        let data = encode_with(&context, TableKind::Gpos, |ecx| markbase.encode(ecx)).unwrap();
        let scope = ReadScope::new(&data);
        let mut ctxt = scope.ctxt();
        assert_eq!(ctxt.read_u16be().unwrap(), 1);
        let header = ctxt.read_u16be_vec(5).unwrap();
        assert_eq!(header[0], 12);
        assert_eq!(header[2], 2);
        let mark_coverage = scope.offset(usize::from(header[0])).read::<Coverage>().unwrap();
        assert_eq!(mark_coverage.glyphs(), &[9, 10, 11]);
        let base_coverage = scope.offset(usize::from(header[1])).read::<Coverage>().unwrap();
        assert_eq!(base_coverage.glyphs(), &[2, 5]);

        let mark_array = scope.offset(usize::from(header[3]));
        let mut ctxt = mark_array.ctxt();
        assert_eq!(ctxt.read_u16be().unwrap(), 3);
        let records = ctxt.read_u16be_vec(6).unwrap();
        // fatha: top, kasra: bottom, shadda: top
        assert_eq!([records[0], records[2], records[4]], [1, 0, 1]);
        assert_eq!(records[1], 2 + 4 * 3);
        assert_eq!(
            mark_array.offset(usize::from(records[1])).read::<AnchorTable>(),
            Ok(AnchorTable::Format1 { x: 5, y: 5 })
        );

        let base_array = scope.offset(usize::from(header[4]));
        let mut ctxt = base_array.ctxt();
        assert_eq!(ctxt.read_u16be().unwrap(), 2);
        let offsets = ctxt.read_u16be_vec(4).unwrap();
        assert_eq!(offsets[0], 2 + 2 * 2 * 2);
        let anchors: Vec<AnchorTable> = offsets
            .iter()
            .map(|&offset| base_array.offset(usize::from(offset)).read::<AnchorTable>().unwrap())
            .collect();
        assert_eq!(
            anchors,
            vec![
                AnchorTable::Format1 { x: 61, y: -79 },
                AnchorTable::Format1 { x: 50, y: 400 },
                AnchorTable::Format1 { x: 0, y: 0 },
                AnchorTable::Format1 { x: 50, y: 400 },
            ]
        );
    }

    #[test]
    fn test_mark_base_unknown_function() {
        let context = layout_context();
        let rule: MarkBaseRule = serde_json::from_str(
            r#"{ "base": "meem.fina", "classes": { "top": { "mark": "fatha", "basefunction": "nowhere" } } }"#,
        )
        .unwrap();
        assert!(matches!(
            MarkBasePos::populate(&rule, &context),
            Err(CompileError::Resolve(ResolveError::UnknownAnchorFunction(_)))
        ));
    }

    #[test]
    fn test_mark_base_parameters_round_trip() {
        let context = layout_context();
        let rule: MarkBaseRule = serde_json::from_str(
            r#"{ "base": "meem.fina", "classes": { "top": { "mark": "fatha" } } }"#,
        )
        .unwrap();
        let mut markbase = MarkBasePos::populate(&rule, &context).unwrap();
        let parameters: MarkBaseParameters = serde_json::from_str(
            r#"{ "top": { "baseparameters": { "meem.fina": [0, 30] } }, "nothing": {} }"#,
        )
        .unwrap();
        markbase.read_parameters(&parameters);
        assert_eq!(
            serde_json::to_string(&markbase.save_parameters()).unwrap(),
            r#"{"top":{"baseparameters":{"meem.fina":[0,30]}}}"#
        );
    }
}
