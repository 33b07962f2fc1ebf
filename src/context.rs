//! The layout context shared by every subtable of a compile.
//!
//! Subtables borrow glyph, class, shape and axis data from here; they never own it.

use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use log::debug;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::classes::{ClassResolver, GlyphSet};
use crate::error::ResolveError;
use crate::glyph::{GlyphId, GlyphOrder, GlyphShape, GlyphShapes, Point, ShapeTable};
use crate::variations::{AxisLimitTable, AxisLimits, DeltaSetAllocator};

/// A procedural anchor calculator.
///
/// Called as `f(glyph_name, class_name, adjustment, left_tatweel, right_tatweel)` and returns
/// the anchor of the glyph at that elongation.
pub type AnchorFn = Rc<dyn Fn(&str, &str, Point, f64, f64) -> Point>;

/// Build options.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LayoutOptions {
    /// Emit variable anchors for glyphs that have axis limits.
    pub variable: bool,
    /// Keep the elongation substitution formats instead of converting them to format 2.
    pub extended: bool,
    /// Express tatweel values as fractions of their axis bound.
    pub use_normalized_axis_values: bool,
}

impl Default for LayoutOptions {
    fn default() -> Self {
        LayoutOptions {
            variable: true,
            extended: false,
            use_normalized_axis_values: true,
        }
    }
}

/// The layout table a lookup belongs to.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum TableKind {
    Gsub,
    Gpos,
}

impl fmt::Display for TableKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TableKind::Gsub => f.write_str("GSUB"),
            TableKind::Gpos => f.write_str("GPOS"),
        }
    }
}

pub struct LayoutContext {
    pub glyphs: GlyphOrder,
    pub classes: ClassResolver,
    pub axis_limits: AxisLimitTable,
    pub options: LayoutOptions,
    shapes: Box<dyn GlyphShapes>,
    anchor_functions: FxHashMap<String, AnchorFn>,
    gsub_lookups: IndexMap<String, u16>,
    gpos_lookups: IndexMap<String, u16>,
}

impl LayoutContext {
    pub fn new(glyphs: GlyphOrder) -> LayoutContext {
        LayoutContext {
            glyphs,
            classes: ClassResolver::new(),
            axis_limits: AxisLimitTable::new(),
            options: LayoutOptions::default(),
            shapes: Box::new(ShapeTable::new()),
            anchor_functions: FxHashMap::default(),
            gsub_lookups: IndexMap::new(),
            gpos_lookups: IndexMap::new(),
        }
    }

    pub fn with_shapes(mut self, shapes: impl GlyphShapes + 'static) -> LayoutContext {
        self.shapes = Box::new(shapes);
        self
    }

    pub fn with_options(mut self, options: LayoutOptions) -> LayoutContext {
        self.options = options;
        self
    }

    pub fn glyph_id(&self, name: &str) -> Result<GlyphId, ResolveError> {
        self.glyphs.lookup_id(name)
    }

    pub fn glyph_name(&self, glyph: GlyphId) -> Result<&str, ResolveError> {
        self.glyphs.lookup_name(glyph)
    }

    pub fn resolve_class(&self, name: &str) -> Result<Rc<GlyphSet>, ResolveError> {
        self.classes.resolve(name, &self.glyphs)
    }

    /// Union of the glyph sets of `names`.
    pub fn resolve_classes<'n>(
        &self,
        names: impl IntoIterator<Item = &'n str>,
    ) -> Result<GlyphSet, ResolveError> {
        self.classes.resolve_union(names, &self.glyphs)
    }

    /// The shape of `glyph` at the given elongation.
    pub fn shape(&self, glyph: GlyphId, left_tatweel: f64, right_tatweel: f64) -> Result<GlyphShape, ResolveError> {
        self.shapes
            .shape(glyph, left_tatweel, right_tatweel)
            .ok_or_else(|| ResolveError::MissingShape {
                glyph: self
                    .glyphs
                    .glyph_name(glyph)
                    .map(str::to_owned)
                    .unwrap_or_else(|| format!("#{}", glyph)),
            })
    }

    /// Limits of `glyph` if anchors of this glyph should vary along the tatweel axes.
    pub fn variable_limits(&self, glyph: &str) -> Option<AxisLimits> {
        if self.options.variable {
            self.axis_limits.get(glyph).copied()
        } else {
            None
        }
    }

    pub fn register_anchor_function(&mut self, name: impl Into<String>, function: AnchorFn) {
        self.anchor_functions.insert(name.into(), function);
    }

    pub fn anchor_function(&self, name: &str) -> Result<AnchorFn, ResolveError> {
        self.anchor_functions
            .get(name)
            .cloned()
            .ok_or_else(|| ResolveError::UnknownAnchorFunction(name.to_owned()))
    }

    /// A fresh allocator configured for this context.
    pub fn delta_set_allocator(&self) -> DeltaSetAllocator {
        DeltaSetAllocator::new(
            self.options.use_normalized_axis_values,
            self.axis_limits.uniform(),
        )
    }

    /// Assign the next lookup-list index of `table` to `name`.
    ///
    /// Registering a name twice keeps its first index.
    pub fn register_lookup(&mut self, table: TableKind, name: &str) -> Result<u16, ResolveError> {
        let lookups = self.lookups_mut(table);
        if let Some(index) = lookups.get(name) {
            return Ok(*index);
        }
        let index = u16::try_from(lookups.len()).map_err(|_| ResolveError::UnknownLookup {
            owner: table.to_string(),
            name: name.to_owned(),
        })?;
        lookups.insert(name.to_owned(), index);
        debug!("{} lookup '{}' has index {}", table, name, index);
        Ok(index)
    }

    /// Resolve a lookup referenced from the lookup `owner`.
    ///
    /// The name scoped to the owner, `<owner>.<name>`, takes precedence over the bare name.
    pub fn lookup_index(&self, table: TableKind, owner: &str, name: &str) -> Result<u16, ResolveError> {
        let lookups = self.lookups(table);
        let scoped = format!("{}.{}", owner, name);
        lookups
            .get(&scoped)
            .or_else(|| lookups.get(name))
            .copied()
            .ok_or_else(|| ResolveError::UnknownLookup {
                owner: owner.to_owned(),
                name: name.to_owned(),
            })
    }

    /// Number of lookups registered for `table`.
    pub fn lookup_count(&self, table: TableKind) -> usize {
        self.lookups(table).len()
    }

    /// Name of the lookup registered at `index`.
    pub fn lookup_name(&self, table: TableKind, index: usize) -> Option<&str> {
        self.lookups(table)
            .get_index(index)
            .map(|(name, _)| name.as_str())
    }

    fn lookups(&self, table: TableKind) -> &IndexMap<String, u16> {
        match table {
            TableKind::Gsub => &self.gsub_lookups,
            TableKind::Gpos => &self.gpos_lookups,
        }
    }

    fn lookups_mut(&mut self, table: TableKind) -> &mut IndexMap<String, u16> {
        match table {
            TableKind::Gsub => &mut self.gsub_lookups,
            TableKind::Gpos => &mut self.gpos_lookups,
        }
    }
}

impl fmt::Debug for LayoutContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LayoutContext")
            .field("glyphs", &self.glyphs.len())
            .field("options", &self.options)
            .field("anchor_functions", &self.anchor_functions.keys().collect::<Vec<_>>())
            .field("gsub_lookups", &self.gsub_lookups)
            .field("gpos_lookups", &self.gpos_lookups)
            .finish()
    }
}
