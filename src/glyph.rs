//! Glyph identities and the glyph shape data consumed by the compiler.
//!
//! Glyph outlines are produced elsewhere. The compiler only needs three things from that
//! process: the mapping between glyph names and glyph ids, the advance width of a glyph and
//! its named anchor points, both for the default shape and for the alternate shapes that a
//! glyph takes when it is elongated along the tatweel axes.

use std::fmt;
use std::ops::{Add, AddAssign, Sub};

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::error::ResolveError;

pub type GlyphId = u16;

/// An integer point in font units.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(from = "[i32; 2]", into = "[i32; 2]")]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Point {
        Point { x, y }
    }

    pub fn is_zero(self) -> bool {
        self.x == 0 && self.y == 0
    }
}

impl Add for Point {
    type Output = Point;

    fn add(self, other: Point) -> Point {
        Point::new(self.x + other.x, self.y + other.y)
    }
}

impl AddAssign for Point {
    fn add_assign(&mut self, other: Point) {
        *self = *self + other;
    }
}

impl Sub for Point {
    type Output = Point;

    fn sub(self, other: Point) -> Point {
        Point::new(self.x - other.x, self.y - other.y)
    }
}

impl From<[i32; 2]> for Point {
    fn from([x, y]: [i32; 2]) -> Point {
        Point::new(x, y)
    }
}

impl From<Point> for [i32; 2] {
    fn from(point: Point) -> [i32; 2] {
        [point.x, point.y]
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Bidirectional mapping between glyph names and glyph ids.
#[derive(Debug, Clone, Default)]
pub struct GlyphOrder {
    by_name: FxHashMap<String, GlyphId>,
    by_id: FxHashMap<GlyphId, String>,
}

impl GlyphOrder {
    pub fn new() -> GlyphOrder {
        GlyphOrder::default()
    }

    /// Register `name` as glyph `id`, replacing any previous mapping of either.
    pub fn insert(&mut self, name: impl Into<String>, id: GlyphId) {
        let name = name.into();
        if let Some(old_name) = self.by_id.insert(id, name.clone()) {
            self.by_name.remove(&old_name);
        }
        if let Some(old_id) = self.by_name.insert(name, id) {
            if old_id != id {
                self.by_id.remove(&old_id);
            }
        }
    }

    pub fn glyph_id(&self, name: &str) -> Option<GlyphId> {
        self.by_name.get(name).copied()
    }

    pub fn glyph_name(&self, id: GlyphId) -> Option<&str> {
        self.by_id.get(&id).map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    pub fn lookup_id(&self, name: &str) -> Result<GlyphId, ResolveError> {
        self.glyph_id(name)
            .ok_or_else(|| ResolveError::UnknownGlyph(name.to_owned()))
    }

    pub fn lookup_name(&self, id: GlyphId) -> Result<&str, ResolveError> {
        self.glyph_name(id).ok_or(ResolveError::UnknownGlyphId(id))
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// Iterate over `(name, id)` pairs in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, GlyphId)> + '_ {
        self.by_name.iter().map(|(name, &id)| (name.as_str(), id))
    }
}

impl<S: Into<String>> FromIterator<(S, GlyphId)> for GlyphOrder {
    fn from_iter<I: IntoIterator<Item = (S, GlyphId)>>(iter: I) -> Self {
        let mut order = GlyphOrder::new();
        for (name, id) in iter {
            order.insert(name, id);
        }
        order
    }
}

/// The metrics of one shape of a glyph.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GlyphShape {
    /// Glyph id of this shape. For alternate shapes this is the id of the alternate glyph.
    pub glyph_id: GlyphId,
    pub width: f64,
    pub anchors: FxHashMap<String, Point>,
}

impl GlyphShape {
    pub fn new(glyph_id: GlyphId, width: f64) -> GlyphShape {
        GlyphShape {
            glyph_id,
            width,
            anchors: FxHashMap::default(),
        }
    }

    pub fn with_anchor(mut self, name: impl Into<String>, point: Point) -> GlyphShape {
        self.anchors.insert(name.into(), point);
        self
    }

    pub fn anchor(&self, name: &str) -> Option<Point> {
        self.anchors.get(name).copied()
    }
}

/// Source of glyph shapes at a given elongation.
///
/// `shape(glyph, 0.0, 0.0)` is the default shape of `glyph`. Any other pair of tatweel values
/// asks for the alternate shape the glyph takes when stretched (positive) or shrunk
/// (negative) by that amount on each side.
pub trait GlyphShapes {
    fn shape(&self, glyph: GlyphId, left_tatweel: f64, right_tatweel: f64) -> Option<GlyphShape>;
}

/// A `GlyphShapes` implementation backed by precomputed shapes.
#[derive(Debug, Clone, Default)]
pub struct ShapeTable {
    shapes: FxHashMap<(GlyphId, u64, u64), GlyphShape>,
}

impl ShapeTable {
    pub fn new() -> ShapeTable {
        ShapeTable::default()
    }

    pub fn insert(&mut self, glyph: GlyphId, left_tatweel: f64, right_tatweel: f64, shape: GlyphShape) {
        self.shapes
            .insert((glyph, key(left_tatweel), key(right_tatweel)), shape);
    }

    pub fn len(&self) -> usize {
        self.shapes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shapes.is_empty()
    }
}

impl GlyphShapes for ShapeTable {
    fn shape(&self, glyph: GlyphId, left_tatweel: f64, right_tatweel: f64) -> Option<GlyphShape> {
        self.shapes
            .get(&(glyph, key(left_tatweel), key(right_tatweel)))
            .cloned()
    }
}

// -0.0 and 0.0 must land on the same entry
fn key(value: f64) -> u64 {
    if value == 0.0 {
        0.0f64.to_bits()
    } else {
        value.to_bits()
    }
}
