//! Tatweel axis limits and the allocation of variation delta sets.
//!
//! Anchors that move when a glyph is elongated are encoded as anchor format 3 tables that
//! point into a font-wide ItemVariationStore. The store is built here: every allocation
//! describes how one coordinate changes at the four extremes of the two tatweel axes, and
//! identical descriptions share a single delta set.
//!
//! Axis 0 of the store is the left tatweel axis, axis 1 the right tatweel axis.

use indexmap::IndexMap;
use log::trace;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::binary::write::{WriteBinary, WriteBuffer, WriteContext};
use crate::binary::{F2Dot14, I16Be, U16Be, U32Be};
use crate::error::{AxisBoundsError, AxisField, CompileError, WriteError};

/// Number of axes referenced by the regions of the variation store.
pub const AXIS_COUNT: u16 = 2;

// itemCount is a uint16
const MAX_ROWS: usize = 0xFFFF;

/// The legal range of elongation for a glyph, in tatweel units.
///
/// Minimums are zero or negative (shrinking), maximums zero or positive (stretching).
#[derive(Copy, Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AxisLimits {
    pub min_left: f64,
    pub max_left: f64,
    pub min_right: f64,
    pub max_right: f64,
}

impl AxisLimits {
    pub fn new(min_left: f64, max_left: f64, min_right: f64, max_right: f64) -> AxisLimits {
        AxisLimits {
            min_left,
            max_left,
            min_right,
            max_right,
        }
    }

    pub fn get(&self, field: AxisField) -> f64 {
        match field {
            AxisField::MinLeft => self.min_left,
            AxisField::MaxLeft => self.max_left,
            AxisField::MinRight => self.min_right,
            AxisField::MaxRight => self.max_right,
        }
    }
}

/// Axis limits of the expandable glyphs of a font, keyed by glyph name.
///
/// A font may instead declare a uniform axis, in which case one set of limits bounds the
/// elongation of every glyph and is used to normalize all axis values.
#[derive(Debug, Clone, Default)]
pub struct AxisLimitTable {
    glyphs: FxHashMap<String, AxisLimits>,
    uniform: Option<AxisLimits>,
}

impl AxisLimitTable {
    pub fn new() -> AxisLimitTable {
        AxisLimitTable::default()
    }

    pub fn insert(&mut self, glyph: impl Into<String>, limits: AxisLimits) {
        self.glyphs.insert(glyph.into(), limits);
    }

    /// Limits of an expandable glyph; `None` if the glyph does not vary.
    pub fn get(&self, glyph: &str) -> Option<&AxisLimits> {
        self.glyphs.get(glyph)
    }

    /// Limits used to check `glyph`'s values. Glyphs without limits cannot move at all.
    pub fn limits_or_default(&self, glyph: &str) -> AxisLimits {
        self.get(glyph).copied().unwrap_or_default()
    }

    pub fn set_uniform(&mut self, limits: Option<AxisLimits>) {
        self.uniform = limits;
    }

    pub fn uniform(&self) -> Option<AxisLimits> {
        self.uniform
    }

    /// The bound a value of `glyph` is divided by when axis values are normalized.
    pub fn normalization_bound(&self, field: AxisField, glyph_limits: &AxisLimits) -> f64 {
        self.uniform.unwrap_or(*glyph_limits).get(field)
    }
}

/// Express `value` as a fraction of `bound`.
///
/// Negative values are divided by their (negative) minimum and negated, positive values by
/// their maximum, so the result keeps the sign of `value`.
pub fn normalize(value: f64, bound: f64) -> f64 {
    if value == 0.0 {
        0.0
    } else if value < 0.0 {
        -value / bound
    } else {
        value / bound
    }
}

/// How one coordinate changes at each of the four axis extremes.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct DeltaQuad {
    pub at_max_left: i32,
    pub at_min_left: i32,
    pub at_max_right: i32,
    pub at_min_right: i32,
}

impl DeltaQuad {
    /// Deltas of the values at `[max_left, min_left, max_right, min_right]` from `default`.
    pub fn between(default: i32, extremes: [i32; 4]) -> DeltaQuad {
        let [max_left, min_left, max_right, min_right] = extremes;
        DeltaQuad {
            at_max_left: max_left - default,
            at_min_left: min_left - default,
            at_max_right: max_right - default,
            at_min_right: min_right - default,
        }
    }

    pub fn is_zero(&self) -> bool {
        *self == DeltaQuad::default()
    }
}

/// Reference to a delta set within the ItemVariationStore.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct DeltaSetIndex {
    pub outer: u16,
    pub inner: u16,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
enum TatweelAxis {
    Left = 0,
    Right = 1,
}

/// A region that is active along one axis only, between the default and `peak`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
struct VariationRegion {
    axis: TatweelAxis,
    peak: F2Dot14,
}

#[derive(Debug, Clone)]
struct VariationData {
    region_indexes: Vec<u16>,
    rows: Vec<Vec<i16>>,
}

/// Builds the font-wide ItemVariationStore, handing out stable indices for delta sets.
///
/// Delta sets are shared when both their deltas and their regions match. Under a uniform
/// axis the region peaks depend on each glyph's own limits, so glyphs with different limits
/// never share a delta set even when their deltas are identical.
#[derive(Debug, Clone, Default)]
pub struct DeltaSetAllocator {
    normalized: bool,
    uniform: Option<AxisLimits>,
    regions: IndexMap<VariationRegion, u16>,
    data: Vec<VariationData>,
    // region set -> index into `data` of the subtable accepting new rows
    open_data: FxHashMap<Vec<u16>, usize>,
    delta_sets: FxHashMap<(Vec<u16>, Vec<i16>), DeltaSetIndex>,
}

impl DeltaSetAllocator {
    /// Create an allocator.
    ///
    /// When `normalized` is set, region peaks are the axis extremes divided by their bound:
    /// the `uniform` limits when the font declares a uniform axis, else the glyph's own
    /// limits. Otherwise the extremes are used as they are and must already be expressed in
    /// normalized axis coordinates, that is lie within -1.0 and 1.0.
    pub fn new(normalized: bool, uniform: Option<AxisLimits>) -> DeltaSetAllocator {
        DeltaSetAllocator {
            normalized,
            uniform,
            ..DeltaSetAllocator::default()
        }
    }

    /// Allocate (or reuse) the delta set for one coordinate of `glyph`.
    pub fn allocate(
        &mut self,
        glyph: &str,
        quad: DeltaQuad,
        limits: &AxisLimits,
    ) -> Result<DeltaSetIndex, CompileError> {
        self.check_limits(glyph, limits)?;

        let columns = [
            (TatweelAxis::Left, AxisField::MaxLeft, quad.at_max_left),
            (TatweelAxis::Left, AxisField::MinLeft, quad.at_min_left),
            (TatweelAxis::Right, AxisField::MaxRight, quad.at_max_right),
            (TatweelAxis::Right, AxisField::MinRight, quad.at_min_right),
        ];
        let mut deltas = Vec::with_capacity(columns.len());
        for (axis, field, delta) in columns {
            let extreme = limits.get(field);
            // No elongation in this direction, so nothing can vary
            if extreme == 0.0 {
                continue;
            }
            let peak = if self.normalized {
                let bound = self.uniform.unwrap_or(*limits).get(field);
                normalize(extreme, bound)
            } else if extreme.abs() > 1.0 {
                return Err(AxisBoundsError {
                    glyph: glyph.to_owned(),
                    field,
                    value: extreme,
                    bound: extreme.signum(),
                }
                .into());
            } else {
                extreme
            };
            let region = VariationRegion {
                axis,
                peak: F2Dot14::try_from(peak)?,
            };
            deltas.push((self.region_index(region)?, i16::try_from(delta)?));
        }
        deltas.sort_unstable();
        let key: (Vec<u16>, Vec<i16>) = deltas.into_iter().unzip();

        if let Some(index) = self.delta_sets.get(&key) {
            return Ok(*index);
        }
        let index = self.push_row(&key.0, key.1.clone())?;
        trace!(
            "delta set {:?} for '{}' at ({}, {})",
            key.1,
            glyph,
            index.outer,
            index.inner
        );
        self.delta_sets.insert(key, index);
        Ok(index)
    }

    /// Allocate the delta sets for the x and y coordinates of an anchor.
    pub fn allocate_pair(
        &mut self,
        glyph: &str,
        quad_x: DeltaQuad,
        quad_y: DeltaQuad,
        limits: &AxisLimits,
    ) -> Result<(DeltaSetIndex, DeltaSetIndex), CompileError> {
        let x = self.allocate(glyph, quad_x, limits)?;
        let y = self.allocate(glyph, quad_y, limits)?;
        Ok((x, y))
    }

    pub fn is_empty(&self) -> bool {
        self.delta_sets.is_empty()
    }

    /// Number of distinct delta sets allocated so far.
    pub fn delta_set_count(&self) -> usize {
        self.delta_sets.len()
    }

    pub fn region_count(&self) -> usize {
        self.regions.len()
    }

    fn check_limits(&self, glyph: &str, limits: &AxisLimits) -> Result<(), AxisBoundsError> {
        let fields = [
            AxisField::MinLeft,
            AxisField::MaxLeft,
            AxisField::MinRight,
            AxisField::MaxRight,
        ];
        for field in fields {
            let value = limits.get(field);
            let is_min = matches!(field, AxisField::MinLeft | AxisField::MinRight);
            let wrong_sign = if is_min { value > 0.0 } else { value < 0.0 };
            let bound = match self.uniform {
                Some(uniform) => uniform.get(field),
                None => 0.0,
            };
            let outside_uniform = self.uniform.is_some()
                && if is_min { value < bound } else { value > bound };
            if wrong_sign || outside_uniform {
                return Err(AxisBoundsError {
                    glyph: glyph.to_owned(),
                    field,
                    value,
                    bound,
                });
            }
        }
        Ok(())
    }

    fn region_index(&mut self, region: VariationRegion) -> Result<u16, WriteError> {
        if let Some(index) = self.regions.get(&region) {
            return Ok(*index);
        }
        let index = u16::try_from(self.regions.len())?;
        self.regions.insert(region, index);
        Ok(index)
    }

    fn push_row(&mut self, region_indexes: &[u16], row: Vec<i16>) -> Result<DeltaSetIndex, WriteError> {
        let outer = match self.open_data.get(region_indexes) {
            Some(&outer) if self.data[outer].rows.len() < MAX_ROWS => outer,
            _ => {
                let outer = self.data.len();
                self.data.push(VariationData {
                    region_indexes: region_indexes.to_vec(),
                    rows: Vec::new(),
                });
                self.open_data.insert(region_indexes.to_vec(), outer);
                outer
            }
        };
        let data = &mut self.data[outer];
        let inner = data.rows.len();
        data.rows.push(row);
        Ok(DeltaSetIndex {
            outer: u16::try_from(outer)?,
            inner: u16::try_from(inner)?,
        })
    }

    /// Encode the ItemVariationStore holding every allocated delta set.
    pub fn write_store(&self) -> Result<Vec<u8>, WriteError> {
        let mut ctxt = WriteBuffer::new();
        U16Be::write(&mut ctxt, 1u16)?; // format
        let region_list = ctxt.placeholder::<U32Be, u32>()?;
        U16Be::write(&mut ctxt, u16::try_from(self.data.len())?)?;
        let data_offsets = ctxt.placeholder_array::<U32Be, u32>(self.data.len())?;

        ctxt.write_placeholder(region_list, u32::try_from(ctxt.bytes_written())?)?;
        U16Be::write(&mut ctxt, AXIS_COUNT)?;
        U16Be::write(&mut ctxt, u16::try_from(self.regions.len())?)?;
        // IndexMap iteration order is the order region indices were handed out
        for region in self.regions.keys() {
            write_region(&mut ctxt, region)?;
        }

        for (data, placeholder) in self.data.iter().zip(data_offsets) {
            ctxt.write_placeholder(placeholder, u32::try_from(ctxt.bytes_written())?)?;
            let region_count = u16::try_from(data.region_indexes.len())?;
            U16Be::write(&mut ctxt, u16::try_from(data.rows.len())?)?; // itemCount
            U16Be::write(&mut ctxt, region_count)?; // wordDeltaCount: every delta is 16-bit
            U16Be::write(&mut ctxt, region_count)?;
            ctxt.write_iter::<U16Be, _>(data.region_indexes.iter().copied())?;
            for row in &data.rows {
                ctxt.write_iter::<I16Be, _>(row.iter().copied())?;
            }
        }

        Ok(ctxt.into_inner())
    }
}

fn write_region<C: WriteContext>(ctxt: &mut C, region: &VariationRegion) -> Result<(), WriteError> {
    for axis in [TatweelAxis::Left, TatweelAxis::Right] {
        let (start, peak, end) = if axis == region.axis {
            let peak = region.peak;
            (peak.min(F2Dot14::ZERO), peak, peak.max(F2Dot14::ZERO))
        } else {
            (F2Dot14::ZERO, F2Dot14::ZERO, F2Dot14::ZERO)
        };
        F2Dot14::write(ctxt, start)?;
        F2Dot14::write(ctxt, peak)?;
        F2Dot14::write(ctxt, end)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binary::read::ReadScope;

    fn limits() -> AxisLimits {
        AxisLimits::new(-0.5, 4.0, -0.5, 2.0)
    }

    #[test]
    fn test_zero_quad_is_stable() {
        let mut allocator = DeltaSetAllocator::new(true, None);
        let first = allocator
            .allocate("beh.init", DeltaQuad::default(), &limits())
            .unwrap();
        let second = allocator
            .allocate("beh.init", DeltaQuad::default(), &limits())
            .unwrap();
        assert_eq!(first, second);
        assert_eq!(allocator.delta_set_count(), 1);
    }

    #[test]
    fn test_identical_quads_share_a_slot() {
        let mut allocator = DeltaSetAllocator::new(true, None);
        let quad = DeltaQuad::between(100, [180, 90, 100, 100]);
        let other = DeltaQuad::between(100, [100, 100, 150, 80]);

        let a = allocator.allocate("beh.init", quad, &limits()).unwrap();
        let b = allocator.allocate("other", other, &limits()).unwrap();
        // Different per-glyph limits still normalize to the same regions
        let c = allocator
            .allocate("noon.init", quad, &AxisLimits::new(-1.0, 8.0, -1.0, 3.0))
            .unwrap();

        assert_eq!(a, c);
        assert_ne!(a, b);
        assert_eq!(a, DeltaSetIndex { outer: 0, inner: 0 });
        assert_eq!(b, DeltaSetIndex { outer: 0, inner: 1 });
        assert_eq!(allocator.region_count(), 4);
    }

    #[test]
    fn test_uniform_axis_bounds() {
        let uniform = AxisLimits::new(-1.0, 4.0, -1.0, 4.0);
        let mut allocator = DeltaSetAllocator::new(true, Some(uniform));

        let index = allocator
            .allocate("beh.init", DeltaQuad::default(), &AxisLimits::new(-0.5, 2.0, 0.0, 0.0))
            .unwrap();
        assert_eq!(index, DeltaSetIndex { outer: 0, inner: 0 });

        let err = allocator
            .allocate("kaf.init", DeltaQuad::default(), &AxisLimits::new(-2.0, 2.0, 0.0, 0.0))
            .unwrap_err();
        assert_eq!(
            err,
            CompileError::AxisBounds(AxisBoundsError {
                glyph: String::from("kaf.init"),
                field: AxisField::MinLeft,
                value: -2.0,
                bound: -1.0,
            })
        );
    }

    #[test]
    fn test_uniform_axis_peaks() {
        let uniform = AxisLimits::new(-1.0, 4.0, -1.0, 4.0);
        let mut allocator = DeltaSetAllocator::new(true, Some(uniform));
        let glyph_limits = AxisLimits::new(-0.5, 2.0, 0.0, 0.0);
        let index = allocator
            .allocate("beh.init", DeltaQuad::between(0, [30, -10, 0, 0]), &glyph_limits)
            .unwrap();
        assert_eq!(index, DeltaSetIndex { outer: 0, inner: 0 });

        let data = allocator.write_store().unwrap();
        let scope = ReadScope::new(&data);
        let mut ctxt = scope.ctxt();
        ctxt.read_u16be().unwrap();
        let region_list_offset = ctxt.read_u32be().unwrap() as usize;
        let mut regions = scope.offset(region_list_offset).ctxt();
        assert_eq!(regions.read_u16be().unwrap(), AXIS_COUNT);
        assert_eq!(regions.read_u16be().unwrap(), 2);
        // 2.0 of 4.0 peaks at +0.5, -0.5 of -1.0 at -0.5
        let first: Vec<i16> = (0..6).map(|_| regions.read_i16be().unwrap()).collect();
        assert_eq!(first, vec![0, 0x2000, 0x2000, 0, 0, 0]);
        let second: Vec<i16> = (0..6).map(|_| regions.read_i16be().unwrap()).collect();
        assert_eq!(second, vec![-0x2000, -0x2000, 0, 0, 0, 0]);
    }

    #[test]
    fn test_uniform_axis_limits_separate_delta_sets() {
        let uniform = AxisLimits::new(-1.0, 4.0, -1.0, 4.0);
        let mut allocator = DeltaSetAllocator::new(true, Some(uniform));
        let quad = DeltaQuad::between(100, [180, 90, 100, 100]);

        let short = allocator
            .allocate("beh.init", quad, &AxisLimits::new(-0.5, 2.0, 0.0, 0.0))
            .unwrap();
        let long = allocator
            .allocate("kaf.init", quad, &AxisLimits::new(-1.0, 4.0, 0.0, 0.0))
            .unwrap();
        let again = allocator
            .allocate("noon.init", quad, &AxisLimits::new(-0.5, 2.0, 0.0, 0.0))
            .unwrap();

        assert_eq!(short, DeltaSetIndex { outer: 0, inner: 0 });
        assert_eq!(long, DeltaSetIndex { outer: 1, inner: 0 });
        assert_eq!(again, short);
        assert_eq!(allocator.region_count(), 4);
    }

    #[test]
    fn test_raw_extremes_must_be_normalized() {
        let mut allocator = DeltaSetAllocator::new(false, None);
        let quad = DeltaQuad::between(0, [30, -10, 0, 0]);
        let index = allocator
            .allocate("beh.init", quad, &AxisLimits::new(-0.25, 1.0, 0.0, 0.0))
            .unwrap();
        assert_eq!(index, DeltaSetIndex { outer: 0, inner: 0 });

        let err = allocator
            .allocate("kaf.init", quad, &AxisLimits::new(-0.25, 2.0, 0.0, 0.0))
            .unwrap_err();
        assert_eq!(
            err,
            CompileError::AxisBounds(AxisBoundsError {
                glyph: String::from("kaf.init"),
                field: AxisField::MaxLeft,
                value: 2.0,
                bound: 1.0,
            })
        );
    }

    #[test]
    fn test_write_store() {
        let mut allocator = DeltaSetAllocator::new(true, None);
        let glyph_limits = AxisLimits::new(-1.0, 2.0, 0.0, 0.0);
        allocator
            .allocate("beh.init", DeltaQuad::between(0, [30, -10, 0, 0]), &glyph_limits)
            .unwrap();

        let data = allocator.write_store().unwrap();
        let scope = ReadScope::new(&data);
        let mut ctxt = scope.ctxt();
        assert_eq!(ctxt.read_u16be().unwrap(), 1);
        let region_list_offset = ctxt.read_u32be().unwrap() as usize;
        assert_eq!(ctxt.read_u16be().unwrap(), 1);
        let data_offset = ctxt.read_u32be().unwrap() as usize;

        let mut regions = scope.offset(region_list_offset).ctxt();
        assert_eq!(regions.read_u16be().unwrap(), AXIS_COUNT);
        assert_eq!(regions.read_u16be().unwrap(), 2);
        // region 0: left axis, peak +1.0
        let first: Vec<i16> = (0..6).map(|_| regions.read_i16be().unwrap()).collect();
        assert_eq!(first, vec![0, 0x4000, 0x4000, 0, 0, 0]);
        // region 1: left axis, peak -1.0
        let second: Vec<i16> = (0..6).map(|_| regions.read_i16be().unwrap()).collect();
        assert_eq!(second, vec![-0x4000, -0x4000, 0, 0, 0, 0]);

        let mut item_data = scope.offset(data_offset).ctxt();
        assert_eq!(item_data.read_u16be().unwrap(), 1); // itemCount
        assert_eq!(item_data.read_u16be().unwrap(), 2); // wordDeltaCount
        assert_eq!(item_data.read_u16be_vec(3).unwrap(), vec![2, 0, 1]);
        assert_eq!(item_data.read_i16be().unwrap(), 30);
        assert_eq!(item_data.read_i16be().unwrap(), -10);
    }
}
