//! Anchor tables and the resolution of variable anchors.

use log::trace;

use crate::binary::read::{ReadBinary, ReadCtxt};
use crate::binary::write::{WriteBinary, WriteContext};
use crate::binary::{I16Be, U16Be};
use crate::context::LayoutContext;
use crate::error::{CompileError, ParseError, WriteError};
use crate::glyph::Point;
use crate::variations::{DeltaQuad, DeltaSetAllocator, DeltaSetIndex};

const X_DEVICE_OFFSET: u16 = 10;
const Y_DEVICE_OFFSET: u16 = 16;
const VARIATION_INDEX_FORMAT: u16 = 0x8000;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AnchorTable {
    Format1 {
        x: i16,
        y: i16,
    },
    /// An anchor whose coordinates vary, each through a VariationIndex table.
    Format3 {
        x: i16,
        y: i16,
        x_variation: DeltaSetIndex,
        y_variation: DeltaSetIndex,
    },
}

impl AnchorTable {
    pub fn fixed(point: Point) -> Result<AnchorTable, WriteError> {
        Ok(AnchorTable::Format1 {
            x: i16::try_from(point.x)?,
            y: i16::try_from(point.y)?,
        })
    }

    pub fn point(&self) -> Point {
        match *self {
            AnchorTable::Format1 { x, y } | AnchorTable::Format3 { x, y, .. } => {
                Point::new(i32::from(x), i32::from(y))
            }
        }
    }

    /// Encoded size in bytes.
    pub fn size(&self) -> usize {
        match self {
            AnchorTable::Format1 { .. } => 6,
            AnchorTable::Format3 { .. } => 22,
        }
    }
}

impl WriteBinary<&Self> for AnchorTable {
    type Output = ();

    fn write<C: WriteContext>(ctxt: &mut C, anchor: &AnchorTable) -> Result<(), WriteError> {
        match *anchor {
            AnchorTable::Format1 { x, y } => {
                U16Be::write(ctxt, 1u16)?;
                I16Be::write(ctxt, x)?;
                I16Be::write(ctxt, y)?;
            }
            AnchorTable::Format3 {
                x,
                y,
                x_variation,
                y_variation,
            } => {
                U16Be::write(ctxt, 3u16)?;
                I16Be::write(ctxt, x)?;
                I16Be::write(ctxt, y)?;
                U16Be::write(ctxt, X_DEVICE_OFFSET)?;
                U16Be::write(ctxt, Y_DEVICE_OFFSET)?;
                for index in [x_variation, y_variation] {
                    U16Be::write(ctxt, index.outer)?;
                    U16Be::write(ctxt, index.inner)?;
                    U16Be::write(ctxt, VARIATION_INDEX_FORMAT)?;
                }
            }
        }
        Ok(())
    }
}

impl ReadBinary for AnchorTable {
    fn read(ctxt: &mut ReadCtxt<'_>) -> Result<Self, ParseError> {
        match ctxt.read_u16be()? {
            1 => {
                let x = ctxt.read_i16be()?;
                let y = ctxt.read_i16be()?;
                Ok(AnchorTable::Format1 { x, y })
            }
            3 => {
                let x = ctxt.read_i16be()?;
                let y = ctxt.read_i16be()?;
                let x_device = ctxt.read_u16be()?;
                let y_device = ctxt.read_u16be()?;
                ctxt.check(x_device == X_DEVICE_OFFSET && y_device == Y_DEVICE_OFFSET)?;
                let x_variation = read_variation_index(ctxt)?;
                let y_variation = read_variation_index(ctxt)?;
                Ok(AnchorTable::Format3 {
                    x,
                    y,
                    x_variation,
                    y_variation,
                })
            }
            _ => Err(ParseError::BadVersion),
        }
    }
}

fn read_variation_index(ctxt: &mut ReadCtxt<'_>) -> Result<DeltaSetIndex, ParseError> {
    let outer = ctxt.read_u16be()?;
    let inner = ctxt.read_u16be()?;
    let format = ctxt.read_u16be()?;
    ctxt.check(format == VARIATION_INDEX_FORMAT)?;
    Ok(DeltaSetIndex { outer, inner })
}

/// Build the anchor table of `glyph` whose default position is `default`.
///
/// `at(left, right)` evaluates the anchor at an elongation. When variable anchors are enabled
/// and the glyph has axis limits, the anchor is evaluated with each axis pushed to each of its
/// extremes in turn and the differences from `default` are allocated as delta sets, giving a
/// format 3 anchor. Otherwise the anchor is a plain format 1 anchor.
pub fn variable_anchor<F>(
    context: &LayoutContext,
    deltas: &mut DeltaSetAllocator,
    glyph: &str,
    default: Point,
    mut at: F,
) -> Result<AnchorTable, CompileError>
where
    F: FnMut(f64, f64) -> Result<Point, CompileError>,
{
    let limits = match context.variable_limits(glyph) {
        Some(limits) => limits,
        None => return Ok(AnchorTable::fixed(default)?),
    };

    let extremes = [
        at(limits.max_left, 0.0)?,
        at(limits.min_left, 0.0)?,
        at(0.0, limits.max_right)?,
        at(0.0, limits.min_right)?,
    ];
    let quad_x = DeltaQuad::between(default.x, extremes.map(|point| point.x));
    let quad_y = DeltaQuad::between(default.y, extremes.map(|point| point.y));
    let (x_variation, y_variation) = deltas.allocate_pair(glyph, quad_x, quad_y, &limits)?;
    trace!(
        "variable anchor {} for '{}': x {:?}, y {:?}",
        default,
        glyph,
        quad_x,
        quad_y
    );

    Ok(AnchorTable::Format3 {
        x: i16::try_from(default.x)?,
        y: i16::try_from(default.y)?,
        x_variation,
        y_variation,
    })
}
