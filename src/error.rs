//! Error types

use crate::binary::read::ReadEof;
use std::fmt;

/// Error returned when compiling rules into layout tables
#[derive(Clone, PartialEq, Debug)]
pub enum CompileError {
    /// A class, glyph, lookup or anchor function referenced by a rule does not resolve.
    Resolve(ResolveError),
    /// An elongation value or anchor variation lies outside the declared axis bounds.
    AxisBounds(AxisBoundsError),
    /// The encoded table would violate the binary format.
    Write(WriteError),
    /// A lookup type does not accept the supplied subtable.
    SubtableMismatch { lookup: String },
    /// Wraps an error with the lookup and subtable that produced it.
    Lookup {
        lookup: String,
        subtable: usize,
        error: Box<CompileError>,
    },
}

impl From<ResolveError> for CompileError {
    fn from(error: ResolveError) -> Self {
        CompileError::Resolve(error)
    }
}

impl From<AxisBoundsError> for CompileError {
    fn from(error: AxisBoundsError) -> Self {
        CompileError::AxisBounds(error)
    }
}

impl From<WriteError> for CompileError {
    fn from(error: WriteError) -> Self {
        CompileError::Write(error)
    }
}

impl From<std::num::TryFromIntError> for CompileError {
    fn from(_error: std::num::TryFromIntError) -> Self {
        CompileError::Write(WriteError::BadValue)
    }
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompileError::Resolve(err) => write!(f, "rule resolution: {}", err),
            CompileError::AxisBounds(err) => write!(f, "axis bounds: {}", err),
            CompileError::Write(err) => write!(f, "encoding: {}", err),
            CompileError::SubtableMismatch { lookup } => {
                write!(f, "subtable kind does not match the type of lookup '{}'", lookup)
            }
            CompileError::Lookup {
                lookup,
                subtable,
                error,
            } => write!(f, "lookup '{}' subtable {}: {}", lookup, subtable, error),
        }
    }
}

impl std::error::Error for CompileError {}

/// Errors raised while resolving symbolic names in rules
#[derive(Clone, Eq, PartialEq, Debug)]
pub enum ResolveError {
    UnknownGlyph(String),
    UnknownGlyphId(u16),
    UnknownLookup { owner: String, name: String },
    UnknownAnchorFunction(String),
    BadPattern { pattern: String, message: String },
    EmptyClass(String),
    CyclicClass(String),
    MissingShape { glyph: String },
}

impl fmt::Display for ResolveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolveError::UnknownGlyph(name) => write!(f, "glyph name <{}> not found", name),
            ResolveError::UnknownGlyphId(id) => write!(f, "glyph id {} has no name", id),
            ResolveError::UnknownLookup { owner, name } => write!(
                f,
                "lookup '{}' referenced from '{}' is not defined",
                name, owner
            ),
            ResolveError::UnknownAnchorFunction(name) => {
                write!(f, "anchor function '{}' is not registered", name)
            }
            ResolveError::BadPattern { pattern, message } => {
                write!(f, "class pattern '{}' is invalid: {}", pattern, message)
            }
            ResolveError::EmptyClass(name) => write!(f, "class '{}' matches no glyphs", name),
            ResolveError::CyclicClass(name) => write!(f, "class '{}' refers to itself", name),
            ResolveError::MissingShape { glyph } => {
                write!(f, "no shape available for glyph '{}'", glyph)
            }
        }
    }
}

impl std::error::Error for ResolveError {}

/// Which elongation value was out of bounds
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum AxisField {
    MinLeft,
    MaxLeft,
    MinRight,
    MaxRight,
}

impl fmt::Display for AxisField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AxisField::MinLeft => f.write_str("MinLeftTatweel"),
            AxisField::MaxLeft => f.write_str("MaxLeftTatweel"),
            AxisField::MinRight => f.write_str("MinRightTatweel"),
            AxisField::MaxRight => f.write_str("MaxRightTatweel"),
        }
    }
}

/// An elongation value that lies outside the bounds declared for its glyph
#[derive(Clone, PartialEq, Debug)]
pub struct AxisBoundsError {
    pub glyph: String,
    pub field: AxisField,
    pub value: f64,
    pub bound: f64,
}

impl fmt::Display for AxisBoundsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} error for glyph {}: {} exceeds bound {}",
            self.field, self.glyph, self.value, self.bound
        )
    }
}

impl std::error::Error for AxisBoundsError {}

/// Errors that originate when parsing binary data
#[derive(Clone, Eq, PartialEq, Debug)]
pub enum ParseError {
    BadEof,
    BadValue,
    BadVersion,
}

impl From<ReadEof> for ParseError {
    fn from(_error: ReadEof) -> Self {
        ParseError::BadEof
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::BadEof => write!(f, "end of data reached unexpectedly"),
            ParseError::BadValue => write!(f, "invalid value"),
            ParseError::BadVersion => write!(f, "unexpected data version"),
        }
    }
}

impl std::error::Error for ParseError {}

/// Errors that originate when writing binary data
#[derive(Clone, Eq, PartialEq, Debug)]
pub enum WriteError {
    BadValue,
    OffsetOverflow,
    Unsorted,
    PlaceholderMismatch,
}

impl From<std::num::TryFromIntError> for WriteError {
    fn from(_error: std::num::TryFromIntError) -> Self {
        WriteError::BadValue
    }
}

impl fmt::Display for WriteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WriteError::BadValue => write!(f, "write: bad value"),
            WriteError::OffsetOverflow => write!(f, "offset does not fit in 16 bits"),
            WriteError::Unsorted => write!(f, "coverage glyphs are not strictly ascending"),
            WriteError::PlaceholderMismatch => {
                write!(f, "data written to placeholder did not match expected size")
            }
        }
    }
}

impl std::error::Error for WriteError {}
