#![warn(rust_2018_idioms)]

/// Reading and writing of binary data.
pub mod binary;
/// Chaining contextual lookups.
pub mod chaining;
/// Resolution of glyph class names.
pub mod classes;
pub mod context;
pub mod error;
pub mod glyph;
pub mod gpos;
pub mod gsub;
pub mod layout;
pub mod size;
/// Tatweel axes and the ItemVariationStore.
pub mod variations;

pub use crate::context::{LayoutContext, LayoutOptions, TableKind};
pub use crate::error::CompileError;
pub use crate::layout::{CompiledLayout, LayoutCompiler, Lookup, LookupFlag, LookupType, Subtable};
