//! Definitions of the sizes of binary types.

use std::mem;

pub const U16: usize = mem::size_of::<u16>();
pub const I16: usize = mem::size_of::<i16>();
pub const U32: usize = mem::size_of::<u32>();
pub const I32: usize = mem::size_of::<i32>();
pub const FIXED: usize = I32;
pub const F2DOT14: usize = I16;

/// Offset16 as used by every table this crate writes.
pub const OFFSET16: usize = U16;
