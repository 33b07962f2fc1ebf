#![allow(missing_docs)]

//! Parse binary data
//!
//! The compiler only ever writes tables; this reader exists so that emitted subtables can be
//! walked back through their offsets, which is how the tests check the layout of each
//! table.

use crate::error::ParseError;

#[derive(Debug, Copy, Clone)]
pub struct ReadEof {}

pub trait ReadBinary: Sized {
    fn read(ctxt: &mut ReadCtxt<'_>) -> Result<Self, ParseError>;
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ReadScope<'a> {
    base: usize,
    data: &'a [u8],
}

#[derive(Clone)]
pub struct ReadCtxt<'a> {
    scope: ReadScope<'a>,
    offset: usize,
}

impl<'a> ReadScope<'a> {
    pub fn new(data: &'a [u8]) -> ReadScope<'a> {
        ReadScope { base: 0, data }
    }

    /// Absolute position of this scope within the outermost data.
    pub fn base(&self) -> usize {
        self.base
    }

    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    /// A scope starting `offset` bytes into this one.
    pub fn offset(&self, offset: usize) -> ReadScope<'a> {
        let offset = offset.min(self.data.len());
        ReadScope {
            base: self.base + offset,
            data: &self.data[offset..],
        }
    }

    pub fn ctxt(&self) -> ReadCtxt<'a> {
        ReadCtxt::new(*self)
    }

    pub fn read<T: ReadBinary>(&self) -> Result<T, ParseError> {
        self.ctxt().read::<T>()
    }
}

impl<'a> ReadCtxt<'a> {
    fn new(scope: ReadScope<'a>) -> ReadCtxt<'a> {
        ReadCtxt { scope, offset: 0 }
    }

    pub fn scope(&self) -> ReadScope<'a> {
        self.scope.offset(self.offset)
    }

    pub fn read<T: ReadBinary>(&mut self) -> Result<T, ParseError> {
        T::read(self)
    }

    pub fn check(&self, cond: bool) -> Result<(), ParseError> {
        if cond {
            Ok(())
        } else {
            Err(ParseError::BadValue)
        }
    }

    pub fn bytes_consumed(&self) -> usize {
        self.offset
    }

    pub fn check_avail(&self, length: usize) -> Result<(), ReadEof> {
        match self.offset.checked_add(length) {
            Some(end) if end <= self.scope.data.len() => Ok(()),
            _ => Err(ReadEof {}),
        }
    }

    fn read_bytes<const N: usize>(&mut self) -> Result<[u8; N], ReadEof> {
        self.check_avail(N)?;
        let mut bytes = [0; N];
        bytes.copy_from_slice(&self.scope.data[self.offset..self.offset + N]);
        self.offset += N;
        Ok(bytes)
    }

    pub fn read_u16be(&mut self) -> Result<u16, ReadEof> {
        self.read_bytes::<2>().map(u16::from_be_bytes)
    }

    pub fn read_i16be(&mut self) -> Result<i16, ReadEof> {
        self.read_bytes::<2>().map(i16::from_be_bytes)
    }

    pub fn read_u32be(&mut self) -> Result<u32, ReadEof> {
        self.read_bytes::<4>().map(u32::from_be_bytes)
    }

    pub fn read_i32be(&mut self) -> Result<i32, ReadEof> {
        self.read_bytes::<4>().map(i32::from_be_bytes)
    }

    pub fn read_u16be_vec(&mut self, count: usize) -> Result<Vec<u16>, ReadEof> {
        (0..count).map(|_| self.read_u16be()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_values() {
        let data = [0x00, 0x02, 0xFF, 0xFE, 0x00, 0x01, 0x00, 0x00];
        let mut ctxt = ReadScope::new(&data).ctxt();
        assert_eq!(ctxt.read_u16be().unwrap(), 2);
        assert_eq!(ctxt.read_i16be().unwrap(), -2);
        assert_eq!(ctxt.read_i32be().unwrap(), 0x0001_0000);
        assert!(ctxt.read_u16be().is_err());
    }

    #[test]
    fn test_offset_scope() {
        let data = [0, 1, 0, 2, 0, 3];
        let scope = ReadScope::new(&data).offset(2);
        assert_eq!(scope.base(), 2);
        assert_eq!(scope.ctxt().read_u16be_vec(2).unwrap(), vec![2, 3]);
    }
}
