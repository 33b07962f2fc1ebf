#![deny(missing_docs)]

//! Write binary data

use std::iter;
use std::marker::PhantomData;

use crate::binary::{F2Dot14, Fixed, I16Be, I32Be, U16Be, U32Be};
use crate::error::WriteError;
use crate::size;

/// An in-memory buffer that implements `WriteContext`.
#[derive(Debug, Default)]
pub struct WriteBuffer {
    data: Vec<u8>,
}

struct WriteSlice<'a> {
    offset: usize,
    data: &'a mut [u8],
}

/// A placeholder for a value that will be filled in later using WriteContext::write_placeholder
pub struct Placeholder<T, HostType>
where
    T: WriteBinary<HostType>,
{
    offset: usize,
    length: usize,
    marker: PhantomData<T>,
    host: PhantomData<HostType>,
}

/// Trait that describes a type that can be written to a `WriteContext` in binary form.
pub trait WriteBinary<HostType = Self> {
    /// The type of the value returned by `write`.
    type Output;

    /// Write the binary representation of Self to `ctxt`.
    fn write<C: WriteContext>(ctxt: &mut C, val: HostType) -> Result<Self::Output, WriteError>;
}

/// Types with a fixed encoded size, which can be reserved with a placeholder.
pub trait FixedSize {
    /// The number of bytes written by `WriteBinary::write`.
    const SIZE: usize;
}

/// Trait for types that can have binary data written to them.
pub trait WriteContext {
    /// Write each item of an iterator into a `WriteContext`.
    fn write_iter<T, HostType>(
        &mut self,
        iter: impl Iterator<Item = HostType>,
    ) -> Result<(), WriteError>
    where
        Self: Sized,
        T: WriteBinary<HostType>,
    {
        for val in iter {
            T::write(self, val)?;
        }

        Ok(())
    }

    /// Write a slice of bytes to a `WriteContext`.
    fn write_bytes(&mut self, data: &[u8]) -> Result<(), WriteError>;

    /// Write the specified number of zero bytes to the `WriteContext`.
    fn write_zeros(&mut self, count: usize) -> Result<(), WriteError>;

    /// The total number of bytes written so far.
    fn bytes_written(&self) -> usize;

    /// Return a placeholder to `T` in the context for filling in later.
    fn placeholder<T, HostType>(&mut self) -> Result<Placeholder<T, HostType>, WriteError>
    where
        T: WriteBinary<HostType> + FixedSize,
    {
        let offset = self.bytes_written();
        self.write_zeros(T::SIZE)?;

        Ok(Placeholder {
            offset,
            length: T::SIZE,
            marker: PhantomData,
            host: PhantomData,
        })
    }

    /// Return a `Vec` of `count` placeholders of type `T`.
    fn placeholder_array<T, HostType>(
        &mut self,
        count: usize,
    ) -> Result<Vec<Placeholder<T, HostType>>, WriteError>
    where
        T: WriteBinary<HostType> + FixedSize,
    {
        (0..count)
            .map(|_| self.placeholder::<T, HostType>())
            .collect()
    }

    /// Consumes the placeholder and writes the supplied value into it
    fn write_placeholder<T, HostType>(
        &mut self,
        placeholder: Placeholder<T, HostType>,
        val: HostType,
    ) -> Result<T::Output, WriteError>
    where
        T: WriteBinary<HostType>;
}

impl<T> WriteBinary<T> for I16Be
where
    T: Into<i16>,
{
    type Output = ();

    fn write<C: WriteContext>(ctxt: &mut C, t: T) -> Result<(), WriteError> {
        let val: i16 = t.into();
        ctxt.write_bytes(&val.to_be_bytes())
    }
}

impl<T> WriteBinary<T> for U16Be
where
    T: Into<u16>,
{
    type Output = ();

    fn write<C: WriteContext>(ctxt: &mut C, t: T) -> Result<(), WriteError> {
        let val: u16 = t.into();
        ctxt.write_bytes(&val.to_be_bytes())
    }
}

impl<T> WriteBinary<T> for I32Be
where
    T: Into<i32>,
{
    type Output = ();

    fn write<C: WriteContext>(ctxt: &mut C, t: T) -> Result<(), WriteError> {
        let val: i32 = t.into();
        ctxt.write_bytes(&val.to_be_bytes())
    }
}

impl<T> WriteBinary<T> for U32Be
where
    T: Into<u32>,
{
    type Output = ();

    fn write<C: WriteContext>(ctxt: &mut C, t: T) -> Result<(), WriteError> {
        let val: u32 = t.into();
        ctxt.write_bytes(&val.to_be_bytes())
    }
}

impl FixedSize for U16Be {
    const SIZE: usize = size::U16;
}

impl FixedSize for I16Be {
    const SIZE: usize = size::I16;
}

impl FixedSize for U32Be {
    const SIZE: usize = size::U32;
}

impl FixedSize for I32Be {
    const SIZE: usize = size::I32;
}

impl FixedSize for Fixed {
    const SIZE: usize = size::FIXED;
}

impl FixedSize for F2Dot14 {
    const SIZE: usize = size::F2DOT14;
}

impl WriteContext for WriteBuffer {
    fn write_bytes(&mut self, data: &[u8]) -> Result<(), WriteError> {
        self.data.extend(data.iter());
        Ok(())
    }

    fn write_zeros(&mut self, count: usize) -> Result<(), WriteError> {
        let zeros = iter::repeat(0).take(count);
        self.data.extend(zeros);
        Ok(())
    }

    fn bytes_written(&self) -> usize {
        self.data.len()
    }

    fn write_placeholder<T, HostType>(
        &mut self,
        placeholder: Placeholder<T, HostType>,
        val: HostType,
    ) -> Result<T::Output, WriteError>
    where
        T: WriteBinary<HostType>,
    {
        let data = &mut self.data[placeholder.offset..];
        let data = &mut data[0..placeholder.length];
        let mut slice = WriteSlice { offset: 0, data };
        let output = T::write(&mut slice, val)?;
        if slice.offset != placeholder.length {
            return Err(WriteError::PlaceholderMismatch);
        }
        Ok(output)
    }
}

impl<'a> WriteContext for WriteSlice<'a> {
    fn write_bytes(&mut self, data: &[u8]) -> Result<(), WriteError> {
        let data_len = data.len();
        let remaining = self.data.len() - self.offset;

        if data_len <= remaining {
            let subslice = &mut self.data[self.offset..][0..data_len];
            subslice.copy_from_slice(data);
            self.offset += data_len;
            Ok(())
        } else {
            Err(WriteError::PlaceholderMismatch)
        }
    }

    fn write_zeros(&mut self, count: usize) -> Result<(), WriteError> {
        self.write_bytes(&vec![0; count])
    }

    fn bytes_written(&self) -> usize {
        self.offset
    }

    fn write_placeholder<T, HostType>(
        &mut self,
        _placeholder: Placeholder<T, HostType>,
        _val: HostType,
    ) -> Result<T::Output, WriteError>
    where
        T: WriteBinary<HostType>,
    {
        Err(WriteError::PlaceholderMismatch)
    }
}

impl WriteBuffer {
    /// Create a new, empty `WriteBuffer`
    pub fn new() -> Self {
        WriteBuffer { data: Vec::new() }
    }

    /// Retrieve a slice of the data held by this buffer
    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    /// Returns the current size of the data held by this buffer
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` if nothing has been written to this buffer
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Consume `self` and return the inner buffer
    pub fn into_inner(self) -> Vec<u8> {
        self.data
    }
}

/// Convert the distance from `start` to the current position of `ctxt` into a 16-bit offset.
///
/// Offsets that do not fit in 16 bits cannot be represented in the tables produced by this
/// crate and are reported as `WriteError::OffsetOverflow`.
pub fn offset16<C: WriteContext>(ctxt: &C, start: usize) -> Result<u16, WriteError> {
    let distance = ctxt
        .bytes_written()
        .checked_sub(start)
        .ok_or(WriteError::BadValue)?;
    u16::try_from(distance).map_err(|_| WriteError::OffsetOverflow)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic() {
        let mut ctxt = WriteBuffer::new();
        U16Be::write(&mut ctxt, 0x0102u16).unwrap();
        I16Be::write(&mut ctxt, -2i16).unwrap();
        U32Be::write(&mut ctxt, 0x0A0B0C0Du32).unwrap();

        assert_eq!(ctxt.bytes(), &[1, 2, 0xFF, 0xFE, 0x0A, 0x0B, 0x0C, 0x0D]);
    }

    #[test]
    fn test_write_placeholder() {
        let mut ctxt = WriteBuffer::new();
        U16Be::write(&mut ctxt, 1u16).unwrap();
        let placeholder = ctxt.placeholder::<U16Be, u16>().unwrap();
        U16Be::write(&mut ctxt, 3u16).unwrap();
        ctxt.write_placeholder(placeholder, 2).unwrap();
        assert_eq!(ctxt.bytes(), &[0, 1, 0, 2, 0, 3]);
    }

    #[test]
    fn test_write_placeholder_overflow() {
        // A 32-bit value does not fit into a 16-bit placeholder
        let mut ctxt = WriteBuffer::new();
        let placeholder = ctxt.placeholder::<U16Be, u16>().unwrap();
        let placeholder = Placeholder::<U32Be, u32> {
            offset: placeholder.offset,
            length: placeholder.length,
            marker: PhantomData,
            host: PhantomData,
        };
        assert_eq!(
            ctxt.write_placeholder(placeholder, 1234),
            Err(WriteError::PlaceholderMismatch)
        );
    }

    #[test]
    fn test_offset16() {
        let mut ctxt = WriteBuffer::new();
        ctxt.write_zeros(10).unwrap();
        assert_eq!(offset16(&ctxt, 4), Ok(6));

        ctxt.write_zeros(usize::from(u16::MAX)).unwrap();
        assert_eq!(offset16(&ctxt, 0), Err(WriteError::OffsetOverflow));
    }
}
