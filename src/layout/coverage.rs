//! Coverage tables and the offset arithmetic shared by every subtable.

use itertools::Itertools;

use crate::binary::read::{ReadBinary, ReadCtxt};
use crate::binary::write::{WriteBinary, WriteContext};
use crate::binary::U16Be;
use crate::error::{ParseError, WriteError};
use crate::glyph::GlyphId;
use crate::size;

/// A coverage table. Only the glyph list format (format 1) is produced.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Coverage {
    glyphs: Vec<GlyphId>,
}

impl Coverage {
    /// Build a coverage from glyphs in any order; duplicates are removed.
    pub fn new(glyphs: impl IntoIterator<Item = GlyphId>) -> Coverage {
        let mut glyphs: Vec<GlyphId> = glyphs.into_iter().collect();
        glyphs.sort_unstable();
        glyphs.dedup();
        Coverage { glyphs }
    }

    pub fn glyphs(&self) -> &[GlyphId] {
        &self.glyphs
    }

    pub fn len(&self) -> usize {
        self.glyphs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.glyphs.is_empty()
    }

    /// Index of `glyph` within the coverage.
    pub fn glyph_coverage_value(&self, glyph: GlyphId) -> Option<u16> {
        self.glyphs
            .binary_search(&glyph)
            .ok()
            .and_then(|index| u16::try_from(index).ok())
    }

    /// Encoded size of a format 1 coverage of `count` glyphs.
    pub fn size_for(count: usize) -> usize {
        2 * size::U16 + count * size::U16
    }

    pub fn size(&self) -> usize {
        Coverage::size_for(self.glyphs.len())
    }
}

impl WriteBinary<&Self> for Coverage {
    type Output = ();

    fn write<C: WriteContext>(ctxt: &mut C, coverage: &Coverage) -> Result<(), WriteError> {
        let ascending = coverage.glyphs.iter().tuple_windows().all(|(a, b)| a < b);
        debug_assert!(ascending, "coverage glyphs must be strictly ascending");
        if !ascending {
            return Err(WriteError::Unsorted);
        }
        U16Be::write(ctxt, 1u16)?; // format
        U16Be::write(ctxt, u16::try_from(coverage.glyphs.len())?)?;
        ctxt.write_iter::<U16Be, _>(coverage.glyphs.iter().copied())
    }
}

impl ReadBinary for Coverage {
    fn read(ctxt: &mut ReadCtxt<'_>) -> Result<Self, ParseError> {
        match ctxt.read_u16be()? {
            1 => {
                let glyph_count = usize::from(ctxt.read_u16be()?);
                let glyphs = ctxt.read_u16be_vec(glyph_count)?;
                Ok(Coverage { glyphs })
            }
            _ => Err(ParseError::BadVersion),
        }
    }
}

/// Running 16-bit offset over blocks emitted one after the other.
///
/// Starting from `base`, each call to `advance` reserves a block and returns its offset.
#[derive(Copy, Clone, Debug)]
pub struct OffsetCursor {
    next: usize,
}

impl OffsetCursor {
    pub fn new(base: usize) -> OffsetCursor {
        OffsetCursor { next: base }
    }

    /// Offset of the next free byte.
    pub fn offset(&self) -> Result<u16, WriteError> {
        u16::try_from(self.next).map_err(|_| WriteError::OffsetOverflow)
    }

    /// Return the offset of a block of `block_len` bytes and move past it.
    pub fn advance(&mut self, block_len: usize) -> Result<u16, WriteError> {
        let offset = self.offset()?;
        self.next += block_len;
        Ok(offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binary::read::ReadScope;
    use crate::binary::write::WriteBuffer;

    #[test]
    fn test_coverage_sorted_unique() {
        let coverage = Coverage::new([40, 3, 17, 3, 40]);
        assert_eq!(coverage.glyphs(), &[3, 17, 40]);
        assert_eq!(coverage.glyph_coverage_value(17), Some(1));
        assert_eq!(coverage.glyph_coverage_value(18), None);

        let mut ctxt = WriteBuffer::new();
        Coverage::write(&mut ctxt, &coverage).unwrap();
        assert_eq!(ctxt.bytes(), &[0, 1, 0, 3, 0, 3, 0, 17, 0, 40]);
        assert_eq!(ctxt.len(), coverage.size());

        let read = ReadScope::new(ctxt.bytes()).read::<Coverage>().unwrap();
        assert_eq!(read, coverage);
    }

    #[test]
    fn test_offset_cursor() {
        let mut cursor = OffsetCursor::new(10);
        assert_eq!(cursor.advance(6), Ok(10));
        assert_eq!(cursor.advance(22), Ok(16));
        assert_eq!(cursor.offset(), Ok(38));

        let mut cursor = OffsetCursor::new(0xFFF0);
        assert_eq!(cursor.advance(0x20), Ok(0xFFF0));
        assert_eq!(cursor.offset(), Err(WriteError::OffsetOverflow));
    }
}
