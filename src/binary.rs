/// Read binary data
pub mod read;

/// Write binary data
pub mod write;

use crate::binary::write::{WriteBinary, WriteContext};
use crate::error::WriteError;

#[derive(Copy, Clone)]
pub enum U16Be {}

#[derive(Copy, Clone)]
pub enum I16Be {}

#[derive(Copy, Clone)]
pub enum U32Be {}

#[derive(Copy, Clone)]
pub enum I32Be {}

/// 32-bit signed fixed-point number (16.16).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct Fixed(i32);

/// 16-bit signed fixed number with the low 14 bits of fraction (2.14).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct F2Dot14(i16);

impl Fixed {
    pub const ZERO: Fixed = Fixed(0);

    pub fn from_raw(value: i32) -> Fixed {
        Fixed(value)
    }

    pub fn raw_value(self) -> i32 {
        self.0
    }
}

impl TryFrom<f64> for Fixed {
    type Error = WriteError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        let scaled = (value * 65536.0).round();
        if !scaled.is_finite() || scaled < f64::from(i32::MIN) || scaled > f64::from(i32::MAX) {
            return Err(WriteError::BadValue);
        }
        Ok(Fixed(scaled as i32))
    }
}

impl From<Fixed> for f64 {
    fn from(value: Fixed) -> f64 {
        f64::from(value.0) / 65536.0
    }
}

impl WriteBinary for Fixed {
    type Output = ();

    fn write<C: WriteContext>(ctxt: &mut C, val: Self) -> Result<(), WriteError> {
        I32Be::write(ctxt, val.0)
    }
}

impl F2Dot14 {
    pub const ZERO: F2Dot14 = F2Dot14(0);

    pub fn from_raw(value: i16) -> F2Dot14 {
        F2Dot14(value)
    }

    pub fn raw_value(self) -> i16 {
        self.0
    }
}

impl TryFrom<f64> for F2Dot14 {
    type Error = WriteError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        let scaled = (value * 16384.0).round();
        if !scaled.is_finite() || scaled < f64::from(i16::MIN) || scaled > f64::from(i16::MAX) {
            return Err(WriteError::BadValue);
        }
        Ok(F2Dot14(scaled as i16))
    }
}

impl From<F2Dot14> for f64 {
    fn from(value: F2Dot14) -> f64 {
        f64::from(value.0) / 16384.0
    }
}

impl WriteBinary for F2Dot14 {
    type Output = ();

    fn write<C: WriteContext>(ctxt: &mut C, val: Self) -> Result<(), WriteError> {
        I16Be::write(ctxt, val.0)
    }
}

#[cfg(test)]
mod tests {
    use super::{F2Dot14, Fixed};
    use crate::error::WriteError;

    #[test]
    fn test_fixed_from_f64() {
        assert_eq!(Fixed::try_from(1.0).unwrap().raw_value(), 0x0001_0000);
        assert_eq!(Fixed::try_from(-0.5).unwrap().raw_value(), -0x8000);
        assert_eq!(Fixed::try_from(0.25).unwrap().raw_value(), 0x4000);
        assert_eq!(Fixed::try_from(1e12), Err(WriteError::BadValue));
        assert_eq!(Fixed::try_from(f64::NAN), Err(WriteError::BadValue));
    }

    #[test]
    fn test_f2dot14_from_f64() {
        assert_eq!(F2Dot14::try_from(1.0).unwrap().raw_value(), 0x4000);
        assert_eq!(F2Dot14::try_from(-1.0).unwrap().raw_value(), -0x4000);
        assert_eq!(F2Dot14::try_from(0.5).unwrap().raw_value(), 0x2000);
        // 2.0 is just out of range
        assert_eq!(F2Dot14::try_from(2.0), Err(WriteError::BadValue));
    }
}
