//! Typed access to values at raw byte offsets.
//!
//! Record payloads have no self-describing layout: a schema that lives outside
//! this crate says "offset 24 is an `i32`", and callers read and write through
//! [`get_field`] / [`set_field`]. Only bounds are checked, never types.

use zerocopy::{FromBytes, IntoBytes};

use crate::{BoundingBox, Error, IColor, IconRef, Native, Ref, Result, TRef, Vector16, Vector32};

/// A fixed-size value that can be stored at a byte offset.
pub trait Field: Sized + Copy {
    /// Encoded size in bytes.
    const SIZE: usize;

    /// Decode from exactly [`Self::SIZE`] bytes.
    fn read_field(bytes: &[u8]) -> Self;

    /// Encode into exactly [`Self::SIZE`] bytes.
    fn write_field(&self, bytes: &mut [u8]);
}

macro_rules! impl_field_le {
    ($($t:ty),*) => {$(
        impl Field for $t {
            const SIZE: usize = std::mem::size_of::<$t>();

            #[inline]
            fn read_field(bytes: &[u8]) -> Self {
                let mut buf = [0u8; std::mem::size_of::<$t>()];
                buf.copy_from_slice(bytes);
                <$t>::from_le_bytes(buf)
            }

            #[inline]
            fn write_field(&self, bytes: &mut [u8]) {
                bytes.copy_from_slice(&self.to_le_bytes());
            }
        }
    )*};
}

impl_field_le!(u8, i8, u16, i16, u32, i32, u64, i64, f32, f64);

impl Field for bool {
    const SIZE: usize = 1;

    #[inline]
    fn read_field(bytes: &[u8]) -> Self {
        bytes[0] != 0
    }

    #[inline]
    fn write_field(&self, bytes: &mut [u8]) {
        bytes[0] = *self as u8;
    }
}

// Plain-old-data structs share the in-file layout, so zerocopy moves them.
macro_rules! impl_field_pod {
    ($($t:ty),*) => {$(
        impl Field for $t {
            const SIZE: usize = std::mem::size_of::<$t>();

            #[inline]
            fn read_field(bytes: &[u8]) -> Self {
                <$t>::read_from_bytes(bytes).unwrap_or_default()
            }

            #[inline]
            fn write_field(&self, bytes: &mut [u8]) {
                bytes.copy_from_slice(self.as_bytes());
            }
        }
    )*};
}

impl_field_pod!(Ref, TRef, IconRef, Vector16, Vector32, BoundingBox, IColor, Native);

fn check_range(len: usize, offset: usize, size: usize) -> Result<()> {
    if offset.checked_add(size).map_or(true, |end| end > len) {
        return Err(Error::FieldOutOfRange { offset, size, len });
    }
    Ok(())
}

/// Read a `T` at `offset`.
#[inline]
pub fn get_field<T: Field>(data: &[u8], offset: usize) -> Result<T> {
    check_range(data.len(), offset, T::SIZE)?;
    Ok(T::read_field(&data[offset..offset + T::SIZE]))
}

/// Write a `T` at `offset`.
#[inline]
pub fn set_field<T: Field>(data: &mut [u8], offset: usize, value: T) -> Result<()> {
    check_range(data.len(), offset, T::SIZE)?;
    value.write_field(&mut data[offset..offset + T::SIZE]);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primitive_roundtrip() {
        let mut data = [0u8; 16];
        set_field(&mut data, 0, -2i16).unwrap();
        set_field(&mut data, 2, 0xABCDu16).unwrap();
        set_field(&mut data, 4, 1.5f32).unwrap();
        set_field(&mut data, 8, i64::MIN).unwrap();

        assert_eq!(&data[0..4], &[0xFE, 0xFF, 0xCD, 0xAB]);
        assert_eq!(get_field::<i16>(&data, 0).unwrap(), -2);
        assert_eq!(get_field::<u16>(&data, 2).unwrap(), 0xABCD);
        assert_eq!(get_field::<f32>(&data, 4).unwrap(), 1.5);
        assert_eq!(get_field::<i64>(&data, 8).unwrap(), i64::MIN);
    }

    #[test]
    fn test_composite_fields() {
        let mut data = [0u8; 20];
        set_field(&mut data, 4, Ref::new(7, 2)).unwrap();
        set_field(&mut data, 12, IColor::new(1, 2, 3)).unwrap();

        assert_eq!(&data[4..12], &[7, 0, 0, 0, 2, 0, 0, 0]);
        assert_eq!(get_field::<Ref>(&data, 4).unwrap(), Ref::new(7, 2));
        assert_eq!(get_field::<i32>(&data, 8).unwrap(), 2);
        assert_eq!(get_field::<IColor>(&data, 12).unwrap(), IColor::new(1, 2, 3));
    }

    #[test]
    fn test_out_of_range() {
        let mut data = [0u8; 8];
        assert!(matches!(
            get_field::<i32>(&data, 6),
            Err(Error::FieldOutOfRange {
                offset: 6,
                size: 4,
                len: 8
            })
        ));
        assert!(set_field(&mut data, 0, TRef::NONE).is_err());
        assert!(get_field::<u8>(&data, usize::MAX).is_err());
        assert!(get_field::<u64>(&data, 0).is_ok());
    }
}
