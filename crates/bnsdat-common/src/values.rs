//! Small composite values stored inline in record payloads.

use std::fmt;
use std::str::FromStr;

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::Error;

fn parse_components<T: FromStr, const N: usize>(input: &str) -> Result<[T; N], Error>
where
    T: Copy + Default,
{
    let mut out = [T::default(); N];
    let mut parts = input.split(',');
    for slot in out.iter_mut() {
        let part = parts
            .next()
            .ok_or_else(|| Error::InvalidValue(input.to_string()))?;
        *slot = part
            .trim()
            .parse()
            .map_err(|_| Error::InvalidValue(input.to_string()))?;
    }
    if parts.next().is_some() {
        return Err(Error::InvalidValue(input.to_string()));
    }
    Ok(out)
}

/// Three 16-bit coordinates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C)]
pub struct Vector16 {
    pub x: i16,
    pub y: i16,
    pub z: i16,
}

impl Vector16 {
    pub const fn new(x: i16, y: i16, z: i16) -> Self {
        Self { x, y, z }
    }
}

impl FromStr for Vector16 {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let [x, y, z] = parse_components::<i16, 3>(s)?;
        Ok(Self::new(x, y, z))
    }
}

impl fmt::Display for Vector16 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{},{}", self.x, self.y, self.z)
    }
}

/// Three 32-bit coordinates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C)]
pub struct Vector32 {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl Vector32 {
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }
}

impl FromStr for Vector32 {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let [x, y, z] = parse_components::<i32, 3>(s)?;
        Ok(Self::new(x, y, z))
    }
}

impl fmt::Display for Vector32 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{},{}", self.x, self.y, self.z)
    }
}

/// Axis-aligned box given by two 16-bit corners.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C)]
pub struct BoundingBox {
    pub x1: i16,
    pub y1: i16,
    pub z1: i16,
    pub x2: i16,
    pub y2: i16,
    pub z2: i16,
}

impl BoundingBox {
    pub const fn new(x1: i16, y1: i16, z1: i16, x2: i16, y2: i16, z2: i16) -> Self {
        Self {
            x1,
            y1,
            z1,
            x2,
            y2,
            z2,
        }
    }

    pub const fn begin(&self) -> Vector32 {
        Vector32::new(self.x1 as i32, self.y1 as i32, self.z1 as i32)
    }

    pub const fn end(&self) -> Vector32 {
        Vector32::new(self.x2 as i32, self.y2 as i32, self.z2 as i32)
    }
}

impl FromStr for BoundingBox {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let [x1, y1, z1, x2, y2, z2] = parse_components::<i16, 6>(s)?;
        Ok(Self::new(x1, y1, z1, x2, y2, z2))
    }
}

impl fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{},{},{},{},{},{}",
            self.x1, self.y1, self.z1, self.x2, self.y2, self.z2
        )
    }
}

/// 24-bit RGB color.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C)]
pub struct IColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl IColor {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

impl FromStr for IColor {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let [r, g, b] = parse_components::<u8, 3>(s)?;
        Ok(Self::new(r, g, b))
    }
}

impl fmt::Display for IColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{},{}", self.r, self.g, self.b)
    }
}

/// A string stored in the record's lookup by size and offset.
///
/// `string_size` is the UTF-16 byte length, including the terminator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C)]
pub struct Native {
    pub string_size: i32,
    pub offset: i32,
}

impl Native {
    pub const fn new(string_size: i32, offset: i32) -> Self {
        Self {
            string_size,
            offset,
        }
    }
}
