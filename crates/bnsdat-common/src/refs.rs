//! Record reference types.
//!
//! Every record in a datafile is identified by a [`Ref`]: a 32-bit id and a
//! 32-bit variant stored back to back. The pair is compared, hashed and
//! sorted as one unsigned 64-bit value, the little-endian reading of the
//! 8 bytes `id ‖ variant`. That makes the variant the most significant half.
//!
//! [`TRef`] additionally names the table a reference points into, and
//! [`IconRef`] points at an icon texture with an extra trailing value.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::Error;

/// 64-bit record identity.
#[derive(Clone, Copy, Default, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C)]
pub struct Ref {
    pub id: i32,
    pub variant: i32,
}

impl Ref {
    /// The null reference.
    pub const NONE: Self = Self { id: 0, variant: 0 };

    #[inline]
    pub const fn new(id: i32, variant: i32) -> Self {
        Self { id, variant }
    }

    /// Reinterpret a packed 64-bit key.
    #[inline]
    pub const fn from_u64(value: u64) -> Self {
        Self {
            id: value as u32 as i32,
            variant: (value >> 32) as u32 as i32,
        }
    }

    /// The packed 64-bit key.
    #[inline]
    pub const fn as_u64(&self) -> u64 {
        ((self.variant as u32 as u64) << 32) | self.id as u32 as u64
    }

    #[inline]
    pub const fn is_none(&self) -> bool {
        self.as_u64() == 0
    }
}

impl PartialEq for Ref {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.as_u64() == other.as_u64()
    }
}

impl Eq for Ref {}

impl Hash for Ref {
    #[inline]
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.as_u64());
    }
}

impl PartialOrd for Ref {
    #[inline]
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Ref {
    #[inline]
    fn cmp(&self, other: &Self) -> Ordering {
        self.as_u64().cmp(&other.as_u64())
    }
}

impl From<u64> for Ref {
    fn from(value: u64) -> Self {
        Self::from_u64(value)
    }
}

impl From<Ref> for u64 {
    fn from(value: Ref) -> Self {
        value.as_u64()
    }
}

impl From<TRef> for Ref {
    fn from(value: TRef) -> Self {
        Self::new(value.id, value.variant)
    }
}

impl From<IconRef> for Ref {
    fn from(value: IconRef) -> Self {
        Self::new(value.texture_id, value.variant_id)
    }
}

impl fmt::Display for Ref {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.id, self.variant)
    }
}

impl fmt::Debug for Ref {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Ref({}:{})", self.id, self.variant)
    }
}

fn parse_i32(part: &str, whole: &str) -> Result<i32, Error> {
    part.trim()
        .parse()
        .map_err(|_| Error::InvalidReference(whole.to_string()))
}

impl FromStr for Ref {
    type Err = Error;

    /// Parse `"id:variant"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (id, variant) = s
            .split_once(':')
            .ok_or_else(|| Error::InvalidReference(s.to_string()))?;
        Ok(Self::new(parse_i32(id, s)?, parse_i32(variant, s)?))
    }
}

/// A reference qualified by its table type.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C)]
pub struct TRef {
    pub table: i32,
    pub id: i32,
    pub variant: i32,
}

impl TRef {
    pub const NONE: Self = Self {
        table: 0,
        id: 0,
        variant: 0,
    };

    #[inline]
    pub const fn new(table: i32, id: i32, variant: i32) -> Self {
        Self { table, id, variant }
    }

    #[inline]
    pub const fn from_ref(table: i32, r: Ref) -> Self {
        Self::new(table, r.id, r.variant)
    }

    #[inline]
    pub const fn to_ref(&self) -> Ref {
        Ref::new(self.id, self.variant)
    }

    /// Table 0 with a null reference means "no reference".
    #[inline]
    pub const fn is_none(&self) -> bool {
        self.table == 0 && self.to_ref().is_none()
    }
}

impl fmt::Display for TRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.table, self.id, self.variant)
    }
}

impl fmt::Debug for TRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TRef({}:{}, table: {})", self.id, self.variant, self.table)
    }
}

impl FromStr for TRef {
    type Err = Error;

    /// Parse `"table:id:variant"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (table, rest) = s
            .split_once(':')
            .ok_or_else(|| Error::InvalidReference(s.to_string()))?;
        let r: Ref = rest
            .parse()
            .map_err(|_| Error::InvalidReference(s.to_string()))?;
        Ok(Self::from_ref(parse_i32(table, s)?, r))
    }
}

/// Reference to an icon texture record.
#[derive(Clone, Copy, PartialEq, Eq, Hash, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C)]
pub struct IconRef {
    pub texture_id: i32,
    pub variant_id: i32,
    pub extra: i32,
}

impl IconRef {
    pub const DEFAULT_EXTRA: i32 = 1;

    #[inline]
    pub const fn new(texture_id: i32, variant_id: i32, extra: i32) -> Self {
        Self {
            texture_id,
            variant_id,
            extra,
        }
    }

    #[inline]
    pub const fn from_ref(r: Ref) -> Self {
        Self::new(r.id, r.variant, Self::DEFAULT_EXTRA)
    }
}

impl Default for IconRef {
    fn default() -> Self {
        Self::new(0, 0, Self::DEFAULT_EXTRA)
    }
}

impl From<Ref> for IconRef {
    fn from(value: Ref) -> Self {
        Self::from_ref(value)
    }
}

impl fmt::Display for IconRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.texture_id, self.variant_id, self.extra)
    }
}

impl fmt::Debug for IconRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "IconRef(id: {}, variant: {}, extra: {})",
            self.texture_id, self.variant_id, self.extra
        )
    }
}

impl FromStr for IconRef {
    type Err = Error;

    /// Parse `"id:variant"` or `"id:variant:extra"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.splitn(3, ':');
        let id = parts.next().unwrap_or_default();
        let variant = parts
            .next()
            .ok_or_else(|| Error::InvalidReference(s.to_string()))?;
        let extra = match parts.next() {
            Some(extra) => parse_i32(extra, s)?,
            None => Self::DEFAULT_EXTRA,
        };
        Ok(Self::new(parse_i32(id, s)?, parse_i32(variant, s)?, extra))
    }
}

macro_rules! impl_serde_via_display {
    ($($t:ty),*) => {$(
        #[cfg(feature = "serde")]
        impl serde::Serialize for $t {
            fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: serde::Serializer,
            {
                serializer.collect_str(self)
            }
        }

        #[cfg(feature = "serde")]
        impl<'de> serde::Deserialize<'de> for $t {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: serde::Deserializer<'de>,
            {
                let s = String::deserialize(deserializer)?;
                s.parse().map_err(serde::de::Error::custom)
            }
        }
    )*};
}

impl_serde_via_display!(Ref, TRef, IconRef);
