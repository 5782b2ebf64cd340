//! UTF-16 string arenas referenced by record fields.
//!
//! A record stores strings as `i32` byte offsets into a [`StringLookup`]: a
//! flat buffer of NUL-terminated UTF-16LE runs. Uncompressed tables share one
//! lookup between all their records; in compressed tables every record
//! carries its own.

use crate::config::len_i32;
use crate::{Error, FxHashMap, Result};

/// Byte arena of NUL-terminated UTF-16LE strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StringLookup {
    data: Vec<u8>,
}

impl Default for StringLookup {
    fn default() -> Self {
        Self::new()
    }
}

impl StringLookup {
    /// A lookup holding only the empty string at offset 0.
    pub fn new() -> Self {
        Self { data: vec![0, 0] }
    }

    /// Wrap existing lookup bytes as read from a file.
    pub fn from_bytes(data: Vec<u8>) -> Self {
        Self { data }
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    #[inline]
    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Append `value` and its terminator, returning the byte offset.
    pub fn append_string(&mut self, value: &str) -> Result<i32> {
        let offset = len_i32("string lookup offset", self.data.len())?;
        self.data.reserve((value.len() + 1) * 2);
        for unit in value.encode_utf16() {
            self.data.extend_from_slice(&unit.to_le_bytes());
        }
        self.data.extend_from_slice(&[0, 0]);
        Ok(offset)
    }

    /// Decode the string starting at `offset`.
    ///
    /// Decoding stops at a NUL code unit or at the end of the buffer.
    pub fn get_string(&self, offset: i32) -> Result<String> {
        let start = usize::try_from(offset)
            .ok()
            .filter(|&start| start < self.data.len())
            .ok_or(Error::InvalidStringOffset {
                offset: offset as i64,
                len: self.data.len(),
            })?;
        let (text, _) = decode_utf16z(&self.data[start..]);
        Ok(text)
    }

    /// Every string in the arena with its offset, in buffer order.
    pub fn strings(&self) -> Strings<'_> {
        Strings {
            data: &self.data,
            position: 0,
        }
    }
}

/// Decode a NUL-terminated UTF-16LE run. Returns the text and the number of
/// bytes consumed including the terminator.
fn decode_utf16z(bytes: &[u8]) -> (String, usize) {
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .take_while(|&unit| unit != 0)
        .collect();
    let consumed = (units.len() * 2 + 2).min(bytes.len());
    (String::from_utf16_lossy(&units), consumed)
}

/// Iterator over the runs of a [`StringLookup`].
#[derive(Debug, Clone)]
pub struct Strings<'a> {
    data: &'a [u8],
    position: usize,
}

impl Iterator for Strings<'_> {
    type Item = (i32, String);

    fn next(&mut self) -> Option<Self::Item> {
        if self.position + 2 > self.data.len() {
            return None;
        }
        let offset = i32::try_from(self.position).ok()?;
        let (text, consumed) = decode_utf16z(&self.data[self.position..]);
        self.position += consumed;
        Some((offset, text))
    }
}

/// Deduplicating writer for a [`StringLookup`].
///
/// One builder covers one scope: a whole uncompressed table, or a single
/// record of a compressed table. Within the scope each distinct string is
/// stored once; separate builders never share offsets.
#[derive(Debug, Clone)]
pub struct StringLookupBuilder {
    lookup: StringLookup,
    offsets: FxHashMap<String, i32>,
}

impl Default for StringLookupBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl StringLookupBuilder {
    pub fn new() -> Self {
        let mut offsets = FxHashMap::default();
        offsets.insert(String::new(), 0);
        Self {
            lookup: StringLookup::new(),
            offsets,
        }
    }

    /// Continue appending to an existing lookup. Strings already present are
    /// reused by later appends; the first occurrence wins.
    ///
    /// An edit through `resume` can encode differently from the same edit
    /// through [`extend`](Self::extend), which always appends after the
    /// existing data.
    pub fn resume(lookup: StringLookup) -> Self {
        let mut offsets = FxHashMap::default();
        for (offset, text) in lookup.strings() {
            offsets.entry(text).or_insert(offset);
        }
        Self { lookup, offsets }
    }

    /// Continue appending to an existing lookup with an empty cache.
    ///
    /// Nothing already in the lookup is reused, not even the empty string;
    /// each distinct value is appended once on first use.
    pub fn extend(lookup: StringLookup) -> Self {
        Self {
            lookup,
            offsets: FxHashMap::default(),
        }
    }

    /// Offset of `value`, appending it if this scope has not stored it yet.
    pub fn append(&mut self, value: &str) -> Result<i32> {
        if let Some(&offset) = self.offsets.get(value) {
            return Ok(offset);
        }
        let offset = self.lookup.append_string(value)?;
        self.offsets.insert(value.to_string(), offset);
        Ok(offset)
    }

    /// Append `value` without consulting or updating the cache.
    pub fn append_unique(&mut self, value: &str) -> Result<i32> {
        self.lookup.append_string(value)
    }

    pub fn lookup(&self) -> &StringLookup {
        &self.lookup
    }

    pub fn finish(self) -> StringLookup {
        self.lookup
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_lookup() {
        let lookup = StringLookup::new();
        assert_eq!(lookup.as_bytes(), &[0, 0]);
        assert_eq!(lookup.get_string(0).unwrap(), "");
    }

    #[test]
    fn test_append_and_get() {
        let mut lookup = StringLookup::new();
        let hello = lookup.append_string("hello").unwrap();
        let korean = lookup.append_string("검").unwrap();

        assert_eq!(hello, 2);
        assert_eq!(korean, 2 + 12);
        assert_eq!(&lookup.as_bytes()[2..6], &[b'h', 0, b'e', 0]);
        assert_eq!(lookup.get_string(hello).unwrap(), "hello");
        assert_eq!(lookup.get_string(korean).unwrap(), "검");
        // mid-string offsets decode the tail
        assert_eq!(lookup.get_string(hello + 4).unwrap(), "llo");
    }

    #[test]
    fn test_invalid_offset() {
        let lookup = StringLookup::new();
        assert!(matches!(
            lookup.get_string(2),
            Err(Error::InvalidStringOffset { offset: 2, len: 2 })
        ));
        assert!(lookup.get_string(-1).is_err());
    }

    #[test]
    fn test_unterminated_run() {
        let lookup = StringLookup::from_bytes(vec![b'a', 0, b'b', 0]);
        assert_eq!(lookup.get_string(0).unwrap(), "ab");
    }

    #[test]
    fn test_builder_deduplicates() {
        let mut builder = StringLookupBuilder::new();
        let a = builder.append("alpha").unwrap();
        let b = builder.append("beta").unwrap();
        assert_eq!(builder.append("alpha").unwrap(), a);
        assert_eq!(builder.append("").unwrap(), 0);
        assert_ne!(a, b);

        let unique = builder.append_unique("alpha").unwrap();
        assert_ne!(unique, a);

        let lookup = builder.finish();
        assert_eq!(lookup.len(), 2 + 12 + 10 + 12);
    }

    #[test]
    fn test_separate_scopes_are_independent() {
        let mut first = StringLookupBuilder::new();
        first.append("x").unwrap();
        let in_first = first.append("shared").unwrap();

        let mut second = StringLookupBuilder::new();
        let in_second = second.append("shared").unwrap();

        assert_ne!(in_first, in_second);
    }

    #[test]
    fn test_resume() {
        let mut lookup = StringLookup::new();
        let existing = lookup.append_string("kept").unwrap();

        let mut builder = StringLookupBuilder::resume(lookup);
        assert_eq!(builder.append("kept").unwrap(), existing);
        assert_eq!(builder.append("").unwrap(), 0);
        let fresh = builder.append("new").unwrap();
        assert_eq!(fresh, 2 + 10);

        let strings: Vec<_> = builder.lookup().strings().collect();
        assert_eq!(
            strings,
            vec![(0, String::new()), (2, "kept".into()), (12, "new".into())]
        );
    }

    #[test]
    fn test_extend_appends_fresh() {
        let mut lookup = StringLookup::new();
        lookup.append_string("kept").unwrap();

        let mut builder = StringLookupBuilder::extend(lookup);
        assert_eq!(builder.append("kept").unwrap(), 12);
        assert_eq!(builder.append("").unwrap(), 22);
        assert_eq!(builder.append("kept").unwrap(), 12);

        let strings: Vec<_> = builder.finish().strings().collect();
        assert_eq!(
            strings,
            vec![
                (0, String::new()),
                (2, "kept".into()),
                (12, "kept".into()),
                (22, String::new()),
            ]
        );
    }
}
