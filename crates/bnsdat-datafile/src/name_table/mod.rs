//! Alias name table: a persisted radix trie from alias strings to [`Ref`]s.
//!
//! # Layout
//!
//! ```text
//! [root begin u32][root end u32][entry count i32]
//! entry*: [string offset i32 | i64 (64-bit)][begin u32][end u32]
//! [string table size u32][CP949 NUL-terminated strings]
//! ```
//!
//! An entry is either a range or a leaf, told apart by the low bit of
//! `begin`:
//!
//! - range: `begin = first << 1`, `end = last`, covering the contiguous
//!   children `first..=last` of the entry array
//! - leaf: `begin | end << 32 == (ref << 1) | 1`
//!
//! Children of a range are sorted by the CP949 bytes of their label, which
//! lets the game binary-search them.

mod cp949;
mod rebuilder;

pub use rebuilder::Rebuilder;

use std::io::{Read, Seek, SeekFrom};
use std::ops::Range;
use std::sync::OnceLock;

use bnsdat_common::{BinaryReader, BinaryWriter, Ref, Source, SourceRef};
use byteorder::{LittleEndian, ReadBytesExt};
use tracing::debug;

use crate::config::{len_i32, IntWidth};
use crate::{Error, Result};

/// Bytes before the first entry.
const SECTION_HEADER_SIZE: u64 = 12;

/// Encoded size of one entry.
pub const fn entry_size(width: IntWidth) -> usize {
    width.size() + 8
}

/// One node of the persisted trie.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NameTableEntry {
    /// Edge label leading to this node.
    pub string: String,
    pub begin: u32,
    pub end: u32,
}

impl NameTableEntry {
    /// A leaf pointing at `key`.
    pub fn leaf(string: impl Into<String>, key: Ref) -> Self {
        let (begin, end) = pack_ref(key);
        Self {
            string: string.into(),
            begin,
            end,
        }
    }

    #[inline]
    pub fn is_leaf(&self) -> bool {
        self.begin & 1 == 1
    }

    /// The record this leaf points at. Only meaningful for leaves.
    pub fn to_ref(&self) -> Ref {
        unpack_ref(self.begin, self.end)
    }

    /// Indices of the children of a range entry.
    pub fn children(&self) -> Range<usize> {
        span(self.begin, self.end)
    }
}

pub(crate) fn pack_ref(key: Ref) -> (u32, u32) {
    let packed = (key.as_u64() << 1) | 1;
    (packed as u32, (packed >> 32) as u32)
}

fn unpack_ref(begin: u32, end: u32) -> Ref {
    Ref::from_u64((begin as u64 | (end as u64) << 32) >> 1)
}

fn span(begin: u32, end: u32) -> Range<usize> {
    // an empty range stores `end = first - 1`
    (begin >> 1) as usize..end.wrapping_add(1) as usize
}

#[derive(Debug)]
struct LazySection {
    source: SourceRef,
    width: IntWidth,
}

/// The alias index of a datafile.
#[derive(Debug)]
pub struct NameTable {
    root_begin: u32,
    root_end: u32,
    entry_count: usize,
    entries: OnceLock<Vec<NameTableEntry>>,
    lazy: Option<LazySection>,
}

impl Default for NameTable {
    fn default() -> Self {
        Self::new()
    }
}

impl NameTable {
    /// An empty name table.
    pub fn new() -> Self {
        Self::from_entries(0, u32::MAX, Vec::new())
    }

    fn from_entries(root_begin: u32, root_end: u32, entries: Vec<NameTableEntry>) -> Self {
        let entry_count = entries.len();
        let lock = OnceLock::new();
        let _ = lock.set(entries);
        Self {
            root_begin,
            root_end,
            entry_count,
            entries: lock,
            lazy: None,
        }
    }

    /// Decode a name table section.
    pub fn read(reader: &mut BinaryReader<'_>, width: IntWidth) -> Result<Self> {
        let root_begin = reader.read_u32()?;
        let root_end = reader.read_u32()?;
        let entry_count = read_entry_count(reader.read_i32()?)?;

        let mut raw = Vec::with_capacity(entry_count);
        for _ in 0..entry_count {
            let string_offset = width.read(reader)?;
            let begin = reader.read_u32()?;
            let end = reader.read_u32()?;
            raw.push((string_offset, begin, end));
        }

        let strings_size = reader.read_u32()? as usize;
        let strings = reader.read_bytes(strings_size)?;

        let entries = raw
            .into_iter()
            .map(|(string_offset, begin, end)| {
                Ok(NameTableEntry {
                    string: read_alias_string(strings, string_offset)?,
                    begin,
                    end,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self::from_entries(root_begin, root_end, entries))
    }

    /// Skip over a name table section, remembering where it lives in
    /// `source`. Entries are decoded on first access. `stream` must be
    /// positioned at the start of the section and reads `source`.
    pub fn scan<R: Read + Seek>(stream: &mut R, source: &SourceRef, width: IntWidth) -> Result<Self> {
        let start = stream.stream_position()?;
        let root_begin = stream.read_u32::<LittleEndian>()?;
        let root_end = stream.read_u32::<LittleEndian>()?;
        let entry_count = read_entry_count(stream.read_i32::<LittleEndian>()?)?;

        stream.seek(SeekFrom::Current((entry_count * entry_size(width)) as i64))?;
        let strings_size = stream.read_u32::<LittleEndian>()?;
        stream.seek(SeekFrom::Current(strings_size as i64))?;

        let end = stream.stream_position()?;
        let source = source.sub_range(start, end - start)?;
        debug!(entries = entry_count, bytes = end - start, "scanned name table");

        Ok(Self {
            root_begin,
            root_end,
            entry_count,
            entries: OnceLock::new(),
            lazy: Some(LazySection { source, width }),
        })
    }

    /// Packed `(begin, end)` of the root range.
    pub fn root(&self) -> (u32, u32) {
        (self.root_begin, self.root_end)
    }

    /// Indices of the root's children.
    pub fn root_children(&self) -> Range<usize> {
        span(self.root_begin, self.root_end)
    }

    /// Number of entries, known without decoding a lazy table.
    pub fn len(&self) -> usize {
        self.entries.get().map_or(self.entry_count, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the entries have been decoded.
    pub fn is_loaded(&self) -> bool {
        self.entries.get().is_some()
    }

    pub fn entries(&self) -> Result<&[NameTableEntry]> {
        if let Some(entries) = self.entries.get() {
            return Ok(entries);
        }
        let Some(lazy) = &self.lazy else {
            return Err(Error::Unsupported("name table has neither entries nor a source"));
        };

        let bytes = lazy.source.read_bytes()?;
        let table = Self::read(&mut BinaryReader::new(&bytes), lazy.width)?;
        let entries = table
            .entries
            .into_inner()
            .ok_or(Error::Unsupported("name table has neither entries nor a source"))?;
        Ok(self.entries.get_or_init(|| entries))
    }

    pub fn entries_mut(&mut self) -> Result<&mut Vec<NameTableEntry>> {
        self.entries()?;
        self.entries
            .get_mut()
            .ok_or(Error::Unsupported("name table has neither entries nor a source"))
    }

    /// Start rebuilding the trie from scratch.
    pub fn begin_rebuild(&mut self) -> Rebuilder<'_> {
        Rebuilder::new(self)
    }

    pub(crate) fn replace(&mut self, root_begin: u32, root_end: u32, entries: Vec<NameTableEntry>) {
        *self = Self::from_entries(root_begin, root_end, entries);
    }

    /// Find the record an alias points at.
    pub fn resolve(&self, alias: &str) -> Result<Option<Ref>> {
        let entries = self.entries()?;
        let mut range = self.root_children();
        let mut rest = alias;

        // every step descends one level, so a well-formed trie needs fewer
        // steps than it has entries
        for _ in 0..=entries.len() {
            let children = entries.get(range.clone()).ok_or_else(|| corrupt_range(&range, entries.len()))?;
            let mut next = None;
            for child in children {
                if child.is_leaf() {
                    if child.string == rest {
                        return Ok(Some(child.to_ref()));
                    }
                } else if next.is_none() {
                    if let Some(tail) = rest.strip_prefix(child.string.as_str()) {
                        next = Some((tail, child.children()));
                    }
                }
            }
            match next {
                Some((tail, children)) => {
                    rest = tail;
                    range = children;
                }
                None => return Ok(None),
            }
        }
        Err(Error::CorruptNameTable("range entries form a cycle".to_string()))
    }

    /// Every alias in the table with the record it points at, in trie order.
    pub fn aliases(&self) -> Result<Vec<(String, Ref)>> {
        let entries = self.entries()?;
        let mut aliases = Vec::new();
        let mut stack = Vec::new();
        push_children(&mut stack, entries, self.root_children(), "", 0)?;

        while let Some((path, entry, depth)) = stack.pop() {
            if entry.is_leaf() {
                aliases.push((path, entry.to_ref()));
            } else {
                push_children(&mut stack, entries, entry.children(), &path, depth + 1)?;
            }
        }
        Ok(aliases)
    }

    /// Encode the section. A lazy table whose entries were never decoded is
    /// copied verbatim.
    pub fn write_to(&self, writer: &mut BinaryWriter, width: IntWidth) -> Result<()> {
        let Some(entries) = self.entries.get() else {
            let Some(lazy) = &self.lazy else {
                return Err(Error::Unsupported("name table has neither entries nor a source"));
            };
            writer.write_bytes(&lazy.source.read_bytes()?);
            return Ok(());
        };

        writer.write_u32(self.root_begin);
        writer.write_u32(self.root_end);
        writer.write_i32(len_i32("name table entry count", entries.len())?);

        let mut strings = Vec::new();
        for entry in entries {
            let offset = strings.len() as i64;
            strings.extend_from_slice(&cp949::encode(&entry.string)?);
            strings.push(0);

            width.write(writer, "name table string offset", offset)?;
            writer.write_u32(entry.begin);
            writer.write_u32(entry.end);
        }

        let strings_size = u32::try_from(strings.len()).map_err(|_| Error::FieldOverflow {
            what: "name table string size",
            value: strings.len() as u64,
        })?;
        writer.write_u32(strings_size);
        writer.write_bytes(&strings);
        Ok(())
    }
}

fn read_entry_count(count: i32) -> Result<usize> {
    usize::try_from(count).map_err(|_| Error::UnexpectedValue {
        what: "name table entry count",
        expected: 0,
        actual: count as i64,
    })
}

fn read_alias_string(strings: &[u8], offset: i64) -> Result<String> {
    let start = usize::try_from(offset)
        .ok()
        .filter(|&start| start < strings.len())
        .ok_or(Error::InvalidStringOffset {
            offset,
            len: strings.len(),
        })?;
    let run = &strings[start..];
    let end = memchr::memchr(0, run).ok_or(bnsdat_common::Error::MissingNullTerminator)?;
    Ok(cp949::decode(&run[..end]))
}

type Pending<'a> = (String, &'a NameTableEntry, usize);

fn push_children<'a>(
    stack: &mut Vec<Pending<'a>>,
    entries: &'a [NameTableEntry],
    range: Range<usize>,
    prefix: &str,
    depth: usize,
) -> Result<()> {
    if depth > entries.len() {
        return Err(Error::CorruptNameTable("range entries form a cycle".to_string()));
    }
    let children = entries.get(range.clone()).ok_or_else(|| corrupt_range(&range, entries.len()))?;
    // reversed so the stack pops them in stored order
    for child in children.iter().rev() {
        stack.push((format!("{prefix}{}", child.string), child, depth));
    }
    Ok(())
}

fn corrupt_range(range: &Range<usize>, len: usize) -> Error {
    Error::CorruptNameTable(format!(
        "child range {}..{} outside {len} entries",
        range.start, range.end
    ))
}

/// Encoded size of a section with `entry_count` entries and `strings_size`
/// bytes of strings.
pub fn section_len(entry_count: usize, strings_size: u32, width: IntWidth) -> u64 {
    SECTION_HEADER_SIZE + (entry_count * entry_size(width)) as u64 + 4 + strings_size as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use bnsdat_common::MemorySource;
    use std::sync::Arc;

    fn sample() -> NameTable {
        let mut table = NameTable::new();
        let mut rebuild = table.begin_rebuild();
        rebuild
            .add_alias("item:sword", Ref::new(1, 0))
            .add_alias("item:shield", Ref::new(2, 0))
            .add_alias("quest:intro", Ref::new(3, 1));
        rebuild.end_rebuild().unwrap();
        table
    }

    #[test]
    fn test_ref_packing() {
        let key = Ref::new(0x1234_5678, 0x0765_4321);
        let entry = NameTableEntry::leaf("x", key);
        assert!(entry.is_leaf());
        assert_eq!(entry.to_ref(), key);
        assert_eq!(entry.begin, ((key.as_u64() << 1) | 1) as u32);
    }

    #[test]
    fn test_empty_span_wraps() {
        assert!(span(0, u32::MAX).is_empty());
        assert_eq!(span(4 << 1, 6), 4..7);
    }

    #[test]
    fn test_resolve_and_aliases() {
        let table = sample();
        assert_eq!(table.resolve("item:sword").unwrap(), Some(Ref::new(1, 0)));
        assert_eq!(table.resolve("quest:intro").unwrap(), Some(Ref::new(3, 1)));
        assert_eq!(table.resolve("item:").unwrap(), None);
        assert_eq!(table.resolve("item:axe").unwrap(), None);

        let aliases = table.aliases().unwrap();
        assert_eq!(
            aliases,
            vec![
                ("item:shield".to_string(), Ref::new(2, 0)),
                ("item:sword".to_string(), Ref::new(1, 0)),
                ("quest:intro".to_string(), Ref::new(3, 1)),
            ]
        );
    }

    #[test]
    fn test_roundtrip_both_widths() {
        let table = sample();
        for width in [IntWidth::Bits32, IntWidth::Bits64] {
            let mut writer = BinaryWriter::new();
            table.write_to(&mut writer, width).unwrap();
            let bytes = writer.into_inner();

            let mut reader = BinaryReader::new(&bytes);
            let decoded = NameTable::read(&mut reader, width).unwrap();
            assert!(reader.is_empty());
            assert_eq!(decoded.root(), table.root());
            assert_eq!(decoded.entries().unwrap(), table.entries().unwrap());

            let strings_size = u32::from_le_bytes(
                bytes[12 + table.len() * entry_size(width)..][..4].try_into().unwrap(),
            );
            assert_eq!(section_len(table.len(), strings_size, width), bytes.len() as u64);
        }
    }

    #[test]
    fn test_lazy_scan_passthrough() {
        let table = sample();
        let mut writer = BinaryWriter::new();
        writer.write_bytes(b"head");
        table.write_to(&mut writer, IntWidth::Bits64).unwrap();
        writer.write_bytes(b"tail");
        let bytes = writer.into_inner();

        let source: SourceRef = Arc::new(MemorySource::new(bytes.clone()));
        let mut stream = source.open_stream().unwrap();
        stream.seek(SeekFrom::Start(4)).unwrap();
        let lazy = NameTable::scan(&mut stream, &source, IntWidth::Bits64).unwrap();
        assert_eq!(stream.stream_position().unwrap(), bytes.len() as u64 - 4);
        drop(stream);

        assert!(!lazy.is_loaded());
        assert_eq!(lazy.len(), table.len());
        assert_eq!(lazy.root(), table.root());

        let mut copy = BinaryWriter::new();
        lazy.write_to(&mut copy, IntWidth::Bits64).unwrap();
        assert_eq!(copy.as_slice(), &bytes[4..bytes.len() - 4]);
        assert!(!lazy.is_loaded());

        assert_eq!(lazy.resolve("item:shield").unwrap(), Some(Ref::new(2, 0)));
        assert!(lazy.is_loaded());
    }

    #[test]
    fn test_bad_string_offset() {
        let mut writer = BinaryWriter::new();
        writer.write_u32(0);
        writer.write_u32(0);
        writer.write_i32(1);
        writer.write_i32(10);
        writer.write_u32(1);
        writer.write_u32(2);
        writer.write_u32(2);
        writer.write_bytes(b"a\0");
        let bytes = writer.into_inner();

        assert!(matches!(
            NameTable::read(&mut BinaryReader::new(&bytes), IntWidth::Bits32),
            Err(Error::InvalidStringOffset { offset: 10, .. })
        ));
    }

    #[test]
    fn test_corrupt_range() {
        let mut table = NameTable::new();
        table.replace(8 << 1, 9, vec![NameTableEntry::leaf("a", Ref::new(1, 1))]);
        assert!(matches!(table.resolve("a"), Err(Error::CorruptNameTable(_))));
        assert!(matches!(table.aliases(), Err(Error::CorruptNameTable(_))));
    }
}
