//! Byte sources for lazy, repeatable access to a range of bytes.
//!
//! A [`Source`] names a byte range without necessarily holding it in memory.
//! Codecs use it three ways: load the range into a buffer for a
//! [`BinaryReader`](crate::BinaryReader), open a seekable stream over it to
//! walk headers without loading payloads, and carve a sub-range out of it to
//! defer a section for later.
//!
//! Sub-ranges compose: `source.sub_range(a, n)?.sub_range(b, m)?` addresses
//! absolute offset `a + b` of the backing store.

use std::borrow::Cow;
use std::fmt;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use memmap2::Mmap;

use crate::{Error, Result};

/// Shared handle to a source.
pub type SourceRef = Arc<dyn Source>;

/// A seekable byte stream confined to a source's range.
pub trait SourceStream: Read + Seek + Send {}

impl<T: Read + Seek + Send> SourceStream for T {}

/// A repeatable view of a byte range.
pub trait Source: Send + Sync + fmt::Debug {
    /// Length of the range in bytes.
    fn len(&self) -> u64;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Open a fresh stream positioned at the start of the range.
    fn open_stream(&self) -> Result<Box<dyn SourceStream + '_>>;

    /// The bytes of the range, borrowed when the backing store allows it.
    fn read_bytes(&self) -> Result<Cow<'_, [u8]>>;

    /// A source for `length` bytes starting `offset` bytes into this range.
    fn sub_range(&self, offset: u64, length: u64) -> Result<SourceRef>;
}

fn check_sub_range(offset: u64, length: u64, available: u64) -> Result<()> {
    if offset.checked_add(length).map_or(true, |end| end > available) {
        return Err(Error::SourceOutOfBounds {
            offset,
            length,
            available,
        });
    }
    Ok(())
}

/// Stream adapter that exposes `[start, start + len)` of an inner stream as
/// if it were the whole stream.
#[derive(Debug)]
pub struct RangeStream<R> {
    inner: R,
    start: u64,
    len: u64,
    pos: u64,
}

impl<R: Seek> RangeStream<R> {
    pub fn new(mut inner: R, start: u64, len: u64) -> io::Result<Self> {
        inner.seek(SeekFrom::Start(start))?;
        Ok(Self {
            inner,
            start,
            len,
            pos: 0,
        })
    }
}

impl<R: Read> Read for RangeStream<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let left = self.len.saturating_sub(self.pos);
        if left == 0 {
            return Ok(0);
        }
        let want = buf.len().min(usize::try_from(left).unwrap_or(usize::MAX));
        let n = self.inner.read(&mut buf[..want])?;
        self.pos += n as u64;
        Ok(n)
    }
}

impl<R: Seek> Seek for RangeStream<R> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(p) => Some(p),
            SeekFrom::Current(d) => self.pos.checked_add_signed(d),
            SeekFrom::End(d) => self.len.checked_add_signed(d),
        }
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "seek before start of range"))?;
        self.inner.seek(SeekFrom::Start(self.start + target))?;
        self.pos = target;
        Ok(target)
    }
}

/// A range of a file on disk. Every stream re-opens the file, so the source
/// holds no descriptor between uses.
#[derive(Debug, Clone)]
pub struct FileSource {
    path: Arc<PathBuf>,
    offset: u64,
    length: u64,
}

impl FileSource {
    /// A source covering the whole file.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let length = std::fs::metadata(&path)?.len();
        Ok(Self {
            path: Arc::new(path),
            offset: 0,
            length,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Absolute offset of this range within the file.
    pub fn offset(&self) -> u64 {
        self.offset
    }
}

impl Source for FileSource {
    fn len(&self) -> u64 {
        self.length
    }

    fn open_stream(&self) -> Result<Box<dyn SourceStream + '_>> {
        let file = File::open(self.path.as_path())?;
        Ok(Box::new(RangeStream::new(file, self.offset, self.length)?))
    }

    fn read_bytes(&self) -> Result<Cow<'_, [u8]>> {
        let capacity = usize::try_from(self.length).map_err(|_| Error::SourceOverflow {
            offset: self.offset,
            length: self.length,
            limit: usize::MAX as u64,
        })?;
        let mut buf = Vec::with_capacity(capacity);
        self.open_stream()?.read_to_end(&mut buf)?;
        if buf.len() != capacity {
            return Err(Error::UnexpectedEof {
                needed: capacity,
                available: buf.len(),
            });
        }
        Ok(Cow::Owned(buf))
    }

    fn sub_range(&self, offset: u64, length: u64) -> Result<SourceRef> {
        check_sub_range(offset, length, self.length)?;
        Ok(Arc::new(Self {
            path: Arc::clone(&self.path),
            offset: self.offset + offset,
            length,
        }))
    }
}

type SharedBuffer = Arc<dyn AsRef<[u8]> + Send + Sync>;

/// A range of an owned in-memory buffer (or memory-mapped file), addressed
/// with 64-bit offsets.
#[derive(Clone)]
pub struct MemorySource {
    data: SharedBuffer,
    offset: usize,
    length: usize,
}

impl MemorySource {
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        let data: Vec<u8> = data.into();
        let length = data.len();
        Self {
            data: Arc::new(data),
            offset: 0,
            length,
        }
    }

    /// Memory-map a file and expose all of it.
    pub fn map_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        let mmap = unsafe { Mmap::map(&file)? };
        let length = mmap.len();
        Ok(Self {
            data: Arc::new(mmap),
            offset: 0,
            length,
        })
    }

    /// The bytes of this range.
    pub fn as_slice(&self) -> &[u8] {
        &AsRef::<[u8]>::as_ref(&*self.data)[self.offset..self.offset + self.length]
    }
}

impl fmt::Debug for MemorySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemorySource")
            .field("offset", &self.offset)
            .field("length", &self.length)
            .finish()
    }
}

impl Source for MemorySource {
    fn len(&self) -> u64 {
        self.length as u64
    }

    fn open_stream(&self) -> Result<Box<dyn SourceStream + '_>> {
        Ok(Box::new(io::Cursor::new(self.as_slice())))
    }

    fn read_bytes(&self) -> Result<Cow<'_, [u8]>> {
        Ok(Cow::Borrowed(self.as_slice()))
    }

    fn sub_range(&self, offset: u64, length: u64) -> Result<SourceRef> {
        check_sub_range(offset, length, self.length as u64)?;
        let overflow = || Error::SourceOverflow {
            offset,
            length,
            limit: usize::MAX as u64,
        };
        Ok(Arc::new(Self {
            data: Arc::clone(&self.data),
            offset: self.offset + usize::try_from(offset).map_err(|_| overflow())?,
            length: usize::try_from(length).map_err(|_| overflow())?,
        }))
    }
}

/// A range of a shared byte array, addressed with `i32` offsets.
///
/// Composing a sub-range whose absolute offset or length does not fit in an
/// `i32` fails with [`Error::SourceOverflow`].
#[derive(Clone)]
pub struct ByteArraySource {
    data: Arc<[u8]>,
    offset: i32,
    length: i32,
}

impl ByteArraySource {
    pub fn new(data: impl Into<Arc<[u8]>>) -> Result<Self> {
        let data = data.into();
        let length = i32::try_from(data.len()).map_err(|_| Error::SourceOverflow {
            offset: 0,
            length: data.len() as u64,
            limit: i32::MAX as u64,
        })?;
        Ok(Self {
            data,
            offset: 0,
            length,
        })
    }

    pub fn as_slice(&self) -> &[u8] {
        let start = self.offset as usize;
        &self.data[start..start + self.length as usize]
    }
}

impl fmt::Debug for ByteArraySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ByteArraySource")
            .field("offset", &self.offset)
            .field("length", &self.length)
            .finish()
    }
}

impl Source for ByteArraySource {
    fn len(&self) -> u64 {
        self.length as u64
    }

    fn open_stream(&self) -> Result<Box<dyn SourceStream + '_>> {
        Ok(Box::new(io::Cursor::new(self.as_slice())))
    }

    fn read_bytes(&self) -> Result<Cow<'_, [u8]>> {
        Ok(Cow::Borrowed(self.as_slice()))
    }

    fn sub_range(&self, offset: u64, length: u64) -> Result<SourceRef> {
        let absolute = (self.offset as u64).checked_add(offset);
        let narrow = absolute
            .and_then(|a| i32::try_from(a).ok())
            .zip(i32::try_from(length).ok());
        let Some((offset_i32, length_i32)) = narrow else {
            return Err(Error::SourceOverflow {
                offset: absolute.unwrap_or(u64::MAX),
                length,
                limit: i32::MAX as u64,
            });
        };
        check_sub_range(offset, length, self.length as u64)?;
        Ok(Arc::new(Self {
            data: Arc::clone(&self.data),
            offset: offset_i32,
            length: length_i32,
        }))
    }
}
