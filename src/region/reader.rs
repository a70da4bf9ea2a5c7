//! Byte sources for region containers
//!
//! `EagerReader` keeps the whole container in memory and serves reads as
//! zero-copy slices. `LazyReader` keeps only a seekable handle and performs a
//! seek followed by an exact read for every request.

use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;

use bytes::Bytes;
use tracing::debug;

use crate::config::ReadMode;
use crate::error::{Error, Result};

/// Random access over a region container
pub trait ContainerReader {
    /// Total container length in bytes
    fn len(&self) -> u64;

    /// Whether the container holds no bytes at all
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Read `size` bytes starting at `offset`
    ///
    /// Fails with `OutOfRange` when the range extends past the end.
    fn read_bytes(&mut self, offset: u64, size: usize) -> Result<Bytes>;
}

impl<T: ContainerReader + ?Sized> ContainerReader for Box<T> {
    fn len(&self) -> u64 {
        (**self).len()
    }

    fn read_bytes(&mut self, offset: u64, size: usize) -> Result<Bytes> {
        (**self).read_bytes(offset, size)
    }
}

/// Check `offset + size` against the container length
fn check_range(offset: u64, size: usize, len: u64) -> Result<()> {
    match offset.checked_add(size as u64) {
        Some(end) if end <= len => Ok(()),
        _ => Err(Error::OutOfRange { offset, size, len }),
    }
}

/// Fully buffered container
#[derive(Debug, Clone)]
pub struct EagerReader {
    data: Bytes,
}

impl EagerReader {
    /// Wrap bytes that are already in memory
    pub fn new(data: impl Into<Bytes>) -> Self {
        EagerReader { data: data.into() }
    }

    /// Load a container file into memory
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let data = std::fs::read(path.as_ref())?;
        debug!(
            "Loaded {} ({} bytes)",
            path.as_ref().display(),
            data.len()
        );
        Ok(Self::new(data))
    }
}

impl ContainerReader for EagerReader {
    fn len(&self) -> u64 {
        self.data.len() as u64
    }

    fn read_bytes(&mut self, offset: u64, size: usize) -> Result<Bytes> {
        check_range(offset, size, self.len())?;
        let start = offset as usize;
        Ok(self.data.slice(start..start + size))
    }
}

/// Seek-based container access with bounded memory
#[derive(Debug)]
pub struct LazyReader<R> {
    inner: R,
    len: u64,
}

impl<R: Read + Seek> LazyReader<R> {
    /// Wrap a seekable handle, measuring its length once
    pub fn new(mut inner: R) -> Result<Self> {
        let len = inner.seek(SeekFrom::End(0))?;
        inner.seek(SeekFrom::Start(0))?;
        Ok(LazyReader { inner, len })
    }

    /// Give back the underlying handle
    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl LazyReader<BufReader<File>> {
    /// Open a container file without loading it
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        Self::new(BufReader::new(file))
    }
}

impl<R: Read + Seek> ContainerReader for LazyReader<R> {
    fn len(&self) -> u64 {
        self.len
    }

    fn read_bytes(&mut self, offset: u64, size: usize) -> Result<Bytes> {
        check_range(offset, size, self.len)?;
        self.inner.seek(SeekFrom::Start(offset))?;
        let mut buf = vec![0u8; size];
        self.inner.read_exact(&mut buf)?;
        Ok(Bytes::from(buf))
    }
}

/// Open a region file with the configured reading strategy
pub fn open<P: AsRef<Path>>(path: P, mode: ReadMode) -> Result<Box<dyn ContainerReader + Send>> {
    Ok(match mode {
        ReadMode::Eager => Box::new(EagerReader::open(path)?),
        ReadMode::Lazy => Box::new(LazyReader::open(path)?),
    })
}
