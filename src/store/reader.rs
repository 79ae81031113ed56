//! Input streams for loading a store file.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

#[cfg(feature = "mmap")]
use memmap2::Mmap;
use parking_lot::Mutex;

use super::format::*;
use crate::util::{Error, Result};

/// Input streams for reading store blocks.
/// Supports both memory-mapped and buffered I/O modes.
pub struct IStreams {
    inner: StreamsInner,
    version: u16,
    frozen: bool,
    size: u64,
}

enum StreamsInner {
    /// Memory-mapped file (preferred for large files)
    #[cfg(feature = "mmap")]
    Mmap(Mmap),
    /// Buffered file access (fallback)
    File(Mutex<File>),
}

impl IStreams {
    /// Open a file for reading, memory-mapped when the `mmap` feature is enabled.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_opts(path, cfg!(feature = "mmap"))
    }

    /// Open a file with optional memory mapping.
    pub fn open_opts(path: impl AsRef<Path>, use_mmap: bool) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::FileNotFound(path.to_path_buf())
            } else {
                Error::Io(e)
            }
        })?;

        let size = file.metadata()?.len();
        if size < HEADER_SIZE as u64 {
            return Err(Error::UnexpectedEof(size));
        }

        let inner = Self::map(file, use_mmap)?;

        let mut header = [0u8; HEADER_SIZE];
        let mut streams = Self { inner, version: 0, frozen: false, size };
        streams.read_into(0, &mut header)?;
        let (version, frozen) = Self::parse_header(&header)?;
        streams.version = version;
        streams.frozen = frozen;
        Ok(streams)
    }

    #[cfg(feature = "mmap")]
    fn map(file: File, use_mmap: bool) -> Result<StreamsInner> {
        if use_mmap {
            // Safety: only read-only handles map the file, and stores are never truncated once created
            let mmap = unsafe { Mmap::map(&file) }.map_err(|e| Error::MmapFailed(e.to_string()))?;
            Ok(StreamsInner::Mmap(mmap))
        } else {
            Ok(StreamsInner::File(Mutex::new(file)))
        }
    }

    #[cfg(not(feature = "mmap"))]
    fn map(file: File, _use_mmap: bool) -> Result<StreamsInner> {
        Ok(StreamsInner::File(Mutex::new(file)))
    }

    /// Parse and validate the header.
    fn parse_header(data: &[u8]) -> Result<(u16, bool)> {
        if data.len() < HEADER_SIZE {
            return Err(Error::UnexpectedEof(data.len() as u64));
        }
        if &data[0..STORE_MAGIC.len()] != STORE_MAGIC {
            return Err(Error::InvalidMagic);
        }

        let frozen = data[FROZEN_OFFSET] == FROZEN_FLAG;
        let version = u16::from_le_bytes([data[VERSION_OFFSET], data[VERSION_OFFSET + 1]]);
        if version > CURRENT_VERSION {
            return Err(Error::UnsupportedVersion(version));
        }

        Ok((version, frozen))
    }

    /// Check if the file was completely written.
    #[inline]
    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    #[inline]
    pub fn version(&self) -> u16 {
        self.version
    }

    #[inline]
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Get the root group position from the header.
    pub fn root_pos(&self) -> Result<u64> {
        self.read_u64(ROOT_POS_OFFSET as u64)
    }

    /// Read bytes at a specific position.
    pub fn read_bytes(&self, pos: u64, len: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; len];
        self.read_into(pos, &mut buf)?;
        Ok(buf)
    }

    /// Read bytes into an existing buffer.
    pub fn read_into(&self, pos: u64, buf: &mut [u8]) -> Result<()> {
        let end = pos
            .checked_add(buf.len() as u64)
            .ok_or(Error::UnexpectedEof(u64::MAX))?;
        if end > self.size {
            return Err(Error::UnexpectedEof(end));
        }

        match &self.inner {
            #[cfg(feature = "mmap")]
            StreamsInner::Mmap(mmap) => {
                buf.copy_from_slice(&mmap[pos as usize..end as usize]);
                Ok(())
            }
            StreamsInner::File(file) => {
                let mut f = file.lock();
                f.seek(SeekFrom::Start(pos))?;
                f.read_exact(buf)?;
                Ok(())
            }
        }
    }

    pub fn read_u64(&self, pos: u64) -> Result<u64> {
        let mut buf = [0u8; 8];
        self.read_into(pos, &mut buf)?;
        Ok(u64::from_le_bytes(buf))
    }

    /// Read the child offsets of the group at `pos`.
    pub fn read_group(&self, pos: u64) -> Result<Vec<u64>> {
        if pos == 0 {
            return Ok(Vec::new());
        }
        let count = self.read_u64(pos)?;
        if count.saturating_mul(8) > self.size {
            return Err(Error::invalid(format!("group at {} claims {} children", pos, count)));
        }
        (0..count).map(|i| self.read_u64(pos + 8 + i * 8)).collect()
    }

    /// Read the payload of the data block at `pos`.
    pub fn read_data(&self, pos: u64) -> Result<Vec<u8>> {
        if pos == 0 {
            return Ok(Vec::new());
        }
        let size = self.read_u64(pos)?;
        if size > self.size {
            return Err(Error::UnexpectedEof(pos + size));
        }
        self.read_bytes(pos + 8, size as usize)
    }
}
