//! Output streams used when store blocks are written.
//!
//! A store is only ever appended to. New blocks go after the last byte of the
//! file and become visible when [`OStream::commit`] points the header at the
//! new root group. Until then readers keep seeing the previous tree.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;

use byteorder::{LittleEndian, WriteBytesExt};
use parking_lot::Mutex;

use super::format::*;
use crate::util::{Error, Result};

/// Output stream for writing store blocks.
pub struct OStream {
    writer: BufWriter<File>,
    pos: u64,
}

impl OStream {
    /// Create a new store file at `path`, truncating it, and write an
    /// uncommitted header.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;

        let mut os = Self::wrap(file, 0);
        os.write_bytes(STORE_MAGIC)?;
        os.write_u8(NOT_FROZEN_FLAG)?;
        os.write_u16(CURRENT_VERSION)?;
        os.write_u64(0)?;
        Ok(os)
    }

    /// Append to an existing store file.
    pub fn append(file: &File) -> Result<Self> {
        let mut file = file.try_clone()?;
        let end = file.seek(SeekFrom::End(0))?;
        if end < HEADER_SIZE as u64 {
            return Err(Error::UnexpectedEof(end));
        }
        Ok(Self::wrap(file, end))
    }

    fn wrap(file: File, pos: u64) -> Self {
        Self {
            writer: BufWriter::with_capacity(2 * 1024 * 1024, file), // 2MB buffer
            pos,
        }
    }

    /// Get the current write position.
    #[inline]
    pub fn pos(&self) -> u64 {
        self.pos
    }

    /// Write bytes and advance position.
    pub fn write_bytes(&mut self, data: &[u8]) -> Result<()> {
        self.writer.write_all(data)?;
        self.pos += data.len() as u64;
        Ok(())
    }

    /// Write a u64 value (little-endian).
    pub fn write_u64(&mut self, value: u64) -> Result<()> {
        self.writer.write_u64::<LittleEndian>(value)?;
        self.pos += 8;
        Ok(())
    }

    /// Write a u16 value (little-endian).
    pub fn write_u16(&mut self, value: u16) -> Result<()> {
        self.writer.write_u16::<LittleEndian>(value)?;
        self.pos += 2;
        Ok(())
    }

    /// Write a u8 value.
    pub fn write_u8(&mut self, value: u8) -> Result<()> {
        self.writer.write_u8(value)?;
        self.pos += 1;
        Ok(())
    }

    /// Write a size-prefixed data block and return its position (0 when empty).
    pub fn write_data(&mut self, data: &[u8]) -> Result<u64> {
        if data.is_empty() {
            return Ok(0);
        }
        let pos = self.pos;
        self.write_u64(data.len() as u64)?;
        self.write_bytes(data)?;
        Ok(pos)
    }

    /// Write a group (list of child offsets) and return its position (0 when empty).
    pub fn write_group(&mut self, children: &[u64]) -> Result<u64> {
        if children.is_empty() {
            return Ok(0);
        }
        let pos = self.pos;
        self.write_u64(children.len() as u64)?;
        for &child in children {
            self.write_u64(child)?;
        }
        Ok(pos)
    }

    /// Make every appended block durable, then point the header at
    /// `root_pos` and set the frozen flag.
    ///
    /// The header is the only byte range ever overwritten by a commit.
    pub fn commit(self, root_pos: u64) -> Result<()> {
        let mut file = self.writer.into_inner().map_err(|e| e.into_error())?;
        file.sync_data()?;

        let mut header = [0u8; HEADER_SIZE - FROZEN_OFFSET];
        header[0] = FROZEN_FLAG;
        header[1..3].copy_from_slice(&CURRENT_VERSION.to_le_bytes());
        header[ROOT_POS_OFFSET - FROZEN_OFFSET..].copy_from_slice(&root_pos.to_le_bytes());
        file.seek(SeekFrom::Start(FROZEN_OFFSET as u64))?;
        file.write_all(&header)?;
        file.sync_data()?;
        Ok(())
    }
}

/// Root position currently committed in the header of `file`.
pub(crate) fn committed_root(file: &File) -> Result<u64> {
    let mut file = file.try_clone()?;
    let mut buf = [0u8; 8];
    file.seek(SeekFrom::Start(ROOT_POS_OFFSET as u64))?;
    file.read_exact(&mut buf)?;
    Ok(u64::from_le_bytes(buf))
}

/// Positioned writes into blocks that already exist in the file.
///
/// Used by collective handles to fill their windows of raw chunks without
/// touching any other byte of the file.
pub(crate) struct Patcher {
    file: Mutex<File>,
}

impl Patcher {
    /// Open `path` for patching with a file position of its own.
    pub fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new().write(true).open(path)?;
        Ok(Self { file: Mutex::new(file) })
    }

    pub fn write_at(&self, pos: u64, data: &[u8]) -> Result<()> {
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(pos))?;
        file.write_all(data)?;
        Ok(())
    }

    /// Make patched bytes durable.
    pub fn sync(&self) -> Result<()> {
        self.file.lock().sync_data()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commit_points_header_at_root() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("s.h5");
        let mut os = OStream::create(&path).unwrap();
        let data = os.write_data(b"abc").unwrap();
        let root = os.write_group(&[make_data_offset(data)]).unwrap();
        os.commit(root).unwrap();

        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(&bytes[..5], STORE_MAGIC);
        assert_eq!(bytes[FROZEN_OFFSET], FROZEN_FLAG);
        let file = File::open(&path).unwrap();
        assert_eq!(committed_root(&file).unwrap(), root);
        assert_eq!(data, HEADER_SIZE as u64);
    }

    #[test]
    fn test_append_keeps_existing_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("s.h5");
        let mut os = OStream::create(&path).unwrap();
        let first = os.write_data(b"first").unwrap();
        os.commit(first).unwrap();
        let before = std::fs::read(&path).unwrap();

        let file = OpenOptions::new().read(true).write(true).open(&path).unwrap();
        let mut os = OStream::append(&file).unwrap();
        let second = os.write_data(b"second").unwrap();
        assert_eq!(second, before.len() as u64);
        os.commit(second).unwrap();

        let after = std::fs::read(&path).unwrap();
        assert_eq!(&after[HEADER_SIZE..before.len()], &before[HEADER_SIZE..]);
        assert_eq!(committed_root(&file).unwrap(), second);
    }
}
