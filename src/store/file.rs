//! Store file handles.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use super::codec;
use super::compression::MAX_LEVEL;
use super::node::{split_path, ChunkIo, DatasetNode, GroupNode, Node};
use super::reader::IStreams;
use super::selection::Selection;
use super::stream::{committed_root, OStream, Patcher};
use super::types::{AttrValue, ElementType, StringKind};
use crate::util::{cast_from_slice, cast_to_vec, Dimensions, Element, Error, Result, Scalar};

/// How a store file is opened.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Mode {
    #[default]
    Read,
    ReadWrite,
}

/// Access pattern of a store handle.
///
/// A collective handle is shared by cooperating writers. It refuses
/// compression, variable-length strings and deletes. Its flushes give every
/// chunk a raw block, and element writes into such blocks go straight to the
/// file, so several collective handles on one file can fill disjoint windows
/// of the same datasets.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Access {
    #[default]
    Serial,
    Collective,
}

// Lock order: root, then streams, then dataset nodes.
struct FileInner {
    path: PathBuf,
    mode: Mode,
    access: Access,
    root: RwLock<GroupNode>,
    streams: RwLock<IStreams>,
    writer: Option<Writer>,
    closed: AtomicBool,
}

/// Write side of a read-write handle.
struct Writer {
    file: std::fs::File,
    patcher: Option<Patcher>,
    /// Root position the in-memory tree was loaded from or last committed as.
    committed: Mutex<u64>,
}

impl Writer {
    fn open(path: &Path, access: Access, committed: u64) -> Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let patcher = match access {
            Access::Collective => Some(Patcher::open(path)?),
            Access::Serial => None,
        };
        Ok(Self { file, patcher, committed: Mutex::new(committed) })
    }
}

/// An open store file. Cloning shares the handle.
#[derive(Clone)]
pub struct File {
    inner: Arc<FileInner>,
}

impl std::fmt::Debug for File {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("File")
            .field("path", &self.inner.path)
            .field("mode", &self.inner.mode)
            .field("access", &self.inner.access)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl File {
    /// Create (or truncate) a store file.
    pub fn create(path: impl AsRef<Path>, access: Access) -> Result<Self> {
        let path = path.as_ref();
        codec::init(path)?;
        tracing::debug!(path = %path.display(), ?access, "created store");
        Self::open(path, Mode::ReadWrite, access)
    }

    /// Open an existing store file.
    ///
    /// Only the node tree is read; chunks are loaded when they are accessed.
    /// Read-only handles memory-map the file when the `mmap` feature is on.
    pub fn open(path: impl AsRef<Path>, mode: Mode, access: Access) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let streams = IStreams::open_opts(&path, cfg!(feature = "mmap") && mode == Mode::Read)?;
        let root = codec::load(&streams, &path)?;
        let writer = match mode {
            Mode::Read => None,
            Mode::ReadWrite => Some(Writer::open(&path, access, streams.root_pos()?)?),
        };
        tracing::debug!(path = %path.display(), ?mode, ?access, "opened store");
        Ok(Self {
            inner: Arc::new(FileInner {
                path,
                mode,
                access,
                root: RwLock::new(root),
                streams: RwLock::new(streams),
                writer,
                closed: AtomicBool::new(false),
            }),
        })
    }

    fn patcher(&self) -> Option<&Patcher> {
        self.inner.writer.as_ref().and_then(|w| w.patcher.as_ref())
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    pub fn mode(&self) -> Mode {
        self.inner.mode
    }

    pub fn access(&self) -> Access {
        self.inner.access
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    pub fn is_writable(&self) -> bool {
        self.inner.mode == Mode::ReadWrite
    }

    pub(crate) fn check_open(&self) -> Result<()> {
        if self.is_closed() {
            Err(Error::Closed)
        } else {
            Ok(())
        }
    }

    pub(crate) fn check_writable(&self) -> Result<()> {
        self.check_open()?;
        if self.is_writable() {
            Ok(())
        } else {
            Err(Error::ReadOnly)
        }
    }

    fn check_attr(&self, value: &AttrValue) -> Result<()> {
        if self.inner.access == Access::Collective && value.string_kind() == Some(StringKind::Variable) {
            return Err(Error::Collective("variable-length string attributes".into()));
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Groups
    // ------------------------------------------------------------------------

    /// Create a group, including missing parents. Fails if it already exists.
    pub fn create_group(&self, path: &str) -> Result<()> {
        self.check_writable()?;
        self.inner.root.write().insert(path, Node::Group(GroupNode::default()))
    }

    /// Create a group unless one already exists at `path`.
    pub fn require_group(&self, path: &str) -> Result<()> {
        self.check_writable()?;
        let parts = split_path(path);
        self.inner.root.write().group_mut(&parts, true).map(|_| ())
    }

    pub fn exists(&self, path: &str) -> Result<bool> {
        self.check_open()?;
        let root = self.inner.root.read();
        Ok(split_path(path).is_empty() || root.get(path).is_some())
    }

    pub fn is_group(&self, path: &str) -> Result<bool> {
        self.check_open()?;
        Ok(self.inner.root.read().group(path).is_ok())
    }

    /// Names of the members of a group, sorted.
    pub fn member_names(&self, path: &str) -> Result<Vec<String>> {
        self.check_open()?;
        let root = self.inner.root.read();
        Ok(root.group(path)?.children.keys().cloned().collect())
    }

    /// Unlink a group or dataset. Refused under collective access.
    pub fn delete(&self, path: &str) -> Result<()> {
        self.check_writable()?;
        if self.inner.access == Access::Collective {
            return Err(Error::Collective(format!("deleting {}", path)));
        }
        self.inner.root.write().remove(path).map(|_| ())
    }

    // ------------------------------------------------------------------------
    // Attributes (on groups or datasets)
    // ------------------------------------------------------------------------

    pub fn attr(&self, path: &str, name: &str) -> Result<Option<AttrValue>> {
        self.check_open()?;
        let root = self.inner.root.read();
        match root.get(path) {
            Some(Node::Dataset(d)) => Ok(d.read().attrs.get(name).cloned()),
            _ => Ok(root.group(path)?.attrs.get(name).cloned()),
        }
    }

    pub fn set_attr(&self, path: &str, name: &str, value: AttrValue) -> Result<()> {
        self.check_writable()?;
        self.check_attr(&value)?;
        let mut root = self.inner.root.write();
        if let Some(Node::Dataset(d)) = root.get(path) {
            let mut node = d.write();
            node.attrs.insert(name.to_string(), value);
            node.stored = None;
            return Ok(());
        }
        let parts = split_path(path);
        root.group_mut(&parts, false)?.attrs.insert(name.to_string(), value);
        Ok(())
    }

    pub fn attr_names(&self, path: &str) -> Result<Vec<String>> {
        self.check_open()?;
        let root = self.inner.root.read();
        match root.get(path) {
            Some(Node::Dataset(d)) => Ok(d.read().attrs.keys().cloned().collect()),
            _ => Ok(root.group(path)?.attrs.keys().cloned().collect()),
        }
    }

    // ------------------------------------------------------------------------
    // Datasets
    // ------------------------------------------------------------------------

    pub fn dataset(&self, path: &str) -> Result<Dataset> {
        self.check_open()?;
        match self.inner.root.read().get(path) {
            Some(Node::Dataset(d)) => Ok(Dataset {
                file: self.clone(),
                path: path.to_string(),
                node: Arc::clone(d),
            }),
            Some(Node::Group(_)) => Err(Error::TypeMismatch {
                expected: "dataset".into(),
                actual: format!("group at {}", path),
            }),
            None => Err(Error::NotFound(path.to_string())),
        }
    }

    /// Create a dataset, including missing parent groups.
    pub fn create_dataset(&self, path: &str, builder: DatasetBuilder) -> Result<Dataset> {
        self.check_writable()?;
        builder.validate(self.inner.access)?;
        let node = Arc::new(RwLock::new(DatasetNode::new(
            builder.element,
            builder.shape,
            builder.chunks,
            builder.compression,
            builder.fill,
        )?));
        self.inner.root.write().insert(path, Node::Dataset(Arc::clone(&node)))?;
        Ok(Dataset { file: self.clone(), path: path.to_string(), node })
    }

    /// Create a 1-D dataset holding `values`.
    pub fn write_values<T: Element>(&self, path: &str, values: &[T]) -> Result<Dataset> {
        let ds = self.create_dataset(path, DatasetBuilder::numeric::<T>(values.len() as u64))?;
        ds.write(&Selection::new([0..values.len() as u64]), values)?;
        Ok(ds)
    }

    /// Read every element of a numeric dataset as `T`.
    pub fn read_values<T: Element>(&self, path: &str) -> Result<Vec<T>> {
        let ds = self.dataset(path)?;
        ds.read(&ds.selection_all())
    }

    /// Create a single-element text dataset.
    ///
    /// Fixed text uses the byte length of `value` as its width.
    pub fn write_text(&self, path: &str, value: &str, kind: StringKind) -> Result<Dataset> {
        let element = match kind {
            StringKind::Fixed => ElementType::FixedString(value.len()),
            StringKind::Variable => ElementType::VarString,
        };
        let ds = self.create_dataset(path, DatasetBuilder::new(element, 1u64))?;
        ds.write_text(&Selection::new([0..1]), &[value.to_string()])?;
        Ok(ds)
    }

    /// Read the first element of a text dataset.
    pub fn read_text(&self, path: &str) -> Result<String> {
        let ds = self.dataset(path)?;
        let shape = ds.shape()?;
        if shape.num_points() == 0 {
            return Ok(String::new());
        }
        let first = Selection::new(shape.sizes().iter().map(|_| 0..1));
        Ok(ds.read_text(&first)?.into_iter().next().unwrap_or_default())
    }

    // ------------------------------------------------------------------------
    // Lifetime
    // ------------------------------------------------------------------------

    /// Append everything that changed since the last commit and point the
    /// header at the new tree. A no-op on read-only handles.
    ///
    /// Existing blocks are never overwritten, so a flush that does not
    /// complete leaves the previously committed tree intact. Fails with
    /// [`Error::Conflict`] when another handle committed a tree since this
    /// one was loaded; chunk writes already patched in place are kept.
    pub fn flush(&self) -> Result<()> {
        self.check_open()?;
        let Some(writer) = &self.inner.writer else { return Ok(()) };

        let mut root = self.inner.root.write();
        let mut streams = self.inner.streams.write();
        if let Some(patcher) = &writer.patcher {
            patcher.sync()?;
        }
        if !root.is_dirty() {
            return Ok(());
        }

        let mut committed = writer.committed.lock();
        if committed_root(&writer.file)? != *committed {
            return Err(Error::Conflict(self.inner.path.clone()));
        }
        let mut os = OStream::append(&writer.file)?;
        let start = os.pos();
        let root_pos = codec::write_group(&mut os, &mut root, self.inner.access == Access::Collective)?;
        let appended = os.pos() - start;
        os.commit(root_pos)?;
        *committed = root_pos;
        *streams = IStreams::open_opts(&self.inner.path, false)?;

        tracing::debug!(path = %self.inner.path.display(), root = root_pos, appended, "store committed");
        Ok(())
    }

    /// Flush and close. Closing twice is allowed.
    pub fn close(&self) -> Result<()> {
        if self.is_closed() {
            return Ok(());
        }
        let result = self.flush();
        self.inner.closed.store(true, Ordering::Release);
        result
    }
}

/// Handle to one dataset of an open [`File`].
#[derive(Clone)]
pub struct Dataset {
    file: File,
    path: String,
    node: Arc<RwLock<DatasetNode>>,
}

impl std::fmt::Debug for Dataset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dataset").field("path", &self.path).finish()
    }
}

impl Dataset {
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn shape(&self) -> Result<Dimensions> {
        self.file.check_open()?;
        Ok(self.node.read().shape.clone())
    }

    pub fn element_type(&self) -> Result<ElementType> {
        self.file.check_open()?;
        Ok(self.node.read().element)
    }

    pub fn chunks(&self) -> Result<Option<Dimensions>> {
        self.file.check_open()?;
        Ok(self.node.read().chunks.clone())
    }

    pub fn compression(&self) -> Result<u8> {
        self.file.check_open()?;
        Ok(self.node.read().compression)
    }

    pub(crate) fn selection_all(&self) -> Selection {
        Selection::all(&self.node.read().shape)
    }

    pub fn attr(&self, name: &str) -> Result<Option<AttrValue>> {
        self.file.check_open()?;
        Ok(self.node.read().attrs.get(name).cloned())
    }

    pub fn set_attr(&self, name: &str, value: AttrValue) -> Result<()> {
        self.file.check_writable()?;
        self.file.check_attr(&value)?;
        let mut node = self.node.write();
        node.attrs.insert(name.to_string(), value);
        node.stored = None;
        Ok(())
    }

    pub fn attr_names(&self) -> Result<Vec<String>> {
        self.file.check_open()?;
        Ok(self.node.read().attrs.keys().cloned().collect())
    }

    /// Read the selection as packed little-endian bytes of the stored type.
    pub fn read_raw(&self, sel: &Selection) -> Result<Vec<u8>> {
        self.file.check_open()?;
        let streams = self.file.inner.streams.read();
        self.node.read().read_raw(sel, &streams)
    }

    pub fn write_raw(&self, sel: &Selection, bytes: &[u8]) -> Result<()> {
        self.file.check_writable()?;
        let streams = self.file.inner.streams.read();
        let io = ChunkIo { streams: &streams, patcher: self.file.patcher() };
        self.node.write().write_raw(sel, bytes, &io)
    }

    /// Read the selection, casting each element to `T`.
    pub fn read<T: Element>(&self, sel: &Selection) -> Result<Vec<T>> {
        self.file.check_open()?;
        let streams = self.file.inner.streams.read();
        let node = self.node.read();
        let dtype = numeric_dtype(&node)?;
        Ok(cast_to_vec(dtype, &node.read_raw(sel, &streams)?))
    }

    /// Write `values` into the selection, casting them to the stored type.
    pub fn write<T: Element>(&self, sel: &Selection, values: &[T]) -> Result<()> {
        self.file.check_writable()?;
        let streams = self.file.inner.streams.read();
        let io = ChunkIo { streams: &streams, patcher: self.file.patcher() };
        let mut node = self.node.write();
        let dtype = numeric_dtype(&node)?;
        node.write_raw(sel, &cast_from_slice(values, dtype), &io)
    }

    pub fn read_text(&self, sel: &Selection) -> Result<Vec<String>> {
        self.file.check_open()?;
        let streams = self.file.inner.streams.read();
        self.node.read().read_text(sel, &streams)
    }

    pub fn write_text(&self, sel: &Selection, values: &[String]) -> Result<()> {
        self.file.check_writable()?;
        let streams = self.file.inner.streams.read();
        let io = ChunkIo { streams: &streams, patcher: self.file.patcher() };
        self.node.write().write_text(sel, values, &io)
    }
}

fn numeric_dtype(node: &DatasetNode) -> Result<crate::util::DataType> {
    node.element.dtype().ok_or_else(|| Error::TypeMismatch {
        expected: "numeric dataset".into(),
        actual: node.element.to_string(),
    })
}

/// Declaration of a new dataset.
#[derive(Clone, Debug)]
pub struct DatasetBuilder {
    element: ElementType,
    shape: Dimensions,
    chunks: Option<Dimensions>,
    compression: u8,
    fill: Option<Scalar>,
}

impl DatasetBuilder {
    pub fn new(element: ElementType, shape: impl Into<Dimensions>) -> Self {
        Self {
            element,
            shape: shape.into(),
            chunks: None,
            compression: 0,
            fill: None,
        }
    }

    pub fn numeric<T: Element>(shape: impl Into<Dimensions>) -> Self {
        Self::new(ElementType::Numeric(T::DTYPE), shape)
    }

    pub fn chunks(mut self, chunks: impl Into<Dimensions>) -> Self {
        self.chunks = Some(chunks.into());
        self
    }

    /// Zlib level, 0 for none.
    pub fn compression(mut self, level: u8) -> Self {
        self.compression = level;
        self
    }

    pub fn fill_value(mut self, fill: impl Into<Scalar>) -> Self {
        self.fill = Some(fill.into());
        self
    }

    fn validate(&self, access: Access) -> Result<()> {
        if let Some(chunks) = &self.chunks {
            if chunks.rank() != self.shape.rank() {
                return Err(Error::validation(format!(
                    "chunk shape {} does not match dataset rank {}",
                    chunks,
                    self.shape.rank()
                )));
            }
            if chunks.sizes().contains(&0) {
                return Err(Error::validation(format!("chunk shape {} has a zero axis", chunks)));
            }
        }
        if self.compression > MAX_LEVEL {
            return Err(Error::validation(format!(
                "compression level {} exceeds {}",
                self.compression, MAX_LEVEL
            )));
        }
        if self.element == ElementType::FixedString(0) {
            return Err(Error::validation("fixed-length strings need a width of at least 1"));
        }
        if self.fill.is_some() && self.element.is_string() {
            return Err(Error::validation("fill values apply to numeric datasets only"));
        }
        if access == Access::Collective {
            if self.compression > 0 {
                return Err(Error::Collective("compressed datasets".into()));
            }
            if self.element == ElementType::VarString {
                return Err(Error::Collective("variable-length string datasets".into()));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::format::HEADER_SIZE;
    use crate::store::node::Chunk;

    fn temp_store(access: Access) -> (tempfile::TempDir, File) {
        let dir = tempfile::tempdir().unwrap();
        let file = File::create(dir.path().join("s.h5"), access).unwrap();
        (dir, file)
    }

    #[test]
    fn test_groups_and_members() {
        let (_dir, f) = temp_store(Access::Serial);
        f.create_group("A/B").unwrap();
        f.require_group("A/B").unwrap();
        f.require_group("A/C").unwrap();
        assert!(matches!(f.create_group("A/B"), Err(Error::AlreadyExists(_))));
        assert_eq!(f.member_names("A").unwrap(), vec!["B", "C"]);
        assert!(f.exists("").unwrap());
        assert!(f.is_group("A/C").unwrap());
        f.delete("A/C").unwrap();
        assert!(!f.exists("A/C").unwrap());
    }

    #[test]
    fn test_values_persist() {
        let (dir, f) = temp_store(Access::Serial);
        f.write_values("H/NUM", &[1u16, 2, 3]).unwrap();
        f.write_text("H/NAME", "KEA", StringKind::Fixed).unwrap();
        f.set_attr("H", "CLASS", AttrValue::text("HEADER")).unwrap();
        f.close().unwrap();

        let f = File::open(dir.path().join("s.h5"), Mode::Read, Access::Serial).unwrap();
        assert_eq!(f.read_values::<u16>("H/NUM").unwrap(), vec![1, 2, 3]);
        assert_eq!(f.read_values::<f64>("H/NUM").unwrap(), vec![1.0, 2.0, 3.0]);
        assert_eq!(f.read_text("H/NAME").unwrap(), "KEA");
        assert_eq!(f.dataset("H/NAME").unwrap().element_type().unwrap(), ElementType::FixedString(3));
        assert_eq!(f.attr("H", "CLASS").unwrap(), Some(AttrValue::text("HEADER")));
        assert!(matches!(f.write_values("X", &[1u8]), Err(Error::ReadOnly)));
    }

    #[test]
    fn test_closed_handle() {
        let (_dir, f) = temp_store(Access::Serial);
        let ds = f.write_values("V", &[1i32]).unwrap();
        f.close().unwrap();
        f.close().unwrap();
        assert!(matches!(f.exists("V"), Err(Error::Closed)));
        assert!(matches!(ds.shape(), Err(Error::Closed)));
    }

    #[test]
    fn test_collective_restrictions() {
        let (_dir, f) = temp_store(Access::Collective);
        let zipped = DatasetBuilder::numeric::<u8>((4, 4)).chunks((2, 2)).compression(1);
        assert!(matches!(f.create_dataset("A", zipped), Err(Error::Collective(_))));
        let vlen = DatasetBuilder::new(ElementType::VarString, 1u64);
        assert!(matches!(f.create_dataset("B", vlen), Err(Error::Collective(_))));
        f.write_values("C", &[1u8]).unwrap();
        assert!(matches!(f.delete("C"), Err(Error::Collective(_))));
        assert!(f.set_attr("C", "N", AttrValue::text("x")).is_err());
        f.set_attr("C", "N", AttrValue::fixed_text("x")).unwrap();
    }

    #[test]
    fn test_builder_validation() {
        let (_dir, f) = temp_store(Access::Serial);
        let bad_rank = DatasetBuilder::numeric::<u8>((4, 4)).chunks(2u64);
        assert!(f.create_dataset("A", bad_rank).unwrap_err().is_validation());
        let zero = DatasetBuilder::new(ElementType::FixedString(0), 1u64);
        assert!(f.create_dataset("B", zero).unwrap_err().is_validation());
        let level = DatasetBuilder::numeric::<u8>(4u64).compression(12);
        assert!(f.create_dataset("C", level).unwrap_err().is_validation());
    }

    #[test]
    fn test_uncommitted_blocks_are_ignored() {
        let (dir, f) = temp_store(Access::Serial);
        let path = dir.path().join("s.h5");
        f.write_values("A", &[1u32, 2, 3]).unwrap();
        f.close().unwrap();
        let committed = std::fs::read(&path).unwrap()[..HEADER_SIZE].to_vec();

        let f = File::open(&path, Mode::ReadWrite, Access::Serial).unwrap();
        f.write_values("B", &[4u32]).unwrap();
        f.close().unwrap();

        // Roll the header back as if the writer died before its commit,
        // leaving a torn block behind the last complete one.
        let mut bytes = std::fs::read(&path).unwrap();
        bytes[..HEADER_SIZE].copy_from_slice(&committed);
        bytes.extend_from_slice(&[0xAB; 5]);
        std::fs::write(&path, &bytes).unwrap();

        let f = File::open(&path, Mode::Read, Access::Serial).unwrap();
        assert_eq!(f.read_values::<u32>("A").unwrap(), vec![1, 2, 3]);
        assert!(!f.exists("B").unwrap());

        let f = File::open(&path, Mode::ReadWrite, Access::Serial).unwrap();
        f.write_values("C", &[9u8]).unwrap();
        f.close().unwrap();
        let f = File::open(&path, Mode::Read, Access::Serial).unwrap();
        assert_eq!(f.read_values::<u32>("A").unwrap(), vec![1, 2, 3]);
        assert_eq!(f.read_values::<u8>("C").unwrap(), vec![9]);
    }

    #[test]
    fn test_flush_appends_only_changed_chunks() {
        let (dir, f) = temp_store(Access::Serial);
        let path = dir.path().join("s.h5");
        let ds = f
            .create_dataset("D", DatasetBuilder::numeric::<u16>((64, 64)).chunks((16, 16)))
            .unwrap();
        ds.write(&Selection::rows_cols(0..16, 0..64), &[5u16; 16 * 64]).unwrap();
        {
            let node = ds.node.read();
            assert_eq!(node.grid.iter().filter(|c| matches!(c, Chunk::Dirty(_))).count(), 4);
        }
        f.flush().unwrap();
        {
            let node = ds.node.read();
            assert!(!node.grid.iter().any(|c| matches!(c, Chunk::Dirty(_))));
            assert_eq!(node.grid.iter().filter(|c| matches!(c, Chunk::Stored(_))).count(), 4);
        }
        let size = std::fs::metadata(&path).unwrap().len();
        f.flush().unwrap();
        assert_eq!(std::fs::metadata(&path).unwrap().len(), size);

        // One more chunk costs one chunk block plus the rewritten node blocks.
        ds.write(&Selection::rows_cols(48..64, 48..64), &[7u16; 256]).unwrap();
        f.flush().unwrap();
        let grown = std::fs::metadata(&path).unwrap().len() - size;
        assert!(grown < 2 * 512 + 512, "grew by {} bytes", grown);

        let all: Vec<u16> = ds.read(&Selection::rows_cols(0..64, 0..64)).unwrap();
        assert!(all[..16 * 64].iter().all(|&v| v == 5));
        assert_eq!(all[63 * 64 + 63], 7);
        assert_eq!(all.iter().filter(|&&v| v == 0).count(), 64 * 64 - 16 * 64 - 256);
    }

    #[test]
    fn test_collective_handles_patch_disjoint_windows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("s.h5");
        let a = File::create(&path, Access::Collective).unwrap();
        a.create_dataset("D", DatasetBuilder::numeric::<u8>((10, 10)).chunks((5, 5))).unwrap();
        a.flush().unwrap();
        let b = File::open(&path, Mode::ReadWrite, Access::Collective).unwrap();

        // The split runs through the middle of the first chunk row.
        a.dataset("D").unwrap().write(&Selection::rows_cols(0..3, 0..10), &[1u8; 30]).unwrap();
        b.dataset("D").unwrap().write(&Selection::rows_cols(3..10, 0..10), &[2u8; 70]).unwrap();
        assert!(b.read_values::<u8>("D").unwrap()[..30].iter().all(|&v| v == 1));

        a.close().unwrap();
        b.close().unwrap();

        let f = File::open(&path, Mode::Read, Access::Serial).unwrap();
        let all = f.read_values::<u8>("D").unwrap();
        assert!(all[..30].iter().all(|&v| v == 1));
        assert!(all[30..].iter().all(|&v| v == 2));
    }

    #[test]
    fn test_structural_changes_from_two_handles_conflict() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("s.h5");
        let a = File::create(&path, Access::Collective).unwrap();
        let b = File::open(&path, Mode::ReadWrite, Access::Collective).unwrap();

        a.write_values("X", &[1u8]).unwrap();
        a.flush().unwrap();
        b.write_values("Y", &[2u8]).unwrap();
        assert!(matches!(b.flush(), Err(Error::Conflict(_))));

        let f = File::open(&path, Mode::Read, Access::Serial).unwrap();
        assert!(f.exists("X").unwrap());
        assert!(!f.exists("Y").unwrap());
    }
}
