//! KEA container handle.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use parking_lot::RwLock;

use super::common::{BandColourInterp, LayerType};
use super::create::{initialize, CreateOptions};
use super::crs::{CrsTranslator, WktPassthrough};
use super::layout::Layout;
use super::schema::{band_path, Schema};
use super::transform::GeoTransform;
use crate::store::{Access, File, Mode, Selection};
use crate::util::{DataType, Error, Result, Scalar};

/// How an existing container is opened.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OpenMode {
    #[default]
    Read,
    ReadWrite,
}

impl From<OpenMode> for Mode {
    fn from(mode: OpenMode) -> Self {
        match mode {
            OpenMode::Read => Mode::Read,
            OpenMode::ReadWrite => Mode::ReadWrite,
        }
    }
}

/// An open KEA container.
///
/// The handle is `Sync`: parallel writers share one container and write
/// disjoint windows concurrently.
pub struct Container {
    pub(crate) file: File,
    pub(crate) schema: Schema,
    layout: RwLock<Arc<Layout>>,
}

impl std::fmt::Debug for Container {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Container")
            .field("path", &self.file.path())
            .field("mode", &self.file.mode())
            .field("parallel", &self.schema.is_parallel())
            .finish()
    }
}

impl Container {
    /// Open an existing container.
    pub fn open(path: impl AsRef<Path>, mode: OpenMode) -> Result<Self> {
        Self::open_with(path, mode, Access::Serial)
    }

    /// Open an existing container with an explicit store access pattern.
    pub fn open_with(path: impl AsRef<Path>, mode: OpenMode, access: Access) -> Result<Self> {
        let file = File::open(path, mode.into(), access)?;
        Self::from_file(file)
    }

    /// Create a new container, converting the CRS with [`WktPassthrough`].
    pub fn create(path: impl AsRef<Path>, opts: &CreateOptions) -> Result<Self> {
        Self::create_with(path, opts, &WktPassthrough)
    }

    /// Create a new container using `translator` for the CRS text.
    ///
    /// In parallel mode the whole structure is declared and committed before
    /// this returns, so writers may start on pixel data as soon as they hold
    /// this handle or open their own.
    pub fn create_with(path: impl AsRef<Path>, opts: &CreateOptions, translator: &dyn CrsTranslator) -> Result<Self> {
        let resolved = opts.resolve(translator)?;
        let access = if opts.parallel { Access::Collective } else { Access::Serial };
        let file = File::create(path, access)?;
        let schema = Schema::new(access);
        initialize(&file, &schema, &resolved)?;
        if opts.parallel {
            file.flush()?;
        }
        tracing::debug!(
            path = %file.path().display(),
            width = resolved.width,
            height = resolved.height,
            bands = resolved.bands.len(),
            parallel = opts.parallel,
            "created container"
        );
        Self::from_file(file)
    }

    fn from_file(file: File) -> Result<Self> {
        let layout = Layout::discover(&file)?;
        Ok(Self {
            schema: Schema::new(file.access()),
            file,
            layout: RwLock::new(Arc::new(layout)),
        })
    }

    /// Rebuild the layout snapshot after a structural change.
    pub(crate) fn refresh(&self) -> Result<()> {
        let layout = Layout::discover(&self.file)?;
        *self.layout.write() = Arc::new(layout);
        Ok(())
    }

    /// Current layout snapshot.
    pub fn layout(&self) -> Result<Arc<Layout>> {
        self.file.check_open()?;
        Ok(Arc::clone(&self.layout.read()))
    }

    /// Fail with `Lookup` unless `band` exists.
    pub(crate) fn band_exists(&self, band: usize) -> Result<()> {
        self.layout()?.band(band).map(|_| ())
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    pub fn is_closed(&self) -> bool {
        self.file.is_closed()
    }

    pub fn is_parallel(&self) -> bool {
        self.schema.is_parallel()
    }

    pub fn width(&self) -> Result<u64> {
        Ok(self.layout()?.width)
    }

    pub fn height(&self) -> Result<u64> {
        Ok(self.layout()?.height)
    }

    pub fn count(&self) -> Result<usize> {
        Ok(self.layout()?.count())
    }

    pub fn transform(&self) -> Result<GeoTransform> {
        Ok(self.layout()?.transform)
    }

    pub fn crs_wkt(&self) -> Result<String> {
        Ok(self.layout()?.crs_wkt.clone())
    }

    /// Element type of every band, keyed by band index.
    pub fn dtypes(&self) -> Result<BTreeMap<usize, DataType>> {
        self.per_band(|b| b.dtype)
    }

    /// Widened element type across all bands.
    pub fn dtype(&self) -> Result<DataType> {
        self.layout()?.dtype()
    }

    pub fn no_data(&self) -> Result<BTreeMap<usize, Option<Scalar>>> {
        self.per_band(|b| b.no_data)
    }

    pub fn chunks(&self) -> Result<BTreeMap<usize, Option<(u64, u64)>>> {
        self.per_band(|b| b.chunks)
    }

    pub fn descriptions(&self) -> Result<BTreeMap<usize, String>> {
        self.per_band(|b| b.description.clone())
    }

    pub fn layer_types(&self) -> Result<BTreeMap<usize, LayerType>> {
        self.per_band(|b| b.layer_type)
    }

    pub fn layer_usages(&self) -> Result<BTreeMap<usize, BandColourInterp>> {
        self.per_band(|b| b.layer_usage)
    }

    /// Display names from the `METADATA` group, keyed by dataset name.
    pub fn metadata(&self) -> Result<BTreeMap<String, String>> {
        Ok(self.layout()?.metadata.clone())
    }

    fn per_band<T>(&self, f: impl Fn(&super::BandInfo) -> T) -> Result<BTreeMap<usize, T>> {
        Ok(self.layout()?.bands.iter().map(|b| (b.index, f(b))).collect())
    }

    // ------------------------------------------------------------------------
    // Band-level setters
    // ------------------------------------------------------------------------

    pub fn write_description(&self, band: usize, description: &str) -> Result<()> {
        self.file.check_writable()?;
        self.band_exists(band)?;
        self.schema
            .replace_text(&self.file, &band_path(band, "DESCRIPTION"), description)?;
        self.refresh()
    }

    pub fn write_layer_type(&self, band: usize, layer_type: LayerType) -> Result<()> {
        self.write_band_code(band, "LAYER_TYPE", layer_type.code())
    }

    pub fn write_layer_usage(&self, band: usize, usage: BandColourInterp) -> Result<()> {
        self.write_band_code(band, "LAYER_USAGE", usage.code())
    }

    fn write_band_code(&self, band: usize, member: &str, code: u32) -> Result<()> {
        self.file.check_writable()?;
        self.band_exists(band)?;
        self.file
            .dataset(&band_path(band, member))?
            .write(&Selection::new([0..1]), &[code])?;
        self.refresh()
    }

    /// Per-band key/value metadata is not implemented.
    pub fn write_band_metadata(&self, band: usize, _metadata: &BTreeMap<String, String>) -> Result<()> {
        self.file.check_writable()?;
        self.band_exists(band)?;
        Err(Error::Unsupported("per-band metadata".into()))
    }

    // ------------------------------------------------------------------------
    // Lifetime
    // ------------------------------------------------------------------------

    pub fn flush(&self) -> Result<()> {
        self.file.flush()?;
        tracing::debug!(path = %self.path().display(), "flushed container");
        Ok(())
    }

    /// Flush (when writable) and close. Later calls fail with `Closed`.
    pub fn close(&self) -> Result<()> {
        self.file.close()
    }
}

impl Drop for Container {
    fn drop(&mut self) {
        if !self.file.is_closed() {
            if let Err(e) = self.file.close() {
                tracing::warn!(path = %self.file.path().display(), error = %e, "failed to flush container on drop");
            }
        }
    }
}
