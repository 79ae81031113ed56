//! Appending bands to an existing container.

use serde::{Deserialize, Serialize};

use super::container::Container;
use super::create::{check_chunks, DEFAULT_BLOCK_SIZE, DEFAULT_CHUNKS, DEFAULT_COMPRESSION};
use super::schema::{self, BandSpec};
use crate::store::Selection;
use crate::util::{DataType, Error, Result, Scalar};

/// Parameters of a band added with [`Container::add_image_band`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BandOptions {
    pub dtype: DataType,
    /// Chunk shape as (rows, cols).
    #[serde(default = "default_chunks")]
    pub chunks: (u64, u64),
    #[serde(default = "default_block_size")]
    pub block_size: u32,
    #[serde(default = "default_compression")]
    pub compression: u8,
    #[serde(default)]
    pub no_data: Option<Scalar>,
    #[serde(default)]
    pub description: Option<String>,
    /// Display name; defaults to `Band <n>`.
    #[serde(default)]
    pub name: Option<String>,
}

fn default_chunks() -> (u64, u64) {
    DEFAULT_CHUNKS
}

fn default_block_size() -> u32 {
    DEFAULT_BLOCK_SIZE
}

fn default_compression() -> u8 {
    DEFAULT_COMPRESSION
}

impl BandOptions {
    pub fn new(dtype: DataType) -> Self {
        Self {
            dtype,
            chunks: DEFAULT_CHUNKS,
            block_size: DEFAULT_BLOCK_SIZE,
            compression: DEFAULT_COMPRESSION,
            no_data: None,
            description: None,
            name: None,
        }
    }

    pub fn chunks(mut self, rows: u64, cols: u64) -> Self {
        self.chunks = (rows, cols);
        self
    }

    pub fn block_size(mut self, size: u32) -> Self {
        self.block_size = size;
        self
    }

    pub fn compression(mut self, level: u8) -> Self {
        self.compression = level;
        self
    }

    pub fn no_data(mut self, value: impl Into<Scalar>) -> Self {
        self.no_data = Some(value.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

impl Container {
    /// Append a band after the existing ones and return its index.
    ///
    /// The band group is staged first and `NUMBANDS` is bumped last, so an
    /// interrupted append leaves an undeclared group that discovery skips.
    pub fn add_image_band(&self, opts: &BandOptions) -> Result<usize> {
        self.file.check_writable()?;
        let layout = self.layout()?;
        check_chunks(opts.chunks, layout.width, layout.height)?;
        if layout.count() >= u16::MAX as usize {
            return Err(Error::validation("the header cannot declare more bands"));
        }

        let band = layout.count() + 1;
        let spec = BandSpec {
            dtype: opts.dtype,
            chunks: opts.chunks,
            block_size: opts.block_size,
            compression: opts.compression,
            no_data: opts.no_data,
            description: opts.description.clone().unwrap_or_default(),
            name: opts.name.clone().unwrap_or_else(|| format!("Band {}", band)),
        };

        // A group left behind by an interrupted append is replaced.
        let group = schema::band_group(band);
        if self.file.exists(&group)? {
            tracing::warn!(band, "replacing undeclared band group");
            self.file.delete(&group)?;
            let name_path = schema::band_name_path(band);
            if self.file.exists(&name_path)? {
                self.file.delete(&name_path)?;
            }
        }

        schema::stage_band(&self.file, &self.schema, band, layout.height, layout.width, &spec)?;
        self.file
            .dataset(schema::HEADER_NUMBANDS)?
            .write(&Selection::new([0..1]), &[band as u16])?;
        if self.schema.is_parallel() {
            self.file.flush()?;
        }
        self.refresh()?;

        tracing::debug!(band, dtype = %opts.dtype, "appended band");
        Ok(band)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kea::CreateOptions;

    #[test]
    fn test_append_band() {
        let dir = tempfile::tempdir().unwrap();
        let opts = CreateOptions::new(10, 10, 1, DataType::UInt8).chunks(5, 5);
        let c = Container::create(dir.path().join("a.kea"), &opts).unwrap();

        let band = c
            .add_image_band(&BandOptions::new(DataType::Int32).chunks(5, 5).name("Segments").description("ids"))
            .unwrap();
        assert_eq!(band, 2);
        assert_eq!(c.count().unwrap(), 2);
        assert_eq!(c.dtypes().unwrap()[&2], DataType::Int32);
        assert_eq!(c.descriptions().unwrap()[&2], "ids");
        assert_eq!(c.metadata().unwrap()["Band_2"], "Segments");
        assert_eq!(c.dtype().unwrap(), DataType::Int32);
    }

    #[test]
    fn test_append_rejects_large_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let opts = CreateOptions::new(10, 10, 1, DataType::UInt8).chunks(5, 5);
        let c = Container::create(dir.path().join("a.kea"), &opts).unwrap();
        let err = c.add_image_band(&BandOptions::new(DataType::UInt8)).unwrap_err();
        assert!(err.is_validation());
        assert_eq!(c.count().unwrap(), 1);
    }

    #[test]
    fn test_orphan_group_is_ignored_then_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.kea");
        let opts = CreateOptions::new(10, 10, 1, DataType::UInt8).chunks(5, 5);
        let c = Container::create(&path, &opts).unwrap();

        // Stage a band without committing the count.
        let spec = BandSpec {
            dtype: DataType::UInt8,
            chunks: (5, 5),
            block_size: 256,
            compression: 0,
            no_data: None,
            description: String::new(),
            name: "Band 2".into(),
        };
        schema::stage_band(&c.file, &c.schema, 2, 10, 10, &spec).unwrap();
        c.close().unwrap();

        let c = Container::open(&path, crate::kea::OpenMode::ReadWrite).unwrap();
        assert_eq!(c.count().unwrap(), 1);
        assert_eq!(c.add_image_band(&BandOptions::new(DataType::Float32).chunks(5, 5)).unwrap(), 2);
        assert_eq!(c.dtypes().unwrap()[&2], DataType::Float32);
    }
}
