//! Creation options and the container initializer.

use serde::{Deserialize, Serialize};

use super::crs::CrsTranslator;
use super::schema::{self, BandSpec, Schema};
use super::transform::GeoTransform;
use crate::store::File;
use crate::util::{DataType, Error, Result, Scalar};

/// Default chunk shape (rows, cols) of band pixel arrays.
pub const DEFAULT_CHUNKS: (u64, u64) = (256, 256);
pub const DEFAULT_BLOCK_SIZE: u32 = 256;
pub const DEFAULT_COMPRESSION: u8 = 1;

/// Parameters for creating a new container.
///
/// # Example
///
/// ```ignore
/// let opts = CreateOptions::new(1000, 800, 3, DataType::UInt16)
///     .chunks(100, 100)
///     .no_data(0u16);
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CreateOptions {
    pub width: Option<u64>,
    pub height: Option<u64>,
    pub count: Option<usize>,
    pub dtype: Option<DataType>,
    pub transform: Option<GeoTransform>,
    pub crs: Option<String>,
    pub no_data: Option<Scalar>,
    /// Chunk shape as (rows, cols).
    pub chunks: (u64, u64),
    pub block_size: u32,
    /// Zlib level, 0 for none. Forced to 0 in parallel mode.
    pub compression: u8,
    pub band_names: Option<Vec<String>>,
    /// Create through a collective handle shared by parallel writers.
    pub parallel: bool,
}

impl Default for CreateOptions {
    fn default() -> Self {
        Self {
            width: None,
            height: None,
            count: None,
            dtype: None,
            transform: None,
            crs: None,
            no_data: None,
            chunks: DEFAULT_CHUNKS,
            block_size: DEFAULT_BLOCK_SIZE,
            compression: DEFAULT_COMPRESSION,
            band_names: None,
            parallel: false,
        }
    }
}

impl CreateOptions {
    pub fn new(width: u64, height: u64, count: usize, dtype: DataType) -> Self {
        Self {
            width: Some(width),
            height: Some(height),
            count: Some(count),
            dtype: Some(dtype),
            ..Default::default()
        }
    }

    /// Georeferencing: GDAL-order transform plus CRS text.
    pub fn georef(mut self, transform: GeoTransform, crs: impl Into<String>) -> Self {
        self.transform = Some(transform);
        self.crs = Some(crs.into());
        self
    }

    pub fn no_data(mut self, value: impl Into<Scalar>) -> Self {
        self.no_data = Some(value.into());
        self
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

    pub fn band_names<S: Into<String>>(mut self, names: impl IntoIterator<Item = S>) -> Self {
        self.band_names = Some(names.into_iter().map(Into::into).collect());
        self
    }

    pub fn parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Check the options and resolve defaults.
    pub(crate) fn resolve(&self, translator: &dyn CrsTranslator) -> Result<ResolvedCreate> {
        let width = self.width.filter(|&w| w > 0);
        let height = self.height.filter(|&h| h > 0);
        let (Some(width), Some(height)) = (width, height) else {
            return Err(Error::validation("both width and height must be given and non-zero"));
        };
        let dtype = self.dtype.ok_or_else(|| Error::validation("the dtype must be given"))?;
        let count = match self.count {
            Some(n) if n > 0 => n,
            _ => return Err(Error::validation("the band count must be given and non-zero")),
        };
        if count > u16::MAX as usize {
            return Err(Error::validation(format!("{} bands exceed the header limit", count)));
        }
        check_chunks(self.chunks, width, height)?;

        // No georeferencing given means image coordinates.
        let (transform, wkt) = match (&self.transform, &self.crs) {
            (Some(t), Some(crs)) => {
                t.validate()?;
                (*t, translator.to_wkt(crs)?)
            }
            _ => (GeoTransform::default(), String::new()),
        };

        let names: Vec<String> = match &self.band_names {
            Some(names) if names.len() == count => names.clone(),
            Some(names) => {
                tracing::warn!(
                    given = names.len(),
                    count,
                    "band name list does not match the band count; using defaults"
                );
                default_band_names(count)
            }
            None => default_band_names(count),
        };

        Ok(ResolvedCreate {
            width,
            height,
            transform,
            wkt,
            bands: names
                .into_iter()
                .map(|name| BandSpec {
                    dtype,
                    chunks: self.chunks,
                    block_size: self.block_size,
                    compression: self.compression,
                    no_data: self.no_data,
                    description: String::new(),
                    name,
                })
                .collect(),
        })
    }
}

fn default_band_names(count: usize) -> Vec<String> {
    (1..=count).map(|n| format!("Band {}", n)).collect()
}

/// Chunk shapes must be non-zero and fit inside the image.
pub(crate) fn check_chunks(chunks: (u64, u64), width: u64, height: u64) -> Result<()> {
    let (rows, cols) = chunks;
    if rows == 0 || cols == 0 {
        return Err(Error::validation(format!("chunk shape {:?} has a zero axis", chunks)));
    }
    if rows > height || cols > width {
        return Err(Error::validation(format!(
            "chunk shape {:?} exceeds the image ({} rows x {} cols)",
            chunks, height, width
        )));
    }
    Ok(())
}

/// Validated creation parameters.
#[derive(Debug)]
pub(crate) struct ResolvedCreate {
    pub width: u64,
    pub height: u64,
    pub transform: GeoTransform,
    pub wkt: String,
    pub bands: Vec<BandSpec>,
}

/// Lay down the full skeleton of a new container.
pub(crate) fn initialize(file: &File, schema: &Schema, spec: &ResolvedCreate) -> Result<()> {
    for (i, band) in spec.bands.iter().enumerate() {
        schema::stage_band(file, schema, i + 1, spec.height, spec.width, band)?;
    }
    file.create_group(schema::GCPS)?;
    file.require_group(schema::METADATA)?;
    schema::write_header(
        file,
        schema,
        spec.width,
        spec.height,
        spec.bands.len(),
        &spec.transform,
        &spec.wkt,
    )?;
    file.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kea::crs::WktPassthrough;

    #[test]
    fn test_missing_parameters() {
        let cases = [
            CreateOptions { width: None, ..CreateOptions::new(10, 10, 1, DataType::UInt8).chunks(5, 5) },
            CreateOptions::new(0, 10, 1, DataType::UInt8).chunks(5, 5),
            CreateOptions { dtype: None, ..CreateOptions::new(10, 10, 1, DataType::UInt8).chunks(5, 5) },
            CreateOptions::new(10, 10, 0, DataType::UInt8).chunks(5, 5),
            CreateOptions::new(10, 10, 1, DataType::UInt8),
        ];
        for opts in cases {
            assert!(opts.resolve(&WktPassthrough).unwrap_err().is_validation());
        }
    }

    #[test]
    fn test_default_georef_and_names() {
        let opts = CreateOptions::new(300, 300, 2, DataType::Float32).band_names(["only one"]);
        let resolved = opts.resolve(&WktPassthrough).unwrap();
        assert_eq!(resolved.transform, GeoTransform::default());
        assert_eq!(resolved.wkt, "");
        assert_eq!(resolved.bands[1].name, "Band 2");
        assert_eq!(resolved.bands[0].chunks, (256, 256));
    }

    #[test]
    fn test_bad_crs_and_transform() {
        let proj = CreateOptions::new(10, 10, 1, DataType::UInt8)
            .chunks(5, 5)
            .georef(GeoTransform::default(), "+proj=utm +zone=55");
        assert!(proj.resolve(&WktPassthrough).unwrap_err().is_validation());

        let nan = CreateOptions::new(10, 10, 1, DataType::UInt8)
            .chunks(5, 5)
            .georef(GeoTransform::from_gdal([f64::NAN, 1.0, 0.0, 0.0, 0.0, -1.0]), "");
        assert!(nan.resolve(&WktPassthrough).unwrap_err().is_validation());
    }

    #[test]
    fn test_options_from_json() {
        let opts: CreateOptions =
            serde_json::from_str(r#"{"width": 64, "height": 32, "count": 1, "dtype": "int16", "chunks": [16, 16]}"#)
                .unwrap();
        assert_eq!(opts.dtype, Some(DataType::Int16));
        assert_eq!(opts.block_size, DEFAULT_BLOCK_SIZE);
        assert!(opts.resolve(&WktPassthrough).is_ok());
    }
}
