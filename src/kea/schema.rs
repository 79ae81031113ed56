//! On-disk layout of a KEA container.
//!
//! ```text
//! HEADER/    SIZE RES TL ROT NUMBANDS WKT VERSION FILETYPE GENERATOR
//! METADATA/  Band_<n>
//! GCPS/
//! BAND<n>/   DATA DATATYPE DESCRIPTION LAYER_TYPE LAYER_USAGE [NO_DATA_VAL]
//!            METADATA/ OVERVIEWS/ ATT/{DATA,NEIGHBOURS,HEADER}/
//! ```
//!
//! Containers written through a collective handle cannot hold
//! variable-length strings, so [`Schema`] switches every text field to
//! fixed-length storage and stores empty text as a single-space placeholder.

use super::common::{BandColourInterp, LayerType};
use crate::store::{Access, AttrValue, DatasetBuilder, ElementType, File, Selection, StringKind};
use crate::util::{DataType, Error, Result, Scalar};

pub const IMAGE_VERSION: &str = "1.2";
pub const VERSION: &str = "1.1";
pub const FILETYPE: &str = "KEA";
pub const GENERATOR: &str = "geoh5";

/// Stand-in for empty text in fixed-length fields.
///
/// Parallel handles refuse to store this exact value, since the string
/// repair pass turns it back into empty text.
pub const EMPTY_PLACEHOLDER: &str = " ";

pub(crate) const HEADER: &str = "HEADER";
pub(crate) const METADATA: &str = "METADATA";
pub(crate) const GCPS: &str = "GCPS";

pub(crate) const HEADER_SIZE: &str = "HEADER/SIZE";
pub(crate) const HEADER_RES: &str = "HEADER/RES";
pub(crate) const HEADER_TL: &str = "HEADER/TL";
pub(crate) const HEADER_ROT: &str = "HEADER/ROT";
pub(crate) const HEADER_NUMBANDS: &str = "HEADER/NUMBANDS";
pub(crate) const HEADER_WKT: &str = "HEADER/WKT";
pub(crate) const HEADER_VERSION: &str = "HEADER/VERSION";
pub(crate) const HEADER_FILETYPE: &str = "HEADER/FILETYPE";
pub(crate) const HEADER_GENERATOR: &str = "HEADER/GENERATOR";

/// Group of band `band` (1-based).
pub(crate) fn band_group(band: usize) -> String {
    format!("BAND{}", band)
}

/// Path of a member of a band group.
pub(crate) fn band_path(band: usize, member: &str) -> String {
    format!("BAND{}/{}", band, member)
}

/// Path of the display name of band `band`.
pub(crate) fn band_name_path(band: usize) -> String {
    format!("{}/Band_{}", METADATA, band)
}

/// Band index encoded in a root member name such as `BAND3`.
pub(crate) fn parse_band_group(name: &str) -> Option<usize> {
    name.strip_prefix("BAND")?.parse().ok().filter(|&n| n > 0)
}

/// Structure of one band group as staged by create and append.
#[derive(Clone, Debug)]
pub(crate) struct BandSpec {
    pub dtype: DataType,
    /// (rows, cols)
    pub chunks: (u64, u64),
    pub block_size: u32,
    pub compression: u8,
    pub no_data: Option<Scalar>,
    pub description: String,
    pub name: String,
}

/// How text and compression are laid down for one container handle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Schema {
    parallel: bool,
}

impl Schema {
    pub fn new(access: Access) -> Self {
        Self { parallel: access == Access::Collective }
    }

    #[inline]
    pub fn is_parallel(&self) -> bool {
        self.parallel
    }

    pub fn string_kind(&self) -> StringKind {
        if self.parallel {
            StringKind::Fixed
        } else {
            StringKind::Variable
        }
    }

    /// Stored form of a text value.
    pub fn encode<'a>(&self, value: &'a str) -> Result<&'a str> {
        if !self.parallel {
            return Ok(value);
        }
        match value {
            "" => Ok(EMPTY_PLACEHOLDER),
            EMPTY_PLACEHOLDER => Err(Error::validation(
                "a single space cannot be stored in parallel mode; it reads back as empty text",
            )),
            _ => Ok(value),
        }
    }

    pub fn text_attr(&self, value: &str) -> Result<AttrValue> {
        Ok(AttrValue::Text(self.encode(value)?.to_string(), self.string_kind()))
    }

    /// Compression level actually used; collective writers cannot compress.
    pub fn compression(&self, requested: u8) -> u8 {
        if self.parallel && requested > 0 {
            tracing::warn!(requested, "compression is not available in parallel mode; writing uncompressed");
            0
        } else {
            requested
        }
    }

    /// Create a single-element text dataset.
    pub fn write_text(&self, file: &File, path: &str, value: &str) -> Result<()> {
        file.write_text(path, self.encode(value)?, self.string_kind()).map(|_| ())
    }

    /// Replace the value of a single-element text dataset, creating it if missing.
    ///
    /// Fixed-length fields are rewritten in place when the new value fits.
    /// Serial handles recreate them as variable-length text otherwise.
    pub fn replace_text(&self, file: &File, path: &str, value: &str) -> Result<()> {
        self.replace_text_array(file, path, &[value.to_string()])
    }

    /// Create or overwrite a 1-D text dataset.
    pub fn replace_text_array(&self, file: &File, path: &str, values: &[String]) -> Result<()> {
        let stored = values
            .iter()
            .map(|v| self.encode(v).map(str::to_string))
            .collect::<Result<Vec<_>>>()?;
        let width = stored.iter().map(String::len).max().unwrap_or(0).max(1);
        let n = stored.len() as u64;

        if file.exists(path)? {
            let ds = file.dataset(path)?;
            let fits = match ds.element_type()? {
                ElementType::VarString => true,
                ElementType::FixedString(w) => self.parallel && width <= w,
                ElementType::Numeric(_) => false,
            };
            if fits && ds.shape()?.sizes() == [n] {
                return ds.write_text(&Selection::new([0..n]), &stored);
            }
            if self.parallel {
                return Err(Error::validation(format!(
                    "{} cannot be resized under parallel access",
                    path
                )));
            }
            file.delete(path)?;
        }

        let element = match self.string_kind() {
            StringKind::Fixed => ElementType::FixedString(width),
            StringKind::Variable => ElementType::VarString,
        };
        let ds = file.create_dataset(path, DatasetBuilder::new(element, n))?;
        ds.write_text(&Selection::new([0..n]), &stored)
    }
}

/// Read a text field, mapping the fixed-length placeholder back to empty text.
pub(crate) fn read_text(file: &File, path: &str) -> Result<String> {
    let value = file.read_text(path)?;
    decode(file, path, value)
}

/// Read every element of a 1-D text dataset.
pub(crate) fn read_text_array(file: &File, path: &str) -> Result<Vec<String>> {
    let ds = file.dataset(path)?;
    let fixed = matches!(ds.element_type()?, ElementType::FixedString(_));
    let values = ds.read_text(&Selection::all(&ds.shape()?))?;
    Ok(values
        .into_iter()
        .map(|v| if fixed && v == EMPTY_PLACEHOLDER { String::new() } else { v })
        .collect())
}

fn decode(file: &File, path: &str, value: String) -> Result<String> {
    let fixed = matches!(file.dataset(path)?.element_type()?, ElementType::FixedString(_));
    Ok(if fixed && value == EMPTY_PLACEHOLDER { String::new() } else { value })
}

/// Write the header group.
pub(crate) fn write_header(
    file: &File,
    schema: &Schema,
    width: u64,
    height: u64,
    count: usize,
    transform: &super::GeoTransform,
    wkt: &str,
) -> Result<()> {
    file.create_group(HEADER)?;
    file.write_values(HEADER_SIZE, &[width, height])?;
    file.write_values(HEADER_RES, &transform.res())?;
    file.write_values(HEADER_TL, &transform.tl())?;
    file.write_values(HEADER_ROT, &transform.rot())?;
    file.write_values(HEADER_NUMBANDS, &[count as u16])?;
    schema.write_text(file, HEADER_WKT, wkt)?;
    schema.write_text(file, HEADER_VERSION, VERSION)?;
    schema.write_text(file, HEADER_FILETYPE, FILETYPE)?;
    schema.write_text(file, HEADER_GENERATOR, GENERATOR)
}

/// Create every structural element of band `band`, including its display name.
///
/// Does not touch `NUMBANDS`.
pub(crate) fn stage_band(
    file: &File,
    schema: &Schema,
    band: usize,
    height: u64,
    width: u64,
    spec: &BandSpec,
) -> Result<()> {
    let group = band_group(band);
    file.create_group(&group)?;
    file.create_group(&band_path(band, "METADATA"))?;
    file.create_group(&band_path(band, "OVERVIEWS"))?;

    let mut builder = DatasetBuilder::new(ElementType::Numeric(spec.dtype), (height, width))
        .chunks(spec.chunks)
        .compression(schema.compression(spec.compression));
    if let Some(no_data) = spec.no_data {
        builder = builder.fill_value(no_data);
    }
    let data = file.create_dataset(&band_path(band, "DATA"), builder)?;
    data.set_attr("CLASS", schema.text_attr("IMAGE")?)?;
    data.set_attr("IMAGE_VERSION", schema.text_attr(IMAGE_VERSION)?)?;
    data.set_attr("BLOCK_SIZE", AttrValue::UInt(spec.block_size as u64))?;

    file.write_values(&band_path(band, "DATATYPE"), &[spec.dtype.code()])?;
    schema.write_text(file, &band_path(band, "DESCRIPTION"), &spec.description)?;
    file.write_values(&band_path(band, "LAYER_TYPE"), &[LayerType::default().code()])?;
    file.write_values(&band_path(band, "LAYER_USAGE"), &[BandColourInterp::default().code()])?;

    file.create_group(&band_path(band, "ATT/DATA"))?;
    file.create_group(&band_path(band, "ATT/NEIGHBOURS"))?;
    file.write_values(&band_path(band, "ATT/HEADER/CHUNKSIZE"), &[0u64])?;
    file.write_values(&band_path(band, "ATT/HEADER/SIZE"), &[0u64; 5])?;

    if let Some(no_data) = spec.no_data {
        let ds = file.create_dataset(
            &band_path(band, "NO_DATA_VAL"),
            DatasetBuilder::new(ElementType::Numeric(spec.dtype), 1u64),
        )?;
        ds.write_raw(&Selection::new([0..1]), &no_data.to_bytes(spec.dtype))?;
    }

    file.require_group(METADATA)?;
    schema.write_text(file, &band_name_path(band), &spec.name)?;
    tracing::debug!(band, dtype = %spec.dtype, "staged band group");
    Ok(())
}
