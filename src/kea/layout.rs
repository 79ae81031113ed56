//! Layout snapshot of an open container.
//!
//! A [`Layout`] is assembled by one discovery pass over the file and never
//! patched afterwards; structural changes rebuild it.

use std::collections::BTreeMap;

use serde::Serialize;

use super::common::{BandColourInterp, LayerType, RatFieldType};
use super::schema::{self, band_group, band_name_path, band_path, parse_band_group};
use super::transform::GeoTransform;
use crate::store::{File, Selection};
use crate::util::{DataType, Error, Result, Scalar};

/// One column of a raster attribute table as described by its header.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ColumnDescriptor {
    pub name: String,
    pub field: RatFieldType,
    /// Column within the bucket array.
    pub local: usize,
    /// Display position across all buckets.
    pub global: usize,
    pub usage: String,
}

/// Attribute table header of one band.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RatLookup {
    pub rows: u64,
    pub chunk_size: u64,
    /// Columns in display order.
    pub columns: Vec<ColumnDescriptor>,
}

impl RatLookup {
    pub fn column(&self, name: &str) -> Option<&ColumnDescriptor> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Column count of one bucket.
    pub fn bucket_len(&self, field: RatFieldType) -> usize {
        self.columns.iter().filter(|c| c.field == field).count()
    }
}

/// Per-band part of the layout.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct BandInfo {
    pub index: usize,
    pub dtype: DataType,
    pub no_data: Option<Scalar>,
    /// Chunk shape of the pixel array as (rows, cols).
    pub chunks: Option<(u64, u64)>,
    pub block_size: Option<u64>,
    pub compression: u8,
    pub description: String,
    pub layer_type: LayerType,
    pub layer_usage: BandColourInterp,
    pub name: Option<String>,
    pub rat: Option<RatLookup>,
}

/// Read-only description of a container's structure.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Layout {
    pub width: u64,
    pub height: u64,
    pub transform: GeoTransform,
    pub crs_wkt: String,
    pub version: String,
    pub filetype: String,
    pub generator: String,
    /// Bands 1..=count, in order.
    pub bands: Vec<BandInfo>,
    /// Display names from the global `METADATA` group.
    pub metadata: BTreeMap<String, String>,
}

impl Layout {
    #[inline]
    pub fn count(&self) -> usize {
        self.bands.len()
    }

    pub fn band(&self, band: usize) -> Result<&BandInfo> {
        band.checked_sub(1)
            .and_then(|i| self.bands.get(i))
            .ok_or_else(|| Error::lookup(format!("band {} does not exist (count {})", band, self.count())))
    }

    pub fn contains(&self, band: usize) -> bool {
        (1..=self.count()).contains(&band)
    }

    pub fn dtypes(&self) -> Vec<DataType> {
        self.bands.iter().map(|b| b.dtype).collect()
    }

    /// Widened element type across every band.
    pub fn dtype(&self) -> Result<DataType> {
        DataType::promote(self.dtypes())
    }

    /// Run the discovery pass over `file`.
    pub fn discover(file: &File) -> Result<Self> {
        let size = file.read_values::<u64>(schema::HEADER_SIZE)?;
        let [width, height] = pair(&size, schema::HEADER_SIZE)?;
        let res = pair(&file.read_values::<f64>(schema::HEADER_RES)?, schema::HEADER_RES)?;
        let tl = pair(&file.read_values::<f64>(schema::HEADER_TL)?, schema::HEADER_TL)?;
        let rot = pair(&file.read_values::<f64>(schema::HEADER_ROT)?, schema::HEADER_ROT)?;

        let count = file
            .read_values::<u16>(schema::HEADER_NUMBANDS)?
            .first()
            .copied()
            .ok_or_else(|| Error::invalid("empty NUMBANDS"))? as usize;

        let bands = (1..=count)
            .map(|band| read_band(file, band))
            .collect::<Result<Vec<_>>>()?;

        for name in file.member_names("")? {
            if let Some(n) = parse_band_group(&name) {
                if n > count {
                    tracing::warn!(band = n, count, "ignoring band group not declared in the header");
                }
            }
        }

        let mut metadata = BTreeMap::new();
        if file.is_group(schema::METADATA)? {
            for key in file.member_names(schema::METADATA)? {
                let value = schema::read_text(file, &format!("{}/{}", schema::METADATA, key))?;
                metadata.insert(key, value);
            }
        }

        Ok(Self {
            width,
            height,
            transform: GeoTransform::from_parts(res, tl, rot),
            crs_wkt: schema::read_text(file, schema::HEADER_WKT)?,
            version: schema::read_text(file, schema::HEADER_VERSION)?,
            filetype: schema::read_text(file, schema::HEADER_FILETYPE)?,
            generator: schema::read_text(file, schema::HEADER_GENERATOR)?,
            bands,
            metadata,
        })
    }
}

fn pair<T: Copy>(values: &[T], path: &str) -> Result<[T; 2]> {
    match values {
        [a, b] => Ok([*a, *b]),
        _ => Err(Error::invalid(format!("{} holds {} values, expected 2", path, values.len()))),
    }
}

fn first_u32(file: &File, path: &str) -> Result<u32> {
    file.read_values::<u32>(path)?
        .first()
        .copied()
        .ok_or_else(|| Error::invalid(format!("{} is empty", path)))
}

fn read_band(file: &File, band: usize) -> Result<BandInfo> {
    if !file.is_group(&band_group(band))? {
        return Err(Error::invalid(format!("header declares band {} but its group is missing", band)));
    }
    let code = file
        .read_values::<u16>(&band_path(band, "DATATYPE"))?
        .first()
        .copied()
        .ok_or_else(|| Error::invalid("empty DATATYPE"))?;
    let dtype = DataType::from_code(code)?;

    let data = file.dataset(&band_path(band, "DATA"))?;
    let chunks = data.chunks()?.and_then(|c| match c.sizes() {
        &[rows, cols] => Some((rows, cols)),
        _ => None,
    });
    let block_size = data.attr("BLOCK_SIZE")?.and_then(|a| a.as_u64());

    let no_data_path = band_path(band, "NO_DATA_VAL");
    let no_data = if file.exists(&no_data_path)? {
        let ds = file.dataset(&no_data_path)?;
        let raw = ds.read_raw(&Selection::new([0..1]))?;
        Some(Scalar::from_bytes(dtype, &raw)?)
    } else {
        None
    };

    let name_path = band_name_path(band);
    let name = if file.exists(&name_path)? {
        Some(schema::read_text(file, &name_path)?)
    } else {
        None
    };

    Ok(BandInfo {
        index: band,
        dtype,
        no_data,
        chunks,
        block_size,
        compression: data.compression()?,
        description: schema::read_text(file, &band_path(band, "DESCRIPTION"))?,
        layer_type: LayerType::from_code(first_u32(file, &band_path(band, "LAYER_TYPE"))?)?,
        layer_usage: BandColourInterp::from_code(first_u32(file, &band_path(band, "LAYER_USAGE"))?)?,
        name,
        rat: read_rat_lookup(file, band)?,
    })
}

fn read_rat_lookup(file: &File, band: usize) -> Result<Option<RatLookup>> {
    let size_path = band_path(band, "ATT/HEADER/SIZE");
    if !file.exists(&size_path)? {
        return Ok(None);
    }
    let size = file.read_values::<u64>(&size_path)?;
    if size.len() != 5 {
        return Err(Error::invalid(format!("{} holds {} values, expected 5", size_path, size.len())));
    }
    let total: u64 = size[1..].iter().sum();
    if total == 0 {
        return Ok(None);
    }
    let chunk_size = file
        .read_values::<u64>(&band_path(band, "ATT/HEADER/CHUNKSIZE"))?
        .first()
        .copied()
        .unwrap_or(0);

    let mut columns = Vec::with_capacity(total as usize);
    for field in RatFieldType::ALL {
        let n = size[field.size_slot()] as usize;
        if n == 0 {
            continue;
        }
        let base = band_path(band, &format!("ATT/HEADER/{}", field.fields_name()));
        let names = schema::read_text_array(file, &format!("{}/NAME", base))?;
        let usages = schema::read_text_array(file, &format!("{}/USAGE", base))?;
        let index = file.read_values::<u32>(&format!("{}/INDEX", base))?;
        let colnum = file.read_values::<u32>(&format!("{}/COLNUM", base))?;
        if [names.len(), usages.len(), index.len(), colnum.len()].iter().any(|&l| l != n) {
            return Err(Error::invalid(format!("{} descriptors do not match {} columns", base, n)));
        }
        for i in 0..n {
            columns.push(ColumnDescriptor {
                name: names[i].clone(),
                field,
                local: index[i] as usize,
                global: colnum[i] as usize,
                usage: usages[i].clone(),
            });
        }
    }
    columns.sort_by_key(|c| c.global);
    if columns.iter().enumerate().any(|(i, c)| c.global != i) {
        return Err(Error::invalid(format!(
            "band {} attribute table column numbers are not a permutation",
            band
        )));
    }

    Ok(Some(RatLookup { rows: size[0], chunk_size, columns }))
}
