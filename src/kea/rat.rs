//! Raster attribute tables.
//!
//! A table's columns are split by type into up to four bucket arrays under
//! `ATT/DATA`, each a row-major `(rows, columns)` array. The header under
//! `ATT/HEADER` records the row count, the column count of every bucket and,
//! per column, its name, position inside its bucket, usage tag and display
//! position.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use super::common::RatFieldType;
use super::container::Container;
use super::layout::{ColumnDescriptor, RatLookup};
use super::schema::band_path;
use crate::store::{DatasetBuilder, ElementType, File, Selection};
use crate::util::{DataType, Error, Result};

/// Default rows per chunk of the bucket arrays.
pub const DEFAULT_RAT_CHUNK: u64 = 1000;

/// Values of one column.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "values", rename_all = "lowercase")]
pub enum ColumnData {
    Bool(Vec<bool>),
    Int(Vec<i64>),
    Float(Vec<f64>),
    String(Vec<String>),
}

impl ColumnData {
    pub fn len(&self) -> usize {
        match self {
            Self::Bool(v) => v.len(),
            Self::Int(v) => v.len(),
            Self::Float(v) => v.len(),
            Self::String(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn field_type(&self) -> RatFieldType {
        match self {
            Self::Bool(_) => RatFieldType::Bool,
            Self::Int(_) => RatFieldType::Int,
            Self::Float(_) => RatFieldType::Float,
            Self::String(_) => RatFieldType::String,
        }
    }
}

/// A named table column.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    /// Free-form usage tag such as `Generic` or `Red`.
    pub usage: String,
    pub data: ColumnData,
}

impl Column {
    pub fn new(name: impl Into<String>, data: ColumnData) -> Self {
        Self { name: name.into(), usage: "Generic".to_string(), data }
    }

    pub fn with_usage(mut self, usage: impl Into<String>) -> Self {
        self.usage = usage.into();
        self
    }
}

/// Columns in display order, all of the same length.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RatTable {
    pub columns: Vec<Column>,
}

impl RatTable {
    pub fn new(columns: Vec<Column>) -> Self {
        Self { columns }
    }

    pub fn push(&mut self, column: Column) {
        self.columns.push(column);
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Row count, taken from the first column.
    pub fn rows(&self) -> usize {
        self.columns.first().map_or(0, |c| c.data.len())
    }

    fn validate(&self) -> Result<()> {
        let rows = self.rows();
        if let Some(c) = self.columns.iter().find(|c| c.data.len() != rows) {
            return Err(Error::validation(format!(
                "column {:?} has {} rows, expected {}",
                c.name,
                c.data.len(),
                rows
            )));
        }
        let mut seen = HashSet::new();
        if let Some(c) = self.columns.iter().find(|c| !seen.insert(c.name.as_str())) {
            return Err(Error::validation(format!("duplicate column name {:?}", c.name)));
        }
        Ok(())
    }
}

fn bucket_element(field: RatFieldType) -> ElementType {
    match field {
        RatFieldType::Bool | RatFieldType::Int => ElementType::Numeric(DataType::Int64),
        RatFieldType::Float => ElementType::Numeric(DataType::Float64),
        RatFieldType::String => ElementType::VarString,
    }
}

/// Reuse a dataset of the same declaration, or replace it.
fn recreate(file: &File, path: &str, element: ElementType, shape: (u64, u64), chunks: (u64, u64), level: u8) -> Result<()> {
    if file.exists(path)? {
        let ds = file.dataset(path)?;
        let same = ds.element_type()? == element
            && ds.shape()?.sizes() == [shape.0, shape.1]
            && ds.chunks()?.map(|c| c.sizes().to_vec()) == Some(vec![chunks.0, chunks.1])
            && ds.compression()? == level;
        if same {
            return Ok(());
        }
        file.delete(path)?;
    }
    file.create_dataset(path, DatasetBuilder::new(element, shape).chunks(chunks).compression(level))?;
    Ok(())
}

/// Replace a 1-D u32 descriptor array.
fn replace_u32s(file: &File, path: &str, values: &[u32]) -> Result<()> {
    let n = values.len() as u64;
    if file.exists(path)? {
        let ds = file.dataset(path)?;
        if ds.shape()?.sizes() == [n] && ds.element_type()? == ElementType::Numeric(DataType::UInt32) {
            return ds.write(&Selection::new([0..n]), values);
        }
        file.delete(path)?;
    }
    file.write_values(path, values).map(|_| ())
}

impl Container {
    /// Write `table` as the attribute table of `band`, replacing any existing one.
    ///
    /// Bucket arrays are chunked as `(min(rows, chunk_size), 1)`.
    pub fn write_rat(&self, band: usize, table: &RatTable, chunk_size: u64, compression: u8) -> Result<()> {
        self.file.check_writable()?;
        self.band_exists(band)?;
        table.validate()?;

        let has_strings = table.columns.iter().any(|c| c.data.field_type() == RatFieldType::String);
        if self.schema.is_parallel() && has_strings {
            return Err(Error::validation("string columns cannot be written in parallel mode"));
        }
        let level = self.schema.compression(compression);
        let rows = table.rows() as u64;
        let chunk_rows = rows.min(chunk_size).max(1);

        let mut counts = [0u64; 5];
        counts[0] = rows;
        for field in RatFieldType::ALL {
            let members: Vec<(usize, &Column)> = table
                .columns
                .iter()
                .enumerate()
                .filter(|(_, c)| c.data.field_type() == field)
                .collect();
            counts[field.size_slot()] = members.len() as u64;
            self.write_bucket(band, field, rows, chunk_rows, level, &members)?;
        }

        self.file
            .dataset(&band_path(band, "ATT/HEADER/CHUNKSIZE"))?
            .write(&Selection::new([0..1]), &[chunk_size])?;
        self.file
            .dataset(&band_path(band, "ATT/HEADER/SIZE"))?
            .write(&Selection::new([0..5]), &counts)?;

        self.refresh()?;
        tracing::debug!(band, rows, columns = table.columns.len(), "wrote attribute table");
        Ok(())
    }

    fn write_bucket(
        &self,
        band: usize,
        field: RatFieldType,
        rows: u64,
        chunk_rows: u64,
        level: u8,
        members: &[(usize, &Column)],
    ) -> Result<()> {
        let data_path = band_path(band, &format!("ATT/DATA/{}", field.data_name()));
        let fields_path = band_path(band, &format!("ATT/HEADER/{}", field.fields_name()));

        if members.is_empty() {
            // Stale buckets are dropped where deletes are allowed; SIZE hides them otherwise.
            if !self.schema.is_parallel() {
                for path in [&data_path, &fields_path] {
                    if self.file.exists(path)? {
                        self.file.delete(path)?;
                    }
                }
            }
            return Ok(());
        }

        let n = members.len() as u64;
        recreate(&self.file, &data_path, bucket_element(field), (rows, n), (chunk_rows, 1), level)?;
        let ds = self.file.dataset(&data_path)?;
        for (local, (_, column)) in members.iter().enumerate() {
            let sel = Selection::rows_cols(0..rows, local as u64..local as u64 + 1);
            match &column.data {
                ColumnData::Bool(v) => {
                    let ints: Vec<i64> = v.iter().map(|&b| b as i64).collect();
                    ds.write(&sel, &ints)?;
                }
                ColumnData::Int(v) => ds.write(&sel, v)?,
                ColumnData::Float(v) => ds.write(&sel, v)?,
                ColumnData::String(v) => ds.write_text(&sel, v)?,
            }
        }

        let names: Vec<String> = members.iter().map(|(_, c)| c.name.clone()).collect();
        let usages: Vec<String> = members.iter().map(|(_, c)| c.usage.clone()).collect();
        let index: Vec<u32> = (0..members.len() as u32).collect();
        let colnum: Vec<u32> = members.iter().map(|(g, _)| *g as u32).collect();

        self.file.require_group(&fields_path)?;
        self.schema.replace_text_array(&self.file, &format!("{}/NAME", fields_path), &names)?;
        self.schema.replace_text_array(&self.file, &format!("{}/USAGE", fields_path), &usages)?;
        replace_u32s(&self.file, &format!("{}/INDEX", fields_path), &index)?;
        replace_u32s(&self.file, &format!("{}/COLNUM", fields_path), &colnum)
    }

    /// Read the attribute table of `band`.
    ///
    /// `columns` selects columns by name in the given order (all columns in
    /// display order when `None`). Rows are `row_start..row_end`, up to the
    /// last row when `row_end` is `None`.
    pub fn read_rat(
        &self,
        band: usize,
        columns: Option<&[&str]>,
        row_start: u64,
        row_end: Option<u64>,
    ) -> Result<RatTable> {
        let layout = self.layout()?;
        let info = layout.band(band)?;
        let lookup = info
            .rat
            .as_ref()
            .ok_or_else(|| Error::lookup(format!("band {} has no attribute table", band)))?;

        let selected: Vec<&ColumnDescriptor> = match columns {
            None => lookup.columns.iter().collect(),
            Some(names) => names
                .iter()
                .map(|name| {
                    lookup
                        .column(name)
                        .ok_or_else(|| Error::lookup(format!("band {} has no column {:?}", band, name)))
                })
                .collect::<Result<_>>()?,
        };

        let rows = row_start..row_end.unwrap_or(lookup.rows);
        let columns = selected
            .into_iter()
            .map(|desc| self.read_column(band, lookup, desc, rows.clone()))
            .collect::<Result<_>>()?;
        Ok(RatTable { columns })
    }

    fn read_column(
        &self,
        band: usize,
        lookup: &RatLookup,
        desc: &ColumnDescriptor,
        rows: std::ops::Range<u64>,
    ) -> Result<Column> {
        let path = band_path(band, &format!("ATT/DATA/{}", desc.field.data_name()));
        let ds = self.file.dataset(&path)?;
        let local = desc.local as u64;
        let sel = Selection::rows_cols(rows, local..local + 1);
        debug_assert!(lookup.bucket_len(desc.field) > desc.local);

        let data = match desc.field {
            RatFieldType::Bool => ColumnData::Bool(ds.read::<i64>(&sel)?.into_iter().map(|v| v != 0).collect()),
            RatFieldType::Int => ColumnData::Int(ds.read::<i64>(&sel)?),
            RatFieldType::Float => ColumnData::Float(ds.read::<f64>(&sel)?),
            RatFieldType::String => ColumnData::String(ds.read_text(&sel)?),
        };
        Ok(Column { name: desc.name.clone(), usage: desc.usage.clone(), data })
    }
}
