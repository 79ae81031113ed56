//! KEA multi-band raster containers.
//!
//! A container is one store file holding a header with the image geometry,
//! one group per band and an optional raster attribute table per band.
//!
//! ## Example
//!
//! ```ignore
//! use geoh5::kea::{Container, CreateOptions, OpenMode};
//! use geoh5::DataType;
//!
//! let opts = CreateOptions::new(100, 100, 2, DataType::UInt8).chunks(25, 25);
//! let c = Container::create("scene.kea", &opts)?;
//! c.write(&ndarray::Array2::<u8>::from_elem((100, 100), 7), 1usize, None)?;
//! c.close()?;
//!
//! let c = Container::open("scene.kea", OpenMode::Read)?;
//! let planes = c.read([2usize, 1], None)?;
//! ```
//!
//! ## Parallel mode
//!
//! Containers created with [`CreateOptions::parallel`] are opened through a
//! collective store handle: every structure is declared up front, text is
//! fixed-length and compression is off. Writers share the handle and write
//! disjoint windows (see [`tiling`]); afterwards [`rewrite_strings`] converts
//! the text fields back to variable-length storage.

mod band;
mod common;
mod container;
mod create;
mod crs;
mod image;
mod layout;
mod rat;
mod rewrite;
mod schema;
pub mod tiling;
mod transform;

pub use band::BandOptions;
pub use common::{BandColourInterp, LayerType, RatFieldType};
pub use container::{Container, OpenMode};
pub use create::{CreateOptions, DEFAULT_BLOCK_SIZE, DEFAULT_CHUNKS, DEFAULT_COMPRESSION};
pub use crs::{looks_like_wkt, CrsTranslator, WktPassthrough};
pub use image::{Bands, RasterArray, Window};
pub use layout::{BandInfo, ColumnDescriptor, Layout, RatLookup};
pub use rat::{Column, ColumnData, RatTable, DEFAULT_RAT_CHUNK};
pub use rewrite::rewrite_strings;
pub use schema::{EMPTY_PLACEHOLDER, FILETYPE, GENERATOR, IMAGE_VERSION, VERSION};
pub use transform::GeoTransform;
