//! # geoh5
//!
//! Rust implementation of the KEA multi-band raster container.
//!
//! KEA lays out image bands, geodetic header fields and per-band raster
//! attribute tables inside a hierarchical array store. This crate ships its
//! own single-file store and the container layer on top of it.
//!
//! ## Modules
//!
//! - [`util`] - Numeric types, the KEA type-code registry, errors
//! - [`store`] - Hierarchical store: groups, chunked datasets, attributes
//! - [`kea`] - Containers, bands, windowed pixel I/O, attribute tables
//!
//! ## Example
//!
//! ```ignore
//! use geoh5::kea::{Container, OpenMode};
//!
//! let c = Container::open("scene.kea", OpenMode::Read)?;
//! println!("{} x {} with {} bands", c.width()?, c.height()?, c.count()?);
//! ```

pub mod util;
pub mod store;
pub mod kea;

// Re-export commonly used types
pub use util::{DataType, Element, Error, Result, Scalar};
pub use kea::{Container, CreateOptions, OpenMode};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::util::{DataType, Element, Error, Result, Scalar};
    pub use crate::kea::{
        BandColourInterp, BandOptions, Bands, Column, ColumnData, Container, CreateOptions, GeoTransform,
        LayerType, OpenMode, RasterArray, RatTable, Window,
    };
}
