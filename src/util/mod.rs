//! Utility types shared by the store and the container layers.
//!
//! - [`DataType`] / [`Element`] / [`Scalar`] - Numeric types and the KEA code registry
//! - [`Dimensions`] - Dataset and chunk extents
//! - [`Error`] / [`Result`] - Error handling

mod dimensions;
pub(crate) mod dtype;
mod error;

pub use dimensions::*;
pub use dtype::{cast_bytes, cast_from_slice, cast_to_vec, code_of, name_of, DataType, Element, Scalar};
pub use error::*;
