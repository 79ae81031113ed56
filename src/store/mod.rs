//! Hierarchical array store.
//!
//! A store file holds a tree of groups and n-dimensional datasets, each
//! carrying named attributes. Datasets may be chunked and zlib compressed;
//! unwritten chunks read back as the dataset's fill value.
//!
//! Opening a file loads the group tree and the dataset declarations; chunks
//! are read on demand. [`File::flush`] appends the blocks that changed and
//! then commits the new root in the header, so an interrupted flush leaves
//! the previous tree readable.
//!
//! # Example
//!
//! ```ignore
//! use geoh5::store::{Access, DatasetBuilder, File, Selection};
//!
//! let file = File::create("data.h5", Access::Serial)?;
//! let ds = file.create_dataset("grid", DatasetBuilder::numeric::<f32>((64, 64)).chunks((16, 16)))?;
//! ds.write(&Selection::rows_cols(0..1, 0..2), &[1.0f32, 2.0])?;
//! file.close()?;
//! ```

mod codec;
mod compression;
mod file;
pub mod format;
mod node;
mod reader;
mod selection;
mod stream;
mod types;

pub use compression::{decode_chunk, encode_chunk, is_compressed, MAX_LEVEL};
pub use file::{Access, Dataset, DatasetBuilder, File, Mode};
pub use reader::IStreams;
pub use selection::Selection;
pub use stream::OStream;
pub use types::{AttrValue, ElementType, StringKind};
