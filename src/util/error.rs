//! Error types for the geoh5 library.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for container and store operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Missing or invalid parameters, shape mismatches, unsupported parallel operations
    #[error("Validation error: {0}")]
    Validation(String),

    /// Unknown band index, RAT column, dtype code or name
    #[error("Lookup error: {0}")]
    Lookup(String),

    /// Explicitly unfinished feature
    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    /// Handle was closed
    #[error("I/O operation on closed file")]
    Closed,

    /// Container or store is not writable (opened read-only)
    #[error("File is opened read-only")]
    ReadOnly,

    /// File does not exist or cannot be accessed
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    /// Invalid magic bytes at start of file
    #[error("Invalid store file: expected GEOH5 magic bytes")]
    InvalidMagic,

    /// Unsupported file format version
    #[error("Unsupported store version: {0}")]
    UnsupportedVersion(u16),

    /// File is truncated or corrupted
    #[error("Unexpected end of file at position {0}")]
    UnexpectedEof(u64),

    /// Invalid data structure in file
    #[error("Invalid file structure: {0}")]
    InvalidStructure(String),

    /// Group or dataset not found by path
    #[error("Object not found: {0}")]
    NotFound(String),

    /// Group or dataset already exists at path
    #[error("Object already exists: {0}")]
    AlreadyExists(String),

    /// Type mismatch when reading or writing data
    #[error("Type mismatch: expected {expected}, got {actual}")]
    TypeMismatch { expected: String, actual: String },

    /// Hyperslab does not fit the dataset extent
    #[error("Invalid selection: {0}")]
    InvalidSelection(String),

    /// Buffer length does not match the selection
    #[error("Shape mismatch: expected {expected} elements, got {actual}")]
    ShapeMismatch { expected: usize, actual: usize },

    /// Operation refused under collective access
    #[error("Not supported under collective I/O: {0}")]
    Collective(String),

    /// Another handle committed a new tree since this one was opened
    #[error("{0} was changed by another handle; structural changes were not written")]
    Conflict(PathBuf),

    /// Memory mapping failed
    #[error("Memory mapping failed: {0}")]
    MmapFailed(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// UTF-8 conversion error
    #[error("Invalid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

impl Error {
    /// Create a validation error.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a lookup error.
    pub fn lookup(msg: impl Into<String>) -> Self {
        Self::Lookup(msg.into())
    }

    /// Create an invalid structure error.
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidStructure(msg.into())
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    pub fn is_lookup(&self) -> bool {
        matches!(self, Self::Lookup(_))
    }
}

/// Result type alias for geoh5 operations.
pub type Result<T> = std::result::Result<T, Error>;
