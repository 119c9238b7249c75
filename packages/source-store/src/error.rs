//! Error types for the source layer.
//!
//! Errors here describe failures to locate or open item bytes. They say nothing
//! about piece layout; plan and read errors live in the piece store.

use crate::SourceId;

/// Errors raised while resolving a source or opening an item range.
#[derive(thiserror::Error, Debug)]
pub enum SourceError {
    /// No source is registered under this id.
    #[error("no source registered for {source_id}")]
    UnknownSource { source_id: SourceId },

    /// The source has no item at this path.
    #[error("item not found: {path}")]
    ItemNotFound { path: String },

    /// The requested range starts past the end of the item.
    #[error("offset {offset} is out of bounds for item {path} ({size} bytes)")]
    RangeOutOfBounds { path: String, offset: u64, size: u64 },

    /// The item path cannot be mapped onto the source.
    #[error("invalid item path {path}: {message}")]
    InvalidPath { path: String, message: String },

    /// The root of a local source is missing or unusable.
    #[error("an error occurred trying to use the root path {path}: {error}")]
    RootPathInvalid {
        path: std::path::PathBuf,
        error: std::io::Error,
    },

    /// Generic I/O failure from the backing storage.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Failure reported by a transport (object storage, network, ...).
    #[error("transport error: {0}")]
    Transport(Box<dyn std::error::Error + Send + Sync>),
}

impl SourceError {
    /// Wrap an arbitrary backend error as a transport failure.
    pub fn transport<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        SourceError::Transport(error.into())
    }
}
