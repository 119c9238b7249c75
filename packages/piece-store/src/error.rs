//! Error types for the piece layer.
//!
//! Plan errors are raised while building a piece and are all fatal to that
//! build. Read errors come from the backing sources while streaming; once one
//! is returned the reader is poisoned.

use piecefs_source_store::{SourceError, SourceId};

/// A candidate plan was rejected.
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum PlanError {
    #[error("no blocks provided")]
    EmptyPlan,

    #[error("first block must start at the end of the header (offset {expected}), found {actual}")]
    HeaderMisalignment { expected: u64, actual: u64 },

    #[error("last block must end at the piece size ({expected}), found {actual}")]
    FooterMisalignment { expected: u64, actual: u64 },

    #[error("blocks must be contiguous: block {index} ends at {end_offset} but the next starts at {next_offset}")]
    NonContiguous {
        index: usize,
        end_offset: u64,
        next_offset: u64,
    },

    #[error("block {index} must be either inline or reference an item, and the item and source need to be preloaded")]
    UnresolvableReference { index: usize },

    #[error("block {index} extends past the largest representable offset")]
    OffsetOverflow { index: usize },

    #[error("block {index} declares {declared} bytes but its prefix, identifier and payload add up to {actual}")]
    BlockLengthMismatch {
        index: usize,
        declared: u64,
        actual: u64,
    },
}

/// Streaming a piece failed.
#[derive(thiserror::Error, Debug)]
pub enum ReadError {
    /// The resolver has no usable source for an item run.
    #[error("failed to get handler for {source_id}")]
    SourceUnavailable {
        source_id: SourceId,
        #[source]
        source: SourceError,
    },

    /// Opening or reading an item failed.
    #[error("failed to read item {path}")]
    SourceReadFailure {
        path: String,
        #[source]
        source: SourceError,
    },

    /// The item stream ended before a block payload was complete.
    #[error("item {path} ended at offset {item_offset} before the block payload was complete")]
    UnexpectedEnd { path: String, item_offset: u64 },

    #[error("offset {offset} is past the end of the piece ({size} bytes)")]
    SeekOutOfRange { offset: u64, size: u64 },

    /// A previous read failed; the reader must be closed and rebuilt.
    #[error("reader is unusable after an earlier failure")]
    Poisoned,
}

impl ReadError {
    pub(crate) fn read_failure(path: &str, error: impl Into<SourceError>) -> Self {
        ReadError::SourceReadFailure {
            path: path.to_string(),
            source: error.into(),
        }
    }
}

impl From<ReadError> for std::io::Error {
    fn from(error: ReadError) -> Self {
        let kind = match &error {
            ReadError::UnexpectedEnd { .. } => std::io::ErrorKind::UnexpectedEof,
            ReadError::SeekOutOfRange { .. } => std::io::ErrorKind::InvalidInput,
            _ => std::io::ErrorKind::Other,
        };
        std::io::Error::new(kind, error)
    }
}
