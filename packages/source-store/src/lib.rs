//! PieceFS Source Store: byte ranges of external items
//!
//! This is the lowest layer of the PieceFS stack. A source knows how to open a
//! forward-only stream over a byte range of a named item - a file on disk, an
//! object in a bucket, a buffer in memory. Nothing at this level knows about
//! pieces, blocks or identifiers.
//!
//! Use this layer for:
//! - Plugging a new storage backend into the piece reader
//! - Looking up the source that holds a given item
//!
//! # Example
//!
//! ```rust
//! use std::io::Read;
//! use std::sync::Arc;
//!
//! use bytes::Bytes;
//! use piecefs_source_store::{InMemorySource, ItemSource, SourceId, SourceRegistry, SourceResolver};
//!
//! let mut source = InMemorySource::new();
//! source.insert("movies/a.bin", Bytes::from_static(b"hello world"));
//!
//! let mut registry: SourceRegistry = SourceRegistry::new();
//! registry.register(SourceId(1), Arc::new(source));
//!
//! let handle = registry.resolve(SourceId(1)).unwrap();
//! let mut stream = handle.open_range("movies/a.bin", 6, 5).unwrap();
//! let mut out = String::new();
//! stream.read_to_string(&mut out).unwrap();
//! assert_eq!(out, "world");
//! ```
//!
//! # Async Support
//!
//! Enable the `async` feature for async trait variants:
//!
//! ```toml
//! [dependencies]
//! piecefs-source-store = { version = "0.1", features = ["async"] }
//! ```
//!
//! Then use `AsyncItemSource` and `AsyncSourceResolver`.

pub use bytes::Bytes;

mod error;
mod in_memory;
mod item;
mod local_disk;
mod registry;
mod traits;

pub use error::SourceError;
pub use in_memory::InMemorySource;
pub use item::{Item, ItemId, SourceId};
pub use local_disk::LocalDiskSource;
pub use registry::SourceRegistry;
pub use traits::{ItemSource, ItemStream, SourceResolver};

#[cfg(feature = "async")]
mod async_traits;

#[cfg(feature = "async")]
pub use async_traits::{AsyncItemSource, AsyncItemStream, AsyncSourceResolver};
