//! Core traits for the source layer.

use std::io::Read;
use std::sync::Arc;

use crate::{SourceError, SourceId};

/// A forward-only byte stream over a range of an item.
///
/// Dropping the stream releases whatever the source holds for it (file
/// handle, connection, ...).
pub type ItemStream = Box<dyn Read + Send>;

/// Open byte ranges of items held by one storage backend.
///
/// # Object Safety
///
/// This trait is object-safe: you can use `Arc<dyn ItemSource>`.
pub trait ItemSource: Send + Sync {
    /// Open a stream over `path` starting at `offset`.
    ///
    /// # Arguments
    ///
    /// * `path` - The item's path within this source.
    /// * `offset` - First byte of the item to return.
    /// * `length` - Upper bound on the number of bytes the stream yields. The
    ///   stream ends early if the item ends first.
    ///
    /// # Returns
    ///
    /// * `Ok(stream)` - Yields the item's bytes in order, starting at `offset`.
    /// * `Err(SourceError)` - The item could not be located or opened.
    ///
    /// # Example
    ///
    /// ```rust
    /// use std::io::Read;
    /// use piecefs_source_store::{ItemSource, SourceError};
    ///
    /// fn first_bytes(source: &dyn ItemSource, path: &str) -> Result<Vec<u8>, SourceError> {
    ///     let mut buf = Vec::new();
    ///     source.open_range(path, 0, 16)?.read_to_end(&mut buf)?;
    ///     Ok(buf)
    /// }
    /// ```
    fn open_range(&self, path: &str, offset: u64, length: u64) -> Result<ItemStream, SourceError>;
}

/// Map a source identity to the source that serves it.
///
/// Resolution is a lookup. It must not open anything; opening happens on the
/// returned [`ItemSource`].
pub trait SourceResolver: Send + Sync {
    fn resolve(&self, source: SourceId) -> Result<Arc<dyn ItemSource>, SourceError>;
}

// Blanket implementations for references and smart pointers

impl<T: ItemSource + ?Sized> ItemSource for &T {
    fn open_range(&self, path: &str, offset: u64, length: u64) -> Result<ItemStream, SourceError> {
        (**self).open_range(path, offset, length)
    }
}

impl<T: ItemSource + ?Sized> ItemSource for Box<T> {
    fn open_range(&self, path: &str, offset: u64, length: u64) -> Result<ItemStream, SourceError> {
        self.as_ref().open_range(path, offset, length)
    }
}

impl<T: ItemSource + ?Sized> ItemSource for Arc<T> {
    fn open_range(&self, path: &str, offset: u64, length: u64) -> Result<ItemStream, SourceError> {
        self.as_ref().open_range(path, offset, length)
    }
}

impl<T: SourceResolver + ?Sized> SourceResolver for &T {
    fn resolve(&self, source: SourceId) -> Result<Arc<dyn ItemSource>, SourceError> {
        (**self).resolve(source)
    }
}

impl<T: SourceResolver + ?Sized> SourceResolver for Box<T> {
    fn resolve(&self, source: SourceId) -> Result<Arc<dyn ItemSource>, SourceError> {
        self.as_ref().resolve(source)
    }
}

impl<T: SourceResolver + ?Sized> SourceResolver for Arc<T> {
    fn resolve(&self, source: SourceId) -> Result<Arc<dyn ItemSource>, SourceError> {
        self.as_ref().resolve(source)
    }
}
