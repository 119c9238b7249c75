//! Async traits for the source layer.
//!
//! These traits are async versions of `ItemSource` and `SourceResolver`, for use
//! with async runtimes like Tokio.
//!
//! Enable the `async` feature to use these traits:
//!
//! ```toml
//! [dependencies]
//! piecefs-source-store = { version = "0.1", features = ["async"] }
//! ```

use std::io::Cursor;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::AsyncRead;

use crate::{InMemorySource, SourceError, SourceId};

/// A forward-only async byte stream over a range of an item.
pub type AsyncItemStream = Box<dyn AsyncRead + Send + Unpin>;

/// Async version of `ItemSource`.
///
/// Opening an item range may suspend the calling task for the duration of the
/// backend's open latency (a network round trip, a disk seek).
///
/// # Object Safety
///
/// This trait is object-safe: you can use `Arc<dyn AsyncItemSource>`.
#[async_trait]
pub trait AsyncItemSource: Send + Sync {
    /// Open a stream over `path` starting at `offset` and yielding at most
    /// `length` bytes.
    async fn open_range_async(
        &self,
        path: &str,
        offset: u64,
        length: u64,
    ) -> Result<AsyncItemStream, SourceError>;
}

/// Async counterpart of `SourceResolver`.
///
/// Resolution stays synchronous: it is a lookup, only opening is async.
pub trait AsyncSourceResolver: Send + Sync {
    fn resolve_async_source(
        &self,
        source: SourceId,
    ) -> Result<Arc<dyn AsyncItemSource>, SourceError>;
}

// Blanket implementations for smart pointers

#[async_trait]
impl<T: AsyncItemSource + ?Sized> AsyncItemSource for Arc<T> {
    async fn open_range_async(
        &self,
        path: &str,
        offset: u64,
        length: u64,
    ) -> Result<AsyncItemStream, SourceError> {
        self.as_ref().open_range_async(path, offset, length).await
    }
}

#[async_trait]
impl<T: AsyncItemSource + ?Sized> AsyncItemSource for Box<T> {
    async fn open_range_async(
        &self,
        path: &str,
        offset: u64,
        length: u64,
    ) -> Result<AsyncItemStream, SourceError> {
        self.as_ref().open_range_async(path, offset, length).await
    }
}

impl<T: AsyncSourceResolver + ?Sized> AsyncSourceResolver for Arc<T> {
    fn resolve_async_source(
        &self,
        source: SourceId,
    ) -> Result<Arc<dyn AsyncItemSource>, SourceError> {
        self.as_ref().resolve_async_source(source)
    }
}

impl<T: AsyncSourceResolver + ?Sized> AsyncSourceResolver for Box<T> {
    fn resolve_async_source(
        &self,
        source: SourceId,
    ) -> Result<Arc<dyn AsyncItemSource>, SourceError> {
        self.as_ref().resolve_async_source(source)
    }
}

#[async_trait]
impl AsyncItemSource for InMemorySource {
    async fn open_range_async(
        &self,
        path: &str,
        offset: u64,
        length: u64,
    ) -> Result<AsyncItemStream, SourceError> {
        let range = self.range(path, offset, length)?;
        Ok(Box::new(Cursor::new(range)))
    }
}
