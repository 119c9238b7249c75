use std::collections::HashMap;
use std::io::Cursor;

use bytes::Bytes;

use crate::{ItemSource, ItemStream, SourceError};

/// A source whose items are buffers held in memory.
///
/// Useful for tests, and for items that were fetched ahead of time.
#[derive(Debug, Clone, Default)]
pub struct InMemorySource {
    items: HashMap<String, Bytes>,
}

impl InMemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace the item at `path`.
    pub fn insert(&mut self, path: impl Into<String>, data: Bytes) -> Option<Bytes> {
        self.items.insert(path.into(), data)
    }

    pub fn get(&self, path: &str) -> Option<&Bytes> {
        self.items.get(path)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// The bytes of `path` in `[offset, offset + length)`, clamped to the item's end.
    pub(crate) fn range(&self, path: &str, offset: u64, length: u64) -> Result<Bytes, SourceError> {
        let data = self
            .items
            .get(path)
            .ok_or_else(|| SourceError::ItemNotFound {
                path: path.to_string(),
            })?;

        let size = data.len() as u64;
        if offset > size {
            return Err(SourceError::RangeOutOfBounds {
                path: path.to_string(),
                offset,
                size,
            });
        }

        let end = offset.saturating_add(length).min(size);
        Ok(data.slice(offset as usize..end as usize))
    }
}

impl ItemSource for InMemorySource {
    fn open_range(&self, path: &str, offset: u64, length: u64) -> Result<ItemStream, SourceError> {
        let range = self.range(path, offset, length)?;
        Ok(Box::new(Cursor::new(range)))
    }
}
