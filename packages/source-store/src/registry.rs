use std::collections::HashMap;
use std::sync::Arc;

use crate::{ItemSource, SourceError, SourceId, SourceResolver};

/// A fixed table of sources keyed by [`SourceId`].
///
/// `SourceRegistry<dyn ItemSource>` (the default) is a [`SourceResolver`]. With
/// the `async` feature, `SourceRegistry<dyn AsyncItemSource>` is an
/// `AsyncSourceResolver`.
pub struct SourceRegistry<H: ?Sized = dyn ItemSource> {
    sources: HashMap<SourceId, Arc<H>>,
}

impl<H: ?Sized> SourceRegistry<H> {
    pub fn new() -> Self {
        Self {
            sources: HashMap::new(),
        }
    }

    /// Register `source` under `id`, returning the source it replaces.
    pub fn register(&mut self, id: SourceId, source: Arc<H>) -> Option<Arc<H>> {
        self.sources.insert(id, source)
    }

    pub fn contains(&self, id: SourceId) -> bool {
        self.sources.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    pub(crate) fn lookup(&self, id: SourceId) -> Result<Arc<H>, SourceError> {
        self.sources
            .get(&id)
            .cloned()
            .ok_or(SourceError::UnknownSource { source_id: id })
    }
}

impl<H: ?Sized> Default for SourceRegistry<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl SourceResolver for SourceRegistry<dyn ItemSource> {
    fn resolve(&self, source: SourceId) -> Result<Arc<dyn ItemSource>, SourceError> {
        self.lookup(source)
    }
}

#[cfg(feature = "async")]
impl crate::AsyncSourceResolver for SourceRegistry<dyn crate::AsyncItemSource> {
    fn resolve_async_source(
        &self,
        source: SourceId,
    ) -> Result<Arc<dyn crate::AsyncItemSource>, SourceError> {
        self.lookup(source)
    }
}
