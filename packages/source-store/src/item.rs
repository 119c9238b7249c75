//! Identities of sources and the items they hold.

use serde::{Deserialize, Serialize};

/// Identity of a configured source (one storage backend instance).
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct SourceId(pub u64);

impl std::fmt::Display for SourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "source#{}", self.0)
    }
}

/// Identity of an ingested item.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct ItemId(pub u64);

impl std::fmt::Display for ItemId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "item#{}", self.0)
    }
}

/// Preloaded metadata of an item: where it lives within its source and how
/// large it is.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Item {
    pub id: ItemId,
    pub path: String,
    pub size: u64,
}

impl Item {
    pub fn new(id: ItemId, path: impl Into<String>, size: u64) -> Self {
        Self {
            id,
            path: path.into(),
            size,
        }
    }
}
