//! Reader configuration.

use serde::{Deserialize, Serialize};

use crate::block::ItemRun;

/// How many bytes to ask a source for when an item stream is opened.
///
/// A stream is opened once per item run and then serves every following entry
/// of that run, so the request always covers more than the current block.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ReadAhead {
    /// Up to the last payload byte the rest of the run needs.
    #[default]
    RunEnd,
    /// Everything from the open offset to the end of the item.
    ItemEnd,
}

impl ReadAhead {
    /// Length to request when opening `run` at `item_offset` for entry `entry`.
    pub(crate) fn request_len(self, run: &ItemRun, entry: usize, item_offset: u64) -> u64 {
        let run_end = run.item_end_from(entry);
        let end = match self {
            ReadAhead::RunEnd => run_end,
            ReadAhead::ItemEnd => run.item().size.max(run_end),
        };
        end.saturating_sub(item_offset)
    }
}

/// Options shared by the sync and async piece readers.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(default)]
pub struct ReaderOptions {
    pub read_ahead: ReadAhead,
}

impl ReaderOptions {
    pub fn with_read_ahead(mut self, read_ahead: ReadAhead) -> Self {
        self.read_ahead = read_ahead;
        self
    }
}
