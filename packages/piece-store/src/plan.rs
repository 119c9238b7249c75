//! Candidate block plans: the unvalidated input of [`Piece::build`].
//!
//! A plan is what an upstream scheduler hands over: the piece header, the
//! declared piece size, and one candidate per block in piece order. Plans are
//! serde types so they can be stored and loaded as JSON; byte fields travel as
//! base64 strings.
//!
//! [`Piece::build`]: crate::Piece::build

use bytes::Bytes;
use piecefs_source_store::{Item, SourceId};
use serde::{Deserialize, Serialize};

use crate::{varint, Piece, PlanError};

/// Where a candidate block's payload comes from.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BlockData {
    /// The payload bytes are already known.
    Inline {
        #[serde(with = "base64_bytes")]
        payload: Bytes,
    },
    /// The payload is `item_length` bytes of `item` starting at `item_offset`,
    /// served by `source`. Both `source` and `item` must be present for the
    /// candidate to be buildable.
    Item {
        #[serde(default)]
        source: Option<SourceId>,
        #[serde(default)]
        item: Option<Item>,
        item_offset: u64,
        item_length: u64,
    },
}

impl BlockData {
    pub fn payload_len(&self) -> u64 {
        match self {
            BlockData::Inline { payload } => payload.len() as u64,
            BlockData::Item { item_length, .. } => *item_length,
        }
    }
}

/// One block of a plan, positioned in piece-offset space.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct CandidateBlock {
    pub piece_offset: u64,
    /// Declared total length: prefix, identifier and payload.
    pub length: u64,
    #[serde(with = "base64_bytes")]
    pub prefix: Bytes,
    #[serde(with = "base64_bytes")]
    pub identifier: Bytes,
    pub data: BlockData,
}

impl CandidateBlock {
    pub fn inline(piece_offset: u64, prefix: Bytes, identifier: Bytes, payload: Bytes) -> Self {
        let data = BlockData::Inline { payload };
        Self::with_data(piece_offset, prefix, identifier, data)
    }

    /// An inline candidate whose prefix is the varint of the identifier and
    /// payload length.
    pub fn inline_with_varint(piece_offset: u64, identifier: Bytes, payload: Bytes) -> Self {
        let prefix = varint::encode(identifier.len() as u64 + payload.len() as u64);
        Self::inline(piece_offset, prefix, identifier, payload)
    }

    pub fn item(
        piece_offset: u64,
        prefix: Bytes,
        identifier: Bytes,
        source: SourceId,
        item: Item,
        item_offset: u64,
        item_length: u64,
    ) -> Self {
        let data = BlockData::Item {
            source: Some(source),
            item: Some(item),
            item_offset,
            item_length,
        };
        Self::with_data(piece_offset, prefix, identifier, data)
    }

    /// An item candidate whose prefix is the varint of the identifier and
    /// payload length.
    pub fn item_with_varint(
        piece_offset: u64,
        identifier: Bytes,
        source: SourceId,
        item: Item,
        item_offset: u64,
        item_length: u64,
    ) -> Self {
        let prefix = varint::encode((identifier.len() as u64).saturating_add(item_length));
        Self::item(
            piece_offset,
            prefix,
            identifier,
            source,
            item,
            item_offset,
            item_length,
        )
    }

    /// A candidate whose declared length is computed from its parts.
    ///
    /// The length saturates; a sum that does not fit is rejected when the
    /// plan is built.
    pub fn with_data(piece_offset: u64, prefix: Bytes, identifier: Bytes, data: BlockData) -> Self {
        let framing = prefix.len() as u64 + identifier.len() as u64;
        let length = framing.saturating_add(data.payload_len());
        Self {
            piece_offset,
            length,
            prefix,
            identifier,
            data,
        }
    }

    /// Piece offset one past the last byte, saturating at `u64::MAX`.
    pub fn end_offset(&self) -> u64 {
        self.piece_offset.saturating_add(self.length)
    }

    pub(crate) fn checked_end_offset(&self) -> Option<u64> {
        self.piece_offset.checked_add(self.length)
    }

    pub fn is_inline(&self) -> bool {
        matches!(self.data, BlockData::Inline { .. })
    }

    /// Checks that only need this candidate: its data source is usable, its
    /// declared length matches its parts, and its item range fits in a `u64`.
    pub(crate) fn validate(&self, index: usize) -> Result<(), PlanError> {
        if let BlockData::Item {
            source,
            item,
            item_offset,
            item_length,
        } = &self.data
        {
            if source.is_none() || item.is_none() {
                return Err(PlanError::UnresolvableReference { index });
            }
            if item_offset.checked_add(*item_length).is_none() {
                return Err(PlanError::OffsetOverflow { index });
            }
        }

        let actual = (self.prefix.len() as u64)
            .checked_add(self.identifier.len() as u64)
            .and_then(|len| len.checked_add(self.data.payload_len()))
            .ok_or(PlanError::OffsetOverflow { index })?;
        if actual != self.length {
            return Err(PlanError::BlockLengthMismatch {
                index,
                declared: self.length,
                actual,
            });
        }
        Ok(())
    }
}

/// A complete, not yet validated description of a piece.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PiecePlan {
    #[serde(with = "base64_bytes")]
    pub header: Bytes,
    pub piece_size: u64,
    pub blocks: Vec<CandidateBlock>,
}

impl PiecePlan {
    pub fn new(header: Bytes, piece_size: u64, blocks: Vec<CandidateBlock>) -> Self {
        Self {
            header,
            piece_size,
            blocks,
        }
    }

    /// Validate the plan and compact it into a [`Piece`].
    pub fn build(self) -> Result<Piece, PlanError> {
        Piece::build(self.header, self.piece_size, self.blocks)
    }
}

mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    use bytes::Bytes;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &Bytes, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Bytes, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded)
            .map(Bytes::from)
            .map_err(serde::de::Error::custom)
    }
}
