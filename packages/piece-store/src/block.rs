//! Block descriptors: where each block's bytes sit in piece-offset space.
//!
//! A block is three consecutive ranges - length prefix, identifier, payload -
//! starting at a known piece offset. Sub-range offsets are always derived from
//! the piece offset and the field lengths, never stored.

use bytes::Bytes;
use piecefs_source_store::{Item, SourceId};

/// Layout accessors shared by every block kind.
pub trait BlockLayout {
    /// Absolute piece offset of the first prefix byte.
    fn piece_offset(&self) -> u64;

    /// The encoded length prefix.
    fn prefix(&self) -> &[u8];

    /// The binary content identifier.
    fn identifier(&self) -> &[u8];

    fn payload_len(&self) -> u64;

    fn identifier_offset(&self) -> u64 {
        self.piece_offset() + self.prefix().len() as u64
    }

    fn payload_offset(&self) -> u64 {
        self.identifier_offset() + self.identifier().len() as u64
    }

    fn end_offset(&self) -> u64 {
        self.payload_offset() + self.payload_len()
    }

    /// Total encoded size: prefix, identifier and payload.
    fn len(&self) -> u64 {
        self.end_offset() - self.piece_offset()
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The in-memory framing bytes (prefix or identifier) from `pos` to the
    /// end of the field that contains it.
    ///
    /// Returns `None` when `pos` is outside `[piece_offset, payload_offset)`.
    fn framing_at(&self, pos: u64) -> Option<&[u8]> {
        if pos < self.piece_offset() || pos >= self.payload_offset() {
            return None;
        }
        let identifier_offset = self.identifier_offset();
        if pos < identifier_offset {
            Some(&self.prefix()[(pos - self.piece_offset()) as usize..])
        } else {
            Some(&self.identifier()[(pos - identifier_offset) as usize..])
        }
    }
}

/// A block whose prefix, identifier and payload are all held in memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineBlock {
    piece_offset: u64,
    prefix: Bytes,
    identifier: Bytes,
    payload: Bytes,
}

impl InlineBlock {
    pub fn new(piece_offset: u64, prefix: Bytes, identifier: Bytes, payload: Bytes) -> Self {
        Self {
            piece_offset,
            prefix,
            identifier,
            payload,
        }
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Bytes of any field from `pos` to the end of that field.
    pub(crate) fn bytes_at(&self, pos: u64) -> Option<&[u8]> {
        if let Some(framing) = self.framing_at(pos) {
            return Some(framing);
        }
        let payload_offset = self.payload_offset();
        if pos >= payload_offset && pos < self.end_offset() {
            Some(&self.payload[(pos - payload_offset) as usize..])
        } else {
            None
        }
    }
}

impl BlockLayout for InlineBlock {
    fn piece_offset(&self) -> u64 {
        self.piece_offset
    }

    fn prefix(&self) -> &[u8] {
        &self.prefix
    }

    fn identifier(&self) -> &[u8] {
        &self.identifier
    }

    fn payload_len(&self) -> u64 {
        self.payload.len() as u64
    }
}

/// One block of an item run: framing in memory, payload still in the item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemBlockEntry {
    piece_offset: u64,
    prefix: Bytes,
    identifier: Bytes,
    item_offset: u64,
    item_length: u64,
}

impl ItemBlockEntry {
    pub fn new(
        piece_offset: u64,
        prefix: Bytes,
        identifier: Bytes,
        item_offset: u64,
        item_length: u64,
    ) -> Self {
        Self {
            piece_offset,
            prefix,
            identifier,
            item_offset,
            item_length,
        }
    }

    /// Offset of the payload's first byte within the item.
    pub fn item_offset(&self) -> u64 {
        self.item_offset
    }

    pub fn item_length(&self) -> u64 {
        self.item_length
    }

    /// Item offset one past the payload's last byte.
    pub fn item_end(&self) -> u64 {
        self.item_offset + self.item_length
    }
}

impl BlockLayout for ItemBlockEntry {
    fn piece_offset(&self) -> u64 {
        self.piece_offset
    }

    fn prefix(&self) -> &[u8] {
        &self.prefix
    }

    fn identifier(&self) -> &[u8] {
        &self.identifier
    }

    fn payload_len(&self) -> u64 {
        self.item_length
    }
}

/// Consecutive blocks whose payloads all come from the same item.
///
/// The run holds no payload bytes. Entries are ordered by piece offset and
/// mutually contiguous; they are read through a single forward-only stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemRun {
    source: SourceId,
    item: Item,
    entries: Vec<ItemBlockEntry>,
}

impl ItemRun {
    pub(crate) fn new(source: SourceId, item: Item, first: ItemBlockEntry) -> Self {
        Self {
            source,
            item,
            entries: vec![first],
        }
    }

    pub(crate) fn push(&mut self, entry: ItemBlockEntry) {
        self.entries.push(entry);
    }

    pub fn source(&self) -> SourceId {
        self.source
    }

    pub fn item(&self) -> &Item {
        &self.item
    }

    pub fn entries(&self) -> &[ItemBlockEntry] {
        &self.entries
    }

    pub fn piece_offset(&self) -> u64 {
        self.entries[0].piece_offset()
    }

    pub fn end_offset(&self) -> u64 {
        self.entries[self.entries.len() - 1].end_offset()
    }

    /// Index of the entry whose range contains `offset`.
    ///
    /// `offset` must lie within the run.
    pub(crate) fn entry_index_at(&self, offset: u64) -> usize {
        self.entries
            .partition_point(|entry| entry.piece_offset() <= offset)
            .saturating_sub(1)
    }

    /// Highest item offset any entry from `from` onward still needs.
    pub(crate) fn item_end_from(&self, from: usize) -> u64 {
        self.entries[from..]
            .iter()
            .map(ItemBlockEntry::item_end)
            .max()
            .unwrap_or(0)
    }
}

/// A top-level block of a piece.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PieceBlock {
    Inline(InlineBlock),
    ItemRun(ItemRun),
}

impl PieceBlock {
    pub fn piece_offset(&self) -> u64 {
        match self {
            PieceBlock::Inline(block) => block.piece_offset(),
            PieceBlock::ItemRun(run) => run.piece_offset(),
        }
    }

    pub fn end_offset(&self) -> u64 {
        match self {
            PieceBlock::Inline(block) => block.end_offset(),
            PieceBlock::ItemRun(run) => run.end_offset(),
        }
    }

    pub fn as_item_run(&self) -> Option<&ItemRun> {
        match self {
            PieceBlock::ItemRun(run) => Some(run),
            PieceBlock::Inline(_) => None,
        }
    }

    pub fn is_item_run(&self) -> bool {
        matches!(self, PieceBlock::ItemRun(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use piecefs_source_store::ItemId;

    fn inline() -> InlineBlock {
        InlineBlock::new(
            4,
            Bytes::from_static(&[0x05]),
            Bytes::from_static(&[0xaa, 0xbb]),
            Bytes::from_static(&[0xcc, 0xdd]),
        )
    }

    fn entry(piece_offset: u64, item_offset: u64, item_length: u64) -> ItemBlockEntry {
        ItemBlockEntry::new(
            piece_offset,
            Bytes::from_static(&[0x03]),
            Bytes::from_static(&[0x01, 0x02]),
            item_offset,
            item_length,
        )
    }

    #[test]
    fn derived_offsets() {
        let block = inline();
        assert_eq!(block.piece_offset(), 4);
        assert_eq!(block.identifier_offset(), 5);
        assert_eq!(block.payload_offset(), 7);
        assert_eq!(block.end_offset(), 9);
        assert_eq!(block.len(), 5);
    }

    #[test]
    fn inline_bytes_at_each_field() {
        let block = inline();
        assert_eq!(block.bytes_at(3), None);
        assert_eq!(block.bytes_at(4), Some(&[0x05][..]));
        assert_eq!(block.bytes_at(6), Some(&[0xbb][..]));
        assert_eq!(block.bytes_at(7), Some(&[0xcc, 0xdd][..]));
        assert_eq!(block.bytes_at(9), None);
    }

    #[test]
    fn entry_framing_stops_at_payload() {
        let entry = entry(10, 100, 4);
        assert_eq!(entry.framing_at(10), Some(&[0x03][..]));
        assert_eq!(entry.framing_at(11), Some(&[0x01, 0x02][..]));
        assert_eq!(entry.framing_at(13), None);
        assert_eq!(entry.end_offset(), 17);
        assert_eq!(entry.item_end(), 104);
    }

    #[test]
    fn run_locates_entries() {
        let mut run = ItemRun::new(
            SourceId(1),
            Item::new(ItemId(1), "x", 1000),
            entry(10, 0, 4),
        );
        run.push(entry(17, 4, 4));
        run.push(entry(24, 8, 2));

        assert_eq!(run.piece_offset(), 10);
        assert_eq!(run.end_offset(), 29);
        assert_eq!(run.entry_index_at(10), 0);
        assert_eq!(run.entry_index_at(16), 0);
        assert_eq!(run.entry_index_at(17), 1);
        assert_eq!(run.entry_index_at(28), 2);
        assert_eq!(run.item_end_from(1), 10);

        let block = PieceBlock::ItemRun(run);
        assert!(block.is_item_run());
        assert_eq!(block.piece_offset(), 10);
        assert_eq!(block.end_offset(), 29);
    }
}
