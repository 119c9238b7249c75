use bytes::Bytes;

use crate::block::{InlineBlock, ItemBlockEntry, ItemRun, PieceBlock};
use crate::plan::{BlockData, CandidateBlock};
use crate::PlanError;

/// A validated, compacted piece layout: `header ++ block₁ ++ … ++ blockₙ`.
///
/// Immutable once built. Readers share it through an `Arc`, so any number of
/// them can stream the same piece concurrently without locking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Piece {
    header: Bytes,
    size: u64,
    blocks: Vec<PieceBlock>,
}

impl Piece {
    /// Validate `candidates` against `header` and `size`, then fold adjacent
    /// candidates of the same item into item runs.
    ///
    /// Building is pure: no source is resolved or opened here.
    ///
    /// # Errors
    ///
    /// - `PlanError::EmptyPlan` - No candidates.
    /// - `PlanError::HeaderMisalignment` - The first block does not start where
    ///   the header ends.
    /// - `PlanError::FooterMisalignment` - The last block does not end at `size`.
    /// - `PlanError::OffsetOverflow` - A candidate's end offset, the sum of its
    ///   parts, or its item range does not fit in a `u64`.
    /// - `PlanError::NonContiguous` - A gap or overlap between two candidates.
    /// - `PlanError::UnresolvableReference` - An item candidate is missing its
    ///   item or source.
    /// - `PlanError::BlockLengthMismatch` - A declared length disagrees with
    ///   the candidate's parts.
    ///
    /// Per candidate, contiguity is checked before the candidate's own data.
    pub fn build(
        header: Bytes,
        size: u64,
        candidates: Vec<CandidateBlock>,
    ) -> Result<Piece, PlanError> {
        let first = candidates.first().ok_or(PlanError::EmptyPlan)?;
        let header_len = header.len() as u64;
        if first.piece_offset != header_len {
            return Err(PlanError::HeaderMisalignment {
                expected: header_len,
                actual: first.piece_offset,
            });
        }

        let last = candidates.len() - 1;
        let end = candidates[last]
            .checked_end_offset()
            .ok_or(PlanError::OffsetOverflow { index: last })?;
        if end != size {
            return Err(PlanError::FooterMisalignment {
                expected: size,
                actual: end,
            });
        }

        for (index, candidate) in candidates.iter().enumerate() {
            let end_offset = candidate
                .checked_end_offset()
                .ok_or(PlanError::OffsetOverflow { index })?;
            if let Some(next) = candidates.get(index + 1) {
                if end_offset != next.piece_offset {
                    return Err(PlanError::NonContiguous {
                        index,
                        end_offset,
                        next_offset: next.piece_offset,
                    });
                }
            }
            candidate.validate(index)?;
        }

        let blocks = fold_item_runs(candidates)?;
        let piece = Piece {
            header,
            size,
            blocks,
        };
        tracing::debug!(
            size = piece.size,
            header = header_len,
            blocks = piece.blocks.len(),
            item_runs = piece.item_run_count(),
            "built piece layout"
        );
        Ok(piece)
    }

    /// Verbatim bytes preceding the first block.
    pub fn header(&self) -> &Bytes {
        &self.header
    }

    /// Declared total length of the piece stream.
    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn blocks(&self) -> &[PieceBlock] {
        &self.blocks
    }

    pub fn item_run_count(&self) -> usize {
        self.blocks.iter().filter(|b| b.is_item_run()).count()
    }

    /// Index of the top-level block containing `offset`.
    ///
    /// `offset` must lie in `[header.len(), size)`.
    pub(crate) fn block_index_at(&self, offset: u64) -> usize {
        self.blocks
            .partition_point(|block| block.piece_offset() <= offset)
            .saturating_sub(1)
    }
}

fn fold_item_runs(candidates: Vec<CandidateBlock>) -> Result<Vec<PieceBlock>, PlanError> {
    let mut blocks = Vec::new();
    let mut current: Option<ItemRun> = None;

    for (index, candidate) in candidates.into_iter().enumerate() {
        let CandidateBlock {
            piece_offset,
            prefix,
            identifier,
            data,
            ..
        } = candidate;

        match data {
            BlockData::Inline { payload } => {
                if let Some(run) = current.take() {
                    blocks.push(PieceBlock::ItemRun(run));
                }
                blocks.push(PieceBlock::Inline(InlineBlock::new(
                    piece_offset,
                    prefix,
                    identifier,
                    payload,
                )));
            }
            BlockData::Item {
                source: Some(source),
                item: Some(item),
                item_offset,
                item_length,
            } => {
                let entry =
                    ItemBlockEntry::new(piece_offset, prefix, identifier, item_offset, item_length);
                let same_item = current
                    .as_ref()
                    .is_some_and(|run| run.item().id == item.id);
                if same_item {
                    if let Some(run) = current.as_mut() {
                        run.push(entry);
                    }
                } else if let Some(run) = current.replace(ItemRun::new(source, item, entry)) {
                    blocks.push(PieceBlock::ItemRun(run));
                }
            }
            BlockData::Item { .. } => return Err(PlanError::UnresolvableReference { index }),
        }
    }

    if let Some(run) = current {
        blocks.push(PieceBlock::ItemRun(run));
    }
    Ok(blocks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use piecefs_source_store::{Item, ItemId, SourceId};

    const HEADER: &[u8] = &[0x0a, 0x0a, 0x0a, 0x0a];

    fn inline(offset: u64) -> CandidateBlock {
        CandidateBlock::inline(
            offset,
            Bytes::from_static(&[0x05]),
            Bytes::from_static(&[0xaa, 0xbb]),
            Bytes::from_static(&[0xcc, 0xdd]),
        )
    }

    fn item_block(offset: u64, item: u64, item_offset: u64) -> CandidateBlock {
        CandidateBlock::item(
            offset,
            Bytes::from_static(&[0x03]),
            Bytes::from_static(&[0x01]),
            SourceId(1),
            Item::new(ItemId(item), format!("item-{}", item), 100),
            item_offset,
            2,
        )
    }

    #[test]
    fn single_inline_block() {
        let piece = Piece::build(Bytes::from_static(HEADER), 9, vec![inline(4)]).unwrap();
        assert_eq!(piece.size(), 9);
        assert_eq!(piece.header().as_ref(), HEADER);
        assert_eq!(piece.blocks().len(), 1);
        assert_eq!(piece.item_run_count(), 0);
    }

    #[test]
    fn empty_plan_fails() {
        assert_eq!(
            Piece::build(Bytes::from_static(HEADER), 4, vec![]),
            Err(PlanError::EmptyPlan)
        );
    }

    #[test]
    fn header_misalignment_fails() {
        assert_eq!(
            Piece::build(Bytes::from_static(HEADER), 10, vec![inline(5)]),
            Err(PlanError::HeaderMisalignment {
                expected: 4,
                actual: 5
            })
        );
    }

    #[test]
    fn footer_misalignment_fails() {
        assert_eq!(
            Piece::build(Bytes::from_static(HEADER), 10, vec![inline(4)]),
            Err(PlanError::FooterMisalignment {
                expected: 10,
                actual: 9
            })
        );
    }

    #[test]
    fn gap_and_overlap_fail() {
        let gap = Piece::build(Bytes::from_static(HEADER), 15, vec![inline(4), inline(10)]);
        assert_eq!(
            gap,
            Err(PlanError::NonContiguous {
                index: 0,
                end_offset: 9,
                next_offset: 10
            })
        );

        let overlap = Piece::build(Bytes::from_static(HEADER), 13, vec![inline(4), inline(8)]);
        assert!(matches!(overlap, Err(PlanError::NonContiguous { .. })));
    }

    #[test]
    fn unresolvable_last_block_fails() {
        let mut last = item_block(9, 1, 0);
        if let BlockData::Item { item, .. } = &mut last.data {
            *item = None;
        }
        assert_eq!(
            Piece::build(Bytes::from_static(HEADER), 13, vec![inline(4), last]),
            Err(PlanError::UnresolvableReference { index: 1 })
        );
    }

    #[test]
    fn contiguity_is_checked_before_references() {
        let mut first = item_block(4, 1, 0);
        if let BlockData::Item { source, .. } = &mut first.data {
            *source = None;
        }
        assert_eq!(
            Piece::build(Bytes::from_static(HEADER), 14, vec![first, inline(9)]),
            Err(PlanError::NonContiguous {
                index: 0,
                end_offset: 8,
                next_offset: 9
            })
        );
    }

    fn huge_item() -> Item {
        Item::new(ItemId(1), "huge", u64::MAX)
    }

    #[test]
    fn block_past_u64_max_fails() {
        // The first block ends exactly at u64::MAX; the second cannot fit.
        let first = CandidateBlock::item(
            0,
            Bytes::from_static(&[0x01]),
            Bytes::from_static(&[0x02]),
            SourceId(1),
            huge_item(),
            0,
            u64::MAX - 2,
        );
        assert_eq!(first.end_offset(), u64::MAX);
        let second = CandidateBlock::inline(
            u64::MAX,
            Bytes::from_static(&[0x02]),
            Bytes::from_static(&[0xaa]),
            Bytes::from_static(&[0xbb]),
        );
        assert_eq!(
            Piece::build(Bytes::new(), u64::MAX, vec![first, second]),
            Err(PlanError::OffsetOverflow { index: 1 })
        );
    }

    #[test]
    fn block_ending_at_u64_max_builds() {
        let only = CandidateBlock::item(
            0,
            Bytes::from_static(&[0x01]),
            Bytes::from_static(&[0x02]),
            SourceId(1),
            huge_item(),
            0,
            u64::MAX - 2,
        );
        let piece = Piece::build(Bytes::new(), u64::MAX, vec![only]).unwrap();
        assert_eq!(piece.blocks()[0].end_offset(), u64::MAX);
    }

    #[test]
    fn item_range_past_u64_max_fails() {
        let block = CandidateBlock::item(
            4,
            Bytes::from_static(&[0x03]),
            Bytes::from_static(&[0x01]),
            SourceId(1),
            huge_item(),
            11,
            u64::MAX - 10,
        );
        let size = block.end_offset();
        assert_eq!(
            Piece::build(Bytes::from_static(HEADER), size, vec![block]),
            Err(PlanError::OffsetOverflow { index: 0 })
        );
    }

    #[test]
    fn block_parts_past_u64_max_fail() {
        // Prefix plus payload does not fit; the declared length saturates.
        let block = CandidateBlock::item(
            0,
            Bytes::from_static(&[0x01]),
            Bytes::new(),
            SourceId(1),
            huge_item(),
            0,
            u64::MAX,
        );
        assert_eq!(block.length, u64::MAX);
        assert_eq!(
            Piece::build(Bytes::new(), u64::MAX, vec![block]),
            Err(PlanError::OffsetOverflow { index: 0 })
        );
    }

    #[test]
    fn folds_adjacent_blocks_of_the_same_item() {
        // 5 blocks of item 1, one inline block, 2 blocks of item 2.
        let mut candidates = Vec::new();
        let mut offset = 4;
        for i in 0..5 {
            candidates.push(item_block(offset, 1, i * 2));
            offset += 4;
        }
        candidates.push(inline(offset));
        offset += 5;
        for i in 0..2 {
            candidates.push(item_block(offset, 2, i * 2));
            offset += 4;
        }

        let piece = Piece::build(Bytes::from_static(HEADER), offset, candidates).unwrap();
        let shape: Vec<Option<usize>> = piece
            .blocks()
            .iter()
            .map(|b| b.as_item_run().map(|run| run.entries().len()))
            .collect();
        assert_eq!(shape, vec![Some(5), None, Some(2)]);
        assert_eq!(piece.item_run_count(), 2);

        let second = piece.blocks()[2].as_item_run().unwrap();
        assert_eq!(second.item().id, ItemId(2));
        assert_eq!(second.piece_offset(), 4 + 5 * 4 + 5);
    }

    #[test]
    fn different_items_stay_separate() {
        let candidates = vec![item_block(4, 1, 0), item_block(8, 2, 0), item_block(12, 1, 2)];
        let piece = Piece::build(Bytes::from_static(HEADER), 16, candidates).unwrap();
        assert_eq!(piece.blocks().len(), 3);
        assert_eq!(piece.item_run_count(), 3);
    }

    #[test]
    fn block_index_lookup() {
        let candidates = vec![inline(4), item_block(9, 1, 0), item_block(13, 1, 2), inline(17)];
        let piece = Piece::build(Bytes::from_static(HEADER), 22, candidates).unwrap();
        assert_eq!(piece.blocks().len(), 3);
        assert_eq!(piece.block_index_at(4), 0);
        assert_eq!(piece.block_index_at(8), 0);
        assert_eq!(piece.block_index_at(9), 1);
        assert_eq!(piece.block_index_at(16), 1);
        assert_eq!(piece.block_index_at(21), 2);
    }
}
