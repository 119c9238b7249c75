//! Cursor bookkeeping shared by the sync and async readers.
//!
//! A cursor is an absolute piece offset plus the block and run-entry indices
//! that contain it. After every move it is settled: the indices always point
//! at the unit containing `pos`, or one past the last block at end of stream.

use std::sync::{Arc, Mutex, PoisonError};

use crate::block::{BlockLayout, ItemRun, PieceBlock};
use crate::Piece;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Cursor {
    pos: u64,
    block: usize,
    entry: usize,
}

/// What the bytes at the cursor are made of.
pub(crate) enum Segment<'a> {
    /// In-memory bytes from the cursor to the end of the current field.
    Bytes(&'a [u8]),
    /// Payload bytes that have to come from an item stream.
    Payload(PayloadSpan<'a>),
    End,
}

pub(crate) struct PayloadSpan<'a> {
    pub(crate) block: usize,
    pub(crate) run: &'a ItemRun,
    pub(crate) entry: usize,
    /// Item offset of the byte at the cursor.
    pub(crate) item_offset: u64,
    /// Payload bytes left in this entry.
    pub(crate) remaining: u64,
}

impl PayloadSpan<'_> {
    pub(crate) fn path(&self) -> &str {
        &self.run.item().path
    }

    /// Clamp a buffer length to the payload left in this entry.
    pub(crate) fn clamp(&self, len: usize) -> usize {
        usize::try_from(self.remaining).map_or(len, |remaining| remaining.min(len))
    }
}

impl Cursor {
    pub(crate) fn start(piece: &Piece) -> Self {
        Self::at(piece, 0)
    }

    /// A settled cursor at `offset`, found by binary search over the blocks
    /// and then over the entries of the containing run.
    ///
    /// Offsets at or past the piece size yield an end-of-stream cursor.
    pub(crate) fn at(piece: &Piece, offset: u64) -> Self {
        let header_len = piece.header().len() as u64;
        if offset < header_len {
            return Cursor {
                pos: offset,
                block: 0,
                entry: 0,
            };
        }
        if offset >= piece.size() {
            return Cursor {
                pos: piece.size(),
                block: piece.blocks().len(),
                entry: 0,
            };
        }

        let block = piece.block_index_at(offset);
        let entry = match piece.blocks().get(block) {
            Some(PieceBlock::ItemRun(run)) => run.entry_index_at(offset),
            _ => 0,
        };
        debug_assert!(piece
            .blocks()
            .get(block)
            .is_some_and(|b| b.piece_offset() <= offset && offset < b.end_offset()));
        let mut cursor = Cursor {
            pos: offset,
            block,
            entry,
        };
        cursor.settle(piece);
        cursor
    }

    pub(crate) fn position(&self) -> u64 {
        self.pos
    }

    pub(crate) fn segment<'a>(&self, piece: &'a Piece) -> Segment<'a> {
        let header = piece.header();
        if self.pos < header.len() as u64 {
            return Segment::Bytes(&header[self.pos as usize..]);
        }

        match piece.blocks().get(self.block) {
            Some(PieceBlock::Inline(block)) => match block.bytes_at(self.pos) {
                Some(bytes) => Segment::Bytes(bytes),
                None => Segment::End,
            },
            Some(PieceBlock::ItemRun(run)) => {
                let Some(entry) = run.entries().get(self.entry) else {
                    return Segment::End;
                };
                if let Some(framing) = entry.framing_at(self.pos) {
                    return Segment::Bytes(framing);
                }
                let consumed = self.pos - entry.payload_offset();
                Segment::Payload(PayloadSpan {
                    block: self.block,
                    run,
                    entry: self.entry,
                    item_offset: entry.item_offset() + consumed,
                    remaining: entry.end_offset() - self.pos,
                })
            }
            None => Segment::End,
        }
    }

    /// Move forward `n` bytes. Returns `true` if the cursor left an item run.
    pub(crate) fn advance(&mut self, piece: &Piece, n: u64) -> bool {
        self.pos += n;
        self.settle(piece)
    }

    fn settle(&mut self, piece: &Piece) -> bool {
        if self.pos < piece.header().len() as u64 {
            return false;
        }

        let mut left_run = false;
        while let Some(block) = piece.blocks().get(self.block) {
            match block {
                PieceBlock::Inline(inline) => {
                    if self.pos < inline.end_offset() {
                        break;
                    }
                    self.block += 1;
                    self.entry = 0;
                }
                PieceBlock::ItemRun(run) => {
                    let done = run
                        .entries()
                        .get(self.entry)
                        .map_or(true, |entry| self.pos >= entry.end_offset());
                    if !done {
                        break;
                    }
                    self.entry += 1;
                    if self.entry >= run.entries().len() {
                        self.block += 1;
                        self.entry = 0;
                        left_run = true;
                    }
                }
            }
        }
        left_run
    }
}

/// An open forward-only stream into the item of one run.
pub(crate) struct OpenItem<S> {
    pub(crate) block: usize,
    /// Item offset of the next byte the stream yields.
    pub(crate) item_pos: u64,
    pub(crate) stream: S,
}

impl<S> OpenItem<S> {
    /// Drop the stream, logging where it stopped.
    pub(crate) fn release(self) {
        tracing::debug!(
            block = self.block,
            item_pos = self.item_pos,
            "releasing item stream"
        );
    }
}

/// What to do with the currently open stream before reading `span`.
pub(crate) enum StreamPlan<S> {
    /// The stream is positioned exactly at the span.
    Ready(OpenItem<S>),
    /// Same run, but the span starts this many bytes further into the item.
    Skip(OpenItem<S>, u64),
    /// No stream, or one that cannot reach the span going forward.
    Open(Option<OpenItem<S>>),
}

impl<S> StreamPlan<S> {
    pub(crate) fn for_span(open: Option<OpenItem<S>>, span: &PayloadSpan<'_>) -> Self {
        match open {
            Some(open) if open.block == span.block && open.item_pos == span.item_offset => {
                StreamPlan::Ready(open)
            }
            Some(open) if open.block == span.block && open.item_pos < span.item_offset => {
                let gap = span.item_offset - open.item_pos;
                StreamPlan::Skip(open, gap)
            }
            stale => StreamPlan::Open(stale),
        }
    }
}

/// Lazily resolved source handles, one slot per top-level block.
///
/// Shared by every reader copied from the same original, so each run's
/// source is resolved at most once for all of them.
pub(crate) struct HandleCache<H: ?Sized> {
    slots: Vec<Mutex<Option<Arc<H>>>>,
}

impl<H: ?Sized> HandleCache<H> {
    pub(crate) fn new(blocks: usize) -> Self {
        Self {
            slots: (0..blocks).map(|_| Mutex::new(None)).collect(),
        }
    }

    pub(crate) fn get_or_resolve<E>(
        &self,
        block: usize,
        resolve: impl FnOnce() -> Result<Arc<H>, E>,
    ) -> Result<Arc<H>, E> {
        let Some(slot) = self.slots.get(block) else {
            return resolve();
        };
        let mut guard = slot.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(handle) = guard.as_ref() {
            return Ok(Arc::clone(handle));
        }
        let handle = resolve()?;
        *guard = Some(Arc::clone(&handle));
        Ok(handle)
    }
}
