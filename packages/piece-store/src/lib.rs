//! PieceFS Piece Store: stream a piece assembled from inline bytes and item ranges
//!
//! A piece is a fixed-size byte stream laid out as a header followed by a
//! contiguous sequence of blocks. Every block is `prefix ++ identifier ++
//! payload`; the payload is either known up front or a byte range of an item
//! served by some source. This crate validates such a layout, compacts runs of
//! blocks that read the same item, and streams the assembled bytes without
//! ever materializing the whole piece.
//!
//! The layers are:
//! - [`PiecePlan`] / [`CandidateBlock`]: the unvalidated, serde-friendly input.
//! - [`Piece`]: the validated, immutable layout, shared via `Arc`.
//! - [`PieceReader`]: a sequential, seekable `io::Read` over a piece.
//!
//! # Example
//!
//! ```rust
//! use std::io::Read;
//! use std::sync::Arc;
//!
//! use bytes::Bytes;
//! use piecefs_piece_store::{CandidateBlock, PiecePlan, PieceReader};
//! use piecefs_source_store::{InMemorySource, Item, ItemId, SourceId, SourceRegistry};
//!
//! let mut memory = InMemorySource::new();
//! memory.insert("file", Bytes::from_static(b"payload"));
//! let mut registry: SourceRegistry = SourceRegistry::new();
//! registry.register(SourceId(1), Arc::new(memory));
//!
//! let block = CandidateBlock::item_with_varint(
//!     3,
//!     Bytes::from_static(b"id"),
//!     SourceId(1),
//!     Item::new(ItemId(1), "file", 7),
//!     0,
//!     7,
//! );
//! let size = block.end_offset();
//! let piece = PiecePlan::new(Bytes::from_static(b"HDR"), size, vec![block])
//!     .build()
//!     .unwrap();
//!
//! let mut reader = PieceReader::new(Arc::new(piece), Arc::new(registry));
//! let mut out = Vec::new();
//! reader.read_to_end(&mut out).unwrap();
//! assert_eq!(out, b"HDR\x09idpayload");
//! ```
//!
//! # Async Support
//!
//! Enable the `async` feature for [`AsyncPieceReader`], which reads through
//! `AsyncItemSource` implementations.

mod block;
mod cursor;
mod error;
mod options;
mod piece;
mod plan;
mod reader;
pub mod varint;

pub use block::{BlockLayout, InlineBlock, ItemBlockEntry, ItemRun, PieceBlock};
pub use error::{PlanError, ReadError};
pub use options::{ReadAhead, ReaderOptions};
pub use piece::Piece;
pub use plan::{BlockData, CandidateBlock, PiecePlan};
pub use reader::PieceReader;

#[cfg(feature = "async")]
mod async_reader;

#[cfg(feature = "async")]
pub use async_reader::AsyncPieceReader;
