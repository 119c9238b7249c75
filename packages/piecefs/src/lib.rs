//! PieceFS: assemble fixed-size pieces from inline bytes and lazily read item ranges.
//!
//! PieceFS streams a piece - a header followed by length-prefixed, identified
//! blocks - where block payloads may live in external items. Items are only
//! opened when their bytes are reached, and one stream serves every
//! consecutive block of the same item.
//!
//! The workspace is layered:
//! - [`source`]: item sources, resolvers and the built-in in-memory and local
//!   disk backends.
//! - [`piece`]: plans, validated piece layouts and the piece readers.

pub use piecefs_piece_store as piece;
pub use piecefs_source_store as source;

pub use piecefs_piece_store::{Piece, PiecePlan, PieceReader, ReaderOptions};
pub use piecefs_source_store::{ItemSource, SourceRegistry, SourceResolver};

#[cfg(feature = "async")]
pub use piecefs_piece_store::AsyncPieceReader;
