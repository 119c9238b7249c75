//! The sequential, seekable piece reader.

use std::io::{self, Read, Seek, SeekFrom};
use std::sync::Arc;

use piecefs_source_store::{ItemSource, ItemStream, SourceResolver};

use crate::cursor::{Cursor, HandleCache, OpenItem, PayloadSpan, Segment, StreamPlan};
use crate::{Piece, ReadError, ReaderOptions};

/// Streams the bytes of a [`Piece`] in order, pulling item payloads lazily.
///
/// At most one item stream is open at a time. It is opened on the first
/// payload byte of a run, reused for the rest of that run, and released when
/// the run is exhausted, when the reader is repositioned, or on [`close`].
///
/// A reader is not meant to be shared between threads; create independent
/// readers with [`make_copy`] instead. Copies share the piece layout and the
/// resolved source handles, never the open stream.
///
/// # Example
///
/// ```rust
/// use std::io::Read;
/// use std::sync::Arc;
///
/// use bytes::Bytes;
/// use piecefs_piece_store::{CandidateBlock, Piece, PieceReader};
/// use piecefs_source_store::SourceRegistry;
///
/// let piece = Piece::build(
///     Bytes::from_static(&[0x0a; 4]),
///     9,
///     vec![CandidateBlock::inline(
///         4,
///         Bytes::from_static(&[0x05]),
///         Bytes::from_static(&[0xaa, 0xbb]),
///         Bytes::from_static(&[0xcc, 0xdd]),
///     )],
/// )
/// .unwrap();
///
/// let resolver: SourceRegistry = SourceRegistry::new();
/// let reader = PieceReader::new(Arc::new(piece), Arc::new(resolver));
///
/// let mut tail = Vec::new();
/// reader.make_copy(6).unwrap().read_to_end(&mut tail).unwrap();
/// assert_eq!(tail, [0xbb, 0xcc, 0xdd]);
/// ```
///
/// [`close`]: PieceReader::close
/// [`make_copy`]: PieceReader::make_copy
pub struct PieceReader {
    piece: Arc<Piece>,
    resolver: Arc<dyn SourceResolver>,
    handles: Arc<HandleCache<dyn ItemSource>>,
    options: ReaderOptions,
    cursor: Cursor,
    stream: Option<OpenItem<ItemStream>>,
    poisoned: bool,
}

impl PieceReader {
    pub fn new(piece: Arc<Piece>, resolver: Arc<dyn SourceResolver>) -> Self {
        Self::with_options(piece, resolver, ReaderOptions::default())
    }

    pub fn with_options(
        piece: Arc<Piece>,
        resolver: Arc<dyn SourceResolver>,
        options: ReaderOptions,
    ) -> Self {
        let handles = Arc::new(HandleCache::new(piece.blocks().len()));
        let cursor = Cursor::start(&piece);
        Self {
            piece,
            resolver,
            handles,
            options,
            cursor,
            stream: None,
            poisoned: false,
        }
    }

    pub fn piece(&self) -> &Arc<Piece> {
        &self.piece
    }

    pub fn options(&self) -> &ReaderOptions {
        &self.options
    }

    /// Absolute piece offset of the next byte to be returned.
    pub fn position(&self) -> u64 {
        self.cursor.position()
    }

    /// A new reader over the same piece that starts emitting at `offset`.
    ///
    /// Nothing is read or opened; the copy opens its own item stream on its
    /// first payload byte. `offset == size` gives a reader already at end of
    /// stream.
    pub fn make_copy(&self, offset: u64) -> Result<PieceReader, ReadError> {
        check_offset(&self.piece, offset)?;
        Ok(PieceReader {
            piece: Arc::clone(&self.piece),
            resolver: Arc::clone(&self.resolver),
            handles: Arc::clone(&self.handles),
            options: self.options.clone(),
            cursor: Cursor::at(&self.piece, offset),
            stream: None,
            poisoned: false,
        })
    }

    /// Reposition this reader in place, releasing any open stream.
    pub fn seek_to(&mut self, offset: u64) -> Result<(), ReadError> {
        check_offset(&self.piece, offset)?;
        self.release_stream();
        self.cursor = Cursor::at(&self.piece, offset);
        tracing::debug!(offset, "repositioned piece reader");
        Ok(())
    }

    /// Release the open item stream, if any. Safe to call repeatedly.
    pub fn close(&mut self) {
        self.release_stream();
    }

    /// Read the next bytes of the piece into `buf`.
    ///
    /// Returns `Ok(0)` only at end of stream or for an empty `buf`. In-memory
    /// bytes are copied until `buf` is full; at most one item read is issued
    /// per call, and the call returns right after it.
    pub fn read_piece(&mut self, buf: &mut [u8]) -> Result<usize, ReadError> {
        if self.poisoned {
            return Err(ReadError::Poisoned);
        }
        match self.fill(buf) {
            Ok(n) => Ok(n),
            Err(error) => {
                tracing::warn!(position = self.position(), %error, "piece read failed");
                self.poisoned = true;
                self.release_stream();
                Err(error)
            }
        }
    }

    fn fill(&mut self, buf: &mut [u8]) -> Result<usize, ReadError> {
        let piece = Arc::clone(&self.piece);
        let mut n = 0;
        while n < buf.len() {
            match self.cursor.segment(&piece) {
                Segment::End => break,
                Segment::Bytes(bytes) => {
                    let copied = bytes.len().min(buf.len() - n);
                    buf[n..n + copied].copy_from_slice(&bytes[..copied]);
                    n += copied;
                    self.advance(&piece, copied);
                }
                Segment::Payload(span) => {
                    let read = self.read_payload(&span, &mut buf[n..])?;
                    n += read;
                    self.advance(&piece, read);
                    break;
                }
            }
        }
        Ok(n)
    }

    fn advance(&mut self, piece: &Piece, n: usize) {
        if self.cursor.advance(piece, n as u64) {
            self.release_stream();
        }
    }

    fn read_payload(&mut self, span: &PayloadSpan<'_>, buf: &mut [u8]) -> Result<usize, ReadError> {
        let open = match StreamPlan::for_span(self.stream.take(), span) {
            StreamPlan::Ready(open) => open,
            StreamPlan::Skip(mut open, gap) => {
                skip_forward(&mut open, gap, span.path())?;
                open
            }
            StreamPlan::Open(stale) => {
                if let Some(stale) = stale {
                    stale.release();
                }
                self.open_stream(span)?
            }
        };
        let open = self.stream.insert(open);

        let want = span.clamp(buf.len());
        let read = loop {
            match open.stream.read(&mut buf[..want]) {
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                result => break result,
            }
        }
        .map_err(|e| ReadError::read_failure(span.path(), e))?;
        if read == 0 {
            return Err(ReadError::UnexpectedEnd {
                path: span.path().to_string(),
                item_offset: open.item_pos,
            });
        }
        open.item_pos += read as u64;
        Ok(read)
    }

    fn open_stream(&self, span: &PayloadSpan<'_>) -> Result<OpenItem<ItemStream>, ReadError> {
        let run = span.run;
        let handle = self
            .handles
            .get_or_resolve(span.block, || self.resolver.resolve(run.source()))
            .map_err(|source| ReadError::SourceUnavailable {
                source_id: run.source(),
                source,
            })?;

        let length = self
            .options
            .read_ahead
            .request_len(run, span.entry, span.item_offset);
        tracing::debug!(
            source = %run.source(),
            path = %span.path(),
            item_offset = span.item_offset,
            length,
            "opening item stream"
        );
        let stream = handle
            .open_range(span.path(), span.item_offset, length)
            .map_err(|e| ReadError::read_failure(span.path(), e))?;

        Ok(OpenItem {
            block: span.block,
            item_pos: span.item_offset,
            stream,
        })
    }

    fn release_stream(&mut self) {
        if let Some(open) = self.stream.take() {
            open.release();
        }
    }
}

fn skip_forward(open: &mut OpenItem<ItemStream>, gap: u64, path: &str) -> Result<(), ReadError> {
    tracing::trace!(path, from = open.item_pos, gap, "skipping forward in item stream");
    let skipped = io::copy(&mut (&mut open.stream).take(gap), &mut io::sink())
        .map_err(|e| ReadError::read_failure(path, e))?;
    open.item_pos += skipped;
    if skipped < gap {
        return Err(ReadError::UnexpectedEnd {
            path: path.to_string(),
            item_offset: open.item_pos,
        });
    }
    Ok(())
}

pub(crate) fn check_offset(piece: &Piece, offset: u64) -> Result<(), ReadError> {
    if offset > piece.size() {
        return Err(ReadError::SeekOutOfRange {
            offset,
            size: piece.size(),
        });
    }
    Ok(())
}

impl Read for PieceReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.read_piece(buf).map_err(io::Error::from)
    }
}

impl Seek for PieceReader {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(offset) => Some(offset),
            SeekFrom::End(delta) => self.piece.size().checked_add_signed(delta),
            SeekFrom::Current(delta) => self.position().checked_add_signed(delta),
        }
        .ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                "invalid seek to a negative or overflowing position",
            )
        })?;
        self.seek_to(target)?;
        Ok(target)
    }
}

impl std::fmt::Debug for PieceReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PieceReader")
            .field("size", &self.piece.size())
            .field("position", &self.position())
            .field("stream_open", &self.stream.is_some())
            .field("poisoned", &self.poisoned)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CandidateBlock;
    use bytes::Bytes;
    use piecefs_source_store::{InMemorySource, Item, ItemId, SourceId, SourceRegistry};

    const HEADER: &[u8] = &[0x0a, 0x0a, 0x0a, 0x0a];

    fn example_piece() -> Arc<Piece> {
        Arc::new(
            Piece::build(
                Bytes::from_static(HEADER),
                9,
                vec![CandidateBlock::inline(
                    4,
                    Bytes::from_static(&[0x05]),
                    Bytes::from_static(&[0xaa, 0xbb]),
                    Bytes::from_static(&[0xcc, 0xdd]),
                )],
            )
            .unwrap(),
        )
    }

    fn empty_resolver() -> Arc<dyn SourceResolver> {
        let registry: SourceRegistry = SourceRegistry::new();
        Arc::new(registry)
    }

    /// Header, then two blocks of "file" (payloads "hello", "world") and an
    /// inline block.
    fn item_piece() -> (Arc<Piece>, Arc<dyn SourceResolver>) {
        let mut memory = InMemorySource::new();
        memory.insert("file", Bytes::from_static(b"helloworld"));
        let mut registry: SourceRegistry = SourceRegistry::new();
        registry.register(SourceId(1), Arc::new(memory));

        let item = Item::new(ItemId(1), "file", 10);
        let first = CandidateBlock::item_with_varint(
            2,
            Bytes::from_static(b"I1"),
            SourceId(1),
            item.clone(),
            0,
            5,
        );
        let second = CandidateBlock::item_with_varint(
            first.end_offset(),
            Bytes::from_static(b"I2"),
            SourceId(1),
            item,
            5,
            5,
        );
        let inline = CandidateBlock::inline_with_varint(
            second.end_offset(),
            Bytes::from_static(b"R"),
            Bytes::from_static(b"!"),
        );
        let size = inline.end_offset();
        let piece =
            Piece::build(Bytes::from_static(b"HD"), size, vec![first, second, inline]).unwrap();
        (Arc::new(piece), Arc::new(registry))
    }

    fn read_all(reader: &mut PieceReader) -> Vec<u8> {
        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        out
    }

    #[test]
    fn reads_inline_example() {
        let mut reader = PieceReader::new(example_piece(), empty_resolver());
        assert_eq!(
            read_all(&mut reader),
            vec![0x0a, 0x0a, 0x0a, 0x0a, 0x05, 0xaa, 0xbb, 0xcc, 0xdd]
        );
        assert_eq!(reader.position(), 9);

        let mut buf = [0u8; 4];
        assert_eq!(reader.read_piece(&mut buf).unwrap(), 0);
    }

    #[test]
    fn copy_starts_mid_identifier() {
        let reader = PieceReader::new(example_piece(), empty_resolver());
        let mut copy = reader.make_copy(6).unwrap();
        assert_eq!(copy.position(), 6);
        assert_eq!(read_all(&mut copy), vec![0xbb, 0xcc, 0xdd]);
        // The original is untouched.
        assert_eq!(reader.position(), 0);
    }

    #[test]
    fn copy_at_end_and_past_end() {
        let reader = PieceReader::new(example_piece(), empty_resolver());
        let mut at_end = reader.make_copy(9).unwrap();
        assert!(read_all(&mut at_end).is_empty());
        assert!(matches!(
            reader.make_copy(10),
            Err(ReadError::SeekOutOfRange {
                offset: 10,
                size: 9
            })
        ));
    }

    #[test]
    fn reads_item_runs_through_one_stream() {
        let (piece, resolver) = item_piece();
        let mut reader = PieceReader::new(piece, resolver);
        let out = read_all(&mut reader);
        assert_eq!(out, b"HD\x07I1hello\x07I2world\x02R!".to_vec());
    }

    #[test]
    fn payload_reads_are_short_and_return_after_one_item_read() {
        let (piece, resolver) = item_piece();
        let mut reader = PieceReader::new(piece, resolver);
        let mut buf = [0u8; 64];
        // Header, prefix and identifier are copied, then one item read.
        let n = reader.read_piece(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"HD\x07I1hello");
        assert!(reader.stream.is_some());
    }

    #[test]
    fn copy_into_payload_opens_at_item_offset() {
        let (piece, resolver) = item_piece();
        let reader = PieceReader::new(piece, resolver);
        // Payload of the first block starts at 5; offset 7 is the first 'l'.
        let mut copy = reader.make_copy(7).unwrap();
        assert_eq!(read_all(&mut copy), b"llo\x07I2world\x02R!".to_vec());
    }

    #[test]
    fn stream_released_when_run_ends() {
        let (piece, resolver) = item_piece();
        let mut reader = PieceReader::new(piece, resolver);
        let mut buf = [0u8; 1];
        while reader.position() < 21 {
            reader.read_piece(&mut buf).unwrap();
        }
        assert!(reader.stream.is_none());
    }

    #[test]
    fn seek_repositions_in_place() {
        let (piece, resolver) = item_piece();
        let mut reader = PieceReader::new(piece, resolver);
        let full = read_all(&mut reader);

        assert_eq!(reader.seek(SeekFrom::Start(3)).unwrap(), 3);
        assert_eq!(read_all(&mut reader), full[3..].to_vec());

        assert_eq!(reader.seek(SeekFrom::End(-3)).unwrap(), 18);
        assert_eq!(read_all(&mut reader), b"\x02R!".to_vec());

        reader.seek(SeekFrom::Start(10)).unwrap();
        assert_eq!(reader.seek(SeekFrom::Current(2)).unwrap(), 12);
        assert!(reader.seek(SeekFrom::Current(-100)).is_err());
        assert!(reader.seek(SeekFrom::Start(1000)).is_err());
    }

    #[test]
    fn close_is_idempotent() {
        let (piece, resolver) = item_piece();
        let mut reader = PieceReader::new(piece, resolver);
        reader.close();
        let mut buf = [0u8; 10];
        reader.read_piece(&mut buf).unwrap();
        reader.close();
        assert!(reader.stream.is_none());
        reader.close();
    }

    #[test]
    fn missing_source_poisons_reader() {
        let (piece, _) = item_piece();
        let mut reader = PieceReader::new(piece, empty_resolver());
        let mut buf = [0u8; 64];
        let err = reader.read_piece(&mut buf).unwrap_err();
        assert!(matches!(err, ReadError::SourceUnavailable { .. }));
        assert!(matches!(
            reader.read_piece(&mut buf),
            Err(ReadError::Poisoned)
        ));
    }
}
