//! Async piece reader, for sources that open item ranges asynchronously.
//!
//! Enable the `async` feature to use [`AsyncPieceReader`].

use std::sync::Arc;

use piecefs_source_store::{AsyncItemSource, AsyncItemStream, AsyncSourceResolver};
use tokio::io::AsyncReadExt;

use crate::cursor::{Cursor, HandleCache, OpenItem, PayloadSpan, Segment, StreamPlan};
use crate::reader::check_offset;
use crate::{Piece, ReadError, ReaderOptions};

/// Async version of [`PieceReader`](crate::PieceReader).
///
/// Same layout walk, same stream reuse rules, same error behaviour; only the
/// item streams are async.
pub struct AsyncPieceReader {
    piece: Arc<Piece>,
    resolver: Arc<dyn AsyncSourceResolver>,
    handles: Arc<HandleCache<dyn AsyncItemSource>>,
    options: ReaderOptions,
    cursor: Cursor,
    stream: Option<OpenItem<AsyncItemStream>>,
    poisoned: bool,
}

impl AsyncPieceReader {
    pub fn new(piece: Arc<Piece>, resolver: Arc<dyn AsyncSourceResolver>) -> Self {
        Self::with_options(piece, resolver, ReaderOptions::default())
    }

    pub fn with_options(
        piece: Arc<Piece>,
        resolver: Arc<dyn AsyncSourceResolver>,
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

    pub fn position(&self) -> u64 {
        self.cursor.position()
    }

    pub fn make_copy(&self, offset: u64) -> Result<AsyncPieceReader, ReadError> {
        check_offset(&self.piece, offset)?;
        Ok(AsyncPieceReader {
            piece: Arc::clone(&self.piece),
            resolver: Arc::clone(&self.resolver),
            handles: Arc::clone(&self.handles),
            options: self.options.clone(),
            cursor: Cursor::at(&self.piece, offset),
            stream: None,
            poisoned: false,
        })
    }

    pub fn seek_to(&mut self, offset: u64) -> Result<(), ReadError> {
        check_offset(&self.piece, offset)?;
        self.close();
        self.cursor = Cursor::at(&self.piece, offset);
        tracing::debug!(offset, "repositioned async piece reader");
        Ok(())
    }

    pub fn close(&mut self) {
        if let Some(open) = self.stream.take() {
            open.release();
        }
    }

    /// Read the next bytes of the piece into `buf`. See
    /// [`PieceReader::read_piece`](crate::PieceReader::read_piece).
    pub async fn read_piece(&mut self, buf: &mut [u8]) -> Result<usize, ReadError> {
        if self.poisoned {
            return Err(ReadError::Poisoned);
        }
        match self.fill(buf).await {
            Ok(n) => Ok(n),
            Err(error) => {
                tracing::warn!(position = self.position(), %error, "async piece read failed");
                self.poisoned = true;
                self.close();
                Err(error)
            }
        }
    }

    /// Read everything from the current position to the end of the piece.
    pub async fn read_to_end(&mut self, out: &mut Vec<u8>) -> Result<usize, ReadError> {
        let start = out.len();
        let mut buf = vec![0u8; 8 * 1024];
        loop {
            let n = self.read_piece(&mut buf).await?;
            if n == 0 {
                return Ok(out.len() - start);
            }
            out.extend_from_slice(&buf[..n]);
        }
    }

    async fn fill(&mut self, buf: &mut [u8]) -> Result<usize, ReadError> {
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
                    let read = self.read_payload(&span, &mut buf[n..]).await?;
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
            self.close();
        }
    }

    async fn read_payload(
        &mut self,
        span: &PayloadSpan<'_>,
        buf: &mut [u8],
    ) -> Result<usize, ReadError> {
        let open = match StreamPlan::for_span(self.stream.take(), span) {
            StreamPlan::Ready(open) => open,
            StreamPlan::Skip(mut open, gap) => {
                tracing::trace!(
                    path = span.path(),
                    from = open.item_pos,
                    gap,
                    "skipping forward in item stream"
                );
                let mut limited = (&mut open.stream).take(gap);
                let skipped = tokio::io::copy(&mut limited, &mut tokio::io::sink())
                    .await
                    .map_err(|e| ReadError::read_failure(span.path(), e))?;
                open.item_pos += skipped;
                if skipped < gap {
                    return Err(ReadError::UnexpectedEnd {
                        path: span.path().to_string(),
                        item_offset: open.item_pos,
                    });
                }
                open
            }
            StreamPlan::Open(stale) => {
                if let Some(stale) = stale {
                    stale.release();
                }
                self.open_stream(span).await?
            }
        };
        let open = self.stream.insert(open);

        let want = span.clamp(buf.len());
        let read = loop {
            match open.stream.read(&mut buf[..want]).await {
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
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

    async fn open_stream(
        &self,
        span: &PayloadSpan<'_>,
    ) -> Result<OpenItem<AsyncItemStream>, ReadError> {
        let run = span.run;
        let handle = self
            .handles
            .get_or_resolve(span.block, || self.resolver.resolve_async_source(run.source()))
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
            "opening async item stream"
        );
        let stream = handle
            .open_range_async(span.path(), span.item_offset, length)
            .await
            .map_err(|e| ReadError::read_failure(span.path(), e))?;

        Ok(OpenItem {
            block: span.block,
            item_pos: span.item_offset,
            stream,
        })
    }
}

impl std::fmt::Debug for AsyncPieceReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncPieceReader")
            .field("size", &self.piece.size())
            .field("position", &self.position())
            .field("stream_open", &self.stream.is_some())
            .field("poisoned", &self.poisoned)
            .finish()
    }
}
