//! Deadline-aware line reader.
//!
//! Reads newline-delimited messages from a child's stdout. Every read is
//! bounded by an absolute deadline; waits are sliced to at most
//! [`POLL_SLICE`] so the deadline is re-checked promptly even when the
//! source trickles in one byte at a time.
//!
//! # States
//!
//! | State      | Meaning                                                   |
//! |------------|-----------------------------------------------------------|
//! | `Waiting`  | Source open; buffer holds no complete line yet            |
//! | `Draining` | Source hit end-of-stream; buffered lines still deliverable |
//! | `Closed`   | Everything delivered; every read fails `StreamClosed`     |
//! | `Failed`   | I/O or framing error; every read fails `StreamClosed`     |
//!
//! A line that is already buffered is always returned before the source is
//! polled again, so chunk boundaries never merge or drop lines.

use std::time::Duration;

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::time::Instant;
use tokio_util::codec::Decoder;
use tracing::debug;

use crate::transport::codec::{Frame, FrameDecoder};
use crate::{AppError, Result};

/// Upper bound on a single readiness wait.
pub const POLL_SLICE: Duration = Duration::from_secs(1);

/// Maximum bytes pulled from the source per read.
pub const CHUNK_SIZE: usize = 65_536;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReadState {
    Waiting,
    Draining,
    Closed,
    Failed,
}

/// Line reader over a byte source with per-call deadlines.
///
/// Owns its buffer exclusively; bytes are only removed from it when a full
/// line is extracted or the end-of-stream remainder is drained.
#[derive(Debug)]
pub struct LineReader<R> {
    source: R,
    label: String,
    codec: FrameDecoder,
    buffer: BytesMut,
    chunk: Vec<u8>,
    state: ReadState,
}

impl<R> LineReader<R>
where
    R: AsyncRead + Unpin,
{
    /// Wrap `source`; `label` identifies the stream in log output.
    pub fn new(source: R, label: impl Into<String>) -> Self {
        Self {
            source,
            label: label.into(),
            codec: FrameDecoder::new(),
            buffer: BytesMut::new(),
            chunk: vec![0; CHUNK_SIZE],
            state: ReadState::Waiting,
        }
    }

    /// Identifier used in log output.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Number of bytes buffered but not yet delivered.
    #[must_use]
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Read the next line, terminated or drained, before `deadline`.
    ///
    /// # Errors
    ///
    /// See [`Self::read_frame`].
    pub async fn read_line(&mut self, deadline: Instant) -> Result<String> {
        let frame = self.read_frame(deadline).await?;
        if frame.is_trailing() {
            debug!(
                stream = self.label.as_str(),
                "transport: delivering unterminated final line"
            );
        }
        Ok(frame.into_text())
    }

    /// Read the next line with a deadline `timeout` from now.
    ///
    /// # Errors
    ///
    /// See [`Self::read_frame`].
    pub async fn read_line_within(&mut self, timeout: Duration) -> Result<String> {
        self.read_line(Instant::now() + timeout).await
    }

    /// Read the next frame before `deadline`.
    ///
    /// # Errors
    ///
    /// - [`AppError::Timeout`]: no complete line before `deadline`.
    /// - [`AppError::StreamClosed`]: end-of-stream with nothing buffered,
    ///   or the reader already failed.
    /// - [`AppError::Protocol`]: line longer than the codec limit.
    /// - [`AppError::Io`]: read error or invalid UTF-8.
    pub async fn read_frame(&mut self, deadline: Instant) -> Result<Frame> {
        loop {
            match self.state {
                ReadState::Closed | ReadState::Failed => {
                    return Err(AppError::StreamClosed(format!(
                        "{} has no more output",
                        self.label
                    )));
                }
                ReadState::Draining => {
                    let drained = self.codec.decode_eof(&mut self.buffer).map_err(|err| {
                        self.state = ReadState::Failed;
                        err
                    })?;
                    if let Some(frame) = drained {
                        return Ok(frame);
                    }
                    self.state = ReadState::Closed;
                    return Err(AppError::StreamClosed(format!(
                        "{} reached end of stream",
                        self.label
                    )));
                }
                ReadState::Waiting => {
                    if let Some(frame) = self.decode_next()? {
                        return Ok(frame);
                    }
                    self.fill(deadline).await?;
                }
            }
        }
    }

    /// Extract one complete line from the buffer, if present.
    fn decode_next(&mut self) -> Result<Option<Frame>> {
        self.codec.decode(&mut self.buffer).map_err(|err| {
            self.state = ReadState::Failed;
            err
        })
    }

    /// Wait for readability in bounded slices and append one chunk.
    async fn fill(&mut self, deadline: Instant) -> Result<()> {
        loop {
            let now = Instant::now();
            if now >= deadline {
                return Err(AppError::Timeout(format!(
                    "no complete line from {} before deadline",
                    self.label
                )));
            }

            let slice = deadline.saturating_duration_since(now).min(POLL_SLICE);
            match tokio::time::timeout(slice, self.source.read(&mut self.chunk)).await {
                // Slice elapsed; loop to re-check the absolute deadline.
                Err(_) => {}
                Ok(Ok(0)) => {
                    debug!(
                        stream = self.label.as_str(),
                        buffered = self.buffer.len(),
                        "transport: end of stream"
                    );
                    self.state = ReadState::Draining;
                    return Ok(());
                }
                Ok(Ok(n)) => {
                    self.buffer.extend_from_slice(&self.chunk[..n]);
                    return Ok(());
                }
                Ok(Err(err)) => {
                    self.state = ReadState::Failed;
                    return Err(AppError::Io(format!("read from {} failed: {err}", self.label)));
                }
            }
        }
    }
}
