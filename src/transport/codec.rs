//! Frame decoder for session stdout.
//!
//! Splits the byte stream on `\n` and tags every message with how it
//! ended: a terminated [`Frame::Line`] while the stream is open, or a
//! [`Frame::Trailing`] remainder once the stream has closed. Framing is
//! delegated to [`LinesCodec`] with a length cap so a peer that never
//! writes a newline cannot grow the buffer without bound.

use bytes::BytesMut;
use tokio_util::codec::{Decoder, LinesCodec, LinesCodecError};

use crate::{AppError, Result};

/// Longest message accepted from a session, in bytes.
pub const MAX_LINE_BYTES: usize = 1 << 20;

/// One message read from a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// A newline-terminated line (terminator stripped).
    Line(String),
    /// The unterminated remainder drained after end-of-stream.
    Trailing(String),
}

impl Frame {
    /// Message text regardless of how it was terminated.
    #[must_use]
    pub fn into_text(self) -> String {
        match self {
            Self::Line(text) | Self::Trailing(text) => text,
        }
    }

    /// Whether the peer closed the stream without terminating this message.
    #[must_use]
    pub fn is_trailing(&self) -> bool {
        matches!(self, Self::Trailing(_))
    }
}

/// Stateless apart from the inner [`LinesCodec`] scan offset.
#[derive(Debug)]
pub struct FrameDecoder {
    lines: LinesCodec,
}

impl FrameDecoder {
    /// Decoder capped at [`MAX_LINE_BYTES`] per message.
    #[must_use]
    pub fn new() -> Self {
        Self {
            lines: LinesCodec::new_with_max_length(MAX_LINE_BYTES),
        }
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for FrameDecoder {
    type Item = Frame;
    type Error = AppError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>> {
        let line = self.lines.decode(src).map_err(framing_error)?;
        Ok(line.map(Frame::Line))
    }

    /// Complete lines still buffered come out as [`Frame::Line`]; only
    /// the final unterminated bytes become [`Frame::Trailing`].
    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Frame>> {
        if let Some(frame) = self.decode(src)? {
            return Ok(Some(frame));
        }
        let tail = self.lines.decode_eof(src).map_err(framing_error)?;
        Ok(tail.map(Frame::Trailing))
    }
}

fn framing_error(err: LinesCodecError) -> AppError {
    match err {
        LinesCodecError::MaxLineLengthExceeded => AppError::Protocol(format!(
            "message exceeds {MAX_LINE_BYTES} bytes without a newline"
        )),
        LinesCodecError::Io(err) => AppError::Io(err.to_string()),
    }
}
