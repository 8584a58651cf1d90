//! Request/response exchanges over a session transport.
//!
//! 1. **`handshake`**: writes `initialize`, waits for one reply line,
//!    records the elapsed time, then writes `notifications/initialized`
//!    (no reply expected).
//! 2. **`invoke`**: writes one `tools/call` and classifies the reply.
//!
//! Both functions read exactly one line per request. Each read carries its
//! own deadline; a timeout or closed stream is returned as-is and never
//! retried.

use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::debug;

use crate::protocol::messages::{
    classify_response, initialize_request, initialized_notification, parse_reply,
    tools_call_request, INITIALIZE_ID,
};
use crate::transport::{write_json_line, LineReader};
use crate::{AppError, Result};

/// Outcome of a completed handshake.
#[derive(Debug, Clone)]
pub struct Handshake {
    /// Parsed `initialize` reply.
    pub response: Value,
    /// Time from sending `initialize` to reading its reply.
    pub elapsed: Duration,
}

/// Perform the `initialize` / `notifications/initialized` exchange.
///
/// # Errors
///
/// - [`AppError::Timeout`] / [`AppError::StreamClosed`]: no reply.
/// - [`AppError::MalformedResponse`]: reply is not a JSON object.
/// - [`AppError::CallFailed`]: the server rejected the handshake.
/// - [`AppError::Io`]: the peer's stdin is gone.
pub async fn handshake<R, W>(
    reader: &mut LineReader<R>,
    writer: &mut W,
    timeout: Duration,
) -> Result<Handshake>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let started = Instant::now();
    write_json_line(writer, &initialize_request(INITIALIZE_ID)).await?;

    let line = reader.read_line_within(timeout).await?;
    let elapsed = started.elapsed();
    let reply = parse_reply(&line)?;

    if let Some(error) = reply.get("error") {
        return Err(AppError::CallFailed(format!(
            "initialize rejected: {error}"
        )));
    }

    write_json_line(writer, &initialized_notification()).await?;

    debug!(
        stream = reader.label(),
        ?elapsed,
        "handshake complete"
    );

    Ok(Handshake {
        response: reply,
        elapsed,
    })
}

/// Call `tool` with `arguments` under request id `id` and return the reply.
///
/// # Errors
///
/// - [`AppError::Timeout`] / [`AppError::StreamClosed`]: no reply.
/// - [`AppError::CallFailed`]: reply carries `error`.
/// - [`AppError::MalformedResponse`]: reply lacks `result`, or is not JSON.
pub async fn invoke<R, W>(
    reader: &mut LineReader<R>,
    writer: &mut W,
    tool: &str,
    arguments: &Value,
    id: u64,
    timeout: Duration,
) -> Result<Value>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    write_json_line(writer, &tools_call_request(tool, arguments, id)).await?;
    let line = reader.read_line_within(timeout).await?;
    let reply = classify_response(parse_reply(&line)?)?;

    debug!(stream = reader.label(), tool, id, "tool call succeeded");
    Ok(reply)
}
