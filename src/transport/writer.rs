//! Outbound NDJSON serialisation.

use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::{AppError, Result};

/// Serialise `value` as compact JSON, append `\n`, write and flush.
///
/// # Errors
///
/// - [`AppError::Protocol`]`("failed to serialise …")` if serialisation fails.
/// - [`AppError::Io`]`("write failed: …")` if the peer's stdin is gone.
pub async fn write_json_line<W>(sink: &mut W, value: &serde_json::Value) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut bytes = serde_json::to_vec(value)
        .map_err(|e| AppError::Protocol(format!("failed to serialise outbound message: {e}")))?;
    bytes.push(b'\n');

    sink.write_all(&bytes)
        .await
        .map_err(|e| AppError::Io(format!("write failed: {e}")))?;
    sink.flush()
        .await
        .map_err(|e| AppError::Io(format!("flush failed: {e}")))
}
