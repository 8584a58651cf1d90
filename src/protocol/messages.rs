//! JSON-RPC message construction and reply classification.
//!
//! ```json
//! {"jsonrpc":"2.0","id":1,"method":"initialize","params":{
//!   "protocolVersion":"2024-11-05",
//!   "clientInfo":{"name":"relay-bench","version":"0.1.0"},
//!   "capabilities":{}}}
//! {"jsonrpc":"2.0","method":"notifications/initialized"}
//! {"jsonrpc":"2.0","id":10,"method":"tools/call","params":{
//!   "name":"list_directory","arguments":{"path":"/tmp"}}}
//! ```

use serde_json::{json, Value};

use crate::{AppError, Result};

/// Protocol revision announced in the handshake.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// Client name announced in the handshake.
pub const CLIENT_NAME: &str = "relay-bench";

/// Request id used for the handshake.
pub const INITIALIZE_ID: u64 = 1;

/// `initialize` request with the fixed version and client identity.
#[must_use]
pub fn initialize_request(id: u64) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": "initialize",
        "params": {
            "protocolVersion": PROTOCOL_VERSION,
            "clientInfo": {
                "name": CLIENT_NAME,
                "version": env!("CARGO_PKG_VERSION")
            },
            "capabilities": {}
        }
    })
}

/// Fire-and-forget acknowledgement sent after the handshake reply.
#[must_use]
pub fn initialized_notification() -> Value {
    json!({
        "jsonrpc": "2.0",
        "method": "notifications/initialized"
    })
}

/// `tools/call` request for `tool` with `arguments`.
#[must_use]
pub fn tools_call_request(tool: &str, arguments: &Value, id: u64) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": "tools/call",
        "params": {
            "name": tool,
            "arguments": arguments
        }
    })
}

/// Parse one reply line as JSON.
///
/// # Errors
///
/// Returns [`AppError::MalformedResponse`] if the line is not a JSON object.
pub fn parse_reply(line: &str) -> Result<Value> {
    let value: Value = serde_json::from_str(line.trim())
        .map_err(|e| AppError::MalformedResponse(format!("reply is not json: {e}")))?;
    if value.is_object() {
        Ok(value)
    } else {
        Err(AppError::MalformedResponse(
            "reply is not a json object".into(),
        ))
    }
}

/// Accept a reply only if it has `result` and no `error`.
///
/// # Errors
///
/// - [`AppError::CallFailed`]: the reply carries an `error` member.
/// - [`AppError::MalformedResponse`]: neither `result` nor `error`.
pub fn classify_response(reply: Value) -> Result<Value> {
    if let Some(error) = reply.get("error") {
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .map_or_else(|| error.to_string(), str::to_owned);
        return Err(AppError::CallFailed(message));
    }

    if reply.get("result").is_none() {
        return Err(AppError::MalformedResponse(
            "reply has neither result nor error".into(),
        ));
    }

    Ok(reply)
}
