use common::PortraitError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Request sent to mpv, one JSON object per line
#[derive(Debug, Serialize)]
struct Request<'a> {
    command: &'a [Value],
    request_id: u64,
}

/// Any line mpv writes to the IPC socket
#[derive(Debug, Deserialize)]
struct RawMessage {
    #[serde(default)]
    event: Option<String>,
    #[serde(default)]
    request_id: Option<u64>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    data: Value,
}

/// Parsed IPC message
#[derive(Debug, PartialEq)]
pub enum Message {
    /// Asynchronous notification such as `file-loaded` or `pause`
    Event(String),
    /// Answer to the request with the given id; `Err` carries mpv's error string
    Reply {
        request_id: u64,
        result: Result<Value, String>,
    },
}

/// Serialize a command into a newline-terminated request line
pub fn encode_request(request_id: u64, command: &[Value]) -> Result<String, PortraitError> {
    let mut line = serde_json::to_string(&Request {
        command,
        request_id,
    })
    .map_err(|e| PortraitError::EngineUnavailable(format!("failed to encode request: {}", e)))?;
    line.push('\n');
    Ok(line)
}

pub fn parse_message(line: &str) -> Result<Message, PortraitError> {
    let raw: RawMessage = serde_json::from_str(line).map_err(|e| {
        PortraitError::EngineUnavailable(format!("malformed IPC message '{}': {}", line.trim(), e))
    })?;

    if let Some(event) = raw.event {
        return Ok(Message::Event(event));
    }

    let result = match raw.error.as_deref() {
        Some("success") | None => Ok(raw.data),
        Some(error) => Err(error.to_string()),
    };

    Ok(Message::Reply {
        // mpv answers requests without an id with id 0
        request_id: raw.request_id.unwrap_or(0),
        result,
    })
}
