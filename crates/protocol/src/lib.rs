//! Plugin ⇄ host wire protocol.
//!
//! Protocol version 1. Frames are single-line JSON objects exchanged over the
//! plugin process's stdin (host → plugin) and stdout (plugin → host).
//!
//! Frame types:
//! - `HelloFrame`:    plugin → host, first frame, announces implemented hooks
//! - `RequestFrame`:  either direction: hook invocations from the host, API
//!   calls from the plugin
//! - `ResponseFrame`: answer to a request with the same id
//! - `EventFrame`:    plugin → host notification, never answered

use serde::{Deserialize, Serialize};

// ── Constants ────────────────────────────────────────────────────────────────

pub const PROTOCOL_VERSION: u32 = 1;
pub const MAX_FRAME_BYTES: usize = 1_048_576; // 1 MB

/// Host API methods a plugin may call.
pub mod methods {
    pub const GET_CHANNEL: &str = "GetChannel";
    pub const UPDATE_POST: &str = "UpdatePost";
    /// Sent by the host to end the session.
    pub const SHUTDOWN: &str = "Shutdown";
}

/// Plugin notifications.
pub mod events {
    pub const LOG_ERROR: &str = "LogError";
}

// ── Error codes ──────────────────────────────────────────────────────────────

pub mod error_codes {
    pub const NOT_FOUND: &str = "NOT_FOUND";
    pub const REJECTED: &str = "REJECTED";
    pub const UNKNOWN_METHOD: &str = "UNKNOWN_METHOD";
    pub const INVALID_REQUEST: &str = "INVALID_REQUEST";
    pub const INTERNAL: &str = "INTERNAL";
}

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("frame of {len} bytes exceeds the {max} byte limit")]
    TooLarge { len: usize, max: usize },

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

// ── Error shape ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorShape {
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ErrorShape {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }
}

// ── Frames ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HelloFrame {
    pub protocol: u32,
    #[serde(rename = "pluginId")]
    pub plugin_id: String,
    pub version: String,
    /// Hook method names the plugin implements.
    pub hooks: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestFrame {
    pub id: String,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
}

impl RequestFrame {
    pub fn new(id: impl Into<String>, method: impl Into<String>, params: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            method: method.into(),
            params: Some(params),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseFrame {
    pub id: String,
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorShape>,
}

impl ResponseFrame {
    pub fn ok(id: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            ok: true,
            payload: Some(payload),
            error: None,
        }
    }

    pub fn err(id: impl Into<String>, error: ErrorShape) -> Self {
        Self {
            id: id.into(),
            ok: false,
            payload: None,
            error: Some(error),
        }
    }

    /// Splits the frame into its payload or its error.
    pub fn into_result(self) -> Result<serde_json::Value, ErrorShape> {
        match (self.ok, self.error) {
            (true, _) => Ok(self.payload.unwrap_or(serde_json::Value::Null)),
            (false, Some(error)) => Err(error),
            (false, None) => Err(ErrorShape::new(
                error_codes::INTERNAL,
                "response marked failed without an error",
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventFrame {
    pub event: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
}

/// Params of the `LogError` notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogErrorParams {
    pub message: String,
    pub key: String,
    pub value: String,
}

/// Discriminated union of all frame types.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Frame {
    #[serde(rename = "hello")]
    Hello(HelloFrame),
    #[serde(rename = "req")]
    Request(RequestFrame),
    #[serde(rename = "res")]
    Response(ResponseFrame),
    #[serde(rename = "event")]
    Event(EventFrame),
}

impl Frame {
    /// Decodes one line of input.
    pub fn from_line(line: &str) -> Result<Self, ProtocolError> {
        if line.len() > MAX_FRAME_BYTES {
            return Err(ProtocolError::TooLarge {
                len: line.len(),
                max: MAX_FRAME_BYTES,
            });
        }
        Ok(serde_json::from_str(line)?)
    }

    /// Encodes the frame as one line, newline included.
    pub fn to_line(&self) -> Result<String, ProtocolError> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_frame_is_tagged() {
        let frame = Frame::Request(RequestFrame::new(
            "p1",
            methods::GET_CHANNEL,
            serde_json::json!({ "channel_id": "c1" }),
        ));
        let line = frame.to_line().unwrap();
        assert!(line.ends_with('\n'));

        let value: serde_json::Value = serde_json::from_str(line.trim_end()).unwrap();
        assert_eq!(value["type"], "req");
        assert_eq!(value["method"], "GetChannel");
        assert_eq!(value["params"]["channel_id"], "c1");
    }

    #[test]
    fn decodes_host_response() {
        let frame =
            Frame::from_line(r#"{"type":"res","id":"p1","ok":true,"payload":{"id":"c1"}}"#)
                .unwrap();
        let Frame::Response(res) = frame else {
            panic!("expected response frame");
        };
        assert_eq!(res.into_result().unwrap()["id"], "c1");
    }

    #[test]
    fn failed_response_carries_error() {
        let res = ResponseFrame::err("p2", ErrorShape::new(error_codes::NOT_FOUND, "gone"));
        let err = res.into_result().unwrap_err();
        assert_eq!(err.code, error_codes::NOT_FOUND);
        assert_eq!(err.message, "gone");
    }

    #[test]
    fn failed_response_without_error_is_internal() {
        let res = ResponseFrame {
            id: "p3".into(),
            ok: false,
            payload: None,
            error: None,
        };
        assert_eq!(res.into_result().unwrap_err().code, error_codes::INTERNAL);
    }

    #[test]
    fn hello_uses_camel_case_plugin_id() {
        let frame = Frame::Hello(HelloFrame {
            protocol: PROTOCOL_VERSION,
            plugin_id: "spamgate".into(),
            version: "0.1.0".into(),
            hooks: vec!["MessageWillBePosted".into()],
        });
        let value = serde_json::to_value(&frame).unwrap();
        assert_eq!(value["type"], "hello");
        assert_eq!(value["pluginId"], "spamgate");
    }

    #[test]
    fn oversized_frame_is_refused() {
        let line = "x".repeat(MAX_FRAME_BYTES + 1);
        assert!(matches!(
            Frame::from_line(&line),
            Err(ProtocolError::TooLarge { .. })
        ));
    }

    #[test]
    fn unknown_frame_type_is_an_error() {
        assert!(Frame::from_line(r#"{"type":"tick"}"#).is_err());
    }
}
