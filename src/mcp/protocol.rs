//! JSON-RPC 2.0 message model.
//!
//! Requests, notifications and responses are all variants of [`Message`], so
//! the framer and correlator handle every line the same way. A record is
//! classified by which members it carries:
//!
//! - **Request**: `method` and `id`
//! - **Notification**: `method` and no `id`
//! - **Response**: `id` and exactly one of `result` or `error`
//!
//! Anything else (including a response carrying both or neither of `result`
//! and `error`) fails to deserialise and is treated as noise by the framer.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// The MCP protocol version requested by default.
pub const MCP_PROTOCOL_VERSION: &str = "2024-11-05";

/// The only JSON-RPC version accepted on the wire.
pub const JSONRPC_VERSION: &str = "2.0";

/// A JSON-RPC 2.0 request ID.
///
/// MCP requires IDs to be strings or integers, never `null`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    /// Numeric request ID.
    Number(i64),
    /// String request ID.
    String(String),
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::String(s) => write!(f, "{s}"),
        }
    }
}

impl From<i64> for RequestId {
    fn from(n: i64) -> Self {
        Self::Number(n)
    }
}

/// A JSON-RPC 2.0 error object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorObject {
    /// The error code.
    pub code: i64,

    /// A short description of the error.
    pub message: String,

    /// Additional information about the error.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl std::fmt::Display for ErrorObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (code {})", self.message, self.code)
    }
}

/// The payload of a response: either a result or an error, never both.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// The call succeeded.
    Result(Value),
    /// The server rejected the call.
    Error(ErrorObject),
}

/// A request expecting a response.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    /// Correlation identifier.
    pub id: RequestId,
    /// The method to invoke.
    pub method: String,
    /// Parameters for the method.
    pub params: Option<Value>,
}

/// A one-way message with no identifier.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    /// The notification method.
    pub method: String,
    /// Parameters for the notification.
    pub params: Option<Value>,
}

/// A reply to a request.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    /// Identifier of the request this answers.
    pub id: RequestId,
    /// Result or error.
    pub outcome: Outcome,
}

/// Any JSON-RPC 2.0 message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "WireMessage", into = "WireMessage")]
pub enum Message {
    /// A request expecting a response.
    Request(Request),
    /// A notification (no response expected).
    Notification(Notification),
    /// A response to an earlier request.
    Response(Response),
}

impl Message {
    /// Creates a request message.
    #[must_use]
    pub fn request(id: impl Into<RequestId>, method: impl Into<String>, params: Value) -> Self {
        Self::Request(Request {
            id: id.into(),
            method: method.into(),
            params: Some(params),
        })
    }

    /// Creates a notification message.
    #[must_use]
    pub fn notification(method: impl Into<String>, params: Option<Value>) -> Self {
        Self::Notification(Notification {
            method: method.into(),
            params,
        })
    }

    /// Creates a success response.
    #[must_use]
    pub fn result(id: impl Into<RequestId>, result: Value) -> Self {
        Self::Response(Response {
            id: id.into(),
            outcome: Outcome::Result(result),
        })
    }

    /// Creates an error response.
    #[must_use]
    pub fn error(id: impl Into<RequestId>, error: ErrorObject) -> Self {
        Self::Response(Response {
            id: id.into(),
            outcome: Outcome::Error(error),
        })
    }

    /// Returns the identifier, if the message carries one.
    #[must_use]
    pub const fn id(&self) -> Option<&RequestId> {
        match self {
            Self::Request(req) => Some(&req.id),
            Self::Response(resp) => Some(&resp.id),
            Self::Notification(_) => None,
        }
    }

    /// Returns the method name for requests and notifications.
    #[must_use]
    pub fn method(&self) -> Option<&str> {
        match self {
            Self::Request(req) => Some(&req.method),
            Self::Notification(notif) => Some(&notif.method),
            Self::Response(_) => None,
        }
    }

    /// Parses a single line of text into a message.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not JSON or is not a well-formed
    /// JSON-RPC 2.0 message.
    pub fn parse(line: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(line)
    }
}

/// Flat wire representation used for (de)serialisation.
#[derive(Debug, Serialize, Deserialize)]
struct WireMessage {
    jsonrpc: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<RequestId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    params: Option<Value>,
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<ErrorObject>,
}

/// Keeps an explicit `"result": null` distinct from a missing `result`.
fn present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

impl TryFrom<WireMessage> for Message {
    type Error = String;

    fn try_from(wire: WireMessage) -> Result<Self, Self::Error> {
        if wire.jsonrpc != JSONRPC_VERSION {
            return Err(format!("unsupported jsonrpc version {:?}", wire.jsonrpc));
        }

        match (wire.id, wire.method, wire.result, wire.error) {
            (Some(id), Some(method), None, None) => Ok(Self::Request(Request {
                id,
                method,
                params: wire.params,
            })),
            (None, Some(method), None, None) => Ok(Self::Notification(Notification {
                method,
                params: wire.params,
            })),
            (Some(id), None, Some(result), None) => Ok(Self::Response(Response {
                id,
                outcome: Outcome::Result(result),
            })),
            (Some(id), None, None, Some(error)) => Ok(Self::Response(Response {
                id,
                outcome: Outcome::Error(error),
            })),
            (Some(_), None, Some(_), Some(_)) => {
                Err("response carries both result and error".to_string())
            }
            (Some(_), None, None, None) => {
                Err("response carries neither result nor error".to_string())
            }
            _ => Err("not a JSON-RPC request, notification or response".to_string()),
        }
    }
}

impl From<Message> for WireMessage {
    fn from(message: Message) -> Self {
        let mut wire = Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: None,
            method: None,
            params: None,
            result: None,
            error: None,
        };

        match message {
            Message::Request(req) => {
                wire.id = Some(req.id);
                wire.method = Some(req.method);
                wire.params = req.params;
            }
            Message::Notification(notif) => {
                wire.method = Some(notif.method);
                wire.params = notif.params;
            }
            Message::Response(resp) => {
                wire.id = Some(resp.id);
                match resp.outcome {
                    Outcome::Result(result) => wire.result = Some(result),
                    Outcome::Error(error) => wire.error = Some(error),
                }
            }
        }

        wire
    }
}
