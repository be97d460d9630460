//! MCP request and result payloads used by the probe.
//!
//! Result types are deliberately lenient: unknown fields are ignored and
//! optional members default, since the point is to exercise servers that may
//! only partly follow the protocol.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Name and version of a client or server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Implementation {
    /// Implementation name.
    pub name: String,
    /// Implementation version.
    #[serde(default)]
    pub version: String,
}

/// Parameters for the `initialize` request.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeParams {
    /// Protocol version requested by the client.
    pub protocol_version: String,
    /// Client capabilities (none are advertised).
    pub capabilities: Value,
    /// Client information.
    pub client_info: Implementation,
}

/// Result of the `initialize` request.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeResult {
    /// Protocol version chosen by the server.
    #[serde(default)]
    pub protocol_version: Option<String>,
    /// Server capabilities.
    #[serde(default)]
    pub capabilities: Value,
    /// Server information.
    #[serde(default)]
    pub server_info: Option<Implementation>,
    /// Usage instructions, if the server provides any.
    #[serde(default)]
    pub instructions: Option<String>,
}

/// A tool advertised by `tools/list`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tool {
    /// Unique tool name.
    pub name: String,
    /// Human-readable description.
    #[serde(default)]
    pub description: Option<String>,
    /// JSON Schema for the tool's input.
    #[serde(default)]
    pub input_schema: Option<Value>,
}

/// Result of `tools/list`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListToolsResult {
    /// Advertised tools.
    #[serde(default)]
    pub tools: Vec<Tool>,
}

/// A resource advertised by `resources/list`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    /// Resource URI.
    pub uri: String,
    /// Display name.
    #[serde(default)]
    pub name: Option<String>,
    /// Human-readable description.
    #[serde(default)]
    pub description: Option<String>,
    /// MIME type, if known.
    #[serde(default)]
    pub mime_type: Option<String>,
}

/// Result of `resources/list`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListResourcesResult {
    /// Advertised resources.
    #[serde(default)]
    pub resources: Vec<Resource>,
}

/// Parameters for `tools/call`.
#[derive(Debug, Clone, Serialize)]
pub struct CallToolParams {
    /// Name of the tool to call.
    pub name: String,
    /// Arguments for the tool.
    pub arguments: Map<String, Value>,
}

/// A content item returned by a tool.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Content {
    /// Content type (`text`, `image`, `resource`, ...).
    #[serde(rename = "type")]
    pub kind: String,
    /// Text body for `text` items.
    #[serde(default)]
    pub text: Option<String>,
}

impl Content {
    /// Returns the text of a `text` item.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        if self.kind == "text" {
            self.text.as_deref()
        } else {
            None
        }
    }
}

/// Result of `tools/call`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallToolResult {
    /// Content returned by the tool.
    #[serde(default)]
    pub content: Vec<Content>,
    /// Whether the tool reported a failure.
    #[serde(default)]
    pub is_error: bool,
}

impl CallToolResult {
    /// Joins the text items of the result.
    #[must_use]
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(Content::as_text)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Parameters for `resources/read`.
#[derive(Debug, Clone, Serialize)]
pub struct ReadResourceParams {
    /// URI of the resource to read.
    pub uri: String,
}

/// One item of a `resources/read` result.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceContents {
    /// URI of this item.
    pub uri: String,
    /// MIME type of the body.
    #[serde(default)]
    pub mime_type: Option<String>,
    /// Text body.
    #[serde(default)]
    pub text: Option<String>,
    /// Base64 body for binary resources.
    #[serde(default)]
    pub blob: Option<String>,
}

/// Result of `resources/read`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReadResourceResult {
    /// Content items.
    #[serde(default)]
    pub contents: Vec<ResourceContents>,
}
