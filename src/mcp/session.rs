//! MCP client session lifecycle.
//!
//! 1. **Handshake**: `initialize` request, then the `notifications/initialized`
//!    notification
//! 2. **Operation**: discovery (`tools/list`, `resources/list`), tool calls and
//!    resource reads, one at a time
//! 3. **Done**: no further calls are accepted
//!
//! Every call other than `initialize` is refused until the handshake has
//! succeeded, so nothing reaches the server before it has been initialised.

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::{json, Map, Value};

use crate::error::CallError;
use crate::mcp::protocol::{Outcome, RequestId, MCP_PROTOCOL_VERSION};
use crate::mcp::transport::{Correlator, Peer};
use crate::mcp::types::{
    CallToolParams, CallToolResult, Implementation, InitializeParams, InitializeResult,
    ListResourcesResult, ListToolsResult, ReadResourceParams, ReadResourceResult, Resource,
    ResourceContents, Tool,
};

/// Session state in the MCP lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No request has been sent yet.
    Unstarted,
    /// `initialize` is in flight.
    Handshaking,
    /// `initialize` succeeded; the initialized notification is being sent.
    Initialized,
    /// Ready for normal operation.
    Ready,
    /// A `tools/call` is in flight.
    ToolInvoking,
    /// A `resources/read` is in flight.
    ResourceReading,
    /// The session has ended.
    Done,
}

/// Client-side settings for a session.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Identity sent in `initialize`.
    pub client_info: Implementation,
    /// Protocol version requested in `initialize`.
    pub protocol_version: String,
    /// Pause after the initialized notification before the next call.
    pub notification_settle: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            client_info: Implementation {
                name: "mcp-test-client".to_string(),
                version: "1.0.0".to_string(),
            },
            protocol_version: MCP_PROTOCOL_VERSION.to_string(),
            notification_settle: Duration::from_millis(100),
        }
    }
}

/// A client session with one MCP server.
#[derive(Debug)]
pub struct ProtocolSession<P> {
    correlator: Correlator<P>,
    options: SessionOptions,
    state: SessionState,
    next_id: i64,
    server: Option<InitializeResult>,
}

impl<P: Peer> ProtocolSession<P> {
    /// Creates a session over `peer`. Nothing is sent until [`initialize`].
    ///
    /// [`initialize`]: Self::initialize
    #[must_use]
    pub fn new(peer: P, options: SessionOptions) -> Self {
        Self {
            correlator: Correlator::new(peer),
            options,
            state: SessionState::Unstarted,
            next_id: 1,
            server: None,
        }
    }

    /// Returns the current session state.
    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// Returns the peer mutably (used for shutdown).
    pub fn peer_mut(&mut self) -> &mut P {
        self.correlator.peer_mut()
    }

    /// Performs the `initialize` handshake.
    ///
    /// # Errors
    ///
    /// Any failure ends the session; no further calls are accepted.
    pub async fn initialize(&mut self, timeout: Duration) -> Result<&InitializeResult, CallError> {
        if self.state != SessionState::Unstarted {
            return Err(CallError::NotReady {
                method: "initialize",
                state: self.state,
            });
        }

        self.state = SessionState::Handshaking;
        let params = InitializeParams {
            protocol_version: self.options.protocol_version.clone(),
            capabilities: json!({}),
            client_info: self.options.client_info.clone(),
        };

        let result: InitializeResult = match self
            .request("initialize", to_params(&params), timeout)
            .await
        {
            Ok(result) => result,
            Err(e) => {
                self.state = SessionState::Done;
                return Err(e);
            }
        };

        self.state = SessionState::Initialized;
        if let Err(e) = self
            .correlator
            .notify("notifications/initialized", Some(json!({})))
            .await
        {
            self.state = SessionState::Done;
            return Err(e.into());
        }
        tokio::time::sleep(self.options.notification_settle).await;

        tracing::info!(
            server = ?result.server_info,
            protocol_version = ?result.protocol_version,
            "Session initialised"
        );
        self.state = SessionState::Ready;
        Ok(self.server.insert(result))
    }

    /// Lists the server's tools.
    ///
    /// # Errors
    ///
    /// Returns an error if the session is not ready or the call fails.
    pub async fn list_tools(&mut self, timeout: Duration) -> Result<Vec<Tool>, CallError> {
        self.ensure_ready("tools/list")?;
        let result: ListToolsResult = self.request("tools/list", json!({}), timeout).await?;
        Ok(result.tools)
    }

    /// Lists the server's resources.
    ///
    /// # Errors
    ///
    /// Returns an error if the session is not ready or the call fails.
    pub async fn list_resources(&mut self, timeout: Duration) -> Result<Vec<Resource>, CallError> {
        self.ensure_ready("resources/list")?;
        let result: ListResourcesResult =
            self.request("resources/list", json!({}), timeout).await?;
        Ok(result.resources)
    }

    /// Invokes a tool.
    ///
    /// # Errors
    ///
    /// Returns [`CallError::ToolFailed`] if the tool ran but flagged its result
    /// as an error, or another error if the call itself failed.
    pub async fn call_tool(
        &mut self,
        name: &str,
        arguments: Map<String, Value>,
        timeout: Duration,
    ) -> Result<CallToolResult, CallError> {
        self.ensure_ready("tools/call")?;

        let params = CallToolParams {
            name: name.to_string(),
            arguments,
        };

        self.state = SessionState::ToolInvoking;
        let result: Result<CallToolResult, CallError> =
            self.request("tools/call", to_params(&params), timeout).await;
        self.state = SessionState::Ready;

        let result = result?;
        if result.is_error {
            return Err(CallError::ToolFailed {
                tool: name.to_string(),
                message: result.text(),
            });
        }
        Ok(result)
    }

    /// Reads a resource.
    ///
    /// # Errors
    ///
    /// Returns an error if the session is not ready or the call fails.
    pub async fn read_resource(
        &mut self,
        uri: &str,
        timeout: Duration,
    ) -> Result<Vec<ResourceContents>, CallError> {
        self.ensure_ready("resources/read")?;

        let params = ReadResourceParams {
            uri: uri.to_string(),
        };

        self.state = SessionState::ResourceReading;
        let result: Result<ReadResourceResult, CallError> =
            self.request("resources/read", to_params(&params), timeout).await;
        self.state = SessionState::Ready;

        Ok(result?.contents)
    }

    /// Ends the session. Later calls are refused.
    pub fn finish(&mut self) {
        self.state = SessionState::Done;
    }

    fn ensure_ready(&self, method: &'static str) -> Result<(), CallError> {
        if self.state == SessionState::Ready {
            Ok(())
        } else {
            Err(CallError::NotReady {
                method,
                state: self.state,
            })
        }
    }

    fn allocate_id(&mut self) -> RequestId {
        let id = RequestId::Number(self.next_id);
        self.next_id += 1;
        id
    }

    async fn request<T: DeserializeOwned>(
        &mut self,
        method: &str,
        params: Value,
        timeout: Duration,
    ) -> Result<T, CallError> {
        let id = self.allocate_id();

        match self.correlator.call(id, method, params, timeout).await? {
            Outcome::Result(result) => {
                serde_json::from_value(result).map_err(|source| CallError::InvalidResult {
                    method: method.to_string(),
                    source,
                })
            }
            Outcome::Error(error) => Err(CallError::Rpc {
                method: method.to_string(),
                error,
            }),
        }
    }
}

fn to_params<T: serde::Serialize>(params: &T) -> Value {
    // Plain structs of strings and JSON values always serialise.
    serde_json::to_value(params).unwrap_or(Value::Null)
}
