//! Model Context Protocol (MCP) client over stdio.
//!
//! This module drives an MCP server running as a child process. Requests are
//! written to the child's stdin and responses read back from its stdout as
//! newline-delimited JSON-RPC 2.0 messages.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       ProtocolSession                       │
//! │          (handshake, discovery, tool call, resource)        │
//! │                              │                              │
//! │                              ▼                              │
//! │   ┌─────────────┐    ┌─────────────┐    ┌─────────────┐     │
//! │   │   Framer    │◀───│ Correlator  │───▶│  Supervisor │     │
//! │   │ (lines→msg) │    │ (id match)  │    │  (process)  │     │
//! │   └─────────────┘    └─────────────┘    └─────────────┘     │
//! │          ▲                                     │            │
//! │          └──────────── child stdout ◀──────────┘            │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Protocol Version
//!
//! The client requests MCP protocol version 2024-11-05 by default.

pub mod framer;
pub mod process;
pub mod protocol;
pub mod session;
pub mod transport;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use framer::{Frame, FrameBuffer, MessageFramer};
pub use process::{ExitState, LaunchSpec, ProcessSupervisor};
pub use protocol::{ErrorObject, Message, Outcome, RequestId, MCP_PROTOCOL_VERSION};
pub use session::{ProtocolSession, SessionOptions, SessionState};
pub use transport::{Correlator, PendingCall, Peer};
