//! mcp-probe: diagnostic client for MCP servers speaking the stdio transport
//!
//! This library starts an MCP server as a child process, talks JSON-RPC 2.0
//! to it over its standard input and output, and reports whether it handles
//! the basic protocol correctly.
//!
//! # Architecture
//!
//! - **Process supervision**: spawn, liveness, terminate-then-kill shutdown
//! - **Framing**: newline-delimited records from an arbitrarily chunked stream
//! - **Correlation**: one request at a time, answered by matching identifier
//! - **Session**: handshake, discovery, tool invocation, resource reads
//!
//! # Modules
//!
//! - [`config`]: Configuration loading and validation
//! - [`error`]: Error types
//! - [`mcp`]: MCP client implementation
//! - [`probe`]: The probe run and its preflight checks
//! - [`report`]: Operator-facing output

pub mod config;
pub mod error;
pub mod mcp;
pub mod probe;
pub mod report;
