//! Error types for mcp-probe.
//!
//! The taxonomy mirrors how failures are reported to the operator:
//!
//! - [`StartupError`]: the server under test never became usable (fatal)
//! - [`TransportError`]: a correlated call timed out or the child went away
//! - [`CallError`]: everything a single protocol call can fail with, including
//!   structured JSON-RPC errors and tools that ran but reported failure
//! - [`ProbeError`]: fatal conditions that end the whole run with exit code 1
//!
//! Lines on the server's stdout that are not JSON-RPC are not errors at all;
//! the framer drops them.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::mcp::process::ExitState;
use crate::mcp::protocol::ErrorObject;
use crate::mcp::session::SessionState;

/// Errors that can occur during configuration operations.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Configuration file could not be read.
    #[error("failed to read configuration file: {path}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Configuration file could not be parsed.
    #[error("failed to parse configuration file: {path}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// Configuration file not found.
    #[error("configuration file not found: {path}")]
    NotFound {
        /// Path where the configuration file was expected.
        path: PathBuf,
    },

    /// Configuration validation failed.
    #[error("configuration validation failed: {message}")]
    ValidationError {
        /// Description of the validation failure.
        message: String,
    },
}

/// The server process could not be brought up.
#[derive(Error, Debug)]
pub enum StartupError {
    /// The executable could not be spawned.
    #[error("failed to start `{command}`")]
    Spawn {
        /// The command that was launched.
        command: String,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// A standard stream was not captured as a pipe.
    #[error("child {0} was not captured")]
    MissingPipe(&'static str),

    /// The process exited before the handshake could complete.
    #[error("server {status} before completing the handshake")]
    ExitedEarly {
        /// How the process ended.
        status: ExitState,
        /// Last lines the process wrote to stderr.
        stderr: Vec<String>,
    },
}

/// A correlated call could not be completed at the transport level.
#[derive(Error, Debug)]
pub enum TransportError {
    /// No matching response arrived before the deadline.
    #[error("timeout waiting for `{method}` response after {after:?}")]
    Timeout {
        /// Method of the abandoned request.
        method: String,
        /// The timeout that elapsed.
        after: Duration,
    },

    /// The child process exited while a call was in flight.
    #[error("process {status}")]
    ProcessExited {
        /// How the process ended.
        status: ExitState,
    },

    /// The child's stdout reached end of file while it was still running.
    #[error("server output stream closed")]
    StreamClosed,

    /// The transport has been shut down.
    #[error("transport closed")]
    Closed,

    /// Reading or writing a pipe failed.
    #[error("pipe I/O failed")]
    Io(#[from] std::io::Error),

    /// The outgoing message could not be encoded.
    #[error("failed to encode message")]
    Encode(#[source] serde_json::Error),
}

/// Failure of a single protocol call.
#[derive(Error, Debug)]
pub enum CallError {
    /// Transport-level failure (timeout, process exit, pipe error).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The server answered with a JSON-RPC error object.
    #[error("`{method}` failed: {error}")]
    Rpc {
        /// Method of the rejected request.
        method: String,
        /// The error returned by the server.
        error: ErrorObject,
    },

    /// The tool ran but flagged its own result as an error.
    #[error("tool `{tool}` reported an error: {message}")]
    ToolFailed {
        /// Name of the tool.
        tool: String,
        /// Text content the tool returned.
        message: String,
    },

    /// The result payload did not have the expected shape.
    #[error("`{method}` returned an unexpected result")]
    InvalidResult {
        /// Method whose result failed to decode.
        method: String,
        /// The decoding error.
        #[source]
        source: serde_json::Error,
    },

    /// The call is not allowed in the current session state.
    #[error("`{method}` is not allowed while the session is {state:?}")]
    NotReady {
        /// Method that was refused.
        method: &'static str,
        /// State of the session at the time.
        state: SessionState,
    },
}

/// Fatal errors that end a probe run.
#[derive(Error, Debug)]
pub enum ProbeError {
    /// Configuration could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A required external tool is unavailable.
    #[error("required tool `{tool}` is not available: {reason}")]
    MissingTool {
        /// The command that was checked.
        tool: String,
        /// Why the check failed.
        reason: String,
    },

    /// No directory containing the root marker was found.
    #[error("could not find a directory containing `{marker}` above {start}")]
    NoWorkingDirectory {
        /// Marker file that was searched for.
        marker: String,
        /// Directory the search started from.
        start: PathBuf,
    },

    /// The server could not be started.
    #[error(transparent)]
    Startup(#[from] StartupError),

    /// The initialize handshake failed.
    #[error("handshake failed")]
    Handshake(#[source] CallError),

    /// Writing the report failed.
    #[error("failed to write report")]
    Io(#[from] std::io::Error),
}
