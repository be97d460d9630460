//! Request/response correlation over the server's stdio pipes.
//!
//! Wire format (MCP stdio transport):
//!
//! - Messages are UTF-8 encoded JSON-RPC
//! - Messages are delimited by newlines
//! - Messages must not contain embedded newlines
//! - stdin: receives messages from this client
//! - stdout: carries responses (and possibly unrelated noise)
//! - stderr: diagnostics only, never parsed
//!
//! # Call discipline
//!
//! At most one correlated call is in flight at a time. A call writes its
//! request, then reads records until one answers its identifier. Every other
//! record (late answers to abandoned calls, server notifications, noise) is
//! discarded. A call that times out is simply abandoned; if its response
//! turns up later it is discarded like any other stray record.

use std::io;
use std::time::Duration;

use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::process::{ChildStdin, ChildStdout};
use tokio::time::Instant;

use crate::error::TransportError;
use crate::mcp::framer::{Frame, MessageFramer};
use crate::mcp::process::{ExitState, ProcessSupervisor};
use crate::mcp::protocol::{Message, Outcome, RequestId};

/// Longest single wait before the correlator checks the process again.
pub const POLL_SLICE: Duration = Duration::from_millis(100);

/// The other end of the conversation: a pair of pipes and a liveness probe.
pub trait Peer {
    /// Stream the client writes requests to.
    type Input: AsyncWrite + Unpin;
    /// Stream the client reads responses from.
    type Output: AsyncRead + Unpin;

    /// Returns both pipes, or `None` once they have been closed.
    fn streams(&mut self) -> Option<(&mut Self::Input, &mut Self::Output)>;

    /// Polls whether the peer process is still running.
    fn exit_state(&mut self) -> ExitState;
}

impl Peer for ProcessSupervisor {
    type Input = ChildStdin;
    type Output = ChildStdout;

    fn streams(&mut self) -> Option<(&mut ChildStdin, &mut ChildStdout)> {
        self.pipes()
    }

    fn exit_state(&mut self) -> ExitState {
        self.state()
    }
}

/// Correlation state for the one outstanding request.
#[derive(Debug, Clone)]
pub struct PendingCall {
    id: RequestId,
    method: String,
    timeout: Duration,
    deadline: Instant,
}

impl PendingCall {
    /// Starts tracking a request whose answer is due within `timeout`.
    #[must_use]
    pub fn new(id: RequestId, method: impl Into<String>, timeout: Duration) -> Self {
        Self {
            id,
            method: method.into(),
            timeout,
            deadline: Instant::now() + timeout,
        }
    }

    /// Returns `true` once the deadline has passed.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.deadline
    }

    /// Returns the outcome if `message` answers this call.
    #[must_use]
    pub fn resolve(&self, message: Message) -> Option<Outcome> {
        match message {
            Message::Response(resp) if resp.id == self.id => Some(resp.outcome),
            Message::Response(resp) => {
                tracing::debug!(
                    expected = %self.id,
                    received = %resp.id,
                    "Discarding stray response"
                );
                None
            }
            other => {
                tracing::debug!(
                    method = other.method().unwrap_or_default(),
                    "Ignoring server-initiated message"
                );
                None
            }
        }
    }

    fn timed_out(&self) -> TransportError {
        TransportError::Timeout {
            method: self.method.clone(),
            after: self.timeout,
        }
    }
}

/// Sends requests to a [`Peer`] and waits for the matching responses.
#[derive(Debug)]
pub struct Correlator<P> {
    peer: P,
    framer: MessageFramer,
    poll_slice: Duration,
}

impl<P: Peer> Correlator<P> {
    /// Creates a correlator talking to `peer`.
    #[must_use]
    pub fn new(peer: P) -> Self {
        Self {
            peer,
            framer: MessageFramer::new(),
            poll_slice: POLL_SLICE,
        }
    }

    /// Returns the peer mutably (used for shutdown).
    pub fn peer_mut(&mut self) -> &mut P {
        &mut self.peer
    }

    /// Consumes the correlator and returns the peer.
    pub fn into_inner(self) -> P {
        self.peer
    }

    /// Writes one message followed by a newline and flushes it.
    ///
    /// # Errors
    ///
    /// Returns an error if the message cannot be encoded, the pipes are
    /// closed, or the write fails.
    pub async fn send(&mut self, message: &Message) -> Result<(), TransportError> {
        let mut line = serde_json::to_vec(message).map_err(TransportError::Encode)?;
        debug_assert!(
            !line.contains(&b'\n'),
            "JSON message must not contain embedded newlines"
        );
        line.push(b'\n');

        let (input, _) = self.peer.streams().ok_or(TransportError::Closed)?;
        let written = write_line(input, &line).await;

        written.map_err(|e| self.write_failed(e))
    }

    /// Sends a notification; no response is expected.
    ///
    /// # Errors
    ///
    /// Returns an error if the message cannot be written.
    pub async fn notify(
        &mut self,
        method: &str,
        params: Option<Value>,
    ) -> Result<(), TransportError> {
        tracing::debug!(method, "Sending notification");
        self.send(&Message::notification(method, params)).await
    }

    /// Sends a request and waits up to `timeout` for the response with the
    /// same identifier.
    ///
    /// # Errors
    ///
    /// Returns an error if the request cannot be written, no matching
    /// response arrives in time, or the process exits first.
    pub async fn call(
        &mut self,
        id: RequestId,
        method: &str,
        params: Value,
        timeout: Duration,
    ) -> Result<Outcome, TransportError> {
        let pending = PendingCall::new(id.clone(), method, timeout);

        tracing::debug!(id = %id, method, timeout = ?timeout, "Sending request");
        self.send(&Message::request(id, method, params)).await?;

        loop {
            let slice_end = pending.deadline.min(Instant::now() + self.poll_slice);
            let (_, output) = self.peer.streams().ok_or(TransportError::Closed)?;

            match self.framer.next_record(output, slice_end).await? {
                Frame::Record(message) => {
                    if let Some(outcome) = pending.resolve(message) {
                        tracing::debug!(id = %pending.id, method, "Received response");
                        return Ok(outcome);
                    }
                    if pending.is_expired() {
                        return Err(pending.timed_out());
                    }
                }
                Frame::Timeout => {
                    let status = self.peer.exit_state();
                    if !status.is_running() {
                        return Err(TransportError::ProcessExited { status });
                    }
                    if pending.is_expired() {
                        return Err(pending.timed_out());
                    }
                }
                Frame::Closed => return Err(self.await_exit(&pending).await),
            }
        }
    }

    /// Output closed: wait for the process to exit so the error can carry
    /// its status.
    async fn await_exit(&mut self, pending: &PendingCall) -> TransportError {
        loop {
            let status = self.peer.exit_state();
            if !status.is_running() {
                return TransportError::ProcessExited { status };
            }

            let now = Instant::now();
            if now >= pending.deadline {
                return TransportError::StreamClosed;
            }
            tokio::time::sleep_until(pending.deadline.min(now + self.poll_slice)).await;
        }
    }

    fn write_failed(&mut self, error: io::Error) -> TransportError {
        let status = self.peer.exit_state();
        if status.is_running() {
            TransportError::Io(error)
        } else {
            TransportError::ProcessExited { status }
        }
    }
}

async fn write_line<W: AsyncWrite + Unpin>(writer: &mut W, line: &[u8]) -> io::Result<()> {
    writer.write_all(line).await?;
    writer.flush().await
}
