//! In-memory peer for exercising the correlator and session without a
//! child process.

use std::sync::{Arc, Mutex};

use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream};
use tokio::task::JoinHandle;

use crate::mcp::process::ExitState;
use crate::mcp::protocol::{Message, Outcome};
use crate::mcp::transport::Peer;

const PIPE_CAPACITY: usize = 64 * 1024;

/// Client side of an in-memory connection.
#[derive(Debug)]
pub(crate) struct DuplexPeer {
    input: Option<DuplexStream>,
    output: Option<DuplexStream>,
    state: Arc<Mutex<ExitState>>,
}

impl DuplexPeer {
    pub(crate) fn close(&mut self) {
        self.input = None;
        self.output = None;
    }
}

impl Peer for DuplexPeer {
    type Input = DuplexStream;
    type Output = DuplexStream;

    fn streams(&mut self) -> Option<(&mut DuplexStream, &mut DuplexStream)> {
        match (self.input.as_mut(), self.output.as_mut()) {
            (Some(input), Some(output)) => Some((input, output)),
            _ => None,
        }
    }

    fn exit_state(&mut self) -> ExitState {
        *self.state.lock().unwrap()
    }
}

/// Server side of an in-memory connection.
#[derive(Debug)]
pub(crate) struct ServerEnd {
    requests: BufReader<DuplexStream>,
    responses: DuplexStream,
    state: Arc<Mutex<ExitState>>,
}

/// Creates a connected client/server pair.
pub(crate) fn connect() -> (DuplexPeer, ServerEnd) {
    let (client_in, server_in) = tokio::io::duplex(PIPE_CAPACITY);
    let (server_out, client_out) = tokio::io::duplex(PIPE_CAPACITY);
    let state = Arc::new(Mutex::new(ExitState::Running));

    let peer = DuplexPeer {
        input: Some(client_in),
        output: Some(client_out),
        state: Arc::clone(&state),
    };
    let server = ServerEnd {
        requests: BufReader::new(server_in),
        responses: server_out,
        state,
    };
    (peer, server)
}

impl ServerEnd {
    /// Writes raw bytes to the client.
    pub(crate) async fn send_raw(&mut self, bytes: &[u8]) {
        self.responses.write_all(bytes).await.unwrap();
    }

    /// Writes a success response.
    pub(crate) async fn reply(&mut self, id: i64, result: Value) {
        self.send_message(&Message::result(id, result)).await;
    }

    pub(crate) async fn send_message(&mut self, message: &Message) {
        let mut line = serde_json::to_vec(message).unwrap();
        line.push(b'\n');
        self.send_raw(&line).await;
    }

    /// Reads the next message the client sent, or `None` at end of stream.
    pub(crate) async fn next_message(&mut self) -> Option<Message> {
        let mut line = String::new();
        if self.requests.read_line(&mut line).await.unwrap() == 0 {
            return None;
        }
        Some(Message::parse(line.trim()).unwrap())
    }

    /// Simulates the process exiting with `code`.
    pub(crate) fn exit(self, code: i32) {
        *self.state.lock().unwrap() = ExitState::Exited(Some(code));
    }
}

/// Runs a scripted server until the client closes its input.
///
/// `handler` maps each request to its outcome, or `None` to stay silent.
/// The task resolves to the methods received, in order.
pub(crate) fn spawn_server<F>(mut end: ServerEnd, mut handler: F) -> JoinHandle<Vec<String>>
where
    F: FnMut(&str, Option<&Value>) -> Option<Outcome> + Send + 'static,
{
    tokio::spawn(async move {
        let mut seen = Vec::new();
        while let Some(message) = end.next_message().await {
            match message {
                Message::Request(req) => {
                    seen.push(req.method.clone());
                    if let Some(outcome) = handler(&req.method, req.params.as_ref()) {
                        let response = match outcome {
                            Outcome::Result(result) => Message::result(req.id, result),
                            Outcome::Error(error) => Message::error(req.id, error),
                        };
                        end.send_message(&response).await;
                    }
                }
                Message::Notification(notif) => seen.push(notif.method),
                Message::Response(_) => {}
            }
        }
        seen
    })
}

/// A well-behaved server for the default probe sequence.
pub(crate) fn standard_handler(method: &str, params: Option<&Value>) -> Option<Outcome> {
    let result = match method {
        "initialize" => json!({
            "protocolVersion": "2024-11-05",
            "capabilities": {"tools": {}, "resources": {}},
            "serverInfo": {"name": "rosa-mcp", "version": "0.1.0"}
        }),
        "tools/list" => json!({"tools": [
            {"name": "rosa_whoami", "description": "Show the current user", "inputSchema": {"type": "object"}},
            {"name": "rosa_list_clusters", "description": "List clusters", "inputSchema": {"type": "object"}}
        ]}),
        "resources/list" => json!({"resources": [
            {"uri": "rosa://clusters", "name": "clusters", "description": "All clusters"}
        ]}),
        "tools/call" => {
            let name = params
                .and_then(|p| p.get("name"))
                .and_then(Value::as_str)
                .unwrap_or_default();
            json!({"content": [{"type": "text", "text": format!("called {name}")}]})
        }
        "resources/read" => {
            let uri = params
                .and_then(|p| p.get("uri"))
                .and_then(Value::as_str)
                .unwrap_or_default();
            json!({"contents": [
                {"uri": uri, "mimeType": "application/json", "text": "{\"clusters\":[]}"}
            ]})
        }
        _ => return None,
    };
    Some(Outcome::Result(result))
}
