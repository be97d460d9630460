//! Newline framing for the server's stdout.
//!
//! The stdio transport carries one JSON-RPC message per line. The server's
//! output arrives in arbitrary chunks, so bytes are accumulated in a
//! [`FrameBuffer`] until a delimiter shows up. [`MessageFramer`] adds the
//! read side: it pulls whatever is available from the pipe, bounded by a
//! deadline, and hands back the next parsable [`Message`].
//!
//! Servers often print diagnostics on the same stream. Lines that do not
//! parse as JSON-RPC are dropped without surfacing an error.

use std::io;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::time::Instant;

use crate::mcp::protocol::Message;

/// Maximum size of a single undelimited record (16 MiB).
pub const MAX_RECORD_SIZE: usize = 16 * 1024 * 1024;

const READ_CHUNK: usize = 8 * 1024;

/// Bytes read from the server that have not yet been split into records.
///
/// After every extraction the buffer holds at most one partial trailing
/// record.
#[derive(Debug)]
pub struct FrameBuffer {
    pending: Vec<u8>,
    max_record: usize,
    /// Set while skipping the rest of an oversized record.
    discarding: bool,
}

impl FrameBuffer {
    /// Creates an empty buffer with the default record size limit.
    #[must_use]
    pub const fn new() -> Self {
        Self::with_limit(MAX_RECORD_SIZE)
    }

    /// Creates an empty buffer that discards records longer than `max_record`.
    #[must_use]
    pub const fn with_limit(max_record: usize) -> Self {
        Self {
            pending: Vec::new(),
            max_record,
            discarding: false,
        }
    }

    /// Appends raw bytes read from the stream.
    pub fn extend(&mut self, bytes: &[u8]) {
        self.pending.extend_from_slice(bytes);

        if self.pending.len() > self.max_record && !self.pending.contains(&b'\n') {
            tracing::warn!(
                buffered = self.pending.len(),
                limit = self.max_record,
                "Discarding oversized record from server output"
            );
            self.pending.clear();
            self.discarding = true;
        }
    }

    /// Returns the number of buffered bytes not yet delimited.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Removes and returns the next complete, non-empty record.
    ///
    /// Surrounding whitespace is trimmed and blank lines are skipped. Returns
    /// `None` when no delimiter is buffered.
    pub fn next_record(&mut self) -> Option<String> {
        loop {
            let pos = self.pending.iter().position(|&b| b == b'\n')?;
            let line: Vec<u8> = self.pending.drain(..=pos).collect();

            if self.discarding {
                self.discarding = false;
                continue;
            }

            let text = String::from_utf8_lossy(&line);
            let trimmed = text.trim();
            if !trimmed.is_empty() {
                return Some(trimmed.to_string());
            }
        }
    }

    /// Returns a lazy iterator over the complete records currently buffered.
    pub fn records(&mut self) -> Records<'_> {
        Records { buffer: self }
    }

    /// Removes and returns the next record that parses as a JSON-RPC message.
    ///
    /// Records that fail to parse are logged and dropped.
    pub fn next_message(&mut self) -> Option<Message> {
        self.records().find_map(|record| match Message::parse(&record) {
            Ok(message) => Some(message),
            Err(e) => {
                tracing::trace!(error = %e, record = %record, "Ignoring non-JSON-RPC output");
                None
            }
        })
    }
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// Iterator returned by [`FrameBuffer::records`].
#[derive(Debug)]
pub struct Records<'a> {
    buffer: &'a mut FrameBuffer,
}

impl Iterator for Records<'_> {
    type Item = String;

    fn next(&mut self) -> Option<Self::Item> {
        self.buffer.next_record()
    }
}

/// What [`MessageFramer::next_record`] produced.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// A complete message.
    Record(Message),
    /// The deadline passed before a complete message was available.
    Timeout,
    /// The stream reached end of file and no complete message is buffered.
    Closed,
}

/// Pull-based reader of newline-delimited messages.
///
/// The framer does not own the stream; callers pass the reader on every call
/// so the pipe stays with whoever owns the process.
#[derive(Debug, Default)]
pub struct MessageFramer {
    buffer: FrameBuffer,
    eof: bool,
}

impl MessageFramer {
    /// Creates a framer with an empty buffer.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            buffer: FrameBuffer::new(),
            eof: false,
        }
    }

    /// Returns `true` once the stream has reported end of file.
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        self.eof
    }

    /// Returns the next message, reading from `reader` until `deadline`.
    ///
    /// Buffered messages are returned before any read is attempted. A trailing
    /// partial record is kept until its delimiter arrives, and is never
    /// returned if the stream closes first.
    ///
    /// # Errors
    ///
    /// Returns an error if reading from the stream fails.
    pub async fn next_record<R>(&mut self, reader: &mut R, deadline: Instant) -> io::Result<Frame>
    where
        R: AsyncRead + Unpin,
    {
        let mut chunk = [0u8; READ_CHUNK];

        loop {
            if let Some(message) = self.buffer.next_message() {
                return Ok(Frame::Record(message));
            }

            if self.eof {
                return Ok(Frame::Closed);
            }

            match tokio::time::timeout_at(deadline, reader.read(&mut chunk)).await {
                Err(_elapsed) => return Ok(Frame::Timeout),
                Ok(Ok(0)) => {
                    if self.buffer.pending_len() > 0 {
                        tracing::debug!(
                            bytes = self.buffer.pending_len(),
                            "Server output closed with an unterminated record"
                        );
                    }
                    self.eof = true;
                }
                Ok(Ok(n)) => self.buffer.extend(&chunk[..n]),
                Ok(Err(e)) if e.kind() == io::ErrorKind::Interrupted => {}
                Ok(Err(e)) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;
    use tokio_test::io::Builder;

    use super::*;

    const STREAM: &[u8] = b"{\"jsonrpc\":\"2.0\",\"id\":1,\"result\":{\"ok\":true}}\n\
        {\"jsonrpc\":\"2.0\",\"method\":\"notifications/message\",\"params\":{\"level\":\"info\"}}\n\
        {\"jsonrpc\":\"2.0\",\"id\":2,\"result\":{\"tools\":[]}}\n";

    fn expected() -> Vec<Message> {
        vec![
            Message::result(1, json!({"ok": true})),
            Message::notification("notifications/message", Some(json!({"level": "info"}))),
            Message::result(2, json!({"tools": []})),
        ]
    }

    fn far_deadline() -> Instant {
        Instant::now() + Duration::from_secs(5)
    }

    #[test]
    fn every_chunk_size_yields_the_same_records() {
        for size in 1..=STREAM.len() {
            let mut buffer = FrameBuffer::new();
            let mut messages = Vec::new();

            for chunk in STREAM.chunks(size) {
                buffer.extend(chunk);
                while let Some(message) = buffer.next_message() {
                    messages.push(message);
                }
                assert!(!buffer.pending.contains(&b'\n'));
            }

            assert_eq!(messages, expected(), "chunk size {size}");
            assert_eq!(buffer.pending_len(), 0);
        }
    }

    #[test]
    fn partial_record_is_retained_until_completed() {
        let mut buffer = FrameBuffer::new();
        buffer.extend(b"{\"jsonrpc\":\"2.0\",\"id\":1,");
        assert!(buffer.next_record().is_none());
        assert_eq!(buffer.pending_len(), b"{\"jsonrpc\":\"2.0\",\"id\":1,".len());

        buffer.extend(b"\"result\":{}}\n{\"jsonrpc\"");
        assert_eq!(
            buffer.next_record().as_deref(),
            Some(r#"{"jsonrpc":"2.0","id":1,"result":{}}"#)
        );
        assert!(buffer.next_record().is_none());
        assert_eq!(buffer.pending_len(), b"{\"jsonrpc\"".len());
    }

    #[test]
    fn blank_lines_and_whitespace_are_skipped() {
        let mut buffer = FrameBuffer::new();
        buffer.extend(b"\n\r\n   \n  first  \r\n\nsecond\n");
        let records: Vec<String> = buffer.records().collect();
        assert_eq!(records, vec!["first".to_string(), "second".to_string()]);
    }

    #[test]
    fn noise_between_messages_is_dropped() {
        let mut buffer = FrameBuffer::new();
        buffer.extend(b"INFO starting server\n{not json\n");
        buffer.extend(b"{\"jsonrpc\":\"2.0\",\"id\":4,\"result\":{}}\n");
        assert_eq!(buffer.next_message(), Some(Message::result(4, json!({}))));
        assert!(buffer.next_message().is_none());
    }

    #[test]
    fn oversized_record_is_discarded_up_to_its_delimiter() {
        let mut buffer = FrameBuffer::with_limit(16);
        buffer.extend(b"0123456789abcdefXYZ");
        assert_eq!(buffer.pending_len(), 0);
        buffer.extend(b"tail of the big one\nok\n");
        assert_eq!(buffer.next_record().as_deref(), Some("ok"));
    }

    #[test]
    fn invalid_utf8_is_replaced() {
        let mut buffer = FrameBuffer::new();
        buffer.extend(b"caf\xff\n");
        assert_eq!(buffer.next_record().as_deref(), Some("caf\u{fffd}"));
    }

    #[tokio::test]
    async fn record_split_mid_string_across_reads() {
        let mut reader = Builder::new()
            .read(b"{\"jsonrpc\":\"2.0\",\"id\":1,\"result\":{\"o")
            .read(b"k\":true}}\n")
            .build();
        let mut framer = MessageFramer::new();

        let frame = framer.next_record(&mut reader, far_deadline()).await.unwrap();
        assert_eq!(frame, Frame::Record(Message::result(1, json!({"ok": true}))));
        assert_eq!(
            framer.next_record(&mut reader, far_deadline()).await.unwrap(),
            Frame::Closed
        );
    }

    #[tokio::test]
    async fn every_two_way_split_yields_the_same_records() {
        for split in 1..STREAM.len() {
            let mut reader = Builder::new()
                .read(&STREAM[..split])
                .read(&STREAM[split..])
                .build();
            let mut framer = MessageFramer::new();
            let mut messages = Vec::new();

            loop {
                match framer.next_record(&mut reader, far_deadline()).await.unwrap() {
                    Frame::Record(message) => messages.push(message),
                    Frame::Closed => break,
                    Frame::Timeout => panic!("unexpected timeout at split {split}"),
                }
            }

            assert_eq!(messages, expected(), "split at {split}");
        }
    }

    #[tokio::test]
    async fn trailing_partial_record_is_not_emitted_on_close() {
        let mut reader = Builder::new()
            .read(b"{\"jsonrpc\":\"2.0\",\"id\":1,\"result\":{}}\n{\"jsonrpc\":\"2.0\",\"id\":2")
            .build();
        let mut framer = MessageFramer::new();

        assert_eq!(
            framer.next_record(&mut reader, far_deadline()).await.unwrap(),
            Frame::Record(Message::result(1, json!({})))
        );
        assert_eq!(
            framer.next_record(&mut reader, far_deadline()).await.unwrap(),
            Frame::Closed
        );
        assert!(framer.is_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn silent_stream_times_out_at_deadline() {
        let (_server, mut client) = tokio::io::duplex(64);
        let mut framer = MessageFramer::new();
        let start = Instant::now();

        let frame = framer
            .next_record(&mut client, start + Duration::from_millis(250))
            .await
            .unwrap();

        assert_eq!(frame, Frame::Timeout);
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(250));
        assert!(elapsed < Duration::from_millis(300));
    }
}
