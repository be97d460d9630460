//! Operator-facing report.
//!
//! Progress and results go to stdout as plain text; logs go to stderr through
//! `tracing`, so the two never interleave on the same stream.

use std::io::{self, Write};

use crate::error::CallError;
use crate::mcp::types::{InitializeResult, Resource, ResourceContents, Tool};

/// How a resource body is displayed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderedText<'a> {
    /// The body parsed as JSON and was pretty-printed.
    Json(String),
    /// The body is shown as-is.
    Raw(&'a str),
}

/// Pretty-prints `text` if it is JSON, otherwise returns it unchanged.
#[must_use]
pub fn render_text(text: &str) -> RenderedText<'_> {
    serde_json::from_str::<serde_json::Value>(text)
        .ok()
        .and_then(|value| serde_json::to_string_pretty(&value).ok())
        .map_or(RenderedText::Raw(text), RenderedText::Json)
}

/// Writes the probe report.
#[derive(Debug)]
pub struct Reporter<W> {
    out: W,
}

impl<W: Write> Reporter<W> {
    /// Creates a reporter writing to `out`.
    pub const fn new(out: W) -> Self {
        Self { out }
    }

    /// Consumes the reporter and returns the sink.
    pub fn into_inner(self) -> W {
        self.out
    }

    /// Writes a plain line.
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails.
    pub fn line(&mut self, text: &str) -> io::Result<()> {
        writeln!(self.out, "{text}")
    }

    /// Starts a section.
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails.
    pub fn section(&mut self, title: &str) -> io::Result<()> {
        writeln!(self.out, "\n=== {title} ===")
    }

    /// Reports a success.
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails.
    pub fn success(&mut self, text: &str) -> io::Result<()> {
        writeln!(self.out, "✓ {text}")
    }

    /// Reports a failure with its cause chain.
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails.
    pub fn failure(&mut self, context: &str, error: &dyn std::error::Error) -> io::Result<()> {
        write!(self.out, "✗ {context}: {error}")?;
        let mut source = error.source();
        while let Some(cause) = source {
            write!(self.out, ": {cause}")?;
            source = cause.source();
        }
        writeln!(self.out)
    }

    /// Reports a failed call, including structured error details.
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails.
    pub fn call_failure(&mut self, context: &str, error: &CallError) -> io::Result<()> {
        match error {
            CallError::Rpc { method, error } => {
                writeln!(self.out, "✗ {context}: {method} failed:")?;
                let details = serde_json::to_string_pretty(error)
                    .unwrap_or_else(|_| error.to_string());
                writeln!(self.out, "{details}")
            }
            CallError::ToolFailed { tool, message } => {
                writeln!(self.out, "✗ {tool} returned an error:")?;
                writeln!(self.out, "{message}")
            }
            other => self.failure(context, other),
        }
    }

    /// Reports the handshake result.
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails.
    pub fn initialized(&mut self, info: &InitializeResult) -> io::Result<()> {
        self.success("Initialized")?;
        if let Some(ref server) = info.server_info {
            writeln!(self.out, "  Server: {} {}", server.name, server.version)?;
        }
        if let Some(ref version) = info.protocol_version {
            writeln!(self.out, "  Protocol: {version}")?;
        }
        Ok(())
    }

    /// Reports the tools found by discovery.
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails.
    pub fn tools(&mut self, tools: &[Tool]) -> io::Result<()> {
        self.success(&format!("Found {} tools\n", tools.len()))?;
        for tool in tools {
            let description = tool.description.as_deref().unwrap_or("No description");
            writeln!(self.out, "  • {}: {description}", tool.name)?;
        }
        Ok(())
    }

    /// Reports the resources found by discovery.
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails.
    pub fn resources(&mut self, resources: &[Resource]) -> io::Result<()> {
        self.success(&format!("Found {} resources\n", resources.len()))?;
        for resource in resources {
            let name = resource.name.as_deref().unwrap_or("No name");
            let description = resource.description.as_deref().unwrap_or("No description");
            writeln!(self.out, "  • {}: {name} - {description}", resource.uri)?;
        }
        Ok(())
    }

    /// Reports the text output of a successful tool call.
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails.
    pub fn tool_output(&mut self, tool: &str, text: &str) -> io::Result<()> {
        self.success(&format!("{tool} executed successfully\n"))?;
        if !text.is_empty() {
            writeln!(self.out, "{text}")?;
        }
        Ok(())
    }

    /// Reports the contents of a resource read.
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails.
    pub fn resource_contents(&mut self, uri: &str, contents: &[ResourceContents]) -> io::Result<()> {
        self.success(&format!(
            "Successfully read {uri} resource ({} content items)\n",
            contents.len()
        ))?;

        for item in contents {
            writeln!(self.out, "  URI: {}", item.uri)?;
            writeln!(
                self.out,
                "  MIME Type: {}",
                item.mime_type.as_deref().unwrap_or("Unknown")
            )?;
            match item.text.as_deref() {
                Some(text) if !text.is_empty() => match render_text(text) {
                    RenderedText::Json(pretty) => {
                        writeln!(self.out, "  Content (formatted):")?;
                        writeln!(self.out, "{pretty}")?;
                    }
                    RenderedText::Raw(raw) => writeln!(self.out, "  Content:\n{raw}")?,
                },
                _ => {
                    if let Some(ref blob) = item.blob {
                        writeln!(self.out, "  Content: <{} bytes of base64>", blob.len())?;
                    }
                }
            }
            writeln!(self.out)?;
        }
        Ok(())
    }

    /// Flushes the sink.
    ///
    /// # Errors
    ///
    /// Returns an error if flushing fails.
    pub fn flush(&mut self) -> io::Result<()> {
        self.out.flush()
    }
}
