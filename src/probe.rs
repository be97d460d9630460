//! Top-level probe run.
//!
//! A run goes through these steps, and the server is shut down on every
//! path once it has been started:
//!
//! 1. **Preflight**: required external tools are present
//! 2. **Startup**: spawn the server and give it time to fail
//! 3. **Sequence**: handshake, discovery, tool call, resource read
//! 4. **Shutdown**: terminate, wait, kill if needed
//!
//! SIGINT/SIGTERM (Ctrl+C on Windows) interrupts steps 1 to 3. Whatever is in
//! flight is dropped, and a started server goes straight to shutdown.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;

use crate::config::{Config, ServerConfig, ToolRequirement};
use crate::error::{CallError, ProbeError};
use crate::mcp::process::ProcessSupervisor;
use crate::mcp::session::ProtocolSession;
use crate::mcp::transport::Peer;
use crate::report::Reporter;

/// Time allowed for each preflight command.
pub const PREFLIGHT_TIMEOUT: Duration = Duration::from_secs(5);

/// What happened during a run that reached the call sequence.
#[derive(Debug, Default)]
pub struct RunSummary {
    /// Non-fatal call failures, in order.
    pub failures: Vec<String>,
    /// Whether the run was cut short by an interrupt.
    pub interrupted: bool,
}

impl RunSummary {
    fn interrupted() -> Self {
        Self {
            interrupted: true,
            ..Self::default()
        }
    }

    fn record<W: Write>(
        &mut self,
        reporter: &mut Reporter<W>,
        context: &str,
        error: &CallError,
    ) -> std::io::Result<()> {
        tracing::warn!(error = %error, "{context}");
        self.failures.push(format!("{context}: {error}"));
        reporter.call_failure(context, error)
    }
}

/// Runs the whole probe against the configured server.
///
/// # Errors
///
/// Returns an error if a required tool is missing, the working directory
/// cannot be determined, the server fails to start, or the handshake fails.
/// Failures of later calls are reported and collected in the summary.
pub async fn run<W: Write>(
    config: &Config,
    reporter: &mut Reporter<W>,
) -> Result<RunSummary, ProbeError> {
    let mut interrupts = Interrupts::install();

    tokio::select! {
        result = check_required_tools(&config.preflight.required_tools) => result?,
        signal = interrupts.recv() => {
            tracing::info!(signal, "Interrupted during preflight");
            return Ok(RunSummary::interrupted());
        }
    }

    let working_dir = resolve_working_dir(&config.server)?;
    let spec = config.server.launch_spec(working_dir);

    match spec.working_dir {
        Some(ref dir) => reporter.line(&format!(
            "Starting MCP server `{}` (from {})...",
            spec.display(),
            dir.display()
        ))?,
        None => reporter.line(&format!("Starting MCP server `{}`...", spec.display()))?,
    }

    let mut supervisor = ProcessSupervisor::start(&spec)?;
    let grace = config.timeouts.shutdown_grace();

    let settled = tokio::select! {
        result = supervisor.settle(config.timeouts.startup()) => Some(result),
        signal = interrupts.recv() => {
            tracing::info!(signal, "Interrupted during startup");
            None
        }
    };

    match settled {
        Some(Ok(())) => {}
        Some(Err(e)) => {
            let stderr = supervisor.stderr_tail();
            supervisor.shutdown(grace).await;
            reporter.line("Server failed to start")?;
            for line in &stderr {
                reporter.line(line)?;
            }
            return Err(e.into());
        }
        None => {
            supervisor.shutdown(grace).await;
            return Ok(RunSummary::interrupted());
        }
    }

    let mut session = ProtocolSession::new(supervisor, config.session_options());

    let outcome = tokio::select! {
        result = run_sequence(&mut session, config, reporter) => result,
        signal = interrupts.recv() => {
            tracing::info!(signal, "Interrupted, initiating shutdown");
            Ok(RunSummary::interrupted())
        }
    };

    session.finish();
    let stopping = reporter.line("\nStopping server...");
    let status = session.peer_mut().shutdown(grace).await;
    tracing::info!(status = %status, "Server stopped");

    stopping?;
    outcome
}

/// Runs the call sequence on an established connection.
///
/// Only a failed handshake aborts the sequence.
///
/// # Errors
///
/// Returns [`ProbeError::Handshake`] if `initialize` fails, or
/// [`ProbeError::Io`] if the report cannot be written.
pub async fn run_sequence<P: Peer, W: Write>(
    session: &mut ProtocolSession<P>,
    config: &Config,
    reporter: &mut Reporter<W>,
) -> Result<RunSummary, ProbeError> {
    let timeouts = &config.timeouts;
    let mut summary = RunSummary::default();

    reporter.section("Initializing MCP connection")?;
    match session.initialize(timeouts.initialize()).await {
        Ok(info) => reporter.initialized(info)?,
        Err(e) => {
            reporter.call_failure("Failed to get initialize response", &e)?;
            return Err(ProbeError::Handshake(e));
        }
    }

    reporter.section("Querying Tools")?;
    match session.list_tools(timeouts.discovery()).await {
        Ok(tools) => reporter.tools(&tools)?,
        Err(e) => summary.record(reporter, "Failed to get tools/list response", &e)?,
    }

    reporter.section("Querying Resources")?;
    match session.list_resources(timeouts.discovery()).await {
        Ok(resources) => reporter.resources(&resources)?,
        Err(e) => summary.record(reporter, "Failed to get resources/list response", &e)?,
    }

    if let Some(ref tool) = config.probe.tool {
        reporter.section(&format!("Calling {} Tool", tool.name))?;
        match session
            .call_tool(&tool.name, tool.arguments.clone(), timeouts.tool_call())
            .await
        {
            Ok(result) => reporter.tool_output(&tool.name, &result.text())?,
            Err(e) => summary.record(reporter, &format!("Failed to call {}", tool.name), &e)?,
        }
    }

    if let Some(ref resource) = config.probe.resource {
        reporter.section(&format!("Reading {} Resource", resource.uri))?;
        match session
            .read_resource(&resource.uri, timeouts.resource_read())
            .await
        {
            Ok(contents) => reporter.resource_contents(&resource.uri, &contents)?,
            Err(e) => summary.record(
                reporter,
                &format!("Failed to read {} resource", resource.uri),
                &e,
            )?,
        }
    }

    reporter.section("Done")?;
    reporter.flush()?;
    Ok(summary)
}

/// Runs every preflight command and fails on the first one that does not
/// succeed.
///
/// # Errors
///
/// Returns [`ProbeError::MissingTool`] naming the failing command.
pub async fn check_required_tools(tools: &[ToolRequirement]) -> Result<(), ProbeError> {
    for tool in tools {
        let status = Command::new(&tool.command)
            .args(&tool.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .status();

        let reason = match tokio::time::timeout(PREFLIGHT_TIMEOUT, status).await {
            Ok(Ok(status)) if status.success() => {
                tracing::debug!(tool = %tool.command, "Preflight check passed");
                continue;
            }
            Ok(Ok(status)) => format!("check {status}"),
            Ok(Err(e)) => e.to_string(),
            Err(_) => format!("check did not finish within {PREFLIGHT_TIMEOUT:?}"),
        };

        return Err(ProbeError::MissingTool {
            tool: tool.command.clone(),
            reason,
        });
    }
    Ok(())
}

/// Returns the nearest ancestor of `start` (inclusive) containing `marker`.
#[must_use]
pub fn find_root(start: &Path, marker: &str) -> Option<PathBuf> {
    start
        .ancestors()
        .find(|dir| dir.join(marker).exists())
        .map(Path::to_path_buf)
}

/// Determines the server's working directory.
///
/// An explicit `working_dir` wins; otherwise the root marker, if configured,
/// is searched for from the current directory upwards.
///
/// # Errors
///
/// Returns an error if a root marker is configured but not found.
pub fn resolve_working_dir(server: &ServerConfig) -> Result<Option<PathBuf>, ProbeError> {
    if let Some(ref dir) = server.working_dir {
        return Ok(Some(dir.clone()));
    }

    let Some(ref marker) = server.root_marker else {
        return Ok(None);
    };

    let start = std::env::current_dir()?;
    find_root(&start, marker)
        .map(Some)
        .ok_or_else(|| ProbeError::NoWorkingDirectory {
            marker: marker.clone(),
            start,
        })
}

/// Operator interrupt listeners, installed once per run.
struct Interrupts {
    #[cfg(unix)]
    signals: Option<(tokio::signal::unix::Signal, tokio::signal::unix::Signal)>,
}

impl Interrupts {
    #[cfg(unix)]
    fn install() -> Self {
        use tokio::signal::unix::{signal, SignalKind};

        let signals = match (signal(SignalKind::interrupt()), signal(SignalKind::terminate())) {
            (Ok(sigint), Ok(sigterm)) => Some((sigint, sigterm)),
            (Err(e), _) | (_, Err(e)) => {
                tracing::warn!(error = %e, "Failed to install signal handlers");
                None
            }
        };
        Self { signals }
    }

    #[cfg(not(unix))]
    const fn install() -> Self {
        Self {}
    }

    /// Resolves with the signal name once the operator interrupts.
    #[cfg(unix)]
    async fn recv(&mut self) -> &'static str {
        let Some((ref mut sigint, ref mut sigterm)) = self.signals else {
            return std::future::pending().await;
        };

        tokio::select! {
            _ = sigint.recv() => "SIGINT",
            _ = sigterm.recv() => "SIGTERM",
        }
    }

    /// Resolves once the operator presses Ctrl+C.
    #[cfg(not(unix))]
    async fn recv(&mut self) -> &'static str {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "Failed to listen for Ctrl+C");
            return std::future::pending().await;
        }
        "Ctrl+C"
    }
}
