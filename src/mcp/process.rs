//! Lifecycle of the server process under test.
//!
//! [`ProcessSupervisor`] is the only owner of the child process. It spawns the
//! server with piped standard streams, lends the pipes to the correlator, and
//! tears the process down with a terminate-then-kill sequence that always
//! reaps it.
//!
//! The child is spawned with `kill_on_drop`, so dropping the supervisor on an
//! unexpected path still kills the process.

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::task::JoinHandle;

use crate::error::StartupError;

/// Number of stderr lines kept for diagnostics.
pub const STDERR_TAIL_LINES: usize = 64;

/// Exit state of the process under test.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitState {
    /// The process has not exited yet.
    Running,
    /// The process exited on its own; `None` if it was ended by a signal.
    Exited(Option<i32>),
    /// The process was forcibly killed by the supervisor.
    Killed,
}

impl ExitState {
    /// Returns `true` while the process is still running.
    #[must_use]
    pub const fn is_running(self) -> bool {
        matches!(self, Self::Running)
    }
}

impl std::fmt::Display for ExitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Running => write!(f, "is running"),
            Self::Exited(Some(code)) => write!(f, "exited with code {code}"),
            Self::Exited(None) => write!(f, "was terminated by a signal"),
            Self::Killed => write!(f, "was killed"),
        }
    }
}

/// How to launch the server under test.
#[derive(Debug, Clone, Default)]
pub struct LaunchSpec {
    /// Executable name or path.
    pub program: String,
    /// Arguments passed to the executable.
    pub args: Vec<String>,
    /// Working directory; inherits the current one when `None`.
    pub working_dir: Option<PathBuf>,
    /// Extra environment variables.
    pub env: HashMap<String, String>,
}

impl LaunchSpec {
    /// Creates a launch spec for `program` with `args`.
    #[must_use]
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            working_dir: None,
            env: HashMap::new(),
        }
    }

    /// Sets the working directory.
    #[must_use]
    pub fn working_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.working_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    /// Returns the command line as a single string for display.
    #[must_use]
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Bounded tail of the child's stderr, shared with the draining task.
#[derive(Debug, Clone, Default)]
struct StderrTail(Arc<Mutex<VecDeque<String>>>);

impl StderrTail {
    fn push(&self, line: String) {
        let mut lines = match self.0.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if lines.len() == STDERR_TAIL_LINES {
            lines.pop_front();
        }
        lines.push_back(line);
    }

    fn snapshot(&self) -> Vec<String> {
        let lines = match self.0.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        lines.iter().cloned().collect()
    }
}

/// Owner of the server process and its pipes.
#[derive(Debug)]
pub struct ProcessSupervisor {
    command: String,
    child: Child,
    stdin: Option<ChildStdin>,
    stdout: Option<ChildStdout>,
    stderr_tail: StderrTail,
    stderr_task: Option<JoinHandle<()>>,
    state: ExitState,
}

impl ProcessSupervisor {
    /// Spawns the server with piped stdin, stdout and stderr.
    ///
    /// # Errors
    ///
    /// Returns an error if the process cannot be spawned or a pipe is missing.
    pub fn start(spec: &LaunchSpec) -> Result<Self, StartupError> {
        let command = spec.display();

        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args)
            .envs(&spec.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(ref dir) = spec.working_dir {
            cmd.current_dir(dir);
        }

        let mut child = cmd.spawn().map_err(|source| StartupError::Spawn {
            command: command.clone(),
            source,
        })?;

        let stdin = child.stdin.take().ok_or(StartupError::MissingPipe("stdin"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or(StartupError::MissingPipe("stdout"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or(StartupError::MissingPipe("stderr"))?;

        let stderr_tail = StderrTail::default();
        let stderr_task = tokio::spawn(drain_stderr(stderr, stderr_tail.clone()));

        tracing::info!(command = %command, pid = ?child.id(), "Server process started");

        Ok(Self {
            command,
            child,
            stdin: Some(stdin),
            stdout: Some(stdout),
            stderr_tail,
            stderr_task: Some(stderr_task),
            state: ExitState::Running,
        })
    }

    /// Polls the process without blocking and returns its exit state.
    pub fn state(&mut self) -> ExitState {
        if self.state.is_running() {
            match self.child.try_wait() {
                Ok(Some(status)) => {
                    tracing::debug!(status = %status, "Server process exited");
                    self.state = ExitState::Exited(status.code());
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to poll server process");
                    self.state = ExitState::Exited(None);
                }
            }
        }
        self.state
    }

    /// Returns `true` while the process is running.
    pub fn is_alive(&mut self) -> bool {
        self.state().is_running()
    }

    /// Returns the exit code, if the process exited with one.
    pub fn exit_code(&mut self) -> Option<i32> {
        match self.state() {
            ExitState::Exited(code) => code,
            ExitState::Running | ExitState::Killed => None,
        }
    }

    /// Returns the pipes used to talk to the server.
    ///
    /// Returns `None` once the supervisor has shut the process down.
    pub fn pipes(&mut self) -> Option<(&mut ChildStdin, &mut ChildStdout)> {
        match (self.stdin.as_mut(), self.stdout.as_mut()) {
            (Some(stdin), Some(stdout)) => Some((stdin, stdout)),
            _ => None,
        }
    }

    /// Returns the most recent lines the process wrote to stderr.
    #[must_use]
    pub fn stderr_tail(&self) -> Vec<String> {
        self.stderr_tail.snapshot()
    }

    /// Waits `delay`, then fails if the process has already exited.
    ///
    /// Gives a server that dies on startup time to do so, so the failure is
    /// reported with its stderr instead of as a handshake timeout.
    ///
    /// # Errors
    ///
    /// Returns [`StartupError::ExitedEarly`] if the process is no longer running.
    pub async fn settle(&mut self, delay: Duration) -> Result<(), StartupError> {
        tokio::time::sleep(delay).await;

        let status = self.state();
        if status.is_running() {
            return Ok(());
        }

        // Let the stderr task finish so the tail is complete.
        if let Some(task) = self.stderr_task.take() {
            match tokio::time::timeout(Duration::from_millis(500), task).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::debug!(error = %e, "Stderr reader task failed"),
                Err(_) => tracing::debug!("Stderr reader still running, tail may be incomplete"),
            }
        }

        Err(StartupError::ExitedEarly {
            status,
            stderr: self.stderr_tail(),
        })
    }

    /// Stops the process and reaps it.
    ///
    /// Closes stdin, asks the process to terminate, waits up to `grace`, then
    /// kills it if it is still running. Safe to call repeatedly and after the
    /// process has exited on its own; later calls return the recorded state.
    pub async fn shutdown(&mut self, grace: Duration) -> ExitState {
        self.stdin.take();
        self.stdout.take();

        if self.state().is_running() {
            self.request_termination();

            match tokio::time::timeout(grace, self.child.wait()).await {
                Ok(Ok(status)) => {
                    tracing::info!(command = %self.command, status = %status, "Server exited gracefully");
                    self.state = ExitState::Exited(status.code());
                }
                Ok(Err(e)) => {
                    tracing::warn!(command = %self.command, error = %e, "Error waiting for server to exit");
                    self.force_kill().await;
                }
                Err(_) => {
                    tracing::warn!(
                        command = %self.command,
                        grace = ?grace,
                        "Server did not exit within grace period, killing"
                    );
                    self.force_kill().await;
                }
            }
        }

        if let Some(task) = self.stderr_task.take() {
            task.abort();
        }

        self.state
    }

    async fn force_kill(&mut self) {
        // `kill` also waits for the process, so it cannot linger as a zombie.
        match self.child.kill().await {
            Ok(()) => self.state = ExitState::Killed,
            Err(e) => {
                tracing::warn!(command = %self.command, error = %e, "Failed to kill server");
                if let Ok(status) = self.child.wait().await {
                    self.state = ExitState::Exited(status.code());
                }
            }
        }
    }

    #[cfg(unix)]
    fn request_termination(&mut self) {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        let Some(pid) = self.child.id().and_then(|pid| i32::try_from(pid).ok()) else {
            return;
        };

        tracing::debug!(pid, "Sending SIGTERM to server");
        if let Err(e) = kill(Pid::from_raw(pid), Signal::SIGTERM) {
            tracing::warn!(pid, error = %e, "SIGTERM failed");
        }
    }

    #[cfg(not(unix))]
    fn request_termination(&mut self) {
        if let Err(e) = self.child.start_kill() {
            tracing::warn!(error = %e, "Failed to terminate server");
        }
    }
}

/// Reads stderr until end of file.
///
/// The pipe must stay open for the life of the child, otherwise its next
/// write to stderr fails with `SIGPIPE`. Lines are decoded lossily.
async fn drain_stderr(stderr: ChildStderr, tail: StderrTail) {
    let mut reader = BufReader::new(stderr);
    let mut buf = Vec::new();

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let line = stderr_line(&buf);
                tracing::debug!(target: "server_stderr", "{line}");
                tail.push(line);
            }
            Err(e) => {
                tracing::debug!(error = %e, "Stopped reading server stderr");
                break;
            }
        }
    }
}

fn stderr_line(raw: &[u8]) -> String {
    let line = raw.strip_suffix(b"\n").unwrap_or(raw);
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    String::from_utf8_lossy(line).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn launch_spec_display() {
        let spec = LaunchSpec::new("go", ["run", "./cmd/rosa", "mcp", "serve"]);
        assert_eq!(spec.display(), "go run ./cmd/rosa mcp serve");
        assert!(spec.working_dir.is_none());
    }

    #[test]
    fn exit_state_display() {
        assert_eq!(ExitState::Exited(Some(0)).to_string(), "exited with code 0");
        assert_eq!(ExitState::Killed.to_string(), "was killed");
        assert!(ExitState::Running.is_running());
        assert!(!ExitState::Exited(None).is_running());
    }

    #[test]
    fn stderr_tail_is_bounded() {
        let tail = StderrTail::default();
        for i in 0..(STDERR_TAIL_LINES + 10) {
            tail.push(format!("line {i}"));
        }
        let lines = tail.snapshot();
        assert_eq!(lines.len(), STDERR_TAIL_LINES);
        assert_eq!(lines[0], "line 10");
    }

    #[test]
    fn stderr_lines_are_decoded_lossily() {
        assert_eq!(stderr_line(b"panic: oops\r\n"), "panic: oops");
        assert_eq!(stderr_line(b"no newline"), "no newline");
        assert_eq!(stderr_line(b"\xff\xfebad\n"), "\u{fffd}\u{fffd}bad");
    }

    #[tokio::test]
    async fn spawn_failure_names_the_command() {
        let spec = LaunchSpec::new("definitely-not-a-real-mcp-server-binary", ["serve"]);
        let err = ProcessSupervisor::start(&spec).unwrap_err();
        assert!(matches!(err, StartupError::Spawn { .. }));
        assert!(err.to_string().contains("definitely-not-a-real-mcp-server-binary serve"));
    }
}
