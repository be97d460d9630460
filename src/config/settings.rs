//! Configuration structures for deserialisation.
//!
//! These structures map directly to the JSON configuration file format.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::ConfigError;
use crate::mcp::process::LaunchSpec;
use crate::mcp::protocol::MCP_PROTOCOL_VERSION;
use crate::mcp::session::SessionOptions;
use crate::mcp::types::Implementation;

/// Root configuration structure.
///
/// This is the top-level structure that matches the JSON config file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Optional JSON schema reference (ignored during parsing).
    #[serde(rename = "$schema", default)]
    _schema: Option<String>,

    /// Optional comment field (ignored during parsing).
    #[serde(rename = "_comment", default)]
    _comment: Option<String>,

    /// The server under test.
    #[serde(default)]
    pub server: ServerConfig,

    /// Checks run before the server is started.
    #[serde(default)]
    pub preflight: PreflightConfig,

    /// Timeouts for startup, calls and shutdown.
    #[serde(default)]
    pub timeouts: TimeoutConfig,

    /// Identity presented in the handshake.
    #[serde(default)]
    pub client: ClientConfig,

    /// The tool call and resource read to perform.
    #[serde(default)]
    pub probe: ProbeConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any validation checks fail.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.command.trim().is_empty() {
            return Err(ConfigError::ValidationError {
                message: "no server command configured".to_string(),
            });
        }

        if let Some(ref marker) = self.server.root_marker {
            if marker.is_empty() {
                return Err(ConfigError::ValidationError {
                    message: "server.root_marker must not be empty".to_string(),
                });
            }
        }

        self.timeouts.validate()?;

        for tool in &self.preflight.required_tools {
            if tool.command.trim().is_empty() {
                return Err(ConfigError::ValidationError {
                    message: "preflight tool command must not be empty".to_string(),
                });
            }
        }

        if let Some(ref tool) = self.probe.tool {
            if tool.name.trim().is_empty() {
                return Err(ConfigError::ValidationError {
                    message: "probe.tool.name must not be empty".to_string(),
                });
            }
        }

        Ok(())
    }

    /// Returns the session options described by this configuration.
    #[must_use]
    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            client_info: Implementation {
                name: self.client.name.clone(),
                version: self.client.version.clone(),
            },
            protocol_version: self.client.protocol_version.clone(),
            notification_settle: self.timeouts.notification_settle(),
        }
    }
}

/// How to launch the server under test.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Executable name or path.
    #[serde(default)]
    pub command: String,

    /// Arguments passed to the executable.
    #[serde(default)]
    pub args: Vec<String>,

    /// Working directory for the server.
    #[serde(default)]
    pub working_dir: Option<PathBuf>,

    /// File identifying the working directory when `working_dir` is unset.
    ///
    /// The search walks up from the current directory.
    #[serde(default)]
    pub root_marker: Option<String>,

    /// Extra environment variables for the server.
    #[serde(default)]
    pub env: HashMap<String, String>,
}

impl ServerConfig {
    /// Builds the launch spec for the server in `working_dir`.
    #[must_use]
    pub fn launch_spec(&self, working_dir: Option<PathBuf>) -> LaunchSpec {
        LaunchSpec {
            program: self.command.clone(),
            args: self.args.clone(),
            working_dir,
            env: self.env.clone(),
        }
    }
}

/// Checks run before the server is started.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PreflightConfig {
    /// External commands that must run successfully.
    #[serde(default)]
    pub required_tools: Vec<ToolRequirement>,
}

/// An external command that must be available.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ToolRequirement {
    /// The command to run.
    pub command: String,
    /// Arguments, typically a version flag.
    #[serde(default)]
    pub args: Vec<String>,
}

/// Timeouts, in milliseconds or seconds as named.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TimeoutConfig {
    /// Time the server gets to fail on startup before the handshake.
    #[serde(default = "default_startup_ms")]
    pub startup_ms: u64,

    /// Timeout for `initialize`.
    #[serde(default = "default_call_secs")]
    pub initialize_secs: u64,

    /// Timeout for `tools/list` and `resources/list`.
    #[serde(default = "default_call_secs")]
    pub discovery_secs: u64,

    /// Timeout for `tools/call`.
    #[serde(default = "default_slow_call_secs")]
    pub tool_call_secs: u64,

    /// Timeout for `resources/read`.
    #[serde(default = "default_slow_call_secs")]
    pub resource_read_secs: u64,

    /// Grace period between terminate and kill.
    #[serde(default = "default_grace_secs")]
    pub shutdown_grace_secs: u64,

    /// Pause after the initialized notification.
    #[serde(default = "default_settle_ms")]
    pub notification_settle_ms: u64,
}

impl TimeoutConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        let fields = [
            ("initialize_secs", self.initialize_secs),
            ("discovery_secs", self.discovery_secs),
            ("tool_call_secs", self.tool_call_secs),
            ("resource_read_secs", self.resource_read_secs),
            ("shutdown_grace_secs", self.shutdown_grace_secs),
        ];

        for (name, value) in fields {
            if value == 0 {
                return Err(ConfigError::ValidationError {
                    message: format!("timeouts.{name} must be greater than zero"),
                });
            }
        }
        Ok(())
    }

    /// Startup settle delay.
    #[must_use]
    pub const fn startup(&self) -> Duration {
        Duration::from_millis(self.startup_ms)
    }

    /// `initialize` timeout.
    #[must_use]
    pub const fn initialize(&self) -> Duration {
        Duration::from_secs(self.initialize_secs)
    }

    /// Discovery call timeout.
    #[must_use]
    pub const fn discovery(&self) -> Duration {
        Duration::from_secs(self.discovery_secs)
    }

    /// `tools/call` timeout.
    #[must_use]
    pub const fn tool_call(&self) -> Duration {
        Duration::from_secs(self.tool_call_secs)
    }

    /// `resources/read` timeout.
    #[must_use]
    pub const fn resource_read(&self) -> Duration {
        Duration::from_secs(self.resource_read_secs)
    }

    /// Shutdown grace period.
    #[must_use]
    pub const fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }

    /// Pause after the initialized notification.
    #[must_use]
    pub const fn notification_settle(&self) -> Duration {
        Duration::from_millis(self.notification_settle_ms)
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            startup_ms: default_startup_ms(),
            initialize_secs: default_call_secs(),
            discovery_secs: default_call_secs(),
            tool_call_secs: default_slow_call_secs(),
            resource_read_secs: default_slow_call_secs(),
            shutdown_grace_secs: default_grace_secs(),
            notification_settle_ms: default_settle_ms(),
        }
    }
}

const fn default_startup_ms() -> u64 {
    500
}

const fn default_call_secs() -> u64 {
    10
}

const fn default_slow_call_secs() -> u64 {
    15
}

const fn default_grace_secs() -> u64 {
    2
}

const fn default_settle_ms() -> u64 {
    100
}

/// Client identity for the handshake.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClientConfig {
    /// Client name.
    #[serde(default = "default_client_name")]
    pub name: String,

    /// Client version.
    #[serde(default = "default_client_version")]
    pub version: String,

    /// Protocol version to request.
    #[serde(default = "default_protocol_version")]
    pub protocol_version: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            name: default_client_name(),
            version: default_client_version(),
            protocol_version: default_protocol_version(),
        }
    }
}

fn default_client_name() -> String {
    "mcp-test-client".to_string()
}

fn default_client_version() -> String {
    "1.0.0".to_string()
}

fn default_protocol_version() -> String {
    MCP_PROTOCOL_VERSION.to_string()
}

/// Calls made after discovery.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProbeConfig {
    /// Tool to invoke, if any.
    #[serde(default)]
    pub tool: Option<ToolProbe>,

    /// Resource to read, if any.
    #[serde(default)]
    pub resource: Option<ResourceProbe>,
}

/// A tool invocation.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ToolProbe {
    /// Tool name.
    pub name: String,

    /// Tool arguments.
    #[serde(default)]
    pub arguments: Map<String, Value>,
}

/// A resource read.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResourceProbe {
    /// Resource URI.
    pub uri: String,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "warn".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_minimal_config() {
        let json = r#"{"server": {"command": "my-server"}}"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert!(config.validate().is_ok());
        assert!(config.probe.tool.is_none());
        assert!(config.preflight.required_tools.is_empty());
    }

    #[test]
    fn empty_config_needs_a_command() {
        let config: Config = serde_json::from_str("{}").unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("no server command"));
    }

    #[test]
    fn parse_full_config() {
        let json = r#"{
            "$schema": "https://json-schema.org/draft/2020-12/schema",
            "_comment": "Test config",
            "server": {
                "command": "go",
                "args": ["run", "-mod=mod", "./cmd/rosa", "mcp", "serve"],
                "root_marker": "go.mod",
                "env": {"OCM_CONFIG": "/tmp/ocm.json"}
            },
            "preflight": {
                "required_tools": [{"command": "go", "args": ["version"]}]
            },
            "timeouts": {
                "startup_ms": 250,
                "initialize_secs": 20,
                "tool_call_secs": 30
            },
            "client": {
                "name": "probe",
                "version": "2.0.0"
            },
            "probe": {
                "tool": {"name": "rosa_whoami", "arguments": {}},
                "resource": {"uri": "rosa://clusters"}
            },
            "logging": {
                "level": "debug"
            }
        }"#;

        let config: Config = serde_json::from_str(json).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.server.args.len(), 5);
        assert_eq!(config.server.root_marker.as_deref(), Some("go.mod"));
        assert_eq!(config.server.env["OCM_CONFIG"], "/tmp/ocm.json");
        assert_eq!(config.preflight.required_tools[0].args, vec!["version"]);
        assert_eq!(config.timeouts.startup(), Duration::from_millis(250));
        assert_eq!(config.timeouts.initialize(), Duration::from_secs(20));
        assert_eq!(config.timeouts.discovery(), Duration::from_secs(10));
        assert_eq!(config.timeouts.tool_call(), Duration::from_secs(30));
        assert_eq!(config.client.protocol_version, "2024-11-05");
        assert_eq!(config.probe.tool.as_ref().unwrap().name, "rosa_whoami");
        assert_eq!(config.probe.resource.as_ref().unwrap().uri, "rosa://clusters");
        assert_eq!(config.logging.level, "debug");

        let options = config.session_options();
        assert_eq!(options.client_info.name, "probe");
        assert_eq!(options.notification_settle, Duration::from_millis(100));
    }

    #[test]
    fn timeout_defaults() {
        let timeouts = TimeoutConfig::default();
        assert_eq!(timeouts.startup(), Duration::from_millis(500));
        assert_eq!(timeouts.initialize(), Duration::from_secs(10));
        assert_eq!(timeouts.resource_read(), Duration::from_secs(15));
        assert_eq!(timeouts.shutdown_grace(), Duration::from_secs(2));
    }

    #[test]
    fn client_defaults() {
        let client = ClientConfig::default();
        assert_eq!(client.name, "mcp-test-client");
        assert_eq!(client.version, "1.0.0");
    }

    #[test]
    fn logging_config_defaults() {
        let config = LoggingConfig::default();
        assert_eq!(config.level, "warn");
    }

    #[test]
    fn reject_zero_timeout() {
        let json = r#"{
            "server": {"command": "my-server"},
            "timeouts": {"discovery_secs": 0}
        }"#;

        let config: Config = serde_json::from_str(json).unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("discovery_secs"));
    }

    #[test]
    fn reject_non_object_tool_arguments() {
        let json = r#"{"probe": {"tool": {"name": "t", "arguments": [1, 2]}}}"#;
        let result: Result<Config, _> = serde_json::from_str(json);
        assert!(result.is_err());
    }

    #[test]
    fn example_config_is_valid() {
        let json = include_str!("../../config/example-config.json");
        let config: Config = serde_json::from_str(json).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.server.command, "go");
        assert_eq!(config.timeouts.notification_settle(), Duration::from_millis(100));
    }

    #[test]
    fn reject_unknown_fields() {
        let json = r#"{
            "unknown_field": "value"
        }"#;

        let result: Result<Config, _> = serde_json::from_str(json);
        assert!(result.is_err());
    }
}
