//! Configuration file loading and parsing.
//!
//! This module handles loading the configuration file from disk and parsing
//! it into validated, type-safe structures.
//!
//! # Configuration File Locations
//!
//! The configuration file is searched in the following order:
//!
//! 1. Path specified via `--config` CLI flag
//! 2. Default location:
//!    - **Linux/macOS:** `~/.mcp-probe/config.json`
//!    - **Windows:** `%USERPROFILE%\.mcp-probe\config.json`
//!
//! Without an explicit path, a missing default file is not an error: the
//! built-in defaults are used and the server command must come from the
//! command line.
//!
//! # Example Configuration
//!
//! See `config/example-config.json` for a complete example.

mod settings;

pub use settings::{
    ClientConfig, Config, LoggingConfig, PreflightConfig, ProbeConfig, ResourceProbe,
    ServerConfig, TimeoutConfig, ToolProbe, ToolRequirement,
};

use std::path::{Path, PathBuf};

use crate::error::ConfigError;

/// Returns the default configuration directory.
///
/// - **Linux/macOS:** `~/.mcp-probe/`
/// - **Windows:** `%USERPROFILE%\.mcp-probe\`
#[must_use]
pub fn default_config_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|p| p.join(".mcp-probe"))
}

/// Returns the platform-specific default configuration file path.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    default_config_dir().map(|p| p.join("config.json"))
}

/// Loads and parses the configuration file at `path`.
///
/// The result is not validated; callers apply command-line overrides first
/// and then call [`Config::validate`].
///
/// # Errors
///
/// Returns an error if:
/// - The configuration file cannot be found
/// - The file cannot be read
/// - The JSON is malformed or has unknown fields
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::NotFound {
            path: path.to_path_buf(),
        });
    }

    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
        path: path.to_path_buf(),
        source: e,
    })?;

    serde_json::from_str(&contents).map_err(|e| ConfigError::ParseError {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Loads the configuration from `path`, or from the default location.
///
/// If `path` is `None` and no file exists at the default location, returns
/// the built-in defaults.
///
/// # Errors
///
/// Returns an error if an existing file cannot be read or parsed, or if an
/// explicit `path` does not exist.
pub fn load_or_default(path: Option<&Path>) -> Result<Config, ConfigError> {
    if let Some(path) = path {
        return load_config(path);
    }

    match default_config_path() {
        Some(default_path) if default_path.exists() => {
            tracing::debug!(path = %default_path.display(), "Using default configuration file");
            load_config(&default_path)
        }
        _ => Ok(Config::default()),
    }
}
