//! mcp-probe: diagnostic client for MCP servers speaking the stdio transport
//!
//! Starts the server under test, walks it through the handshake, discovery,
//! a tool call and a resource read, and reports what happened.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use serde_json::{Map, Value};
use tracing::{error, info, Level};
use tracing_subscriber::EnvFilter;

use mcp_probe::config::{self, Config, ResourceProbe, ToolProbe};
use mcp_probe::error::ConfigError;
use mcp_probe::probe;
use mcp_probe::report::Reporter;

/// Diagnostic client for MCP servers speaking the stdio transport.
///
/// Starts the server, performs the initialize handshake, lists its tools and
/// resources, optionally calls a tool and reads a resource, then shuts the
/// server down.
#[derive(Parser, Debug)]
#[command(name = "mcp-probe")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "CONFIG_FILE")]
    config: Option<PathBuf>,

    /// Working directory for the server
    #[arg(long, value_name = "DIR")]
    cwd: Option<PathBuf>,

    /// Tool to call after discovery
    #[arg(long, value_name = "NAME")]
    tool: Option<String>,

    /// Tool arguments as a JSON object
    #[arg(long, value_name = "JSON", requires = "tool")]
    arguments: Option<String>,

    /// Resource URI to read after discovery
    #[arg(long, value_name = "URI")]
    resource: Option<String>,

    /// Increase logging verbosity (-v for info, -vv for debug, -vvv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Decrease logging verbosity (only show errors)
    #[arg(short, long)]
    quiet: bool,

    /// Server command and its arguments (overrides the configuration file)
    #[arg(last = true, value_name = "COMMAND")]
    command: Vec<String>,
}

/// Determines the log level from CLI arguments.
#[allow(clippy::match_same_arms)] // Explicit "warn" arm for clarity
fn get_log_level(verbose: u8, quiet: bool, config_level: &str) -> Level {
    if quiet {
        return Level::ERROR;
    }

    match verbose {
        0 => match config_level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "info" => Level::INFO,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::WARN, // Default to warn for unknown levels
        },
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

/// Initialises the tracing subscriber for logging.
fn init_tracing(level: Level) {
    let filter = EnvFilter::from_default_env().add_directive(level.into());

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Applies command-line overrides on top of the loaded configuration.
fn apply_overrides(cfg: &mut Config, args: Args) -> Result<(), ConfigError> {
    let mut command = args.command.into_iter();
    if let Some(program) = command.next() {
        cfg.server.command = program;
        cfg.server.args = command.collect();
    }

    if let Some(dir) = args.cwd {
        cfg.server.working_dir = Some(dir);
    }

    if let Some(name) = args.tool {
        let arguments = match args.arguments {
            Some(ref json) => parse_arguments(json)?,
            None => Map::new(),
        };
        cfg.probe.tool = Some(ToolProbe { name, arguments });
    }

    if let Some(uri) = args.resource {
        cfg.probe.resource = Some(ResourceProbe { uri });
    }

    Ok(())
}

fn parse_arguments(json: &str) -> Result<Map<String, Value>, ConfigError> {
    match serde_json::from_str(json) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(ConfigError::ValidationError {
            message: "--arguments must be a JSON object".to_string(),
        }),
        Err(e) => Err(ConfigError::ValidationError {
            message: format!("--arguments is not valid JSON: {e}"),
        }),
    }
}

/// Entry point for mcp-probe.
fn main() -> ExitCode {
    let args = Args::parse();
    let verbose = args.verbose;
    let quiet = args.quiet;

    // Load configuration
    let config_path = args.config.clone();
    let mut cfg = match config::load_or_default(config_path.as_deref()) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = apply_overrides(&mut cfg, args).and_then(|()| cfg.validate()) {
        eprintln!("Configuration error: {e}");
        if config_path.is_none() {
            if let Some(default_path) = config::default_config_path() {
                eprintln!("\nPass the server command after `--`, or create a config at: {}", default_path.display());
                eprintln!("Create one based on config/example-config.json");
            }
        }
        return ExitCode::FAILURE;
    }

    // Initialise logging
    let log_level = get_log_level(verbose, quiet, &cfg.logging.level);
    init_tracing(log_level);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        command = %cfg.server.command,
        "Starting mcp-probe"
    );

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!(error = %e, "Failed to create Tokio runtime");
            return ExitCode::FAILURE;
        }
    };

    let mut reporter = Reporter::new(std::io::stdout().lock());
    let result = runtime.block_on(probe::run(&cfg, &mut reporter));

    match result {
        Ok(summary) => {
            if summary.interrupted {
                info!("Probe interrupted, server stopped");
            } else {
                info!(failures = summary.failures.len(), "Probe finished");
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "Probe failed");
            eprintln!("Error: {e}");
            let mut source = std::error::Error::source(&e);
            while let Some(cause) = source {
                eprintln!("  caused by: {cause}");
                source = cause.source();
            }
            ExitCode::FAILURE
        }
    }
}
