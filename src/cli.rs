//! CLI arguments and subcommands for herakles-port-manager.
//!
//! This module defines the command-line interface structure using the clap library,
//! including all flags, options, and subcommands.

use clap::{Parser, Subcommand, ValueEnum};
use std::net::IpAddr;
use std::path::PathBuf;

/// Log level options for CLI parsing
#[derive(Debug, Clone, ValueEnum)]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Configuration format options for output
#[derive(Debug, Clone, ValueEnum)]
pub enum ConfigFormat {
    Yaml,
    Json,
    Toml,
}

/// Main CLI arguments structure
#[derive(Parser, Debug)]
#[command(
    name = "herakles-port-manager",
    about = "Live port-to-process monitor with change-driven push updates",
    long_about = "Live port-to-process monitor with change-driven push updates.\n\n\
                  Joins the socket table with the process table every scan interval, \
                  classifies each binding's workload, and pushes the result to WebSocket \
                  observers only when it changed. Processes can be terminated alone or \
                  together with a supervising parent that would respawn them.",
    author = "Michael Moll <exporter@herakles.now> - Herakles",
    version = "0.1.0",
    propagate_version = true,
    after_help = "Project: https://github.com/cansp-dev/herakles-port-manager - More info: https://www.herakles.now"
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// HTTP listen port
    #[arg(short = 'p', long)]
    pub port: Option<u16>,

    /// Bind to specific interface/IP
    #[arg(long)]
    pub bind: Option<IpAddr>,

    /// Log level
    #[arg(long, value_enum, default_value = "info")]
    pub log_level: LogLevel,

    /// Config file (YAML/JSON/TOML)
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,

    /// Disable all config file loading
    #[arg(long)]
    pub no_config: bool,

    /// Print effective merged config and exit
    #[arg(long)]
    pub show_config: bool,

    /// Print only the loaded user config file + full path and exit
    #[arg(long)]
    pub show_user_config: bool,

    /// Output format for --show-config*
    #[arg(long, value_enum, default_value = "yaml")]
    pub config_format: ConfigFormat,

    /// Validate config and exit (return code 1 on error)
    #[arg(long)]
    pub check_config: bool,

    /// Scan interval in milliseconds
    #[arg(long)]
    pub scan_interval_ms: Option<u64>,

    /// Soft timeout of one scan cycle in milliseconds
    #[arg(long)]
    pub scan_timeout_ms: Option<u64>,

    /// Only report TCP sockets in LISTEN state (UDP is always reported)
    #[arg(long)]
    pub listen_only: bool,

    /// Disable the WebSocket push channel (/ws)
    #[arg(long)]
    pub disable_push: bool,

    /// Disable the HTTP pull endpoint (/api/ports)
    #[arg(long)]
    pub disable_pull: bool,

    /// Disable /health endpoint
    #[arg(long)]
    pub disable_health: bool,

    /// Disable /metrics endpoint
    #[arg(long)]
    pub disable_telemetry: bool,

    /// Parallel processing threads (0 = auto)
    #[arg(long)]
    pub parallelism: Option<usize>,
}

/// Subcommands for additional functionality
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Validate configuration and runtime requirements
    Check {
        /// Check socket table access
        #[arg(long)]
        sockets: bool,

        /// Check process table access
        #[arg(long)]
        processes: bool,

        /// Check all requirements
        #[arg(long)]
        all: bool,
    },

    /// Generate configuration files
    Config {
        /// Output file path
        #[arg(short = 'o', long)]
        output: Option<PathBuf>,

        /// Output format
        #[arg(long, value_enum, default_value = "yaml")]
        format: ConfigFormat,

        /// Include comments and examples
        #[arg(long)]
        commented: bool,
    },

    /// Run scan cycles and print the resulting snapshot
    Test {
        /// Number of scan cycles
        #[arg(short = 'n', long, default_value_t = 1)]
        iterations: usize,

        /// Print every binding, not only the summary
        #[arg(long)]
        verbose: bool,

        /// Output format
        #[arg(long, value_enum, default_value = "yaml")]
        format: ConfigFormat,
    },

    /// List workload classification rules
    AppTypes {
        /// Show matching rules per app type
        #[arg(long)]
        verbose: bool,
    },

    /// Terminate a process by PID
    Kill {
        /// Target process id
        pid: u32,

        /// Also terminate the detected parent controller
        #[arg(long)]
        tree: bool,
    },
}
