//! Configuration management for herakles-port-manager.
//!
//! This module handles loading, merging, and validating configuration from files
//! and CLI arguments. It supports YAML, JSON, and TOML formats.
//! Precedence: CLI > config file > defaults.

use crate::cli::{Args, ConfigFormat};
use herakles_port_manager::{JoinOptions, ScanLoopConfig, TerminationConfig};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

// Default configuration constants
pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 5000;
pub const DEFAULT_SCAN_INTERVAL_MS: u64 = 2000;
pub const DEFAULT_SCAN_TIMEOUT_MS: u64 = 1500;
pub const DEFAULT_OBSERVER_QUEUE_CAPACITY: usize = 16;
pub const DEFAULT_TERMINATION_GRACE_MS: u64 = 1500;
pub const DEFAULT_TERMINATION_TIMEOUT_MS: u64 = 5000;

const MIN_SCAN_INTERVAL_MS: u64 = 100;

/// Effective configuration. Every field is optional in files; missing
/// fields take their default.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    // Server configuration
    pub port: Option<u16>,
    pub bind: Option<String>,

    // Scanning
    #[serde(alias = "scan-interval-ms")]
    pub scan_interval_ms: Option<u64>,
    #[serde(alias = "scan-timeout-ms")]
    pub scan_timeout_ms: Option<u64>,
    #[serde(alias = "listen-only")]
    pub listen_only: Option<bool>,
    pub parallelism: Option<usize>,

    // Delivery
    #[serde(alias = "enable-push")]
    pub enable_push: Option<bool>,
    #[serde(alias = "enable-pull")]
    pub enable_pull: Option<bool>,
    #[serde(alias = "observer-queue-capacity")]
    pub observer_queue_capacity: Option<usize>,

    // Termination
    #[serde(alias = "termination-grace-ms")]
    pub termination_grace_ms: Option<u64>,
    #[serde(alias = "termination-timeout-ms")]
    pub termination_timeout_ms: Option<u64>,

    // Feature flags
    pub enable_health: Option<bool>,
    pub enable_telemetry: Option<bool>,

    // Logging
    pub log_level: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: Some(DEFAULT_PORT),
            bind: Some(DEFAULT_BIND_ADDR.to_string()),
            scan_interval_ms: Some(DEFAULT_SCAN_INTERVAL_MS),
            scan_timeout_ms: Some(DEFAULT_SCAN_TIMEOUT_MS),
            listen_only: Some(false),
            parallelism: None,
            enable_push: Some(true),
            enable_pull: Some(true),
            observer_queue_capacity: Some(DEFAULT_OBSERVER_QUEUE_CAPACITY),
            termination_grace_ms: Some(DEFAULT_TERMINATION_GRACE_MS),
            termination_timeout_ms: Some(DEFAULT_TERMINATION_TIMEOUT_MS),
            enable_health: Some(true),
            enable_telemetry: Some(true),
            log_level: Some("info".into()),
        }
    }
}

impl Config {
    pub fn scan_interval(&self) -> Duration {
        Duration::from_millis(self.scan_interval_ms.unwrap_or(DEFAULT_SCAN_INTERVAL_MS))
    }

    pub fn scan_loop_config(&self) -> ScanLoopConfig {
        ScanLoopConfig {
            interval: self.scan_interval(),
            cycle_timeout: Duration::from_millis(
                self.scan_timeout_ms.unwrap_or(DEFAULT_SCAN_TIMEOUT_MS),
            ),
        }
    }

    pub fn join_options(&self) -> JoinOptions {
        JoinOptions {
            listen_only: self.listen_only.unwrap_or(false),
        }
    }

    pub fn termination_config(&self) -> TerminationConfig {
        TerminationConfig {
            grace: Duration::from_millis(
                self.termination_grace_ms
                    .unwrap_or(DEFAULT_TERMINATION_GRACE_MS),
            ),
            timeout: Duration::from_millis(
                self.termination_timeout_ms
                    .unwrap_or(DEFAULT_TERMINATION_TIMEOUT_MS),
            ),
            ..TerminationConfig::default()
        }
    }

    pub fn queue_capacity(&self) -> usize {
        self.observer_queue_capacity
            .unwrap_or(DEFAULT_OBSERVER_QUEUE_CAPACITY)
    }
}

/// Validate effective config (used by --check-config and at startup)
pub fn validate_effective_config(cfg: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let interval = cfg.scan_interval_ms.unwrap_or(DEFAULT_SCAN_INTERVAL_MS);
    let timeout = cfg.scan_timeout_ms.unwrap_or(DEFAULT_SCAN_TIMEOUT_MS);

    if interval < MIN_SCAN_INTERVAL_MS {
        return Err(format!(
            "scan_interval_ms must be at least {} (got {})",
            MIN_SCAN_INTERVAL_MS, interval
        )
        .into());
    }
    if timeout == 0 || timeout > interval {
        return Err(format!(
            "scan_timeout_ms must be between 1 and scan_interval_ms ({}), got {}",
            interval, timeout
        )
        .into());
    }

    // Delivery: at least one channel must be on
    if !(cfg.enable_push.unwrap_or(true) || cfg.enable_pull.unwrap_or(true)) {
        return Err("At least one of enable_push/enable_pull must be true".into());
    }

    if cfg.queue_capacity() == 0 {
        return Err("observer_queue_capacity must be at least 1".into());
    }

    let grace = cfg
        .termination_grace_ms
        .unwrap_or(DEFAULT_TERMINATION_GRACE_MS);
    let term_timeout = cfg
        .termination_timeout_ms
        .unwrap_or(DEFAULT_TERMINATION_TIMEOUT_MS);
    if grace > term_timeout {
        return Err(format!(
            "termination_grace_ms ({}) must not exceed termination_timeout_ms ({})",
            grace, term_timeout
        )
        .into());
    }

    if let Some(bind) = cfg.bind.as_deref() {
        if bind.parse::<std::net::IpAddr>().is_err() {
            return Err(format!("Invalid bind address '{}'", bind).into());
        }
    }

    Ok(())
}

/// Resolves configuration from CLI args, config file, and defaults.
/// This enforces precedence: CLI (if provided) > config file > default.
pub fn resolve_config(args: &Args) -> Result<Config, Box<dyn std::error::Error>> {
    let mut config = if args.no_config {
        Config::default()
    } else {
        load_config(args.config.as_deref())?
    };

    if let Some(bind_ip) = args.bind {
        config.bind = Some(bind_ip.to_string());
    }
    if let Some(cli_port) = args.port {
        config.port = Some(cli_port);
    }

    // Scanning
    if let Some(ms) = args.scan_interval_ms {
        config.scan_interval_ms = Some(ms);
    }
    if let Some(ms) = args.scan_timeout_ms {
        config.scan_timeout_ms = Some(ms);
    }
    if args.listen_only {
        config.listen_only = Some(true);
    }
    if args.parallelism.is_some() {
        config.parallelism = args.parallelism;
    }

    // Feature flags
    if args.disable_push {
        config.enable_push = Some(false);
    }
    if args.disable_pull {
        config.enable_pull = Some(false);
    }
    if args.disable_health {
        config.enable_health = Some(false);
    }
    if args.disable_telemetry {
        config.enable_telemetry = Some(false);
    }

    Ok(config)
}

/// Loads a config file, or the first one found in the default locations.
pub fn load_config(path: Option<&Path>) -> Result<Config, Box<dyn std::error::Error>> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => {
            let defaults = [
                "/etc/herakles/port-manager.yaml",
                "/etc/herakles/port-manager.yml",
                "/etc/herakles/port-manager.json",
                "./herakles-port-manager.yaml",
                "./herakles-port-manager.yml",
                "./herakles-port-manager.json",
            ];
            match defaults.iter().find(|p| Path::new(p).exists()) {
                Some(found) => PathBuf::from(found),
                None => return Ok(Config::default()),
            }
        }
    };

    if !path.exists() {
        return Err(format!("Config file not found: {}", path.display()).into());
    }

    let content = fs::read_to_string(&path)?;

    match path.extension().and_then(|s| s.to_str()) {
        Some("json") => {
            let config: Config = serde_json::from_str(&content)?;
            info!("Loaded JSON configuration from: {}", path.display());
            Ok(config)
        }
        Some("toml") => {
            let config: Config = toml::from_str(&content)?;
            info!("Loaded TOML configuration from: {}", path.display());
            Ok(config)
        }
        _ => {
            // Default to YAML
            let config: Config = serde_yaml::from_str(&content)?;
            info!("Loaded YAML configuration from: {}", path.display());
            Ok(config)
        }
    }
}

/// Renders configuration in the requested format.
pub fn render_config(config: &Config, format: &ConfigFormat) -> Result<String, Box<dyn std::error::Error>> {
    Ok(match format {
        ConfigFormat::Json => serde_json::to_string_pretty(config)?,
        ConfigFormat::Toml => toml::to_string_pretty(config)?,
        ConfigFormat::Yaml => serde_yaml::to_string(config)?,
    })
}

/// Shows configuration in requested format
pub fn show_config(
    config: &Config,
    format: ConfigFormat,
    user_config: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let output = render_config(config, &format)?;
    if user_config {
        println!("User configuration (effective values):");
    }
    println!("{output}");
    Ok(())
}
