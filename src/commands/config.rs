//! Config command implementation.
//!
//! Generates configuration files in various formats.

use std::fs;
use std::path::PathBuf;

use crate::cli::ConfigFormat;
use crate::config::{render_config, Config};

/// Generates configuration files.
pub fn command_config(
    output: Option<PathBuf>,
    format: ConfigFormat,
    commented: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::default();
    let output = output.unwrap_or_else(|| PathBuf::from("herakles-port-manager.yaml"));

    let mut content = render_config(&config, &format)?;
    if commented && matches!(format, ConfigFormat::Yaml) {
        content = add_config_comments(content);
    }

    if output.to_string_lossy() == "-" {
        print!("{}", content);
    } else {
        fs::write(&output, content)?;
        println!("✅ Configuration written to: {}", output.display());
    }

    Ok(())
}

/// Adds comments to YAML configuration.
fn add_config_comments(yaml: String) -> String {
    let comments = r#"# Herakles Port Manager Configuration
# ===================================
#
# Server Configuration
# --------------------
# bind: "127.0.0.1"            # Bind IP (the kill endpoints are unauthenticated)
# port: 5000                   # HTTP port
#
# Scanning
# --------
# scan_interval_ms: 2000       # Time between scan cycles (>= 100)
# scan_timeout_ms: 1500        # Soft timeout of one cycle (<= interval)
# listen_only: false           # Ignore TCP sockets not in LISTEN (UDP is kept)
# parallelism: null            # Join threads (null = auto)
#
# Delivery
# --------
# enable_push: true            # WebSocket push channel at /ws
# enable_pull: true            # Pull endpoint at /api/ports
# observer_queue_capacity: 16  # Queued snapshots per observer before it is dropped
#
# Termination
# -----------
# termination_grace_ms: 1500   # Wait after SIGTERM before SIGKILL
# termination_timeout_ms: 5000 # Wait after SIGKILL before reporting a timeout
#
# Feature Flags
# -------------
# enable_health: true          # Enable /health endpoint
# enable_telemetry: true       # Enable /metrics endpoint
#
# Logging
# -------
# log_level: "info"            # off, error, warn, info, debug, trace
"#;

    format!("{comments}\n{yaml}")
}
