//! Root endpoint handler for the landing page.

use axum::{extract::State, response::IntoResponse};
use std::fmt::Write as FmtWrite;
use tracing::{debug, instrument};

use crate::handlers::health::FOOTER_TEXT;
use crate::state::SharedState;

/// Handler for the root `/` endpoint.
#[instrument(skip(state))]
pub async fn root_handler(State(state): State<SharedState>) -> impl IntoResponse {
    debug!("Processing / request");
    state.health_stats.record_http_request();

    let version = env!("CARGO_PKG_VERSION");
    let uptime_secs = state.start_time.elapsed().as_secs();
    let uptime_str = format!(
        "{}h {}m {}s",
        uptime_secs / 3600,
        (uptime_secs % 3600) / 60,
        uptime_secs % 60
    );

    let cfg = &state.config;
    let mut endpoints: Vec<(&str, &str)> = Vec::new();
    if cfg.enable_pull.unwrap_or(true) {
        endpoints.push(("GET  /api/ports", "current snapshot (filters: ?app_type=, ?group=user|system)"));
    }
    if cfg.enable_push.unwrap_or(true) {
        endpoints.push(("GET  /ws", "WebSocket push of changed snapshots"));
    }
    endpoints.push(("POST /api/kill/{pid}", "terminate one process"));
    endpoints.push(("POST /api/kill-tree/{pid}", "terminate a process and its parent controller"));
    if cfg.enable_health.unwrap_or(true) {
        endpoints.push(("GET  /health", "internal health and performance statistics"));
    }
    if cfg.enable_telemetry.unwrap_or(true) {
        endpoints.push(("GET  /metrics", "Prometheus metrics"));
    }
    endpoints.push(("GET  /config", "effective configuration"));
    endpoints.push(("GET  /app-types", "workload classification table"));

    let mut out = String::new();
    writeln!(out, "HERAKLES PORT MANAGER").ok();
    writeln!(out, "=====================").ok();
    writeln!(out).ok();
    writeln!(out, "Version: {version}").ok();
    writeln!(out, "Uptime:  {uptime_str}").ok();
    writeln!(out, "Observers: {}", state.hub.observer_count()).ok();
    writeln!(out).ok();
    writeln!(out, "ENDPOINTS").ok();
    writeln!(out, "---------").ok();
    for (route, description) in endpoints {
        writeln!(out, "{:28} {}", route, description).ok();
    }
    writeln!(out).ok();
    writeln!(out, "{FOOTER_TEXT}").ok();

    ([("Content-Type", "text/plain; charset=utf-8")], out)
}
