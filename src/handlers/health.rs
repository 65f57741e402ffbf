//! Health check endpoint handler.
//!
//! This module provides the `/health` endpoint handler that returns
//! scan pipeline health and internal statistics.

use axum::{extract::State, http::StatusCode, response::IntoResponse};
use herakles_port_manager::{evaluate_health, HealthResponse, HealthThresholds};
use std::fmt::Write as FmtWrite;
use tracing::{debug, instrument};

use crate::state::SharedState;

// Time conversion constants
const SECONDS_PER_HOUR: f64 = 3600.0;
const MINUTES_PER_HOUR: f64 = 60.0;
const HOURS_PER_DAY: f64 = 24.0;

/// Footer text for human-readable HTTP endpoints.
pub const FOOTER_TEXT: &str =
    "Project: https://github.com/cansp-dev/herakles-port-manager - More info: https://www.herakles.now";

/// Handler for the /health endpoint.
#[instrument(skip(state))]
pub async fn health_handler(State(state): State<SharedState>) -> impl IntoResponse {
    debug!("Processing /health request");
    state.health_stats.record_http_request();

    let health = evaluate_health(
        &state.health_stats,
        state.config.scan_interval(),
        &HealthThresholds::default(),
    );

    let status = if health.overall_status.is_serving() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let uptime_hours = state.health_stats.start_time.elapsed().as_secs_f64() / SECONDS_PER_HOUR;
    let uptime_str = if uptime_hours < 1.0 {
        format!("{:.1} minutes", uptime_hours * MINUTES_PER_HOUR)
    } else if uptime_hours < HOURS_PER_DAY {
        format!("{:.1} hours", uptime_hours)
    } else {
        format!("{:.1} days", uptime_hours / HOURS_PER_DAY)
    };

    let checks = render_checks(&health);
    let table = state.health_stats.render_table();

    debug!("Health check: {} - {}", status, health.overall_status);
    (
        status,
        [("Content-Type", "text/plain; charset=utf-8")],
        format!(
            "Status: {}\nObservers: {}\n\nUptime: {uptime_str}\n\n{checks}\n{table}\n{FOOTER_TEXT}",
            health.overall_status.as_str().to_uppercase(),
            state.hub.observer_count()
        ),
    )
}

/// Renders the individual checks as a plain-text table.
fn render_checks(health: &HealthResponse) -> String {
    let mut out = String::new();
    writeln!(out, "CHECKS").ok();
    writeln!(out, "======").ok();
    writeln!(out).ok();
    writeln!(out, "{:20} | {:>8} | {}", "Check", "Status", "Detail").ok();
    writeln!(out, "{}", "-".repeat(56)).ok();
    for check in &health.checks {
        writeln!(
            out,
            "{:20} | {:>8} | {}",
            check.name,
            check.status.as_str(),
            check.detail
        )
        .ok();
    }
    out
}
