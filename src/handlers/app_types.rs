//! Classification table endpoint handler.

use axum::{extract::State, response::IntoResponse};
use herakles_port_manager::process::{RUNTIME_RULES, SUPERVISOR_RULES};
use std::fmt::Write as FmtWrite;
use tracing::{debug, instrument};

use crate::handlers::health::FOOTER_TEXT;
use crate::state::SharedState;

/// Handler for the /app-types endpoint.
#[instrument(skip(state))]
pub async fn app_types_handler(State(state): State<SharedState>) -> impl IntoResponse {
    debug!("Processing /app-types request");
    state.health_stats.record_http_request();

    let mut out = String::new();
    writeln!(out, "HERAKLES PORT MANAGER - APP TYPES").ok();
    writeln!(out, "=================================").ok();
    writeln!(out).ok();
    writeln!(out, "Rules are evaluated top to bottom; the first name match wins.").ok();
    writeln!(out).ok();
    writeln!(out, "{:10} | {:32} | {}", "app_type", "executable contains", "refinements").ok();
    writeln!(out, "{}", "-".repeat(80)).ok();

    for rule in RUNTIME_RULES {
        let refinements = rule
            .refinements
            .iter()
            .map(|r| r.tag.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        writeln!(
            out,
            "{:10} | {:32} | {}",
            rule.tag.as_str(),
            rule.name_patterns.join(", "),
            if refinements.is_empty() { "-" } else { refinements.as_str() }
        )
        .ok();
    }
    writeln!(out, "{:10} | {:32} | -", "other", "(anything else)").ok();

    writeln!(out).ok();
    writeln!(out, "PARENT CONTROLLERS").ok();
    writeln!(out, "------------------").ok();
    for rule in SUPERVISOR_RULES {
        let mut patterns: Vec<&str> = rule.names.to_vec();
        patterns.extend(rule.cmdline_tokens.iter().copied());
        writeln!(out, "{:22} {}", rule.label, patterns.join(", ")).ok();
    }

    writeln!(out).ok();
    writeln!(out, "{FOOTER_TEXT}").ok();

    ([("Content-Type", "text/plain; charset=utf-8")], out)
}
