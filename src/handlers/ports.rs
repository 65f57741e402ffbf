//! Pull endpoint for the current snapshot.
//!
//! `GET /api/ports` reads the same `current_snapshot` the push channel is fed
//! from, so both transports always agree on what is current.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use chrono::{DateTime, Utc};
use herakles_port_manager::{AppType, Binding, Counts, Fingerprint, Snapshot};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, instrument};

use crate::state::SharedState;

/// Optional filters for `/api/ports`.
#[derive(Debug, Default, Deserialize)]
pub struct PortsQuery {
    /// App type tag, e.g. `nextjs` or `postgres`.
    pub app_type: Option<String>,
    /// `user` or `system`.
    pub group: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Group {
    User,
    System,
}

#[derive(Serialize)]
struct PortsData<'a> {
    user: Vec<&'a Binding>,
    system: Vec<&'a Binding>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PortsResponse<'a> {
    success: bool,
    timestamp: DateTime<Utc>,
    counts: Counts,
    is_privileged_observer: bool,
    fingerprint: Fingerprint,
    data: PortsData<'a>,
}

#[derive(Serialize)]
struct ErrorBody {
    success: bool,
    error: String,
}

fn error_response(status: StatusCode, error: String) -> Response {
    (
        status,
        Json(ErrorBody {
            success: false,
            error,
        }),
    )
        .into_response()
}

fn filter_bindings(
    bindings: &[Binding],
    this: Group,
    group: Option<Group>,
    app_type: Option<AppType>,
) -> Vec<&Binding> {
    if group.is_some_and(|g| g != this) {
        return Vec::new();
    }
    bindings
        .iter()
        .filter(|b| app_type.map_or(true, |t| b.app_type == t))
        .collect()
}

/// Applies the query to the current snapshot. Filters are checked before
/// availability so a malformed request is rejected even during startup.
fn build_ports_response<'a>(
    snapshot: Option<&'a Snapshot>,
    query: &PortsQuery,
) -> Result<PortsResponse<'a>, (StatusCode, String)> {
    let app_type = match query.app_type.as_deref().filter(|s| !s.is_empty()) {
        None => None,
        Some(tag) => match AppType::parse(tag) {
            Some(t) => Some(t),
            None => {
                return Err((StatusCode::BAD_REQUEST, format!("Unknown app_type '{tag}'")))
            }
        },
    };

    let group = match query.group.as_deref().filter(|s| !s.is_empty()) {
        None => None,
        Some(g) if g.eq_ignore_ascii_case("user") => Some(Group::User),
        Some(g) if g.eq_ignore_ascii_case("system") => Some(Group::System),
        Some(other) => {
            return Err((
                StatusCode::BAD_REQUEST,
                format!("Unknown group '{other}', expected 'user' or 'system'"),
            ))
        }
    };

    let Some(snapshot) = snapshot else {
        return Err((
            StatusCode::SERVICE_UNAVAILABLE,
            "No snapshot available yet, first scan cycle still running".to_string(),
        ));
    };

    let user = filter_bindings(snapshot.user_bindings(), Group::User, group, app_type);
    let system = filter_bindings(snapshot.system_bindings(), Group::System, group, app_type);

    Ok(PortsResponse {
        success: true,
        timestamp: snapshot.timestamp(),
        counts: Counts {
            user: user.len(),
            system: system.len(),
        },
        is_privileged_observer: snapshot.is_privileged_observer(),
        fingerprint: snapshot.fingerprint(),
        data: PortsData { user, system },
    })
}

/// Handler for the /api/ports endpoint.
#[instrument(skip(state))]
pub async fn ports_handler(
    State(state): State<SharedState>,
    Query(query): Query<PortsQuery>,
) -> Response {
    let start = Instant::now();
    debug!("Processing /api/ports request");
    state.health_stats.record_http_request();
    state.health_stats.record_ports_endpoint_call();

    let snapshot = state.hub.current_snapshot();
    let response = match build_ports_response(snapshot.as_deref(), &query) {
        Ok(body) => Json(body).into_response(),
        Err((status, error)) => error_response(status, error),
    };

    state
        .health_stats
        .record_request_duration(start.elapsed().as_secs_f64() * 1000.0);
    response
}
