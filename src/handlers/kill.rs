//! Termination endpoints.
//!
//! `POST /api/kill/{pid}` terminates one process, `POST /api/kill-tree/{pid}`
//! also terminates its detected parent controller.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use herakles_port_manager::{TerminationErrorKind, TerminationMode, TerminationResult};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::state::SharedState;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct KillResponse {
    #[serde(flatten)]
    result: TerminationResult,
    /// Pids the presentation layer should drop from its view.
    terminated_pids: Vec<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// Maps a termination result to its HTTP status.
pub fn status_for(result: &TerminationResult) -> StatusCode {
    if result.success {
        return StatusCode::OK;
    }
    if result.partial {
        return StatusCode::MULTI_STATUS;
    }
    match result.error_kind {
        Some(TerminationErrorKind::PermissionDenied) => StatusCode::FORBIDDEN,
        Some(TerminationErrorKind::OperationFailed) => StatusCode::CONFLICT,
        Some(TerminationErrorKind::Timeout) => StatusCode::GATEWAY_TIMEOUT,
        None => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

async fn run_termination(
    state: SharedState,
    pid: u32,
    mode: TerminationMode,
) -> (StatusCode, Json<KillResponse>) {
    let result = state.orchestrator.terminate(pid, mode).await;
    state.health_stats.record_termination(result.outcome());

    let status = status_for(&result);
    if result.success {
        info!("Termination of PID {} ({}) succeeded: {}", pid, mode, result.message);
    } else {
        warn!("Termination of PID {} ({}) returned {}: {}", pid, mode, status, result.message);
    }

    let error = (!result.success).then(|| result.message.clone());
    let terminated_pids = result.terminated_pids();
    (
        status,
        Json(KillResponse {
            result,
            terminated_pids,
            error,
        }),
    )
}

/// Handler for POST /api/kill/{pid}.
#[instrument(skip(state))]
pub async fn kill_handler(
    State(state): State<SharedState>,
    Path(pid): Path<u32>,
) -> impl IntoResponse {
    debug!("Processing /api/kill request");
    state.health_stats.record_http_request();
    run_termination(state, pid, TerminationMode::Single).await
}

/// Handler for POST /api/kill-tree/{pid}.
#[instrument(skip(state))]
pub async fn kill_tree_handler(
    State(state): State<SharedState>,
    Path(pid): Path<u32>,
) -> impl IntoResponse {
    debug!("Processing /api/kill-tree request");
    state.health_stats.record_http_request();
    run_termination(state, pid, TerminationMode::Tree).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use herakles_port_manager::{PidOutcome, PidRole, PidStatus};

    fn outcome(pid: u32, status: PidStatus, kind: Option<TerminationErrorKind>) -> PidOutcome {
        PidOutcome {
            pid,
            name: "node".into(),
            role: PidRole::Target,
            status,
            error_kind: kind,
            message: String::new(),
        }
    }

    fn result(success: bool, partial: bool, kind: Option<TerminationErrorKind>) -> TerminationResult {
        TerminationResult {
            success,
            partial,
            mode: TerminationMode::Tree,
            message: String::new(),
            error_kind: kind,
            affected_pids: vec![outcome(1, PidStatus::Terminated, None)],
        }
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(status_for(&result(true, false, None)), StatusCode::OK);
        assert_eq!(
            status_for(&result(false, true, Some(TerminationErrorKind::PermissionDenied))),
            StatusCode::MULTI_STATUS
        );
        assert_eq!(
            status_for(&result(false, false, Some(TerminationErrorKind::PermissionDenied))),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            status_for(&result(false, false, Some(TerminationErrorKind::OperationFailed))),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_for(&result(false, false, Some(TerminationErrorKind::Timeout))),
            StatusCode::GATEWAY_TIMEOUT
        );
    }

    #[test]
    fn test_kill_response_flattens_result() {
        let res = result(false, false, Some(TerminationErrorKind::Timeout));
        let body = KillResponse {
            terminated_pids: res.terminated_pids(),
            error: Some("PID 1 did not exit".into()),
            result: res,
        };
        let json = serde_json::to_value(&body).expect("serializes");
        assert_eq!(json["success"], false);
        assert_eq!(json["mode"], "tree");
        assert_eq!(json["errorKind"], "timeout");
        assert_eq!(json["error"], "PID 1 did not exit");
        assert!(json["affectedPids"].is_array());
    }
}
