//! Error taxonomy for scanning and termination.
//!
//! Per-binding resolution problems never surface here: a vanished process or
//! a denied metadata lookup is absorbed into placeholder fields by the
//! scanner. Only whole-cycle failures (`ScanError`) and termination failures
//! (`TerminationError`) are represented as errors.

use serde::Serialize;
use thiserror::Error;

/// Failure of an entire scan cycle. The cycle is retried on the next tick
/// and the previous snapshot stays current meanwhile.
#[derive(Error, Debug)]
pub enum ScanError {
    #[error("socket enumeration failed: {0}")]
    EnumerationFailure(String),
    #[error("scan cycle panicked or was cancelled: {0}")]
    CycleAborted(String),
}

/// Machine-readable kind of a termination failure, exposed to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationErrorKind {
    PermissionDenied,
    OperationFailed,
    Timeout,
}

/// Errors raised while signalling or confirming the death of one pid.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TerminationError {
    #[error("Access denied for PID {0}. Run with elevated privileges to terminate this process.")]
    PermissionDenied(u32),
    #[error("Failed to terminate PID {pid}: {reason}")]
    OperationFailed { pid: u32, reason: String },
    #[error("PID {pid} did not exit within {waited_ms} ms")]
    Timeout { pid: u32, waited_ms: u64 },
}

impl TerminationError {
    pub fn kind(&self) -> TerminationErrorKind {
        match self {
            TerminationError::PermissionDenied(_) => TerminationErrorKind::PermissionDenied,
            TerminationError::OperationFailed { .. } => TerminationErrorKind::OperationFailed,
            TerminationError::Timeout { .. } => TerminationErrorKind::Timeout,
        }
    }
}
