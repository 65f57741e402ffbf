//! Termination orchestrator.
//!
//! Resolves a pid against the live process table (never against a
//! snapshot), optionally re-detects its parent controller, and terminates
//! with escalation: SIGTERM, a grace period, SIGKILL, then a bounded wait
//! for the OS to confirm. Every pid touched gets its own outcome so a
//! partially successful tree kill is visible to the caller.

use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

use crate::binding::UNKNOWN_PROCESS;
use crate::error::{TerminationError, TerminationErrorKind};
use crate::health_stats::TerminationOutcome;
use crate::process::{detect_parent_link, ProcessMeta, ProcessSource, ProcessTable};

/// Single pid, or pid plus its detected parent controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TerminationMode {
    Single,
    Tree,
}

impl fmt::Display for TerminationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TerminationMode::Single => f.write_str("single"),
            TerminationMode::Tree => f.write_str("tree"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationSignal {
    /// SIGTERM
    Graceful,
    /// SIGKILL
    Forceful,
}

/// What a liveness probe saw.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    Alive,
    /// Exited, waiting to be reaped. Treated as dead.
    Zombie,
    Gone,
}

/// Signal delivery and liveness probing.
pub trait ProcessControl: Send + Sync {
    fn probe(&self, pid: u32) -> Liveness;

    /// Delivers `signal`. A pid that vanished before delivery is not an error.
    fn send(&self, pid: u32, signal: TerminationSignal) -> Result<(), TerminationError>;
}

/// `ProcessControl` using `kill(2)`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SignalProcessControl;

impl SignalProcessControl {
    fn to_nix_pid(pid: u32) -> Option<nix::unistd::Pid> {
        i32::try_from(pid).ok().map(nix::unistd::Pid::from_raw)
    }
}

impl ProcessControl for SignalProcessControl {
    fn probe(&self, pid: u32) -> Liveness {
        use nix::errno::Errno;
        use nix::sys::signal::kill;

        let Some(nix_pid) = Self::to_nix_pid(pid) else {
            return Liveness::Gone;
        };
        match kill(nix_pid, None) {
            Ok(()) if is_zombie(pid) => Liveness::Zombie,
            Ok(()) => Liveness::Alive,
            // Exists but belongs to someone else.
            Err(Errno::EPERM) => Liveness::Alive,
            Err(_) => Liveness::Gone,
        }
    }

    fn send(&self, pid: u32, signal: TerminationSignal) -> Result<(), TerminationError> {
        use nix::errno::Errno;
        use nix::sys::signal::{kill, Signal};

        let nix_pid = Self::to_nix_pid(pid).ok_or_else(|| TerminationError::OperationFailed {
            pid,
            reason: "PID out of range".to_string(),
        })?;
        let sig = match signal {
            TerminationSignal::Graceful => Signal::SIGTERM,
            TerminationSignal::Forceful => Signal::SIGKILL,
        };

        match kill(nix_pid, sig) {
            Ok(()) | Err(Errno::ESRCH) => Ok(()),
            Err(Errno::EPERM) => Err(TerminationError::PermissionDenied(pid)),
            Err(e) => Err(TerminationError::OperationFailed {
                pid,
                reason: e.to_string(),
            }),
        }
    }
}

/// Reads the state letter from `/proc/<pid>/stat`. Always false where
/// procfs is unavailable.
fn is_zombie(pid: u32) -> bool {
    let Ok(stat) = std::fs::read_to_string(format!("/proc/{}/stat", pid)) else {
        return false;
    };
    // The name field may contain spaces and parentheses; the state follows
    // the last ')'.
    stat.rfind(')')
        .and_then(|idx| stat[idx + 1..].split_whitespace().next())
        .is_some_and(|state| state == "Z" || state == "X")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PidRole {
    Target,
    Parent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PidStatus {
    Terminated,
    AlreadyGone,
    Failed,
    /// Neither confirmed dead nor rejected within the bound.
    Unconfirmed,
}

impl PidStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, PidStatus::Terminated | PidStatus::AlreadyGone)
    }
}

/// Outcome for one pid touched by a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PidOutcome {
    pub pid: u32,
    pub name: String,
    pub role: PidRole,
    pub status: PidStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<TerminationErrorKind>,
    pub message: String,
}

impl PidOutcome {
    fn from_error(pid: u32, name: &str, role: PidRole, err: &TerminationError) -> Self {
        let status = match err.kind() {
            TerminationErrorKind::Timeout => PidStatus::Unconfirmed,
            _ => PidStatus::Failed,
        };
        Self {
            pid,
            name: name.to_string(),
            role,
            status,
            error_kind: Some(err.kind()),
            message: err.to_string(),
        }
    }
}

/// Result handed back to the caller of [`TerminationOrchestrator::terminate`].
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TerminationResult {
    /// Every affected pid is dead.
    pub success: bool,
    /// Some but not all affected pids are dead.
    pub partial: bool,
    pub mode: TerminationMode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<TerminationErrorKind>,
    pub affected_pids: Vec<PidOutcome>,
}

impl TerminationResult {
    fn from_outcomes(mode: TerminationMode, outcomes: Vec<PidOutcome>, note: Option<&str>) -> Self {
        let succeeded = outcomes.iter().filter(|o| o.status.is_success()).count();
        let success = succeeded == outcomes.len();
        let partial = succeeded > 0 && !success;

        let mut message = outcomes
            .iter()
            .map(|o| o.message.as_str())
            .collect::<Vec<_>>()
            .join("; ");
        if let Some(note) = note {
            message.push_str("; ");
            message.push_str(note);
        }

        let error_kind = if success {
            None
        } else {
            outcomes.iter().find_map(|o| o.error_kind)
        };

        Self {
            success,
            partial,
            mode,
            message,
            error_kind,
            affected_pids: outcomes,
        }
    }

    fn aborted(pid: u32, mode: TerminationMode, err: TerminationError) -> Self {
        let outcome = PidOutcome::from_error(pid, UNKNOWN_PROCESS, PidRole::Target, &err);
        Self::from_outcomes(mode, vec![outcome], None)
    }

    /// Pids confirmed dead, for removing rows from a view.
    pub fn terminated_pids(&self) -> Vec<u32> {
        self.affected_pids
            .iter()
            .filter(|o| o.status.is_success())
            .map(|o| o.pid)
            .collect()
    }

    pub fn outcome(&self) -> TerminationOutcome {
        if self.partial {
            TerminationOutcome::Partial
        } else if !self.success {
            TerminationOutcome::Failed
        } else if self
            .affected_pids
            .iter()
            .all(|o| o.status == PidStatus::AlreadyGone)
        {
            TerminationOutcome::AlreadyGone
        } else {
            TerminationOutcome::Terminated
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TerminationConfig {
    /// Wait after SIGTERM before escalating.
    pub grace: Duration,
    /// Wait after SIGKILL before reporting a timeout.
    pub timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for TerminationConfig {
    fn default() -> Self {
        Self {
            grace: Duration::from_millis(1500),
            timeout: Duration::from_millis(5000),
            poll_interval: Duration::from_millis(50),
        }
    }
}

impl TerminationConfig {
    /// Upper bound for one whole request, both pids included.
    pub fn hard_limit(&self) -> Duration {
        (self.grace + self.timeout) * 2 + Duration::from_secs(1)
    }
}

enum Confirmation {
    Exited,
    NotRunning,
}

#[derive(Clone)]
pub struct TerminationOrchestrator {
    processes: Arc<dyn ProcessSource>,
    control: Arc<dyn ProcessControl>,
    config: TerminationConfig,
    protected: Arc<[u32]>,
}

impl TerminationOrchestrator {
    /// Pids 0 and 1 and this process itself are never signalled.
    pub fn new(
        processes: Arc<dyn ProcessSource>,
        control: Arc<dyn ProcessControl>,
        config: TerminationConfig,
    ) -> Self {
        Self {
            processes,
            control,
            config,
            protected: Arc::from(vec![0, 1, std::process::id()]),
        }
    }

    pub fn with_protected_pids(mut self, pids: &[u32]) -> Self {
        let mut all = self.protected.to_vec();
        all.extend_from_slice(pids);
        self.protected = Arc::from(all);
        self
    }

    pub fn config(&self) -> &TerminationConfig {
        &self.config
    }

    /// Terminates `pid` on the blocking pool under a hard deadline.
    #[instrument(skip(self))]
    pub async fn terminate(&self, pid: u32, mode: TerminationMode) -> TerminationResult {
        let this = self.clone();
        let limit = self.config.hard_limit();
        let task = tokio::task::spawn_blocking(move || this.terminate_blocking(pid, mode));

        match tokio::time::timeout(limit, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_err)) => {
                warn!("Termination task for PID {} failed: {}", pid, join_err);
                TerminationResult::aborted(
                    pid,
                    mode,
                    TerminationError::OperationFailed {
                        pid,
                        reason: join_err.to_string(),
                    },
                )
            }
            Err(_) => {
                warn!("Termination of PID {} exceeded {:?}", pid, limit);
                TerminationResult::aborted(
                    pid,
                    mode,
                    TerminationError::Timeout {
                        pid,
                        waited_ms: limit.as_millis() as u64,
                    },
                )
            }
        }
    }

    /// Synchronous body of [`TerminationOrchestrator::terminate`].
    pub fn terminate_blocking(&self, pid: u32, mode: TerminationMode) -> TerminationResult {
        info!("Terminating PID {} (mode: {})", pid, mode);

        let Some(target) = self.resolve(pid) else {
            debug!("PID {} not running, nothing to do", pid);
            let outcome = PidOutcome {
                pid,
                name: UNKNOWN_PROCESS.to_string(),
                role: PidRole::Target,
                status: PidStatus::AlreadyGone,
                error_kind: None,
                message: format!("Process with PID {} was not running", pid),
            };
            return TerminationResult::from_outcomes(mode, vec![outcome], None);
        };

        // A supervisor may exit together with its child, so the parent is
        // resolved before the target is signalled.
        let parent = match mode {
            TerminationMode::Single => None,
            TerminationMode::Tree => self.resolve_parent(&target),
        };

        let target_outcome = self.terminate_one(&target, PidRole::Target);
        let result = match mode {
            TerminationMode::Single => {
                TerminationResult::from_outcomes(mode, vec![target_outcome], None)
            }
            TerminationMode::Tree => match parent {
                Some(parent) => {
                    let parent_outcome = self.terminate_one(&parent, PidRole::Parent);
                    TerminationResult::from_outcomes(
                        mode,
                        vec![target_outcome, parent_outcome],
                        None,
                    )
                }
                None => TerminationResult::from_outcomes(
                    mode,
                    vec![target_outcome],
                    Some("no parent controller detected"),
                ),
            },
        };

        if result.success {
            info!("Termination of PID {} finished: {}", pid, result.message);
        } else {
            warn!("Termination of PID {} incomplete: {}", pid, result.message);
        }
        result
    }

    /// Live metadata for `pid`, `None` if it is not running. A pid the
    /// process table cannot see but that still answers a probe gets a
    /// placeholder name.
    fn resolve(&self, pid: u32) -> Option<ProcessMeta> {
        match self.processes.lookup(pid) {
            Some(meta) if meta.is_alive() => Some(meta),
            Some(_) => None,
            None => match self.control.probe(pid) {
                Liveness::Alive => Some(ProcessMeta::new(pid, UNKNOWN_PROCESS)),
                Liveness::Zombie | Liveness::Gone => None,
            },
        }
    }

    /// Fresh parent-controller detection for one target.
    fn resolve_parent(&self, target: &ProcessMeta) -> Option<ProcessMeta> {
        let parent_pid = target.parent_pid?;
        let parent = self.processes.lookup(parent_pid)?;
        let table = ProcessTable::from_entries([target.clone(), parent.clone()]);
        let link = detect_parent_link(target.pid, &table)?;
        debug!(
            "PID {} controlled by {} (PID {})",
            target.pid, link.parent_name, link.parent_pid
        );
        Some(parent)
    }

    fn terminate_one(&self, meta: &ProcessMeta, role: PidRole) -> PidOutcome {
        let pid = meta.pid;
        if self.protected.contains(&pid) {
            let err = TerminationError::OperationFailed {
                pid,
                reason: "process is protected".to_string(),
            };
            return PidOutcome::from_error(pid, &meta.name, role, &err);
        }

        match self.kill_and_confirm(pid) {
            Ok(confirmation) => {
                let (status, message) = match confirmation {
                    Confirmation::Exited => (
                        PidStatus::Terminated,
                        format!("Process {} (PID: {}) terminated successfully", meta.name, pid),
                    ),
                    Confirmation::NotRunning => (
                        PidStatus::AlreadyGone,
                        format!("Process {} (PID: {}) was already gone", meta.name, pid),
                    ),
                };
                PidOutcome {
                    pid,
                    name: meta.name.clone(),
                    role,
                    status,
                    error_kind: None,
                    message,
                }
            }
            Err(err) => PidOutcome::from_error(pid, &meta.name, role, &err),
        }
    }

    fn kill_and_confirm(&self, pid: u32) -> Result<Confirmation, TerminationError> {
        if self.control.probe(pid) != Liveness::Alive {
            return Ok(Confirmation::NotRunning);
        }

        self.control.send(pid, TerminationSignal::Graceful)?;
        if self.wait_for_exit(pid, self.config.grace) {
            return Ok(Confirmation::Exited);
        }

        debug!("PID {} ignored SIGTERM, escalating to SIGKILL", pid);
        self.control.send(pid, TerminationSignal::Forceful)?;
        if self.wait_for_exit(pid, self.config.timeout) {
            return Ok(Confirmation::Exited);
        }

        Err(TerminationError::Timeout {
            pid,
            waited_ms: (self.config.grace + self.config.timeout).as_millis() as u64,
        })
    }

    fn wait_for_exit(&self, pid: u32, bound: Duration) -> bool {
        let deadline = Instant::now() + bound;
        loop {
            if self.control.probe(pid) != Liveness::Alive {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            std::thread::sleep(self.config.poll_interval.min(deadline - now));
        }
    }
}
