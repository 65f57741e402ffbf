//! Process table access.
//!
//! `ProcessSource` is the single process-identity source shared by the
//! scanner (bulk snapshot per cycle) and the termination orchestrator
//! (fresh single-pid lookups). The production implementation wraps
//! `sysinfo`.

use ahash::AHashMap as HashMap;
use std::sync::{Mutex, MutexGuard};
use sysinfo::{Pid, ProcessRefreshKind, ProcessStatus, ProcessesToUpdate, System, Users};
use tracing::{debug, warn};

/// Coarse run state, only as fine as termination needs it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Running,
    /// Exited but not yet reaped by its parent. Counts as dead.
    Zombie,
}

/// Best-effort metadata for one live process. Empty strings mean the field
/// was unavailable (typically permission denied).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessMeta {
    pub pid: u32,
    pub parent_pid: Option<u32>,
    pub name: String,
    pub exe: String,
    pub cmdline: String,
    pub user_id: Option<u32>,
    pub username: Option<String>,
    pub state: RunState,
}

impl ProcessMeta {
    /// Minimal metadata, convenient for building fake tables.
    pub fn new(pid: u32, name: &str) -> Self {
        Self {
            pid,
            parent_pid: None,
            name: name.to_string(),
            exe: String::new(),
            cmdline: String::new(),
            user_id: None,
            username: None,
            state: RunState::Running,
        }
    }

    pub fn with_parent(mut self, parent_pid: u32) -> Self {
        self.parent_pid = Some(parent_pid);
        self
    }

    pub fn with_cmdline(mut self, cmdline: &str) -> Self {
        self.cmdline = cmdline.to_string();
        self
    }

    pub fn with_user(mut self, user_id: u32, username: &str) -> Self {
        self.user_id = Some(user_id);
        self.username = Some(username.to_string());
        self
    }

    pub fn is_alive(&self) -> bool {
        self.state == RunState::Running
    }
}

/// Point-in-time view of the process table, keyed by pid.
#[derive(Debug, Clone, Default)]
pub struct ProcessTable {
    processes: HashMap<u32, ProcessMeta>,
}

impl ProcessTable {
    pub fn from_entries<I: IntoIterator<Item = ProcessMeta>>(entries: I) -> Self {
        Self {
            processes: entries.into_iter().map(|p| (p.pid, p)).collect(),
        }
    }

    pub fn get(&self, pid: u32) -> Option<&ProcessMeta> {
        self.processes.get(&pid)
    }

    pub fn len(&self) -> usize {
        self.processes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processes.is_empty()
    }
}

/// Source of process identity.
pub trait ProcessSource: Send + Sync {
    /// Full table for one scan cycle.
    fn snapshot(&self) -> ProcessTable;

    /// Fresh lookup of one pid, bypassing any cycle snapshot.
    fn lookup(&self, pid: u32) -> Option<ProcessMeta>;
}

/// `ProcessSource` backed by `sysinfo`.
///
/// The `System` and the user list are kept between calls so sysinfo can
/// reuse its internal buffers; every call still refreshes what it returns.
pub struct SysinfoProcessSource {
    inner: Mutex<SysinfoState>,
}

struct SysinfoState {
    system: System,
    users: Users,
}

impl Default for SysinfoProcessSource {
    fn default() -> Self {
        Self::new()
    }
}

impl SysinfoProcessSource {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(SysinfoState {
                system: System::new(),
                users: Users::new_with_refreshed_list(),
            }),
        }
    }

    fn refresh_kind() -> ProcessRefreshKind {
        ProcessRefreshKind::everything()
    }

    fn state(&self) -> MutexGuard<'_, SysinfoState> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("Process table lock poisoned, continuing with recovered state");
                poisoned.into_inner()
            }
        }
    }
}

impl ProcessSource for SysinfoProcessSource {
    fn snapshot(&self) -> ProcessTable {
        let mut state = self.state();
        let SysinfoState { system, users } = &mut *state;
        system.refresh_processes_specifics(ProcessesToUpdate::All, true, Self::refresh_kind());
        users.refresh();

        let table = ProcessTable::from_entries(
            system
                .processes()
                .values()
                .map(|process| to_meta(process, users)),
        );
        debug!("Process table refreshed: {} processes", table.len());
        table
    }

    fn lookup(&self, pid: u32) -> Option<ProcessMeta> {
        let mut state = self.state();
        let SysinfoState { system, users } = &mut *state;
        let sys_pid = Pid::from_u32(pid);
        system.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[sys_pid]),
            true,
            Self::refresh_kind(),
        );
        let process = system.process(sys_pid)?;

        // The cached list only goes stale when an account was added since.
        if let Some(uid) = process.user_id() {
            if users.get_user_by_id(uid).is_none() {
                users.refresh();
            }
        }
        Some(to_meta(process, users))
    }
}

fn to_meta(process: &sysinfo::Process, users: &Users) -> ProcessMeta {
    let cmdline = process
        .cmd()
        .iter()
        .map(|part| part.to_string_lossy())
        .collect::<Vec<_>>()
        .join(" ");
    let username = process
        .user_id()
        .and_then(|uid| users.get_user_by_id(uid))
        .map(|user| user.name().to_string());

    ProcessMeta {
        pid: process.pid().as_u32(),
        parent_pid: process.parent().map(|p| p.as_u32()),
        name: process.name().to_string_lossy().into_owned(),
        exe: process
            .exe()
            .map(|p| p.display().to_string())
            .unwrap_or_default(),
        cmdline,
        user_id: process.user_id().and_then(raw_uid),
        username,
        state: match process.status() {
            ProcessStatus::Zombie | ProcessStatus::Dead => RunState::Zombie,
            _ => RunState::Running,
        },
    }
}

#[cfg(unix)]
fn raw_uid(uid: &sysinfo::Uid) -> Option<u32> {
    Some(**uid)
}

#[cfg(not(unix))]
fn raw_uid(_uid: &sysinfo::Uid) -> Option<u32> {
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_lookup_by_pid() {
        let table = ProcessTable::from_entries(vec![
            ProcessMeta::new(10, "node").with_parent(5),
            ProcessMeta::new(5, "npm"),
        ]);
        assert_eq!(table.len(), 2);
        assert_eq!(table.get(10).and_then(|p| p.parent_pid), Some(5));
        assert!(table.get(99).is_none());
    }

    #[test]
    fn test_sysinfo_sees_own_process() {
        let source = SysinfoProcessSource::new();
        let me = source.lookup(std::process::id());
        assert!(me.is_some(), "own pid must be visible in the process table");
        assert!(me.map(|m| m.is_alive()).unwrap_or(false));
    }

    #[test]
    fn test_repeated_lookups_agree_with_full_table() {
        let source = SysinfoProcessSource::new();
        let pid = std::process::id();

        let from_table = source.snapshot().get(pid).cloned();
        let first = source.lookup(pid);
        let second = source.lookup(pid);

        let first = first.expect("own pid visible");
        assert_eq!(first.username, second.and_then(|m| m.username));
        assert_eq!(
            first.username,
            from_table.and_then(|m| m.username),
            "lookup must resolve the same owner as the full scan"
        );
    }
}
