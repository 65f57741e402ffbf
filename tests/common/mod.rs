//! In-memory OS fakes shared by the integration tests.

#![allow(dead_code)]

use herakles_port_manager::{
    ConnectionState, Liveness, ProcessControl, ProcessMeta, ProcessSource, ProcessTable, Protocol,
    RawSocket, ScanError, SocketSource, TerminationError, TerminationSignal,
};
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub fn tcp_listen(port: u16, pid: u32) -> RawSocket {
    RawSocket {
        protocol: Protocol::Tcp,
        local_addr: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
        local_port: port,
        remote: Some((IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0)),
        state: ConnectionState::Listen,
        pids: if pid == 0 { Vec::new() } else { vec![pid] },
    }
}

/// Socket table that can be swapped, delayed or made to fail.
#[derive(Default)]
pub struct FakeSockets {
    sockets: Mutex<Vec<RawSocket>>,
    fail: AtomicBool,
    delay_ms: AtomicU64,
}

impl FakeSockets {
    pub fn new(sockets: Vec<RawSocket>) -> Self {
        Self {
            sockets: Mutex::new(sockets),
            ..Self::default()
        }
    }

    pub fn set(&self, sockets: Vec<RawSocket>) {
        *self.sockets.lock().unwrap() = sockets;
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn set_delay(&self, delay: Duration) {
        self.delay_ms.store(delay.as_millis() as u64, Ordering::SeqCst);
    }
}

impl SocketSource for FakeSockets {
    fn enumerate(&self) -> Result<Vec<RawSocket>, ScanError> {
        let delay = self.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            std::thread::sleep(Duration::from_millis(delay));
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(ScanError::EnumerationFailure("socket table unavailable".into()));
        }
        Ok(self.sockets.lock().unwrap().clone())
    }
}

/// Process table backed by a plain list.
#[derive(Default)]
pub struct FakeProcesses {
    entries: Mutex<Vec<ProcessMeta>>,
}

impl FakeProcesses {
    pub fn new(entries: Vec<ProcessMeta>) -> Self {
        Self {
            entries: Mutex::new(entries),
        }
    }

    pub fn remove(&self, pid: u32) {
        self.entries.lock().unwrap().retain(|p| p.pid != pid);
    }
}

impl ProcessSource for FakeProcesses {
    fn snapshot(&self) -> ProcessTable {
        ProcessTable::from_entries(self.entries.lock().unwrap().clone())
    }

    fn lookup(&self, pid: u32) -> Option<ProcessMeta> {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .find(|p| p.pid == pid)
            .cloned()
    }
}

/// How a fake process reacts to signals.
#[derive(Debug, Clone, Copy)]
pub struct Behavior {
    pub dies_on_term: bool,
    pub dies_on_kill: bool,
    pub denied: bool,
}

impl Behavior {
    pub const COOPERATIVE: Behavior = Behavior {
        dies_on_term: true,
        dies_on_kill: true,
        denied: false,
    };
    pub const STUBBORN: Behavior = Behavior {
        dies_on_term: false,
        dies_on_kill: true,
        denied: false,
    };
    pub const UNKILLABLE: Behavior = Behavior {
        dies_on_term: false,
        dies_on_kill: false,
        denied: false,
    };
    pub const FOREIGN: Behavior = Behavior {
        dies_on_term: false,
        dies_on_kill: false,
        denied: true,
    };
}

/// Signal delivery against a map of live pids; records every signal sent.
#[derive(Default)]
pub struct FakeControl {
    alive: Mutex<HashMap<u32, Behavior>>,
    sent: Mutex<Vec<(u32, TerminationSignal)>>,
    cascade: Mutex<Option<(u32, u32, Arc<FakeProcesses>)>>,
}

impl FakeControl {
    pub fn with(processes: &[(u32, Behavior)]) -> Self {
        Self {
            alive: Mutex::new(processes.iter().copied().collect()),
            sent: Mutex::new(Vec::new()),
            cascade: Mutex::new(None),
        }
    }

    /// When `child` dies, `parent` exits too and vanishes from `processes`.
    pub fn cascade(&self, child: u32, parent: u32, processes: Arc<FakeProcesses>) {
        *self.cascade.lock().unwrap() = Some((child, parent, processes));
    }

    pub fn is_alive(&self, pid: u32) -> bool {
        self.alive.lock().unwrap().contains_key(&pid)
    }

    pub fn signals(&self) -> Vec<(u32, TerminationSignal)> {
        self.sent.lock().unwrap().clone()
    }
}

impl ProcessControl for FakeControl {
    fn probe(&self, pid: u32) -> Liveness {
        if self.is_alive(pid) {
            Liveness::Alive
        } else {
            Liveness::Gone
        }
    }

    fn send(&self, pid: u32, signal: TerminationSignal) -> Result<(), TerminationError> {
        let mut alive = self.alive.lock().unwrap();
        let Some(behavior) = alive.get(&pid).copied() else {
            return Ok(());
        };
        if behavior.denied {
            return Err(TerminationError::PermissionDenied(pid));
        }
        self.sent.lock().unwrap().push((pid, signal));
        let dies = match signal {
            TerminationSignal::Graceful => behavior.dies_on_term,
            TerminationSignal::Forceful => behavior.dies_on_kill,
        };
        if dies {
            alive.remove(&pid);
            if let Some((child, parent, processes)) = self.cascade.lock().unwrap().as_ref() {
                if *child == pid {
                    alive.remove(parent);
                    processes.remove(*parent);
                }
            }
        }
        Ok(())
    }
}
