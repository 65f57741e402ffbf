//! Binding records: one process's use of one local network endpoint.

use serde::Serialize;
use std::fmt;
use std::hash::{Hash, Hasher};

use crate::process::classifier::AppType;

/// Placeholder shown when a process name cannot be resolved.
pub const UNKNOWN_PROCESS: &str = "Unknown";

/// Transport protocol of a binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Protocol {
    Tcp,
    Udp,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Tcp => f.write_str("TCP"),
            Protocol::Udp => f.write_str("UDP"),
        }
    }
}

/// TCP connection state. UDP bindings always carry `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectionState {
    Closed,
    Listen,
    SynSent,
    SynReceived,
    Established,
    FinWait1,
    FinWait2,
    CloseWait,
    Closing,
    LastAck,
    TimeWait,
    DeleteTcb,
    Unknown,
    None,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Closed => "CLOSED",
            ConnectionState::Listen => "LISTEN",
            ConnectionState::SynSent => "SYN_SENT",
            ConnectionState::SynReceived => "SYN_RECEIVED",
            ConnectionState::Established => "ESTABLISHED",
            ConnectionState::FinWait1 => "FIN_WAIT_1",
            ConnectionState::FinWait2 => "FIN_WAIT_2",
            ConnectionState::CloseWait => "CLOSE_WAIT",
            ConnectionState::Closing => "CLOSING",
            ConnectionState::LastAck => "LAST_ACK",
            ConnectionState::TimeWait => "TIME_WAIT",
            ConnectionState::DeleteTcb => "DELETE_TCB",
            ConnectionState::Unknown => "UNKNOWN",
            ConnectionState::None => "NONE",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Detected controller process that would respawn the binding's process.
///
/// A lookup relation only: recomputed every scan and again right before a
/// tree kill, never carried across cycles.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParentLink {
    pub parent_pid: u32,
    pub parent_name: String,
}

/// One process's occupancy of one local port/protocol combination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Binding {
    pub port: u16,
    #[serde(rename = "type")]
    pub protocol: Protocol,
    /// `ip:port` of the local endpoint.
    #[serde(rename = "address")]
    pub local_address: String,
    /// `ip:port` of the peer, empty for listening and UDP sockets.
    pub remote_address: String,
    #[serde(rename = "status")]
    pub connection_state: ConnectionState,
    /// 0 when the owning process could not be resolved.
    pub pid: u32,
    #[serde(rename = "name")]
    pub process_name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub executable_path: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub command_line: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    pub app_type: AppType,
    pub is_system_owned: bool,
    pub has_parent_controller: bool,
    #[serde(flatten)]
    pub parent: Option<ParentLink>,
}

impl Binding {
    /// Attaches (or clears) the parent-controller link, keeping the
    /// `has_parent_controller` flag consistent with it.
    pub fn set_parent(&mut self, parent: Option<ParentLink>) {
        self.has_parent_controller = parent.is_some();
        self.parent = parent;
    }

    /// Uniqueness key within one snapshot.
    pub fn key(&self) -> (u16, Protocol, u32) {
        (self.port, self.protocol, self.pid)
    }

    /// Feeds every semantically meaningful field into `state`.
    ///
    /// Executable path and command line are covered indirectly through the
    /// classification they produce.
    pub fn hash_semantic<H: Hasher>(&self, state: &mut H) {
        self.port.hash(state);
        self.protocol.hash(state);
        self.pid.hash(state);
        self.process_name.hash(state);
        self.connection_state.hash(state);
        self.local_address.hash(state);
        self.remote_address.hash(state);
        self.username.hash(state);
        self.app_type.hash(state);
        self.is_system_owned.hash(state);
        self.parent.hash(state);
    }
}
