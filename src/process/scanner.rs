//! Socket-to-process join.
//!
//! Turns the raw socket table plus a process-table snapshot into binding
//! records. A socket whose owner cannot be resolved still yields a binding
//! (pid 0 or placeholder metadata); nothing is dropped for lack of metadata.

use ahash::AHashSet as HashSet;
use once_cell::sync::Lazy;
use rayon::prelude::*;
use tracing::debug;

use crate::binding::{Binding, ConnectionState, Protocol, UNKNOWN_PROCESS};
use crate::process::classifier::{classify, detect_parent_link, AppType};
use crate::process::sockets::RawSocket;
use crate::process::table::{ProcessMeta, ProcessTable};

/// First uid handed out to regular (human) accounts.
#[cfg(target_os = "macos")]
pub const FIRST_REGULAR_UID: u32 = 500;
#[cfg(not(target_os = "macos"))]
pub const FIRST_REGULAR_UID: u32 = 1000;

/// Well-known system executables, compared lower-cased.
static SYSTEM_PROCESS_NAMES: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        // Windows service hosts and session infrastructure
        "system",
        "svchost.exe",
        "services.exe",
        "lsass.exe",
        "csrss.exe",
        "wininit.exe",
        "winlogon.exe",
        "smss.exe",
        "dwm.exe",
        "explorer.exe",
        "spoolsv.exe",
        "searchindexer.exe",
        "msdtc.exe",
        "fontdrvhost.exe",
        "registry",
        "memory compression",
        "ntoskrnl.exe",
        "audiodg.exe",
        "conhost.exe",
        "dllhost.exe",
        "sihost.exe",
        "taskhostw.exe",
        "runtimebroker.exe",
        "ctfmon.exe",
        "wmiprvse.exe",
        "wudfhost.exe",
        // unix daemons
        "systemd",
        "systemd-resolve",
        "systemd-resolved",
        "systemd-network",
        "systemd-networkd",
        "systemd-timesyncd",
        "init",
        "sshd",
        "cupsd",
        "cups-browsed",
        "avahi-daemon",
        "chronyd",
        "ntpd",
        "dnsmasq",
        "rpcbind",
        "rpc.statd",
        "dhclient",
        "dhcpcd",
        "networkmanager",
        "launchd",
        "mdnsresponder",
        "rapportd",
        "sharingd",
        "controlcenter",
    ]
    .into_iter()
    .collect()
});

/// Account names that always denote a system service identity.
const SYSTEM_ACCOUNT_MARKERS: &[&str] = &["SYSTEM", "LOCAL SERVICE", "NETWORK SERVICE"];

/// Ports below this are privileged on unix and reserved for services.
const PRIVILEGED_PORT_LIMIT: u16 = 1024;

/// Options controlling which sockets become bindings.
#[derive(Debug, Clone, Copy, Default)]
pub struct JoinOptions {
    /// Only keep TCP sockets in LISTEN (UDP is always kept).
    pub listen_only: bool,
}

/// Determines if a socket should become a binding.
pub fn should_include_socket(socket: &RawSocket, opts: &JoinOptions) -> bool {
    if socket.local_port == 0 {
        return false;
    }
    if opts.listen_only
        && socket.protocol == Protocol::Tcp
        && socket.state != ConnectionState::Listen
    {
        return false;
    }
    true
}

/// Heuristic: owned by a system account or a well-known system executable.
/// Without metadata, falls back to the privileged-port rule.
pub fn is_system_owned(meta: Option<&ProcessMeta>, port: u16) -> bool {
    let Some(meta) = meta else {
        return port < PRIVILEGED_PORT_LIMIT;
    };

    if SYSTEM_PROCESS_NAMES.contains(meta.name.to_lowercase().as_str()) {
        return true;
    }
    if let Some(user) = &meta.username {
        let upper = user.to_uppercase();
        if SYSTEM_ACCOUNT_MARKERS.iter().any(|m| upper.contains(m)) {
            return true;
        }
    }
    match meta.user_id {
        Some(uid) => uid < FIRST_REGULAR_UID,
        None => meta.username.is_none() && port < PRIVILEGED_PORT_LIMIT,
    }
}

/// Builds a binding for `(socket, pid)` from whatever metadata is available.
fn resolve_binding(socket: &RawSocket, pid: u32, table: &ProcessTable) -> Binding {
    let meta = if pid == 0 { None } else { table.get(pid) };

    let (process_name, executable_path, command_line, username) = match meta {
        Some(m) => (
            if m.name.is_empty() {
                UNKNOWN_PROCESS.to_string()
            } else {
                m.name.clone()
            },
            m.exe.clone(),
            m.cmdline.clone(),
            m.username.clone(),
        ),
        None => (UNKNOWN_PROCESS.to_string(), String::new(), String::new(), None),
    };

    Binding {
        port: socket.local_port,
        protocol: socket.protocol,
        local_address: socket.local_endpoint(),
        remote_address: socket.remote_endpoint(),
        connection_state: socket.state,
        pid,
        process_name,
        executable_path,
        command_line,
        username,
        app_type: AppType::Other,
        is_system_owned: is_system_owned(meta, socket.local_port),
        has_parent_controller: false,
        parent: None,
    }
}

/// Joins sockets with process metadata.
///
/// Each (port, protocol, pid) appears once; a socket shared by several pids
/// yields one binding per pid, a socket without any pid yields one binding
/// with pid 0. When several sockets collapse onto one key the LISTEN socket
/// wins, then the lowest local/remote endpoint, so the choice does not
/// depend on OS enumeration order. The result is otherwise unordered;
/// ordering is the snapshot's job.
pub fn join_bindings(sockets: &[RawSocket], table: &ProcessTable, opts: &JoinOptions) -> Vec<Binding> {
    let mut candidates: Vec<(JoinKey, &RawSocket)> = Vec::with_capacity(sockets.len());
    let mut skipped = 0usize;

    for socket in sockets {
        if !should_include_socket(socket, opts) {
            skipped += 1;
            continue;
        }
        let pids: &[u32] = if socket.pids.is_empty() { &[0] } else { &socket.pids };
        for &pid in pids {
            candidates.push((JoinKey::new(socket, pid), socket));
        }
    }

    candidates.sort_by(|a, b| a.0.cmp(&b.0));
    candidates.dedup_by(|later, first| later.0.binding_key() == first.0.binding_key());

    debug!(
        "Join: {} sockets, {} skipped, {} unique bindings",
        sockets.len(),
        skipped,
        candidates.len()
    );

    candidates
        .par_iter()
        .map(|(key, socket)| resolve_binding(socket, key.pid, table))
        .collect()
}

/// Total order used to pick one socket per binding key.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
struct JoinKey {
    port: u16,
    protocol: Protocol,
    pid: u32,
    not_listening: bool,
    local: String,
    remote: String,
}

impl JoinKey {
    fn new(socket: &RawSocket, pid: u32) -> Self {
        Self {
            port: socket.local_port,
            protocol: socket.protocol,
            pid,
            not_listening: socket.state != ConnectionState::Listen,
            local: socket.local_endpoint(),
            remote: socket.remote_endpoint(),
        }
    }

    fn binding_key(&self) -> (u16, Protocol, u32) {
        (self.port, self.protocol, self.pid)
    }
}

/// Sets app type and parent-controller link on every binding.
pub fn classify_bindings(bindings: &mut [Binding], table: &ProcessTable) {
    bindings.par_iter_mut().for_each(|binding| {
        binding.app_type = classify(binding);
        let parent = if binding.pid == 0 {
            None
        } else {
            detect_parent_link(binding.pid, table)
        };
        binding.set_parent(parent);
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    fn tcp_listen(port: u16, pids: Vec<u32>) -> RawSocket {
        RawSocket {
            protocol: Protocol::Tcp,
            local_addr: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            local_port: port,
            remote: Some((IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0)),
            state: ConnectionState::Listen,
            pids,
        }
    }

    // -------------------------------------------------------------------------
    // Tests for should_include_socket
    // -------------------------------------------------------------------------

    #[test]
    fn test_port_zero_is_skipped() {
        assert!(!should_include_socket(&tcp_listen(0, vec![1]), &JoinOptions::default()));
        assert!(should_include_socket(&tcp_listen(80, vec![1]), &JoinOptions::default()));
    }

    #[test]
    fn test_listen_only_keeps_udp() {
        let opts = JoinOptions { listen_only: true };
        let mut established = tcp_listen(51000, vec![7]);
        established.state = ConnectionState::Established;
        let udp = RawSocket {
            protocol: Protocol::Udp,
            state: ConnectionState::None,
            remote: None,
            ..tcp_listen(53, vec![8])
        };
        assert!(!should_include_socket(&established, &opts));
        assert!(should_include_socket(&udp, &opts));
        assert!(should_include_socket(&tcp_listen(3000, vec![9]), &opts));
    }

    // -------------------------------------------------------------------------
    // Tests for is_system_owned
    // -------------------------------------------------------------------------

    #[test]
    fn test_system_owned_by_name_and_account() {
        assert!(is_system_owned(Some(&ProcessMeta::new(4, "svchost.exe")), 135));
        assert!(is_system_owned(Some(&ProcessMeta::new(4, "sshd")), 22));
        let svc = ProcessMeta::new(900, "agent.exe");
        let svc = ProcessMeta {
            username: Some("NT AUTHORITY\\LOCAL SERVICE".into()),
            ..svc
        };
        assert!(is_system_owned(Some(&svc), 5000));
    }

    #[test]
    fn test_system_owned_by_uid() {
        let daemon = ProcessMeta::new(222, "postgres").with_user(120, "postgres");
        let dev = ProcessMeta::new(111, "node").with_user(FIRST_REGULAR_UID, "alice");
        assert!(is_system_owned(Some(&daemon), 5432));
        assert!(!is_system_owned(Some(&dev), 3000));
    }

    #[test]
    fn test_unresolved_falls_back_to_port() {
        assert!(is_system_owned(None, 443));
        assert!(!is_system_owned(None, 8080));
    }

    // -------------------------------------------------------------------------
    // Tests for join_bindings
    // -------------------------------------------------------------------------

    #[test]
    fn test_join_dedupes_and_expands_pids() {
        let table = ProcessTable::from_entries(vec![
            ProcessMeta::new(10, "nginx"),
            ProcessMeta::new(11, "nginx"),
        ]);
        let sockets = vec![
            tcp_listen(80, vec![10, 11]),
            // IPv6 twin of the same listener
            RawSocket {
                local_addr: IpAddr::V6(std::net::Ipv6Addr::UNSPECIFIED),
                ..tcp_listen(80, vec![10])
            },
        ];
        let bindings = join_bindings(&sockets, &table, &JoinOptions::default());
        assert_eq!(bindings.len(), 2);
        let mut pids: Vec<u32> = bindings.iter().map(|b| b.pid).collect();
        pids.sort();
        assert_eq!(pids, vec![10, 11]);
    }

    #[test]
    fn test_join_choice_is_order_independent() {
        let table = ProcessTable::from_entries(vec![ProcessMeta::new(111, "node")]);
        let mut accepted = tcp_listen(3000, vec![111]);
        accepted.state = ConnectionState::Established;
        accepted.local_addr = IpAddr::V4(Ipv4Addr::LOCALHOST);
        accepted.remote = Some((IpAddr::V4(Ipv4Addr::LOCALHOST), 52000));
        let listener = tcp_listen(3000, vec![111]);

        let a = join_bindings(&[accepted.clone(), listener.clone()], &table, &JoinOptions::default());
        let b = join_bindings(&[listener, accepted], &table, &JoinOptions::default());
        assert_eq!(a, b);
        assert_eq!(a.len(), 1);
        assert_eq!(a[0].connection_state, ConnectionState::Listen);
        assert_eq!(a[0].local_address, "0.0.0.0:3000");
    }

    #[test]
    fn test_join_keeps_unresolved_socket() {
        let table = ProcessTable::default();
        let bindings = join_bindings(
            &[tcp_listen(8080, vec![]), tcp_listen(9090, vec![4242])],
            &table,
            &JoinOptions::default(),
        );
        assert_eq!(bindings.len(), 2);
        for b in &bindings {
            assert_eq!(b.process_name, UNKNOWN_PROCESS);
            assert_eq!(b.app_type, AppType::Other);
        }
        assert!(bindings.iter().any(|b| b.pid == 0));
        assert!(bindings.iter().any(|b| b.pid == 4242));
    }

    #[test]
    fn test_classify_bindings_sets_tag_and_parent() {
        let table = ProcessTable::from_entries(vec![
            ProcessMeta::new(111, "node").with_parent(50).with_cmdline("node index.js"),
            ProcessMeta::new(50, "nodemon"),
        ]);
        let mut bindings = join_bindings(&[tcp_listen(3000, vec![111])], &table, &JoinOptions::default());
        classify_bindings(&mut bindings, &table);
        assert_eq!(bindings[0].app_type, AppType::Node);
        assert!(bindings[0].has_parent_controller);
        assert_eq!(bindings[0].parent.as_ref().map(|p| p.parent_pid), Some(50));
    }
}
