//! Immutable scan results.
//!
//! A `Snapshot` is built once per scan cycle from classified bindings and
//! never mutated afterwards; the next cycle supersedes it. Bindings are
//! partitioned into user/system groups, each sorted by (port, pid), and a
//! fingerprint over the sorted data makes semantic equality cheap to test.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use serde::{Serialize, Serializer};
use std::fmt;
use std::hash::{BuildHasher, Hash, Hasher};

use crate::binding::Binding;

/// Fixed seeds so equal content always hashes equally within a build.
static FINGERPRINT_STATE: Lazy<ahash::RandomState> = Lazy::new(|| {
    ahash::RandomState::with_seeds(
        0x6865_7261_6b6c_6573,
        0x706f_7274_6d67_7231,
        0x736e_6170_7368_6f74,
        0x6669_6e67_6572_7072,
    )
});

/// 64-bit content digest of a snapshot's bindings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint(u64);

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

impl Serialize for Fingerprint {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Group sizes, always equal to the partitioned lengths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Counts {
    pub user: usize,
    pub system: usize,
}

/// Partitioned binding lists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SnapshotData {
    pub user: Vec<Binding>,
    pub system: Vec<Binding>,
}

/// Result of one scan cycle.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    timestamp: DateTime<Utc>,
    counts: Counts,
    is_privileged_observer: bool,
    data: SnapshotData,
    fingerprint: Fingerprint,
}

impl Snapshot {
    /// Partitions, sorts, counts and fingerprints `bindings`.
    pub fn build(bindings: Vec<Binding>, is_privileged_observer: bool, timestamp: DateTime<Utc>) -> Self {
        let (mut system, mut user): (Vec<Binding>, Vec<Binding>) =
            bindings.into_iter().partition(|b| b.is_system_owned);

        sort_bindings(&mut user);
        sort_bindings(&mut system);

        let counts = Counts {
            user: user.len(),
            system: system.len(),
        };
        let fingerprint = compute_fingerprint(&user, &system);

        Self {
            timestamp,
            counts,
            is_privileged_observer,
            data: SnapshotData { user, system },
            fingerprint,
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn counts(&self) -> Counts {
        self.counts
    }

    pub fn is_privileged_observer(&self) -> bool {
        self.is_privileged_observer
    }

    pub fn user_bindings(&self) -> &[Binding] {
        &self.data.user
    }

    pub fn system_bindings(&self) -> &[Binding] {
        &self.data.system
    }

    pub fn fingerprint(&self) -> Fingerprint {
        self.fingerprint
    }

    pub fn total(&self) -> usize {
        self.counts.user + self.counts.system
    }

    /// All bindings, user group first.
    pub fn iter(&self) -> impl Iterator<Item = &Binding> {
        self.data.user.iter().chain(self.data.system.iter())
    }
}

/// Orders by port, then pid; protocol and addresses only break the
/// remaining ties so the order is total.
pub fn sort_bindings(bindings: &mut [Binding]) {
    bindings.sort_by(|a, b| {
        a.port
            .cmp(&b.port)
            .then(a.pid.cmp(&b.pid))
            .then(a.protocol.cmp(&b.protocol))
            .then_with(|| a.local_address.cmp(&b.local_address))
    });
}

/// Digest over both sorted groups. The group boundary is hashed too, so
/// moving a binding between groups changes the fingerprint.
pub fn compute_fingerprint(user: &[Binding], system: &[Binding]) -> Fingerprint {
    let mut hasher = FINGERPRINT_STATE.build_hasher();
    user.len().hash(&mut hasher);
    for binding in user {
        binding.hash_semantic(&mut hasher);
    }
    system.len().hash(&mut hasher);
    for binding in system {
        binding.hash_semantic(&mut hasher);
    }
    Fingerprint(hasher.finish())
}

/// Whether this process runs with elevated rights (effective uid 0).
pub fn is_privileged_observer() -> bool {
    nix::unistd::geteuid().is_root()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::{ConnectionState, Protocol};
    use crate::process::AppType;

    fn binding(port: u16, pid: u32, name: &str, system: bool) -> Binding {
        Binding {
            port,
            protocol: Protocol::Tcp,
            local_address: format!("127.0.0.1:{}", port),
            remote_address: String::new(),
            connection_state: ConnectionState::Listen,
            pid,
            process_name: name.to_string(),
            executable_path: String::new(),
            command_line: String::new(),
            username: None,
            app_type: AppType::Other,
            is_system_owned: system,
            has_parent_controller: false,
            parent: None,
        }
    }

    #[test]
    fn test_partition_sort_and_counts() {
        let snap = Snapshot::build(
            vec![
                binding(8080, 5, "b", false),
                binding(22, 1, "sshd", true),
                binding(3000, 9, "c", false),
                binding(3000, 2, "a", false),
            ],
            false,
            Utc::now(),
        );
        assert_eq!(snap.counts(), Counts { user: 3, system: 1 });
        let order: Vec<(u16, u32)> = snap.user_bindings().iter().map(|b| (b.port, b.pid)).collect();
        assert_eq!(order, vec![(3000, 2), (3000, 9), (8080, 5)]);
        assert_eq!(snap.system_bindings()[0].process_name, "sshd");
        assert_eq!(snap.total(), 4);
    }

    #[test]
    fn test_fingerprint_ignores_input_order_and_timestamp() {
        let a = vec![binding(1, 1, "x", false), binding(2, 2, "y", true)];
        let b = vec![binding(2, 2, "y", true), binding(1, 1, "x", false)];
        let s1 = Snapshot::build(a, false, Utc::now());
        let s2 = Snapshot::build(b, true, Utc::now() + chrono::Duration::seconds(5));
        assert_eq!(s1.fingerprint(), s2.fingerprint());
    }

    #[test]
    fn test_fingerprint_sees_semantic_changes() {
        let base = Snapshot::build(vec![binding(1, 1, "x", false)], false, Utc::now());
        let renamed = Snapshot::build(vec![binding(1, 1, "z", false)], false, Utc::now());
        let regrouped = Snapshot::build(vec![binding(1, 1, "x", true)], false, Utc::now());
        let mut closing = binding(1, 1, "x", false);
        closing.connection_state = ConnectionState::CloseWait;
        let restated = Snapshot::build(vec![closing], false, Utc::now());

        assert_ne!(base.fingerprint(), renamed.fingerprint());
        assert_ne!(base.fingerprint(), regrouped.fingerprint());
        assert_ne!(base.fingerprint(), restated.fingerprint());
    }

    #[test]
    fn test_snapshot_wire_shape() {
        let snap = Snapshot::build(vec![binding(3000, 111, "node", false)], true, Utc::now());
        let json = serde_json::to_value(&snap).expect("snapshot serializes");
        assert_eq!(json["counts"]["user"], 1);
        assert_eq!(json["isPrivilegedObserver"], true);
        let row = &json["data"]["user"][0];
        assert_eq!(row["port"], 3000);
        assert_eq!(row["name"], "node");
        assert_eq!(row["type"], "TCP");
        assert_eq!(row["status"], "LISTEN");
        assert_eq!(row["appType"], "other");
        assert_eq!(row["hasParentController"], false);
        assert!(row.get("parentPid").is_none());
        assert_eq!(json["fingerprint"].as_str().map(|s| s.len()), Some(16));
    }
}
