//! Publish gate for scan results.

use crate::snapshot::{Fingerprint, Snapshot};

/// True on the first snapshot since start, or whenever the fingerprint
/// differs from the last published one.
///
/// Refresh requests do not go through here; the hub resends its current
/// snapshot unconditionally.
pub fn should_publish(previous: Option<Fingerprint>, snapshot: &Snapshot) -> bool {
    match previous {
        None => true,
        Some(prev) => prev != snapshot.fingerprint(),
    }
}
