//! Startup requirement validation for herakles-port-manager.
//!
//! These checks run once before the scan loop starts. Only an unreadable
//! socket table is fatal; everything else degrades to fewer resolved
//! processes and is reported as a warning.

use anyhow::{bail, Context, Result};
use herakles_port_manager::{
    NetstatSocketSource, ProcessSource, SocketSource, SysinfoProcessSource, UNKNOWN_PROCESS,
};
use nix::unistd::geteuid;
use std::fs;
use tracing::{info, warn};

/// Summary of what the scanner will be able to see.
#[derive(Debug, Clone, Copy)]
pub struct RequirementReport {
    pub sockets: usize,
    pub unowned_sockets: usize,
    pub processes: usize,
    pub privileged: bool,
}

/// Validate all runtime requirements
pub fn validate_requirements() -> Result<RequirementReport> {
    info!("🔍 Validating runtime requirements...");

    let privileged = check_user_privileges();
    let (sockets, unowned_sockets) = check_socket_table()?;
    let processes = check_process_table()?;
    check_proc_visibility();

    info!("✅ All runtime requirements validated");
    Ok(RequirementReport {
        sockets,
        unowned_sockets,
        processes,
        privileged,
    })
}

/// Check if running with sufficient privileges
pub fn check_user_privileges() -> bool {
    if geteuid().is_root() {
        info!("✅ Running as root (uid=0), all processes are killable");
        true
    } else {
        warn!("⚠️  Not running as root - sockets of other users show as {UNKNOWN_PROCESS}");
        warn!("   and their processes cannot be terminated");
        false
    }
}

/// Enumerates the socket table once. Returns (total, without owning pid).
pub fn check_socket_table() -> Result<(usize, usize)> {
    let sockets = NetstatSocketSource
        .enumerate()
        .context("cannot enumerate the socket table")?;
    let unowned = sockets.iter().filter(|s| s.pids.is_empty()).count();
    info!(
        "✅ Socket table readable: {} sockets, {} without owning process",
        sockets.len(),
        unowned
    );
    Ok((sockets.len(), unowned))
}

/// Takes one process table snapshot.
pub fn check_process_table() -> Result<usize> {
    let table = SysinfoProcessSource::new().snapshot();
    if table.is_empty() {
        bail!("process table is empty, process identity cannot be resolved");
    }
    info!("✅ Process table readable: {} processes", table.len());
    Ok(table.len())
}

/// Checks whether other users' file descriptors are visible.
fn check_proc_visibility() {
    match fs::read_dir("/proc/1/fd") {
        Ok(_) => info!("✅ /proc access: socket owners of all users resolvable"),
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            warn!("⚠️  Cannot read /proc/1/fd - sockets of other users stay unresolved");
            warn!("   Solutions:");
            warn!("   1. Run as root");
            warn!("   2. Grant capabilities:");
            warn!("      setcap cap_dac_read_search,cap_sys_ptrace,cap_kill+ep /path/to/binary");
        }
        Err(e) => warn!("⚠️  Could not test /proc access: {}", e),
    }
}
