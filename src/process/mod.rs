//! Process-related modules for socket discovery, identity and classification.
//!
//! This module provides:
//! - `sockets`: Socket table enumeration
//! - `table`: Process table snapshots and single-pid lookups
//! - `scanner`: Socket-to-process join and the system-owned heuristic
//! - `classifier`: Workload classification and parent-controller detection

pub mod classifier;
pub mod scanner;
pub mod sockets;
pub mod table;

// Re-export commonly used types
pub use classifier::{
    classify, classify_process, detect_parent_link, match_supervisor, AppType, ALL_APP_TYPES,
    RUNTIME_RULES, SUPERVISOR_RULES,
};
pub use scanner::{classify_bindings, is_system_owned, join_bindings, JoinOptions};
pub use sockets::{NetstatSocketSource, RawSocket, SocketSource};
pub use table::{ProcessMeta, ProcessSource, ProcessTable, RunState, SysinfoProcessSource};
