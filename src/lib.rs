//! Herakles Port Manager Library
//!
//! Discovers which processes are bound to which network ports, classifies
//! each binding's workload, and publishes the result to observers only when
//! it actually changed. A separate control path terminates processes, alone
//! or together with a supervising parent that would otherwise respawn them.
//!
//! # Pipeline
//!
//! - **Join** ([`process::join_bindings`]): socket table × process table → bindings
//! - **Classify** ([`process::classify_bindings`]): app type and parent controller
//! - **Build** ([`Snapshot::build`]): partition, sort, count, fingerprint
//! - **Detect** ([`should_publish`]): fingerprint comparison
//! - **Publish** ([`PublicationHub`]): per-observer bounded queues
//!
//! [`ScanLoop`] drives these stages periodically; [`TerminationOrchestrator`]
//! is the independent termination path.
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use herakles_port_manager::{
//!     HealthStats, JoinOptions, NetstatSocketSource, PublicationHub, ScanLoop,
//!     ScanLoopConfig, Scanner, SysinfoProcessSource,
//! };
//!
//! # async fn run() {
//! let scanner = Scanner::new(
//!     Arc::new(NetstatSocketSource),
//!     Arc::new(SysinfoProcessSource::new()),
//!     JoinOptions::default(),
//! );
//! let hub = Arc::new(PublicationHub::new(16));
//! let stats = Arc::new(HealthStats::new());
//! let (_shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
//!
//! ScanLoop::new(scanner, hub.clone(), stats, ScanLoopConfig::default()).spawn(shutdown_rx);
//!
//! let mut subscription = hub.subscribe();
//! if let Some(snapshot) = subscription.recv().await {
//!     println!("{} user bindings", snapshot.counts().user);
//! }
//! # }
//! ```

pub mod binding;
pub mod change_detector;
pub mod error;
pub mod health;
pub mod health_stats;
pub mod hub;
pub mod process;
pub mod scan_loop;
pub mod snapshot;
pub mod terminate;

// Re-export main types for convenience
pub use binding::{Binding, ConnectionState, ParentLink, Protocol, UNKNOWN_PROCESS};
pub use change_detector::should_publish;
pub use error::{ScanError, TerminationError, TerminationErrorKind};
pub use health::{evaluate_health, HealthCheck, HealthResponse, HealthStatus, HealthThresholds};
pub use health_stats::{HealthStats, TerminationOutcome};
pub use hub::{ObserverId, PublicationHub, PublishReport, Subscription};
pub use process::{
    AppType, JoinOptions, NetstatSocketSource, ProcessMeta, ProcessSource, ProcessTable, RawSocket,
    SocketSource, SysinfoProcessSource,
};
pub use scan_loop::{CycleOutput, ScanLoop, ScanLoopConfig, ScanState, Scanner, TickOutcome};
pub use snapshot::{Counts, Fingerprint, Snapshot};
pub use terminate::{
    Liveness, PidOutcome, PidRole, PidStatus, ProcessControl, SignalProcessControl,
    TerminationConfig, TerminationMode, TerminationOrchestrator, TerminationResult,
    TerminationSignal,
};
