//! Application state management for the port manager.
//!
//! This module defines the shared application state that is passed
//! to HTTP handlers.

use herakles_port_manager::{HealthStats, PublicationHub, TerminationOrchestrator};
use prometheus::Registry;
use std::sync::Arc;
use std::time::Instant;

use crate::config::Config;
use crate::metrics::PortMetrics;

/// Type alias for shared application state.
pub type SharedState = Arc<AppState>;

/// Global application state shared across requests.
///
/// The scan loop is not reachable from here; handlers only read what it
/// published to the hub.
pub struct AppState {
    pub config: Arc<Config>,
    pub hub: Arc<PublicationHub>,
    pub orchestrator: TerminationOrchestrator,
    pub health_stats: Arc<HealthStats>,
    pub registry: Registry,
    pub metrics: PortMetrics,
    /// Server start time for uptime calculation.
    pub start_time: Instant,
}
