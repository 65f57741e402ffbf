//! HTTP endpoint handlers for the port manager.
//!
//! This module provides handlers for all HTTP endpoints:
//! - `/`: Plain-text landing page
//! - `/api/ports`: Pull access to the current snapshot
//! - `/api/kill/{pid}`, `/api/kill-tree/{pid}`: Termination
//! - `/ws`: WebSocket push channel
//! - `/health`: Health check endpoint
//! - `/metrics`: Prometheus metrics endpoint
//! - `/config`: Configuration display endpoint
//! - `/app-types`: Classification table

pub mod app_types;
pub mod config;
pub mod health;
pub mod kill;
pub mod metrics;
pub mod ports;
pub mod root;
pub mod ws;

// Re-export handlers
pub use app_types::app_types_handler;
pub use config::config_handler;
pub use health::health_handler;
pub use kill::{kill_handler, kill_tree_handler};
pub use metrics::metrics_handler;
pub use ports::ports_handler;
pub use root::root_handler;
pub use ws::ws_handler;
