//! CLI command implementations for herakles-port-manager.
//!
//! This module provides implementations for all CLI subcommands:
//! - `check`: Runtime requirement validation
//! - `config`: Configuration file generation
//! - `test`: Scan cycle dry runs
//! - `app-types`: Classification table listing
//! - `kill`: Process termination from the shell

pub mod app_types;
pub mod check;
pub mod config;
pub mod kill;

// Re-export command functions
pub use app_types::command_app_types;
pub use check::command_check;
pub use config::command_config;
pub use kill::command_kill;
pub use test::command_test;
