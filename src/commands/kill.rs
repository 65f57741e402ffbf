//! Kill command implementation.
//!
//! Runs the termination orchestrator from the shell.

use std::sync::Arc;

use herakles_port_manager::{
    PidStatus, SignalProcessControl, SysinfoProcessSource, TerminationMode,
    TerminationOrchestrator,
};

use crate::config::Config;

/// Terminates `pid`, optionally together with its parent controller.
pub async fn command_kill(
    pid: u32,
    tree: bool,
    config: &Config,
) -> Result<(), Box<dyn std::error::Error>> {
    let mode = if tree {
        TerminationMode::Tree
    } else {
        TerminationMode::Single
    };

    println!("🛑 Herakles Port Manager - Terminate PID {} ({})", pid, mode);
    println!("==========================================");

    let orchestrator = TerminationOrchestrator::new(
        Arc::new(SysinfoProcessSource::new()),
        Arc::new(SignalProcessControl),
        config.termination_config(),
    );
    let result = orchestrator.terminate(pid, mode).await;

    for outcome in &result.affected_pids {
        let icon = match outcome.status {
            PidStatus::Terminated | PidStatus::AlreadyGone => "✅",
            PidStatus::Unconfirmed => "⏱️ ",
            PidStatus::Failed => "❌",
        };
        println!(
            "   {} {:?} {} (PID: {}) - {}",
            icon, outcome.role, outcome.name, outcome.pid, outcome.message
        );
    }

    println!("\n📋 Summary:");
    if result.success {
        println!("   ✅ {}", result.message);
        Ok(())
    } else if result.partial {
        println!("   ⚠️  Partially terminated: {}", result.message);
        std::process::exit(2);
    } else {
        println!("   ❌ {}", result.message);
        std::process::exit(1);
    }
}
