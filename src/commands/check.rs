//! Check command implementation.
//!
//! Validates runtime requirements and configuration.

use herakles_port_manager::process::RUNTIME_RULES;

use crate::config::{validate_effective_config, Config};
use crate::startup_checks::{check_process_table, check_socket_table, check_user_privileges};

/// Validates runtime requirements and configuration.
pub fn command_check(
    sockets: bool,
    processes: bool,
    all: bool,
    config: &Config,
) -> Result<(), Box<dyn std::error::Error>> {
    println!("🔍 Herakles Port Manager - System Check");
    println!("=======================================");

    let mut all_ok = true;

    println!("\n👤 Checking privileges...");
    if check_user_privileges() {
        println!("   ✅ Running as root, every process can be resolved and terminated");
    } else {
        println!("   ⚠️  Not running as root, other users' processes stay unresolved");
    }

    if sockets || all {
        println!("\n🔌 Checking socket table...");
        match check_socket_table() {
            Ok((total, unowned)) => {
                println!("   ✅ {} sockets enumerated", total);
                if unowned > 0 {
                    println!("   ⚠️  {} sockets without visible owner", unowned);
                }
            }
            Err(e) => {
                println!("   ❌ {:#}", e);
                all_ok = false;
            }
        }
    }

    if processes || all {
        println!("\n📁 Checking process table...");
        match check_process_table() {
            Ok(count) => println!("   ✅ {} processes visible", count),
            Err(e) => {
                println!("   ❌ {:#}", e);
                all_ok = false;
            }
        }
    }

    println!("\n⚙️  Checking configuration...");
    match validate_effective_config(config) {
        Ok(_) => {
            println!("   ✅ Configuration is valid");
        }
        Err(e) => {
            println!("   ❌ Configuration invalid: {}", e);
            all_ok = false;
        }
    }

    println!("\n📊 Checking classification table...");
    println!("   ✅ {} runtime rules loaded", RUNTIME_RULES.len());

    println!("\n📋 Summary:");
    if all_ok {
        println!("   ✅ All checks passed - system is ready");
        Ok(())
    } else {
        println!("   ❌ Some checks failed - please review warnings");
        std::process::exit(1);
    }
}
