//! App types command implementation.
//!
//! Lists the workload classification rules.

use herakles_port_manager::process::{RUNTIME_RULES, SUPERVISOR_RULES};

/// Lists runtime rules, their framework refinements and parent controllers.
pub fn command_app_types(verbose: bool) -> Result<(), Box<dyn std::error::Error>> {
    println!("📊 Herakles Port Manager - Workload Classification");
    println!("==================================================");

    for rule in RUNTIME_RULES {
        println!("\n🏷️  {} ({})", rule.tag.label(), rule.tag);
        println!("{}", "─".repeat(50));
        println!("   ├─ 🔍 Executable contains: {}", rule.name_patterns.join(", "));

        if rule.refinements.is_empty() {
            continue;
        }
        for refinement in rule.refinements {
            println!("   ├─ 📂 {} ({})", refinement.tag.label(), refinement.tag);
            if verbose {
                if !refinement.cmdline_tokens.is_empty() {
                    println!(
                        "   │  ├─ Command line: {}",
                        refinement.cmdline_tokens.join(", ")
                    );
                }
                if !refinement.default_ports.is_empty() {
                    let ports: Vec<String> = refinement
                        .default_ports
                        .iter()
                        .map(|r| {
                            if r.start() == r.end() {
                                r.start().to_string()
                            } else {
                                format!("{}-{}", r.start(), r.end())
                            }
                        })
                        .collect();
                    println!("   │  └─ Default ports: {}", ports.join(", "));
                }
            }
        }
    }

    println!("\n🔁 Parent controllers");
    println!("{}", "─".repeat(50));
    for rule in SUPERVISOR_RULES {
        let mut patterns: Vec<&str> = rule.names.to_vec();
        patterns.extend(rule.cmdline_tokens.iter().copied());
        println!("   ├─ {}: {}", rule.label, patterns.join(", "));
    }

    let refinements: usize = RUNTIME_RULES.iter().map(|r| r.refinements.len()).sum();
    println!(
        "\n📋 Total: {} runtimes, {} framework refinements, {} parent controllers",
        RUNTIME_RULES.len(),
        refinements,
        SUPERVISOR_RULES.len()
    );

    Ok(())
}
