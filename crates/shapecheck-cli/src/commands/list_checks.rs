//! List checks command implementation.

use std::path::{Path, PathBuf};

use anyhow::Result;
use shapecheck_core::Rule;

use super::load_settings;

/// Runs the list-checks command.
pub fn run(config: Option<&Path>, checks_files: &[PathBuf]) -> Result<()> {
    let settings = load_settings(config, checks_files)?;

    println!("Configured checks:\n");
    println!("{:<8} {:<8} {:<10} {:<30} Pattern", "Code", "Id", "Count", "Name");
    println!("{}", "-".repeat(80));

    for rule in &settings.rules {
        println!("{}", row(rule));
    }

    println!("\n{} check(s)", settings.rules.len());
    Ok(())
}

fn row(rule: &Rule) -> String {
    format!(
        "{:<8} {:<8} {:<10} {:<30} {}",
        rule.code(),
        rule.id(),
        rule.count().to_string(),
        rule.name(),
        rule.pattern()
    )
}
