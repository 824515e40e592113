//! List persisted access patterns.

use anyhow::{Context, Result};
use colored::Colorize;
use strata_core::{JsonFilePatternStore, PatternStore};

use crate::config::Config;

pub async fn execute(json: bool, config: &Config) -> Result<()> {
    let store = JsonFilePatternStore::new(config.paths.patterns_file());
    let patterns = store
        .load()
        .await
        .with_context(|| format!("Failed to load patterns from {}", store.path().display()))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&patterns)?);
        return Ok(());
    }

    if patterns.is_empty() {
        println!("{}", "No learned access patterns yet.".yellow());
        println!("  Run `strata simulate` to generate some.");
        return Ok(());
    }

    let threshold = config.coordinator.pattern_promotion_threshold;

    println!("{}", "Access Patterns".cyan().bold());
    println!("{}", "─".repeat(78));
    println!(
        "  {:<45} {:>6} {:>6} {:>9}",
        "PATTERN".bold(),
        "USAGE".bold(),
        "SCORE".bold(),
        "MODE".bold()
    );

    for pattern in &patterns {
        let score = format!("{:.2}", pattern.effectiveness);
        let score = if pattern.effectiveness > threshold {
            score.green()
        } else {
            score.normal()
        };
        let mode = if pattern.parallel { "parallel" } else { "sequential" };
        println!(
            "  {:<45} {:>6} {:>6} {:>9}",
            pattern.key(),
            pattern.usage,
            score,
            mode
        );
    }

    println!();
    let promoted = patterns.iter().filter(|p| p.effectiveness > threshold).count();
    println!(
        "  {} patterns, {} above promotion threshold {:.2}",
        patterns.len(),
        promoted,
        threshold
    );

    Ok(())
}
