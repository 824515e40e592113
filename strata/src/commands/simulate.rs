//! Random workload against simulated tiers.

use anyhow::{Context, Result};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use rand::Rng;
use rand::seq::SliceRandom;
use strata_core::{AccessRequest, Diagnostics, LayerStatus, MemoryTier, RequestType};

use crate::cli::SimulateArgs;
use crate::config::Config;

pub async fn execute(args: SimulateArgs, config: &Config) -> Result<()> {
    let requests = args.requests.unwrap_or(config.simulation.requests);
    let chapters = args.chapters.unwrap_or(config.simulation.chapters).max(1);
    let optimize_every = args.optimize_every.unwrap_or(config.simulation.optimize_every);

    let coordinator = super::simulated_coordinator(config, !args.no_persist).await?;
    let workload = workload(requests, chapters);

    let progress = ProgressBar::new(workload.len() as u64);
    progress.set_style(
        ProgressStyle::with_template("{spinner:.cyan} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .context("Invalid progress template")?
            .progress_chars("=> "),
    );

    let mut failures = 0usize;
    let mut optimizations = 0usize;
    for (i, req) in workload.iter().enumerate() {
        let response = coordinator.process_request(req).await;
        if !response.success {
            failures += 1;
        }

        if optimize_every > 0 && (i + 1) % optimize_every == 0 {
            let report = coordinator.optimize_access_patterns().await;
            optimizations += 1;
            for failed in &report.failed_passes {
                progress.println(format!("  {} {}", "⚠".yellow(), failed));
            }
        }

        progress.set_message(format!("{} failed", failures));
        progress.inc(1);
    }
    progress.finish_and_clear();

    let diagnostics = coordinator.get_diagnostics().await;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&diagnostics)?);
    } else {
        print_summary(requests, failures, optimizations, &diagnostics);
    }

    if !args.no_persist {
        let saved = coordinator
            .persist_patterns()
            .await
            .context("Failed to persist access patterns")?;
        if !args.json {
            println!();
            println!(
                "  Saved {} patterns to {}",
                saved,
                config.paths.patterns_file().display()
            );
        }
    }

    Ok(())
}

/// Random requests: uniform request type, chapter and non-empty layer subset
fn workload(requests: usize, chapters: u32) -> Vec<AccessRequest> {
    let mut rng = rand::thread_rng();

    (0..requests)
        .map(|_| {
            let request_type = *RequestType::ALL.choose(&mut rng).unwrap_or(&RequestType::ChapterContext);
            let chapter = rng.gen_range(1..=chapters);
            let mut layers: Vec<MemoryTier> = MemoryTier::ALL
                .into_iter()
                .filter(|_| rng.gen_bool(0.5))
                .collect();
            if layers.is_empty() {
                layers.push(MemoryTier::ALL[rng.gen_range(0..MemoryTier::ALL.len())]);
            }
            AccessRequest::new(chapter, request_type, layers)
        })
        .collect()
}

fn print_summary(requests: usize, failures: usize, optimizations: usize, diagnostics: &Diagnostics) {
    println!("{}", "Simulation Summary".cyan().bold());
    println!("{}", "─".repeat(50));
    println!();

    let status = if diagnostics.operational {
        "✓ operational".green()
    } else {
        "✗ degraded".red()
    };
    println!("  Status:            {}", status);
    println!("  Requests:          {} ({} failed)", requests, failures);
    println!("  Optimizer runs:    {}", optimizations);
    println!("  Efficiency:        {:.2}", diagnostics.efficiency);
    println!("  Cache hit ratio:   {:.2}", diagnostics.cache_hit_ratio);
    println!("  Error rate:        {:.2}", diagnostics.error_rate);
    println!("  Avg response:      {:.1}ms", diagnostics.average_response_time_ms);

    println!();
    println!("{}", "Layers".cyan().bold());
    for layer in &diagnostics.layers {
        let status = match layer.status {
            LayerStatus::Healthy => layer.status.to_string().green(),
            LayerStatus::Degraded => layer.status.to_string().yellow(),
            LayerStatus::Unavailable => layer.status.to_string().red(),
        };
        println!("  {:<10} {}", layer.tier.to_string(), status);
    }

    if !diagnostics.recommendations.is_empty() {
        println!();
        println!("{}", "Recommendations".yellow().bold());
        for recommendation in &diagnostics.recommendations {
            println!("  • {}", recommendation);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_workload_shape() {
        let requests = workload(100, 5);

        assert_eq!(requests.len(), 100);
        assert!(requests.iter().all(|r| (1..=5).contains(&r.chapter_number)));
        assert!(requests.iter().all(|r| !r.target_layers.is_empty()));
    }
}
