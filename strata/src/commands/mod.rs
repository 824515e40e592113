//! Command implementations for strata CLI.

pub mod batch;
pub mod config;
pub mod patterns;
pub mod simulate;

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use strata_core::sim::{SimLayer, SimResolver};
use strata_core::{AccessCoordinator, JsonFilePatternStore, MemoryTier, NoopPatternStore, PatternStore};

use crate::config::Config;

/// Coordinator wired to simulated tiers and the configured pattern file, initialized.
pub async fn simulated_coordinator(config: &Config, persist: bool) -> Result<AccessCoordinator> {
    let store: Arc<dyn PatternStore> = if persist {
        Arc::new(JsonFilePatternStore::new(config.paths.patterns_file()))
    } else {
        Arc::new(NoopPatternStore)
    };

    let mut builder = AccessCoordinator::builder()
        .config(config.coordinator.clone())
        .resolver(Arc::new(SimResolver::new()))
        .pattern_store(store);

    for tier in MemoryTier::ALL {
        let sim = config.simulation.tier(tier);
        let layer = SimLayer::new(tier)
            .with_latency(Duration::from_millis(sim.latency_ms))
            .with_failure_rate(sim.failure_rate);
        builder = builder.layer(tier, Arc::new(layer));
    }

    let coordinator = builder.build().context("Failed to build coordinator")?;
    coordinator
        .initialize()
        .await
        .context("Failed to initialize coordinator")?;

    tracing::debug!(patterns = coordinator.patterns().await.len(), "Coordinator ready");
    Ok(coordinator)
}
