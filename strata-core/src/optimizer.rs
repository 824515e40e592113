//! Pattern optimization passes.
//!
//! Three independent, best-effort passes:
//!
//! 1. **Pattern frequency** - drop idle patterns, reorder frequently used
//!    sequential routes by layer productivity, and switch slow frequent
//!    sequential routes to parallel.
//! 2. **Cache hit ratio** - purge expired cache entries and report the ratio
//!    against its target.
//! 3. **Layer rebalance** - demote learned routes through layers that fail more
//!    often than the configured limit, so planning falls back to tier order.
//!
//! A failing pass is logged and recorded; the remaining passes still run.

use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tokio::time::timeout;

use crate::cache::CacheCoordinator;
use crate::config::CoordinatorConfig;
use crate::diagnostics::PerformanceMetrics;
use crate::error::{CoordinatorError, Result};
use crate::learner::PatternLearner;
use crate::types::MemoryTier;

/// Effectiveness below which a frequent pattern counts as slow
const SLOW_PATTERN_EFFECTIVENESS: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimizationPass {
    PatternFrequency,
    CacheHitRatio,
    LayerRebalance,
}

impl std::fmt::Display for OptimizationPass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OptimizationPass::PatternFrequency => write!(f, "pattern_frequency"),
            OptimizationPass::CacheHitRatio => write!(f, "cache_hit_ratio"),
            OptimizationPass::LayerRebalance => write!(f, "layer_rebalance"),
        }
    }
}

/// Result of one optimization run.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimizationReport {
    /// At least one pass completed
    pub optimized: bool,
    pub improvements: Vec<String>,
    /// Passes that failed, with their error
    pub failed_passes: Vec<String>,
}

pub struct PatternOptimizer {
    learner: Arc<PatternLearner>,
    cache: Arc<dyn CacheCoordinator>,
    config: CoordinatorConfig,
}

impl PatternOptimizer {
    pub fn new(
        learner: Arc<PatternLearner>,
        cache: Arc<dyn CacheCoordinator>,
        config: CoordinatorConfig,
    ) -> Self {
        Self {
            learner,
            cache,
            config,
        }
    }

    /// Run every pass against a metrics snapshot.
    pub async fn run(&self, metrics: &PerformanceMetrics) -> OptimizationReport {
        let mut report = OptimizationReport::default();

        let passes = [
            (OptimizationPass::PatternFrequency, self.pattern_frequency_pass(metrics).await),
            (OptimizationPass::CacheHitRatio, self.cache_hit_ratio_pass(metrics).await),
            (OptimizationPass::LayerRebalance, self.layer_rebalance_pass(metrics).await),
        ];

        for (pass, result) in passes {
            match result {
                Ok(improvements) => {
                    tracing::info!(pass = %pass, changes = improvements.len(), "Optimization pass completed");
                    report.optimized = true;
                    report.improvements.extend(improvements);
                }
                Err(e) => {
                    tracing::warn!(pass = %pass, error = %e, "Optimization pass failed");
                    report.failed_passes.push(format!("{}: {}", pass, e));
                }
            }
        }

        report
    }

    async fn pattern_frequency_pass(&self, metrics: &PerformanceMetrics) -> Result<Vec<String>> {
        let mut improvements = Vec::new();
        let now = Utc::now();
        let idle_ttl = self.config.pattern_idle_ttl_secs;

        let mut patterns = self.learner.write().await;

        let before = patterns.len();
        patterns.retain(|_, p| {
            (now - p.last_used)
                .to_std()
                .map(|idle| idle.as_secs() <= idle_ttl)
                .unwrap_or(true)
        });
        let evicted = before - patterns.len();
        if evicted > 0 {
            improvements.push(format!("Evicted {} idle access patterns", evicted));
        }

        let mut reordered = 0;
        let mut parallelized = 0;
        for pattern in patterns.values_mut() {
            if pattern.usage < self.config.frequent_usage_threshold
                || pattern.parallel
                || pattern.optimal_layers.len() < 2
            {
                continue;
            }

            if pattern.effectiveness < SLOW_PATTERN_EFFECTIVENESS {
                pattern.parallel = true;
                parallelized += 1;
                continue;
            }

            // Most productive layer first; ties keep tier order.
            let mut order = pattern.optimal_layers.clone();
            order.sort_by(|a, b| {
                metrics
                    .layer_hit_share(*b)
                    .partial_cmp(&metrics.layer_hit_share(*a))
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| a.cmp(b))
            });
            if order != pattern.optimal_layers {
                pattern.optimal_layers = order;
                reordered += 1;
            }
        }

        if reordered > 0 {
            improvements.push(format!(
                "Reordered {} frequent sequential patterns by layer productivity",
                reordered
            ));
        }
        if parallelized > 0 {
            improvements.push(format!(
                "Switched {} slow frequent patterns to parallel access",
                parallelized
            ));
        }

        Ok(improvements)
    }

    async fn cache_hit_ratio_pass(&self, metrics: &PerformanceMetrics) -> Result<Vec<String>> {
        let mut improvements = Vec::new();
        let budget = self.config.collaborator_timeout();

        let purged = timeout(budget, self.cache.purge_expired())
            .await
            .map_err(|_| CoordinatorError::timeout("cache", budget.as_millis() as u64))??;
        if purged > 0 {
            improvements.push(format!("Purged {} expired cache entries", purged));
        }

        let ratio = metrics.cache_hit_ratio();
        if metrics.total_requests > 0 && ratio < self.config.target_cache_hit_ratio {
            improvements.push(format!(
                "Cache hit ratio {:.2} below target {:.2}; expired entries cleared for fresh write-through",
                ratio, self.config.target_cache_hit_ratio
            ));
        }

        Ok(improvements)
    }

    async fn layer_rebalance_pass(&self, metrics: &PerformanceMetrics) -> Result<Vec<String>> {
        let unreliable: Vec<MemoryTier> = MemoryTier::ALL
            .into_iter()
            .filter(|t| metrics.layer_error_rate(*t) > self.config.unreliable_layer_error_rate)
            .collect();

        if unreliable.is_empty() {
            return Ok(Vec::new());
        }

        let ceiling = self.config.pattern_promotion_threshold;
        let mut patterns = self.learner.write().await;
        let mut improvements = Vec::new();

        for tier in unreliable {
            let mut demoted = 0;
            for pattern in patterns.values_mut() {
                if pattern.optimal_layers.contains(&tier) && pattern.effectiveness > ceiling {
                    pattern.effectiveness = ceiling;
                    demoted += 1;
                }
            }

            tracing::info!(
                layer = %tier,
                error_rate = metrics.layer_error_rate(tier),
                demoted,
                "Layer marked unreliable"
            );
            if demoted > 0 {
                improvements.push(format!(
                    "Demoted {} learned patterns routing through unreliable layer {} (error rate {:.2})",
                    demoted,
                    tier,
                    metrics.layer_error_rate(tier)
                ));
            }
        }

        Ok(improvements)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::InMemoryCache;
    use crate::learner::AccessPattern;
    use crate::types::RequestType;
    use async_trait::async_trait;
    use serde_json::Value;
    use std::time::Duration;

    fn pattern(request_type: RequestType, usage: u64, effectiveness: f64, parallel: bool) -> AccessPattern {
        AccessPattern {
            request_type,
            layer_set_key: "short_term,long_term".into(),
            optimal_layers: vec![MemoryTier::ShortTerm, MemoryTier::LongTerm],
            parallel,
            effectiveness,
            usage,
            last_used: Utc::now(),
        }
    }

    struct BrokenCache;

    #[async_trait]
    impl CacheCoordinator for BrokenCache {
        async fn get(&self, _key: &str) -> Result<Option<Value>> {
            Err(CoordinatorError::collaborator("cache", "down"))
        }
        async fn set(&self, _key: &str, _value: Value, _ttl: Duration) -> Result<()> {
            Err(CoordinatorError::collaborator("cache", "down"))
        }
        async fn invalidate(&self, _pattern: &str) -> Result<usize> {
            Err(CoordinatorError::collaborator("cache", "down"))
        }
        async fn purge_expired(&self) -> Result<usize> {
            Err(CoordinatorError::collaborator("cache", "down"))
        }
    }

    #[tokio::test]
    async fn test_idle_patterns_evicted_and_slow_ones_parallelized() {
        let learner = Arc::new(PatternLearner::new(10));
        let mut idle = pattern(RequestType::WorldKnowledge, 50, 0.9, false);
        idle.last_used = Utc::now() - chrono::Duration::days(3);
        learner
            .load(vec![idle, pattern(RequestType::ChapterContext, 20, 0.3, false)])
            .await;

        let optimizer = PatternOptimizer::new(
            Arc::clone(&learner),
            Arc::new(InMemoryCache::new()),
            CoordinatorConfig::default(),
        );
        let report = optimizer.run(&PerformanceMetrics::default()).await;

        assert!(report.optimized);
        assert_eq!(learner.len().await, 1);
        let remaining = learner.snapshot().await;
        assert!(remaining[0].parallel);
        assert_eq!(report.improvements.len(), 2);
    }

    #[tokio::test]
    async fn test_frequent_sequential_pattern_reordered_by_hit_share() {
        let learner = Arc::new(PatternLearner::new(10));
        learner.load(vec![pattern(RequestType::NarrativeState, 30, 0.9, false)]).await;

        let mut metrics = PerformanceMetrics::default();
        metrics.per_layer_hits.insert(MemoryTier::ShortTerm, 1);
        metrics.per_layer_hits.insert(MemoryTier::LongTerm, 9);

        let optimizer = PatternOptimizer::new(
            Arc::clone(&learner),
            Arc::new(InMemoryCache::new()),
            CoordinatorConfig::default(),
        );
        optimizer.run(&metrics).await;

        let patterns = learner.snapshot().await;
        assert_eq!(patterns[0].optimal_layers, vec![MemoryTier::LongTerm, MemoryTier::ShortTerm]);
    }

    #[tokio::test]
    async fn test_unreliable_layer_demotes_routes() {
        let learner = Arc::new(PatternLearner::new(10));
        learner.load(vec![pattern(RequestType::CharacterAnalysis, 2, 0.97, true)]).await;

        let mut metrics = PerformanceMetrics::default();
        metrics.per_layer_hits.insert(MemoryTier::LongTerm, 1);
        metrics.per_layer_errors.insert(MemoryTier::LongTerm, 9);

        let optimizer = PatternOptimizer::new(
            Arc::clone(&learner),
            Arc::new(InMemoryCache::new()),
            CoordinatorConfig::default(),
        );
        let report = optimizer.run(&metrics).await;

        assert!(report.improvements.iter().any(|i| i.contains("long_term")));
        assert_eq!(learner.snapshot().await[0].effectiveness, 0.8);
    }

    #[tokio::test]
    async fn test_failing_pass_does_not_stop_the_others() {
        let learner = Arc::new(PatternLearner::new(10));
        let optimizer = PatternOptimizer::new(
            Arc::clone(&learner),
            Arc::new(BrokenCache),
            CoordinatorConfig::default(),
        );

        let report = optimizer.run(&PerformanceMetrics::default()).await;

        assert!(report.optimized);
        assert_eq!(report.failed_passes.len(), 1);
        assert!(report.failed_passes[0].starts_with("cache_hit_ratio"));
    }
}
