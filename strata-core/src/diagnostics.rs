//! Diagnostics Reporter
//!
//! Running counters for every completed request, and the health figures
//! derived from them:
//!
//! ```text
//! cache_hit_ratio = cache_hits / total_requests
//! error_rate      = error_count / total_requests
//! efficiency      = clamp(0.6 * cache_hit_ratio + 0.4 * (1 - error_rate), 0, 1)
//! ```
//!
//! With no traffic yet every ratio is 0 and efficiency is reported as 1.0.
//!
//! `average_response_time_ms` is blended as `avg = (avg + new) / 2`. That is an
//! exponential blend weighted towards recent requests, not a windowed mean.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use tokio::sync::Mutex;

use crate::config::CoordinatorConfig;
use crate::engine::LayerReport;
use crate::types::MemoryTier;

const CACHE_WEIGHT: f64 = 0.6;
const RELIABILITY_WEIGHT: f64 = 0.4;

/// Error rate at or above which the coordinator reports itself non-operational
const OPERATIONAL_ERROR_RATE: f64 = 0.5;

/// Process-wide counters
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceMetrics {
    pub total_requests: u64,
    pub cache_hits: u64,
    pub per_layer_hits: BTreeMap<MemoryTier, u64>,
    pub per_layer_errors: BTreeMap<MemoryTier, u64>,
    pub error_count: u64,
    pub average_response_time_ms: f64,
    pub last_optimization: Option<DateTime<Utc>>,
}

impl PerformanceMetrics {
    pub fn cache_hit_ratio(&self) -> f64 {
        ratio(self.cache_hits, self.total_requests)
    }

    pub fn error_rate(&self) -> f64 {
        ratio(self.error_count, self.total_requests)
    }

    pub fn efficiency(&self) -> f64 {
        if self.total_requests == 0 {
            return 1.0;
        }
        (CACHE_WEIGHT * self.cache_hit_ratio() + RELIABILITY_WEIGHT * (1.0 - self.error_rate()))
            .clamp(0.0, 1.0)
    }

    /// Failures over attempts for one layer
    pub fn layer_error_rate(&self, tier: MemoryTier) -> f64 {
        let hits = self.per_layer_hits.get(&tier).copied().unwrap_or(0);
        let errors = self.per_layer_errors.get(&tier).copied().unwrap_or(0);
        ratio(errors, hits + errors)
    }

    /// Share of all successful layer accesses served by one layer
    pub fn layer_hit_share(&self, tier: MemoryTier) -> f64 {
        let total: u64 = self.per_layer_hits.values().sum();
        ratio(self.per_layer_hits.get(&tier).copied().unwrap_or(0), total)
    }
}

fn ratio(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        (part as f64 / whole as f64).clamp(0.0, 1.0)
    }
}

/// What happened to one completed request
#[derive(Debug, Clone, Default)]
pub struct RequestOutcome {
    pub success: bool,
    pub from_cache: bool,
    pub layers_succeeded: Vec<MemoryTier>,
    pub layers_failed: Vec<MemoryTier>,
    pub processing_time_ms: u64,
}

/// Conditions the reporter warns about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Advisory {
    LowCacheHitRatio,
    HighErrorRate,
    SlowResponses,
}

impl Advisory {
    fn message(&self, metrics: &PerformanceMetrics, config: &CoordinatorConfig) -> String {
        match self {
            Advisory::LowCacheHitRatio => format!(
                "Cache hit ratio {:.2} is below {:.2}; consider longer TTLs or warming frequently used chapters",
                metrics.cache_hit_ratio(),
                config.target_cache_hit_ratio
            ),
            Advisory::HighErrorRate => format!(
                "Error rate {:.2} exceeds {:.2}; check memory layer health",
                metrics.error_rate(),
                config.max_error_rate
            ),
            Advisory::SlowResponses => format!(
                "Average response time {:.0}ms exceeds {:.0}ms; prefer parallel access or narrower layer sets",
                metrics.average_response_time_ms, config.slow_response_threshold_ms
            ),
        }
    }
}

/// Advisories that apply to a set of counters
pub fn advisories(metrics: &PerformanceMetrics, config: &CoordinatorConfig) -> Vec<Advisory> {
    if metrics.total_requests == 0 {
        return Vec::new();
    }

    let mut advisories = Vec::new();
    if metrics.cache_hit_ratio() < config.target_cache_hit_ratio {
        advisories.push(Advisory::LowCacheHitRatio);
    }
    if metrics.error_rate() > config.max_error_rate {
        advisories.push(Advisory::HighErrorRate);
    }
    if metrics.average_response_time_ms > config.slow_response_threshold_ms {
        advisories.push(Advisory::SlowResponses);
    }
    advisories
}

/// Health report returned by the coordinator
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagnostics {
    pub operational: bool,
    pub efficiency: f64,
    pub error_rate: f64,
    pub cache_hit_ratio: f64,
    pub average_response_time_ms: f64,
    pub total_requests: u64,
    pub last_optimization: Option<DateTime<Utc>>,
    pub recommendations: Vec<String>,
    pub layers: Vec<LayerReport>,
}

pub struct DiagnosticsReporter {
    metrics: Mutex<PerformanceMetrics>,
    config: CoordinatorConfig,
}

impl DiagnosticsReporter {
    pub fn new(config: CoordinatorConfig) -> Self {
        Self {
            metrics: Mutex::new(PerformanceMetrics::default()),
            config,
        }
    }

    /// Fold one completed request into the counters
    pub async fn record(&self, outcome: &RequestOutcome) {
        let mut metrics = self.metrics.lock().await;

        metrics.total_requests += 1;
        if outcome.from_cache {
            metrics.cache_hits += 1;
        }
        if !outcome.success {
            metrics.error_count += 1;
        }
        for tier in &outcome.layers_succeeded {
            *metrics.per_layer_hits.entry(*tier).or_insert(0) += 1;
        }
        for tier in &outcome.layers_failed {
            *metrics.per_layer_errors.entry(*tier).or_insert(0) += 1;
        }
        metrics.average_response_time_ms =
            (metrics.average_response_time_ms + outcome.processing_time_ms as f64) / 2.0;
    }

    pub async fn mark_optimized(&self, at: DateTime<Utc>) {
        self.metrics.lock().await.last_optimization = Some(at);
    }

    pub async fn snapshot(&self) -> PerformanceMetrics {
        self.metrics.lock().await.clone()
    }

    /// Build the health report from the current counters
    pub async fn report(&self, initialized: bool, layers: Vec<LayerReport>) -> Diagnostics {
        let metrics = self.snapshot().await;
        let error_rate = metrics.error_rate();

        let recommendations = advisories(&metrics, &self.config)
            .iter()
            .map(|a| a.message(&metrics, &self.config))
            .collect();

        Diagnostics {
            operational: initialized && error_rate < OPERATIONAL_ERROR_RATE,
            efficiency: metrics.efficiency(),
            error_rate,
            cache_hit_ratio: metrics.cache_hit_ratio(),
            average_response_time_ms: metrics.average_response_time_ms,
            total_requests: metrics.total_requests,
            last_optimization: metrics.last_optimization,
            recommendations,
            layers,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(success: bool, from_cache: bool, ms: u64) -> RequestOutcome {
        RequestOutcome {
            success,
            from_cache,
            layers_succeeded: if success && !from_cache { vec![MemoryTier::ShortTerm] } else { vec![] },
            layers_failed: if success { vec![] } else { vec![MemoryTier::LongTerm] },
            processing_time_ms: ms,
        }
    }

    #[tokio::test]
    async fn test_zero_requests_is_neutral() {
        let reporter = DiagnosticsReporter::new(CoordinatorConfig::default());
        let report = reporter.report(true, vec![]).await;

        assert_eq!(report.error_rate, 0.0);
        assert_eq!(report.cache_hit_ratio, 0.0);
        assert_eq!(report.efficiency, 1.0);
        assert!(report.recommendations.is_empty());
        assert!(report.operational);
    }

    #[tokio::test]
    async fn test_counters_and_blend() {
        let reporter = DiagnosticsReporter::new(CoordinatorConfig::default());
        reporter.record(&outcome(true, false, 100)).await;
        reporter.record(&outcome(true, true, 0)).await;

        let metrics = reporter.snapshot().await;
        assert_eq!(metrics.total_requests, 2);
        assert_eq!(metrics.cache_hits, 1);
        assert_eq!(metrics.per_layer_hits[&MemoryTier::ShortTerm], 1);
        // (0 + 100) / 2 = 50, then (50 + 0) / 2 = 25
        assert_eq!(metrics.average_response_time_ms, 25.0);
    }

    #[tokio::test]
    async fn test_efficiency_and_advisories() {
        let reporter = DiagnosticsReporter::new(CoordinatorConfig::default());
        for _ in 0..3 {
            reporter.record(&outcome(false, false, 4000)).await;
        }
        reporter.record(&outcome(true, false, 4000)).await;

        let report = reporter.report(true, vec![]).await;

        // hit ratio 0, error rate 0.75 -> 0.4 * 0.25
        assert!((report.efficiency - 0.1).abs() < 1e-9);
        assert_eq!(report.error_rate, 0.75);
        assert_eq!(report.recommendations.len(), 3);
        assert!(!report.operational);
    }

    #[test]
    fn test_bounds_hold_for_extremes() {
        let metrics = PerformanceMetrics {
            total_requests: 10,
            cache_hits: 10,
            error_count: 10,
            ..Default::default()
        };
        assert!((0.0..=1.0).contains(&metrics.efficiency()));
        assert!((0.0..=1.0).contains(&metrics.error_rate()));
    }

    #[test]
    fn test_layer_rates() {
        let mut metrics = PerformanceMetrics::default();
        metrics.per_layer_hits.insert(MemoryTier::ShortTerm, 3);
        metrics.per_layer_hits.insert(MemoryTier::MidTerm, 1);
        metrics.per_layer_errors.insert(MemoryTier::MidTerm, 3);

        assert_eq!(metrics.layer_hit_share(MemoryTier::ShortTerm), 0.75);
        assert_eq!(metrics.layer_error_rate(MemoryTier::MidTerm), 0.75);
        assert_eq!(metrics.layer_error_rate(MemoryTier::LongTerm), 0.0);
    }
}
