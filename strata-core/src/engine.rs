//! Execution Engine
//!
//! Runs a planned [`AccessStrategy`] against the registered layers.
//!
//! - Parallel: every selected layer is fetched concurrently and every fetch
//!   runs to completion; a sibling's failure never cancels the others.
//! - Sequential: layers are visited in `priority_order`; a failure is recorded
//!   and the walk continues with the next layer.
//!
//! Each fetch is bounded by the collaborator timeout. A timeout or a panic
//! inside a layer is just another layer failure.

use futures::FutureExt;
use futures::future::join_all;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, timeout};

use crate::error::{CoordinatorError, panic_message};
use crate::layer::{LayerStatus, MemoryLayer};
use crate::types::{
    AccessRequest, AccessStrategy, LayerAccessResult, LayerQuery, MemoryTier, UnifiedContext,
};

/// Merges successful layer payloads into one context.
///
/// The default only partitions payloads by tier. Hosts that know their layer
/// schemas can plug in a semantic merge.
pub trait ContextIntegrator: Send + Sync {
    /// `None` when no layer produced data.
    fn integrate(&self, req: &AccessRequest, results: &[LayerAccessResult]) -> Option<UnifiedContext>;
}

/// Integrator that files each payload under its originating tier.
#[derive(Debug, Default, Clone, Copy)]
pub struct PartitionIntegrator;

impl ContextIntegrator for PartitionIntegrator {
    fn integrate(&self, req: &AccessRequest, results: &[LayerAccessResult]) -> Option<UnifiedContext> {
        let tiers: BTreeMap<MemoryTier, serde_json::Value> = results
            .iter()
            .filter_map(|r| r.outcome.as_ref().ok().map(|v| (r.layer, v.clone())))
            .collect();

        if tiers.is_empty() {
            return None;
        }

        Some(UnifiedContext {
            chapter_number: req.chapter_number,
            request_type: req.request_type,
            tiers,
        })
    }
}

/// Health snapshot of one registered layer
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerReport {
    pub tier: MemoryTier,
    pub status: LayerStatus,
    pub diagnostics: serde_json::Value,
}

pub struct ExecutionEngine {
    layers: HashMap<MemoryTier, Arc<dyn MemoryLayer>>,
    integrator: Arc<dyn ContextIntegrator>,
    timeout: Duration,
}

impl ExecutionEngine {
    pub fn new(
        layers: HashMap<MemoryTier, Arc<dyn MemoryLayer>>,
        integrator: Arc<dyn ContextIntegrator>,
        timeout: Duration,
    ) -> Self {
        Self {
            layers,
            integrator,
            timeout,
        }
    }

    /// Execute a strategy. Always returns one result per planned layer.
    pub async fn execute(&self, req: &AccessRequest, strategy: &AccessStrategy) -> Vec<LayerAccessResult> {
        let query = LayerQuery::from(req);

        if strategy.parallel {
            join_all(
                strategy
                    .priority_order
                    .iter()
                    .map(|tier| self.fetch_one(*tier, &query)),
            )
            .await
        } else {
            let mut results = Vec::with_capacity(strategy.priority_order.len());
            for tier in &strategy.priority_order {
                results.push(self.fetch_one(*tier, &query).await);
            }
            results
        }
    }

    /// Merge results through the configured integrator
    pub fn integrate(&self, req: &AccessRequest, results: &[LayerAccessResult]) -> Option<UnifiedContext> {
        if !results.iter().any(LayerAccessResult::success) {
            return None;
        }
        self.integrator.integrate(req, results)
    }

    async fn fetch_one(&self, tier: MemoryTier, query: &LayerQuery) -> LayerAccessResult {
        let start = Instant::now();

        let outcome = match self.layers.get(&tier) {
            None => Err(CoordinatorError::LayerUnavailable(tier)),
            Some(layer) => {
                let fetch = AssertUnwindSafe(layer.fetch(query)).catch_unwind();
                match timeout(self.timeout, fetch).await {
                    Ok(Ok(result)) => result,
                    Ok(Err(payload)) => Err(CoordinatorError::collaborator(
                        "layer",
                        format!("{} layer panicked: {}", tier, panic_message(payload.as_ref())),
                    )),
                    Err(_) => Err(CoordinatorError::timeout("layer", self.timeout.as_millis() as u64)),
                }
            }
        };

        let processing_time_ms = start.elapsed().as_millis() as u64;

        if let Err(e) = &outcome {
            tracing::warn!(
                layer = %tier,
                chapter = query.chapter_number,
                error = %e,
                "Layer fetch failed"
            );
        }

        LayerAccessResult {
            layer: tier,
            outcome: outcome.map_err(|e| e.to_string()),
            processing_time_ms,
        }
    }

    /// Status and diagnostics of every registered layer, in tier order
    pub async fn layer_reports(&self) -> Vec<LayerReport> {
        let mut tiers: Vec<MemoryTier> = self.layers.keys().copied().collect();
        tiers.sort();

        join_all(tiers.into_iter().map(|tier| async move {
            let layer = &self.layers[&tier];
            let status = timeout(self.timeout, layer.status())
                .await
                .unwrap_or(LayerStatus::Unavailable);
            let diagnostics = timeout(self.timeout, layer.diagnostics())
                .await
                .unwrap_or_else(|_| serde_json::json!({ "error": "diagnostics timed out" }));

            LayerReport {
                tier,
                status,
                diagnostics,
            }
        }))
        .await
    }
}

#[cfg(all(test, feature = "sim"))]
mod tests {
    use super::*;
    use crate::sim::SimLayer;
    use crate::types::RequestType;

    fn engine(layers: Vec<(MemoryTier, SimLayer)>) -> ExecutionEngine {
        let layers = layers
            .into_iter()
            .map(|(t, l)| (t, Arc::new(l) as Arc<dyn MemoryLayer>))
            .collect();
        ExecutionEngine::new(layers, Arc::new(PartitionIntegrator), Duration::from_secs(1))
    }

    fn strategy(order: Vec<MemoryTier>, parallel: bool) -> AccessStrategy {
        AccessStrategy {
            layers: order.clone(),
            parallel,
            priority_order: order,
            duplicates_resolved: 0,
            optimizations: vec![],
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_parallel_failure_does_not_cancel_siblings() {
        let short = SimLayer::new(MemoryTier::ShortTerm).with_latency(Duration::from_millis(50));
        let mid = SimLayer::new(MemoryTier::MidTerm).failing();
        let long = SimLayer::new(MemoryTier::LongTerm).with_latency(Duration::from_millis(200));
        let engine = engine(vec![
            (MemoryTier::ShortTerm, short.clone()),
            (MemoryTier::MidTerm, mid.clone()),
            (MemoryTier::LongTerm, long.clone()),
        ]);
        let req = AccessRequest::new(1, RequestType::IntegratedContext, MemoryTier::ALL);

        let results = engine.execute(&req, &strategy(MemoryTier::ALL.to_vec(), true)).await;

        assert_eq!(results.len(), 3);
        assert_eq!(results.iter().filter(|r| r.success()).count(), 2);
        assert_eq!(short.fetch_count(), 1);
        assert_eq!(mid.fetch_count(), 1);
        assert_eq!(long.fetch_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sequential_continues_after_error() {
        let engine = engine(vec![
            (MemoryTier::ShortTerm, SimLayer::new(MemoryTier::ShortTerm).failing()),
            (MemoryTier::LongTerm, SimLayer::new(MemoryTier::LongTerm)),
        ]);
        let req = AccessRequest::new(2, RequestType::ChapterContext, [MemoryTier::ShortTerm, MemoryTier::LongTerm]);

        let results = engine
            .execute(&req, &strategy(vec![MemoryTier::ShortTerm, MemoryTier::LongTerm], false))
            .await;

        assert!(!results[0].success());
        assert!(results[1].success());

        let context = engine.integrate(&req, &results).unwrap();
        assert_eq!(context.tiers.len(), 1);
        assert!(context.tier(MemoryTier::LongTerm).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_layer_failure() {
        let slow = SimLayer::new(MemoryTier::LongTerm).with_latency(Duration::from_secs(5));
        let engine = engine(vec![(MemoryTier::LongTerm, slow)]);
        let req = AccessRequest::new(3, RequestType::WorldKnowledge, [MemoryTier::LongTerm]);

        let results = engine.execute(&req, &strategy(vec![MemoryTier::LongTerm], false)).await;

        let err = results[0].outcome.as_ref().unwrap_err();
        assert!(err.contains("timed out"));
        assert!(engine.integrate(&req, &results).is_none());
    }

    struct PanickingLayer;

    #[async_trait::async_trait]
    impl MemoryLayer for PanickingLayer {
        async fn fetch(&self, _query: &LayerQuery) -> crate::error::Result<serde_json::Value> {
            panic!("segment table corrupted");
        }

        async fn status(&self) -> LayerStatus {
            LayerStatus::Degraded
        }

        async fn diagnostics(&self) -> serde_json::Value {
            serde_json::json!({})
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_layer_is_layer_failure() {
        let mut layers: HashMap<MemoryTier, Arc<dyn MemoryLayer>> = HashMap::new();
        layers.insert(MemoryTier::ShortTerm, Arc::new(SimLayer::new(MemoryTier::ShortTerm)));
        layers.insert(MemoryTier::LongTerm, Arc::new(PanickingLayer));
        let engine = ExecutionEngine::new(layers, Arc::new(PartitionIntegrator), Duration::from_secs(1));
        let req = AccessRequest::new(5, RequestType::WorldKnowledge, [MemoryTier::ShortTerm, MemoryTier::LongTerm]);

        for parallel in [true, false] {
            let results = engine
                .execute(&req, &strategy(vec![MemoryTier::LongTerm, MemoryTier::ShortTerm], parallel))
                .await;

            assert_eq!(results.len(), 2);
            let err = results[0].outcome.as_ref().unwrap_err();
            assert!(err.contains("panicked"));
            assert!(err.contains("segment table corrupted"));
            assert!(results[1].success());

            let context = engine.integrate(&req, &results).unwrap();
            assert!(context.tier(MemoryTier::ShortTerm).is_some());
            assert!(context.tier(MemoryTier::LongTerm).is_none());
        }
    }

    #[tokio::test]
    async fn test_unregistered_tier_fails_that_layer_only() {
        let engine = engine(vec![(MemoryTier::ShortTerm, SimLayer::new(MemoryTier::ShortTerm))]);
        let req = AccessRequest::new(4, RequestType::NarrativeState, [MemoryTier::ShortTerm, MemoryTier::MidTerm]);

        let results = engine
            .execute(&req, &strategy(vec![MemoryTier::ShortTerm, MemoryTier::MidTerm], true))
            .await;

        assert!(results[0].success());
        assert!(results[1].outcome.as_ref().unwrap_err().contains("no layer registered"));
    }

    #[tokio::test]
    async fn test_layer_reports_in_tier_order() {
        let engine = engine(vec![
            (MemoryTier::LongTerm, SimLayer::new(MemoryTier::LongTerm)),
            (MemoryTier::ShortTerm, SimLayer::new(MemoryTier::ShortTerm).failing()),
        ]);

        let reports = engine.layer_reports().await;

        assert_eq!(reports[0].tier, MemoryTier::ShortTerm);
        assert_eq!(reports[0].status, LayerStatus::Unavailable);
        assert_eq!(reports[1].status, LayerStatus::Healthy);
    }
}
