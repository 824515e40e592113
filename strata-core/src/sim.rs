//! Simulated collaborators.
//!
//! In-process stand-ins for the memory tiers and the duplicate resolver, used
//! by the CLI workload driver and by tests. Latency goes through
//! `tokio::time::sleep`, so a paused test clock makes runs deterministic.

use async_trait::async_trait;
use rand::Rng;
use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use crate::error::{CoordinatorError, Result};
use crate::layer::{LayerStatus, MemoryLayer};
use crate::resolver::{DuplicateResolver, Resolution};
use crate::types::{AccessRequest, LayerQuery, MemoryTier};

#[derive(Debug, Default)]
struct SimStats {
    fetches: AtomicU64,
    failures: AtomicU64,
}

/// Simulated memory layer with configurable latency and failures.
///
/// Clones share counters, latency and the failure switch.
#[derive(Debug, Clone)]
pub struct SimLayer {
    tier: MemoryTier,
    latency_ms: Arc<AtomicU64>,
    failure_rate: f64,
    failing: Arc<AtomicBool>,
    stats: Arc<SimStats>,
}

impl SimLayer {
    pub fn new(tier: MemoryTier) -> Self {
        Self {
            tier,
            latency_ms: Arc::new(AtomicU64::new(0)),
            failure_rate: 0.0,
            failing: Arc::new(AtomicBool::new(false)),
            stats: Arc::new(SimStats::default()),
        }
    }

    pub fn with_latency(self, latency: Duration) -> Self {
        self.set_latency(latency);
        self
    }

    pub fn set_latency(&self, latency: Duration) {
        self.latency_ms.store(latency.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn latency(&self) -> Duration {
        Duration::from_millis(self.latency_ms.load(Ordering::SeqCst))
    }

    /// Fail this fraction of fetches at random (0.0 - 1.0)
    pub fn with_failure_rate(mut self, rate: f64) -> Self {
        self.failure_rate = rate.clamp(0.0, 1.0);
        self
    }

    /// Fail every fetch
    pub fn failing(self) -> Self {
        self.set_failing(true);
        self
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn fetch_count(&self) -> u64 {
        self.stats.fetches.load(Ordering::SeqCst)
    }

    pub fn failure_count(&self) -> u64 {
        self.stats.failures.load(Ordering::SeqCst)
    }

    fn should_fail(&self) -> bool {
        if self.failing.load(Ordering::SeqCst) {
            return true;
        }
        self.failure_rate > 0.0 && rand::thread_rng().gen_bool(self.failure_rate)
    }
}

#[async_trait]
impl MemoryLayer for SimLayer {
    async fn fetch(&self, query: &LayerQuery) -> Result<Value> {
        self.stats.fetches.fetch_add(1, Ordering::SeqCst);

        let latency = self.latency();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        if self.should_fail() {
            self.stats.failures.fetch_add(1, Ordering::SeqCst);
            return Err(CoordinatorError::collaborator(
                "layer",
                format!("{} store unavailable", self.tier),
            ));
        }

        Ok(json!({
            "tier": self.tier,
            "chapter": query.chapter_number,
            "requestType": query.request_type,
            "entries": [format!("{} entry for chapter {}", self.tier, query.chapter_number)],
        }))
    }

    async fn status(&self) -> LayerStatus {
        if self.failing.load(Ordering::SeqCst) {
            LayerStatus::Unavailable
        } else if self.failure_rate > 0.0 {
            LayerStatus::Degraded
        } else {
            LayerStatus::Healthy
        }
    }

    async fn diagnostics(&self) -> Value {
        json!({
            "tier": self.tier,
            "fetches": self.fetch_count(),
            "failures": self.failure_count(),
            "latencyMs": self.latency().as_millis() as u64,
            "failureRate": self.failure_rate,
        })
    }
}

/// Pass-through resolver that counts calls and can be switched to fail.
#[derive(Debug, Clone, Default)]
pub struct SimResolver {
    calls: Arc<AtomicU64>,
    failing: Arc<AtomicBool>,
}

impl SimResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn call_count(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DuplicateResolver for SimResolver {
    async fn resolve(&self, req: &AccessRequest) -> Result<Resolution> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(CoordinatorError::collaborator("resolver", "resolver offline"));
        }
        Ok(Resolution::unchanged(req.clone()))
    }
}
