//! Pattern Learner
//!
//! Records how well each request shape performed and keeps the result as an
//! [`AccessPattern`]. Effectiveness is a linear latency penalty:
//!
//! ```text
//! effectiveness = clamp(1 - elapsed_ms / 5000, 0, 1)
//! ```
//!
//! Repeat observations are averaged with the stored score so a single slow
//! outlier halves a good pattern's score instead of wiping it.
//!
//! The map is bounded: inserting a new shape into a full map evicts the least
//! recently used pattern.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::{RwLock, RwLockWriteGuard};

use crate::types::{AccessRequest, AccessStrategy, MemoryTier, RequestType, layer_set_key};

/// Latency at which effectiveness bottoms out
pub const ZERO_EFFECTIVENESS_LATENCY_MS: f64 = 5000.0;

/// Learned mapping from a request shape to the strategy that served it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessPattern {
    pub request_type: RequestType,
    pub layer_set_key: String,
    pub optimal_layers: Vec<MemoryTier>,
    pub parallel: bool,
    /// Always within [0, 1]
    pub effectiveness: f64,
    pub usage: u64,
    pub last_used: DateTime<Utc>,
}

impl AccessPattern {
    /// Map key: request type plus sorted layer set
    pub fn key(&self) -> String {
        format!("{}:{}", self.request_type, self.layer_set_key)
    }
}

/// Effectiveness score for an observed latency
pub fn latency_effectiveness(elapsed_ms: u64) -> f64 {
    (1.0 - elapsed_ms as f64 / ZERO_EFFECTIVENESS_LATENCY_MS).clamp(0.0, 1.0)
}

/// Owner of the learned pattern map.
#[derive(Debug)]
pub struct PatternLearner {
    patterns: RwLock<HashMap<String, AccessPattern>>,
    max_patterns: usize,
}

impl PatternLearner {
    pub fn new(max_patterns: usize) -> Self {
        Self {
            patterns: RwLock::new(HashMap::new()),
            max_patterns: max_patterns.max(1),
        }
    }

    /// Record one observation for the request's shape.
    ///
    /// The whole read-modify-write happens under one write guard, so concurrent
    /// observations of the same shape never lose an update.
    pub async fn learn(
        &self,
        req: &AccessRequest,
        strategy: &AccessStrategy,
        elapsed_ms: u64,
    ) -> AccessPattern {
        let key = req.shape_key();
        let observed = latency_effectiveness(elapsed_ms);
        let now = Utc::now();

        let mut patterns = self.patterns.write().await;

        if let Some(pattern) = patterns.get_mut(&key) {
            pattern.usage = pattern.usage.saturating_add(1);
            pattern.effectiveness = ((pattern.effectiveness + observed) / 2.0).clamp(0.0, 1.0);
            pattern.last_used = now;

            tracing::debug!(
                pattern = %key,
                usage = pattern.usage,
                effectiveness = pattern.effectiveness,
                "Updated access pattern"
            );
            return pattern.clone();
        }

        if patterns.len() >= self.max_patterns {
            evict_least_recent(&mut patterns);
        }

        let pattern = AccessPattern {
            request_type: req.request_type,
            layer_set_key: layer_set_key(&req.target_layers),
            optimal_layers: strategy.priority_order.clone(),
            parallel: strategy.parallel,
            effectiveness: observed,
            usage: 1,
            last_used: now,
        };
        tracing::debug!(pattern = %key, effectiveness = observed, "Recorded new access pattern");
        patterns.insert(key, pattern.clone());
        pattern
    }

    /// Pattern for a request's shape, if one has been learned
    pub async fn lookup(&self, req: &AccessRequest) -> Option<AccessPattern> {
        self.patterns.read().await.get(&req.shape_key()).cloned()
    }

    /// Copy of every learned pattern
    pub async fn snapshot(&self) -> Vec<AccessPattern> {
        let mut patterns: Vec<AccessPattern> = self.patterns.read().await.values().cloned().collect();
        patterns.sort_by(|a, b| b.usage.cmp(&a.usage).then_with(|| a.key().cmp(&b.key())));
        patterns
    }

    /// Seed the map from persisted patterns. Returns how many were kept.
    ///
    /// Scores are clamped back into [0, 1]. When the snapshot is larger than the
    /// capacity, the most recently used patterns win.
    pub async fn load(&self, mut loaded: Vec<AccessPattern>) -> usize {
        loaded.sort_by(|a, b| b.last_used.cmp(&a.last_used));
        loaded.truncate(self.max_patterns);

        let mut patterns = self.patterns.write().await;
        patterns.clear();
        for mut pattern in loaded {
            pattern.effectiveness = if pattern.effectiveness.is_finite() {
                pattern.effectiveness.clamp(0.0, 1.0)
            } else {
                0.0
            };
            patterns.insert(pattern.key(), pattern);
        }
        patterns.len()
    }

    pub async fn len(&self) -> usize {
        self.patterns.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.patterns.read().await.is_empty()
    }

    /// Exclusive access for the optimizer passes
    pub(crate) async fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, AccessPattern>> {
        self.patterns.write().await
    }
}

fn evict_least_recent(patterns: &mut HashMap<String, AccessPattern>) {
    let oldest = patterns
        .iter()
        .min_by_key(|(_, p)| p.last_used)
        .map(|(k, _)| k.clone());

    if let Some(key) = oldest {
        patterns.remove(&key);
        tracing::debug!(pattern = %key, "Evicted least recently used access pattern");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn request(request_type: RequestType) -> AccessRequest {
        AccessRequest::new(1, request_type, [MemoryTier::ShortTerm, MemoryTier::MidTerm])
    }

    fn strategy() -> AccessStrategy {
        AccessStrategy {
            layers: vec![MemoryTier::ShortTerm, MemoryTier::MidTerm],
            parallel: true,
            priority_order: vec![MemoryTier::ShortTerm, MemoryTier::MidTerm],
            duplicates_resolved: 0,
            optimizations: vec![],
        }
    }

    #[test]
    fn test_latency_effectiveness() {
        assert_eq!(latency_effectiveness(0), 1.0);
        assert_eq!(latency_effectiveness(2500), 0.5);
        assert_eq!(latency_effectiveness(5000), 0.0);
        assert_eq!(latency_effectiveness(60_000), 0.0);
    }

    #[tokio::test]
    async fn test_learn_creates_then_averages() {
        let learner = PatternLearner::new(10);
        let req = request(RequestType::CharacterAnalysis);

        let first = learner.learn(&req, &strategy(), 4000).await;
        assert_eq!(first.usage, 1);
        assert!((first.effectiveness - 0.2).abs() < 1e-9);

        let second = learner.learn(&req, &strategy(), 0).await;
        assert_eq!(second.usage, 2);
        assert!((second.effectiveness - 0.6).abs() < 1e-9);
        assert_eq!(learner.len().await, 1);
    }

    #[tokio::test]
    async fn test_concurrent_learning_loses_no_updates() {
        let learner = Arc::new(PatternLearner::new(10));
        let req = request(RequestType::NarrativeState);

        let tasks: Vec<_> = (0..50)
            .map(|_| {
                let learner = Arc::clone(&learner);
                let req = req.clone();
                tokio::spawn(async move { learner.learn(&req, &strategy(), 100).await })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }

        let pattern = learner.lookup(&req).await.unwrap();
        assert_eq!(pattern.usage, 50);
    }

    #[tokio::test]
    async fn test_capacity_evicts_least_recent() {
        let learner = PatternLearner::new(2);
        let a = request(RequestType::ChapterContext);
        let b = request(RequestType::WorldKnowledge);
        let c = request(RequestType::SystemDiagnostics);

        learner.learn(&a, &strategy(), 10).await;
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        learner.learn(&b, &strategy(), 10).await;
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        learner.learn(&c, &strategy(), 10).await;

        assert_eq!(learner.len().await, 2);
        assert!(learner.lookup(&a).await.is_none());
        assert!(learner.lookup(&c).await.is_some());
    }

    #[tokio::test]
    async fn test_load_clamps_scores() {
        let learner = PatternLearner::new(10);
        let pattern = AccessPattern {
            request_type: RequestType::WorldKnowledge,
            layer_set_key: "long_term".into(),
            optimal_layers: vec![MemoryTier::LongTerm],
            parallel: false,
            effectiveness: 3.5,
            usage: 4,
            last_used: Utc::now(),
        };

        assert_eq!(learner.load(vec![pattern]).await, 1);

        let req = AccessRequest::new(2, RequestType::WorldKnowledge, [MemoryTier::LongTerm]);
        assert_eq!(learner.lookup(&req).await.unwrap().effectiveness, 1.0);
    }
}
