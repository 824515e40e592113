//! Strategy Planner
//!
//! Decides which layers a request touches, in what order, and whether they are
//! queried in parallel. Defaults come from the request itself; a learned
//! pattern above the promotion threshold replaces them.

use std::sync::Arc;

use crate::learner::{AccessPattern, PatternLearner};
use crate::types::{AccessRequest, AccessStrategy};

/// Optimization tag for strategies taken from a learned pattern
pub const PATTERN_LEARNED: &str = "pattern-learned";

pub struct StrategyPlanner {
    learner: Arc<PatternLearner>,
    promotion_threshold: f64,
}

impl StrategyPlanner {
    pub fn new(learner: Arc<PatternLearner>, promotion_threshold: f64) -> Self {
        Self {
            learner,
            promotion_threshold,
        }
    }

    /// Plan a request, consulting the learned pattern for its shape.
    pub async fn plan(&self, req: &AccessRequest, duplicates_resolved: u32) -> AccessStrategy {
        let pattern = self.learner.lookup(req).await;
        let strategy = plan_with(req, pattern.as_ref(), self.promotion_threshold);

        tracing::debug!(
            request_type = %req.request_type,
            layers = ?strategy.priority_order,
            parallel = strategy.parallel,
            learned = strategy.is_pattern_learned(),
            "Planned access strategy"
        );

        AccessStrategy {
            duplicates_resolved,
            ..strategy
        }
    }
}

/// Pure planning step.
///
/// `priority_order` is the rank-sorted target set unless `pattern` is
/// strictly above `threshold`, in which case the pattern's recorded order and
/// execution mode win.
pub fn plan_with(req: &AccessRequest, pattern: Option<&AccessPattern>, threshold: f64) -> AccessStrategy {
    let default_order = req.sorted_layers();

    if let Some(pattern) = pattern.filter(|p| p.effectiveness > threshold) {
        // Never route outside the caller's target set.
        let learned_order: Vec<_> = pattern
            .optimal_layers
            .iter()
            .copied()
            .filter(|l| req.target_layers.contains(l))
            .collect();

        if !learned_order.is_empty() {
            return AccessStrategy {
                layers: learned_order.clone(),
                parallel: pattern.parallel && learned_order.len() > 1,
                priority_order: learned_order,
                duplicates_resolved: 0,
                optimizations: vec![PATTERN_LEARNED.to_string()],
            };
        }
    }

    AccessStrategy {
        parallel: default_order.len() > 1,
        layers: default_order.clone(),
        priority_order: default_order,
        duplicates_resolved: 0,
        optimizations: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{MemoryTier, RequestType};
    use chrono::Utc;

    fn pattern(effectiveness: f64, order: Vec<MemoryTier>, parallel: bool) -> AccessPattern {
        AccessPattern {
            request_type: RequestType::IntegratedContext,
            layer_set_key: "short_term,mid_term,long_term".into(),
            optimal_layers: order,
            parallel,
            effectiveness,
            usage: 3,
            last_used: Utc::now(),
        }
    }

    fn request() -> AccessRequest {
        AccessRequest::new(5, RequestType::IntegratedContext, MemoryTier::ALL)
    }

    #[test]
    fn test_default_plan() {
        let single = AccessRequest::new(1, RequestType::WorldKnowledge, [MemoryTier::LongTerm]);
        let strategy = plan_with(&single, None, 0.8);
        assert!(!strategy.parallel);
        assert_eq!(strategy.layers, vec![MemoryTier::LongTerm]);

        let strategy = plan_with(&request(), None, 0.8);
        assert!(strategy.parallel);
        assert_eq!(strategy.priority_order, MemoryTier::ALL.to_vec());
        assert!(!strategy.is_pattern_learned());
    }

    #[test]
    fn test_pattern_above_threshold_overrides() {
        let order = vec![MemoryTier::LongTerm, MemoryTier::ShortTerm, MemoryTier::MidTerm];
        let learned = pattern(0.95, order.clone(), false);

        let strategy = plan_with(&request(), Some(&learned), 0.8);

        assert!(strategy.is_pattern_learned());
        assert!(!strategy.parallel);
        assert_eq!(strategy.priority_order, order);
    }

    #[test]
    fn test_pattern_at_threshold_is_ignored() {
        let learned = pattern(0.8, vec![MemoryTier::LongTerm], false);
        let strategy = plan_with(&request(), Some(&learned), 0.8);

        assert!(!strategy.is_pattern_learned());
        assert_eq!(strategy.priority_order, MemoryTier::ALL.to_vec());
    }

    #[test]
    fn test_pattern_cannot_add_layers() {
        let req = AccessRequest::new(5, RequestType::IntegratedContext, [MemoryTier::MidTerm]);
        let learned = pattern(0.99, vec![MemoryTier::LongTerm], true);

        let strategy = plan_with(&req, Some(&learned), 0.8);

        assert!(!strategy.is_pattern_learned());
        assert_eq!(strategy.layers, vec![MemoryTier::MidTerm]);
    }
}
