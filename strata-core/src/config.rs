//! Coordinator Configuration
//!
//! Tunables for the access coordinator. Every field has a serde default so a
//! partial TOML/JSON table is enough to override a single knob.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Coordinator configuration options
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Upper bound for any single resolver/cache/layer call in milliseconds (default: 30000)
    pub collaborator_timeout_ms: u64,

    /// Learned patterns above this effectiveness override default planning (default: 0.8)
    pub pattern_promotion_threshold: f64,

    /// Maximum number of learned patterns kept in memory (default: 1000)
    pub max_patterns: usize,

    /// Patterns idle for longer than this are dropped by the optimizer (default: 86400 = 24 hours)
    pub pattern_idle_ttl_secs: u64,

    /// Usage count at which a pattern counts as frequent (default: 10)
    pub frequent_usage_threshold: u64,

    /// Cache hit ratio the diagnostics and optimizer aim for (default: 0.6)
    pub target_cache_hit_ratio: f64,

    /// Error rate above which diagnostics flag the coordinator (default: 0.1)
    pub max_error_rate: f64,

    /// Per-layer failure rate above which learned routes are demoted (default: 0.5)
    pub unreliable_layer_error_rate: f64,

    /// Average response time that triggers a latency advisory in milliseconds (default: 1000)
    pub slow_response_threshold_ms: f64,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            collaborator_timeout_ms: 30_000,
            pattern_promotion_threshold: 0.8,
            max_patterns: 1000,
            pattern_idle_ttl_secs: 86_400, // 24 hours
            frequent_usage_threshold: 10,
            target_cache_hit_ratio: 0.6,
            max_error_rate: 0.1,
            unreliable_layer_error_rate: 0.5,
            slow_response_threshold_ms: 1000.0,
        }
    }
}

impl CoordinatorConfig {
    /// Set the collaborator timeout
    pub fn with_collaborator_timeout(mut self, timeout: Duration) -> Self {
        self.collaborator_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Set the pattern promotion threshold
    pub fn with_promotion_threshold(mut self, threshold: f64) -> Self {
        self.pattern_promotion_threshold = threshold;
        self
    }

    /// Set the pattern capacity
    pub fn with_max_patterns(mut self, max_patterns: usize) -> Self {
        self.max_patterns = max_patterns;
        self
    }

    /// Set the idle TTL after which unused patterns are dropped
    pub fn with_pattern_idle_ttl(mut self, ttl: Duration) -> Self {
        self.pattern_idle_ttl_secs = ttl.as_secs();
        self
    }

    /// Collaborator timeout as a `Duration`
    pub fn collaborator_timeout(&self) -> Duration {
        Duration::from_millis(self.collaborator_timeout_ms)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.collaborator_timeout_ms == 0 {
            return Err(ConfigValidationError::InvalidValue {
                field: "collaborator_timeout_ms".into(),
                message: "must be greater than 0".into(),
            });
        }

        if self.max_patterns == 0 {
            return Err(ConfigValidationError::InvalidValue {
                field: "max_patterns".into(),
                message: "must be greater than 0".into(),
            });
        }

        for (field, value) in [
            ("pattern_promotion_threshold", self.pattern_promotion_threshold),
            ("target_cache_hit_ratio", self.target_cache_hit_ratio),
            ("max_error_rate", self.max_error_rate),
            ("unreliable_layer_error_rate", self.unreliable_layer_error_rate),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigValidationError::InvalidValue {
                    field: field.into(),
                    message: "must be between 0 and 1".into(),
                });
            }
        }

        if self.slow_response_threshold_ms <= 0.0 {
            return Err(ConfigValidationError::InvalidValue {
                field: "slow_response_threshold_ms".into(),
                message: "must be greater than 0".into(),
            });
        }

        Ok(())
    }
}

/// Configuration validation errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigValidationError {
    #[error("invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}
