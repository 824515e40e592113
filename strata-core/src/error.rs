//! Error types for strata-core.

use thiserror::Error;

/// Result type alias using the coordinator error
pub type Result<T> = std::result::Result<T, CoordinatorError>;

/// Coordinator errors
///
/// Only initialization and pattern persistence surface these to callers.
/// Everything on the request path is recovered locally and reported through
/// the response object instead.
#[derive(Debug, Error)]
pub enum CoordinatorError {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(#[from] crate::config::ConfigValidationError),

    /// Initialization failed (pattern store unreachable, bad snapshot, ...)
    #[error("initialization failed: {message}")]
    Initialization { message: String },

    /// Operation attempted before `initialize()` completed
    #[error("coordinator not initialized")]
    NotInitialized,

    /// A collaborator (resolver, cache, layer, pattern store) failed
    #[error("{collaborator} error: {message}")]
    Collaborator {
        collaborator: &'static str,
        message: String,
    },

    /// A collaborator call exceeded its time budget
    #[error("{collaborator} timed out after {duration_ms}ms")]
    Timeout {
        collaborator: &'static str,
        duration_ms: u64,
    },

    /// No layer is registered for the requested tier
    #[error("no layer registered for tier {0}")]
    LayerUnavailable(crate::types::MemoryTier),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CoordinatorError {
    /// Create an initialization error
    pub fn initialization(message: impl Into<String>) -> Self {
        Self::Initialization {
            message: message.into(),
        }
    }

    /// Create a collaborator error
    pub fn collaborator(collaborator: &'static str, message: impl Into<String>) -> Self {
        Self::Collaborator {
            collaborator,
            message: message.into(),
        }
    }

    /// Create a timeout error
    pub fn timeout(collaborator: &'static str, duration_ms: u64) -> Self {
        Self::Timeout {
            collaborator,
            duration_ms,
        }
    }

    /// Check if this error is a timeout error
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

/// Human-readable message from a caught panic payload
pub fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MemoryTier;

    #[test]
    fn test_error_creation() {
        let err = CoordinatorError::collaborator("cache", "connection refused");
        assert_eq!(err.to_string(), "cache error: connection refused");

        let err = CoordinatorError::timeout("layer", 30000);
        assert!(err.is_timeout());
        assert!(err.to_string().contains("30000"));

        let err = CoordinatorError::LayerUnavailable(MemoryTier::MidTerm);
        assert!(err.to_string().contains("mid_term"));
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn std::any::Any + Send> = Box::new("layer exploded");
        assert_eq!(panic_message(payload.as_ref()), "layer exploded");

        let payload: Box<dyn std::any::Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(payload.as_ref()), "owned");

        let payload: Box<dyn std::any::Any + Send> = Box::new(42u32);
        assert_eq!(panic_message(payload.as_ref()), "unknown panic");
    }
}
