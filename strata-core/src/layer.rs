//! Memory layer contract.
//!
//! Each tier (short, mid, long-term) sits behind the same `fetch by query`
//! interface. How a layer stores its data is its own business.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;
use crate::types::LayerQuery;

/// Health of a memory layer as it reports itself
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayerStatus {
    Healthy,
    Degraded,
    Unavailable,
}

impl std::fmt::Display for LayerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LayerStatus::Healthy => write!(f, "healthy"),
            LayerStatus::Degraded => write!(f, "degraded"),
            LayerStatus::Unavailable => write!(f, "unavailable"),
        }
    }
}

/// One logical memory store.
#[async_trait]
pub trait MemoryLayer: Send + Sync {
    /// Fetch the layer's payload for a query.
    async fn fetch(&self, query: &LayerQuery) -> Result<Value>;

    /// Current health.
    async fn status(&self) -> LayerStatus;

    /// Free-form layer diagnostics.
    async fn diagnostics(&self) -> Value;
}
