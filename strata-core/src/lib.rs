//! Strata Core - Tiered Memory-Access Coordinator
//!
//! Single entry point through which a host asks for context drawn from three
//! memory tiers (short, mid and long-term). The coordinator collapses
//! duplicate sub-requests, serves repeats from a TTL cache, plans which tiers
//! to query and whether to query them in parallel, merges what comes back, and
//! learns which strategies serve each request shape fastest.
//!
//! # Pipeline
//!
//! - **coordinator** - Entry point; owns the request pipeline and batch processing
//! - **planner** - Default and learned access strategies
//! - **engine** - Parallel/sequential layer fetches and context integration
//! - **learner** - Per-shape effectiveness scores
//! - **optimizer** - Periodic pattern maintenance passes
//! - **diagnostics** - Running counters and health report
//! - **batch** - Shape grouping for batch requests
//!
//! # Collaborators
//!
//! Hosts plug in their own stores through traits: [`DuplicateResolver`],
//! [`CacheCoordinator`], [`MemoryLayer`], [`PatternStore`] and
//! [`ContextIntegrator`]. Enable the `sim` feature for simulated layers.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use strata_core::{AccessCoordinator, AccessRequest, MemoryTier, RequestType};
//! use strata_core::sim::SimLayer;
//!
//! async fn example() -> strata_core::Result<()> {
//!     let coordinator = AccessCoordinator::builder()
//!         .layer(MemoryTier::ShortTerm, Arc::new(SimLayer::new(MemoryTier::ShortTerm)))
//!         .layer(MemoryTier::MidTerm, Arc::new(SimLayer::new(MemoryTier::MidTerm)))
//!         .build()?;
//!     coordinator.initialize().await?;
//!
//!     let request = AccessRequest::new(
//!         12,
//!         RequestType::CharacterAnalysis,
//!         [MemoryTier::ShortTerm, MemoryTier::MidTerm],
//!     );
//!     let response = coordinator.process_request(&request).await;
//!     assert!(response.success);
//!
//!     Ok(())
//! }
//! ```

pub mod batch;
pub mod cache;
pub mod config;
pub mod coordinator;
pub mod diagnostics;
pub mod engine;
pub mod error;
pub mod layer;
pub mod learner;
pub mod optimizer;
pub mod persistence;
pub mod planner;
pub mod resolver;
pub mod types;

#[cfg(feature = "sim")]
pub mod sim;

// Re-export main types
pub use cache::{CacheCoordinator, InMemoryCache, cache_key, ttl_ms};
pub use config::{ConfigValidationError, CoordinatorConfig};
pub use coordinator::{AccessCoordinator, CoordinatorBuilder};
pub use diagnostics::{Diagnostics, PerformanceMetrics};
pub use engine::{ContextIntegrator, LayerReport, PartitionIntegrator};
pub use error::{CoordinatorError, Result};
pub use layer::{LayerStatus, MemoryLayer};
pub use learner::AccessPattern;
pub use optimizer::OptimizationReport;
pub use persistence::{InMemoryPatternStore, JsonFilePatternStore, NoopPatternStore, PatternStore};
pub use planner::PATTERN_LEARNED;
pub use resolver::{DuplicateResolver, PassthroughResolver, Resolution};
pub use types::{
    AccessRequest, AccessResponse, AccessStrategy, LayerAccessResult, LayerQuery, MemoryTier,
    RequestType, ResponseMetadata, UnifiedContext,
};
