//! Access Coordinator
//!
//! Single entry point for memory access. Each request flows through:
//!
//! ```text
//! resolve duplicates -> cache lookup -> plan -> execute -> integrate
//!                           │                                  │
//!                           └─ hit: return cached context      ├─ write-through cache
//!                                                              └─ feed latency to learner
//! ```
//!
//! The incoming request's cache key is checked before the resolver runs, so a
//! warm entry is served without touching any collaborator besides the cache.
//! On a miss the resolved request is looked up again when resolution changed
//! its key.
//!
//! Every collaborator call is bounded by the configured timeout. Failures are
//! logged and degrade locally: the original request replaces a failed
//! resolution, a failing cache reads as a miss, a failing layer is dropped from
//! the merge. Only a request where no layer returned data reports
//! `success = false`.

use chrono::Utc;
use futures::FutureExt;
use futures::future::join_all;
use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::OnceCell;
use tokio::time::{Instant, timeout};
use tracing::Instrument;
use uuid::Uuid;

use crate::batch::{GroupPlan, RequestGroup, group_requests};
use crate::cache::{
    CacheCoordinator, InMemoryCache, cache_key, chapter_pattern, request_type_pattern, ttl_ms,
};
use crate::config::CoordinatorConfig;
use crate::diagnostics::{Diagnostics, DiagnosticsReporter, PerformanceMetrics, RequestOutcome};
use crate::engine::{ContextIntegrator, ExecutionEngine, PartitionIntegrator};
use crate::error::{CoordinatorError, Result, panic_message};
use crate::layer::MemoryLayer;
use crate::learner::{AccessPattern, PatternLearner};
use crate::optimizer::{OptimizationReport, PatternOptimizer};
use crate::persistence::{NoopPatternStore, PatternStore};
use crate::planner::StrategyPlanner;
use crate::resolver::{DuplicateResolver, PassthroughResolver, Resolution};
use crate::types::{
    AccessRequest, AccessResponse, AccessStrategy, MemoryTier, RequestType, ResponseMetadata, UnifiedContext,
};

/// Builder for [`AccessCoordinator`].
///
/// Every collaborator except the memory layers has an in-process default.
pub struct CoordinatorBuilder {
    config: CoordinatorConfig,
    resolver: Arc<dyn DuplicateResolver>,
    cache: Arc<dyn CacheCoordinator>,
    pattern_store: Arc<dyn PatternStore>,
    integrator: Arc<dyn ContextIntegrator>,
    layers: HashMap<MemoryTier, Arc<dyn MemoryLayer>>,
}

impl Default for CoordinatorBuilder {
    fn default() -> Self {
        Self {
            config: CoordinatorConfig::default(),
            resolver: Arc::new(PassthroughResolver),
            cache: Arc::new(InMemoryCache::new()),
            pattern_store: Arc::new(NoopPatternStore),
            integrator: Arc::new(PartitionIntegrator),
            layers: HashMap::new(),
        }
    }
}

impl CoordinatorBuilder {
    pub fn config(mut self, config: CoordinatorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn resolver(mut self, resolver: Arc<dyn DuplicateResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn cache(mut self, cache: Arc<dyn CacheCoordinator>) -> Self {
        self.cache = cache;
        self
    }

    pub fn pattern_store(mut self, store: Arc<dyn PatternStore>) -> Self {
        self.pattern_store = store;
        self
    }

    pub fn integrator(mut self, integrator: Arc<dyn ContextIntegrator>) -> Self {
        self.integrator = integrator;
        self
    }

    /// Register the layer serving a tier. A later registration replaces an earlier one.
    pub fn layer(mut self, tier: MemoryTier, layer: Arc<dyn MemoryLayer>) -> Self {
        self.layers.insert(tier, layer);
        self
    }

    /// Validate the configuration and assemble the coordinator.
    pub fn build(self) -> Result<AccessCoordinator> {
        self.config.validate()?;

        if self.layers.is_empty() {
            tracing::warn!("Access coordinator built without memory layers; every request will fail");
        }

        let learner = Arc::new(PatternLearner::new(self.config.max_patterns));
        let planner = StrategyPlanner::new(Arc::clone(&learner), self.config.pattern_promotion_threshold);
        let engine = ExecutionEngine::new(self.layers, self.integrator, self.config.collaborator_timeout());
        let reporter = DiagnosticsReporter::new(self.config.clone());
        let optimizer = PatternOptimizer::new(Arc::clone(&learner), Arc::clone(&self.cache), self.config.clone());

        Ok(AccessCoordinator {
            config: self.config,
            resolver: self.resolver,
            cache: self.cache,
            pattern_store: self.pattern_store,
            learner,
            planner,
            engine,
            reporter,
            optimizer,
            init: OnceCell::new(),
            optimization_enabled: AtomicBool::new(false),
        })
    }
}

/// Tiered memory-access coordinator.
///
/// Cheap to share behind an `Arc`; every method takes `&self`.
pub struct AccessCoordinator {
    config: CoordinatorConfig,
    resolver: Arc<dyn DuplicateResolver>,
    cache: Arc<dyn CacheCoordinator>,
    pattern_store: Arc<dyn PatternStore>,
    learner: Arc<PatternLearner>,
    planner: StrategyPlanner,
    engine: ExecutionEngine,
    reporter: DiagnosticsReporter,
    optimizer: PatternOptimizer,
    init: OnceCell<()>,
    optimization_enabled: AtomicBool,
}

impl AccessCoordinator {
    pub fn builder() -> CoordinatorBuilder {
        CoordinatorBuilder::default()
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// Load persisted patterns and enable optimization.
    ///
    /// Concurrent callers share a single load. On failure the coordinator
    /// stays uninitialized and a later call retries.
    pub async fn initialize(&self) -> Result<()> {
        self.init
            .get_or_try_init(|| async {
                let loaded = self
                    .bounded("pattern store", self.pattern_store.load())
                    .await
                    .map_err(|e| CoordinatorError::initialization(e.to_string()))?;
                let kept = self.learner.load(loaded).await;
                self.optimization_enabled.store(true, Ordering::SeqCst);

                tracing::info!(patterns = kept, "Access coordinator initialized");
                Ok::<(), CoordinatorError>(())
            })
            .await?;
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.init.initialized()
    }

    /// Pause or resume `optimize_access_patterns`.
    pub fn set_optimization_enabled(&self, enabled: bool) {
        self.optimization_enabled.store(enabled, Ordering::SeqCst);
    }

    /// Serve one request. Never fails; problems are reported in the response.
    pub async fn process_request(&self, req: &AccessRequest) -> AccessResponse {
        self.process_instrumented(req, None).await
    }

    /// Serve a batch. Returns one response per request, in input order.
    ///
    /// Requests are grouped by shape; groups run concurrently and members of a
    /// group run in order, sharing one planned strategy. A panic while serving
    /// a group fails that group's unfinished members only.
    pub async fn process_batch_requests(&self, requests: Vec<AccessRequest>) -> Vec<AccessResponse> {
        let total = requests.len();
        let groups = group_requests(&requests);
        let batch_id = Uuid::new_v4();

        tracing::info!(%batch_id, requests = total, groups = groups.len(), "Processing batch");

        let finished = join_all(groups.iter().map(|group| self.process_group(group))).await;

        let mut slots: Vec<Option<AccessResponse>> = (0..total).map(|_| None).collect();
        for (index, response) in finished.into_iter().flatten() {
            slots[index] = Some(response);
        }

        slots
            .into_iter()
            .map(|slot| slot.unwrap_or_else(|| AccessResponse::failure("request was not processed", 0)))
            .collect()
    }

    /// Run the optimizer passes against the current metrics.
    pub async fn optimize_access_patterns(&self) -> OptimizationReport {
        if !self.is_initialized() {
            return OptimizationReport {
                optimized: false,
                improvements: Vec::new(),
                failed_passes: vec![CoordinatorError::NotInitialized.to_string()],
            };
        }
        if !self.optimization_enabled.load(Ordering::SeqCst) {
            return OptimizationReport {
                optimized: false,
                improvements: Vec::new(),
                failed_passes: vec!["optimization disabled".to_string()],
            };
        }

        let metrics = self.reporter.snapshot().await;
        let report = self.optimizer.run(&metrics).await;

        if report.optimized {
            self.reporter.mark_optimized(Utc::now()).await;
        }
        tracing::info!(
            optimized = report.optimized,
            improvements = report.improvements.len(),
            failed = report.failed_passes.len(),
            "Access pattern optimization finished"
        );

        report
    }

    pub async fn get_diagnostics(&self) -> Diagnostics {
        let layers = self.engine.layer_reports().await;
        self.reporter.report(self.is_initialized(), layers).await
    }

    /// Drop every cached entry for a chapter. Returns the number removed.
    pub async fn invalidate_chapter(&self, chapter_number: u32) -> usize {
        self.invalidate(&chapter_pattern(chapter_number)).await
    }

    /// Drop every cached entry for a request type. Returns the number removed.
    pub async fn invalidate_request_type(&self, request_type: RequestType) -> usize {
        self.invalidate(&request_type_pattern(request_type)).await
    }

    /// Write the learned patterns to the pattern store.
    pub async fn persist_patterns(&self) -> Result<usize> {
        let patterns = self.learner.snapshot().await;
        self.bounded("pattern store", self.pattern_store.save(&patterns)).await?;

        tracing::info!(count = patterns.len(), "Persisted access patterns");
        Ok(patterns.len())
    }

    /// Learned patterns, most used first
    pub async fn patterns(&self) -> Vec<AccessPattern> {
        self.learner.snapshot().await
    }

    /// Strategy the planner would pick for a request right now
    pub async fn plan_request(&self, req: &AccessRequest) -> AccessStrategy {
        self.planner.plan(req, 0).await
    }

    pub async fn metrics(&self) -> PerformanceMetrics {
        self.reporter.snapshot().await
    }

    /// Serve one group in order. Members that finished keep their responses;
    /// a panic fails the panicking member and every member after it.
    async fn process_group(&self, group: &RequestGroup) -> Vec<(usize, AccessResponse)> {
        let start = Instant::now();
        let plan = GroupPlan::new(group.key.clone());
        let mut responses = Vec::with_capacity(group.len());

        for (position, (index, req)) in group.members.iter().enumerate() {
            let served = AssertUnwindSafe(self.process_instrumented(req, Some(&plan)))
                .catch_unwind()
                .await;

            let payload = match served {
                Ok(response) => {
                    responses.push((*index, response));
                    continue;
                }
                Err(payload) => payload,
            };

            let message = panic_message(payload.as_ref());
            let processing_time_ms = elapsed_ms(start);
            let unfinished = &group.members[position..];
            tracing::error!(
                group = %group.key,
                completed = position,
                failed = unfinished.len(),
                error = %message,
                "Batch group failed"
            );

            for (index, _) in unfinished {
                self.reporter
                    .record(&RequestOutcome {
                        success: false,
                        processing_time_ms,
                        ..Default::default()
                    })
                    .await;
                responses.push((
                    *index,
                    AccessResponse::failure(
                        format!("batch group {} failed: {}", group.key, message),
                        processing_time_ms,
                    ),
                ));
            }
            break;
        }

        responses
    }

    async fn process_instrumented(&self, req: &AccessRequest, plan: Option<&GroupPlan>) -> AccessResponse {
        let span = tracing::info_span!(
            "access_request",
            request_id = %Uuid::new_v4(),
            request_type = %req.request_type,
            chapter = req.chapter_number,
        );
        self.process(req, plan).instrument(span).await
    }

    async fn process(&self, req: &AccessRequest, plan: Option<&GroupPlan>) -> AccessResponse {
        let start = Instant::now();

        if !self.is_initialized() {
            tracing::warn!("Request rejected before initialization");
            return AccessResponse::failure(CoordinatorError::NotInitialized.to_string(), 0);
        }

        if req.target_layers.is_empty() {
            let processing_time_ms = elapsed_ms(start);
            self.reporter
                .record(&RequestOutcome {
                    success: false,
                    processing_time_ms,
                    ..Default::default()
                })
                .await;
            return AccessResponse::failure("request targets no memory layers", processing_time_ms);
        }

        let original_key = cache_key(req);
        if let Some(context) = self.cache_lookup(&original_key).await {
            return self.cache_hit(context, 0, start).await;
        }

        let resolution = self.resolve(req).await;
        let resolved = &resolution.request;
        let resolved_key = cache_key(resolved);
        if resolved_key != original_key {
            if let Some(context) = self.cache_lookup(&resolved_key).await {
                return self.cache_hit(context, resolution.duplicates_resolved, start).await;
            }
        }

        let mut strategy = match plan.filter(|p| p.applies_to(resolved)) {
            Some(plan) => plan
                .cell()
                .get_or_init(|| self.planner.plan(resolved, 0))
                .await
                .clone(),
            None => self.planner.plan(resolved, 0).await,
        };
        strategy.duplicates_resolved = resolution.duplicates_resolved;

        let results = self.engine.execute(resolved, &strategy).await;
        let context = self.engine.integrate(resolved, &results);
        let integrated_ms = elapsed_ms(start);

        let layers_succeeded: Vec<_> = results.iter().filter(|r| r.success()).map(|r| r.layer).collect();
        let layers_failed: Vec<_> = results.iter().filter(|r| !r.success()).map(|r| r.layer).collect();

        if let Some(context) = &context {
            self.write_through(resolved, context).await;
            if resolved_key != original_key {
                self.write_through(req, context).await;
            }
        }

        self.learner.learn(resolved, &strategy, integrated_ms).await;

        let processing_time_ms = elapsed_ms(start);
        let success = context.is_some();
        self.reporter
            .record(&RequestOutcome {
                success,
                from_cache: false,
                layers_succeeded: layers_succeeded.clone(),
                layers_failed: layers_failed.clone(),
                processing_time_ms,
            })
            .await;

        let metadata = ResponseMetadata {
            layers_accessed: layers_succeeded,
            duplicates_resolved: resolution.duplicates_resolved,
            cache_hits: 0,
        };

        if success {
            tracing::debug!(
                layers = ?metadata.layers_accessed,
                parallel = strategy.parallel,
                learned = strategy.is_pattern_learned(),
                processing_time_ms,
                "Request served"
            );
        } else {
            tracing::warn!(layers_failed = ?layers_failed, processing_time_ms, "No memory layer returned data");
        }

        AccessResponse {
            success,
            error: (!success).then(|| format!("no memory layer returned data ({} attempted)", results.len())),
            context,
            from_cache: false,
            processing_time_ms,
            metadata,
        }
    }

    async fn cache_hit(&self, context: UnifiedContext, duplicates_resolved: u32, start: Instant) -> AccessResponse {
        let processing_time_ms = elapsed_ms(start);
        self.reporter
            .record(&RequestOutcome {
                success: true,
                from_cache: true,
                processing_time_ms,
                ..Default::default()
            })
            .await;
        tracing::debug!(processing_time_ms, "Served from cache");

        AccessResponse {
            success: true,
            context: Some(context),
            from_cache: true,
            processing_time_ms,
            metadata: ResponseMetadata {
                layers_accessed: Vec::new(),
                duplicates_resolved,
                cache_hits: 1,
            },
            error: None,
        }
    }

    async fn resolve(&self, req: &AccessRequest) -> Resolution {
        match self.bounded("resolver", self.resolver.resolve(req)).await {
            Ok(resolution) if resolution.request.target_layers.is_empty() => {
                tracing::warn!("Resolver dropped every target layer, using original request");
                Resolution::unchanged(req.clone())
            }
            Ok(resolution) => resolution,
            Err(e) => {
                tracing::warn!(error = %e, "Duplicate resolution failed, using original request");
                Resolution::unchanged(req.clone())
            }
        }
    }

    /// Cached context for a key. Any cache problem reads as a miss.
    async fn cache_lookup(&self, key: &str) -> Option<UnifiedContext> {
        match self.bounded("cache", self.cache.get(key)).await {
            Ok(Some(value)) => match serde_json::from_value(value) {
                Ok(context) => Some(context),
                Err(e) => {
                    tracing::warn!(key, error = %e, "Discarding unreadable cache entry");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(key, error = %e, "Cache lookup failed");
                None
            }
        }
    }

    async fn write_through(&self, req: &AccessRequest, context: &UnifiedContext) {
        let key = cache_key(req);
        let ttl = std::time::Duration::from_millis(ttl_ms(req.request_type));

        let value = match serde_json::to_value(context) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Failed to serialize context for cache");
                return;
            }
        };

        if let Err(e) = self.bounded("cache", self.cache.set(&key, value, ttl)).await {
            tracing::warn!(key = %key, error = %e, "Cache write failed");
        }
    }

    async fn invalidate(&self, pattern: &str) -> usize {
        match self.bounded("cache", self.cache.invalidate(pattern)).await {
            Ok(removed) => {
                tracing::info!(pattern, removed, "Invalidated cache entries");
                removed
            }
            Err(e) => {
                tracing::warn!(pattern, error = %e, "Cache invalidation failed");
                0
            }
        }
    }

    /// Run a collaborator call under the configured timeout
    async fn bounded<T>(&self, collaborator: &'static str, call: impl Future<Output = Result<T>>) -> Result<T> {
        let budget = self.config.collaborator_timeout();
        timeout(budget, call)
            .await
            .map_err(|_| CoordinatorError::timeout(collaborator, budget.as_millis() as u64))?
    }
}

fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}
