//! Request, response and strategy types shared by every coordinator stage.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// One of the three logical memory stores.
///
/// Variant order is the fixed tier rank (short = 1, mid = 2, long = 3), so the
/// derived `Ord` gives the default priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MemoryTier {
    ShortTerm,
    MidTerm,
    LongTerm,
}

impl MemoryTier {
    /// All tiers in rank order
    pub const ALL: [MemoryTier; 3] = [MemoryTier::ShortTerm, MemoryTier::MidTerm, MemoryTier::LongTerm];

    /// Fixed tier rank used for default ordering
    pub fn rank(&self) -> u8 {
        match self {
            MemoryTier::ShortTerm => 1,
            MemoryTier::MidTerm => 2,
            MemoryTier::LongTerm => 3,
        }
    }
}

impl std::fmt::Display for MemoryTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MemoryTier::ShortTerm => write!(f, "short_term"),
            MemoryTier::MidTerm => write!(f, "mid_term"),
            MemoryTier::LongTerm => write!(f, "long_term"),
        }
    }
}

impl std::str::FromStr for MemoryTier {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "short_term" | "short" => Ok(MemoryTier::ShortTerm),
            "mid_term" | "mid" => Ok(MemoryTier::MidTerm),
            "long_term" | "long" => Ok(MemoryTier::LongTerm),
            _ => Err(format!("Invalid memory tier: {}", s)),
        }
    }
}

/// Kind of context a caller is asking for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestType {
    ChapterContext,
    CharacterAnalysis,
    NarrativeState,
    WorldKnowledge,
    SystemDiagnostics,
    IntegratedContext,
}

impl RequestType {
    pub const ALL: [RequestType; 6] = [
        RequestType::ChapterContext,
        RequestType::CharacterAnalysis,
        RequestType::NarrativeState,
        RequestType::WorldKnowledge,
        RequestType::SystemDiagnostics,
        RequestType::IntegratedContext,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RequestType::ChapterContext => "chapter_context",
            RequestType::CharacterAnalysis => "character_analysis",
            RequestType::NarrativeState => "narrative_state",
            RequestType::WorldKnowledge => "world_knowledge",
            RequestType::SystemDiagnostics => "system_diagnostics",
            RequestType::IntegratedContext => "integrated_context",
        }
    }
}

impl std::fmt::Display for RequestType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RequestType {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.to_ascii_lowercase().replace('-', "_");
        RequestType::ALL
            .into_iter()
            .find(|t| t.as_str() == normalized)
            .ok_or_else(|| format!("Invalid request type: {}", s))
    }
}

/// A caller's request for context. Immutable once issued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessRequest {
    pub chapter_number: u32,
    pub request_type: RequestType,
    pub target_layers: BTreeSet<MemoryTier>,
}

impl AccessRequest {
    pub fn new(
        chapter_number: u32,
        request_type: RequestType,
        target_layers: impl IntoIterator<Item = MemoryTier>,
    ) -> Self {
        Self {
            chapter_number,
            request_type,
            target_layers: target_layers.into_iter().collect(),
        }
    }

    /// Target layers in tier rank order
    pub fn sorted_layers(&self) -> Vec<MemoryTier> {
        self.target_layers.iter().copied().collect()
    }

    /// Shape of the request: request type plus sorted layer set.
    ///
    /// Requests with the same shape share learned patterns and batch groups.
    pub fn shape_key(&self) -> String {
        format!("{}:{}", self.request_type, layer_set_key(&self.target_layers))
    }
}

/// Comma-joined, rank-ordered layer list
pub fn layer_set_key<'a>(layers: impl IntoIterator<Item = &'a MemoryTier>) -> String {
    let mut sorted: Vec<MemoryTier> = layers.into_iter().copied().collect();
    sorted.sort();
    sorted.dedup();
    sorted
        .iter()
        .map(|l| l.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

/// Query handed to a memory layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerQuery {
    pub chapter_number: u32,
    pub request_type: RequestType,
}

impl From<&AccessRequest> for LayerQuery {
    fn from(req: &AccessRequest) -> Self {
        Self {
            chapter_number: req.chapter_number,
            request_type: req.request_type,
        }
    }
}

/// Merged context, partitioned by the tier each payload came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnifiedContext {
    pub chapter_number: u32,
    pub request_type: RequestType,
    pub tiers: BTreeMap<MemoryTier, serde_json::Value>,
}

impl UnifiedContext {
    pub fn tier(&self, tier: MemoryTier) -> Option<&serde_json::Value> {
        self.tiers.get(&tier)
    }
}

/// Per-response bookkeeping
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseMetadata {
    /// Layers that returned data for this response
    pub layers_accessed: Vec<MemoryTier>,
    pub duplicates_resolved: u32,
    pub cache_hits: u32,
}

/// Result of one request. Produced once, never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessResponse {
    pub success: bool,
    pub context: Option<UnifiedContext>,
    pub from_cache: bool,
    pub processing_time_ms: u64,
    pub metadata: ResponseMetadata,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AccessResponse {
    pub fn failure(error: impl Into<String>, processing_time_ms: u64) -> Self {
        Self {
            success: false,
            context: None,
            from_cache: false,
            processing_time_ms,
            metadata: ResponseMetadata::default(),
            error: Some(error.into()),
        }
    }
}

/// How a single request will be executed. Transient.
#[derive(Debug, Clone, PartialEq)]
pub struct AccessStrategy {
    pub layers: Vec<MemoryTier>,
    pub parallel: bool,
    pub priority_order: Vec<MemoryTier>,
    pub duplicates_resolved: u32,
    pub optimizations: Vec<String>,
}

impl AccessStrategy {
    pub fn is_pattern_learned(&self) -> bool {
        self.optimizations.iter().any(|o| o == crate::planner::PATTERN_LEARNED)
    }
}

/// Outcome of querying one layer
#[derive(Debug, Clone)]
pub struct LayerAccessResult {
    pub layer: MemoryTier,
    pub outcome: Result<serde_json::Value, String>,
    pub processing_time_ms: u64,
}

impl LayerAccessResult {
    pub fn success(&self) -> bool {
        self.outcome.is_ok()
    }
}
