//! Cache-aside policy: key derivation, the per-type TTL table, and the cache
//! collaborator contract.
//!
//! ## Key format
//!
//! ```text
//! character_analysis:12:short_term,mid_term
//! └─ request type ─┘ └┘ └─ sorted layers ─┘
//!       chapter ──────┘
//! ```
//!
//! Invalidation patterns use `*` as a wildcard, so `*:12:*` drops every entry
//! for chapter 12.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

use crate::error::Result;
use crate::types::{AccessRequest, RequestType, layer_set_key};

/// TTL applied when a request type is unknown to the table (30 minutes)
pub const DEFAULT_CACHE_TTL_MS: u64 = 1_800_000;

/// Cache key for a request: request type, chapter, sorted layers
pub fn cache_key(req: &AccessRequest) -> String {
    format!(
        "{}:{}:{}",
        req.request_type,
        req.chapter_number,
        layer_set_key(&req.target_layers)
    )
}

/// Invalidation pattern matching every entry of one chapter
pub fn chapter_pattern(chapter_number: u32) -> String {
    format!("*:{}:*", chapter_number)
}

/// Invalidation pattern matching every entry of one request type
pub fn request_type_pattern(request_type: RequestType) -> String {
    format!("{}:*", request_type)
}

/// Cache TTL in milliseconds. Determined solely by the request type.
pub fn ttl_ms(request_type: RequestType) -> u64 {
    match request_type {
        RequestType::ChapterContext => DEFAULT_CACHE_TTL_MS, // 30 minutes
        RequestType::CharacterAnalysis => 3_600_000,         // 1 hour
        RequestType::NarrativeState => 900_000,              // 15 minutes
        RequestType::WorldKnowledge => 7_200_000,            // 2 hours
        RequestType::SystemDiagnostics => 300_000,           // 5 minutes
        RequestType::IntegratedContext => 2_700_000,         // 45 minutes
    }
}

/// TTL for a request type given by name; unknown names get the default.
pub fn ttl_ms_for_name(name: &str) -> u64 {
    name.parse::<RequestType>()
        .map(ttl_ms)
        .unwrap_or(DEFAULT_CACHE_TTL_MS)
}

/// Glob match supporting `*` only
pub fn matches_pattern(pattern: &str, key: &str) -> bool {
    let parts: Vec<&str> = pattern.split('*').collect();
    if parts.len() == 1 {
        return pattern == key;
    }

    let mut rest = key;
    let first = parts[0];
    if !rest.starts_with(first) {
        return false;
    }
    rest = &rest[first.len()..];

    let last = parts[parts.len() - 1];
    for part in &parts[1..parts.len() - 1] {
        if part.is_empty() {
            continue;
        }
        match rest.find(part) {
            Some(idx) => rest = &rest[idx + part.len()..],
            None => return false,
        }
    }

    rest.ends_with(last)
}

/// Key/value store with per-entry TTL.
#[async_trait]
pub trait CacheCoordinator: Send + Sync {
    /// Fetch a live entry. Expired entries read as `None`.
    async fn get(&self, key: &str) -> Result<Option<Value>>;

    /// Store an entry for `ttl`.
    async fn set(&self, key: &str, value: Value, ttl: Duration) -> Result<()>;

    /// Drop every entry whose key matches `pattern`. Returns the number removed.
    async fn invalidate(&self, pattern: &str) -> Result<usize>;

    /// Drop expired entries eagerly. Stores with native expiry can keep the default.
    async fn purge_expired(&self) -> Result<usize> {
        Ok(0)
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    value: Value,
    expires_at: Instant,
}

/// In-process TTL cache.
///
/// Expiry uses `tokio::time::Instant`, so tests can drive it with a paused clock.
#[derive(Debug, Default)]
pub struct InMemoryCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries, expired ones included
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl CacheCoordinator for InMemoryCache {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        let entries = self.entries.read().await;
        Ok(entries
            .get(key)
            .filter(|e| e.expires_at > Instant::now())
            .map(|e| e.value.clone()))
    }

    async fn set(&self, key: &str, value: Value, ttl: Duration) -> Result<()> {
        let entry = CacheEntry {
            value,
            expires_at: Instant::now() + ttl,
        };
        self.entries.write().await.insert(key.to_string(), entry);
        Ok(())
    }

    async fn invalidate(&self, pattern: &str) -> Result<usize> {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|key, _| !matches_pattern(pattern, key));
        Ok(before - entries.len())
    }

    async fn purge_expired(&self) -> Result<usize> {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, e| e.expires_at > now);
        Ok(before - entries.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MemoryTier;
    use serde_json::json;

    #[test]
    fn test_cache_key_is_sorted() {
        let req = AccessRequest::new(
            12,
            RequestType::CharacterAnalysis,
            [MemoryTier::MidTerm, MemoryTier::ShortTerm],
        );
        assert_eq!(cache_key(&req), "character_analysis:12:short_term,mid_term");
    }

    #[test]
    fn test_ttl_table() {
        assert_eq!(ttl_ms(RequestType::ChapterContext), 1_800_000);
        assert_eq!(ttl_ms(RequestType::CharacterAnalysis), 3_600_000);
        assert_eq!(ttl_ms(RequestType::NarrativeState), 900_000);
        assert_eq!(ttl_ms(RequestType::WorldKnowledge), 7_200_000);
        assert_eq!(ttl_ms(RequestType::SystemDiagnostics), 300_000);
        assert_eq!(ttl_ms(RequestType::IntegratedContext), 2_700_000);

        assert_eq!(ttl_ms_for_name("WORLD_KNOWLEDGE"), 7_200_000);
        assert_eq!(ttl_ms_for_name("PLOT_OUTLINE"), DEFAULT_CACHE_TTL_MS);
    }

    #[test]
    fn test_pattern_matching() {
        let key = "narrative_state:7:short_term,long_term";
        assert!(matches_pattern("*:7:*", key));
        assert!(matches_pattern("narrative_state:*", key));
        assert!(matches_pattern(key, key));
        assert!(!matches_pattern("*:17:*", key));
        assert!(!matches_pattern("world_knowledge:*", key));
        assert!(matches_pattern("*", key));
    }

    #[tokio::test(start_paused = true)]
    async fn test_entry_expires_after_ttl() {
        let cache = InMemoryCache::new();
        cache
            .set("k", json!({"v": 1}), Duration::from_millis(500))
            .await
            .unwrap();

        tokio::time::advance(Duration::from_millis(499)).await;
        assert_eq!(cache.get("k").await.unwrap(), Some(json!({"v": 1})));

        tokio::time::advance(Duration::from_millis(1)).await;
        assert_eq!(cache.get("k").await.unwrap(), None);

        assert_eq!(cache.purge_expired().await.unwrap(), 1);
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_invalidate_by_chapter() {
        let cache = InMemoryCache::new();
        let ttl = Duration::from_secs(60);
        cache.set("chapter_context:3:short_term", json!(1), ttl).await.unwrap();
        cache.set("world_knowledge:3:long_term", json!(2), ttl).await.unwrap();
        cache.set("chapter_context:4:short_term", json!(3), ttl).await.unwrap();

        let removed = cache.invalidate(&chapter_pattern(3)).await.unwrap();

        assert_eq!(removed, 2);
        assert_eq!(cache.len().await, 1);
        assert!(cache.get("chapter_context:4:short_term").await.unwrap().is_some());
    }
}
