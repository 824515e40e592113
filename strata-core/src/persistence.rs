//! Pattern persistence.
//!
//! Learned patterns are loaded once during `initialize()` and written back
//! on demand. The file format is a versioned JSON snapshot.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Mutex;

use crate::error::{CoordinatorError, Result};
use crate::learner::AccessPattern;

const SNAPSHOT_VERSION: u32 = 1;

/// Loads and saves learned access patterns.
#[async_trait]
pub trait PatternStore: Send + Sync {
    async fn load(&self) -> Result<Vec<AccessPattern>>;

    async fn save(&self, patterns: &[AccessPattern]) -> Result<()>;
}

/// Store that remembers nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopPatternStore;

#[async_trait]
impl PatternStore for NoopPatternStore {
    async fn load(&self) -> Result<Vec<AccessPattern>> {
        Ok(Vec::new())
    }

    async fn save(&self, _patterns: &[AccessPattern]) -> Result<()> {
        Ok(())
    }
}

/// Process-local store; counts loads so callers can observe initialization.
#[derive(Debug, Default)]
pub struct InMemoryPatternStore {
    patterns: Mutex<Vec<AccessPattern>>,
    loads: AtomicU64,
}

impl InMemoryPatternStore {
    pub fn new(patterns: Vec<AccessPattern>) -> Self {
        Self {
            patterns: Mutex::new(patterns),
            loads: AtomicU64::new(0),
        }
    }

    pub fn load_count(&self) -> u64 {
        self.loads.load(Ordering::SeqCst)
    }

    pub async fn saved(&self) -> Vec<AccessPattern> {
        self.patterns.lock().await.clone()
    }
}

#[async_trait]
impl PatternStore for InMemoryPatternStore {
    async fn load(&self) -> Result<Vec<AccessPattern>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        Ok(self.patterns.lock().await.clone())
    }

    async fn save(&self, patterns: &[AccessPattern]) -> Result<()> {
        *self.patterns.lock().await = patterns.to_vec();
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PatternSnapshot {
    version: u32,
    saved_at: DateTime<Utc>,
    patterns: Vec<AccessPattern>,
}

/// Patterns stored as a JSON document on disk.
#[derive(Debug, Clone)]
pub struct JsonFilePatternStore {
    path: PathBuf,
}

impl JsonFilePatternStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl PatternStore for JsonFilePatternStore {
    /// A missing file is an empty snapshot, not an error.
    async fn load(&self) -> Result<Vec<AccessPattern>> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let snapshot: PatternSnapshot = serde_json::from_str(&content)?;
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(CoordinatorError::collaborator(
                "pattern store",
                format!(
                    "unsupported snapshot version {} in {}",
                    snapshot.version,
                    self.path.display()
                ),
            ));
        }

        Ok(snapshot.patterns)
    }

    async fn save(&self, patterns: &[AccessPattern]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let snapshot = PatternSnapshot {
            version: SNAPSHOT_VERSION,
            saved_at: Utc::now(),
            patterns: patterns.to_vec(),
        };
        let content = serde_json::to_string_pretty(&snapshot)?;

        // Write-then-rename so a crash never leaves a half-written snapshot.
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, content).await?;
        tokio::fs::rename(&tmp, &self.path).await?;

        tracing::debug!(path = %self.path.display(), count = patterns.len(), "Saved access patterns");
        Ok(())
    }
}
