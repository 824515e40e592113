//! Configuration management for strata.
//!
//! Configuration is loaded from:
//! 1. `$STRATA_CONFIG` if set
//! 2. Config file (`<data dir>/config.toml`)
//! 3. Default values
//!
//! Every table is optional; missing keys fall back to their defaults.

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use strata_core::{CoordinatorConfig, MemoryTier};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Coordinator tunables
    #[serde(default)]
    pub coordinator: CoordinatorConfig,

    /// Simulated workload and tiers
    #[serde(default)]
    pub simulation: SimulationConfig,

    /// Paths
    #[serde(default)]
    pub paths: PathsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Requests per `simulate` run
    #[serde(default = "default_requests")]
    pub requests: usize,

    /// Chapters are drawn from 1..=chapters
    #[serde(default = "default_chapters")]
    pub chapters: u32,

    /// Run the optimizer every N requests (0 disables)
    #[serde(default = "default_optimize_every")]
    pub optimize_every: usize,

    #[serde(default = "default_short_term")]
    pub short_term: TierSimulation,

    #[serde(default = "default_mid_term")]
    pub mid_term: TierSimulation,

    #[serde(default = "default_long_term")]
    pub long_term: TierSimulation,
}

/// Behaviour of one simulated tier
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TierSimulation {
    /// Fetch latency in milliseconds
    pub latency_ms: u64,

    /// Fraction of fetches that fail (0.0 - 1.0)
    #[serde(default)]
    pub failure_rate: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Base directory for strata data
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Learned access patterns; `<data_dir>/patterns.json` when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patterns_file: Option<PathBuf>,
}

// Default value functions
fn default_requests() -> usize {
    200
}

fn default_chapters() -> u32 {
    20
}

fn default_optimize_every() -> usize {
    50
}

fn default_short_term() -> TierSimulation {
    TierSimulation {
        latency_ms: 5,
        failure_rate: 0.0,
    }
}

fn default_mid_term() -> TierSimulation {
    TierSimulation {
        latency_ms: 40,
        failure_rate: 0.02,
    }
}

fn default_long_term() -> TierSimulation {
    TierSimulation {
        latency_ms: 150,
        failure_rate: 0.05,
    }
}

fn default_data_dir() -> PathBuf {
    if let Some(proj_dirs) = ProjectDirs::from("dev", "strata", "strata") {
        proj_dirs.data_dir().to_path_buf()
    } else {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".strata")
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            requests: default_requests(),
            chapters: default_chapters(),
            optimize_every: default_optimize_every(),
            short_term: default_short_term(),
            mid_term: default_mid_term(),
            long_term: default_long_term(),
        }
    }
}

impl SimulationConfig {
    pub fn tier(&self, tier: MemoryTier) -> TierSimulation {
        match tier {
            MemoryTier::ShortTerm => self.short_term,
            MemoryTier::MidTerm => self.mid_term,
            MemoryTier::LongTerm => self.long_term,
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            patterns_file: None,
        }
    }
}

impl PathsConfig {
    /// Effective pattern file
    pub fn patterns_file(&self) -> PathBuf {
        self.patterns_file
            .clone()
            .unwrap_or_else(|| self.data_dir.join("patterns.json"))
    }
}

impl Config {
    /// Load configuration from the config file, or defaults when there is none.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path())
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let config: Config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            toml::from_str(&content).context("Failed to parse config file")?
        } else {
            Config::default()
        };

        config
            .coordinator
            .validate()
            .context("Invalid coordinator configuration")?;

        Ok(config)
    }

    /// Get the config file path.
    pub fn config_path() -> PathBuf {
        if let Ok(path) = std::env::var("STRATA_CONFIG") {
            PathBuf::from(path)
        } else {
            default_data_dir().join("config.toml")
        }
    }
}
