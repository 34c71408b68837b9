//! Typed configuration for the memory service.
//!
//! Every tunable enumerated by the external interface is represented here;
//! sections deserialize from TOML with per-field defaults so partial files
//! stay valid.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::types::ChunkType;

/// Which embedding backend to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// The configured primary provider
    #[default]
    Primary,
    /// The deterministic hash embedder only
    Fallback,
    /// Scripted mock, for tests
    Mock,
}

/// Embedding client settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    pub provider: ProviderKind,
    /// Vector dimension, locked at project creation
    pub dimension: usize,
    /// LRU cache capacity, in entries
    pub cache_capacity: usize,
    /// Grace period after the breaker opens before the fallback embedder
    /// takes over, in seconds
    pub fallback_grace_secs: u64,
    /// Rank penalty applied to fallback-provenance vectors, in [0, 1]
    pub fallback_penalty: f64,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            provider: ProviderKind::Primary,
            dimension: 384,
            cache_capacity: 4096,
            fallback_grace_secs: 60,
            fallback_penalty: 0.25,
        }
    }
}

/// Vector store connection settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorStoreSettings {
    pub pool_size: usize,
    /// Pool acquire deadline in milliseconds; `PoolExhausted` afterwards
    pub acquire_timeout_ms: u64,
}

impl Default for VectorStoreSettings {
    fn default() -> Self {
        Self {
            pool_size: 8,
            acquire_timeout_ms: 2_000,
        }
    }
}

impl VectorStoreSettings {
    #[must_use]
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }
}

/// Chunk emission strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ChunkingStrategy {
    /// Split on semantic boundaries (paragraph, then sentence)
    #[default]
    Semantic,
    /// Hard cut at the length bound
    Fixed,
    /// Semantic with per-project threshold tuning
    Adaptive,
}

/// Chunker settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingSettings {
    pub strategy: ChunkingStrategy,
    pub min_content_length: usize,
    pub max_content_length: usize,
    /// Cosine similarity above which two consecutive topics count as one
    pub similarity_threshold: f64,
    /// Distinct files modified since the last emission that force one
    pub file_change_threshold: usize,
    /// Minimum time between problem phase and verification-triggered
    /// emission, in seconds
    pub verification_min_secs: u64,
    /// Sustained single-topic work that forces an emission, in seconds
    pub sustained_topic_secs: u64,
}

impl Default for ChunkingSettings {
    fn default() -> Self {
        Self {
            strategy: ChunkingStrategy::Semantic,
            min_content_length: 24,
            max_content_length: 4_000,
            similarity_threshold: 0.82,
            file_change_threshold: 3,
            verification_min_secs: 300,
            sustained_topic_secs: 600,
        }
    }
}

/// Circuit breaker settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakerSettings {
    /// Sliding window size, in calls
    pub window: usize,
    /// Failure ratio in the window that trips the breaker
    pub threshold: f64,
    /// Cool-down before a half-open probe, in seconds
    pub cooldown_secs: u64,
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self {
            window: 10,
            threshold: 0.5,
            cooldown_secs: 30,
        }
    }
}

/// Retry settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub factor: u32,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1_000,
            factor: 2,
        }
    }
}

/// Reliability substrate settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ReliabilitySettings {
    pub breaker: BreakerSettings,
    pub retry: RetrySettings,
}

/// Pattern mining thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntelligenceSettings {
    /// Confidence below which patterns stay in the validation queue
    pub pattern_min_confidence: f64,
    /// Occurrences before a signature becomes a candidate pattern
    pub pattern_min_occurrences: u32,
    /// Similarity above which a conflict probe flags a pair
    pub conflict_similarity_threshold: f64,
    /// Freshness below which the decay sweep marks a chunk stale
    pub stale_threshold: f64,
    /// Worker tasks draining the event queue
    pub worker_count: usize,
}

impl Default for IntelligenceSettings {
    fn default() -> Self {
        Self {
            pattern_min_confidence: 0.6,
            pattern_min_occurrences: 3,
            conflict_similarity_threshold: 0.75,
            stale_threshold: 0.2,
            worker_count: 2,
        }
    }
}

/// Time-based relevance decay settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecaySettings {
    /// Half-life in days, per chunk type (keys are the snake_case names)
    pub half_life_days: HashMap<String, f64>,
}

impl Default for DecaySettings {
    fn default() -> Self {
        let mut half_life_days = HashMap::new();
        half_life_days.insert("architecture_decision".to_string(), 365.0);
        half_life_days.insert("solution".to_string(), 90.0);
        half_life_days.insert("code_change".to_string(), 60.0);
        half_life_days.insert("problem".to_string(), 45.0);
        half_life_days.insert("discussion".to_string(), 14.0);
        Self { half_life_days }
    }
}

impl DecaySettings {
    /// Half-life for a chunk type, falling back to the solution default.
    #[must_use]
    pub fn half_life(&self, chunk_type: ChunkType) -> f64 {
        self.half_life_days
            .get(&chunk_type.to_string())
            .copied()
            .unwrap_or(90.0)
    }
}

/// Tombstone retention settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionSettings {
    pub soft_delete_window_days: u32,
}

impl Default for RetentionSettings {
    fn default() -> Self {
        Self {
            soft_delete_window_days: 30,
        }
    }
}

/// Top-level service configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct EngramConfig {
    pub embedding: EmbeddingSettings,
    pub vector_store: VectorStoreSettings,
    pub chunking: ChunkingSettings,
    pub reliability: ReliabilitySettings,
    pub intelligence: IntelligenceSettings,
    pub decay: DecaySettings,
    pub retention: RetentionSettings,
}

impl EngramConfig {
    /// Parse configuration from a TOML string.
    pub fn from_toml_str(input: &str) -> Result<Self> {
        toml::from_str(input).map_err(|e| Error::InvalidParams {
            path: "config".into(),
            message: e.to_string(),
        })
    }

    /// Load configuration from a TOML file.
    pub fn from_path(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    /// Reject configurations that cannot work at runtime.
    pub fn validate(&self) -> Result<()> {
        if self.embedding.dimension == 0 {
            return Err(Error::InvalidParams {
                path: "embedding.dimension".into(),
                message: "must be positive".into(),
            });
        }
        if self.chunking.min_content_length >= self.chunking.max_content_length {
            return Err(Error::InvalidParams {
                path: "chunking.min_content_length".into(),
                message: "must be below chunking.max_content_length".into(),
            });
        }
        if !(0.0..=1.0).contains(&self.reliability.breaker.threshold) {
            return Err(Error::InvalidParams {
                path: "reliability.breaker.threshold".into(),
                message: "must be within [0, 1]".into(),
            });
        }
        if self.reliability.breaker.window == 0 {
            return Err(Error::InvalidParams {
                path: "reliability.breaker.window".into(),
                message: "must be positive".into(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        let config = EngramConfig::default();
        config.validate().expect("defaults are valid");
        assert_eq!(config.reliability.retry.max_attempts, 3);
        assert_eq!(config.reliability.breaker.window, 10);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = EngramConfig::from_toml_str(
            r#"
            [embedding]
            dimension = 768

            [chunking]
            min_content_length = 10
            "#,
        )
        .expect("parse");
        assert_eq!(config.embedding.dimension, 768);
        assert_eq!(config.chunking.min_content_length, 10);
        assert_eq!(config.chunking.max_content_length, 4_000);
        assert_eq!(config.vector_store.pool_size, 8);
    }

    #[test]
    fn decay_defaults_order_by_longevity() {
        let decay = DecaySettings::default();
        assert!(
            decay.half_life(ChunkType::ArchitectureDecision) > decay.half_life(ChunkType::Solution)
        );
        assert!(decay.half_life(ChunkType::Solution) > decay.half_life(ChunkType::Discussion));
    }

    #[test]
    fn invalid_window_rejected() {
        let mut config = EngramConfig::default();
        config.reliability.breaker.window = 0;
        assert!(config.validate().is_err());
    }
}
