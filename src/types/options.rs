//! Tunable options for chunking, retrieval and the query engine.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_EMBED_BATCH_SIZE, DEFAULT_LARGE_TOKENS, DEFAULT_MEDIUM_TOKENS,
    DEFAULT_MIN_SIMILARITY, DEFAULT_OVERFETCH_FACTOR, DEFAULT_OVERLAP_FRACTION,
    DEFAULT_SMALL_TOKENS, DEFAULT_TIME_TOLERANCE_SECS, DEFAULT_TOP_K, ENV_PREFIX,
};
use crate::error::{ClaimtrailError, Result};

use super::span::SpanLevel;

fn default_small_tokens() -> usize {
    DEFAULT_SMALL_TOKENS
}

fn default_medium_tokens() -> usize {
    DEFAULT_MEDIUM_TOKENS
}

fn default_large_tokens() -> usize {
    DEFAULT_LARGE_TOKENS
}

fn default_overlap_fraction() -> f32 {
    DEFAULT_OVERLAP_FRACTION
}

fn default_top_k() -> usize {
    DEFAULT_TOP_K
}

fn default_overfetch_factor() -> usize {
    DEFAULT_OVERFETCH_FACTOR
}

fn default_min_similarity() -> f32 {
    DEFAULT_MIN_SIMILARITY
}

fn default_time_tolerance_secs() -> u64 {
    DEFAULT_TIME_TOLERANCE_SECS
}

fn default_embed_batch_size() -> usize {
    DEFAULT_EMBED_BATCH_SIZE
}

/// Token budgets for the three span levels and the shared overlap fraction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChunkingConfig {
    #[serde(default = "default_small_tokens")]
    pub small_tokens: usize,
    #[serde(default = "default_medium_tokens")]
    pub medium_tokens: usize,
    #[serde(default = "default_large_tokens")]
    pub large_tokens: usize,
    #[serde(default = "default_overlap_fraction")]
    pub overlap_fraction: f32,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            small_tokens: DEFAULT_SMALL_TOKENS,
            medium_tokens: DEFAULT_MEDIUM_TOKENS,
            large_tokens: DEFAULT_LARGE_TOKENS,
            overlap_fraction: DEFAULT_OVERLAP_FRACTION,
        }
    }
}

impl ChunkingConfig {
    /// Token budget for `level`.
    #[must_use]
    pub fn budget(&self, level: SpanLevel) -> usize {
        match level {
            SpanLevel::Small => self.small_tokens,
            SpanLevel::Medium => self.medium_tokens,
            SpanLevel::Large => self.large_tokens,
        }
    }

    pub fn validate(&self) -> Result<()> {
        validate_overlap(self.overlap_fraction)?;
        if self.small_tokens == 0 {
            return Err(ClaimtrailError::config("small_tokens must be positive"));
        }
        if self.small_tokens >= self.medium_tokens || self.medium_tokens >= self.large_tokens {
            return Err(ClaimtrailError::config(format!(
                "budgets must increase from small to large (got {}/{}/{})",
                self.small_tokens, self.medium_tokens, self.large_tokens
            )));
        }
        Ok(())
    }
}

pub(crate) fn validate_overlap(fraction: f32) -> Result<()> {
    if !(0.0..1.0).contains(&fraction) {
        return Err(ClaimtrailError::config(format!(
            "overlap_fraction must be in [0, 1), got {fraction}"
        )));
    }
    Ok(())
}

/// Knobs shared by the span and summary retrievers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_overfetch_factor")]
    pub overfetch_factor: usize,
    #[serde(default = "default_min_similarity")]
    pub min_similarity: f32,
    /// Widens a time hint on both sides before matching item timestamps.
    #[serde(default = "default_time_tolerance_secs")]
    pub time_tolerance_secs: u64,
    /// A time-matched item may overtake unmatched items scoring up to this much higher.
    #[serde(default)]
    pub time_boost_margin: f32,
    /// Deadline for each embedding and vector-store call. `None` runs calls inline.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
            overfetch_factor: DEFAULT_OVERFETCH_FACTOR,
            min_similarity: DEFAULT_MIN_SIMILARITY,
            time_tolerance_secs: DEFAULT_TIME_TOLERANCE_SECS,
            time_boost_margin: 0.0,
            timeout_ms: None,
        }
    }
}

impl RetrievalConfig {
    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }

    pub fn validate(&self) -> Result<()> {
        if self.top_k == 0 {
            return Err(ClaimtrailError::config("top_k must be positive"));
        }
        if self.overfetch_factor < 2 {
            return Err(ClaimtrailError::config(
                "overfetch_factor must be at least 2 so more candidates than top_k are fetched",
            ));
        }
        if !self.min_similarity.is_finite() || !self.time_boost_margin.is_finite() {
            return Err(ClaimtrailError::config(
                "min_similarity and time_boost_margin must be finite",
            ));
        }
        if self.time_boost_margin < 0.0 {
            return Err(ClaimtrailError::config("time_boost_margin must not be negative"));
        }
        Ok(())
    }
}

/// Top-level configuration; every field has a default so partial JSON files load.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default = "default_embed_batch_size")]
    pub embed_batch_size: usize,
}

impl EngineConfig {
    /// Start a fluent builder for `EngineConfig`.
    #[must_use]
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder::default()
    }

    /// Load a JSON config file, then validate it.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs_err::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults overridden by `CLAIMTRAIL_*` environment variables.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_overrides(|key| std::env::var(format!("{ENV_PREFIX}{key}")).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from `lookup`, keyed by the variable name without its prefix.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        override_from(&lookup, "SMALL_CHUNK_SIZE", &mut self.chunking.small_tokens)?;
        override_from(&lookup, "MEDIUM_CHUNK_SIZE", &mut self.chunking.medium_tokens)?;
        override_from(&lookup, "LARGE_CHUNK_SIZE", &mut self.chunking.large_tokens)?;
        override_from(&lookup, "CHUNK_OVERLAP", &mut self.chunking.overlap_fraction)?;
        override_from(&lookup, "TOP_K_RESULTS", &mut self.retrieval.top_k)?;
        override_from(&lookup, "OVERFETCH_FACTOR", &mut self.retrieval.overfetch_factor)?;
        override_from(&lookup, "MIN_SIMILARITY", &mut self.retrieval.min_similarity)?;
        override_from(
            &lookup,
            "TIME_TOLERANCE_SECS",
            &mut self.retrieval.time_tolerance_secs,
        )?;
        override_from(&lookup, "TIME_BOOST_MARGIN", &mut self.retrieval.time_boost_margin)?;
        override_from(&lookup, "EMBED_BATCH_SIZE", &mut self.embed_batch_size)?;
        if let Some(raw) = lookup("STORE_TIMEOUT_MS") {
            self.retrieval.timeout_ms = Some(parse_override("STORE_TIMEOUT_MS", &raw)?);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        self.chunking.validate()?;
        self.retrieval.validate()?;
        if self.embed_batch_size == 0 {
            return Err(ClaimtrailError::config("embed_batch_size must be positive"));
        }
        Ok(())
    }
}

fn override_from<F, T>(lookup: &F, key: &str, slot: &mut T) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    if let Some(raw) = lookup(key) {
        *slot = parse_override(key, &raw)?;
    }
    Ok(())
}

fn parse_override<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.trim().parse().map_err(|_| {
        ClaimtrailError::config(format!("{ENV_PREFIX}{key} has an unparsable value `{raw}`"))
    })
}

#[derive(Debug, Clone, Default)]
pub struct EngineConfigBuilder {
    inner: EngineConfig,
}

impl EngineConfigBuilder {
    #[must_use]
    pub fn chunk_budgets(mut self, small: usize, medium: usize, large: usize) -> Self {
        self.inner.chunking.small_tokens = small;
        self.inner.chunking.medium_tokens = medium;
        self.inner.chunking.large_tokens = large;
        self
    }

    #[must_use]
    pub fn overlap_fraction(mut self, fraction: f32) -> Self {
        self.inner.chunking.overlap_fraction = fraction;
        self
    }

    #[must_use]
    pub fn top_k(mut self, top_k: usize) -> Self {
        self.inner.retrieval.top_k = top_k;
        self
    }

    #[must_use]
    pub fn min_similarity(mut self, min_similarity: f32) -> Self {
        self.inner.retrieval.min_similarity = min_similarity;
        self
    }

    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.inner.retrieval.timeout_ms = Some(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX));
        self
    }

    pub fn build(self) -> Result<EngineConfig> {
        self.inner.validate()?;
        Ok(self.inner)
    }
}
