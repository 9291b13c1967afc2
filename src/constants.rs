//! Shared defaults for chunking and retrieval.

/// Token budget of a small (finest) span.
pub const DEFAULT_SMALL_TOKENS: usize = 150;
/// Token budget of a medium span.
pub const DEFAULT_MEDIUM_TOKENS: usize = 650;
/// Token budget of a large (coarsest) span.
pub const DEFAULT_LARGE_TOKENS: usize = 1750;
/// Fraction of a window repeated at the head of the next window.
pub const DEFAULT_OVERLAP_FRACTION: f32 = 0.2;

pub const DEFAULT_TOP_K: usize = 5;
/// Candidates fetched per requested result before merging and reranking.
pub const DEFAULT_OVERFETCH_FACTOR: usize = 3;
/// Candidates scoring below this cosine similarity are discarded.
pub const DEFAULT_MIN_SIMILARITY: f32 = 0.05;
/// Slack applied on both sides of a time hint, in seconds.
pub const DEFAULT_TIME_TOLERANCE_SECS: u64 = 60;
pub const DEFAULT_EMBED_BATCH_SIZE: usize = 100;

/// Dimension of the built-in feature-hashing embedder.
pub const DEFAULT_HASHING_DIMENSION: usize = 384;

/// Prefix for environment overrides read by [`crate::EngineConfig::from_env`].
pub const ENV_PREFIX: &str = "CLAIMTRAIL_";

/// Fixed answer returned when retrieval finds nothing relevant.
pub const INSUFFICIENT_INFORMATION: &str =
    "The document does not contain enough information to answer this question.";

pub(crate) const SNAPSHOT_MAGIC: &[u8; 4] = b"CTVS";
pub(crate) const SNAPSHOT_VERSION: u16 = 1;
