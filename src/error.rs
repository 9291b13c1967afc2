//! Error taxonomy shared by chunking, indexing and retrieval.

use std::io;

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, ClaimtrailError>;

#[derive(Debug, Error)]
pub enum ClaimtrailError {
    /// Malformed section input. Empty section text is not an error; it yields zero spans.
    #[error("invalid input for section `{section_id}`: {reason}")]
    InvalidInput { section_id: String, reason: String },

    /// An embedding or vector-store call ran past its deadline. Safe to retry.
    #[error("`{operation}` exceeded its {timeout_ms} ms deadline")]
    StoreTimeout {
        operation: &'static str,
        timeout_ms: u64,
    },

    #[error("vector store unavailable: {reason}")]
    StoreUnavailable { reason: String },

    /// Parent assignment produced a broken tree. Aborts indexing of that section.
    #[error("inconsistent span tree in section `{section_id}`: {reason}")]
    InconsistentTree { section_id: String, reason: String },

    #[error("invalid query: {reason}")]
    InvalidQuery { reason: String },

    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    #[error("embedding failed: {reason}")]
    Embedding { reason: String },

    #[error("embedding dimension mismatch (expected {expected}, got {actual})")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("text generation failed: {reason}")]
    Generation { reason: String },

    #[error("tokenizer error: {reason}")]
    Tokenizer { reason: String },

    #[error("snapshot is corrupt: {reason}")]
    SnapshotCorrupt { reason: String },

    #[error("failed to encode snapshot: {0}")]
    Encode(#[from] bincode::error::EncodeError),

    #[error("failed to decode snapshot: {0}")]
    Decode(#[from] bincode::error::DecodeError),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl ClaimtrailError {
    /// Whether retrying the same call may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::StoreTimeout { .. })
    }

    pub(crate) fn config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    pub(crate) fn unavailable(reason: impl Into<String>) -> Self {
        Self::StoreUnavailable {
            reason: reason.into(),
        }
    }
}
