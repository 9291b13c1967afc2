//! Span and chunk-record types produced by the hierarchical chunker.

use std::fmt;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Granularity of a span. Small spans are retrieval targets; medium and large spans
/// provide enclosing context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SpanLevel {
    #[default]
    Small,
    Medium,
    Large,
}

impl SpanLevel {
    pub const ALL: [Self; 3] = [Self::Small, Self::Medium, Self::Large];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Small => "small",
            Self::Medium => "medium",
            Self::Large => "large",
        }
    }

    /// The level whose spans enclose spans of this level.
    #[must_use]
    pub fn parent(self) -> Option<Self> {
        match self {
            Self::Small => Some(Self::Medium),
            Self::Medium => Some(Self::Large),
            Self::Large => None,
        }
    }
}

impl fmt::Display for SpanLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Deterministic span id: `{section_id}_{level}_{position_index}`.
#[must_use]
pub fn span_id(section_id: &str, level: SpanLevel, position_index: usize) -> String {
    format!("{section_id}_{}_{position_index}", level.as_str())
}

/// A contiguous, literal slice of one section's text at a single level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub id: String,
    pub level: SpanLevel,
    pub text: String,
    pub section_id: String,
    pub document_id: String,
    pub claim_id: String,
    /// 0-based sequence number within `(section_id, level)`.
    pub position_index: usize,
    pub parent_id: Option<String>,
    pub timestamp: Option<NaiveDateTime>,
    /// Byte offset of the span in the normalized section text.
    pub start: usize,
    pub end: usize,
    pub token_count: usize,
}

impl Span {
    /// Midpoint byte offset of the span's range.
    #[must_use]
    pub fn midpoint(&self) -> usize {
        self.start + (self.end - self.start) / 2
    }

    /// Whether `offset` falls within `[start, end)`.
    #[must_use]
    pub fn covers(&self, offset: usize) -> bool {
        self.start <= offset && offset < self.end
    }
}

/// The record persisted in the vector store for each span.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub id: String,
    pub level: SpanLevel,
    pub text: String,
    pub section_id: String,
    pub position_index: usize,
    pub parent_id: Option<String>,
    pub timestamp: Option<NaiveDateTime>,
    pub document_id: String,
    pub claim_id: String,
}

impl From<&Span> for ChunkRecord {
    fn from(span: &Span) -> Self {
        Self {
            id: span.id.clone(),
            level: span.level,
            text: span.text.clone(),
            section_id: span.section_id.clone(),
            position_index: span.position_index,
            parent_id: span.parent_id.clone(),
            timestamp: span.timestamp,
            document_id: span.document_id.clone(),
            claim_id: span.claim_id.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn span_ids_are_derived_from_section_level_and_position() {
        assert_eq!(span_id("section_2", SpanLevel::Medium, 4), "section_2_medium_4");
        assert_eq!(SpanLevel::Small.parent(), Some(SpanLevel::Medium));
        assert_eq!(SpanLevel::Large.parent(), None);
    }

    #[test]
    fn level_serializes_in_snake_case() {
        let json = serde_json::to_string(&SpanLevel::Large).unwrap();
        assert_eq!(json, "\"large\"");
    }
}
