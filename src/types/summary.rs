//! Summary records produced by the map-reduce summary indexer.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SummaryLevel {
    Chunk,
    #[default]
    Section,
    Document,
}

impl SummaryLevel {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Chunk => "chunk",
            Self::Section => "section",
            Self::Document => "document",
        }
    }
}

/// An immutable summary of a span, a section or a whole document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    pub chunk_id: String,
    pub summary_level: SummaryLevel,
    /// Absent only for document summaries.
    pub section_id: Option<String>,
    pub document_id: String,
    pub claim_id: String,
    pub text: String,
    /// Small span a chunk-level summary was generated from.
    #[serde(default)]
    pub source_chunk_id: Option<String>,
}

impl Summary {
    #[must_use]
    pub fn chunk_summary_id(span_id: &str) -> String {
        format!("summary_{span_id}")
    }

    #[must_use]
    pub fn section_summary_id(section_id: &str) -> String {
        format!("summary_section_{section_id}")
    }

    #[must_use]
    pub fn document_summary_id(document_id: &str) -> String {
        format!("summary_document_{document_id}")
    }
}
