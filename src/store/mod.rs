//! Vector-store seam: record filters, scored candidates and the store trait.

mod memory;

pub use memory::InMemoryVectorStore;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::types::{ChunkRecord, SpanLevel, Summary, SummaryLevel};

/// Metadata predicate applied before similarity ranking. `None` fields match anything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<SpanLevel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary_level: Option<SummaryLevel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_id: Option<String>,
}

impl RecordFilter {
    #[must_use]
    pub fn spans(level: SpanLevel) -> Self {
        Self {
            level: Some(level),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn summaries(level: SummaryLevel) -> Self {
        Self {
            summary_level: Some(level),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_section(mut self, section_id: impl Into<String>) -> Self {
        self.section_id = Some(section_id.into());
        self
    }

    #[must_use]
    pub fn with_document(mut self, document_id: impl Into<String>) -> Self {
        self.document_id = Some(document_id.into());
        self
    }
}

/// A record the store can hold and filter.
pub trait StoredRecord: Clone + Send + Sync + 'static {
    fn record_id(&self) -> &str;
    fn document_id(&self) -> &str;
    fn section_id(&self) -> Option<&str>;

    fn span_level(&self) -> Option<SpanLevel> {
        None
    }

    fn summary_level(&self) -> Option<SummaryLevel> {
        None
    }

    fn matches(&self, filter: &RecordFilter) -> bool {
        filter.level.is_none_or(|level| self.span_level() == Some(level))
            && filter
                .summary_level
                .is_none_or(|level| self.summary_level() == Some(level))
            && filter
                .section_id
                .as_deref()
                .is_none_or(|section| self.section_id() == Some(section))
            && filter
                .document_id
                .as_deref()
                .is_none_or(|document| self.document_id() == document)
    }
}

impl StoredRecord for ChunkRecord {
    fn record_id(&self) -> &str {
        &self.id
    }

    fn document_id(&self) -> &str {
        &self.document_id
    }

    fn section_id(&self) -> Option<&str> {
        Some(&self.section_id)
    }

    fn span_level(&self) -> Option<SpanLevel> {
        Some(self.level)
    }
}

impl StoredRecord for Summary {
    fn record_id(&self) -> &str {
        &self.chunk_id
    }

    fn document_id(&self) -> &str {
        &self.document_id
    }

    fn section_id(&self) -> Option<&str> {
        self.section_id.as_deref()
    }

    fn summary_level(&self) -> Option<SummaryLevel> {
        Some(self.summary_level)
    }
}

/// A record with its embedding, as written to the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddedRecord<R> {
    pub record: R,
    pub embedding: Vec<f32>,
}

/// A record returned by similarity search, scored in `[-1, 1]` (higher is closer).
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate<R> {
    pub record: R,
    pub score: f32,
}

pub trait VectorStore<R: StoredRecord>: Send + Sync {
    /// Insert or overwrite records by `(document_id, record_id)`. Returns how many were written.
    fn upsert(&self, records: Vec<EmbeddedRecord<R>>) -> Result<usize>;

    /// Remove every record of `document_id`. Returns how many were removed.
    fn delete_document(&self, document_id: &str) -> Result<usize>;

    /// Replace a document's records as a whole.
    ///
    /// The default deletes then upserts; concurrent readers may briefly see neither
    /// or a mix. Stores that can do better override it.
    fn replace_document(&self, document_id: &str, records: Vec<EmbeddedRecord<R>>) -> Result<usize> {
        self.delete_document(document_id)?;
        self.upsert(records)
    }

    /// The `top_n` records matching `filter` closest to `query`, best first.
    fn search(&self, query: &[f32], filter: &RecordFilter, top_n: usize) -> Result<Vec<Candidate<R>>>;

    /// Up to `limit` records matching `filter`, in id order, without ranking.
    fn fetch(&self, filter: &RecordFilter, limit: usize) -> Result<Vec<R>>;

    fn len(&self) -> Result<usize>;
}
