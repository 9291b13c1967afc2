//! Persisting span trees into a chunk-record vector store.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::chunker::{DocumentChunks, SpanTree};
use crate::constants::DEFAULT_EMBED_BATCH_SIZE;
use crate::deadline::Deadline;
use crate::embed::embed_in_batches;
use crate::error::Result;
use crate::store::{EmbeddedRecord, StoredRecord, VectorStore};
use crate::types::{ChunkRecord, TextEmbedder};

/// Outcome of writing one document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexReport {
    pub document_id: String,
    pub records_written: usize,
    pub sections_indexed: usize,
    /// Sections the chunker could not build; their previous records are gone too.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sections_failed: Vec<String>,
}

/// Embeds span text and replaces a document's chunk records as a whole.
///
/// Replacement is only as atomic as the store's `replace_document`; a retrieval running
/// concurrently against a store without atomic replacement may see old and new spans.
pub struct IndexWriter {
    embedder: Arc<dyn TextEmbedder>,
    store: Arc<dyn VectorStore<ChunkRecord>>,
    batch_size: usize,
    timeout: Option<Duration>,
}

impl IndexWriter {
    #[must_use]
    pub fn new(embedder: Arc<dyn TextEmbedder>, store: Arc<dyn VectorStore<ChunkRecord>>) -> Self {
        Self {
            embedder,
            store,
            batch_size: DEFAULT_EMBED_BATCH_SIZE,
            timeout: None,
        }
    }

    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Budget for embedding and replacing one document, shared by both steps.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    #[tracing::instrument(skip(self, chunks), fields(document_id = %chunks.document_id))]
    pub fn write_document(&self, chunks: &DocumentChunks) -> Result<IndexReport> {
        let written = self.write_trees(&chunks.document_id, &chunks.trees)?;
        let report = IndexReport {
            document_id: chunks.document_id.clone(),
            records_written: written,
            sections_indexed: chunks.trees.len(),
            sections_failed: chunks
                .failures
                .iter()
                .map(|failure| failure.section_id.clone())
                .collect(),
        };
        tracing::info!(
            records = report.records_written,
            sections = report.sections_indexed,
            failed = report.sections_failed.len(),
            "indexed document"
        );
        Ok(report)
    }

    /// Replace every record of `document_id` with the spans of `trees`.
    pub fn write_trees(&self, document_id: &str, trees: &[SpanTree]) -> Result<usize> {
        let records: Vec<ChunkRecord> = trees.iter().flat_map(SpanTree::records).collect();
        let texts: Vec<String> = records.iter().map(|record| record.text.clone()).collect();
        embed_and_replace(
            &self.embedder,
            &self.store,
            document_id,
            records,
            texts,
            self.batch_size,
            self.timeout,
        )
    }
}

/// Embed `texts` (one per record) and swap them in as the whole of `document_id`,
/// both steps within one `timeout`.
pub(crate) fn embed_and_replace<R: StoredRecord>(
    embedder: &Arc<dyn TextEmbedder>,
    store: &Arc<dyn VectorStore<R>>,
    document_id: &str,
    records: Vec<R>,
    texts: Vec<String>,
    batch_size: usize,
    timeout: Option<Duration>,
) -> Result<usize> {
    let deadline = Deadline::after(timeout);
    let embedder = Arc::clone(embedder);
    let vectors = deadline.run("embed_chunks", move || {
        let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
        embed_in_batches(embedder.as_ref(), &refs, batch_size)
    })?;

    let embedded: Vec<EmbeddedRecord<R>> = records
        .into_iter()
        .zip(vectors)
        .map(|(record, embedding)| EmbeddedRecord { record, embedding })
        .collect();
    let store = Arc::clone(store);
    let document_id = document_id.to_string();
    deadline.run("replace_document", move || {
        store.replace_document(&document_id, embedded)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunker::{HierarchicalChunker, SectionInput};
    use crate::embed::HashingEmbedder;
    use crate::store::{InMemoryVectorStore, RecordFilter};
    use crate::types::{ChunkingConfig, SpanLevel};

    fn chunks(text: &str) -> DocumentChunks {
        let chunker = HierarchicalChunker::new(ChunkingConfig {
            small_tokens: 12,
            medium_tokens: 30,
            large_tokens: 80,
            overlap_fraction: 0.2,
        })
        .unwrap();
        chunker.chunk_document("doc_1", "claim_1", &[SectionInput::new("section_1", text)])
    }

    #[test]
    fn reindexing_replaces_the_document() {
        let store = Arc::new(InMemoryVectorStore::<ChunkRecord>::new());
        let writer = IndexWriter::new(Arc::new(HashingEmbedder::default()), store.clone())
            .with_batch_size(3);

        let long = "The van braked hard. The car behind did not. Glass covered the road. "
            .repeat(6);
        let first = writer.write_document(&chunks(&long)).unwrap();
        assert_eq!(first.records_written, store.len().unwrap());
        assert!(first.records_written > 3);

        let second = writer.write_document(&chunks("One short sentence.")).unwrap();
        assert_eq!(second.records_written, 3);
        assert_eq!(store.len().unwrap(), 3);
        let small = store
            .fetch(&RecordFilter::spans(SpanLevel::Small), 10)
            .unwrap();
        assert_eq!(small[0].text, "One short sentence.");
    }
}
