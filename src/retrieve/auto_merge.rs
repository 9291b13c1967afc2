use std::sync::Arc;

use super::merge::merge_adjacent;
use super::rerank::{promote_section, promote_time_matches};
use super::{embed_query, ensure_query, tolerance};
use crate::constants::DEFAULT_OVERLAP_FRACTION;
use crate::deadline::Deadline;
use crate::error::Result;
use crate::store::{Candidate, RecordFilter, VectorStore};
use crate::types::{
    ChunkRecord, ContextItem, RetrievalConfig, RetrievalRequest, SpanLevel, TextEmbedder,
};

/// Needle retrieval over small spans with sibling merging and time/section reranking.
pub struct AutoMergeRetriever {
    embedder: Arc<dyn TextEmbedder>,
    store: Arc<dyn VectorStore<ChunkRecord>>,
    config: RetrievalConfig,
    overlap_fraction: f32,
}

impl AutoMergeRetriever {
    pub fn new(
        embedder: Arc<dyn TextEmbedder>,
        store: Arc<dyn VectorStore<ChunkRecord>>,
        config: RetrievalConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            embedder,
            store,
            config,
            overlap_fraction: DEFAULT_OVERLAP_FRACTION,
        })
    }

    /// Overlap the spans were chunked with; 0 disables overlap removal when merging.
    #[must_use]
    pub fn with_overlap_fraction(mut self, overlap_fraction: f32) -> Self {
        self.overlap_fraction = overlap_fraction;
        self
    }

    #[must_use]
    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    /// Ranked context for `request`. An empty result means nothing scored above the
    /// similarity floor.
    #[tracing::instrument(skip(self, request), fields(top_k = request.top_k))]
    pub fn retrieve(&self, request: &RetrievalRequest) -> Result<Vec<ContextItem>> {
        ensure_query(request)?;
        let deadline = Deadline::after(request.timeout.or_else(|| self.config.timeout()));
        let vector = embed_query(&self.embedder, &request.query, &deadline)?;

        let top_n = request.top_k.saturating_mul(self.config.overfetch_factor);
        let candidates = self.search(vector, top_n, &deadline)?;
        let fetched = candidates.len();
        let candidates: Vec<Candidate<ChunkRecord>> = candidates
            .into_iter()
            .filter(|candidate| candidate.score >= self.config.min_similarity)
            .collect();
        if candidates.is_empty() {
            tracing::debug!(fetched, "no candidate above the similarity floor");
            return Ok(Vec::new());
        }

        let mut items = merge_adjacent(candidates, self.overlap_fraction);
        if let Some(hint) = &request.time_hint {
            let tolerance = tolerance(self.config.time_tolerance_secs);
            items = promote_time_matches(items, hint, tolerance, self.config.time_boost_margin);
        }
        if let Some(section_id) = request.section_hint.as_ref().and_then(|hint| hint.as_single()) {
            items = promote_section(items, section_id);
        }

        items.truncate(request.top_k);
        for (index, item) in items.iter_mut().enumerate() {
            item.rank = index + 1;
        }
        tracing::debug!(fetched, returned = items.len(), "auto-merge retrieval complete");
        Ok(items)
    }

    fn search(
        &self,
        vector: Vec<f32>,
        top_n: usize,
        deadline: &Deadline,
    ) -> Result<Vec<Candidate<ChunkRecord>>> {
        let store = Arc::clone(&self.store);
        deadline.run("vector_search", move || {
            store.search(&vector, &RecordFilter::spans(SpanLevel::Small), top_n)
        })
    }
}
