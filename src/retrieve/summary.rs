use std::sync::Arc;

use super::rerank::stable_partition;
use super::{embed_query, ensure_query};
use crate::deadline::Deadline;
use crate::error::Result;
use crate::store::{RecordFilter, VectorStore};
use crate::types::{
    RetrievalConfig, RetrievalRequest, SectionHint, Summary, SummaryHit, SummaryLevel,
    TextEmbedder,
};

/// Retrieval over chunk, section and document summaries.
///
/// A query naming exactly one section is answered from that section's own summary by
/// metadata lookup alone. Anything else goes through similarity search, with the
/// summaries of any named sections moved to the front.
pub struct SummaryRetriever {
    embedder: Arc<dyn TextEmbedder>,
    store: Arc<dyn VectorStore<Summary>>,
    config: RetrievalConfig,
}

impl SummaryRetriever {
    pub fn new(
        embedder: Arc<dyn TextEmbedder>,
        store: Arc<dyn VectorStore<Summary>>,
        config: RetrievalConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            embedder,
            store,
            config,
        })
    }

    #[must_use]
    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    #[tracing::instrument(skip(self, request), fields(top_k = request.top_k))]
    pub fn retrieve(&self, request: &RetrievalRequest) -> Result<Vec<SummaryHit>> {
        ensure_query(request)?;
        let deadline = Deadline::after(request.timeout.or_else(|| self.config.timeout()));

        if let Some(section_id) = request.section_hint.as_ref().and_then(SectionHint::as_single) {
            let filter = RecordFilter::summaries(SummaryLevel::Section).with_section(section_id);
            let store = Arc::clone(&self.store);
            let top_k = request.top_k;
            let summaries = deadline.run("metadata_fetch", move || store.fetch(&filter, top_k))?;
            tracing::debug!(section_id, found = summaries.len(), "direct section summary lookup");
            return Ok(summaries
                .into_iter()
                .enumerate()
                .map(|(index, summary)| SummaryHit {
                    rank: index + 1,
                    score: None,
                    section_match: true,
                    summary,
                })
                .collect());
        }

        let vector = embed_query(&self.embedder, &request.query, &deadline)?;
        let store = Arc::clone(&self.store);
        let top_n = request.top_k.saturating_mul(self.config.overfetch_factor);
        let candidates = deadline.run("vector_search", move || {
            store.search(&vector, &RecordFilter::default(), top_n)
        })?;

        let hint = request.section_hint.as_ref();
        let hits: Vec<SummaryHit> = candidates
            .into_iter()
            .filter(|candidate| candidate.score >= self.config.min_similarity)
            .map(|candidate| SummaryHit {
                rank: 0,
                score: Some(candidate.score),
                section_match: hint.is_some_and(|hint| {
                    candidate
                        .record
                        .section_id
                        .as_deref()
                        .is_some_and(|section| hint.contains(section))
                }),
                summary: candidate.record,
            })
            .collect();
        let mut hits = stable_partition(hits, |hit| hit.section_match);
        hits.truncate(request.top_k);
        for (index, hit) in hits.iter_mut().enumerate() {
            hit.rank = index + 1;
        }
        tracing::debug!(returned = hits.len(), "summary similarity retrieval complete");
        Ok(hits)
    }
}
