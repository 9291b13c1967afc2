//! Integration tests for auto-merge and summary retrieval.
//! Tests: sibling merging, time and section reranking, thresholds, direct section filter,
//! deadlines, store failures, concurrent readers

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use chrono::{NaiveDate, NaiveDateTime};
use claimtrail_core::{
    AutoMergeRetriever, Candidate, ChunkRecord, ClaimtrailError, EmbeddedRecord,
    InMemoryVectorStore, RecordFilter, Result, RetrievalConfig, RetrievalRequest, SectionHint,
    SpanLevel, Summary, SummaryLevel, SummaryRetriever, TextEmbedder, TimeHint, VectorStore,
};

/// Embeds every query as the same unit vector.
struct ConstantEmbedder;

impl TextEmbedder for ConstantEmbedder {
    fn embed_query(&self, _text: &str) -> Result<Vec<f32>> {
        Ok(vec![1.0, 0.0])
    }

    fn embedding_dimension(&self) -> usize {
        2
    }
}

/// Returns a fixed, pre-scored candidate list, optionally after a delay or as an error.
struct FixedStore {
    candidates: Vec<Candidate<ChunkRecord>>,
    delay: Option<Duration>,
    down: bool,
}

impl FixedStore {
    fn new(candidates: Vec<Candidate<ChunkRecord>>) -> Self {
        Self {
            candidates,
            delay: None,
            down: false,
        }
    }
}

impl VectorStore<ChunkRecord> for FixedStore {
    fn upsert(&self, records: Vec<EmbeddedRecord<ChunkRecord>>) -> Result<usize> {
        Ok(records.len())
    }

    fn delete_document(&self, _document_id: &str) -> Result<usize> {
        Ok(0)
    }

    fn search(
        &self,
        _query: &[f32],
        _filter: &RecordFilter,
        top_n: usize,
    ) -> Result<Vec<Candidate<ChunkRecord>>> {
        if let Some(delay) = self.delay {
            thread::sleep(delay);
        }
        if self.down {
            return Err(ClaimtrailError::StoreUnavailable {
                reason: "connection refused".into(),
            });
        }
        Ok(self.candidates.iter().take(top_n).cloned().collect())
    }

    fn fetch(&self, _filter: &RecordFilter, limit: usize) -> Result<Vec<ChunkRecord>> {
        Ok(self
            .candidates
            .iter()
            .take(limit)
            .map(|candidate| candidate.record.clone())
            .collect())
    }

    fn len(&self) -> Result<usize> {
        Ok(self.candidates.len())
    }
}

fn at(hour: u32, minute: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2025, 3, 3)
        .unwrap()
        .and_hms_opt(hour, minute, 0)
        .unwrap()
}

fn span(section: &str, position: usize, text: &str, score: f32) -> Candidate<ChunkRecord> {
    Candidate {
        record: ChunkRecord {
            id: format!("{section}_small_{position}"),
            level: SpanLevel::Small,
            text: text.to_string(),
            section_id: section.to_string(),
            position_index: position,
            parent_id: Some(format!("{section}_medium_0")),
            timestamp: None,
            document_id: "doc_1".into(),
            claim_id: "claim_1".into(),
        },
        score,
    }
}

fn timed(mut candidate: Candidate<ChunkRecord>, timestamp: NaiveDateTime) -> Candidate<ChunkRecord> {
    candidate.record.timestamp = Some(timestamp);
    candidate
}

fn retriever(store: FixedStore) -> AutoMergeRetriever {
    AutoMergeRetriever::new(
        Arc::new(ConstantEmbedder),
        Arc::new(store),
        RetrievalConfig::default(),
    )
    .unwrap()
}

#[test]
fn three_consecutive_spans_merge_into_one_item() {
    let store = FixedStore::new(vec![
        span("section_1", 4, "The van braked. It stopped at the line.", 0.8),
        span("section_1", 3, "Rain fell. The van braked.", 0.7),
        span("section_1", 5, "It stopped at the line. The car hit it.", 0.6),
    ]);
    let items = retriever(store)
        .retrieve(&RetrievalRequest::new("what did the van do", 5))
        .unwrap();
    assert_eq!(items.len(), 1);
    let item = &items[0];
    assert_eq!(
        item.span_ids,
        vec!["section_1_small_3", "section_1_small_4", "section_1_small_5"]
    );
    assert!(item.is_merged());
    assert_eq!(
        item.text,
        "Rain fell. The van braked. It stopped at the line. The car hit it."
    );
    assert_eq!(item.rank, 1);
}

#[test]
fn gap_in_positions_yields_two_items() {
    let store = FixedStore::new(vec![
        span("section_1", 3, "Three.", 0.9),
        span("section_1", 4, "Four.", 0.8),
        span("section_1", 7, "Seven.", 0.7),
    ]);
    let items = retriever(store)
        .retrieve(&RetrievalRequest::new("numbers", 5))
        .unwrap();
    let runs: Vec<(usize, usize)> = items
        .iter()
        .map(|item| (item.first_position, item.last_position))
        .collect();
    assert_eq!(runs, vec![(3, 4), (7, 7)]);
    assert!(!items[1].is_merged());
}

#[test]
fn time_match_breaks_a_similarity_tie() {
    let store = FixedStore::new(vec![
        span("section_1", 0, "The claimant phoned the insurer.", 0.5),
        timed(span("section_2", 9, "Impact was recorded by the camera.", 0.5), at(8, 11)),
    ]);
    let request = RetrievalRequest::new("what happened at 08:11", 5).with_time_hint(TimeHint::at(at(8, 11)));
    let items = retriever(store).retrieve(&request).unwrap();
    assert_eq!(items[0].span_ids, vec!["section_2_small_9"]);
    assert!(items[0].time_match);
    assert!(!items[1].time_match);
}

#[test]
fn single_section_hint_promotes_that_section() {
    let store = FixedStore::new(vec![
        span("section_1", 0, "a", 0.9),
        span("section_2", 4, "b", 0.4),
        span("section_1", 6, "c", 0.3),
    ]);
    let retriever = retriever(store);
    let hinted = RetrievalRequest::new("q", 5).with_section_hint(SectionHint::single("section_2"));
    let items = retriever.retrieve(&hinted).unwrap();
    assert_eq!(items[0].section_id, "section_2");
    assert!(items[0].section_match);

    let both = RetrievalRequest::new("q", 5)
        .with_section_hint(SectionHint::new(["section_2", "section_1"]));
    let items = retriever.retrieve(&both).unwrap();
    assert_eq!(items[0].section_id, "section_1", "multi-section hint is a no-op");
}

#[test]
fn fewer_candidates_than_top_k_are_returned_without_padding() {
    let store = FixedStore::new(vec![span("section_1", 0, "a", 0.9), span("section_3", 2, "b", 0.8)]);
    let items = retriever(store)
        .retrieve(&RetrievalRequest::new("q", 10))
        .unwrap();
    assert_eq!(items.len(), 2);
}

#[test]
fn nothing_above_the_floor_is_an_empty_result_not_an_error() {
    let store = FixedStore::new(vec![span("section_1", 0, "a", 0.01), span("section_1", 4, "b", -0.2)]);
    let items = retriever(store)
        .retrieve(&RetrievalRequest::new("q", 5))
        .unwrap();
    assert!(items.is_empty());
}

#[test]
fn slow_store_fails_with_retryable_timeout() {
    let mut store = FixedStore::new(vec![span("section_1", 0, "a", 0.9)]);
    store.delay = Some(Duration::from_millis(500));
    let request = RetrievalRequest::new("q", 5).with_timeout(Duration::from_millis(20));
    let err = retriever(store).retrieve(&request).unwrap_err();
    assert!(matches!(err, ClaimtrailError::StoreTimeout { operation: "vector_search", .. }));
    assert!(err.is_retryable());
}

/// Embeds like [`ConstantEmbedder`] after sleeping.
struct SlowEmbedder(Duration);

impl TextEmbedder for SlowEmbedder {
    fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        thread::sleep(self.0);
        ConstantEmbedder.embed_query(text)
    }

    fn embedding_dimension(&self) -> usize {
        2
    }
}

#[test]
fn embedding_and_search_share_one_deadline() {
    let mut store = FixedStore::new(vec![span("section_1", 0, "a", 0.9)]);
    store.delay = Some(Duration::from_millis(120));
    let retriever = AutoMergeRetriever::new(
        Arc::new(SlowEmbedder(Duration::from_millis(120))),
        Arc::new(store),
        RetrievalConfig::default(),
    )
    .unwrap();
    // Each call alone fits in the budget; together they do not.
    let request = RetrievalRequest::new("q", 5).with_timeout(Duration::from_millis(200));
    let err = retriever.retrieve(&request).unwrap_err();
    assert!(matches!(
        err,
        ClaimtrailError::StoreTimeout {
            operation: "vector_search",
            timeout_ms: 200
        }
    ));
}

#[test]
fn unreachable_store_is_reported() {
    let mut store = FixedStore::new(Vec::new());
    store.down = true;
    let err = retriever(store)
        .retrieve(&RetrievalRequest::new("q", 5))
        .unwrap_err();
    assert!(matches!(err, ClaimtrailError::StoreUnavailable { .. }));
    assert!(!err.is_retryable());
}

#[test]
fn empty_query_is_rejected() {
    let err = retriever(FixedStore::new(Vec::new()))
        .retrieve(&RetrievalRequest::new("  ", 5))
        .unwrap_err();
    assert!(matches!(err, ClaimtrailError::InvalidQuery { .. }));
}

#[test]
fn retrievers_are_shared_across_threads() {
    let store = FixedStore::new(vec![
        span("section_1", 1, "One.", 0.9),
        span("section_1", 2, "Two.", 0.8),
    ]);
    let retriever = Arc::new(retriever(store));
    thread::scope(|scope| {
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let retriever = Arc::clone(&retriever);
                scope.spawn(move || retriever.retrieve(&RetrievalRequest::new("q", 3)))
            })
            .collect();
        for handle in handles {
            let items = handle.join().unwrap().unwrap();
            assert_eq!(items.len(), 1);
            assert_eq!(items[0].merged_count(), 2);
        }
    });
}

fn summary(chunk_id: &str, level: SummaryLevel, section: Option<&str>, text: &str) -> Summary {
    Summary {
        chunk_id: chunk_id.to_string(),
        summary_level: level,
        section_id: section.map(str::to_string),
        document_id: "doc_1".into(),
        claim_id: "claim_1".into(),
        text: text.to_string(),
        source_chunk_id: None,
    }
}

fn summary_store() -> Arc<InMemoryVectorStore<Summary>> {
    let store = Arc::new(InMemoryVectorStore::new());
    store
        .upsert(vec![
            EmbeddedRecord {
                record: summary("summary_section_section_1", SummaryLevel::Section, Some("section_1"), "Incident."),
                // Orthogonal to every query the constant embedder produces.
                embedding: vec![0.0, 1.0],
            },
            EmbeddedRecord {
                record: summary("summary_section_section_2", SummaryLevel::Section, Some("section_2"), "Repairs."),
                embedding: vec![1.0, 0.0],
            },
            EmbeddedRecord {
                record: summary("summary_document_doc_1", SummaryLevel::Document, None, "Claim overview."),
                embedding: vec![0.9, 0.1],
            },
        ])
        .unwrap();
    store
}

#[test]
fn single_section_hint_reads_that_summary_even_at_zero_similarity() {
    let retriever =
        SummaryRetriever::new(Arc::new(ConstantEmbedder), summary_store(), RetrievalConfig::default())
            .unwrap();
    let request = RetrievalRequest::new("summarize section 1", 5)
        .with_section_hint(SectionHint::single("section_1"));
    let hits = retriever.retrieve(&request).unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].summary.chunk_id, "summary_section_section_1");
    assert_eq!(hits[0].score, None);

    let missing = RetrievalRequest::new("summarize section 9", 5)
        .with_section_hint(SectionHint::single("section_9"));
    assert!(retriever.retrieve(&missing).unwrap().is_empty());
}

#[test]
fn similarity_path_promotes_any_hinted_section() {
    let retriever =
        SummaryRetriever::new(Arc::new(ConstantEmbedder), summary_store(), RetrievalConfig::default())
            .unwrap();
    let plain = retriever.retrieve(&RetrievalRequest::new("overview", 5)).unwrap();
    let ids: Vec<&str> = plain.iter().map(|hit| hit.summary.chunk_id.as_str()).collect();
    assert_eq!(ids, vec!["summary_section_section_2", "summary_document_doc_1"]);

    let hinted = RetrievalRequest::new("compare", 1)
        .with_section_hint(SectionHint::new(["section_3", "section_2"]));
    let hits = retriever.retrieve(&hinted).unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].summary.chunk_id, "summary_section_section_2");
    assert!(hits[0].section_match);
}
