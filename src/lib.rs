#![deny(clippy::all, clippy::pedantic)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
#![cfg_attr(
    test,
    allow(
        clippy::useless_vec,
        clippy::uninlined_format_args,
        clippy::cast_possible_truncation,
        clippy::float_cmp,
        clippy::cast_precision_loss
    )
)]
#![allow(clippy::module_name_repetitions)]
//
// Documentation lints: internal helpers are self-describing; public entry points
// carry their own docs.
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]
//
// Token budgets, offsets and scores are bounded by section sizes.
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_lossless)]
//
#![allow(clippy::too_many_lines)]
#![allow(clippy::too_many_arguments)]
#![allow(clippy::items_after_statements)]
#![allow(clippy::similar_names)]
// e.g. span_id, parent_id, section_id are intentionally similar
#![allow(clippy::needless_pass_by_value)] // Builders take owned values
#![allow(clippy::return_self_not_must_use)]
#![allow(clippy::format_push_string)]
#![allow(clippy::len_without_is_empty)]
#![allow(clippy::unnecessary_wraps)]
#![allow(clippy::unused_self)]

//! Hierarchical chunking and auto-merging retrieval over long structured documents.
//!
//! Indexing: [`HierarchicalChunker::build`] turns each section into a three-level
//! [`SpanTree`]; [`IndexWriter`] embeds the spans and replaces the document's records in
//! a [`VectorStore`]; [`SummaryIndexer`] does the same for map-reduce summaries.
//!
//! Querying: [`AutoMergeRetriever::retrieve`] searches small spans, merges adjacent
//! siblings and reranks by time and section; [`SummaryRetriever::retrieve`] answers from
//! summaries. [`QueryEngine`] routes a question to one of them.
//!
//! Re-indexing a document while retrieval runs against a store without atomic
//! replacement may return a mix of old and new spans for that document. This is
//! accepted; [`InMemoryVectorStore`] replaces a document under one write lock.

/// The claimtrail-core crate version (matches `Cargo.toml`).
pub const CLAIMTRAIL_CORE_VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod chunker;
pub mod constants;
mod deadline;
pub mod embed;
pub mod engine;
pub mod error;
pub mod index;
pub mod retrieve;
pub mod router;
pub mod splitter;
pub mod store;
pub mod summarize;
pub mod temporal;
pub mod text;
pub mod types;

pub use chunker::{DocumentChunks, HierarchicalChunker, SectionFailure, SectionInput, SpanTree};
pub use constants::*;
pub use embed::{HashingEmbedder, cosine_similarity};
pub use engine::QueryEngine;
pub use error::{ClaimtrailError, Result};
pub use index::{IndexReport, IndexWriter};
pub use retrieve::{
    AutoMergeRetriever, SummaryRetriever, merge_adjacent, promote_section, promote_time_matches,
};
pub use router::{ModelRouter, QueryRouter, RuleBasedRouter};
pub use splitter::Splitter;
pub use store::{
    Candidate, EmbeddedRecord, InMemoryVectorStore, RecordFilter, StoredRecord, VectorStore,
};
pub use summarize::{SummaryIndexer, SummaryReport};
pub use temporal::{
    MentionValue, NoTimestamps, PatternTimestampExtractor, TimeMention, TimestampExtractor,
    describe_gap,
};
#[cfg(feature = "hf_tokenizer")]
pub use text::HfTokenCounter;
pub use text::{TokenCounter, WordTokenCounter, normalize_section_text};
pub use types::{
    Answer, AskStats, ChunkRecord, ChunkingConfig, ContextItem, EngineConfig,
    EngineConfigBuilder, QueryRoute, RetrievalConfig, RetrievalRequest, RetrievedContext,
    RouteDecision, RouteSource, SectionHint, Span, SpanLevel, Summary, SummaryHit, SummaryLevel,
    TextEmbedder, TextGenerator, TimeHint, span_id,
};
