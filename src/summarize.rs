//! Map-reduce summary construction.
//!
//! Every small span is summarized on its own (map). A section summary is then
//! generated from its chunk summaries, and the document summary from the section
//! summaries (the two reduce steps). When the generator fails, the input of that step
//! is truncated and kept as the summary so one bad call does not sink the document.

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::chunker::{DocumentChunks, SpanTree};
use crate::constants::DEFAULT_EMBED_BATCH_SIZE;
use crate::error::Result;
use crate::index::embed_and_replace;
use crate::store::VectorStore;
use crate::types::{SpanLevel, Summary, SummaryLevel, TextEmbedder, TextGenerator};

const CHUNK_FALLBACK_CHARS: usize = 200;
const SECTION_FALLBACK_CHARS: usize = 500;
const DOCUMENT_FALLBACK_CHARS: usize = 1000;

const CHUNK_PROMPT: &str = "Summarize the following passage. Keep the key facts, dates, amounts and events.";
const SECTION_PROMPT: &str = "Combine the passage summaries below into one coherent summary of the section. \
Include a timeline of events, the people and organisations involved, and important details.";
const DOCUMENT_PROMPT: &str = "Combine the section summaries below into a high-level summary of the whole document. \
Include the overall timeline, major events, key entities, costs and current status.";

/// Outcome of summarizing and storing one document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryReport {
    pub document_id: String,
    pub chunk_summaries: usize,
    pub section_summaries: usize,
    pub document_summaries: usize,
    /// Generator calls that failed and were replaced by truncated input.
    pub fallbacks: usize,
}

impl SummaryReport {
    #[must_use]
    pub fn total(&self) -> usize {
        self.chunk_summaries + self.section_summaries + self.document_summaries
    }
}

pub struct SummaryIndexer {
    generator: Arc<dyn TextGenerator>,
    embedder: Arc<dyn TextEmbedder>,
    store: Arc<dyn VectorStore<Summary>>,
    batch_size: usize,
    timeout: Option<Duration>,
}

impl SummaryIndexer {
    #[must_use]
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        embedder: Arc<dyn TextEmbedder>,
        store: Arc<dyn VectorStore<Summary>>,
    ) -> Self {
        Self {
            generator,
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

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Build chunk, section and document summaries without storing them.
    pub fn summarize(&self, chunks: &DocumentChunks) -> (Vec<Summary>, SummaryReport) {
        let mut report = SummaryReport {
            document_id: chunks.document_id.clone(),
            ..SummaryReport::default()
        };
        let mut summaries = Vec::new();
        let mut section_texts = Vec::new();

        for tree in &chunks.trees {
            let chunk_summaries: Vec<Summary> = tree
                .level(SpanLevel::Small)
                .map(|span| Summary {
                    chunk_id: Summary::chunk_summary_id(&span.id),
                    summary_level: SummaryLevel::Chunk,
                    section_id: Some(span.section_id.clone()),
                    document_id: span.document_id.clone(),
                    claim_id: span.claim_id.clone(),
                    text: self.step(CHUNK_PROMPT, &span.text, CHUNK_FALLBACK_CHARS, &mut report),
                    source_chunk_id: Some(span.id.clone()),
                })
                .collect();
            if chunk_summaries.is_empty() {
                continue;
            }

            let combined = chunk_summaries
                .iter()
                .map(|summary| summary.text.as_str())
                .collect::<Vec<_>>()
                .join("\n\n");
            let context = format!("Section: {}\n\n{combined}", tree.section_id());
            let section_text = self.step(SECTION_PROMPT, &context, SECTION_FALLBACK_CHARS, &mut report);
            section_texts.push(format!("{}: {section_text}", tree.section_id()));

            report.chunk_summaries += chunk_summaries.len();
            summaries.extend(chunk_summaries);
            summaries.push(section_summary(tree, section_text));
            report.section_summaries += 1;
        }

        if !section_texts.is_empty() {
            let mut context = format!("Claim: {}\n", chunks.claim_id);
            if let Some((first, last)) = time_period(chunks) {
                context.push_str(&format!("Time period: {first} to {last}\n"));
            }
            context.push('\n');
            context.push_str(&section_texts.join("\n\n"));
            let text = self.step(DOCUMENT_PROMPT, &context, DOCUMENT_FALLBACK_CHARS, &mut report);
            summaries.push(Summary {
                chunk_id: Summary::document_summary_id(&chunks.document_id),
                summary_level: SummaryLevel::Document,
                section_id: None,
                document_id: chunks.document_id.clone(),
                claim_id: chunks.claim_id.clone(),
                text,
                source_chunk_id: None,
            });
            report.document_summaries = 1;
        }
        (summaries, report)
    }

    /// Summarize `chunks` and replace the document's summary records.
    #[tracing::instrument(skip(self, chunks), fields(document_id = %chunks.document_id))]
    pub fn write_document(&self, chunks: &DocumentChunks) -> Result<SummaryReport> {
        let (summaries, report) = self.summarize(chunks);
        let texts: Vec<String> = summaries.iter().map(|summary| summary.text.clone()).collect();
        embed_and_replace(
            &self.embedder,
            &self.store,
            &chunks.document_id,
            summaries,
            texts,
            self.batch_size,
            self.timeout,
        )?;
        tracing::info!(
            chunk = report.chunk_summaries,
            section = report.section_summaries,
            fallbacks = report.fallbacks,
            "indexed summaries"
        );
        Ok(report)
    }

    fn step(&self, prompt: &str, context: &str, fallback_chars: usize, report: &mut SummaryReport) -> String {
        match self.generator.generate(prompt, context) {
            Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
            Ok(_) => {
                tracing::warn!("generator returned an empty summary; keeping truncated input");
                report.fallbacks += 1;
                truncate_chars(context, fallback_chars)
            }
            Err(err) => {
                tracing::warn!(error = %err, "summary generation failed; keeping truncated input");
                report.fallbacks += 1;
                truncate_chars(context, fallback_chars)
            }
        }
    }
}

fn section_summary(tree: &SpanTree, text: String) -> Summary {
    Summary {
        chunk_id: Summary::section_summary_id(tree.section_id()),
        summary_level: SummaryLevel::Section,
        section_id: Some(tree.section_id().to_string()),
        document_id: tree.document_id().to_string(),
        claim_id: tree.claim_id().to_string(),
        text,
        source_chunk_id: None,
    }
}

/// Earliest and latest span timestamps across the document.
fn time_period(chunks: &DocumentChunks) -> Option<(NaiveDateTime, NaiveDateTime)> {
    let first = chunks.spans().filter_map(|span| span.timestamp).min()?;
    let last = chunks.spans().filter_map(|span| span.timestamp).max()?;
    Some((first, last))
}

/// First `max_chars` characters of `text`, with an ellipsis when anything was cut.
fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunker::{HierarchicalChunker, SectionInput};
    use crate::embed::HashingEmbedder;
    use crate::error::ClaimtrailError;
    use crate::store::{InMemoryVectorStore, RecordFilter};
    use crate::types::ChunkingConfig;

    /// Echoes the first line of its context, or fails when told to.
    struct FirstLine {
        fail: bool,
    }

    impl TextGenerator for FirstLine {
        fn generate(&self, _prompt: &str, context: &str) -> Result<String> {
            if self.fail {
                return Err(ClaimtrailError::Generation {
                    reason: "offline".into(),
                });
            }
            Ok(format!("summary of {}", context.lines().next().unwrap_or_default()))
        }
    }

    fn chunks() -> DocumentChunks {
        let chunker = HierarchicalChunker::new(ChunkingConfig {
            small_tokens: 12,
            medium_tokens: 30,
            large_tokens: 80,
            overlap_fraction: 0.2,
        })
        .unwrap();
        chunker.chunk_document(
            "doc_1",
            "claim_9",
            &[
                SectionInput::new("section_1", "The van braked. The car behind did not. Glass covered the road."),
                SectionInput::new("section_2", "The insurer paid for repairs."),
            ],
        )
    }

    #[test]
    fn builds_every_level_with_stable_ids() {
        let indexer = SummaryIndexer::new(
            Arc::new(FirstLine { fail: false }),
            Arc::new(HashingEmbedder::default()),
            Arc::new(InMemoryVectorStore::new()),
        );
        let (summaries, report) = indexer.summarize(&chunks());
        assert_eq!(report.section_summaries, 2);
        assert_eq!(report.document_summaries, 1);
        assert_eq!(report.fallbacks, 0);
        assert_eq!(report.total(), summaries.len());

        let section = summaries
            .iter()
            .find(|s| s.chunk_id == "summary_section_section_2")
            .unwrap();
        assert_eq!(section.summary_level, SummaryLevel::Section);
        assert_eq!(section.text, "summary of Section: section_2");
        let document = summaries.last().unwrap();
        assert_eq!(document.chunk_id, "summary_document_doc_1");
        assert_eq!(document.claim_id, "claim_9");
        assert!(document.section_id.is_none());
        let chunk = summaries
            .iter()
            .find(|s| s.summary_level == SummaryLevel::Chunk)
            .unwrap();
        assert_eq!(
            chunk.chunk_id,
            format!("summary_{}", chunk.source_chunk_id.as_deref().unwrap())
        );
    }

    #[test]
    fn generator_failures_fall_back_to_truncated_input() {
        let store = Arc::new(InMemoryVectorStore::<Summary>::new());
        let indexer = SummaryIndexer::new(
            Arc::new(FirstLine { fail: true }),
            Arc::new(HashingEmbedder::default()),
            store.clone(),
        );
        let report = indexer.write_document(&chunks()).unwrap();
        assert_eq!(report.fallbacks, report.total());
        assert_eq!(store.len().unwrap(), report.total());
        let sections = store
            .fetch(&RecordFilter::summaries(SummaryLevel::Section), 10)
            .unwrap();
        assert!(sections[0].text.starts_with("Section: section_1"));
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        assert_eq!(truncate_chars("£££££", 2), "££...");
        assert_eq!(truncate_chars("short", 10), "short");
    }
}
