//! Three-level span trees built per section.
//!
//! Each section is split independently at the small, medium and large budgets. Every
//! small span points at the medium span it overlaps most, and every medium span at the
//! large span it overlaps most (ties go to the earlier span). Spans live in a flat
//! table; parent links are ids, never references.

use std::collections::{HashMap, HashSet};
use std::ops::Range;
use std::sync::Arc;

use chrono::NaiveDateTime;
#[cfg(feature = "parallel")]
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{ClaimtrailError, Result};
use crate::splitter::Splitter;
use crate::temporal::{PatternTimestampExtractor, TimestampExtractor};
use crate::text::{TokenCounter, WordTokenCounter, normalize_section_text};
use crate::types::{ChunkRecord, ChunkingConfig, Span, SpanLevel, span_id};

/// One section of a document, as handed to the chunker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionInput {
    pub section_id: String,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<NaiveDateTime>,
}

impl SectionInput {
    #[must_use]
    pub fn new(section_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            section_id: section_id.into(),
            text: text.into(),
            timestamp: None,
        }
    }

    #[must_use]
    pub fn with_timestamp(mut self, timestamp: NaiveDateTime) -> Self {
        self.timestamp = Some(timestamp);
        self
    }
}

/// All spans of one section, small level first, each level in position order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpanTree {
    section_id: String,
    document_id: String,
    claim_id: String,
    section_text: String,
    spans: Vec<Span>,
    index: HashMap<String, usize>,
}

impl SpanTree {
    fn new(
        section_id: &str,
        document_id: &str,
        claim_id: &str,
        section_text: String,
        spans: Vec<Span>,
    ) -> Self {
        let index = spans
            .iter()
            .enumerate()
            .map(|(slot, span)| (span.id.clone(), slot))
            .collect();
        Self {
            section_id: section_id.to_string(),
            document_id: document_id.to_string(),
            claim_id: claim_id.to_string(),
            section_text,
            spans,
            index,
        }
    }

    #[must_use]
    pub fn section_id(&self) -> &str {
        &self.section_id
    }

    #[must_use]
    pub fn document_id(&self) -> &str {
        &self.document_id
    }

    #[must_use]
    pub fn claim_id(&self) -> &str {
        &self.claim_id
    }

    /// The normalized text all span offsets refer to.
    #[must_use]
    pub fn section_text(&self) -> &str {
        &self.section_text
    }

    #[must_use]
    pub fn spans(&self) -> &[Span] {
        &self.spans
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.spans.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Span> {
        self.index.get(id).map(|&slot| &self.spans[slot])
    }

    /// Spans of `level` in position order.
    pub fn level(&self, level: SpanLevel) -> impl Iterator<Item = &Span> + '_ {
        self.spans.iter().filter(move |span| span.level == level)
    }

    #[must_use]
    pub fn parent(&self, span: &Span) -> Option<&Span> {
        span.parent_id.as_deref().and_then(|id| self.get(id))
    }

    /// Spans whose parent is `id`, in position order.
    #[must_use]
    pub fn children(&self, id: &str) -> Vec<&Span> {
        self.spans
            .iter()
            .filter(|span| span.parent_id.as_deref() == Some(id))
            .collect()
    }

    #[must_use]
    pub fn records(&self) -> Vec<ChunkRecord> {
        self.spans.iter().map(ChunkRecord::from).collect()
    }

    /// Re-check positions, literal text and parent links.
    pub fn verify(&self) -> Result<()> {
        let broken = |reason: String| ClaimtrailError::InconsistentTree {
            section_id: self.section_id.clone(),
            reason,
        };
        for level in SpanLevel::ALL {
            for (expected, span) in self.level(level).enumerate() {
                if span.position_index != expected {
                    return Err(broken(format!(
                        "{level} positions are not contiguous at {}",
                        span.id
                    )));
                }
                if self.section_text.get(span.start..span.end) != Some(span.text.as_str()) {
                    return Err(broken(format!("{} is not a literal slice of the section", span.id)));
                }
                match (level.parent(), self.parent(span)) {
                    (None, None) => {}
                    (None, Some(_)) => {
                        return Err(broken(format!("{} is large but has a parent", span.id)));
                    }
                    (Some(_), None) => {
                        return Err(broken(format!("{} has no resolvable parent", span.id)));
                    }
                    (Some(parent_level), Some(parent)) => {
                        if parent.level != parent_level || parent.section_id != span.section_id {
                            return Err(broken(format!("{} points at {}", span.id, parent.id)));
                        }
                        if !parent.covers(span.midpoint()) {
                            return Err(broken(format!(
                                "midpoint of {} lies outside its parent {}",
                                span.id, parent.id
                            )));
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

/// A section that could not be chunked, reported without failing its siblings.
#[derive(Debug)]
pub struct SectionFailure {
    pub section_id: String,
    pub error: ClaimtrailError,
}

/// Result of chunking every section of one document.
#[derive(Debug, Default)]
pub struct DocumentChunks {
    pub document_id: String,
    pub claim_id: String,
    pub trees: Vec<SpanTree>,
    pub failures: Vec<SectionFailure>,
}

impl DocumentChunks {
    #[must_use]
    pub fn span_count(&self) -> usize {
        self.trees.iter().map(SpanTree::len).sum()
    }

    pub fn spans(&self) -> impl Iterator<Item = &Span> + '_ {
        self.trees.iter().flat_map(|tree| tree.spans().iter())
    }
}

pub struct HierarchicalChunker {
    config: ChunkingConfig,
    counter: Arc<dyn TokenCounter>,
    extractor: Arc<dyn TimestampExtractor>,
}

impl HierarchicalChunker {
    /// Chunker counting UAX #29 words and detecting timestamps with the default patterns.
    pub fn new(config: ChunkingConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            counter: Arc::new(WordTokenCounter),
            extractor: Arc::new(PatternTimestampExtractor::new()),
        })
    }

    #[must_use]
    pub fn with_token_counter(mut self, counter: Arc<dyn TokenCounter>) -> Self {
        self.counter = counter;
        self
    }

    #[must_use]
    pub fn with_timestamp_extractor(mut self, extractor: Arc<dyn TimestampExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    #[must_use]
    pub fn config(&self) -> &ChunkingConfig {
        &self.config
    }

    /// Build the span tree for one section. Blank text yields an empty tree.
    pub fn build(
        &self,
        section_id: &str,
        section_text: &str,
        document_id: &str,
        claim_id: &str,
        section_timestamp: Option<NaiveDateTime>,
    ) -> Result<SpanTree> {
        if section_id.trim().is_empty() {
            return Err(ClaimtrailError::InvalidInput {
                section_id: section_id.to_string(),
                reason: "section id is empty".into(),
            });
        }
        if document_id.trim().is_empty() {
            return Err(ClaimtrailError::InvalidInput {
                section_id: section_id.to_string(),
                reason: "document id is empty".into(),
            });
        }

        let text = normalize_section_text(section_text);
        let splitter = Splitter::new(self.counter.as_ref());
        let overlap = self.config.overlap_fraction;
        let mut large = splitter.split(&text, self.config.budget(SpanLevel::Large), overlap)?;
        let mut medium = splitter.split(&text, self.config.budget(SpanLevel::Medium), overlap)?;
        close_gaps(&mut large);
        close_gaps(&mut medium);
        let small = splitter.split(&text, self.config.budget(SpanLevel::Small), overlap)?;

        let medium_parents = assign_parents(section_id, SpanLevel::Medium, &medium, &large)?;
        let small_parents = assign_parents(section_id, SpanLevel::Small, &small, &medium)?;

        let mut spans = Vec::with_capacity(small.len() + medium.len() + large.len());
        let levels: [(SpanLevel, &[Range<usize>], Option<&[usize]>); 3] = [
            (SpanLevel::Small, small.as_slice(), Some(small_parents.as_slice())),
            (SpanLevel::Medium, medium.as_slice(), Some(medium_parents.as_slice())),
            (SpanLevel::Large, large.as_slice(), None),
        ];
        for (level, ranges, parents) in levels {
            for (position, range) in ranges.iter().enumerate() {
                let parent_id = match (level.parent(), parents) {
                    (Some(parent_level), Some(parents)) => {
                        Some(span_id(section_id, parent_level, parents[position]))
                    }
                    _ => None,
                };
                let span_text = &text[range.clone()];
                let timestamp = self
                    .extractor
                    .extract_timestamp(span_text, section_timestamp)
                    .or(section_timestamp);
                spans.push(Span {
                    id: span_id(section_id, level, position),
                    level,
                    text: span_text.to_string(),
                    section_id: section_id.to_string(),
                    document_id: document_id.to_string(),
                    claim_id: claim_id.to_string(),
                    position_index: position,
                    parent_id,
                    timestamp,
                    start: range.start,
                    end: range.end,
                    token_count: self.counter.count(span_text),
                });
            }
        }

        let tree = SpanTree::new(section_id, document_id, claim_id, text, spans);
        tree.verify()?;
        tracing::debug!(
            section_id,
            small = small.len(),
            medium = medium.len(),
            large = large.len(),
            "built span tree"
        );
        Ok(tree)
    }

    /// Chunk every section of a document. Failures are collected per section.
    #[tracing::instrument(skip(self, sections), fields(sections = sections.len()))]
    pub fn chunk_document(
        &self,
        document_id: &str,
        claim_id: &str,
        sections: &[SectionInput],
    ) -> DocumentChunks {
        let mut seen = HashSet::new();
        let duplicate: Vec<bool> = sections
            .iter()
            .map(|section| !seen.insert(section.section_id.as_str()))
            .collect();

        let build_one = |(section, duplicate): (&SectionInput, &bool)| {
            let outcome = if *duplicate {
                Err(ClaimtrailError::InvalidInput {
                    section_id: section.section_id.clone(),
                    reason: "section id appears more than once in the document".into(),
                })
            } else {
                self.build(
                    &section.section_id,
                    &section.text,
                    document_id,
                    claim_id,
                    section.timestamp,
                )
            };
            (section.section_id.clone(), outcome)
        };

        #[cfg(feature = "parallel")]
        let outcomes: Vec<(String, Result<SpanTree>)> =
            sections.par_iter().zip(duplicate.par_iter()).map(build_one).collect();
        #[cfg(not(feature = "parallel"))]
        let outcomes: Vec<(String, Result<SpanTree>)> =
            sections.iter().zip(duplicate.iter()).map(build_one).collect();

        let mut chunks = DocumentChunks {
            document_id: document_id.to_string(),
            claim_id: claim_id.to_string(),
            ..DocumentChunks::default()
        };
        for (section_id, outcome) in outcomes {
            match outcome {
                Ok(tree) => {
                    if !tree.is_empty() {
                        chunks.trees.push(tree);
                    }
                }
                Err(error) => {
                    tracing::warn!(section_id = %section_id, error = %error, "section chunking failed");
                    chunks.failures.push(SectionFailure { section_id, error });
                }
            }
        }
        tracing::info!(
            document_id,
            spans = chunks.span_count(),
            failures = chunks.failures.len(),
            "chunked document"
        );
        chunks
    }
}

/// Extend each enclosing window over the whitespace before its successor, so the
/// windows of a level tile the section from the first window start to the last end.
fn close_gaps(windows: &mut [Range<usize>]) {
    for index in 1..windows.len() {
        let next_start = windows[index].start;
        let previous = &mut windows[index - 1];
        if previous.end < next_start {
            previous.end = next_start;
        }
    }
}

/// Index of the parent range holding each child's midpoint that overlaps the child the
/// most; ties keep the earlier parent.
fn assign_parents(
    section_id: &str,
    level: SpanLevel,
    children: &[Range<usize>],
    parents: &[Range<usize>],
) -> Result<Vec<usize>> {
    children
        .iter()
        .enumerate()
        .map(|(position, child)| {
            let midpoint = child.start + (child.end - child.start) / 2;
            let mut best: Option<(usize, usize)> = None;
            for (index, parent) in parents.iter().enumerate() {
                if !parent.contains(&midpoint) {
                    continue;
                }
                let overlap = child.end.min(parent.end).saturating_sub(child.start.max(parent.start));
                if best.is_none_or(|(_, most)| overlap > most) {
                    best = Some((index, overlap));
                }
            }
            best.map(|(index, _)| index).ok_or_else(|| ClaimtrailError::InconsistentTree {
                section_id: section_id.to_string(),
                reason: format!("no enclosing span holds the midpoint of {level} span {position}"),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    fn small_config() -> ChunkingConfig {
        ChunkingConfig {
            small_tokens: 20,
            medium_tokens: 60,
            large_tokens: 150,
            overlap_fraction: 0.2,
        }
    }

    fn claim_text() -> String {
        (0..30)
            .map(|i| format!("Statement {i} describes what the witness saw."))
            .collect::<Vec<_>>()
            .join(" ")
    }

    #[test]
    fn blank_section_yields_empty_tree() {
        let chunker = HierarchicalChunker::new(small_config()).unwrap();
        let tree = chunker.build("section_1", "  \n\n ", "doc", "claim", None).unwrap();
        assert!(tree.is_empty());
    }

    #[test]
    fn empty_section_id_is_invalid_input() {
        let chunker = HierarchicalChunker::new(small_config()).unwrap();
        let err = chunker.build("", "text", "doc", "claim", None).unwrap_err();
        assert!(matches!(err, ClaimtrailError::InvalidInput { .. }));
    }

    #[test]
    fn ids_and_parents_follow_the_scheme() {
        let chunker = HierarchicalChunker::new(small_config()).unwrap();
        let tree = chunker
            .build("section_4", &claim_text(), "doc", "claim", None)
            .unwrap();
        let first = tree.level(SpanLevel::Small).next().unwrap();
        assert_eq!(first.id, "section_4_small_0");
        assert_eq!(first.parent_id.as_deref(), Some("section_4_medium_0"));
        assert!(tree.level(SpanLevel::Large).all(|span| span.parent_id.is_none()));
        let medium = tree.get("section_4_medium_0").unwrap();
        assert!(tree.children(&medium.id).iter().any(|child| child.id == first.id));
    }

    #[test]
    fn assign_parents_prefers_largest_overlap_then_earliest() {
        let parents = vec![0..10, 8..20];
        let children = vec![0..5, 6..12, 9..11, 15..19];
        let assigned = assign_parents("s", SpanLevel::Small, &children, &parents).unwrap();
        assert_eq!(assigned, vec![0, 0, 1, 1]);
        let err = assign_parents("s", SpanLevel::Small, &[30..35], &parents).unwrap_err();
        assert!(matches!(err, ClaimtrailError::InconsistentTree { .. }));
    }

    #[test]
    fn closed_gaps_give_every_midpoint_a_parent() {
        let mut parents = vec![0..10, 14..30, 30..41];
        let children = vec![4..20];
        assert!(assign_parents("s", SpanLevel::Small, &children, &parents).is_err());
        close_gaps(&mut parents);
        assert_eq!(parents, vec![0..14, 14..30, 30..41]);
        assert_eq!(
            assign_parents("s", SpanLevel::Small, &children, &parents).unwrap(),
            vec![0]
        );
    }

    #[test]
    fn spans_inherit_or_override_section_timestamp() {
        let chunker = HierarchicalChunker::new(ChunkingConfig::default()).unwrap();
        let section_time = NaiveDate::from_ymd_opt(2025, 3, 3)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let tree = chunker
            .build("section_1", "The van stopped suddenly.", "doc", "claim", Some(section_time))
            .unwrap();
        assert_eq!(tree.spans()[0].timestamp, Some(section_time));

        let tree = chunker
            .build("section_1", "Impact at 08:11:02.", "doc", "claim", Some(section_time))
            .unwrap();
        assert_eq!(
            tree.spans()[0].timestamp,
            NaiveDate::from_ymd_opt(2025, 3, 3)
                .unwrap()
                .and_hms_opt(8, 11, 2)
        );
    }

    #[test]
    fn document_chunking_isolates_section_failures() {
        let chunker = HierarchicalChunker::new(small_config()).unwrap();
        let sections = vec![
            SectionInput::new("section_1", claim_text()),
            SectionInput::new("section_1", "duplicate id"),
            SectionInput::new("section_2", ""),
            SectionInput::new("section_3", "Short note."),
        ];
        let chunks = chunker.chunk_document("doc", "claim", &sections);
        let ids: Vec<&str> = chunks.trees.iter().map(SpanTree::section_id).collect();
        assert_eq!(ids, vec!["section_1", "section_3"]);
        assert_eq!(chunks.failures.len(), 1);
        assert_eq!(chunks.failures[0].section_id, "section_1");
    }
}
