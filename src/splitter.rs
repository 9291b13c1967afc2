//! Boundary-aware splitting of section text into overlapping token-budgeted windows.
//!
//! Windows are built from blank-line paragraphs; a paragraph that alone exceeds the
//! budget is replaced by its sentences. A sentence is never split, so a single
//! over-long sentence becomes an over-budget window. Every window after the first
//! starts roughly `overlap_fraction * budget` tokens before the end of its
//! predecessor, snapped back to a sentence start.

use std::ops::Range;

use crate::error::{ClaimtrailError, Result};
use crate::text::{TokenCounter, paragraph_ranges, sentence_ranges};
use crate::types::options::validate_overlap;

pub struct Splitter<'a> {
    counter: &'a dyn TokenCounter,
}

impl<'a> Splitter<'a> {
    #[must_use]
    pub fn new(counter: &'a dyn TokenCounter) -> Self {
        Self { counter }
    }

    /// Split `text` into ordered `[start, end)` byte ranges.
    pub fn split(
        &self,
        text: &str,
        token_budget: usize,
        overlap_fraction: f32,
    ) -> Result<Vec<Range<usize>>> {
        if token_budget == 0 {
            return Err(ClaimtrailError::config("token budget must be positive"));
        }
        validate_overlap(overlap_fraction)?;

        if text.trim().is_empty() {
            return Ok(Vec::new());
        }
        if self.counter.count(text) <= token_budget {
            return Ok(vec![0..text.len()]);
        }

        let mut units = Vec::new();
        let mut sentence_starts = Vec::new();
        for paragraph in paragraph_ranges(text) {
            let sentences = sentence_ranges(text, paragraph.clone());
            sentence_starts.extend(sentences.iter().map(|sentence| sentence.start));
            if self.counter.count(&text[paragraph.clone()]) <= token_budget || sentences.is_empty() {
                units.push(paragraph);
            } else {
                units.extend(sentences);
            }
        }

        let overlap_tokens = (token_budget as f32 * overlap_fraction).round() as usize;
        let mut windows: Vec<Range<usize>> = Vec::new();
        let mut next = 0;
        let mut carry: Option<usize> = None;
        while next < units.len() {
            let start = carry.unwrap_or(units[next].start);
            // At least one unit the previous window did not end with.
            let mut end = units[next].end;
            next += 1;
            while next < units.len()
                && self.counter.count(&text[start..units[next].end]) <= token_budget
            {
                end = units[next].end;
                next += 1;
            }
            windows.push(start..end);
            if next < units.len() {
                carry = self.overlap_start(text, &sentence_starts, start..end, overlap_tokens);
            }
        }

        tracing::trace!(
            budget = token_budget,
            units = units.len(),
            windows = windows.len(),
            "split text"
        );
        Ok(windows)
    }

    /// Start of the overlap carried into the window after `previous`.
    ///
    /// Picks the latest sentence start inside `previous` whose tail holds at least
    /// `overlap_tokens`; if no tail reaches that, the earliest sentence start after
    /// the window start.
    fn overlap_start(
        &self,
        text: &str,
        sentence_starts: &[usize],
        previous: Range<usize>,
        overlap_tokens: usize,
    ) -> Option<usize> {
        if overlap_tokens == 0 {
            return None;
        }
        let candidates: Vec<usize> = sentence_starts
            .iter()
            .copied()
            .filter(|&start| start > previous.start && start < previous.end)
            .collect();
        candidates
            .iter()
            .rev()
            .copied()
            .find(|&start| self.counter.count(&text[start..previous.end]) >= overlap_tokens)
            .or_else(|| candidates.first().copied())
    }
}
