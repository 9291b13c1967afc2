//! Text normalization, token counting and paragraph/sentence boundaries.

use std::ops::Range;

use once_cell::sync::OnceCell;
use regex::Regex;
use unicode_normalization::UnicodeNormalization;
use unicode_segmentation::UnicodeSegmentation;

#[cfg(feature = "hf_tokenizer")]
use crate::error::{ClaimtrailError, Result};

/// Compile `pattern` once into `cell`; logs and returns `None` if it fails to compile.
pub(crate) fn cached_regex(
    cell: &'static OnceCell<std::result::Result<Regex, String>>,
    pattern: &str,
) -> Option<&'static Regex> {
    match cell.get_or_init(|| Regex::new(pattern).map_err(|err| err.to_string())) {
        Ok(regex) => Some(regex),
        Err(msg) => {
            tracing::error!(target = "claimtrail::text", error = %msg, pattern, "regex init failed");
            None
        }
    }
}

/// NFC-normalize and convert CRLF/CR line endings to LF.
#[must_use]
pub fn normalize_section_text(text: &str) -> String {
    let unified = text.replace("\r\n", "\n").replace('\r', "\n");
    unified.nfc().collect()
}

/// Counts tokens in arbitrary substrings. Counts must not decrease as a substring grows.
pub trait TokenCounter: Send + Sync {
    fn count(&self, text: &str) -> usize;

    fn name(&self) -> &str {
        "custom"
    }
}

/// UAX #29 word segments, punctuation included, whitespace excluded.
#[derive(Debug, Clone, Copy, Default)]
pub struct WordTokenCounter;

impl TokenCounter for WordTokenCounter {
    fn count(&self, text: &str) -> usize {
        text.split_word_bounds()
            .filter(|segment| segment.chars().any(|c| !c.is_whitespace()))
            .count()
    }

    fn name(&self) -> &str {
        "uax29_words"
    }
}

/// Token counts from a HuggingFace `tokenizer.json`.
#[cfg(feature = "hf_tokenizer")]
pub struct HfTokenCounter {
    tokenizer: tokenizers::Tokenizer,
}

#[cfg(feature = "hf_tokenizer")]
impl HfTokenCounter {
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let tokenizer = tokenizers::Tokenizer::from_file(path.as_ref()).map_err(|err| {
            ClaimtrailError::Tokenizer {
                reason: err.to_string(),
            }
        })?;
        Ok(Self { tokenizer })
    }
}

#[cfg(feature = "hf_tokenizer")]
impl TokenCounter for HfTokenCounter {
    fn count(&self, text: &str) -> usize {
        match self.tokenizer.encode(text, false) {
            Ok(encoding) => encoding.len(),
            Err(err) => {
                tracing::warn!(error = %err, "tokenizer failed; falling back to word count");
                WordTokenCounter.count(text)
            }
        }
    }

    fn name(&self) -> &str {
        "hf_tokenizer"
    }
}

/// Shrink `range` to exclude surrounding whitespace; `None` when nothing is left.
pub(crate) fn trim_range(text: &str, range: Range<usize>) -> Option<Range<usize>> {
    let slice = &text[range.clone()];
    let trimmed = slice.trim();
    if trimmed.is_empty() {
        return None;
    }
    let lead = slice.len() - slice.trim_start().len();
    let start = range.start + lead;
    Some(start..start + trimmed.len())
}

/// Blank-line-delimited paragraphs, trimmed, in document order.
#[must_use]
pub fn paragraph_ranges(text: &str) -> Vec<Range<usize>> {
    // One or more blank lines.
    static PARAGRAPH_BREAK: OnceCell<std::result::Result<Regex, String>> = OnceCell::new();
    let mut paragraphs = Vec::new();
    let Some(breaks) = cached_regex(&PARAGRAPH_BREAK, r"\n(?:[ \t]*\n)+") else {
        paragraphs.extend(trim_range(text, 0..text.len()));
        return paragraphs;
    };
    let mut cursor = 0;
    for separator in breaks.find_iter(text) {
        if let Some(range) = trim_range(text, cursor..separator.start()) {
            paragraphs.push(range);
        }
        cursor = separator.end();
    }
    if let Some(range) = trim_range(text, cursor..text.len()) {
        paragraphs.push(range);
    }
    paragraphs
}

/// UAX #29 sentences within `range`, trimmed, as offsets into `text`.
#[must_use]
pub fn sentence_ranges(text: &str, range: Range<usize>) -> Vec<Range<usize>> {
    let base = range.start;
    text[range]
        .split_sentence_bound_indices()
        .filter_map(|(offset, sentence)| {
            trim_range(text, base + offset..base + offset + sentence.len())
        })
        .collect()
}
