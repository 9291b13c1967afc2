//! Public retrieval request/response types exposed by the core library.

use std::time::Duration;

use chrono::{NaiveDateTime, NaiveTime, TimeDelta, Timelike};
use once_cell::sync::OnceCell;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::summary::Summary;
use crate::text::cached_regex;

/// Sections a query refers to explicitly, in order of first mention.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SectionHint {
    sections: Vec<String>,
}

impl SectionHint {
    /// Build a hint from section ids, dropping blanks and repeats.
    #[must_use]
    pub fn new<I, S>(sections: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut out: Vec<String> = Vec::new();
        for section in sections {
            let section = section.into();
            let section = section.trim();
            if !section.is_empty() && !out.iter().any(|existing| existing == section) {
                out.push(section.to_string());
            }
        }
        Self { sections: out }
    }

    /// Sections referenced as `section 3`, `Section_3` or `section-3` in a query.
    #[must_use]
    pub fn from_query(query: &str) -> Self {
        static SECTION_REF: OnceCell<std::result::Result<Regex, String>> = OnceCell::new();
        let Some(regex) = cached_regex(&SECTION_REF, r"(?i)\bsection[\s_-]*(\d+)\b") else {
            return Self::default();
        };
        Self::new(
            regex
                .captures_iter(query)
                .filter_map(|caps| caps.get(1))
                .map(|number| format!("section_{}", number.as_str())),
        )
    }

    #[must_use]
    pub fn single(section_id: impl Into<String>) -> Self {
        Self::new([section_id.into()])
    }

    /// The hinted section when exactly one was named.
    #[must_use]
    pub fn as_single(&self) -> Option<&str> {
        match self.sections.as_slice() {
            [only] => Some(only.as_str()),
            _ => None,
        }
    }

    #[must_use]
    pub fn contains(&self, section_id: &str) -> bool {
        self.sections.iter().any(|section| section == section_id)
    }

    #[must_use]
    pub fn sections(&self) -> &[String] {
        &self.sections
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }
}

/// Time window a query asks about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TimeHint {
    /// Absolute window; `start == end` for a single instant.
    Window {
        start: NaiveDateTime,
        end: NaiveDateTime,
    },
    /// Times of day without a date, matched against any day.
    TimeOfDay { start: NaiveTime, end: NaiveTime },
}

impl TimeHint {
    #[must_use]
    pub fn at(instant: NaiveDateTime) -> Self {
        Self::Window {
            start: instant,
            end: instant,
        }
    }

    #[must_use]
    pub fn between(a: NaiveDateTime, b: NaiveDateTime) -> Self {
        Self::Window {
            start: a.min(b),
            end: a.max(b),
        }
    }

    #[must_use]
    pub fn time_of_day(a: NaiveTime, b: NaiveTime) -> Self {
        Self::TimeOfDay {
            start: a.min(b),
            end: a.max(b),
        }
    }

    /// Whether `[earliest, latest]` touches the hint widened by `tolerance` on both sides.
    #[must_use]
    pub fn overlaps(
        &self,
        earliest: NaiveDateTime,
        latest: NaiveDateTime,
        tolerance: TimeDelta,
    ) -> bool {
        let (earliest, latest) = (earliest.min(latest), earliest.max(latest));
        match *self {
            Self::Window { start, end } => {
                let lower = start
                    .checked_sub_signed(tolerance)
                    .unwrap_or(NaiveDateTime::MIN);
                let upper = end.checked_add_signed(tolerance).unwrap_or(NaiveDateTime::MAX);
                earliest <= upper && latest >= lower
            }
            Self::TimeOfDay { start, end } => {
                if earliest.date() != latest.date() {
                    // Spans midnight, so every time of day is covered.
                    return true;
                }
                let slack = tolerance.num_seconds().max(0);
                let lower = i64::from(start.num_seconds_from_midnight()) - slack;
                let upper = i64::from(end.num_seconds_from_midnight()) + slack;
                let first = i64::from(earliest.time().num_seconds_from_midnight());
                let last = i64::from(latest.time().num_seconds_from_midnight());
                first <= upper && last >= lower
            }
        }
    }

    #[must_use]
    pub fn matches(&self, instant: NaiveDateTime, tolerance: TimeDelta) -> bool {
        self.overlaps(instant, instant, tolerance)
    }
}

/// Parameters for one retrieval call.
#[derive(Debug, Clone)]
pub struct RetrievalRequest {
    pub query: String,
    pub top_k: usize,
    pub section_hint: Option<SectionHint>,
    /// Ignored by the summary retriever.
    pub time_hint: Option<TimeHint>,
    /// Overrides the retriever's configured deadline. One budget covers the query
    /// embedding and every store call of the request.
    pub timeout: Option<Duration>,
}

impl RetrievalRequest {
    #[must_use]
    pub fn new(query: impl Into<String>, top_k: usize) -> Self {
        Self {
            query: query.into(),
            top_k,
            section_hint: None,
            time_hint: None,
            timeout: None,
        }
    }

    #[must_use]
    pub fn with_section_hint(mut self, hint: SectionHint) -> Self {
        self.section_hint = (!hint.is_empty()).then_some(hint);
        self
    }

    #[must_use]
    pub fn with_time_hint(mut self, hint: TimeHint) -> Self {
        self.time_hint = Some(hint);
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// One ranked unit of context: a single small span or a merged run of adjacent siblings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextItem {
    pub rank: usize,
    /// Member span ids in position order.
    pub span_ids: Vec<String>,
    pub section_id: String,
    pub document_id: String,
    pub first_position: usize,
    pub last_position: usize,
    pub text: String,
    /// Best similarity among the member spans.
    pub score: f32,
    /// Earliest member timestamp.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<NaiveDateTime>,
    /// Latest member timestamp.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest_timestamp: Option<NaiveDateTime>,
    #[serde(default)]
    pub time_match: bool,
    #[serde(default)]
    pub section_match: bool,
}

impl ContextItem {
    #[must_use]
    pub fn is_merged(&self) -> bool {
        self.span_ids.len() > 1
    }

    #[must_use]
    pub fn merged_count(&self) -> usize {
        self.span_ids.len()
    }
}

/// A summary returned by the summary retriever.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryHit {
    pub rank: usize,
    /// `None` when the summary came from a direct section lookup.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f32>,
    #[serde(default)]
    pub section_match: bool,
    pub summary: Summary,
}
