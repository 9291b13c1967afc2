//! Timestamp detection in span text and queries.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime, TimeDelta};
use once_cell::sync::OnceCell;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};

use crate::text::cached_regex;
use crate::types::TimeHint;

const MONTHS: &str = r"jan(?:uary)?|feb(?:ruary)?|mar(?:ch)?|apr(?:il)?|may|june?|july?|aug(?:ust)?|sep(?:t(?:ember)?)?|oct(?:ober)?|nov(?:ember)?|dec(?:ember)?";

/// Value carried by a detected mention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum MentionValue {
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    TimeOfDay(NaiveTime),
}

/// A date or time found in text, with its byte range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeMention {
    pub offset: usize,
    pub len: usize,
    pub value: MentionValue,
}

impl TimeMention {
    /// Resolve to an instant. Time-of-day mentions take their date from `anchor`; a bare
    /// date equal to the anchor's date keeps the anchor's time.
    #[must_use]
    pub fn resolve(&self, anchor: Option<NaiveDateTime>) -> Option<NaiveDateTime> {
        match self.value {
            MentionValue::DateTime(instant) => Some(instant),
            MentionValue::Date(date) => match anchor {
                Some(anchor) if anchor.date() == date => Some(anchor),
                _ => date.and_hms_opt(0, 0, 0),
            },
            MentionValue::TimeOfDay(time) => anchor.map(|anchor| anchor.date().and_time(time)),
        }
    }
}

pub trait TimestampExtractor: Send + Sync {
    /// Mentions in text order.
    fn mentions(&self, text: &str) -> Vec<TimeMention>;

    /// First mention in `text` that resolves against `anchor`.
    fn extract_timestamp(
        &self,
        text: &str,
        anchor: Option<NaiveDateTime>,
    ) -> Option<NaiveDateTime> {
        self.mentions(text)
            .iter()
            .find_map(|mention| mention.resolve(anchor))
    }
}

/// Extractor that never finds anything; spans keep their section timestamp.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoTimestamps;

impl TimestampExtractor for NoTimestamps {
    fn mentions(&self, _text: &str) -> Vec<TimeMention> {
        Vec::new()
    }
}

/// Regex-based detection of ISO, written-month, numeric and bare clock-time mentions.
#[derive(Debug, Clone, Copy, Default)]
pub struct PatternTimestampExtractor {
    /// Read `03/04/2025` as 3 April rather than March 4.
    pub day_first: bool,
}

impl PatternTimestampExtractor {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn day_first() -> Self {
        Self { day_first: true }
    }
}

fn number(caps: &Captures<'_>, index: usize) -> Option<u32> {
    caps.get(index)?.as_str().parse().ok()
}

fn month_number(name: &str) -> Option<u32> {
    let prefix: String = name.chars().take(3).collect::<String>().to_ascii_lowercase();
    let month = match prefix.as_str() {
        "jan" => 1,
        "feb" => 2,
        "mar" => 3,
        "apr" => 4,
        "may" => 5,
        "jun" => 6,
        "jul" => 7,
        "aug" => 8,
        "sep" => 9,
        "oct" => 10,
        "nov" => 11,
        "dec" => 12,
        _ => return None,
    };
    Some(month)
}

/// Clock time from the four groups starting at `hour`: hours, minutes, seconds, meridiem.
fn clock(caps: &Captures<'_>, hour: usize) -> Option<NaiveTime> {
    let mut h = number(caps, hour)?;
    let m = number(caps, hour + 1)?;
    let s = number(caps, hour + 2).unwrap_or(0);
    if let Some(meridiem) = caps.get(hour + 3) {
        let pm = meridiem.as_str().eq_ignore_ascii_case("p");
        if h == 0 || h > 12 {
            return None;
        }
        h = match (pm, h) {
            (false, 12) => 0,
            (true, 12) => 12,
            (true, h) => h + 12,
            (false, h) => h,
        };
    }
    NaiveTime::from_hms_opt(h, m, s)
}

fn with_optional_time(date: NaiveDate, caps: &Captures<'_>, hour: usize) -> MentionValue {
    match caps.get(hour).and_then(|_| clock(caps, hour)) {
        Some(time) => MentionValue::DateTime(date.and_time(time)),
        None => MentionValue::Date(date),
    }
}

type Parser = fn(&PatternTimestampExtractor, &Captures<'_>) -> Option<MentionValue>;

fn parse_iso(_: &PatternTimestampExtractor, caps: &Captures<'_>) -> Option<MentionValue> {
    let date = NaiveDate::from_ymd_opt(
        i32::try_from(number(caps, 1)?).ok()?,
        number(caps, 2)?,
        number(caps, 3)?,
    )?;
    Some(with_optional_time(date, caps, 4))
}

fn parse_day_month(_: &PatternTimestampExtractor, caps: &Captures<'_>) -> Option<MentionValue> {
    let date = NaiveDate::from_ymd_opt(
        i32::try_from(number(caps, 3)?).ok()?,
        month_number(caps.get(2)?.as_str())?,
        number(caps, 1)?,
    )?;
    Some(with_optional_time(date, caps, 4))
}

fn parse_month_day(_: &PatternTimestampExtractor, caps: &Captures<'_>) -> Option<MentionValue> {
    let date = NaiveDate::from_ymd_opt(
        i32::try_from(number(caps, 3)?).ok()?,
        month_number(caps.get(1)?.as_str())?,
        number(caps, 2)?,
    )?;
    Some(with_optional_time(date, caps, 4))
}

fn parse_numeric(
    extractor: &PatternTimestampExtractor,
    caps: &Captures<'_>,
) -> Option<MentionValue> {
    let (first, second) = (number(caps, 1)?, number(caps, 2)?);
    let (month, day) = if extractor.day_first {
        (second, first)
    } else {
        (first, second)
    };
    let date = NaiveDate::from_ymd_opt(i32::try_from(number(caps, 3)?).ok()?, month, day)?;
    Some(with_optional_time(date, caps, 4))
}

fn parse_clock(_: &PatternTimestampExtractor, caps: &Captures<'_>) -> Option<MentionValue> {
    clock(caps, 1).map(MentionValue::TimeOfDay)
}

fn patterns() -> Vec<(&'static Regex, Parser)> {
    static ISO: OnceCell<std::result::Result<Regex, String>> = OnceCell::new();
    static DAY_MONTH: OnceCell<std::result::Result<Regex, String>> = OnceCell::new();
    static MONTH_DAY: OnceCell<std::result::Result<Regex, String>> = OnceCell::new();
    static NUMERIC: OnceCell<std::result::Result<Regex, String>> = OnceCell::new();
    static CLOCK: OnceCell<std::result::Result<Regex, String>> = OnceCell::new();

    let time = r"(\d{1,2}):(\d{2})(?::(\d{2}))?(?:\s*([ap])\.?m\b\.?)?";
    let candidates: [(&'static OnceCell<_>, String, Parser); 5] = [
        (
            &ISO,
            format!(r"(?i)\b(\d{{4}})-(\d{{1,2}})-(\d{{1,2}})(?:[T ]{time})?\b"),
            parse_iso,
        ),
        (
            &DAY_MONTH,
            format!(
                r"(?i)\b(\d{{1,2}})(?:st|nd|rd|th)?\s+({MONTHS})\.?,?\s+(\d{{4}})(?:,?\s+(?:at\s+)?{time})?\b"
            ),
            parse_day_month,
        ),
        (
            &MONTH_DAY,
            format!(
                r"(?i)\b({MONTHS})\.?\s+(\d{{1,2}})(?:st|nd|rd|th)?,?\s+(\d{{4}})(?:,?\s+(?:at\s+)?{time})?\b"
            ),
            parse_month_day,
        ),
        (
            &NUMERIC,
            format!(r"(?i)\b(\d{{1,2}})/(\d{{1,2}})/(\d{{4}})(?:,?\s+{time})?\b"),
            parse_numeric,
        ),
        (
            &CLOCK,
            format!(r"(?i)\b{time}\b"),
            parse_clock,
        ),
    ];
    candidates
        .into_iter()
        .filter_map(|(cell, pattern, parser)| cached_regex(cell, &pattern).map(|re| (re, parser)))
        .collect()
}

impl TimestampExtractor for PatternTimestampExtractor {
    fn mentions(&self, text: &str) -> Vec<TimeMention> {
        let mut claimed: Vec<(usize, usize)> = Vec::new();
        let mut mentions = Vec::new();
        // Earlier patterns win; a clock time inside a full datetime is not reported twice.
        for (regex, parser) in patterns() {
            for caps in regex.captures_iter(text) {
                let Some(whole) = caps.get(0) else { continue };
                let (start, end) = (whole.start(), whole.end());
                if claimed.iter().any(|&(s, e)| start < e && s < end) {
                    continue;
                }
                if let Some(value) = parser(self, &caps) {
                    claimed.push((start, end));
                    mentions.push(TimeMention {
                        offset: start,
                        len: end - start,
                        value,
                    });
                }
            }
        }
        mentions.sort_by_key(|mention| mention.offset);
        mentions
    }
}

impl TimeHint {
    /// Build a hint from the mentions found in a query.
    ///
    /// Dated mentions produce an absolute window; a bare date covers the whole day,
    /// unless the query pairs that single date with clock times. Clock times alone
    /// produce a time-of-day window.
    #[must_use]
    pub fn from_mentions(mentions: &[TimeMention]) -> Option<Self> {
        let mut windows: Vec<(NaiveDateTime, NaiveDateTime)> = Vec::new();
        let mut dates: Vec<NaiveDate> = Vec::new();
        let mut times: Vec<NaiveTime> = Vec::new();
        for mention in mentions {
            match mention.value {
                MentionValue::DateTime(instant) => windows.push((instant, instant)),
                MentionValue::Date(date) => {
                    if !dates.contains(&date) {
                        dates.push(date);
                    }
                }
                MentionValue::TimeOfDay(time) => times.push(time),
            }
        }

        match (dates.as_slice(), times.is_empty()) {
            ([date], false) => {
                windows.extend(times.iter().map(|&time| {
                    let instant = date.and_time(time);
                    (instant, instant)
                }));
            }
            _ => {
                for date in &dates {
                    if let (Some(start), Some(end)) =
                        (date.and_hms_opt(0, 0, 0), date.and_hms_opt(23, 59, 59))
                    {
                        windows.push((start, end));
                    }
                }
            }
        }

        if windows.is_empty() {
            let start = times.iter().min()?;
            let end = times.iter().max()?;
            return Some(Self::time_of_day(*start, *end));
        }
        let start = windows.iter().map(|w| w.0).min()?;
        let end = windows.iter().map(|w| w.1).max()?;
        Some(Self::between(start, end))
    }

    #[must_use]
    pub fn from_query(query: &str, extractor: &dyn TimestampExtractor) -> Option<Self> {
        Self::from_mentions(&extractor.mentions(query))
    }
}

/// Absolute gap between two instants as "D days, H hours, M minutes, S seconds".
#[must_use]
pub fn describe_gap(a: NaiveDateTime, b: NaiveDateTime) -> String {
    let gap: TimeDelta = (b - a).abs();
    let days = gap.num_days();
    let hours = gap.num_hours() % 24;
    let minutes = gap.num_minutes() % 60;
    let seconds = gap.num_seconds() % 60;
    format!("{days} days, {hours} hours, {minutes} minutes, {seconds} seconds")
}
