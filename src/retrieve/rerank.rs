//! Stable reordering by time and section relevance.

use chrono::TimeDelta;

use crate::types::{ContextItem, TimeHint};

/// Move items satisfying `matches` to the front, keeping relative order on both sides.
pub(crate) fn stable_partition<T>(items: Vec<T>, matches: impl Fn(&T) -> bool) -> Vec<T> {
    let (mut front, back): (Vec<T>, Vec<T>) = items.into_iter().partition(|item| matches(item));
    front.extend(back);
    front
}

/// Put the items of `section_id` first and flag them.
#[must_use]
pub fn promote_section(items: Vec<ContextItem>, section_id: &str) -> Vec<ContextItem> {
    let items = items
        .into_iter()
        .map(|mut item| {
            item.section_match = item.section_id == section_id;
            item
        })
        .collect();
    stable_partition(items, |item| item.section_match)
}

/// Boost items whose timestamps touch `hint` widened by `tolerance`.
///
/// A boosted item is placed ahead of every unboosted item scoring at most
/// `margin` above it. Unboosted items keep their relative order; boosted items are
/// ordered by score, best first. `items` must already be sorted by score.
#[must_use]
pub fn promote_time_matches(
    items: Vec<ContextItem>,
    hint: &TimeHint,
    tolerance: TimeDelta,
    margin: f32,
) -> Vec<ContextItem> {
    let (mut boosted, rest): (Vec<ContextItem>, Vec<ContextItem>) = items
        .into_iter()
        .map(|mut item| {
            item.time_match = match (item.timestamp, item.latest_timestamp) {
                (Some(earliest), Some(latest)) => hint.overlaps(earliest, latest, tolerance),
                (Some(instant), None) | (None, Some(instant)) => hint.matches(instant, tolerance),
                (None, None) => false,
            };
            item
        })
        .partition(|item| item.time_match);
    if boosted.is_empty() {
        return rest;
    }
    boosted.sort_by(|a, b| b.score.total_cmp(&a.score));
    tracing::debug!(boosted = boosted.len(), "time hint promoted items");

    let mut out = Vec::with_capacity(boosted.len() + rest.len());
    let mut boosted = boosted.into_iter().peekable();
    let mut rest = rest.into_iter().peekable();
    loop {
        let take_boosted = match (boosted.peek(), rest.peek()) {
            (Some(b), Some(r)) => b.score + margin >= r.score,
            (Some(_), None) => true,
            (None, Some(_)) => false,
            (None, None) => break,
        };
        let next = if take_boosted { boosted.next() } else { rest.next() };
        out.extend(next);
    }
    out
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, NaiveDateTime};

    use super::*;

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 3, 3)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn item(section: &str, position: usize, score: f32, timestamp: Option<NaiveDateTime>) -> ContextItem {
        ContextItem {
            rank: 0,
            span_ids: vec![format!("{section}_small_{position}")],
            section_id: section.into(),
            document_id: "doc".into(),
            first_position: position,
            last_position: position,
            text: String::new(),
            score,
            timestamp,
            latest_timestamp: timestamp,
            time_match: false,
            section_match: false,
        }
    }

    fn order(items: &[ContextItem]) -> Vec<String> {
        items.iter().map(|item| item.span_ids[0].clone()).collect()
    }

    #[test]
    fn equal_scores_put_time_match_first() {
        let items = vec![
            item("s1", 0, 0.5, Some(at(7, 0))),
            item("s1", 5, 0.5, Some(at(8, 11))),
        ];
        let out = promote_time_matches(items, &TimeHint::at(at(8, 11)), TimeDelta::zero(), 0.0);
        assert_eq!(order(&out), vec!["s1_small_5", "s1_small_0"]);
        assert!(out[0].time_match);
    }

    #[test]
    fn boost_does_not_jump_clearly_better_items_without_margin() {
        let items = vec![
            item("s1", 0, 0.9, None),
            item("s1", 2, 0.6, None),
            item("s1", 4, 0.5, Some(at(8, 11))),
        ];
        let hint = TimeHint::at(at(8, 11));
        let out = promote_time_matches(items.clone(), &hint, TimeDelta::zero(), 0.0);
        assert_eq!(order(&out), vec!["s1_small_0", "s1_small_2", "s1_small_4"]);
        let out = promote_time_matches(items, &hint, TimeDelta::zero(), 0.15);
        assert_eq!(order(&out), vec!["s1_small_0", "s1_small_4", "s1_small_2"]);
    }

    #[test]
    fn section_promotion_is_stable() {
        let items = vec![
            item("s1", 0, 0.9, None),
            item("s2", 0, 0.8, None),
            item("s1", 3, 0.7, None),
            item("s2", 4, 0.6, None),
        ];
        let out = promote_section(items, "s2");
        assert_eq!(
            order(&out),
            vec!["s2_small_0", "s2_small_4", "s1_small_0", "s1_small_3"]
        );
        assert!(out[0].section_match && !out[2].section_match);
    }
}
