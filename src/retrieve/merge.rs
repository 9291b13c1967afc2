//! Sibling auto-merge: consecutive small spans of one section collapse into one item.

use std::collections::BTreeMap;

use crate::store::Candidate;
use crate::types::{ChunkRecord, ContextItem};

/// Group candidates by section, split each group into runs of consecutive positions and
/// turn every run into one context item.
///
/// Items come back ordered by score (best member) descending, then section id, then
/// first position. Ranks are left at 0 for the caller to assign.
#[must_use]
pub fn merge_adjacent(candidates: Vec<Candidate<ChunkRecord>>, overlap_fraction: f32) -> Vec<ContextItem> {
    let mut groups: BTreeMap<(String, String), Vec<Candidate<ChunkRecord>>> = BTreeMap::new();
    for candidate in candidates {
        let key = (
            candidate.record.document_id.clone(),
            candidate.record.section_id.clone(),
        );
        groups.entry(key).or_default().push(candidate);
    }

    let mut items = Vec::new();
    for mut group in groups.into_values() {
        group.sort_by(|a, b| {
            a.record
                .position_index
                .cmp(&b.record.position_index)
                .then(b.score.total_cmp(&a.score))
        });
        group.dedup_by(|later, earlier| later.record.position_index == earlier.record.position_index);

        let mut run: Vec<Candidate<ChunkRecord>> = Vec::new();
        for candidate in group {
            let continues = run
                .last()
                .is_some_and(|last| last.record.position_index + 1 == candidate.record.position_index);
            if !continues && !run.is_empty() {
                items.push(merge_run(std::mem::take(&mut run), overlap_fraction));
            }
            run.push(candidate);
        }
        if !run.is_empty() {
            items.push(merge_run(run, overlap_fraction));
        }
    }

    items.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.section_id.cmp(&b.section_id))
            .then_with(|| a.first_position.cmp(&b.first_position))
            .then_with(|| a.document_id.cmp(&b.document_id))
    });
    tracing::debug!(items = items.len(), "merged adjacent spans");
    items
}

fn merge_run(run: Vec<Candidate<ChunkRecord>>, overlap_fraction: f32) -> ContextItem {
    let score = run
        .iter()
        .map(|candidate| candidate.score)
        .fold(f32::NEG_INFINITY, f32::max);
    let earliest = run.iter().filter_map(|c| c.record.timestamp).min();
    let latest = run.iter().filter_map(|c| c.record.timestamp).max();
    let first = &run[0].record;
    let last = &run[run.len() - 1].record;

    let mut text = String::new();
    for candidate in &run {
        append_sibling(&mut text, &candidate.record.text, overlap_fraction > 0.0);
    }

    ContextItem {
        rank: 0,
        span_ids: run.iter().map(|c| c.record.id.clone()).collect(),
        section_id: first.section_id.clone(),
        document_id: first.document_id.clone(),
        first_position: first.position_index,
        last_position: last.position_index,
        text,
        score,
        timestamp: earliest,
        latest_timestamp: latest,
        time_match: false,
        section_match: false,
    }
}

/// Append `next` to `merged`, dropping the text `next` repeats from the end of `merged`.
fn append_sibling(merged: &mut String, next: &str, overlapping: bool) {
    if merged.is_empty() {
        merged.push_str(next);
        return;
    }
    let shared = if overlapping { shared_boundary(merged, next) } else { 0 };
    if shared == 0 {
        merged.push_str("\n\n");
        merged.push_str(next);
    } else {
        merged.push_str(&next[shared..]);
    }
}

/// Length of the longest prefix of `next` that is also a suffix of `prev`, where both
/// ends of the shared text sit on whitespace or a string edge.
fn shared_boundary(prev: &str, next: &str) -> usize {
    let longest = prev.len().min(next.len());
    (1..=longest)
        .rev()
        .find(|&len| {
            let cut = prev.len() - len;
            next.is_char_boundary(len)
                && prev.is_char_boundary(cut)
                && prev[cut..] == next[..len]
                && (cut == 0 || prev[..cut].ends_with(char::is_whitespace))
                && (len == next.len() || next[len..].starts_with(char::is_whitespace))
        })
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SpanLevel;

    fn candidate(section: &str, position: usize, text: &str, score: f32) -> Candidate<ChunkRecord> {
        Candidate {
            record: ChunkRecord {
                id: format!("{section}_small_{position}"),
                level: SpanLevel::Small,
                text: text.into(),
                section_id: section.into(),
                position_index: position,
                parent_id: None,
                timestamp: None,
                document_id: "doc".into(),
                claim_id: "claim".into(),
            },
            score,
        }
    }

    #[test]
    fn consecutive_positions_merge_into_one_item() {
        let items = merge_adjacent(
            vec![
                candidate("s1", 4, "Four. Five", 0.5),
                candidate("s1", 3, "Three. Four.", 0.9),
                candidate("s1", 5, "Five. Six.", 0.4),
            ],
            0.0,
        );
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].span_ids, vec!["s1_small_3", "s1_small_4", "s1_small_5"]);
        assert_eq!((items[0].first_position, items[0].last_position), (3, 5));
        assert!((items[0].score - 0.9).abs() < f32::EPSILON);
    }

    #[test]
    fn gaps_split_runs_and_sections_never_mix() {
        let items = merge_adjacent(
            vec![
                candidate("s1", 3, "a", 0.3),
                candidate("s1", 4, "b", 0.8),
                candidate("s1", 7, "c", 0.6),
                candidate("s2", 5, "d", 0.7),
            ],
            0.2,
        );
        let runs: Vec<Vec<String>> = items.iter().map(|item| item.span_ids.clone()).collect();
        assert_eq!(
            runs,
            vec![
                vec!["s1_small_3".to_string(), "s1_small_4".to_string()],
                vec!["s2_small_5".to_string()],
                vec!["s1_small_7".to_string()],
            ]
        );
    }

    #[test]
    fn overlapping_text_is_not_repeated() {
        let items = merge_adjacent(
            vec![
                candidate("s1", 0, "The van braked. The car hit it.", 0.5),
                candidate("s1", 1, "The car hit it. Both drivers stopped.", 0.5),
            ],
            0.2,
        );
        assert_eq!(
            items[0].text,
            "The van braked. The car hit it. Both drivers stopped."
        );
    }

    #[test]
    fn disjoint_siblings_join_with_blank_line() {
        let items = merge_adjacent(
            vec![
                candidate("s1", 0, "First window.", 0.5),
                candidate("s1", 1, "Second window.", 0.5),
            ],
            0.2,
        );
        assert_eq!(items[0].text, "First window.\n\nSecond window.");
    }
}
