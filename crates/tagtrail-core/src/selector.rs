//! Best / second-best tag selection at the end of a round.

use crate::aggregator::{RoundCounts, TagCount, TagSet, tag_key};

/// A selected tag and the frequency reported for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagScore {
    pub tag: String,
    pub frequency: usize,
}

/// Outcome of [`select_best_pair`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub best: TagScore,
    pub second: TagScore,
    /// Sum of every count in the round.
    pub total: usize,
}

/// Pick the most and second-most frequent co-occurring tags.
///
/// `current_tag` and anything in `excluded` are never candidates. Ties go to
/// the tag encountered first in the round. When no candidate is left for a
/// slot, that slot falls back to `current_tag` with the round total, so a
/// degenerate round still yields a pair to explore.
#[must_use]
pub fn select_best_pair(counts: &RoundCounts, current_tag: &str, excluded: &TagSet) -> Selection {
    let total = counts.total();
    let current_key = tag_key(current_tag);

    let mut best: Option<&TagCount> = None;
    let mut second: Option<&TagCount> = None;
    for entry in counts.iter() {
        if tag_key(&entry.tag) == current_key || excluded.contains(&entry.tag) {
            continue;
        }
        if best.is_none_or(|b| entry.count > b.count) {
            second = best;
            best = Some(entry);
        } else if second.is_none_or(|s| entry.count > s.count) {
            second = Some(entry);
        }
    }

    let fallback = || TagScore {
        tag: current_tag.to_string(),
        frequency: total,
    };
    let score = |entry: &TagCount| TagScore {
        tag: entry.tag.clone(),
        frequency: entry.count,
    };

    Selection {
        best: best.map_or_else(fallback, score),
        second: second.map_or_else(fallback, score),
        total,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counts(pairs: &[(&str, usize)]) -> RoundCounts {
        pairs.iter().copied().collect()
    }

    #[test]
    fn test_current_tag_is_excluded_even_when_highest() {
        let counts = counts(&[("#a", 5), ("#b", 5), ("#c", 2)]);
        let selection = select_best_pair(&counts, "#a", &TagSet::new());
        assert_eq!(selection.best.tag, "#b");
        assert_eq!(selection.best.frequency, 5);
        assert_eq!(selection.second.tag, "#c");
        assert_eq!(selection.second.frequency, 2);
        assert_eq!(selection.total, 12);
    }

    #[test]
    fn test_empty_round_falls_back_to_current_tag() {
        let selection = select_best_pair(&RoundCounts::new(), "#food", &TagSet::new());
        assert_eq!(
            selection,
            Selection {
                best: TagScore {
                    tag: "#food".into(),
                    frequency: 0
                },
                second: TagScore {
                    tag: "#food".into(),
                    frequency: 0
                },
                total: 0,
            }
        );
    }

    #[test]
    fn test_single_candidate_falls_back_for_second() {
        let counts = counts(&[("#food", 4), ("#pizza", 2)]);
        let selection = select_best_pair(&counts, "#FOOD", &TagSet::new());
        assert_eq!(selection.best.tag, "#pizza");
        assert_eq!(selection.second.tag, "#FOOD");
        assert_eq!(selection.second.frequency, 6);
    }

    #[test]
    fn test_excluded_tags_are_never_candidates() {
        let counts = counts(&[("#x", 10), ("#y", 7), ("#z", 1)]);
        let excluded: TagSet = ["#X", "#y"].into_iter().collect();
        let selection = select_best_pair(&counts, "#root", &excluded);
        assert_eq!(selection.best.tag, "#z");
        assert_eq!(selection.second.tag, "#root");
        assert_eq!(selection.second.frequency, 18);
    }

    #[test]
    fn test_tie_goes_to_first_encountered() {
        let counts = counts(&[("#late", 1), ("#p", 3), ("#q", 3)]);
        let selection = select_best_pair(&counts, "#root", &TagSet::new());
        assert_eq!(selection.best.tag, "#p");
        assert_eq!(selection.second.tag, "#q");
    }

    #[test]
    fn test_second_tracks_displaced_best() {
        let counts = counts(&[("#a", 1), ("#b", 2), ("#c", 3)]);
        let selection = select_best_pair(&counts, "#root", &TagSet::new());
        assert_eq!(selection.best.tag, "#c");
        assert_eq!(selection.second.tag, "#b");
    }
}
