//! Round aggregation: tokenizing stream items and counting tags.

use std::collections::{HashMap, HashSet};

use crate::TAG_MARKER;

/// Case-insensitive identity key for a tag.
#[must_use]
pub fn tag_key(tag: &str) -> String {
    tag.to_lowercase()
}

/// Whether `token` is a tag: exactly one leading marker followed by at least
/// one non-marker character.
#[must_use]
pub fn is_tag(token: &str) -> bool {
    let mut chars = token.chars();
    chars.next() == Some(TAG_MARKER) && chars.next().is_some_and(|c| c != TAG_MARKER)
}

/// Every tag token in `text`, in order of appearance.
pub fn extract_tags(text: &str) -> impl Iterator<Item = &str> {
    text.split_whitespace().filter(|token| is_tag(token))
}

/// A tag and how often it was seen in a round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagCount {
    /// Spelling of the first occurrence.
    pub tag: String,
    pub count: usize,
}

/// Per-round tag counts.
///
/// Keys are case-insensitive; the display spelling is the one seen first.
/// Iteration follows first-encountered order, which is what the selector's
/// tie-break relies on.
#[derive(Debug, Clone, Default)]
pub struct RoundCounts {
    entries: Vec<TagCount>,
    index: HashMap<String, usize>,
    items: usize,
}

impl RoundCounts {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `by` occurrences of `tag`.
    pub fn add(&mut self, tag: &str, by: usize) {
        let key = tag_key(tag);
        if let Some(&slot) = self.index.get(&key) {
            self.entries[slot].count += by;
        } else {
            self.index.insert(key, self.entries.len());
            self.entries.push(TagCount {
                tag: tag.to_string(),
                count: by,
            });
        }
    }

    /// Count for `tag` (case-insensitive), zero if never seen.
    #[must_use]
    pub fn get(&self, tag: &str) -> usize {
        self.index
            .get(&tag_key(tag))
            .map_or(0, |&slot| self.entries[slot].count)
    }

    /// Entries in first-encountered order.
    pub fn iter(&self) -> impl Iterator<Item = &TagCount> {
        self.entries.iter()
    }

    /// Sum of all tag counts.
    #[must_use]
    pub fn total(&self) -> usize {
        self.entries.iter().map(|entry| entry.count).sum()
    }

    /// Number of distinct tags.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of stream items observed, including ones without tags.
    #[must_use]
    pub const fn items(&self) -> usize {
        self.items
    }
}

impl<'a> FromIterator<(&'a str, usize)> for RoundCounts {
    fn from_iter<I: IntoIterator<Item = (&'a str, usize)>>(iter: I) -> Self {
        let mut counts = Self::new();
        for (tag, count) in iter {
            counts.add(tag, count);
        }
        counts
    }
}

/// Accumulates the counts of one round.
#[derive(Debug, Default)]
pub struct RoundAggregator {
    counts: RoundCounts,
}

impl RoundAggregator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Tokenize one item and count its tags. Never fails.
    pub fn observe(&mut self, text: &str) {
        self.counts.items += 1;
        for tag in extract_tags(text) {
            self.counts.add(tag, 1);
        }
    }

    /// Items observed so far.
    #[must_use]
    pub const fn items(&self) -> usize {
        self.counts.items
    }

    #[must_use]
    pub const fn counts(&self) -> &RoundCounts {
        &self.counts
    }

    /// Finish the round.
    #[must_use]
    pub fn into_counts(self) -> RoundCounts {
        self.counts
    }
}

/// Set of tags compared case-insensitively.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagSet {
    keys: HashSet<String>,
}

impl TagSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `tag`; returns false if it was already present.
    pub fn insert(&mut self, tag: &str) -> bool {
        self.keys.insert(tag_key(tag))
    }

    #[must_use]
    pub fn contains(&self, tag: &str) -> bool {
        self.keys.contains(&tag_key(tag))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl<'a> FromIterator<&'a str> for TagSet {
    fn from_iter<I: IntoIterator<Item = &'a str>>(iter: I) -> Self {
        let mut set = Self::new();
        for tag in iter {
            set.insert(tag);
        }
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_observe_counts_tags_across_items() {
        let mut aggregator = RoundAggregator::new();
        aggregator.observe("hello #a world");
        aggregator.observe("#a #b");
        aggregator.observe("no tags here");

        let counts = aggregator.into_counts();
        assert_eq!(counts.get("#a"), 2);
        assert_eq!(counts.get("#b"), 1);
        assert_eq!(counts.len(), 2);
        assert_eq!(counts.total(), 3);
        assert_eq!(counts.items(), 3);
    }

    #[test]
    fn test_empty_text_is_an_item_without_tags() {
        let mut aggregator = RoundAggregator::new();
        aggregator.observe("");
        aggregator.observe("   \t\n");
        assert_eq!(aggregator.items(), 2);
        assert!(aggregator.counts().is_empty());
    }

    #[test]
    fn test_counts_are_case_insensitive_and_keep_first_spelling() {
        let mut aggregator = RoundAggregator::new();
        aggregator.observe("#Rust is great #rust #RUST");
        let counts = aggregator.into_counts();
        assert_eq!(counts.len(), 1);
        let entry = counts.iter().next().unwrap();
        assert_eq!(entry.tag, "#Rust");
        assert_eq!(entry.count, 3);
    }

    #[test]
    fn test_is_tag() {
        assert!(is_tag("#a"));
        assert!(is_tag("#food"));
        assert!(!is_tag("#"));
        assert!(!is_tag("##double"));
        assert!(!is_tag("food#"));
        assert!(!is_tag(""));
    }

    #[test]
    fn test_splits_on_any_whitespace() {
        let tags: Vec<_> = extract_tags("#a\t#b\n#c  plain").collect();
        assert_eq!(tags, vec!["#a", "#b", "#c"]);
    }

    #[test]
    fn test_first_encountered_order() {
        let counts: RoundCounts = [("#z", 1), ("#a", 4), ("#Z", 2)].into_iter().collect();
        let order: Vec<_> = counts.iter().map(|e| (e.tag.as_str(), e.count)).collect();
        assert_eq!(order, vec![("#z", 3), ("#a", 4)]);
    }

    #[test]
    fn test_tag_set_is_case_insensitive() {
        let set: TagSet = ["#Food", "#drink"].into_iter().collect();
        assert!(set.contains("#food"));
        assert!(set.contains("#DRINK"));
        assert!(!set.contains("#snack"));
        assert_eq!(set.len(), 2);
    }
}
