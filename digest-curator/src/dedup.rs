//! Cross-source near-duplicate elimination.
//!
//! A cheap bag-of-words heuristic: it misses rewordings of the same story and can merge
//! distinct stories that share most of their words.

use crate::rss_utils::feed::truncate_chars;
use crate::types::ContentItem;
use std::collections::HashSet;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct DedupConfig {
    pub title_threshold: f64,
    pub body_threshold: f64,
    /// Characters of body compared.
    pub body_prefix_chars: usize,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            title_threshold: 0.7,
            body_threshold: 0.7,
            body_prefix_chars: 200,
        }
    }
}

/// Jaccard similarity of the lower-cased whitespace-separated word sets. Empty text scores 0.
pub fn jaccard_similarity(a: &str, b: &str) -> f64 {
    let words_a = word_set(a);
    let words_b = word_set(b);
    if words_a.is_empty() || words_b.is_empty() {
        return 0.0;
    }
    jaccard(&words_a, &words_b)
}

fn word_set(text: &str) -> HashSet<String> {
    text.split_whitespace().map(str::to_lowercase).collect()
}

fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f64 / union as f64
}

struct Fingerprint {
    title: HashSet<String>,
    body: HashSet<String>,
}

#[derive(Debug, Clone, Default)]
pub struct Deduplicator {
    config: DedupConfig,
}

impl Deduplicator {
    pub fn new(config: DedupConfig) -> Self {
        Self { config }
    }

    fn fingerprint(&self, item: &ContentItem) -> Fingerprint {
        Fingerprint {
            title: word_set(&item.title),
            body: word_set(&truncate_chars(&item.body, self.config.body_prefix_chars)),
        }
    }

    fn is_near_duplicate(&self, candidate: &Fingerprint, kept: &Fingerprint) -> bool {
        let similar = |a: &HashSet<String>, b: &HashSet<String>, threshold: f64| {
            !a.is_empty() && !b.is_empty() && jaccard(a, b) > threshold
        };
        similar(&candidate.title, &kept.title, self.config.title_threshold)
            || similar(&candidate.body, &kept.body, self.config.body_threshold)
    }

    /// Keep each item unless it is near-identical to one already kept. Order is preserved,
    /// so the earliest of a group of duplicates survives.
    pub fn dedupe(&self, items: Vec<ContentItem>) -> Vec<ContentItem> {
        let total = items.len();
        let mut kept: Vec<ContentItem> = Vec::with_capacity(total);
        let mut fingerprints: Vec<Fingerprint> = Vec::with_capacity(total);

        for item in items {
            let fingerprint = self.fingerprint(&item);
            match fingerprints
                .iter()
                .position(|existing| self.is_near_duplicate(&fingerprint, existing))
            {
                Some(idx) => {
                    debug!("Dropping '{}' as near-duplicate of '{}'", item.title, kept[idx].title);
                }
                None => {
                    fingerprints.push(fingerprint);
                    kept.push(item);
                }
            }
        }

        debug!("Deduplicated {} items down to {}", total, kept.len());
        kept
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_text_scores_one() {
        assert_eq!(jaccard_similarity("OpenAI ships GPT", "openai SHIPS gpt"), 1.0);
    }

    #[test]
    fn disjoint_text_scores_zero() {
        assert_eq!(jaccard_similarity("robots learn to walk", "markets fall sharply"), 0.0);
    }

    #[test]
    fn empty_text_scores_zero() {
        assert_eq!(jaccard_similarity("", ""), 0.0);
        assert_eq!(jaccard_similarity("something", "   "), 0.0);
    }

    #[test]
    fn partial_overlap() {
        // {a, b, c} vs {b, c, d}: 2 shared of 4.
        assert_eq!(jaccard_similarity("a b c", "b c d"), 0.5);
    }
}
