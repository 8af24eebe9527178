use crate::config::Vocabulary;
use crate::types::{Category, ContentItem};
use std::collections::BTreeMap;
use tracing::debug;

/// Weights for the additive quality score.
#[derive(Debug, Clone)]
pub struct RankerConfig {
    pub score_divisor: f64,
    pub score_cap: f64,
    pub comment_divisor: f64,
    pub comment_cap: f64,
    pub title_words: (usize, usize),
    pub title_bonus: f64,
    pub body_chars: (usize, usize),
    pub body_bonus: f64,
    pub keyword_bonus: f64,
    pub research_bonus: f64,
    pub reputable_bonus: f64,
    pub ranking_keywords: Vec<String>,
    pub reputable_sources: Vec<String>,
}

impl Default for RankerConfig {
    fn default() -> Self {
        Self::from_vocabulary(&Vocabulary::default())
    }
}

impl RankerConfig {
    pub fn from_vocabulary(vocabulary: &Vocabulary) -> Self {
        Self {
            score_divisor: 10.0,
            score_cap: 50.0,
            comment_divisor: 2.0,
            comment_cap: 25.0,
            title_words: (5, 15),
            title_bonus: 10.0,
            body_chars: (100, 500),
            body_bonus: 15.0,
            keyword_bonus: 5.0,
            research_bonus: 20.0,
            reputable_bonus: 15.0,
            ranking_keywords: vocabulary
                .ranking_keywords
                .iter()
                .map(|k| k.to_lowercase())
                .collect(),
            reputable_sources: vocabulary.reputable_sources.clone(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Ranker {
    config: RankerConfig,
}

impl Ranker {
    pub fn new(config: RankerConfig) -> Self {
        Self { config }
    }

    /// Additive quality score for one item.
    pub fn score(&self, item: &ContentItem) -> f64 {
        let c = &self.config;
        let mut score = 0.0;

        score += (item.engagement_score as f64 / c.score_divisor).min(c.score_cap);
        score += (item.comment_count as f64 / c.comment_divisor).min(c.comment_cap);

        let title_words = item.title.split_whitespace().count();
        if (c.title_words.0..=c.title_words.1).contains(&title_words) {
            score += c.title_bonus;
        }

        let body_len = item.body.chars().count();
        if (c.body_chars.0..=c.body_chars.1).contains(&body_len) {
            score += c.body_bonus;
        }

        let title = item.title.to_lowercase();
        let keyword_hits = c
            .ranking_keywords
            .iter()
            .filter(|k| title.contains(k.as_str()))
            .count();
        score += keyword_hits as f64 * c.keyword_bonus;

        if item.category() == Category::Research {
            score += c.research_bonus;
        }

        if c
            .reputable_sources
            .iter()
            .any(|s| item.source_name.contains(s.as_str()))
        {
            score += c.reputable_bonus;
        }

        score
    }

    /// Highest-scoring `max_items`, ties keeping their input order.
    pub fn prioritize(&self, items: Vec<ContentItem>, max_items: usize) -> Vec<ContentItem> {
        let mut scored: Vec<(f64, ContentItem)> = items
            .into_iter()
            .map(|item| (self.score(&item), item))
            .collect();
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));
        scored.truncate(max_items);
        scored.into_iter().map(|(_, item)| item).collect()
    }

    /// Partition by category and prioritize each bucket against its budget. Categories
    /// without a budget are dropped.
    pub fn select(
        &self,
        items: Vec<ContentItem>,
        budgets: &BTreeMap<Category, usize>,
    ) -> BTreeMap<Category, Vec<ContentItem>> {
        let mut buckets: BTreeMap<Category, Vec<ContentItem>> = BTreeMap::new();
        for item in items {
            buckets.entry(item.category()).or_default().push(item);
        }

        let mut selected = BTreeMap::new();
        for (category, budget) in budgets {
            let bucket = buckets.remove(category).unwrap_or_default();
            let candidates = bucket.len();
            let chosen = self.prioritize(bucket, *budget);
            debug!("{}: selected {} of {}", category, chosen.len(), candidates);
            selected.insert(*category, chosen);
        }
        for (category, dropped) in buckets {
            debug!("{}: no budget, dropping {} items", category, dropped.len());
        }
        selected
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SourceKind;
    use chrono::Utc;

    fn item(category: Category, title: &str) -> ContentItem {
        ContentItem::new(category, SourceKind::Feed, title, "https://x.test/", "Somewhere", Utc::now())
    }

    #[test]
    fn engagement_components_are_capped() {
        let ranker = Ranker::default();
        let base = item(Category::News, "short");
        let loud = base.clone().with_engagement(1000, 500);
        // 1000 / 10 capped at 50, 500 / 2 capped at 25.
        assert_eq!(ranker.score(&loud) - ranker.score(&base), 75.0);
    }

    #[test]
    fn research_and_reputable_bonuses() {
        let ranker = Ranker::default();
        let news = item(Category::News, "short");
        let paper = item(Category::Research, "short");
        assert_eq!(ranker.score(&paper) - ranker.score(&news), 20.0);

        let mut reputable = news.clone();
        reputable.source_name = "Google News".to_string();
        assert_eq!(ranker.score(&reputable) - ranker.score(&news), 15.0);
    }

    #[test]
    fn title_keywords_count_once_each() {
        let ranker = Ranker::default();
        // "ai" and "learning" hit; repeated words do not add more.
        let hits = item(Category::News, "learning learning ai");
        let plain = item(Category::News, "nothing here at all");
        assert_eq!(ranker.score(&hits) - ranker.score(&plain), 10.0);
    }
}
