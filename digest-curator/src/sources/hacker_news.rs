use crate::config::CuratorConfig;
use crate::fetcher::HttpRequest;
use crate::relevance::{is_within_window, parse_timestamp, RawTimestamp, RelevanceFilter};
use crate::rss_utils::feed::{extract_text_from_html, truncate_chars};
use crate::sources::feed::LinkResolver;
use crate::traits::{FetchContext, HttpTransport, SourceFetcher};
use crate::types::{Category, ContentItem, FetchBatch, Result, SourceKind};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

const API_BASE: &str = "https://hacker-news.firebaseio.com/v0";

#[derive(Debug, Deserialize)]
struct Story {
    id: u64,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    by: Option<String>,
    #[serde(default)]
    score: i64,
    #[serde(default)]
    descendants: i64,
    #[serde(default)]
    time: Option<RawTimestamp>,
}

/// Outcome of checking one story. Only `Malformed` counts as skipped.
enum StoryVerdict {
    Qualified(ContentItem),
    Rejected,
    Malformed,
}

/// Top stories from the Hacker News API that are recent and on topic.
pub struct HackerNewsSource {
    transport: Arc<dyn HttpTransport>,
    filter: RelevanceFilter,
    resolver: LinkResolver,
    category: Category,
    story_limit: usize,
    window: chrono::Duration,
    body_chars: usize,
    pause: Duration,
    story_timeout: Duration,
}

impl HackerNewsSource {
    pub fn new(transport: Arc<dyn HttpTransport>, config: &CuratorConfig) -> Self {
        Self {
            resolver: LinkResolver::new(transport.clone()),
            transport,
            filter: RelevanceFilter::new(&config.vocabulary),
            category: Category::NewsDiscovery,
            story_limit: 30,
            window: chrono::Duration::days(1),
            body_chars: 300,
            pause: Duration::from_millis(100),
            story_timeout: Duration::from_secs(5),
        }
    }

    pub fn with_story_limit(mut self, limit: usize) -> Self {
        self.story_limit = limit;
        self
    }

    pub fn with_pause(mut self, pause: Duration) -> Self {
        self.pause = pause;
        self
    }

    async fn fetch_story(&self, id: u64) -> Result<Story> {
        let request = HttpRequest::get(format!("{}/item/{}.json", API_BASE, id))
            .timeout(self.story_timeout);
        let response = self.transport.send(request).await?.error_for_status()?;
        response.json()
    }

    async fn judge(&self, story: Story, ctx: &FetchContext) -> StoryVerdict {
        let title = match story
            .title
            .map(|t| extract_text_from_html(&t))
            .filter(|t| !t.is_empty())
        {
            Some(title) => title,
            None => return StoryVerdict::Malformed,
        };
        let published_at = match story.time.as_ref().and_then(parse_timestamp) {
            Some(ts) => ts,
            None => return StoryVerdict::Malformed,
        };

        if !is_within_window(published_at, ctx.now, self.window) {
            return StoryVerdict::Rejected;
        }

        let text = story
            .text
            .map(|t| extract_text_from_html(&t))
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| title.clone());
        if !self.filter.is_topic_relevant(&title, &text) {
            return StoryVerdict::Rejected;
        }

        // Ask/Show posts have no external link.
        let link = match story.url.filter(|u| !u.trim().is_empty()) {
            Some(url) => self.resolver.resolve(&url).await,
            None => format!("https://news.ycombinator.com/item?id={}", story.id),
        };
        let tags = self.filter.extract_tags(&format!("{} {}", title, text));

        StoryVerdict::Qualified(
            ContentItem::new(
                self.category,
                SourceKind::Discovery,
                title,
                link,
                "HackerNews",
                published_at,
            )
            .with_body(truncate_chars(&text, self.body_chars))
            .with_engagement(story.score, story.descendants)
            .with_author(story.by.unwrap_or_else(|| "unknown".to_string()))
            .with_tags(tags),
        )
    }
}

#[async_trait]
impl SourceFetcher for HackerNewsSource {
    fn source_name(&self) -> String {
        "HackerNews".to_string()
    }

    fn source_kind(&self) -> SourceKind {
        SourceKind::Discovery
    }

    fn category(&self) -> Category {
        self.category
    }

    async fn fetch(&self, ctx: &FetchContext) -> Result<FetchBatch> {
        let request = HttpRequest::get(format!("{}/topstories.json", API_BASE));
        let response = self.transport.send(request).await?.error_for_status()?;
        let ids: Vec<u64> = response.json()?;

        let mut items = Vec::new();
        let mut seen = HashSet::new();
        let mut skipped = 0;

        for (idx, id) in ids.into_iter().take(self.story_limit).enumerate() {
            if ctx.is_expired() {
                warn!("HackerNews: deadline reached after {} stories", idx);
                break;
            }
            if idx > 0 && !self.pause.is_zero() {
                tokio::time::sleep(self.pause).await;
            }

            let story = match self.fetch_story(id).await {
                Ok(story) => story,
                Err(e) => {
                    debug!("HackerNews: skipping story {}: {}", id, e);
                    skipped += 1;
                    continue;
                }
            };

            match self.judge(story, ctx).await {
                StoryVerdict::Qualified(item) => {
                    if seen.insert(item.url.clone()) {
                        items.push(item);
                    }
                }
                StoryVerdict::Rejected => {}
                StoryVerdict::Malformed => skipped += 1,
            }
        }

        info!("HackerNews: {} items ({} skipped)", items.len(), skipped);
        Ok(FetchBatch::new(items).with_skipped(skipped))
    }
}
