use crate::config::CuratorConfig;
use crate::fetcher::HttpRequest;
use crate::sources::feed::{google_news_search_url, FeedSettings, FeedSource, RelevanceMode};
use crate::traits::{FetchContext, HttpTransport, SourceFetcher};
use crate::types::{
    Category, ContentItem, CuratorError, FetchBatch, Result, SourceDescriptor, SourceKind,
};
use async_trait::async_trait;
use futures::future::join_all;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

const CURATED_NEWS_FEEDS: [(&str, &str); 5] = [
    ("TechCrunch AI", "https://techcrunch.com/category/artificial-intelligence/feed/"),
    ("The Verge AI", "https://www.theverge.com/ai-artificial-intelligence/rss/index.xml"),
    ("Ars Technica AI", "https://feeds.arstechnica.com/arstechnica/technology-lab"),
    ("Wired AI", "https://www.wired.com/feed/category/business/artificial-intelligence/latest/rss"),
    ("AI News", "https://www.artificialintelligence-news.com/feed/"),
];

/// A way of finding feed endpoints at run time.
#[async_trait]
pub trait DiscoveryStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    async fn discover(
        &self,
        transport: &dyn HttpTransport,
        ctx: &FetchContext,
    ) -> Result<Vec<SourceDescriptor>>;
}

/// Curated seed feeds, each checked live with a short GET.
pub struct CuratedSeeds {
    seeds: Vec<SourceDescriptor>,
    timeout: Duration,
}

impl CuratedSeeds {
    pub fn new(seeds: Vec<SourceDescriptor>) -> Self {
        Self {
            seeds,
            timeout: Duration::from_secs(5),
        }
    }

    pub fn curated_news() -> Vec<SourceDescriptor> {
        CURATED_NEWS_FEEDS
            .iter()
            .map(|(name, url)| SourceDescriptor::new(*name, *url, SourceKind::Feed))
            .collect()
    }
}

#[async_trait]
impl DiscoveryStrategy for CuratedSeeds {
    fn name(&self) -> &'static str {
        "curated-seeds"
    }

    async fn discover(
        &self,
        transport: &dyn HttpTransport,
        _ctx: &FetchContext,
    ) -> Result<Vec<SourceDescriptor>> {
        let checks = self.seeds.iter().map(|seed| async move {
            let request = HttpRequest::get(&seed.endpoint).timeout(self.timeout);
            match transport.send(request).await {
                Ok(response) if response.is_success() => {
                    info!("{} reachable", seed.name);
                    Some(seed.clone())
                }
                Ok(response) => {
                    warn!("{} not accessible (HTTP {})", seed.name, response.status);
                    None
                }
                Err(e) => {
                    warn!("{} reachability check failed: {}", seed.name, e);
                    None
                }
            }
        });

        Ok(join_all(checks).await.into_iter().flatten().collect())
    }
}

/// Search-feed endpoints generated from query terms. Needs no reachability check.
pub struct QueryFeeds {
    queries: Vec<(String, String)>,
}

impl QueryFeeds {
    /// `queries` pairs a display name with its search term.
    pub fn new(queries: Vec<(String, String)>) -> Self {
        Self { queries }
    }
}

impl Default for QueryFeeds {
    fn default() -> Self {
        Self::new(vec![
            ("Google News AI".to_string(), "artificial intelligence".to_string()),
            ("Google News ML".to_string(), "machine learning".to_string()),
        ])
    }
}

#[async_trait]
impl DiscoveryStrategy for QueryFeeds {
    fn name(&self) -> &'static str {
        "query-feeds"
    }

    async fn discover(
        &self,
        _transport: &dyn HttpTransport,
        _ctx: &FetchContext,
    ) -> Result<Vec<SourceDescriptor>> {
        self.queries
            .iter()
            .map(|(name, term)| -> Result<SourceDescriptor> {
                Ok(SourceDescriptor::new(
                    name.clone(),
                    google_news_search_url(term)?,
                    SourceKind::Discovery,
                ))
            })
            .collect()
    }
}

/// Finds feeds at run time, then reads them all in parallel.
pub struct DiscoverySource {
    name: String,
    category: Category,
    strategies: Vec<Box<dyn DiscoveryStrategy>>,
    fallback_seeds: Vec<SourceDescriptor>,
    transport: Arc<dyn HttpTransport>,
    config: CuratorConfig,
    feed_settings: FeedSettings,
    max_sources: usize,
    max_items: usize,
    supplement: Option<FeedSource>,
    min_yield: usize,
}

impl DiscoverySource {
    pub fn new(
        name: impl Into<String>,
        category: Category,
        transport: Arc<dyn HttpTransport>,
        config: &CuratorConfig,
    ) -> Self {
        Self {
            name: name.into(),
            category,
            strategies: Vec::new(),
            fallback_seeds: Vec::new(),
            transport,
            config: config.clone(),
            feed_settings: FeedSettings {
                entries_per_endpoint: 5,
                window: chrono::Duration::days(3),
                body_chars: 400,
                max_items: 5,
                relevance: RelevanceMode::Topic,
                endpoint_pause: Duration::ZERO,
                max_authors: 1,
                request_timeout: None,
            },
            max_sources: 15,
            max_items: 15,
            supplement: None,
            min_yield: 5,
        }
    }

    pub fn with_strategy(mut self, strategy: Box<dyn DiscoveryStrategy>) -> Self {
        self.strategies.push(strategy);
        self
    }

    /// Seeds used unchecked when every strategy comes back empty.
    pub fn with_fallback_seeds(mut self, seeds: Vec<SourceDescriptor>) -> Self {
        self.fallback_seeds = seeds;
        self
    }

    pub fn with_feed_settings(mut self, settings: FeedSettings) -> Self {
        self.feed_settings = settings;
        self
    }

    pub fn with_max_items(mut self, max_items: usize) -> Self {
        self.max_items = max_items;
        self
    }

    /// Feed read when discovered sources yield fewer than `min_yield` items.
    pub fn with_supplement(mut self, supplement: FeedSource, min_yield: usize) -> Self {
        self.supplement = Some(supplement);
        self.min_yield = min_yield;
        self
    }

    /// Reachable curated outlets plus Google News topic searches, topped up from the
    /// news-term searches on a thin day.
    pub fn news(transport: Arc<dyn HttpTransport>, config: &CuratorConfig) -> Self {
        let seeds = CuratedSeeds::curated_news();
        let source = Self::new("AI news discovery", Category::News, transport.clone(), config)
            .with_strategy(Box::new(CuratedSeeds::new(seeds.clone())))
            .with_strategy(Box::new(QueryFeeds::default()))
            .with_fallback_seeds(seeds);
        match FeedSource::news_search(Category::News, transport, config) {
            Ok(search) => source.with_supplement(search, 5),
            Err(e) => {
                warn!("AI news discovery: no supplementary search: {}", e);
                source
            }
        }
    }

    pub fn has_supplement(&self) -> bool {
        self.supplement.is_some()
    }

    async fn discover_sources(&self, ctx: &FetchContext) -> (Vec<SourceDescriptor>, Option<String>) {
        let mut descriptors = Vec::new();
        for strategy in &self.strategies {
            if ctx.is_expired() {
                break;
            }
            match strategy.discover(self.transport.as_ref(), ctx).await {
                Ok(found) => {
                    info!("{}: {} found {} sources", self.name, strategy.name(), found.len());
                    descriptors.extend(found);
                }
                Err(e) => warn!("{}: {} failed: {}", self.name, strategy.name(), e),
            }
        }

        let mut degraded = None;
        if descriptors.is_empty() {
            warn!("{}: discovery found nothing, using seed list", self.name);
            descriptors = self.fallback_seeds.clone();
            degraded = Some("discovery failed, using unchecked seed list".to_string());
        }

        let mut names = HashSet::new();
        descriptors.retain(|d| names.insert(d.name.clone()));
        descriptors.truncate(self.max_sources);
        (descriptors, degraded)
    }
}

#[async_trait]
impl SourceFetcher for DiscoverySource {
    fn source_name(&self) -> String {
        self.name.clone()
    }

    fn source_kind(&self) -> SourceKind {
        SourceKind::Discovery
    }

    fn category(&self) -> Category {
        self.category
    }

    async fn fetch(&self, ctx: &FetchContext) -> Result<FetchBatch> {
        let (descriptors, degraded) = self.discover_sources(ctx).await;
        if descriptors.is_empty() {
            return Err(CuratorError::General(format!(
                "{} has no sources to read",
                self.name
            )));
        }

        let sources: Vec<FeedSource> = descriptors
            .into_iter()
            .map(|descriptor| {
                FeedSource::new(
                    descriptor.name.clone(),
                    self.category,
                    vec![descriptor],
                    self.transport.clone(),
                    &self.config,
                )
                .with_kind(SourceKind::Discovery)
                .with_settings(self.feed_settings.clone())
            })
            .collect();

        let results = join_all(sources.iter().map(|source| source.fetch(ctx))).await;

        let mut items: Vec<ContentItem> = Vec::new();
        let mut seen = HashSet::new();
        let mut skipped = 0;
        let mut failures = 0;
        for (source, result) in sources.iter().zip(results) {
            match result {
                Ok(batch) => {
                    skipped += batch.skipped;
                    items.extend(batch.items.into_iter().filter(|i| seen.insert(i.url.clone())));
                }
                Err(e) => {
                    failures += 1;
                    warn!("{}: {} failed: {}", self.name, source.source_name(), e);
                }
            }
        }

        let mut supplemented = false;
        if let Some(supplement) = self.supplement.as_ref() {
            if items.len() < self.min_yield && !ctx.is_expired() {
                info!("{}: only {} items, adding {}", self.name, items.len(), supplement.source_name());
                match supplement.fetch(ctx).await {
                    Ok(batch) => {
                        supplemented = true;
                        skipped += batch.skipped;
                        items.extend(batch.items.into_iter().filter(|i| seen.insert(i.url.clone())));
                    }
                    Err(e) => warn!("{}: supplement failed: {}", self.name, e),
                }
            }
        }

        if failures == sources.len() && !supplemented {
            return Err(CuratorError::Transient(format!(
                "all {} discovered sources failed",
                failures
            )));
        }

        items.sort_by(|a, b| {
            b.keyword_tags
                .len()
                .cmp(&a.keyword_tags.len())
                .then_with(|| b.published_at.cmp(&a.published_at))
        });
        items.truncate(self.max_items);
        info!("{}: {} items from {} sources", self.name, items.len(), sources.len());

        let batch = FetchBatch::new(items).with_skipped(skipped);
        Ok(match degraded {
            Some(reason) => batch.degraded(reason),
            None => batch,
        })
    }
}
