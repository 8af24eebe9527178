use crate::config::CuratorConfig;
use crate::fetcher::HttpRequest;
use crate::parser::FeedParser;
use crate::relevance::{is_within_window, RelevanceFilter};
use crate::rss_utils::feed::{extract_text_from_html, truncate_chars};
use crate::rss_utils::url::{embedded_target, is_redirect_link, is_valid_http_url};
use crate::traits::{FetchContext, HttpTransport, SourceFetcher};
use crate::types::{
    Category, ContentItem, CuratorError, FetchBatch, Result, SourceDescriptor, SourceKind,
};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

const ARXIV_API: &str = "http://export.arxiv.org/api/query";
const ARXIV_CATEGORIES: [&str; 7] = ["cs.AI", "cs.LG", "cs.CL", "cs.CV", "cs.RO", "cs.NE", "stat.ML"];
const GOOGLE_NEWS_SEARCH: &str = "https://news.google.com/rss/search";

/// Build a Google News RSS search URL for `query`.
pub fn google_news_search_url(query: &str) -> Result<String> {
    let url = Url::parse_with_params(
        GOOGLE_NEWS_SEARCH,
        &[("q", query), ("hl", "en-US"), ("gl", "US"), ("ceid", "US:en")],
    )?;
    Ok(url.to_string())
}

/// Best-effort rewriting of aggregator redirect links to the article they point at.
pub struct LinkResolver {
    transport: Arc<dyn HttpTransport>,
    redirect_hosts: Vec<String>,
    timeout: Duration,
}

impl LinkResolver {
    pub fn new(transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            transport,
            redirect_hosts: vec!["news.google.com".to_string()],
            timeout: Duration::from_secs(5),
        }
    }

    pub fn with_redirect_hosts(mut self, hosts: Vec<String>) -> Self {
        self.redirect_hosts = hosts;
        self
    }

    /// Resolve `link`; any failure keeps the original.
    pub async fn resolve(&self, link: &str) -> String {
        if !is_redirect_link(link, &self.redirect_hosts) {
            return link.to_string();
        }
        if let Some(target) = embedded_target(link) {
            return target;
        }

        let request = HttpRequest::head(link).timeout(self.timeout);
        match self.transport.send(request).await {
            Ok(response) if response.is_success() && is_valid_http_url(&response.final_url) => {
                debug!("Resolved {} -> {}", link, response.final_url);
                response.final_url
            }
            Ok(response) => {
                debug!("Could not resolve {} (HTTP {})", link, response.status);
                link.to_string()
            }
            Err(e) => {
                debug!("Could not resolve {}: {}", link, e);
                link.to_string()
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelevanceMode {
    /// Any topic keyword.
    Topic,
    /// Weighted core/supporting score with exclusions.
    HighConfidence,
}

#[derive(Debug, Clone)]
pub struct FeedSettings {
    pub entries_per_endpoint: usize,
    pub window: chrono::Duration,
    pub body_chars: usize,
    pub max_items: usize,
    pub relevance: RelevanceMode,
    /// Pause between sequential endpoint requests.
    pub endpoint_pause: Duration,
    pub max_authors: usize,
    pub request_timeout: Option<Duration>,
}

impl Default for FeedSettings {
    fn default() -> Self {
        Self {
            entries_per_endpoint: 5,
            window: chrono::Duration::days(3),
            body_chars: 400,
            max_items: 15,
            relevance: RelevanceMode::Topic,
            endpoint_pause: Duration::ZERO,
            max_authors: 3,
            request_timeout: None,
        }
    }
}

/// Structured-feed fetcher over one or more endpoints.
pub struct FeedSource {
    name: String,
    category: Category,
    kind: SourceKind,
    endpoints: Vec<SourceDescriptor>,
    settings: FeedSettings,
    transport: Arc<dyn HttpTransport>,
    filter: RelevanceFilter,
    resolver: LinkResolver,
}

impl FeedSource {
    pub fn new(
        name: impl Into<String>,
        category: Category,
        endpoints: Vec<SourceDescriptor>,
        transport: Arc<dyn HttpTransport>,
        config: &CuratorConfig,
    ) -> Self {
        Self {
            name: name.into(),
            category,
            kind: SourceKind::Feed,
            endpoints,
            settings: FeedSettings::default(),
            resolver: LinkResolver::new(transport.clone()),
            transport,
            filter: RelevanceFilter::new(&config.vocabulary),
        }
    }

    pub fn with_settings(mut self, settings: FeedSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_kind(mut self, kind: SourceKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_resolver(mut self, resolver: LinkResolver) -> Self {
        self.resolver = resolver;
        self
    }

    /// Recent papers across the arXiv AI categories, strict relevance.
    pub fn research(transport: Arc<dyn HttpTransport>, config: &CuratorConfig) -> Result<Self> {
        let endpoints = ARXIV_CATEGORIES
            .iter()
            .map(|category| -> Result<SourceDescriptor> {
                let search = format!("cat:{}", category);
                let url = Url::parse_with_params(
                    ARXIV_API,
                    &[
                        ("search_query", search.as_str()),
                        ("sortBy", "submittedDate"),
                        ("sortOrder", "descending"),
                        ("max_results", "30"),
                    ],
                )?;
                Ok(SourceDescriptor::new("arXiv", url.to_string(), SourceKind::Feed))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self::new("arXiv", Category::Research, endpoints, transport, config)
            .with_settings(FeedSettings {
                entries_per_endpoint: 30,
                window: chrono::Duration::days(3),
                body_chars: 1000,
                max_items: 10,
                relevance: RelevanceMode::HighConfidence,
                endpoint_pause: Duration::from_millis(500),
                max_authors: 3,
                request_timeout: None,
            }))
    }

    /// Google News search feeds for each configured news term, last day only.
    pub fn news_queries(transport: Arc<dyn HttpTransport>, config: &CuratorConfig) -> Result<Self> {
        Self::news_search(Category::NewsDiscovery, transport, config)
    }

    /// The Google News term searches, reporting into `category`.
    pub fn news_search(
        category: Category,
        transport: Arc<dyn HttpTransport>,
        config: &CuratorConfig,
    ) -> Result<Self> {
        let endpoints = config
            .vocabulary
            .news_terms
            .iter()
            .map(|term| -> Result<SourceDescriptor> {
                Ok(SourceDescriptor::new(
                    "Google News",
                    google_news_search_url(term)?,
                    SourceKind::Discovery,
                ))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self::new("Google News", category, endpoints, transport, config)
            .with_kind(SourceKind::Discovery)
            .with_settings(FeedSettings {
                entries_per_endpoint: 5,
                window: chrono::Duration::days(1),
                body_chars: 300,
                max_items: 15,
                relevance: RelevanceMode::Topic,
                endpoint_pause: Duration::from_millis(300),
                max_authors: 1,
                request_timeout: Some(Duration::from_secs(10)),
            }))
    }

    pub fn endpoints(&self) -> &[SourceDescriptor] {
        &self.endpoints
    }

    fn is_relevant(&self, title: &str, body: &str) -> bool {
        match self.settings.relevance {
            RelevanceMode::Topic => self.filter.is_topic_relevant(title, body),
            RelevanceMode::HighConfidence => self.filter.is_high_confidence_relevant(title, body),
        }
    }

    async fn fetch_endpoint(
        &self,
        endpoint: &SourceDescriptor,
        parser: &mut FeedParser,
        seen_links: &mut HashSet<String>,
        ctx: &FetchContext,
    ) -> Result<(Vec<ContentItem>, usize)> {
        let mut request = HttpRequest::get(&endpoint.endpoint);
        if let Some(timeout) = self.settings.request_timeout {
            request = request.timeout(timeout);
        }
        let response = self.transport.send(request).await?.error_for_status()?;
        let parsed = parser.parse_feed(&response.body, self.settings.entries_per_endpoint)?;

        let mut skipped = parsed.skipped;
        let mut items = Vec::new();
        for entry in parsed.entries {
            if !is_within_window(entry.published_at, ctx.now, self.settings.window) {
                continue;
            }

            let title = extract_text_from_html(&entry.title);
            if title.is_empty() {
                skipped += 1;
                continue;
            }
            let summary = extract_text_from_html(&entry.summary);
            if !self.is_relevant(&title, &summary) {
                continue;
            }

            let url = self.resolver.resolve(&entry.url).await;
            if !seen_links.insert(url.clone()) {
                debug!("Skipping duplicate link {}", url);
                continue;
            }

            let author = if entry.authors.is_empty() {
                endpoint.name.clone()
            } else {
                entry
                    .authors
                    .iter()
                    .take(self.settings.max_authors)
                    .cloned()
                    .collect::<Vec<_>>()
                    .join(", ")
            };
            let tags = self.filter.extract_tags(&format!("{} {}", title, summary));

            items.push(
                ContentItem::new(
                    self.category,
                    self.kind,
                    title,
                    url,
                    endpoint.name.clone(),
                    entry.published_at,
                )
                .with_body(truncate_chars(&summary, self.settings.body_chars))
                .with_author(author)
                .with_tags(tags),
            );
        }

        Ok((items, skipped))
    }
}

#[async_trait]
impl SourceFetcher for FeedSource {
    fn source_name(&self) -> String {
        self.name.clone()
    }

    fn source_kind(&self) -> SourceKind {
        self.kind
    }

    fn category(&self) -> Category {
        self.category
    }

    async fn fetch(&self, ctx: &FetchContext) -> Result<FetchBatch> {
        info!("Fetching {} ({} endpoints)", self.name, self.endpoints.len());

        let mut parser = FeedParser::new();
        let mut seen_links = HashSet::new();
        let mut items = Vec::new();
        let mut skipped = 0;
        let mut failures = 0;
        let mut attempted = 0;

        for (idx, endpoint) in self.endpoints.iter().enumerate() {
            if ctx.is_expired() {
                warn!("{}: deadline reached after {} endpoints", self.name, idx);
                break;
            }
            attempted += 1;
            if idx > 0 && !self.settings.endpoint_pause.is_zero() {
                tokio::time::sleep(self.settings.endpoint_pause).await;
            }

            match self
                .fetch_endpoint(endpoint, &mut parser, &mut seen_links, ctx)
                .await
            {
                Ok((mut found, endpoint_skipped)) => {
                    debug!("{}: {} items from {}", self.name, found.len(), endpoint.endpoint);
                    skipped += endpoint_skipped;
                    items.append(&mut found);
                }
                Err(e) => {
                    failures += 1;
                    warn!("{}: error fetching {}: {}", self.name, endpoint.endpoint, e);
                }
            }
        }

        if !self.endpoints.is_empty() && attempted == 0 {
            return Err(CuratorError::DeadlineExceeded);
        }
        if !self.endpoints.is_empty() && failures == self.endpoints.len() {
            return Err(CuratorError::Transient(format!(
                "all {} endpoints of {} failed",
                failures, self.name
            )));
        }

        items.sort_by(|a, b| b.published_at.cmp(&a.published_at));
        items.truncate(self.settings.max_items);

        info!("{}: {} items ({} skipped)", self.name, items.len(), skipped);
        let batch = FetchBatch::new(items).with_skipped(skipped);
        if failures > 0 {
            Ok(batch.degraded(format!("{} of {} endpoints failed", failures, self.endpoints.len())))
        } else {
            Ok(batch)
        }
    }
}
