//! Ranked-forum fetcher with an ordered fallback chain: authenticated API listing,
//! public JSON listing, then keyword search across the whole forum.

use crate::config::{CuratorConfig, ForumCredentials};
use crate::fetcher::HttpRequest;
use crate::relevance::{is_within_window, parse_timestamp, RawTimestamp, RelevanceFilter};
use crate::rss_utils::feed::truncate_chars;
use crate::traits::{FetchContext, HttpTransport, SourceFetcher};
use crate::types::{
    Category, ContentItem, CuratorError, FetchBatch, Result, SourceDescriptor, SourceKind,
};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

const PUBLIC_BASE: &str = "https://www.reddit.com";
const OAUTH_BASE: &str = "https://oauth.reddit.com";
const TOKEN_URL: &str = "https://www.reddit.com/api/v1/access_token";

#[derive(Debug, Deserialize)]
struct Listing {
    data: ListingData,
}

#[derive(Debug, Deserialize)]
struct ListingData {
    #[serde(default)]
    children: Vec<ListingChild>,
}

#[derive(Debug, Deserialize)]
struct ListingChild {
    data: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct RawPost {
    #[serde(default)]
    title: String,
    #[serde(default)]
    selftext: String,
    #[serde(default)]
    permalink: String,
    #[serde(default)]
    subreddit: String,
    #[serde(default)]
    author: Option<String>,
    #[serde(default)]
    score: i64,
    #[serde(default)]
    num_comments: i64,
    #[serde(default)]
    created_utc: Option<RawTimestamp>,
}

#[derive(Debug, Deserialize)]
struct RawCommunity {
    #[serde(default)]
    display_name: String,
    #[serde(default)]
    subscribers: Option<i64>,
    #[serde(default)]
    public_description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// Decode a listing, dropping children that do not match `T`. Returns the records and the
/// number dropped.
fn parse_listing<T: DeserializeOwned>(body: &str) -> Result<(Vec<T>, usize)> {
    let listing: Listing = serde_json::from_str(body)?;
    let mut records = Vec::with_capacity(listing.data.children.len());
    let mut skipped = 0;
    for child in listing.data.children {
        match serde_json::from_value::<T>(child.data) {
            Ok(record) => records.push(record),
            Err(e) => {
                debug!("Skipping malformed listing record: {}", e);
                skipped += 1;
            }
        }
    }
    Ok((records, skipped))
}

/// Finds active topic communities through the public community search.
pub struct CommunityDiscovery {
    terms: Vec<String>,
    filter: RelevanceFilter,
    min_subscribers: i64,
    max_communities: usize,
    pause: Duration,
}

impl CommunityDiscovery {
    pub fn new(config: &CuratorConfig) -> Self {
        Self {
            terms: config.vocabulary.search_terms.clone(),
            filter: RelevanceFilter::new(&config.vocabulary),
            min_subscribers: 1000,
            max_communities: 15,
            pause: Duration::from_millis(500),
        }
    }

    pub fn with_pause(mut self, pause: Duration) -> Self {
        self.pause = pause;
        self
    }

    /// Used when discovery fails or finds nothing.
    pub fn seed_communities() -> Vec<SourceDescriptor> {
        [("artificial", 50), ("MachineLearning", 30), ("OpenAI", 30)]
            .into_iter()
            .map(|(name, min_score)| {
                SourceDescriptor::new(name, format!("{}/r/{}", PUBLIC_BASE, name), SourceKind::Discovery)
                    .with_minimum_score(min_score)
            })
            .collect()
    }

    /// Score threshold scaled by audience size.
    pub fn minimum_score_for(subscribers: i64) -> i64 {
        (subscribers / 1000).clamp(10, 100)
    }

    /// Discovered communities, or the seed list with `true` when discovery came up empty.
    pub async fn discover(
        &self,
        transport: &dyn HttpTransport,
        user_agent: &str,
        ctx: &FetchContext,
    ) -> (Vec<SourceDescriptor>, bool) {
        let mut found: BTreeMap<String, i64> = BTreeMap::new();

        for (idx, term) in self.terms.iter().enumerate() {
            if ctx.is_expired() {
                break;
            }
            if idx > 0 && !self.pause.is_zero() {
                tokio::time::sleep(self.pause).await;
            }

            let request = HttpRequest::get(format!("{}/subreddits/search.json", PUBLIC_BASE))
                .query("q", term)
                .query("sort", "relevance")
                .query("limit", 10)
                .header("User-Agent", user_agent);

            let communities = match transport.send(request).await.and_then(|r| r.error_for_status()) {
                Ok(response) => match parse_listing::<RawCommunity>(&response.body) {
                    Ok((communities, _)) => communities,
                    Err(e) => {
                        warn!("Community search for '{}' returned bad data: {}", term, e);
                        continue;
                    }
                },
                Err(e) => {
                    warn!("Community search for '{}' failed: {}", term, e);
                    continue;
                }
            };

            for community in communities {
                let subscribers = community.subscribers.unwrap_or(0);
                let description = community.public_description.unwrap_or_default();
                if community.display_name.is_empty()
                    || subscribers <= self.min_subscribers
                    || !self.filter.is_topic_relevant(&community.display_name, &description)
                {
                    continue;
                }
                found.entry(community.display_name).or_insert(subscribers);
            }
        }

        if found.is_empty() {
            info!("Community discovery found nothing, using seed communities");
            return (Self::seed_communities(), true);
        }

        let mut ranked: Vec<(String, i64)> = found.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1));
        ranked.truncate(self.max_communities);
        info!("Discovered {} communities", ranked.len());

        let descriptors = ranked
            .into_iter()
            .map(|(name, subscribers)| {
                let endpoint = format!("{}/r/{}", PUBLIC_BASE, name);
                SourceDescriptor::new(name, endpoint, SourceKind::Discovery)
                    .with_minimum_score(Self::minimum_score_for(subscribers))
            })
            .collect();
        (descriptors, false)
    }
}

/// Body used when a post has no self text.
#[derive(Debug, Clone, Copy)]
enum BodyFallback {
    Title,
    Discussion,
}

enum Verdict {
    Qualified(ContentItem),
    Rejected,
    Malformed,
}

/// Window, relevance and shaping rules shared by every tier.
pub struct PostRules {
    filter: RelevanceFilter,
    window: chrono::Duration,
    body_chars: usize,
}

impl PostRules {
    pub fn new(config: &CuratorConfig) -> Self {
        Self {
            filter: RelevanceFilter::new(&config.vocabulary),
            window: chrono::Duration::days(1),
            body_chars: 300,
        }
    }

    fn judge(
        &self,
        post: RawPost,
        scope: &ForumScope<'_>,
        kind: SourceKind,
        source_name: String,
        fallback: BodyFallback,
    ) -> Verdict {
        if post.title.trim().is_empty() || post.permalink.is_empty() {
            return Verdict::Malformed;
        }
        let published_at = match post.created_utc.as_ref().and_then(parse_timestamp) {
            Some(ts) => ts,
            None => return Verdict::Malformed,
        };
        if !is_within_window(published_at, scope.ctx.now, self.window) {
            return Verdict::Rejected;
        }
        if !self.filter.is_topic_relevant(&post.title, &post.selftext) {
            return Verdict::Rejected;
        }

        let body = if post.selftext.trim().is_empty() {
            match fallback {
                BodyFallback::Title => post.title.clone(),
                BodyFallback::Discussion => format!("Discussion: {}", post.title),
            }
        } else {
            post.selftext.clone()
        };
        let tags = self
            .filter
            .extract_tags(&format!("{} {}", post.title, post.selftext));

        let item = ContentItem::new(
            scope.category,
            kind,
            post.title,
            format!("https://reddit.com{}", post.permalink),
            source_name,
            published_at,
        )
        .with_body(truncate_chars(&body, self.body_chars))
        .with_engagement(post.score, post.num_comments)
        .with_author(post.author.unwrap_or_default())
        .with_tags(tags);
        Verdict::Qualified(item)
    }
}

/// What one tier produced.
#[derive(Debug, Default)]
pub struct TierOutput {
    pub items: Vec<ContentItem>,
    pub skipped: usize,
}

impl TierOutput {
    fn absorb(&mut self, verdict: Verdict) {
        match verdict {
            Verdict::Qualified(item) => self.items.push(item),
            Verdict::Rejected => {}
            Verdict::Malformed => self.skipped += 1,
        }
    }
}

/// Everything a tier needs during one fetch. Community discovery runs at most once and
/// only when a listing tier asks for it.
pub struct ForumScope<'a> {
    pub ctx: &'a FetchContext,
    pub category: Category,
    transport: &'a dyn HttpTransport,
    rules: &'a PostRules,
    discovery: &'a CommunityDiscovery,
    user_agent: &'a str,
    communities: OnceCell<(Vec<SourceDescriptor>, bool)>,
}

impl<'a> ForumScope<'a> {
    pub async fn communities(&self) -> &[SourceDescriptor] {
        let (communities, _) = self
            .communities
            .get_or_init(|| self.discovery.discover(self.transport, self.user_agent, self.ctx))
            .await;
        communities
    }

    fn used_seed_communities(&self) -> bool {
        self.communities.get().map(|(_, seeded)| *seeded).unwrap_or(false)
    }

    fn get(&self, url: impl Into<String>) -> HttpRequest {
        HttpRequest::get(url).header("User-Agent", self.user_agent)
    }
}

/// One tier of the forum fallback chain.
#[async_trait]
pub trait ForumStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    fn kind(&self) -> SourceKind;

    async fn collect(&self, scope: &ForumScope<'_>) -> Result<TierOutput>;
}

/// Read the hot listing of each community; a post qualifies at the community's threshold.
async fn collect_listings<F>(
    scope: &ForumScope<'_>,
    kind: SourceKind,
    pause: Duration,
    request_for: F,
) -> Result<TierOutput>
where
    F: Fn(&SourceDescriptor) -> HttpRequest + Send + Sync,
{
    let communities = scope.communities().await;
    let mut output = TierOutput::default();
    let mut failures = 0;

    for (idx, community) in communities.iter().enumerate() {
        if scope.ctx.is_expired() {
            break;
        }
        if idx > 0 && !pause.is_zero() {
            tokio::time::sleep(pause).await;
        }

        let response = match scope
            .transport
            .send(request_for(community))
            .await
            .and_then(|r| r.error_for_status())
        {
            Ok(response) => response,
            Err(e) => {
                warn!("Error reading r/{}: {}", community.name, e);
                failures += 1;
                continue;
            }
        };
        let (posts, skipped) = match parse_listing::<RawPost>(&response.body) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!("Bad listing from r/{}: {}", community.name, e);
                failures += 1;
                continue;
            }
        };
        output.skipped += skipped;

        for post in posts {
            if post.score < community.minimum_score_threshold {
                continue;
            }
            let verdict = scope.rules.judge(
                post,
                scope,
                kind,
                format!("r/{}", community.name),
                BodyFallback::Discussion,
            );
            output.absorb(verdict);
        }
    }

    if !communities.is_empty() && failures == communities.len() {
        return Err(CuratorError::Transient(format!(
            "all {} community listings failed",
            failures
        )));
    }
    Ok(output)
}

/// Authenticated listing through the OAuth API.
pub struct ApiListing {
    credentials: ForumCredentials,
    per_community: usize,
    pause: Duration,
}

impl ApiListing {
    pub fn new(credentials: ForumCredentials) -> Self {
        Self {
            credentials,
            per_community: 20,
            pause: Duration::from_millis(500),
        }
    }

    pub fn with_pause(mut self, pause: Duration) -> Self {
        self.pause = pause;
        self
    }

    async fn request_token(&self, scope: &ForumScope<'_>, id: &str, secret: &str) -> Result<String> {
        let request = HttpRequest::post_form(TOKEN_URL, &[("grant_type", "client_credentials")])
            .basic_auth(id, secret)
            .header("User-Agent", scope.user_agent);
        let response = scope.transport.send(request).await?.error_for_status()?;
        let token: TokenResponse = response.json()?;
        if token.access_token.is_empty() {
            return Err(CuratorError::Configuration(
                "forum API returned an empty token".to_string(),
            ));
        }
        Ok(token.access_token)
    }

    /// A tiny authenticated read; bad credentials fail here rather than per community.
    async fn verify(&self, scope: &ForumScope<'_>, token: &str) -> Result<()> {
        let request = scope
            .get(format!("{}/r/python/hot", OAUTH_BASE))
            .query("limit", 1)
            .bearer_auth(token);
        scope.transport.send(request).await?.error_for_status()?;
        Ok(())
    }
}

#[async_trait]
impl ForumStrategy for ApiListing {
    fn name(&self) -> &'static str {
        "api-listing"
    }

    fn kind(&self) -> SourceKind {
        SourceKind::ForumApi
    }

    async fn collect(&self, scope: &ForumScope<'_>) -> Result<TierOutput> {
        let (id, secret) = match (&self.credentials.client_id, &self.credentials.client_secret) {
            (Some(id), Some(secret)) if self.credentials.looks_valid() => (id, secret),
            _ => {
                return Err(CuratorError::Configuration(
                    "forum API credentials missing or malformed".to_string(),
                ))
            }
        };

        let token = self.request_token(scope, id, secret).await?;
        self.verify(scope, &token).await?;
        info!("Forum API authentication successful");

        let limit = self.per_community;
        collect_listings(scope, self.kind(), self.pause, |community| {
            scope
                .get(format!("{}/r/{}/hot", OAUTH_BASE, community.name))
                .query("limit", limit)
                .bearer_auth(token.as_str())
        })
        .await
    }
}

/// Unauthenticated JSON listing over the same communities.
pub struct PublicListing {
    per_community: usize,
    pause: Duration,
}

impl Default for PublicListing {
    fn default() -> Self {
        Self {
            per_community: 20,
            pause: Duration::from_millis(500),
        }
    }
}

impl PublicListing {
    pub fn with_pause(mut self, pause: Duration) -> Self {
        self.pause = pause;
        self
    }
}

#[async_trait]
impl ForumStrategy for PublicListing {
    fn name(&self) -> &'static str {
        "public-listing"
    }

    fn kind(&self) -> SourceKind {
        SourceKind::ForumSearch
    }

    async fn collect(&self, scope: &ForumScope<'_>) -> Result<TierOutput> {
        let limit = self.per_community;
        collect_listings(scope, self.kind(), self.pause, |community| {
            scope
                .get(format!("{}/r/{}/hot.json", PUBLIC_BASE, community.name))
                .query("limit", limit)
        })
        .await
    }
}

/// Keyword queries against the forum-wide search endpoint, results unioned.
pub struct KeywordSearch {
    terms: Vec<String>,
    per_query: usize,
    min_score: i64,
    min_comments: i64,
    pause: Duration,
}

impl KeywordSearch {
    pub fn new(config: &CuratorConfig) -> Self {
        Self {
            terms: config.vocabulary.search_terms.clone(),
            per_query: 10,
            min_score: 50,
            min_comments: 10,
            pause: Duration::from_millis(500),
        }
    }

    pub fn with_pause(mut self, pause: Duration) -> Self {
        self.pause = pause;
        self
    }
}

#[async_trait]
impl ForumStrategy for KeywordSearch {
    fn name(&self) -> &'static str {
        "keyword-search"
    }

    fn kind(&self) -> SourceKind {
        SourceKind::ForumSearch
    }

    async fn collect(&self, scope: &ForumScope<'_>) -> Result<TierOutput> {
        let mut output = TierOutput::default();
        let mut failures = 0;

        for (idx, term) in self.terms.iter().enumerate() {
            if scope.ctx.is_expired() {
                break;
            }
            if idx > 0 && !self.pause.is_zero() {
                tokio::time::sleep(self.pause).await;
            }

            let request = scope
                .get(format!("{}/search.json", PUBLIC_BASE))
                .query("q", term)
                .query("sort", "hot")
                .query("limit", self.per_query)
                .query("t", "day")
                .query("type", "link");

            let parsed = scope
                .transport
                .send(request)
                .await
                .and_then(|r| r.error_for_status())
                .and_then(|r| parse_listing::<RawPost>(&r.body));
            let (posts, skipped) = match parsed {
                Ok(parsed) => parsed,
                Err(e) => {
                    warn!("Forum search for '{}' failed: {}", term, e);
                    failures += 1;
                    continue;
                }
            };
            output.skipped += skipped;

            for post in posts {
                if post.score < self.min_score && post.num_comments < self.min_comments {
                    continue;
                }
                let source_name = if post.subreddit.is_empty() {
                    "r/unknown".to_string()
                } else {
                    format!("r/{}", post.subreddit)
                };
                let verdict = scope
                    .rules
                    .judge(post, scope, self.kind(), source_name, BodyFallback::Title);
                output.absorb(verdict);
            }
        }

        if !self.terms.is_empty() && failures == self.terms.len() {
            return Err(CuratorError::Transient(format!(
                "all {} forum searches failed",
                failures
            )));
        }
        Ok(output)
    }
}

/// Forum fetcher: tries each tier in order until enough posts qualify.
pub struct ForumSource {
    name: String,
    category: Category,
    tiers: Vec<Box<dyn ForumStrategy>>,
    transport: Arc<dyn HttpTransport>,
    rules: PostRules,
    discovery: CommunityDiscovery,
    user_agent: String,
    min_qualifying: usize,
    max_items: usize,
}

impl ForumSource {
    pub fn new(
        name: impl Into<String>,
        category: Category,
        transport: Arc<dyn HttpTransport>,
        config: &CuratorConfig,
    ) -> Self {
        Self {
            name: name.into(),
            category,
            tiers: Vec::new(),
            transport,
            rules: PostRules::new(config),
            discovery: CommunityDiscovery::new(config),
            user_agent: config.forum.user_agent.clone(),
            min_qualifying: 3,
            max_items: 20,
        }
    }

    pub fn with_tier(mut self, tier: Box<dyn ForumStrategy>) -> Self {
        self.tiers.push(tier);
        self
    }

    pub fn with_discovery(mut self, discovery: CommunityDiscovery) -> Self {
        self.discovery = discovery;
        self
    }

    pub fn with_min_qualifying(mut self, min_qualifying: usize) -> Self {
        self.min_qualifying = min_qualifying;
        self
    }

    pub fn with_max_items(mut self, max_items: usize) -> Self {
        self.max_items = max_items;
        self
    }

    /// Full chain over discovered communities.
    pub fn discussions(transport: Arc<dyn HttpTransport>, config: &CuratorConfig) -> Self {
        Self::new("Reddit", Category::ForumDiscussion, transport, config)
            .with_tier(Box::new(ApiListing::new(config.forum.clone())))
            .with_tier(Box::new(PublicListing::default()))
            .with_tier(Box::new(KeywordSearch::new(config)))
    }

    /// Forum-wide keyword search only.
    pub fn trending(transport: Arc<dyn HttpTransport>, config: &CuratorConfig) -> Self {
        Self::new("Reddit search", Category::ForumTrending, transport, config)
            .with_tier(Box::new(KeywordSearch::new(config)))
            .with_max_items(15)
    }

    pub fn tier_names(&self) -> Vec<&'static str> {
        self.tiers.iter().map(|t| t.name()).collect()
    }
}

#[async_trait]
impl SourceFetcher for ForumSource {
    fn source_name(&self) -> String {
        self.name.clone()
    }

    fn source_kind(&self) -> SourceKind {
        self.tiers
            .first()
            .map(|t| t.kind())
            .unwrap_or(SourceKind::ForumSearch)
    }

    fn category(&self) -> Category {
        self.category
    }

    async fn fetch(&self, ctx: &FetchContext) -> Result<FetchBatch> {
        let scope = ForumScope {
            ctx,
            category: self.category,
            transport: self.transport.as_ref(),
            rules: &self.rules,
            discovery: &self.discovery,
            user_agent: &self.user_agent,
            communities: OnceCell::new(),
        };

        let mut collected: Vec<ContentItem> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        let mut skipped = 0;
        let mut errors = 0;
        let mut settled_on = None;
        let mut attempted = 0;

        for (idx, tier) in self.tiers.iter().enumerate() {
            if ctx.is_expired() {
                warn!("{}: deadline reached before tier {}", self.name, tier.name());
                break;
            }
            attempted += 1;

            match tier.collect(&scope).await {
                Ok(output) => {
                    skipped += output.skipped;
                    for item in output.items {
                        if seen.insert(item.url.clone()) {
                            collected.push(item);
                        }
                    }
                    if collected.len() >= self.min_qualifying {
                        info!("{}: {} qualifying posts via {}", self.name, collected.len(), tier.name());
                        settled_on = Some(idx);
                        break;
                    }
                    info!(
                        "{}: only {} qualifying posts after {}, trying next tier",
                        self.name,
                        collected.len(),
                        tier.name()
                    );
                }
                Err(e) => {
                    errors += 1;
                    warn!("{}: tier {} unavailable: {}", self.name, tier.name(), e);
                }
            }
        }

        if !self.tiers.is_empty() && attempted == 0 {
            return Err(CuratorError::DeadlineExceeded);
        }
        if !self.tiers.is_empty() && errors == self.tiers.len() {
            return Err(CuratorError::Transient(format!(
                "every tier of {} failed",
                self.name
            )));
        }

        collected.sort_by(|a, b| b.engagement().cmp(&a.engagement()));
        collected.truncate(self.max_items);

        let mut batch = FetchBatch::new(collected).with_skipped(skipped);
        let fell_back = settled_on.map(|idx| idx > 0).unwrap_or(self.tiers.len() > 1);
        if fell_back {
            batch = batch.degraded("fell back past the preferred tier");
        } else if scope.used_seed_communities() {
            batch = batch.degraded("community discovery fell back to seed list");
        }
        Ok(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn threshold_scales_with_audience() {
        assert_eq!(CommunityDiscovery::minimum_score_for(1_500), 10);
        assert_eq!(CommunityDiscovery::minimum_score_for(42_000), 42);
        assert_eq!(CommunityDiscovery::minimum_score_for(2_000_000), 100);
    }

    #[test]
    fn listing_skips_records_of_the_wrong_shape() {
        let body = r#"{"data":{"children":[
            {"data":{"title":"ok","permalink":"/r/a/1","score":5,"created_utc":1.0}},
            {"data":{"title":"bad","score":"lots"}}
        ]}}"#;
        let (posts, skipped) = parse_listing::<RawPost>(body).unwrap();
        assert_eq!(posts.len(), 1);
        assert_eq!(skipped, 1);
    }

    #[test]
    fn seeds_carry_thresholds() {
        let seeds = CommunityDiscovery::seed_communities();
        let names: Vec<_> = seeds.iter().map(|s| (s.name.as_str(), s.minimum_score_threshold)).collect();
        assert_eq!(names, vec![("artificial", 50), ("MachineLearning", 30), ("OpenAI", 30)]);
    }
}
