use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;
use uuid::Uuid;

/// Display bucket an item belongs to. Assigned once when the item is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Category {
    Research,
    ForumDiscussion,
    News,
    ForumTrending,
    NewsDiscovery,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::ForumDiscussion,
        Category::Research,
        Category::News,
        Category::ForumTrending,
        Category::NewsDiscovery,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Research => "research",
            Category::ForumDiscussion => "forum-discussion",
            Category::News => "news",
            Category::ForumTrending => "forum-trending",
            Category::NewsDiscovery => "news-discovery",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How an item was acquired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceKind {
    Feed,
    ForumApi,
    ForumSearch,
    Discovery,
}

/// One piece of acquired content (article, post, paper).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContentItem {
    pub title: String,
    pub body: String,
    pub url: String,
    pub source_name: String,
    pub published_at: DateTime<Utc>,
    pub engagement_score: i64,
    pub comment_count: i64,
    pub author_label: Option<String>,
    category: Category,
    pub source_kind: SourceKind,
    pub keyword_tags: BTreeSet<String>,
}

impl ContentItem {
    pub fn new(
        category: Category,
        source_kind: SourceKind,
        title: impl Into<String>,
        url: impl Into<String>,
        source_name: impl Into<String>,
        published_at: DateTime<Utc>,
    ) -> Self {
        Self {
            title: title.into(),
            body: String::new(),
            url: url.into(),
            source_name: source_name.into(),
            published_at,
            engagement_score: 0,
            comment_count: 0,
            author_label: None,
            category,
            source_kind,
            keyword_tags: BTreeSet::new(),
        }
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_engagement(mut self, score: i64, comments: i64) -> Self {
        self.engagement_score = score;
        self.comment_count = comments;
        self
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        let author = author.into();
        self.author_label = if author.trim().is_empty() { None } else { Some(author) };
        self
    }

    pub fn with_tags(mut self, tags: BTreeSet<String>) -> Self {
        self.keyword_tags = tags;
        self
    }

    pub fn category(&self) -> Category {
        self.category
    }

    /// Composite popularity signal; comments weigh twice as much as votes.
    pub fn engagement(&self) -> i64 {
        self.engagement_score
            .saturating_add(self.comment_count.saturating_mul(2))
    }
}

/// A discovered or configured endpoint. Lives only as long as the fetch that made it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDescriptor {
    pub name: String,
    pub endpoint: String,
    pub kind: SourceKind,
    pub minimum_score_threshold: i64,
}

impl SourceDescriptor {
    pub fn new(name: impl Into<String>, endpoint: impl Into<String>, kind: SourceKind) -> Self {
        Self {
            name: name.into(),
            endpoint: endpoint.into(),
            kind,
            minimum_score_threshold: 0,
        }
    }

    pub fn with_minimum_score(mut self, threshold: i64) -> Self {
        self.minimum_score_threshold = threshold;
        self
    }
}

/// What a fetcher hands back to the orchestrator.
#[derive(Debug, Clone, Default)]
pub struct FetchBatch {
    pub items: Vec<ContentItem>,
    /// Malformed records dropped while building `items`.
    pub skipped: usize,
    /// Set when a fallback tier or seed list had to be used.
    pub degraded: Option<String>,
}

impl FetchBatch {
    pub fn new(items: Vec<ContentItem>) -> Self {
        Self {
            items,
            skipped: 0,
            degraded: None,
        }
    }

    pub fn with_skipped(mut self, skipped: usize) -> Self {
        self.skipped = skipped;
        self
    }

    pub fn degraded(mut self, reason: impl Into<String>) -> Self {
        self.degraded = Some(reason.into());
        self
    }
}

/// Terminal state of one fetcher as observed by the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum FetchOutcome {
    Succeeded { items: usize },
    Degraded { items: usize, reason: String },
    FailedSoft { error: String },
    TimedOut,
}

#[derive(Debug, Clone, Serialize)]
pub struct SourceReport {
    pub source_name: String,
    pub category: Category,
    pub outcome: FetchOutcome,
    pub skipped: usize,
    pub elapsed_ms: u64,
}

/// Per-run summary handed to the metrics collaborator.
#[derive(Debug, Clone, Serialize)]
pub struct RunMetrics {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: u64,
    pub fetched: usize,
    pub duplicates_removed: usize,
    pub selected: usize,
    pub per_category: BTreeMap<Category, usize>,
    pub errors: usize,
    pub timed_out: usize,
    pub skipped_records: usize,
    pub sources: Vec<SourceReport>,
}

/// Final, deduplicated and ranked output of one run.
#[derive(Debug, Clone, Serialize)]
pub struct Digest {
    pub items: BTreeMap<Category, Vec<ContentItem>>,
    pub metrics: RunMetrics,
}

impl Digest {
    pub fn total_items(&self) -> usize {
        self.items.values().map(Vec::len).sum()
    }

    pub fn category(&self, category: Category) -> &[ContentItem] {
        self.items.get(&category).map(Vec::as_slice).unwrap_or(&[])
    }
}

#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub user_agent: String,
    pub timeout_seconds: u64,
    pub connect_timeout_seconds: u64,
    pub max_retries: u32,
    pub retry_delay_millis: u64,
    pub max_feed_size_mb: usize,
    pub follow_redirects: bool,
    pub max_redirects: usize,
}

impl FetchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36".to_string(),
            timeout_seconds: 15,
            connect_timeout_seconds: 5,
            max_retries: 2,
            retry_delay_millis: 500,
            max_feed_size_mb: 10,
            follow_redirects: true,
            max_redirects: 5,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CuratorError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String },

    #[error("Transient fetch error: {0}")]
    Transient(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Deadline exceeded")]
    DeadlineExceeded,

    #[error("Response too large: {size_mb}MB")]
    TooLarge { size_mb: usize },

    #[error("General error: {0}")]
    General(String),
}

impl CuratorError {
    /// Failures worth another attempt against the same endpoint.
    pub fn is_transient(&self) -> bool {
        match self {
            CuratorError::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            CuratorError::Status { status, .. } => *status == 429 || *status >= 500,
            CuratorError::Transient(_) => true,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, CuratorError>;
