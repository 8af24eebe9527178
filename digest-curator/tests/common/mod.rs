#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use digest_curator::{
    Category, ContentItem, CuratorError, FetchBatch, FetchContext, HttpMethod, HttpRequest,
    HttpResponse, HttpTransport, Result, SourceFetcher, SourceKind,
};
use serde_json::json;
use std::sync::{Mutex, Once};
use std::time::Duration;
use tokio::time::Instant;

static INIT: Once = Once::new();

pub fn init_tracing() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_test_writer()
            .try_init();
    });
}

/// Context with a generous deadline and a fixed reference time.
pub fn context(now: DateTime<Utc>) -> FetchContext {
    FetchContext::new(Instant::now() + Duration::from_secs(30), now)
}

#[derive(Debug, Clone)]
pub enum StubReply {
    Respond {
        status: u16,
        body: String,
        final_url: Option<String>,
    },
    Fail(String),
}

impl StubReply {
    pub fn ok(body: impl Into<String>) -> Self {
        StubReply::Respond {
            status: 200,
            body: body.into(),
            final_url: None,
        }
    }

    pub fn status(status: u16) -> Self {
        StubReply::Respond {
            status,
            body: String::new(),
            final_url: None,
        }
    }

    pub fn redirect_to(target: impl Into<String>) -> Self {
        StubReply::Respond {
            status: 200,
            body: String::new(),
            final_url: Some(target.into()),
        }
    }
}

struct Route {
    pattern: String,
    method: Option<HttpMethod>,
    reply: StubReply,
}

/// In-memory transport. The first route whose pattern is a substring of the full request URL
/// (and whose method matches, when given) answers; anything else is a 404.
#[derive(Default)]
pub struct StubTransport {
    routes: Vec<Route>,
    calls: Mutex<Vec<(HttpMethod, String)>>,
}

impl StubTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(mut self, pattern: &str, reply: StubReply) -> Self {
        self.routes.push(Route {
            pattern: pattern.to_string(),
            method: None,
            reply,
        });
        self
    }

    pub fn route_method(mut self, method: HttpMethod, pattern: &str, reply: StubReply) -> Self {
        self.routes.push(Route {
            pattern: pattern.to_string(),
            method: Some(method),
            reply,
        });
        self
    }

    pub fn calls(&self) -> Vec<(HttpMethod, String)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn was_called(&self, fragment: &str) -> bool {
        self.calls().iter().any(|(_, url)| url.contains(fragment))
    }
}

#[async_trait]
impl HttpTransport for StubTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        let url = request.full_url()?;
        self.calls.lock().unwrap().push((request.method, url.clone()));

        let route = self.routes.iter().find(|r| {
            url.contains(&r.pattern) && r.method.map(|m| m == request.method).unwrap_or(true)
        });

        match route.map(|r| r.reply.clone()) {
            Some(StubReply::Respond {
                status,
                body,
                final_url,
            }) => Ok(HttpResponse {
                status,
                final_url: final_url.unwrap_or(url),
                body,
            }),
            Some(StubReply::Fail(message)) => Err(CuratorError::Transient(message)),
            None => Ok(HttpResponse {
                status: 404,
                final_url: url,
                body: String::new(),
            }),
        }
    }
}

pub struct RssEntry {
    pub title: String,
    pub link: String,
    pub summary: String,
    pub published: DateTime<Utc>,
}

impl RssEntry {
    pub fn new(title: &str, link: &str, summary: &str, published: DateTime<Utc>) -> Self {
        Self {
            title: title.to_string(),
            link: link.to_string(),
            summary: summary.to_string(),
            published,
        }
    }
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// RSS 2.0 document; summaries are escaped so they may carry markup.
pub fn rss_document(title: &str, entries: &[RssEntry]) -> String {
    let items: String = entries
        .iter()
        .enumerate()
        .map(|(idx, e)| {
            format!(
                "<item><title>{}</title><link>{}</link><guid>{}#{}</guid><pubDate>{}</pubDate><description>{}</description></item>\n",
                escape(&e.title),
                escape(&e.link),
                escape(&e.link),
                idx,
                e.published.to_rfc2822(),
                escape(&e.summary)
            )
        })
        .collect();
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<rss version=\"2.0\"><channel><title>{}</title>\n{}</channel></rss>",
        escape(title),
        items
    )
}

pub fn forum_post(
    title: &str,
    permalink: &str,
    subreddit: &str,
    score: i64,
    comments: i64,
    created: DateTime<Utc>,
) -> serde_json::Value {
    json!({
        "title": title,
        "selftext": "",
        "permalink": permalink,
        "subreddit": subreddit,
        "author": "poster",
        "score": score,
        "num_comments": comments,
        "created_utc": created.timestamp() as f64,
    })
}

pub fn community(name: &str, subscribers: i64, description: &str) -> serde_json::Value {
    json!({
        "display_name": name,
        "subscribers": subscribers,
        "public_description": description,
    })
}

pub fn listing(records: Vec<serde_json::Value>) -> String {
    let children: Vec<_> = records
        .into_iter()
        .map(|data| json!({ "kind": "t3", "data": data }))
        .collect();
    json!({ "kind": "Listing", "data": { "children": children } }).to_string()
}

pub fn item(category: Category, title: &str, url: &str) -> ContentItem {
    ContentItem::new(category, SourceKind::Feed, title, url, "Test Source", Utc::now())
}

pub enum Behavior {
    Items(Vec<ContentItem>),
    Fail,
    Panic,
    Sleep(Duration, Vec<ContentItem>),
}

/// Fetcher with scripted behaviour for orchestration tests.
pub struct StaticFetcher {
    name: String,
    category: Category,
    behavior: Behavior,
}

impl StaticFetcher {
    pub fn new(name: &str, category: Category, behavior: Behavior) -> Self {
        Self {
            name: name.to_string(),
            category,
            behavior,
        }
    }
}

#[async_trait]
impl SourceFetcher for StaticFetcher {
    fn source_name(&self) -> String {
        self.name.clone()
    }

    fn source_kind(&self) -> SourceKind {
        SourceKind::Feed
    }

    fn category(&self) -> Category {
        self.category
    }

    async fn fetch(&self, _ctx: &FetchContext) -> Result<FetchBatch> {
        match &self.behavior {
            Behavior::Items(items) => Ok(FetchBatch::new(items.clone())),
            Behavior::Fail => Err(CuratorError::Transient(format!("{} is down", self.name))),
            Behavior::Panic => panic!("{} blew up", self.name),
            Behavior::Sleep(duration, items) => {
                tokio::time::sleep(*duration).await;
                Ok(FetchBatch::new(items.clone()))
            }
        }
    }
}
