use crate::traits::HttpTransport;
use crate::types::{CuratorError, FetchConfig, Result};
use async_trait::async_trait;
use backoff::{backoff::Backoff, exponential::ExponentialBackoff};
use reqwest::{Client, Method};
use serde::de::DeserializeOwned;
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Head,
    Post,
}

/// A transport-agnostic HTTP request.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub basic_auth: Option<(String, String)>,
    pub bearer_token: Option<String>,
    pub form: Vec<(String, String)>,
    /// Overrides the transport's default per-request timeout.
    pub timeout: Option<Duration>,
}

impl HttpRequest {
    fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            query: Vec::new(),
            headers: Vec::new(),
            basic_auth: None,
            bearer_token: None,
            form: Vec::new(),
            timeout: None,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, url)
    }

    pub fn head(url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Head, url)
    }

    pub fn post_form(url: impl Into<String>, form: &[(&str, &str)]) -> Self {
        let mut request = Self::new(HttpMethod::Post, url);
        request.form = form
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        request
    }

    pub fn query(mut self, key: &str, value: impl ToString) -> Self {
        self.query.push((key.to_string(), value.to_string()));
        self
    }

    pub fn header(mut self, key: &str, value: impl Into<String>) -> Self {
        self.headers.push((key.to_string(), value.into()));
        self
    }

    pub fn basic_auth(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.basic_auth = Some((user.into(), password.into()));
        self
    }

    pub fn bearer_auth(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// URL with the query parameters applied.
    pub fn full_url(&self) -> Result<String> {
        let mut url = Url::parse(&self.url)?;
        if !self.query.is_empty() {
            url.query_pairs_mut().extend_pairs(self.query.iter());
        }
        Ok(url.to_string())
    }
}

#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    /// Location after following redirects.
    pub final_url: String,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn error_for_status(self) -> Result<Self> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(CuratorError::Status {
                status: self.status,
                url: self.final_url,
            })
        }
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_str(&self.body)?)
    }
}

/// Shared `reqwest` transport: one pooled client, default headers, bounded retries.
pub struct Fetcher {
    client: Client,
    config: FetchConfig,
}

impl Fetcher {
    pub fn new(config: FetchConfig) -> Result<Self> {
        let redirect = if config.follow_redirects {
            reqwest::redirect::Policy::limited(config.max_redirects)
        } else {
            reqwest::redirect::Policy::none()
        };

        let client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout())
            .connect_timeout(Duration::from_secs(config.connect_timeout_seconds))
            .gzip(true)
            .deflate(true)
            .brotli(true)
            .redirect(redirect)
            .build()?;

        Ok(Self { client, config })
    }

    fn retry_schedule(&self) -> ExponentialBackoff<backoff::SystemClock> {
        let base = Duration::from_millis(self.config.retry_delay_millis);
        ExponentialBackoff {
            current_interval: base,
            initial_interval: base,
            max_interval: base * 8,
            multiplier: 2.0,
            max_elapsed_time: Some(self.config.timeout() * 2),
            ..Default::default()
        }
    }

    async fn send_once(&self, request: &HttpRequest) -> Result<HttpResponse> {
        let url = request.full_url()?;
        let method = match request.method {
            HttpMethod::Get => Method::GET,
            HttpMethod::Head => Method::HEAD,
            HttpMethod::Post => Method::POST,
        };

        let mut builder = self.client.request(method, &url);
        for (key, value) in &request.headers {
            builder = builder.header(key.as_str(), value.as_str());
        }
        if let Some((user, password)) = &request.basic_auth {
            builder = builder.basic_auth(user, Some(password));
        }
        if let Some(token) = &request.bearer_token {
            builder = builder.bearer_auth(token);
        }
        if !request.form.is_empty() {
            builder = builder.form(&request.form);
        }
        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let final_url = response.url().to_string();

        if let Some(content_length) = response.content_length() {
            check_size(content_length as usize, self.config.max_feed_size_mb)?;
        }

        let body = if request.method == HttpMethod::Head {
            String::new()
        } else {
            response.text().await?
        };
        // Chunked responses carry no length header.
        check_size(body.len(), self.config.max_feed_size_mb)?;

        Ok(HttpResponse {
            status,
            final_url,
            body,
        })
    }
}

fn check_size(bytes: usize, limit_mb: usize) -> Result<()> {
    let size_mb = bytes / (1024 * 1024);
    if size_mb > limit_mb {
        return Err(CuratorError::TooLarge { size_mb });
    }
    Ok(())
}

#[async_trait]
impl HttpTransport for Fetcher {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        let start_time = Instant::now();
        // Form posts are not idempotent; only reads are retried.
        let max_retries = match request.method {
            HttpMethod::Post => 0,
            _ => self.config.max_retries,
        };
        let mut backoff = self.retry_schedule();

        let mut attempt = 0;
        loop {
            let result = match self.send_once(&request).await {
                Ok(response) if response.status == 429 || response.status >= 500 => {
                    Err(CuratorError::Status {
                        status: response.status,
                        url: response.final_url,
                    })
                }
                other => other,
            };

            match result {
                Ok(response) => {
                    debug!(
                        "{:?} {} -> {} in {}ms",
                        request.method,
                        request.url,
                        response.status,
                        start_time.elapsed().as_millis()
                    );
                    return Ok(response);
                }
                Err(e) if e.is_transient() && attempt < max_retries => {
                    match backoff.next_backoff() {
                        Some(delay) => {
                            warn!(
                                "Attempt {} failed for {}: {}, retrying in {:?}",
                                attempt + 1,
                                request.url,
                                e,
                                delay
                            );
                            tokio::time::sleep(delay).await;
                            attempt += 1;
                        }
                        None => return Err(e),
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }
}
