use crate::types::{Category, CuratorError, FetchConfig, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::info;

const DEFAULT_FORUM_USER_AGENT: &str = "AI-News-Crawler-v3.0";

/// Keyword lists driving relevance, tagging and ranking.
///
/// The defaults describe the AI / machine-learning domain. They are hand-tuned and can be
/// replaced wholesale from a JSON file.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Vocabulary {
    /// Permissive topic match and tag extraction.
    pub topic_keywords: Vec<String>,
    /// Worth +2 in the high-confidence check; at least one must match.
    pub core_keywords: Vec<String>,
    /// Worth +1 in the high-confidence check.
    pub supporting_keywords: Vec<String>,
    /// Any match rejects an item in the high-confidence check.
    pub exclusion_keywords: Vec<String>,
    /// Counted in titles by the ranker.
    pub ranking_keywords: Vec<String>,
    pub reputable_sources: Vec<String>,
    /// Query terms for the forum keyword search tier.
    pub search_terms: Vec<String>,
    /// Query terms for Google News search feeds.
    pub news_terms: Vec<String>,
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl Default for Vocabulary {
    fn default() -> Self {
        Self {
            topic_keywords: strings(&[
                "artificial intelligence", "machine learning", "deep learning", "neural network",
                "AI", "ML", "LLM", "GPT", "transformer", "chatbot", "automation",
                "computer vision", "natural language", "algorithm", "data science",
                "OpenAI", "ChatGPT", "Claude", "Gemini", "tensorflow", "pytorch",
            ]),
            core_keywords: strings(&[
                "artificial intelligence", "machine learning", "deep learning", "neural network",
                "transformer", "attention mechanism", "generative model", "large language model",
                "llm", "gpt", "bert", "reinforcement learning", "computer vision", "nlp",
                "natural language processing", "convolutional neural", "recurrent neural",
                "adversarial", "gan", "diffusion model", "embedding", "fine-tuning",
                "pre-training", "multi-modal", "chatbot", "ai model", "ai system",
            ]),
            supporting_keywords: strings(&[
                "implementation", "experiment", "evaluation", "benchmark", "dataset",
                "performance", "accuracy", "training", "inference", "application",
            ]),
            exclusion_keywords: strings(&[
                "purely mathematical", "abstract algebra", "topology", "number theory",
                "graph theory without ai", "pure mathematics", "theoretical physics",
                "quantum mechanics without ai", "biological without ai",
            ]),
            ranking_keywords: strings(&[
                "AI", "artificial", "machine", "learning", "neural", "GPT", "ChatGPT", "OpenAI", "LLM",
            ]),
            reputable_sources: strings(&[
                "TechCrunch", "Ars Technica", "Google News", "arXiv", "MIT Technology Review",
            ]),
            search_terms: strings(&[
                "artificial intelligence", "machine learning", "ChatGPT", "OpenAI",
                "deep learning", "neural network", "LLM", "GPT", "AI breakthrough",
            ]),
            news_terms: strings(&[
                "artificial intelligence", "machine learning", "ChatGPT", "OpenAI",
                "AI breakthrough", "deep learning", "neural networks",
            ]),
        }
    }
}

impl Vocabulary {
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            CuratorError::Configuration(format!("reading vocabulary {}: {}", path.display(), e))
        })?;
        let vocabulary: Vocabulary = serde_json::from_str(&content)?;
        Ok(vocabulary)
    }
}

/// OAuth client credentials for the ranked-forum API.
#[derive(Debug, Clone, Default)]
pub struct ForumCredentials {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub user_agent: String,
}

impl ForumCredentials {
    /// Both halves present and long enough to plausibly be real.
    pub fn looks_valid(&self) -> bool {
        match (&self.client_id, &self.client_secret) {
            (Some(id), Some(secret)) => id.len() > 5 && secret.len() > 5,
            _ => false,
        }
    }
}

/// Settings for the outbound delivery collaborator. Carried, never used by the pipeline.
#[derive(Debug, Clone)]
pub struct DeliveryConfig {
    pub provider: String,
    pub resend_api_key: Option<String>,
    pub smtp_server: String,
    pub smtp_port: u16,
    pub email_user: Option<String>,
    pub email_password: Option<String>,
    pub sender_name: String,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            provider: "google".to_string(),
            resend_api_key: None,
            smtp_server: "smtp.gmail.com".to_string(),
            smtp_port: 587,
            email_user: None,
            email_password: None,
            sender_name: "AI-CCORE Research Team".to_string(),
        }
    }
}

/// Immutable configuration built once at process start and passed to every fetcher.
#[derive(Debug, Clone)]
pub struct CuratorConfig {
    pub fetch: FetchConfig,
    pub vocabulary: Vocabulary,
    pub forum: ForumCredentials,
    pub delivery: DeliveryConfig,
    pub budgets: BTreeMap<Category, usize>,
}

impl Default for CuratorConfig {
    fn default() -> Self {
        Self {
            fetch: FetchConfig::default(),
            vocabulary: Vocabulary::default(),
            forum: ForumCredentials {
                client_id: None,
                client_secret: None,
                user_agent: DEFAULT_FORUM_USER_AGENT.to_string(),
            },
            delivery: DeliveryConfig::default(),
            budgets: default_budgets(),
        }
    }
}

/// Display slots per category; the downstream medium has a fixed total size.
pub fn default_budgets() -> BTreeMap<Category, usize> {
    BTreeMap::from([
        (Category::ForumDiscussion, 5),
        (Category::Research, 4),
        (Category::News, 5),
        (Category::ForumTrending, 3),
        (Category::NewsDiscovery, 3),
    ])
}

impl CuratorConfig {
    /// Build from process environment. Empty values count as absent.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup (the environment in production).
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let forum = ForumCredentials {
            client_id: get("REDDIT_CLIENT_ID"),
            client_secret: get("REDDIT_CLIENT_SECRET"),
            user_agent: get("REDDIT_USER_AGENT")
                .map(|ua| sanitize_user_agent(&ua))
                .filter(|ua| !ua.is_empty())
                .unwrap_or_else(|| DEFAULT_FORUM_USER_AGENT.to_string()),
        };

        let defaults = DeliveryConfig::default();
        let delivery = DeliveryConfig {
            provider: get("EMAIL_PROVIDER")
                .map(|p| p.to_lowercase())
                .unwrap_or(defaults.provider),
            resend_api_key: get("RESEND_API_KEY"),
            smtp_server: get("SMTP_SERVER").unwrap_or(defaults.smtp_server),
            smtp_port: get("SMTP_PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.smtp_port),
            email_user: get("EMAIL_USER"),
            email_password: get("EMAIL_PASSWORD"),
            sender_name: get("EMAIL_SENDER_NAME").unwrap_or(defaults.sender_name),
        };

        let config = Self {
            forum,
            delivery,
            ..Self::default()
        };
        config.validate()?;
        Ok(config)
    }

    pub fn with_vocabulary(mut self, vocabulary: Vocabulary) -> Result<Self> {
        self.vocabulary = vocabulary;
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        if self.vocabulary.topic_keywords.iter().all(|k| k.trim().is_empty()) {
            return Err(CuratorError::Configuration(
                "topic vocabulary is empty".to_string(),
            ));
        }
        if self.vocabulary.core_keywords.is_empty() {
            return Err(CuratorError::Configuration(
                "core vocabulary is empty".to_string(),
            ));
        }
        if self.fetch.timeout_seconds == 0 {
            return Err(CuratorError::Configuration(
                "HTTP timeout must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Which optional secrets are present, without their values.
    pub fn describe_credentials(&self) -> Vec<(&'static str, bool)> {
        vec![
            ("REDDIT_CLIENT_ID", self.forum.client_id.is_some()),
            ("REDDIT_CLIENT_SECRET", self.forum.client_secret.is_some()),
            ("RESEND_API_KEY", self.delivery.resend_api_key.is_some()),
            ("EMAIL_USER", self.delivery.email_user.is_some()),
            ("EMAIL_PASSWORD", self.delivery.email_password.is_some()),
        ]
    }

    pub fn log_credentials(&self) {
        for (key, present) in self.describe_credentials() {
            info!("{}: {}", key, if present { "found" } else { "not set" });
        }
        if !self.forum.looks_valid() {
            info!("Forum API credentials unavailable, forum fetchers will use public endpoints");
        }
    }
}

/// Keep word characters, whitespace and `-.:/`, collapse runs of whitespace.
fn sanitize_user_agent(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace() || "_-.:/".contains(*c))
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn empty_values_count_as_absent() {
        let config = CuratorConfig::from_lookup(lookup(&[
            ("REDDIT_CLIENT_ID", "  "),
            ("SMTP_PORT", ""),
            ("SMTP_SERVER", ""),
        ]))
        .unwrap();
        assert!(config.forum.client_id.is_none());
        assert_eq!(config.delivery.smtp_port, 587);
        assert_eq!(config.delivery.smtp_server, "smtp.gmail.com");
        assert!(!config.forum.looks_valid());
    }

    #[test]
    fn user_agent_is_sanitized() {
        let config = CuratorConfig::from_lookup(lookup(&[(
            "REDDIT_USER_AGENT",
            "my<bot>   v1.0 (by u/someone)",
        )]))
        .unwrap();
        assert_eq!(config.forum.user_agent, "mybot v1.0 by u/someone");

        let fallback = CuratorConfig::from_lookup(lookup(&[("REDDIT_USER_AGENT", "<>")])).unwrap();
        assert_eq!(fallback.forum.user_agent, DEFAULT_FORUM_USER_AGENT);
    }

    #[test]
    fn short_credentials_are_not_valid() {
        let creds = ForumCredentials {
            client_id: Some("abc".into()),
            client_secret: Some("longenoughsecret".into()),
            user_agent: String::new(),
        };
        assert!(!creds.looks_valid());
    }

    #[test]
    fn empty_vocabulary_fails_fast() {
        let vocabulary = Vocabulary {
            topic_keywords: vec![],
            ..Vocabulary::default()
        };
        let err = CuratorConfig::default().with_vocabulary(vocabulary).unwrap_err();
        assert!(matches!(err, CuratorError::Configuration(_)));
    }
}
