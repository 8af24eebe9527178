//! Keyword and time-window predicates deciding whether a raw item is in-domain and fresh.

use crate::config::Vocabulary;
use chrono::{DateTime, Duration, NaiveDateTime, TimeZone, Utc};
use serde::Deserialize;
use std::collections::BTreeSet;
use tracing::warn;

/// A timestamp as it arrives from a source, before normalization.
///
/// Deserializes from either a JSON number or a JSON string.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum RawTimestamp {
    /// Seconds since the unix epoch (fractional seconds allowed).
    Unix(f64),
    /// ISO-8601 / RFC 3339 or RFC 2822 text.
    Text(String),
}

/// Normalize a raw timestamp to UTC. Malformed input yields `None` and a warning.
pub fn parse_timestamp(raw: &RawTimestamp) -> Option<DateTime<Utc>> {
    let parsed = match raw {
        RawTimestamp::Unix(secs) => parse_unix(*secs),
        RawTimestamp::Text(text) => parse_text(text.trim()),
    };
    if parsed.is_none() {
        warn!("Unparseable timestamp {:?}, treating item as out of window", raw);
    }
    parsed
}

fn parse_unix(secs: f64) -> Option<DateTime<Utc>> {
    if !secs.is_finite() {
        return None;
    }
    let whole = secs.trunc() as i64;
    let nanos = ((secs - secs.trunc()) * 1e9) as u32;
    Utc.timestamp_opt(whole, nanos).single()
}

fn parse_text(text: &str) -> Option<DateTime<Utc>> {
    if text.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(text) {
        return Some(dt.with_timezone(&Utc));
    }
    // Naive ISO-8601 without an offset is taken as UTC.
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    None
}

/// True iff `now - window <= timestamp <= now`.
pub fn is_within_window(timestamp: DateTime<Utc>, now: DateTime<Utc>, window: Duration) -> bool {
    timestamp >= now - window && timestamp <= now
}

/// Keyword predicates over a lower-cased copy of the vocabulary.
#[derive(Debug, Clone)]
pub struct RelevanceFilter {
    topic: Vec<(String, String)>,
    core: Vec<String>,
    supporting: Vec<String>,
    exclusions: Vec<String>,
}

impl RelevanceFilter {
    pub fn new(vocabulary: &Vocabulary) -> Self {
        let lower = |list: &[String]| -> Vec<String> {
            list.iter()
                .map(|k| k.trim().to_lowercase())
                .filter(|k| !k.is_empty())
                .collect()
        };
        Self {
            topic: vocabulary
                .topic_keywords
                .iter()
                .filter(|k| !k.trim().is_empty())
                .map(|k| (k.trim().to_string(), k.trim().to_lowercase()))
                .collect(),
            core: lower(&vocabulary.core_keywords),
            supporting: lower(&vocabulary.supporting_keywords),
            exclusions: lower(&vocabulary.exclusion_keywords),
        }
    }

    /// Permissive check: any topic keyword appears in `title + " " + body`.
    pub fn is_topic_relevant(&self, title: &str, body: &str) -> bool {
        let text = combined(title, body);
        self.topic.iter().any(|(_, k)| text.contains(k.as_str()))
    }

    /// Strict check for high-trust categories.
    ///
    /// Scores +2 per core keyword and +1 per supporting keyword; any exclusion keyword
    /// rejects. Accepts iff the score reaches 3 with at least one core keyword.
    pub fn is_high_confidence_relevant(&self, title: &str, body: &str) -> bool {
        let text = combined(title, body);
        if self.exclusions.iter().any(|k| text.contains(k.as_str())) {
            return false;
        }
        let core_hits = self.core.iter().filter(|k| text.contains(k.as_str())).count();
        if core_hits == 0 {
            return false;
        }
        let supporting_hits = self
            .supporting
            .iter()
            .filter(|k| text.contains(k.as_str()))
            .count();
        core_hits * 2 + supporting_hits >= 3
    }

    /// Distinct topic keywords present in `text`, in their configured spelling.
    pub fn extract_tags(&self, text: &str) -> BTreeSet<String> {
        let lower = text.to_lowercase();
        self.topic
            .iter()
            .filter(|(_, k)| lower.contains(k.as_str()))
            .map(|(original, _)| original.clone())
            .collect()
    }
}

fn combined(title: &str, body: &str) -> String {
    format!("{} {}", title, body).to_lowercase()
}
