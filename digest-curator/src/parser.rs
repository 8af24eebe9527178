use crate::types::{CuratorError, Result};
use chrono::{DateTime, Utc};
use feed_rs::parser;
use std::collections::HashSet;
use tracing::debug;

/// An entry that carried everything needed to become a content item.
#[derive(Debug, Clone)]
pub struct ParsedEntry {
    pub guid: Option<String>,
    pub url: String,
    pub title: String,
    /// Raw summary or content body, markup not yet stripped.
    pub summary: String,
    pub authors: Vec<String>,
    pub published_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct ParsedFeed {
    pub title: Option<String>,
    pub entries: Vec<ParsedEntry>,
    /// Entries dropped for a missing title, link or timestamp.
    pub skipped: usize,
}

pub struct FeedParser {
    seen_guids: HashSet<String>,
    seen_urls: HashSet<String>,
}

impl Default for FeedParser {
    fn default() -> Self {
        Self::new()
    }
}

impl FeedParser {
    pub fn new() -> Self {
        Self {
            seen_guids: HashSet::new(),
            seen_urls: HashSet::new(),
        }
    }

    /// Parse an RSS, Atom or JSON feed document, reading at most `max_entries` entries.
    ///
    /// Entries already seen by this parser (same guid or link) are dropped silently.
    pub fn parse_feed(&mut self, content: &str, max_entries: usize) -> Result<ParsedFeed> {
        debug!("Parsing feed content ({} bytes)", content.len());

        let feed = parser::parse(content.as_bytes())
            .map_err(|e| CuratorError::Parse(format!("Failed to parse feed: {}", e)))?;

        let mut parsed = ParsedFeed {
            title: feed.title.map(|t| t.content),
            ..ParsedFeed::default()
        };

        for entry in feed.entries.into_iter().take(max_entries) {
            match Self::extract_entry(entry) {
                Some(entry) => {
                    if self.is_duplicate(&entry) {
                        debug!("Skipping duplicate entry: {}", entry.url);
                        continue;
                    }
                    parsed.entries.push(entry);
                }
                None => parsed.skipped += 1,
            }
        }

        debug!(
            "Parsed feed with {} entries ({} skipped)",
            parsed.entries.len(),
            parsed.skipped
        );
        Ok(parsed)
    }

    fn extract_entry(entry: feed_rs::model::Entry) -> Option<ParsedEntry> {
        let title = entry
            .title
            .map(|t| t.content)
            .filter(|t| !t.trim().is_empty())?;

        let url = entry
            .links
            .iter()
            .find(|l| l.rel.as_deref() == Some("alternate"))
            .or_else(|| entry.links.first())
            .map(|l| l.href.trim().to_string())
            .filter(|href| !href.is_empty())?;

        let published_at = entry
            .published
            .or(entry.updated)
            .map(|dt| dt.with_timezone(&Utc))?;

        let guid = if entry.id.is_empty() {
            None
        } else {
            Some(entry.id)
        };

        // Prefer the summary; fall back to full content.
        let summary = entry
            .summary
            .map(|s| s.content)
            .or_else(|| entry.content.and_then(|c| c.body))
            .unwrap_or_default();

        let authors = entry
            .authors
            .into_iter()
            .map(|a| a.name.trim().to_string())
            .filter(|name| !name.is_empty())
            .collect();

        Some(ParsedEntry {
            guid,
            url,
            title,
            summary,
            authors,
            published_at,
        })
    }

    fn is_duplicate(&mut self, entry: &ParsedEntry) -> bool {
        if let Some(guid) = &entry.guid {
            if !self.seen_guids.insert(guid.clone()) {
                return true;
            }
        }
        !self.seen_urls.insert(entry.url.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RSS: &str = r#"<?xml version="1.0"?>
<rss version="2.0"><channel><title>Lab</title>
<item><title>First</title><link>https://lab.test/1</link><guid>1</guid>
  <pubDate>Sat, 01 Mar 2025 12:00:00 GMT</pubDate><description>one</description></item>
<item><title>Repeat</title><link>https://lab.test/1-copy</link><guid>1</guid>
  <pubDate>Sat, 01 Mar 2025 12:00:00 GMT</pubDate></item>
<item><title>No date</title><link>https://lab.test/2</link><guid>2</guid></item>
<item><link>https://lab.test/3</link><guid>3</guid><pubDate>Sat, 01 Mar 2025 12:00:00 GMT</pubDate></item>
</channel></rss>"#;

    #[test]
    fn incomplete_entries_are_counted_and_duplicates_dropped() {
        let mut parser = FeedParser::new();
        let feed = parser.parse_feed(RSS, 10).unwrap();
        assert_eq!(feed.title.as_deref(), Some("Lab"));
        assert_eq!(feed.entries.len(), 1);
        assert_eq!(feed.entries[0].summary, "one");
        assert_eq!(feed.skipped, 2);
    }

    #[test]
    fn entry_limit_applies_before_filtering() {
        let mut parser = FeedParser::new();
        let feed = parser.parse_feed(RSS, 1).unwrap();
        assert_eq!(feed.entries.len(), 1);
        assert_eq!(feed.skipped, 0);
    }

    #[test]
    fn garbage_is_a_parse_error() {
        let mut parser = FeedParser::new();
        assert!(matches!(
            parser.parse_feed("not a feed", 10),
            Err(CuratorError::Parse(_))
        ));
    }
}
