/// Feed text cleanup helpers
pub mod feed {
    /// Remove markup and entities from feed text and collapse whitespace.
    pub fn extract_text_from_html(html: &str) -> String {
        let without_tags = html
            .chars()
            .fold((String::new(), false), |(mut text, in_tag), c| match c {
                '<' => (text, true),
                '>' if in_tag => {
                    // Keep words on either side of a tag apart.
                    text.push(' ');
                    (text, false)
                }
                _ if !in_tag => {
                    text.push(c);
                    (text, in_tag)
                }
                _ => (text, in_tag),
            })
            .0;

        html_escape::decode_html_entities(&without_tags)
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Cut `text` to at most `max_chars` characters, never splitting a code point.
    pub fn truncate_chars(text: &str, max_chars: usize) -> String {
        match text.char_indices().nth(max_chars) {
            Some((byte_idx, _)) => text[..byte_idx].to_string(),
            None => text.to_string(),
        }
    }
}

/// URL utilities for feed links
pub mod url {
    use url::Url;

    /// Extract domain from URL
    pub fn extract_domain(url_str: &str) -> Option<String> {
        if let Ok(url) = Url::parse(url_str) {
            url.domain().map(|d| d.to_string())
        } else {
            None
        }
    }

    pub fn is_valid_http_url(url_str: &str) -> bool {
        if let Ok(url) = Url::parse(url_str) {
            url.scheme() == "http" || url.scheme() == "https"
        } else {
            false
        }
    }

    /// True when the link points at one of `redirect_hosts` (or a subdomain of one).
    pub fn is_redirect_link(url_str: &str, redirect_hosts: &[String]) -> bool {
        match extract_domain(url_str) {
            Some(domain) => redirect_hosts
                .iter()
                .any(|host| domain == *host || domain.ends_with(&format!(".{}", host))),
            None => false,
        }
    }

    /// The destination carried in a `url=` query parameter, if any.
    pub fn embedded_target(url_str: &str) -> Option<String> {
        let url = Url::parse(url_str).ok()?;
        url.query_pairs()
            .find(|(k, _)| k == "url")
            .map(|(_, v)| v.into_owned())
            .filter(|v| is_valid_http_url(v))
    }
}
