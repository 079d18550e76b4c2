//! Web collaborators: search API client and page fetch.
//!
//! `search` returns formatted text ready to drop into an LLM context —
//! title, snippet, and source per result. It never raises: every failure
//! mode maps to an explicit bracketed failure string. `fetch` pulls a page
//! and reduces it to plain text; [`truncate_with_marker`] caps it for
//! display.

use std::time::Duration;

use async_trait::async_trait;

use crate::config::SearchConfig;
use crate::error::truncate_chars;

/// Marker appended when fetched content exceeds the caller's `max_length`.
pub const TRUNCATION_MARKER: &str = "\n\n[content truncated...]";

/// Seam for the web-search collaborator. The formatted-text contract means
/// implementations report failures in-band rather than erroring.
#[async_trait]
pub trait SearchBackend: Send + Sync {
    async fn search(&self, query: &str) -> String;
}

pub struct HttpWebClient {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    result_count: usize,
    timeout_secs: u64,
    fetch_timeout_secs: u64,
}

impl HttpWebClient {
    pub fn new(config: &SearchConfig) -> anyhow::Result<Self> {
        let api_key = std::env::var(&config.api_key_env).unwrap_or_default();
        if api_key.is_empty() {
            tracing::warn!(env = %config.api_key_env, "search API key not set, web_search will be unavailable");
        }
        Ok(Self {
            client: reqwest::Client::new(),
            api_url: config.api_url.clone(),
            api_key,
            result_count: config.result_count,
            timeout_secs: config.timeout_secs,
            fetch_timeout_secs: config.fetch_timeout_secs,
        })
    }

    /// Fetch a page and reduce it to plain text. Failures are reported
    /// in-band, matching the search contract. Callers apply their own
    /// length limit, see [`truncate_with_marker`].
    pub async fn fetch(&self, url: &str) -> String {
        let resp = self
            .client
            .get(url)
            .header(
                "User-Agent",
                "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36",
            )
            .timeout(Duration::from_secs(self.fetch_timeout_secs))
            .send()
            .await;

        let resp = match resp {
            Ok(r) => r,
            Err(e) if e.is_timeout() => return "[fetch timed out]".to_string(),
            Err(e) => return format!("[fetch failed: {e}]"),
        };
        if !resp.status().is_success() {
            return format!("[fetch failed: HTTP {}]", resp.status().as_u16());
        }
        let html = match resp.text().await {
            Ok(t) => t,
            Err(e) => return format!("[fetch failed: {e}]"),
        };

        html_to_text(&html)
    }
}

#[async_trait]
impl SearchBackend for HttpWebClient {
    async fn search(&self, query: &str) -> String {
        if self.api_key.is_empty() {
            return "[search unavailable: API key not configured]".to_string();
        }
        if query.is_empty() {
            return "[search failed: empty query]".to_string();
        }

        let payload = serde_json::json!({
            "query": query,
            "freshness": "noLimit",
            "summary": true,
            "count": self.result_count.min(20),
        });

        let resp = self
            .client
            .post(&self.api_url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .timeout(Duration::from_secs(self.timeout_secs))
            .json(&payload)
            .send()
            .await;

        let resp = match resp {
            Ok(r) => r,
            Err(e) if e.is_timeout() => return "[search timed out]".to_string(),
            Err(e) => return format!("[search error: {e}]"),
        };
        if !resp.status().is_success() {
            return format!("[search failed: HTTP {}]", resp.status().as_u16());
        }

        let data: serde_json::Value = match resp.json().await {
            Ok(v) => v,
            Err(e) => return format!("[search error: {e}]"),
        };
        if data.get("code").and_then(|c| c.as_i64()) != Some(200) {
            let message = data
                .get("message")
                .and_then(|m| m.as_str())
                .unwrap_or("unknown");
            return format!("[search failed: {message}]");
        }

        format_results(&data["data"])
    }
}

/// Format the search API payload as numbered title/snippet/source entries.
fn format_results(data: &serde_json::Value) -> String {
    let results = data["webPages"]["value"].as_array();
    let Some(results) = results.filter(|r| !r.is_empty()) else {
        return "No relevant results found.".to_string();
    };

    let parts: Vec<String> = results
        .iter()
        .enumerate()
        .map(|(i, r)| {
            let title = r["name"].as_str().unwrap_or_default();
            let snippet = r["snippet"].as_str().unwrap_or_default();
            let summary = r["summary"].as_str().unwrap_or_default();
            let url = r["url"].as_str().unwrap_or_default();
            let text = if summary.is_empty() { snippet } else { summary };
            format!("[{}] {}\n{}\nSource: {}", i + 1, title, text, url)
        })
        .collect();
    parts.join("\n\n")
}

/// Truncate to `max_length` chars, appending [`TRUNCATION_MARKER`] only
/// when content was actually dropped.
pub fn truncate_with_marker(text: &str, max_length: usize) -> String {
    if text.chars().count() <= max_length {
        text.to_string()
    } else {
        let mut out = truncate_chars(text, max_length);
        out.push_str(TRUNCATION_MARKER);
        out
    }
}

/// Minimal HTML-to-text reduction: drop script/style elements, turn block
/// tags into line breaks, strip the rest, and normalize whitespace.
pub fn html_to_text(html: &str) -> String {
    let text = strip_element(html, "script");
    let text = strip_element(&text, "style");
    collapse_whitespace(&strip_tags(&text))
}

/// Remove `<tag …>…</tag>` spans, ASCII-case-insensitively.
fn strip_element(html: &str, tag: &str) -> String {
    let open = format!("<{tag}");
    let close = format!("</{tag}>");
    // ASCII-only lowering keeps byte offsets aligned with the original.
    let mut lower = html.to_string();
    lower.make_ascii_lowercase();

    let mut out = String::with_capacity(html.len());
    let mut pos = 0;
    while let Some(found) = lower[pos..].find(&open) {
        let start = pos + found;
        out.push_str(&html[pos..start]);
        match lower[start..].find(&close) {
            Some(end) => pos = start + end + close.len(),
            None => return out,
        }
    }
    out.push_str(&html[pos..]);
    out
}

fn is_block_tag(tag: &str) -> bool {
    let name: String = tag
        .trim()
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_ascii_lowercase();
    matches!(name.as_str(), "br" | "p" | "div" | "li" | "tr")
        || (name.len() == 2 && name.starts_with('h') && name.ends_with(|c: char| c.is_ascii_digit()))
}

/// Remove remaining tags; opening block-level tags become line breaks.
fn strip_tags(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut tag_buf = String::new();
    let mut in_tag = false;
    for c in html.chars() {
        if in_tag {
            if c == '>' {
                in_tag = false;
                if !tag_buf.starts_with('/') && is_block_tag(&tag_buf) {
                    out.push('\n');
                }
                tag_buf.clear();
            } else {
                tag_buf.push(c);
            }
        } else if c == '<' {
            in_tag = true;
        } else {
            out.push(c);
        }
    }
    out
}

/// Collapse space/tab runs to one space and cap newline runs at two.
fn collapse_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut newlines = 0usize;
    let mut pending_space = false;
    for c in text.chars() {
        match c {
            '\n' | '\r' => {
                newlines += 1;
                pending_space = false;
            }
            ' ' | '\t' => pending_space = true,
            _ => {
                if newlines > 0 {
                    out.push_str(if newlines >= 2 { "\n\n" } else { "\n" });
                    newlines = 0;
                    pending_space = false;
                } else if pending_space {
                    out.push(' ');
                    pending_space = false;
                }
                out.push(c);
            }
        }
    }
    out.trim().to_string()
}
