//! Web tools: search and page fetch.
//!
//! `search_web` scrapes the DuckDuckGo HTML endpoint (no API key);
//! `fetch_page` GETs a URL and strips markup down to readable text.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Url;
use reqwest::redirect::Policy;
use serde_json::{Value, json};

use super::traits::{Tool, ToolContext, ToolResult};

/// Maximum page body returned to the model (1 MiB before trimming).
const MAX_RESPONSE_SIZE: usize = 1024 * 1024;

const REQUEST_TIMEOUT_SECS: u64 = 30;

const USER_AGENT: &str = "Mozilla/5.0 (compatible; ratel/0.3)";

fn shared_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
        .redirect(Policy::limited(5))
        .user_agent(USER_AGENT)
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}

fn validate_url(url: &str) -> Result<Url, String> {
    let parsed = Url::parse(url).map_err(|e| format!("invalid URL: {e}"))?;
    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        scheme => Err(format!("unsupported URL scheme: {scheme}")),
    }
}

/// Collapse HTML to plain text: drop script/style blocks, strip tags,
/// decode the common entities, squeeze blank runs.
fn html_to_text(html: &str) -> String {
    let no_scripts = regex::Regex::new(r"(?is)<(script|style)[^>]*>.*?</(script|style)>")
        .map(|re| re.replace_all(html, " ").into_owned())
        .unwrap_or_else(|_| html.to_owned());

    let no_tags = regex::Regex::new(r"(?s)<[^>]+>")
        .map(|re| re.replace_all(&no_scripts, " ").into_owned())
        .unwrap_or(no_scripts);

    let decoded = no_tags
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#x27;", "'")
        .replace("&#39;", "'")
        .replace("&nbsp;", " ");

    decoded
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

// ─── SearchWebTool ───────────────────────────────────────────────────────────

pub struct SearchWebTool {
    client: reqwest::Client,
}

impl SearchWebTool {
    pub fn new() -> Self {
        Self {
            client: shared_client(),
        }
    }
}

impl Default for SearchWebTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for SearchWebTool {
    fn name(&self) -> &str {
        "search_web"
    }

    fn description(&self) -> &str {
        "Search the internet for current info, news, docs."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "Search query" }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, args: Value, _ctx: &ToolContext) -> Result<ToolResult, String> {
        let query = args
            .get("query")
            .and_then(Value::as_str)
            .ok_or("missing required argument 'query'")?;

        let url = format!(
            "https://html.duckduckgo.com/html/?q={}",
            urlencoding::encode(query)
        );
        let body = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| format!("search request failed: {e}"))?
            .text()
            .await
            .map_err(|e| format!("search response error: {e}"))?;

        let results = parse_duckduckgo(&body, 5);
        if results.is_empty() {
            return Ok(ToolResult::ok(format!("No results for '{query}'")));
        }

        let rendered: Vec<String> = results
            .iter()
            .enumerate()
            .map(|(i, (title, link, snippet))| {
                format!("{}. {title}\n   {link}\n   {snippet}", i + 1)
            })
            .collect();
        Ok(ToolResult::ok(rendered.join("\n\n")))
    }
}

/// Pull `(title, url, snippet)` triples out of the DuckDuckGo HTML page.
fn parse_duckduckgo(html: &str, limit: usize) -> Vec<(String, String, String)> {
    let link_re = regex::Regex::new(
        r#"(?s)<a[^>]*class="result__a"[^>]*href="([^"]+)"[^>]*>(.*?)</a>"#,
    );
    let snippet_re =
        regex::Regex::new(r#"(?s)<a[^>]*class="result__snippet"[^>]*>(.*?)</a>"#);

    let (Ok(link_re), Ok(snippet_re)) = (link_re, snippet_re) else {
        return Vec::new();
    };

    let snippets: Vec<String> = snippet_re
        .captures_iter(html)
        .map(|c| html_to_text(&c[1]))
        .collect();

    link_re
        .captures_iter(html)
        .take(limit)
        .enumerate()
        .map(|(i, c)| {
            let href = c[1].to_owned();
            // DuckDuckGo wraps targets in a redirect with `uddg=<url>`.
            let link = href
                .split("uddg=")
                .nth(1)
                .and_then(|rest| rest.split('&').next())
                .and_then(|enc| urlencoding::decode(enc).ok().map(|s| s.into_owned()))
                .unwrap_or(href);
            let title = html_to_text(&c[2]);
            let snippet = snippets.get(i).cloned().unwrap_or_default();
            (title, link, snippet)
        })
        .collect()
}

// ─── FetchPageTool ───────────────────────────────────────────────────────────

pub struct FetchPageTool {
    client: reqwest::Client,
}

impl FetchPageTool {
    pub fn new() -> Self {
        Self {
            client: shared_client(),
        }
    }
}

impl Default for FetchPageTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for FetchPageTool {
    fn name(&self) -> &str {
        "fetch_page"
    }

    fn description(&self) -> &str {
        "Fetch and parse URL content as markdown."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "url": { "type": "string", "description": "URL to fetch" }
            },
            "required": ["url"]
        })
    }

    async fn execute(&self, args: Value, _ctx: &ToolContext) -> Result<ToolResult, String> {
        let url = args
            .get("url")
            .and_then(Value::as_str)
            .ok_or("missing required argument 'url'")?;
        let parsed = validate_url(url)?;

        let response = self
            .client
            .get(parsed)
            .send()
            .await
            .map_err(|e| format!("fetch failed: {e}"))?;

        let status = response.status();
        if !status.is_success() {
            return Err(format!("fetch failed: HTTP {}", status.as_u16()));
        }

        let body = response
            .text()
            .await
            .map_err(|e| format!("fetch body error: {e}"))?;
        let capped = if body.len() > MAX_RESPONSE_SIZE {
            // The cap may land mid-character; back up to a boundary.
            let mut end = MAX_RESPONSE_SIZE;
            while end > 0 && !body.is_char_boundary(end) {
                end -= 1;
            }
            &body[..end]
        } else {
            &body[..]
        };

        Ok(ToolResult::ok(html_to_text(capped)))
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
