// Copyright (c) 2025-2026 The agentichat authors
//
// SPDX-License-Identifier: Apache-2.0
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::tool::{arg_str, arg_u64, Tool, ToolResult};

/// Cap on the text returned to the model from a fetched page.
const FETCH_CONTENT_LIMIT: usize = 10_000;
const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 10;
const DEFAULT_SEARCH_RESULTS: u64 = 5;

/// Fetch a URL and return its content as readable text.
pub struct WebFetchTool;

impl WebFetchTool {
    pub fn new() -> Self {
        Self
    }
}

fn web_client() -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::limited(3))
        .user_agent("agentichat/0.4")
        .build()
}

impl Default for WebFetchTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for WebFetchTool {
    fn name(&self) -> &str {
        "web_fetch"
    }

    fn description(&self) -> &str {
        "Fetch the content of a web page. HTML is converted to plain text; \
         the result is truncated to about 10,000 characters."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "url": {
                    "type": "string",
                    "description": "Full URL to fetch (must start with http:// or https://)"
                },
                "timeout": {
                    "type": "integer",
                    "description": "Timeout in seconds (default: 10)",
                    "default": 10
                }
            },
            "required": ["url"]
        })
    }

    async fn execute(&self, args: &Value) -> ToolResult {
        let Some(url) = arg_str(args, "url") else {
            return ToolResult::err("missing 'url'");
        };
        let timeout = arg_u64(args, "timeout", DEFAULT_FETCH_TIMEOUT_SECS);

        if !url.starts_with("http://") && !url.starts_with("https://") {
            return ToolResult::err("URL must start with http:// or https://");
        }

        debug!(url, "web_fetch tool");

        let client = match web_client() {
            Ok(c) => c,
            Err(e) => return ToolResult::err(format!("client error: {e}")),
        };
        let resp = match client
            .get(url)
            .timeout(Duration::from_secs(timeout))
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => return ToolResult::err(format!("connection error: {e}")),
        };

        let status = resp.status();
        if !status.is_success() {
            return ToolResult::fail(json!({
                "error": format!("HTTP error {}", status.as_u16()),
                "status_code": status.as_u16(),
            }));
        }

        let content_type = resp
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("unknown")
            .to_string();
        let body = match resp.text().await {
            Ok(b) => b,
            Err(e) => return ToolResult::err(format!("read error: {e}")),
        };
        let content_length = body.len();

        let mut text = if content_type.contains("html") {
            html2text::from_read(body.as_bytes(), 100)
        } else {
            body
        };
        if text.len() > FETCH_CONTENT_LIMIT {
            let mut cut = FETCH_CONTENT_LIMIT;
            while !text.is_char_boundary(cut) {
                cut -= 1;
            }
            text.truncate(cut);
            text.push_str("... [content truncated]");
        }

        ToolResult::ok(json!({
            "url": url,
            "status_code": status.as_u16(),
            "content": text,
            "content_length": content_length,
            "content_type": content_type,
        }))
    }
}

/// Query the DuckDuckGo instant-answer endpoint and return
/// title/snippet/url triples.
pub struct WebSearchTool {
    endpoint: String,
}

impl WebSearchTool {
    pub fn new() -> Self {
        Self::with_endpoint("https://api.duckduckgo.com/")
    }

    /// Endpoint override for tests.
    pub fn with_endpoint(endpoint: impl Into<String>) -> Self {
        Self { endpoint: endpoint.into() }
    }
}

impl Default for WebSearchTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        "web_search"
    }

    fn description(&self) -> &str {
        "Search the web and return result titles, snippets, and URLs."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "Search query"
                },
                "max_results": {
                    "type": "integer",
                    "description": "Maximum number of results (default: 5)",
                    "default": 5
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, args: &Value) -> ToolResult {
        let Some(query) = arg_str(args, "query") else {
            return ToolResult::err("missing 'query'");
        };
        let max_results = arg_u64(args, "max_results", DEFAULT_SEARCH_RESULTS) as usize;

        debug!(query, max_results, "web_search tool");

        let client = match web_client() {
            Ok(c) => c,
            Err(e) => return ToolResult::err(format!("client error: {e}")),
        };
        let resp = match client
            .get(&self.endpoint)
            .query(&[
                ("q", query),
                ("format", "json"),
                ("no_html", "1"),
                ("skip_disambig", "1"),
            ])
            .timeout(Duration::from_secs(10))
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => return ToolResult::err(format!("connection error: {e}")),
        };

        if !resp.status().is_success() {
            return ToolResult::err(format!("HTTP error {}", resp.status().as_u16()));
        }

        let data: Value = match resp.json().await {
            Ok(d) => d,
            Err(e) => return ToolResult::err(format!("invalid search response: {e}")),
        };

        let results = parse_search_results(&data, max_results);
        ToolResult::ok(json!({
            "query": query,
            "results": results,
            "count": results.len(),
        }))
    }
}

/// Collect the abstract (when present) and related topics into
/// `{title, snippet, url}` triples, capped at `max_results`.
fn parse_search_results(data: &Value, max_results: usize) -> Vec<Value> {
    let mut results = Vec::new();

    if let Some(abstract_text) = data["AbstractText"].as_str().filter(|s| !s.is_empty()) {
        results.push(json!({
            "title": data["Heading"].as_str().unwrap_or("Main result"),
            "snippet": abstract_text,
            "url": data["AbstractURL"].as_str().unwrap_or(""),
        }));
    }

    if let Some(topics) = data["RelatedTopics"].as_array() {
        for topic in topics.iter().take(max_results) {
            if let Some(text) = topic["Text"].as_str() {
                let title: String = text.chars().take(100).collect();
                results.push(json!({
                    "title": title,
                    "snippet": text,
                    "url": topic["FirstURL"].as_str().unwrap_or(""),
                }));
            }
        }
    }

    results.truncate(max_results);
    results
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
