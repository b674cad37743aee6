//! Web search tool: DuckDuckGo instant-answer API with an HTML-scrape
//! fallback. No API key required.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::tools::traits::{Field, FieldKind, ObjectSchema, Tool};

const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Deserialize)]
struct DuckDuckGoResponse {
    #[serde(rename = "AbstractText")]
    abstract_text: Option<String>,
    #[serde(rename = "AbstractURL")]
    abstract_url: Option<String>,
    #[serde(rename = "AbstractSource")]
    abstract_source: Option<String>,
    #[serde(rename = "Heading")]
    heading: Option<String>,
    #[serde(rename = "RelatedTopics")]
    related_topics: Option<Vec<DuckDuckGoTopic>>,
    #[serde(rename = "Results")]
    results: Option<Vec<DuckDuckGoResult>>,
}

#[derive(Debug, Deserialize)]
struct DuckDuckGoTopic {
    #[serde(rename = "Text")]
    text: Option<String>,
    #[serde(rename = "FirstURL")]
    first_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DuckDuckGoResult {
    #[serde(rename = "Text")]
    text: Option<String>,
    #[serde(rename = "FirstURL")]
    first_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

pub struct WebSearchTool {
    client: Client,
    schema: ObjectSchema,
}

impl Default for WebSearchTool {
    fn default() -> Self {
        Self::new()
    }
}

impl WebSearchTool {
    pub fn new() -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .user_agent("taskagent/1.0")
            .build()
            .expect("failed to build web_search HTTP client");

        WebSearchTool {
            client,
            schema: ObjectSchema::new(vec![
                Field { name: "query", kind: FieldKind::String, required: true },
                Field { name: "maxResults", kind: FieldKind::Number, required: false },
            ]),
        }
    }

    async fn search_instant(&self, query: &str, count: usize) -> Result<Vec<SearchResult>> {
        let url = format!(
            "https://api.duckduckgo.com/?q={}&format=json&no_html=1&skip_disambig=1",
            crate::tools::urlencoding::encode(query)
        );

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::Provider(format!("DuckDuckGo request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(Error::Provider(format!(
                "DuckDuckGo search failed with status {}",
                response.status()
            )));
        }

        let ddg: DuckDuckGoResponse = response
            .json()
            .await
            .map_err(|e| Error::Provider(format!("failed to parse DuckDuckGo response: {}", e)))?;

        let mut results = Vec::new();

        if let (Some(text), Some(url), Some(source)) =
            (&ddg.abstract_text, &ddg.abstract_url, &ddg.abstract_source)
        {
            if !text.is_empty() {
                results.push(SearchResult {
                    title: ddg.heading.clone().unwrap_or_else(|| source.clone()),
                    url: url.clone(),
                    snippet: text.clone(),
                });
            }
        }

        if let Some(direct) = ddg.results {
            for r in direct.into_iter().take(count.saturating_sub(results.len())) {
                if let (Some(text), Some(url)) = (r.text, r.first_url) {
                    results.push(SearchResult {
                        title: text.chars().take(100).collect(),
                        url,
                        snippet: text,
                    });
                }
            }
        }

        if let Some(topics) = ddg.related_topics {
            for topic in topics.into_iter().take(count.saturating_sub(results.len())) {
                if let (Some(text), Some(url)) = (topic.text, topic.first_url) {
                    let title = text.split(" - ").next().unwrap_or(&text).to_string();
                    results.push(SearchResult { title, url, snippet: text });
                }
            }
        }

        Ok(results)
    }

    async fn search_html(&self, query: &str, count: usize) -> Result<Vec<SearchResult>> {
        let url = format!(
            "https://html.duckduckgo.com/html/?q={}",
            crate::tools::urlencoding::encode(query)
        );

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::Provider(format!("DuckDuckGo HTML request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(Error::Provider(format!(
                "DuckDuckGo HTML search failed with status {}",
                response.status()
            )));
        }

        let html = response
            .text()
            .await
            .map_err(|e| Error::Provider(format!("failed to read DuckDuckGo response: {}", e)))?;

        let mut results = Vec::new();
        for (i, chunk) in html.split("class=\"result__a\"").skip(1).enumerate() {
            if i >= count {
                break;
            }
            let url = chunk
                .split("href=\"")
                .nth(1)
                .and_then(|s| s.split('"').next())
                .map(|s| s.to_string());
            let title = chunk
                .split('>')
                .nth(1)
                .and_then(|s| s.split('<').next())
                .map(html_decode);
            let snippet = chunk
                .split("class=\"result__snippet\"")
                .nth(1)
                .and_then(|s| s.split('>').nth(1))
                .and_then(|s| s.split('<').next())
                .map(html_decode);

            if let (Some(url), Some(title)) = (url, title) {
                if !url.is_empty() && !title.is_empty() {
                    results.push(SearchResult { title, url, snippet: snippet.unwrap_or_default() });
                }
            }
        }

        Ok(results)
    }
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        "web_search"
    }

    fn description(&self) -> &str {
        "Search the web and return relevant pages with titles, URLs, and snippets. No API key required."
    }

    fn schema(&self) -> &ObjectSchema {
        &self.schema
    }

    fn categories(&self) -> &[&'static str] {
        &["search", "core"]
    }

    async fn run(&self, args: Value) -> Result<Value> {
        let query = args
            .get("query")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::ToolExecutionError("web_search: missing `query`".to_string()))?;
        let count = args
            .get("maxResults")
            .and_then(Value::as_u64)
            .map(|c| (c as usize).clamp(1, 10))
            .unwrap_or(5);

        let results = match self.search_instant(query, count).await {
            Ok(r) if !r.is_empty() => r,
            _ => self.search_html(query, count).await.unwrap_or_default(),
        };

        let snippets: Vec<&str> = results.iter().map(|r| r.snippet.as_str()).collect();
        Ok(json!({
            "query": query,
            "results": results,
            "formatted": format_results(&results),
            "snippetText": snippets.join(" "),
        }))
    }
}

pub(crate) fn format_results(results: &[SearchResult]) -> String {
    let mut out = String::new();
    for (i, r) in results.iter().enumerate() {
        out.push_str(&format!("{}. {}\n   {}\n   {}\n\n", i + 1, r.title, r.url, r.snippet));
    }
    if out.is_empty() {
        out.push_str("No results found.");
    }
    out
}

fn html_decode(s: &str) -> String {
    s.replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&nbsp;", " ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_identity() {
        let tool = WebSearchTool::new();
        assert_eq!(tool.name(), "web_search");
        assert!(tool.categories().contains(&"core"));
    }

    #[test]
    fn html_decode_handles_common_entities() {
        assert_eq!(html_decode("Hello &amp; World"), "Hello & World");
        assert_eq!(html_decode("&lt;tag&gt;"), "<tag>");
    }

    #[test]
    fn format_results_lists_each_entry() {
        let results = vec![SearchResult {
            title: "Test".to_string(),
            url: "https://example.com".to_string(),
            snippet: "A snippet".to_string(),
        }];
        let formatted = format_results(&results);
        assert!(formatted.contains("Test"));
        assert!(formatted.contains("https://example.com"));
    }

    #[test]
    fn url_encoding_escapes_spaces_and_special_chars() {
        assert_eq!(crate::tools::urlencoding::encode("rust lang"), "rust+lang");
        assert_eq!(crate::tools::urlencoding::encode("a/b"), "a%2Fb");
    }
}
