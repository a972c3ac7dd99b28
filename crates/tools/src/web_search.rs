//! DDG_SEARCH action — DuckDuckGo Instant Answer lookup.
//!
//! Uses the keyless `api.duckduckgo.com` JSON endpoint. The abstract (when
//! present) comes first, followed by related topics, up to [`MAX_RESULTS`].

use async_trait::async_trait;
use moltyclaw_core::action::ActionHandler;
use moltyclaw_core::error::ActionError;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

pub const MAX_RESULTS: usize = 5;

const DEFAULT_ENDPOINT: &str = "https://api.duckduckgo.com/";

pub struct WebSearchAction {
    client: reqwest::Client,
    endpoint: String,
}

impl WebSearchAction {
    pub fn new() -> Self {
        Self::with_endpoint(DEFAULT_ENDPOINT)
    }

    pub fn with_endpoint(endpoint: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to create HTTP client");
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }
}

impl Default for WebSearchAction {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct InstantAnswer {
    #[serde(default)]
    heading: String,
    #[serde(default)]
    abstract_text: String,
    #[serde(default, rename = "AbstractURL")]
    abstract_url: String,
    #[serde(default)]
    related_topics: Vec<Topic>,
}

/// Either a single topic or a named group of topics.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Topic {
    Single {
        #[serde(rename = "Text")]
        text: String,
        #[serde(rename = "FirstURL")]
        first_url: String,
    },
    Group {
        #[serde(rename = "Topics")]
        topics: Vec<Topic>,
    },
}

#[derive(Debug, PartialEq)]
struct SearchResult {
    title: String,
    url: String,
    summary: String,
}

fn flatten(topics: &[Topic], out: &mut Vec<SearchResult>) {
    for topic in topics {
        if out.len() >= MAX_RESULTS {
            return;
        }
        match topic {
            Topic::Single { text, first_url } if !text.is_empty() => {
                // Related topic texts read "Title - summary"
                let (title, summary) = text.split_once(" - ").unwrap_or((text.as_str(), text.as_str()));
                out.push(SearchResult {
                    title: title.to_string(),
                    url: first_url.clone(),
                    summary: summary.to_string(),
                });
            }
            Topic::Single { .. } => {}
            Topic::Group { topics } => flatten(topics, out),
        }
    }
}

fn collect_results(answer: &InstantAnswer) -> Vec<SearchResult> {
    let mut results = Vec::new();
    if !answer.abstract_text.is_empty() {
        results.push(SearchResult {
            title: if answer.heading.is_empty() { "Summary".into() } else { answer.heading.clone() },
            url: answer.abstract_url.clone(),
            summary: answer.abstract_text.clone(),
        });
    }
    flatten(&answer.related_topics, &mut results);
    results.truncate(MAX_RESULTS);
    results
}

/// Render an instant answer as the numbered list the model sees.
pub(crate) fn format_answer(answer: &InstantAnswer) -> String {
    let results = collect_results(answer);
    if results.is_empty() {
        return "No results found.".to_string();
    }

    let mut out = String::from("Search results:\n");
    for (idx, r) in results.iter().enumerate() {
        out.push_str(&format!("{}. [{}]({})\nSummary: {}\n\n", idx + 1, r.title, r.url, r.summary));
    }
    out.trim_end().to_string()
}

#[async_trait]
impl ActionHandler for WebSearchAction {
    fn name(&self) -> &str {
        "DDG_SEARCH"
    }

    fn description(&self) -> &str {
        "Search the web with DuckDuckGo, no browser needed"
    }

    fn param_hint(&self) -> &str {
        "the search query"
    }

    async fn execute(&self, param: &str) -> Result<String, ActionError> {
        let query = param.trim();
        if query.is_empty() {
            return Err(ActionError::InvalidParam {
                action: "DDG_SEARCH".into(),
                reason: "empty query".into(),
            });
        }
        debug!(query = %query, "DuckDuckGo search");

        let failed = |reason: String| ActionError::ExecutionFailed {
            action: "DDG_SEARCH".into(),
            reason,
        };

        let response = self
            .client
            .get(&self.endpoint)
            .query(&[
                ("q", query),
                ("format", "json"),
                ("no_html", "1"),
                ("skip_disambig", "1"),
            ])
            .send()
            .await
            .map_err(|e| failed(format!("DuckDuckGo API error: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(failed(format!("DuckDuckGo API returned HTTP {}", status.as_u16())));
        }

        let answer: InstantAnswer = response
            .json()
            .await
            .map_err(|e| failed(format!("Unreadable DuckDuckGo response: {e}")))?;

        Ok(format_answer(&answer))
    }
}
