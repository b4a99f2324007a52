//! Web search backends.
//!
//! Every failure a backend can hit, from missing credentials to HTTP
//! errors, surfaces as `Error::SearchUnavailable` so the research loop can
//! switch to offline mode instead of failing the node.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::config::SearchConfig;
use crate::{slog_debug, Error, Result};

/// `search(query) -> text`.
#[async_trait]
pub trait SearchTool: Send + Sync {
    async fn search(&self, query: &str) -> Result<String>;

    /// Whether a call could succeed at all. Checked before a node starts.
    fn is_available(&self) -> bool {
        true
    }
}

/// Google Custom Search JSON API.
pub struct GoogleSearch {
    client: reqwest::Client,
    config: SearchConfig,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    #[serde(default)]
    title: String,
    #[serde(default)]
    link: String,
    #[serde(default)]
    snippet: String,
}

impl GoogleSearch {
    pub fn new(config: SearchConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self { client, config })
    }

    fn format_items(query: &str, items: &[SearchItem]) -> String {
        if items.is_empty() {
            return format!("No results found for '{}'.", query);
        }
        items
            .iter()
            .enumerate()
            .map(|(i, item)| {
                format!(
                    "{}. {}\n   {}\n   {}",
                    i + 1,
                    item.title.trim(),
                    item.link.trim(),
                    item.snippet.replace('\n', " ").trim()
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[async_trait]
impl SearchTool for GoogleSearch {
    async fn search(&self, query: &str) -> Result<String> {
        let (Some(key), Some(cx)) = (&self.config.api_key, &self.config.engine_id) else {
            return Err(Error::SearchUnavailable(
                "search credentials are not configured".to_string(),
            ));
        };

        let num = self.config.results_per_query.clamp(1, 10).to_string();
        let response = self
            .client
            .get(&self.config.endpoint)
            .query(&[
                ("key", key.as_str()),
                ("cx", cx.as_str()),
                ("q", query),
                ("num", num.as_str()),
            ])
            .send()
            .await
            .map_err(|e| Error::SearchUnavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::SearchUnavailable(format!(
                "search returned HTTP {}",
                status
            )));
        }

        let body: SearchResponse = response
            .json()
            .await
            .map_err(|e| Error::SearchUnavailable(format!("unreadable search response: {}", e)))?;

        slog_debug!("search '{}' returned {} items", query, body.items.len());
        Ok(Self::format_items(query, &body.items))
    }

    fn is_available(&self) -> bool {
        self.config.has_credentials()
    }
}

/// A search tool that is never available, for `--offline` runs.
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineSearch;

#[async_trait]
impl SearchTool for OfflineSearch {
    async fn search(&self, _query: &str) -> Result<String> {
        Err(Error::SearchUnavailable("search is disabled".to_string()))
    }

    fn is_available(&self) -> bool {
        false
    }
}
