//! Google Custom Search JSON API backend.

use async_trait::async_trait;
use icpqualifier_shared::{
    QualifierError, Result, RetryPolicy, SearchResultStub, WebSearchProvider, retry_with_backoff,
};
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, instrument, warn};

use crate::{SearchOptions, build_client};

const DEFAULT_BASE_URL: &str = "https://www.googleapis.com";

/// The API caps `num` at 10 per request.
const MAX_RESULTS_PER_REQUEST: usize = 10;

/// Searches via the Custom Search JSON API (`/customsearch/v1`).
pub struct GoogleSearch {
    client: Client,
    base_url: String,
    api_key: String,
    search_engine_id: String,
    retry: RetryPolicy,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Option<Vec<SearchItem>>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    #[serde(default)]
    title: String,
    #[serde(default)]
    link: Option<String>,
    #[serde(default)]
    snippet: String,
}

impl GoogleSearch {
    pub fn new(
        api_key: impl Into<String>,
        search_engine_id: impl Into<String>,
        opts: &SearchOptions,
    ) -> Result<Self> {
        Ok(Self {
            client: build_client(opts)?,
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: api_key.into(),
            search_engine_id: search_engine_id.into(),
            retry: opts.retry,
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    async fn search_once(&self, query: &str, max_results: usize) -> Result<Vec<SearchResultStub>> {
        let num = max_results.clamp(1, MAX_RESULTS_PER_REQUEST).to_string();
        let url = format!("{}/customsearch/v1", self.base_url);

        let response = self
            .client
            .get(&url)
            .query(&[
                ("key", self.api_key.as_str()),
                ("cx", self.search_engine_id.as_str()),
                ("q", query),
                ("num", num.as_str()),
            ])
            .send()
            .await
            .map_err(|e| QualifierError::Network(format!("google: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(QualifierError::Network(format!("google: HTTP {status}")));
        }

        let body: SearchResponse = response
            .json()
            .await
            .map_err(|e| QualifierError::parse(format!("google: invalid response body: {e}")))?;

        Ok(body
            .items
            .unwrap_or_default()
            .into_iter()
            .take(max_results)
            .map(|item| SearchResultStub {
                title: item.title,
                link: item.link,
                snippet: item.snippet,
            })
            .collect())
    }
}

#[async_trait]
impl WebSearchProvider for GoogleSearch {
    fn name(&self) -> &str {
        "google"
    }

    #[instrument(skip(self), fields(provider = "google"))]
    async fn search(&self, query: &str, max_results: usize) -> Vec<SearchResultStub> {
        if max_results == 0 {
            return Vec::new();
        }

        match retry_with_backoff(self.retry, "google search", |_| {
            self.search_once(query, max_results)
        })
        .await
        {
            Ok(results) => {
                debug!(count = results.len(), "search complete");
                results
            }
            Err(e) => {
                warn!(error = %e, "search failed after retries");
                Vec::new()
            }
        }
    }
}
