//! DuckDuckGo HTML endpoint backend.

use async_trait::async_trait;
use icpqualifier_shared::{
    QualifierError, Result, RetryPolicy, SearchResultStub, WebSearchProvider, retry_with_backoff,
};
use reqwest::{Client, StatusCode};
use scraper::{Html, Selector};
use tracing::{debug, instrument, warn};
use url::Url;

use crate::{SearchOptions, build_client};

const DEFAULT_BASE_URL: &str = "https://html.duckduckgo.com";

/// Searches via `html.duckduckgo.com/html/`, scraping the result list.
pub struct DuckDuckGoSearch {
    client: Client,
    base_url: String,
    retry: RetryPolicy,
}

impl DuckDuckGoSearch {
    pub fn new(opts: &SearchOptions) -> Result<Self> {
        Ok(Self {
            client: build_client(opts)?,
            base_url: DEFAULT_BASE_URL.to_string(),
            retry: opts.retry,
        })
    }

    /// Point the backend at a different host (mock servers in tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    async fn search_once(&self, query: &str, max_results: usize) -> Result<Vec<SearchResultStub>> {
        let url = format!("{}/html/", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[("q", query)])
            .send()
            .await
            .map_err(|e| QualifierError::Network(format!("duckduckgo: {e}")))?;

        let status = response.status();
        // DuckDuckGo answers 202 with an empty page when it rate-limits.
        if status == StatusCode::ACCEPTED || !status.is_success() {
            return Err(QualifierError::Network(format!("duckduckgo: HTTP {status}")));
        }

        let body = response
            .text()
            .await
            .map_err(|e| QualifierError::Network(format!("duckduckgo: failed to read body: {e}")))?;

        Ok(parse_results(&body, max_results))
    }
}

#[async_trait]
impl WebSearchProvider for DuckDuckGoSearch {
    fn name(&self) -> &str {
        "duckduckgo"
    }

    #[instrument(skip(self), fields(provider = "duckduckgo"))]
    async fn search(&self, query: &str, max_results: usize) -> Vec<SearchResultStub> {
        match retry_with_backoff(self.retry, "duckduckgo search", |_| {
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

// ---------------------------------------------------------------------------
// HTML parsing
// ---------------------------------------------------------------------------

/// Extract up to `max_results` organic results from a results page.
fn parse_results(html: &str, max_results: usize) -> Vec<SearchResultStub> {
    let doc = Html::parse_document(html);
    let result_sel = Selector::parse("div.result").expect("valid selector");
    let title_sel = Selector::parse("a.result__a").expect("valid selector");
    let snippet_sel = Selector::parse(".result__snippet").expect("valid selector");

    doc.select(&result_sel)
        .filter(|el| !el.value().classes().any(|c| c == "result--ad"))
        .filter_map(|el| {
            let anchor = el.select(&title_sel).next()?;
            let title = collapse_whitespace(&anchor.text().collect::<String>());
            let link = anchor.value().attr("href").and_then(clean_result_link);
            let snippet = el
                .select(&snippet_sel)
                .next()
                .map(|s| collapse_whitespace(&s.text().collect::<String>()))
                .unwrap_or_default();
            Some(SearchResultStub {
                title,
                link,
                snippet,
            })
        })
        .take(max_results)
        .collect()
}

/// Resolve DuckDuckGo redirect links (`//duckduckgo.com/l/?uddg=<target>`)
/// to their target URL. Plain absolute links pass through.
fn clean_result_link(href: &str) -> Option<String> {
    let absolute = if href.starts_with("//") {
        format!("https:{href}")
    } else {
        href.to_string()
    };

    let url = Url::parse(&absolute).ok()?;
    if url.path().starts_with("/l/") {
        return url
            .query_pairs()
            .find(|(k, _)| k == "uddg")
            .map(|(_, v)| v.into_owned());
    }

    match url.scheme() {
        "http" | "https" => Some(url.to_string()),
        _ => None,
    }
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}
