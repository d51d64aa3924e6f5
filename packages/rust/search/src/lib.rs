//! Web search backends.
//!
//! Discovery and revenue lookups both go through a [`WebSearchProvider`].
//! Two backends are available: DuckDuckGo's HTML endpoint (no credentials)
//! and Google Custom Search (API key + engine id from the environment).
//! Each backend retries transient failures itself and returns an empty list
//! once its retries are exhausted.

mod duckduckgo;
mod google;

use std::sync::Arc;
use std::time::Duration;

use icpqualifier_shared::{QualifierError, Result, RetryPolicy, SearchConfig, WebSearchProvider};
use reqwest::Client;
use tracing::{info, warn};

pub use duckduckgo::DuckDuckGoSearch;
pub use google::GoogleSearch;

/// User-Agent string for search requests.
const USER_AGENT: &str = concat!(
    "Mozilla/5.0 (compatible; ICPQualifier/",
    env!("CARGO_PKG_VERSION"),
    ")"
);

/// Maximum number of redirects to follow for a search request.
const MAX_REDIRECTS: usize = 3;

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Transport and retry settings shared by every backend.
#[derive(Debug, Clone)]
pub struct SearchOptions {
    /// Timeout for a single HTTP request.
    pub timeout_secs: u64,
    /// Attempts and fixed delay per query.
    pub retry: RetryPolicy,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self::from(&SearchConfig::default())
    }
}

impl From<&SearchConfig> for SearchOptions {
    fn from(config: &SearchConfig) -> Self {
        Self {
            timeout_secs: config.timeout_secs,
            retry: RetryPolicy::fixed_ms(config.max_retries, config.retry_delay_ms),
        }
    }
}

// ---------------------------------------------------------------------------
// Provider selection
// ---------------------------------------------------------------------------

/// Build the backend named by `config.provider`.
///
/// `google` without credentials falls back to DuckDuckGo with a warning.
/// An unknown provider name is a configuration error.
pub fn build_search_provider(config: &SearchConfig) -> Result<Arc<dyn WebSearchProvider>> {
    let opts = SearchOptions::from(config);

    match config.provider.as_str() {
        "google" => match config.google.credentials() {
            Some((api_key, cse_id)) => {
                info!("using Google Custom Search");
                Ok(Arc::new(GoogleSearch::new(api_key, cse_id, &opts)?))
            }
            None => {
                warn!(
                    key_env = %config.google.api_key_env,
                    cse_env = %config.google.search_engine_id_env,
                    "Google API credentials not configured, falling back to DuckDuckGo"
                );
                Ok(Arc::new(DuckDuckGoSearch::new(&opts)?))
            }
        },
        "ddgs" | "duckduckgo" => {
            info!("using DuckDuckGo search");
            Ok(Arc::new(DuckDuckGoSearch::new(&opts)?))
        }
        other => Err(QualifierError::config(format!(
            "unknown search provider '{other}': expected 'ddgs' or 'google'"
        ))),
    }
}

/// Build a reqwest client with appropriate settings.
fn build_client(opts: &SearchOptions) -> Result<Client> {
    Client::builder()
        .user_agent(USER_AGENT)
        .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
        .timeout(Duration::from_secs(opts.timeout_secs))
        .build()
        .map_err(|e| QualifierError::Network(format!("failed to build HTTP client: {e}")))
}
