//! Discovery stage: profile → site-scoped search queries → result stubs.

use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use futures::stream::{self, StreamExt};
use tracing::{debug, error, info, instrument};

use icpqualifier_shared::{SearchResultStub, WebSearchProvider};

/// Inputs for one discovery pass.
#[derive(Debug, Clone)]
pub struct DiscoveryOptions {
    /// Site domains to scope queries to, for the current territory.
    pub sources: Vec<String>,
    /// Keywords appended to the profile in every query.
    pub positive_keywords: Vec<String>,
    /// Results requested per query.
    pub results_per_query: usize,
    /// Maximum searches in flight (W1).
    pub max_parallel_searches: usize,
}

/// Cross product of keywords × sources for `profile`, keyword-major.
pub fn build_queries(profile: &str, sources: &[String], keywords: &[String]) -> Vec<String> {
    keywords
        .iter()
        .flat_map(|keyword| {
            sources
                .iter()
                .map(move |source| format!("site:{source} \"{profile} {keyword}\""))
        })
        .collect()
}

/// Run every query for `profile` with at most W1 in flight and flatten the
/// results. A query that comes back empty or panics contributes nothing.
#[instrument(skip_all, fields(profile = %profile))]
pub async fn discover(
    profile: &str,
    opts: &DiscoveryOptions,
    search: &dyn WebSearchProvider,
) -> Vec<SearchResultStub> {
    let queries = build_queries(profile, &opts.sources, &opts.positive_keywords);
    info!(queries = queries.len(), provider = search.name(), "running discovery searches");

    let per_query = opts.results_per_query;
    let batches: Vec<Vec<SearchResultStub>> = stream::iter(queries)
        .map(|query| async move {
            // A panicking query contributes nothing; its siblings keep running.
            match AssertUnwindSafe(search.search(&query, per_query))
                .catch_unwind()
                .await
            {
                Ok(results) => {
                    if results.is_empty() {
                        debug!(%query, "query returned nothing");
                    }
                    results
                }
                Err(_) => {
                    error!(%query, "search query panicked, skipping");
                    Vec::new()
                }
            }
        })
        .buffer_unordered(opts.max_parallel_searches.max(1))
        .collect()
        .await;

    let stubs: Vec<SearchResultStub> = batches.into_iter().flatten().collect();
    info!(stubs = stubs.len(), "discovery complete");
    stubs
}
