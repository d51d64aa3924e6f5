//! Contracts for the external collaborators the pipeline consumes.
//!
//! Search, scrape and profile lookups are fail-soft: they absorb their own
//! errors and return an empty value. The classifier returns raw model text
//! and lets the caller decide what an error means; the pipeline always
//! treats it as "no signal".

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{ModelVariant, SearchResultStub};

/// Executes a text query against a search backend.
#[async_trait]
pub trait WebSearchProvider: Send + Sync {
    /// Backend name for logs.
    fn name(&self) -> &str;

    /// Return up to `max_results` ranked stubs. Empty after exhausted retries.
    async fn search(&self, query: &str, max_results: usize) -> Vec<SearchResultStub>;
}

/// Fetches a URL and returns its extracted page text.
#[async_trait]
pub trait WebScraper: Send + Sync {
    /// Empty string on any failure.
    async fn scrape(&self, url: &str) -> String;
}

/// Answers a structured question about a block of context text.
#[async_trait]
pub trait SemanticClassifier: Send + Sync {
    /// Raw model output for `question` asked over `context`.
    async fn analyze(&self, context: &str, question: &str, variant: ModelVariant)
    -> Result<String>;
}

/// Produces target company profile descriptions for a territory.
#[async_trait]
pub trait ProfileSource: Send + Sync {
    /// Empty list on persistent failure.
    async fn get_profiles(&self, territory: &str) -> Vec<String>;
}
