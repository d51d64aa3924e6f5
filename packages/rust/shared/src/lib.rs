//! Shared types, error model, collaborator contracts, and configuration.
//!
//! This crate is the foundation depended on by all other qualifier crates.
//! It provides:
//! - [`QualifierError`]: the unified error type
//! - Domain types ([`SearchResultStub`], [`CandidateCompany`], [`QualifiedCompany`])
//! - Collaborator traits ([`WebSearchProvider`], [`WebScraper`], [`SemanticClassifier`], [`ProfileSource`])
//! - Configuration ([`AppConfig`], config loading and validation)
//! - [`retry_with_backoff`]: the fixed-delay retry used at every collaborator call site

pub mod collaborators;
pub mod config;
pub mod error;
pub mod retry;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use collaborators::{ProfileSource, SemanticClassifier, WebScraper, WebSearchProvider};
pub use config::{
    AppConfig, DiscoveryConfig, GoogleSearchConfig, LlmConfig, PathsConfig, ProcessingConfig,
    RevenueConfig, ScoringConfig, ScraperConfig, SearchConfig, config_dir, config_file_path,
    init_config, load_config, load_config_from, validate_config,
};
pub use error::{QualifierError, Result};
pub use retry::{RetryPolicy, retry_with_backoff};
pub use types::{CandidateCompany, ModelVariant, QualifiedCompany, SearchResultStub};
