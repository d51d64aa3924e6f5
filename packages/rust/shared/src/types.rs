//! Core domain types flowing through the qualification pipeline.
//!
//! Lifecycle: [`SearchResultStub`] → (verify) → [`CandidateCompany`] →
//! (score, enrich) → [`QualifiedCompany`] → result store.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// SearchResultStub
// ---------------------------------------------------------------------------

/// A ranked result returned by a web search backend.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SearchResultStub {
    /// Result title as shown by the search engine.
    #[serde(default)]
    pub title: String,
    /// Target URL. Some backends return entries without one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    /// Short text excerpt.
    #[serde(default)]
    pub snippet: String,
}

impl SearchResultStub {
    /// Build a stub with all three fields present.
    pub fn new(title: impl Into<String>, link: impl Into<String>, snippet: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            link: Some(link.into()),
            snippet: snippet.into(),
        }
    }

    /// The link, if present and non-blank.
    pub fn link(&self) -> Option<&str> {
        self.link.as_deref().map(str::trim).filter(|l| !l.is_empty())
    }
}

// ---------------------------------------------------------------------------
// CandidateCompany
// ---------------------------------------------------------------------------

/// A search result verified as a real company and judged relevant.
///
/// `page_text` is transient: it is consumed when the company is enriched
/// and never reaches the result store.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateCompany {
    /// Verified company name; the dedup key.
    pub name: String,
    /// Website the search result pointed to.
    pub website: String,
    /// Extracted page text (may be empty).
    pub page_text: String,
}

impl CandidateCompany {
    /// Consume the candidate, discarding its page text, and attach a revenue estimate.
    pub fn qualify(self, estimated_revenue_in_millions: f64) -> QualifiedCompany {
        QualifiedCompany {
            name: self.name,
            website: self.website,
            estimated_revenue_in_millions,
        }
    }
}

// ---------------------------------------------------------------------------
// QualifiedCompany
// ---------------------------------------------------------------------------

/// A company that passed relevance scoring and met the revenue threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualifiedCompany {
    pub name: String,
    pub website: String,
    pub estimated_revenue_in_millions: f64,
}

// ---------------------------------------------------------------------------
// ModelVariant
// ---------------------------------------------------------------------------

/// Which classifier model to use for a judgment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelVariant {
    /// Fast, structured-output model (verification, premium revenue lookup).
    Fast,
    /// Creative, nuanced model (relevance scoring, revenue inference).
    Creative,
}

impl ModelVariant {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fast => "fast",
            Self::Creative => "creative",
        }
    }
}

impl std::fmt::Display for ModelVariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
