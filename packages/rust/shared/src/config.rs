//! Application configuration for the ICP qualifier.
//!
//! User config lives at `~/.icpqualifier/icpqualifier.toml` unless a path is
//! given explicitly. Secrets never live in the file: it only names the
//! environment variables that hold them.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{QualifierError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "icpqualifier.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".icpqualifier";

// ---------------------------------------------------------------------------
// Config structs (matching icpqualifier.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub search: SearchConfig,

    #[serde(default)]
    pub llm: LlmConfig,

    #[serde(default)]
    pub scraper: ScraperConfig,

    #[serde(default)]
    pub discovery: DiscoveryConfig,

    #[serde(default)]
    pub scoring: ScoringConfig,

    #[serde(default)]
    pub revenue: RevenueConfig,

    #[serde(default)]
    pub processing: ProcessingConfig,

    #[serde(default)]
    pub paths: PathsConfig,
}

/// `[search]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Backend: "ddgs" or "google".
    #[serde(default = "default_provider")]
    pub provider: String,

    /// Attempts per query before giving up.
    #[serde(default = "default_search_retries")]
    pub max_retries: u32,

    /// Fixed delay between attempts.
    #[serde(default = "default_search_retry_delay")]
    pub retry_delay_ms: u64,

    /// Per-request timeout.
    #[serde(default = "default_search_timeout")]
    pub timeout_secs: u64,

    #[serde(default)]
    pub google: GoogleSearchConfig,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            max_retries: default_search_retries(),
            retry_delay_ms: default_search_retry_delay(),
            timeout_secs: default_search_timeout(),
            google: GoogleSearchConfig::default(),
        }
    }
}

fn default_provider() -> String {
    "ddgs".into()
}
fn default_search_retries() -> u32 {
    3
}
fn default_search_retry_delay() -> u64 {
    2_000
}
fn default_search_timeout() -> u64 {
    20
}

/// `[search.google]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoogleSearchConfig {
    /// Name of the env var holding the API key.
    #[serde(default = "default_google_key_env")]
    pub api_key_env: String,

    /// Name of the env var holding the Custom Search Engine id.
    #[serde(default = "default_google_cse_env")]
    pub search_engine_id_env: String,
}

impl Default for GoogleSearchConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_google_key_env(),
            search_engine_id_env: default_google_cse_env(),
        }
    }
}

fn default_google_key_env() -> String {
    "GOOGLE_API_KEY".into()
}
fn default_google_cse_env() -> String {
    "GOOGLE_CSE_ID".into()
}

impl GoogleSearchConfig {
    /// Resolve `(api_key, search_engine_id)` from the environment.
    /// `None` when either is unset or empty.
    pub fn credentials(&self) -> Option<(String, String)> {
        let key = std::env::var(&self.api_key_env).ok().filter(|v| !v.is_empty())?;
        let cse = std::env::var(&self.search_engine_id_env)
            .ok()
            .filter(|v| !v.is_empty())?;
        Some((key, cse))
    }
}

/// `[llm]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Ollama server root.
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,

    /// Model used for structured, fast judgments.
    #[serde(default = "default_fast_model")]
    pub fast_model: String,

    /// Model used for nuanced judgments.
    #[serde(default = "default_creative_model")]
    pub creative_model: String,

    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: default_llm_base_url(),
            fast_model: default_fast_model(),
            creative_model: default_creative_model(),
            timeout_secs: default_llm_timeout(),
        }
    }
}

fn default_llm_base_url() -> String {
    "http://localhost:11434".into()
}
fn default_fast_model() -> String {
    "llama3:latest".into()
}
fn default_creative_model() -> String {
    "deepseek-llm:7b".into()
}
fn default_llm_timeout() -> u64 {
    120
}

/// `[scraper]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScraperConfig {
    #[serde(default = "default_scraper_timeout")]
    pub timeout_secs: u64,

    /// Page text longer than this is truncated before classification.
    #[serde(default = "default_max_page_chars")]
    pub max_page_chars: usize,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_scraper_timeout(),
            max_page_chars: default_max_page_chars(),
        }
    }
}

fn default_scraper_timeout() -> u64 {
    30
}
fn default_max_page_chars() -> usize {
    12_000
}

/// `[discovery]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// Territory whose sources are used when a territory has none.
    #[serde(default = "default_fallback_territory")]
    pub fallback_territory: String,

    /// Keywords combined with each profile to form search queries.
    #[serde(default = "default_positive_keywords")]
    pub positive_keywords: Vec<String>,

    /// Page text must contain one of these before it is scored.
    #[serde(default = "default_heuristic_keywords")]
    pub heuristic_keywords: Vec<String>,

    /// Stubs requested per discovery query.
    #[serde(default = "default_results_per_query")]
    pub results_per_query: usize,

    /// Site domains to search, per territory.
    #[serde(default = "default_sources")]
    pub sources: BTreeMap<String, Vec<String>>,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            fallback_territory: default_fallback_territory(),
            positive_keywords: default_positive_keywords(),
            heuristic_keywords: default_heuristic_keywords(),
            results_per_query: default_results_per_query(),
            sources: default_sources(),
        }
    }
}

impl DiscoveryConfig {
    /// Sources for `territory`, falling back to the fallback territory's list.
    pub fn sources_for(&self, territory: &str) -> &[String] {
        self.sources
            .get(territory)
            .or_else(|| self.sources.get(&self.fallback_territory))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

fn default_sources() -> BTreeMap<String, Vec<String>> {
    BTreeMap::from([
        (
            "USA".to_string(),
            vec!["linkedin.com/company".to_string(), "crunchbase.com/organization".to_string()],
        ),
        (
            "Europe".to_string(),
            vec!["linkedin.com/company".to_string(), "europages.co.uk".to_string()],
        ),
    ])
}
fn default_fallback_territory() -> String {
    "USA".into()
}
fn default_positive_keywords() -> Vec<String> {
    vec!["fleet management".into(), "telematics".into(), "dashcam".into()]
}
fn default_heuristic_keywords() -> Vec<String> {
    vec![
        "fleet".into(),
        "telematics".into(),
        "dashcam".into(),
        "dash cam".into(),
        "vehicle".into(),
        "gps tracking".into(),
    ]
}
fn default_results_per_query() -> usize {
    2
}

/// `[scoring]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringConfig {
    /// One-line description of the ideal customer, completes "My ideal customer ...".
    #[serde(default = "default_ideal_customer")]
    pub ideal_customer: String,

    /// Perfect-fit examples shown to the classifier.
    #[serde(default = "default_exemplars")]
    pub exemplar_companies: Vec<String>,

    /// Minimum relevance score (0-10) to keep a candidate.
    #[serde(default = "default_relevance_threshold")]
    pub relevance_threshold: u8,

    /// Companies primarily based here always score 0.
    #[serde(default = "default_disallowed_regions")]
    pub disallowed_regions: Vec<String>,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            ideal_customer: default_ideal_customer(),
            exemplar_companies: default_exemplars(),
            relevance_threshold: default_relevance_threshold(),
            disallowed_regions: default_disallowed_regions(),
        }
    }
}

fn default_ideal_customer() -> String {
    "works in fleet management, telematics, or automotive electronics".into()
}
fn default_exemplars() -> Vec<String> {
    vec!["Samsara".into(), "Motive".into(), "Lytx".into(), "Netradyne".into()]
}
fn default_relevance_threshold() -> u8 {
    7
}
fn default_disallowed_regions() -> Vec<String> {
    vec!["China".into(), "Hong Kong".into(), "Taiwan".into()]
}

/// `[revenue]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevenueConfig {
    /// Financial-data site domains, tried in order.
    #[serde(default = "default_financial_sources")]
    pub financial_sources: Vec<String>,

    /// Minimum estimated annual revenue, in millions.
    #[serde(default = "default_revenue_threshold")]
    pub minimum_threshold_millions: f64,

    /// Infer revenue from page text when no financial source answers.
    #[serde(default = "default_true")]
    pub fallback_enabled: bool,
}

impl Default for RevenueConfig {
    fn default() -> Self {
        Self {
            financial_sources: default_financial_sources(),
            minimum_threshold_millions: default_revenue_threshold(),
            fallback_enabled: true,
        }
    }
}

fn default_financial_sources() -> Vec<String> {
    vec!["zoominfo.com".into(), "growjo.com".into(), "owler.com".into()]
}
fn default_revenue_threshold() -> f64 {
    15.0
}
fn default_true() -> bool {
    true
}

/// `[processing]` section: worker pool sizes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingConfig {
    #[serde(default = "default_parallel_searches")]
    pub max_parallel_searches: usize,

    #[serde(default = "default_parallel_processing")]
    pub max_parallel_processing: usize,

    #[serde(default = "default_parallel_enrichment")]
    pub max_parallel_enrichment: usize,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            max_parallel_searches: default_parallel_searches(),
            max_parallel_processing: default_parallel_processing(),
            max_parallel_enrichment: default_parallel_enrichment(),
        }
    }
}

fn default_parallel_searches() -> usize {
    15
}
fn default_parallel_processing() -> usize {
    10
}
fn default_parallel_enrichment() -> usize {
    10
}

/// `[paths]` section. Relative paths resolve against the working directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// JSON file holding every qualified company found so far.
    #[serde(default = "default_results_file")]
    pub results_file: String,

    /// Directory of `.md` / `.txt` documents backing profile generation.
    #[serde(default = "default_knowledge_dir")]
    pub knowledge_dir: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            results_file: default_results_file(),
            knowledge_dir: default_knowledge_dir(),
        }
    }
}

fn default_results_file() -> String {
    "results.json".into()
}
fn default_knowledge_dir() -> String {
    "Data".into()
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.icpqualifier/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| QualifierError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.icpqualifier/icpqualifier.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| QualifierError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| QualifierError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| QualifierError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let content = toml::to_string_pretty(&AppConfig::default())
        .map_err(|e| QualifierError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| QualifierError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Reject configurations the pipeline cannot run with.
///
/// Called once at startup; nothing after this point is fatal.
pub fn validate_config(config: &AppConfig) -> Result<()> {
    let p = &config.processing;
    for (name, value) in [
        ("max_parallel_searches", p.max_parallel_searches),
        ("max_parallel_processing", p.max_parallel_processing),
        ("max_parallel_enrichment", p.max_parallel_enrichment),
    ] {
        if value == 0 {
            return Err(QualifierError::config(format!(
                "processing.{name} must be at least 1"
            )));
        }
    }

    if config.discovery.positive_keywords.is_empty() {
        return Err(QualifierError::config(
            "discovery.positive_keywords must list at least one keyword",
        ));
    }

    if config.discovery.sources.values().all(Vec::is_empty) {
        return Err(QualifierError::config(
            "discovery.sources must list at least one site for some territory",
        ));
    }

    if config.discovery.results_per_query == 0 {
        return Err(QualifierError::config(
            "discovery.results_per_query must be at least 1",
        ));
    }

    if config.scoring.relevance_threshold > 10 {
        return Err(QualifierError::config(format!(
            "scoring.relevance_threshold must be between 0 and 10, got {}",
            config.scoring.relevance_threshold
        )));
    }

    let threshold = config.revenue.minimum_threshold_millions;
    if !threshold.is_finite() || threshold < 0.0 {
        return Err(QualifierError::config(format!(
            "revenue.minimum_threshold_millions must be a non-negative number, got {threshold}"
        )));
    }

    if config.search.max_retries == 0 {
        return Err(QualifierError::config("search.max_retries must be at least 1"));
    }

    Ok(())
}
