//! End-to-end `find` pipeline for one territory:
//! store → profiles → discover → verify/score → enrich → persist.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tracing::{info, instrument, warn};

use icpqualifier_shared::{
    AppConfig, ProfileSource, QualifiedCompany, Result, RetryPolicy, SemanticClassifier,
    WebScraper, WebSearchProvider,
};
use icpqualifier_storage::ResultStore;

use crate::discovery::{self, DiscoveryOptions};
use crate::enrichment::{self, EnrichmentDeps, EnrichmentOptions};
use crate::progress::PipelineProgress;
use crate::state::RunState;
use crate::verification::{self, VerificationDeps, VerificationOptions};

/// Retry applied to company verification and relevance scoring.
const STAGE_RETRY: RetryPolicy = RetryPolicy::fixed_ms(2, 500);

/// Search results requested per financial source.
const RESULTS_PER_FINANCIAL_SOURCE: usize = 2;

/// Everything a run needs besides its collaborators.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub territory: String,
    pub discovery: DiscoveryOptions,
    pub verification: Arc<VerificationOptions>,
    pub enrichment: Arc<EnrichmentOptions>,
    /// Persisted result store.
    pub results_path: PathBuf,
}

impl PipelineOptions {
    /// Resolve options for `territory` from the app config.
    pub fn from_config(config: &AppConfig, territory: &str, limit: Option<usize>) -> Self {
        let discovery = DiscoveryOptions {
            sources: config.discovery.sources_for(territory).to_vec(),
            positive_keywords: config.discovery.positive_keywords.clone(),
            results_per_query: config.discovery.results_per_query,
            max_parallel_searches: config.processing.max_parallel_searches,
        };

        let verification = VerificationOptions {
            heuristic_keywords: config.discovery.heuristic_keywords.clone(),
            relevance_threshold: config.scoring.relevance_threshold,
            ideal_customer: config.scoring.ideal_customer.clone(),
            exemplar_companies: config.scoring.exemplar_companies.clone(),
            disallowed_regions: config.scoring.disallowed_regions.clone(),
            max_parallel_processing: config.processing.max_parallel_processing,
            retry: STAGE_RETRY,
        };

        let enrichment = EnrichmentOptions {
            financial_sources: config.revenue.financial_sources.clone(),
            results_per_source: RESULTS_PER_FINANCIAL_SOURCE,
            minimum_threshold_millions: config.revenue.minimum_threshold_millions,
            fallback_enabled: config.revenue.fallback_enabled,
            max_parallel_enrichment: config.processing.max_parallel_enrichment,
            limit,
        };

        Self {
            territory: territory.to_string(),
            discovery,
            verification: Arc::new(verification),
            enrichment: Arc::new(enrichment),
            results_path: PathBuf::from(&config.paths.results_file),
        }
    }
}

/// The external services a run talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub search: Arc<dyn WebSearchProvider>,
    pub scraper: Arc<dyn WebScraper>,
    pub classifier: Arc<dyn SemanticClassifier>,
    pub profiles: Arc<dyn ProfileSource>,
}

/// Outcome of one territory run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub territory: String,
    pub profiles: Vec<String>,
    /// Search result stubs collected across all profiles.
    pub stubs_found: usize,
    /// Candidates that passed relevance scoring.
    pub candidates: usize,
    /// Companies newly qualified in this run.
    pub qualified: Vec<QualifiedCompany>,
    /// Entries in the result store after the run.
    pub store_size: usize,
    pub started_at: DateTime<Utc>,
    pub elapsed: Duration,
}

/// Run the full `find` pipeline for one territory.
///
/// Collaborator failures never abort the run; they shrink the result. The
/// only error returned is a failure to write the result store.
#[instrument(skip_all, fields(territory = %opts.territory))]
pub async fn find_companies(
    opts: &PipelineOptions,
    collab: &Collaborators,
    progress: &dyn PipelineProgress,
) -> Result<RunReport> {
    let start = Instant::now();
    let started_at = Utc::now();
    info!(limit = ?opts.enrichment.limit, "starting territory run");

    // --- Phase 1: Result store ---
    progress.phase("Loading result store");
    let mut store = ResultStore::load(&opts.results_path).await;
    let state = Arc::new(RunState::with_known_names(store.names()));
    info!(known = store.len(), "loaded previously qualified companies");

    // --- Phase 2: Profiles ---
    progress.phase("Generating profiles");
    let profiles = collab.profiles.get_profiles(&opts.territory).await;
    if profiles.is_empty() {
        warn!("no profiles generated, nothing to discover");
    }
    if opts.discovery.sources.is_empty() {
        warn!("no discovery sources configured for territory");
    }

    // --- Phase 3: Discovery + verification, per profile ---
    let verification_deps = VerificationDeps {
        classifier: collab.classifier.clone(),
        scraper: collab.scraper.clone(),
    };
    let mut candidates = Vec::new();
    let mut stubs_found = 0;

    for (i, profile) in profiles.iter().enumerate() {
        progress.profile_started(i + 1, profiles.len(), profile);

        let stubs = discovery::discover(profile, &opts.discovery, collab.search.as_ref()).await;
        stubs_found += stubs.len();
        if stubs.is_empty() {
            continue;
        }

        let accepted = verification::verify_and_score(
            stubs,
            opts.verification.clone(),
            verification_deps.clone(),
            state.clone(),
        )
        .await;
        for candidate in &accepted {
            progress.candidate_accepted(candidate);
        }
        candidates.extend(accepted);
    }
    let candidate_count = candidates.len();
    info!(stubs_found, candidates = candidate_count, "discovery complete");

    // --- Phase 4: Enrichment ---
    progress.phase("Checking revenue");
    let qualified = enrichment::enrich_companies(
        candidates,
        opts.enrichment.clone(),
        EnrichmentDeps {
            search: collab.search.clone(),
            classifier: collab.classifier.clone(),
        },
        state,
        progress,
    )
    .await;

    // --- Phase 5: Persist ---
    if qualified.is_empty() {
        info!("no new companies qualified, store left untouched");
    } else {
        progress.phase("Saving results");
        let added = store.merge(&qualified)?;
        store.save().await?;
        info!(added, total = store.len(), path = %opts.results_path.display(), "results saved");
    }

    let report = RunReport {
        territory: opts.territory.clone(),
        profiles,
        stubs_found,
        candidates: candidate_count,
        qualified,
        store_size: store.len(),
        started_at,
        elapsed: start.elapsed(),
    };

    info!(
        qualified = report.qualified.len(),
        elapsed_ms = report.elapsed.as_millis() as u64,
        "territory run complete"
    );
    progress.done(&report);

    Ok(report)
}
