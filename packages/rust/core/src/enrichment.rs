//! Revenue enrichment stage.
//!
//! Each relevant candidate gets a revenue estimate: premium financial sites
//! first, in configured order, then page-text inference as a fallback.
//! Companies at or above the threshold qualify. Work runs with at most W3
//! tasks in flight and stops early once the optional result limit is hit.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument};

use icpqualifier_shared::{
    CandidateCompany, ModelVariant, QualifiedCompany, SemanticClassifier, WebSearchProvider,
};

use crate::decode::{lenient_f64, non_blank_str, parse_llm_object};
use crate::progress::PipelineProgress;
use crate::prompts;
use crate::state::{Admission, RunState};

#[derive(Debug, Clone)]
pub struct EnrichmentOptions {
    /// Financial data site domains, tried in order.
    pub financial_sources: Vec<String>,
    /// Search results fetched per financial source.
    pub results_per_source: usize,
    /// Minimum revenue, in millions, to qualify.
    pub minimum_threshold_millions: f64,
    /// Whether page-text inference runs when no premium source answers.
    pub fallback_enabled: bool,
    /// Maximum companies in flight (W3).
    pub max_parallel_enrichment: usize,
    /// Stop once this many companies qualified.
    pub limit: Option<usize>,
}

#[derive(Clone)]
pub struct EnrichmentDeps {
    pub search: Arc<dyn WebSearchProvider>,
    pub classifier: Arc<dyn SemanticClassifier>,
}

/// Enrich every candidate and return the qualified ones in completion order.
///
/// With a limit, the first task to fill it cancels the shared token: queued
/// tasks never start, running tasks stop at their next phase boundary and
/// are then aborted. The accumulator refuses entries past the limit.
#[instrument(skip_all, fields(candidates = candidates.len(), limit = ?opts.limit))]
pub async fn enrich_companies(
    candidates: Vec<CandidateCompany>,
    opts: Arc<EnrichmentOptions>,
    deps: EnrichmentDeps,
    state: Arc<RunState>,
    progress: &dyn PipelineProgress,
) -> Vec<QualifiedCompany> {
    if opts.limit == Some(0) {
        info!("limit is zero, skipping enrichment");
        return Vec::new();
    }

    let semaphore = Arc::new(Semaphore::new(opts.max_parallel_enrichment.max(1)));
    let token = CancellationToken::new();
    let mut tasks = JoinSet::new();

    for candidate in candidates {
        let semaphore = semaphore.clone();
        let token = token.clone();
        let opts = opts.clone();
        let deps = deps.clone();
        let state = state.clone();

        tasks.spawn(async move {
            let _permit = tokio::select! {
                biased;
                _ = token.cancelled() => return None,
                permit = semaphore.acquire_owned() => permit.ok()?,
            };
            enrich_one(candidate, &opts, &deps, &state, &token).await
        });
    }

    let mut aborted = false;
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(Some(company)) => progress.company_qualified(&company),
            Ok(None) => {}
            Err(e) if e.is_cancelled() => {}
            Err(e) => error!(error = %e, "enrichment task failed"),
        }

        if token.is_cancelled() && !aborted {
            info!("result limit reached, cancelling remaining enrichment");
            tasks.abort_all();
            aborted = true;
        }
    }

    let qualified = state.take_qualified().await;
    info!(qualified = qualified.len(), "enrichment complete");
    qualified
}

async fn enrich_one(
    candidate: CandidateCompany,
    opts: &EnrichmentOptions,
    deps: &EnrichmentDeps,
    state: &RunState,
    token: &CancellationToken,
) -> Option<QualifiedCompany> {
    if token.is_cancelled() {
        return None;
    }

    let mut revenue = premium_revenue(
        deps.search.as_ref(),
        deps.classifier.as_ref(),
        &candidate.name,
        &opts.financial_sources,
        opts.results_per_source,
        token,
    )
    .await;

    if revenue.is_none() && opts.fallback_enabled && !candidate.page_text.is_empty() {
        if token.is_cancelled() {
            return None;
        }
        revenue = fallback_revenue(
            deps.classifier.as_ref(),
            &candidate.name,
            &candidate.page_text,
        )
        .await;
    }

    let revenue = match revenue {
        Some(r) if r >= opts.minimum_threshold_millions => r,
        other => {
            info!(
                name = %candidate.name,
                revenue = ?other,
                threshold = opts.minimum_threshold_millions,
                "discarded: revenue not found or below threshold"
            );
            return None;
        }
    };

    // `qualify` consumes the candidate, dropping its page text.
    let company = candidate.qualify(revenue);
    match state.admit_qualified(company.clone(), opts.limit).await {
        Admission::Added { limit_reached } => {
            info!(name = %company.name, revenue, "qualified");
            if limit_reached {
                token.cancel();
            }
            Some(company)
        }
        Admission::Full => {
            debug!(name = %company.name, "qualified past the limit, dropping");
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Revenue lookups
// ---------------------------------------------------------------------------

/// Query each financial source in order; return the first numeric estimate.
///
/// One classifier call per source with search hits, no retries. A failed
/// call moves on to the next source.
pub async fn premium_revenue(
    search: &dyn WebSearchProvider,
    classifier: &dyn SemanticClassifier,
    company_name: &str,
    sources: &[String],
    results_per_source: usize,
    token: &CancellationToken,
) -> Option<f64> {
    for source in sources {
        if token.is_cancelled() {
            return None;
        }

        let query = prompts::premium_revenue_query(source, company_name);
        let results = search.search(&query, results_per_source).await;
        if results.is_empty() {
            continue;
        }

        let context = prompts::snippet_context(&results);
        match classifier
            .analyze(&context, prompts::premium_revenue_question(), ModelVariant::Fast)
            .await
        {
            Ok(answer) => {
                if let Some(revenue) = parse_revenue(&answer) {
                    info!(company = %company_name, %source, revenue, "revenue found on financial source");
                    return Some(revenue);
                }
            }
            Err(e) => debug!(company = %company_name, %source, error = %e, "revenue lookup failed"),
        }
    }
    None
}

/// Infer revenue from size indicators in the page text.
pub async fn fallback_revenue(
    classifier: &dyn SemanticClassifier,
    company_name: &str,
    page_text: &str,
) -> Option<f64> {
    let question = prompts::fallback_revenue_question(company_name);
    let answer = match classifier
        .analyze(page_text, &question, ModelVariant::Creative)
        .await
    {
        Ok(answer) => answer,
        Err(e) => {
            debug!(company = %company_name, error = %e, "fallback revenue inference failed");
            return None;
        }
    };

    let map = parse_llm_object(&answer)?;
    let revenue = map.get("revenue_in_millions").and_then(lenient_f64)?;
    if revenue < 0.0 {
        return None;
    }
    info!(
        company = %company_name,
        revenue,
        confidence = non_blank_str(&map, "confidence").unwrap_or("unknown"),
        reasoning = non_blank_str(&map, "reasoning").unwrap_or("none given"),
        "fallback revenue estimate"
    );
    Some(revenue)
}

fn parse_revenue(answer: &str) -> Option<f64> {
    parse_llm_object(answer)?
        .get("revenue_in_millions")
        .and_then(lenient_f64)
        .filter(|r| *r >= 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use icpqualifier_shared::{Result, SearchResultStub};

    use crate::progress::SilentProgress;

    /// Financial source → snippet. Sources not listed return nothing.
    /// Lookups for the company named "Crash" panic.
    #[derive(Default)]
    struct FakeSearch {
        hits: HashMap<String, String>,
        queries: Mutex<Vec<String>>,
        delay: Duration,
    }

    impl FakeSearch {
        fn hit(mut self, source: &str, snippet: &str) -> Self {
            self.hits.insert(source.into(), snippet.into());
            self
        }
    }

    #[async_trait]
    impl WebSearchProvider for FakeSearch {
        fn name(&self) -> &str {
            "fake"
        }

        async fn search(&self, query: &str, _max: usize) -> Vec<SearchResultStub> {
            self.queries.lock().unwrap().push(query.to_string());
            if query.contains("\"Crash\"") {
                panic!("search backend blew up");
            }
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            let source = query
                .strip_prefix("site:")
                .and_then(|q| q.split_whitespace().next())
                .unwrap_or_default();
            self.hits
                .get(source)
                .map(|snippet| vec![SearchResultStub::new("r", "https://r", snippet.as_str())])
                .unwrap_or_default()
        }
    }

    /// Fast: snippet → answer. Creative: one fixed fallback answer.
    #[derive(Default)]
    struct FakeClassifier {
        premium: HashMap<String, String>,
        fallback: Option<String>,
        fast_calls: AtomicU32,
        creative_calls: AtomicU32,
    }

    impl FakeClassifier {
        fn premium(mut self, snippet: &str, answer: &str) -> Self {
            self.premium.insert(format!("Snippet: {snippet}"), answer.into());
            self
        }

        fn fallback(mut self, answer: &str) -> Self {
            self.fallback = Some(answer.into());
            self
        }
    }

    #[async_trait]
    impl SemanticClassifier for FakeClassifier {
        async fn analyze(&self, context: &str, _q: &str, variant: ModelVariant) -> Result<String> {
            match variant {
                ModelVariant::Fast => {
                    self.fast_calls.fetch_add(1, Ordering::SeqCst);
                    Ok(self.premium.get(context).cloned().unwrap_or_else(|| "null".into()))
                }
                ModelVariant::Creative => {
                    self.creative_calls.fetch_add(1, Ordering::SeqCst);
                    Ok(self.fallback.clone().unwrap_or_else(|| "null".into()))
                }
            }
        }
    }

    fn candidate(name: &str, page_text: &str) -> CandidateCompany {
        CandidateCompany {
            name: name.into(),
            website: format!("https://{}.example", name.to_lowercase()),
            page_text: page_text.into(),
        }
    }

    fn options(sources: &[&str]) -> EnrichmentOptions {
        EnrichmentOptions {
            financial_sources: sources.iter().map(|s| s.to_string()).collect(),
            results_per_source: 2,
            minimum_threshold_millions: 15.0,
            fallback_enabled: true,
            max_parallel_enrichment: 4,
            limit: None,
        }
    }

    async fn run(
        candidates: Vec<CandidateCompany>,
        opts: EnrichmentOptions,
        search: Arc<FakeSearch>,
        classifier: Arc<FakeClassifier>,
    ) -> Vec<QualifiedCompany> {
        enrich_companies(
            candidates,
            Arc::new(opts),
            EnrichmentDeps { search, classifier },
            Arc::new(RunState::default()),
            &SilentProgress,
        )
        .await
    }

    #[tokio::test]
    async fn premium_sources_tried_in_order_and_stop_at_first_hit() {
        let search = Arc::new(
            FakeSearch::default()
                .hit("growjo.com", "Acme revenue is $40M")
                .hit("owler.com", "Acme makes $90M"),
        );
        let classifier = Arc::new(
            FakeClassifier::default()
                .premium("Acme revenue is $40M", r#"{"revenue_in_millions": 40}"#)
                .premium("Acme makes $90M", r#"{"revenue_in_millions": 90}"#),
        );

        let out = run(
            vec![candidate("Acme", "fleet text")],
            options(&["zoominfo.com", "growjo.com", "owler.com"]),
            search.clone(),
            classifier.clone(),
        )
        .await;

        assert_eq!(out.len(), 1);
        assert_eq!(out[0].estimated_revenue_in_millions, 40.0);
        let queries = search.queries.lock().unwrap();
        assert_eq!(
            *queries,
            vec![
                "site:zoominfo.com \"Acme\" annual revenue",
                "site:growjo.com \"Acme\" annual revenue",
            ]
        );
        assert_eq!(classifier.fast_calls.load(Ordering::SeqCst), 1);
        assert_eq!(classifier.creative_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn null_premium_answer_moves_to_next_source() {
        let search = Arc::new(
            FakeSearch::default()
                .hit("zoominfo.com", "no numbers here")
                .hit("growjo.com", "Acme revenue is $40M"),
        );
        let classifier = Arc::new(
            FakeClassifier::default().premium("Acme revenue is $40M", r#"{"revenue_in_millions": "40"}"#),
        );

        let out = run(
            vec![candidate("Acme", "")],
            options(&["zoominfo.com", "growjo.com"]),
            search,
            classifier.clone(),
        )
        .await;

        assert_eq!(out[0].estimated_revenue_in_millions, 40.0);
        assert_eq!(classifier.fast_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn falls_back_to_page_text_after_all_sources() {
        let search = Arc::new(FakeSearch::default());
        let classifier = Arc::new(FakeClassifier::default().fallback(
            r#"{"revenue_in_millions": 20, "confidence": "medium", "reasoning": "200 employees"}"#,
        ));

        let out = run(
            vec![candidate("Acme", "We employ 200 people")],
            options(&["zoominfo.com", "growjo.com"]),
            search.clone(),
            classifier.clone(),
        )
        .await;

        assert_eq!(out.len(), 1);
        assert_eq!(out[0].estimated_revenue_in_millions, 20.0);
        assert_eq!(search.queries.lock().unwrap().len(), 2);
        assert_eq!(classifier.creative_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn no_fallback_when_disabled_or_page_empty() {
        let classifier = Arc::new(FakeClassifier::default().fallback(r#"{"revenue_in_millions": 99}"#));

        let mut disabled = options(&["zoominfo.com"]);
        disabled.fallback_enabled = false;
        let out = run(
            vec![candidate("Acme", "page text")],
            disabled,
            Arc::new(FakeSearch::default()),
            classifier.clone(),
        )
        .await;
        assert!(out.is_empty());

        let out = run(
            vec![candidate("Globex", "")],
            options(&["zoominfo.com"]),
            Arc::new(FakeSearch::default()),
            classifier.clone(),
        )
        .await;
        assert!(out.is_empty());

        assert_eq!(classifier.creative_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn below_threshold_is_discarded() {
        let classifier = Arc::new(FakeClassifier::default().fallback(r#"{"revenue_in_millions": 14.9}"#));
        let out = run(
            vec![candidate("Tiny", "a small shop")],
            options(&[]),
            Arc::new(FakeSearch::default()),
            classifier,
        )
        .await;
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn threshold_is_inclusive() {
        let classifier = Arc::new(FakeClassifier::default().fallback(r#"{"revenue_in_millions": 15}"#));
        let out = run(
            vec![candidate("Edge", "mid-size fleet")],
            options(&[]),
            Arc::new(FakeSearch::default()),
            classifier,
        )
        .await;
        assert_eq!(out.len(), 1);
    }

    fn all_qualify() -> (Arc<FakeSearch>, Arc<FakeClassifier>) {
        let mut search = FakeSearch::default().hit("zoominfo.com", "revenue $50M");
        search.delay = Duration::from_millis(5);
        let classifier =
            Arc::new(FakeClassifier::default().premium("revenue $50M", r#"{"revenue_in_millions": 50}"#));
        (Arc::new(search), classifier)
    }

    fn five_candidates() -> Vec<CandidateCompany> {
        ["A", "B", "C", "D", "E"]
            .iter()
            .map(|n| candidate(n, "fleet"))
            .collect()
    }

    #[tokio::test]
    async fn limit_stops_serial_enrichment_early() {
        let (search, classifier) = all_qualify();
        let mut opts = options(&["zoominfo.com"]);
        opts.limit = Some(2);
        opts.max_parallel_enrichment = 1;

        let out = run(five_candidates(), opts, search.clone(), classifier).await;

        assert_eq!(out.len(), 2);
        // Only the two tasks that ran before the limit touched the network.
        assert_eq!(search.queries.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn limit_holds_under_full_concurrency() {
        let (search, classifier) = all_qualify();
        let mut opts = options(&["zoominfo.com"]);
        opts.limit = Some(2);
        opts.max_parallel_enrichment = 5;

        let out = run(five_candidates(), opts, search, classifier).await;

        assert_eq!(out.len(), 2);
        let mut names: Vec<_> = out.iter().map(|c| c.name.clone()).collect();
        names.dedup();
        assert_eq!(names.len(), 2);
    }

    #[tokio::test]
    async fn zero_limit_does_nothing() {
        let (search, classifier) = all_qualify();
        let mut opts = options(&["zoominfo.com"]);
        opts.limit = Some(0);

        let out = run(five_candidates(), opts, search.clone(), classifier).await;
        assert!(out.is_empty());
        assert!(search.queries.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn panicking_company_leaves_others_alone() {
        let (search, classifier) = all_qualify();
        let candidates = vec![
            candidate("A", "fleet"),
            candidate("Crash", "fleet"),
            candidate("B", "fleet"),
        ];

        let out = run(candidates, options(&["zoominfo.com"]), search, classifier).await;

        let mut names: Vec<_> = out.iter().map(|c| c.name.as_str()).collect();
        names.sort_unstable();
        assert_eq!(names, ["A", "B"]);
    }

    #[tokio::test]
    async fn panicking_company_does_not_break_the_limit() {
        let (search, classifier) = all_qualify();
        let mut opts = options(&["zoominfo.com"]);
        opts.limit = Some(2);
        opts.max_parallel_enrichment = 1;
        let mut candidates = vec![candidate("Crash", "fleet")];
        candidates.extend(five_candidates());

        let out = tokio::time::timeout(
            Duration::from_secs(5),
            run(candidates, opts, search, classifier),
        )
        .await
        .expect("enrichment should finish");

        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|c| c.name != "Crash"));
    }

    #[test]
    fn revenue_parsing() {
        assert_eq!(parse_revenue(r#"{"revenue_in_millions": 50.5}"#), Some(50.5));
        assert_eq!(parse_revenue("null"), None);
        assert_eq!(parse_revenue(r#"{"revenue_in_millions": null}"#), None);
        assert_eq!(parse_revenue(r#"{"revenue_in_millions": -4}"#), None);
    }
}
