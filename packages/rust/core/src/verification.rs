//! Verification and scoring stage.
//!
//! Per stub: verify it names a real company, dedup, scrape the website, run
//! the keyword gate, then score relevance. Stubs are processed concurrently
//! with at most W2 in flight; each stub's work runs in its own task so a
//! panic in one cannot take down its siblings.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, instrument, warn};

use icpqualifier_shared::{
    CandidateCompany, ModelVariant, QualifierError, Result, RetryPolicy, SearchResultStub,
    SemanticClassifier, WebScraper, retry_with_backoff,
};

use crate::decode::{lenient_bool, lenient_f64, non_blank_str, parse_llm_object};
use crate::prompts;
use crate::state::RunState;

/// Highest relevance score.
pub const MAX_SCORE: u8 = 10;

#[derive(Debug, Clone)]
pub struct VerificationOptions {
    /// Page text must contain one of these (case-insensitive) to be scored.
    pub heuristic_keywords: Vec<String>,
    /// Minimum relevance score to keep a candidate.
    pub relevance_threshold: u8,
    /// Description of the ideal customer for the relevance prompt.
    pub ideal_customer: String,
    pub exemplar_companies: Vec<String>,
    /// Companies headquartered here always score 0.
    pub disallowed_regions: Vec<String>,
    /// Maximum stubs in flight (W2).
    pub max_parallel_processing: usize,
    /// Retry policy for the verification and relevance classifier calls.
    pub retry: RetryPolicy,
}

/// Collaborators used by this stage.
#[derive(Clone)]
pub struct VerificationDeps {
    pub classifier: Arc<dyn SemanticClassifier>,
    pub scraper: Arc<dyn WebScraper>,
}

/// Turn one profile's stubs into relevance-qualified candidates.
///
/// Accepted names are added to `state` as soon as each candidate passes, so
/// later items and later profiles see them.
#[instrument(skip_all, fields(stubs = stubs.len()))]
pub async fn verify_and_score(
    stubs: Vec<SearchResultStub>,
    opts: Arc<VerificationOptions>,
    deps: VerificationDeps,
    state: Arc<RunState>,
) -> Vec<CandidateCompany> {
    let semaphore = Arc::new(Semaphore::new(opts.max_parallel_processing.max(1)));
    let mut tasks = JoinSet::new();

    for stub in stubs {
        let semaphore = semaphore.clone();
        let opts = opts.clone();
        let deps = deps.clone();
        let state = state.clone();

        tasks.spawn(async move {
            let Ok(_permit) = semaphore.acquire_owned().await else {
                return None;
            };
            process_stub(stub, &opts, &deps, &state).await
        });
    }

    let mut candidates = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(Some(candidate)) => candidates.push(candidate),
            Ok(None) => {}
            Err(e) => error!(error = %e, "verification task failed"),
        }
    }

    info!(candidates = candidates.len(), "verification and scoring complete");
    candidates
}

async fn process_stub(
    stub: SearchResultStub,
    opts: &VerificationOptions,
    deps: &VerificationDeps,
    state: &RunState,
) -> Option<CandidateCompany> {
    let link = stub.link()?.to_string();

    let name = verify_company(deps.classifier.as_ref(), &stub, opts.retry).await?;
    if state.is_known(&name).await {
        debug!(%name, "already known, skipping");
        return None;
    }
    debug!(%name, "verified as company");

    let page_text = deps.scraper.scrape(&link).await;
    if !passes_heuristic_filter(&page_text, &opts.heuristic_keywords) {
        info!(%name, "skipped: failed heuristic filter");
        return None;
    }

    let score = score_relevance(deps.classifier.as_ref(), &name, &page_text, opts).await;
    if score < opts.relevance_threshold {
        info!(%name, score, "skipped: not relevant");
        return None;
    }

    if !state.try_accept(&name).await {
        debug!(%name, "accepted concurrently by another task, dropping");
        return None;
    }

    info!(%name, score, "relevant, queued for revenue check");
    Some(CandidateCompany {
        name,
        website: link,
        page_text,
    })
}

// ---------------------------------------------------------------------------
// Company verification
// ---------------------------------------------------------------------------

/// Ask the fast model whether `stub` identifies a real company.
///
/// Unparsable answers are retried per `retry`; exhausted retries and
/// explicit "not a company" answers both yield `None`.
pub async fn verify_company(
    classifier: &dyn SemanticClassifier,
    stub: &SearchResultStub,
    retry: RetryPolicy,
) -> Option<String> {
    let context = prompts::stub_context(stub);
    let context = context.as_str();

    let verdict = retry_with_backoff(retry, "company verification", |_| async move {
        let answer = classifier
            .analyze(context, prompts::verification_question(), ModelVariant::Fast)
            .await?;
        parse_verification(&answer)
    })
    .await;

    match verdict {
        Ok(name) => name,
        Err(e) => {
            warn!(title = %stub.title, error = %e, "verification gave no usable answer");
            None
        }
    }
}

/// `Ok(Some(name))` for a company, `Ok(None)` for an explicit "no",
/// `Err` when the answer carries no verdict.
fn parse_verification(answer: &str) -> Result<Option<String>> {
    let map = parse_llm_object(answer)
        .ok_or_else(|| QualifierError::parse("no JSON object in verification answer"))?;
    let is_company = map
        .get("is_company")
        .and_then(lenient_bool)
        .ok_or_else(|| QualifierError::parse("verification answer lacks is_company"))?;

    if !is_company {
        return Ok(None);
    }
    Ok(non_blank_str(&map, "company_name").map(str::to_string))
}

// ---------------------------------------------------------------------------
// Heuristic gate
// ---------------------------------------------------------------------------

/// Case-insensitive substring match of any keyword. Empty text never passes.
pub fn passes_heuristic_filter(page_text: &str, keywords: &[String]) -> bool {
    if page_text.is_empty() {
        return false;
    }
    let text = page_text.to_lowercase();
    keywords
        .iter()
        .filter(|k| !k.trim().is_empty())
        .any(|k| text.contains(&k.to_lowercase()))
}

// ---------------------------------------------------------------------------
// Relevance scoring
// ---------------------------------------------------------------------------

/// Score `page_text` 0–10 with the creative model.
///
/// Unparsable answers are retried per `opts.retry`, then score 0. A
/// headquarters country in the disallowed list forces 0.
pub async fn score_relevance(
    classifier: &dyn SemanticClassifier,
    company_name: &str,
    page_text: &str,
    opts: &VerificationOptions,
) -> u8 {
    let question = prompts::relevance_question(
        company_name,
        &opts.ideal_customer,
        &opts.exemplar_companies,
        &opts.disallowed_regions,
    );
    let question = question.as_str();
    let regions = opts.disallowed_regions.as_slice();

    let scored = retry_with_backoff(opts.retry, "relevance scoring", |_| async move {
        let answer = classifier
            .analyze(page_text, question, ModelVariant::Creative)
            .await?;
        parse_relevance(&answer, regions)
    })
    .await;

    scored.unwrap_or_else(|e| {
        warn!(company = %company_name, error = %e, "relevance scoring gave no usable answer");
        0
    })
}

fn parse_relevance(answer: &str, disallowed_regions: &[String]) -> Result<u8> {
    let map = parse_llm_object(answer)
        .ok_or_else(|| QualifierError::parse("no JSON object in relevance answer"))?;
    let raw = map
        .get("relevance_score")
        .and_then(lenient_f64)
        .ok_or_else(|| QualifierError::parse("relevance answer lacks a numeric relevance_score"))?;

    let country = non_blank_str(&map, "headquarters_country");
    if country.is_some_and(|c| is_disallowed(c, disallowed_regions)) {
        debug!(?country, "headquartered in disallowed region, forcing score 0");
        return Ok(0);
    }

    Ok(raw.clamp(0.0, f64::from(MAX_SCORE)).trunc() as u8)
}

fn is_disallowed(country: &str, regions: &[String]) -> bool {
    regions
        .iter()
        .any(|r| r.trim().eq_ignore_ascii_case(country.trim()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;

    /// Answers by variant: verification from `titles`, relevance from `scores`.
    #[derive(Default)]
    struct FakeClassifier {
        /// Stub title → verification answer.
        titles: HashMap<String, String>,
        /// Page text → relevance answer.
        scores: HashMap<String, String>,
        verify_calls: AtomicU32,
        score_calls: AtomicU32,
    }

    impl FakeClassifier {
        fn company(mut self, title: &str, name: &str) -> Self {
            self.titles.insert(
                title.into(),
                format!(r#"{{"is_company": true, "company_name": "{name}"}}"#),
            );
            self
        }

        fn verify_answer(mut self, title: &str, answer: &str) -> Self {
            self.titles.insert(title.into(), answer.into());
            self
        }

        fn score(mut self, page: &str, answer: &str) -> Self {
            self.scores.insert(page.into(), answer.into());
            self
        }
    }

    #[async_trait]
    impl SemanticClassifier for FakeClassifier {
        async fn analyze(&self, context: &str, _q: &str, variant: ModelVariant) -> Result<String> {
            match variant {
                ModelVariant::Fast => {
                    self.verify_calls.fetch_add(1, Ordering::SeqCst);
                    let title = context
                        .lines()
                        .next()
                        .and_then(|l| l.strip_prefix("Title: "))
                        .unwrap_or_default();
                    Ok(self.titles.get(title).cloned().unwrap_or_else(|| "unsure".into()))
                }
                ModelVariant::Creative => {
                    self.score_calls.fetch_add(1, Ordering::SeqCst);
                    Ok(self.scores.get(context).cloned().unwrap_or_else(|| "unsure".into()))
                }
            }
        }
    }

    /// Link → page text. Unknown links scrape to "", links mentioning
    /// "crash" panic.
    #[derive(Default)]
    struct FakeScraper {
        pages: HashMap<String, String>,
        calls: Mutex<Vec<String>>,
    }

    impl FakeScraper {
        fn page(mut self, link: &str, text: &str) -> Self {
            self.pages.insert(link.into(), text.into());
            self
        }
    }

    #[async_trait]
    impl WebScraper for FakeScraper {
        async fn scrape(&self, url: &str) -> String {
            self.calls.lock().unwrap().push(url.to_string());
            if url.contains("crash") {
                panic!("scraper blew up on {url}");
            }
            self.pages.get(url).cloned().unwrap_or_default()
        }
    }

    fn options() -> VerificationOptions {
        VerificationOptions {
            heuristic_keywords: vec!["dashcam".into(), "Fleet".into()],
            relevance_threshold: 7,
            ideal_customer: "fleet operators".into(),
            exemplar_companies: vec!["Samsara".into()],
            disallowed_regions: vec!["China".into(), "Hong Kong".into(), "Taiwan".into()],
            max_parallel_processing: 4,
            retry: RetryPolicy::fixed_ms(2, 0),
        }
    }

    async fn run(
        stubs: Vec<SearchResultStub>,
        classifier: Arc<FakeClassifier>,
        scraper: Arc<FakeScraper>,
        state: Arc<RunState>,
    ) -> Vec<CandidateCompany> {
        verify_and_score(
            stubs,
            Arc::new(options()),
            VerificationDeps {
                classifier,
                scraper,
            },
            state,
        )
        .await
    }

    #[tokio::test]
    async fn relevant_company_becomes_candidate() {
        let classifier = Arc::new(
            FakeClassifier::default()
                .company("Acme", "Acme Corp")
                .score("Fleet dashcams", r#"{"relevance_score": 8, "headquarters_country": "USA"}"#),
        );
        let scraper = Arc::new(FakeScraper::default().page("https://acme.example", "Fleet dashcams"));
        let state = Arc::new(RunState::default());

        let out = run(
            vec![SearchResultStub::new("Acme", "https://acme.example", "s")],
            classifier,
            scraper,
            state.clone(),
        )
        .await;

        assert_eq!(out.len(), 1);
        assert_eq!(out[0].name, "Acme Corp");
        assert_eq!(out[0].website, "https://acme.example");
        assert_eq!(out[0].page_text, "Fleet dashcams");
        assert!(state.is_known("Acme Corp").await);
    }

    #[tokio::test]
    async fn stub_without_link_is_skipped_before_classifier() {
        let classifier = Arc::new(FakeClassifier::default().company("Acme", "Acme Corp"));
        let mut stub = SearchResultStub::new("Acme", "", "s");
        stub.link = None;

        let out = run(
            vec![stub],
            classifier.clone(),
            Arc::new(FakeScraper::default()),
            Arc::new(RunState::default()),
        )
        .await;

        assert!(out.is_empty());
        assert_eq!(classifier.verify_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn heuristic_gate_prevents_scoring() {
        let classifier = Arc::new(
            FakeClassifier::default()
                .company("Bakery", "Bread Co")
                .score("We bake sourdough", r#"{"relevance_score": 9}"#),
        );
        let scraper = Arc::new(FakeScraper::default().page("https://bread.example", "We bake sourdough"));

        let out = run(
            vec![SearchResultStub::new("Bakery", "https://bread.example", "s")],
            classifier.clone(),
            scraper,
            Arc::new(RunState::default()),
        )
        .await;

        assert!(out.is_empty());
        assert_eq!(classifier.verify_calls.load(Ordering::SeqCst), 1);
        assert_eq!(classifier.score_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unparsable_verification_retried_exactly_then_dropped() {
        let classifier = Arc::new(FakeClassifier::default().verify_answer("Acme", "I think so?"));
        let scraper = Arc::new(FakeScraper::default());

        let out = run(
            vec![SearchResultStub::new("Acme", "https://acme.example", "s")],
            classifier.clone(),
            scraper.clone(),
            Arc::new(RunState::default()),
        )
        .await;

        assert!(out.is_empty());
        assert_eq!(classifier.verify_calls.load(Ordering::SeqCst), 2);
        assert!(scraper.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn explicit_not_a_company_is_not_retried() {
        let classifier = Arc::new(FakeClassifier::default().verify_answer(
            "Top 10 dashcams",
            r#"{"is_company": false, "company_name": null}"#,
        ));

        let out = run(
            vec![SearchResultStub::new("Top 10 dashcams", "https://blog.example", "s")],
            classifier.clone(),
            Arc::new(FakeScraper::default()),
            Arc::new(RunState::default()),
        )
        .await;

        assert!(out.is_empty());
        assert_eq!(classifier.verify_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unparsable_score_retried_exactly_then_zero() {
        let classifier = Arc::new(
            FakeClassifier::default()
                .company("Acme", "Acme Corp")
                .score("fleet page", "great fit, maybe eight"),
        );
        let scraper = Arc::new(FakeScraper::default().page("https://acme.example", "fleet page"));

        let out = run(
            vec![SearchResultStub::new("Acme", "https://acme.example", "s")],
            classifier.clone(),
            scraper,
            Arc::new(RunState::default()),
        )
        .await;

        assert!(out.is_empty());
        assert_eq!(classifier.score_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn below_threshold_dropped_and_not_accepted() {
        let classifier = Arc::new(
            FakeClassifier::default()
                .company("Acme", "Acme Corp")
                .score("fleet page", r#"{"relevance_score": 6}"#),
        );
        let scraper = Arc::new(FakeScraper::default().page("https://acme.example", "fleet page"));
        let state = Arc::new(RunState::default());

        let out = run(
            vec![SearchResultStub::new("Acme", "https://acme.example", "s")],
            classifier,
            scraper,
            state.clone(),
        )
        .await;

        assert!(out.is_empty());
        assert!(!state.is_known("Acme Corp").await);
    }

    #[tokio::test]
    async fn known_names_skip_scrape() {
        let classifier = Arc::new(FakeClassifier::default().company("Globex", "Globex"));
        let scraper = Arc::new(FakeScraper::default());
        let state = Arc::new(RunState::with_known_names(["Globex".to_string()]));

        let out = run(
            vec![SearchResultStub::new("Globex", "https://globex.example", "s")],
            classifier,
            scraper.clone(),
            state,
        )
        .await;

        assert!(out.is_empty());
        assert!(scraper.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn same_company_from_two_stubs_accepted_once() {
        let classifier = Arc::new(
            FakeClassifier::default()
                .company("Acme home", "Acme Corp")
                .company("Acme about", "Acme Corp")
                .score("fleet page", r#"{"relevance_score": 9}"#),
        );
        let scraper = Arc::new(
            FakeScraper::default()
                .page("https://acme.example", "fleet page")
                .page("https://acme.example/about", "fleet page"),
        );

        let out = run(
            vec![
                SearchResultStub::new("Acme home", "https://acme.example", "s"),
                SearchResultStub::new("Acme about", "https://acme.example/about", "s"),
            ],
            classifier,
            scraper,
            Arc::new(RunState::default()),
        )
        .await;

        assert_eq!(out.len(), 1);
        assert_eq!(out[0].name, "Acme Corp");
    }

    #[test]
    fn disallowed_region_forces_zero() {
        let regions = options().disallowed_regions;
        let answer = r#"{"relevance_score": 9, "headquarters_country": "hong kong", "reasoning": "dashcam OEM"}"#;
        assert_eq!(parse_relevance(answer, &regions).unwrap(), 0);
    }

    #[test]
    fn relevance_parsing_is_lenient_and_clamped() {
        assert_eq!(parse_relevance(r#"{"relevance_score": "8"}"#, &[]).unwrap(), 8);
        assert_eq!(parse_relevance(r#"{"relevance_score": 7.9}"#, &[]).unwrap(), 7);
        assert_eq!(parse_relevance(r#"{"relevance_score": 42}"#, &[]).unwrap(), 10);
        assert_eq!(parse_relevance(r#"{"relevance_score": -3}"#, &[]).unwrap(), 0);
        assert!(parse_relevance(r#"{"reasoning": "no score"}"#, &[]).is_err());
    }

    #[test]
    fn verification_parsing() {
        assert_eq!(
            parse_verification(r#"{"is_company": true, "company_name": " Acme Corp "}"#).unwrap(),
            Some("Acme Corp".to_string())
        );
        assert_eq!(
            parse_verification(r#"{"is_company": true, "company_name": null}"#).unwrap(),
            None
        );
        assert!(parse_verification(r#"{"company_name": "Acme"}"#).is_err());
    }

    #[test]
    fn heuristic_filter_is_case_insensitive() {
        let keywords = vec!["Dashcam".to_string(), "telematics".to_string()];
        assert!(passes_heuristic_filter("Our DASHCAM range", &keywords));
        assert!(!passes_heuristic_filter("We sell bread", &keywords));
        assert!(!passes_heuristic_filter("", &keywords));
        assert!(!passes_heuristic_filter("anything", &[]));
    }

    #[tokio::test]
    async fn panicking_task_leaves_other_stubs_alone() {
        let classifier = Arc::new(
            FakeClassifier::default()
                .company("Acme", "Acme Corp")
                .company("Crash", "Crash Inc")
                .company("Globex", "Globex")
                .score("Acme fleet", r#"{"relevance_score": 8}"#)
                .score("Globex fleet", r#"{"relevance_score": 9}"#),
        );
        let scraper = Arc::new(
            FakeScraper::default()
                .page("https://acme.example", "Acme fleet")
                .page("https://globex.example", "Globex fleet"),
        );
        let state = Arc::new(RunState::default());

        let out = run(
            vec![
                SearchResultStub::new("Acme", "https://acme.example", "s"),
                SearchResultStub::new("Crash", "https://crash.example", "s"),
                SearchResultStub::new("Globex", "https://globex.example", "s"),
            ],
            classifier,
            scraper.clone(),
            state.clone(),
        )
        .await;

        let mut names: Vec<_> = out.iter().map(|c| c.name.as_str()).collect();
        names.sort_unstable();
        assert_eq!(names, ["Acme Corp", "Globex"]);
        assert_eq!(scraper.calls.lock().unwrap().len(), 3);
        assert!(!state.is_known("Crash Inc").await);
    }
}
