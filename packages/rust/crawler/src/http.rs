//! HTTP page fetcher behind the [`WebScraper`] contract.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, header};
use tracing::{debug, instrument, warn};
use url::Url;

use icpqualifier_markdown::{html_to_page_text, truncate_text};
use icpqualifier_shared::{QualifierError, Result, ScraperConfig, WebScraper};

use crate::guard::is_ssrf_target;

/// User-Agent string for page fetches.
const USER_AGENT: &str = concat!(
    "Mozilla/5.0 (compatible; ICPQualifier/",
    env!("CARGO_PKG_VERSION"),
    ")"
);

const MAX_REDIRECTS: usize = 5;

// ---------------------------------------------------------------------------
// HttpScraper
// ---------------------------------------------------------------------------

/// Fetches company websites and returns their page text.
///
/// Fail-soft: blocked targets, transport errors, non-2xx responses and
/// non-text content all yield an empty string.
pub struct HttpScraper {
    client: Client,
    max_page_chars: usize,
    /// Allow localhost/private IPs (mock servers in tests).
    allow_private_hosts: bool,
}

impl HttpScraper {
    pub fn new(config: &ScraperConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| QualifierError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            max_page_chars: config.max_page_chars,
            allow_private_hosts: false,
        })
    }

    #[cfg(test)]
    pub(crate) fn allow_private_hosts(mut self) -> Self {
        self.allow_private_hosts = true;
        self
    }

    /// Fetch and convert one page. Errors are surfaced here and swallowed
    /// by [`WebScraper::scrape`].
    async fn fetch_text(&self, raw_url: &str) -> Result<String> {
        let url = parse_website(raw_url)?;

        if !self.allow_private_hosts && is_ssrf_target(&url) {
            return Err(QualifierError::validation(format!(
                "refusing to fetch non-public target {url}"
            )));
        }

        let response = self
            .client
            .get(url.as_str())
            .send()
            .await
            .map_err(|e| QualifierError::Network(format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(QualifierError::Network(format!("{url}: HTTP {status}")));
        }

        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("text/html")
            .to_ascii_lowercase();

        let body = response
            .text()
            .await
            .map_err(|e| QualifierError::Network(format!("{url}: failed to read body: {e}")))?;

        let text = if content_type.contains("html") {
            html_to_page_text(&body)?.text
        } else if content_type.starts_with("text/") {
            body
        } else {
            return Err(QualifierError::validation(format!(
                "{url}: unsupported content type {content_type}"
            )));
        };

        Ok(truncate_text(text.trim(), self.max_page_chars))
    }
}

#[async_trait]
impl WebScraper for HttpScraper {
    #[instrument(skip(self))]
    async fn scrape(&self, url: &str) -> String {
        match self.fetch_text(url).await {
            Ok(text) => {
                debug!(chars = text.len(), "page scraped");
                text
            }
            Err(e) => {
                warn!(error = %e, "scrape failed");
                String::new()
            }
        }
    }
}

/// Parse a website link, assuming `https://` when the scheme is missing.
fn parse_website(raw: &str) -> Result<Url> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(QualifierError::validation("empty website URL"));
    }
    if raw.contains("://") {
        return Url::parse(raw).map_err(|e| QualifierError::parse(format!("invalid URL {raw}: {e}")));
    }
    Url::parse(&format!("https://{raw}"))
        .map_err(|e| QualifierError::parse(format!("invalid URL {raw}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn scraper(max_page_chars: usize) -> HttpScraper {
        HttpScraper::new(&ScraperConfig {
            timeout_secs: 5,
            max_page_chars,
        })
        .unwrap()
        .allow_private_hosts()
    }

    #[test]
    fn parse_website_adds_scheme() {
        assert_eq!(
            parse_website("acme.example/about").unwrap().as_str(),
            "https://acme.example/about"
        );
        assert!(parse_website("   ").is_err());
    }

    #[tokio::test]
    async fn scrapes_html_to_text() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(
                "<html><body><nav>Menu</nav><main><h1>Acme</h1><p>Fleet telematics for 900 trucks.</p></main></body></html>",
                "text/html; charset=utf-8",
            ))
            .mount(&server)
            .await;

        let text = scraper(10_000).scrape(&format!("{}/", server.uri())).await;
        assert!(text.contains("# Acme"));
        assert!(text.contains("Fleet telematics for 900 trucks."));
        assert!(!text.contains("Menu"));
    }

    #[tokio::test]
    async fn truncates_long_pages() {
        let server = MockServer::start().await;
        let body = format!("<html><body><main><p>{}</p></main></body></html>", "word ".repeat(500));
        Mock::given(method("GET"))
            .and(path("/long"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/html"))
            .mount(&server)
            .await;

        let text = scraper(50).scrape(&format!("{}/long", server.uri())).await;
        assert!(text.ends_with(icpqualifier_markdown::TRUNCATION_MARKER));
        assert!(text.chars().count() <= 50 + icpqualifier_markdown::TRUNCATION_MARKER.chars().count());
    }

    #[tokio::test]
    async fn non_success_yields_empty() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/gone"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let text = scraper(1000).scrape(&format!("{}/gone", server.uri())).await;
        assert!(text.is_empty());
    }

    #[tokio::test]
    async fn binary_content_yields_empty() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/brochure.pdf"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(vec![0x25, 0x50, 0x44, 0x46], "application/pdf"))
            .mount(&server)
            .await;

        let text = scraper(1000)
            .scrape(&format!("{}/brochure.pdf", server.uri()))
            .await;
        assert!(text.is_empty());
    }

    #[tokio::test]
    async fn private_targets_blocked_by_default() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_raw("<p>secret</p>", "text/html"))
            .expect(0)
            .mount(&server)
            .await;

        let guarded = HttpScraper::new(&ScraperConfig::default()).unwrap();
        let text = guarded.scrape(&format!("{}/", server.uri())).await;
        assert!(text.is_empty());
        server.verify().await;
    }

    #[tokio::test]
    async fn unreachable_host_yields_empty() {
        let text = scraper(1000).scrape("http://127.0.0.1:1/").await;
        assert!(text.is_empty());
    }
}
