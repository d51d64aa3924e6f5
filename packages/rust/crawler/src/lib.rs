//! Company website fetching.
//!
//! - [`HttpScraper`]: the production [`WebScraper`](icpqualifier_shared::WebScraper)
//! - [`is_ssrf_target`]: outbound URL guard applied before every fetch

mod guard;
mod http;

pub use guard::is_ssrf_target;
pub use http::HttpScraper;
