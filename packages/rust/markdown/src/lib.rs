//! HTML-to-text conversion for company web pages.
//!
//! Converts a fetched page into compact Markdown suitable as classifier
//! context: the main content is extracted, site chrome is dropped, tables are
//! kept as Markdown tables, and a series of cleanup passes removes link
//! targets, images and stray markup.

mod cleanup;

use std::sync::LazyLock;

use regex::Regex;
use scraper::{Html, Selector};
use tracing::{debug, instrument};

use icpqualifier_shared::{QualifierError, Result};

/// Marker appended when page text is cut short.
pub const TRUNCATION_MARKER: &str = "\n\n[... page text truncated ...]";

/// Tags whose content never reaches the page text.
const SKIP_TAGS: &[&str] = &[
    "script", "style", "nav", "header", "footer", "aside", "form", "iframe", "noscript", "svg",
    "button",
];

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// A page converted to Markdown text.
#[derive(Debug, Clone)]
pub struct PageText {
    /// Cleaned Markdown body.
    pub text: String,
    /// `<title>` of the document, or the first H1, if any.
    pub title: Option<String>,
    /// Approximate word count of `text`.
    pub word_count: usize,
}

// ---------------------------------------------------------------------------
// Converter
// ---------------------------------------------------------------------------

/// Convert a full HTML document to page text.
///
/// 1. Extract the main content container (falls back to `<body>`)
/// 2. Pre-process tables into Markdown tables
/// 3. Convert HTML → Markdown via `htmd`, skipping chrome tags
/// 4. Run the cleanup pipeline
#[instrument(skip(html), fields(html_len = html.len()))]
pub fn html_to_page_text(html: &str) -> Result<PageText> {
    let doc = Html::parse_document(html);
    let document_title = extract_document_title(&doc);

    let content_html = extract_content_html(&doc, html);
    let content_html = preprocess_tables(&content_html);

    let converter = htmd::HtmlToMarkdown::builder()
        .skip_tags(SKIP_TAGS.to_vec())
        .build();

    let raw_markdown = converter
        .convert(&content_html)
        .map_err(|e| QualifierError::Conversion(format!("htmd conversion failed: {e}")))?;

    let text = cleanup::run_pipeline(&raw_markdown);
    let title = document_title.or_else(|| extract_title_from_markdown(&text));
    let word_count = text.split_whitespace().count();

    debug!(word_count, text_len = text.len(), "page converted");

    Ok(PageText {
        text,
        title,
        word_count,
    })
}

/// Cut `text` to at most `max_chars` characters, appending
/// [`TRUNCATION_MARKER`] when anything was removed.
///
/// Counts characters, not bytes, so multi-byte text never splits mid-char.
pub fn truncate_text(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        None => text.to_string(),
        Some((byte_idx, _)) => format!("{}{TRUNCATION_MARKER}", &text[..byte_idx]),
    }
}

// ---------------------------------------------------------------------------
// Table pre-processing
// ---------------------------------------------------------------------------

/// Replace `<table>` elements with Markdown tables before htmd runs.
///
/// `htmd` 0.1 has no table support.
fn preprocess_tables(html: &str) -> String {
    static TABLE_SEL: LazyLock<Selector> =
        LazyLock::new(|| Selector::parse("table").expect("valid selector"));

    let doc = Html::parse_fragment(html);
    if doc.select(&TABLE_SEL).next().is_none() {
        return html.to_string();
    }

    let mut result = html.to_string();
    for table_el in doc.select(&TABLE_SEL) {
        let md_table = html_table_to_markdown(&table_el);
        result = result.replacen(&table_el.html(), &md_table, 1);
    }
    result
}

fn html_table_to_markdown(table: &scraper::ElementRef) -> String {
    static TR_SEL: LazyLock<Selector> =
        LazyLock::new(|| Selector::parse("tr").expect("valid selector"));
    static CELL_SEL: LazyLock<Selector> =
        LazyLock::new(|| Selector::parse("th, td").expect("valid selector"));

    let mut rows: Vec<Vec<String>> = table
        .select(&TR_SEL)
        .map(|tr| {
            tr.select(&CELL_SEL)
                .map(|cell| {
                    cell.text()
                        .collect::<String>()
                        .split_whitespace()
                        .collect::<Vec<_>>()
                        .join(" ")
                })
                .collect::<Vec<_>>()
        })
        .filter(|row| !row.is_empty())
        .collect();

    let col_count = rows.iter().map(Vec::len).max().unwrap_or(0);
    if col_count == 0 {
        return String::new();
    }
    for row in &mut rows {
        row.resize(col_count, String::new());
    }

    let mut md = String::from("\n\n");
    for (i, row) in rows.iter().enumerate() {
        md.push_str("| ");
        md.push_str(&row.join(" | "));
        md.push_str(" |\n");
        if i == 0 {
            md.push_str("| ");
            md.push_str(&vec!["---"; col_count].join(" | "));
            md.push_str(" |\n");
        }
    }
    md.push('\n');
    md
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Pick the main content container of a company page.
fn extract_content_html(doc: &Html, raw: &str) -> String {
    let selectors = [
        "main",
        "[role=\"main\"]",
        "article",
        "#content",
        ".content",
        "body",
    ];

    for sel_str in &selectors {
        let Ok(selector) = Selector::parse(sel_str) else {
            continue;
        };
        if let Some(el) = doc.select(&selector).next() {
            let inner = el.inner_html();
            if !inner.trim().is_empty() {
                return inner;
            }
        }
    }

    raw.to_string()
}

fn extract_document_title(doc: &Html) -> Option<String> {
    static TITLE_SEL: LazyLock<Selector> =
        LazyLock::new(|| Selector::parse("head > title").expect("valid selector"));

    doc.select(&TITLE_SEL)
        .next()
        .map(|t| t.text().collect::<String>().trim().to_string())
        .filter(|t| !t.is_empty())
}

fn extract_title_from_markdown(md: &str) -> Option<String> {
    static H1_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(?m)^# (.+)$").expect("valid regex"));

    H1_RE.captures(md).map(|c| c[1].trim().to_string())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
