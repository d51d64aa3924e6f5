//! Prompt text for every classifier call the pipeline makes.

use icpqualifier_shared::SearchResultStub;

/// Frame a question over a block of context for the analysis models.
pub fn analysis_prompt(context: &str, question: &str) -> String {
    format!(
        "Here is a block of text:\n---\n{context}\n---\nBased *only* on the text provided, answer the following question: {question}"
    )
}

/// Context for company verification: the search result's title and snippet.
pub fn stub_context(stub: &SearchResultStub) -> String {
    format!("Title: {}\nSnippet: {}", stub.title, stub.snippet)
}

pub fn verification_question() -> &'static str {
    r#"Analyze the search result. Is this a direct link to a specific company that sells products or services?
Do not be fooled by blog posts, news articles, or directories.
Return a JSON object like {"is_company": true, "company_name": "Corrected Company Name"} or {"is_company": false, "company_name": null}."#
}

/// Relevance question for `company_name`, scored 0–10.
///
/// The model is also asked for the headquarters country so the disallowed
/// region rule can be enforced on our side.
pub fn relevance_question(
    company_name: &str,
    ideal_customer: &str,
    exemplar_companies: &[String],
    disallowed_regions: &[String],
) -> String {
    let exemplars = exemplar_companies.join(", ");
    let region_rule = if disallowed_regions.is_empty() {
        String::new()
    } else {
        format!(
            "Important: Companies primarily based in {} must get a score of 0.\n",
            disallowed_regions.join(", ")
        )
    };

    format!(
        r#"My ideal customer: {ideal_customer}. Examples of perfect-fit companies: [{exemplars}].
Analyze the text from the website of a candidate company called "{company_name}".
{region_rule}Based on all rules, how relevant is this company? Return JSON with a score from 0-10, the country where the company is headquartered, and reasoning.
Example: {{"relevance_score": 8, "headquarters_country": "USA", "reasoning": "The website focuses on fleet telematics, a direct fit."}}"#
    )
}

/// Targeted search for a company's revenue on one financial data site.
pub fn premium_revenue_query(source: &str, company_name: &str) -> String {
    format!("site:{source} \"{company_name}\" annual revenue")
}

/// Join search snippets into the context for the premium revenue question.
pub fn snippet_context(results: &[SearchResultStub]) -> String {
    results
        .iter()
        .map(|r| format!("Snippet: {}", r.snippet))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn premium_revenue_question() -> &'static str {
    r#"Analyze the text to find the annual revenue. Return JSON like {"revenue_in_millions": 50.5} or null."#
}

pub fn fallback_revenue_question(company_name: &str) -> String {
    format!(
        r#"Analyze the website text for "{company_name}" to find any indicators of company size or revenue:
- Direct revenue mentions
- Funding announcements (e.g., "raised $50M")
- Employee count (rough estimate: 100 employees ≈ $10M revenue)
- Number of customers or contracts
- Company size descriptions ("leading provider", "startup", etc.)

Return JSON with your best estimate:
{{"revenue_in_millions": 25.0, "confidence": "low/medium/high", "reasoning": "..."}}

If no indicators found, return null."#
    )
}

/// Question put to the knowledge base when generating target profiles.
pub fn profiles_question(territory: &str) -> String {
    format!(
        r#"Based on the provided documents, generate a JSON list of 5 specific company profiles in "{territory}" that would be ideal customers (B2B and B2C).
Example for "USA": ["fleet management solution providers for long-haul trucking in the US", "American automotive electronics retailers"]"#
    )
}

/// Consultant framing for knowledge-base answers.
pub fn knowledge_question(question: &str) -> String {
    format!(
        "You are an expert industry consultant. Provide a concise and factual answer based ONLY on the provided context.\nQuestion: {question}"
    )
}
