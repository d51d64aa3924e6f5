//! Ollama-backed [`SemanticClassifier`].

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use icpqualifier_shared::{LlmConfig, ModelVariant, QualifierError, Result, SemanticClassifier};

use crate::prompts;

/// Talks to a local Ollama server via `POST /api/generate`.
pub struct OllamaClassifier {
    client: Client,
    base_url: String,
    fast_model: String,
    creative_model: String,
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

impl OllamaClassifier {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| QualifierError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            fast_model: config.fast_model.clone(),
            creative_model: config.creative_model.clone(),
        })
    }

    fn model_for(&self, variant: ModelVariant) -> &str {
        match variant {
            ModelVariant::Fast => &self.fast_model,
            ModelVariant::Creative => &self.creative_model,
        }
    }

    /// Run one non-streaming completion.
    async fn generate(&self, model: &str, prompt: &str) -> Result<String> {
        let url = format!("{}/api/generate", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&GenerateRequest {
                model,
                prompt,
                stream: false,
            })
            .send()
            .await
            .map_err(|e| QualifierError::Classifier(format!("{model}: request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(QualifierError::Classifier(format!(
                "{model}: HTTP {status}: {}",
                body.chars().take(200).collect::<String>()
            )));
        }

        let body: GenerateResponse = response
            .json()
            .await
            .map_err(|e| QualifierError::Classifier(format!("{model}: invalid response: {e}")))?;

        Ok(body.response.trim().to_string())
    }
}

#[async_trait]
impl SemanticClassifier for OllamaClassifier {
    #[instrument(skip_all, fields(variant = %variant, context_len = context.len()))]
    async fn analyze(&self, context: &str, question: &str, variant: ModelVariant) -> Result<String> {
        let model = self.model_for(variant);
        let prompt = prompts::analysis_prompt(context, question);
        let answer = self.generate(model, &prompt).await?;
        debug!(model, answer_len = answer.len(), "classifier answered");
        Ok(answer)
    }
}
