//! Target profile generation.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{info, instrument, warn};

use icpqualifier_shared::{ProfileSource, QualifierError, RetryPolicy, retry_with_backoff};

use crate::decode::parse_llm_json;
use crate::knowledge::KnowledgeBase;
use crate::prompts;

/// Keys checked, in order, when a profile list item is an object.
const PROFILE_KEYS: &[&str] = &["Company", "profile", "name"];

/// Produces ideal-customer profiles for a territory from the knowledge base.
pub struct ProfileGenerator {
    knowledge: Arc<dyn KnowledgeBase>,
    retry: RetryPolicy,
}

impl ProfileGenerator {
    pub fn new(knowledge: Arc<dyn KnowledgeBase>) -> Self {
        Self {
            knowledge,
            retry: RetryPolicy::fixed_ms(2, 2000),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

#[async_trait]
impl ProfileSource for ProfileGenerator {
    #[instrument(skip(self))]
    async fn get_profiles(&self, territory: &str) -> Vec<String> {
        let question = prompts::profiles_question(territory);
        let question = question.as_str();
        let knowledge = self.knowledge.as_ref();

        let result = retry_with_backoff(self.retry, "profile generation", |_| async move {
            let answer = knowledge.answer(question).await?;
            let profiles = extract_profiles(&answer);
            if profiles.is_empty() {
                Err(QualifierError::parse("no profiles in knowledge base answer"))
            } else {
                Ok(profiles)
            }
        })
        .await;

        match result {
            Ok(profiles) => {
                info!(count = profiles.len(), "profiles generated");
                profiles
            }
            Err(e) => {
                warn!(error = %e, "profile generation failed, continuing with none");
                Vec::new()
            }
        }
    }
}

/// Pull profile strings out of a model answer.
///
/// Accepts a JSON list whose items are strings, or objects carrying a string
/// under one of [`PROFILE_KEYS`]. Anything else is skipped.
pub fn extract_profiles(answer: &str) -> Vec<String> {
    let Some(Value::Array(items)) = parse_llm_json(answer) else {
        return Vec::new();
    };

    items
        .iter()
        .filter_map(|item| match item {
            Value::String(s) => Some(s.as_str()),
            Value::Object(map) => PROFILE_KEYS
                .iter()
                .find_map(|key| map.get(*key).and_then(Value::as_str)),
            _ => None,
        })
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}
