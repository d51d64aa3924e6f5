//! Knowledge base consulted for target profile generation.
//!
//! [`DocumentKnowledgeBase`] stuffs the product documents from the knowledge
//! directory into the classifier context. There is no vector index: the
//! concatenated corpus is truncated to a fixed budget.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, instrument, warn};

use icpqualifier_shared::{ModelVariant, QualifierError, Result, SemanticClassifier};

use crate::prompts;

/// Maximum characters of document text handed to the model.
pub const MAX_CONTEXT_CHARS: usize = 24_000;

/// Document extensions loaded from the knowledge directory.
const DOCUMENT_EXTENSIONS: &[&str] = &["md", "txt"];

/// Answers questions from a document corpus.
#[async_trait]
pub trait KnowledgeBase: Send + Sync {
    async fn answer(&self, question: &str) -> Result<String>;
}

/// Knowledge base built from `.md`/`.txt` files.
pub struct DocumentKnowledgeBase {
    context: String,
    document_count: usize,
    classifier: Arc<dyn SemanticClassifier>,
}

impl DocumentKnowledgeBase {
    /// Load every supported document in `dir`, sorted by file name.
    ///
    /// A missing or empty directory yields a knowledge base with no context;
    /// answers then rely on the question alone.
    #[instrument(skip_all, fields(dir = %dir.display()))]
    pub async fn load(dir: &Path, classifier: Arc<dyn SemanticClassifier>) -> Result<Self> {
        let mut documents = Vec::new();

        match tokio::fs::read_dir(dir).await {
            Ok(mut entries) => {
                while let Some(entry) = entries
                    .next_entry()
                    .await
                    .map_err(|e| QualifierError::io(dir, e))?
                {
                    let path = entry.path();
                    let supported = path
                        .extension()
                        .and_then(|e| e.to_str())
                        .is_some_and(|ext| {
                            DOCUMENT_EXTENSIONS
                                .iter()
                                .any(|known| ext.eq_ignore_ascii_case(known))
                        });
                    if !supported {
                        continue;
                    }
                    match tokio::fs::read_to_string(&path).await {
                        Ok(text) if !text.trim().is_empty() => documents.push((path, text)),
                        Ok(_) => debug!(path = %path.display(), "skipping empty document"),
                        Err(e) => warn!(path = %path.display(), error = %e, "unreadable document"),
                    }
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("knowledge directory not found, profiles will be generated without documents");
            }
            Err(e) => return Err(QualifierError::io(dir, e)),
        }

        documents.sort_by(|a, b| a.0.cmp(&b.0));

        if documents.is_empty() {
            warn!("no knowledge documents loaded");
        } else {
            info!(documents = documents.len(), "knowledge documents loaded");
        }

        let document_count = documents.len();
        let corpus = documents
            .iter()
            .map(|(path, text)| {
                let name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                format!("## Source: {name}\n\n{}", text.trim())
            })
            .collect::<Vec<_>>()
            .join("\n\n");

        Ok(Self::from_context(
            icpqualifier_markdown::truncate_text(&corpus, MAX_CONTEXT_CHARS),
            document_count,
            classifier,
        ))
    }

    /// Build from an already assembled context.
    pub fn from_context(
        context: impl Into<String>,
        document_count: usize,
        classifier: Arc<dyn SemanticClassifier>,
    ) -> Self {
        Self {
            context: context.into(),
            document_count,
            classifier,
        }
    }

    pub fn document_count(&self) -> usize {
        self.document_count
    }
}

#[async_trait]
impl KnowledgeBase for DocumentKnowledgeBase {
    async fn answer(&self, question: &str) -> Result<String> {
        self.classifier
            .analyze(
                &self.context,
                &prompts::knowledge_question(question),
                ModelVariant::Fast,
            )
            .await
    }
}
