//! Core pipeline orchestration and domain logic for the ICP qualifier.
//!
//! This crate ties together discovery, verification, relevance scoring and
//! revenue enrichment into the end-to-end territory run
//! ([`find_companies`]), plus the LLM-backed collaborators it consumes.

pub mod decode;
pub mod discovery;
pub mod enrichment;
pub mod knowledge;
pub mod llm;
pub mod pipeline;
pub mod profiles;
pub mod progress;
pub mod prompts;
pub mod state;
pub mod verification;

pub use knowledge::{DocumentKnowledgeBase, KnowledgeBase};
pub use llm::OllamaClassifier;
pub use pipeline::{Collaborators, PipelineOptions, RunReport, find_companies};
pub use profiles::ProfileGenerator;
pub use progress::{PipelineProgress, SilentProgress};
