//! Capability contracts consumed by the MedIQ pipeline, plus the Groq
//! HTTP provider.
//!
//! A *capability* is an external, possibly-failing service a pipeline
//! stage invokes: safety/intent classification, entity extraction,
//! text generation, and query embedding. Stages are generic over these
//! traits so deterministic test doubles can stand in for providers.
//!
//! Every capability call returns [`CapabilityResult`]; providers never
//! panic and never retry — transport policy belongs to the provider's
//! HTTP client, degrade policy belongs to the pipeline engine.

pub mod groq;
pub mod prompts;

use std::future::Future;

use mediq_shared::CapabilityResult;

pub use groq::{GroqClient, HttpEmbedder};
pub use prompts::PromptStore;

// ---------------------------------------------------------------------------
// Contracts
// ---------------------------------------------------------------------------

/// Raw classifier output. Labels are provider strings; normalization to
/// the known enums happens in the moderation stage.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct Classification {
    #[serde(default)]
    pub safety_label: String,
    #[serde(default)]
    pub intent_label: String,
}

/// Safety/intent classification of a user query.
pub trait Classify: Send + Sync {
    fn classify(
        &self,
        query: &str,
    ) -> impl Future<Output = CapabilityResult<Classification>> + Send;
}

/// Extraction of drug/ingredient names literally present in a query.
pub trait ExtractEntities: Send + Sync {
    fn extract(&self, query: &str) -> impl Future<Output = CapabilityResult<Vec<String>>> + Send;
}

/// Which generation task a call serves. Providers may select model and
/// temperature per task; the calling contract is otherwise identical.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GenTask {
    /// Draft a summary from retrieved passages.
    SummaryDraft,
    /// Revise a draft using critique notes.
    SummaryRevise,
    /// Critique a draft (structured output).
    Critique,
}

impl GenTask {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SummaryDraft => "summary_draft",
            Self::SummaryRevise => "summary_revise",
            Self::Critique => "critique",
        }
    }
}

/// Free-text and structured generation.
pub trait Generate: Send + Sync {
    /// Generate free text from a system prompt and user context.
    fn generate(
        &self,
        task: GenTask,
        system_prompt: &str,
        user_context: &str,
    ) -> impl Future<Output = CapabilityResult<String>> + Send;

    /// Structured-output variant: the provider is asked for a JSON
    /// object, parsed before return.
    fn generate_json(
        &self,
        task: GenTask,
        system_prompt: &str,
        user_context: &str,
    ) -> impl Future<Output = CapabilityResult<serde_json::Value>> + Send;
}

/// Embedding of text into the corpus vector space.
pub trait Embed: Send + Sync {
    fn embed(&self, text: &str) -> impl Future<Output = CapabilityResult<Vec<f32>>> + Send;
}
