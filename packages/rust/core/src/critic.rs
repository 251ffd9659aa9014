//! Draft critique: structured revision guidance for the rewrite stage.

use tracing::{debug, instrument};

use mediq_capabilities::{GenTask, Generate, PromptStore, prompts};
use mediq_shared::{CapabilityError, CapabilityResult, ContextBudget, Critique, Passage};

use crate::context::format_passages;

/// Reviews a draft summary against the retrieved passages and produces
/// a [`Critique`]. Only runs in advanced mode.
pub struct Critic<G> {
    generator: G,
    prompt: Option<String>,
    budget: ContextBudget,
}

impl<G: Generate> Critic<G> {
    pub fn new(generator: G, prompt_store: &PromptStore, budget: ContextBudget) -> Self {
        Self {
            generator,
            prompt: prompt_store.get(prompts::REFLECTION),
            budget,
        }
    }

    /// Critique `draft`. A missing draft yields the default empty
    /// critique without a capability call; a missing prompt or a failed
    /// call is a capability error the engine degrades to the same
    /// default.
    ///
    /// When no passages back the draft, the critique always flags that
    /// additional context is needed.
    #[instrument(skip_all, fields(passages = passages.len()))]
    pub async fn review(
        &self,
        query: &str,
        draft: Option<&str>,
        passages: &[Passage],
    ) -> CapabilityResult<Critique> {
        let Some(draft) = draft.map(str::trim).filter(|d| !d.is_empty()) else {
            return Ok(Critique::default());
        };

        let system = self
            .prompt
            .as_deref()
            .ok_or_else(|| CapabilityError::unavailable("system_reflection prompt missing"))?;

        let context = format_passages(passages, &self.budget);
        let user = format!(
            "Question: {query}\n\nDraft Summary:\n{draft}\n\nRetrieved Passages:\n{context}"
        );

        let value = self
            .generator
            .generate_json(GenTask::Critique, system, &user)
            .await?;

        let mut critique: Critique = serde_json::from_value(value).unwrap_or_default();
        if passages.is_empty() {
            critique.needs_additional_context = true;
        }

        debug!(
            issues = critique.issues.len(),
            needs_context = critique.needs_additional_context,
            "draft reviewed"
        );
        Ok(critique)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::path::PathBuf;

    struct JsonGenerator {
        value: Option<serde_json::Value>,
    }

    impl Generate for JsonGenerator {
        async fn generate(
            &self,
            _task: GenTask,
            _system: &str,
            _user: &str,
        ) -> CapabilityResult<String> {
            Err(CapabilityError::transport("not used"))
        }

        async fn generate_json(
            &self,
            _task: GenTask,
            _system: &str,
            _user: &str,
        ) -> CapabilityResult<serde_json::Value> {
            self.value
                .clone()
                .ok_or_else(|| CapabilityError::transport("critique failed"))
        }
    }

    fn prompt_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("mediq-critic-{}", uuid::Uuid::now_v7()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("system_reflection.txt"), "You critique summaries.").unwrap();
        dir
    }

    fn critic(value: Option<serde_json::Value>) -> Critic<JsonGenerator> {
        Critic::new(
            JsonGenerator { value },
            &PromptStore::new(prompt_dir()),
            ContextBudget::default(),
        )
    }

    fn passage(text: &str) -> Passage {
        Passage {
            text: text.into(),
            source_url: None,
            section: None,
            score: 0.8,
            drug_name: None,
            active_ingredients: None,
        }
    }

    #[tokio::test]
    async fn missing_draft_yields_default_critique() {
        let critique = critic(Some(json!({})))
            .review("q", None, &[passage("t")])
            .await
            .unwrap();
        assert!(critique.issues.is_empty());
        assert!(critique.revision_instructions.is_empty());
        assert!(!critique.needs_additional_context);
    }

    #[tokio::test]
    async fn parses_structured_payload() {
        let critique = critic(Some(json!({
            "revision_instructions": "mention interactions",
            "issues": ["no interaction info"],
            "needs_additional_context": false,
        })))
        .review("q", Some("draft"), &[passage("t")])
        .await
        .unwrap();

        assert_eq!(critique.revision_instructions, "mention interactions");
        assert_eq!(critique.issues, vec!["no interaction info"]);
        assert!(!critique.needs_additional_context);
    }

    #[tokio::test]
    async fn unexpected_shape_falls_back_to_default() {
        let critique = critic(Some(json!(["not", "an", "object"])))
            .review("q", Some("draft"), &[passage("t")])
            .await
            .unwrap();
        assert!(critique.issues.is_empty());
    }

    #[tokio::test]
    async fn empty_passages_force_needs_additional_context() {
        let critique = critic(Some(json!({ "needs_additional_context": false })))
            .review("q", Some("draft"), &[])
            .await
            .unwrap();
        assert!(critique.needs_additional_context);
    }

    #[tokio::test]
    async fn capability_failure_propagates() {
        let result = critic(None).review("q", Some("draft"), &[passage("t")]).await;
        assert!(result.is_err());
    }
}
