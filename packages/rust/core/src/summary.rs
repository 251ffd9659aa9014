//! Summary drafting and revision over retrieved passages.

use tracing::{debug, instrument};

use mediq_capabilities::{GenTask, Generate, PromptStore, prompts};
use mediq_shared::{CapabilityError, CapabilityResult, ContextBudget, Critique, Passage};

use crate::context::format_passages;

/// Drafts and revises the natural-language synthesis. Returns `None`
/// rather than erroring when there is simply nothing to write from.
pub struct SummaryWriter<G> {
    generator: G,
    summary_prompt: Option<String>,
    rewrite_prompt: Option<String>,
    budget: ContextBudget,
}

impl<G: Generate> SummaryWriter<G> {
    pub fn new(generator: G, prompt_store: &PromptStore, budget: ContextBudget) -> Self {
        Self {
            generator,
            summary_prompt: prompt_store.get(prompts::SUMMARY),
            rewrite_prompt: prompt_store.get(prompts::SUMMARY_REWRITE),
            budget,
        }
    }

    /// Draft a summary answering `query` from `passages`.
    ///
    /// `Ok(None)` when passages are empty or carry no usable text; a
    /// missing prompt or generation failure is a capability error the
    /// engine degrades on.
    #[instrument(skip_all, fields(passages = passages.len()))]
    pub async fn draft(
        &self,
        query: &str,
        passages: &[Passage],
    ) -> CapabilityResult<Option<String>> {
        if passages.is_empty() {
            return Ok(None);
        }

        let system = self
            .summary_prompt
            .as_deref()
            .ok_or_else(|| CapabilityError::unavailable("system_summary prompt missing"))?;

        let context = format_passages(passages, &self.budget);
        if context.is_empty() {
            return Ok(None);
        }

        let user = format!(
            "Answer the following question using the text passages.\n\n\
             Question: {query}\n\nPassages:\n{context}"
        );

        let summary = self
            .generator
            .generate(GenTask::SummaryDraft, system, &user)
            .await?;

        let summary = summary.trim();
        debug!(chars = summary.len(), "summary drafted");
        Ok((!summary.is_empty()).then(|| summary.to_string()))
    }

    /// Revise `draft` using critique notes. `Ok(None)` means "keep the
    /// prior draft" — an empty draft, an empty revision, or a degraded
    /// capability never discards what the draft stage produced.
    #[instrument(skip_all)]
    pub async fn revise(
        &self,
        query: &str,
        draft: &str,
        critique: &Critique,
        passages: &[Passage],
    ) -> CapabilityResult<Option<String>> {
        let draft = draft.trim();
        if draft.is_empty() {
            return Ok(None);
        }

        let system = self
            .rewrite_prompt
            .as_deref()
            .ok_or_else(|| CapabilityError::unavailable("system_summary_rewrite prompt missing"))?;

        let context = format_passages(passages, &self.budget);
        let critique_text = format_critique(critique);

        let user = format!(
            "Question: {query}\n\nRetrieved Passages:\n{context}\n\n\
             Original Draft Summary:\n{draft}\n\nCritique Notes:\n{critique_text}"
        );

        let revision = self
            .generator
            .generate(GenTask::SummaryRevise, system, &user)
            .await?;

        let revision = revision.trim();
        debug!(chars = revision.len(), "summary revised");
        Ok((!revision.is_empty()).then(|| revision.to_string()))
    }
}

/// Render critique notes for the rewrite prompt.
fn format_critique(critique: &Critique) -> String {
    let mut parts: Vec<String> = Vec::new();

    let issues: Vec<&str> = critique
        .issues
        .iter()
        .map(|i| i.trim())
        .filter(|i| !i.is_empty())
        .collect();
    if !issues.is_empty() {
        parts.push("Issues:".to_string());
        parts.extend(issues.iter().map(|i| format!("- {i}")));
    }

    let instructions = critique.revision_instructions.trim();
    if !instructions.is_empty() {
        parts.push("\nRevision Instructions:".to_string());
        parts.push(instructions.to_string());
    }

    parts.push(format!(
        "\nNeeds Additional Context: {}",
        critique.needs_additional_context
    ));

    parts.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::Mutex;

    struct ScriptedGenerator {
        response: Option<&'static str>,
        calls: Mutex<Vec<GenTask>>,
    }

    impl ScriptedGenerator {
        fn new(response: Option<&'static str>) -> Self {
            Self {
                response,
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    impl Generate for ScriptedGenerator {
        async fn generate(
            &self,
            task: GenTask,
            _system: &str,
            _user: &str,
        ) -> CapabilityResult<String> {
            self.calls.lock().unwrap().push(task);
            match self.response {
                Some(text) => Ok(text.to_string()),
                None => Err(CapabilityError::transport("generation failed")),
            }
        }

        async fn generate_json(
            &self,
            _task: GenTask,
            _system: &str,
            _user: &str,
        ) -> CapabilityResult<serde_json::Value> {
            Err(CapabilityError::transport("not used"))
        }
    }

    fn prompt_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("mediq-summary-{}", uuid::Uuid::now_v7()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("system_summary.txt"), "You summarize CMI text.").unwrap();
        std::fs::write(dir.join("system_summary_rewrite.txt"), "You revise summaries.").unwrap();
        dir
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

    fn writer(response: Option<&'static str>) -> SummaryWriter<ScriptedGenerator> {
        SummaryWriter::new(
            ScriptedGenerator::new(response),
            &PromptStore::new(prompt_dir()),
            ContextBudget::default(),
        )
    }

    #[tokio::test]
    async fn draft_returns_none_for_empty_passages() {
        let writer = writer(Some("a summary"));
        let result = writer.draft("q", &[]).await.unwrap();
        assert_eq!(result, None);
        assert!(writer.generator.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn draft_produces_trimmed_text() {
        let writer = writer(Some("  the summary  "));
        let result = writer.draft("q", &[passage("text")]).await.unwrap();
        assert_eq!(result.as_deref(), Some("the summary"));
        assert_eq!(
            writer.generator.calls.lock().unwrap().as_slice(),
            &[GenTask::SummaryDraft]
        );
    }

    #[tokio::test]
    async fn draft_failure_is_capability_error() {
        let writer = writer(None);
        assert!(writer.draft("q", &[passage("text")]).await.is_err());
    }

    #[tokio::test]
    async fn missing_prompt_reports_unavailable() {
        let empty_dir = std::env::temp_dir().join("mediq-summary-noprompts");
        std::fs::create_dir_all(&empty_dir).unwrap();
        let writer = SummaryWriter::new(
            ScriptedGenerator::new(Some("text")),
            &PromptStore::new(empty_dir),
            ContextBudget::default(),
        );
        let err = writer.draft("q", &[passage("text")]).await.unwrap_err();
        assert_eq!(err.kind, mediq_shared::CapabilityErrorKind::Unavailable);
    }

    #[tokio::test]
    async fn revise_keeps_draft_on_empty_input() {
        let writer = writer(Some("revision"));
        let result = writer
            .revise("q", "  ", &Critique::default(), &[])
            .await
            .unwrap();
        assert_eq!(result, None);
        assert!(writer.generator.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn revise_returns_revision() {
        let writer = writer(Some("better summary"));
        let critique = Critique {
            revision_instructions: "tighten wording".into(),
            issues: vec!["too vague".into()],
            needs_additional_context: false,
        };
        let result = writer
            .revise("q", "draft", &critique, &[passage("text")])
            .await
            .unwrap();
        assert_eq!(result.as_deref(), Some("better summary"));
        assert_eq!(
            writer.generator.calls.lock().unwrap().as_slice(),
            &[GenTask::SummaryRevise]
        );
    }

    #[test]
    fn critique_formatting_lists_issues_then_instructions() {
        let critique = Critique {
            revision_instructions: "cite sections".into(),
            issues: vec!["missing dose caveat".into(), " ".into()],
            needs_additional_context: true,
        };
        let text = format_critique(&critique);
        assert!(text.contains("Issues:\n- missing dose caveat"));
        assert!(text.contains("Revision Instructions:\ncite sections"));
        assert!(text.contains("Needs Additional Context: true"));
    }
}
