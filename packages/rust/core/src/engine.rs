//! End-to-end query pipeline: moderation → drug detection → retrieval
//! → summary writing → (reflection → revision) → response building.
//!
//! The engine drives a statically defined stage machine over one
//! [`PipelineState`], isolates capability failures per stage, emits
//! progress events to an injected observer, and guarantees a terminal
//! answer on every path.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::Instant;

use tracing::{info, instrument, warn};

use mediq_capabilities::{Classify, Embed, ExtractEntities, Generate, PromptStore};
use mediq_index::PassageStore;
use mediq_shared::{
    AppConfig, CapabilityError, ContextBudget, Mode, PipelineState, RetrievalConfig,
    SafetyIntentDecision, StageError, StageTiming,
};

use crate::assembler;
use crate::critic::Critic;
use crate::entities::EntityExtractor;
use crate::gate::SafetyIntentGate;
use crate::retrieval::RetrievalEngine;
use crate::summary::SummaryWriter;

/// Event name for the wrapping workflow start/end pair.
const WORKFLOW: &str = "workflow";

// ---------------------------------------------------------------------------
// Observer
// ---------------------------------------------------------------------------

/// Whether a stage event marks entry or completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StagePhase {
    Start,
    End,
}

/// Progress callback for pipeline runs. Strictly observational: engine
/// behavior is identical with or without an observer attached.
pub trait PipelineObserver: Send + Sync {
    /// Called at each stage boundary, plus a wrapping `workflow` pair.
    fn stage(&self, stage: &str, phase: StagePhase, label: Option<&str>);
}

/// No-op observer for headless/test usage.
pub struct SilentObserver;

impl PipelineObserver for SilentObserver {
    fn stage(&self, _stage: &str, _phase: StagePhase, _label: Option<&str>) {}
}

/// Best-effort event delivery; a panicking observer must never affect
/// the pipeline outcome.
fn emit(observer: &dyn PipelineObserver, stage: &str, phase: StagePhase, label: Option<&str>) {
    let result = catch_unwind(AssertUnwindSafe(|| observer.stage(stage, phase, label)));
    if result.is_err() {
        warn!(stage, "pipeline observer panicked; event dropped");
    }
}

// ---------------------------------------------------------------------------
// Stage machine
// ---------------------------------------------------------------------------

/// Pipeline stages. The topology is fixed per mode; transitions are
/// computed in [`PipelineEngine::run_stage`], not built per request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Moderation,
    DrugDetection,
    Retrieval,
    SummaryWriting,
    Reflection,
    Revision,
    ResponseBuilding,
}

impl Stage {
    fn name(&self) -> &'static str {
        match self {
            Self::Moderation => "moderation",
            Self::DrugDetection => "drug_detection",
            Self::Retrieval => "retrieval",
            Self::SummaryWriting => "summary_writing",
            Self::Reflection => "reflection",
            Self::Revision => "revision",
            Self::ResponseBuilding => "response_building",
        }
    }
}

/// Outcome of one stage: where to go next, plus an optional label for
/// the stage-end event.
struct StageOutcome {
    next: Option<Stage>,
    label: Option<String>,
}

impl StageOutcome {
    fn next(stage: Stage, label: impl Into<String>) -> Self {
        Self {
            next: Some(stage),
            label: Some(label.into()),
        }
    }

    fn terminal(label: impl Into<String>) -> Self {
        Self {
            next: None,
            label: Some(label.into()),
        }
    }
}

// ---------------------------------------------------------------------------
// PipelineEngine
// ---------------------------------------------------------------------------

/// The orchestrator. Holds the stage components; each run owns its own
/// [`PipelineState`], so one engine serves concurrent queries.
pub struct PipelineEngine<C, X, E, G> {
    gate: SafetyIntentGate<C>,
    detector: EntityExtractor<X>,
    retrieval: RetrievalEngine<E>,
    writer: SummaryWriter<G>,
    critic: Critic<G>,
}

impl<C, X, E, G> PipelineEngine<C, X, E, G>
where
    C: Classify,
    X: ExtractEntities,
    E: Embed,
    G: Generate + Clone,
{
    /// Assemble the engine from capabilities, the shared passage store,
    /// prompt templates, and app config.
    pub fn new(
        classifier: C,
        extractor: X,
        embedder: E,
        generator: G,
        store: Arc<PassageStore>,
        prompts: &PromptStore,
        config: &AppConfig,
    ) -> Self {
        let budget = ContextBudget::from(&config.context);
        Self {
            gate: SafetyIntentGate::new(classifier),
            detector: EntityExtractor::new(extractor),
            retrieval: RetrievalEngine::new(
                embedder,
                store,
                RetrievalConfig::from(&config.retrieval),
            ),
            writer: SummaryWriter::new(generator.clone(), prompts, budget.clone()),
            critic: Critic::new(generator, prompts, budget),
        }
    }

    /// Run the pipeline without progress reporting.
    pub async fn run(&self, query: &str, mode: Mode) -> PipelineState {
        self.run_with_observer(query, mode, &SilentObserver).await
    }

    /// Run the pipeline, emitting stage events to `observer`.
    ///
    /// Never fails for stage-internal reasons: every terminal path
    /// leaves `state.answer` populated.
    #[instrument(skip_all, fields(mode = %mode))]
    pub async fn run_with_observer(
        &self,
        query: &str,
        mode: Mode,
        observer: &dyn PipelineObserver,
    ) -> PipelineState {
        let run_started = Instant::now();
        let mut state = PipelineState::new(query, mode);

        info!(run_id = %state.run_id, "pipeline run starting");
        emit(observer, WORKFLOW, StagePhase::Start, None);

        let mut stage = Stage::Moderation;
        loop {
            emit(observer, stage.name(), StagePhase::Start, None);
            let stage_started = Instant::now();

            let outcome = self.run_stage(stage, &mut state).await;

            state.stage_timings.push(StageTiming {
                stage: stage.name().to_string(),
                elapsed_ms: stage_started.elapsed().as_millis() as u64,
            });
            emit(observer, stage.name(), StagePhase::End, outcome.label.as_deref());

            match outcome.next {
                Some(next) => stage = next,
                None => break,
            }
        }

        state.elapsed_ms = run_started.elapsed().as_millis() as u64;
        emit(observer, WORKFLOW, StagePhase::End, None);

        debug_assert!(state.answer.is_some(), "terminal state must carry an answer");
        info!(
            run_id = %state.run_id,
            elapsed_ms = state.elapsed_ms,
            stages = state.stage_timings.len(),
            "pipeline run complete"
        );
        state
    }

    /// Execute one stage against the shared state and decide the
    /// transition. Every capability failure is handled here, locally:
    /// moderation fails closed, everything else fails open.
    async fn run_stage(&self, stage: Stage, state: &mut PipelineState) -> StageOutcome {
        match stage {
            Stage::Moderation => {
                let decision = match self.gate.decide(&state.query).await {
                    Ok(decision) => decision,
                    Err(e) => {
                        record_error(state, stage, &e);
                        SafetyIntentDecision::error()
                    }
                };

                let allowed = decision.allow();
                let message = decision.message.clone();
                state.decision = Some(decision);

                if allowed {
                    StageOutcome::next(Stage::DrugDetection, "allowed")
                } else {
                    state.answer = Some(assembler::refusal(message.as_deref()));
                    StageOutcome::terminal("refused")
                }
            }

            Stage::DrugDetection => {
                match self.detector.extract(&state.query).await {
                    Ok(names) => state.detected_names = names,
                    Err(e) => record_error(state, stage, &e),
                }

                // Extraction is advisory: with no names there is nothing
                // to retrieve against, so the run shortcuts to the
                // "not found" answer; it never blocks otherwise.
                if state.detected_names.is_empty() {
                    StageOutcome::next(Stage::ResponseBuilding, "no entities")
                } else {
                    StageOutcome::next(
                        Stage::Retrieval,
                        format!("{} name(s)", state.detected_names.len()),
                    )
                }
            }

            Stage::Retrieval => {
                match self
                    .retrieval
                    .retrieve(&state.query, &state.detected_names)
                    .await
                {
                    Ok(passages) => state.passages = passages,
                    Err(e) => record_error(state, stage, &e),
                }
                StageOutcome::next(
                    Stage::SummaryWriting,
                    format!("{} passage(s)", state.passages.len()),
                )
            }

            Stage::SummaryWriting => {
                match self.writer.draft(&state.query, &state.passages).await {
                    Ok(draft) => state.draft_summary = draft,
                    Err(e) => record_error(state, stage, &e),
                }

                let label = if state.draft_summary.is_some() {
                    "drafted"
                } else {
                    "no draft"
                };
                match state.mode {
                    Mode::Advanced => StageOutcome::next(Stage::Reflection, label),
                    Mode::Light => StageOutcome::next(Stage::ResponseBuilding, label),
                }
            }

            Stage::Reflection => {
                match self
                    .critic
                    .review(&state.query, state.draft_summary.as_deref(), &state.passages)
                    .await
                {
                    Ok(critique) => state.critique = Some(critique),
                    Err(e) => {
                        record_error(state, stage, &e);
                        state.critique = Some(Default::default());
                    }
                }
                StageOutcome::next(Stage::Revision, "reviewed")
            }

            Stage::Revision => {
                let draft = state.draft_summary.clone().unwrap_or_default();
                let critique = state.critique.clone().unwrap_or_default();

                match self
                    .writer
                    .revise(&state.query, &draft, &critique, &state.passages)
                    .await
                {
                    Ok(revised) => state.revised_summary = revised,
                    Err(e) => record_error(state, stage, &e),
                }

                let label = if state.revised_summary.is_some() {
                    "revised"
                } else {
                    "kept draft"
                };
                StageOutcome::next(Stage::ResponseBuilding, label)
            }

            Stage::ResponseBuilding => {
                let summary = state.final_summary().map(String::from);
                state.answer = Some(assembler::assemble(&state.passages, summary));

                let label = if state.passages.is_empty() {
                    "not found"
                } else {
                    "answered"
                };
                StageOutcome::terminal(label)
            }
        }
    }
}

/// Record a degraded stage for diagnostics. Only the most recent
/// failure is kept; each is also logged as it happens.
fn record_error(state: &mut PipelineState, stage: Stage, error: &CapabilityError) {
    warn!(
        stage = stage.name(),
        kind = error.kind.as_str(),
        status = error.status,
        error = %error.message,
        "stage degraded"
    );
    state.last_stage_error = Some(StageError {
        stage: stage.name().to_string(),
        kind: error.kind,
        status: error.status,
        message: error.message.clone(),
    });
}
