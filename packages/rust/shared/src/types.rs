//! Core domain types for the MedIQ query pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::CapabilityErrorKind;
use crate::messages;

// ---------------------------------------------------------------------------
// RunId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper for pipeline run identifiers (time-sortable).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub Uuid);

impl RunId {
    /// Generate a new time-sortable run identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Mode
// ---------------------------------------------------------------------------

/// Pipeline mode: `Light` answers directly from the draft summary,
/// `Advanced` adds the critique and revision stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Light,
    Advanced,
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Light => write!(f, "light"),
            Self::Advanced => write!(f, "advanced"),
        }
    }
}

impl std::str::FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "light" => Ok(Self::Light),
            "advanced" => Ok(Self::Advanced),
            other => Err(format!("unknown mode '{other}' (expected light|advanced)")),
        }
    }
}

// ---------------------------------------------------------------------------
// Safety / intent classification
// ---------------------------------------------------------------------------

/// Safety category assigned to a query by the moderation stage.
///
/// Labels the classifier returns outside the known set normalize to
/// [`SafetyLabel::Other`]; `Error` and `Empty` are assigned locally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SafetyLabel {
    Safe,
    MedicalAdvice,
    Emergency,
    SelfHarm,
    Other,
    Error,
    Empty,
}

impl SafetyLabel {
    /// Parse a raw classifier label, normalizing unknown values to `Other`.
    pub fn from_raw(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "safe" => Self::Safe,
            "medical_advice" => Self::MedicalAdvice,
            "emergency" => Self::Emergency,
            "self_harm" => Self::SelfHarm,
            _ => Self::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Safe => "safe",
            Self::MedicalAdvice => "medical_advice",
            Self::Emergency => "emergency",
            Self::SelfHarm => "self_harm",
            Self::Other => "other",
            Self::Error => "error",
            Self::Empty => "empty",
        }
    }
}

/// Intent category assigned to a query by the moderation stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentLabel {
    /// Asking about content of PI/CMI product documents.
    PiCmi,
    Other,
    Error,
    Empty,
}

impl IntentLabel {
    /// Parse a raw classifier label, normalizing unknown values to `Other`.
    pub fn from_raw(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pi_cmi" => Self::PiCmi,
            _ => Self::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PiCmi => "pi_cmi",
            Self::Other => "other",
            Self::Error => "error",
            Self::Empty => "empty",
        }
    }
}

/// Outcome of the safety/intent moderation stage. Created once per
/// query, never mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SafetyIntentDecision {
    pub safety_label: SafetyLabel,
    pub safety_allow: bool,
    pub intent_label: IntentLabel,
    pub intent_allow: bool,
    /// Exactly one user-facing message per decision: a refusal, or the
    /// "appears safe" acknowledgement.
    pub message: Option<String>,
}

impl SafetyIntentDecision {
    /// The pipeline proceeds past moderation iff both gates allow.
    pub fn allow(&self) -> bool {
        self.safety_allow && self.intent_allow
    }

    /// Decision for an empty or whitespace-only query.
    pub fn empty() -> Self {
        Self {
            safety_label: SafetyLabel::Empty,
            safety_allow: false,
            intent_label: IntentLabel::Empty,
            intent_allow: false,
            message: Some(messages::REFUSAL_EMPTY.to_string()),
        }
    }

    /// Fail-closed decision when the classification capability is
    /// unavailable or errored.
    pub fn error() -> Self {
        Self {
            safety_label: SafetyLabel::Error,
            safety_allow: false,
            intent_label: IntentLabel::Error,
            intent_allow: false,
            message: Some(messages::REFUSAL_ERROR.to_string()),
        }
    }
}

// ---------------------------------------------------------------------------
// Passage
// ---------------------------------------------------------------------------

/// One ranked chunk of source document text with similarity score and
/// provenance metadata. Immutable once produced by retrieval.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Passage {
    /// Chunk text, already length-capped by the retrieval engine.
    pub text: String,
    /// Shareable source URL, when the corpus record has one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
    /// Document section heading the chunk came from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    /// Cosine-like similarity in roughly [-1, 1]; higher is more relevant.
    pub score: f64,
    /// Registered drug name tagged on the chunk.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub drug_name: Option<String>,
    /// Active ingredients tagged on the chunk.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_ingredients: Option<Vec<String>>,
}

// ---------------------------------------------------------------------------
// Critique
// ---------------------------------------------------------------------------

/// Structured revision guidance produced by the critic stage.
/// Absent in light mode.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Critique {
    /// Guidance for improving the draft summary.
    #[serde(default)]
    pub revision_instructions: String,
    /// Specific issues spotted in the draft.
    #[serde(default)]
    pub issues: Vec<String>,
    /// True when the reviewer judged the retrieved passages insufficient.
    #[serde(default)]
    pub needs_additional_context: bool,
}

// ---------------------------------------------------------------------------
// Answer
// ---------------------------------------------------------------------------

/// One highlight bullet in the final answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bullet {
    pub text: String,
    pub score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub drug_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_ingredients: Option<Vec<String>>,
}

/// One source citation in the final answer. `url` may be empty when the
/// passage had no shareable source; display layers dedup by url.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Citation {
    pub url: String,
    pub section: String,
}

/// UI-ready answer payload assembled from passages and the summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Answer {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary_text: Option<String>,
    pub bullets: Vec<Bullet>,
    pub citations: Vec<Citation>,
    pub disclaimer: String,
}

// ---------------------------------------------------------------------------
// Stage diagnostics
// ---------------------------------------------------------------------------

/// Record of the most recent degraded stage, surfaced so the renderer
/// can explain why an answer is weaker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageError {
    /// Stage name as emitted to observers (e.g. `summary_writing`).
    pub stage: String,
    pub kind: CapabilityErrorKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    pub message: String,
}

/// Wall-clock time spent in one visited stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageTiming {
    pub stage: String,
    pub elapsed_ms: u64,
}

// ---------------------------------------------------------------------------
// PipelineState
// ---------------------------------------------------------------------------

/// The single mutable record threaded through all pipeline stages.
///
/// Exactly one exists per query execution, owned by that run. `answer`
/// is `Some` on every terminal path: success, refusal, or degraded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineState {
    pub run_id: RunId,
    pub query: String,
    pub mode: Mode,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decision: Option<SafetyIntentDecision>,
    /// Drug/ingredient names detected in the query, first-seen order.
    #[serde(default)]
    pub detected_names: Vec<String>,
    #[serde(default)]
    pub passages: Vec<Passage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub draft_summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revised_summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub critique: Option<Critique>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_stage_error: Option<StageError>,
    #[serde(default)]
    pub stage_timings: Vec<StageTiming>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer: Option<Answer>,
    /// Total run duration in milliseconds.
    pub elapsed_ms: u64,
}

impl PipelineState {
    /// Fresh state for one run. The query is trimmed here; emptiness is
    /// judged by the moderation stage.
    pub fn new(query: &str, mode: Mode) -> Self {
        Self {
            run_id: RunId::new(),
            query: query.trim().to_string(),
            mode,
            started_at: Utc::now(),
            decision: None,
            detected_names: Vec::new(),
            passages: Vec::new(),
            draft_summary: None,
            revised_summary: None,
            critique: None,
            last_stage_error: None,
            stage_timings: Vec::new(),
            answer: None,
            elapsed_ms: 0,
        }
    }

    /// The summary shown to the user: the revision when one was
    /// produced, otherwise the initial draft.
    pub fn final_summary(&self) -> Option<&str> {
        self.revised_summary
            .as_deref()
            .or(self.draft_summary.as_deref())
    }
}

// ---------------------------------------------------------------------------
// Source URL normalization
// ---------------------------------------------------------------------------

/// Base URL of the TGA PI/CMI repository used for shareable links.
const TGA_REPOSITORY_BASE: &str =
    "https://www.ebs.tga.gov.au/ebs/picmi/picmirepository.nsf/pdf?OpenAgent=&id=";

/// Convert a stored source path into a shareable URL when possible.
///
/// Web URLs pass through unchanged; local document paths map to the TGA
/// repository by their file stem.
pub fn to_web_url(source_url: Option<&str>) -> Option<String> {
    let url = source_url?.trim();
    if url.is_empty() {
        return None;
    }

    if url.starts_with("http://") || url.starts_with("https://") {
        return Some(url.to_string());
    }

    let normalized = url.replace('\\', "/");
    let basename = normalized.rsplit('/').next().unwrap_or(&normalized);
    let identifier = basename.rsplit_once('.').map_or(basename, |(stem, _)| stem);

    if identifier.is_empty() {
        Some(url.to_string())
    } else {
        Some(format!("{TGA_REPOSITORY_BASE}{identifier}"))
    }
}
