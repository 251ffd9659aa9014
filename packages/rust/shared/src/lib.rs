//! Shared types, error model, and configuration for MedIQ.
//!
//! This crate is the foundation depended on by all other MedIQ crates.
//! It provides:
//! - [`MediqError`] — the unified error type
//! - [`CapabilityError`] — the degradable failure model for external capabilities
//! - Domain types ([`PipelineState`], [`Passage`], [`SafetyIntentDecision`], [`Answer`])
//! - Configuration ([`AppConfig`], [`RetrievalConfig`], config loading)
//! - Fixed user-facing strings ([`messages`])

pub mod config;
pub mod error;
pub mod messages;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, ContextBudget, ContextSection, DefaultsConfig, EmbeddingsConfig, GroqConfig,
    RetrievalConfig, RetrievalSection, config_dir, config_file_path, init_config, load_config,
    load_config_from,
};
pub use error::{CapabilityError, CapabilityErrorKind, CapabilityResult, MediqError, Result};
pub use types::{
    Answer, Bullet, Citation, Critique, IntentLabel, Mode, Passage, PipelineState, RunId,
    SafetyIntentDecision, SafetyLabel, StageError, StageTiming, to_web_url,
};
