//! Prompt template loading.
//!
//! Templates live as `<name>.txt` files in a prompts directory. A
//! missing or empty template makes the dependent capability report
//! itself unavailable rather than erroring the pipeline.

use std::path::{Path, PathBuf};

/// Well-known prompt names used by the pipeline stages.
pub const SAFETY_MODERATION: &str = "safety_moderation";
pub const DRUG_DETECTION: &str = "system_drug_detection";
pub const SUMMARY: &str = "system_summary";
pub const SUMMARY_REWRITE: &str = "system_summary_rewrite";
pub const REFLECTION: &str = "system_reflection";

/// Loads prompt templates by name from a directory.
#[derive(Debug, Clone)]
pub struct PromptStore {
    dir: PathBuf,
}

impl PromptStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Load a prompt by bare name (`safety_moderation`) or filename
    /// (`safety_moderation.txt`). Returns `None` when the file is
    /// missing, unreadable, or blank.
    pub fn get(&self, name: &str) -> Option<String> {
        if name.is_empty() {
            return None;
        }

        let filename = if Path::new(name).extension().is_some() {
            name.to_string()
        } else {
            format!("{name}.txt")
        };

        let path = self.dir.join(filename);
        match std::fs::read_to_string(&path) {
            Ok(text) => {
                let text = text.trim().to_string();
                if text.is_empty() {
                    tracing::warn!(?path, "prompt file is empty");
                    None
                } else {
                    Some(text)
                }
            }
            Err(e) => {
                tracing::debug!(?path, error = %e, "prompt file not readable");
                None
            }
        }
    }
}
