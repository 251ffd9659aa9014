//! Application configuration for MedIQ.
//!
//! User config lives at `~/.mediq/mediq.toml`.
//! CLI flags override config file values, which override defaults.
//! API keys are referenced by environment-variable *name* only.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{MediqError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "mediq.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".mediq";

// ---------------------------------------------------------------------------
// Config structs (matching mediq.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Global defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Groq chat-completions settings (classification, extraction, generation).
    #[serde(default)]
    pub groq: GroqConfig,

    /// Embeddings endpoint settings.
    #[serde(default)]
    pub embeddings: EmbeddingsConfig,

    /// Retrieval policy knobs.
    #[serde(default)]
    pub retrieval: RetrievalSection,

    /// Generation context budgets.
    #[serde(default)]
    pub context: ContextSection,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Default pipeline mode: "light" or "advanced".
    #[serde(default = "default_mode")]
    pub mode: String,

    /// Directory holding prompt templates (`<name>.txt` files).
    #[serde(default = "default_prompts_dir")]
    pub prompts_dir: String,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            mode: default_mode(),
            prompts_dir: default_prompts_dir(),
        }
    }
}

fn default_mode() -> String {
    "light".into()
}
fn default_prompts_dir() -> String {
    "prompts".into()
}

/// `[groq]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroqConfig {
    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Chat-completions endpoint base URL.
    #[serde(default = "default_groq_base_url")]
    pub base_url: String,

    /// Model for safety/intent classification.
    #[serde(default = "default_fast_model")]
    pub safety_model: String,

    /// Model for drug-name extraction.
    #[serde(default = "default_fast_model")]
    pub detection_model: String,

    /// Model for summary drafting.
    #[serde(default = "default_fast_model")]
    pub summary_model: String,

    /// Model for summary revision.
    #[serde(default = "default_fast_model")]
    pub rewrite_model: String,

    /// Model for draft critique.
    #[serde(default = "default_fast_model")]
    pub reflection_model: String,

    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for GroqConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_api_key_env(),
            base_url: default_groq_base_url(),
            safety_model: default_fast_model(),
            detection_model: default_fast_model(),
            summary_model: default_fast_model(),
            rewrite_model: default_fast_model(),
            reflection_model: default_fast_model(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_api_key_env() -> String {
    "GROQ_API_KEY".into()
}
fn default_groq_base_url() -> String {
    "https://api.groq.com/openai/v1".into()
}
fn default_fast_model() -> String {
    "llama-3.1-8b-instant".into()
}
fn default_timeout_secs() -> u64 {
    30
}

/// `[embeddings]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingsConfig {
    /// Name of the env var holding the API key, if the endpoint needs one.
    #[serde(default)]
    pub api_key_env: Option<String>,

    /// OpenAI-compatible `/embeddings` endpoint base URL.
    #[serde(default = "default_embeddings_base_url")]
    pub base_url: String,

    /// Embedding model; must match the model the corpus was indexed with.
    #[serde(default = "default_embed_model")]
    pub model: String,

    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingsConfig {
    fn default() -> Self {
        Self {
            api_key_env: None,
            base_url: default_embeddings_base_url(),
            model: default_embed_model(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_embeddings_base_url() -> String {
    "http://localhost:8080/v1".into()
}
fn default_embed_model() -> String {
    "all-MiniLM-L6-v2".into()
}

/// `[retrieval]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalSection {
    /// Directory holding `docs.jsonl` and `vectors.jsonl`.
    #[serde(default = "default_index_dir")]
    pub index_dir: String,

    /// Raw candidate pool size fetched from the index.
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Similarity floor for the filtered result set.
    #[serde(default = "default_min_similarity")]
    pub min_similarity: f64,

    /// Fallback result count when filtering leaves too few candidates.
    #[serde(default = "default_min_passages")]
    pub min_passages: usize,

    /// Cap on returned passages.
    #[serde(default = "default_max_passages")]
    pub max_passages: usize,

    /// Per-passage text cap in characters; 0 means unbounded.
    #[serde(default = "default_passage_char_limit")]
    pub passage_char_limit: usize,
}

impl Default for RetrievalSection {
    fn default() -> Self {
        Self {
            index_dir: default_index_dir(),
            top_k: default_top_k(),
            min_similarity: default_min_similarity(),
            min_passages: default_min_passages(),
            max_passages: default_max_passages(),
            passage_char_limit: default_passage_char_limit(),
        }
    }
}

fn default_index_dir() -> String {
    "data/index".into()
}
fn default_top_k() -> usize {
    20
}
fn default_min_similarity() -> f64 {
    0.4
}
fn default_min_passages() -> usize {
    3
}
fn default_max_passages() -> usize {
    5
}
fn default_passage_char_limit() -> usize {
    4000
}

/// `[context]` section — character budgets for generation context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextSection {
    /// Per-passage snippet cap in characters; 0 means unbounded.
    #[serde(default = "default_per_passage_limit")]
    pub per_passage_limit: usize,

    /// Total context budget in characters; 0 means unbounded.
    #[serde(default = "default_total_budget")]
    pub total_budget: usize,
}

impl Default for ContextSection {
    fn default() -> Self {
        Self {
            per_passage_limit: default_per_passage_limit(),
            total_budget: default_total_budget(),
        }
    }
}

fn default_per_passage_limit() -> usize {
    2000
}
fn default_total_budget() -> usize {
    20_000
}

// ---------------------------------------------------------------------------
// Retrieval config (runtime, merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Runtime retrieval policy — merged from config file + CLI flags.
#[derive(Debug, Clone)]
pub struct RetrievalConfig {
    pub top_k: usize,
    pub min_similarity: f64,
    pub min_passages: usize,
    pub max_passages: usize,
    /// Per-passage text cap in characters; 0 means unbounded.
    pub passage_char_limit: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self::from(&RetrievalSection::default())
    }
}

impl From<&RetrievalSection> for RetrievalConfig {
    fn from(section: &RetrievalSection) -> Self {
        Self {
            top_k: section.top_k,
            min_similarity: section.min_similarity,
            min_passages: section.min_passages,
            max_passages: section.max_passages,
            passage_char_limit: section.passage_char_limit,
        }
    }
}

/// Runtime context budgets for passage formatting.
#[derive(Debug, Clone)]
pub struct ContextBudget {
    /// Per-passage snippet cap in characters; 0 means unbounded.
    pub per_passage_limit: usize,
    /// Total context budget in characters; 0 means unbounded.
    pub total_budget: usize,
}

impl Default for ContextBudget {
    fn default() -> Self {
        Self {
            per_passage_limit: default_per_passage_limit(),
            total_budget: default_total_budget(),
        }
    }
}

impl From<&ContextSection> for ContextBudget {
    fn from(section: &ContextSection) -> Self {
        Self {
            per_passage_limit: section.per_passage_limit,
            total_budget: section.total_budget,
        }
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.mediq/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| MediqError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.mediq/mediq.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| MediqError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| MediqError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| MediqError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| MediqError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| MediqError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_retrieval_policy() {
        let config = AppConfig::default();
        assert_eq!(config.retrieval.top_k, 20);
        assert!((config.retrieval.min_similarity - 0.4).abs() < f64::EPSILON);
        assert_eq!(config.retrieval.min_passages, 3);
        assert_eq!(config.retrieval.max_passages, 5);
        assert_eq!(config.groq.api_key_env, "GROQ_API_KEY");
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let toml = r#"
            [retrieval]
            min_similarity = 0.55

            [groq]
            safety_model = "llama-guard"
        "#;
        let config: AppConfig = toml::from_str(toml).expect("parse");
        assert!((config.retrieval.min_similarity - 0.55).abs() < f64::EPSILON);
        assert_eq!(config.retrieval.max_passages, 5);
        assert_eq!(config.groq.safety_model, "llama-guard");
        assert_eq!(config.groq.summary_model, "llama-3.1-8b-instant");
    }

    #[test]
    fn retrieval_config_mirrors_section() {
        let section = RetrievalSection {
            top_k: 10,
            ..RetrievalSection::default()
        };
        let rc = RetrievalConfig::from(&section);
        assert_eq!(rc.top_k, 10);
        assert_eq!(rc.max_passages, 5);
    }
}
