//! Groq chat-completions provider and OpenAI-compatible embeddings
//! provider.
//!
//! Both clients are cheap to clone (the inner `reqwest::Client` is an
//! `Arc`) and safe to share across concurrent pipeline runs. A missing
//! API key or prompt template makes calls report `Unavailable` instead
//! of failing construction, so the pipeline can degrade per stage.

use std::time::Duration;

use mediq_shared::{
    CapabilityError, CapabilityResult, GroqConfig, MediqError, Result,
    config::EmbeddingsConfig,
};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, instrument, warn};

use crate::prompts::{self, PromptStore};
use crate::{Classification, Classify, Embed, ExtractEntities, GenTask, Generate};

/// User-Agent string for capability requests.
const USER_AGENT: &str = concat!("MedIQ/", env!("CARGO_PKG_VERSION"));

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: String,
}

#[derive(Debug, Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingRow>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingRow {
    embedding: Vec<f32>,
}

fn read_api_key(var_name: &str) -> Option<String> {
    match std::env::var(var_name) {
        Ok(val) if !val.is_empty() => Some(val),
        _ => None,
    }
}

fn map_request_error(e: reqwest::Error) -> CapabilityError {
    if e.is_timeout() {
        CapabilityError::timeout(e.to_string())
    } else {
        CapabilityError::transport(e.to_string())
    }
}

// ---------------------------------------------------------------------------
// GroqClient
// ---------------------------------------------------------------------------

/// Groq chat-completions client covering classification, extraction,
/// and generation. Model and temperature are selected per task from
/// config, matching how each stage was tuned.
#[derive(Debug, Clone)]
pub struct GroqClient {
    http: Client,
    config: GroqConfig,
    api_key: Option<String>,
    safety_prompt: Option<String>,
    detection_prompt: Option<String>,
}

impl GroqClient {
    /// Build a client from config, resolving the API key env var and
    /// loading the classification/extraction prompts.
    pub fn new(config: &GroqConfig, prompts: &PromptStore) -> Result<Self> {
        let http = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| MediqError::config(format!("failed to build HTTP client: {e}")))?;

        let api_key = read_api_key(&config.api_key_env);
        if api_key.is_none() {
            warn!(
                var = %config.api_key_env,
                "Groq API key not set; classification and generation will degrade"
            );
        }

        Ok(Self {
            http,
            config: config.clone(),
            api_key,
            safety_prompt: prompts.get(prompts::SAFETY_MODERATION),
            detection_prompt: prompts.get(prompts::DRUG_DETECTION),
        })
    }

    fn api_key(&self) -> CapabilityResult<&str> {
        self.api_key.as_deref().ok_or_else(|| {
            CapabilityError::unavailable(format!("{} not set", self.config.api_key_env))
        })
    }

    /// One chat-completions round trip. `json_mode` asks the provider
    /// for a JSON object response.
    #[instrument(skip_all, fields(model = %model))]
    async fn chat(
        &self,
        model: &str,
        temperature: f64,
        json_mode: bool,
        system: &str,
        user: &str,
    ) -> CapabilityResult<String> {
        let api_key = self.api_key()?;

        let mut body = json!({
            "model": model,
            "temperature": temperature,
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": user },
            ],
        });
        if json_mode {
            body["response_format"] = json!({ "type": "json_object" });
        }

        let url = format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'));
        let response = self
            .http
            .post(&url)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .map_err(map_request_error)?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(CapabilityError::from_status(
                status.as_u16(),
                format!("{url}: HTTP {status}: {detail}"),
            ));
        }

        let payload: ChatResponse = response
            .json()
            .await
            .map_err(|e| CapabilityError::invalid_response(e.to_string()))?;

        let content = payload
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .unwrap_or_default();

        debug!(chars = content.len(), "chat completion received");
        Ok(content)
    }

    fn model_for(&self, task: GenTask) -> &str {
        match task {
            GenTask::SummaryDraft => &self.config.summary_model,
            GenTask::SummaryRevise => &self.config.rewrite_model,
            GenTask::Critique => &self.config.reflection_model,
        }
    }
}

impl Classify for GroqClient {
    async fn classify(&self, query: &str) -> CapabilityResult<Classification> {
        let system = self
            .safety_prompt
            .as_deref()
            .ok_or_else(|| CapabilityError::unavailable("safety_moderation prompt missing"))?;

        let user = format!(
            "Classify the following user query for safety and intent. Only output JSON. Query: {query}"
        );

        let content = self
            .chat(&self.config.safety_model, 0.0, true, system, &user)
            .await?;

        serde_json::from_str(&content)
            .map_err(|e| CapabilityError::invalid_response(format!("classification payload: {e}")))
    }
}

impl ExtractEntities for GroqClient {
    async fn extract(&self, query: &str) -> CapabilityResult<Vec<String>> {
        let system = self
            .detection_prompt
            .as_deref()
            .ok_or_else(|| CapabilityError::unavailable("system_drug_detection prompt missing"))?;

        let user = format!("Query: {query}");

        let content = self
            .chat(&self.config.detection_model, 0.0, true, system, &user)
            .await?;

        #[derive(Deserialize)]
        struct Names {
            #[serde(default)]
            names: Vec<String>,
        }

        let parsed: Names = serde_json::from_str(&content)
            .map_err(|e| CapabilityError::invalid_response(format!("detection payload: {e}")))?;
        Ok(parsed.names)
    }
}

impl Generate for GroqClient {
    async fn generate(
        &self,
        task: GenTask,
        system_prompt: &str,
        user_context: &str,
    ) -> CapabilityResult<String> {
        self.chat(self.model_for(task), 0.2, false, system_prompt, user_context)
            .await
    }

    async fn generate_json(
        &self,
        task: GenTask,
        system_prompt: &str,
        user_context: &str,
    ) -> CapabilityResult<serde_json::Value> {
        let content = self
            .chat(self.model_for(task), 0.2, true, system_prompt, user_context)
            .await?;

        serde_json::from_str(&content).map_err(|e| {
            CapabilityError::invalid_response(format!("{} payload: {e}", task.as_str()))
        })
    }
}

// ---------------------------------------------------------------------------
// HttpEmbedder
// ---------------------------------------------------------------------------

/// OpenAI-compatible `/embeddings` client. The endpoint must serve the
/// same model the corpus was indexed with, or scores are meaningless.
#[derive(Debug, Clone)]
pub struct HttpEmbedder {
    http: Client,
    config: EmbeddingsConfig,
    api_key: Option<String>,
}

impl HttpEmbedder {
    pub fn new(config: &EmbeddingsConfig) -> Result<Self> {
        let http = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| MediqError::config(format!("failed to build HTTP client: {e}")))?;

        let api_key = config.api_key_env.as_deref().and_then(read_api_key);

        Ok(Self {
            http,
            config: config.clone(),
            api_key,
        })
    }
}

impl Embed for HttpEmbedder {
    async fn embed(&self, text: &str) -> CapabilityResult<Vec<f32>> {
        let url = format!("{}/embeddings", self.config.base_url.trim_end_matches('/'));

        let mut request = self.http.post(&url).json(&json!({
            "model": self.config.model,
            "input": [text],
        }));
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(map_request_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(CapabilityError::from_status(
                status.as_u16(),
                format!("{url}: HTTP {status}"),
            ));
        }

        let payload: EmbeddingsResponse = response
            .json()
            .await
            .map_err(|e| CapabilityError::invalid_response(e.to_string()))?;

        payload
            .data
            .into_iter()
            .next()
            .map(|row| row.embedding)
            .ok_or_else(|| CapabilityError::invalid_response("empty embeddings payload"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_key_reports_unavailable() {
        let config = GroqConfig {
            api_key_env: "MEDIQ_TEST_KEY_THAT_IS_NOT_SET".into(),
            ..GroqConfig::default()
        };
        let store = PromptStore::new(std::env::temp_dir());
        let client = GroqClient::new(&config, &store).expect("client builds without key");
        assert!(client.api_key().is_err());
        assert_eq!(
            client.api_key().unwrap_err().kind,
            mediq_shared::CapabilityErrorKind::Unavailable
        );
    }

    #[test]
    fn models_selected_per_task() {
        let config = GroqConfig {
            summary_model: "m-draft".into(),
            rewrite_model: "m-rewrite".into(),
            reflection_model: "m-reflect".into(),
            ..GroqConfig::default()
        };
        let store = PromptStore::new(std::env::temp_dir());
        let client = GroqClient::new(&config, &store).unwrap();
        assert_eq!(client.model_for(GenTask::SummaryDraft), "m-draft");
        assert_eq!(client.model_for(GenTask::SummaryRevise), "m-rewrite");
        assert_eq!(client.model_for(GenTask::Critique), "m-reflect");
    }
}
