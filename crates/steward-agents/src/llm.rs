//! LLM client abstraction and the artifact synthesizer built on it.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tracing::debug;

use steward_core::synthesizer::{SynthError, Synthesizer};
use steward_core::types::DeploymentArtifact;

/// LLM request payload
#[derive(Debug, Clone)]
pub struct LlmRequest {
    pub system: String,
    pub user: String,
    pub model: String,
    pub temperature: f32,
}

/// LLM errors
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("http error: {0}")]
    Http(String),
    #[error("response error: {0}")]
    Response(String),
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// LLM client trait
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, request: LlmRequest) -> Result<String, LlmError>;
}

#[async_trait]
impl LlmClient for std::sync::Arc<dyn LlmClient> {
    async fn complete(&self, request: LlmRequest) -> Result<String, LlmError> {
        (**self).complete(request).await
    }
}

/// OpenAI-compatible chat completion client.
pub struct HttpLlmClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: String,
}

impl HttpLlmClient {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key,
        }
    }
}

#[async_trait]
impl LlmClient for HttpLlmClient {
    async fn complete(&self, request: LlmRequest) -> Result<String, LlmError> {
        let payload = json!({
            "model": request.model,
            "temperature": request.temperature,
            "messages": [
                {"role": "system", "content": request.system},
                {"role": "user", "content": request.user},
            ],
        });

        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let mut http_request = self.client.post(&url).json(&payload);
        if let Some(api_key) = &self.api_key {
            http_request = http_request.bearer_auth(api_key);
        }

        let response = http_request
            .send()
            .await
            .map_err(|e| LlmError::Http(e.to_string()))?;
        if !response.status().is_success() {
            return Err(LlmError::Response(format!(
                "unexpected status {}",
                response.status()
            )));
        }

        let body: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| LlmError::Serialization(e.to_string()))?;
        body.choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| LlmError::Response("empty choices".to_string()))
    }
}

/// Synthesizer config for the LLM adapter.
#[derive(Debug, Clone)]
pub struct SynthesizerConfig {
    pub model: String,
    pub temperature: f32,
    pub system_prompt: String,
    pub timeout: Duration,
}

impl Default for SynthesizerConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            temperature: 0.2,
            system_prompt: "You are a deployment configuration synthesizer. \
                Return ONLY a valid JSON object for the deployment artifact."
                .to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

/// Prompt-to-artifact adapter over an LLM client.
pub struct LlmSynthesizer<C: LlmClient> {
    client: C,
    config: SynthesizerConfig,
}

impl<C: LlmClient> LlmSynthesizer<C> {
    pub fn new(client: C, config: SynthesizerConfig) -> Self {
        Self { client, config }
    }
}

#[async_trait]
impl<C: LlmClient> Synthesizer for LlmSynthesizer<C> {
    async fn synthesize(&self, prompt: &str) -> Result<DeploymentArtifact, SynthError> {
        let request = LlmRequest {
            system: self.config.system_prompt.clone(),
            user: prompt.to_string(),
            model: self.config.model.clone(),
            temperature: self.config.temperature,
        };

        let completion = tokio::time::timeout(self.config.timeout, self.client.complete(request))
            .await
            .map_err(|_| SynthError::Timeout(self.config.timeout))?
            .map_err(|e| SynthError::Llm(e.to_string()))?;

        let raw = extract_json(&completion);
        debug!(chars = raw.len(), "parsing synthesized artifact");
        serde_json::from_str(raw).map_err(|e| SynthError::Parse(e.to_string()))
    }
}

/// Strip markdown code fences the model may wrap its JSON in.
fn extract_json(completion: &str) -> &str {
    let trimmed = completion.trim();
    for fence in ["```json", "```"] {
        if let Some(rest) = trimmed.strip_prefix(fence) {
            if let Some(end) = rest.find("```") {
                return rest[..end].trim();
            }
            return rest.trim();
        }
    }
    trimmed
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CannedClient(String);

    #[async_trait]
    impl LlmClient for CannedClient {
        async fn complete(&self, _request: LlmRequest) -> Result<String, LlmError> {
            Ok(self.0.clone())
        }
    }

    const ARTIFACT_JSON: &str = r#"{
        "model_name": "llama-3-1-8b",
        "endpoint_name": "chatbot-x-staging",
        "instance_type": "ml.m5.large",
        "instance_count": 1,
        "budget_usd_per_hour": 15.0
    }"#;

    #[tokio::test]
    async fn test_synthesize_parses_plain_json() {
        let synth = LlmSynthesizer::new(
            CannedClient(ARTIFACT_JSON.to_string()),
            SynthesizerConfig::default(),
        );
        let artifact = synth.synthesize("deploy llama").await.unwrap();
        assert_eq!(artifact.endpoint_name, "chatbot-x-staging");
        assert_eq!(artifact.instance_count, 1);
    }

    #[tokio::test]
    async fn test_synthesize_strips_code_fences() {
        let fenced = format!("```json\n{ARTIFACT_JSON}\n```");
        let synth = LlmSynthesizer::new(CannedClient(fenced), SynthesizerConfig::default());
        let artifact = synth.synthesize("deploy llama").await.unwrap();
        assert_eq!(artifact.model_name, "llama-3-1-8b");
    }

    #[tokio::test]
    async fn test_garbage_output_is_a_parse_error() {
        let synth = LlmSynthesizer::new(
            CannedClient("definitely not json".to_string()),
            SynthesizerConfig::default(),
        );
        let result = synth.synthesize("deploy llama").await;
        assert!(matches!(result, Err(SynthError::Parse(_))));
    }
}
