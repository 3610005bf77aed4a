use crate::config::ReasoningConfig;
use async_trait::async_trait;
use conductor_core::{ConductorError, ConductorResult};
use std::time::Duration;
use tracing::debug;

/// A language model the orchestrator can ask for free-form text.
#[async_trait]
pub trait ReasoningEngine: Send + Sync {
    async fn complete(&self, prompt: &str) -> ConductorResult<String>;
}

/// OpenAI-compatible chat-completions backend.
pub struct ChatCompletionsEngine {
    config: ReasoningConfig,
    http: reqwest::Client,
}

impl ChatCompletionsEngine {
    pub fn new(config: ReasoningConfig) -> ConductorResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ConductorError::Config(format!("reasoning client: {e}")))?;
        Ok(Self { config, http })
    }
}

#[async_trait]
impl ReasoningEngine for ChatCompletionsEngine {
    async fn complete(&self, prompt: &str) -> ConductorResult<String> {
        let url = format!(
            "{}/v1/chat/completions",
            self.config.base_url.trim_end_matches('/')
        );
        let body = serde_json::json!({
            "model": self.config.model,
            "max_tokens": self.config.max_tokens,
            "messages": [{"role": "user", "content": prompt}],
        });

        let mut request = self.http.post(&url).json(&body);
        if !self.config.api_key.is_empty() {
            request = request.bearer_auth(&self.config.api_key);
        }

        let resp = request
            .send()
            .await
            .map_err(|e| ConductorError::Reasoning(e.to_string()))?;

        let status = resp.status();
        let resp_body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| ConductorError::Reasoning(e.to_string()))?;

        if !status.is_success() {
            return Err(ConductorError::Reasoning(format!(
                "chat completions error {status}: {resp_body}"
            )));
        }

        let content = resp_body["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| {
                ConductorError::Reasoning("response carries no message content".to_string())
            })?;
        debug!(model = %self.config.model, chars = content.len(), "Reasoning completion");
        Ok(content.to_string())
    }
}

/// Stand-in used when no reasoning endpoint is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnavailableReasoning;

#[async_trait]
impl ReasoningEngine for UnavailableReasoning {
    async fn complete(&self, _prompt: &str) -> ConductorResult<String> {
        Err(ConductorError::Reasoning(
            "no reasoning engine configured".to_string(),
        ))
    }
}
