use conductor_a2a::ClientConfig;
use conductor_core::{AgentKind, ConductorError, ConductorResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Everything the orchestrator needs to reach its specialists.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    #[serde(default)]
    pub agents: AgentEndpoints,
    /// Shared deadline for collecting every outstanding subtask.
    #[serde(default = "default_collection_deadline_secs")]
    pub collection_deadline_secs: u64,
    #[serde(default)]
    pub client: ClientConfig,
    #[serde(default)]
    pub aggregation: AggregationConfig,
    #[serde(default)]
    pub planner: PlannerKind,
    /// Chat-completions endpoint used when structured aggregation
    /// comes up short. Without it the fallback is a raw JSON dump.
    #[serde(default)]
    pub reasoning: Option<ReasoningConfig>,
}

fn default_collection_deadline_secs() -> u64 {
    60
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            agents: AgentEndpoints::default(),
            collection_deadline_secs: default_collection_deadline_secs(),
            client: ClientConfig::default(),
            aggregation: AggregationConfig::default(),
            planner: PlannerKind::default(),
            reasoning: None,
        }
    }
}

impl OrchestratorConfig {
    pub fn collection_deadline(&self) -> Duration {
        Duration::from_secs(self.collection_deadline_secs)
    }

    pub fn from_toml_str(source: &str) -> ConductorResult<Self> {
        toml::from_str(source).map_err(|e| ConductorError::Config(e.to_string()))
    }

    /// Read and parse a TOML file.
    pub fn load(path: impl AsRef<Path>) -> ConductorResult<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|e| {
            ConductorError::Config(format!("Failed to read '{}': {e}", path.display()))
        })?;
        Self::from_toml_str(&source)
    }
}

/// How requests are split into subtasks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlannerKind {
    /// Keyword routing; needs no model.
    #[default]
    Keyword,
    /// Ask the reasoning engine for a JSON plan. Requires `[reasoning]`.
    Reasoning,
}

/// Base address of each specialist service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentEndpoints {
    #[serde(default = "default_research_url")]
    pub research: String,
    #[serde(default = "default_code_url")]
    pub code: String,
    #[serde(default = "default_analytics_url")]
    pub analytics: String,
}

fn default_research_url() -> String {
    "http://localhost:8001".to_string()
}

fn default_code_url() -> String {
    "http://localhost:8002".to_string()
}

fn default_analytics_url() -> String {
    "http://localhost:8003".to_string()
}

impl Default for AgentEndpoints {
    fn default() -> Self {
        Self {
            research: default_research_url(),
            code: default_code_url(),
            analytics: default_analytics_url(),
        }
    }
}

impl AgentEndpoints {
    pub fn address(&self, agent: AgentKind) -> &str {
        match agent {
            AgentKind::Research => &self.research,
            AgentKind::Code => &self.code,
            AgentKind::Analytics => &self.analytics,
        }
    }
}

/// Thresholds used by the [`ResultAggregator`](crate::ResultAggregator).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregationConfig {
    /// Structured documents shorter than this (trimmed) are replaced
    /// by a reasoning-engine synthesis.
    #[serde(default = "default_min_content_chars")]
    pub min_content_chars: usize,
    /// Error messages in the error summary are cut to this many chars.
    #[serde(default = "default_max_error_chars")]
    pub max_error_chars: usize,
    #[serde(default = "default_max_sources")]
    pub max_sources: usize,
}

fn default_min_content_chars() -> usize {
    100
}

fn default_max_error_chars() -> usize {
    200
}

fn default_max_sources() -> usize {
    5
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            min_content_chars: default_min_content_chars(),
            max_error_chars: default_max_error_chars(),
            max_sources: default_max_sources(),
        }
    }
}

/// An OpenAI-compatible chat-completions endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReasoningConfig {
    #[serde(default = "default_reasoning_base_url")]
    pub base_url: String,
    pub model: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_reasoning_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_reasoning_base_url() -> String {
    "https://api.openai.com".to_string()
}

fn default_max_tokens() -> u32 {
    1024
}

fn default_reasoning_timeout_secs() -> u64 {
    60
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = OrchestratorConfig::default();
        assert_eq!(config.collection_deadline(), Duration::from_secs(60));
        assert_eq!(config.agents.address(AgentKind::Code), "http://localhost:8002");
        assert_eq!(config.aggregation.min_content_chars, 100);
        assert_eq!(config.aggregation.max_error_chars, 200);
        assert!(config.reasoning.is_none());
        assert_eq!(config.planner, PlannerKind::Keyword);
    }

    #[test]
    fn test_partial_toml() {
        let config = OrchestratorConfig::from_toml_str(
            r#"
            collection_deadline_secs = 5
            planner = "reasoning"

            [agents]
            research = "http://research.internal:9000"

            [client]
            probe_timeout_secs = 1

            [reasoning]
            model = "gpt-4o-mini"
            api_key = "sk-test"
            "#,
        )
        .unwrap();

        assert_eq!(config.collection_deadline_secs, 5);
        assert_eq!(config.planner, PlannerKind::Reasoning);
        assert_eq!(
            config.agents.address(AgentKind::Research),
            "http://research.internal:9000"
        );
        assert_eq!(config.agents.address(AgentKind::Analytics), "http://localhost:8003");
        assert_eq!(config.client.probe_timeout_secs, 1);
        assert_eq!(config.client.request_timeout_secs, 30);

        let reasoning = config.reasoning.unwrap();
        assert_eq!(reasoning.base_url, "https://api.openai.com");
        assert_eq!(reasoning.max_tokens, 1024);
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let err = OrchestratorConfig::from_toml_str("collection_deadline_secs = \"soon\"")
            .unwrap_err();
        assert!(matches!(err, ConductorError::Config(_)));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("conductor.toml");
        std::fs::write(&path, "[aggregation]\nmin_content_chars = 10\n").unwrap();

        let config = OrchestratorConfig::load(&path).unwrap();
        assert_eq!(config.aggregation.min_content_chars, 10);

        let missing = OrchestratorConfig::load(dir.path().join("absent.toml")).unwrap_err();
        assert!(missing.to_string().contains("absent.toml"));
    }
}
