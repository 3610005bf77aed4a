use crate::aggregator::ResultAggregator;
use crate::config::{OrchestratorConfig, PlannerKind};
use crate::decompose::{Decomposer, KeywordDecomposer, ReasoningDecomposer};
use crate::reasoning::{ChatCompletionsEngine, ReasoningEngine, UnavailableReasoning};
use crate::scheduler::{DependencyScheduler, Dispatched};
use crate::types::{Artifact, OutcomeSet, Subtask, Wave};
use conductor_a2a::{DelegationClient, DelegationTransport};
use conductor_core::{AgentKind, ConductorResult};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;

/// Result of one orchestrated request.
#[derive(Debug, Serialize)]
pub struct OrchestratorResult {
    pub context_id: String,
    pub subtasks: Vec<Subtask>,
    pub waves: Vec<Wave>,
    pub delegations: Vec<Dispatched>,
    pub outcomes: OutcomeSet,
    pub artifact: Artifact,
    pub duration_ms: u64,
}

/// Reachability of one specialist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Connection {
    Connected,
    Disconnected,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentStatus {
    pub agent: AgentKind,
    pub url: String,
    pub status: Connection,
}

/// The orchestration engine.
/// Implements the plan → execute → synthesize pattern over remote specialists.
pub struct Orchestrator {
    config: OrchestratorConfig,
    transport: Arc<dyn DelegationTransport>,
    decomposer: Arc<dyn Decomposer>,
    scheduler: DependencyScheduler,
    aggregator: ResultAggregator,
}

impl Orchestrator {
    /// HTTP delegation plus chat-completions reasoning when
    /// `config.reasoning` is set.
    pub fn new(config: OrchestratorConfig) -> ConductorResult<Self> {
        let transport: Arc<dyn DelegationTransport> =
            Arc::new(DelegationClient::new(config.client.clone()));
        let reasoning: Arc<dyn ReasoningEngine> = match &config.reasoning {
            Some(reasoning) => Arc::new(ChatCompletionsEngine::new(reasoning.clone())?),
            None => Arc::new(UnavailableReasoning),
        };
        let decomposer: Arc<dyn Decomposer> = match (config.planner, &config.reasoning) {
            (PlannerKind::Reasoning, Some(_)) => Arc::new(ReasoningDecomposer::new(reasoning.clone())),
            (PlannerKind::Reasoning, None) => {
                warn!("Reasoning planner requested without [reasoning], using keywords");
                Arc::new(KeywordDecomposer)
            }
            (PlannerKind::Keyword, _) => Arc::new(KeywordDecomposer),
        };
        Ok(Self::with_components(config, transport, decomposer, reasoning))
    }

    pub fn with_components(
        config: OrchestratorConfig,
        transport: Arc<dyn DelegationTransport>,
        decomposer: Arc<dyn Decomposer>,
        reasoning: Arc<dyn ReasoningEngine>,
    ) -> Self {
        let scheduler = DependencyScheduler::new(
            transport.clone(),
            config.agents.clone(),
            config.collection_deadline(),
        );
        let aggregator = ResultAggregator::new(config.aggregation.clone(), reasoning);
        Self {
            config,
            transport,
            decomposer,
            scheduler,
            aggregator,
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Run the full pipeline for one request.
    ///
    /// Phase 1 (Plan): decompose the request into subtasks.
    /// Phase 2 (Execute): dispatch waves, then collect every handle.
    /// Phase 3 (Synthesize): aggregate the outcomes into one artifact.
    ///
    /// Partial failures end up inside the artifact; this never errors.
    pub async fn run(&self, request: &str, context_id: Option<&str>) -> OrchestratorResult {
        let start = Instant::now();
        let context_id = context_id
            .filter(|id| !id.is_empty())
            .map(String::from)
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        info!(context_id = %context_id, "Orchestrator: starting pipeline");

        let subtasks = self.plan(request).await;
        info!(subtask_count = subtasks.len(), "Orchestrator: plan complete");

        let report = self.scheduler.execute(&subtasks, &context_id).await;

        let artifact = self.aggregator.aggregate(request, &report.outcomes).await;

        let duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
        info!(
            context_id = %context_id,
            duration_ms,
            artifact = ?artifact.kind,
            "Orchestrator: pipeline complete"
        );

        OrchestratorResult {
            context_id,
            subtasks,
            waves: report.waves,
            delegations: report.handles,
            outcomes: report.outcomes,
            artifact,
            duration_ms,
        }
    }

    /// A failing or empty decomposition sends the whole request to research.
    async fn plan(&self, request: &str) -> Vec<Subtask> {
        match self.decomposer.decompose(request).await {
            Ok(subtasks) if !subtasks.is_empty() => subtasks,
            Ok(_) => {
                warn!("Decomposition produced no subtasks, defaulting to research");
                vec![Subtask::new(AgentKind::Research, request, 1)]
            }
            Err(e) => {
                warn!(error = %e, "Decomposition failed, defaulting to research");
                vec![Subtask::new(AgentKind::Research, request, 1)]
            }
        }
    }

    /// Probe every configured specialist concurrently.
    pub async fn agent_status(&self) -> Vec<AgentStatus> {
        let probes = AgentKind::ALL.iter().map(|agent| {
            let url = self.config.agents.address(*agent).to_string();
            async move {
                let status = if self.transport.probe(&url).await {
                    Connection::Connected
                } else {
                    Connection::Disconnected
                };
                AgentStatus {
                    agent: *agent,
                    url,
                    status,
                }
            }
        });
        futures_util::future::join_all(probes).await
    }

    /// Ask a specialist to cancel one of its tasks.
    pub async fn cancel(&self, agent: AgentKind, task_id: &str) -> bool {
        let acknowledged = self
            .transport
            .cancel(self.config.agents.address(agent), task_id)
            .await;
        info!(agent = %agent, task_id = %task_id, acknowledged, "Cancellation requested");
        acknowledged
    }
}
