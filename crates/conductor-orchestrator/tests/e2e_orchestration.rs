#![allow(clippy::unwrap_used, clippy::expect_used)]

use async_trait::async_trait;
use conductor_a2a::{RegistryConfig, SpecialistServer, TaskHandler, TaskRegistry};
use conductor_core::{AgentKind, ConductorError, ConductorResult, TaskInput};
use conductor_orchestrator::*;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

// ---------------------------------------------------------------------------
// Test specialists
// ---------------------------------------------------------------------------

struct Researcher;

#[async_trait]
impl TaskHandler for Researcher {
    async fn handle(&self, input: &TaskInput) -> ConductorResult<Value> {
        tokio::time::sleep(Duration::from_millis(50)).await;
        Ok(json!({
            "findings": format!("Gathered background for '{}' from three independent sources.", input.message),
            "sources": ["https://docs.rs", "https://tokio.rs"],
            "confidence": "high",
        }))
    }
}

struct BrokenCoder;

#[async_trait]
impl TaskHandler for BrokenCoder {
    async fn handle(&self, _input: &TaskInput) -> ConductorResult<Value> {
        Err(ConductorError::Http("sandbox unavailable".into()))
    }
}

struct Sleeper(Duration);

#[async_trait]
impl TaskHandler for Sleeper {
    async fn handle(&self, _input: &TaskInput) -> ConductorResult<Value> {
        tokio::time::sleep(self.0).await;
        Ok(json!({"analysis": "finished late"}))
    }
}

async fn start_specialist(agent: &str, handler: Arc<dyn TaskHandler>) -> (String, Arc<TaskRegistry>) {
    let registry = Arc::new(TaskRegistry::new(RegistryConfig::default()));
    let app = SpecialistServer::build(agent, registry.clone(), handler);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    tokio::time::sleep(Duration::from_millis(50)).await;

    (format!("http://127.0.0.1:{}", addr.port()), registry)
}

fn config(research: String, code: String, analytics: String) -> OrchestratorConfig {
    OrchestratorConfig {
        agents: AgentEndpoints {
            research,
            code,
            analytics,
        },
        collection_deadline_secs: 2,
        ..OrchestratorConfig::default()
    }
}

#[tokio::test]
async fn test_research_succeeds_code_fails() {
    let (research, research_registry) = start_specialist("research", Arc::new(Researcher)).await;
    let (code, _) = start_specialist("code", Arc::new(BrokenCoder)).await;

    let orchestrator = Orchestrator::new(config(
        research,
        code,
        "http://127.0.0.1:1".to_string(),
    ))
    .unwrap();

    let result = orchestrator
        .run("Research tokio and implement an echo server", Some("ctx-e2e"))
        .await;

    assert_eq!(result.waves.len(), 2);
    assert!(result.outcomes.get(AgentKind::Research).unwrap().is_completed());
    assert_eq!(
        result.outcomes.get(AgentKind::Code).unwrap().status_label(),
        "error"
    );

    assert_eq!(result.artifact.kind, ArtifactKind::Structured);
    let text = &result.artifact.content;
    assert!(text.contains("## Research Findings:"));
    assert!(text.contains("- https://tokio.rs"));
    assert!(text.contains("- Code: error - HTTP error: sandbox unavailable"));

    // The specialist saw the shared context id.
    let research_task = &result
        .delegations
        .iter()
        .find(|d| d.agent == AgentKind::Research)
        .unwrap()
        .handle;
    let record = research_registry
        .get(&research_task.task_id, false, Duration::ZERO)
        .await
        .unwrap();
    assert_eq!(record.input.context_id, "ctx-e2e");
    assert_eq!(record.input.metadata["agent"], "research");
}

#[tokio::test]
async fn test_unreachable_specialists_give_error_summary() {
    let orchestrator = Orchestrator::new(config(
        "http://127.0.0.1:1".to_string(),
        "http://127.0.0.1:1".to_string(),
        "http://127.0.0.1:1".to_string(),
    ))
    .unwrap();

    let result = orchestrator.run("analyze churn metrics", None).await;

    assert_eq!(result.artifact.kind, ArtifactKind::ErrorSummary);
    assert!(result.artifact.content.contains("Analytics Agent: error - Submission error"));
    assert!(result.delegations.is_empty());
}

#[tokio::test]
async fn test_collection_deadline_marks_slow_specialist_timeout() {
    let (research, _) = start_specialist("research", Arc::new(Researcher)).await;
    let (analytics, analytics_registry) =
        start_specialist("analytics", Arc::new(Sleeper(Duration::from_secs(10)))).await;

    let orchestrator = Orchestrator::new(config(
        research,
        "http://127.0.0.1:1".to_string(),
        analytics,
    ))
    .unwrap();

    let started = std::time::Instant::now();
    let result = orchestrator
        .run("find and analyze the latest benchmark data", None)
        .await;
    assert!(started.elapsed() < Duration::from_secs(6));

    assert!(result.outcomes.get(AgentKind::Research).unwrap().is_completed());
    let analytics_outcome = result.outcomes.get(AgentKind::Analytics).unwrap();
    assert_eq!(analytics_outcome.status_label(), "timeout");
    assert_eq!(
        analytics_outcome.error_message(),
        Some("Task timed out after 2 seconds")
    );

    // No implicit remote cancellation: the slow task keeps running.
    let slow = &result
        .delegations
        .iter()
        .find(|d| d.agent == AgentKind::Analytics)
        .unwrap()
        .handle;
    let record = analytics_registry
        .get(&slow.task_id, false, Duration::ZERO)
        .await
        .unwrap();
    assert!(!record.is_terminal());
}

#[tokio::test]
async fn test_agent_status_reports_each_endpoint() {
    let (research, _) = start_specialist("research", Arc::new(Researcher)).await;
    let orchestrator = Orchestrator::new(config(
        research.clone(),
        "http://127.0.0.1:1".to_string(),
        "http://127.0.0.1:1".to_string(),
    ))
    .unwrap();

    let status = orchestrator.agent_status().await;
    let connected: Vec<_> = status
        .iter()
        .filter(|s| s.status == Connection::Connected)
        .map(|s| s.url.clone())
        .collect();
    assert_eq!(connected, vec![research]);
}
