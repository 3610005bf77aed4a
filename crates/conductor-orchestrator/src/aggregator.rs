use crate::config::AggregationConfig;
use crate::reasoning::ReasoningEngine;
use crate::types::{Artifact, ArtifactKind, Outcome, OutcomeSet};
use conductor_core::{AgentKind, ConductorError};
use serde_json::Value;
use std::sync::Arc;
use tracing::{error, info, warn};

const ERROR_SUMMARY_HEADER: &str = "I encountered issues while processing your request:\n\n";
const ERROR_SUMMARY_FOOTER: &str = "\nPlease try again or rephrase your request.";

/// Turns an [`OutcomeSet`] into the single artifact returned to the user.
///
/// Never fails: malformed results lose the parts that cannot be read,
/// and a failing reasoning engine downgrades to a raw JSON dump.
pub struct ResultAggregator {
    config: AggregationConfig,
    reasoning: Arc<dyn ReasoningEngine>,
}

impl ResultAggregator {
    pub fn new(config: AggregationConfig, reasoning: Arc<dyn ReasoningEngine>) -> Self {
        Self { config, reasoning }
    }

    pub async fn aggregate(&self, request: &str, outcomes: &OutcomeSet) -> Artifact {
        if outcomes.successful().next().is_none() {
            info!(outcomes = outcomes.len(), "No specialist completed, building error summary");
            return Artifact::new(ArtifactKind::ErrorSummary, self.error_summary(outcomes));
        }

        let document = self.structured(request, outcomes);
        let length = document.trim().chars().count();
        if length >= self.config.min_content_chars {
            return Artifact::new(ArtifactKind::Structured, document);
        }

        let degraded = ConductorError::AggregationDegraded(format!(
            "{length} chars, below {}",
            self.config.min_content_chars
        ));
        warn!(error = %degraded, "Falling back to reasoning synthesis");
        self.synthesize(request, outcomes).await
    }

    /// One bullet per agent that did not complete.
    pub fn error_summary(&self, outcomes: &OutcomeSet) -> String {
        let mut summary = String::from(ERROR_SUMMARY_HEADER);
        let mut bullets = 0;
        for (agent, outcome) in outcomes.unsuccessful() {
            let message = outcome.error_message().unwrap_or("No details available");
            summary.push_str(&format!(
                "- {} Agent: {} - {}\n",
                agent.title(),
                outcome.status_label(),
                truncate(message, self.config.max_error_chars)
            ));
            bullets += 1;
        }
        if bullets == 0 {
            summary.push_str("- Unable to process request due to system issues\n");
        }
        summary.push_str(ERROR_SUMMARY_FOOTER);
        summary
    }

    /// Per-agent sections for every completed outcome, then a footnote
    /// naming the agents that did not complete.
    pub fn structured(&self, request: &str, outcomes: &OutcomeSet) -> String {
        let mut parts = vec![format!(
            "Based on your request: '{request}', here's what I found:\n"
        )];

        for (agent, outcome) in outcomes.successful() {
            let Outcome::Completed { result, .. } = outcome else {
                continue;
            };
            let section = match agent {
                AgentKind::Research => self.research_section(result),
                AgentKind::Code => code_section(result),
                AgentKind::Analytics => analytics_section(result),
            };
            match section.or_else(|| generic_section(agent, result)) {
                Some(section) => parts.extend(section),
                None => warn!(agent = %agent, "Completed result has no readable content"),
            }
        }

        let failed: Vec<_> = outcomes.unsuccessful().collect();
        if !failed.is_empty() {
            parts.push("\n---\n".to_string());
            parts.push("*Note: Some agents encountered issues:*\n".to_string());
            for (agent, outcome) in failed {
                parts.push(format!(
                    "- {}: {} - {}",
                    agent.title(),
                    outcome.status_label(),
                    outcome.error_message().unwrap_or("No details available")
                ));
            }
        }

        parts.join("\n")
    }

    async fn synthesize(&self, request: &str, outcomes: &OutcomeSet) -> Artifact {
        let dump = serde_json::to_string_pretty(outcomes).unwrap_or_else(|_| format!("{outcomes:?}"));
        let prompt = format!(
            "User request: {request}\n\n\
             Results from specialized agents:\n{dump}\n\n\
             Please synthesize these results into a clear, coherent response that:\n\
             1. Directly addresses the user's request\n\
             2. Integrates information from all successful agents\n\
             3. Highlights key findings and insights\n\
             4. Mentions any limitations or failures transparently\n\n\
             Format the response in a user-friendly way with clear sections."
        );

        match self.reasoning.complete(&prompt).await {
            Ok(text) => Artifact::new(ArtifactKind::Synthesized, text),
            Err(e) => {
                error!(error = %e, "Reasoning synthesis failed, returning raw results");
                Artifact::new(
                    ArtifactKind::RawDump,
                    format!("Results from processing your request:\n{dump}"),
                )
            }
        }
    }

    fn research_section(&self, result: &Value) -> Option<Vec<String>> {
        let findings = text_field(result, "findings")?;
        let mut parts = vec!["\n## Research Findings:\n".to_string(), findings];

        let sources = list_field(result, "sources");
        if !sources.is_empty() {
            parts.push("\n**Sources:**".to_string());
            parts.extend(
                sources
                    .into_iter()
                    .take(self.config.max_sources)
                    .map(|s| format!("- {s}")),
            );
        }
        let confidence = text_field(result, "confidence").unwrap_or_else(|| "medium".to_string());
        parts.push(format!("\n*Confidence level: {confidence}*"));
        Some(parts)
    }
}

fn code_section(result: &Value) -> Option<Vec<String>> {
    let code = text_field(result, "code").or_else(|| text_field(result, "output"))?;
    let language = text_field(result, "language").unwrap_or_else(|| "python".to_string());

    let mut parts = vec!["\n## Code Solution:\n".to_string()];
    if let Some(explanation) = text_field(result, "explanation") {
        parts.push(explanation);
    }
    parts.push(format!("\n```{language}\n{code}\n```"));
    Some(parts)
}

fn analytics_section(result: &Value) -> Option<Vec<String>> {
    let analysis = text_field(result, "analysis")?;
    let mut parts = vec!["\n## Data Analysis:\n".to_string(), analysis];

    if let Some(metrics) = result.get("metrics").and_then(Value::as_object) {
        if !metrics.is_empty() {
            parts.push("\n**Key Metrics:**".to_string());
            parts.extend(metrics.iter().map(|(k, v)| format!("- {k}: {}", render(v))));
        }
    }
    let insights = list_field(result, "insights");
    if !insights.is_empty() {
        parts.push("\n**Insights:**".to_string());
        parts.extend(insights.into_iter().map(|i| format!("- {i}")));
    }
    Some(parts)
}

/// `output` or `response` when present, otherwise every field as a bullet.
fn generic_section(agent: AgentKind, result: &Value) -> Option<Vec<String>> {
    let body = match result {
        Value::Object(map) => text_field(result, "output")
            .or_else(|| text_field(result, "response"))
            .or_else(|| {
                let lines: Vec<String> = map
                    .iter()
                    .filter(|(_, v)| !is_blank(v))
                    .map(|(k, v)| format!("- {k}: {}", render(v)))
                    .collect();
                (!lines.is_empty()).then(|| lines.join("\n"))
            })?,
        other if is_blank(other) => return None,
        other => render(other),
    };
    Some(vec![
        format!("\n## {} Agent Results:\n", agent.title()),
        body,
    ])
}

/// A non-blank field rendered as text.
fn text_field(result: &Value, key: &str) -> Option<String> {
    result
        .get(key)
        .filter(|v| !is_blank(v))
        .map(render)
}

/// Array elements as text. A lone string counts as a one-item list.
fn list_field(result: &Value, key: &str) -> Vec<String> {
    match result.get(key) {
        Some(Value::Array(items)) => items.iter().filter(|v| !is_blank(v)).map(render).collect(),
        Some(Value::String(s)) if !s.trim().is_empty() => vec![s.clone()],
        _ => Vec::new(),
    }
}

fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        Value::Bool(_) | Value::Number(_) => false,
    }
}

/// Cut to `max` chars, marking the cut with an ellipsis.
fn truncate(message: &str, max: usize) -> String {
    if message.chars().count() <= max {
        return message.to_string();
    }
    let cut: String = message.chars().take(max).collect();
    format!("{cut}...")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reasoning::tests::Scripted;
    use crate::reasoning::UnavailableReasoning;
    use serde_json::json;

    fn aggregator(reasoning: Arc<dyn ReasoningEngine>) -> ResultAggregator {
        ResultAggregator::new(AggregationConfig::default(), reasoning)
    }

    fn research_result() -> Value {
        json!({
            "findings": "Tokio is a multi-threaded, work-stealing async runtime for Rust with timers and I/O.",
            "sources": ["a", "b", "c", "d", "e", "f", "g"],
            "confidence": "high",
        })
    }

    #[tokio::test]
    async fn test_partial_failure_has_section_and_footnote() {
        let outcomes: OutcomeSet = [
            (AgentKind::Research, Outcome::completed(research_result())),
            (AgentKind::Code, Outcome::error("boom")),
        ]
        .into_iter()
        .collect();

        let artifact = aggregator(Arc::new(UnavailableReasoning))
            .aggregate("explain tokio", &outcomes)
            .await;

        assert_eq!(artifact.kind, ArtifactKind::Structured);
        let text = &artifact.content;
        assert!(text.starts_with("Based on your request: 'explain tokio', here's what I found:"));
        assert!(text.contains("## Research Findings:"));
        assert!(text.contains("work-stealing"));
        assert!(text.contains("*Confidence level: high*"));
        assert!(text.contains("- e"));
        assert!(!text.contains("- f"));
        assert!(text.contains("*Note: Some agents encountered issues:*"));
        assert!(text.contains("- Code: error - boom"));
    }

    #[tokio::test]
    async fn test_no_success_is_error_summary() {
        let long = "x".repeat(500);
        let outcomes: OutcomeSet = [
            (AgentKind::Research, Outcome::timeout("Task timed out after 60 seconds")),
            (AgentKind::Code, Outcome::error(long)),
        ]
        .into_iter()
        .collect();

        let reasoning = Arc::new(Scripted::reply("should not be used"));
        let artifact = aggregator(reasoning.clone())
            .aggregate("anything", &outcomes)
            .await;

        assert_eq!(artifact.kind, ArtifactKind::ErrorSummary);
        let text = &artifact.content;
        assert!(text.starts_with(ERROR_SUMMARY_HEADER));
        assert!(text.contains("- Research Agent: timeout - Task timed out after 60 seconds"));
        assert!(text.contains(&format!("- Code Agent: error - {}...", "x".repeat(200))));
        assert!(!text.contains(&"x".repeat(201)));
        assert!(text.ends_with(ERROR_SUMMARY_FOOTER));
        assert!(!text.contains("Based on your request"));
        assert!(reasoning.prompts.lock().is_empty());
    }

    #[tokio::test]
    async fn test_empty_outcomes_is_generic_error_summary() {
        let artifact = aggregator(Arc::new(UnavailableReasoning))
            .aggregate("anything", &OutcomeSet::new())
            .await;
        assert_eq!(artifact.kind, ArtifactKind::ErrorSummary);
        assert!(artifact.content.contains("Unable to process request"));
    }

    #[tokio::test]
    async fn test_short_document_uses_reasoning() {
        let outcomes: OutcomeSet = [(AgentKind::Code, Outcome::completed(json!({"code": "1"})))]
            .into_iter()
            .collect();
        let reasoning = Arc::new(Scripted::reply("Here is a synthesis."));

        let artifact = aggregator(reasoning.clone()).aggregate("hi", &outcomes).await;

        assert_eq!(artifact.kind, ArtifactKind::Synthesized);
        assert_eq!(artifact.content, "Here is a synthesis.");
        let prompts = reasoning.prompts.lock();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("User request: hi"));
        assert!(prompts[0].contains("\"status\": \"completed\""));
    }

    #[tokio::test]
    async fn test_reasoning_failure_dumps_raw_outcomes() {
        let outcomes: OutcomeSet = [(AgentKind::Code, Outcome::completed(json!({"code": "1"})))]
            .into_iter()
            .collect();

        let artifact = aggregator(Arc::new(Scripted::failing("model offline")))
            .aggregate("hi", &outcomes)
            .await;

        assert_eq!(artifact.kind, ArtifactKind::RawDump);
        assert!(artifact.content.starts_with("Results from processing your request:\n"));
        assert!(artifact.content.contains("\"code\""));
    }

    #[test]
    fn test_malformed_results_degrade_to_omission() {
        let outcomes: OutcomeSet = [
            (AgentKind::Research, Outcome::completed(json!({"sources": 42}))),
            (AgentKind::Code, Outcome::completed(Value::Null)),
            (AgentKind::Analytics, Outcome::completed(json!(["not", "an", "object"]))),
        ]
        .into_iter()
        .collect();

        let text = aggregator(Arc::new(UnavailableReasoning)).structured("r", &outcomes);
        assert!(!text.contains("## Research Findings:"));
        assert!(text.contains("## Research Agent Results:"));
        assert!(text.contains("- sources: 42"));
        assert!(!text.contains("## Code"));
        assert!(text.contains("## Analytics Agent Results:"));
        assert!(!text.contains("*Note:"));
    }

    #[test]
    fn test_code_and_analytics_sections() {
        let outcomes: OutcomeSet = [
            (
                AgentKind::Code,
                Outcome::completed(json!({
                    "output": "fn main() {}",
                    "explanation": "Smallest program.",
                    "language": "rust",
                })),
            ),
            (
                AgentKind::Analytics,
                Outcome::completed(json!({
                    "analysis": "Sales grew.",
                    "metrics": {"growth": 0.12},
                    "insights": ["Q3 strongest"],
                })),
            ),
        ]
        .into_iter()
        .collect();

        let text = aggregator(Arc::new(UnavailableReasoning)).structured("r", &outcomes);
        assert!(text.contains("## Code Solution:\n\nSmallest program.\n\n```rust\nfn main() {}\n```"));
        assert!(text.contains("## Data Analysis:"));
        assert!(text.contains("- growth: 0.12"));
        assert!(text.contains("**Insights:**\n- Q3 strongest"));
    }

    #[test]
    fn test_truncate_counts_chars() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("ééééé", 2), "éé...");
    }
}
