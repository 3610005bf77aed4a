use crate::reasoning::ReasoningEngine;
use crate::types::Subtask;
use async_trait::async_trait;
use conductor_core::{AgentKind, ConductorError, ConductorResult};
use serde::Deserialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, warn};

/// Splits a user request into subtasks for the specialists.
#[async_trait]
pub trait Decomposer: Send + Sync {
    async fn decompose(&self, request: &str) -> ConductorResult<Vec<Subtask>>;
}

const RESEARCH_KEYWORDS: &[&str] = &["research", "find", "search", "explore", "investigate"];
const CODE_KEYWORDS: &[&str] = &[
    "code",
    "implement",
    "generate",
    "program",
    "python",
    "javascript",
];
const ANALYTICS_KEYWORDS: &[&str] = &["analyze", "data", "metrics", "visualize", "report"];

/// Keyword routing: each specialist gets a subtask when the request
/// mentions one of its words. Code waits on research when both are
/// selected; a request matching nothing goes to research verbatim.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeywordDecomposer;

impl KeywordDecomposer {
    pub fn split(&self, request: &str) -> Vec<Subtask> {
        let lower = request.to_lowercase();
        let mentions = |words: &[&str]| words.iter().any(|w| lower.contains(w));

        let mut subtasks = Vec::new();
        if mentions(RESEARCH_KEYWORDS) {
            subtasks.push(Subtask::new(
                AgentKind::Research,
                format!("Research information about: {request}"),
                1,
            ));
        }
        if mentions(CODE_KEYWORDS) {
            let code = Subtask::new(AgentKind::Code, format!("Generate code for: {request}"), 2);
            subtasks.push(if subtasks.is_empty() {
                code
            } else {
                code.depends_on(AgentKind::Research)
            });
        }
        if mentions(ANALYTICS_KEYWORDS) {
            subtasks.push(Subtask::new(
                AgentKind::Analytics,
                format!("Analyze data for: {request}"),
                3,
            ));
        }

        if subtasks.is_empty() {
            subtasks.push(Subtask::new(AgentKind::Research, request, 1));
        }
        debug!(count = subtasks.len(), "Keyword decomposition");
        subtasks
    }
}

#[async_trait]
impl Decomposer for KeywordDecomposer {
    async fn decompose(&self, request: &str) -> ConductorResult<Vec<Subtask>> {
        Ok(self.split(request))
    }
}

#[derive(Debug, Deserialize)]
struct PlannedSubtask {
    agent: String,
    task: String,
    #[serde(default = "default_priority")]
    priority: u8,
    #[serde(default)]
    dependencies: Vec<String>,
}

fn default_priority() -> u8 {
    1
}

/// Asks a [`ReasoningEngine`] for a JSON plan.
///
/// Unknown agent names are dropped with a warning. An empty or
/// unparsable plan is a [`ConductorError::Decomposition`].
pub struct ReasoningDecomposer {
    engine: Arc<dyn ReasoningEngine>,
}

impl ReasoningDecomposer {
    pub fn new(engine: Arc<dyn ReasoningEngine>) -> Self {
        Self { engine }
    }

    fn prompt(request: &str) -> String {
        format!(
            "Analyze this user request and decompose it into subtasks.\n\n\
             Request: {request}\n\n\
             Return only a JSON list of subtasks with the following structure:\n\
             [{{\"agent\": \"research|code|analytics\", \"task\": \"specific task description\", \
             \"priority\": 1-5, \"dependencies\": [\"agents that must finish first\"]}}]"
        )
    }

    fn parse(reply: &str) -> ConductorResult<Vec<Subtask>> {
        let start = reply.find('[');
        let end = reply.rfind(']');
        let json = match (start, end) {
            (Some(start), Some(end)) if start < end => &reply[start..=end],
            _ => {
                return Err(ConductorError::Decomposition(
                    "reply contains no JSON list".to_string(),
                ))
            }
        };

        let planned: Vec<PlannedSubtask> = serde_json::from_str(json)
            .map_err(|e| ConductorError::Decomposition(format!("invalid plan: {e}")))?;

        let subtasks: Vec<Subtask> = planned
            .into_iter()
            .filter_map(|p| {
                let agent = match p.agent.parse::<AgentKind>() {
                    Ok(agent) => agent,
                    Err(e) => {
                        warn!(error = %e, "Dropping planned subtask");
                        return None;
                    }
                };
                let dependencies: BTreeSet<AgentKind> = p
                    .dependencies
                    .iter()
                    .filter_map(|d| d.parse().ok())
                    .filter(|d| *d != agent)
                    .collect();
                Some(Subtask {
                    agent,
                    description: p.task,
                    priority: p.priority,
                    dependencies,
                })
            })
            .collect();

        if subtasks.is_empty() {
            return Err(ConductorError::Decomposition(
                "plan names no known agent".to_string(),
            ));
        }
        Ok(subtasks)
    }
}

#[async_trait]
impl Decomposer for ReasoningDecomposer {
    async fn decompose(&self, request: &str) -> ConductorResult<Vec<Subtask>> {
        let reply = self.engine.complete(&Self::prompt(request)).await?;
        Self::parse(&reply)
    }
}
