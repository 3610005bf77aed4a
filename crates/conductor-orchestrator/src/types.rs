use chrono::{DateTime, Utc};
use conductor_core::AgentKind;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// One unit of decomposed work, routed to a single specialist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subtask {
    pub agent: AgentKind,
    pub description: String,
    pub priority: u8,
    #[serde(default)]
    pub dependencies: BTreeSet<AgentKind>,
}

impl Subtask {
    pub fn new(agent: AgentKind, description: impl Into<String>, priority: u8) -> Self {
        Self {
            agent,
            description: description.into(),
            priority,
            dependencies: BTreeSet::new(),
        }
    }

    pub fn depends_on(mut self, agent: AgentKind) -> Self {
        self.dependencies.insert(agent);
        self
    }

    /// The wave this subtask belongs to: the number of declared dependencies.
    pub fn dependency_level(&self) -> usize {
        self.dependencies.len()
    }
}

/// Subtasks dispatched together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wave {
    pub level: usize,
    pub subtasks: Vec<Subtask>,
}

impl Wave {
    pub fn agents(&self) -> Vec<AgentKind> {
        self.subtasks.iter().map(|s| s.agent).collect()
    }
}

/// What one specialist produced for a request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Completed {
        result: serde_json::Value,
        #[serde(default)]
        metadata: serde_json::Value,
    },
    Error {
        message: String,
    },
    Timeout {
        message: String,
    },
}

impl Outcome {
    pub fn completed(result: serde_json::Value) -> Self {
        Outcome::Completed {
            result,
            metadata: serde_json::Value::Null,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Outcome::Error {
            message: message.into(),
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Outcome::Timeout {
            message: message.into(),
        }
    }

    /// Status word shown in user-facing text.
    pub fn status_label(&self) -> &'static str {
        match self {
            Outcome::Completed { .. } => "completed",
            Outcome::Error { .. } => "error",
            Outcome::Timeout { .. } => "timeout",
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, Outcome::Completed { .. })
    }

    pub fn error_message(&self) -> Option<&str> {
        match self {
            Outcome::Completed { .. } => None,
            Outcome::Error { message } | Outcome::Timeout { message } => Some(message),
        }
    }
}

/// Per-agent outcomes of one request.
///
/// Iteration order is the agent order, which carries no meaning about
/// when each outcome arrived.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OutcomeSet(BTreeMap<AgentKind, Outcome>);

impl OutcomeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an outcome, replacing any earlier one for the same agent.
    pub fn insert(&mut self, agent: AgentKind, outcome: Outcome) -> Option<Outcome> {
        self.0.insert(agent, outcome)
    }

    pub fn get(&self, agent: AgentKind) -> Option<&Outcome> {
        self.0.get(&agent)
    }

    pub fn iter(&self) -> impl Iterator<Item = (AgentKind, &Outcome)> {
        self.0.iter().map(|(agent, outcome)| (*agent, outcome))
    }

    pub fn successful(&self) -> impl Iterator<Item = (AgentKind, &Outcome)> {
        self.iter().filter(|(_, outcome)| outcome.is_completed())
    }

    pub fn unsuccessful(&self) -> impl Iterator<Item = (AgentKind, &Outcome)> {
        self.iter().filter(|(_, outcome)| !outcome.is_completed())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(AgentKind, Outcome)> for OutcomeSet {
    fn from_iter<I: IntoIterator<Item = (AgentKind, Outcome)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// How the final artifact was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    /// Per-agent sections merged into one document.
    Structured,
    /// No specialist completed; one bullet per failure.
    ErrorSummary,
    /// Prose written by the reasoning engine from the raw outcomes.
    Synthesized,
    /// The reasoning engine failed too; outcomes dumped as JSON.
    RawDump,
}

/// The single document returned for a request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
    pub kind: ArtifactKind,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl Artifact {
    pub fn new(kind: ArtifactKind, content: impl Into<String>) -> Self {
        Self {
            kind,
            content: content.into(),
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subtask_dependency_level() {
        let task = Subtask::new(AgentKind::Code, "Generate code", 2);
        assert_eq!(task.dependency_level(), 0);
        let task = task.depends_on(AgentKind::Research).depends_on(AgentKind::Research);
        assert_eq!(task.dependency_level(), 1);
    }

    #[test]
    fn test_outcome_serialization() {
        let json = serde_json::to_value(Outcome::error("boom")).unwrap();
        assert_eq!(json["status"], "error");
        assert_eq!(json["message"], "boom");

        let parsed: Outcome =
            serde_json::from_str(r#"{"status":"completed","result":{"output":"x"}}"#).unwrap();
        assert!(parsed.is_completed());
        assert_eq!(parsed.error_message(), None);
    }

    #[test]
    fn test_outcome_set_partition() {
        let set: OutcomeSet = [
            (AgentKind::Research, Outcome::completed(serde_json::json!({}))),
            (AgentKind::Code, Outcome::timeout("late")),
            (AgentKind::Analytics, Outcome::error("down")),
        ]
        .into_iter()
        .collect();

        assert_eq!(set.len(), 3);
        assert_eq!(set.successful().count(), 1);
        let failed: Vec<_> = set.unsuccessful().map(|(a, o)| (a, o.status_label())).collect();
        assert_eq!(
            failed,
            vec![(AgentKind::Code, "timeout"), (AgentKind::Analytics, "error")]
        );
    }

    #[test]
    fn test_outcome_set_last_write_wins() {
        let mut set = OutcomeSet::new();
        set.insert(AgentKind::Code, Outcome::error("first"));
        let previous = set.insert(AgentKind::Code, Outcome::error("second"));
        assert_eq!(previous, Some(Outcome::error("first")));
        assert_eq!(set.get(AgentKind::Code).and_then(Outcome::error_message), Some("second"));
    }

    #[test]
    fn test_artifact_kind_serialization() {
        let json = serde_json::to_string(&ArtifactKind::ErrorSummary).unwrap();
        assert_eq!(json, "\"error_summary\"");
    }
}
