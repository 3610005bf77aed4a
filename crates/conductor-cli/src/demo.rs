use async_trait::async_trait;
use conductor_a2a::TaskHandler;
use conductor_core::{AgentKind, ConductorResult, TaskInput};
use serde_json::{json, Value};

/// Demo specialist that answers in the result shape of its agent kind
/// without calling any tools.
pub struct EchoSpecialist {
    agent: AgentKind,
}

impl EchoSpecialist {
    pub fn new(agent: AgentKind) -> Self {
        Self { agent }
    }

    fn respond(&self, message: &str) -> Value {
        let words = message.split_whitespace().count();
        match self.agent {
            AgentKind::Research => json!({
                "findings": format!("No live search backend is attached. Request received: {message}"),
                "sources": [],
                "confidence": "low",
            }),
            AgentKind::Code => json!({
                "code": format!("# {message}\nprint({message:?})"),
                "explanation": "Placeholder program echoing the request.",
                "language": "python",
            }),
            AgentKind::Analytics => json!({
                "analysis": format!("Text statistics for the request: {message}"),
                "metrics": {"characters": message.chars().count(), "words": words},
                "insights": [format!("The request has {words} words.")],
            }),
        }
    }
}

#[async_trait]
impl TaskHandler for EchoSpecialist {
    async fn handle(&self, input: &TaskInput) -> ConductorResult<Value> {
        Ok(self.respond(&input.message))
    }
}
