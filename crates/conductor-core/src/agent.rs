use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The specialist services a request can be decomposed onto.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentKind {
    /// Web research, documentation analysis, information gathering.
    Research,
    /// Code generation, debugging, execution.
    Code,
    /// Data analysis, metrics, visualization.
    Analytics,
}

impl AgentKind {
    /// Every known specialist, in a stable order.
    pub const ALL: [AgentKind; 3] = [AgentKind::Research, AgentKind::Code, AgentKind::Analytics];

    /// Lowercase wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentKind::Research => "research",
            AgentKind::Code => "code",
            AgentKind::Analytics => "analytics",
        }
    }

    /// Capitalized name used in user-facing text ("Research").
    pub fn title(&self) -> &'static str {
        match self {
            AgentKind::Research => "Research",
            AgentKind::Code => "Code",
            AgentKind::Analytics => "Analytics",
        }
    }
}

impl fmt::Display for AgentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgentKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "research" => Ok(AgentKind::Research),
            "code" => Ok(AgentKind::Code),
            "analytics" => Ok(AgentKind::Analytics),
            other => Err(format!(
                "unknown agent '{other}' (expected research, code or analytics)"
            )),
        }
    }
}
