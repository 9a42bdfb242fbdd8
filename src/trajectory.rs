//! Core data model: tasks, steps, and the append-only trajectory
//!
//! A `Trajectory` records the Thought/Action/Observation history of exactly
//! one run. It is owned by that run, advances strictly sequentially, and is
//! frozen once a `TerminationSignal` has been produced.

use serde::{Deserialize, Serialize};

use crate::error::AbortCause;

/// Immutable user request: the query text plus optional structured hints
/// that tools may consume (e.g. a preferred index name).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    query: String,
    hints: Option<serde_json::Value>,
}

impl Task {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            hints: None,
        }
    }

    pub fn with_hints(mut self, hints: serde_json::Value) -> Self {
        self.hints = Some(hints);
        self
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn hints(&self) -> Option<&serde_json::Value> {
        self.hints.as_ref()
    }
}

/// One free-text reasoning fragment, produced per iteration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thought(pub String);

impl Thought {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Thought {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for Thought {
    fn from(text: String) -> Self {
        Self(text)
    }
}

impl From<&str> for Thought {
    fn from(text: &str) -> Self {
        Self(text.to_string())
    }
}

/// A tool invocation, or the sentinel that ends the run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Action {
    Call {
        tool: String,
        input: serde_json::Value,
    },
    Finish,
}

impl Action {
    pub fn call(tool: impl Into<String>, input: serde_json::Value) -> Self {
        Self::Call {
            tool: tool.into(),
            input,
        }
    }

    /// Tool name for a call action; `None` for the finish sentinel.
    pub fn tool(&self) -> Option<&str> {
        match self {
            Self::Call { tool, .. } => Some(tool),
            Self::Finish => None,
        }
    }

    pub fn is_finish(&self) -> bool {
        matches!(self, Self::Finish)
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Call { tool, input } => write!(f, "{tool}({input})"),
            Self::Finish => f.write_str("FINISH"),
        }
    }
}

/// The sandbox's report of an action's outcome. Always model-consumable
/// text, never a raw error, so the model can react and self-correct.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "text", rename_all = "snake_case")]
pub enum Observation {
    ToolResult(String),
    PermissionDenied(String),
    ToolError(String),
}

impl Observation {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::ToolResult(_))
    }

    pub fn text(&self) -> &str {
        match self {
            Self::ToolResult(s) | Self::PermissionDenied(s) | Self::ToolError(s) => s,
        }
    }
}

impl std::fmt::Display for Observation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ToolResult(s) => f.write_str(s),
            Self::PermissionDenied(reason) => write!(f, "permission denied: {reason}"),
            Self::ToolError(reason) => write!(f, "tool error: {reason}"),
        }
    }
}

/// One completed (Thought, Action, Observation) triple. The observation is
/// `None` only for the final terminal step of a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    pub thought: Thought,
    pub action: Action,
    pub observation: Option<Observation>,
}

/// Ordered step history for one task. Append-only while the run is live;
/// frozen (further pushes ignored) once the run terminates.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Trajectory {
    steps: Vec<Step>,
    frozen: bool,
}

impl Trajectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, step: Step) {
        if self.frozen {
            tracing::warn!("ignoring step appended to a frozen trajectory");
            return;
        }
        self.steps.push(step);
    }

    /// Marks the trajectory terminal. Absorbing: there is no unfreeze.
    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn last(&self) -> Option<&Step> {
        self.steps.last()
    }

    pub fn last_thought(&self) -> Option<&Thought> {
        self.steps.last().map(|s| &s.thought)
    }

    pub fn last_observation(&self) -> Option<&Observation> {
        self.steps.iter().rev().find_map(|s| s.observation.as_ref())
    }
}

/// How a run ended. Once produced the trajectory is frozen; `Terminated`
/// and `Aborted` are absorbing states.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TerminationSignal {
    /// The model declared a final answer in its thought text.
    FinalAnswer(String),
    /// The explicit machine-readable FINISH action.
    ActionFinish,
    /// The iteration cap was hit without a terminal marker.
    MaxIterationsReached,
    /// The run was stopped by cancellation or an unrecoverable error.
    Aborted(AbortCause),
}

impl TerminationSignal {
    pub fn is_aborted(&self) -> bool {
        matches!(self, Self::Aborted(_))
    }
}
