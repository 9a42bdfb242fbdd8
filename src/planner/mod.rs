//! Hybrid planner
//!
//! Per iteration the planner either fires a deterministic rule or falls back
//! to the model. The deterministic path is always tried first so cheap,
//! unambiguous requests stay fast and reproducible; the model path is the
//! fallback, never the reverse.

mod model;
pub mod rules;

use std::sync::Arc;

use tracing::debug;

use crate::error::PlannerError;
use crate::llm::{LlmClient, RetryPolicy};
use crate::memory::Context;
use crate::prompts;
use crate::tools::ToolRegistry;
use crate::trajectory::{Action, Task, Thought, Trajectory};

pub use rules::{Matcher, Rule, RuleMatch, RuleTable};

/// Which path produced a decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecisionSource {
    /// Deterministic rule, by name.
    Rule(String),
    /// Model fallback.
    Model,
}

/// One planned action, optionally marked as answer-bearing: a successful
/// observation of such an action is the run's final answer.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedAction {
    pub action: Action,
    pub answer_from_observation: bool,
}

impl PlannedAction {
    pub fn new(action: Action) -> Self {
        Self {
            action,
            answer_from_observation: false,
        }
    }

    pub fn answer_from_observation(mut self) -> Self {
        self.answer_from_observation = true;
        self
    }
}

/// The planner's verdict for one iteration: a thought plus one action, or
/// an ordered list of sub-actions from the model path.
#[derive(Debug, Clone)]
pub struct PlanningDecision {
    pub thought: Thought,
    pub actions: Vec<PlannedAction>,
    pub source: DecisionSource,
}

/// Deterministic-first planner with a model fallback.
pub struct HybridPlanner {
    rules: RuleTable,
    client: Arc<dyn LlmClient>,
    registry: Arc<ToolRegistry>,
    max_corrections: u32,
    retry: RetryPolicy,
}

impl HybridPlanner {
    pub fn new(
        client: Arc<dyn LlmClient>,
        registry: Arc<ToolRegistry>,
        max_corrections: u32,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            rules: RuleTable::builtin(),
            client,
            registry,
            max_corrections,
            retry,
        }
    }

    pub fn set_rules(&mut self, rules: RuleTable) {
        self.rules = rules;
    }

    /// Decide the next action(s). The first iteration matches rules against
    /// the task text; later iterations match against the latest observation
    /// so a fired rule cannot re-trigger itself off the unchanged task.
    pub async fn decide(
        &self,
        task: &Task,
        trajectory: &Trajectory,
        context: &Context,
    ) -> Result<PlanningDecision, PlannerError> {
        let probe: String = if trajectory.is_empty() {
            task.query().to_string()
        } else {
            trajectory
                .last_observation()
                .map(|obs| obs.to_string())
                .unwrap_or_default()
        };

        if let Some(matched) = self.rules.first_match(&probe) {
            debug!(rule = matched.rule.name(), "deterministic rule matched");
            let mut planned = PlannedAction::new(matched.action);
            if matched.rule.is_terminal() {
                planned = planned.answer_from_observation();
            }
            let tool = planned.action.tool().unwrap_or("FINISH").to_string();
            return Ok(PlanningDecision {
                thought: format!(
                    "Matched rule `{}`; dispatching `{}` directly.",
                    matched.rule.name(),
                    tool
                )
                .into(),
                actions: vec![planned],
                source: DecisionSource::Rule(matched.rule.name().to_string()),
            });
        }

        let prompt = prompts::planning_prompt(
            task,
            context,
            &self.registry.catalog(),
            &self.registry.schema_json(),
        );
        model::decide(self.client.as_ref(), &prompt, self.max_corrections, &self.retry).await
    }
}
