//! Model-driven planning
//!
//! Fallback path when no deterministic rule matches: ask the model for a
//! strict JSON decision, validate it, and re-prompt with the validation
//! error a bounded number of times before giving up. Output is never
//! silently coerced.

use std::sync::OnceLock;

use tracing::{debug, warn};

use crate::error::PlannerError;
use crate::llm::{with_retry, LlmClient, RetryPolicy};
use crate::trajectory::Action;

use super::{DecisionSource, PlannedAction, PlanningDecision};

/// JSON schema hint handed to the transport alongside the prompt.
pub(super) fn decision_schema() -> &'static serde_json::Value {
    static SCHEMA: OnceLock<serde_json::Value> = OnceLock::new();
    SCHEMA.get_or_init(|| {
        serde_json::json!({
            "type": "object",
            "required": ["thought", "actions"],
            "properties": {
                "thought": { "type": "string" },
                "actions": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "required": ["tool", "input"],
                        "properties": {
                            "tool": { "type": "string" },
                            "input": { "type": "object" }
                        }
                    }
                }
            }
        })
    })
}

/// Ask the model for a decision, validating and re-prompting as needed.
///
/// Transport failures propagate after the retry policy is spent; schema
/// failures get `max_corrections` corrective re-prompts and then become
/// `PlannerError::Validation`.
pub(super) async fn decide(
    client: &dyn LlmClient,
    base_prompt: &str,
    max_corrections: u32,
    retry: &RetryPolicy,
) -> Result<PlanningDecision, PlannerError> {
    let schema = decision_schema();
    let mut prompt = base_prompt.to_string();
    let mut last_error = String::new();

    let attempts = max_corrections + 1;
    for attempt in 1..=attempts {
        let raw = with_retry(retry, "planner", || {
            client.complete_structured(&prompt, schema)
        })
        .await?;

        match validate(&raw) {
            Ok(decision) => {
                debug!(attempt, "model planning decision validated");
                return Ok(decision);
            }
            Err(reason) => {
                warn!(attempt, %reason, "model planning decision failed validation");
                prompt = crate::prompts::correction_prompt(base_prompt, &raw, &reason);
                last_error = reason;
            }
        }
    }

    Err(PlannerError::Validation {
        attempts,
        reason: last_error,
    })
}

/// Validate raw model JSON against the decision contract.
pub(super) fn validate(raw: &serde_json::Value) -> Result<PlanningDecision, String> {
    let obj = raw
        .as_object()
        .ok_or_else(|| "reply must be a JSON object".to_string())?;

    let thought = obj
        .get("thought")
        .and_then(|v| v.as_str())
        .ok_or_else(|| "field 'thought' must be a string".to_string())?
        .to_string();

    let items = obj
        .get("actions")
        .and_then(|v| v.as_array())
        .ok_or_else(|| "field 'actions' must be an array".to_string())?;

    let mut actions = Vec::with_capacity(items.len());
    for (i, item) in items.iter().enumerate() {
        actions.push(validate_action(i, item)?);
    }

    if actions.is_empty() && !crate::engine::termination::has_final_marker(&thought) {
        return Err(
            "field 'actions' may be empty only when the thought states a final answer".to_string(),
        );
    }

    Ok(PlanningDecision {
        thought: thought.into(),
        actions,
        source: DecisionSource::Model,
    })
}

fn validate_action(index: usize, item: &serde_json::Value) -> Result<PlannedAction, String> {
    let obj = item
        .as_object()
        .ok_or_else(|| format!("actions[{index}] must be an object"))?;

    let tool = obj
        .get("tool")
        .and_then(|v| v.as_str())
        .ok_or_else(|| format!("actions[{index}].tool must be a string"))?;

    if tool.is_empty() {
        return Err(format!("actions[{index}].tool must not be empty"));
    }

    if tool == "FINISH" {
        return Ok(PlannedAction::new(Action::Finish));
    }

    let input = obj
        .get("input")
        .ok_or_else(|| format!("actions[{index}].input is required"))?;
    if !input.is_object() {
        return Err(format!("actions[{index}].input must be an object"));
    }

    Ok(PlannedAction::new(Action::call(tool, input.clone())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Client that replays a fixed sequence of structured replies.
    struct Scripted {
        replies: Mutex<Vec<serde_json::Value>>,
        calls: AtomicU32,
    }

    impl Scripted {
        fn new(replies: Vec<serde_json::Value>) -> Self {
            Self {
                replies: Mutex::new(replies),
                calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl crate::llm::LlmClient for Scripted {
        async fn complete(&self, _prompt: &str) -> Result<String, TransportError> {
            Ok(String::new())
        }

        async fn complete_structured(
            &self,
            _prompt: &str,
            _schema: &serde_json::Value,
        ) -> Result<serde_json::Value, TransportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut replies = self.replies.lock().unwrap();
            if replies.is_empty() {
                return Err(TransportError::Request("script exhausted".into()));
            }
            Ok(replies.remove(0))
        }
    }

    fn retry() -> RetryPolicy {
        RetryPolicy::new(3, Duration::from_millis(1))
    }

    #[test]
    fn test_validate_accepts_well_formed_decision() {
        let decision = validate(&serde_json::json!({
            "thought": "look it up",
            "actions": [{ "tool": "search_docs", "input": { "query": "overlap" } }]
        }))
        .unwrap();

        assert_eq!(decision.actions.len(), 1);
        assert_eq!(decision.actions[0].action.tool(), Some("search_docs"));
    }

    #[test]
    fn test_validate_maps_finish_sentinel() {
        let decision = validate(&serde_json::json!({
            "thought": "done",
            "actions": [{ "tool": "FINISH" }]
        }))
        .unwrap();

        assert!(decision.actions[0].action.is_finish());
    }

    #[test]
    fn test_validate_rejects_non_object_input() {
        let err = validate(&serde_json::json!({
            "thought": "hm",
            "actions": [{ "tool": "search_docs", "input": "overlap" }]
        }))
        .unwrap_err();
        assert!(err.contains("input must be an object"));
    }

    #[test]
    fn test_validate_rejects_empty_actions_without_final_marker() {
        let err = validate(&serde_json::json!({ "thought": "hm", "actions": [] })).unwrap_err();
        assert!(err.contains("may be empty only"));

        let ok = validate(&serde_json::json!({
            "thought": "Final Answer: 42",
            "actions": []
        }));
        assert!(ok.is_ok());
    }

    #[tokio::test]
    async fn test_corrective_reprompt_recovers_from_schema_violation() {
        let client = Scripted::new(vec![
            serde_json::json!({ "thought": "bad", "actions": "not an array" }),
            serde_json::json!({
                "thought": "fixed",
                "actions": [{ "tool": "search_docs", "input": {} }]
            }),
        ]);

        let decision = decide(&client, "plan", 2, &retry()).await.unwrap();
        assert_eq!(decision.thought.as_str(), "fixed");
        assert_eq!(client.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_validation_error_after_correction_budget() {
        let bad = serde_json::json!({ "thought": "bad", "actions": "nope" });
        let client = Scripted::new(vec![bad.clone(), bad.clone(), bad]);

        let err = decide(&client, "plan", 2, &retry()).await.unwrap_err();
        match err {
            PlannerError::Validation { attempts, reason } => {
                assert_eq!(attempts, 3);
                assert!(reason.contains("must be an array"));
            }
            other => panic!("expected Validation, got {other:?}"),
        }
        // One structured call per attempt; no silent guessing.
        assert_eq!(client.calls.load(Ordering::SeqCst), 3);
    }
}
