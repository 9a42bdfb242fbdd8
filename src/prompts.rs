//! Prompt builders for the reasoning loop

use crate::memory::Context;
use crate::trajectory::Task;

/// System anchor included verbatim in every context. Never evicted by the
/// memory provider.
pub const SYSTEM_ANCHOR: &str = "\
You are a document-grounded assistant that solves tasks in \
Thought / Action / Observation steps. Ground every claim in tool output. \
When the task is complete, reply with `Final Answer: <answer>` or emit the \
FINISH action. Do not invent tool results.";

/// Fallback answer when a run ends with no usable thought or observation.
pub const NO_ANSWER: &str = "Unable to complete task";

/// Prompt for the model-driven planner: bounded context, tool catalog with
/// input schemas, and the strict JSON reply contract.
pub fn planning_prompt(
    task: &Task,
    context: &Context,
    tool_catalog: &str,
    tool_schemas: &serde_json::Value,
) -> String {
    let catalog = if tool_catalog.is_empty() {
        "(no tools available)"
    } else {
        tool_catalog
    };

    format!(
        "{context}\n\n\
        Available tools:\n{catalog}\n\n\
        Tool input schemas:\n{tool_schemas}\n\n\
        Reply with exactly one JSON object of the form\n\
        {{\"thought\": \"<your reasoning>\", \"actions\": [{{\"tool\": \"<name>\", \"input\": {{...}}}}]}}\n\
        Use the tool name FINISH (no input required) to stop once the task is complete. \
        The actions list may be empty only when your thought states the final answer.\n\n\
        Task: {task}",
        context = context.render(),
        task = task.query(),
    )
}

/// Corrective re-prompt after a schema violation: the original prompt, the
/// rejected reply, and the validation error.
pub fn correction_prompt(base: &str, rejected: &serde_json::Value, error: &str) -> String {
    format!(
        "{base}\n\n\
        Your previous reply was rejected: {error}\n\
        Rejected reply: {rejected}\n\
        Reply again with exactly one valid JSON object and nothing else."
    )
}

/// Prompt for synthesizing a best-effort answer once the iteration cap is
/// hit without a terminal marker.
pub fn final_answer_prompt(task: &Task, observations: &[String]) -> String {
    let history = observations
        .iter()
        .enumerate()
        .map(|(i, obs)| format!("Observation {}: {}", i + 1, obs))
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        "Answer the user's question from the observations below.\n\n\
        Task: {task}\n\n\
        {history}\n\n\
        Provide a concise, accurate final answer:",
        task = task.query(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_planning_prompt_carries_anchor_task_and_schemas() {
        let task = Task::new("what is chunk overlap?");
        let context = Context::anchored(SYSTEM_ANCHOR);
        let schemas = serde_json::json!([{
            "name": "search_docs",
            "description": "retrieval",
            "input_schema": { "type": "object", "required": ["query"] }
        }]);
        let prompt = planning_prompt(&task, &context, "- search_docs: retrieval", &schemas);

        assert!(prompt.contains(SYSTEM_ANCHOR));
        assert!(prompt.contains("what is chunk overlap?"));
        assert!(prompt.contains("search_docs"));
        assert!(prompt.contains(r#""required":["query"]"#));
    }

    #[test]
    fn test_correction_prompt_includes_validation_error() {
        let rejected = serde_json::json!({"actions": "oops"});
        let prompt = correction_prompt("base", &rejected, "actions must be an array");

        assert!(prompt.starts_with("base"));
        assert!(prompt.contains("actions must be an array"));
        assert!(prompt.contains(r#""actions":"oops""#));
    }
}
