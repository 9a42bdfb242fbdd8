//! Executor sandbox
//!
//! Validates an action against the run's allow-list, invokes the handler
//! under its timeout, and converts every failure into an `Observation` the
//! model can read. Never returns an error to the loop, and never retries a
//! tool: a failed tool is surfaced so the model can choose differently.

use std::sync::Arc;

use tracing::{debug, warn};

use super::{AllowedTools, ToolRegistry};
use crate::trajectory::{Action, Observation};

/// Sandboxed tool dispatcher. Cheap to clone; shares the read-only registry.
#[derive(Clone)]
pub struct Sandbox {
    registry: Arc<ToolRegistry>,
}

impl Sandbox {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self { registry }
    }

    /// Execute one action under the allow-list.
    ///
    /// The access check runs before the registry lookup: a disallowed tool
    /// is never resolved, let alone invoked, regardless of which planner
    /// path produced the action.
    pub async fn execute(&self, action: &Action, allowed: &AllowedTools) -> Observation {
        let (tool_name, input) = match action {
            Action::Call { tool, input } => (tool.as_str(), input),
            Action::Finish => {
                warn!("finish action reached the sandbox");
                return Observation::ToolError("the FINISH action is not dispatchable".to_string());
            }
        };

        if !allowed.contains(tool_name) {
            debug!(tool = tool_name, "action denied by allow-list");
            return Observation::PermissionDenied(format!(
                "tool '{tool_name}' is not in the allowed set"
            ));
        }

        let Some(tool) = self.registry.resolve(tool_name) else {
            return Observation::ToolError(format!("unknown tool: {tool_name}"));
        };

        let timeout = tool.timeout();
        match tokio::time::timeout(timeout, tool.call(input.clone())).await {
            Ok(Ok(output)) => {
                debug!(tool = tool_name, "tool call succeeded");
                Observation::ToolResult(output)
            }
            Ok(Err(err)) => {
                warn!(tool = tool_name, error = %err, "tool call failed");
                Observation::ToolError(format!("{err:#}"))
            }
            Err(_) => {
                warn!(tool = tool_name, ?timeout, "tool call timed out");
                Observation::ToolError(format!(
                    "tool '{tool_name}' timed out after {}s",
                    timeout.as_secs_f32()
                ))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::FnTool;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    fn allowed(names: &[&str]) -> AllowedTools {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_allowed_tool_runs_and_returns_result() {
        let mut registry = ToolRegistry::empty();
        registry.register(Arc::new(FnTool::new("echo", |input: serde_json::Value| async move {
            Ok(input["text"].as_str().unwrap_or("").to_string())
        })));
        let sandbox = Sandbox::new(Arc::new(registry));

        let obs = sandbox
            .execute(
                &Action::call("echo", serde_json::json!({ "text": "hi" })),
                &allowed(&["echo"]),
            )
            .await;

        assert_eq!(obs, Observation::ToolResult("hi".into()));
    }

    #[tokio::test]
    async fn test_disallowed_tool_never_invokes_handler() {
        let invoked = Arc::new(AtomicBool::new(false));
        let flag = invoked.clone();

        let mut registry = ToolRegistry::empty();
        registry.register(Arc::new(FnTool::new("web_search", move |_| {
            let flag = flag.clone();
            async move {
                flag.store(true, Ordering::SeqCst);
                Ok("results".to_string())
            }
        })));
        let sandbox = Sandbox::new(Arc::new(registry));

        let obs = sandbox
            .execute(
                &Action::call("web_search", serde_json::json!({})),
                &allowed(&["search_docs"]),
            )
            .await;

        assert!(matches!(obs, Observation::PermissionDenied(_)));
        assert!(!invoked.load(Ordering::SeqCst), "handler must not run");
    }

    #[tokio::test]
    async fn test_unknown_tool_is_a_tool_error() {
        let sandbox = Sandbox::new(Arc::new(ToolRegistry::empty()));

        let obs = sandbox
            .execute(
                &Action::call("ghost", serde_json::json!({})),
                &allowed(&["ghost"]),
            )
            .await;

        assert_eq!(obs, Observation::ToolError("unknown tool: ghost".into()));
    }

    #[tokio::test]
    async fn test_handler_error_becomes_tool_error() {
        let mut registry = ToolRegistry::empty();
        registry.register(Arc::new(FnTool::new("broken", |_| async {
            anyhow::bail!("backing store offline")
        })));
        let sandbox = Sandbox::new(Arc::new(registry));

        let obs = sandbox
            .execute(
                &Action::call("broken", serde_json::json!({})),
                &allowed(&["broken"]),
            )
            .await;

        match obs {
            Observation::ToolError(reason) => assert!(reason.contains("backing store offline")),
            other => panic!("expected ToolError, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_handler_times_out() {
        let mut registry = ToolRegistry::empty();
        registry.register(Arc::new(
            FnTool::new("slow", |_| async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok("too late".to_string())
            })
            .with_timeout(Duration::from_millis(50)),
        ));
        let sandbox = Sandbox::new(Arc::new(registry));

        let obs = sandbox
            .execute(&Action::call("slow", serde_json::json!({})), &allowed(&["slow"]))
            .await;

        match obs {
            Observation::ToolError(reason) => assert!(reason.contains("timed out")),
            other => panic!("expected ToolError, got {other:?}"),
        }
    }
}
