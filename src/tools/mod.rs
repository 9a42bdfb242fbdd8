//! Tool system: the `Tool` trait, the registry, and the executor sandbox
//!
//! A registered tool is a {name, handler, timeout} triple. The
//! registry is read-only after initialization and shared across runs.

mod builtin;
mod sandbox;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

pub use builtin::{CalculatorTool, FnTool};
pub use sandbox::Sandbox;

pub use crate::config::AllowedTools;

/// Default handler timeout when a tool does not declare its own.
pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(30);

/// A callable tool. Handlers return `anyhow::Result`; the sandbox folds any
/// failure into a model-consumable observation.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str {
        ""
    }

    /// JSON schema of the tool's input, surfaced to the model planner.
    fn schema(&self) -> serde_json::Value {
        serde_json::json!({ "type": "object" })
    }

    fn timeout(&self) -> Duration {
        DEFAULT_TOOL_TIMEOUT
    }

    async fn call(&self, input: serde_json::Value) -> anyhow::Result<String>;
}

/// Registry of available tools. Read-only once the loop is constructed.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    /// Registry with the builtin tools.
    pub fn new() -> Self {
        let mut registry = Self::empty();
        registry.register(Arc::new(CalculatorTool));
        registry
    }

    pub fn empty() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn resolve(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn values(&self) -> impl Iterator<Item = &dyn Tool> {
        self.tools.values().map(|t| t.as_ref())
    }

    /// One `- name: description` line per tool, sorted by name so prompt
    /// text is stable across runs.
    pub fn catalog(&self) -> String {
        let mut names: Vec<&str> = self.tools.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
            .iter()
            .filter_map(|name| self.tools.get(*name))
            .map(|tool| format!("- {}: {}", tool.name(), tool.description()))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Tool schemas as a JSON array, for structured planning prompts.
    pub fn schema_json(&self) -> serde_json::Value {
        let mut names: Vec<&str> = self.tools.keys().map(String::as_str).collect();
        names.sort_unstable();
        serde_json::Value::Array(
            names
                .iter()
                .filter_map(|name| self.tools.get(*name))
                .map(|tool| {
                    serde_json::json!({
                        "name": tool.name(),
                        "description": tool.description(),
                        "input_schema": tool.schema(),
                    })
                })
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_registry_resolves_builtin_calculator() {
        let registry = ToolRegistry::new();
        assert!(registry.contains("calculator"));
        assert!(registry.resolve("nope").is_none());
    }

    #[test]
    fn test_catalog_is_sorted_and_stable() {
        let mut registry = ToolRegistry::empty();
        registry.register(Arc::new(
            FnTool::new("zeta", |_| async { Ok("z".to_string()) }).with_description("last"),
        ));
        registry.register(Arc::new(
            FnTool::new("alpha", |_| async { Ok("a".to_string()) }).with_description("first"),
        ));

        assert_eq!(registry.catalog(), "- alpha: first\n- zeta: last");
    }

    #[test]
    fn test_schema_json_lists_builtin_input_schemas() {
        let registry = ToolRegistry::new();
        let schemas = registry.schema_json();

        let entries = schemas.as_array().expect("array of tool schemas");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0]["name"], "calculator");
        assert_eq!(entries[0]["input_schema"]["required"][0], "expr");
    }
}
