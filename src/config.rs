//! Run configuration
//!
//! All limits are explicit immutable values passed into the loop at
//! construction, never process-wide defaults.

use std::collections::HashSet;
use std::time::Duration;

/// Set of tool names one run is allowed to dispatch. Read-only for the
/// duration of the run.
pub type AllowedTools = HashSet<String>;

/// Configuration for one `ReasoningLoop`.
///
/// # Example
///
/// ```
/// use reagent::RunConfig;
///
/// let config = RunConfig::default()
///     .allow("calculator")
///     .allow("search_docs");
/// assert_eq!(config.max_iterations, 10);
/// ```
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Hard cap on trajectory length. The terminating step consumes one
    /// iteration slot.
    pub max_iterations: usize,
    /// Total transport attempts per logical model call, including the first.
    pub max_retries: u32,
    /// Base delay for exponential transport backoff (multiplier 2).
    pub backoff_base: Duration,
    /// Tools this run may dispatch. Everything else is denied by the sandbox.
    pub allowed_tools: AllowedTools,
    /// Corrective re-prompts the model planner gets after a schema violation.
    pub max_corrections: u32,
    /// Recent steps the default memory provider keeps verbatim.
    pub near_field_steps: usize,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            max_retries: 3,
            backoff_base: Duration::from_millis(500),
            allowed_tools: AllowedTools::new(),
            max_corrections: 2,
            near_field_steps: 4,
        }
    }
}

impl RunConfig {
    pub fn allow(mut self, tool: impl Into<String>) -> Self {
        self.allowed_tools.insert(tool.into());
        self
    }

    pub fn with_allowed_tools<I, S>(mut self, tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_tools = tools.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_backoff_base(mut self, backoff_base: Duration) -> Self {
        self.backoff_base = backoff_base;
        self
    }
}
