//! Reagent - a reasoning core for document-grounded agents
//!
//! Runs the Thought → Action → Observation loop: a hybrid planner picks the
//! next tool call (deterministic rules first, model fallback second), a
//! sandbox executes it against an allow-list, and a termination detector
//! decides when the run is over. Model transport is abstract; plug in any
//! `LlmClient`.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use reagent::{ReasoningLoop, RunConfig, Task, ToolRegistry};
//!
//! # async fn run(client: Arc<dyn reagent::LlmClient>) {
//! let config = RunConfig::default()
//!     .allow("calculator")
//!     .allow("search_docs")
//!     .with_max_iterations(8);
//!
//! let engine = ReasoningLoop::new(config, client, Arc::new(ToolRegistry::new()));
//!
//! let outcome = engine.run(Task::new("calculate 17 * 3")).await;
//! println!("{}", outcome.answer);
//!
//! // Or consume the run as a live event stream:
//! use futures::StreamExt;
//! use reagent::RunEvent;
//!
//! let mut events = std::pin::pin!(engine.run_stream(Task::new("find the chunk overlap docs")));
//! while let Some(event) = events.next().await {
//!     match event {
//!         RunEvent::ThoughtDelta { text, .. } => print!("{text}"),
//!         RunEvent::Terminated { answer, .. } => println!("\n=> {answer}"),
//!         _ => {}
//!     }
//! }
//! # }
//! ```

mod config;
mod engine;
mod error;
mod llm;
mod memory;
mod planner;
mod prompts;
mod tools;
mod trajectory;

// Re-export the public API
pub use config::{AllowedTools, RunConfig};
pub use engine::{Phase, ReasoningLoop, RunEvent, RunOutcome, StopHandle};
pub use error::{AbortCause, PlannerError, TransportError};
pub use llm::{with_retry, LlmClient, RetryPolicy, TokenStream};
pub use memory::{Context, MemoryProvider, WindowMemory};
pub use planner::{
    DecisionSource, HybridPlanner, Matcher, PlannedAction, PlanningDecision, Rule, RuleMatch,
    RuleTable,
};
pub use prompts::{NO_ANSWER, SYSTEM_ANCHOR};
pub use tools::{CalculatorTool, FnTool, Sandbox, Tool, ToolRegistry, DEFAULT_TOOL_TIMEOUT};
pub use trajectory::{
    Action, Observation, Step, Task, TerminationSignal, Thought, Trajectory,
};
