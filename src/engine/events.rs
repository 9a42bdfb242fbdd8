//! Events yielded by a streaming run
//!
//! Within one trajectory, events arrive in strict step order; the terminal
//! event is emitted exactly once per run.

use crate::trajectory::{Action, Observation, TerminationSignal};

/// One event from `ReasoningLoop::run_stream`.
#[derive(Debug, Clone)]
pub enum RunEvent {
    /// A chunk of thought text. Token-by-token when the underlying model
    /// call streams; otherwise one event per thought.
    ThoughtDelta { iteration: usize, text: String },
    /// An action was handed to the sandbox.
    ActionDispatched { iteration: usize, action: Action },
    /// The sandbox reported the action's outcome.
    ObservationReceived {
        iteration: usize,
        observation: Observation,
    },
    /// The run is over. Carries the signal and the final answer text.
    Terminated {
        signal: TerminationSignal,
        answer: String,
    },
}

impl RunEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Terminated { .. })
    }
}
