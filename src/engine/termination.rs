//! Termination detection
//!
//! Pure functions over the latest thought text and action, plus the loop's
//! phase machine. The explicit FINISH action beats the free-text marker
//! when both appear in the same step.

use std::sync::OnceLock;

use fancy_regex::Regex;

use crate::trajectory::{Action, TerminationSignal};

fn final_answer_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // `.` stops at the line break: the answer is the rest of the marker's
    // line, not everything that follows it.
    RE.get_or_init(|| Regex::new(r"(?i)final answer:\s*(.+)").expect("static regex"))
}

fn action_finish_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)action:\s*finish").expect("static regex"))
}

/// Whether the thought carries the case-insensitive final-answer marker.
pub fn has_final_marker(thought: &str) -> bool {
    thought.to_lowercase().contains("final answer")
}

/// Whether the thought carries the structured `Action: FINISH` marker.
pub fn has_finish_marker(thought: &str) -> bool {
    action_finish_regex().is_match(thought).unwrap_or(false)
}

/// Detect a terminal signal in the latest thought/action pair.
pub fn detect(thought: &str, action: Option<&Action>) -> Option<TerminationSignal> {
    let finish = action.is_some_and(Action::is_finish) || has_finish_marker(thought);
    if finish {
        // Machine-readable signal beats free text.
        return Some(TerminationSignal::ActionFinish);
    }
    if has_final_marker(thought) {
        return Some(TerminationSignal::FinalAnswer(extract_final_answer(thought)));
    }
    None
}

/// The rest of the line after the first `Final Answer:` marker, trimmed;
/// the whole thought when the marker carries no text of its own.
pub fn extract_final_answer(thought: &str) -> String {
    if let Ok(Some(caps)) = final_answer_regex().captures(thought) {
        if let Some(answer) = caps.get(1) {
            let answer = answer.as_str().trim();
            if !answer.is_empty() {
                return answer.to_string();
            }
        }
    }
    thought.trim().to_string()
}

/// Loop phase. `Terminated` and `Aborted` are absorbing: every transition
/// out of them returns the same state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Planning,
    AwaitingObservation,
    Terminated,
    Aborted,
}

impl Phase {
    pub fn on_action_dispatched(self) -> Self {
        match self {
            Self::Planning => Self::AwaitingObservation,
            other => other,
        }
    }

    pub fn on_observation(self) -> Self {
        match self {
            Self::AwaitingObservation => Self::Planning,
            other => other,
        }
    }

    pub fn on_terminal(self) -> Self {
        match self {
            Self::Terminated | Self::Aborted => self,
            _ => Self::Terminated,
        }
    }

    pub fn on_abort(self) -> Self {
        match self {
            Self::Terminated | Self::Aborted => self,
            _ => Self::Aborted,
        }
    }

    pub fn is_absorbing(self) -> bool {
        matches!(self, Self::Terminated | Self::Aborted)
    }
}
