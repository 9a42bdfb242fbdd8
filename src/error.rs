//! Error taxonomy for the reasoning core
//!
//! Two failure families are kept strictly apart: transport failures (the
//! model call itself) are retried with backoff and become fatal when
//! exhausted, while tool/business failures are folded into `Observation`s
//! and handed back to the model for self-correction.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure of a model transport call (plain, streaming, or structured).
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// The request never produced a usable response.
    #[error("model request failed: {0}")]
    Request(String),

    /// A token stream broke off mid-response.
    #[error("model stream interrupted: {0}")]
    Stream(String),
}

/// Failure of the hybrid planner to produce a decision.
#[derive(Debug, Error)]
pub enum PlannerError {
    /// The model kept returning output that failed schema validation,
    /// even after the bounded corrective re-prompts.
    #[error("planner output failed validation after {attempts} attempts: {reason}")]
    Validation { attempts: u32, reason: String },

    /// The transport retry budget was exhausted.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Why a run ended in the `Aborted` terminal state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AbortCause {
    /// Caller-initiated cooperative stop.
    Cancelled,
    /// Model transport failed past the retry budget.
    TransportFailure(String),
    /// Planner output never validated within the correction budget.
    Validation(String),
}

impl std::fmt::Display for AbortCause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cancelled => write!(f, "cancelled"),
            Self::TransportFailure(reason) => write!(f, "transport failure: {reason}"),
            Self::Validation(reason) => write!(f, "planner validation: {reason}"),
        }
    }
}

impl From<PlannerError> for AbortCause {
    fn from(err: PlannerError) -> Self {
        match err {
            PlannerError::Transport(e) => Self::TransportFailure(e.to_string()),
            PlannerError::Validation { reason, .. } => Self::Validation(reason),
        }
    }
}
