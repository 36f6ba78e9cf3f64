//! Traffic switch error types.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why a phase failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FailureCause {
    /// A gate check failed; carries the failing checks.
    Gate { checks: String },
    /// The health watcher tripped during the soak.
    Unhealthy,
    /// The run was cancelled mid-phase.
    Cancelled,
    /// A port call kept failing after any automatic retries.
    Port { operation: String, message: String },
}

impl fmt::Display for FailureCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureCause::Gate { checks } => write!(f, "gate failed: {checks}"),
            FailureCause::Unhealthy => f.write_str("environment became unhealthy"),
            FailureCause::Cancelled => f.write_str("cancelled"),
            FailureCause::Port { operation, message } => {
                write!(f, "{operation} failed: {message}")
            }
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum SwitchError {
    #[error("phase {phase} ({traffic_percent}%) failed: {cause}")]
    PhaseFailed {
        phase: u32,
        traffic_percent: u32,
        cause: FailureCause,
    },

    #[error("plan is {0}, not planned")]
    NotPlanned(String),
}

impl SwitchError {
    pub fn cause(&self) -> Option<&FailureCause> {
        match self {
            SwitchError::PhaseFailed { cause, .. } => Some(cause),
            SwitchError::NotPlanned(_) => None,
        }
    }
}

pub type SwitchResult<T> = Result<T, SwitchError>;
