//! Recovery error types.

use switchyard_release::ReleaseError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RecoveryError {
    #[error("{action} recovery is not yet supported for {operation}")]
    Unsupported { action: String, operation: String },

    #[error("invalid error pattern {name}: {source}")]
    InvalidPattern {
        name: String,
        source: regex::Error,
    },

    #[error("manual intervention required")]
    ManualRequired,

    #[error("recovery cancelled")]
    Cancelled,

    #[error(transparent)]
    Release(#[from] ReleaseError),
}

pub type Result<T, E = RecoveryError> = std::result::Result<T, E>;
