//! Release gateway error types.

use switchyard_core::PortError;
use thiserror::Error;

/// Errors from release operations.
///
/// Each variant keeps the port error intact so the rendered message still
/// carries the release tool's own text for classification.
#[derive(Debug, Clone, Error)]
pub enum ReleaseError {
    #[error("install of {release} failed: {source}")]
    Install { release: String, source: PortError },

    #[error("upgrade of {release} failed: {source}")]
    Upgrade { release: String, source: PortError },

    #[error("rollback of {release} failed: {source}")]
    Rollback { release: String, source: PortError },

    #[error("status of {release} failed: {source}")]
    Status { release: String, source: PortError },

    #[error("uninstall of {release} failed: {source}")]
    Uninstall { release: String, source: PortError },
}

impl ReleaseError {
    /// The underlying port error.
    pub fn port_error(&self) -> &PortError {
        match self {
            ReleaseError::Install { source, .. }
            | ReleaseError::Upgrade { source, .. }
            | ReleaseError::Rollback { source, .. }
            | ReleaseError::Status { source, .. }
            | ReleaseError::Uninstall { source, .. } => source,
        }
    }

    pub fn release(&self) -> &str {
        match self {
            ReleaseError::Install { release, .. }
            | ReleaseError::Upgrade { release, .. }
            | ReleaseError::Rollback { release, .. }
            | ReleaseError::Status { release, .. }
            | ReleaseError::Uninstall { release, .. } => release,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.port_error().is_cancelled()
    }
}

pub type ReleaseResult<T> = Result<T, ReleaseError>;
