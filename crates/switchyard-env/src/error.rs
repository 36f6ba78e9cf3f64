//! Environment manager error types.

use switchyard_core::PortError;
use thiserror::Error;

/// Errors from environment operations. Validation failures get one
/// variant per check.
#[derive(Debug, Clone, Error)]
pub enum EnvironmentError {
    #[error("invalid environment config: {0}")]
    InvalidConfig(String),

    #[error("failed to create namespace {namespace}: {source}")]
    NamespaceCreation { namespace: String, source: PortError },

    #[error("failed to apply {kind} in {namespace}: {source}")]
    Apply {
        kind: String,
        namespace: String,
        source: PortError,
    },

    #[error("manifest rendering failed: {0}")]
    Render(String),

    #[error("namespace {namespace} does not exist")]
    NamespaceMissing { namespace: String },

    #[error("insufficient cluster resources: {0}")]
    InsufficientResources(String),

    #[error("cluster network unreachable: {0}")]
    NetworkUnreachable(String),

    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("failed to delete {kind} {name} in {namespace}: {source}")]
    Cleanup {
        kind: String,
        name: String,
        namespace: String,
        source: PortError,
    },

    #[error("health check failed: {0}")]
    Health(PortError),

    #[error("{0}")]
    Cancelled(PortError),
}

impl EnvironmentError {
    /// Raised by `validate_environment`.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            EnvironmentError::NamespaceMissing { .. }
                | EnvironmentError::InsufficientResources(_)
                | EnvironmentError::NetworkUnreachable(_)
                | EnvironmentError::StorageUnavailable(_)
        )
    }

    /// The port error underneath, if a port call failed.
    pub fn port_error(&self) -> Option<&PortError> {
        match self {
            EnvironmentError::NamespaceCreation { source, .. }
            | EnvironmentError::Apply { source, .. }
            | EnvironmentError::Cleanup { source, .. }
            | EnvironmentError::Health(source)
            | EnvironmentError::Cancelled(source) => Some(source),
            _ => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.port_error().is_some_and(PortError::is_cancelled)
    }
}

pub type EnvironmentResult<T> = Result<T, EnvironmentError>;
