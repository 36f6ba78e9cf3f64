//! Orchestrator error types.

use switchyard_env::EnvironmentError;
use switchyard_recovery::RecoveryError;
use thiserror::Error;

/// Errors raised while assembling a run. A run itself never errors; its
/// outcome is the terminal state in the [`DeploymentResult`](crate::DeploymentResult).
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("config has no [environment] section")]
    MissingEnvironment,

    #[error("environment {0} is not live (active with full traffic)")]
    SourceNotLive(String),

    #[error(transparent)]
    Environment(#[from] EnvironmentError),

    #[error(transparent)]
    Recovery(#[from] RecoveryError),
}

pub type OrchestratorResult<T> = Result<T, OrchestratorError>;
