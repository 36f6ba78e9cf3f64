//! Orchestration states and the transition log.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentState {
    Idle,
    ValidatingReadiness,
    PreparingEnvironments,
    SwitchingTraffic,
    ConfirmingHealth,
    /// Terminal: the target is live and the old source is standby.
    Promoted,
    /// Terminal: traffic went back to the source.
    RolledBack,
    /// Terminal: the run stopped and needs an operator.
    Failed,
}

impl DeploymentState {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeploymentState::Idle => "idle",
            DeploymentState::ValidatingReadiness => "validating_readiness",
            DeploymentState::PreparingEnvironments => "preparing_environments",
            DeploymentState::SwitchingTraffic => "switching_traffic",
            DeploymentState::ConfirmingHealth => "confirming_health",
            DeploymentState::Promoted => "promoted",
            DeploymentState::RolledBack => "rolled_back",
            DeploymentState::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DeploymentState::Promoted | DeploymentState::RolledBack | DeploymentState::Failed
        )
    }
}

impl fmt::Display for DeploymentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry in a run's transition log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    pub from: DeploymentState,
    pub to: DeploymentState,
    /// Unix seconds.
    pub at: u64,
}
