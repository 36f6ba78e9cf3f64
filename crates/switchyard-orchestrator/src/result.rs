//! What a run hands back to its caller.

use serde::{Deserialize, Serialize};
use switchyard_core::{
    Environment, ErrorCategory, ErrorClassification, ReadinessReport, RecoveryResult,
};
use switchyard_release::DeployAction;
use switchyard_rollout::TrafficSwitchPlan;

use crate::state::{DeploymentState, Transition};

/// A release deployed into the target during preparation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeployedRelease {
    pub release: String,
    pub namespace: String,
    pub revision: u32,
    /// Revision to restore on rollback. `None` when this run installed it.
    pub previous_revision: Option<u32>,
    pub action: DeployAction,
}

/// Operator-facing error. Raw tool output stays in the logs unless the
/// failure could not be classified.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportedError {
    #[serde(rename = "type")]
    pub error_type: String,
    pub category: ErrorCategory,
    pub suggestion: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ReportedError {
    pub fn new(classification: &ErrorClassification, raw: &str) -> Self {
        Self {
            error_type: classification.error_type.clone(),
            category: classification.category,
            suggestion: classification.suggestion.clone(),
            message: classification.is_unknown().then(|| raw.to_string()),
        }
    }
}

/// Final record of one orchestration run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentResult {
    pub state: DeploymentState,
    pub plan: TrafficSwitchPlan,
    pub source: Environment,
    pub target: Environment,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub readiness: Option<ReadinessReport>,
    #[serde(default)]
    pub deployed: Vec<DeployedRelease>,
    /// Every recovery action attempted, in order.
    #[serde(default)]
    pub recovery: Vec<RecoveryResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ReportedError>,
    pub transitions: Vec<Transition>,
    pub started_at: u64,
    pub finished_at: u64,
}

impl DeploymentResult {
    pub fn succeeded(&self) -> bool {
        self.state == DeploymentState::Promoted
    }

    /// States visited, starting with `Idle`.
    pub fn path(&self) -> Vec<DeploymentState> {
        let mut path = vec![DeploymentState::Idle];
        path.extend(self.transitions.iter().map(|t| t.to));
        path
    }

    /// Manual steps collected from recovery actions that need an operator.
    pub fn manual_steps(&self) -> Vec<&str> {
        self.recovery
            .iter()
            .flat_map(|r| r.manual_steps.iter().map(String::as_str))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use switchyard_core::Severity;

    fn classification(error_type: &str) -> ErrorClassification {
        ErrorClassification {
            error_type: error_type.to_string(),
            category: ErrorCategory::Network,
            severity: Severity::Medium,
            retriable: true,
            reason: "r".to_string(),
            suggestion: "check connectivity".to_string(),
        }
    }

    #[test]
    fn classified_errors_hide_raw_text() {
        let reported = ReportedError::new(&classification("network_error"), "dial tcp: refused");
        assert_eq!(reported.message, None);
        assert_eq!(reported.suggestion, "check connectivity");
    }

    #[test]
    fn unknown_errors_keep_raw_text() {
        let reported = ReportedError::new(&classification("unknown"), "something odd");
        assert_eq!(reported.message.as_deref(), Some("something odd"));
    }
}
