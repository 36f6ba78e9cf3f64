//! Traffic switch plan — the mutable execution record of one switch.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use switchyard_core::{MetricsSample, SwitchType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    Planned,
    Executing,
    Completed,
    Failed,
    RolledBack,
}

impl PlanStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PlanStatus::Completed | PlanStatus::RolledBack)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PlanStatus::Planned => "planned",
            PlanStatus::Executing => "executing",
            PlanStatus::Completed => "completed",
            PlanStatus::Failed => "failed",
            PlanStatus::RolledBack => "rolled_back",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseStatus {
    Waiting,
    Executing,
    Completed,
    Failed,
}

/// One step of a switch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwitchPhase {
    /// 1-based.
    pub phase_number: u32,
    /// Share of live traffic routed to the target during this phase.
    pub traffic_percent: u32,
    /// Soak time under health watch.
    #[serde(with = "switchyard_core::duration::serde_str")]
    pub duration: Duration,
    pub status: PhaseStatus,
}

impl SwitchPhase {
    pub fn new(phase_number: u32, traffic_percent: u32, duration: Duration) -> Self {
        Self {
            phase_number,
            traffic_percent,
            duration,
            status: PhaseStatus::Waiting,
        }
    }
}

/// Observations gathered while the plan ran.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PlanMetrics {
    /// Healthy share of all health probes so far.
    pub success_rate: f64,
    pub health_probes: u32,
    /// Most recent metrics sample taken at a phase gate.
    pub last_sample: MetricsSample,
    pub phases_completed: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrafficSwitchPlan {
    pub id: String,
    /// Environment name traffic moves away from.
    pub from_environment: String,
    /// Environment name traffic moves to.
    pub to_environment: String,
    pub switch_type: SwitchType,
    pub phases: Vec<SwitchPhase>,
    /// Unix seconds when execution started.
    pub start_time: Option<u64>,
    pub status: PlanStatus,
    pub metrics: PlanMetrics,
}

impl TrafficSwitchPlan {
    /// Traffic percent of the last completed phase; 0 before any.
    pub fn last_good_percent(&self) -> u32 {
        self.phases
            .iter()
            .rev()
            .find(|p| p.status == PhaseStatus::Completed)
            .map(|p| p.traffic_percent)
            .unwrap_or(0)
    }

    pub fn failed_phase(&self) -> Option<&SwitchPhase> {
        self.phases.iter().find(|p| p.status == PhaseStatus::Failed)
    }

    pub fn total_duration(&self) -> Duration {
        self.phases.iter().map(|p| p.duration).sum()
    }

    /// Fold a watcher's results into the running success rate.
    pub(crate) fn record_probes(&mut self, probes: u32, success_rate: f64) {
        let before = self.metrics.health_probes;
        let total = before + probes;
        if total == 0 {
            return;
        }
        let healthy =
            self.metrics.success_rate * f64::from(before) + success_rate * f64::from(probes);
        self.metrics.success_rate = healthy / f64::from(total);
        self.metrics.health_probes = total;
    }
}
