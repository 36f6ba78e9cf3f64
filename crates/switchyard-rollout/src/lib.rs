//! switchyard-rollout — moving traffic from one environment to another.
//!
//! The planner turns a [`BlueGreenStrategy`](switchyard_core::BlueGreenStrategy)
//! into a [`TrafficSwitchPlan`] of phases with non-decreasing traffic
//! percentages ending at 100. The executor drives those phases strictly in
//! order, gating each on release status, environment validation, health,
//! and validation rules, then soaking under a health watcher.

pub mod error;
pub mod executor;
pub mod plan;
pub mod planner;
pub mod rules;

pub use error::{FailureCause, SwitchError, SwitchResult};
pub use executor::SwitchExecutor;
pub use plan::{PhaseStatus, PlanMetrics, PlanStatus, SwitchPhase, TrafficSwitchPlan};
pub use planner::build_plan;
pub use rules::evaluate_rules;
