//! Switch planner — phase generation per switch type.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use switchyard_core::{BlueGreenStrategy, SwitchType};
use tracing::{info, warn};

use crate::plan::{PlanMetrics, PlanStatus, SwitchPhase, TrafficSwitchPlan};

const GRADUAL_STEPS: [u32; 4] = [25, 50, 75, 100];

/// Canary steps with their share of the time budget. The last step takes
/// whatever is left.
const CANARY_STEPS: [(u32, f64); 5] = [(5, 0.05), (10, 0.10), (25, 0.15), (50, 0.20), (100, 0.0)];

/// Fixed phase count for a switch type.
pub fn phase_count(switch_type: SwitchType) -> u32 {
    match switch_type {
        SwitchType::Instant => 1,
        SwitchType::Gradual => GRADUAL_STEPS.len() as u32,
        SwitchType::Canary => CANARY_STEPS.len() as u32,
    }
}

/// Phases for `switch_type` spread over `total`.
pub fn phases(switch_type: SwitchType, total: Duration) -> Vec<SwitchPhase> {
    match switch_type {
        SwitchType::Instant => vec![SwitchPhase::new(1, 100, Duration::ZERO)],
        SwitchType::Gradual => {
            let n = GRADUAL_STEPS.len() as u32;
            let slice = total / n;
            GRADUAL_STEPS
                .iter()
                .enumerate()
                .map(|(i, percent)| {
                    let last = i + 1 == GRADUAL_STEPS.len();
                    let duration = if last { total - slice * (n - 1) } else { slice };
                    SwitchPhase::new(i as u32 + 1, *percent, duration)
                })
                .collect()
        }
        SwitchType::Canary => {
            let mut used = Duration::ZERO;
            CANARY_STEPS
                .iter()
                .enumerate()
                .map(|(i, (percent, share))| {
                    let last = i + 1 == CANARY_STEPS.len();
                    let duration = if last {
                        total.saturating_sub(used)
                    } else {
                        total.mul_f64(*share)
                    };
                    used += duration;
                    SwitchPhase::new(i as u32 + 1, *percent, duration)
                })
                .collect()
        }
    }
}

/// Build a fresh plan for one orchestration run.
pub fn build_plan(strategy: &BlueGreenStrategy) -> TrafficSwitchPlan {
    let switch = &strategy.switch_strategy;
    let fixed = phase_count(switch.switch_type);
    if let Some(requested) = switch.phase_count {
        if requested != fixed {
            warn!(
                switch_type = %switch.switch_type,
                requested,
                using = fixed,
                "phase_count is advisory; using the fixed phase count"
            );
        }
    }

    let from = &strategy.source_environment.name;
    let to = &strategy.target_environment.name;
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();

    let plan = TrafficSwitchPlan {
        id: format!("switch-{from}-{to}-{millis}"),
        from_environment: from.clone(),
        to_environment: to.clone(),
        switch_type: switch.switch_type,
        phases: phases(switch.switch_type, switch.total_duration),
        start_time: None,
        status: PlanStatus::Planned,
        metrics: PlanMetrics::default(),
    };
    info!(
        plan = %plan.id,
        switch_type = %plan.switch_type,
        phases = plan.phases.len(),
        "switch plan built"
    );
    plan
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [SwitchType; 3] = [SwitchType::Instant, SwitchType::Gradual, SwitchType::Canary];

    #[test]
    fn phase_counts_are_fixed() {
        let total = Duration::from_secs(600);
        assert_eq!(phases(SwitchType::Instant, total).len(), 1);
        assert_eq!(phases(SwitchType::Gradual, total).len(), 4);
        assert_eq!(phases(SwitchType::Canary, total).len(), 5);
    }

    #[test]
    fn percents_are_non_decreasing_and_end_at_100() {
        for total in [Duration::ZERO, Duration::from_secs(7), Duration::from_secs(600)] {
            for switch_type in ALL {
                let phases = phases(switch_type, total);
                assert!(
                    phases
                        .windows(2)
                        .all(|w| w[0].traffic_percent <= w[1].traffic_percent),
                    "{switch_type}"
                );
                assert_eq!(phases.last().map(|p| p.traffic_percent), Some(100));
                assert!(phases.iter().enumerate().all(|(i, p)| p.phase_number == i as u32 + 1));
            }
        }
    }

    #[test]
    fn durations_use_the_whole_budget() {
        let total = Duration::from_secs(601);
        for switch_type in [SwitchType::Gradual, SwitchType::Canary] {
            let sum: Duration = phases(switch_type, total).iter().map(|p| p.duration).sum();
            assert_eq!(sum, total, "{switch_type}");
        }
    }

    #[test]
    fn instant_is_immediate() {
        let phases = phases(SwitchType::Instant, Duration::from_secs(600));
        assert_eq!(phases[0].duration, Duration::ZERO);
    }

    #[test]
    fn gradual_slices_are_equal() {
        let phases = phases(SwitchType::Gradual, Duration::from_secs(240));
        assert!(phases.iter().all(|p| p.duration == Duration::from_secs(60)));
    }

    #[test]
    fn canary_front_loads_short_phases() {
        let phases = phases(SwitchType::Canary, Duration::from_secs(1000));
        let secs: Vec<u64> = phases.iter().map(|p| p.duration.as_secs()).collect();
        assert_eq!(secs, vec![50, 100, 150, 200, 500]);
        let percents: Vec<u32> = phases.iter().map(|p| p.traffic_percent).collect();
        assert_eq!(percents, vec![5, 10, 25, 50, 100]);
    }
}
