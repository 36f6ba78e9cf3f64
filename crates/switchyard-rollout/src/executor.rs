//! Switch executor — drives a plan's phases against live environments.
//!
//! Each phase runs a gate first:
//!
//! ```text
//! release:<name>   every target release is deployed
//! environment      namespaces, capacity, network, storage
//! health           ready-pod ratio at or above the threshold
//! rule:<name>      validation rules against a fresh metrics sample
//! ```
//!
//! A gate that failed because a port call failed is classified, and an
//! automatic retry action (if the advisor has one) reruns the gate. Once
//! the gate passes, the target's traffic weight moves to the phase's
//! percentage and the phase soaks under a health watcher for its duration.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use switchyard_core::{
    BlueGreenStrategy, CheckResult, Environment, EnvironmentState, MetricsSource,
    ReadinessReport, RecoveryActionKind, bounded, epoch_secs,
};
use switchyard_env::{EnvironmentError, EnvironmentManager};
use switchyard_health::{EnvironmentProbe, HealthWatcher};
use switchyard_recovery::{ErrorClassifier, RecoveryAdvisor};
use switchyard_release::ReleaseGateway;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{FailureCause, SwitchError, SwitchResult};
use crate::plan::{PhaseStatus, PlanStatus, TrafficSwitchPlan};
use crate::rules::evaluate_rules;

/// Result of one gate evaluation.
struct Gate {
    report: ReadinessReport,
    /// First port failure seen, as (operation, message).
    port_failure: Option<(String, String)>,
}

/// Executes traffic switch plans.
#[derive(Clone)]
pub struct SwitchExecutor {
    gateway: ReleaseGateway,
    manager: EnvironmentManager,
    metrics: Arc<dyn MetricsSource>,
    classifier: ErrorClassifier,
    advisor: RecoveryAdvisor,
}

impl SwitchExecutor {
    pub fn new(
        gateway: ReleaseGateway,
        manager: EnvironmentManager,
        metrics: Arc<dyn MetricsSource>,
    ) -> Self {
        Self {
            gateway,
            manager,
            metrics,
            classifier: ErrorClassifier::builtin(),
            advisor: RecoveryAdvisor::builtin(),
        }
    }

    pub fn with_recovery(mut self, classifier: ErrorClassifier, advisor: RecoveryAdvisor) -> Self {
        self.classifier = classifier;
        self.advisor = advisor;
        self
    }

    /// Run every phase of `plan` in order against `target`.
    ///
    /// On failure the failing phase and the plan are marked failed, the
    /// target's traffic goes back to the last completed phase's
    /// percentage, and later phases stay waiting. The source environment
    /// is never touched here.
    pub async fn execute(
        &self,
        plan: &mut TrafficSwitchPlan,
        target: &mut Environment,
        strategy: &BlueGreenStrategy,
        cancel: &CancellationToken,
    ) -> SwitchResult<()> {
        if plan.status != PlanStatus::Planned {
            return Err(SwitchError::NotPlanned(plan.status.as_str().to_string()));
        }
        plan.status = PlanStatus::Executing;
        plan.start_time = Some(epoch_secs());
        target.set_state(
            EnvironmentState::Switching,
            &format!("receiving traffic from {}", plan.from_environment),
        );
        info!(
            plan = %plan.id,
            from = %plan.from_environment,
            to = %plan.to_environment,
            phases = plan.phases.len(),
            "traffic switch started"
        );

        for index in 0..plan.phases.len() {
            let phase = plan.phases[index].phase_number;
            let percent = plan.phases[index].traffic_percent;
            match self.run_phase(plan, index, target, strategy, cancel).await {
                Ok(()) => {
                    plan.phases[index].status = PhaseStatus::Completed;
                    plan.metrics.phases_completed += 1;
                    info!(plan = %plan.id, phase, traffic_percent = percent, "phase completed");
                }
                Err(cause) => {
                    plan.phases[index].status = PhaseStatus::Failed;
                    plan.status = PlanStatus::Failed;
                    let revert = plan.last_good_percent();
                    target.set_traffic_percent(revert);
                    warn!(
                        plan = %plan.id,
                        phase,
                        traffic_percent = percent,
                        reverted_to = revert,
                        cause = %cause,
                        "phase failed"
                    );
                    return Err(SwitchError::PhaseFailed {
                        phase,
                        traffic_percent: percent,
                        cause,
                    });
                }
            }
        }

        plan.status = PlanStatus::Completed;
        info!(
            plan = %plan.id,
            success_rate = plan.metrics.success_rate,
            probes = plan.metrics.health_probes,
            "traffic switch completed"
        );
        Ok(())
    }

    async fn run_phase(
        &self,
        plan: &mut TrafficSwitchPlan,
        index: usize,
        target: &mut Environment,
        strategy: &BlueGreenStrategy,
        cancel: &CancellationToken,
    ) -> Result<(), FailureCause> {
        if cancel.is_cancelled() {
            return Err(FailureCause::Cancelled);
        }
        plan.phases[index].status = PhaseStatus::Executing;
        let percent = plan.phases[index].traffic_percent;
        let duration = plan.phases[index].duration;

        let report = self.gate_with_retry(plan, target, strategy, cancel).await?;
        if !report.ready {
            return Err(FailureCause::Gate {
                checks: report.failure_summary(),
            });
        }

        target.set_traffic_percent(percent);
        debug!(environment = %target.name, traffic_percent = percent, "traffic shifted");
        self.soak(plan, index, target, strategy, duration, cancel)
            .await
    }

    async fn gate_with_retry(
        &self,
        plan: &mut TrafficSwitchPlan,
        target: &Environment,
        strategy: &BlueGreenStrategy,
        cancel: &CancellationToken,
    ) -> Result<ReadinessReport, FailureCause> {
        let gate = self.gate(plan, target, strategy, cancel).await?;
        let Some((operation, mut message)) = gate.port_failure else {
            return Ok(gate.report);
        };

        let classification = self.classifier.classify(&message, &operation);
        let retry = self
            .advisor
            .first_automatic(&classification)
            .and_then(|action| match action.kind {
                RecoveryActionKind::Retry {
                    attempts, delay, ..
                } => Some((attempts, delay)),
                _ => None,
            });
        let Some((attempts, delay)) = retry else {
            return Err(FailureCause::Port { operation, message });
        };

        for attempt in 1..=attempts {
            info!(
                plan = %plan.id,
                attempt,
                attempts,
                error_type = %classification.error_type,
                "retrying phase gate"
            );
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(FailureCause::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
            let gate = self.gate(plan, target, strategy, cancel).await?;
            match gate.port_failure {
                None => return Ok(gate.report),
                Some((_, m)) => message = m,
            }
        }
        Err(FailureCause::Port { operation, message })
    }

    async fn gate(
        &self,
        plan: &mut TrafficSwitchPlan,
        target: &Environment,
        strategy: &BlueGreenStrategy,
        cancel: &CancellationToken,
    ) -> Result<Gate, FailureCause> {
        let mut checks = BTreeMap::new();
        let mut port_failure: Option<(String, String)> = None;
        let mut note = |operation: &str, message: &str| {
            port_failure.get_or_insert_with(|| (operation.to_string(), message.to_string()));
        };

        for chart in &target.charts {
            let release = target.release_name(chart);
            let check = match self
                .gateway
                .get_release_status(&release, &target.namespace, cancel)
                .await
            {
                Ok(status) if status.is_deployed() => CheckResult::pass(format!(
                    "revision {}",
                    status.revision().unwrap_or_default()
                )),
                Ok(status) => match status.info {
                    Some(info) => CheckResult::fail(format!("release is {}", info.status.as_str())),
                    None => CheckResult::fail("release not found"),
                },
                Err(e) if e.is_cancelled() => return Err(FailureCause::Cancelled),
                Err(e) => {
                    note("status", &e.to_string());
                    CheckResult::fail(e.to_string())
                }
            };
            checks.insert(format!("release:{release}"), check);
        }

        let environment = match self.manager.validate_environment(target, cancel).await {
            Ok(()) => CheckResult::pass("validated"),
            Err(e) if e.is_cancelled() => return Err(FailureCause::Cancelled),
            Err(e) => {
                if e.port_error().is_some() || matches!(e, EnvironmentError::NetworkUnreachable(_))
                {
                    note("validate", &e.to_string());
                }
                CheckResult::fail(e.to_string())
            }
        };
        checks.insert("environment".to_string(), environment);

        let threshold = strategy.rollback_strategy.health_threshold_percent;
        let timeout = strategy.health_check_strategy.timeout;
        let check = tokio::time::timeout(timeout, self.manager.check_health(target, threshold));
        let checked = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(FailureCause::Cancelled),
            checked = check => checked,
        };
        let health = match checked {
            Ok(Ok(h)) if h.healthy => {
                CheckResult::pass(format!("{}/{} pods ready", h.ready_pods, h.total_pods))
            }
            Ok(Ok(h)) => CheckResult::fail(format!(
                "{}% pods ready, below {threshold}%",
                h.ready_percent
            )),
            Ok(Err(e)) => {
                note("health", &e.to_string());
                CheckResult::fail(e.to_string())
            }
            Err(_) => {
                let message = format!(
                    "operation timed out: health check after {}",
                    switchyard_core::format_duration(timeout)
                );
                note("health", &message);
                CheckResult::fail(message)
            }
        };
        checks.insert("health".to_string(), health);

        if !strategy.validation_rules.is_empty() {
            match bounded("metrics sample", timeout, cancel, self.metrics.sample(target)).await {
                Ok(sample) => {
                    checks.extend(evaluate_rules(&strategy.validation_rules, &sample));
                    plan.metrics.last_sample = sample;
                }
                Err(e) if e.is_cancelled() => return Err(FailureCause::Cancelled),
                Err(e) => {
                    note("metrics", &e.to_string());
                    checks.insert("metrics".to_string(), CheckResult::fail(e.to_string()));
                }
            }
        }

        let report = ReadinessReport::from_checks(checks);
        debug!(plan = %plan.id, ready = report.ready, "phase gate evaluated");
        Ok(Gate {
            report,
            port_failure,
        })
    }

    async fn soak(
        &self,
        plan: &mut TrafficSwitchPlan,
        index: usize,
        target: &Environment,
        strategy: &BlueGreenStrategy,
        duration: Duration,
        cancel: &CancellationToken,
    ) -> Result<(), FailureCause> {
        if duration.is_zero() {
            return Ok(());
        }
        let hc = &strategy.health_check_strategy;
        let probe = Arc::new(EnvironmentProbe::new(
            self.manager.clone(),
            target.clone(),
            strategy.rollback_strategy.health_threshold_percent,
            hc.timeout,
        ));
        let label = format!("{}/phase-{}", plan.id, plan.phases[index].phase_number);
        let mut handle = HealthWatcher::new(hc.interval, hc.failure_threshold).start(
            &label,
            probe,
            cancel,
        );

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(FailureCause::Cancelled),
            _ = handle.tripped() => Err(FailureCause::Unhealthy),
            _ = tokio::time::sleep(duration) => Ok(()),
        };
        let summary = handle.stop().await;
        plan.record_probes(summary.probes, summary.success_rate);
        outcome
    }
}
