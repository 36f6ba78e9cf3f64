//! Blue-Green orchestrator — one run from readiness to promote or rollback.

use std::sync::Arc;
use std::time::Instant;

use switchyard_core::config::{ReadinessConfig, SwitchyardConfig};
use switchyard_core::{
    BlueGreenStrategy, ClusterPort, Environment, EnvironmentState, ErrorClassification,
    HealthState, MetricsSource, Priority, RecoveryAction, RecoveryActionKind, ReleasePort,
    epoch_secs,
};
use switchyard_env::EnvironmentManager;
use switchyard_health::{EnvironmentProbe, HealthProbe, HealthTracker, HealthVerdict};
use switchyard_recovery::{
    ErrorClassifier, ErrorContext, FailedOperation, RecoveryAdvisor, RecoveryExecutor,
};
use switchyard_release::{DeployAction, DeployOptions, ReleaseGateway};
use switchyard_rollout::{PlanStatus, SwitchExecutor, TrafficSwitchPlan, build_plan};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::error::{OrchestratorError, OrchestratorResult};
use crate::readiness::SystemReadiness;
use crate::result::{DeployedRelease, DeploymentResult, ReportedError};
use crate::state::{DeploymentState, Transition};

/// Mutable record of a run in progress. Owned by one `run` call.
struct Run {
    state: DeploymentState,
    transitions: Vec<Transition>,
    plan: TrafficSwitchPlan,
    source: Environment,
    target: Environment,
    readiness: Option<switchyard_core::ReadinessReport>,
    deployed: Vec<DeployedRelease>,
    recovery: Vec<switchyard_core::RecoveryResult>,
    error: Option<ReportedError>,
    started_at: u64,
}

impl Run {
    fn new(strategy: &BlueGreenStrategy) -> Self {
        Self {
            state: DeploymentState::Idle,
            transitions: Vec::new(),
            plan: build_plan(strategy),
            source: strategy.source_environment.clone(),
            target: strategy.target_environment.clone(),
            readiness: None,
            deployed: Vec::new(),
            recovery: Vec::new(),
            error: None,
            started_at: epoch_secs(),
        }
    }

    fn advance(&mut self, to: DeploymentState) {
        let from = self.state;
        self.transitions.push(Transition {
            from,
            to,
            at: epoch_secs(),
        });
        self.state = to;
        info!(
            plan = %self.plan.id,
            from = %from,
            to = %to,
            source = %self.source.name,
            target = %self.target.name,
            "deployment state transition"
        );
    }

    fn finish(mut self, to: DeploymentState) -> DeploymentResult {
        if to == DeploymentState::Failed {
            self.settle_target();
        }
        self.advance(to);
        let error_type = self.error.as_ref().map(|e| e.error_type.as_str()).unwrap_or("none");
        match to {
            DeploymentState::Promoted => {
                info!(plan = %self.plan.id, target = %self.target.name, "deployment promoted")
            }
            DeploymentState::RolledBack => {
                warn!(plan = %self.plan.id, error_type, "deployment rolled back")
            }
            _ => error!(plan = %self.plan.id, error_type, "deployment failed"),
        }
        DeploymentResult {
            state: self.state,
            plan: self.plan,
            source: self.source,
            target: self.target,
            readiness: self.readiness,
            deployed: self.deployed,
            recovery: self.recovery,
            error: self.error,
            transitions: self.transitions,
            started_at: self.started_at,
            finished_at: epoch_secs(),
        }
    }

    /// A failed run leaves the source live. The target may keep a partial
    /// split but never full traffic, and never stays `Switching`.
    fn settle_target(&mut self) {
        let weight = self.target.traffic_config.weight;
        if weight >= 100 {
            self.target.set_traffic_percent(0);
            self.target.status.health = HealthState::Degraded;
            self.target.set_state(
                EnvironmentState::Standby,
                "failed after switch, out of rotation for inspection",
            );
            warn!(
                plan = %self.plan.id,
                target = %self.target.name,
                source = %self.source.name,
                "target taken out of rotation, source keeps full traffic"
            );
        } else if self.target.status.state == EnvironmentState::Switching {
            if weight == 0 {
                self.target
                    .set_state(EnvironmentState::Standby, "switch failed before traffic moved");
            } else {
                let message = format!("switch halted at {weight}%, the last good split");
                self.target.set_state(EnvironmentState::Active, &message);
            }
        }
    }
}

/// Drives Blue-Green runs over the cluster, release, and metrics ports.
#[derive(Clone)]
pub struct BlueGreenOrchestrator {
    gateway: ReleaseGateway,
    manager: EnvironmentManager,
    switcher: SwitchExecutor,
    readiness: SystemReadiness,
    classifier: ErrorClassifier,
    advisor: RecoveryAdvisor,
    recovery: RecoveryExecutor,
}

impl BlueGreenOrchestrator {
    pub fn new(
        cluster: Arc<dyn ClusterPort>,
        releases: Arc<dyn ReleasePort>,
        metrics: Arc<dyn MetricsSource>,
    ) -> Self {
        let gateway = ReleaseGateway::new(releases);
        let manager = EnvironmentManager::new(cluster.clone());
        Self {
            switcher: SwitchExecutor::new(gateway.clone(), manager.clone(), metrics),
            readiness: SystemReadiness::new(cluster, gateway.clone(), ReadinessConfig::default()),
            classifier: ErrorClassifier::builtin(),
            advisor: RecoveryAdvisor::builtin(),
            recovery: RecoveryExecutor::new(gateway.clone()),
            gateway,
            manager,
        }
    }

    /// Wire classifier patterns, advisor overrides, and readiness inputs
    /// from a loaded config.
    pub fn from_config(
        config: &SwitchyardConfig,
        cluster: Arc<dyn ClusterPort>,
        releases: Arc<dyn ReleasePort>,
        metrics: Arc<dyn MetricsSource>,
    ) -> OrchestratorResult<Self> {
        let classifier = ErrorClassifier::with_patterns(&config.error_patterns)?;
        let advisor = RecoveryAdvisor::with_overrides(&config.recovery);
        let mut orchestrator =
            Self::new(cluster.clone(), releases, metrics).with_recovery(classifier, advisor);
        orchestrator.readiness = SystemReadiness::new(
            cluster,
            orchestrator.gateway.clone(),
            config.readiness.clone(),
        );
        Ok(orchestrator)
    }

    pub fn with_recovery(mut self, classifier: ErrorClassifier, advisor: RecoveryAdvisor) -> Self {
        self.switcher = self
            .switcher
            .with_recovery(classifier.clone(), advisor.clone());
        self.classifier = classifier;
        self.advisor = advisor;
        self
    }

    pub fn environments(&self) -> &EnvironmentManager {
        &self.manager
    }

    /// Create the environment opposite `current` from the config template
    /// and assemble the strategy for switching to it.
    pub async fn build_strategy(
        &self,
        config: &SwitchyardConfig,
        current: &Environment,
        cancel: &CancellationToken,
    ) -> OrchestratorResult<BlueGreenStrategy> {
        if !current.is_live() {
            return Err(OrchestratorError::SourceNotLive(current.name.clone()));
        }
        let template = config
            .environment
            .as_ref()
            .ok_or(OrchestratorError::MissingEnvironment)?;
        let target = self
            .manager
            .create_environment(current.kind.opposite(), template, cancel)
            .await?;
        info!(source = %current.name, target = %target.name, "strategy built");

        Ok(BlueGreenStrategy {
            source_environment: current.clone(),
            target_environment: target,
            switch_strategy: config.switch.clone(),
            health_check_strategy: config.health.clone(),
            rollback_strategy: config.rollback.clone(),
            validation_rules: config.validation_rules.clone(),
            monitoring_config: config.monitoring.clone(),
        })
    }

    /// Run one deployment to a terminal state.
    ///
    /// The source environment stays `Active` with full traffic unless the
    /// run ends `Promoted`.
    pub async fn run(
        &self,
        strategy: &BlueGreenStrategy,
        cancel: &CancellationToken,
    ) -> DeploymentResult {
        let mut run = Run::new(strategy);
        info!(
            plan = %run.plan.id,
            source = %run.source.name,
            target = %run.target.name,
            switch_type = %strategy.switch_strategy.switch_type,
            "blue-green deployment started"
        );

        run.advance(DeploymentState::ValidatingReadiness);
        let report = self.readiness.check(strategy, cancel).await;
        let ready = report.ready;
        let summary = report.failure_summary();
        run.readiness = Some(report);
        if !ready {
            self.fail(&mut run, &summary, "readiness");
            return run.finish(DeploymentState::Failed);
        }

        run.advance(DeploymentState::PreparingEnvironments);
        if !self.prepare(&mut run, cancel).await {
            return run.finish(DeploymentState::Failed);
        }

        run.advance(DeploymentState::SwitchingTraffic);
        let switched = self
            .switcher
            .execute(&mut run.plan, &mut run.target, strategy, cancel)
            .await;
        if let Err(e) = switched {
            self.fail(&mut run, &e.to_string(), "switch");
            return self.roll_back_or_fail(run, strategy).await;
        }

        run.advance(DeploymentState::ConfirmingHealth);
        let switched_at = Instant::now();
        match self.confirm_health(&run.target, strategy, cancel).await {
            Ok(()) => {
                promote(&mut run);
                run.finish(DeploymentState::Promoted)
            }
            Err(message) => {
                self.fail(&mut run, &message, "confirm_health");
                let window = strategy.rollback_strategy.rollback_timeout;
                if switched_at.elapsed() > window {
                    warn!(plan = %run.plan.id, ?window, "health failure outside the rollback window");
                    return run.finish(DeploymentState::Failed);
                }
                self.roll_back_or_fail(run, strategy).await
            }
        }
    }

    /// Classify a failure and record it as the run's reported error.
    fn fail(&self, run: &mut Run, message: &str, operation: &str) -> ErrorClassification {
        let classification = self.classifier.classify(message, operation);
        run.error = Some(ReportedError::new(&classification, message));
        classification
    }

    // ── Preparation ──────────────────────────────────────────────

    /// Validate both sides, then deploy every target chart. Deploy
    /// failures go through the recovery engine.
    async fn prepare(&self, run: &mut Run, cancel: &CancellationToken) -> bool {
        let sides = [run.source.clone(), run.target.clone()];
        for env in &sides {
            if let Err(e) = self.manager.validate_environment(env, cancel).await {
                let message = format!("{}: {e}", env.name);
                self.fail(run, &message, "validate");
                return false;
            }
        }

        let charts = run.target.charts.clone();
        let namespace = run.target.namespace.clone();
        for chart in &charts {
            let release = run.target.release_name(chart);
            let options = DeployOptions::new(&namespace).release_name(&release);
            let err = match self.gateway.deploy_chart(chart, &options, cancel).await {
                Ok(deployed) => {
                    run.deployed.push(DeployedRelease {
                        release: deployed.release_name,
                        namespace: deployed.namespace,
                        revision: deployed.revision,
                        previous_revision: deployed.previous_revision,
                        action: deployed.action,
                    });
                    continue;
                }
                Err(e) => e,
            };

            let classification = self.fail(run, &err.to_string(), "deploy");
            if err.is_cancelled() {
                return false;
            }
            let ctx = ErrorContext {
                operation: FailedOperation::Deploy {
                    chart: chart.clone(),
                    options,
                },
                release: release.clone(),
                namespace: namespace.clone(),
                previous_revision: None,
            };
            if !self.recover(run, &classification, &ctx, cancel).await {
                return false;
            }

            match self
                .gateway
                .get_release_status(&release, &namespace, cancel)
                .await
            {
                Ok(status) => {
                    let Some(info) = status.info else {
                        self.fail(run, &format!("release {release} missing after recovery"), "deploy");
                        return false;
                    };
                    run.deployed.push(DeployedRelease {
                        release,
                        namespace: namespace.clone(),
                        revision: info.revision,
                        previous_revision: info.revision.checked_sub(1).filter(|r| *r > 0),
                        action: if info.revision > 1 {
                            DeployAction::Upgraded
                        } else {
                            DeployAction::Installed
                        },
                    });
                    run.error = None;
                }
                Err(e) => {
                    self.fail(run, &e.to_string(), "status");
                    return false;
                }
            }
        }
        true
    }

    /// Run the advisor's first automatic action, or its manual fallback so
    /// the steps reach the operator. True when the failure was recovered.
    async fn recover(
        &self,
        run: &mut Run,
        classification: &ErrorClassification,
        ctx: &ErrorContext,
        cancel: &CancellationToken,
    ) -> bool {
        let actions = self.advisor.suggest(classification);
        let chosen = actions
            .iter()
            .find(|a| a.is_automatic())
            .or_else(|| {
                actions
                    .iter()
                    .find(|a| matches!(a.kind, RecoveryActionKind::Manual))
            });
        let Some(action) = chosen else {
            warn!(
                error_type = %classification.error_type,
                release = %ctx.release,
                "every recovery action needs confirmation"
            );
            return false;
        };

        let result = self.recovery.execute(action, ctx, cancel).await;
        let recovered = result.success;
        run.recovery.push(result);
        recovered
    }

    // ── Health confirmation ──────────────────────────────────────

    /// Probe the new live environment until it is healthy or the
    /// consecutive-failure threshold is hit.
    async fn confirm_health(
        &self,
        target: &Environment,
        strategy: &BlueGreenStrategy,
        cancel: &CancellationToken,
    ) -> Result<(), String> {
        let hc = &strategy.health_check_strategy;
        let probe = EnvironmentProbe::new(
            self.manager.clone(),
            target.clone(),
            strategy.rollback_strategy.health_threshold_percent,
            hc.timeout,
        );
        let mut tracker = HealthTracker::new(hc.failure_threshold);

        loop {
            match tracker.record(probe.probe().await) {
                HealthVerdict::Healthy => return Ok(()),
                HealthVerdict::Unhealthy => {
                    return Err(format!(
                        "{} unhealthy after switch: {} consecutive failed health checks",
                        target.name,
                        tracker.consecutive_failures()
                    ));
                }
                HealthVerdict::Unknown => {}
            }
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return Err(format!("health confirmation of {} cancelled", target.name));
                }
                _ = tokio::time::sleep(hc.interval) => {}
            }
        }
    }

    // ── Rollback ─────────────────────────────────────────────────

    async fn roll_back_or_fail(
        &self,
        mut run: Run,
        strategy: &BlueGreenStrategy,
    ) -> DeploymentResult {
        if !strategy.rollback_strategy.auto_rollback {
            warn!(
                plan = %run.plan.id,
                traffic_percent = run.target.traffic_config.weight,
                "auto rollback disabled, traffic left at last good split"
            );
            return run.finish(DeploymentState::Failed);
        }
        if self.roll_back(&mut run, strategy).await {
            run.finish(DeploymentState::RolledBack)
        } else {
            run.finish(DeploymentState::Failed)
        }
    }

    /// Restore every upgraded release to its previous revision and take the
    /// target out of rotation. Runs under its own deadline so a cancelled
    /// run still rolls back.
    async fn roll_back(&self, run: &mut Run, strategy: &BlueGreenStrategy) -> bool {
        let limit = strategy.rollback_strategy.rollback_timeout;
        let deadline = CancellationToken::new();
        let timer = {
            let deadline = deadline.clone();
            tokio::spawn(async move {
                tokio::time::sleep(limit).await;
                deadline.cancel();
            })
        };

        info!(plan = %run.plan.id, releases = run.deployed.len(), ?limit, "rolling back");
        let mut restored = true;
        for release in run.deployed.clone() {
            let Some(previous) = release.previous_revision else {
                info!(
                    release = %release.release,
                    namespace = %release.namespace,
                    "release installed by this run, nothing to roll back to"
                );
                continue;
            };
            let action = RecoveryAction {
                kind: RecoveryActionKind::Rollback {
                    revision: Some(previous),
                },
                priority: Priority::High,
                description: format!("Roll {} back to revision {previous}", release.release),
                command: format!(
                    "helm rollback {} {previous} -n {} --wait",
                    release.release, release.namespace
                ),
                auto_retry: true,
                requires_confirmation: false,
            };
            let ctx = ErrorContext {
                operation: FailedOperation::Rollback { revision: previous },
                release: release.release.clone(),
                namespace: release.namespace.clone(),
                previous_revision: Some(previous),
            };
            let result = self.recovery.execute(&action, &ctx, &deadline).await;
            restored &= result.success;
            run.recovery.push(result);
        }
        timer.abort();

        run.target.set_traffic_percent(0);
        run.target
            .set_state(EnvironmentState::Standby, "rolled back, retained for inspection");
        if restored {
            run.plan.status = PlanStatus::RolledBack;
        } else {
            error!(plan = %run.plan.id, "rollback incomplete, manual action required");
        }
        restored
    }
}

/// Target goes live; the old source is kept as the rollback target.
fn promote(run: &mut Run) {
    run.target.set_traffic_percent(100);
    run.target.status.health = HealthState::Healthy;
    run.target
        .set_state(EnvironmentState::Active, "promoted to production");
    run.source.set_traffic_percent(0);
    run.source.set_state(
        EnvironmentState::Standby,
        "previous production, now standby for rollback",
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use switchyard_core::memory::{InMemoryCluster, InMemoryReleases, StaticMetrics};
    use switchyard_core::{EnvironmentKind, TrafficLevel};

    fn orchestrator(cluster: &InMemoryCluster) -> BlueGreenOrchestrator {
        BlueGreenOrchestrator::new(
            Arc::new(cluster.clone()),
            Arc::new(InMemoryReleases::new()),
            Arc::new(StaticMetrics::healthy()),
        )
    }

    fn live_blue() -> Environment {
        let config = SwitchyardConfig::scaffold("shop");
        let template = config.environment.unwrap();
        let mut env = Environment {
            name: "blue-1".to_string(),
            kind: EnvironmentKind::Blue,
            namespace: "shop-blue".to_string(),
            namespaces: vec!["shop-blue".to_string()],
            charts: template.charts,
            resource_limits: template.resource_limits,
            traffic_config: template.traffic,
            data_stores: vec![],
            monitoring_labels: Default::default(),
            secrets: vec![],
            status: switchyard_core::EnvironmentStatus::pending(),
        };
        env.set_state(EnvironmentState::Active, "live");
        env.set_traffic_percent(100);
        env
    }

    #[tokio::test]
    async fn build_strategy_creates_the_opposite_environment() {
        let cluster = InMemoryCluster::new();
        let config = SwitchyardConfig::scaffold("shop");
        let strategy = orchestrator(&cluster)
            .build_strategy(&config, &live_blue(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(strategy.target_environment.kind, EnvironmentKind::Green);
        assert_eq!(strategy.target_environment.status.traffic, TrafficLevel::None);
        assert!(cluster.has_namespace("shop-green").await);
        assert_eq!(strategy.switch_strategy, config.switch);
        assert_eq!(strategy.validation_rules, config.validation_rules);
    }

    #[tokio::test]
    async fn build_strategy_needs_a_live_source() {
        let cluster = InMemoryCluster::new();
        let mut idle = live_blue();
        idle.set_traffic_percent(0);
        let err = orchestrator(&cluster)
            .build_strategy(&SwitchyardConfig::scaffold("shop"), &idle, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::SourceNotLive(_)));
    }

    #[tokio::test]
    async fn build_strategy_needs_an_environment_template() {
        let cluster = InMemoryCluster::new();
        let mut config = SwitchyardConfig::scaffold("shop");
        config.environment = None;
        let err = orchestrator(&cluster)
            .build_strategy(&config, &live_blue(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::MissingEnvironment));
    }
}
