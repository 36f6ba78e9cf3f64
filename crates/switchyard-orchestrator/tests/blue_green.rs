//! End-to-end Blue-Green runs against the in-memory ports.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use switchyard_core::config::{RecoveryRuleConfig, SwitchyardConfig};
use switchyard_core::memory::{InMemoryCluster, InMemoryReleases, StaticMetrics};
use switchyard_core::{
    BlueGreenStrategy, ChartRef, Environment, EnvironmentKind, EnvironmentState,
    EnvironmentStatus, HealthCheckStrategy, MonitoringConfig, PortError, Priority,
    RecoveryAction, RecoveryActionKind, ReleasePort, ResourceLimits, RollbackStrategy, RuleAction,
    SwitchStrategy, SwitchType, TrafficConfig, TrafficLevel, ValidationRule,
};
use switchyard_orchestrator::{BlueGreenOrchestrator, DeploymentState};
use switchyard_release::DeployAction;
use switchyard_rollout::{PhaseStatus, PlanStatus};
use tokio_util::sync::CancellationToken;

const BLUE_NS: &str = "shop-blue";
const GREEN_NS: &str = "shop-green";

struct Harness {
    cluster: InMemoryCluster,
    releases: InMemoryReleases,
    metrics: StaticMetrics,
}

impl Harness {
    async fn new() -> Self {
        let cluster = InMemoryCluster::new();
        for ns in [BLUE_NS, GREEN_NS] {
            cluster.add_namespace(ns).await;
            cluster.set_pods(ns, 4, 4).await;
        }
        let releases = InMemoryReleases::new();
        releases.seed("web-blue", BLUE_NS, "web", "1.0.0", 4).await;
        releases.seed("web-green", GREEN_NS, "web", "1.0.0", 1).await;
        Self {
            cluster,
            releases,
            metrics: StaticMetrics::healthy(),
        }
    }

    fn orchestrator(&self) -> BlueGreenOrchestrator {
        BlueGreenOrchestrator::new(
            Arc::new(self.cluster.clone()),
            Arc::new(self.releases.clone()),
            Arc::new(self.metrics.clone()),
        )
    }
}

fn environment(name: &str, kind: EnvironmentKind, namespace: &str) -> Environment {
    Environment {
        name: name.to_string(),
        kind,
        namespace: namespace.to_string(),
        namespaces: vec![namespace.to_string()],
        charts: vec![ChartRef::new("web", "1.1.0")],
        resource_limits: ResourceLimits::default(),
        traffic_config: TrafficConfig {
            load_balancer: format!("{namespace}-lb"),
            ingress_class: "nginx".to_string(),
            annotations: BTreeMap::new(),
            weight: 0,
        },
        data_stores: vec![],
        monitoring_labels: BTreeMap::new(),
        secrets: vec![],
        status: EnvironmentStatus::pending(),
    }
}

fn strategy(switch_type: SwitchType, total: Duration) -> BlueGreenStrategy {
    let mut source = environment("blue-1", EnvironmentKind::Blue, BLUE_NS);
    source.set_state(EnvironmentState::Active, "live");
    source.set_traffic_percent(100);
    BlueGreenStrategy {
        source_environment: source,
        target_environment: environment("green-2", EnvironmentKind::Green, GREEN_NS),
        switch_strategy: SwitchStrategy {
            switch_type,
            total_duration: total,
            phase_count: None,
        },
        health_check_strategy: HealthCheckStrategy {
            interval: Duration::from_millis(5),
            timeout: Duration::from_secs(1),
            failure_threshold: 2,
        },
        rollback_strategy: RollbackStrategy::default(),
        validation_rules: vec![ValidationRule::new(
            "error-rate",
            "error_rate < 0.1",
            RuleAction::Rollback,
        )],
        monitoring_config: MonitoringConfig::default(),
    }
}

fn assert_source_untouched(source: &Environment) {
    assert_eq!(source.status.traffic, TrafficLevel::Full);
    assert_eq!(source.status.state, EnvironmentState::Active);
}

#[tokio::test]
async fn healthy_gradual_switch_is_promoted() {
    let h = Harness::new().await;
    let strategy = strategy(SwitchType::Gradual, Duration::from_millis(40));
    let result = h.orchestrator().run(&strategy, &CancellationToken::new()).await;

    assert_eq!(result.state, DeploymentState::Promoted, "{:?}", result.error);
    assert_eq!(
        result.path(),
        vec![
            DeploymentState::Idle,
            DeploymentState::ValidatingReadiness,
            DeploymentState::PreparingEnvironments,
            DeploymentState::SwitchingTraffic,
            DeploymentState::ConfirmingHealth,
            DeploymentState::Promoted,
        ]
    );
    assert_eq!(result.plan.status, PlanStatus::Completed);

    assert_eq!(result.target.status.traffic, TrafficLevel::Full);
    assert_eq!(result.target.status.state, EnvironmentState::Active);
    assert_eq!(result.source.status.traffic, TrafficLevel::None);
    assert_eq!(result.source.status.state, EnvironmentState::Standby);
    assert_eq!(
        result.source.status.message,
        "previous production, now standby for rollback"
    );

    assert_eq!(result.deployed.len(), 1);
    assert_eq!(result.deployed[0].release, "web-green");
    assert_eq!(result.deployed[0].action, DeployAction::Upgraded);
    assert_eq!(result.deployed[0].revision, 2);
    assert_eq!(result.deployed[0].previous_revision, Some(1));
    assert!(result.error.is_none());
    assert!(result.succeeded());
}

#[tokio::test]
async fn canary_failing_at_phase_three_is_rolled_back() {
    let h = Harness::new().await;
    // One pod listing per phase gate when phases have no soak time.
    h.cluster.degrade_pods_after(GREEN_NS, 2).await;
    let strategy = strategy(SwitchType::Canary, Duration::ZERO);
    let result = h.orchestrator().run(&strategy, &CancellationToken::new()).await;

    assert_eq!(result.state, DeploymentState::RolledBack);
    assert_eq!(result.plan.status, PlanStatus::RolledBack);
    let phases = &result.plan.phases;
    assert_eq!(phases.len(), 5);
    assert_eq!(phases[2].traffic_percent, 25);
    assert_eq!(phases[2].status, PhaseStatus::Failed);
    assert!(phases[3..].iter().all(|p| p.status != PhaseStatus::Completed));

    assert_source_untouched(&result.source);
    assert_eq!(result.target.status.traffic, TrafficLevel::None);
    assert_eq!(result.target.status.state, EnvironmentState::Standby);

    assert_eq!(result.recovery.len(), 1);
    assert!(result.recovery[0].success);
    assert_eq!(result.recovery[0].action.kind.name(), "rollback");
    let current = h.releases.current("web-green", GREEN_NS).await.unwrap();
    assert_eq!(current.revision, 3);
    assert_eq!(current.version, "1.0.0");
}

#[tokio::test]
async fn without_auto_rollback_the_failure_pins_traffic() {
    let h = Harness::new().await;
    h.cluster.degrade_pods_after(GREEN_NS, 2).await;
    let mut strategy = strategy(SwitchType::Canary, Duration::ZERO);
    strategy.rollback_strategy.auto_rollback = false;
    let result = h.orchestrator().run(&strategy, &CancellationToken::new()).await;

    assert_eq!(result.state, DeploymentState::Failed);
    assert_eq!(result.plan.status, PlanStatus::Failed);
    assert_eq!(result.target.traffic_config.weight, 10);
    assert_eq!(result.target.status.traffic, TrafficLevel::Partial);
    assert_eq!(result.target.status.state, EnvironmentState::Active);
    assert_source_untouched(&result.source);
    assert!(result.recovery.is_empty());
    assert_eq!(
        h.releases.current("web-green", GREEN_NS).await.unwrap().revision,
        2
    );
}

#[tokio::test]
async fn freshly_installed_release_is_not_rolled_back() {
    let h = Harness::new().await;
    h.releases
        .uninstall("web-green", GREEN_NS, Duration::ZERO)
        .await
        .unwrap();
    h.cluster.degrade_pods_after(GREEN_NS, 2).await;
    let strategy = strategy(SwitchType::Canary, Duration::ZERO);
    let result = h.orchestrator().run(&strategy, &CancellationToken::new()).await;

    assert_eq!(result.deployed[0].action, DeployAction::Installed);
    assert_eq!(result.deployed[0].previous_revision, None);
    assert_eq!(result.state, DeploymentState::RolledBack);
    assert!(result.recovery.is_empty());
    assert_eq!(result.target.status.traffic, TrafficLevel::None);
    assert_source_untouched(&result.source);
}

#[tokio::test]
async fn health_failure_after_switch_rolls_back() {
    let h = Harness::new().await;
    // The single gate passes; confirmation then sees crash-looping pods.
    h.cluster.degrade_pods_after(GREEN_NS, 1).await;
    let strategy = strategy(SwitchType::Instant, Duration::ZERO);
    let result = h.orchestrator().run(&strategy, &CancellationToken::new()).await;

    assert_eq!(result.state, DeploymentState::RolledBack);
    assert!(result.path().contains(&DeploymentState::ConfirmingHealth));
    assert_eq!(result.plan.status, PlanStatus::RolledBack);
    assert_eq!(result.target.status.traffic, TrafficLevel::None);
    assert_source_untouched(&result.source);
    let error = result.error.expect("classified error");
    assert_eq!(error.error_type, "unknown");
    assert!(error.message.is_some_and(|m| m.contains("unhealthy after switch")));
}

#[tokio::test]
async fn health_failure_without_auto_rollback_takes_the_target_out_of_rotation() {
    let h = Harness::new().await;
    h.cluster.degrade_pods_after(GREEN_NS, 1).await;
    let mut strategy = strategy(SwitchType::Instant, Duration::ZERO);
    strategy.rollback_strategy.auto_rollback = false;
    let result = h.orchestrator().run(&strategy, &CancellationToken::new()).await;

    assert_eq!(result.state, DeploymentState::Failed);
    assert!(result.path().contains(&DeploymentState::ConfirmingHealth));
    assert_source_untouched(&result.source);
    assert_eq!(result.target.traffic_config.weight, 0);
    assert_eq!(result.target.status.traffic, TrafficLevel::None);
    assert_eq!(result.target.status.state, EnvironmentState::Standby);
    assert!(result.recovery.is_empty());
    // Releases stay upgraded for inspection.
    assert_eq!(
        h.releases.current("web-green", GREEN_NS).await.unwrap().revision,
        2
    );
}

#[tokio::test]
async fn health_failure_outside_the_rollback_window_fails_without_rollback() {
    let h = Harness::new().await;
    h.cluster.degrade_pods_after(GREEN_NS, 1).await;
    let mut strategy = strategy(SwitchType::Instant, Duration::ZERO);
    strategy.rollback_strategy.rollback_timeout = Duration::from_millis(1);
    let result = h.orchestrator().run(&strategy, &CancellationToken::new()).await;

    assert_eq!(result.state, DeploymentState::Failed);
    assert!(!result.path().contains(&DeploymentState::RolledBack));
    assert!(result.recovery.is_empty());
    assert_source_untouched(&result.source);
    assert_eq!(result.target.status.traffic, TrafficLevel::None);
    assert_ne!(result.target.status.state, EnvironmentState::Switching);
    assert_ne!(result.target.status.state, EnvironmentState::Active);
    assert_eq!(
        h.releases.current("web-green", GREEN_NS).await.unwrap().revision,
        2
    );
}

#[tokio::test]
async fn cancellation_mid_phase_rolls_back() {
    let h = Harness::new().await;
    let strategy = strategy(SwitchType::Gradual, Duration::from_secs(20));
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let result = tokio::time::timeout(
        Duration::from_secs(5),
        h.orchestrator().run(&strategy, &cancel),
    )
    .await
    .expect("cancelled run should end promptly");

    assert_eq!(result.state, DeploymentState::RolledBack);
    assert_eq!(result.plan.phases[0].status, PhaseStatus::Failed);
    assert!(result.recovery.iter().all(|r| r.success));
    assert_source_untouched(&result.source);
}

#[tokio::test]
async fn unready_system_fails_without_side_effects() {
    let h = Harness::new().await;
    h.cluster
        .fail_always(
            "get_nodes",
            PortError::Failed("dial tcp 10.0.0.1:6443: connect: connection refused".to_string()),
        )
        .await;
    let strategy = strategy(SwitchType::Instant, Duration::ZERO);
    let result = h.orchestrator().run(&strategy, &CancellationToken::new()).await;

    assert_eq!(result.state, DeploymentState::Failed);
    assert_eq!(
        result.path(),
        vec![
            DeploymentState::Idle,
            DeploymentState::ValidatingReadiness,
            DeploymentState::Failed,
        ]
    );
    assert!(!result.readiness.as_ref().unwrap().ready);
    assert!(h.releases.requests().await.is_empty());
    assert_eq!(result.plan.status, PlanStatus::Planned);

    let error = result.error.unwrap();
    assert_eq!(error.error_type, "network_error");
    assert_eq!(error.message, None);
}

#[tokio::test]
async fn missing_target_namespace_fails_preparation() {
    let h = Harness::new().await;
    let mut strategy = strategy(SwitchType::Instant, Duration::ZERO);
    strategy.target_environment.namespace = "shop-green-2".to_string();
    strategy.target_environment.namespaces = vec!["shop-green-2".to_string()];
    let result = h.orchestrator().run(&strategy, &CancellationToken::new()).await;

    assert_eq!(result.state, DeploymentState::Failed);
    assert_eq!(
        result.transitions.last().map(|t| t.from),
        Some(DeploymentState::PreparingEnvironments)
    );
    assert!(h.releases.requests().await.is_empty());
    assert!(result.error.is_some());
}

#[tokio::test]
async fn permission_failure_surfaces_manual_steps() {
    let h = Harness::new().await;
    h.releases
        .fail_always(
            "upgrade",
            PortError::Failed(
                "UPGRADE FAILED: deployments.apps \"web\" is forbidden: User \"ci\" cannot patch resource".to_string(),
            ),
        )
        .await;
    let strategy = strategy(SwitchType::Instant, Duration::ZERO);
    let result = h.orchestrator().run(&strategy, &CancellationToken::new()).await;

    assert_eq!(result.state, DeploymentState::Failed);
    let error = result.error.as_ref().unwrap();
    assert_eq!(error.error_type, "insufficient_permissions");
    assert_eq!(error.message, None);
    assert_eq!(result.recovery.len(), 1);
    assert!(!result.recovery[0].success);
    assert!(!result.manual_steps().is_empty());
    assert_eq!(result.target.traffic_config.weight, 0);
    assert_eq!(result.plan.status, PlanStatus::Planned);
}

#[tokio::test]
async fn transient_deploy_failure_is_retried_from_config() {
    let h = Harness::new().await;
    h.releases
        .fail_next("upgrade", PortError::Failed("connection reset by peer".to_string()))
        .await;
    let mut config = SwitchyardConfig::scaffold("shop");
    config.recovery = vec![RecoveryRuleConfig {
        classification: "network_error".to_string(),
        actions: vec![RecoveryAction {
            kind: RecoveryActionKind::Retry {
                attempts: 2,
                delay: Duration::from_millis(5),
                timeout: None,
                install_instead: false,
            },
            priority: Priority::High,
            description: "Retry after a short pause".to_string(),
            command: String::new(),
            auto_retry: true,
            requires_confirmation: false,
        }],
    }];
    let orchestrator = BlueGreenOrchestrator::from_config(
        &config,
        Arc::new(h.cluster.clone()),
        Arc::new(h.releases.clone()),
        Arc::new(h.metrics.clone()),
    )
    .unwrap();

    let strategy = strategy(SwitchType::Instant, Duration::ZERO);
    let result = orchestrator.run(&strategy, &CancellationToken::new()).await;

    assert_eq!(result.state, DeploymentState::Promoted, "{:?}", result.error);
    assert_eq!(result.recovery.len(), 1);
    assert!(result.recovery[0].success);
    assert_eq!(result.deployed[0].revision, 2);
    assert_eq!(result.deployed[0].previous_revision, Some(1));
    assert!(result.error.is_none());
}

#[tokio::test]
async fn result_serializes_for_the_operator() {
    let h = Harness::new().await;
    let strategy = strategy(SwitchType::Instant, Duration::ZERO);
    let result = h.orchestrator().run(&strategy, &CancellationToken::new()).await;

    let json = serde_json::to_value(&result).unwrap();
    assert_eq!(json["state"], "promoted");
    assert_eq!(json["plan"]["switch_type"], "instant");
    assert!(json.get("error").is_none());
}
