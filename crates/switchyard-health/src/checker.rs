//! Health probe logic.
//!
//! A probe reports one observation; the tracker decides when enough
//! consecutive failures have piled up to call the environment unhealthy.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use switchyard_core::Environment;
use switchyard_env::EnvironmentManager;
use tracing::{debug, warn};

/// Result of a single health probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeResult {
    /// Enough pods ready.
    Healthy,
    /// Too few pods ready.
    Unhealthy,
    /// The probe itself errored or timed out.
    Failed,
}

/// Tracker verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthVerdict {
    Unknown,
    Healthy,
    Unhealthy,
}

/// Tracks consecutive probe results for one environment.
#[derive(Debug, Clone)]
pub struct HealthTracker {
    verdict: HealthVerdict,
    consecutive_failures: u32,
    /// Consecutive failures before the verdict turns unhealthy.
    failure_threshold: u32,
    probes: u32,
    failures: u32,
}

impl HealthTracker {
    pub fn new(failure_threshold: u32) -> Self {
        Self {
            verdict: HealthVerdict::Unknown,
            consecutive_failures: 0,
            failure_threshold: failure_threshold.max(1),
            probes: 0,
            failures: 0,
        }
    }

    /// Record a probe result and return the new verdict.
    pub fn record(&mut self, result: ProbeResult) -> HealthVerdict {
        self.probes += 1;
        match result {
            ProbeResult::Healthy => {
                if self.verdict == HealthVerdict::Unhealthy {
                    debug!(failures = self.consecutive_failures, "environment recovered");
                }
                self.consecutive_failures = 0;
                self.verdict = HealthVerdict::Healthy;
            }
            ProbeResult::Unhealthy | ProbeResult::Failed => {
                self.failures += 1;
                self.consecutive_failures += 1;
                if self.consecutive_failures >= self.failure_threshold {
                    if self.verdict != HealthVerdict::Unhealthy {
                        warn!(
                            failures = self.consecutive_failures,
                            threshold = self.failure_threshold,
                            "environment marked unhealthy"
                        );
                    }
                    self.verdict = HealthVerdict::Unhealthy;
                }
            }
        }
        self.verdict
    }

    pub fn verdict(&self) -> HealthVerdict {
        self.verdict
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn is_unhealthy(&self) -> bool {
        self.verdict == HealthVerdict::Unhealthy
    }

    pub fn probes(&self) -> u32 {
        self.probes
    }

    /// Fraction of healthy probes; 1.0 before any probe.
    pub fn success_rate(&self) -> f64 {
        if self.probes == 0 {
            1.0
        } else {
            f64::from(self.probes - self.failures) / f64::from(self.probes)
        }
    }
}

/// Something that can be asked whether an environment is healthy.
#[async_trait]
pub trait HealthProbe: Send + Sync {
    async fn probe(&self) -> ProbeResult;
}

/// Probes an environment's ready-pod ratio through the environment manager.
pub struct EnvironmentProbe {
    manager: EnvironmentManager,
    env: Environment,
    threshold_percent: u32,
    timeout: Duration,
}

impl EnvironmentProbe {
    pub fn new(
        manager: EnvironmentManager,
        env: Environment,
        threshold_percent: u32,
        timeout: Duration,
    ) -> Self {
        Self {
            manager,
            env,
            threshold_percent,
            timeout,
        }
    }
}

#[async_trait]
impl HealthProbe for EnvironmentProbe {
    async fn probe(&self) -> ProbeResult {
        let check = self.manager.check_health(&self.env, self.threshold_percent);
        match tokio::time::timeout(self.timeout, check).await {
            Ok(Ok(health)) if health.healthy => ProbeResult::Healthy,
            Ok(Ok(health)) => {
                debug!(
                    environment = %self.env.name,
                    ready_percent = health.ready_percent,
                    threshold = self.threshold_percent,
                    "health probe below threshold"
                );
                ProbeResult::Unhealthy
            }
            Ok(Err(e)) => {
                debug!(environment = %self.env.name, error = %e, "health probe failed");
                ProbeResult::Failed
            }
            Err(_) => {
                debug!(environment = %self.env.name, "health probe timed out");
                ProbeResult::Failed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::Arc;

    use super::*;
    use switchyard_core::memory::InMemoryCluster;
    use switchyard_core::{
        EnvironmentKind, EnvironmentStatus, PortError, ResourceLimits, TrafficConfig,
    };

    #[test]
    fn tracker_starts_unknown() {
        let tracker = HealthTracker::new(3);
        assert_eq!(tracker.verdict(), HealthVerdict::Unknown);
        assert_eq!(tracker.success_rate(), 1.0);
    }

    #[test]
    fn tracker_stays_healthy_under_threshold() {
        let mut tracker = HealthTracker::new(3);
        tracker.record(ProbeResult::Healthy);
        tracker.record(ProbeResult::Unhealthy);
        tracker.record(ProbeResult::Failed);
        assert_eq!(tracker.verdict(), HealthVerdict::Healthy);
        assert_eq!(tracker.consecutive_failures(), 2);
    }

    #[test]
    fn tracker_trips_at_threshold() {
        let mut tracker = HealthTracker::new(3);
        for _ in 0..2 {
            tracker.record(ProbeResult::Unhealthy);
        }
        assert!(!tracker.is_unhealthy());
        assert_eq!(tracker.record(ProbeResult::Failed), HealthVerdict::Unhealthy);
    }

    #[test]
    fn success_resets_the_streak() {
        let mut tracker = HealthTracker::new(2);
        tracker.record(ProbeResult::Unhealthy);
        tracker.record(ProbeResult::Healthy);
        tracker.record(ProbeResult::Unhealthy);
        assert!(!tracker.is_unhealthy());
        assert!((tracker.success_rate() - 1.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn zero_threshold_means_one() {
        let mut tracker = HealthTracker::new(0);
        assert_eq!(tracker.record(ProbeResult::Failed), HealthVerdict::Unhealthy);
    }

    fn env() -> Environment {
        Environment {
            name: "green-1".to_string(),
            kind: EnvironmentKind::Green,
            namespace: "shop-green".to_string(),
            namespaces: vec!["shop-green".to_string()],
            charts: vec![],
            resource_limits: ResourceLimits::default(),
            traffic_config: TrafficConfig {
                load_balancer: "lb".to_string(),
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

    #[tokio::test]
    async fn environment_probe_maps_health() {
        let cluster = InMemoryCluster::new();
        let manager = EnvironmentManager::new(Arc::new(cluster.clone()));
        let probe = EnvironmentProbe::new(manager, env(), 80, Duration::from_secs(1));

        cluster.set_pods("shop-green", 4, 4).await;
        assert_eq!(probe.probe().await, ProbeResult::Healthy);

        cluster.set_pods("shop-green", 4, 1).await;
        assert_eq!(probe.probe().await, ProbeResult::Unhealthy);

        cluster
            .fail_next("get_pods", PortError::Failed("connection refused".to_string()))
            .await;
        assert_eq!(probe.probe().await, ProbeResult::Failed);
    }
}
