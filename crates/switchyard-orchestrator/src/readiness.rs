//! System-wide readiness report, run before anything is touched.
//!
//! ```text
//! cluster_connectivity       nodes reachable, at least one ready
//! dependencies               every configured release is deployed
//! ssl_certificates           TLS secrets present and unexpired
//! blue_green_compatibility   source and target can swap roles
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use switchyard_core::config::ReadinessConfig;
use switchyard_core::{
    BlueGreenStrategy, CheckResult, ClusterPort, ReadinessReport, bounded, epoch_secs,
    format_duration,
};
use switchyard_env::manager::DEFAULT_CALL_TIMEOUT;
use switchyard_release::ReleaseGateway;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Builds readiness reports for orchestration runs.
#[derive(Clone)]
pub struct SystemReadiness {
    cluster: Arc<dyn ClusterPort>,
    gateway: ReleaseGateway,
    config: ReadinessConfig,
    call_timeout: Duration,
}

impl SystemReadiness {
    pub fn new(
        cluster: Arc<dyn ClusterPort>,
        gateway: ReleaseGateway,
        config: ReadinessConfig,
    ) -> Self {
        Self {
            cluster,
            gateway,
            config,
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Run every check. The report is fresh on every call.
    pub async fn check(
        &self,
        strategy: &BlueGreenStrategy,
        cancel: &CancellationToken,
    ) -> ReadinessReport {
        let mut checks = BTreeMap::new();
        checks.insert(
            "cluster_connectivity".to_string(),
            self.cluster_connectivity(cancel).await,
        );
        checks.insert("dependencies".to_string(), self.dependencies(cancel).await);
        checks.insert("ssl_certificates".to_string(), self.certificates(cancel).await);
        checks.insert(
            "blue_green_compatibility".to_string(),
            compatibility(strategy),
        );

        let report = ReadinessReport::from_checks(checks);
        info!(
            ready = report.ready,
            overall = ?report.overall_status,
            source = %strategy.source_environment.name,
            target = %strategy.target_environment.name,
            "system readiness evaluated"
        );
        report
    }

    async fn cluster_connectivity(&self, cancel: &CancellationToken) -> CheckResult {
        match bounded("get nodes", self.call_timeout, cancel, self.cluster.get_nodes()).await {
            Ok(nodes) => {
                let ready = nodes.iter().filter(|n| n.ready).count();
                if ready == 0 {
                    CheckResult::fail(format!("no ready nodes ({} reported)", nodes.len()))
                } else {
                    CheckResult::pass(format!("{ready}/{} nodes ready", nodes.len()))
                }
            }
            Err(e) => CheckResult::fail(e.to_string()),
        }
    }

    async fn dependencies(&self, cancel: &CancellationToken) -> CheckResult {
        if self.config.dependencies.is_empty() {
            return CheckResult::pass("no dependencies configured");
        }
        let mut problems = Vec::new();
        for dep in &self.config.dependencies {
            match self
                .gateway
                .get_release_status(&dep.release, &dep.namespace, cancel)
                .await
            {
                Ok(status) if status.is_deployed() => {
                    debug!(release = %dep.release, namespace = %dep.namespace, "dependency deployed");
                }
                Ok(status) if !status.exists => {
                    problems.push(format!("{}/{} not found", dep.namespace, dep.release));
                }
                Ok(_) => problems.push(format!("{}/{} not deployed", dep.namespace, dep.release)),
                Err(e) => problems.push(e.to_string()),
            }
        }
        if problems.is_empty() {
            CheckResult::pass(format!(
                "{} dependencies deployed",
                self.config.dependencies.len()
            ))
        } else {
            CheckResult::fail(problems.join(", "))
        }
    }

    async fn certificates(&self, cancel: &CancellationToken) -> CheckResult {
        if self.config.tls_secrets.is_empty() {
            return CheckResult::pass("no TLS secrets configured");
        }
        let now = epoch_secs();
        let window = self.config.cert_warning.as_secs();
        let mut failures = Vec::new();
        let mut warnings = Vec::new();

        for secret in &self.config.tls_secrets {
            let id = format!("{}/{}", secret.namespace, secret.name);
            let what = format!("get secret {id}");
            let lookup = self.cluster.get_secret(&secret.name, &secret.namespace);
            match bounded(&what, self.call_timeout, cancel, lookup).await {
                Ok(info) => match info.expires_at {
                    Some(at) if at <= now => failures.push(format!("{id} expired")),
                    Some(at) if at - now < window => warnings.push(format!(
                        "{id} expires within {}",
                        format_duration(self.config.cert_warning)
                    )),
                    _ => {}
                },
                Err(e) if e.is_not_found() => failures.push(format!("{id} missing")),
                Err(e) => failures.push(format!("{id}: {e}")),
            }
        }

        if !failures.is_empty() {
            CheckResult::fail(failures.join(", "))
        } else if !warnings.is_empty() {
            CheckResult::warn(warnings.join(", "))
        } else {
            CheckResult::pass(format!(
                "{} certificates valid",
                self.config.tls_secrets.len()
            ))
        }
    }
}

/// Whether source and target can trade places.
fn compatibility(strategy: &BlueGreenStrategy) -> CheckResult {
    let source = &strategy.source_environment;
    let target = &strategy.target_environment;

    if source.kind == target.kind {
        return CheckResult::fail(format!("source and target are both {}", source.kind.as_str()));
    }
    let overlap: Vec<&String> = source
        .namespaces
        .iter()
        .filter(|ns| target.namespaces.contains(ns))
        .collect();
    if !overlap.is_empty() {
        return CheckResult::fail(format!("namespaces shared by both sides: {overlap:?}"));
    }
    if !source.is_live() {
        return CheckResult::fail(format!("source {} is not live", source.name));
    }
    if target.traffic_config.weight != 0 {
        return CheckResult::fail(format!(
            "target {} already carries {}% of traffic",
            target.name, target.traffic_config.weight
        ));
    }
    if target.charts.is_empty() {
        return CheckResult::fail(format!("target {} has no charts", target.name));
    }

    let names = |charts: &[switchyard_core::ChartRef]| -> BTreeSet<String> {
        charts.iter().map(|c| c.name.clone()).collect()
    };
    if names(&source.charts) != names(&target.charts) {
        return CheckResult::warn("source and target deploy different chart sets");
    }
    CheckResult::pass(format!(
        "{} → {} compatible",
        source.kind.as_str(),
        target.kind.as_str()
    ))
}
