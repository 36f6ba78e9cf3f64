//! Environment manager — create, prepare, validate, and clean up environments.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use switchyard_core::config::EnvironmentConfig;
use switchyard_core::quantity::{parse_cpu_millis, parse_memory_bytes};
use switchyard_core::{
    ClusterPort, DataStore, DataStoreRole, Environment, EnvironmentKind, EnvironmentState,
    EnvironmentStatus, HealthState, PortError, SecretSpec, TrafficConfig, bounded, epoch_secs,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{EnvironmentError, EnvironmentResult};
use crate::manifests::{self, KIND_LABEL, MANAGED_BY, MANAGED_BY_LABEL, NAME_LABEL};

/// Deadline for a single cluster call.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(60);

/// Ready-pod ratio across an environment's namespaces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentHealth {
    pub ready_pods: usize,
    pub total_pods: usize,
    /// Ready percentage; 100 when there are no pods.
    pub ready_percent: u32,
    pub healthy: bool,
}

impl EnvironmentHealth {
    pub fn state(&self) -> HealthState {
        if self.healthy {
            HealthState::Healthy
        } else {
            HealthState::Degraded
        }
    }
}

/// Environment lifecycle over a [`ClusterPort`].
#[derive(Clone)]
pub struct EnvironmentManager {
    cluster: Arc<dyn ClusterPort>,
    call_timeout: Duration,
}

impl EnvironmentManager {
    pub fn new(cluster: Arc<dyn ClusterPort>) -> Self {
        Self {
            cluster,
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Create a Green environment from `config`.
    pub async fn create_green_environment(
        &self,
        config: &EnvironmentConfig,
        cancel: &CancellationToken,
    ) -> EnvironmentResult<Environment> {
        self.create_environment(EnvironmentKind::Green, config, cancel)
            .await
    }

    /// Create an environment of `kind` from `config` and return it `Active`.
    ///
    /// Namespace failures abort before anything else is applied. The
    /// network policy and monitoring are best-effort.
    pub async fn create_environment(
        &self,
        kind: EnvironmentKind,
        config: &EnvironmentConfig,
        cancel: &CancellationToken,
    ) -> EnvironmentResult<Environment> {
        let Some(primary) = config.namespaces.first() else {
            return Err(EnvironmentError::InvalidConfig(
                "environment needs at least one namespace".to_string(),
            ));
        };

        let mut env = Environment {
            name: format!("{}-{}", kind.as_str(), epoch_secs()),
            kind,
            namespace: primary.clone(),
            namespaces: config.namespaces.clone(),
            charts: config.charts.clone(),
            resource_limits: config.resource_limits.clone(),
            traffic_config: TrafficConfig {
                weight: 0,
                ..config.traffic.clone()
            },
            data_stores: config.data_stores.clone(),
            monitoring_labels: config.monitoring_labels.clone(),
            secrets: Vec::new(),
            status: EnvironmentStatus::pending(),
        };
        info!(environment = %env.name, kind = %kind, namespaces = ?env.namespaces, "creating environment");

        self.provision(&env, cancel).await?;

        for (name, data) in &config.secrets {
            let secret = SecretSpec {
                name: name.clone(),
                namespace: env.namespace.clone(),
                data: data.clone(),
                labels: self.labels(&env),
            };
            let what = format!("apply secret {name}");
            bounded(&what, self.call_timeout, cancel, self.cluster.apply_secret(&secret))
                .await
                .map_err(|source| EnvironmentError::Apply {
                    kind: "Secret".to_string(),
                    namespace: env.namespace.clone(),
                    source,
                })?;
            env.secrets.push(name.clone());
        }

        env.status.health = HealthState::Healthy;
        env.set_state(EnvironmentState::Active, "created successfully");
        info!(environment = %env.name, "environment created");
        Ok(env)
    }

    /// Derive a Blue standby from a Green environment.
    ///
    /// Charts and resource shape are copied. Traffic config is Blue's own,
    /// and every data store becomes a read replica of Green's store.
    pub async fn prepare_blue_environment(
        &self,
        green: &Environment,
        cancel: &CancellationToken,
    ) -> EnvironmentResult<Environment> {
        let kind = EnvironmentKind::Blue;
        let namespaces: Vec<String> = green
            .namespaces
            .iter()
            .map(|ns| counterpart(ns, green.kind, kind))
            .collect();
        let data_stores = green
            .data_stores
            .iter()
            .map(|store| DataStore {
                name: store.name.clone(),
                engine: store.engine.clone(),
                role: DataStoreRole::ReadReplica {
                    source: format!("{}/{}", green.namespace, store.name),
                },
            })
            .collect();

        let mut env = Environment {
            name: format!("{}-{}", kind.as_str(), epoch_secs()),
            kind,
            namespace: counterpart(&green.namespace, green.kind, kind),
            namespaces,
            charts: green.charts.clone(),
            resource_limits: green.resource_limits.clone(),
            traffic_config: TrafficConfig {
                load_balancer: counterpart(&green.traffic_config.load_balancer, green.kind, kind),
                ingress_class: green.traffic_config.ingress_class.clone(),
                annotations: green.traffic_config.annotations.clone(),
                weight: 0,
            },
            data_stores,
            monitoring_labels: green.monitoring_labels.clone(),
            secrets: Vec::new(),
            status: EnvironmentStatus::pending(),
        };
        info!(environment = %env.name, from = %green.name, "preparing blue environment");

        self.provision(&env, cancel).await?;

        env.status.health = HealthState::Healthy;
        let message = format!("standby, replicating from {}", green.name);
        env.set_state(EnvironmentState::Standby, &message);
        Ok(env)
    }

    /// Run the four readiness checks in order, stopping at the first failure.
    ///
    /// Every cluster call is bounded by the call timeout and `cancel`.
    pub async fn validate_environment(
        &self,
        env: &Environment,
        cancel: &CancellationToken,
    ) -> EnvironmentResult<()> {
        self.check_namespaces(env, cancel).await?;
        self.check_resources(env, cancel).await?;
        self.check_network(cancel).await?;
        self.check_storage(env, cancel).await?;
        debug!(environment = %env.name, "environment validated");
        Ok(())
    }

    /// Tear an environment down.
    ///
    /// Traffic goes to none first. Scale-down and monitoring removal are
    /// best-effort; failing to delete quota, policy, or secrets is fatal.
    /// The lifecycle state is left as it was.
    pub async fn cleanup_environment(
        &self,
        env: &mut Environment,
        cancel: &CancellationToken,
    ) -> EnvironmentResult<()> {
        env.set_traffic_percent(0);
        info!(environment = %env.name, "cleaning up environment");

        for ns in &env.namespaces {
            let what = format!("scale down {ns}");
            let scaled =
                bounded(&what, self.call_timeout, cancel, self.cluster.scale_workloads(ns, 0)).await;
            if let Err(e) = scaled {
                warn!(environment = %env.name, namespace = %ns, error = %e, "scale down failed");
            }
        }

        for ns in &env.namespaces {
            self.delete("ResourceQuota", manifests::QUOTA_NAME, ns, cancel)
                .await?;
            self.delete("NetworkPolicy", manifests::NETWORK_POLICY_NAME, ns, cancel)
                .await?;
        }
        for name in &env.secrets {
            self.delete("Secret", name, &env.namespace, cancel).await?;
        }

        for ns in &env.namespaces {
            let what = format!("delete monitoring in {ns}");
            let removal = self
                .cluster
                .delete_resource("ConfigMap", manifests::MONITORING_NAME, ns);
            match bounded(&what, self.call_timeout, cancel, removal).await {
                Ok(()) => {}
                Err(e) if e.is_not_found() => {}
                Err(e) => {
                    warn!(environment = %env.name, namespace = %ns, error = %e, "monitoring removal failed")
                }
            }
        }

        env.status.message = "cleanup completed".to_string();
        env.status.last_checked = epoch_secs();
        info!(environment = %env.name, "cleanup completed");
        Ok(())
    }

    /// Ready-pod ratio across all namespaces. No pods counts as healthy.
    pub async fn check_health(
        &self,
        env: &Environment,
        threshold_percent: u32,
    ) -> EnvironmentResult<EnvironmentHealth> {
        let mut ready = 0;
        let mut total = 0;
        for ns in &env.namespaces {
            let pods = self
                .cluster
                .get_pods(ns)
                .await
                .map_err(EnvironmentError::Health)?;
            total += pods.len();
            ready += pods.iter().filter(|p| p.ready).count();
        }

        let ready_percent = if total == 0 {
            100
        } else {
            (ready * 100 / total) as u32
        };
        let health = EnvironmentHealth {
            ready_pods: ready,
            total_pods: total,
            ready_percent,
            healthy: ready_percent >= threshold_percent,
        };
        debug!(
            environment = %env.name,
            ready,
            total,
            ready_percent,
            healthy = health.healthy,
            "environment health"
        );
        Ok(health)
    }

    // ── Provisioning ─────────────────────────────────────────────

    async fn provision(&self, env: &Environment, cancel: &CancellationToken) -> EnvironmentResult<()> {
        for ns in &env.namespaces {
            self.ensure_namespace(ns, cancel).await?;
        }

        for ns in &env.namespaces {
            let quota = manifests::resource_quota(ns, env.kind, &env.resource_limits)?;
            self.apply("ResourceQuota", ns, &quota, cancel).await?;

            let policy = manifests::network_policy(ns, env.kind)?;
            if let Err(e) = self.apply("NetworkPolicy", ns, &policy, cancel).await {
                warn!(environment = %env.name, namespace = %ns, error = %e, "network policy not applied");
            }
        }

        for store in &env.data_stores {
            let config = manifests::data_store_config(store, &env.namespace, env.kind)?;
            self.apply("ConfigMap", &env.namespace, &config, cancel)
                .await?;
        }

        let labels = self.labels(env);
        for ns in &env.namespaces {
            if let Err(e) = self.cluster.label_namespace(ns, &labels).await {
                warn!(environment = %env.name, namespace = %ns, error = %e, "monitoring labels not set");
            }
            let monitoring = manifests::monitoring_config(ns, env.kind, &env.name)?;
            if let Err(e) = self.apply("ConfigMap", ns, &monitoring, cancel).await {
                warn!(environment = %env.name, namespace = %ns, error = %e, "monitoring config not applied");
            }
        }
        Ok(())
    }

    async fn ensure_namespace(&self, ns: &str, cancel: &CancellationToken) -> EnvironmentResult<()> {
        let fail = |source| EnvironmentError::NamespaceCreation {
            namespace: ns.to_string(),
            source,
        };
        let what = format!("get namespace {ns}");
        match bounded(&what, self.call_timeout, cancel, self.cluster.get_namespace(ns)).await {
            Ok(()) => {
                debug!(namespace = ns, "namespace exists");
                return Ok(());
            }
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(fail(e)),
        }

        let what = format!("create namespace {ns}");
        match bounded(&what, self.call_timeout, cancel, self.cluster.create_namespace(ns)).await {
            Ok(()) => {
                info!(namespace = ns, "namespace created");
                Ok(())
            }
            // Lost a race with another creator.
            Err(PortError::Failed(msg)) if msg.contains("already exists") => Ok(()),
            Err(e) => Err(fail(e)),
        }
    }

    async fn apply(
        &self,
        kind: &str,
        ns: &str,
        yaml: &str,
        cancel: &CancellationToken,
    ) -> EnvironmentResult<()> {
        let what = format!("apply {kind} in {ns}");
        bounded(&what, self.call_timeout, cancel, self.cluster.apply_manifest(yaml))
            .await
            .map_err(|source| EnvironmentError::Apply {
                kind: kind.to_string(),
                namespace: ns.to_string(),
                source,
            })
    }

    /// Delete an owned object; already gone counts as deleted.
    async fn delete(
        &self,
        kind: &str,
        name: &str,
        ns: &str,
        cancel: &CancellationToken,
    ) -> EnvironmentResult<()> {
        let what = format!("delete {kind} {ns}/{name}");
        let deletion = self.cluster.delete_resource(kind, name, ns);
        match bounded(&what, self.call_timeout, cancel, deletion).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_not_found() => Ok(()),
            Err(source) => Err(EnvironmentError::Cleanup {
                kind: kind.to_string(),
                name: name.to_string(),
                namespace: ns.to_string(),
                source,
            }),
        }
    }

    fn labels(&self, env: &Environment) -> BTreeMap<String, String> {
        let mut labels = env.monitoring_labels.clone();
        labels.insert(KIND_LABEL.to_string(), env.kind.as_str().to_string());
        labels.insert(NAME_LABEL.to_string(), env.name.clone());
        labels.insert(MANAGED_BY_LABEL.to_string(), MANAGED_BY.to_string());
        labels
    }

    // ── Validation checks ────────────────────────────────────────

    async fn check_namespaces(
        &self,
        env: &Environment,
        cancel: &CancellationToken,
    ) -> EnvironmentResult<()> {
        for ns in &env.namespaces {
            let what = format!("get namespace {ns}");
            match bounded(&what, self.call_timeout, cancel, self.cluster.get_namespace(ns)).await {
                Ok(()) => {}
                Err(e) if e.is_not_found() => {
                    return Err(EnvironmentError::NamespaceMissing {
                        namespace: ns.clone(),
                    });
                }
                Err(e) => return Err(check_failed(e, EnvironmentError::NetworkUnreachable)),
            }
        }
        Ok(())
    }

    async fn check_resources(
        &self,
        env: &Environment,
        cancel: &CancellationToken,
    ) -> EnvironmentResult<()> {
        let limits = &env.resource_limits;
        let cpu = parse_cpu_millis(&limits.cpu).ok_or_else(|| {
            EnvironmentError::InvalidConfig(format!("bad cpu quantity {:?}", limits.cpu))
        })?;
        let memory = parse_memory_bytes(&limits.memory).ok_or_else(|| {
            EnvironmentError::InvalidConfig(format!("bad memory quantity {:?}", limits.memory))
        })?;

        let nodes = bounded("get nodes", self.call_timeout, cancel, self.cluster.get_nodes())
            .await
            .map_err(|e| check_failed(e, EnvironmentError::NetworkUnreachable))?;
        let ready: Vec<_> = nodes.iter().filter(|n| n.ready).collect();
        if ready.is_empty() {
            return Err(EnvironmentError::InsufficientResources(
                "no ready nodes".to_string(),
            ));
        }

        let free_cpu: u64 = ready.iter().map(|n| n.allocatable_cpu_millis).sum();
        let free_memory: u64 = ready.iter().map(|n| n.allocatable_memory_bytes).sum();
        if free_cpu < cpu {
            return Err(EnvironmentError::InsufficientResources(format!(
                "needs {}m cpu, {free_cpu}m allocatable",
                cpu
            )));
        }
        if free_memory < memory {
            return Err(EnvironmentError::InsufficientResources(format!(
                "needs {memory} bytes memory, {free_memory} allocatable"
            )));
        }
        Ok(())
    }

    async fn check_network(&self, cancel: &CancellationToken) -> EnvironmentResult<()> {
        let listing = self.cluster.get_namespaces();
        bounded("list namespaces", self.call_timeout, cancel, listing)
            .await
            .map(|_| ())
            .map_err(|e| check_failed(e, EnvironmentError::NetworkUnreachable))
    }

    async fn check_storage(
        &self,
        env: &Environment,
        cancel: &CancellationToken,
    ) -> EnvironmentResult<()> {
        if env.resource_limits.storage.is_none() && env.data_stores.is_empty() {
            return Ok(());
        }
        let listing = self.cluster.get_storage_classes();
        let classes = bounded("list storage classes", self.call_timeout, cancel, listing)
            .await
            .map_err(|e| check_failed(e, EnvironmentError::StorageUnavailable))?;
        if classes.is_empty() {
            return Err(EnvironmentError::StorageUnavailable(
                "no storage classes".to_string(),
            ));
        }
        Ok(())
    }
}

/// A validation call that errored. Cancellation keeps its own variant.
fn check_failed(e: PortError, wrap: fn(String) -> EnvironmentError) -> EnvironmentError {
    if e.is_cancelled() {
        EnvironmentError::Cancelled(e)
    } else {
        wrap(e.to_string())
    }
}

/// Swap the last `-`-separated kind segment (`shop-green-jobs` →
/// `shop-blue-jobs`), or suffix the name when there is none.
fn counterpart(name: &str, from: EnvironmentKind, to: EnvironmentKind) -> String {
    let mut segments: Vec<&str> = name.split('-').collect();
    match segments.iter().rposition(|s| *s == from.as_str()) {
        Some(i) => {
            segments[i] = to.as_str();
            segments.join("-")
        }
        None => format!("{name}-{}", to.as_str()),
    }
}
