//! In-memory port implementations.
//!
//! These back every test in the workspace. Each type is a cheap `Clone`
//! handle over shared state, so a test can hand one copy to the code
//! under test (as `Arc<dyn Port>`) and keep another to inject failures
//! and inspect what happened.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use crate::ports::*;
use crate::types::Environment;

/// Injected failures for one operation.
#[derive(Debug, Default)]
struct Failures {
    /// Failures consumed one per call, front first.
    next: HashMap<String, VecDeque<PortError>>,
    /// Failures returned on every call.
    always: HashMap<String, PortError>,
}

impl Failures {
    fn take(&mut self, op: &str) -> Option<PortError> {
        if let Some(queue) = self.next.get_mut(op) {
            if let Some(err) = queue.pop_front() {
                return Some(err);
            }
        }
        self.always.get(op).cloned()
    }
}

// ── Cluster ───────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct ClusterState {
    namespaces: BTreeMap<String, BTreeMap<String, String>>,
    /// (kind, namespace, name) of applied objects.
    resources: BTreeSet<(String, String, String)>,
    manifests: Vec<String>,
    secrets: BTreeMap<(String, String), (SecretInfo, BTreeMap<String, String>)>,
    pods: BTreeMap<String, Vec<PodInfo>>,
    /// Healthy pod listings left before a namespace's pods turn unready.
    degrade_after: BTreeMap<String, u32>,
    replicas: BTreeMap<String, u32>,
    nodes: Vec<NodeInfo>,
    storage_classes: Vec<String>,
    failures: Failures,
    /// Operations that never return.
    hanging: BTreeSet<String>,
    calls: Vec<String>,
}

/// A fake cluster: namespaces, objects, pods, nodes.
#[derive(Debug, Clone)]
pub struct InMemoryCluster {
    state: Arc<Mutex<ClusterState>>,
}

impl Default for InMemoryCluster {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryCluster {
    /// One ready 8-core / 32Gi node and a "standard" storage class.
    pub fn new() -> Self {
        let state = ClusterState {
            nodes: vec![NodeInfo {
                name: "node-1".to_string(),
                ready: true,
                allocatable_cpu_millis: 8_000,
                allocatable_memory_bytes: 32 * 1024 * 1024 * 1024,
            }],
            storage_classes: vec!["standard".to_string()],
            ..Default::default()
        };
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    pub async fn add_namespace(&self, name: &str) {
        let mut state = self.state.lock().await;
        state.namespaces.entry(name.to_string()).or_default();
    }

    pub async fn has_namespace(&self, name: &str) -> bool {
        self.state.lock().await.namespaces.contains_key(name)
    }

    pub async fn namespace_labels(&self, name: &str) -> BTreeMap<String, String> {
        self.state
            .lock()
            .await
            .namespaces
            .get(name)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn has_resource(&self, kind: &str, namespace: &str, name: &str) -> bool {
        self.state.lock().await.resources.contains(&(
            kind.to_string(),
            namespace.to_string(),
            name.to_string(),
        ))
    }

    /// Raw text of every manifest applied, in order.
    pub async fn manifests(&self) -> Vec<String> {
        self.state.lock().await.manifests.clone()
    }

    /// Replace the pods of a namespace with `total` pods, `ready` of them ready.
    pub async fn set_pods(&self, namespace: &str, total: usize, ready: usize) {
        let pods = (0..total)
            .map(|i| PodInfo {
                name: format!("{namespace}-pod-{i}"),
                namespace: namespace.to_string(),
                ready: i < ready,
                phase: "Running".to_string(),
            })
            .collect();
        self.state
            .lock()
            .await
            .pods
            .insert(namespace.to_string(), pods);
    }

    /// After `listings` more pod listings, every pod in `namespace` reports unready.
    pub async fn degrade_pods_after(&self, namespace: &str, listings: u32) {
        self.state
            .lock()
            .await
            .degrade_after
            .insert(namespace.to_string(), listings);
    }

    pub async fn set_nodes(&self, nodes: Vec<NodeInfo>) {
        self.state.lock().await.nodes = nodes;
    }

    pub async fn set_storage_classes(&self, classes: Vec<String>) {
        self.state.lock().await.storage_classes = classes;
    }

    /// Register a TLS secret with an optional certificate expiry.
    pub async fn add_tls_secret(&self, name: &str, namespace: &str, expires_at: Option<u64>) {
        let info = SecretInfo {
            name: name.to_string(),
            namespace: namespace.to_string(),
            expires_at,
        };
        self.state.lock().await.secrets.insert(
            (namespace.to_string(), name.to_string()),
            (info, BTreeMap::new()),
        );
    }

    pub async fn has_secret(&self, name: &str, namespace: &str) -> bool {
        self.state
            .lock()
            .await
            .secrets
            .contains_key(&(namespace.to_string(), name.to_string()))
    }

    pub async fn replicas(&self, namespace: &str) -> Option<u32> {
        self.state.lock().await.replicas.get(namespace).copied()
    }

    /// Fail the next call to `op` (a `ClusterPort` method name).
    /// `apply_manifest:<Kind>` targets manifests containing that kind.
    pub async fn fail_next(&self, op: &str, error: PortError) {
        self.state
            .lock()
            .await
            .failures
            .next
            .entry(op.to_string())
            .or_default()
            .push_back(error);
    }

    /// Fail every call to `op` until cleared.
    pub async fn fail_always(&self, op: &str, error: PortError) {
        self.state
            .lock()
            .await
            .failures
            .always
            .insert(op.to_string(), error);
    }

    /// Make every call to `op` hang forever, like an unresponsive API server.
    pub async fn hang(&self, op: &str) {
        self.state.lock().await.hanging.insert(op.to_string());
    }

    pub async fn clear_failures(&self) {
        let mut state = self.state.lock().await;
        state.failures = Failures::default();
        state.hanging.clear();
    }

    /// Every call made, as "<op> <args>".
    pub async fn calls(&self) -> Vec<String> {
        self.state.lock().await.calls.clone()
    }

    async fn enter(&self, op: &str, args: &str) -> Result<tokio::sync::MutexGuard<'_, ClusterState>, PortError> {
        let mut state = self.state.lock().await;
        state.calls.push(format!("{op} {args}").trim_end().to_string());
        if state.hanging.contains(op) {
            drop(state);
            return std::future::pending().await;
        }
        match state.failures.take(op) {
            Some(err) => Err(err),
            None => Ok(state),
        }
    }
}

/// (kind, namespace, name) of each document in a manifest.
fn manifest_objects(yaml: &str) -> PortResult<Vec<(String, String, String)>> {
    let mut objects = Vec::new();
    for doc in serde_yaml::Deserializer::from_str(yaml) {
        let value = <serde_yaml::Value as serde::Deserialize>::deserialize(doc)
            .map_err(|e| PortError::Failed(format!("error parsing manifest: {e}")))?;
        if value.is_null() {
            continue;
        }
        let kind = value
            .get("kind")
            .and_then(|v| v.as_str())
            .ok_or_else(|| PortError::Failed("error validating data: kind not set".to_string()))?;
        let metadata = value.get("metadata");
        let name = metadata
            .and_then(|m| m.get("name"))
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                PortError::Failed("error validating data: metadata.name not set".to_string())
            })?;
        let namespace = metadata
            .and_then(|m| m.get("namespace"))
            .and_then(|v| v.as_str())
            .unwrap_or("default");
        objects.push((kind.to_string(), namespace.to_string(), name.to_string()));
    }
    Ok(objects)
}

#[async_trait]
impl ClusterPort for InMemoryCluster {
    async fn get_namespace(&self, name: &str) -> PortResult<()> {
        let state = self.enter("get_namespace", name).await?;
        if state.namespaces.contains_key(name) {
            Ok(())
        } else {
            Err(PortError::NotFound(format!("namespaces \"{name}\" not found")))
        }
    }

    async fn create_namespace(&self, name: &str) -> PortResult<()> {
        let mut state = self.enter("create_namespace", name).await?;
        if state.namespaces.contains_key(name) {
            return Err(PortError::Failed(format!(
                "namespaces \"{name}\" already exists"
            )));
        }
        state.namespaces.insert(name.to_string(), BTreeMap::new());
        debug!(namespace = name, "namespace created");
        Ok(())
    }

    async fn label_namespace(
        &self,
        name: &str,
        labels: &BTreeMap<String, String>,
    ) -> PortResult<()> {
        let mut state = self.enter("label_namespace", name).await?;
        let ns = state
            .namespaces
            .get_mut(name)
            .ok_or_else(|| PortError::NotFound(format!("namespaces \"{name}\" not found")))?;
        ns.extend(labels.iter().map(|(k, v)| (k.clone(), v.clone())));
        Ok(())
    }

    async fn apply_manifest(&self, yaml: &str) -> PortResult<()> {
        let mut state = self.enter("apply_manifest", "").await?;
        let objects = manifest_objects(yaml)?;
        for (kind, namespace, _) in &objects {
            if let Some(err) = state.failures.take(&format!("apply_manifest:{kind}")) {
                return Err(err);
            }
            if !state.namespaces.contains_key(namespace) {
                return Err(PortError::NotFound(format!(
                    "namespaces \"{namespace}\" not found"
                )));
            }
        }
        state.resources.extend(objects);
        state.manifests.push(yaml.to_string());
        Ok(())
    }

    async fn apply_secret(&self, secret: &SecretSpec) -> PortResult<()> {
        let mut state = self
            .enter("apply_secret", &format!("{}/{}", secret.namespace, secret.name))
            .await?;
        if !state.namespaces.contains_key(&secret.namespace) {
            return Err(PortError::NotFound(format!(
                "namespaces \"{}\" not found",
                secret.namespace
            )));
        }
        let info = SecretInfo {
            name: secret.name.clone(),
            namespace: secret.namespace.clone(),
            expires_at: None,
        };
        state.secrets.insert(
            (secret.namespace.clone(), secret.name.clone()),
            (info, secret.data.clone()),
        );
        Ok(())
    }

    async fn get_secret(&self, name: &str, namespace: &str) -> PortResult<SecretInfo> {
        let state = self
            .enter("get_secret", &format!("{namespace}/{name}"))
            .await?;
        state
            .secrets
            .get(&(namespace.to_string(), name.to_string()))
            .map(|(info, _)| info.clone())
            .ok_or_else(|| PortError::NotFound(format!("secrets \"{name}\" not found")))
    }

    async fn delete_resource(&self, kind: &str, name: &str, namespace: &str) -> PortResult<()> {
        let mut state = self
            .enter("delete_resource", &format!("{kind} {namespace}/{name}"))
            .await?;
        if kind == "Secret" {
            if state
                .secrets
                .remove(&(namespace.to_string(), name.to_string()))
                .is_some()
            {
                return Ok(());
            }
        } else if state.resources.remove(&(
            kind.to_string(),
            namespace.to_string(),
            name.to_string(),
        )) {
            return Ok(());
        }
        Err(PortError::NotFound(format!(
            "{} \"{name}\" not found",
            kind.to_lowercase()
        )))
    }

    async fn scale_workloads(&self, namespace: &str, replicas: u32) -> PortResult<()> {
        let mut state = self
            .enter("scale_workloads", &format!("{namespace} {replicas}"))
            .await?;
        state.replicas.insert(namespace.to_string(), replicas);
        if replicas == 0 {
            state.pods.remove(namespace);
        }
        Ok(())
    }

    async fn get_pods(&self, namespace: &str) -> PortResult<Vec<PodInfo>> {
        let mut state = self.enter("get_pods", namespace).await?;
        let degraded = match state.degrade_after.get_mut(namespace) {
            Some(0) => true,
            Some(left) => {
                *left -= 1;
                false
            }
            None => false,
        };
        let mut pods = state.pods.get(namespace).cloned().unwrap_or_default();
        if degraded {
            for pod in &mut pods {
                pod.ready = false;
                pod.phase = "CrashLoopBackOff".to_string();
            }
        }
        Ok(pods)
    }

    async fn get_nodes(&self) -> PortResult<Vec<NodeInfo>> {
        let state = self.enter("get_nodes", "").await?;
        Ok(state.nodes.clone())
    }

    async fn get_namespaces(&self) -> PortResult<Vec<String>> {
        let state = self.enter("get_namespaces", "").await?;
        Ok(state.namespaces.keys().cloned().collect())
    }

    async fn get_storage_classes(&self) -> PortResult<Vec<String>> {
        let state = self.enter("get_storage_classes", "").await?;
        Ok(state.storage_classes.clone())
    }
}

// ── Releases ──────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct ReleaseStore {
    /// (namespace, name) → revision history, oldest first.
    releases: BTreeMap<(String, String), Vec<ReleaseInfo>>,
    requests: Vec<ReleaseRequest>,
    latency: Duration,
    failures: Failures,
    calls: Vec<String>,
}

/// A fake release tool with revision history.
#[derive(Debug, Clone, Default)]
pub struct InMemoryReleases {
    state: Arc<Mutex<ReleaseStore>>,
}

impl InMemoryReleases {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a deployed release at `revision`.
    pub async fn seed(&self, name: &str, namespace: &str, chart: &str, version: &str, revision: u32) {
        let history = (1..=revision)
            .map(|rev| ReleaseInfo {
                name: name.to_string(),
                namespace: namespace.to_string(),
                revision: rev,
                status: if rev == revision {
                    ReleaseState::Deployed
                } else {
                    ReleaseState::Superseded
                },
                chart: chart.to_string(),
                version: version.to_string(),
            })
            .collect();
        self.state
            .lock()
            .await
            .releases
            .insert((namespace.to_string(), name.to_string()), history);
    }

    /// Latest revision of a release, if it exists.
    pub async fn current(&self, name: &str, namespace: &str) -> Option<ReleaseInfo> {
        self.state
            .lock()
            .await
            .releases
            .get(&(namespace.to_string(), name.to_string()))
            .and_then(|h| h.last().cloned())
    }

    /// Force the status of the latest revision.
    pub async fn set_status(&self, name: &str, namespace: &str, status: ReleaseState) {
        let mut state = self.state.lock().await;
        if let Some(rev) = state
            .releases
            .get_mut(&(namespace.to_string(), name.to_string()))
            .and_then(|h| h.last_mut())
        {
            rev.status = status;
        }
    }

    /// Every install/upgrade request received, in order.
    pub async fn requests(&self) -> Vec<ReleaseRequest> {
        self.state.lock().await.requests.clone()
    }

    /// Delay every call by `latency`.
    pub async fn set_latency(&self, latency: Duration) {
        self.state.lock().await.latency = latency;
    }

    pub async fn fail_next(&self, op: &str, error: PortError) {
        self.state
            .lock()
            .await
            .failures
            .next
            .entry(op.to_string())
            .or_default()
            .push_back(error);
    }

    pub async fn fail_always(&self, op: &str, error: PortError) {
        self.state
            .lock()
            .await
            .failures
            .always
            .insert(op.to_string(), error);
    }

    pub async fn clear_failures(&self) {
        self.state.lock().await.failures = Failures::default();
    }

    /// Every call made, as "<op> <namespace>/<name>".
    pub async fn calls(&self) -> Vec<String> {
        self.state.lock().await.calls.clone()
    }

    async fn enter(&self, op: &str, namespace: &str, name: &str) -> PortResult<()> {
        let latency = {
            let mut state = self.state.lock().await;
            state.calls.push(format!("{op} {namespace}/{name}"));
            if let Some(err) = state.failures.take(op) {
                return Err(err);
            }
            state.latency
        };
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        Ok(())
    }
}

fn deployed(request: &ReleaseRequest, revision: u32) -> ReleaseInfo {
    ReleaseInfo {
        name: request.release_name.clone(),
        namespace: request.namespace.clone(),
        revision,
        status: ReleaseState::Deployed,
        chart: request.chart.clone(),
        version: request.version.clone(),
    }
}

#[async_trait]
impl ReleasePort for InMemoryReleases {
    async fn install(&self, request: &ReleaseRequest) -> PortResult<ReleaseInfo> {
        self.enter("install", &request.namespace, &request.release_name)
            .await?;
        let mut state = self.state.lock().await;
        state.requests.push(request.clone());
        let key = (request.namespace.clone(), request.release_name.clone());
        if state.releases.contains_key(&key) {
            return Err(PortError::Failed(format!(
                "INSTALLATION FAILED: cannot re-use a name that is still in use: {}",
                request.release_name
            )));
        }
        let info = deployed(request, 1);
        state.releases.insert(key, vec![info.clone()]);
        Ok(info)
    }

    async fn upgrade(&self, request: &ReleaseRequest) -> PortResult<ReleaseInfo> {
        self.enter("upgrade", &request.namespace, &request.release_name)
            .await?;
        let mut state = self.state.lock().await;
        state.requests.push(request.clone());
        let key = (request.namespace.clone(), request.release_name.clone());
        let history = state.releases.get_mut(&key).ok_or_else(|| {
            PortError::Failed(format!(
                "UPGRADE FAILED: \"{}\" has no deployed releases",
                request.release_name
            ))
        })?;
        for rev in history.iter_mut() {
            rev.status = ReleaseState::Superseded;
        }
        let revision = history.last().map(|r| r.revision + 1).unwrap_or(1);
        let info = deployed(request, revision);
        history.push(info.clone());
        Ok(info)
    }

    async fn rollback(&self, request: &RollbackRequest) -> PortResult<ReleaseInfo> {
        self.enter("rollback", &request.namespace, &request.release_name)
            .await?;
        let mut state = self.state.lock().await;
        let key = (request.namespace.clone(), request.release_name.clone());
        let history = state.releases.get_mut(&key).ok_or_else(|| {
            PortError::NotFound(format!("release: \"{}\" not found", request.release_name))
        })?;
        let current = history.last().map(|r| r.revision).unwrap_or(0);
        let target = if request.revision == 0 {
            current.saturating_sub(1)
        } else {
            request.revision
        };
        let source = history
            .iter()
            .find(|r| r.revision == target)
            .cloned()
            .ok_or_else(|| PortError::Failed(format!("release has no {target} version")))?;
        for rev in history.iter_mut() {
            rev.status = ReleaseState::Superseded;
        }
        let info = ReleaseInfo {
            revision: current + 1,
            status: ReleaseState::Deployed,
            ..source
        };
        history.push(info.clone());
        Ok(info)
    }

    async fn status(&self, name: &str, namespace: &str) -> PortResult<ReleaseInfo> {
        self.enter("status", namespace, name).await?;
        let state = self.state.lock().await;
        state
            .releases
            .get(&(namespace.to_string(), name.to_string()))
            .and_then(|h| h.last().cloned())
            .ok_or_else(|| PortError::NotFound("release: not found".to_string()))
    }

    async fn uninstall(&self, name: &str, namespace: &str, _timeout: Duration) -> PortResult<()> {
        self.enter("uninstall", namespace, name).await?;
        let mut state = self.state.lock().await;
        state
            .releases
            .remove(&(namespace.to_string(), name.to_string()))
            .map(|_| ())
            .ok_or_else(|| PortError::NotFound(format!("release: \"{name}\" not found")))
    }
}

// ── Metrics ───────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct MetricsState {
    default: MetricsSample,
    /// Per primary namespace overrides.
    by_namespace: BTreeMap<String, MetricsSample>,
    failures: Failures,
    samples: u32,
}

/// Fixed metric samples, optionally per namespace.
#[derive(Debug, Clone, Default)]
pub struct StaticMetrics {
    state: Arc<Mutex<MetricsState>>,
}

impl StaticMetrics {
    /// Every environment reports `sample`.
    pub fn new(sample: MetricsSample) -> Self {
        Self {
            state: Arc::new(Mutex::new(MetricsState {
                default: sample,
                ..Default::default()
            })),
        }
    }

    /// A healthy sample: 0.5% errors, 99.5% success, 120ms p99.
    pub fn healthy() -> Self {
        Self::new(sample(&[
            ("error_rate", 0.005),
            ("success_rate", 0.995),
            ("latency_p99_ms", 120.0),
        ]))
    }

    pub async fn set_for(&self, namespace: &str, sample: MetricsSample) {
        self.state
            .lock()
            .await
            .by_namespace
            .insert(namespace.to_string(), sample);
    }

    pub async fn fail_next(&self, error: PortError) {
        self.state
            .lock()
            .await
            .failures
            .next
            .entry("sample".to_string())
            .or_default()
            .push_back(error);
    }

    /// Number of samples served.
    pub async fn samples(&self) -> u32 {
        self.state.lock().await.samples
    }
}

/// Build a sample from name/value pairs.
pub fn sample(values: &[(&str, f64)]) -> MetricsSample {
    values.iter().map(|(k, v)| (k.to_string(), *v)).collect()
}

#[async_trait]
impl MetricsSource for StaticMetrics {
    async fn sample(&self, env: &Environment) -> PortResult<MetricsSample> {
        let mut state = self.state.lock().await;
        if let Some(err) = state.failures.take("sample") {
            return Err(err);
        }
        state.samples += 1;
        Ok(state
            .by_namespace
            .get(&env.namespace)
            .cloned()
            .unwrap_or_else(|| state.default.clone()))
    }
}
