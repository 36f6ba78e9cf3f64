//! Ports — the narrow interfaces to everything outside the orchestrator.
//!
//! Implementations wrap a cluster API client, a chart release tool, and a
//! metrics backend. Errors come back as [`PortError`] carrying the
//! external tool's rendered message; callers classify by message text,
//! never by inspecting the underlying error type.

use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::duration::format_duration;
use crate::types::Environment;

/// Result type alias for port calls.
pub type PortResult<T> = Result<T, PortError>;

/// Errors surfaced by port implementations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PortError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Failed(String),

    #[error("operation timed out: {0}")]
    TimedOut(String),

    #[error("operation cancelled: {0}")]
    Cancelled(String),
}

impl PortError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, PortError::NotFound(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, PortError::Cancelled(_))
    }
}

/// Run a port call under a deadline, aborting early if `cancel` fires.
///
/// `what` names the call in the resulting `TimedOut`/`Cancelled` message.
pub async fn bounded<T, F>(
    what: &str,
    limit: Duration,
    cancel: &CancellationToken,
    fut: F,
) -> PortResult<T>
where
    F: Future<Output = PortResult<T>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(PortError::Cancelled(what.to_string())),
        res = tokio::time::timeout(limit, fut) => match res {
            Ok(r) => r,
            Err(_) => Err(PortError::TimedOut(format!(
                "{what} timed out after {}",
                format_duration(limit)
            ))),
        },
    }
}

// ── Cluster ───────────────────────────────────────────────────────

/// A pod as reported by the cluster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PodInfo {
    pub name: String,
    pub namespace: String,
    pub ready: bool,
    /// Pod phase, e.g. "Running" or "Pending".
    pub phase: String,
}

/// A cluster node and its allocatable capacity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeInfo {
    pub name: String,
    pub ready: bool,
    pub allocatable_cpu_millis: u64,
    pub allocatable_memory_bytes: u64,
}

/// A secret to create or replace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecretSpec {
    pub name: String,
    pub namespace: String,
    pub data: BTreeMap<String, String>,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

/// Metadata of an existing secret.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecretInfo {
    pub name: String,
    pub namespace: String,
    /// Certificate expiry (unix seconds) for TLS secrets.
    pub expires_at: Option<u64>,
}

/// Namespace, workload, and raw resource operations against the cluster.
///
/// The orchestrator only issues idempotent create-if-absent and
/// best-effort apply calls; it never assumes it owns the cluster.
#[async_trait]
pub trait ClusterPort: Send + Sync {
    /// `Ok` if the namespace exists, `NotFound` otherwise.
    async fn get_namespace(&self, name: &str) -> PortResult<()>;

    async fn create_namespace(&self, name: &str) -> PortResult<()>;

    /// Merge labels into a namespace.
    async fn label_namespace(&self, name: &str, labels: &BTreeMap<String, String>)
    -> PortResult<()>;

    /// Create-or-update the objects in a YAML manifest.
    async fn apply_manifest(&self, yaml: &str) -> PortResult<()>;

    async fn apply_secret(&self, secret: &SecretSpec) -> PortResult<()>;

    async fn get_secret(&self, name: &str, namespace: &str) -> PortResult<SecretInfo>;

    async fn delete_resource(&self, kind: &str, name: &str, namespace: &str) -> PortResult<()>;

    /// Scale every workload in a namespace to `replicas`.
    async fn scale_workloads(&self, namespace: &str, replicas: u32) -> PortResult<()>;

    async fn get_pods(&self, namespace: &str) -> PortResult<Vec<PodInfo>>;

    async fn get_nodes(&self) -> PortResult<Vec<NodeInfo>>;

    async fn get_namespaces(&self) -> PortResult<Vec<String>>;

    async fn get_storage_classes(&self) -> PortResult<Vec<String>>;
}

// ── Releases ──────────────────────────────────────────────────────

/// Lifecycle status of a release, as the release tool reports it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReleaseState {
    Deployed,
    Failed,
    PendingInstall,
    PendingUpgrade,
    PendingRollback,
    Superseded,
    Uninstalled,
    Unknown,
}

impl ReleaseState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReleaseState::Deployed => "deployed",
            ReleaseState::Failed => "failed",
            ReleaseState::PendingInstall => "pending-install",
            ReleaseState::PendingUpgrade => "pending-upgrade",
            ReleaseState::PendingRollback => "pending-rollback",
            ReleaseState::Superseded => "superseded",
            ReleaseState::Uninstalled => "uninstalled",
            ReleaseState::Unknown => "unknown",
        }
    }
}

/// An install or upgrade request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReleaseRequest {
    pub release_name: String,
    /// Chart reference, e.g. "bitnami/nginx" or a local path.
    pub chart: String,
    pub version: String,
    pub namespace: String,
    #[serde(default)]
    pub values: BTreeMap<String, serde_json::Value>,
    /// Revert automatically on failure.
    pub atomic: bool,
    /// Block until resources are ready.
    pub wait: bool,
    pub timeout: Duration,
    pub create_namespace: bool,
}

/// A rollback request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollbackRequest {
    pub release_name: String,
    pub namespace: String,
    /// Target revision; 0 means the previous one.
    pub revision: u32,
    pub wait: bool,
    pub timeout: Duration,
}

/// What the release tool knows about a release.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReleaseInfo {
    pub name: String,
    pub namespace: String,
    pub revision: u32,
    pub status: ReleaseState,
    pub chart: String,
    pub version: String,
}

/// Install, upgrade, rollback, status, and uninstall for named charts.
#[async_trait]
pub trait ReleasePort: Send + Sync {
    async fn install(&self, request: &ReleaseRequest) -> PortResult<ReleaseInfo>;

    async fn upgrade(&self, request: &ReleaseRequest) -> PortResult<ReleaseInfo>;

    async fn rollback(&self, request: &RollbackRequest) -> PortResult<ReleaseInfo>;

    /// `NotFound` when no such release exists.
    async fn status(&self, name: &str, namespace: &str) -> PortResult<ReleaseInfo>;

    async fn uninstall(&self, name: &str, namespace: &str, timeout: Duration) -> PortResult<()>;
}

// ── Metrics ───────────────────────────────────────────────────────

/// Named metric values, e.g. `error_rate`, `success_rate`, `latency_p99_ms`.
pub type MetricsSample = BTreeMap<String, f64>;

/// Live metrics for an environment.
#[async_trait]
pub trait MetricsSource: Send + Sync {
    async fn sample(&self, env: &Environment) -> PortResult<MetricsSample>;
}
