//! Domain types shared across Switchyard crates.
//!
//! Environments, error classifications, and recovery actions. All types
//! are serializable so results can be printed as JSON by the CLI and
//! recorded by callers.

use std::collections::BTreeMap;
use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Seconds since the Unix epoch.
pub fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

// ── Environment ───────────────────────────────────────────────────

/// Which side of a Blue/Green pair an environment is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvironmentKind {
    Blue,
    Green,
}

impl EnvironmentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnvironmentKind::Blue => "blue",
            EnvironmentKind::Green => "green",
        }
    }

    /// The other side of the pair.
    pub fn opposite(&self) -> Self {
        match self {
            EnvironmentKind::Blue => EnvironmentKind::Green,
            EnvironmentKind::Green => EnvironmentKind::Blue,
        }
    }
}

impl fmt::Display for EnvironmentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of an environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvironmentState {
    Pending,
    Standby,
    Active,
    Switching,
}

/// Health as last observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthState {
    Healthy,
    Degraded,
}

/// How much live traffic an environment receives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrafficLevel {
    None,
    Partial,
    Full,
}

impl TrafficLevel {
    /// Traffic level corresponding to a routing weight percentage.
    pub fn from_percent(percent: u32) -> Self {
        if percent == 0 {
            TrafficLevel::None
        } else if percent >= 100 {
            TrafficLevel::Full
        } else {
            TrafficLevel::Partial
        }
    }
}

/// Observed status of an environment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentStatus {
    pub state: EnvironmentState,
    pub health: HealthState,
    pub traffic: TrafficLevel,
    /// Unix timestamp of the last status change or check.
    pub last_checked: u64,
    pub message: String,
}

impl EnvironmentStatus {
    pub fn pending() -> Self {
        Self {
            state: EnvironmentState::Pending,
            health: HealthState::Healthy,
            traffic: TrafficLevel::None,
            last_checked: epoch_secs(),
            message: "pending".to_string(),
        }
    }
}

/// A chart deployed into an environment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartRef {
    pub name: String,
    pub version: String,
    /// Repository or local path the chart is pulled from.
    #[serde(default)]
    pub repository: Option<String>,
    /// Whether the chart exposes `image.repository` / `image.tag` values.
    #[serde(default)]
    pub image_override: bool,
}

impl ChartRef {
    pub fn new(name: &str, version: &str) -> Self {
        Self {
            name: name.to_string(),
            version: version.to_string(),
            repository: None,
            image_override: false,
        }
    }

    pub fn supports_image_override(&self) -> bool {
        self.image_override
    }

    /// Chart reference as handed to the release tool.
    pub fn reference(&self) -> String {
        match &self.repository {
            Some(repo) => format!("{}/{}", repo.trim_end_matches('/'), self.name),
            None => self.name.clone(),
        }
    }
}

/// Resource shape of an environment, as Kubernetes quantities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceLimits {
    pub cpu: String,
    pub memory: String,
    #[serde(default)]
    pub storage: Option<String>,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            cpu: "2".to_string(),
            memory: "4Gi".to_string(),
            storage: None,
        }
    }
}

/// Routing configuration for an environment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrafficConfig {
    pub load_balancer: String,
    pub ingress_class: String,
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
    /// Percentage of live traffic currently routed here.
    #[serde(default)]
    pub weight: u32,
}

/// Role a data store plays inside an environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum DataStoreRole {
    Primary,
    /// Read-only replica following `source` (a store in the other environment).
    ReadReplica { source: String },
}

/// A stateful backing store (database, cache) owned by an environment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataStore {
    pub name: String,
    /// Engine, e.g. "postgres" or "redis".
    pub engine: String,
    #[serde(flatten)]
    pub role: DataStoreRole,
}

/// One logical deployment target of a Blue/Green pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Environment {
    /// Unique name, `<kind>-<unix timestamp>`.
    pub name: String,
    pub kind: EnvironmentKind,
    /// Primary namespace.
    pub namespace: String,
    /// Every namespace the environment spans (includes `namespace`).
    pub namespaces: Vec<String>,
    pub charts: Vec<ChartRef>,
    pub resource_limits: ResourceLimits,
    pub traffic_config: TrafficConfig,
    #[serde(default)]
    pub data_stores: Vec<DataStore>,
    #[serde(default)]
    pub monitoring_labels: BTreeMap<String, String>,
    /// Secrets created in the primary namespace.
    #[serde(default)]
    pub secrets: Vec<String>,
    pub status: EnvironmentStatus,
}

impl Environment {
    /// Release name used for a chart inside this environment.
    pub fn release_name(&self, chart: &ChartRef) -> String {
        format!("{}-{}", chart.name, self.kind.as_str())
    }

    /// Route `percent` of live traffic here and update the traffic level.
    pub fn set_traffic_percent(&mut self, percent: u32) {
        let percent = percent.min(100);
        self.traffic_config.weight = percent;
        self.status.traffic = TrafficLevel::from_percent(percent);
        self.status.last_checked = epoch_secs();
    }

    /// Set state and message together.
    pub fn set_state(&mut self, state: EnvironmentState, message: &str) {
        self.status.state = state;
        self.status.message = message.to_string();
        self.status.last_checked = epoch_secs();
    }

    /// Active and carrying all traffic.
    pub fn is_live(&self) -> bool {
        self.status.state == EnvironmentState::Active && self.status.traffic == TrafficLevel::Full
    }
}

// ── Error classification ─────────────────────────────────────────

/// Broad class of a deployment failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Configuration,
    Timeout,
    Resource,
    Permission,
    Validation,
    Network,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

/// Classification type used when no pattern matches.
pub const UNKNOWN_ERROR_TYPE: &str = "unknown";

/// Result of classifying a rendered error message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorClassification {
    /// Taxonomy key, e.g. `release_not_found`.
    #[serde(rename = "type")]
    pub error_type: String,
    pub category: ErrorCategory,
    pub severity: Severity,
    pub retriable: bool,
    pub reason: String,
    pub suggestion: String,
}

impl ErrorClassification {
    pub fn is_unknown(&self) -> bool {
        self.error_type == UNKNOWN_ERROR_TYPE
    }
}

// ── Recovery ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Medium,
    High,
}

/// What a recovery action does, with the data each kind needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RecoveryActionKind {
    /// Re-run the failed operation.
    Retry {
        #[serde(default = "default_attempts")]
        attempts: u32,
        #[serde(default, with = "crate::duration::serde_str")]
        delay: Duration,
        /// Replacement operation timeout, if the retry should wait longer.
        #[serde(default, with = "crate::duration::serde_opt_str")]
        timeout: Option<Duration>,
        /// Install the release instead of upgrading it.
        #[serde(default)]
        install_instead: bool,
    },
    /// Roll the release back; `None` means the previous revision.
    Rollback {
        #[serde(default)]
        revision: Option<u32>,
    },
    Force,
    Cleanup,
    /// Operator intervention; never executes anything.
    Manual,
}

fn default_attempts() -> u32 {
    1
}

impl RecoveryActionKind {
    pub fn name(&self) -> &'static str {
        match self {
            RecoveryActionKind::Retry { .. } => "retry",
            RecoveryActionKind::Rollback { .. } => "rollback",
            RecoveryActionKind::Force => "force",
            RecoveryActionKind::Cleanup => "cleanup",
            RecoveryActionKind::Manual => "manual",
        }
    }
}

impl fmt::Display for RecoveryActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A concrete remediation step suggested for a classified error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryAction {
    #[serde(flatten)]
    pub kind: RecoveryActionKind,
    pub priority: Priority,
    pub description: String,
    /// Human-readable command hint.
    #[serde(default)]
    pub command: String,
    #[serde(default)]
    pub auto_retry: bool,
    #[serde(default)]
    pub requires_confirmation: bool,
}

impl RecoveryAction {
    pub fn retry_count(&self) -> u32 {
        match &self.kind {
            RecoveryActionKind::Retry { attempts, .. } => *attempts,
            _ => 0,
        }
    }

    pub fn retry_delay(&self) -> Duration {
        match &self.kind {
            RecoveryActionKind::Retry { delay, .. } => *delay,
            _ => Duration::ZERO,
        }
    }

    /// Safe to run without an operator.
    pub fn is_automatic(&self) -> bool {
        self.auto_retry && !self.requires_confirmation
    }
}

/// Outcome of executing one recovery action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryResult {
    pub action: RecoveryAction,
    pub success: bool,
    pub started_at: u64,
    pub finished_at: u64,
    pub duration: Duration,
    pub error: Option<String>,
    /// Only populated for manual actions.
    pub manual_steps: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env() -> Environment {
        Environment {
            name: "green-1".to_string(),
            kind: EnvironmentKind::Green,
            namespace: "shop-green".to_string(),
            namespaces: vec!["shop-green".to_string()],
            charts: vec![ChartRef::new("web", "1.2.0")],
            resource_limits: ResourceLimits::default(),
            traffic_config: TrafficConfig {
                load_balancer: "green-lb".to_string(),
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

    #[test]
    fn traffic_level_follows_percent() {
        assert_eq!(TrafficLevel::from_percent(0), TrafficLevel::None);
        assert_eq!(TrafficLevel::from_percent(25), TrafficLevel::Partial);
        assert_eq!(TrafficLevel::from_percent(100), TrafficLevel::Full);
    }

    #[test]
    fn release_name_is_chart_and_kind() {
        let env = env();
        assert_eq!(env.release_name(&env.charts[0]), "web-green");
    }

    #[test]
    fn set_traffic_percent_clamps_and_updates_level() {
        let mut env = env();
        env.set_traffic_percent(150);
        assert_eq!(env.traffic_config.weight, 100);
        assert_eq!(env.status.traffic, TrafficLevel::Full);
    }

    #[test]
    fn recovery_action_parses_from_toml() {
        let action: RecoveryAction = toml::from_str(
            r#"
            type = "retry"
            attempts = 2
            delay = "30s"
            timeout = "20m"
            priority = "high"
            description = "retry with a longer timeout"
            auto_retry = true
            "#,
        )
        .unwrap();
        assert_eq!(action.retry_count(), 2);
        assert_eq!(action.retry_delay(), Duration::from_secs(30));
        assert!(action.is_automatic());
        match action.kind {
            RecoveryActionKind::Retry { timeout, .. } => {
                assert_eq!(timeout, Some(Duration::from_secs(1200)))
            }
            other => panic!("expected retry, got {other}"),
        }
    }

    #[test]
    fn priority_orders_high_first_when_reversed() {
        let mut p = vec![Priority::Low, Priority::High, Priority::Medium];
        p.sort_by(|a, b| b.cmp(a));
        assert_eq!(p, vec![Priority::High, Priority::Medium, Priority::Low]);
    }
}
