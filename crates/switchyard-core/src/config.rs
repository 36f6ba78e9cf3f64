//! switchyard.toml configuration parser.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::strategy::{
    HealthCheckStrategy, MonitoringConfig, RollbackStrategy, RuleAction, RuleCondition,
    SwitchStrategy, SwitchType, ValidationRule,
};
use crate::types::{
    ChartRef, DataStore, EnvironmentKind, ErrorCategory, RecoveryAction, ResourceLimits, Severity,
    TrafficConfig,
};

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to render config: {0}")]
    Render(#[from] toml::ser::Error),

    #[error("validation rule {name:?} has an invalid condition: {condition:?}")]
    InvalidRule { name: String, condition: String },

    #[error("error pattern {name:?} has an invalid regex {pattern:?}: {reason}")]
    InvalidPattern {
        name: String,
        pattern: String,
        reason: String,
    },

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwitchyardConfig {
    pub project: ProjectConfig,
    #[serde(default)]
    pub switch: SwitchStrategy,
    #[serde(default)]
    pub health: HealthCheckStrategy,
    #[serde(default)]
    pub rollback: RollbackStrategy,
    #[serde(default)]
    pub validation_rules: Vec<ValidationRule>,
    #[serde(default)]
    pub monitoring: MonitoringConfig,
    #[serde(default)]
    pub readiness: ReadinessConfig,
    /// Template for the environment a run stands up.
    pub environment: Option<EnvironmentConfig>,
    /// Extra classifier patterns, checked before the built-in table.
    #[serde(default)]
    pub error_patterns: Vec<ErrorPatternConfig>,
    /// Advisor overrides keyed by classification type.
    #[serde(default)]
    pub recovery: Vec<RecoveryRuleConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    pub name: String,
    pub description: Option<String>,
}

/// System readiness inputs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessConfig {
    /// Releases that must be deployed before a run may start.
    #[serde(default)]
    pub dependencies: Vec<DependencyRef>,
    /// TLS secrets whose certificates must be present and unexpired.
    #[serde(default)]
    pub tls_secrets: Vec<SecretRef>,
    /// Certificates expiring inside this window produce a warning.
    #[serde(default = "default_cert_warning", with = "crate::duration::serde_str")]
    pub cert_warning: Duration,
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self {
            dependencies: Vec::new(),
            tls_secrets: Vec::new(),
            cert_warning: default_cert_warning(),
        }
    }
}

fn default_cert_warning() -> Duration {
    Duration::from_secs(14 * 24 * 3600)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DependencyRef {
    pub release: String,
    pub namespace: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecretRef {
    pub name: String,
    pub namespace: String,
}

/// Everything needed to stand up one environment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentConfig {
    pub kind: EnvironmentKind,
    /// First entry is the primary namespace.
    pub namespaces: Vec<String>,
    #[serde(default)]
    pub charts: Vec<ChartRef>,
    #[serde(default)]
    pub resource_limits: ResourceLimits,
    pub traffic: TrafficConfig,
    #[serde(default)]
    pub data_stores: Vec<DataStore>,
    #[serde(default)]
    pub monitoring_labels: BTreeMap<String, String>,
    /// Secrets created in the primary namespace.
    #[serde(default)]
    pub secrets: BTreeMap<String, BTreeMap<String, String>>,
}

/// One classifier table entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorPatternConfig {
    /// Classification type, e.g. `release_not_found`.
    pub name: String,
    /// Regexes matched against the lower-cased error text.
    pub patterns: Vec<String>,
    pub category: ErrorCategory,
    pub severity: Severity,
    #[serde(default)]
    pub retriable: bool,
    pub description: String,
    pub suggestion: String,
}

/// Advisor entry for one classification type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryRuleConfig {
    pub classification: String,
    pub actions: Vec<RecoveryAction>,
}

impl SwitchyardConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&content)
    }

    /// Parse and validate config text.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: SwitchyardConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Reject configs that would only fail later, mid-run.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for rule in &self.validation_rules {
            if RuleCondition::parse(&rule.condition).is_none() {
                return Err(ConfigError::InvalidRule {
                    name: rule.name.clone(),
                    condition: rule.condition.clone(),
                });
            }
        }

        for entry in &self.error_patterns {
            if entry.patterns.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "error pattern {:?} has no patterns",
                    entry.name
                )));
            }
            for pattern in &entry.patterns {
                if let Err(e) = regex::Regex::new(pattern) {
                    return Err(ConfigError::InvalidPattern {
                        name: entry.name.clone(),
                        pattern: pattern.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        for rule in &self.recovery {
            if rule.actions.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "recovery entry for {:?} has no actions",
                    rule.classification
                )));
            }
        }

        if self.health.failure_threshold == 0 {
            return Err(ConfigError::Invalid(
                "health.failure_threshold must be at least 1".to_string(),
            ));
        }
        if self.health.interval.is_zero() {
            return Err(ConfigError::Invalid(
                "health.interval must be non-zero".to_string(),
            ));
        }
        if self.rollback.health_threshold_percent > 100 {
            return Err(ConfigError::Invalid(
                "rollback.health_threshold_percent must be at most 100".to_string(),
            ));
        }

        if let Some(env) = &self.environment {
            if env.namespaces.is_empty() {
                return Err(ConfigError::Invalid(
                    "environment.namespaces must name at least one namespace".to_string(),
                ));
            }
        }

        Ok(())
    }

    /// Scaffold a minimal switchyard.toml for a project.
    pub fn scaffold(name: &str) -> Self {
        SwitchyardConfig {
            project: ProjectConfig {
                name: name.to_string(),
                description: None,
            },
            switch: SwitchStrategy {
                switch_type: SwitchType::Canary,
                total_duration: Duration::from_secs(600),
                phase_count: None,
            },
            health: HealthCheckStrategy::default(),
            rollback: RollbackStrategy::default(),
            validation_rules: vec![
                ValidationRule::new("error-rate", "error_rate < 0.1", RuleAction::Rollback),
                ValidationRule::new("latency", "latency_p99_ms < 1000", RuleAction::Alert),
            ],
            monitoring: MonitoringConfig::default(),
            readiness: ReadinessConfig::default(),
            environment: Some(EnvironmentConfig {
                kind: EnvironmentKind::Green,
                namespaces: vec![format!("{name}-green")],
                charts: vec![ChartRef::new(name, "0.1.0")],
                resource_limits: ResourceLimits::default(),
                traffic: TrafficConfig {
                    load_balancer: format!("{name}-green-lb"),
                    ingress_class: "nginx".to_string(),
                    annotations: BTreeMap::new(),
                    weight: 0,
                },
                data_stores: Vec::new(),
                monitoring_labels: BTreeMap::new(),
                secrets: BTreeMap::new(),
            }),
            error_patterns: Vec::new(),
            recovery: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[project]
name = "shop"

[switch]
type = "gradual"
total_duration = "8m"

[health]
interval = "5s"
timeout = "2s"
failure_threshold = 2

[rollback]
auto_rollback = true
rollback_timeout = "5m"
health_threshold_percent = 90

[[validation_rules]]
name = "errors"
condition = "error_rate < 0.05"
action = "rollback"

[readiness]
cert_warning = "72h"

[[readiness.dependencies]]
release = "postgres"
namespace = "data"

[environment]
kind = "green"
namespaces = ["shop-green", "shop-green-jobs"]

[[environment.charts]]
name = "shop"
version = "2.4.1"
image_override = true

[environment.traffic]
load_balancer = "shop-green-lb"
ingress_class = "nginx"

[[environment.data_stores]]
name = "orders-db"
engine = "postgres"
role = "primary"

[[error_patterns]]
name = "quota_exceeded"
patterns = ["exceeded quota"]
category = "resource"
severity = "high"
description = "namespace quota exhausted"
suggestion = "raise the namespace quota"

[[recovery]]
classification = "quota_exceeded"

[[recovery.actions]]
type = "manual"
priority = "high"
description = "Raise the ResourceQuota for the namespace"
command = "kubectl edit resourcequota -n <namespace>"
"#;

    #[test]
    fn parses_full_config() {
        let config = SwitchyardConfig::parse(SAMPLE).unwrap();
        assert_eq!(config.project.name, "shop");
        assert_eq!(config.switch.switch_type, SwitchType::Gradual);
        assert_eq!(config.switch.total_duration, Duration::from_secs(480));
        assert_eq!(config.health.failure_threshold, 2);
        assert_eq!(config.rollback.health_threshold_percent, 90);
        assert_eq!(config.validation_rules.len(), 1);
        assert_eq!(config.readiness.cert_warning, Duration::from_secs(72 * 3600));
        assert_eq!(config.readiness.dependencies[0].release, "postgres");

        let env = config.environment.unwrap();
        assert_eq!(env.kind, EnvironmentKind::Green);
        assert_eq!(env.namespaces.len(), 2);
        assert!(env.charts[0].supports_image_override());
        assert_eq!(env.resource_limits, ResourceLimits::default());

        assert_eq!(config.error_patterns[0].category, ErrorCategory::Resource);
        assert_eq!(config.recovery[0].actions.len(), 1);
    }

    #[test]
    fn defaults_apply_to_missing_sections() {
        let config = SwitchyardConfig::parse("[project]\nname = \"tiny\"\n").unwrap();
        assert_eq!(config.switch.switch_type, SwitchType::Canary);
        assert!(config.rollback.auto_rollback);
        assert!(config.environment.is_none());
    }

    #[test]
    fn rejects_bad_rule_condition() {
        let err = SwitchyardConfig::parse(
            r#"
            [project]
            name = "x"
            [[validation_rules]]
            name = "broken"
            condition = "error_rate is low"
            action = "rollback"
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidRule { .. }));
    }

    #[test]
    fn rejects_bad_pattern_regex() {
        let err = SwitchyardConfig::parse(
            r#"
            [project]
            name = "x"
            [[error_patterns]]
            name = "broken"
            patterns = ["(unclosed"]
            category = "network"
            severity = "low"
            description = "d"
            suggestion = "s"
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidPattern { .. }));
    }

    #[test]
    fn rejects_bad_duration() {
        let err = SwitchyardConfig::parse(
            r#"
            [project]
            name = "x"
            [health]
            interval = "often"
            timeout = "2s"
            failure_threshold = 3
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn scaffold_round_trips_through_toml() {
        let config = SwitchyardConfig::scaffold("shop");
        let text = config.to_toml_string().unwrap();
        let back = SwitchyardConfig::parse(&text).unwrap();
        assert_eq!(back.project.name, "shop");
        assert_eq!(back.validation_rules.len(), 2);
        assert_eq!(
            back.environment.unwrap().namespaces,
            vec!["shop-green".to_string()]
        );
    }

    #[test]
    fn from_file_reads_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("switchyard.toml");
        std::fs::write(&path, SAMPLE).unwrap();
        let config = SwitchyardConfig::from_file(&path).unwrap();
        assert_eq!(config.project.name, "shop");

        let missing = SwitchyardConfig::from_file(&dir.path().join("nope.toml")).unwrap_err();
        assert!(matches!(missing, ConfigError::Io { .. }));
    }
}
