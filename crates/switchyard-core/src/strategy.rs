//! Blue-Green strategy — the immutable input to one orchestration run.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::types::Environment;

/// How traffic moves from the source to the target environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SwitchType {
    /// All traffic in one step.
    Instant,
    /// Four equal steps: 25/50/75/100.
    Gradual,
    /// Five weighted steps: 5/10/25/50/100.
    Canary,
}

impl SwitchType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SwitchType::Instant => "instant",
            SwitchType::Gradual => "gradual",
            SwitchType::Canary => "canary",
        }
    }
}

impl fmt::Display for SwitchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shape of the traffic switch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwitchStrategy {
    #[serde(rename = "type")]
    pub switch_type: SwitchType,
    /// Time budget across all phases.
    #[serde(with = "crate::duration::serde_str")]
    pub total_duration: Duration,
    /// Advisory phase count; the planner uses the fixed count per type.
    #[serde(default)]
    pub phase_count: Option<u32>,
}

impl Default for SwitchStrategy {
    fn default() -> Self {
        Self {
            switch_type: SwitchType::Canary,
            total_duration: Duration::from_secs(600),
            phase_count: None,
        }
    }
}

/// Health polling during each phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthCheckStrategy {
    #[serde(with = "crate::duration::serde_str")]
    pub interval: Duration,
    /// Timeout for a single health check.
    #[serde(with = "crate::duration::serde_str")]
    pub timeout: Duration,
    /// Consecutive failures before a phase is failed.
    pub failure_threshold: u32,
}

impl Default for HealthCheckStrategy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            timeout: Duration::from_secs(5),
            failure_threshold: 3,
        }
    }
}

/// When and how a failed switch is reverted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollbackStrategy {
    pub auto_rollback: bool,
    /// Deadline for the rollback itself, and the window after a switch
    /// during which a health failure still triggers one.
    #[serde(with = "crate::duration::serde_str")]
    pub rollback_timeout: Duration,
    /// Minimum percentage of ready pods for an environment to count as healthy.
    pub health_threshold_percent: u32,
}

impl Default for RollbackStrategy {
    fn default() -> Self {
        Self {
            auto_rollback: true,
            rollback_timeout: Duration::from_secs(300),
            health_threshold_percent: 80,
        }
    }
}

/// What a violated validation rule does to the phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleAction {
    /// Fail the phase (and let the rollback policy decide).
    Rollback,
    /// Record a warning; never blocks.
    Alert,
}

/// A metric condition checked before every phase, e.g. `error_rate < 0.1`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationRule {
    pub name: String,
    pub condition: String,
    pub action: RuleAction,
}

impl ValidationRule {
    pub fn new(name: &str, condition: &str, action: RuleAction) -> Self {
        Self {
            name: name.to_string(),
            condition: condition.to_string(),
            action,
        }
    }
}

/// Comparison operator in a rule condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Comparison {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

impl Comparison {
    fn symbol(&self) -> &'static str {
        match self {
            Comparison::Lt => "<",
            Comparison::Le => "<=",
            Comparison::Gt => ">",
            Comparison::Ge => ">=",
            Comparison::Eq => "==",
            Comparison::Ne => "!=",
        }
    }
}

/// A parsed `<metric> <op> <number>` condition.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleCondition {
    pub metric: String,
    pub op: Comparison,
    pub threshold: f64,
}

impl RuleCondition {
    /// Parse a condition such as `error_rate < 0.1`.
    pub fn parse(s: &str) -> Option<Self> {
        // Two-character operators first so "<=" is not read as "<".
        const OPS: &[(&str, Comparison)] = &[
            ("<=", Comparison::Le),
            (">=", Comparison::Ge),
            ("==", Comparison::Eq),
            ("!=", Comparison::Ne),
            ("<", Comparison::Lt),
            (">", Comparison::Gt),
        ];

        for (symbol, op) in OPS {
            if let Some((lhs, rhs)) = s.split_once(symbol) {
                let metric = lhs.trim();
                if metric.is_empty()
                    || !metric
                        .chars()
                        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
                {
                    return None;
                }
                let threshold = rhs.trim().parse::<f64>().ok()?;
                return Some(Self {
                    metric: metric.to_string(),
                    op: *op,
                    threshold,
                });
            }
        }
        None
    }

    pub fn holds(&self, value: f64) -> bool {
        match self.op {
            Comparison::Lt => value < self.threshold,
            Comparison::Le => value <= self.threshold,
            Comparison::Gt => value > self.threshold,
            Comparison::Ge => value >= self.threshold,
            Comparison::Eq => (value - self.threshold).abs() < f64::EPSILON,
            Comparison::Ne => (value - self.threshold).abs() >= f64::EPSILON,
        }
    }
}

impl fmt::Display for RuleCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.metric, self.op.symbol(), self.threshold)
    }
}

/// Where run telemetry goes. Carried through to environment labels.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MonitoringConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Extra labels stamped on every namespace the run touches.
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub dashboard_url: Option<String>,
}

/// Immutable input to one orchestration run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlueGreenStrategy {
    /// Currently live environment.
    pub source_environment: Environment,
    /// Environment traffic moves to.
    pub target_environment: Environment,
    pub switch_strategy: SwitchStrategy,
    pub health_check_strategy: HealthCheckStrategy,
    pub rollback_strategy: RollbackStrategy,
    #[serde(default)]
    pub validation_rules: Vec<ValidationRule>,
    #[serde(default)]
    pub monitoring_config: MonitoringConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_condition() {
        let c = RuleCondition::parse("error_rate < 0.1").unwrap();
        assert_eq!(c.metric, "error_rate");
        assert_eq!(c.op, Comparison::Lt);
        assert!((c.threshold - 0.1).abs() < f64::EPSILON);
        assert!(c.holds(0.05));
        assert!(!c.holds(0.1));
    }

    #[test]
    fn two_char_operators_win() {
        let c = RuleCondition::parse("latency_p99_ms<=250").unwrap();
        assert_eq!(c.op, Comparison::Le);
        assert!(c.holds(250.0));

        let c = RuleCondition::parse("success_rate >= 0.99").unwrap();
        assert_eq!(c.op, Comparison::Ge);
        assert!(!c.holds(0.98));
    }

    #[test]
    fn rejects_malformed_conditions() {
        assert!(RuleCondition::parse("error_rate").is_none());
        assert!(RuleCondition::parse("< 0.1").is_none());
        assert!(RuleCondition::parse("error rate < 0.1").is_none());
        assert!(RuleCondition::parse("error_rate < low").is_none());
    }

    #[test]
    fn condition_displays_normalized() {
        let c = RuleCondition::parse("  error_rate<0.5 ").unwrap();
        assert_eq!(c.to_string(), "error_rate < 0.5");
    }

    #[test]
    fn switch_strategy_reads_human_durations() {
        let s: SwitchStrategy = toml::from_str(
            r#"
            type = "gradual"
            total_duration = "4m"
            "#,
        )
        .unwrap();
        assert_eq!(s.switch_type, SwitchType::Gradual);
        assert_eq!(s.total_duration, Duration::from_secs(240));
        assert_eq!(s.phase_count, None);
    }
}
