//! Error classifier — an ordered pattern table over rendered messages.
//!
//! Patterns are regexes matched against the lower-cased error text. The
//! first matching entry wins, so broader patterns sit below narrower ones:
//! a timed-out upgrade that mentions a conflict is still a timeout.

use regex::Regex;
use switchyard_core::config::ErrorPatternConfig;
use switchyard_core::{
    ErrorCategory, ErrorClassification, Severity, UNKNOWN_ERROR_TYPE,
};
use tracing::warn;

use crate::error::{RecoveryError, Result};

/// One named entry of the classification table.
#[derive(Debug, Clone)]
pub struct ErrorPattern {
    pub name: String,
    pub patterns: Vec<Regex>,
    pub category: ErrorCategory,
    pub severity: Severity,
    pub retriable: bool,
    pub description: String,
    pub suggestion: String,
}

impl ErrorPattern {
    fn matches(&self, text: &str) -> bool {
        self.patterns.iter().any(|re| re.is_match(text))
    }

    fn from_config(cfg: &ErrorPatternConfig) -> Result<Self> {
        let patterns = cfg
            .patterns
            .iter()
            .map(|p| Regex::new(&p.to_lowercase()))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|source| RecoveryError::InvalidPattern {
                name: cfg.name.clone(),
                source,
            })?;
        Ok(Self {
            name: cfg.name.clone(),
            patterns,
            category: cfg.category,
            severity: cfg.severity,
            retriable: cfg.retriable,
            description: cfg.description.clone(),
            suggestion: cfg.suggestion.clone(),
        })
    }
}

type BuiltinRow = (
    &'static str,
    &'static [&'static str],
    ErrorCategory,
    Severity,
    bool,
    &'static str,
    &'static str,
);

/// Built-in classification table, in match order.
/// `[[error_patterns]]` in switchyard.toml extends or replaces entries.
fn builtin_rows() -> Vec<BuiltinRow> {
    use ErrorCategory::*;
    vec![
        (
            "release_not_found",
            &[
                r#"release:?\s*"?[\w.-]*"?\s*not found"#,
                r"has no deployed releases",
            ],
            Configuration,
            Severity::Medium,
            true,
            "release does not exist",
            "install the release instead of upgrading it",
        ),
        (
            "timeout_error",
            &[
                r"timed out",
                r"timeout",
                r"deadline exceeded",
            ],
            Timeout,
            Severity::High,
            true,
            "operation did not finish before its deadline",
            "retry with a longer timeout, or roll back if the release is stuck",
        ),
        (
            "resource_conflict",
            &[
                r"conflict",
                r"already exists",
                r"cannot re-use a name",
                r"another operation \(install/upgrade/rollback\) is in progress",
            ],
            Resource,
            Severity::High,
            false,
            "existing resources conflict with the release",
            "remove the conflicting resources or force the update",
        ),
        (
            "insufficient_permissions",
            &[
                r"forbidden",
                r"unauthorized",
                r"permission denied",
                r"cannot (get|list|watch|create|update|patch|delete) resource",
            ],
            Permission,
            Severity::Critical,
            false,
            "service account lacks the required permissions",
            "grant the deploying identity the missing RBAC permissions",
        ),
        (
            "chart_not_found",
            &[
                r#"chart\s*"?[\w./-]*"?\s*not found"#,
                r"failed to download",
                r"no chart (name|version) found",
                r"repo [\w./-]+ not found",
            ],
            Configuration,
            Severity::High,
            false,
            "chart or chart version could not be resolved",
            "check the chart name, version, and repository",
        ),
        (
            "values_validation_error",
            &[
                r"values don't meet the specifications",
                r"validation failed",
                r"error validating",
                r"invalid value",
                r"unknown field",
            ],
            Validation,
            Severity::Medium,
            false,
            "chart values failed validation",
            "fix the values against the chart's schema",
        ),
        (
            "network_error",
            &[
                r"connection refused",
                r"connection reset",
                r"no such host",
                r"network is unreachable",
                r"tls handshake",
            ],
            Network,
            Severity::Medium,
            true,
            "cluster or registry could not be reached",
            "check connectivity to the cluster API and chart registry",
        ),
        (
            "storage_error",
            &[
                r"persistentvolumeclaim",
                r"storageclass",
                r"no persistent volumes available",
                r"insufficient storage",
                r"volume .* (failed|not found)",
            ],
            Resource,
            Severity::High,
            false,
            "storage could not be provisioned",
            "check storage classes and volume capacity",
        ),
    ]
}

/// Immutable, ordered classification table. Built once, shared freely.
#[derive(Debug, Clone)]
pub struct ErrorClassifier {
    patterns: Vec<ErrorPattern>,
}

impl Default for ErrorClassifier {
    fn default() -> Self {
        Self::builtin()
    }
}

impl ErrorClassifier {
    /// The built-in table only.
    pub fn builtin() -> Self {
        let patterns = builtin_rows()
            .into_iter()
            .map(
                |(name, regexes, category, severity, retriable, description, suggestion)| {
                    ErrorPattern {
                        name: name.to_string(),
                        patterns: regexes
                            .iter()
                            .filter_map(|r| Regex::new(r).ok())
                            .collect(),
                        category,
                        severity,
                        retriable,
                        description: description.to_string(),
                        suggestion: suggestion.to_string(),
                    }
                },
            )
            .collect();
        Self { patterns }
    }

    /// The built-in table merged with configured entries.
    ///
    /// An entry named like a built-in replaces it in place. New entries
    /// are checked before every built-in.
    pub fn with_patterns(configs: &[ErrorPatternConfig]) -> Result<Self> {
        let mut table = Self::builtin();
        let mut extra = Vec::new();
        for cfg in configs {
            let pattern = ErrorPattern::from_config(cfg)?;
            match table.patterns.iter_mut().find(|p| p.name == pattern.name) {
                Some(slot) => *slot = pattern,
                None => extra.push(pattern),
            }
        }
        extra.append(&mut table.patterns);
        table.patterns = extra;
        Ok(table)
    }

    pub fn patterns(&self) -> &[ErrorPattern] {
        &self.patterns
    }

    /// Classify a rendered error message raised by `operation`.
    pub fn classify(&self, message: &str, operation: &str) -> ErrorClassification {
        let text = message.to_lowercase();
        let classification = match self.patterns.iter().find(|p| p.matches(&text)) {
            Some(p) => ErrorClassification {
                error_type: p.name.clone(),
                category: p.category,
                severity: p.severity,
                retriable: p.retriable,
                reason: format!("{} during {operation}", p.description),
                suggestion: p.suggestion.clone(),
            },
            None => ErrorClassification {
                error_type: UNKNOWN_ERROR_TYPE.to_string(),
                category: ErrorCategory::Unknown,
                severity: Severity::High,
                retriable: false,
                reason: format!("unrecognized failure during {operation}"),
                suggestion: "inspect the release and cluster events manually".to_string(),
            },
        };

        warn!(
            error_type = %classification.error_type,
            category = ?classification.category,
            operation,
            error = message,
            "classified error"
        );
        classification
    }

    /// Classify any error by its rendered message.
    pub fn classify_error(
        &self,
        err: &(dyn std::error::Error + 'static),
        operation: &str,
    ) -> ErrorClassification {
        self.classify(&err.to_string(), operation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify(msg: &str) -> ErrorClassification {
        ErrorClassifier::builtin().classify(msg, "upgrade")
    }

    #[test]
    fn builtin_table_compiles_completely() {
        let table = ErrorClassifier::builtin();
        for (row, pattern) in builtin_rows().iter().zip(table.patterns()) {
            assert_eq!(row.1.len(), pattern.patterns.len(), "{}", pattern.name);
        }
        assert_eq!(table.patterns().len(), 8);
    }

    #[test]
    fn release_not_found() {
        let c = classify("release my-app not found");
        assert_eq!(c.error_type, "release_not_found");
        assert_eq!(c.category, ErrorCategory::Configuration);
        assert!(c.retriable);

        assert_eq!(classify("Error: release: not found").error_type, "release_not_found");
        assert_eq!(
            classify(r#"UPGRADE FAILED: "web-green" has no deployed releases"#).error_type,
            "release_not_found"
        );
    }

    #[test]
    fn timeout_error() {
        let c = classify("UPGRADE FAILED: timed out waiting for the condition");
        assert_eq!(c.error_type, "timeout_error");
        assert_eq!(c.category, ErrorCategory::Timeout);
        assert!(c.retriable);
        assert_eq!(
            classify("context deadline exceeded").error_type,
            "timeout_error"
        );
    }

    #[test]
    fn timeout_wins_over_conflict() {
        let c = classify("timed out waiting for resource: conflict on deployment web");
        assert_eq!(c.error_type, "timeout_error");
    }

    #[test]
    fn resource_conflict() {
        let c = classify(
            "rendered manifests contain a resource that already exists. Unable to continue with install",
        );
        assert_eq!(c.error_type, "resource_conflict");
        assert_eq!(c.category, ErrorCategory::Resource);
        assert!(!c.retriable);
        assert_eq!(
            classify("another operation (install/upgrade/rollback) is in progress").error_type,
            "resource_conflict"
        );
    }

    #[test]
    fn insufficient_permissions() {
        let c = classify(
            r#"secrets is forbidden: User "system:serviceaccount:ci:deployer" cannot list resource "secrets""#,
        );
        assert_eq!(c.error_type, "insufficient_permissions");
        assert_eq!(c.category, ErrorCategory::Permission);
        assert!(!c.retriable);
    }

    #[test]
    fn chart_not_found() {
        let c = classify(r#"Error: chart "charts/web" not found in repository"#);
        assert_eq!(c.error_type, "chart_not_found");
        assert_eq!(
            classify("failed to download \"web\" at version \"9.9.9\"").error_type,
            "chart_not_found"
        );
    }

    #[test]
    fn values_validation_error() {
        let c = classify("values don't meet the specifications of the schema(s) in the following chart(s)");
        assert_eq!(c.error_type, "values_validation_error");
        assert_eq!(c.category, ErrorCategory::Validation);
        assert!(!c.retriable);
    }

    #[test]
    fn network_error() {
        let c = classify("dial tcp 10.0.0.1:6443: connect: connection refused");
        assert_eq!(c.error_type, "network_error");
        assert_eq!(c.category, ErrorCategory::Network);
        assert!(c.retriable);
    }

    #[test]
    fn storage_error() {
        let c = classify(r#"persistentvolumeclaim "data-web-0" is pending"#);
        assert_eq!(c.error_type, "storage_error");
        assert_eq!(c.category, ErrorCategory::Resource);
    }

    #[test]
    fn unmatched_text_is_unknown() {
        let c = classify("something odd happened");
        assert!(c.is_unknown());
        assert!(!c.retriable);
        assert_eq!(c.category, ErrorCategory::Unknown);
    }

    #[test]
    fn classification_is_pure() {
        let table = ErrorClassifier::builtin();
        let a = table.classify("connection reset by peer", "install");
        let _ = table.classify("forbidden", "install");
        let b = table.classify("connection reset by peer", "install");
        assert_eq!(a, b);
        assert!(a.reason.contains("install"));
    }

    #[test]
    fn configured_patterns_extend_and_override() {
        let configs = vec![
            ErrorPatternConfig {
                name: "quota_exceeded".to_string(),
                patterns: vec!["exceeded quota".to_string()],
                category: ErrorCategory::Resource,
                severity: Severity::High,
                retriable: false,
                description: "namespace quota exhausted".to_string(),
                suggestion: "raise the quota".to_string(),
            },
            ErrorPatternConfig {
                name: "network_error".to_string(),
                patterns: vec!["connection refused".to_string(), "EOF".to_string()],
                category: ErrorCategory::Network,
                severity: Severity::Low,
                retriable: true,
                description: "network hiccup".to_string(),
                suggestion: "retry".to_string(),
            },
        ];
        let table = ErrorClassifier::with_patterns(&configs).unwrap();

        assert_eq!(table.patterns()[0].name, "quota_exceeded");
        assert_eq!(table.patterns().len(), 9);
        assert_eq!(
            table.classify("pods \"web\" is forbidden: exceeded quota", "install").error_type,
            "quota_exceeded"
        );
        let c = table.classify("unexpected EOF", "install");
        assert_eq!(c.error_type, "network_error");
        assert_eq!(c.severity, Severity::Low);
    }

    #[test]
    fn bad_configured_regex_is_rejected() {
        let configs = vec![ErrorPatternConfig {
            name: "broken".to_string(),
            patterns: vec!["(unclosed".to_string()],
            category: ErrorCategory::Network,
            severity: Severity::Low,
            retriable: false,
            description: String::new(),
            suggestion: String::new(),
        }];
        assert!(matches!(
            ErrorClassifier::with_patterns(&configs),
            Err(RecoveryError::InvalidPattern { .. })
        ));
    }
}
