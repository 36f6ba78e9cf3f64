//! Recovery advisor — classification type to ordered recovery actions.

use std::collections::HashMap;
use std::time::Duration;

use switchyard_core::config::RecoveryRuleConfig;
use switchyard_core::{
    ErrorClassification, Priority, RecoveryAction, RecoveryActionKind, UNKNOWN_ERROR_TYPE,
};

fn action(
    kind: RecoveryActionKind,
    priority: Priority,
    description: &str,
    command: &str,
    auto_retry: bool,
    requires_confirmation: bool,
) -> RecoveryAction {
    RecoveryAction {
        kind,
        priority,
        description: description.to_string(),
        command: command.to_string(),
        auto_retry,
        requires_confirmation,
    }
}

fn retry(attempts: u32, delay: Duration, timeout: Option<Duration>) -> RecoveryActionKind {
    RecoveryActionKind::Retry {
        attempts,
        delay,
        timeout,
        install_instead: false,
    }
}

fn manual(priority: Priority, description: &str, command: &str) -> RecoveryAction {
    action(
        RecoveryActionKind::Manual,
        priority,
        description,
        command,
        false,
        false,
    )
}

fn builtin_table() -> HashMap<String, Vec<RecoveryAction>> {
    let mut table = HashMap::new();

    table.insert(
        "release_not_found".to_string(),
        vec![
            action(
                RecoveryActionKind::Retry {
                    attempts: 1,
                    delay: Duration::ZERO,
                    timeout: None,
                    install_instead: true,
                },
                Priority::High,
                "Install the release instead of upgrading it",
                "helm install <release> <chart> -n <namespace> --atomic --wait",
                true,
                false,
            ),
            manual(
                Priority::Low,
                "Confirm the release name and namespace",
                "helm list -A",
            ),
        ],
    );

    table.insert(
        "timeout_error".to_string(),
        vec![
            action(
                retry(2, Duration::from_secs(30), Some(Duration::from_secs(20 * 60))),
                Priority::High,
                "Retry with a longer timeout",
                "helm upgrade <release> <chart> -n <namespace> --atomic --wait --timeout 20m",
                true,
                false,
            ),
            action(
                RecoveryActionKind::Rollback { revision: None },
                Priority::Medium,
                "Roll back to the previous revision",
                "helm rollback <release> -n <namespace> --wait",
                false,
                false,
            ),
        ],
    );

    table.insert(
        "resource_conflict".to_string(),
        vec![
            action(
                RecoveryActionKind::Force,
                Priority::High,
                "Force the update, replacing conflicting resources",
                "helm upgrade <release> <chart> -n <namespace> --force",
                false,
                true,
            ),
            action(
                RecoveryActionKind::Cleanup,
                Priority::Medium,
                "Delete the conflicting resources and redeploy",
                "kubectl delete <kind> <name> -n <namespace>",
                false,
                true,
            ),
        ],
    );

    table.insert(
        "insufficient_permissions".to_string(),
        vec![manual(
            Priority::High,
            "Grant the deploying service account the missing RBAC permissions",
            "kubectl auth can-i --list -n <namespace>",
        )],
    );

    table.insert(
        "chart_not_found".to_string(),
        vec![manual(
            Priority::High,
            "Check the chart name, version, and repository",
            "helm search repo <chart> --versions",
        )],
    );

    table.insert(
        "values_validation_error".to_string(),
        vec![manual(
            Priority::High,
            "Fix the chart values so they pass the chart schema",
            "helm lint <chart> -f <values>",
        )],
    );

    table.insert(
        "network_error".to_string(),
        vec![
            action(
                retry(3, Duration::from_secs(10), None),
                Priority::High,
                "Retry after a short delay",
                "",
                true,
                false,
            ),
            manual(
                Priority::Medium,
                "Check connectivity to the cluster API and chart registry",
                "kubectl cluster-info",
            ),
        ],
    );

    table.insert(
        "storage_error".to_string(),
        vec![
            manual(
                Priority::High,
                "Check storage classes and volume capacity",
                "kubectl get pvc,storageclass -n <namespace>",
            ),
            action(
                RecoveryActionKind::Cleanup,
                Priority::Medium,
                "Delete stuck volume claims and redeploy",
                "kubectl delete pvc <name> -n <namespace>",
                false,
                true,
            ),
        ],
    );

    table.insert(UNKNOWN_ERROR_TYPE.to_string(), fallback());
    table
}

/// One low-priority automatic retry, then a manual investigation.
fn fallback() -> Vec<RecoveryAction> {
    vec![
        action(
            retry(1, Duration::from_secs(5), None),
            Priority::Low,
            "Retry once",
            "",
            true,
            false,
        ),
        manual(
            Priority::Low,
            "Investigate the release and cluster events manually",
            "helm status <release> -n <namespace>; kubectl get events -n <namespace>",
        ),
    ]
}

/// Immutable lookup table from classification type to recovery actions.
#[derive(Debug, Clone)]
pub struct RecoveryAdvisor {
    table: HashMap<String, Vec<RecoveryAction>>,
}

impl Default for RecoveryAdvisor {
    fn default() -> Self {
        Self::builtin()
    }
}

impl RecoveryAdvisor {
    pub fn builtin() -> Self {
        Self {
            table: builtin_table(),
        }
    }

    /// Built-in table with per-classification entries replaced by config.
    /// Entries with no actions are ignored.
    pub fn with_overrides(rules: &[RecoveryRuleConfig]) -> Self {
        let mut table = builtin_table();
        for rule in rules.iter().filter(|r| !r.actions.is_empty()) {
            table.insert(rule.classification.clone(), rule.actions.clone());
        }
        Self { table }
    }

    /// Candidate actions, highest priority first. Never empty.
    pub fn suggest(&self, classification: &ErrorClassification) -> Vec<RecoveryAction> {
        let mut actions = self
            .table
            .get(&classification.error_type)
            .cloned()
            .unwrap_or_else(fallback);
        // Stable: equal priorities keep table order.
        actions.sort_by(|a, b| b.priority.cmp(&a.priority));
        actions
    }

    /// First action that may run without an operator.
    pub fn first_automatic(&self, classification: &ErrorClassification) -> Option<RecoveryAction> {
        self.suggest(classification)
            .into_iter()
            .find(|a| a.is_automatic())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::ErrorClassifier;

    fn classify(msg: &str) -> ErrorClassification {
        ErrorClassifier::builtin().classify(msg, "upgrade")
    }

    #[test]
    fn release_not_found_installs_first() {
        let actions = RecoveryAdvisor::builtin().suggest(&classify("release my-app not found"));
        match &actions[0].kind {
            RecoveryActionKind::Retry {
                install_instead, ..
            } => assert!(install_instead),
            other => panic!("expected retry, got {other}"),
        }
        assert!(actions[0].is_automatic());
    }

    #[test]
    fn timeout_retries_then_rolls_back() {
        let actions = RecoveryAdvisor::builtin().suggest(&classify("timed out waiting"));
        assert_eq!(actions.len(), 2);
        assert_eq!(actions[0].retry_count(), 2);
        assert_eq!(actions[0].retry_delay(), Duration::from_secs(30));
        assert!(actions[0].auto_retry);
        assert_eq!(actions[1].kind.name(), "rollback");
        assert!(!actions[1].auto_retry);
    }

    #[test]
    fn conflict_actions_need_confirmation() {
        let actions = RecoveryAdvisor::builtin().suggest(&classify("resource already exists"));
        assert_eq!(actions[0].kind, RecoveryActionKind::Force);
        assert!(actions.iter().all(|a| a.requires_confirmation));
        assert!(actions.iter().all(|a| !a.is_automatic()));
    }

    #[test]
    fn permissions_are_manual_only() {
        let actions = RecoveryAdvisor::builtin().suggest(&classify("forbidden"));
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].kind, RecoveryActionKind::Manual);
    }

    #[test]
    fn non_retriable_never_auto_retry() {
        let advisor = RecoveryAdvisor::builtin();
        for msg in [
            "forbidden",
            "values don't meet the specifications",
            "chart \"x\" not found",
            "resource already exists",
            "persistentvolumeclaim pending",
        ] {
            let c = classify(msg);
            assert!(!c.retriable);
            assert!(advisor.first_automatic(&c).is_none(), "{msg}");
        }
    }

    #[test]
    fn unknown_gets_low_retry_then_manual() {
        let actions = RecoveryAdvisor::builtin().suggest(&classify("???"));
        assert_eq!(actions.len(), 2);
        assert_eq!(actions[0].kind.name(), "retry");
        assert_eq!(actions[0].priority, Priority::Low);
        assert_eq!(actions[1].kind, RecoveryActionKind::Manual);
    }

    #[test]
    fn never_empty() {
        let advisor = RecoveryAdvisor::builtin();
        let mut c = classify("???");
        for t in [
            "release_not_found",
            "timeout_error",
            "resource_conflict",
            "insufficient_permissions",
            "chart_not_found",
            "values_validation_error",
            "network_error",
            "storage_error",
            "unknown",
            "made_up_type",
        ] {
            c.error_type = t.to_string();
            assert!(!advisor.suggest(&c).is_empty(), "{t}");
        }
    }

    #[test]
    fn suggestions_are_priority_ordered() {
        let advisor = RecoveryAdvisor::builtin();
        let mut c = classify("???");
        for t in ["timeout_error", "storage_error", "network_error"] {
            c.error_type = t.to_string();
            let actions = advisor.suggest(&c);
            assert!(actions.windows(2).all(|w| w[0].priority >= w[1].priority), "{t}");
        }
    }

    #[test]
    fn overrides_replace_entries() {
        let rules = vec![RecoveryRuleConfig {
            classification: "timeout_error".to_string(),
            actions: vec![manual(Priority::High, "page the on-call", "")],
        }];
        let advisor = RecoveryAdvisor::with_overrides(&rules);
        let actions = advisor.suggest(&classify("timed out"));
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].description, "page the on-call");
    }
}
