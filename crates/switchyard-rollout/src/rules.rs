//! Validation rule evaluation against a metrics sample.

use std::collections::BTreeMap;

use switchyard_core::{CheckResult, MetricsSample, RuleAction, RuleCondition, ValidationRule};

/// Check key for a rule.
pub fn rule_key(rule: &ValidationRule) -> String {
    format!("rule:{}", rule.name)
}

/// Evaluate every rule. Rollback rules fail the gate when violated or
/// unmeasurable; alert rules only warn. A condition that cannot be parsed
/// always fails.
pub fn evaluate_rules(
    rules: &[ValidationRule],
    sample: &MetricsSample,
) -> BTreeMap<String, CheckResult> {
    rules
        .iter()
        .map(|rule| (rule_key(rule), evaluate(rule, sample)))
        .collect()
}

fn evaluate(rule: &ValidationRule, sample: &MetricsSample) -> CheckResult {
    let Some(condition) = RuleCondition::parse(&rule.condition) else {
        return CheckResult::fail(format!("invalid condition '{}'", rule.condition));
    };
    let outcome = |message: String| match rule.action {
        RuleAction::Rollback => CheckResult::fail(message),
        RuleAction::Alert => CheckResult::warn(message),
    };

    match sample.get(&condition.metric) {
        None => outcome(format!("metric '{}' not reported", condition.metric)),
        Some(value) if condition.holds(*value) => {
            CheckResult::pass(format!("{} = {value}", condition.metric))
        }
        Some(value) => outcome(format!(
            "{} = {value} violates {condition}",
            condition.metric
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use switchyard_core::CheckStatus;
    use switchyard_core::memory::sample;

    fn status(rules: &[ValidationRule], sample: &MetricsSample, name: &str) -> CheckStatus {
        evaluate_rules(rules, sample)[&format!("rule:{name}")].status
    }

    #[test]
    fn satisfied_rule_passes() {
        let rules = [ValidationRule::new("errors", "error_rate < 0.1", RuleAction::Rollback)];
        let s = sample(&[("error_rate", 0.02)]);
        assert_eq!(status(&rules, &s, "errors"), CheckStatus::Pass);
    }

    #[test]
    fn violated_rollback_rule_fails() {
        let rules = [ValidationRule::new("errors", "error_rate < 0.1", RuleAction::Rollback)];
        let s = sample(&[("error_rate", 0.3)]);
        let checks = evaluate_rules(&rules, &s);
        assert_eq!(checks["rule:errors"].status, CheckStatus::Fail);
        assert!(checks["rule:errors"].message.contains("violates"));
    }

    #[test]
    fn violated_alert_rule_only_warns() {
        let rules = [ValidationRule::new("latency", "latency_p99_ms <= 200", RuleAction::Alert)];
        let s = sample(&[("latency_p99_ms", 450.0)]);
        assert_eq!(status(&rules, &s, "latency"), CheckStatus::Warn);
    }

    #[test]
    fn missing_metric_follows_the_action() {
        let rules = [
            ValidationRule::new("hard", "success_rate >= 0.99", RuleAction::Rollback),
            ValidationRule::new("soft", "success_rate >= 0.99", RuleAction::Alert),
        ];
        let s = MetricsSample::new();
        assert_eq!(status(&rules, &s, "hard"), CheckStatus::Fail);
        assert_eq!(status(&rules, &s, "soft"), CheckStatus::Warn);
    }

    #[test]
    fn unparseable_condition_fails_even_for_alerts() {
        let rules = [ValidationRule::new("bad", "error_rate is low", RuleAction::Alert)];
        assert_eq!(status(&rules, &MetricsSample::new(), "bad"), CheckStatus::Fail);
    }
}
