//! Readiness reports — snapshot validation results that gate progress.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::epoch_secs;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    Pass,
    Warn,
    Fail,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckResult {
    pub status: CheckStatus,
    pub message: String,
}

impl CheckResult {
    pub fn pass(message: impl Into<String>) -> Self {
        Self {
            status: CheckStatus::Pass,
            message: message.into(),
        }
    }

    pub fn warn(message: impl Into<String>) -> Self {
        Self {
            status: CheckStatus::Warn,
            message: message.into(),
        }
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Self {
            status: CheckStatus::Fail,
            message: message.into(),
        }
    }
}

/// A fresh validation snapshot. Never mutated after it is built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadinessReport {
    pub timestamp: u64,
    pub checks: BTreeMap<String, CheckResult>,
    /// Worst status across all checks.
    pub overall_status: CheckStatus,
    /// True unless some check failed. Warnings do not block.
    pub ready: bool,
}

impl ReadinessReport {
    pub fn from_checks(checks: BTreeMap<String, CheckResult>) -> Self {
        let overall_status = checks
            .values()
            .map(|c| c.status)
            .max()
            .unwrap_or(CheckStatus::Pass);
        Self {
            timestamp: epoch_secs(),
            ready: overall_status != CheckStatus::Fail,
            overall_status,
            checks,
        }
    }

    /// Names and messages of failing checks, in name order.
    pub fn failures(&self) -> Vec<(&str, &str)> {
        self.checks
            .iter()
            .filter(|(_, c)| c.status == CheckStatus::Fail)
            .map(|(name, c)| (name.as_str(), c.message.as_str()))
            .collect()
    }

    /// One-line summary of failing checks.
    pub fn failure_summary(&self) -> String {
        self.failures()
            .iter()
            .map(|(name, msg)| format!("{name}: {msg}"))
            .collect::<Vec<_>>()
            .join("; ")
    }
}
