//! Recovery executor — runs one recovery action and reports how it went.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use switchyard_core::{ChartRef, RecoveryAction, RecoveryActionKind, RecoveryResult, epoch_secs};
use switchyard_release::{DeployOptions, ReleaseGateway};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::{RecoveryError, Result};

/// The operation whose failure is being recovered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FailedOperation {
    Deploy {
        chart: ChartRef,
        options: DeployOptions,
    },
    Rollback {
        revision: u32,
    },
    Uninstall,
}

impl FailedOperation {
    pub fn name(&self) -> &'static str {
        match self {
            FailedOperation::Deploy { .. } => "deploy",
            FailedOperation::Rollback { .. } => "rollback",
            FailedOperation::Uninstall => "uninstall",
        }
    }
}

/// What failed, and where.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorContext {
    pub operation: FailedOperation,
    pub release: String,
    pub namespace: String,
    /// Last known good revision, used by rollback actions without one.
    #[serde(default)]
    pub previous_revision: Option<u32>,
}

/// Executes recovery actions against the release gateway.
#[derive(Clone)]
pub struct RecoveryExecutor {
    gateway: ReleaseGateway,
}

impl RecoveryExecutor {
    pub fn new(gateway: ReleaseGateway) -> Self {
        Self { gateway }
    }

    /// Run `action`. Timings are recorded whatever the outcome.
    pub async fn execute(
        &self,
        action: &RecoveryAction,
        ctx: &ErrorContext,
        cancel: &CancellationToken,
    ) -> RecoveryResult {
        let started_at = epoch_secs();
        let clock = Instant::now();
        info!(
            action = %action.kind,
            release = %ctx.release,
            namespace = %ctx.namespace,
            operation = ctx.operation.name(),
            "executing recovery action"
        );

        let mut manual_steps = Vec::new();
        let outcome = match &action.kind {
            RecoveryActionKind::Retry {
                attempts,
                delay,
                timeout,
                install_instead,
            } => {
                self.retry(ctx, *attempts, *delay, *timeout, *install_instead, cancel)
                    .await
            }
            RecoveryActionKind::Rollback { revision } => {
                let revision = revision.or(ctx.previous_revision).unwrap_or(0);
                self.gateway
                    .rollback_release(&ctx.release, &ctx.namespace, revision, cancel)
                    .await
                    .map(|_| ())
                    .map_err(RecoveryError::from)
            }
            RecoveryActionKind::Force | RecoveryActionKind::Cleanup => {
                Err(RecoveryError::Unsupported {
                    action: action.kind.name().to_string(),
                    operation: ctx.operation.name().to_string(),
                })
            }
            RecoveryActionKind::Manual => {
                manual_steps.push(action.description.clone());
                if !action.command.is_empty() {
                    manual_steps.push(action.command.clone());
                }
                Err(RecoveryError::ManualRequired)
            }
        };

        let success = outcome.is_ok();
        let error = outcome.err().map(|e| e.to_string());
        match &error {
            None => info!(action = %action.kind, release = %ctx.release, namespace = %ctx.namespace, "recovery action succeeded"),
            Some(e) => warn!(action = %action.kind, release = %ctx.release, namespace = %ctx.namespace, error = %e, "recovery action did not succeed"),
        }

        RecoveryResult {
            action: action.clone(),
            success,
            started_at,
            finished_at: epoch_secs(),
            duration: clock.elapsed(),
            error,
            manual_steps,
        }
    }

    async fn retry(
        &self,
        ctx: &ErrorContext,
        attempts: u32,
        delay: Duration,
        timeout: Option<Duration>,
        install_instead: bool,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let attempts = attempts.max(1);
        let mut last = None;

        for attempt in 1..=attempts {
            if !delay.is_zero() {
                tokio::select! {
                    _ = cancel.cancelled() => return Err(RecoveryError::Cancelled),
                    _ = tokio::time::sleep(delay) => {}
                }
            }

            let result = match &ctx.operation {
                FailedOperation::Deploy { chart, options } => {
                    let mut options = options.clone();
                    if timeout.is_some() {
                        options.timeout = timeout;
                    }
                    let deployed = if install_instead {
                        self.gateway.atomic_install(chart, &options, cancel).await
                    } else {
                        self.gateway.deploy_chart(chart, &options, cancel).await
                    };
                    deployed.map(|_| ())
                }
                FailedOperation::Rollback { revision } => self
                    .gateway
                    .rollback_release(&ctx.release, &ctx.namespace, *revision, cancel)
                    .await
                    .map(|_| ()),
                FailedOperation::Uninstall => {
                    self.gateway
                        .uninstall(&ctx.release, &ctx.namespace, cancel)
                        .await
                }
            };

            match result {
                Ok(()) => return Ok(()),
                Err(e) if e.is_cancelled() => return Err(RecoveryError::Cancelled),
                Err(e) => {
                    warn!(
                        release = %ctx.release,
                        namespace = %ctx.namespace,
                        attempt,
                        attempts,
                        error = %e,
                        "retry attempt failed"
                    );
                    last = Some(e);
                }
            }
        }

        match last {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }
}
