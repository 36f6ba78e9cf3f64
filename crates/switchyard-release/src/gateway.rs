//! Release gateway — atomic chart deploys over the release port.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use switchyard_core::{
    ChartRef, PortError, ReleaseInfo, ReleasePort, ReleaseRequest, ReleaseState,
    RollbackRequest, bounded,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{ReleaseError, ReleaseResult};

/// Install/upgrade deadline.
pub const DEFAULT_DEPLOY_TIMEOUT: Duration = Duration::from_secs(10 * 60);
/// Rollback deadline.
pub const DEFAULT_ROLLBACK_TIMEOUT: Duration = Duration::from_secs(5 * 60);
/// Status lookup deadline.
pub const DEFAULT_STATUS_TIMEOUT: Duration = Duration::from_secs(30);

/// Container image to substitute into a chart's `image` values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageOverride {
    pub repository: String,
    pub tag: String,
}

/// Per-deploy options.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeployOptions {
    pub namespace: String,
    /// Release name; defaults to the chart name.
    #[serde(default)]
    pub release_name: Option<String>,
    /// Force a rollout even when nothing but the image changed.
    #[serde(default)]
    pub force_update: bool,
    #[serde(default)]
    pub image: Option<ImageOverride>,
    /// Explicit request to apply `image`.
    #[serde(default)]
    pub override_image: bool,
    #[serde(default)]
    pub values: BTreeMap<String, Value>,
    /// Replaces the default deploy deadline.
    #[serde(default)]
    pub timeout: Option<Duration>,
}

impl DeployOptions {
    pub fn new(namespace: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            ..Default::default()
        }
    }

    pub fn release_name(mut self, name: &str) -> Self {
        self.release_name = Some(name.to_string());
        self
    }
}

/// Which path `deploy_chart` took.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeployAction {
    Installed,
    Upgraded,
}

/// Normalized outcome of an install or upgrade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeployResult {
    pub release_name: String,
    pub namespace: String,
    pub revision: u32,
    pub status: ReleaseState,
    pub action: DeployAction,
    /// Revision that was live before an upgrade. `None` for installs.
    pub previous_revision: Option<u32>,
}

/// Result of a status lookup. A missing release is not an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReleaseStatus {
    pub exists: bool,
    pub info: Option<ReleaseInfo>,
}

impl ReleaseStatus {
    pub fn missing() -> Self {
        Self {
            exists: false,
            info: None,
        }
    }

    /// Exists and is in the `deployed` state.
    pub fn is_deployed(&self) -> bool {
        self.info
            .as_ref()
            .is_some_and(|i| i.status == ReleaseState::Deployed)
    }

    pub fn revision(&self) -> Option<u32> {
        self.info.as_ref().map(|i| i.revision)
    }
}

/// Atomic release operations over a [`ReleasePort`].
#[derive(Clone)]
pub struct ReleaseGateway {
    port: Arc<dyn ReleasePort>,
    deploy_timeout: Duration,
    rollback_timeout: Duration,
    status_timeout: Duration,
}

impl ReleaseGateway {
    pub fn new(port: Arc<dyn ReleasePort>) -> Self {
        Self {
            port,
            deploy_timeout: DEFAULT_DEPLOY_TIMEOUT,
            rollback_timeout: DEFAULT_ROLLBACK_TIMEOUT,
            status_timeout: DEFAULT_STATUS_TIMEOUT,
        }
    }

    /// Override the default deadlines.
    pub fn with_timeouts(mut self, deploy: Duration, rollback: Duration) -> Self {
        self.deploy_timeout = deploy;
        self.rollback_timeout = rollback;
        self
    }

    pub fn rollback_timeout(&self) -> Duration {
        self.rollback_timeout
    }

    /// Install the chart if its release does not exist, upgrade it otherwise.
    pub async fn deploy_chart(
        &self,
        chart: &ChartRef,
        options: &DeployOptions,
        cancel: &CancellationToken,
    ) -> ReleaseResult<DeployResult> {
        let release = release_name(chart, options);
        let status = self
            .get_release_status(&release, &options.namespace, cancel)
            .await?;

        if status.exists {
            debug!(release = %release, namespace = %options.namespace, "release exists, upgrading");
            let mut result = self.atomic_upgrade(chart, options, cancel).await?;
            result.previous_revision = status.revision();
            Ok(result)
        } else {
            debug!(release = %release, namespace = %options.namespace, "release not found, installing");
            self.atomic_install(chart, options, cancel).await
        }
    }

    /// Atomic install, creating the namespace if needed.
    pub async fn atomic_install(
        &self,
        chart: &ChartRef,
        options: &DeployOptions,
        cancel: &CancellationToken,
    ) -> ReleaseResult<DeployResult> {
        let request = self.request(chart, options, true);
        let release = request.release_name.clone();
        let what = format!("install {release}");

        let info = bounded(&what, request.timeout, cancel, self.port.install(&request))
            .await
            .map_err(|source| {
                warn!(release = %release, namespace = %options.namespace, error = %source, "install failed");
                ReleaseError::Install {
                    release: release.clone(),
                    source,
                }
            })?;

        info!(
            release = %info.name,
            namespace = %info.namespace,
            revision = info.revision,
            chart = %chart.name,
            version = %chart.version,
            "release installed"
        );
        Ok(DeployResult {
            release_name: info.name,
            namespace: info.namespace,
            revision: info.revision,
            status: info.status,
            action: DeployAction::Installed,
            previous_revision: None,
        })
    }

    /// Atomic upgrade of an existing release.
    pub async fn atomic_upgrade(
        &self,
        chart: &ChartRef,
        options: &DeployOptions,
        cancel: &CancellationToken,
    ) -> ReleaseResult<DeployResult> {
        let request = self.request(chart, options, false);
        let release = request.release_name.clone();
        let what = format!("upgrade {release}");

        let info = bounded(&what, request.timeout, cancel, self.port.upgrade(&request))
            .await
            .map_err(|source| {
                warn!(release = %release, namespace = %options.namespace, error = %source, "upgrade failed");
                ReleaseError::Upgrade {
                    release: release.clone(),
                    source,
                }
            })?;

        info!(
            release = %info.name,
            namespace = %info.namespace,
            revision = info.revision,
            chart = %chart.name,
            version = %chart.version,
            "release upgraded"
        );
        Ok(DeployResult {
            release_name: info.name,
            namespace: info.namespace,
            revision: info.revision,
            status: info.status,
            action: DeployAction::Upgraded,
            previous_revision: None,
        })
    }

    /// Roll a release back to `revision` (0 = previous) and wait for it.
    pub async fn rollback_release(
        &self,
        name: &str,
        namespace: &str,
        revision: u32,
        cancel: &CancellationToken,
    ) -> ReleaseResult<ReleaseInfo> {
        let request = RollbackRequest {
            release_name: name.to_string(),
            namespace: namespace.to_string(),
            revision,
            wait: true,
            timeout: self.rollback_timeout,
        };
        let what = format!("rollback {name}");

        let info = bounded(&what, request.timeout, cancel, self.port.rollback(&request))
            .await
            .map_err(|source| {
                warn!(release = name, namespace, revision, error = %source, "rollback failed");
                ReleaseError::Rollback {
                    release: name.to_string(),
                    source,
                }
            })?;

        info!(
            release = name,
            namespace,
            revision = info.revision,
            "release rolled back"
        );
        Ok(info)
    }

    /// Look up a release. A missing release yields `exists: false`.
    pub async fn get_release_status(
        &self,
        name: &str,
        namespace: &str,
        cancel: &CancellationToken,
    ) -> ReleaseResult<ReleaseStatus> {
        let what = format!("status {name}");
        match bounded(&what, self.status_timeout, cancel, self.port.status(name, namespace)).await {
            Ok(info) => Ok(ReleaseStatus {
                exists: true,
                info: Some(info),
            }),
            Err(e) if is_not_found(&e) => Ok(ReleaseStatus::missing()),
            Err(source) => Err(ReleaseError::Status {
                release: name.to_string(),
                source,
            }),
        }
    }

    pub async fn uninstall(
        &self,
        name: &str,
        namespace: &str,
        cancel: &CancellationToken,
    ) -> ReleaseResult<()> {
        let what = format!("uninstall {name}");
        bounded(
            &what,
            self.deploy_timeout,
            cancel,
            self.port.uninstall(name, namespace, self.deploy_timeout),
        )
        .await
        .map_err(|source| ReleaseError::Uninstall {
            release: name.to_string(),
            source,
        })?;
        info!(release = name, namespace, "release uninstalled");
        Ok(())
    }

    fn request(&self, chart: &ChartRef, options: &DeployOptions, install: bool) -> ReleaseRequest {
        ReleaseRequest {
            release_name: release_name(chart, options),
            chart: chart.reference(),
            version: chart.version.clone(),
            namespace: options.namespace.clone(),
            values: values(chart, options),
            atomic: true,
            wait: true,
            timeout: options.timeout.unwrap_or(self.deploy_timeout),
            create_namespace: install,
        }
    }
}

fn release_name(chart: &ChartRef, options: &DeployOptions) -> String {
    options
        .release_name
        .clone()
        .unwrap_or_else(|| chart.name.clone())
}

/// Some release tools only report not-found in the message text.
fn is_not_found(err: &PortError) -> bool {
    err.is_not_found() || err.to_string().to_lowercase().contains("not found")
}

/// Chart values with the image override merged in when it applies.
fn values(chart: &ChartRef, options: &DeployOptions) -> BTreeMap<String, Value> {
    let mut values = options.values.clone();
    let Some(image) = &options.image else {
        return values;
    };
    if !chart.supports_image_override() || !(options.force_update || options.override_image) {
        return values;
    }

    let entry = values
        .entry("image".to_string())
        .or_insert_with(|| json!({}));
    if !entry.is_object() {
        *entry = json!({});
    }
    if let Some(obj) = entry.as_object_mut() {
        obj.insert("repository".to_string(), json!(image.repository));
        obj.insert("tag".to_string(), json!(image.tag));
    }
    values
}
