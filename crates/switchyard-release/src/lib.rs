//! switchyard-release — the release gateway.
//!
//! Wraps a [`ReleasePort`](switchyard_core::ReleasePort) with atomic
//! semantics: every install and upgrade is `atomic` and `wait`, bounded by
//! a deadline and a caller-supplied cancellation token. `deploy_chart`
//! routes to install or upgrade depending on whether the release exists.

pub mod error;
pub mod gateway;

pub use error::{ReleaseError, ReleaseResult};
pub use gateway::{
    DeployAction, DeployOptions, DeployResult, ImageOverride, ReleaseGateway, ReleaseStatus,
};
