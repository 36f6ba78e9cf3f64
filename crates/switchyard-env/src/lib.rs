//! switchyard-env — environment lifecycle over the cluster port.
//!
//! An environment is a set of namespaces with a resource quota, an
//! ingress-isolation policy, monitoring labels, and optional secrets.
//! [`EnvironmentManager`] creates, prepares, validates, health-checks,
//! and tears them down.

pub mod error;
pub mod manager;
pub mod manifests;

pub use error::{EnvironmentError, EnvironmentResult};
pub use manager::{EnvironmentHealth, EnvironmentManager};
