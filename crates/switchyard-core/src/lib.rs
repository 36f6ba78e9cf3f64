//! switchyard-core — shared data model and ports for Switchyard.
//!
//! Every other crate in the workspace speaks in these types. The
//! orchestrator never touches a cluster or a chart directly; it goes
//! through the ports defined in [`ports`]:
//!
//! ```text
//! ClusterPort    namespace / pod / node / manifest / secret CRUD
//! ReleasePort    install / upgrade / rollback / status / uninstall
//! MetricsSource  live metric samples for an environment
//! ```
//!
//! Structured event emission (the logger port) is `tracing`.
//!
//! [`memory`] holds in-memory implementations of every port, used by
//! tests across the workspace.

pub mod config;
pub mod duration;
pub mod memory;
pub mod ports;
pub mod quantity;
pub mod readiness;
pub mod strategy;
pub mod types;

pub use config::{ConfigError, SwitchyardConfig};
pub use duration::{format_duration, parse_duration};
pub use ports::*;
pub use readiness::{CheckResult, CheckStatus, ReadinessReport};
pub use strategy::*;
pub use types::*;
