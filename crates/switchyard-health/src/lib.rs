//! switchyard-health — health tracking for environments under traffic.
//!
//! [`HealthTracker`] turns a stream of probe results into a verdict using a
//! consecutive-failure threshold. [`HealthWatcher`] runs a tracker on a
//! background task at a fixed interval until its token is cancelled.

pub mod checker;
pub mod watcher;

pub use checker::{EnvironmentProbe, HealthProbe, HealthTracker, HealthVerdict, ProbeResult};
pub use watcher::{HealthWatcher, WatchHandle, WatchSummary};
