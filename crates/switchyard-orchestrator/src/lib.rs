//! switchyard-orchestrator — the top-level Blue-Green state machine.
//!
//! ```text
//! Idle → ValidatingReadiness → PreparingEnvironments → SwitchingTraffic
//!      → ConfirmingHealth → Promoted | RolledBack | Failed
//! ```
//!
//! The orchestrator composes every other crate: the readiness report gates
//! the run, the environment manager and release gateway prepare the target,
//! the switch executor moves traffic, and the recovery engine decides what
//! happens when something breaks. Each run owns its environment and plan
//! records exclusively. Callers serialize runs per environment pair with
//! [`DeploymentLocks`].

pub mod error;
pub mod locks;
pub mod orchestrator;
pub mod readiness;
pub mod result;
pub mod state;

pub use error::{OrchestratorError, OrchestratorResult};
pub use locks::DeploymentLocks;
pub use orchestrator::BlueGreenOrchestrator;
pub use readiness::SystemReadiness;
pub use result::{DeployedRelease, DeploymentResult, ReportedError};
pub use state::{DeploymentState, Transition};
