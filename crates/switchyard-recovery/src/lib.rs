//! switchyard-recovery — what went wrong, and what to do about it.
//!
//! - [`classifier`] maps rendered error text onto a closed taxonomy.
//! - [`advisor`] maps a classification onto ordered recovery actions.
//! - [`executor`] runs one action against the release gateway.
//!
//! Classification only ever looks at messages. Release tools hand back
//! opaque errors, so the rendered text is all there is.

pub mod advisor;
pub mod classifier;
pub mod error;
pub mod executor;

pub use advisor::RecoveryAdvisor;
pub use classifier::{ErrorClassifier, ErrorPattern};
pub use error::{RecoveryError, Result};
pub use executor::{ErrorContext, FailedOperation, RecoveryExecutor};
