//! Per environment-pair deployment locks.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

/// Hands out one async lock per pair of namespaces. The pair is
/// unordered: a blue→green run and a green→blue run share a lock.
#[derive(Debug, Clone, Default)]
pub struct DeploymentLocks {
    locks: Arc<Mutex<HashMap<(String, String), Arc<Mutex<()>>>>>,
}

impl DeploymentLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive use of the pair. Released when the guard drops.
    ///
    /// Entries nobody holds or waits on are pruned on each call.
    pub async fn lock(&self, source_namespace: &str, target_namespace: &str) -> OwnedMutexGuard<()> {
        let key = pair(source_namespace, target_namespace);
        let lock = {
            let mut locks = self.locks.lock().await;
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            locks.entry(key.clone()).or_default().clone()
        };
        debug!(pair = ?key, "waiting for deployment lock");
        lock.lock_owned().await
    }
}

fn pair(a: &str, b: &str) -> (String, String) {
    if a <= b {
        (a.to_string(), b.to_string())
    } else {
        (b.to_string(), a.to_string())
    }
}
