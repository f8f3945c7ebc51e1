//! Per-user mutual exclusion
//!
//! Utterances for the same user are serialized; different users proceed
//! independently. Locks are created on first use and kept for the process
//! lifetime (user cardinality is small).

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

/// Registry of per-user async locks
#[derive(Default)]
pub struct UserLocks {
    inner: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl UserLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the lock for a user, waiting behind earlier holders
    pub async fn acquire(&self, user_id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut registry = self.inner.lock().await;
            registry
                .entry(user_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        debug!(%user_id, "acquire: waiting for user lock");
        let guard = lock.lock_owned().await;
        debug!(%user_id, "acquire: user lock held");
        guard
    }
}
