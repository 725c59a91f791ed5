//! Per-user mutual exclusion for sync runs.
//!
//! [`UserLocks`] stores one [`tokio::sync::Mutex`] per user in a map guarded
//! by a [`tokio::sync::RwLock`]. Sync runs for the same user serialize on the
//! user's mutex while runs for different users proceed concurrently.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

use super::UserId;

/// Registry of per-user sync locks.
///
/// # Concurrency
///
/// - Runs for different users never contend beyond the short map lookup.
/// - Runs for the same user are serialized in arrival order.
#[derive(Debug, Default)]
pub struct UserLocks {
    locks: RwLock<HashMap<UserId, Arc<Mutex<()>>>>,
}

impl UserLocks {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for and returns the lock guard of `user_id`.
    ///
    /// The guard is released when dropped.
    pub async fn acquire(&self, user_id: UserId) -> OwnedMutexGuard<()> {
        let lock = self.lock_for(user_id).await;
        lock.lock_owned().await
    }

    /// Returns the guard of `user_id` if nobody holds it right now.
    pub async fn try_acquire(&self, user_id: UserId) -> Option<OwnedMutexGuard<()>> {
        let lock = self.lock_for(user_id).await;
        lock.try_lock_owned().ok()
    }

    /// Returns the number of users that have a lock entry.
    pub async fn len(&self) -> usize {
        self.locks.read().await.len()
    }

    /// Returns `true` if no user has a lock entry.
    pub async fn is_empty(&self) -> bool {
        self.locks.read().await.is_empty()
    }

    async fn lock_for(&self, user_id: UserId) -> Arc<Mutex<()>> {
        if let Some(lock) = self.locks.read().await.get(&user_id) {
            return Arc::clone(lock);
        }
        let mut map = self.locks.write().await;
        Arc::clone(map.entry(user_id).or_default())
    }
}
