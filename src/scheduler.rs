//! Periodic background jobs.
//!
//! [`SyncScheduler`] runs [`SyncService::sync_all`] for each connected user,
//! one user at a time. A failing user is logged and does not stop the round.
//!
//! [`CachePurger`] removes expired suggestion cache entries on its own
//! period, so the cache stays bounded when scheduled sync is disabled.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::error::{StoreError, SyncError};
use crate::persistence::KeyValueStore;
use crate::service::SyncService;

/// Counts of one scheduler round.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RoundSummary {
    /// Users visited.
    pub users: usize,
    /// Runs that returned a report.
    pub succeeded: usize,
    /// Runs that failed outright.
    pub failed: usize,
}

/// Background job running `sync_all` for every connected user.
#[derive(Debug, Clone)]
pub struct SyncScheduler {
    sync: Arc<SyncService>,
    period: Duration,
}

impl SyncScheduler {
    /// Creates a scheduler ticking every `period`.
    #[must_use]
    pub const fn new(sync: Arc<SyncService>, period: Duration) -> Self {
        Self { sync, period }
    }

    /// Runs one round over all connected users.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Store`] if the connected users cannot be listed.
    pub async fn run_once(&self) -> Result<RoundSummary, SyncError> {
        let users = self.sync.store().connected_users().await?;
        let mut summary = RoundSummary {
            users: users.len(),
            ..RoundSummary::default()
        };

        for user_id in users {
            match self.sync.sync_all(user_id).await {
                Ok(_) => summary.succeeded += 1,
                Err(e) => {
                    summary.failed += 1;
                    tracing::warn!(%user_id, error = %e, "scheduled sync failed");
                }
            }
        }
        Ok(summary)
    }

    /// Ticks forever. The first round starts one period after the call.
    pub async fn run(self) {
        tracing::info!(period_secs = self.period.as_secs(), "sync scheduler started");
        let mut interval = delayed_interval(self.period).await;
        loop {
            interval.tick().await;
            match self.run_once().await {
                Ok(summary) => tracing::info!(
                    users = summary.users,
                    succeeded = summary.succeeded,
                    failed = summary.failed,
                    "scheduled sync round finished"
                ),
                Err(e) => tracing::error!(error = %e, "scheduled sync round aborted"),
            }
        }
    }

    /// Spawns [`SyncScheduler::run`] on the current runtime.
    #[must_use]
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }
}

/// Background job deleting expired entries from the suggestion cache store.
#[derive(Debug, Clone)]
pub struct CachePurger {
    store: Arc<dyn KeyValueStore>,
    period: Duration,
}

impl CachePurger {
    /// Creates a purger ticking every `period`.
    #[must_use]
    pub const fn new(store: Arc<dyn KeyValueStore>, period: Duration) -> Self {
        Self { store, period }
    }

    /// Purges once and returns the number of removed entries.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the store cannot be purged.
    pub async fn run_once(&self) -> Result<u64, StoreError> {
        let purged = self.store.purge_expired().await?;
        if purged > 0 {
            tracing::debug!(purged, "expired cache entries removed");
        }
        Ok(purged)
    }

    /// Ticks forever. The first purge runs one period after the call.
    pub async fn run(self) {
        tracing::info!(period_secs = self.period.as_secs(), "cache purger started");
        let mut interval = delayed_interval(self.period).await;
        loop {
            interval.tick().await;
            if let Err(e) = self.run_once().await {
                tracing::warn!(error = %e, "cache purge failed");
            }
        }
    }

    /// Spawns [`CachePurger::run`] on the current runtime.
    #[must_use]
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }
}

/// An interval whose immediate first tick has already been consumed.
async fn delayed_interval(period: Duration) -> tokio::time::Interval {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    interval.tick().await;
    interval
}
