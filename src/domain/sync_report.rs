//! Counters returned by pull, push and a full sync run.

use serde::Serialize;
use utoipa::ToSchema;

/// Result of a pull (remote → local).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct PullReport {
    /// Local events created from new remote events.
    pub pulled: u32,
    /// Local events updated because the remote change token moved.
    pub updated: u32,
    /// Local events removed because the remote event was cancelled.
    pub deleted: u32,
    /// Remote events skipped because of validation or provider errors.
    pub failed: u32,
    /// Remote events skipped because a call timed out.
    pub timed_out: u32,
}

/// Result of a push (local → remote).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct PushReport {
    /// Local events inserted remotely for the first time.
    pub pushed: u32,
    /// Remote events updated because the local event changed.
    pub updated: u32,
    /// Candidates skipped because the provider call failed.
    pub failed: u32,
    /// Candidates skipped because the provider call timed out.
    pub timed_out: u32,
}

/// Merged result of `sync_all`.
///
/// `updated` counts updates in both directions; the failure counters are
/// kept apart from the success counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct SyncReport {
    /// Local events created by the pull.
    pub pulled: u32,
    /// Events updated by the pull or the push.
    pub updated: u32,
    /// Local events deleted by the pull.
    pub deleted: u32,
    /// Local events inserted remotely by the push.
    pub pushed: u32,
    /// Events skipped because of errors.
    pub failed: u32,
    /// Events skipped because of timeouts.
    pub timed_out: u32,
}

impl SyncReport {
    /// Merges a pull and a push report.
    #[must_use]
    pub const fn merge(pull: PullReport, push: PushReport) -> Self {
        Self {
            pulled: pull.pulled,
            updated: pull.updated.saturating_add(push.updated),
            deleted: pull.deleted,
            pushed: push.pushed,
            failed: pull.failed.saturating_add(push.failed),
            timed_out: pull.timed_out.saturating_add(push.timed_out),
        }
    }

    /// Number of events skipped for any reason.
    #[must_use]
    pub const fn error_count(&self) -> u32 {
        self.failed.saturating_add(self.timed_out)
    }

    /// Returns `true` if the run changed nothing and skipped nothing.
    #[must_use]
    pub const fn is_noop(&self) -> bool {
        self.pulled == 0
            && self.updated == 0
            && self.deleted == 0
            && self.pushed == 0
            && self.error_count() == 0
    }
}
