//! Link between a local event and its remote counterpart.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{EventId, UserId};

/// Mapping row joining a local event to a remote event.
///
/// At most one mapping exists per local event (`koda_event_id` is the
/// natural key), and `google_event_id` is unique per user. The two change
/// markers drive loop prevention: `google_etag` guards pulls and
/// `last_pushed_at` guards pushes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EventMapping {
    /// Owning user.
    pub user_id: UserId,
    /// Local event.
    pub koda_event_id: EventId,
    /// Remote event id.
    pub google_event_id: String,
    /// Remote change token last seen or produced by this service.
    pub google_etag: String,
    /// Last time the local state was reconciled with the remote state.
    pub last_pushed_at: DateTime<Utc>,
}

impl EventMapping {
    /// Returns `true` if `etag` differs from the stored change token.
    #[must_use]
    pub fn remote_changed(&self, etag: &str) -> bool {
        self.google_etag != etag
    }

    /// Returns `true` if the local event was modified after the last push.
    #[must_use]
    pub fn local_changed(&self, updated_at: DateTime<Utc>) -> bool {
        updated_at > self.last_pushed_at
    }
}
