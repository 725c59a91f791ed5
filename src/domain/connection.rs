//! Per-user provider connection and pull window.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use super::UserId;
use crate::error::SyncError;

/// Days before "now" covered by a pull when the user has not chosen a window.
pub const DEFAULT_PULL_PAST_DAYS: u32 = 30;

/// Days after "now" covered by a pull when the user has not chosen a window.
pub const DEFAULT_PULL_FUTURE_DAYS: u32 = 90;

/// Calendar provider link for one user.
///
/// The access token is an opaque bearer credential maintained by the
/// authentication layer; this service only forwards it.
#[derive(Clone, PartialEq, Eq, Serialize)]
pub struct CalendarConnection {
    /// Owning user.
    pub user_id: UserId,
    /// Remote calendar to mirror (`primary` by default).
    pub calendar_id: String,
    /// Bearer token for provider calls.
    #[serde(skip)]
    pub access_token: String,
    /// Whether local events are pushed to the provider.
    pub push_enabled: bool,
    /// Days before now included in a pull.
    pub pull_past_days: u32,
    /// Days after now included in a pull.
    pub pull_future_days: u32,
    /// Completion time of the last sync run.
    pub last_synced_at: Option<DateTime<Utc>>,
    /// Time of the last run that reported errors.
    pub last_error_at: Option<DateTime<Utc>>,
    /// Number of per-event errors in the last failing run.
    pub last_error_count: u32,
    /// Message of the last error.
    pub last_error: Option<String>,
}

impl std::fmt::Debug for CalendarConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CalendarConnection")
            .field("user_id", &self.user_id)
            .field("calendar_id", &self.calendar_id)
            .field("access_token", &"<redacted>")
            .field("push_enabled", &self.push_enabled)
            .field("pull_past_days", &self.pull_past_days)
            .field("pull_future_days", &self.pull_future_days)
            .field("last_synced_at", &self.last_synced_at)
            .field("last_error_at", &self.last_error_at)
            .field("last_error_count", &self.last_error_count)
            .finish_non_exhaustive()
    }
}

impl CalendarConnection {
    /// Creates a connection to the user's primary calendar with the default
    /// pull window and push enabled.
    #[must_use]
    pub fn new(user_id: UserId, access_token: impl Into<String>) -> Self {
        Self {
            user_id,
            calendar_id: "primary".to_string(),
            access_token: access_token.into(),
            push_enabled: true,
            pull_past_days: DEFAULT_PULL_PAST_DAYS,
            pull_future_days: DEFAULT_PULL_FUTURE_DAYS,
            last_synced_at: None,
            last_error_at: None,
            last_error_count: 0,
            last_error: None,
        }
    }

    /// Returns the pull window `[now - past_days, now + future_days]`.
    #[must_use]
    pub fn pull_window(&self, now: DateTime<Utc>) -> SyncWindow {
        SyncWindow {
            start: now - Duration::days(i64::from(self.pull_past_days)),
            end: now + Duration::days(i64::from(self.pull_future_days)),
        }
    }

    /// Applies the result of a finished sync run.
    pub fn record(&mut self, outcome: &SyncOutcome) {
        self.last_synced_at = Some(outcome.at);
        if outcome.is_failure() {
            self.last_error_at = Some(outcome.at);
            self.last_error_count = outcome.error_count;
            self.last_error.clone_from(&outcome.last_error);
        } else {
            self.last_error_at = None;
            self.last_error_count = 0;
            self.last_error = None;
        }
    }
}

/// Closed time range used to list remote events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncWindow {
    /// Inclusive lower bound.
    pub start: DateTime<Utc>,
    /// Inclusive upper bound.
    pub end: DateTime<Utc>,
}

impl SyncWindow {
    /// Returns `true` if an event spanning `[start, end)` overlaps the window.
    #[must_use]
    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        start <= self.end && end >= self.start
    }
}

/// Result of a sync run as recorded on the connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOutcome {
    /// Completion time.
    pub at: DateTime<Utc>,
    /// Per-event failures plus timeouts, or 1 for a hard failure.
    pub error_count: u32,
    /// Message of the last error, if any.
    pub last_error: Option<String>,
}

impl SyncOutcome {
    /// Returns `true` if the run skipped events or failed outright.
    #[must_use]
    pub const fn is_failure(&self) -> bool {
        self.error_count > 0 || self.last_error.is_some()
    }
}

/// Longest pull window bound accepted from clients, in days.
pub const MAX_PULL_DAYS: u32 = 3650;

/// Client-supplied connection settings.
///
/// Absent fields keep the current value, or the default for a new
/// connection. The sync status fields are never touched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionSettings {
    /// New bearer token.
    pub access_token: String,
    /// Remote calendar id.
    pub calendar_id: Option<String>,
    /// Push toggle.
    pub push_enabled: Option<bool>,
    /// Days before now included in a pull.
    pub pull_past_days: Option<u32>,
    /// Days after now included in a pull.
    pub pull_future_days: Option<u32>,
}

impl ConnectionSettings {
    /// Applies the settings on top of `existing`, or on a fresh connection
    /// for `user_id`.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Validation`] if the token or calendar id is
    /// blank, or a window bound exceeds [`MAX_PULL_DAYS`].
    pub fn apply(
        self,
        user_id: UserId,
        existing: Option<CalendarConnection>,
    ) -> Result<CalendarConnection, SyncError> {
        if self.access_token.trim().is_empty() {
            return Err(SyncError::Validation("access token must not be empty".into()));
        }
        let too_wide = [self.pull_past_days, self.pull_future_days]
            .into_iter()
            .flatten()
            .any(|days| days > MAX_PULL_DAYS);
        if too_wide {
            return Err(SyncError::Validation(format!(
                "pull window bounds must not exceed {MAX_PULL_DAYS} days"
            )));
        }

        let mut connection = existing.unwrap_or_else(|| CalendarConnection::new(user_id, ""));
        connection.access_token = self.access_token;
        if let Some(calendar_id) = self.calendar_id {
            if calendar_id.trim().is_empty() {
                return Err(SyncError::Validation("calendar id must not be empty".into()));
            }
            connection.calendar_id = calendar_id;
        }
        if let Some(push_enabled) = self.push_enabled {
            connection.push_enabled = push_enabled;
        }
        if let Some(days) = self.pull_past_days {
            connection.pull_past_days = days;
        }
        if let Some(days) = self.pull_future_days {
            connection.pull_future_days = days;
        }
        Ok(connection)
    }
}
