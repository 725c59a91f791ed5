//! Provider-side event shapes.
//!
//! [`RemoteEvent`] is what a listing returns; [`RemoteEventBody`] is what an
//! insert or update sends. Neither is persisted.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};

use super::EventFields;
use crate::error::SyncError;

/// Title given to remote events that have no summary.
pub const UNTITLED: &str = "(untitled)";

/// Lifecycle status of a remote event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteStatus {
    /// Normal event.
    Confirmed,
    /// Tentatively scheduled.
    Tentative,
    /// Deleted on the provider side.
    Cancelled,
}

impl RemoteStatus {
    /// Parses a provider status string. Unknown values are treated as
    /// confirmed.
    #[must_use]
    pub fn from_provider(s: &str) -> Self {
        match s {
            "cancelled" => Self::Cancelled,
            "tentative" => Self::Tentative,
            _ => Self::Confirmed,
        }
    }
}

/// Start or end of a remote event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteTime {
    /// A precise instant, with the timezone the event was authored in.
    DateTime {
        /// The instant.
        at: DateTime<Utc>,
        /// IANA timezone, when the provider reports one.
        time_zone: Option<String>,
    },
    /// A calendar date for all-day events. End dates are exclusive.
    Date(NaiveDate),
}

impl RemoteTime {
    /// Returns the instant this boundary denotes (midnight UTC for dates).
    #[must_use]
    pub fn instant(&self) -> DateTime<Utc> {
        match self {
            Self::DateTime { at, .. } => *at,
            Self::Date(date) => date.and_time(NaiveTime::MIN).and_utc(),
        }
    }

    fn time_zone(&self) -> Option<&str> {
        match self {
            Self::DateTime { time_zone, .. } => time_zone.as_deref(),
            Self::Date(_) => None,
        }
    }
}

/// An event as listed by the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEvent {
    /// Remote identifier.
    pub id: String,
    /// Opaque change token, compared only for equality.
    pub etag: String,
    /// Title.
    pub summary: String,
    /// Description.
    pub description: Option<String>,
    /// Location.
    pub location: Option<String>,
    /// Start, absent on malformed events.
    pub start: Option<RemoteTime>,
    /// End, absent on malformed events.
    pub end: Option<RemoteTime>,
    /// Lifecycle status.
    pub status: RemoteStatus,
    /// Last remote modification.
    pub updated: Option<DateTime<Utc>>,
}

impl RemoteEvent {
    /// Returns `true` if the event was deleted remotely.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.status == RemoteStatus::Cancelled
    }

    /// Converts the remote event into local event fields.
    ///
    /// Accepts timed boundaries as well as date-only (all-day) boundaries.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Validation`] if the start or end is missing, or if
    /// the end precedes the start.
    pub fn to_fields(&self) -> Result<EventFields, SyncError> {
        let start = self
            .start
            .as_ref()
            .ok_or_else(|| SyncError::Validation(format!("event {} has no start", self.id)))?;
        let end = self
            .end
            .as_ref()
            .ok_or_else(|| SyncError::Validation(format!("event {} has no end", self.id)))?;

        let start_at = start.instant();
        let end_at = end.instant();
        if end_at < start_at {
            return Err(SyncError::Validation(format!(
                "event {} ends before it starts",
                self.id
            )));
        }

        let title = if self.summary.trim().is_empty() {
            UNTITLED.to_string()
        } else {
            self.summary.clone()
        };

        Ok(EventFields {
            title,
            description: self.description.clone().filter(|d| !d.is_empty()),
            location: self.location.clone().filter(|l| !l.is_empty()),
            start_at,
            end_at,
            all_day: matches!(start, RemoteTime::Date(_)),
            timezone: start.time_zone().unwrap_or("UTC").to_string(),
        })
    }
}

/// Event payload sent to the provider on insert and update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEventBody {
    /// Title.
    pub summary: String,
    /// Description.
    pub description: Option<String>,
    /// Location.
    pub location: Option<String>,
    /// Start.
    pub start: RemoteTime,
    /// End.
    pub end: RemoteTime,
}
