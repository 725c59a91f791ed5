//! Database rows for events, mappings and connections, and their conversion
//! into domain values.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::{CalendarConnection, Event, EventMapping};
use crate::error::StoreError;

/// A row from the `events` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct EventRow {
    /// Primary key.
    pub id: Uuid,
    /// Owning user.
    pub owner_id: Uuid,
    /// Title.
    pub title: String,
    /// Description.
    pub description: Option<String>,
    /// Location.
    pub location: Option<String>,
    /// Start instant.
    pub start_at: DateTime<Utc>,
    /// End instant.
    pub end_at: DateTime<Utc>,
    /// Whole-day flag.
    pub all_day: bool,
    /// IANA timezone.
    pub timezone: String,
    /// `PRIVATE`, `FRIENDS` or `PUBLIC`.
    pub visibility: String,
    /// `KODA` or `GOOGLE`.
    pub source: String,
    /// Remote id for pulled events.
    pub external_id: Option<String>,
    /// Mirror-to-provider flag.
    pub sync_to_google: bool,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last modification timestamp.
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<EventRow> for Event {
    type Error = StoreError;

    fn try_from(row: EventRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id.into(),
            owner_id: row.owner_id.into(),
            title: row.title,
            description: row.description,
            location: row.location,
            start_at: row.start_at,
            end_at: row.end_at,
            all_day: row.all_day,
            timezone: row.timezone,
            visibility: row.visibility.parse()?,
            source: row.source.parse()?,
            external_id: row.external_id,
            sync_to_google: row.sync_to_google,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// A row from the `google_event_mappings` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct MappingRow {
    /// Owning user.
    pub user_id: Uuid,
    /// Local event (primary key).
    pub koda_event_id: Uuid,
    /// Remote event id.
    pub google_event_id: String,
    /// Remote change token.
    pub google_etag: String,
    /// Last reconciliation time.
    pub last_pushed_at: DateTime<Utc>,
}

impl From<MappingRow> for EventMapping {
    fn from(row: MappingRow) -> Self {
        Self {
            user_id: row.user_id.into(),
            koda_event_id: row.koda_event_id.into(),
            google_event_id: row.google_event_id,
            google_etag: row.google_etag,
            last_pushed_at: row.last_pushed_at,
        }
    }
}

/// A row from the `google_calendar_connections` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ConnectionRow {
    /// Owning user (primary key).
    pub user_id: Uuid,
    /// Remote calendar id.
    pub calendar_id: String,
    /// Bearer token.
    pub access_token: String,
    /// Push switch.
    pub push_enabled: bool,
    /// Pull window lower bound in days.
    pub pull_past_days: i32,
    /// Pull window upper bound in days.
    pub pull_future_days: i32,
    /// Last completed sync.
    pub last_synced_at: Option<DateTime<Utc>>,
    /// Last failing sync.
    pub last_error_at: Option<DateTime<Utc>>,
    /// Errors in the last failing sync.
    pub last_error_count: i32,
    /// Last error message.
    pub last_error: Option<String>,
}

impl TryFrom<ConnectionRow> for CalendarConnection {
    type Error = StoreError;

    fn try_from(row: ConnectionRow) -> Result<Self, Self::Error> {
        let days = |v: i32, column: &str| {
            u32::try_from(v).map_err(|_| StoreError::Corrupt(format!("negative {column}: {v}")))
        };
        Ok(Self {
            user_id: row.user_id.into(),
            calendar_id: row.calendar_id,
            access_token: row.access_token,
            push_enabled: row.push_enabled,
            pull_past_days: days(row.pull_past_days, "pull_past_days")?,
            pull_future_days: days(row.pull_future_days, "pull_future_days")?,
            last_synced_at: row.last_synced_at,
            last_error_at: row.last_error_at,
            last_error_count: days(row.last_error_count, "last_error_count")?,
            last_error: row.last_error,
        })
    }
}

/// An event row left-joined with its optional mapping.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PushCandidateRow {
    /// The event columns.
    #[sqlx(flatten)]
    pub event: EventRow,
    /// Mapped remote id, if any.
    pub google_event_id: Option<String>,
    /// Mapped change token, if any.
    pub google_etag: Option<String>,
    /// Last push time, if any.
    pub last_pushed_at: Option<DateTime<Utc>>,
}

/// A local event selected for push, with its mapping when it was pushed
/// before.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushCandidate {
    /// The local event (always `source = KODA`).
    pub event: Event,
    /// Existing mapping, `None` if the event was never pushed.
    pub mapping: Option<EventMapping>,
}

impl TryFrom<PushCandidateRow> for PushCandidate {
    type Error = StoreError;

    fn try_from(row: PushCandidateRow) -> Result<Self, Self::Error> {
        let event = Event::try_from(row.event)?;
        let mapping = match (row.google_event_id, row.google_etag, row.last_pushed_at) {
            (Some(google_event_id), Some(google_etag), Some(last_pushed_at)) => {
                Some(EventMapping {
                    user_id: event.owner_id,
                    koda_event_id: event.id,
                    google_event_id,
                    google_etag,
                    last_pushed_at,
                })
            }
            (None, None, None) => None,
            _ => {
                return Err(StoreError::Corrupt(format!(
                    "partial mapping row for event {}",
                    event.id
                )));
            }
        };
        Ok(Self { event, mapping })
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::domain::EventSource;

    fn event_row(source: &str) -> EventRow {
        let now = Utc::now();
        EventRow {
            id: Uuid::new_v4(),
            owner_id: Uuid::new_v4(),
            title: "Climbing".into(),
            description: None,
            location: None,
            start_at: now,
            end_at: now,
            all_day: false,
            timezone: "UTC".into(),
            visibility: "FRIENDS".into(),
            source: source.into(),
            external_id: None,
            sync_to_google: true,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn event_row_converts() {
        let Ok(event) = Event::try_from(event_row("KODA")) else {
            panic!("conversion failed");
        };
        assert_eq!(event.source, EventSource::Koda);
    }

    #[test]
    fn unknown_source_is_corrupt() {
        assert!(matches!(
            Event::try_from(event_row("OUTLOOK")),
            Err(StoreError::Corrupt(_))
        ));
    }

    #[test]
    fn candidate_without_mapping() {
        let row = PushCandidateRow {
            event: event_row("KODA"),
            google_event_id: None,
            google_etag: None,
            last_pushed_at: None,
        };
        let Ok(candidate) = PushCandidate::try_from(row) else {
            panic!("conversion failed");
        };
        assert!(candidate.mapping.is_none());
    }

    #[test]
    fn candidate_with_partial_mapping_is_corrupt() {
        let row = PushCandidateRow {
            event: event_row("KODA"),
            google_event_id: Some("g".into()),
            google_etag: None,
            last_pushed_at: None,
        };
        assert!(PushCandidate::try_from(row).is_err());
    }

    #[test]
    fn negative_window_is_corrupt() {
        let row = ConnectionRow {
            user_id: Uuid::new_v4(),
            calendar_id: "primary".into(),
            access_token: "t".into(),
            push_enabled: true,
            pull_past_days: -1,
            pull_future_days: 10,
            last_synced_at: None,
            last_error_at: None,
            last_error_count: 0,
            last_error: None,
        };
        assert!(CalendarConnection::try_from(row).is_err());
    }
}
