//! Local calendar events.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::{EventId, UserId};
use crate::error::UnknownVariant;

/// Who may see an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Visibility {
    /// Only the owner.
    Private,
    /// The owner's friends, subject to their privacy tier.
    Friends,
    /// Everyone.
    Public,
}

impl Visibility {
    /// Returns the stored representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Private => "PRIVATE",
            Self::Friends => "FRIENDS",
            Self::Public => "PUBLIC",
        }
    }
}

impl FromStr for Visibility {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PRIVATE" => Ok(Self::Private),
            "FRIENDS" => Ok(Self::Friends),
            "PUBLIC" => Ok(Self::Public),
            other => Err(UnknownVariant {
                kind: "visibility",
                value: other.to_string(),
            }),
        }
    }
}

/// Where an event was authored.
///
/// `Google` events were created by a pull and are never push candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventSource {
    /// Authored in the application.
    Koda,
    /// Imported from the external calendar.
    Google,
}

impl EventSource {
    /// Returns the stored representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Koda => "KODA",
            Self::Google => "GOOGLE",
        }
    }
}

impl fmt::Display for EventSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventSource {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "KODA" => Ok(Self::Koda),
            "GOOGLE" => Ok(Self::Google),
            other => Err(UnknownVariant {
                kind: "event source",
                value: other.to_string(),
            }),
        }
    }
}

/// A stored local event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct Event {
    /// Local identifier.
    pub id: EventId,
    /// Owning user.
    pub owner_id: UserId,
    /// Title (provider `summary`).
    pub title: String,
    /// Free-form description.
    pub description: Option<String>,
    /// Free-form location.
    pub location: Option<String>,
    /// Start instant.
    pub start_at: DateTime<Utc>,
    /// End instant (exclusive).
    pub end_at: DateTime<Utc>,
    /// Whole-day event; `start_at`/`end_at` are midnight UTC boundaries.
    pub all_day: bool,
    /// IANA timezone the event was authored in.
    pub timezone: String,
    /// Who may see the event.
    pub visibility: Visibility,
    /// Where the event was authored.
    pub source: EventSource,
    /// Remote event id for pulled events.
    pub external_id: Option<String>,
    /// Whether the owner wants this event mirrored to the provider.
    pub sync_to_google: bool,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last local modification timestamp.
    pub updated_at: DateTime<Utc>,
}

/// Fields for inserting a new event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEvent {
    /// Owning user.
    pub owner_id: UserId,
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
    /// Visibility.
    pub visibility: Visibility,
    /// Authoring source.
    pub source: EventSource,
    /// Remote id (pulled events only).
    pub external_id: Option<String>,
    /// Mirror to the provider.
    pub sync_to_google: bool,
}

impl NewEvent {
    /// A locally authored event that is mirrored to the provider.
    #[must_use]
    pub fn local(
        owner_id: UserId,
        title: impl Into<String>,
        start_at: DateTime<Utc>,
        end_at: DateTime<Utc>,
    ) -> Self {
        Self {
            owner_id,
            title: title.into(),
            description: None,
            location: None,
            start_at,
            end_at,
            all_day: false,
            timezone: "UTC".to_string(),
            visibility: Visibility::Private,
            source: EventSource::Koda,
            external_id: None,
            sync_to_google: true,
        }
    }

    /// An event imported from the provider.
    ///
    /// Pulled events stay private and are never mirrored back.
    #[must_use]
    pub fn pulled(owner_id: UserId, remote_id: impl Into<String>, fields: EventFields) -> Self {
        Self {
            owner_id,
            title: fields.title,
            description: fields.description,
            location: fields.location,
            start_at: fields.start_at,
            end_at: fields.end_at,
            all_day: fields.all_day,
            timezone: fields.timezone,
            visibility: Visibility::Private,
            source: EventSource::Google,
            external_id: Some(remote_id.into()),
            sync_to_google: false,
        }
    }

    /// Materializes the insert into a stored [`Event`] with the given id and
    /// timestamp.
    #[must_use]
    pub fn into_event(self, id: EventId, now: DateTime<Utc>) -> Event {
        Event {
            id,
            owner_id: self.owner_id,
            title: self.title,
            description: self.description,
            location: self.location,
            start_at: self.start_at,
            end_at: self.end_at,
            all_day: self.all_day,
            timezone: self.timezone,
            visibility: self.visibility,
            source: self.source,
            external_id: self.external_id,
            sync_to_google: self.sync_to_google,
            created_at: now,
            updated_at: now,
        }
    }
}

/// The subset of event fields that is exchanged with the provider.
///
/// Produced from a remote event by a pull and applied to the local event
/// when the remote change token differs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventFields {
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
}

impl Event {
    /// Applies provider-owned fields, leaving identity, visibility, source
    /// and sync preferences untouched.
    pub fn apply_fields(&mut self, fields: EventFields, now: DateTime<Utc>) {
        self.title = fields.title;
        self.description = fields.description;
        self.location = fields.location;
        self.start_at = fields.start_at;
        self.end_at = fields.end_at;
        self.all_day = fields.all_day;
        self.timezone = fields.timezone;
        self.updated_at = now;
    }

    /// Returns `true` if this event may be selected for push.
    #[must_use]
    pub const fn is_push_candidate(&self) -> bool {
        matches!(self.source, EventSource::Koda) && self.sync_to_google
    }
}
