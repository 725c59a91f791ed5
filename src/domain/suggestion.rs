//! Suggestion DTOs and the query that produces them.

use std::fmt;

use chrono::{DateTime, FixedOffset, Offset, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Which external source produced a suggestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SuggestionSource {
    /// Ticketed events provider.
    Ticketmaster,
    /// OpenStreetMap places.
    Osm,
}

impl SuggestionSource {
    /// Short stable name used in cache keys and logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ticketmaster => "ticketmaster",
            Self::Osm => "osm",
        }
    }
}

impl fmt::Display for SuggestionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether the venue or event is open during the requested slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OpenState {
    /// Open for the whole slot.
    Open,
    /// Closed for at least part of the slot.
    Closed,
    /// No usable opening information.
    Unknown,
}

/// How much the open-state can be trusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Confidence {
    /// The source reported the suggestion as open.
    High,
    /// Opening information is missing; use caution.
    Low,
}

impl From<OpenState> for Confidence {
    fn from(state: OpenState) -> Self {
        match state {
            OpenState::Open => Self::High,
            OpenState::Closed | OpenState::Unknown => Self::Low,
        }
    }
}

/// Requested time slot.
///
/// The instants are absolute; `utc_offset_minutes` is the requester's offset
/// and gives the wall clock that venue opening hours are compared against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct SlotWindow {
    /// Slot start.
    pub start: DateTime<Utc>,
    /// Slot end.
    pub end: DateTime<Utc>,
    /// Local offset from UTC, in minutes.
    #[serde(default)]
    pub utc_offset_minutes: i32,
}

impl SlotWindow {
    /// A slot on the UTC wall clock.
    #[must_use]
    pub const fn utc(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            start,
            end,
            utc_offset_minutes: 0,
        }
    }

    /// A slot on the wall clock of `start`'s offset.
    #[must_use]
    pub fn local(start: DateTime<FixedOffset>, end: DateTime<FixedOffset>) -> Self {
        Self {
            start: start.with_timezone(&Utc),
            end: end.with_timezone(&Utc),
            utc_offset_minutes: start.offset().local_minus_utc() / 60,
        }
    }

    /// The requester's offset. Out-of-range values fall back to UTC.
    #[must_use]
    pub fn offset(&self) -> FixedOffset {
        self.utc_offset_minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
            .unwrap_or_else(|| Utc.fix())
    }

    /// Slot start on the requester's wall clock.
    #[must_use]
    pub fn local_start(&self) -> DateTime<FixedOffset> {
        self.start.with_timezone(&self.offset())
    }
}

/// A candidate thing to do.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Suggestion {
    /// Producing source.
    pub source: SuggestionSource,
    /// Display title.
    pub title: String,
    /// Stable identifier at the source.
    pub external_id: Option<String>,
    /// Venue name.
    pub venue_name: Option<String>,
    /// Link to details or tickets.
    pub url: Option<String>,
    /// Source-specific category (segment, amenity type).
    pub category: Option<String>,
    /// Open-state during the slot.
    pub open_state: OpenState,
    /// Derived from `open_state`.
    pub confidence: Confidence,
    /// Slot start.
    pub slot_start: DateTime<Utc>,
    /// Slot end.
    pub slot_end: DateTime<Utc>,
}

impl Suggestion {
    /// Creates a suggestion for `slot`, deriving the confidence from the
    /// open-state.
    #[must_use]
    pub fn new(
        source: SuggestionSource,
        title: impl Into<String>,
        open_state: OpenState,
        slot: SlotWindow,
    ) -> Self {
        Self {
            source,
            title: title.into(),
            external_id: None,
            venue_name: None,
            url: None,
            category: None,
            open_state,
            confidence: Confidence::from(open_state),
            slot_start: slot.start,
            slot_end: slot.end,
        }
    }

    /// Sets the source identifier.
    #[must_use]
    pub fn with_external_id(mut self, id: impl Into<String>) -> Self {
        self.external_id = Some(id.into());
        self
    }

    /// Sets the venue name.
    #[must_use]
    pub fn with_venue(mut self, venue: impl Into<String>) -> Self {
        self.venue_name = Some(venue.into());
        self
    }

    /// Sets the details link.
    #[must_use]
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Sets the category.
    #[must_use]
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }
}

/// Parameters of a suggestion request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuggestionQuery {
    /// City to search in.
    pub city: String,
    /// Search radius in miles.
    pub radius_miles: u32,
    /// Interest keywords (e.g. `music`, `food`).
    pub interests: Vec<String>,
    /// Requested slot.
    pub slot: SlotWindow,
}

impl SuggestionQuery {
    /// Stable cache key for this query at `source`.
    ///
    /// Interests are lowercased and sorted so that permutations share an
    /// entry.
    #[must_use]
    pub fn cache_key(&self, source: SuggestionSource) -> String {
        let mut interests: Vec<String> = self
            .interests
            .iter()
            .map(|i| i.trim().to_lowercase())
            .filter(|i| !i.is_empty())
            .collect();
        interests.sort();
        interests.dedup();
        format!(
            "suggestions:{source}:{}:{}:{}:{}:{}:{}",
            self.city.trim().to_lowercase(),
            self.radius_miles,
            interests.join(","),
            self.slot.start.timestamp(),
            self.slot.end.timestamp(),
            self.slot.utc_offset_minutes,
        )
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Timelike};

    fn slot() -> SlotWindow {
        let start = Utc::now();
        SlotWindow::utc(start, start + chrono::Duration::hours(2))
    }

    #[test]
    fn confidence_follows_open_state() {
        assert_eq!(Confidence::from(OpenState::Open), Confidence::High);
        assert_eq!(Confidence::from(OpenState::Unknown), Confidence::Low);
        let s = Suggestion::new(SuggestionSource::Osm, "Cafe", OpenState::Unknown, slot());
        assert_eq!(s.confidence, Confidence::Low);
    }

    #[test]
    fn cache_key_ignores_interest_order_and_case() {
        let slot = slot();
        let a = SuggestionQuery {
            city: "Austin".into(),
            radius_miles: 5,
            interests: vec!["Music".into(), "food".into()],
            slot,
        };
        let b = SuggestionQuery {
            city: " austin ".into(),
            radius_miles: 5,
            interests: vec!["food".into(), "music".into(), "music".into()],
            slot,
        };
        assert_eq!(
            a.cache_key(SuggestionSource::Osm),
            b.cache_key(SuggestionSource::Osm)
        );
        assert_ne!(
            a.cache_key(SuggestionSource::Osm),
            a.cache_key(SuggestionSource::Ticketmaster)
        );
    }

    #[test]
    fn local_slot_keeps_offset() {
        let Some(denver) = FixedOffset::west_opt(6 * 3600) else {
            panic!("valid offset");
        };
        let Some(start) = denver.with_ymd_and_hms(2026, 5, 4, 14, 0, 0).single() else {
            panic!("valid timestamp");
        };
        let slot = SlotWindow::local(start, start + chrono::Duration::hours(1));
        assert_eq!(slot.utc_offset_minutes, -360);
        assert_eq!(slot.start.hour(), 20);
        assert_eq!(slot.local_start().hour(), 14);
    }

    #[test]
    fn serializes_in_camel_case() {
        let s = Suggestion::new(SuggestionSource::Ticketmaster, "Show", OpenState::Open, slot())
            .with_external_id("tm-1")
            .with_venue("Arena");
        let Ok(json) = serde_json::to_value(&s) else {
            panic!("serialization failed");
        };
        assert_eq!(json.get("externalId"), Some(&serde_json::json!("tm-1")));
        assert_eq!(json.get("openState"), Some(&serde_json::json!("OPEN")));
        assert_eq!(json.get("confidence"), Some(&serde_json::json!("HIGH")));
        assert_eq!(json.get("source"), Some(&serde_json::json!("TICKETMASTER")));
    }
}
