//! Query parameters of the suggestion endpoint.

use chrono::{DateTime, Duration, DurationRound, FixedOffset, Offset, Utc};
use serde::Deserialize;
use utoipa::IntoParams;

use crate::domain::{SlotWindow, SuggestionQuery};
use crate::error::ApiError;

/// Radius used when the client does not send one.
pub const DEFAULT_RADIUS_MILES: u32 = 10;

/// Largest accepted radius.
pub const MAX_RADIUS_MILES: u32 = 100;

/// Slot length used when the client sends no end.
pub const DEFAULT_SLOT_HOURS: i64 = 3;

/// Granularity of a defaulted slot start, so that requests made within the
/// same quarter hour share cache entries.
pub const DEFAULT_START_BUCKET_MINUTES: i64 = 15;

/// Query string of `GET /suggestions`.
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct SuggestionParams {
    /// City to search in.
    pub city: Option<String>,
    /// Search radius in miles (1-100, default 10).
    pub radius_miles: Option<u32>,
    /// Comma-separated interest keywords.
    pub interests: Option<String>,
    /// Slot start (RFC 3339). Its offset selects the wall clock used for
    /// opening hours. Defaults to now, rounded down to the quarter hour.
    pub start: Option<DateTime<FixedOffset>>,
    /// Slot end (RFC 3339). Defaults to three hours after the start.
    pub end: Option<DateTime<FixedOffset>>,
}

impl SuggestionParams {
    /// Validates the parameters and fills in defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::InvalidRequest`] if the city is missing, the
    /// radius is out of range, or the slot does not end after it starts.
    pub fn into_query(self, now: DateTime<Utc>) -> Result<SuggestionQuery, ApiError> {
        let city = self
            .city
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .ok_or_else(|| ApiError::InvalidRequest("city is required".into()))?;

        let radius_miles = self.radius_miles.unwrap_or(DEFAULT_RADIUS_MILES);
        if radius_miles == 0 || radius_miles > MAX_RADIUS_MILES {
            return Err(ApiError::InvalidRequest(format!(
                "radius_miles must be between 1 and {MAX_RADIUS_MILES}"
            )));
        }

        let start = match self.start {
            Some(start) => start,
            None => {
                let offset = self.end.map_or_else(|| Utc.fix(), |end| *end.offset());
                default_start(now).with_timezone(&offset)
            }
        };
        let end = self
            .end
            .unwrap_or_else(|| start + Duration::hours(DEFAULT_SLOT_HOURS));
        if end <= start {
            return Err(ApiError::InvalidRequest("end must be after start".into()));
        }

        let interests = self
            .interests
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|i| !i.is_empty())
            .map(str::to_string)
            .collect();

        Ok(SuggestionQuery {
            city,
            radius_miles,
            interests,
            slot: SlotWindow::local(start, end),
        })
    }
}

fn default_start(now: DateTime<Utc>) -> DateTime<Utc> {
    now.duration_trunc(Duration::minutes(DEFAULT_START_BUCKET_MINUTES))
        .unwrap_or(now)
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn defaults_are_applied() {
        let now = Utc::now();
        let params = SuggestionParams {
            city: Some(" Boston ".into()),
            interests: Some("music, ,food".into()),
            ..SuggestionParams::default()
        };
        let Ok(query) = params.into_query(now) else {
            panic!("valid params rejected");
        };
        assert_eq!(query.city, "Boston");
        assert_eq!(query.radius_miles, DEFAULT_RADIUS_MILES);
        assert_eq!(query.interests, ["music", "food"]);
        let start = default_start(now);
        assert_eq!(query.slot.start, start);
        assert_eq!(query.slot.end, start + Duration::hours(DEFAULT_SLOT_HOURS));
        assert_eq!(query.slot.utc_offset_minutes, 0);
    }

    #[test]
    fn default_start_is_shared_within_a_quarter_hour() {
        let Some(first) = Utc.with_ymd_and_hms(2026, 5, 4, 10, 16, 3).single() else {
            panic!("valid timestamp");
        };
        let later = first + Duration::minutes(13);
        let query = |now| {
            let params = SuggestionParams {
                city: Some("Boston".into()),
                ..SuggestionParams::default()
            };
            let Ok(query) = params.into_query(now) else {
                panic!("valid params rejected");
            };
            query
        };
        let (a, b) = (query(first), query(later));
        assert_eq!(a.slot, b.slot);
        assert_eq!(
            a.cache_key(crate::domain::SuggestionSource::Osm),
            b.cache_key(crate::domain::SuggestionSource::Osm)
        );
        let Some(bucket) = Utc.with_ymd_and_hms(2026, 5, 4, 10, 15, 0).single() else {
            panic!("valid timestamp");
        };
        assert_eq!(a.slot.start, bucket);
    }

    #[test]
    fn client_offset_is_kept() {
        let Some(denver) = FixedOffset::west_opt(6 * 3600) else {
            panic!("valid offset");
        };
        let Some(start) = denver.with_ymd_and_hms(2026, 5, 4, 14, 0, 0).single() else {
            panic!("valid timestamp");
        };
        let params = SuggestionParams {
            city: Some("Denver".into()),
            start: Some(start),
            ..SuggestionParams::default()
        };
        let Ok(query) = params.into_query(Utc::now()) else {
            panic!("valid params rejected");
        };
        assert_eq!(query.slot.utc_offset_minutes, -360);
        assert_eq!(query.slot.start, start.with_timezone(&Utc));
        assert_eq!(query.slot.local_start(), start);
    }

    #[test]
    fn invalid_params_are_rejected() {
        let now = Utc::now();
        assert!(SuggestionParams::default().into_query(now).is_err());

        let inverted = SuggestionParams {
            city: Some("Boston".into()),
            start: Some(now.fixed_offset()),
            end: Some((now - Duration::hours(1)).fixed_offset()),
            ..SuggestionParams::default()
        };
        assert!(matches!(
            inverted.into_query(now),
            Err(ApiError::InvalidRequest(_))
        ));

        let too_far = SuggestionParams {
            city: Some("Boston".into()),
            radius_miles: Some(MAX_RADIUS_MILES + 1),
            ..SuggestionParams::default()
        };
        assert!(too_far.into_query(now).is_err());
    }
}
