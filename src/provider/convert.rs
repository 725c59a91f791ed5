//! Local event → provider body.

use chrono::{Duration, NaiveTime};
use uuid::Uuid;

use crate::domain::{Event, EventId, RemoteEventBody, RemoteTime};

/// Remote id under which a local event is inserted.
///
/// The simple (undashed) form of the event's UUID: 32 lowercase hex digits,
/// which is within the base32hex alphabet Google accepts for client ids.
/// Because the id is fixed per event, a retried insert cannot duplicate it.
#[must_use]
pub fn remote_id_for(event_id: EventId) -> String {
    event_id.as_uuid().simple().to_string()
}

/// Recovers the local event id from a remote id produced by
/// [`remote_id_for`]. Provider-assigned ids yield `None`.
#[must_use]
pub fn local_id_from_remote(remote_id: &str) -> Option<EventId> {
    let simple = remote_id.len() == 32
        && remote_id
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
    if !simple {
        return None;
    }
    Uuid::try_parse(remote_id).ok().map(EventId::from_uuid)
}

/// Builds the provider payload for a local event.
///
/// Timed events carry their instants and authoring timezone. All-day events
/// are sent as dates with an exclusive end date that is always after the
/// start date.
#[must_use]
pub fn to_remote_body(event: &Event) -> RemoteEventBody {
    let (start, end) = if event.all_day {
        let start = event.start_at.date_naive();
        let mut end = event.end_at.date_naive();
        if event.end_at.time() != NaiveTime::MIN {
            end += Duration::days(1);
        }
        if end <= start {
            end = start + Duration::days(1);
        }
        (RemoteTime::Date(start), RemoteTime::Date(end))
    } else {
        let zone = Some(event.timezone.clone()).filter(|tz| !tz.is_empty());
        (
            RemoteTime::DateTime {
                at: event.start_at,
                time_zone: zone.clone(),
            },
            RemoteTime::DateTime {
                at: event.end_at,
                time_zone: zone,
            },
        )
    };

    RemoteEventBody {
        summary: event.title.clone(),
        description: event.description.clone(),
        location: event.location.clone(),
        start,
        end,
    }
}
