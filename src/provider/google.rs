//! Google Calendar v3 client.
//!
//! Speaks the `calendars/{calendarId}/events` resource over `reqwest`. The
//! connection's access token is sent as a bearer token; refreshing it is the
//! authentication layer's job.

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use reqwest::{Client, Method, RequestBuilder, Response, Url};
use serde::{Deserialize, Serialize};

use super::CalendarProvider;
use crate::domain::{
    CalendarConnection, RemoteEvent, RemoteEventBody, RemoteStatus, RemoteTime, SyncWindow,
};
use crate::error::ProviderError;

/// Upper bound on listing pages followed in one call.
const MAX_PAGES: usize = 50;

/// Events requested per listing page.
const PAGE_SIZE: &str = "250";

/// Google Calendar client implementing [`CalendarProvider`].
#[derive(Debug, Clone)]
pub struct GoogleCalendarClient {
    http: Client,
    base_url: String,
}

impl GoogleCalendarClient {
    /// Creates a client for the API rooted at `base_url`
    /// (e.g. `https://www.googleapis.com/calendar/v3`).
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(Client::new(), base_url)
    }

    /// Creates a client that reuses an existing `reqwest` client.
    #[must_use]
    pub fn with_client(http: Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
        }
    }

    fn events_url(&self, calendar_id: &str, event_id: Option<&str>) -> Result<Url, ProviderError> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| ProviderError::Http(format!("invalid base url: {e}")))?;
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|()| ProviderError::Http("base url cannot be a base".to_string()))?;
            segments.pop_if_empty().extend(["calendars", calendar_id, "events"]);
            if let Some(id) = event_id {
                segments.push(id);
            }
        }
        Ok(url)
    }

    fn request(&self, method: Method, url: Url, connection: &CalendarConnection) -> RequestBuilder {
        self.http
            .request(method, url)
            .bearer_auth(&connection.access_token)
    }
}

/// Maps non-success responses to [`ProviderError`].
async fn check(response: Response) -> Result<Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == reqwest::StatusCode::UNAUTHORIZED {
        return Err(ProviderError::Unauthorized);
    }
    let message = response.text().await.unwrap_or_default();
    Err(ProviderError::Status {
        status: status.as_u16(),
        message,
    })
}

#[async_trait]
impl CalendarProvider for GoogleCalendarClient {
    async fn list_events(
        &self,
        connection: &CalendarConnection,
        window: &SyncWindow,
    ) -> Result<Vec<RemoteEvent>, ProviderError> {
        let url = self.events_url(&connection.calendar_id, None)?;
        let time_min = window.start.to_rfc3339();
        let time_max = window.end.to_rfc3339();

        let mut events = Vec::new();
        let mut page_token: Option<String> = None;
        for _ in 0..MAX_PAGES {
            let mut query: Vec<(&str, &str)> = vec![
                ("timeMin", time_min.as_str()),
                ("timeMax", time_max.as_str()),
                ("singleEvents", "true"),
                ("showDeleted", "true"),
                ("maxResults", PAGE_SIZE),
            ];
            if let Some(token) = page_token.as_deref() {
                query.push(("pageToken", token));
            }

            let response = self
                .request(Method::GET, url.clone(), connection)
                .query(&query)
                .send()
                .await?;
            let page: wire::EventList = check(response).await?.json().await?;

            events.extend(page.items.into_iter().map(RemoteEvent::from));
            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => {
                    tracing::debug!(
                        user_id = %connection.user_id,
                        count = events.len(),
                        "listed remote events"
                    );
                    return Ok(events);
                }
            }
        }

        tracing::warn!(
            user_id = %connection.user_id,
            pages = MAX_PAGES,
            "remote listing truncated"
        );
        Ok(events)
    }

    async fn insert_event(
        &self,
        connection: &CalendarConnection,
        remote_id: &str,
        body: &RemoteEventBody,
    ) -> Result<RemoteEvent, ProviderError> {
        let url = self.events_url(&connection.calendar_id, None)?;
        let response = self
            .request(Method::POST, url, connection)
            .json(&wire::EventPayload::from(body).with_id(remote_id))
            .send()
            .await?;
        let created: wire::Event = check(response).await?.json().await?;
        Ok(created.into())
    }

    async fn update_event(
        &self,
        connection: &CalendarConnection,
        remote_id: &str,
        body: &RemoteEventBody,
    ) -> Result<RemoteEvent, ProviderError> {
        let url = self.events_url(&connection.calendar_id, Some(remote_id))?;
        let response = self
            .request(Method::PATCH, url, connection)
            .json(&wire::EventPayload::from(body))
            .send()
            .await?;
        let updated: wire::Event = check(response).await?.json().await?;
        Ok(updated.into())
    }

    async fn delete_event(
        &self,
        connection: &CalendarConnection,
        remote_id: &str,
    ) -> Result<(), ProviderError> {
        let url = self.events_url(&connection.calendar_id, Some(remote_id))?;
        let response = self
            .request(Method::DELETE, url, connection)
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }
}

/// Google Calendar JSON shapes.
mod wire {
    use super::*;

    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub(super) struct EventList {
        #[serde(default)]
        pub items: Vec<Event>,
        pub next_page_token: Option<String>,
    }

    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub(super) struct Event {
        pub id: String,
        #[serde(default)]
        pub etag: String,
        #[serde(default)]
        pub summary: String,
        pub description: Option<String>,
        pub location: Option<String>,
        pub start: Option<EventTime>,
        pub end: Option<EventTime>,
        #[serde(default)]
        pub status: String,
        pub updated: Option<DateTime<Utc>>,
    }

    /// `start`/`end` object. Exactly one of `date_time` and `date` is set;
    /// both are serialized so that a PATCH clears the other one.
    #[derive(Debug, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub(super) struct EventTime {
        #[serde(default)]
        pub date_time: Option<DateTime<FixedOffset>>,
        #[serde(default)]
        pub date: Option<NaiveDate>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub time_zone: Option<String>,
    }

    #[derive(Debug, Serialize)]
    #[serde(rename_all = "camelCase")]
    pub(super) struct EventPayload {
        #[serde(skip_serializing_if = "Option::is_none")]
        pub id: Option<String>,
        pub summary: String,
        pub description: Option<String>,
        pub location: Option<String>,
        pub start: EventTime,
        pub end: EventTime,
    }

    impl EventPayload {
        pub fn with_id(self, id: &str) -> Self {
            Self {
                id: Some(id.to_string()),
                ..self
            }
        }
    }

    impl EventTime {
        fn into_remote(self) -> Option<RemoteTime> {
            match (self.date_time, self.date) {
                (Some(at), _) => Some(RemoteTime::DateTime {
                    at: at.with_timezone(&Utc),
                    time_zone: self.time_zone,
                }),
                (None, Some(date)) => Some(RemoteTime::Date(date)),
                (None, None) => None,
            }
        }
    }

    impl From<&RemoteTime> for EventTime {
        fn from(time: &RemoteTime) -> Self {
            match time {
                RemoteTime::DateTime { at, time_zone } => Self {
                    date_time: Some(at.fixed_offset()),
                    date: None,
                    time_zone: time_zone.clone(),
                },
                RemoteTime::Date(date) => Self {
                    date_time: None,
                    date: Some(*date),
                    time_zone: None,
                },
            }
        }
    }

    impl From<&RemoteEventBody> for EventPayload {
        fn from(body: &RemoteEventBody) -> Self {
            Self {
                id: None,
                summary: body.summary.clone(),
                description: body.description.clone(),
                location: body.location.clone(),
                start: EventTime::from(&body.start),
                end: EventTime::from(&body.end),
            }
        }
    }

    impl From<Event> for RemoteEvent {
        fn from(event: Event) -> Self {
            Self {
                status: RemoteStatus::from_provider(&event.status),
                id: event.id,
                etag: event.etag,
                summary: event.summary,
                description: event.description,
                location: event.location,
                start: event.start.and_then(EventTime::into_remote),
                end: event.end.and_then(EventTime::into_remote),
                updated: event.updated,
            }
        }
    }
}
