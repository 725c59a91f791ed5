//! Ticketmaster Discovery v2 client.

use async_trait::async_trait;
use chrono::SecondsFormat;
use reqwest::Client;
use serde::Deserialize;

use super::{SuggestionFetcher, check_status};
use crate::domain::{OpenState, Suggestion, SuggestionQuery, SuggestionSource};
use crate::error::SourceError;

/// Results requested per query.
const PAGE_SIZE: &str = "50";

/// Ticketed events near a city.
///
/// Without an API key every fetch returns an empty list.
#[derive(Clone)]
pub struct TicketmasterClient {
    http: Client,
    base_url: String,
    api_key: Option<String>,
}

impl std::fmt::Debug for TicketmasterClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TicketmasterClient")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .finish_non_exhaustive()
    }
}

impl TicketmasterClient {
    /// Creates a client for the API rooted at `base_url`.
    #[must_use]
    pub fn new(http: Client, base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            api_key,
        }
    }
}

/// Maps a Discovery event status code to an open-state.
#[must_use]
pub fn open_state(status_code: Option<&str>) -> OpenState {
    match status_code {
        Some("cancelled" | "offsale") => OpenState::Closed,
        Some("onsale" | "rescheduled") => OpenState::Open,
        _ => OpenState::Unknown,
    }
}

#[async_trait]
impl SuggestionFetcher for TicketmasterClient {
    fn kind(&self) -> SuggestionSource {
        SuggestionSource::Ticketmaster
    }

    async fn fetch(&self, query: &SuggestionQuery) -> Result<Vec<Suggestion>, SourceError> {
        let Some(api_key) = self.api_key.as_deref() else {
            tracing::debug!("ticketmaster api key not configured");
            return Ok(Vec::new());
        };

        let url = format!("{}/events.json", self.base_url.trim_end_matches('/'));
        let radius = query.radius_miles.to_string();
        let start = query.slot.start.to_rfc3339_opts(SecondsFormat::Secs, true);
        let end = query.slot.end.to_rfc3339_opts(SecondsFormat::Secs, true);
        let classifications = query.interests.join(",");

        let mut params: Vec<(&str, &str)> = vec![
            ("apikey", api_key),
            ("city", query.city.as_str()),
            ("radius", radius.as_str()),
            ("unit", "miles"),
            ("startDateTime", start.as_str()),
            ("endDateTime", end.as_str()),
            ("size", PAGE_SIZE),
        ];
        if !classifications.is_empty() {
            params.push(("classificationName", classifications.as_str()));
        }

        let response = self.http.get(url).query(&params).send().await?;
        let body: wire::SearchResponse = check_status(response)?.json().await?;

        let events = body.embedded.map(|e| e.events).unwrap_or_default();
        tracing::debug!(city = %query.city, count = events.len(), "ticketmaster events fetched");
        Ok(events
            .into_iter()
            .map(|event| event.into_suggestion(query))
            .collect())
    }
}

mod wire {
    use super::*;

    #[derive(Debug, Deserialize)]
    pub(super) struct SearchResponse {
        #[serde(rename = "_embedded")]
        pub embedded: Option<EmbeddedEvents>,
    }

    #[derive(Debug, Deserialize)]
    pub(super) struct EmbeddedEvents {
        #[serde(default)]
        pub events: Vec<Event>,
    }

    #[derive(Debug, Deserialize)]
    pub(super) struct Event {
        pub id: String,
        pub name: String,
        pub url: Option<String>,
        pub dates: Option<Dates>,
        #[serde(default)]
        pub classifications: Vec<Classification>,
        #[serde(rename = "_embedded")]
        pub embedded: Option<EmbeddedVenues>,
    }

    #[derive(Debug, Deserialize)]
    pub(super) struct Dates {
        pub status: Option<Status>,
    }

    #[derive(Debug, Deserialize)]
    pub(super) struct Status {
        pub code: Option<String>,
    }

    #[derive(Debug, Deserialize)]
    pub(super) struct Classification {
        pub segment: Option<Named>,
    }

    #[derive(Debug, Deserialize)]
    pub(super) struct EmbeddedVenues {
        #[serde(default)]
        pub venues: Vec<Named>,
    }

    #[derive(Debug, Deserialize)]
    pub(super) struct Named {
        pub name: Option<String>,
    }

    impl Event {
        pub(super) fn into_suggestion(self, query: &SuggestionQuery) -> Suggestion {
            let status = self
                .dates
                .and_then(|d| d.status)
                .and_then(|s| s.code);
            let mut suggestion = Suggestion::new(
                SuggestionSource::Ticketmaster,
                self.name,
                open_state(status.as_deref()),
                query.slot,
            )
            .with_external_id(self.id);

            let venue = self
                .embedded
                .and_then(|e| e.venues.into_iter().next())
                .and_then(|v| v.name);
            if let Some(venue) = venue {
                suggestion = suggestion.with_venue(venue);
            }
            if let Some(url) = self.url {
                suggestion = suggestion.with_url(url);
            }
            let segment = self
                .classifications
                .into_iter()
                .find_map(|c| c.segment.and_then(|s| s.name));
            if let Some(segment) = segment {
                suggestion = suggestion.with_category(segment);
            }
            suggestion
        }
    }
}
