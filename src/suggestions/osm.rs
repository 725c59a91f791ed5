//! OpenStreetMap places: Nominatim geocoding plus an Overpass query.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::USER_AGENT;
use serde::Deserialize;

use super::{SuggestionFetcher, check_status, opening_hours};
use crate::domain::{Suggestion, SuggestionQuery, SuggestionSource};
use crate::error::SourceError;

/// Sent on every request, as required by the public OSM endpoints.
const CLIENT_AGENT: &str = concat!("koda-gateway/", env!("CARGO_PKG_VERSION"));

const METERS_PER_MILE: f64 = 1609.344;

/// Maximum places returned by one Overpass query.
const RESULT_LIMIT: u32 = 60;

/// A tag filter: key and the values that match it.
type TagFilter = (&'static str, &'static [&'static str]);

/// Used when no interest maps to a known filter.
const DEFAULT_FILTERS: &[TagFilter] = &[
    ("tourism", &["attraction", "museum", "gallery"]),
    ("leisure", &["park"]),
];

/// Maps an interest keyword to OSM tag filters.
#[must_use]
pub fn interest_filters(interest: &str) -> &'static [TagFilter] {
    match interest.trim().to_lowercase().as_str() {
        "food" | "dining" | "restaurants" => &[("amenity", &["restaurant", "cafe", "food_court"])],
        "coffee" | "cafe" => &[("amenity", &["cafe"])],
        "drinks" | "nightlife" | "bars" => &[("amenity", &["bar", "pub", "biergarten", "nightclub"])],
        "music" => &[("amenity", &["music_venue", "nightclub"])],
        "art" | "arts" | "culture" => &[
            ("tourism", &["museum", "gallery"]),
            ("amenity", &["arts_centre", "theatre"]),
        ],
        "movies" | "film" => &[("amenity", &["cinema"])],
        "outdoors" | "nature" | "parks" => &[("leisure", &["park", "nature_reserve", "garden"])],
        "sports" | "fitness" => &[("leisure", &["sports_centre", "stadium", "fitness_centre"])],
        "sightseeing" | "attractions" => &[("tourism", &["attraction", "viewpoint"])],
        _ => &[],
    }
}

/// Builds the Overpass QL query for `query` around the given point.
#[must_use]
pub fn overpass_query(query: &SuggestionQuery, lat: f64, lon: f64) -> String {
    let mut by_key: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for (key, values) in query.interests.iter().flat_map(|i| interest_filters(i)) {
        by_key.entry(*key).or_default().extend(values.iter());
    }
    if by_key.is_empty() {
        for (key, values) in DEFAULT_FILTERS {
            by_key.entry(*key).or_default().extend(values.iter());
        }
    }

    let radius = (f64::from(query.radius_miles) * METERS_PER_MILE).round();
    let mut ql = String::from("[out:json][timeout:25];(");
    for (key, mut values) in by_key {
        values.sort_unstable();
        values.dedup();
        let _ = write!(
            ql,
            "nwr[\"{key}\"~\"^({})$\"][\"name\"](around:{radius},{lat},{lon});",
            values.join("|")
        );
    }
    let _ = write!(ql, ");out center {RESULT_LIMIT};");
    ql
}

/// Places from OpenStreetMap.
#[derive(Debug, Clone)]
pub struct OsmClient {
    http: Client,
    nominatim_url: String,
    overpass_url: String,
}

impl OsmClient {
    /// Creates a client using the given Nominatim search and Overpass
    /// interpreter endpoints.
    #[must_use]
    pub fn new(
        http: Client,
        nominatim_url: impl Into<String>,
        overpass_url: impl Into<String>,
    ) -> Self {
        Self {
            http,
            nominatim_url: nominatim_url.into(),
            overpass_url: overpass_url.into(),
        }
    }

    async fn geocode(&self, city: &str) -> Result<(f64, f64), SourceError> {
        let response = self
            .http
            .get(&self.nominatim_url)
            .header(USER_AGENT, CLIENT_AGENT)
            .query(&[("q", city), ("format", "json"), ("limit", "1")])
            .send()
            .await?;
        let places: Vec<wire::Place> = check_status(response)?.json().await?;
        let place = places
            .into_iter()
            .next()
            .ok_or_else(|| SourceError::UnknownCity(city.to_string()))?;

        let lat = place.lat.parse::<f64>();
        let lon = place.lon.parse::<f64>();
        match (lat, lon) {
            (Ok(lat), Ok(lon)) => Ok((lat, lon)),
            _ => Err(SourceError::InvalidResponse(format!(
                "bad coordinates for {city}"
            ))),
        }
    }
}

#[async_trait]
impl SuggestionFetcher for OsmClient {
    fn kind(&self) -> SuggestionSource {
        SuggestionSource::Osm
    }

    async fn fetch(&self, query: &SuggestionQuery) -> Result<Vec<Suggestion>, SourceError> {
        let (lat, lon) = self.geocode(&query.city).await?;
        let ql = overpass_query(query, lat, lon);

        let response = self
            .http
            .get(&self.overpass_url)
            .header(USER_AGENT, CLIENT_AGENT)
            .query(&[("data", ql.as_str())])
            .send()
            .await?;
        let body: wire::OverpassResponse = check_status(response)?.json().await?;

        let places: Vec<Suggestion> = body
            .elements
            .into_iter()
            .filter_map(|element| element.into_suggestion(query))
            .collect();
        tracing::debug!(city = %query.city, count = places.len(), "osm places fetched");
        Ok(places)
    }
}

mod wire {
    use super::*;

    #[derive(Debug, Deserialize)]
    pub(super) struct Place {
        pub lat: String,
        pub lon: String,
    }

    #[derive(Debug, Deserialize)]
    pub(super) struct OverpassResponse {
        #[serde(default)]
        pub elements: Vec<Element>,
    }

    #[derive(Debug, Deserialize)]
    pub(super) struct Element {
        #[serde(rename = "type")]
        pub kind: String,
        pub id: u64,
        #[serde(default)]
        pub tags: BTreeMap<String, String>,
    }

    impl Element {
        /// Unnamed features are dropped.
        pub(super) fn into_suggestion(self, query: &SuggestionQuery) -> Option<Suggestion> {
            let name = self.tags.get("name").filter(|n| !n.trim().is_empty())?;
            let state = opening_hours::evaluate(
                self.tags.get("opening_hours").map(String::as_str),
                &query.slot,
            );

            let mut suggestion = Suggestion::new(SuggestionSource::Osm, name, state, query.slot)
                .with_external_id(format!("osm:{}/{}", self.kind, self.id))
                .with_venue(name);
            let category = ["amenity", "tourism", "leisure"]
                .iter()
                .find_map(|key| self.tags.get(*key));
            if let Some(category) = category {
                suggestion = suggestion.with_category(category);
            }
            if let Some(site) = self.tags.get("website") {
                suggestion = suggestion.with_url(site);
            }
            Some(suggestion)
        }
    }
}
