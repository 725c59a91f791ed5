//! External "things to do" sources.
//!
//! Each source implements [`SuggestionFetcher`] and fails independently; the
//! ranking pipeline in [`crate::service::suggestion_service`] decides what a
//! failure means. [`cache::CachedFetcher`] wraps any fetcher with a TTL cache.

pub mod cache;
pub mod opening_hours;
pub mod osm;
pub mod ticketmaster;

use std::fmt::Debug;

use async_trait::async_trait;

use crate::domain::{Suggestion, SuggestionQuery, SuggestionSource};
use crate::error::SourceError;

pub use cache::{CachedFetcher, SuggestionCache};
pub use osm::OsmClient;
pub use ticketmaster::TicketmasterClient;

/// A source of suggestions.
#[async_trait]
pub trait SuggestionFetcher: Debug + Send + Sync {
    /// The source this fetcher queries.
    fn kind(&self) -> SuggestionSource;

    /// Fetches candidates for `query`, including closed ones.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] if the source cannot be reached or answers
    /// with an unexpected response.
    async fn fetch(&self, query: &SuggestionQuery) -> Result<Vec<Suggestion>, SourceError>;
}

/// Fails with [`SourceError::Status`] on non-success responses.
pub(crate) fn check_status(response: reqwest::Response) -> Result<reqwest::Response, SourceError> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(SourceError::Status {
            status: status.as_u16(),
        })
    }
}
