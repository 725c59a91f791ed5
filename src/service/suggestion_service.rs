//! Suggestion pipeline: concurrent fetch from both sources, then ranking.

use std::sync::Arc;
use std::time::Duration;

use crate::domain::{Suggestion, SuggestionQuery};
use crate::error::SourceError;
use crate::suggestions::SuggestionFetcher;

use super::ranking;

/// Fans a query out to the ticketed-events and places sources and ranks
/// the merged candidates.
///
/// A source that fails or exceeds the timeout contributes nothing; the
/// other source's results are still returned.
#[derive(Debug, Clone)]
pub struct SuggestionService {
    ticketed: Arc<dyn SuggestionFetcher>,
    places: Arc<dyn SuggestionFetcher>,
    timeout: Duration,
}

impl SuggestionService {
    /// Creates the pipeline. Ticketed results precede places in the output.
    #[must_use]
    pub fn new(
        ticketed: Arc<dyn SuggestionFetcher>,
        places: Arc<dyn SuggestionFetcher>,
        timeout: Duration,
    ) -> Self {
        Self {
            ticketed,
            places,
            timeout,
        }
    }

    /// Returns ranked suggestions for `query`.
    pub async fn suggest(&self, query: &SuggestionQuery) -> Vec<Suggestion> {
        let (ticketed, places) = tokio::join!(
            self.fetch_bounded(self.ticketed.as_ref(), query),
            self.fetch_bounded(self.places.as_ref(), query),
        );
        let fetched = ticketed.len() + places.len();
        let ranked = ranking::rank(ticketed.into_iter().chain(places));
        tracing::info!(
            city = %query.city,
            fetched,
            returned = ranked.len(),
            "suggestions ranked"
        );
        ranked
    }

    async fn fetch_bounded(
        &self,
        fetcher: &dyn SuggestionFetcher,
        query: &SuggestionQuery,
    ) -> Vec<Suggestion> {
        let source = fetcher.kind();
        let error = match tokio::time::timeout(self.timeout, fetcher.fetch(query)).await {
            Ok(Ok(candidates)) => return candidates,
            Ok(Err(e)) => e,
            Err(_) => SourceError::Timeout(self.timeout),
        };
        tracing::warn!(%source, error = %error, "suggestion source failed");
        Vec::new()
    }
}
