//! Pure filtering and deduplication of suggestion candidates.

use std::collections::HashSet;

use crate::domain::{Confidence, OpenState, Suggestion};

/// Normalized `(venue, title)` pair.
type VenueTitle = (String, String);

fn normalize(s: &str) -> String {
    s.trim().to_lowercase()
}

fn id_key(suggestion: &Suggestion) -> Option<String> {
    suggestion
        .external_id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
}

fn venue_title_key(suggestion: &Suggestion) -> Option<VenueTitle> {
    let venue = normalize(suggestion.venue_name.as_deref()?);
    if venue.is_empty() {
        return None;
    }
    Some((venue, normalize(&suggestion.title)))
}

/// Ranks candidates in input order.
///
/// Closed candidates are dropped and the confidence is re-derived from the
/// open-state. A candidate is a duplicate when it shares a non-empty
/// external id, or a non-empty venue with the same title, with any earlier
/// candidate, including earlier duplicates. The first of each group is kept.
#[must_use]
pub fn rank(candidates: impl IntoIterator<Item = Suggestion>) -> Vec<Suggestion> {
    let mut seen_ids: HashSet<String> = HashSet::new();
    let mut seen_pairs: HashSet<VenueTitle> = HashSet::new();
    let mut ranked = Vec::new();

    for mut suggestion in candidates {
        if suggestion.open_state == OpenState::Closed {
            continue;
        }
        suggestion.confidence = Confidence::from(suggestion.open_state);

        let id = id_key(&suggestion);
        let pair = venue_title_key(&suggestion);
        let duplicate = id.as_ref().is_some_and(|id| seen_ids.contains(id))
            || pair.as_ref().is_some_and(|pair| seen_pairs.contains(pair));

        if let Some(id) = id {
            seen_ids.insert(id);
        }
        if let Some(pair) = pair {
            seen_pairs.insert(pair);
        }
        if !duplicate {
            ranked.push(suggestion);
        }
    }
    ranked
}
