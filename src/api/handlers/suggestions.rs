//! Suggestion handler.

use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;

use crate::api::dto::SuggestionParams;
use crate::app_state::AppState;
use crate::domain::Suggestion;
use crate::error::{ApiError, ErrorResponse};

/// `GET /suggestions`: Ranked things to do for a city and time slot.
///
/// # Errors
///
/// Returns [`ApiError::InvalidRequest`] on missing or inconsistent
/// parameters. Source failures are not errors; they shrink the result.
#[utoipa::path(
    get,
    path = "/api/v1/suggestions",
    tag = "Suggestions",
    summary = "Suggest things to do",
    description = "Queries the ticketed-events and places sources concurrently, drops closed candidates, and removes duplicates. Ticketed events come first.",
    params(SuggestionParams),
    responses(
        (status = 200, description = "Ranked suggestions", body = Vec<Suggestion>),
        (status = 400, description = "Invalid query", body = ErrorResponse),
    )
)]
pub async fn list_suggestions(
    State(state): State<AppState>,
    Query(params): Query<SuggestionParams>,
) -> Result<Json<Vec<Suggestion>>, ApiError> {
    let query = params.into_query(Utc::now())?;
    Ok(Json(state.suggestion_service.suggest(&query).await))
}

/// Suggestion routes.
pub fn routes() -> Router<AppState> {
    Router::new().route("/suggestions", get(list_suggestions))
}
