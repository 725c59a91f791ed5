//! Calendar handlers: connection setup, sync trigger, status, and event
//! deletion.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};

use crate::api::dto::{ConnectionRequest, ConnectionStatusResponse};
use crate::app_state::AppState;
use crate::domain::{EventId, SyncReport, UserId};
use crate::error::{ApiError, ErrorResponse};

/// `PUT /users/{user_id}/calendar/connection`: Create or update the
/// calendar connection.
///
/// # Errors
///
/// Returns [`ApiError::InvalidRequest`] for invalid settings.
#[utoipa::path(
    put,
    path = "/api/v1/users/{user_id}/calendar/connection",
    tag = "Calendar",
    summary = "Configure calendar connection",
    description = "Stores the provider token and sync settings. Omitted settings keep their current value; the last sync status is preserved.",
    params(("user_id" = String, Path, description = "User identifier (UUID)")),
    request_body = ConnectionRequest,
    responses(
        (status = 200, description = "Connection stored", body = ConnectionStatusResponse),
        (status = 400, description = "Invalid settings", body = ErrorResponse),
    )
)]
pub async fn put_connection(
    State(state): State<AppState>,
    Path(user_id): Path<UserId>,
    Json(req): Json<ConnectionRequest>,
) -> Result<Json<ConnectionStatusResponse>, ApiError> {
    let connection = state
        .sync_service
        .configure_connection(user_id, req.into())
        .await?;
    Ok(Json(connection.into()))
}

/// `GET /users/{user_id}/calendar/status`: Connection and last sync
/// status.
///
/// # Errors
///
/// Returns [`ApiError::NotConnected`] if the user has no connection.
#[utoipa::path(
    get,
    path = "/api/v1/users/{user_id}/calendar/status",
    tag = "Calendar",
    summary = "Get sync status",
    description = "Returns the connection settings together with the outcome of the last sync run.",
    params(("user_id" = String, Path, description = "User identifier (UUID)")),
    responses(
        (status = 200, description = "Connection status", body = ConnectionStatusResponse),
        (status = 404, description = "User has no connection", body = ErrorResponse),
    )
)]
pub async fn get_status(
    State(state): State<AppState>,
    Path(user_id): Path<UserId>,
) -> Result<Json<ConnectionStatusResponse>, ApiError> {
    let connection = state.sync_service.connection_status(user_id).await?;
    Ok(Json(connection.into()))
}

/// `POST /users/{user_id}/calendar/sync`: Run a pull and a push now.
///
/// # Errors
///
/// Returns [`ApiError`] if the run fails outright (listing failure, store
/// failure). Per-event failures are reported in the counts.
#[utoipa::path(
    post,
    path = "/api/v1/users/{user_id}/calendar/sync",
    tag = "Calendar",
    summary = "Trigger a sync",
    description = "Pulls remote changes and pushes local ones. Concurrent triggers for the same user run one after the other. A user without a connection gets all-zero counts.",
    params(("user_id" = String, Path, description = "User identifier (UUID)")),
    responses(
        (status = 200, description = "Sync report", body = SyncReport),
        (status = 502, description = "Provider failure", body = ErrorResponse),
        (status = 504, description = "Provider timeout", body = ErrorResponse),
    )
)]
pub async fn trigger_sync(
    State(state): State<AppState>,
    Path(user_id): Path<UserId>,
) -> Result<Json<SyncReport>, ApiError> {
    let report = state.sync_service.sync_all(user_id).await?;
    Ok(Json(report))
}

/// `DELETE /users/{user_id}/events/{event_id}`: Delete an event and its
/// remote copy.
///
/// # Errors
///
/// Returns [`ApiError::EventNotFound`] if the user owns no such event and
/// [`ApiError::Upstream`] if the remote delete fails.
#[utoipa::path(
    delete,
    path = "/api/v1/users/{user_id}/events/{event_id}",
    tag = "Calendar",
    summary = "Delete an event",
    description = "Deletes the remote copy of a synced event, then the local event and its mapping.",
    params(
        ("user_id" = String, Path, description = "User identifier (UUID)"),
        ("event_id" = String, Path, description = "Event identifier (UUID)"),
    ),
    responses(
        (status = 204, description = "Event deleted"),
        (status = 404, description = "Event not found", body = ErrorResponse),
        (status = 502, description = "Provider failure", body = ErrorResponse),
    )
)]
pub async fn delete_event(
    State(state): State<AppState>,
    Path((user_id, event_id)): Path<(UserId, EventId)>,
) -> Result<StatusCode, ApiError> {
    state.sync_service.delete_event(user_id, event_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Calendar routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route(
            "/users/{user_id}/calendar/connection",
            put(put_connection),
        )
        .route("/users/{user_id}/calendar/status", get(get_status))
        .route("/users/{user_id}/calendar/sync", post(trigger_sync))
        .route("/users/{user_id}/events/{event_id}", delete(delete_event))
}
