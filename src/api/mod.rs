//! REST API layer: route handlers, DTOs, OpenAPI document, and router
//! composition.
//!
//! Resource endpoints are mounted under `/api/v1`; `/health` and the
//! OpenAPI document live at the root.

pub mod dto;
pub mod handlers;

use axum::Router;
use utoipa::OpenApi;

use crate::app_state::AppState;

/// Path of the generated OpenAPI document.
pub const OPENAPI_PATH: &str = "/api-docs/openapi.json";

/// OpenAPI description of every REST endpoint.
#[derive(Debug, OpenApi)]
#[openapi(
    info(title = "koda-gateway", description = "Calendar sync and suggestion API"),
    paths(
        handlers::suggestions::list_suggestions,
        handlers::calendar::put_connection,
        handlers::calendar::get_status,
        handlers::calendar::trigger_sync,
        handlers::calendar::delete_event,
        handlers::system::health_handler,
    ),
    components(schemas(
        crate::domain::Suggestion,
        crate::domain::SuggestionSource,
        crate::domain::OpenState,
        crate::domain::Confidence,
        crate::domain::SyncReport,
        dto::ConnectionRequest,
        dto::ConnectionStatusResponse,
        dto::SyncHealth,
        crate::error::ErrorResponse,
        crate::error::ErrorBody,
    )),
    tags(
        (name = "Suggestions", description = "Things to do near a city"),
        (name = "Calendar", description = "Calendar connection and sync"),
        (name = "System", description = "Service status"),
    )
)]
pub struct ApiDoc;

/// Builds the complete API router with all REST endpoints.
pub fn build_router() -> Router<AppState> {
    Router::new()
        .nest("/api/v1", handlers::routes())
        .merge(handlers::system::routes())
        .merge(docs_router())
}

#[cfg(feature = "swagger-ui")]
fn docs_router() -> Router<AppState> {
    Router::new().merge(
        utoipa_swagger_ui::SwaggerUi::new("/swagger-ui").url(OPENAPI_PATH, ApiDoc::openapi()),
    )
}

#[cfg(not(feature = "swagger-ui"))]
fn docs_router() -> Router<AppState> {
    use axum::Json;
    use axum::routing::get;

    Router::new().route(OPENAPI_PATH, get(|| async { Json(ApiDoc::openapi()) }))
}
