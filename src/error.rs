//! Error types for the store, the calendar provider, the suggestion sources,
//! the sync engine, and the HTTP layer.
//!
//! [`ApiError`] is the error type returned by handlers. Each variant maps to
//! a specific HTTP status code and a structured JSON error response. The
//! lower-level enums are converted into it at the handler boundary.

use std::time::Duration;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use utoipa::ToSchema;

use crate::domain::{EventId, UserId};

/// Structured JSON error response body.
///
/// All error responses follow this shape:
/// ```json
/// {
///   "error": {
///     "code": 1001,
///     "message": "invalid request: city is required",
///     "details": null
///   }
/// }
/// ```
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    /// Structured error payload.
    pub error: ErrorBody,
}

/// Inner error body with numeric code and human-readable message.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    /// Numeric error code (see [`ApiError`] for the ranges).
    pub code: u32,
    /// Human-readable error message.
    pub message: String,
    /// Optional additional details.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// A stored string did not name any variant of an enum column.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind}: {value:?}")]
pub struct UnknownVariant {
    /// Name of the enum being parsed.
    pub kind: &'static str,
    /// The rejected input.
    pub value: String,
}

/// Failure of the relational store.
///
/// Always a hard failure for the sync operation in progress: partially
/// applied database state is not reasoned about silently.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The database driver reported an error.
    #[error("database error: {0}")]
    Database(String),

    /// A row could not be converted into a domain value.
    #[error("corrupt row: {0}")]
    Corrupt(String),

    /// A uniqueness constraint rejected the write.
    #[error("conflict: {0}")]
    Conflict(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        if let sqlx::Error::Database(ref db) = e
            && db.is_unique_violation()
        {
            return Self::Conflict(db.message().to_string());
        }
        Self::Database(e.to_string())
    }
}

impl From<UnknownVariant> for StoreError {
    fn from(e: UnknownVariant) -> Self {
        Self::Corrupt(e.to_string())
    }
}

/// Failure of a single call to the external calendar provider.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// The request could not be sent or the response could not be read.
    #[error("provider request failed: {0}")]
    Http(String),

    /// The provider answered with a non-success status.
    #[error("provider returned {status}: {message}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body or provider error message.
        message: String,
    },

    /// The provider rejected the stored access token.
    #[error("provider rejected credentials")]
    Unauthorized,

    /// The response body did not have the expected shape.
    #[error("invalid provider response: {0}")]
    InvalidResponse(String),
}

impl ProviderError {
    /// Returns `true` if the provider reported the entity as missing
    /// (`404 Not Found` or `410 Gone`).
    #[must_use]
    pub const fn is_gone(&self) -> bool {
        matches!(self, Self::Status { status: 404 | 410, .. })
    }

    /// Returns `true` if the provider refused to create an entity because
    /// its id is taken (`409 Conflict`).
    #[must_use]
    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::Status { status: 409, .. })
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Self::InvalidResponse(e.to_string())
        } else {
            Self::Http(e.to_string())
        }
    }
}

/// Failure of a suggestion source fetch.
///
/// Never surfaces to clients: the ranking pipeline replaces a failed source
/// with an empty candidate set.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// The request could not be sent or the response could not be read.
    #[error("source request failed: {0}")]
    Http(String),

    /// The source answered with a non-success status.
    #[error("source returned {status}")]
    Status {
        /// HTTP status code.
        status: u16,
    },

    /// The response body did not have the expected shape.
    #[error("invalid source response: {0}")]
    InvalidResponse(String),

    /// The requested city could not be resolved to coordinates.
    #[error("unknown city: {0}")]
    UnknownCity(String),

    /// The fetch did not finish within the configured timeout.
    #[error("source timed out after {0:?}")]
    Timeout(Duration),
}

impl From<reqwest::Error> for SourceError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Self::InvalidResponse(e.to_string())
        } else {
            Self::Http(e.to_string())
        }
    }
}

/// Error taxonomy of the sync engine.
///
/// | Variant          | Scope      | Handling                              |
/// |------------------|------------|---------------------------------------|
/// | `NotConnected`   | operation  | zero-count no-op                      |
/// | `Validation`     | per event  | skipped, counted as failed            |
/// | `Provider`       | per event  | skipped, counted as failed            |
/// | `Timeout`        | per event  | skipped, counted as timed out         |
/// | `Store`          | operation  | propagated, aborts the operation      |
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// The user has no provider connection configured.
    #[error("no calendar connection for user {0}")]
    NotConnected(UserId),

    /// A remote event is missing required fields.
    #[error("invalid remote event: {0}")]
    Validation(String),

    /// A provider call failed.
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// A provider call did not finish within the configured timeout.
    #[error("{operation} timed out after {after:?}")]
    Timeout {
        /// Name of the provider operation.
        operation: &'static str,
        /// The timeout that elapsed.
        after: Duration,
    },

    /// The local store failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The event does not exist or belongs to another user.
    #[error("event not found: {0}")]
    EventNotFound(EventId),
}

/// Server-side error enum with HTTP status code mapping.
///
/// # Error Code Ranges
///
/// | Range     | Category        | HTTP Status                  |
/// |-----------|-----------------|------------------------------|
/// | 1000–1999 | Validation      | 400 Bad Request              |
/// | 2000–2999 | Not Found       | 404 Not Found                |
/// | 3000–3999 | Server          | 500 Internal Server Error    |
/// | 5000–5999 | Upstream        | 502 Bad Gateway / 504        |
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Request validation failed.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The user has no calendar connection.
    #[error("no calendar connection for user {0}")]
    NotConnected(UserId),

    /// The event was not found.
    #[error("event not found: {0}")]
    EventNotFound(EventId),

    /// The calendar provider failed.
    #[error("upstream error: {0}")]
    Upstream(String),

    /// The calendar provider did not answer in time.
    #[error("upstream timeout: {0}")]
    UpstreamTimeout(String),

    /// Persistence layer failure.
    #[error("persistence error: {0}")]
    Persistence(String),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    /// Returns the numeric error code for this variant.
    #[must_use]
    pub const fn error_code(&self) -> u32 {
        match self {
            Self::InvalidRequest(_) => 1001,
            Self::NotConnected(_) => 2001,
            Self::EventNotFound(_) => 2002,
            Self::Internal(_) => 3000,
            Self::Persistence(_) => 3001,
            Self::Upstream(_) => 5001,
            Self::UpstreamTimeout(_) => 5002,
        }
    }

    /// Returns the HTTP status code for this variant.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotConnected(_) | Self::EventNotFound(_) => StatusCode::NOT_FOUND,
            Self::Persistence(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Upstream(_) => StatusCode::BAD_GATEWAY,
            Self::UpstreamTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        Self::Persistence(e.to_string())
    }
}

impl From<SyncError> for ApiError {
    fn from(e: SyncError) -> Self {
        match e {
            SyncError::NotConnected(user_id) => Self::NotConnected(user_id),
            SyncError::EventNotFound(event_id) => Self::EventNotFound(event_id),
            SyncError::Validation(msg) => Self::InvalidRequest(msg),
            SyncError::Provider(err) => Self::Upstream(err.to_string()),
            err @ SyncError::Timeout { .. } => Self::UpstreamTimeout(err.to_string()),
            SyncError::Store(err) => Self::Persistence(err.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(code = self.error_code(), error = %self, "request failed");
        }
        let body = ErrorResponse {
            error: ErrorBody {
                code: self.error_code(),
                message: self.to_string(),
                details: None,
            },
        };
        let mut response = axum::Json(body).into_response();
        *response.status_mut() = status;
        response
    }
}
