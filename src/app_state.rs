//! Shared application state injected into all Axum handlers.

use std::sync::Arc;

use crate::service::{SuggestionService, SyncService};

/// Shared application state available to all handlers via Axum's
/// `State` extractor.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Calendar sync engine.
    pub sync_service: Arc<SyncService>,
    /// Suggestion pipeline.
    pub suggestion_service: Arc<SuggestionService>,
    /// Name of the active store (`postgres` or `memory`), reported by
    /// `/health`.
    pub persistence: &'static str,
}
