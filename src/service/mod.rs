//! Service layer: business logic orchestration.
//!
//! [`SyncService`] reconciles local events with the calendar provider.
//! [`SuggestionService`] fans queries out to the suggestion sources and
//! hands the candidates to the pure [`ranking`] pipeline.

pub mod ranking;
pub mod suggestion_service;
pub mod sync_service;

pub use suggestion_service::SuggestionService;
pub use sync_service::SyncService;
