//! Data Transfer Objects for REST request/response serialization.
//!
//! Domain types that already derive `Serialize` and `ToSchema`
//! ([`crate::domain::Suggestion`], [`crate::domain::SyncReport`]) are
//! returned as-is.

pub mod calendar_dto;
pub mod suggestion_dto;

pub use calendar_dto::*;
pub use suggestion_dto::*;
