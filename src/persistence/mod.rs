//! Persistence layer: events, event mappings, provider connections, and the
//! key-value table backing the suggestion cache.
//!
//! [`CalendarStore`] is the seam the sync engine talks to. Two
//! implementations exist: [`postgres::PostgresStore`] over `sqlx::PgPool`,
//! and [`memory::InMemoryStore`] used when persistence is disabled and in
//! tests. Both enforce the same invariants: one mapping per local event,
//! remote ids unique per user, and upserts by natural key.

pub mod memory;
pub mod models;
pub mod postgres;

use std::fmt::Debug;
use std::time::Duration;

use async_trait::async_trait;

use crate::domain::{
    CalendarConnection, Event, EventFields, EventId, EventMapping, NewEvent, SyncOutcome, UserId,
};
use crate::error::StoreError;

pub use memory::InMemoryStore;
pub use models::PushCandidate;
pub use postgres::PostgresStore;

/// Relational store used by the sync engine.
#[async_trait]
pub trait CalendarStore: Debug + Send + Sync {
    /// Loads the provider connection of `user_id`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on database failure.
    async fn get_connection(
        &self,
        user_id: UserId,
    ) -> Result<Option<CalendarConnection>, StoreError>;

    /// Inserts or replaces a connection, keyed by user.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on database failure.
    async fn upsert_connection(&self, connection: &CalendarConnection) -> Result<(), StoreError>;

    /// Records the outcome of a sync run on an existing connection.
    ///
    /// Returns `false` if the user has no connection.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on database failure.
    async fn record_sync_outcome(
        &self,
        user_id: UserId,
        outcome: &SyncOutcome,
    ) -> Result<bool, StoreError>;

    /// Lists every user with a connection.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on database failure.
    async fn connected_users(&self) -> Result<Vec<UserId>, StoreError>;

    /// Inserts a new event.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on database failure.
    async fn insert_event(&self, event: NewEvent) -> Result<Event, StoreError>;

    /// Loads an event by id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on database failure.
    async fn get_event(&self, event_id: EventId) -> Result<Option<Event>, StoreError>;

    /// Overwrites the provider-owned fields of an event and bumps
    /// `updated_at`. Returns `None` if the event does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on database failure.
    async fn update_event_fields(
        &self,
        event_id: EventId,
        fields: EventFields,
    ) -> Result<Option<Event>, StoreError>;

    /// Deletes an event together with its mapping. Returns `false` if the
    /// event did not exist.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on database failure.
    async fn delete_event(&self, event_id: EventId) -> Result<bool, StoreError>;

    /// Loads the mapping of a local event.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on database failure.
    async fn get_mapping(&self, event_id: EventId) -> Result<Option<EventMapping>, StoreError>;

    /// Loads the mapping of a remote event.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on database failure.
    async fn find_mapping_by_remote(
        &self,
        user_id: UserId,
        google_event_id: &str,
    ) -> Result<Option<EventMapping>, StoreError>;

    /// Inserts or replaces the mapping of `mapping.koda_event_id`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Conflict`] if the remote id is already mapped to
    /// another local event of the same user, and [`StoreError::Database`] on
    /// database failure.
    async fn upsert_mapping(&self, mapping: &EventMapping) -> Result<(), StoreError>;

    /// Atomically creates an event imported by a pull and its mapping.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on database failure.
    async fn create_pulled_event(
        &self,
        event: NewEvent,
        google_event_id: &str,
        google_etag: &str,
    ) -> Result<Event, StoreError>;

    /// Atomically applies a remote change: overwrites the event fields,
    /// stores the new change token, and advances `last_pushed_at` to the new
    /// `updated_at` so the change is not pushed back.
    ///
    /// Returns `None` if the mapped event no longer exists.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on database failure.
    async fn apply_remote_change(
        &self,
        mapping: &EventMapping,
        fields: EventFields,
        google_etag: &str,
    ) -> Result<Option<Event>, StoreError>;

    /// Lists locally authored events of `user_id` that opted into sync,
    /// joined with their mapping.
    ///
    /// Only `source = KODA` rows are selected; pulled events never appear.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on database failure.
    async fn push_candidates(&self, user_id: UserId) -> Result<Vec<PushCandidate>, StoreError>;
}

/// String key-value store with per-entry expiry.
#[async_trait]
pub trait KeyValueStore: Debug + Send + Sync {
    /// Returns the value of `key` unless it is missing or expired.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on database failure.
    async fn get_value(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Stores `value` under `key` for `ttl`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on database failure.
    async fn put_value(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError>;

    /// Removes expired entries and returns how many were removed.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on database failure.
    async fn purge_expired(&self) -> Result<u64, StoreError>;
}
