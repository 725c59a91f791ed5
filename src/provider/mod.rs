//! External calendar provider client.
//!
//! [`CalendarProvider`] is the contract the sync engine depends on;
//! [`google::GoogleCalendarClient`] implements it over the Google Calendar
//! v3 REST API. [`convert`] holds the pure local-event → provider-body
//! transform used by push, and the id mapping that makes inserts repeatable.

pub mod convert;
pub mod google;

use std::fmt::Debug;

use async_trait::async_trait;

use crate::domain::{CalendarConnection, RemoteEvent, RemoteEventBody, SyncWindow};
use crate::error::ProviderError;

pub use google::GoogleCalendarClient;

/// Remote calendar operations used by pull and push.
///
/// Every returned [`RemoteEvent`] carries the provider's current change
/// token, which callers store and compare for equality only.
#[async_trait]
pub trait CalendarProvider: Debug + Send + Sync {
    /// Lists the events of the connection's calendar that overlap `window`,
    /// including cancelled ones.
    ///
    /// # Errors
    ///
    /// Returns a [`ProviderError`] if any page of the listing fails.
    async fn list_events(
        &self,
        connection: &CalendarConnection,
        window: &SyncWindow,
    ) -> Result<Vec<RemoteEvent>, ProviderError>;

    /// Creates a remote event under the caller-chosen `remote_id` and
    /// returns it with its change token.
    ///
    /// Repeating an insert with the same id must not create a second event.
    ///
    /// # Errors
    ///
    /// Returns a [`ProviderError`] if the provider rejects the insert. An id
    /// that already exists is reported as a status for which
    /// [`ProviderError::is_conflict`] holds.
    async fn insert_event(
        &self,
        connection: &CalendarConnection,
        remote_id: &str,
        body: &RemoteEventBody,
    ) -> Result<RemoteEvent, ProviderError>;

    /// Updates a remote event and returns it with its new change token.
    ///
    /// # Errors
    ///
    /// Returns a [`ProviderError`] if the provider rejects the update.
    async fn update_event(
        &self,
        connection: &CalendarConnection,
        remote_id: &str,
        body: &RemoteEventBody,
    ) -> Result<RemoteEvent, ProviderError>;

    /// Deletes a remote event.
    ///
    /// # Errors
    ///
    /// Returns a [`ProviderError`]; a missing event is reported as a status
    /// for which [`ProviderError::is_gone`] holds.
    async fn delete_event(
        &self,
        connection: &CalendarConnection,
        remote_id: &str,
    ) -> Result<(), ProviderError>;
}
