//! Bidirectional calendar sync engine.
//!
//! A run is a pull (remote → local) followed by a push (local → remote).
//! Two guards keep the directions from echoing each other:
//!
//! - pull skips remote events whose change token equals the one stored on
//!   the mapping, and after applying a remote change it advances the
//!   mapping's `last_pushed_at` to the event's new `updated_at`;
//! - push skips local events with `updated_at <= last_pushed_at`, and stores
//!   the change token returned by the provider after every write.
//!
//! Local events are inserted under a remote id derived from their own id
//! (see [`convert::remote_id_for`]). An insert whose response was lost is
//! therefore harmless: a retried insert hits `409 Conflict` and turns into
//! an update, and a pull that meets the copy first links it to the local
//! event instead of importing it.
//!
//! Per-event failures are counted and skipped. Store failures abort the
//! operation.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use crate::domain::{
    CalendarConnection, ConnectionSettings, EventId, EventMapping, EventSource, NewEvent,
    PullReport, PushReport, RemoteEvent, SyncOutcome, SyncReport, UserId, UserLocks,
};
use crate::error::{ProviderError, SyncError};
use crate::persistence::{CalendarStore, PushCandidate};
use crate::provider::{CalendarProvider, convert};

/// What reconciling one remote event did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PullAction {
    Created,
    Updated,
    Deleted,
    Unchanged,
}

/// What pushing one local event did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PushAction {
    Inserted,
    Updated,
    Unchanged,
}

/// Per-event failure bookkeeping shared by pull and push.
#[derive(Debug, Default)]
struct Failures {
    failed: u32,
    timed_out: u32,
    last_error: Option<String>,
}

impl Failures {
    /// Counts a per-event error, or hands a store error back to abort.
    fn absorb(&mut self, error: SyncError) -> Result<(), SyncError> {
        match error {
            SyncError::Store(_) => return Err(error),
            SyncError::Timeout { .. } => self.timed_out = self.timed_out.saturating_add(1),
            _ => self.failed = self.failed.saturating_add(1),
        }
        self.last_error = Some(error.to_string());
        Ok(())
    }
}

/// Sync engine over a [`CalendarStore`] and a [`CalendarProvider`].
///
/// Cheap to clone; every clone shares the same lock registry, so runs for
/// one user serialize across all handles.
#[derive(Debug, Clone)]
pub struct SyncService {
    store: Arc<dyn CalendarStore>,
    provider: Arc<dyn CalendarProvider>,
    locks: Arc<UserLocks>,
    call_timeout: Duration,
}

impl SyncService {
    /// Creates a sync engine bounding each provider call by `call_timeout`.
    #[must_use]
    pub fn new(
        store: Arc<dyn CalendarStore>,
        provider: Arc<dyn CalendarProvider>,
        call_timeout: Duration,
    ) -> Self {
        Self {
            store,
            provider,
            locks: Arc::new(UserLocks::new()),
            call_timeout,
        }
    }

    /// Returns the underlying store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn CalendarStore> {
        &self.store
    }

    /// Imports remote changes for `user_id`.
    ///
    /// Returns zero counts when the user has no connection.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError`] if the remote listing fails or times out, or if
    /// the store fails.
    pub async fn pull(&self, user_id: UserId) -> Result<PullReport, SyncError> {
        let _guard = self.locks.acquire(user_id).await;
        let Some(connection) = self.connection_or_warn(user_id, "pull").await? else {
            return Ok(PullReport::default());
        };
        let mut failures = Failures::default();
        self.pull_with(&connection, &mut failures).await
    }

    /// Exports local changes for `user_id`.
    ///
    /// Returns zero counts when the user has no connection or push is
    /// disabled on it.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Store`] if the store fails.
    pub async fn push(&self, user_id: UserId) -> Result<PushReport, SyncError> {
        let _guard = self.locks.acquire(user_id).await;
        let Some(connection) = self.connection_or_warn(user_id, "push").await? else {
            return Ok(PushReport::default());
        };
        let mut failures = Failures::default();
        self.push_with(&connection, &mut failures).await
    }

    /// Runs a pull and then a push for `user_id` and records the outcome on
    /// the connection.
    ///
    /// Concurrent calls for the same user are serialized.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError`] if either phase fails outright; the failure is
    /// recorded on the connection first.
    #[tracing::instrument(skip_all, fields(%user_id))]
    pub async fn sync_all(&self, user_id: UserId) -> Result<SyncReport, SyncError> {
        let _guard = self.locks.acquire(user_id).await;
        let Some(connection) = self.connection_or_warn(user_id, "sync").await? else {
            return Ok(SyncReport::default());
        };

        let mut failures = Failures::default();
        let result = self.run_both(&connection, &mut failures).await;
        let outcome = match &result {
            Ok(report) => SyncOutcome {
                at: Utc::now(),
                error_count: report.error_count(),
                last_error: failures.last_error,
            },
            Err(e) => SyncOutcome {
                at: Utc::now(),
                error_count: failures.failed.saturating_add(failures.timed_out).max(1),
                last_error: Some(e.to_string()),
            },
        };

        match (result, self.store.record_sync_outcome(user_id, &outcome).await) {
            (Ok(report), Ok(_)) => {
                tracing::info!(
                    pulled = report.pulled,
                    updated = report.updated,
                    deleted = report.deleted,
                    pushed = report.pushed,
                    failed = report.failed,
                    timed_out = report.timed_out,
                    "sync finished"
                );
                Ok(report)
            }
            (Ok(_), Err(e)) => Err(e.into()),
            (Err(e), record) => {
                if let Err(record_err) = record {
                    tracing::error!(error = %record_err, "failed to record sync failure");
                }
                tracing::warn!(error = %e, "sync failed");
                Err(e)
            }
        }
    }

    /// Deletes an event owned by `user_id`, removing its remote copy first.
    ///
    /// The copy is found through the mapping or, for a push candidate that
    /// was never mapped, under its derived remote id.
    /// A remote copy that is already gone counts as deleted. Without a
    /// connection only the local event is removed.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::EventNotFound`] if the user owns no such event,
    /// the provider error if the remote delete fails (the local event is kept
    /// so the call can be retried), and [`SyncError::Store`] on store failure.
    #[tracing::instrument(skip_all, fields(%user_id, %event_id))]
    pub async fn delete_event(&self, user_id: UserId, event_id: EventId) -> Result<(), SyncError> {
        let _guard = self.locks.acquire(user_id).await;
        let Some(event) = self
            .store
            .get_event(event_id)
            .await?
            .filter(|event| event.owner_id == user_id)
        else {
            return Err(SyncError::EventNotFound(event_id));
        };

        let mapping = self.store.get_mapping(event_id).await?;
        let connection = self.store.get_connection(user_id).await?;
        match (mapping, connection) {
            (Some(mapping), Some(connection)) => {
                self.delete_remote_copy(&connection, &mapping.google_event_id)
                    .await?;
            }
            (Some(mapping), None) => tracing::warn!(
                remote_id = %mapping.google_event_id,
                "no connection, remote copy left in place"
            ),
            // An insert whose response never arrived may have left a copy.
            (None, Some(connection)) if event.is_push_candidate() => {
                self.delete_remote_copy(&connection, &convert::remote_id_for(event_id))
                    .await?;
            }
            (None, _) => {}
        }

        self.store.delete_event(event_id).await?;
        tracing::info!("event deleted");
        Ok(())
    }

    async fn delete_remote_copy(
        &self,
        connection: &CalendarConnection,
        remote_id: &str,
    ) -> Result<(), SyncError> {
        let deleted = self
            .bounded(
                "delete_event",
                self.provider.delete_event(connection, remote_id),
            )
            .await;
        match deleted {
            Err(SyncError::Provider(e)) if e.is_gone() => {
                tracing::debug!(%remote_id, "remote copy already gone");
                Ok(())
            }
            other => other,
        }
    }

    /// Creates or updates the connection of `user_id`.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Validation`] for invalid settings and
    /// [`SyncError::Store`] on store failure.
    pub async fn configure_connection(
        &self,
        user_id: UserId,
        settings: ConnectionSettings,
    ) -> Result<CalendarConnection, SyncError> {
        let _guard = self.locks.acquire(user_id).await;
        let existing = self.store.get_connection(user_id).await?;
        let connection = settings.apply(user_id, existing)?;
        self.store.upsert_connection(&connection).await?;
        tracing::info!(%user_id, calendar_id = %connection.calendar_id, "connection configured");
        Ok(connection)
    }

    /// Returns the connection of `user_id`, including its last sync status.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::NotConnected`] if there is none and
    /// [`SyncError::Store`] on store failure.
    pub async fn connection_status(&self, user_id: UserId) -> Result<CalendarConnection, SyncError> {
        self.store
            .get_connection(user_id)
            .await?
            .ok_or(SyncError::NotConnected(user_id))
    }

    async fn connection_or_warn(
        &self,
        user_id: UserId,
        operation: &'static str,
    ) -> Result<Option<CalendarConnection>, SyncError> {
        let connection = self.store.get_connection(user_id).await?;
        if connection.is_none() {
            tracing::warn!(
                %user_id,
                operation,
                error = %SyncError::NotConnected(user_id),
                "skipping"
            );
        }
        Ok(connection)
    }

    async fn run_both(
        &self,
        connection: &CalendarConnection,
        failures: &mut Failures,
    ) -> Result<SyncReport, SyncError> {
        let pull = self.pull_with(connection, failures).await?;
        let push = self.push_with(connection, failures).await?;
        Ok(SyncReport::merge(pull, push))
    }

    async fn pull_with(
        &self,
        connection: &CalendarConnection,
        failures: &mut Failures,
    ) -> Result<PullReport, SyncError> {
        let user_id = connection.user_id;
        let window = connection.pull_window(Utc::now());
        let remote_events = self
            .bounded("list_events", self.provider.list_events(connection, &window))
            .await?;

        let mut report = PullReport::default();
        let (failed_before, timed_out_before) = (failures.failed, failures.timed_out);
        for remote in &remote_events {
            match self.reconcile_remote(user_id, remote).await {
                Ok(PullAction::Created) => report.pulled = report.pulled.saturating_add(1),
                Ok(PullAction::Updated) => report.updated = report.updated.saturating_add(1),
                Ok(PullAction::Deleted) => report.deleted = report.deleted.saturating_add(1),
                Ok(PullAction::Unchanged) => {}
                Err(e) => {
                    tracing::warn!(%user_id, remote_id = %remote.id, error = %e, "remote event skipped");
                    failures.absorb(e)?;
                }
            }
        }
        report.failed = failures.failed.saturating_sub(failed_before);
        report.timed_out = failures.timed_out.saturating_sub(timed_out_before);

        tracing::debug!(
            %user_id,
            listed = remote_events.len(),
            pulled = report.pulled,
            updated = report.updated,
            deleted = report.deleted,
            "pull finished"
        );
        Ok(report)
    }

    async fn reconcile_remote(
        &self,
        user_id: UserId,
        remote: &RemoteEvent,
    ) -> Result<PullAction, SyncError> {
        let mapping = self.store.find_mapping_by_remote(user_id, &remote.id).await?;

        if remote.is_cancelled() {
            let Some(mapping) = mapping else {
                return Ok(PullAction::Unchanged);
            };
            let removed = self.store.delete_event(mapping.koda_event_id).await?;
            return Ok(if removed {
                PullAction::Deleted
            } else {
                PullAction::Unchanged
            });
        }

        match mapping {
            None if self.link_own_copy(user_id, remote).await? => Ok(PullAction::Unchanged),
            None => {
                let fields = remote.to_fields()?;
                let event = NewEvent::pulled(user_id, remote.id.clone(), fields);
                self.store
                    .create_pulled_event(event, &remote.id, &remote.etag)
                    .await?;
                Ok(PullAction::Created)
            }
            Some(mapping) if !mapping.remote_changed(&remote.etag) => Ok(PullAction::Unchanged),
            Some(mapping) => {
                let fields = remote.to_fields()?;
                let applied = self
                    .store
                    .apply_remote_change(&mapping, fields, &remote.etag)
                    .await?;
                Ok(if applied.is_some() {
                    PullAction::Updated
                } else {
                    PullAction::Unchanged
                })
            }
        }
    }

    /// Links `remote` to the local event it was inserted from, if it is an
    /// unmapped copy of one of the user's own events.
    async fn link_own_copy(
        &self,
        user_id: UserId,
        remote: &RemoteEvent,
    ) -> Result<bool, SyncError> {
        let Some(event_id) = convert::local_id_from_remote(&remote.id) else {
            return Ok(false);
        };
        let Some(event) = self.store.get_event(event_id).await? else {
            return Ok(false);
        };
        if event.owner_id != user_id || event.source != EventSource::Koda {
            return Ok(false);
        }
        if self.store.get_mapping(event_id).await?.is_some() {
            return Ok(false);
        }

        self.store
            .upsert_mapping(&EventMapping {
                user_id,
                koda_event_id: event_id,
                google_event_id: remote.id.clone(),
                google_etag: remote.etag.clone(),
                last_pushed_at: remote.updated.unwrap_or(event.updated_at),
            })
            .await?;
        tracing::info!(
            %user_id,
            %event_id,
            remote_id = %remote.id,
            "linked unmapped remote copy"
        );
        Ok(true)
    }

    async fn push_with(
        &self,
        connection: &CalendarConnection,
        failures: &mut Failures,
    ) -> Result<PushReport, SyncError> {
        let user_id = connection.user_id;
        if !connection.push_enabled {
            tracing::debug!(%user_id, "push disabled");
            return Ok(PushReport::default());
        }

        let candidates = self.store.push_candidates(user_id).await?;
        let mut report = PushReport::default();
        let (failed_before, timed_out_before) = (failures.failed, failures.timed_out);
        for candidate in candidates {
            debug_assert!(candidate.event.is_push_candidate());
            let event_id = candidate.event.id;
            match self.push_candidate(connection, candidate).await {
                Ok(PushAction::Inserted) => report.pushed = report.pushed.saturating_add(1),
                Ok(PushAction::Updated) => report.updated = report.updated.saturating_add(1),
                Ok(PushAction::Unchanged) => {}
                Err(e) => {
                    tracing::warn!(%user_id, %event_id, error = %e, "local event not pushed");
                    failures.absorb(e)?;
                }
            }
        }
        report.failed = failures.failed.saturating_sub(failed_before);
        report.timed_out = failures.timed_out.saturating_sub(timed_out_before);

        tracing::debug!(
            %user_id,
            pushed = report.pushed,
            updated = report.updated,
            "push finished"
        );
        Ok(report)
    }

    async fn push_candidate(
        &self,
        connection: &CalendarConnection,
        candidate: PushCandidate,
    ) -> Result<PushAction, SyncError> {
        let PushCandidate { event, mapping } = candidate;
        let body = convert::to_remote_body(&event);

        match mapping {
            None => {
                let remote_id = convert::remote_id_for(event.id);
                let inserted = self
                    .bounded(
                        "insert_event",
                        self.provider.insert_event(connection, &remote_id, &body),
                    )
                    .await;
                let created = match inserted {
                    Err(SyncError::Provider(e)) if e.is_conflict() => {
                        tracing::info!(
                            event_id = %event.id,
                            %remote_id,
                            "remote copy exists, updating it"
                        );
                        self.bounded(
                            "update_event",
                            self.provider.update_event(connection, &remote_id, &body),
                        )
                        .await?
                    }
                    other => other?,
                };
                self.store
                    .upsert_mapping(&EventMapping {
                        user_id: connection.user_id,
                        koda_event_id: event.id,
                        google_event_id: created.id,
                        google_etag: created.etag,
                        last_pushed_at: Utc::now(),
                    })
                    .await?;
                Ok(PushAction::Inserted)
            }
            Some(mapping) if !mapping.local_changed(event.updated_at) => Ok(PushAction::Unchanged),
            Some(mapping) => {
                let updated = self
                    .bounded(
                        "update_event",
                        self.provider
                            .update_event(connection, &mapping.google_event_id, &body),
                    )
                    .await?;
                self.store
                    .upsert_mapping(&EventMapping {
                        google_etag: updated.etag,
                        last_pushed_at: Utc::now(),
                        ..mapping
                    })
                    .await?;
                Ok(PushAction::Updated)
            }
        }
    }

    /// Runs a provider call under the configured timeout.
    async fn bounded<T, F>(&self, operation: &'static str, call: F) -> Result<T, SyncError>
    where
        F: Future<Output = Result<T, ProviderError>>,
    {
        match tokio::time::timeout(self.call_timeout, call).await {
            Ok(result) => result.map_err(SyncError::from),
            Err(_) => Err(SyncError::Timeout {
                operation,
                after: self.call_timeout,
            }),
        }
    }
}
