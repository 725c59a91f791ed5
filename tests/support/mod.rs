//! Shared fixtures for integration tests: a scripted calendar provider and
//! helpers to wire the sync engine over the in-memory store.

#![allow(dead_code, clippy::panic)]

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use koda_gateway::domain::{
    CalendarConnection, RemoteEvent, RemoteEventBody, RemoteStatus, RemoteTime, SyncWindow, UserId,
};
use koda_gateway::error::ProviderError;
use koda_gateway::persistence::{CalendarStore, InMemoryStore};
use koda_gateway::provider::CalendarProvider;
use koda_gateway::service::SyncService;

/// Number of calls per provider operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Calls {
    pub list: u32,
    pub insert: u32,
    pub update: u32,
    pub delete: u32,
}

impl Calls {
    pub const fn writes(&self) -> u32 {
        self.insert + self.update + self.delete
    }
}

#[derive(Debug, Default)]
struct FakeState {
    events: BTreeMap<String, RemoteEvent>,
    counter: u64,
    calls: Calls,
    fail_listing: bool,
    fail_writes: bool,
    write_delay: Option<Duration>,
    insert_stall: Option<Duration>,
}

impl FakeState {
    fn next(&mut self) -> u64 {
        self.counter += 1;
        self.counter
    }
}

/// In-process calendar provider. Every mutation assigns a fresh etag.
#[derive(Debug, Default)]
pub struct FakeProvider {
    state: Mutex<FakeState>,
}

impl FakeProvider {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Creates an event directly on the remote side.
    pub fn seed(&self, summary: &str, start: RemoteTime, end: RemoteTime) -> RemoteEvent {
        let mut state = self.state();
        let n = state.next();
        let event = RemoteEvent {
            id: format!("remote-{n}"),
            etag: format!("\"{n}\""),
            summary: summary.to_string(),
            description: None,
            location: None,
            start: Some(start),
            end: Some(end),
            status: RemoteStatus::Confirmed,
            updated: Some(Utc::now()),
        };
        state.events.insert(event.id.clone(), event.clone());
        event
    }

    /// Stores an arbitrary remote event as-is.
    pub fn put_raw(&self, event: RemoteEvent) {
        self.state().events.insert(event.id.clone(), event);
    }

    /// Renames a remote event, moving its etag.
    pub fn edit(&self, id: &str, summary: &str) {
        let mut state = self.state();
        let n = state.next();
        let Some(event) = state.events.get_mut(id) else {
            panic!("no remote event {id}");
        };
        event.summary = summary.to_string();
        event.etag = format!("\"{n}\"");
    }

    /// Cancels a remote event, moving its etag.
    pub fn cancel(&self, id: &str) {
        let mut state = self.state();
        let n = state.next();
        let Some(event) = state.events.get_mut(id) else {
            panic!("no remote event {id}");
        };
        event.status = RemoteStatus::Cancelled;
        event.etag = format!("\"{n}\"");
    }

    pub fn remote(&self, id: &str) -> Option<RemoteEvent> {
        self.state().events.get(id).cloned()
    }

    pub fn remote_count(&self) -> usize {
        self.state().events.len()
    }

    pub fn calls(&self) -> Calls {
        self.state().calls
    }

    pub fn fail_listing(&self, fail: bool) {
        self.state().fail_listing = fail;
    }

    pub fn fail_writes(&self, fail: bool) {
        self.state().fail_writes = fail;
    }

    pub fn delay_writes(&self, delay: Duration) {
        self.state().write_delay = Some(delay);
    }

    /// Makes inserts hang for `stall` after the event is stored, so the
    /// caller can give up on a write that did happen.
    pub fn stall_inserts_after_commit(&self, stall: Duration) {
        self.state().insert_stall = Some(stall);
    }

    /// Bumps the write counter and returns the configured delay and failure.
    fn begin_write(&self, bump: impl FnOnce(&mut Calls)) -> (Option<Duration>, bool) {
        let mut state = self.state();
        bump(&mut state.calls);
        (state.write_delay, state.fail_writes)
    }

    fn write_body(&self, id: String, body: &RemoteEventBody) -> RemoteEvent {
        let mut state = self.state();
        let n = state.next();
        let event = RemoteEvent {
            id,
            etag: format!("\"{n}\""),
            summary: body.summary.clone(),
            description: body.description.clone(),
            location: body.location.clone(),
            start: Some(body.start.clone()),
            end: Some(body.end.clone()),
            status: RemoteStatus::Confirmed,
            updated: Some(Utc::now()),
        };
        state.events.insert(event.id.clone(), event.clone());
        event
    }
}

async fn pause(delay: Option<Duration>) {
    if let Some(delay) = delay {
        tokio::time::sleep(delay).await;
    }
}

fn unavailable() -> ProviderError {
    ProviderError::Status {
        status: 503,
        message: "backend unavailable".into(),
    }
}

#[async_trait]
impl CalendarProvider for FakeProvider {
    async fn list_events(
        &self,
        _connection: &CalendarConnection,
        window: &SyncWindow,
    ) -> Result<Vec<RemoteEvent>, ProviderError> {
        let mut state = self.state();
        state.calls.list += 1;
        if state.fail_listing {
            return Err(unavailable());
        }
        Ok(state
            .events
            .values()
            .filter(|e| match (&e.start, &e.end) {
                (Some(start), Some(end)) => window.overlaps(start.instant(), end.instant()),
                _ => true,
            })
            .cloned()
            .collect())
    }

    async fn insert_event(
        &self,
        _connection: &CalendarConnection,
        remote_id: &str,
        body: &RemoteEventBody,
    ) -> Result<RemoteEvent, ProviderError> {
        let (delay, fail) = self.begin_write(|c| c.insert += 1);
        pause(delay).await;
        if fail {
            return Err(unavailable());
        }
        if self.remote(remote_id).is_some() {
            return Err(ProviderError::Status {
                status: 409,
                message: "duplicate".into(),
            });
        }
        let created = self.write_body(remote_id.to_string(), body);
        let stall = self.state().insert_stall;
        pause(stall).await;
        Ok(created)
    }

    async fn update_event(
        &self,
        _connection: &CalendarConnection,
        remote_id: &str,
        body: &RemoteEventBody,
    ) -> Result<RemoteEvent, ProviderError> {
        let (delay, fail) = self.begin_write(|c| c.update += 1);
        pause(delay).await;
        if fail {
            return Err(unavailable());
        }
        if self.remote(remote_id).is_none() {
            return Err(ProviderError::Status {
                status: 404,
                message: "not found".into(),
            });
        }
        Ok(self.write_body(remote_id.to_string(), body))
    }

    async fn delete_event(
        &self,
        _connection: &CalendarConnection,
        remote_id: &str,
    ) -> Result<(), ProviderError> {
        let (delay, fail) = self.begin_write(|c| c.delete += 1);
        pause(delay).await;
        if fail {
            return Err(unavailable());
        }
        match self.state().events.remove(remote_id) {
            Some(_) => Ok(()),
            None => Err(ProviderError::Status {
                status: 410,
                message: "gone".into(),
            }),
        }
    }
}

/// A wired sync engine over fresh fakes.
#[derive(Debug)]
pub struct Harness {
    pub store: Arc<InMemoryStore>,
    pub provider: Arc<FakeProvider>,
    pub sync: SyncService,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_timeout(Duration::from_secs(5))
    }

    pub fn with_timeout(call_timeout: Duration) -> Self {
        let store = Arc::new(InMemoryStore::new());
        let provider = Arc::new(FakeProvider::new());
        let sync = SyncService::new(
            Arc::clone(&store) as Arc<dyn CalendarStore>,
            Arc::clone(&provider) as Arc<dyn CalendarProvider>,
            call_timeout,
        );
        Self {
            store,
            provider,
            sync,
        }
    }

    /// Connects a new user with default settings.
    pub async fn connected_user(&self) -> UserId {
        let user = UserId::new();
        let Ok(()) = self
            .store
            .upsert_connection(&CalendarConnection::new(user, "token"))
            .await
        else {
            panic!("connection not stored");
        };
        user
    }
}

/// A timed remote boundary `hours` from now.
pub fn at(hours: i64) -> RemoteTime {
    RemoteTime::DateTime {
        at: in_hours(hours),
        time_zone: Some("Europe/Paris".into()),
    }
}

pub fn in_hours(hours: i64) -> DateTime<Utc> {
    Utc::now() + chrono::Duration::hours(hours)
}
