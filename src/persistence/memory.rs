//! In-memory implementation of the persistence layer.
//!
//! Used when `PERSISTENCE_ENABLED=false` and throughout the tests. All state
//! lives behind a single [`tokio::sync::RwLock`], so every trait method is
//! atomic with respect to the others.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use super::models::PushCandidate;
use super::{CalendarStore, KeyValueStore};
use crate::domain::{
    CalendarConnection, Event, EventFields, EventId, EventMapping, EventSource, NewEvent,
    SyncOutcome, UserId,
};
use crate::error::StoreError;

#[derive(Debug, Default)]
struct MemoryState {
    events: HashMap<EventId, Event>,
    mappings: HashMap<EventId, EventMapping>,
    connections: HashMap<UserId, CalendarConnection>,
    values: HashMap<String, (String, Instant)>,
}

impl MemoryState {
    fn remote_id_taken(&self, mapping: &EventMapping) -> bool {
        self.mappings.values().any(|m| {
            m.user_id == mapping.user_id
                && m.google_event_id == mapping.google_event_id
                && m.koda_event_id != mapping.koda_event_id
        })
    }
}

/// Process-local store with the same invariants as the PostgreSQL store.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: RwLock<MemoryState>,
}

impl InMemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every event owned by `user_id`, oldest first.
    pub async fn events_of(&self, user_id: UserId) -> Vec<Event> {
        let state = self.state.read().await;
        let mut events: Vec<Event> = state
            .events
            .values()
            .filter(|e| e.owner_id == user_id)
            .cloned()
            .collect();
        events.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        events
    }

    /// Returns the number of mapping rows.
    pub async fn mapping_count(&self) -> usize {
        self.state.read().await.mappings.len()
    }
}

#[async_trait]
impl CalendarStore for InMemoryStore {
    async fn get_connection(
        &self,
        user_id: UserId,
    ) -> Result<Option<CalendarConnection>, StoreError> {
        Ok(self.state.read().await.connections.get(&user_id).cloned())
    }

    async fn upsert_connection(&self, connection: &CalendarConnection) -> Result<(), StoreError> {
        self.state
            .write()
            .await
            .connections
            .insert(connection.user_id, connection.clone());
        Ok(())
    }

    async fn record_sync_outcome(
        &self,
        user_id: UserId,
        outcome: &SyncOutcome,
    ) -> Result<bool, StoreError> {
        let mut state = self.state.write().await;
        let Some(connection) = state.connections.get_mut(&user_id) else {
            return Ok(false);
        };
        connection.record(outcome);
        Ok(true)
    }

    async fn connected_users(&self) -> Result<Vec<UserId>, StoreError> {
        let mut users: Vec<UserId> = self.state.read().await.connections.keys().copied().collect();
        users.sort();
        Ok(users)
    }

    async fn insert_event(&self, event: NewEvent) -> Result<Event, StoreError> {
        let event = event.into_event(EventId::new(), Utc::now());
        self.state
            .write()
            .await
            .events
            .insert(event.id, event.clone());
        Ok(event)
    }

    async fn get_event(&self, event_id: EventId) -> Result<Option<Event>, StoreError> {
        Ok(self.state.read().await.events.get(&event_id).cloned())
    }

    async fn update_event_fields(
        &self,
        event_id: EventId,
        fields: EventFields,
    ) -> Result<Option<Event>, StoreError> {
        let mut state = self.state.write().await;
        let Some(event) = state.events.get_mut(&event_id) else {
            return Ok(None);
        };
        event.apply_fields(fields, Utc::now());
        Ok(Some(event.clone()))
    }

    async fn delete_event(&self, event_id: EventId) -> Result<bool, StoreError> {
        let mut state = self.state.write().await;
        state.mappings.remove(&event_id);
        Ok(state.events.remove(&event_id).is_some())
    }

    async fn get_mapping(&self, event_id: EventId) -> Result<Option<EventMapping>, StoreError> {
        Ok(self.state.read().await.mappings.get(&event_id).cloned())
    }

    async fn find_mapping_by_remote(
        &self,
        user_id: UserId,
        google_event_id: &str,
    ) -> Result<Option<EventMapping>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .mappings
            .values()
            .find(|m| m.user_id == user_id && m.google_event_id == google_event_id)
            .cloned())
    }

    async fn upsert_mapping(&self, mapping: &EventMapping) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        if state.remote_id_taken(mapping) {
            return Err(StoreError::Conflict(format!(
                "remote event {} already mapped",
                mapping.google_event_id
            )));
        }
        state.mappings.insert(mapping.koda_event_id, mapping.clone());
        Ok(())
    }

    async fn create_pulled_event(
        &self,
        event: NewEvent,
        google_event_id: &str,
        google_etag: &str,
    ) -> Result<Event, StoreError> {
        let now = Utc::now();
        let event = event.into_event(EventId::new(), now);
        let mapping = EventMapping {
            user_id: event.owner_id,
            koda_event_id: event.id,
            google_event_id: google_event_id.to_string(),
            google_etag: google_etag.to_string(),
            last_pushed_at: now,
        };

        let mut state = self.state.write().await;
        if state.remote_id_taken(&mapping) {
            return Err(StoreError::Conflict(format!(
                "remote event {google_event_id} already mapped"
            )));
        }
        state.mappings.insert(event.id, mapping);
        state.events.insert(event.id, event.clone());
        Ok(event)
    }

    async fn apply_remote_change(
        &self,
        mapping: &EventMapping,
        fields: EventFields,
        google_etag: &str,
    ) -> Result<Option<Event>, StoreError> {
        let mut state = self.state.write().await;
        let Some(event) = state.events.get_mut(&mapping.koda_event_id) else {
            return Ok(None);
        };
        event.apply_fields(fields, Utc::now());
        let event = event.clone();

        let stored = state
            .mappings
            .entry(mapping.koda_event_id)
            .or_insert_with(|| mapping.clone());
        stored.google_etag = google_etag.to_string();
        stored.last_pushed_at = event.updated_at;
        Ok(Some(event))
    }

    async fn push_candidates(&self, user_id: UserId) -> Result<Vec<PushCandidate>, StoreError> {
        let state = self.state.read().await;
        let mut candidates: Vec<PushCandidate> = state
            .events
            .values()
            .filter(|e| {
                e.owner_id == user_id && e.source == EventSource::Koda && e.sync_to_google
            })
            .map(|e| PushCandidate {
                event: e.clone(),
                mapping: state.mappings.get(&e.id).cloned(),
            })
            .collect();
        candidates.sort_by(|a, b| {
            a.event
                .created_at
                .cmp(&b.event.created_at)
                .then(a.event.id.cmp(&b.event.id))
        });
        Ok(candidates)
    }
}

#[async_trait]
impl KeyValueStore for InMemoryStore {
    async fn get_value(&self, key: &str) -> Result<Option<String>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .values
            .get(key)
            .filter(|(_, expires_at)| *expires_at > Instant::now())
            .map(|(value, _)| value.clone()))
    }

    async fn put_value(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        let now = Instant::now();
        let expires_at = now.checked_add(ttl).unwrap_or(now);
        self.state
            .write()
            .await
            .values
            .insert(key.to_string(), (value.to_string(), expires_at));
        Ok(())
    }

    async fn purge_expired(&self) -> Result<u64, StoreError> {
        let now = Instant::now();
        let mut state = self.state.write().await;
        let before = state.values.len();
        state.values.retain(|_, (_, expires_at)| *expires_at > now);
        Ok(u64::try_from(before - state.values.len()).unwrap_or(u64::MAX))
    }
}
