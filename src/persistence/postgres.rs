//! PostgreSQL implementation of the persistence layer.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

use super::models::{ConnectionRow, EventRow, MappingRow, PushCandidate, PushCandidateRow};
use super::{CalendarStore, KeyValueStore};
use crate::config::AppConfig;
use crate::domain::{
    CalendarConnection, Event, EventFields, EventId, EventMapping, NewEvent, SyncOutcome, UserId,
};
use crate::error::StoreError;

const EVENT_COLUMNS: &str = "id, owner_id, title, description, location, start_at, end_at, \
     all_day, timezone, visibility, source, external_id, sync_to_google, created_at, updated_at";

const CONNECTION_COLUMNS: &str = "user_id, calendar_id, access_token, push_enabled, \
     pull_past_days, pull_future_days, last_synced_at, last_error_at, last_error_count, last_error";

/// PostgreSQL-backed store using `sqlx::PgPool`.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a store over an existing connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Opens a connection pool using the database settings of `config`.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError::Database`] if the database is unreachable.
    pub async fn connect(config: &AppConfig) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.database_max_connections)
            .min_connections(config.database_min_connections)
            .acquire_timeout(Duration::from_secs(config.database_connect_timeout_secs))
            .connect(&config.database_url)
            .await?;
        Ok(Self::new(pool))
    }

    /// Applies pending migrations from `migrations/`.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError::Database`] if a migration fails.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))
    }
}

fn to_i32(v: u32) -> i32 {
    i32::try_from(v).unwrap_or(i32::MAX)
}

#[async_trait]
impl CalendarStore for PostgresStore {
    async fn get_connection(
        &self,
        user_id: UserId,
    ) -> Result<Option<CalendarConnection>, StoreError> {
        let row = sqlx::query_as::<_, ConnectionRow>(&format!(
            "SELECT {CONNECTION_COLUMNS} FROM google_calendar_connections WHERE user_id = $1"
        ))
        .bind(*user_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(CalendarConnection::try_from).transpose()
    }

    async fn upsert_connection(&self, connection: &CalendarConnection) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO google_calendar_connections \
             (user_id, calendar_id, access_token, push_enabled, pull_past_days, pull_future_days, \
              last_synced_at, last_error_at, last_error_count, last_error) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
             ON CONFLICT (user_id) DO UPDATE SET \
               calendar_id = EXCLUDED.calendar_id, \
               access_token = EXCLUDED.access_token, \
               push_enabled = EXCLUDED.push_enabled, \
               pull_past_days = EXCLUDED.pull_past_days, \
               pull_future_days = EXCLUDED.pull_future_days, \
               last_synced_at = EXCLUDED.last_synced_at, \
               last_error_at = EXCLUDED.last_error_at, \
               last_error_count = EXCLUDED.last_error_count, \
               last_error = EXCLUDED.last_error, \
               updated_at = now()",
        )
        .bind(*connection.user_id.as_uuid())
        .bind(&connection.calendar_id)
        .bind(&connection.access_token)
        .bind(connection.push_enabled)
        .bind(to_i32(connection.pull_past_days))
        .bind(to_i32(connection.pull_future_days))
        .bind(connection.last_synced_at)
        .bind(connection.last_error_at)
        .bind(to_i32(connection.last_error_count))
        .bind(&connection.last_error)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn record_sync_outcome(
        &self,
        user_id: UserId,
        outcome: &SyncOutcome,
    ) -> Result<bool, StoreError> {
        let failed = outcome.is_failure();
        let result = sqlx::query(
            "UPDATE google_calendar_connections SET \
               last_synced_at = $2, last_error_at = $3, last_error_count = $4, last_error = $5, \
               updated_at = now() \
             WHERE user_id = $1",
        )
        .bind(*user_id.as_uuid())
        .bind(outcome.at)
        .bind(failed.then_some(outcome.at))
        .bind(if failed { to_i32(outcome.error_count) } else { 0 })
        .bind(outcome.last_error.as_deref().filter(|_| failed))
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn connected_users(&self) -> Result<Vec<UserId>, StoreError> {
        let rows = sqlx::query_scalar::<_, uuid::Uuid>(
            "SELECT user_id FROM google_calendar_connections ORDER BY user_id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(UserId::from).collect())
    }

    async fn insert_event(&self, event: NewEvent) -> Result<Event, StoreError> {
        let now = Utc::now();
        let row = sqlx::query_as::<_, EventRow>(&format!(
            "INSERT INTO events ({EVENT_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $14) \
             RETURNING {EVENT_COLUMNS}"
        ))
        .bind(*EventId::new().as_uuid())
        .bind(*event.owner_id.as_uuid())
        .bind(&event.title)
        .bind(&event.description)
        .bind(&event.location)
        .bind(event.start_at)
        .bind(event.end_at)
        .bind(event.all_day)
        .bind(&event.timezone)
        .bind(event.visibility.as_str())
        .bind(event.source.as_str())
        .bind(&event.external_id)
        .bind(event.sync_to_google)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;
        Event::try_from(row)
    }

    async fn get_event(&self, event_id: EventId) -> Result<Option<Event>, StoreError> {
        let row = sqlx::query_as::<_, EventRow>(&format!(
            "SELECT {EVENT_COLUMNS} FROM events WHERE id = $1"
        ))
        .bind(*event_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;
        row.map(Event::try_from).transpose()
    }

    async fn update_event_fields(
        &self,
        event_id: EventId,
        fields: EventFields,
    ) -> Result<Option<Event>, StoreError> {
        let row = update_fields(&self.pool, event_id, &fields, Utc::now()).await?;
        row.map(Event::try_from).transpose()
    }

    async fn delete_event(&self, event_id: EventId) -> Result<bool, StoreError> {
        // Mapping rows go with the event (ON DELETE CASCADE).
        let result = sqlx::query("DELETE FROM events WHERE id = $1")
            .bind(*event_id.as_uuid())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn get_mapping(&self, event_id: EventId) -> Result<Option<EventMapping>, StoreError> {
        let row = sqlx::query_as::<_, MappingRow>(
            "SELECT user_id, koda_event_id, google_event_id, google_etag, last_pushed_at \
             FROM google_event_mappings WHERE koda_event_id = $1",
        )
        .bind(*event_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(EventMapping::from))
    }

    async fn find_mapping_by_remote(
        &self,
        user_id: UserId,
        google_event_id: &str,
    ) -> Result<Option<EventMapping>, StoreError> {
        let row = sqlx::query_as::<_, MappingRow>(
            "SELECT user_id, koda_event_id, google_event_id, google_etag, last_pushed_at \
             FROM google_event_mappings WHERE user_id = $1 AND google_event_id = $2",
        )
        .bind(*user_id.as_uuid())
        .bind(google_event_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(EventMapping::from))
    }

    async fn upsert_mapping(&self, mapping: &EventMapping) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO google_event_mappings \
             (user_id, koda_event_id, google_event_id, google_etag, last_pushed_at) \
             VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT (koda_event_id) DO UPDATE SET \
               google_event_id = EXCLUDED.google_event_id, \
               google_etag = EXCLUDED.google_etag, \
               last_pushed_at = EXCLUDED.last_pushed_at",
        )
        .bind(*mapping.user_id.as_uuid())
        .bind(*mapping.koda_event_id.as_uuid())
        .bind(&mapping.google_event_id)
        .bind(&mapping.google_etag)
        .bind(mapping.last_pushed_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn create_pulled_event(
        &self,
        event: NewEvent,
        google_event_id: &str,
        google_etag: &str,
    ) -> Result<Event, StoreError> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, EventRow>(&format!(
            "INSERT INTO events ({EVENT_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $14) \
             RETURNING {EVENT_COLUMNS}"
        ))
        .bind(*EventId::new().as_uuid())
        .bind(*event.owner_id.as_uuid())
        .bind(&event.title)
        .bind(&event.description)
        .bind(&event.location)
        .bind(event.start_at)
        .bind(event.end_at)
        .bind(event.all_day)
        .bind(&event.timezone)
        .bind(event.visibility.as_str())
        .bind(event.source.as_str())
        .bind(&event.external_id)
        .bind(event.sync_to_google)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT INTO google_event_mappings \
             (user_id, koda_event_id, google_event_id, google_etag, last_pushed_at) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(row.owner_id)
        .bind(row.id)
        .bind(google_event_id)
        .bind(google_etag)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Event::try_from(row)
    }

    async fn apply_remote_change(
        &self,
        mapping: &EventMapping,
        fields: EventFields,
        google_etag: &str,
    ) -> Result<Option<Event>, StoreError> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let Some(row) = update_fields(&mut *tx, mapping.koda_event_id, &fields, now).await? else {
            tx.rollback().await?;
            return Ok(None);
        };

        sqlx::query(
            "UPDATE google_event_mappings SET google_etag = $2, last_pushed_at = $3 \
             WHERE koda_event_id = $1",
        )
        .bind(*mapping.koda_event_id.as_uuid())
        .bind(google_etag)
        .bind(row.updated_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Event::try_from(row).map(Some)
    }

    async fn push_candidates(&self, user_id: UserId) -> Result<Vec<PushCandidate>, StoreError> {
        let rows = sqlx::query_as::<_, PushCandidateRow>(
            "SELECT e.id, e.owner_id, e.title, e.description, e.location, e.start_at, e.end_at, \
                    e.all_day, e.timezone, e.visibility, e.source, e.external_id, \
                    e.sync_to_google, e.created_at, e.updated_at, \
                    m.google_event_id, m.google_etag, m.last_pushed_at \
             FROM events e \
             LEFT JOIN google_event_mappings m ON m.koda_event_id = e.id \
             WHERE e.owner_id = $1 AND e.source = 'KODA' AND e.sync_to_google \
             ORDER BY e.created_at, e.id",
        )
        .bind(*user_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(PushCandidate::try_from).collect()
    }
}

async fn update_fields<'e, E>(
    executor: E,
    event_id: EventId,
    fields: &EventFields,
    now: DateTime<Utc>,
) -> Result<Option<EventRow>, StoreError>
where
    E: sqlx::PgExecutor<'e>,
{
    let row = sqlx::query_as::<_, EventRow>(&format!(
        "UPDATE events SET title = $2, description = $3, location = $4, start_at = $5, \
           end_at = $6, all_day = $7, timezone = $8, updated_at = $9 \
         WHERE id = $1 RETURNING {EVENT_COLUMNS}"
    ))
    .bind(*event_id.as_uuid())
    .bind(&fields.title)
    .bind(&fields.description)
    .bind(&fields.location)
    .bind(fields.start_at)
    .bind(fields.end_at)
    .bind(fields.all_day)
    .bind(&fields.timezone)
    .bind(now)
    .fetch_optional(executor)
    .await?;
    Ok(row)
}

#[async_trait]
impl KeyValueStore for PostgresStore {
    async fn get_value(&self, key: &str) -> Result<Option<String>, StoreError> {
        let value = sqlx::query_scalar::<_, String>(
            "SELECT payload FROM suggestion_cache WHERE cache_key = $1 AND expires_at > now()",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;
        Ok(value)
    }

    async fn put_value(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        let expires_at = chrono::Duration::from_std(ttl)
            .ok()
            .and_then(|ttl| Utc::now().checked_add_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        sqlx::query(
            "INSERT INTO suggestion_cache (cache_key, payload, expires_at) VALUES ($1, $2, $3) \
             ON CONFLICT (cache_key) DO UPDATE SET \
               payload = EXCLUDED.payload, expires_at = EXCLUDED.expires_at",
        )
        .bind(key)
        .bind(value)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn purge_expired(&self) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM suggestion_cache WHERE expires_at <= now()")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
