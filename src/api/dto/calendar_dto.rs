//! Calendar connection and sync DTOs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::domain::{CalendarConnection, ConnectionSettings, UserId};

/// Request body for `PUT /users/{user_id}/calendar/connection`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct ConnectionRequest {
    /// Provider bearer token issued by the authentication layer.
    pub access_token: String,
    /// Remote calendar to mirror. Defaults to `primary`.
    #[serde(default)]
    pub calendar_id: Option<String>,
    /// Whether local events are pushed. Defaults to `true`.
    #[serde(default)]
    pub push_enabled: Option<bool>,
    /// Days before now included in a pull. Defaults to 30.
    #[serde(default)]
    pub pull_past_days: Option<u32>,
    /// Days after now included in a pull. Defaults to 90.
    #[serde(default)]
    pub pull_future_days: Option<u32>,
}

impl From<ConnectionRequest> for ConnectionSettings {
    fn from(req: ConnectionRequest) -> Self {
        Self {
            access_token: req.access_token,
            calendar_id: req.calendar_id,
            push_enabled: req.push_enabled,
            pull_past_days: req.pull_past_days,
            pull_future_days: req.pull_future_days,
        }
    }
}

/// Health of the last sync run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SyncHealth {
    /// No run has completed yet.
    NeverSynced,
    /// The last run completed without errors.
    Ok,
    /// The last run failed or skipped events.
    Failing,
}

/// Connection configuration and last sync status.
#[derive(Debug, Serialize, ToSchema)]
pub struct ConnectionStatusResponse {
    /// Owning user.
    pub user_id: UserId,
    /// Mirrored calendar.
    pub calendar_id: String,
    /// Whether local events are pushed.
    pub push_enabled: bool,
    /// Days before now included in a pull.
    pub pull_past_days: u32,
    /// Days after now included in a pull.
    pub pull_future_days: u32,
    /// Summary of the last run.
    pub health: SyncHealth,
    /// Completion time of the last run.
    pub last_synced_at: Option<DateTime<Utc>>,
    /// Time of the last failing run.
    pub last_error_at: Option<DateTime<Utc>>,
    /// Errors in the last failing run.
    pub last_error_count: u32,
    /// Message of the last error.
    pub last_error: Option<String>,
}

impl From<CalendarConnection> for ConnectionStatusResponse {
    fn from(c: CalendarConnection) -> Self {
        let health = match (c.last_synced_at, c.last_error_at) {
            (None, None) => SyncHealth::NeverSynced,
            (_, Some(_)) => SyncHealth::Failing,
            (Some(_), None) => SyncHealth::Ok,
        };
        Self {
            user_id: c.user_id,
            calendar_id: c.calendar_id,
            push_enabled: c.push_enabled,
            pull_past_days: c.pull_past_days,
            pull_future_days: c.pull_future_days,
            health,
            last_synced_at: c.last_synced_at,
            last_error_at: c.last_error_at,
            last_error_count: c.last_error_count,
            last_error: c.last_error,
        }
    }
}
