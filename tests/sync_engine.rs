//! End-to-end behaviour of the sync engine over the in-memory store and a
//! scripted provider.

#![allow(clippy::panic)]

mod support;

use std::time::Duration;

use chrono::{NaiveDate, TimeZone, Utc};
use tokio_test::{assert_err, assert_ok};

use koda_gateway::domain::{
    CalendarConnection, EventFields, EventId, EventSource, NewEvent, RemoteEvent, RemoteStatus,
    RemoteTime, SyncReport, UserId,
};
use koda_gateway::error::SyncError;
use koda_gateway::persistence::CalendarStore;
use koda_gateway::provider::{CalendarProvider, convert};

use support::{Harness, at, in_hours};

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    let Some(date) = NaiveDate::from_ymd_opt(y, m, d) else {
        panic!("valid date");
    };
    date
}

fn today_plus(days: i64) -> NaiveDate {
    (Utc::now() + chrono::Duration::days(days)).date_naive()
}

async fn local_event(h: &Harness, user: UserId, title: &str) -> EventId {
    let event = assert_ok!(
        h.store
            .insert_event(NewEvent::local(user, title, in_hours(24), in_hours(25)))
            .await
    );
    event.id
}

fn zero() -> SyncReport {
    SyncReport::default()
}

// ── Pull ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn second_pull_without_remote_change_updates_nothing() {
    let h = Harness::new();
    let user = h.connected_user().await;
    h.provider.seed("Dentist", at(2), at(3));
    h.provider.seed("Standup", at(5), at(6));

    let first = assert_ok!(h.sync.pull(user).await);
    assert_eq!(first.pulled, 2);

    let second = assert_ok!(h.sync.pull(user).await);
    assert_eq!((second.pulled, second.updated, second.deleted), (0, 0, 0));
    assert_eq!(h.store.events_of(user).await.len(), 2);
}

#[tokio::test]
async fn pulled_event_copies_remote_fields() {
    let h = Harness::new();
    let user = h.connected_user().await;
    let remote = h.provider.seed("Dinner", at(4), at(6));

    assert_ok!(h.sync.pull(user).await);

    let events = h.store.events_of(user).await;
    let Some(event) = events.first() else {
        panic!("event not pulled");
    };
    assert_eq!(event.title, "Dinner");
    assert_eq!(event.source, EventSource::Google);
    assert_eq!(event.external_id.as_deref(), Some(remote.id.as_str()));
    assert_eq!(event.timezone, "Europe/Paris");
    assert!(!event.sync_to_google);

    let mapping = assert_ok!(h.store.get_mapping(event.id).await);
    let Some(mapping) = mapping else {
        panic!("mapping not created");
    };
    assert_eq!(mapping.google_event_id, remote.id);
    assert_eq!(mapping.google_etag, remote.etag);
}

#[tokio::test]
async fn remote_edit_updates_local_event() {
    let h = Harness::new();
    let user = h.connected_user().await;
    let remote = h.provider.seed("Draft", at(2), at(3));
    assert_ok!(h.sync.pull(user).await);

    h.provider.edit(&remote.id, "Final");
    let report = assert_ok!(h.sync.pull(user).await);
    assert_eq!(report.updated, 1);

    let events = h.store.events_of(user).await;
    assert_eq!(events.first().map(|e| e.title.as_str()), Some("Final"));
}

#[tokio::test]
async fn cancelled_remote_event_deletes_local_event_and_mapping() {
    let h = Harness::new();
    let user = h.connected_user().await;
    let remote = h.provider.seed("Gym", at(2), at(3));
    assert_ok!(h.sync.pull(user).await);
    assert_eq!(h.store.mapping_count().await, 1);

    h.provider.cancel(&remote.id);
    let report = assert_ok!(h.sync.pull(user).await);

    assert_eq!((report.pulled, report.updated, report.deleted), (0, 0, 1));
    assert!(h.store.events_of(user).await.is_empty());
    assert_eq!(h.store.mapping_count().await, 0);
    let mapping = assert_ok!(h.store.find_mapping_by_remote(user, &remote.id).await);
    assert!(mapping.is_none());
}

#[tokio::test]
async fn cancelled_remote_event_without_mapping_is_ignored() {
    let h = Harness::new();
    let user = h.connected_user().await;
    let remote = h.provider.seed("Never seen", at(2), at(3));
    h.provider.cancel(&remote.id);

    let report = assert_ok!(h.sync.pull(user).await);
    assert_eq!((report.pulled, report.deleted, report.failed), (0, 0, 0));
    assert!(h.store.events_of(user).await.is_empty());
}

#[tokio::test]
async fn date_only_remote_event_is_pulled_as_all_day() {
    let h = Harness::new();
    let user = h.connected_user().await;
    h.provider.seed(
        "Holiday",
        RemoteTime::Date(today_plus(3)),
        RemoteTime::Date(today_plus(4)),
    );

    let report = assert_ok!(h.sync.pull(user).await);
    assert_eq!(report.pulled, 1);

    let events = h.store.events_of(user).await;
    let Some(event) = events.first() else {
        panic!("event not pulled");
    };
    assert!(event.all_day);
    assert_eq!(event.start_at.date_naive(), today_plus(3));
}

#[tokio::test]
async fn remote_event_without_times_is_counted_as_failed() {
    let h = Harness::new();
    let user = h.connected_user().await;
    h.provider.put_raw(RemoteEvent {
        id: "broken".into(),
        etag: "\"1\"".into(),
        summary: "No times".into(),
        description: None,
        location: None,
        start: None,
        end: None,
        status: RemoteStatus::Confirmed,
        updated: None,
    });
    h.provider.seed("Fine", at(1), at(2));

    let report = assert_ok!(h.sync.pull(user).await);
    assert_eq!((report.pulled, report.failed), (1, 1));
}

#[tokio::test]
async fn listing_failure_fails_the_pull() {
    let h = Harness::new();
    let user = h.connected_user().await;
    h.provider.fail_listing(true);

    let err = assert_err!(h.sync.pull(user).await);
    assert!(matches!(err, SyncError::Provider(_)));
}

// ── Push ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn unmapped_local_event_is_inserted_with_mapping() {
    let h = Harness::new();
    let user = h.connected_user().await;
    let event_id = local_event(&h, user, "Board games").await;

    let report = assert_ok!(h.sync.push(user).await);
    assert_eq!((report.pushed, report.updated), (1, 0));
    assert_eq!(h.provider.calls().insert, 1);

    let mapping = assert_ok!(h.store.get_mapping(event_id).await);
    let Some(mapping) = mapping else {
        panic!("mapping not created");
    };
    let Some(remote) = h.provider.remote(&mapping.google_event_id) else {
        panic!("remote copy missing");
    };
    assert_eq!(remote.summary, "Board games");
    assert_eq!(mapping.google_etag, remote.etag);
}

#[tokio::test]
async fn unchanged_local_event_is_not_pushed_again() {
    let h = Harness::new();
    let user = h.connected_user().await;
    local_event(&h, user, "Lunch").await;
    assert_ok!(h.sync.push(user).await);
    let before = h.provider.calls();

    let report = assert_ok!(h.sync.push(user).await);
    assert_eq!((report.pushed, report.updated), (0, 0));
    assert_eq!(h.provider.calls().writes(), before.writes());
}

#[tokio::test]
async fn local_edit_is_pushed_as_update() {
    let h = Harness::new();
    let user = h.connected_user().await;
    let event_id = local_event(&h, user, "Lunch").await;
    assert_ok!(h.sync.push(user).await);

    let fields = EventFields {
        title: "Long lunch".into(),
        description: Some("with the team".into()),
        location: None,
        start_at: in_hours(24),
        end_at: in_hours(26),
        all_day: false,
        timezone: "UTC".into(),
    };
    assert_ok!(h.store.update_event_fields(event_id, fields).await);

    let report = assert_ok!(h.sync.push(user).await);
    assert_eq!((report.pushed, report.updated), (0, 1));

    let Some(mapping) = assert_ok!(h.store.get_mapping(event_id).await) else {
        panic!("mapping missing");
    };
    let Some(remote) = h.provider.remote(&mapping.google_event_id) else {
        panic!("remote copy missing");
    };
    assert_eq!(remote.summary, "Long lunch");
    assert_eq!(mapping.google_etag, remote.etag);
}

#[tokio::test]
async fn pulled_events_are_never_pushed() {
    let h = Harness::new();
    let user = h.connected_user().await;
    h.provider.seed("From remote", at(2), at(3));
    assert_ok!(h.sync.pull(user).await);

    // Even a local edit of a pulled event stays local.
    let events = h.store.events_of(user).await;
    let Some(pulled) = events.first() else {
        panic!("event not pulled");
    };
    let fields = EventFields {
        title: "Edited locally".into(),
        description: None,
        location: None,
        start_at: pulled.start_at,
        end_at: pulled.end_at,
        all_day: false,
        timezone: "UTC".into(),
    };
    assert_ok!(h.store.update_event_fields(pulled.id, fields).await);

    let candidates = assert_ok!(h.store.push_candidates(user).await);
    assert!(candidates.is_empty());

    let report = assert_ok!(h.sync.push(user).await);
    assert_eq!((report.pushed, report.updated), (0, 0));
    assert_eq!(h.provider.calls().writes(), 0);
}

#[tokio::test]
async fn opted_out_events_are_not_pushed() {
    let h = Harness::new();
    let user = h.connected_user().await;
    let mut event = NewEvent::local(user, "Private", in_hours(1), in_hours(2));
    event.sync_to_google = false;
    assert_ok!(h.store.insert_event(event).await);

    let report = assert_ok!(h.sync.push(user).await);
    assert_eq!(report.pushed, 0);
    assert_eq!(h.provider.calls().insert, 0);
}

#[tokio::test]
async fn push_disabled_makes_no_provider_calls() {
    let h = Harness::new();
    let user = h.connected_user().await;
    let mut connection = CalendarConnection::new(user, "token");
    connection.push_enabled = false;
    assert_ok!(h.store.upsert_connection(&connection).await);
    local_event(&h, user, "Stays local").await;

    let report = assert_ok!(h.sync.push(user).await);
    assert_eq!(report.pushed, 0);
    assert_eq!(h.provider.calls(), support::Calls::default());
}

#[tokio::test]
async fn provider_failures_are_counted_and_skipped() {
    let h = Harness::new();
    let user = h.connected_user().await;
    local_event(&h, user, "One").await;
    local_event(&h, user, "Two").await;
    h.provider.fail_writes(true);

    let report = assert_ok!(h.sync.push(user).await);
    assert_eq!((report.pushed, report.failed), (0, 2));
    assert_eq!(h.store.mapping_count().await, 0);
}

#[tokio::test]
async fn slow_provider_calls_are_counted_as_timeouts() {
    let h = Harness::with_timeout(Duration::from_millis(20));
    let user = h.connected_user().await;
    local_event(&h, user, "Slow").await;
    h.provider.delay_writes(Duration::from_millis(500));

    let report = assert_ok!(h.sync.push(user).await);
    assert_eq!((report.pushed, report.timed_out, report.failed), (0, 1, 0));
}

#[tokio::test]
async fn pushed_copy_is_stored_under_derived_id() {
    let h = Harness::new();
    let user = h.connected_user().await;
    let event_id = local_event(&h, user, "Named").await;

    assert_ok!(h.sync.push(user).await);
    let Some(mapping) = assert_ok!(h.store.get_mapping(event_id).await) else {
        panic!("mapping missing");
    };
    assert_eq!(mapping.google_event_id, convert::remote_id_for(event_id));
    assert!(h.provider.remote(&mapping.google_event_id).is_some());
}

#[tokio::test]
async fn insert_lost_after_commit_is_linked_by_next_sync() {
    let h = Harness::with_timeout(Duration::from_millis(20));
    let user = h.connected_user().await;
    let event_id = local_event(&h, user, "Committed").await;
    h.provider.stall_inserts_after_commit(Duration::from_millis(200));

    let first = assert_ok!(h.sync.sync_all(user).await);
    assert_eq!((first.pushed, first.timed_out), (0, 1));
    assert_eq!(h.provider.remote_count(), 1);

    let second = assert_ok!(h.sync.sync_all(user).await);
    assert_eq!(second, zero());
    let third = assert_ok!(h.sync.sync_all(user).await);
    assert_eq!(third, zero());

    let events = h.store.events_of(user).await;
    let [event] = events.as_slice() else {
        panic!("expected one local event, got {}", events.len());
    };
    assert_eq!(event.id, event_id);
    assert_eq!(event.source, EventSource::Koda);
    assert_eq!(h.provider.remote_count(), 1);
    assert_eq!(h.provider.calls().insert, 1);
    let Some(mapping) = assert_ok!(h.store.get_mapping(event_id).await) else {
        panic!("mapping missing");
    };
    assert_eq!(mapping.google_event_id, convert::remote_id_for(event_id));
}

#[tokio::test]
async fn push_retry_after_lost_insert_updates_existing_copy() {
    let h = Harness::with_timeout(Duration::from_millis(20));
    let user = h.connected_user().await;
    let event_id = local_event(&h, user, "Retried").await;
    h.provider.stall_inserts_after_commit(Duration::from_millis(200));

    let first = assert_ok!(h.sync.push(user).await);
    assert_eq!(first.timed_out, 1);
    assert!(assert_ok!(h.store.get_mapping(event_id).await).is_none());

    let second = assert_ok!(h.sync.push(user).await);
    assert_eq!((second.pushed, second.timed_out, second.failed), (1, 0, 0));
    assert_eq!(h.provider.remote_count(), 1);
    let calls = h.provider.calls();
    assert_eq!((calls.insert, calls.update), (2, 1));

    let Some(mapping) = assert_ok!(h.store.get_mapping(event_id).await) else {
        panic!("mapping missing");
    };
    let Some(remote) = h.provider.remote(&mapping.google_event_id) else {
        panic!("remote copy missing");
    };
    assert_eq!(mapping.google_etag, remote.etag);

    let third = assert_ok!(h.sync.sync_all(user).await);
    assert_eq!(third, zero());
}

#[tokio::test]
async fn delete_after_lost_insert_removes_remote_copy() {
    let h = Harness::with_timeout(Duration::from_millis(20));
    let user = h.connected_user().await;
    let event_id = local_event(&h, user, "Orphan").await;
    h.provider.stall_inserts_after_commit(Duration::from_millis(200));
    assert_ok!(h.sync.push(user).await);
    assert_eq!(h.provider.remote_count(), 1);

    assert_ok!(h.sync.delete_event(user, event_id).await);
    assert_eq!(h.provider.remote_count(), 0);

    let report = assert_ok!(h.sync.sync_all(user).await);
    assert_eq!(report, zero());
    assert!(h.store.events_of(user).await.is_empty());
}

#[tokio::test]
async fn derived_id_of_another_users_event_is_imported() {
    let h = Harness::new();
    let owner = h.connected_user().await;
    let other = h.connected_user().await;
    let event_id = local_event(&h, owner, "Not yours").await;
    h.provider.put_raw(RemoteEvent {
        id: convert::remote_id_for(event_id),
        etag: "\"1\"".into(),
        summary: "Shared".into(),
        description: None,
        location: None,
        start: Some(at(2)),
        end: Some(at(3)),
        status: RemoteStatus::Confirmed,
        updated: Some(Utc::now()),
    });

    let report = assert_ok!(h.sync.pull(other).await);
    assert_eq!(report.pulled, 1);
    let imported = h.store.events_of(other).await;
    let [event] = imported.as_slice() else {
        panic!("expected one imported event, got {}", imported.len());
    };
    assert_eq!(event.source, EventSource::Google);
    assert!(assert_ok!(h.store.get_mapping(event_id).await).is_none());
}

// ── sync_all ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn sync_all_is_idempotent() {
    let h = Harness::new();
    let user = h.connected_user().await;
    h.provider.seed("Remote A", at(2), at(3));
    h.provider.seed("Remote B", at(4), at(5));
    local_event(&h, user, "Local A").await;

    let first = assert_ok!(h.sync.sync_all(user).await);
    assert_eq!((first.pulled, first.pushed), (2, 1));

    let second = assert_ok!(h.sync.sync_all(user).await);
    assert_eq!(second, zero());
    assert_eq!(h.store.events_of(user).await.len(), 3);
    assert_eq!(h.provider.remote_count(), 3);
}

#[tokio::test]
async fn remote_edit_is_not_echoed_back() {
    let h = Harness::new();
    let user = h.connected_user().await;
    local_event(&h, user, "Shared").await;
    assert_ok!(h.sync.sync_all(user).await);

    let Some(mapping_remote_id) = h
        .store
        .events_of(user)
        .await
        .first()
        .map(|e| e.id)
    else {
        panic!("event missing");
    };
    let Some(mapping) = assert_ok!(h.store.get_mapping(mapping_remote_id).await) else {
        panic!("mapping missing");
    };
    h.provider.edit(&mapping.google_event_id, "Renamed remotely");
    let before = h.provider.calls();

    let report = assert_ok!(h.sync.sync_all(user).await);
    assert_eq!(report.updated, 1);
    assert_eq!(report.pushed, 0);
    assert_eq!(h.provider.calls().update, before.update);

    let third = assert_ok!(h.sync.sync_all(user).await);
    assert_eq!(third, zero());
}

#[tokio::test]
async fn sync_all_without_connection_is_a_noop() {
    let h = Harness::new();
    let user = UserId::new();

    let report = assert_ok!(h.sync.sync_all(user).await);
    assert_eq!(report, zero());
    assert_eq!(h.provider.calls(), support::Calls::default());
    assert!(assert_ok!(h.store.get_connection(user).await).is_none());
}

#[tokio::test]
async fn sync_all_records_status_on_connection() {
    let h = Harness::new();
    let user = h.connected_user().await;
    local_event(&h, user, "Will fail").await;
    h.provider.fail_writes(true);

    let report = assert_ok!(h.sync.sync_all(user).await);
    assert_eq!(report.failed, 1);
    let Some(conn) = assert_ok!(h.store.get_connection(user).await) else {
        panic!("connection missing");
    };
    assert!(conn.last_synced_at.is_some());
    assert_eq!(conn.last_error_count, 1);
    assert!(conn.last_error.is_some());

    h.provider.fail_writes(false);
    assert_ok!(h.sync.sync_all(user).await);
    let Some(conn) = assert_ok!(h.store.get_connection(user).await) else {
        panic!("connection missing");
    };
    assert_eq!(conn.last_error_count, 0);
    assert!(conn.last_error_at.is_none());
}

#[tokio::test]
async fn hard_failure_is_recorded_and_returned() {
    let h = Harness::new();
    let user = h.connected_user().await;
    local_event(&h, user, "Not pushed").await;
    h.provider.fail_listing(true);

    assert_err!(h.sync.sync_all(user).await);
    assert_eq!(h.provider.calls().insert, 0);

    let Some(conn) = assert_ok!(h.store.get_connection(user).await) else {
        panic!("connection missing");
    };
    assert!(conn.last_error_at.is_some());
    assert!(conn.last_error.is_some_and(|e| e.contains("503")));
}

#[tokio::test]
async fn concurrent_runs_for_one_user_do_not_duplicate_pushes() {
    let h = Harness::new();
    let user = h.connected_user().await;
    local_event(&h, user, "Once").await;
    h.provider.delay_writes(Duration::from_millis(50));

    let (a, b) = tokio::join!(h.sync.sync_all(user), h.sync.sync_all(user));
    let a = assert_ok!(a);
    let b = assert_ok!(b);

    assert_eq!(a.pushed + b.pushed, 1);
    assert_eq!(h.provider.calls().insert, 1);
    assert_eq!(h.store.mapping_count().await, 1);
}

#[tokio::test]
async fn different_users_sync_independently() {
    let h = Harness::new();
    let alice = h.connected_user().await;
    let bob = h.connected_user().await;
    local_event(&h, alice, "Alice's").await;
    local_event(&h, bob, "Bob's").await;

    let (a, b) = tokio::join!(h.sync.sync_all(alice), h.sync.sync_all(bob));
    assert_eq!(assert_ok!(a).pushed, 1);
    assert_eq!(assert_ok!(b).pushed, 1);
}

// ── delete_event ─────────────────────────────────────────────────────────

#[tokio::test]
async fn delete_removes_remote_copy_first() {
    let h = Harness::new();
    let user = h.connected_user().await;
    let event_id = local_event(&h, user, "Cancelled plan").await;
    assert_ok!(h.sync.sync_all(user).await);
    assert_eq!(h.provider.remote_count(), 1);

    assert_ok!(h.sync.delete_event(user, event_id).await);
    assert_eq!(h.provider.remote_count(), 0);
    assert!(assert_ok!(h.store.get_event(event_id).await).is_none());
    assert_eq!(h.store.mapping_count().await, 0);

    let report = assert_ok!(h.sync.sync_all(user).await);
    assert_eq!(report, zero());
}

#[tokio::test]
async fn delete_tolerates_remote_copy_already_gone() {
    let h = Harness::new();
    let user = h.connected_user().await;
    let event_id = local_event(&h, user, "Gone").await;
    assert_ok!(h.sync.push(user).await);
    let Some(mapping) = assert_ok!(h.store.get_mapping(event_id).await) else {
        panic!("mapping missing");
    };
    assert_ok!(
        h.provider
            .delete_event(&CalendarConnection::new(user, "token"), &mapping.google_event_id)
            .await
    );

    assert_ok!(h.sync.delete_event(user, event_id).await);
    assert!(assert_ok!(h.store.get_event(event_id).await).is_none());
}

#[tokio::test]
async fn delete_keeps_local_event_when_remote_delete_fails() {
    let h = Harness::new();
    let user = h.connected_user().await;
    let event_id = local_event(&h, user, "Sticky").await;
    assert_ok!(h.sync.push(user).await);
    h.provider.fail_writes(true);

    let err = assert_err!(h.sync.delete_event(user, event_id).await);
    assert!(matches!(err, SyncError::Provider(_)));
    assert!(assert_ok!(h.store.get_event(event_id).await).is_some());
}

#[tokio::test]
async fn delete_of_foreign_event_is_not_found() {
    let h = Harness::new();
    let owner = h.connected_user().await;
    let stranger = h.connected_user().await;
    let event_id = local_event(&h, owner, "Mine").await;

    let err = assert_err!(h.sync.delete_event(stranger, event_id).await);
    assert!(matches!(err, SyncError::EventNotFound(id) if id == event_id));
    assert!(assert_ok!(h.store.get_event(event_id).await).is_some());
}

#[tokio::test]
async fn all_day_local_event_is_pushed_as_dates() {
    let h = Harness::new();
    let user = h.connected_user().await;
    let day = date(2030, 7, 14);
    let Some(start) = Utc.with_ymd_and_hms(2030, 7, 14, 0, 0, 0).single() else {
        panic!("valid timestamp");
    };
    let mut event = NewEvent::local(user, "Festival", start, start + chrono::Duration::days(1));
    event.all_day = true;
    let event = assert_ok!(h.store.insert_event(event).await);
    assert_ok!(h.sync.push(user).await);

    let Some(mapping) = assert_ok!(h.store.get_mapping(event.id).await) else {
        panic!("mapping missing");
    };
    let Some(remote) = h.provider.remote(&mapping.google_event_id) else {
        panic!("remote copy missing");
    };
    assert_eq!(remote.start, Some(RemoteTime::Date(day)));
    assert_eq!(remote.end, Some(RemoteTime::Date(date(2030, 7, 15))));
}

// ── Scheduler ────────────────────────────────────────────────────────────

#[tokio::test]
async fn scheduler_round_visits_every_connected_user() {
    use std::sync::Arc;

    use koda_gateway::scheduler::{RoundSummary, SyncScheduler};

    let h = Harness::new();
    let alice = h.connected_user().await;
    let bob = h.connected_user().await;
    local_event(&h, alice, "Alice's").await;
    local_event(&h, bob, "Bob's").await;

    let scheduler = SyncScheduler::new(Arc::new(h.sync.clone()), Duration::from_secs(60));
    let summary = assert_ok!(scheduler.run_once().await);

    assert_eq!(
        summary,
        RoundSummary {
            users: 2,
            succeeded: 2,
            failed: 0,
        }
    );
    assert_eq!(h.provider.remote_count(), 2);
}

#[tokio::test]
async fn scheduler_round_survives_failing_user() {
    use std::sync::Arc;

    use koda_gateway::scheduler::SyncScheduler;

    let h = Harness::new();
    h.connected_user().await;
    h.provider.fail_listing(true);

    let scheduler = SyncScheduler::new(Arc::new(h.sync.clone()), Duration::from_secs(60));
    let summary = assert_ok!(scheduler.run_once().await);
    assert_eq!((summary.users, summary.failed), (1, 1));
}
