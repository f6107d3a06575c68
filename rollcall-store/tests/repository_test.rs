use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use futures_util::future::join_all;
use rollcall_core::{AttendeeRepository, EventDraft, EventRepository, StoreError};
use rollcall_store::app_config::DatabaseConfig;
use rollcall_store::{DbClient, MemoryStore, StoreAttendeeRepository, StoreEventRepository};

const WAIT: Duration = Duration::from_secs(2);

fn draft(capacity: i32) -> EventDraft {
    EventDraft {
        title: "Capacity Drill".to_string(),
        description: "Concurrent admission".to_string(),
        location: "Germany".to_string(),
        capacity,
        starts_at: Utc.with_ymd_and_hms(2030, 1, 10, 9, 0, 0).unwrap(),
        ends_at: Utc.with_ymd_and_hms(2030, 1, 10, 17, 0, 0).unwrap(),
    }
}

async fn try_admit(
    events: Arc<dyn EventRepository>,
    event_id: i64,
    attendee_id: i64,
) -> Result<bool, StoreError> {
    let mut guard = events.lock_event(event_id, WAIT).await?.expect("event exists");
    if guard.has_booking(attendee_id).await? {
        return Ok(false);
    }
    if guard.booked_count().await? >= i64::from(guard.event().capacity) {
        return Ok(false);
    }
    guard.insert_booking(attendee_id, Utc::now()).await?;
    guard.commit().await?;
    Ok(true)
}

/// Books every attendee concurrently, returning how many were admitted.
async fn admit_all(
    events: Arc<dyn EventRepository>,
    event_id: i64,
    attendee_ids: Vec<i64>,
) -> usize {
    let attempts = attendee_ids
        .into_iter()
        .map(|attendee_id| tokio::spawn(try_admit(events.clone(), event_id, attendee_id)));

    join_all(attempts)
        .await
        .into_iter()
        .filter(|r| matches!(r, Ok(Ok(true))))
        .count()
}

async fn exercise_capacity(
    attendees: Arc<dyn AttendeeRepository>,
    events: Arc<dyn EventRepository>,
    tag: &str,
) {
    let event = events.insert_event(&draft(3)).await.unwrap();

    let mut ids = Vec::new();
    for i in 0..8 {
        let email = format!("drill-{tag}-{i}@example.com");
        ids.push(attendees.insert_attendee("Drill", &email).await.unwrap().id);
    }

    let admitted = admit_all(events.clone(), event.id, ids).await;
    assert_eq!(admitted, 3);
    assert_eq!(events.count_bookings(event.id).await.unwrap(), 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_memory_store_never_overbooks() {
    let store = MemoryStore::new();
    exercise_capacity(Arc::new(store.clone()), Arc::new(store), "memory").await;
}

#[tokio::test]
async fn test_memory_store_rejects_duplicate_pair_on_commit() {
    let store = MemoryStore::new();
    let event = store.insert_event(&draft(5)).await.unwrap();
    let attendee = store.insert_attendee("Pair", "pair@example.com").await.unwrap();

    let mut guard = store.lock_event(event.id, WAIT).await.unwrap().unwrap();
    guard.insert_booking(attendee.id, Utc::now()).await.unwrap();
    let err = guard.insert_booking(attendee.id, Utc::now()).await.unwrap_err();
    assert!(matches!(err, StoreError::Duplicate { .. }));
    guard.commit().await.unwrap();

    assert_eq!(store.count_bookings(event.id).await.unwrap(), 1);
}

/// Runs against a real Postgres when `ROLLCALL_TEST_DATABASE_URL` is set.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_postgres_store_never_overbooks() {
    let Ok(url) = std::env::var("ROLLCALL_TEST_DATABASE_URL") else {
        eprintln!("ROLLCALL_TEST_DATABASE_URL not set, skipping");
        return;
    };

    let db = DbClient::new(&url, &DatabaseConfig::default()).await.unwrap();
    db.migrate().await.unwrap();

    let tag = Utc::now().timestamp_nanos_opt().unwrap_or_default().to_string();
    exercise_capacity(
        Arc::new(StoreAttendeeRepository::new(db.pool.clone())),
        Arc::new(StoreEventRepository::new(db.pool.clone())),
        &tag,
    )
    .await;

    let attendees = StoreAttendeeRepository::new(db.pool.clone());
    let email = format!("dup-{tag}@example.com");
    attendees.insert_attendee("Dup", &email).await.unwrap();
    let err = attendees.insert_attendee("Dup", &email).await.unwrap_err();
    assert!(matches!(err, StoreError::Duplicate { ref constraint } if constraint == "attendees_email_key"));
}
