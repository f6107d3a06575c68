//! In-process implementation of the repository traits.
//!
//! Used when no database is configured and by the test suites. It enforces the same
//! invariants as the Postgres schema: unique attendee emails, unique `(event, attendee)`
//! bookings, referential integrity and cascade delete. Per-event serialization is an
//! async mutex per event id.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rollcall_core::repository::{ATTENDEE_EMAIL_CONSTRAINT, BOOKING_PAIR_CONSTRAINT};
use rollcall_core::{
    Attendee, AttendeeRepository, Booking, Event, EventDraft, EventFilter, EventGuard, EventListing,
    EventRepository, PageRequest, StoreError,
};
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tracing::debug;

#[derive(Default)]
struct Tables {
    attendees: BTreeMap<i64, Attendee>,
    events: BTreeMap<i64, Event>,
    bookings: BTreeMap<i64, Booking>,
}

impl Tables {
    fn bookings_for(&self, event_id: i64) -> impl Iterator<Item = &Booking> {
        self.bookings.values().filter(move |b| b.event_id == event_id)
    }
}

#[derive(Default)]
struct Sequence(AtomicI64);

impl Sequence {
    fn next(&self) -> i64 {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }
}

#[derive(Default)]
struct Inner {
    tables: RwLock<Tables>,
    event_locks: Mutex<HashMap<i64, Arc<Mutex<()>>>>,
    attendee_ids: Sequence,
    event_ids: Sequence,
    booking_ids: Sequence,
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn event_lock(&self, id: i64) -> Arc<Mutex<()>> {
        let mut locks = self.inner.event_locks.lock().await;
        locks.entry(id).or_default().clone()
    }

    /// Drops the slot for `id` unless another caller is holding or waiting on it.
    async fn release_idle_lock(&self, id: i64, lock: Arc<Mutex<()>>) {
        let mut locks = self.inner.event_locks.lock().await;
        // One reference in the map and one in `lock`; any more belong to waiters.
        let idle = locks.get(&id).is_some_and(|slot| Arc::ptr_eq(slot, &lock))
            && Arc::strong_count(&lock) == 2;
        if idle {
            locks.remove(&id);
        }
    }
}

#[async_trait]
impl AttendeeRepository for MemoryStore {
    async fn insert_attendee(&self, name: &str, email: &str) -> Result<Attendee, StoreError> {
        let mut tables = self.inner.tables.write().await;
        if tables.attendees.values().any(|a| a.email == email) {
            return Err(StoreError::Duplicate {
                constraint: ATTENDEE_EMAIL_CONSTRAINT.to_string(),
            });
        }

        let attendee = Attendee {
            id: self.inner.attendee_ids.next(),
            name: name.to_string(),
            email: email.to_string(),
        };
        tables.attendees.insert(attendee.id, attendee.clone());
        Ok(attendee)
    }

    async fn update_attendee(
        &self,
        id: i64,
        name: &str,
        email: &str,
    ) -> Result<Option<Attendee>, StoreError> {
        let mut tables = self.inner.tables.write().await;
        if !tables.attendees.contains_key(&id) {
            return Ok(None);
        }
        if tables.attendees.values().any(|a| a.email == email && a.id != id) {
            return Err(StoreError::Duplicate {
                constraint: ATTENDEE_EMAIL_CONSTRAINT.to_string(),
            });
        }

        let attendee = Attendee {
            id,
            name: name.to_string(),
            email: email.to_string(),
        };
        tables.attendees.insert(id, attendee.clone());
        Ok(Some(attendee))
    }

    async fn find_attendee(&self, id: i64) -> Result<Option<Attendee>, StoreError> {
        Ok(self.inner.tables.read().await.attendees.get(&id).cloned())
    }

    async fn find_attendee_by_email(&self, email: &str) -> Result<Option<Attendee>, StoreError> {
        let tables = self.inner.tables.read().await;
        Ok(tables.attendees.values().find(|a| a.email == email).cloned())
    }

    async fn list_attendees(&self) -> Result<Vec<Attendee>, StoreError> {
        Ok(self.inner.tables.read().await.attendees.values().cloned().collect())
    }
}

#[async_trait]
impl EventRepository for MemoryStore {
    async fn insert_event(&self, draft: &EventDraft) -> Result<Event, StoreError> {
        let event = Event::from_draft(self.inner.event_ids.next(), draft.clone());
        self.inner
            .tables
            .write()
            .await
            .events
            .insert(event.id, event.clone());
        Ok(event)
    }

    async fn find_event(&self, id: i64) -> Result<Option<Event>, StoreError> {
        Ok(self.inner.tables.read().await.events.get(&id).cloned())
    }

    async fn list_events(
        &self,
        filter: &EventFilter,
        page: &PageRequest,
    ) -> Result<(Vec<EventListing>, u64), StoreError> {
        let tables = self.inner.tables.read().await;

        let mut matches: Vec<&Event> = tables.events.values().filter(|e| filter.matches(e)).collect();
        matches.sort_by_key(|e| (e.starts_at, e.id));
        let total = matches.len() as u64;

        let mut booked: HashMap<i64, i64> = HashMap::new();
        for booking in tables.bookings.values() {
            *booked.entry(booking.event_id).or_default() += 1;
        }

        let offset = usize::try_from(page.offset()).unwrap_or(usize::MAX);
        let listings = matches
            .into_iter()
            .skip(offset)
            .take(page.limit as usize)
            .map(|event| EventListing {
                event: event.clone(),
                booked: booked.get(&event.id).copied().unwrap_or_default(),
            })
            .collect();

        Ok((listings, total))
    }

    async fn count_bookings(&self, event_id: i64) -> Result<i64, StoreError> {
        let tables = self.inner.tables.read().await;
        Ok(tables.bookings_for(event_id).count() as i64)
    }

    async fn lock_event(
        &self,
        id: i64,
        wait: Duration,
    ) -> Result<Option<Box<dyn EventGuard>>, StoreError> {
        let lock = self.event_lock(id).await;
        let permit = tokio::time::timeout(wait, lock.clone().lock_owned())
            .await
            .map_err(|_| StoreError::Busy)?;

        let event = self.inner.tables.read().await.events.get(&id).cloned();
        let Some(event) = event else {
            drop(permit);
            self.release_idle_lock(id, lock).await;
            return Ok(None);
        };

        Ok(Some(Box::new(MemoryEventGuard {
            store: self.clone(),
            event,
            staged: Vec::new(),
            deleted: false,
            _permit: permit,
        }) as Box<dyn EventGuard>))
    }
}

enum Staged {
    Booking(Booking),
    Event(Event),
    Delete,
}

/// Writes are staged on the guard and applied in one step on commit.
struct MemoryEventGuard {
    store: MemoryStore,
    event: Event,
    staged: Vec<Staged>,
    deleted: bool,
    _permit: OwnedMutexGuard<()>,
}

impl MemoryEventGuard {
    fn staged_bookings(&self) -> impl Iterator<Item = &Booking> {
        self.staged.iter().filter_map(|op| match op {
            Staged::Booking(b) => Some(b),
            _ => None,
        })
    }
}

#[async_trait]
impl EventGuard for MemoryEventGuard {
    fn event(&self) -> &Event {
        &self.event
    }

    async fn attendee_exists(&mut self, attendee_id: i64) -> Result<bool, StoreError> {
        let tables = self.store.inner.tables.read().await;
        Ok(tables.attendees.contains_key(&attendee_id))
    }

    async fn has_booking(&mut self, attendee_id: i64) -> Result<bool, StoreError> {
        if self.deleted {
            return Ok(false);
        }
        if self.staged_bookings().any(|b| b.attendee_id == attendee_id) {
            return Ok(true);
        }
        let tables = self.store.inner.tables.read().await;
        let found = tables
            .bookings_for(self.event.id)
            .any(|b| b.attendee_id == attendee_id);
        Ok(found)
    }

    async fn booked_count(&mut self) -> Result<i64, StoreError> {
        if self.deleted {
            return Ok(0);
        }
        let staged = self.staged_bookings().count();
        let tables = self.store.inner.tables.read().await;
        Ok((tables.bookings_for(self.event.id).count() + staged) as i64)
    }

    async fn insert_booking(
        &mut self,
        attendee_id: i64,
        created_at: DateTime<Utc>,
    ) -> Result<Booking, StoreError> {
        if self.deleted {
            return Err(StoreError::Database(format!("event {} was deleted", self.event.id)));
        }
        if self.has_booking(attendee_id).await? {
            return Err(StoreError::Duplicate {
                constraint: BOOKING_PAIR_CONSTRAINT.to_string(),
            });
        }

        let booking = Booking {
            id: self.store.inner.booking_ids.next(),
            event_id: self.event.id,
            attendee_id,
            created_at,
        };
        self.staged.push(Staged::Booking(booking.clone()));
        Ok(booking)
    }

    async fn save_event(&mut self, event: &Event) -> Result<(), StoreError> {
        self.event = Event { id: self.event.id, ..event.clone() };
        self.staged.push(Staged::Event(self.event.clone()));
        Ok(())
    }

    async fn delete_event(&mut self) -> Result<u64, StoreError> {
        let removed = self.booked_count().await?;
        self.deleted = true;
        self.staged.push(Staged::Delete);
        Ok(removed as u64)
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let guard = *self;
        let event_id = guard.event.id;
        let mut tables = guard.store.inner.tables.write().await;

        // Referential and uniqueness checks first, so a failed commit leaves no trace.
        for booking in guard.staged_bookings() {
            if !tables.attendees.contains_key(&booking.attendee_id) {
                return Err(StoreError::Database(format!(
                    "attendee {} does not exist",
                    booking.attendee_id
                )));
            }
            if tables
                .bookings_for(event_id)
                .any(|b| b.attendee_id == booking.attendee_id)
            {
                return Err(StoreError::Duplicate {
                    constraint: BOOKING_PAIR_CONSTRAINT.to_string(),
                });
            }
        }

        for op in guard.staged {
            match op {
                Staged::Booking(booking) => {
                    tables.bookings.insert(booking.id, booking);
                }
                Staged::Event(event) => {
                    tables.events.insert(event.id, event);
                }
                Staged::Delete => {
                    tables.events.remove(&event_id);
                    tables.bookings.retain(|_, b| b.event_id != event_id);
                }
            }
        }
        drop(tables);

        if guard.deleted {
            guard.store.inner.event_locks.lock().await.remove(&event_id);
            debug!("Released lock slot for deleted event {}", event_id);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const WAIT: Duration = Duration::from_millis(500);

    fn draft(capacity: i32) -> EventDraft {
        EventDraft {
            title: "Sample Event".to_string(),
            description: "Sample description".to_string(),
            location: "India".to_string(),
            capacity,
            starts_at: Utc.with_ymd_and_hms(2025, 6, 9, 10, 0, 0).unwrap(),
            ends_at: Utc.with_ymd_and_hms(2025, 6, 9, 12, 0, 0).unwrap(),
        }
    }

    #[tokio::test]
    async fn test_email_uniqueness_is_enforced() {
        let store = MemoryStore::new();
        let first = store.insert_attendee("A", "a@example.com").await.unwrap();
        let second = store.insert_attendee("B", "b@example.com").await.unwrap();

        let err = store.insert_attendee("C", "a@example.com").await.unwrap_err();
        assert!(matches!(err, StoreError::Duplicate { .. }));

        let err = store.update_attendee(second.id, "B", "a@example.com").await.unwrap_err();
        assert!(matches!(err, StoreError::Duplicate { .. }));

        // Keeping one's own email is fine.
        let updated = store.update_attendee(first.id, "A2", "a@example.com").await.unwrap();
        assert_eq!(updated.unwrap().name, "A2");
        assert!(store.update_attendee(99, "X", "x@example.com").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_dropped_guard_discards_staged_booking() {
        let store = MemoryStore::new();
        let event = store.insert_event(&draft(2)).await.unwrap();
        let attendee = store.insert_attendee("A", "a@example.com").await.unwrap();

        {
            let mut guard = store.lock_event(event.id, WAIT).await.unwrap().unwrap();
            guard.insert_booking(attendee.id, Utc::now()).await.unwrap();
            assert_eq!(guard.booked_count().await.unwrap(), 1);
        }

        assert_eq!(store.count_bookings(event.id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_delete_cascades_to_bookings() {
        let store = MemoryStore::new();
        let event = store.insert_event(&draft(2)).await.unwrap();
        let other = store.insert_event(&draft(2)).await.unwrap();
        let attendee = store.insert_attendee("A", "a@example.com").await.unwrap();

        for event_id in [event.id, other.id] {
            let mut guard = store.lock_event(event_id, WAIT).await.unwrap().unwrap();
            guard.insert_booking(attendee.id, Utc::now()).await.unwrap();
            guard.commit().await.unwrap();
        }

        let mut guard = store.lock_event(event.id, WAIT).await.unwrap().unwrap();
        assert_eq!(guard.delete_event().await.unwrap(), 1);
        guard.commit().await.unwrap();

        assert!(store.find_event(event.id).await.unwrap().is_none());
        assert_eq!(store.count_bookings(event.id).await.unwrap(), 0);
        assert_eq!(store.count_bookings(other.id).await.unwrap(), 1);
        assert!(store.lock_event(event.id, WAIT).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_lock_wait_is_bounded() {
        let store = MemoryStore::new();
        let event = store.insert_event(&draft(1)).await.unwrap();

        let _held = store.lock_event(event.id, WAIT).await.unwrap().unwrap();
        let result = store.lock_event(event.id, Duration::from_millis(20)).await;
        assert!(matches!(result, Err(StoreError::Busy)));
    }

    #[tokio::test]
    async fn test_missing_event_leaves_no_lock_slot() {
        let store = MemoryStore::new();
        let event = store.insert_event(&draft(1)).await.unwrap();

        for id in 1_000..11_000 {
            assert!(store.lock_event(id, WAIT).await.unwrap().is_none());
        }
        assert!(store.inner.event_locks.lock().await.is_empty());

        let guard = store.lock_event(event.id, WAIT).await.unwrap();
        assert!(guard.is_some());
        assert_eq!(store.inner.event_locks.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn test_missing_event_keeps_slot_while_contended() {
        let store = MemoryStore::new();
        let lock = store.event_lock(42).await;
        let held = lock.clone().lock_owned().await;

        let waiter = {
            let store = store.clone();
            tokio::spawn(async move { store.lock_event(42, WAIT).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        drop(held);

        assert!(waiter.await.unwrap().unwrap().is_none());
        // The test still holds a clone of the slot, so it must stay mapped.
        assert!(store.inner.event_locks.lock().await.contains_key(&42));
        drop(lock);

        assert!(store.lock_event(42, WAIT).await.unwrap().is_none());
        assert!(store.inner.event_locks.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_list_orders_by_start_then_id() {
        let store = MemoryStore::new();
        let mut late = draft(1);
        late.starts_at = Utc.with_ymd_and_hms(2025, 7, 1, 9, 0, 0).unwrap();
        late.ends_at = Utc.with_ymd_and_hms(2025, 7, 1, 10, 0, 0).unwrap();

        let a = store.insert_event(&late).await.unwrap();
        let b = store.insert_event(&draft(1)).await.unwrap();
        let c = store.insert_event(&draft(1)).await.unwrap();

        let page = PageRequest { page: 1, limit: 2 };
        let (data, total) = store.list_events(&EventFilter::default(), &page).await.unwrap();
        assert_eq!(total, 3);
        assert_eq!(data.iter().map(|l| l.event.id).collect::<Vec<_>>(), vec![b.id, c.id]);

        let page = PageRequest { page: 2, limit: 2 };
        let (data, _) = store.list_events(&EventFilter::default(), &page).await.unwrap();
        assert_eq!(data.iter().map(|l| l.event.id).collect::<Vec<_>>(), vec![a.id]);
    }
}
