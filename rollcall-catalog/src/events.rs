use std::sync::Arc;
use std::time::Duration;

use rollcall_core::validation::{event_patch, merge_event, new_event};
use rollcall_core::{
    CoreError, CoreResult, Event, EventFilter, EventListing, EventRepository, LocationWhitelist,
    Page, PageRequest, Pagination, Resource, ValidationErrors,
};
use serde_json::Value;
use tracing::{debug, info};

/// Event CRUD and listings.
///
/// Updates and deletes go through the same per-event lock as admission, so a capacity
/// change is never decided against a stale occupancy.
#[derive(Clone)]
pub struct EventCatalog {
    events: Arc<dyn EventRepository>,
    locations: Arc<LocationWhitelist>,
    pagination: Pagination,
    lock_wait: Duration,
}

impl EventCatalog {
    pub fn new(
        events: Arc<dyn EventRepository>,
        locations: LocationWhitelist,
        pagination: Pagination,
        lock_wait: Duration,
    ) -> Self {
        Self {
            events,
            locations: Arc::new(locations),
            pagination,
            lock_wait,
        }
    }

    pub async fn create(&self, payload: &Value) -> CoreResult<Event> {
        let draft = new_event(payload, &self.locations)?;
        let event = self.events.insert_event(&draft).await?;
        info!("Created event {} '{}' with capacity {}", event.id, event.title, event.capacity);
        Ok(event)
    }

    /// Partial update. Fields left out of `payload` keep their stored values and the
    /// merged record is validated as a whole.
    pub async fn update(&self, id: i64, payload: &Value) -> CoreResult<Event> {
        if self.events.find_event(id).await?.is_none() {
            return Err(CoreError::NotFound(Resource::Event));
        }
        let patch = event_patch(payload)?;

        let mut guard = self
            .events
            .lock_event(id, self.lock_wait)
            .await?
            .ok_or(CoreError::NotFound(Resource::Event))?;

        let merged = merge_event(guard.event(), &patch, &self.locations)?;
        if merged == *guard.event() {
            debug!("Event {} unchanged", id);
            return Ok(merged);
        }

        if merged.capacity != guard.event().capacity {
            let booked = guard.booked_count().await?;
            if i64::from(merged.capacity) < booked {
                return Err(ValidationErrors::single(
                    "capacity",
                    format!("Capacity cannot be lower than the {booked} existing bookings."),
                )
                .into());
            }
        }

        guard.save_event(&merged).await?;
        guard.commit().await?;

        info!("Updated event {}", id);
        Ok(merged)
    }

    /// Removes the event and its bookings together.
    pub async fn delete(&self, id: i64) -> CoreResult<()> {
        let mut guard = self
            .events
            .lock_event(id, self.lock_wait)
            .await?
            .ok_or(CoreError::NotFound(Resource::Event))?;

        let removed = guard.delete_event().await?;
        guard.commit().await?;

        info!("Deleted event {} along with {} bookings", id, removed);
        Ok(())
    }

    pub async fn list(
        &self,
        filter: &EventFilter,
        page: Option<i64>,
        limit: Option<i64>,
    ) -> CoreResult<Page<EventListing>> {
        let request = PageRequest::new(page, limit, &self.pagination);
        let (data, total) = self.events.list_events(filter, &request).await?;

        Ok(Page {
            page: request.page,
            limit: request.limit,
            total,
            data,
        })
    }

    pub async fn get(&self, id: i64) -> CoreResult<EventListing> {
        let event = self
            .events
            .find_event(id)
            .await?
            .ok_or(CoreError::NotFound(Resource::Event))?;
        let booked = self.events.count_bookings(id).await?;

        Ok(EventListing { event, booked })
    }

    /// Live occupancy, read straight from the store.
    pub async fn booked_count(&self, event_id: i64) -> CoreResult<i64> {
        Ok(self.events.count_bookings(event_id).await?)
    }
}
