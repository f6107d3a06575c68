use std::sync::Arc;

use rollcall_booking::AdmissionController;
use rollcall_catalog::{AttendeeRegistry, EventCatalog};
use rollcall_core::{AttendeeRepository, EventRepository};
use rollcall_store::app_config::Config;
use rollcall_store::MemoryStore;

use crate::metrics::AdmissionMetrics;

#[derive(Clone)]
pub struct AppState {
    pub attendees: AttendeeRegistry,
    pub events: EventCatalog,
    pub admission: AdmissionController,
    pub metrics: Arc<AdmissionMetrics>,
}

impl AppState {
    /// Wires the services over a pair of repositories.
    pub fn new(
        attendees: Arc<dyn AttendeeRepository>,
        events: Arc<dyn EventRepository>,
        config: &Config,
    ) -> Result<Self, prometheus::Error> {
        let lock_wait = config.booking.lock_wait();

        Ok(Self {
            attendees: AttendeeRegistry::new(attendees),
            events: EventCatalog::new(
                events.clone(),
                config.location_whitelist(),
                config.pagination,
                lock_wait,
            ),
            admission: AdmissionController::new(events, lock_wait),
            metrics: Arc::new(AdmissionMetrics::new()?),
        })
    }

    pub fn in_memory(config: &Config) -> Result<Self, prometheus::Error> {
        let store = MemoryStore::new();
        Self::new(Arc::new(store.clone()), Arc::new(store), config)
    }
}
