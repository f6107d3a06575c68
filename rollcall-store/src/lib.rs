pub mod app_config;
pub mod database;
pub mod attendee_repo;
pub mod event_repo;
pub mod booking_repo;
pub mod memory;

pub use database::DbClient;
pub use attendee_repo::StoreAttendeeRepository;
pub use event_repo::StoreEventRepository;
pub use booking_repo::PgEventGuard;
pub use memory::MemoryStore;
