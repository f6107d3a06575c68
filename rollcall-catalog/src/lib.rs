pub mod attendees;
pub mod events;

pub use attendees::AttendeeRegistry;
pub use events::EventCatalog;
