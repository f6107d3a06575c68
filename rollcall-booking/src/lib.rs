pub mod admission;
pub mod request;

pub use admission::AdmissionController;
pub use request::BookingRequest;
