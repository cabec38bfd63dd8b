pub mod appointment;
pub mod lifecycle;
pub mod store;

pub use appointment::AppointmentService;
pub use lifecycle::AppointmentLifecycleService;
pub use store::{AppointmentStore, SupabaseAppointmentStore};
