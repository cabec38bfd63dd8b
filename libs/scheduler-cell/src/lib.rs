pub mod handlers;
pub mod models;
pub mod router;
pub mod services;

pub use models::*;
pub use router::scheduler_routes;
pub use services::{next_weekly_run, ReactivationScanner, ReminderScanner};
