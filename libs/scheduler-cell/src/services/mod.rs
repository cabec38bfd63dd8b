pub mod campaigns;
pub mod reactivation_scanner;
pub mod reminder_scanner;
pub mod schedule;

pub use campaigns::{CampaignLog, SupabaseCampaignLog};
pub use reactivation_scanner::ReactivationScanner;
pub use reminder_scanner::ReminderScanner;
pub use schedule::{next_weekly_run, reactivation_time, REACTIVATION_WEEKDAY};
