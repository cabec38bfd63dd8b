// libs/scheduler-cell/src/services/schedule.rs
use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveTime, TimeZone, Weekday};

/// Weekly reactivation slot: Monday 10:00 clinic time.
pub const REACTIVATION_WEEKDAY: Weekday = Weekday::Mon;

pub fn reactivation_time() -> NaiveTime {
    NaiveTime::from_hms_opt(10, 0, 0).unwrap_or(NaiveTime::MIN)
}

/// First `weekday` at `at` strictly after `now`, in `now`'s offset.
pub fn next_weekly_run(
    now: DateTime<FixedOffset>,
    weekday: Weekday,
    at: NaiveTime,
) -> DateTime<FixedOffset> {
    let today = now.date_naive();
    let days_ahead = (7 + weekday.num_days_from_monday() as i64
        - today.weekday().num_days_from_monday() as i64)
        % 7;

    let mut candidate = (today + Duration::days(days_ahead)).and_time(at);
    if candidate <= now.naive_local() {
        candidate += Duration::days(7);
    }

    // Fixed offsets have no gaps, so local times map to a single instant.
    now.offset()
        .from_local_datetime(&candidate)
        .single()
        .unwrap_or(now + Duration::days(7))
}
