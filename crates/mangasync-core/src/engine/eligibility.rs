//! Refresh eligibility rules
//!
//! Pure functions over an item snapshot and the current local time. Nothing
//! here performs I/O, so the gate is always evaluated before any network call.

use crate::model::Item;
use chrono::{DateTime, Datelike, Weekday};
use chrono_tz::Tz;

/// Full English name of a weekday, as stored in release schedules
pub fn weekday_name(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "Monday",
        Weekday::Tue => "Tuesday",
        Weekday::Wed => "Wednesday",
        Weekday::Thu => "Thursday",
        Weekday::Fri => "Friday",
        Weekday::Sat => "Saturday",
        Weekday::Sun => "Sunday",
    }
}

/// Whether the item's release schedule allows a check at `now`
///
/// An empty schedule is always due. A weekday schedule is due on that local
/// weekday, and also whenever the item has never been checked.
pub fn is_schedule_due(item: &Item, now: &DateTime<Tz>) -> bool {
    let schedule = match item.release_schedule.as_deref().map(str::trim) {
        None | Some("") => return true,
        Some(schedule) => schedule,
    };

    if item.latest_release_updated_at.is_none() {
        return true;
    }

    schedule.eq_ignore_ascii_case(weekday_name(now.weekday()))
}

/// Whether the item is refreshed in this run: schedule-due and not terminal
pub fn is_eligible(item: &Item, now: &DateTime<Tz>) -> bool {
    !item.is_terminal() && is_schedule_due(item, now)
}

/// Whether the item's latest release was last confirmed on `now`'s local date
pub fn confirmed_today(item: &Item, now: &DateTime<Tz>) -> bool {
    item.latest_release_updated_at
        .map(|confirmed| confirmed.with_timezone(&now.timezone()).date_naive() == now.date_naive())
        .unwrap_or(false)
}
