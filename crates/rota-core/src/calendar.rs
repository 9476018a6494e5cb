//! Calendar arithmetic shared by the resolver and the command layer.
//!
//! Everything here is a pure function of its arguments. Weeks are aligned to a
//! configurable first weekday, Monday unless the caller says otherwise.

use chrono::{Datelike, Duration, NaiveDate, Weekday};

pub const DEFAULT_WEEK_START: Weekday = Weekday::Mon;

/// First day of the 7-day period containing `date`. Saturates at
/// `NaiveDate::MIN` when that week starts before the representable range.
#[must_use]
pub fn week_start_of(date: NaiveDate, week_start: Weekday) -> NaiveDate {
    let back = date.weekday().days_since(week_start);
    shift_days(date, -i64::from(back)).unwrap_or(NaiveDate::MIN)
}

/// `date` moved by `days`, or `None` when the result is not representable.
#[must_use]
pub fn shift_days(date: NaiveDate, days: i64) -> Option<NaiveDate> {
    Duration::try_days(days).and_then(|delta| date.checked_add_signed(delta))
}

/// Whole weeks between the week containing `reference` and the week
/// containing `target`. Negative when `target` falls in an earlier week.
#[must_use]
pub fn weeks_between(reference: NaiveDate, target: NaiveDate, week_start: Weekday) -> i64 {
    let from = week_start_of(reference, week_start);
    let to = week_start_of(target, week_start);
    // both ends are aligned, so the division is exact
    (to - from).num_days() / 7
}

/// Date of `day_of_week` within the seven days starting at `week_start_date`.
/// Saturates at `NaiveDate::MAX`.
#[must_use]
pub fn date_for_day_in_week(week_start_date: NaiveDate, day_of_week: Weekday) -> NaiveDate {
    let ahead = day_of_week.days_since(week_start_date.weekday());
    shift_days(week_start_date, i64::from(ahead)).unwrap_or(NaiveDate::MAX)
}

/// Inclusive containment. A missing bound leaves that side open.
#[must_use]
pub fn is_within(date: NaiveDate, range_start: Option<NaiveDate>, range_end: Option<NaiveDate>) -> bool {
    range_start.is_none_or(|start| start <= date) && range_end.is_none_or(|end| date <= end)
}

/// 1-based weekday number, Monday = 1 through Sunday = 7.
#[must_use]
pub fn day_number(day: Weekday) -> u32 {
    day.number_from_monday()
}

pub fn weekday_from_number(number: u32) -> Option<Weekday> {
    match number {
        1 => Some(Weekday::Mon),
        2 => Some(Weekday::Tue),
        3 => Some(Weekday::Wed),
        4 => Some(Weekday::Thu),
        5 => Some(Weekday::Fri),
        6 => Some(Weekday::Sat),
        7 => Some(Weekday::Sun),
        _ => None,
    }
}

/// Three-letter label used in tables and display-group rows.
pub fn short_day_name(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "Mon",
        Weekday::Tue => "Tue",
        Weekday::Wed => "Wed",
        Weekday::Thu => "Thu",
        Weekday::Fri => "Fri",
        Weekday::Sat => "Sat",
        Weekday::Sun => "Sun",
    }
}
