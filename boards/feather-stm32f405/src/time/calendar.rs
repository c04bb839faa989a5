//! Conversions between Unix time and the embassy RTC `DateTime`
//!
//! The calendar math itself lives in `weather_core::calendar`.
#![deny(unsafe_code)]
#![deny(warnings)]

use embassy_stm32::rtc::{DateTime, DayOfWeek};
use weather_core::calendar;

/// Convert Unix timestamp to RTC DateTime
///
/// `None` outside the RTC's range (years 1970-2099).
pub fn unix_to_datetime(unix_secs: u64) -> Option<DateTime> {
    let dt = calendar::DateTime::from_unix(unix_secs);
    let day_of_week = match dt.weekday() {
        0 => DayOfWeek::Monday,
        1 => DayOfWeek::Tuesday,
        2 => DayOfWeek::Wednesday,
        3 => DayOfWeek::Thursday,
        4 => DayOfWeek::Friday,
        5 => DayOfWeek::Saturday,
        _ => DayOfWeek::Sunday,
    };

    DateTime::from(
        dt.year,
        dt.month,
        dt.day,
        day_of_week,
        dt.hour,
        dt.minute,
        dt.second,
        0, // microsecond
    )
    .ok()
}

/// Convert RTC DateTime to Unix timestamp
pub fn datetime_to_unix(dt: &DateTime) -> u64 {
    calendar::DateTime {
        year: dt.year(),
        month: dt.month(),
        day: dt.day(),
        hour: dt.hour(),
        minute: dt.minute(),
        second: dt.second(),
    }
    .to_unix()
}
