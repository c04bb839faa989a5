//! Calendar date/time conversions using O(1) algorithms
//!
//! Implements Howard Hinnant's civil_from_days and days_from_civil algorithms.
//! Reference: http://howardhinnant.github.io/date_algorithms.html
//!
//! These algorithms are used in C++20's `<chrono>` library and provide:
//! - O(1) time complexity (no year iteration)
//! - Correct handling of leap years
//! - Valid for all dates in the proleptic Gregorian calendar
//!
//! Boards convert [`DateTime`] to and from their RTC representation; the
//! signer and the local clock display format it directly.

const SECONDS_PER_DAY: u64 = 86400;

/// Broken-down UTC date and time, second precision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DateTime {
    pub year: u16,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
}

impl DateTime {
    /// Convert a Unix timestamp to a civil date and time
    ///
    /// Valid range: 1970-2105 (u16 year limit).
    pub fn from_unix(unix_secs: u64) -> Self {
        let days_since_epoch = (unix_secs / SECONDS_PER_DAY) as i32;
        let secs_today = unix_secs % SECONDS_PER_DAY;

        let (year, month, day) = civil_from_days(days_since_epoch);

        Self {
            year,
            month,
            day,
            hour: (secs_today / 3600) as u8,
            minute: ((secs_today % 3600) / 60) as u8,
            second: (secs_today % 60) as u8,
        }
    }

    /// Convert back to a Unix timestamp
    pub fn to_unix(&self) -> u64 {
        let days_since_epoch = days_from_civil(self.year, self.month, self.day);

        (days_since_epoch as u64) * SECONDS_PER_DAY
            + (self.hour as u64) * 3600
            + (self.minute as u64) * 60
            + (self.second as u64)
    }

    /// Day of week, 0 = Monday .. 6 = Sunday
    pub fn weekday(&self) -> u8 {
        let days = days_from_civil(self.year, self.month, self.day);
        // 1970-01-01 was a Thursday
        ((days + 3).rem_euclid(7)) as u8
    }
}

/// Check if year is a leap year (Gregorian calendar)
///
/// - Divisible by 4: leap year
/// - EXCEPT divisible by 100: not a leap year
/// - EXCEPT divisible by 400: leap year
pub fn is_leap_year(year: u16) -> bool {
    (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
}

/// Convert days since Unix epoch to civil date (year, month, day)
fn civil_from_days(days_since_epoch: i32) -> (u16, u8, u8) {
    // Shift epoch from 1970-01-01 to 0000-03-01 (March 1, year 0)
    // This makes the year start on March 1, placing leap day at end of year
    let z = days_since_epoch + 719468; // 719468 = days from 0000-03-01 to 1970-01-01

    let era = if z >= 0 { z } else { z - 146096 } / 146097;
    let doe = (z - era * 146097) as u32; // day of era [0, 146096]
    let yoe = (doe - doe / 1460 + doe / 36524 - doe / 146096) / 365; // [0, 399]
    let y = (yoe as i32) + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100); // [0, 365]
    let mp = (5 * doy + 2) / 153; // [0, 11], 0 = March

    let d = (doy - (153 * mp + 2) / 5 + 1) as u8;
    let m = if mp < 10 { mp + 3 } else { mp - 9 } as u8;
    let year = if m <= 2 { y + 1 } else { y };

    (year as u16, m, d)
}

/// Convert civil date (year, month, day) to days since Unix epoch
fn days_from_civil(year: u16, month: u8, day: u8) -> i32 {
    let y = year as i32;
    let m = month as i32;
    let d = day as i32;

    // March = month 0, February = month 11
    let (y, m) = if m <= 2 { (y - 1, m + 9) } else { (y, m - 3) };

    let era = if y >= 0 { y } else { y - 399 } / 400;
    let yoe = (y - era * 400) as u32;
    let doy = (153 * (m as u32) + 2) / 5 + (d as u32) - 1;
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;

    era * 146097 + (doe as i32) - 719468
}
