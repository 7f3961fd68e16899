//! Keys for the forecast views.
//!
//! Absolute labels come from the period's calendar time in its own UTC offset;
//! relative labels count from "now" or from the start of the period list.
//! Every label returned here is already a valid element name.

use chrono::{DateTime, FixedOffset, Timelike, Utc};

use crate::xml::sanitize;

/// Local hours in `[DAY_START_HOUR, DAY_END_HOUR)` count as day.
pub const DAY_START_HOUR: u32 = 6;
pub const DAY_END_HOUR: u32 = 18;

fn date_part(time: &DateTime<FixedOffset>) -> String {
    time.format("%b %-d %Y").to_string()
}

/// `Jan_5_2025_7_PM`
pub fn absolute_hourly_label(time: &DateTime<FixedOffset>) -> String {
    sanitize(&format!("{} {}", date_part(time), time.format("%-I %p")))
}

/// `Jan_5_2025_Day` / `Jan_5_2025_Night`
pub fn absolute_day_night_label(time: &DateTime<FixedOffset>) -> String {
    let hour = time.hour();
    let part = if (DAY_START_HOUR..DAY_END_HOUR).contains(&hour) {
        "Day"
    } else {
        "Night"
    };
    sanitize(&format!("{} {}", date_part(time), part))
}

/// `Jan_5_2025`
pub fn absolute_daily_label(time: &DateTime<FixedOffset>) -> String {
    sanitize(&date_part(time))
}

/// `Now` for periods that already started, otherwise whole hours until the start.
pub fn relative_hourly_label(time: &DateTime<FixedOffset>, now: DateTime<Utc>) -> String {
    let until = time.with_timezone(&Utc) - now;
    if until <= chrono::Duration::zero() {
        return "Now".to_string();
    }
    sanitize(&format!("{}Hrs", until.num_hours()))
}

/// Hands out `Day1, Day2, ...` and `Night1, Night2, ...` in period order.
///
/// A night that comes before any day gets no label.
#[derive(Debug, Default)]
pub struct DayNightCounter {
    days: u32,
    nights: u32,
}

impl DayNightCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&mut self, is_daytime: bool) -> Option<String> {
        if is_daytime {
            self.days += 1;
            Some(format!("Day{}", self.days))
        } else if self.days == 0 {
            None
        } else {
            self.nights += 1;
            Some(format!("Night{}", self.nights))
        }
    }
}
