//! Booking policy: the date window, hospital operating hours, and the
//! optional weekend-closure rule. Kept as data so a deployment can loosen
//! the rules without touching the conflict engine.

use crate::error::BookingError;
use chrono::{Datelike, Duration, NaiveDate, NaiveTime, Weekday};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookingPolicy {
    /// Bookings are accepted from today up to this many days ahead.
    pub window_days: i64,
    /// Earliest acceptable booking time.
    pub opening_time: NaiveTime,
    /// Latest acceptable booking time (inclusive).
    pub closing_time: NaiveTime,
    /// Reject Saturday and Sunday dates when set.
    pub closed_on_weekends: bool,
    /// Granularity of the availability bookkeeping grid.
    pub slot_minutes: u32,
}

impl Default for BookingPolicy {
    fn default() -> Self {
        BookingPolicy {
            window_days: 30,
            opening_time: NaiveTime::from_hms_opt(8, 0, 0).expect("valid opening time"),
            closing_time: NaiveTime::from_hms_opt(17, 0, 0).expect("valid closing time"),
            closed_on_weekends: true,
            slot_minutes: 30,
        }
    }
}

impl BookingPolicy {
    /// A policy that books on any day of the week; the window and hours are
    /// unchanged.
    pub fn open_all_week() -> Self {
        BookingPolicy {
            closed_on_weekends: false,
            ..BookingPolicy::default()
        }
    }

    pub fn latest_date(&self, today: NaiveDate) -> NaiveDate {
        today + Duration::days(self.window_days)
    }

    /// The date must fall inside `[today, today + window_days]` and, when
    /// the weekend rule is on, on a weekday.
    pub fn check_date(&self, date: NaiveDate, today: NaiveDate) -> Result<(), BookingError> {
        if date < today {
            return Err(BookingError::InvalidDateRange {
                date,
                reason: "the date is in the past".into(),
            });
        }
        let latest = self.latest_date(today);
        if date > latest {
            return Err(BookingError::InvalidDateRange {
                date,
                reason: format!("bookings are open only through {latest}"),
            });
        }
        if self.closed_on_weekends && matches!(date.weekday(), Weekday::Sat | Weekday::Sun) {
            return Err(BookingError::InvalidDateRange {
                date,
                reason: "hospitals are closed on weekends".into(),
            });
        }
        Ok(())
    }

    /// The time must fall inside operating hours, inclusive at both ends.
    pub fn check_time(&self, time: NaiveTime) -> Result<(), BookingError> {
        if time < self.opening_time || time > self.closing_time {
            return Err(BookingError::InvalidTimeRange {
                time,
                open: self.opening_time,
                close: self.closing_time,
            });
        }
        Ok(())
    }
}
