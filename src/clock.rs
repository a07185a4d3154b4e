//! Wall-clock access in the kitchen's local time zone.

use chrono::{DateTime, Duration, FixedOffset, Local, NaiveTime, Utc};

pub trait Clock: Send + Sync + 'static {
    /// Current local time, carrying the offset used for same-day comparisons.
    fn now(&self) -> DateTime<FixedOffset>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<FixedOffset> {
        Local::now().fixed_offset()
    }
}

/// Local midnight of `now`'s calendar day, as a UTC instant.
pub fn start_of_day(now: DateTime<FixedOffset>) -> DateTime<Utc> {
    let midnight = now.date_naive().and_time(NaiveTime::MIN);
    let offset = Duration::seconds(i64::from(now.offset().local_minus_utc()));
    DateTime::<Utc>::from_naive_utc_and_offset(midnight - offset, Utc)
}

#[cfg(test)]
pub use fixed::FixedClock;


#[cfg(test)]
pub use fixed::local as local_time;
