use chrono::{DateTime, FixedOffset, NaiveDate, Timelike, Utc};
use std::collections::{BTreeMap, HashMap};

use super::OrderId;

/// Same-day order histogram: one counter per local hour.
///
/// The buckets belong to a single calendar day. Recording against a later
/// day starts the histogram over from zero. Each order id is counted at most
/// once, so repeated or replayed deliveries leave the counts alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HourlyActivity {
    day: NaiveDate,
    counts: [u32; 24],
    /// Hour bucket of every order currently counted.
    counted: HashMap<OrderId, usize>,
}

impl HourlyActivity {
    pub fn empty(now: DateTime<FixedOffset>) -> Self {
        Self {
            day: now.date_naive(),
            counts: [0; 24],
            counted: HashMap::new(),
        }
    }

    /// Rebuilds the buckets from scratch, ignoring instants outside `now`'s day.
    pub fn rebuild<I>(created: I, now: DateTime<FixedOffset>) -> Self
    where
        I: IntoIterator<Item = (OrderId, DateTime<Utc>)>,
    {
        let mut activity = Self::empty(now);
        for (id, at) in created {
            activity.count_new(id, at, now.offset());
        }
        activity
    }

    /// Counts the order `id` created at `at`. Returns false when `at` is not
    /// today or the order is already counted.
    pub fn record_created(&mut self, id: &str, at: DateTime<Utc>, now: DateTime<FixedOffset>) -> bool {
        self.roll_over(now);
        if self.counted.contains_key(id) {
            return false;
        }
        self.count_new(id.to_string(), at, now.offset())
    }

    /// Uncounts the order `id`. Returns false when it was not counted.
    pub fn record_removed(&mut self, id: &str, now: DateTime<FixedOffset>) -> bool {
        self.roll_over(now);
        match self.counted.remove(id) {
            Some(hour) => {
                self.counts[hour] = self.counts[hour].saturating_sub(1);
                true
            }
            None => false,
        }
    }

    pub fn is_counted(&self, id: &str) -> bool {
        self.counted.contains_key(id)
    }

    pub fn day(&self) -> NaiveDate {
        self.day
    }

    pub fn count(&self, hour: usize) -> u32 {
        self.counts.get(hour).copied().unwrap_or(0)
    }

    pub fn total(&self) -> u32 {
        self.counts.iter().sum()
    }

    /// All 24 buckets in hour order, labelled `"00:00"` .. `"23:00"`.
    pub fn series(&self) -> Vec<(String, u32)> {
        self.counts
            .iter()
            .enumerate()
            .map(|(hour, count)| (hour_label(hour), *count))
            .collect()
    }

    pub fn non_zero(&self) -> BTreeMap<String, u32> {
        self.series().into_iter().filter(|(_, count)| *count > 0).collect()
    }

    fn count_new(&mut self, id: OrderId, at: DateTime<Utc>, offset: &FixedOffset) -> bool {
        if self.counted.contains_key(&id) {
            return false;
        }
        let local = at.with_timezone(offset);
        if local.date_naive() != self.day {
            return false;
        }
        let hour = local.hour() as usize;
        self.counts[hour] += 1;
        self.counted.insert(id, hour);
        true
    }

    fn roll_over(&mut self, now: DateTime<FixedOffset>) {
        if now.date_naive() != self.day {
            self.day = now.date_naive();
            self.counts = [0; 24];
            self.counted.clear();
        }
    }
}

pub fn hour_label(hour: usize) -> String {
    format!("{:02}:00", hour)
}
