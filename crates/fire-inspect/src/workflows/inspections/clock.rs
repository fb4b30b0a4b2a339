use chrono::{DateTime, FixedOffset, NaiveDate, Utc};

use super::schedule::schedule_offset;

/// Source of "now" in the scheduling offset.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<FixedOffset>;

    fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<FixedOffset> {
        Utc::now().with_timezone(&schedule_offset())
    }
}

/// A clock frozen at one instant, for demos and tests.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(DateTime<FixedOffset>);

impl FixedClock {
    pub fn new(now: DateTime<FixedOffset>) -> Self {
        Self(now.with_timezone(&schedule_offset()))
    }

    /// Eight in the morning of `date`, local time.
    pub fn on(date: NaiveDate) -> Self {
        Self(super::schedule::start_of_day(date) + chrono::Duration::hours(8))
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<FixedOffset> {
        self.0
    }
}
