use chrono::{DateTime, FixedOffset, Local, Utc};

/// Source of "now". Age calculations and the scheduler's hour check never
/// read the system time directly.
pub trait Clock: Send + Sync {
    /// Current instant in the local offset; the offset decides the sync hour.
    fn now(&self) -> DateTime<FixedOffset>;

    fn now_utc(&self) -> DateTime<Utc> {
        self.now().with_timezone(&Utc)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<FixedOffset> {
        Local::now().fixed_offset()
    }
}

/// Always returns the same instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<FixedOffset>);

impl FixedClock {
    pub fn utc(at: DateTime<Utc>) -> Self {
        Self(at.fixed_offset())
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<FixedOffset> {
        self.0
    }
}

const MILLIS_PER_DAY: i64 = 86_400_000;

/// Whole days elapsed between `then` and `now`, floored. Negative when
/// `then` lies in the future.
pub fn days_since(then: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (now - then).num_milliseconds().div_euclid(MILLIS_PER_DAY)
}
