use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::Mutex;

/// Source of the current instant.
///
/// Civil-day arithmetic happens in [`crate::config::GameConfig::timezone`];
/// clocks only ever hand out absolute instants.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually driven clock for tests.
#[derive(Debug)]
pub struct FixedClock(Mutex<DateTime<Utc>>);

#[cfg_attr(not(test), allow(dead_code))]
impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self(Mutex::new(now))
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.0.lock() = now;
    }

    pub fn advance(&self, delta: TimeDelta) {
        *self.0.lock() += delta;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.0.lock()
    }
}
