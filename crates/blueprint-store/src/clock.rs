//! Injectable clock.
//!
//! The events engine compares event timestamps against "now" to decide the
//! backlog window, so the notion of "now" has to be
//! swappable in tests rather than calling `Utc::now()` inline.

use chrono::{DateTime, Utc};

/// Source of "now" for the container. Swappable so stream/backlog-window
/// tests don't race a wall clock.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// The default clock, backed by the system wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use std::sync::atomic::{AtomicI64, Ordering};

    /// A clock whose `now()` is set explicitly by the test.
    pub struct FixedClock(AtomicI64);

    impl FixedClock {
        pub fn new(at: DateTime<Utc>) -> Self {
            Self(AtomicI64::new(at.timestamp_millis()))
        }

        pub fn set(&self, at: DateTime<Utc>) {
            self.0.store(at.timestamp_millis(), Ordering::SeqCst);
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            DateTime::from_timestamp_millis(self.0.load(Ordering::SeqCst))
                .expect("valid fixed-clock timestamp")
        }
    }
}
