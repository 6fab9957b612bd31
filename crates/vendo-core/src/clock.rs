//! # Clock
//!
//! Expiry checks never call `Utc::now()` directly; they ask a [`Clock`].
//! Production wires [`SystemClock`], tests wire [`ManualClock`] and move
//! time explicitly.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use std::fmt::Debug;
use std::sync::RwLock;

/// Source of the current time.
pub trait Clock: Send + Sync + Debug {
    fn now(&self) -> DateTime<Utc>;

    /// Calendar date used for price-rule validity.
    fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
///
/// ```rust
/// use chrono::{Duration, TimeZone, Utc};
/// use vendo_core::{Clock, ManualClock};
///
/// let clock = ManualClock::new(Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap());
/// clock.advance(Duration::minutes(61));
/// assert_eq!(clock.now(), Utc.with_ymd_and_hms(2026, 1, 1, 13, 1, 0).unwrap());
/// ```
#[derive(Debug)]
pub struct ManualClock {
    now: RwLock<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        ManualClock {
            now: RwLock::new(start),
        }
    }

    pub fn set(&self, at: DateTime<Utc>) {
        let mut now = self.now.write().unwrap_or_else(|e| e.into_inner());
        *now = at;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.write().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.read().unwrap_or_else(|e| e.into_inner())
    }
}
