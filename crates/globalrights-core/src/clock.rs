//! Time source injected into stores and services.

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, Duration, Utc};

/// Supplies "now" for expiry comparisons.
pub trait Clock: Send + Sync {
  fn now(&self) -> DateTime<Utc>;
}

/// The wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
  fn now(&self) -> DateTime<Utc> { Utc::now() }
}

/// A clock that only moves when told to. Millisecond resolution.
#[derive(Debug)]
pub struct ManualClock {
  millis: AtomicI64,
}

impl ManualClock {
  pub fn new(start: DateTime<Utc>) -> Self {
    Self { millis: AtomicI64::new(start.timestamp_millis()) }
  }

  pub fn set(&self, to: DateTime<Utc>) {
    self.millis.store(to.timestamp_millis(), Ordering::SeqCst);
  }

  pub fn advance(&self, by: Duration) {
    self.millis.fetch_add(by.num_milliseconds(), Ordering::SeqCst);
  }
}

impl Clock for ManualClock {
  fn now(&self) -> DateTime<Utc> {
    let millis = self.millis.load(Ordering::SeqCst);
    DateTime::from_timestamp_millis(millis).unwrap_or_default()
  }
}
