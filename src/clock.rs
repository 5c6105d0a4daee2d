//! Wall-clock abstraction.
//!
//! Instants carry their UTC offset so calendar-date logic ("is this still
//! today?") uses the user's local date rather than UTC.

use chrono::{DateTime, Duration, FixedOffset, Local};
use std::sync::Mutex;

pub trait Clock: Send + Sync {
  /// Current instant, in the local offset.
  fn now(&self) -> DateTime<FixedOffset>;
}

/// The real system clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
  fn now(&self) -> DateTime<FixedOffset> {
    Local::now().fixed_offset()
  }
}

/// A clock that only moves when told to.
///
/// Backs the `--now` override and every time-dependent test.
#[derive(Debug)]
pub struct ManualClock {
  now: Mutex<DateTime<FixedOffset>>,
}

impl ManualClock {
  pub fn new(now: DateTime<FixedOffset>) -> Self {
    Self {
      now: Mutex::new(now),
    }
  }

  #[allow(dead_code)]
  pub fn set(&self, now: DateTime<FixedOffset>) {
    if let Ok(mut guard) = self.now.lock() {
      *guard = now;
    }
  }

  #[allow(dead_code)]
  pub fn advance(&self, by: Duration) {
    if let Ok(mut guard) = self.now.lock() {
      *guard += by;
    }
  }
}

impl Clock for ManualClock {
  fn now(&self) -> DateTime<FixedOffset> {
    match self.now.lock() {
      Ok(guard) => *guard,
      Err(poisoned) => *poisoned.into_inner(),
    }
  }
}

#[cfg(test)]
pub(crate) fn at(rfc3339: &str) -> DateTime<FixedOffset> {
  DateTime::parse_from_rfc3339(rfc3339).unwrap()
}
