//! Injectable wall clock.
//!
//! Every component that compares against "now" takes a [`Clock`], so cache
//! expiry, cooldowns and lookback windows can be driven by tests.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;

/// Function returning the current instant.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// The real clock.
pub fn system_clock() -> Clock { Arc::new(Utc::now) }

/// A clock that only moves when told to.
#[derive(Clone)]
pub struct ManualClock {
  now: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
  pub fn new(start: DateTime<Utc>) -> Self {
    Self { now: Arc::new(Mutex::new(start)) }
  }

  pub fn now(&self) -> DateTime<Utc> { *self.now.lock() }

  pub fn set(&self, at: DateTime<Utc>) { *self.now.lock() = at; }

  pub fn advance(&self, by: Duration) {
    let mut now = self.now.lock();
    *now += by;
  }

  /// A [`Clock`] that reads this manual clock.
  pub fn clock(&self) -> Clock {
    let now = self.now.clone();
    Arc::new(move || *now.lock())
  }
}
