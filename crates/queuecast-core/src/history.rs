//! The `HistoryStore` trait and the per-attraction sample accumulator.
//!
//! The trait is implemented by [`crate::memory::MemoryHistoryStore`] and by
//! `queuecast-store-sqlite`. Both reduce their storage to
//! [`crate::baseline::TierStats`] and share [`crate::baseline::resolve`], so
//! swapping backends does not change estimates.

use std::{
  collections::{BTreeMap, BTreeSet, VecDeque},
  future::Future,
};

use chrono::{DateTime, Duration, FixedOffset, Utc};
use serde::{Deserialize, Serialize};

use crate::{
  attraction::{AttractionState, RideStatus},
  baseline::{offset_from_minutes, BaselineResult, PoolStat, TierStats, TimeKeys},
  snapshot::LiveSnapshot,
};

/// Width of the ingestion de-duplication slot.
pub const SLOT_MINUTES: i64 = 5;

/// Recent points further than this behind the newest point are dropped.
pub const RECENT_WINDOW_MINUTES: i64 = 120;

/// The 5-minute slot an update time falls into.
pub fn slot_of(ts: DateTime<Utc>) -> i64 {
  ts.timestamp_millis().div_euclid(SLOT_MINUTES * 60 * 1000)
}

// ─── Limits ──────────────────────────────────────────────────────────────────

/// Pool bounds and retention, shared by both backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryLimits {
  pub history_weeks:      u32,
  pub max_bucket_samples: usize,
  pub max_hour_samples:   usize,
  pub max_global_samples: usize,
  pub max_recent_points:  usize,
  /// Park-local wall clock, minutes east of UTC. Used for every bucket and
  /// hour key.
  pub utc_offset_minutes: i32,
}

impl Default for HistoryLimits {
  fn default() -> Self {
    Self {
      history_weeks:      8,
      max_bucket_samples: 72,
      max_hour_samples:   256,
      max_global_samples: 512,
      max_recent_points:  48,
      utc_offset_minutes: -300,
    }
  }
}

impl HistoryLimits {
  pub fn offset(&self) -> FixedOffset { offset_from_minutes(self.utc_offset_minutes) }

  pub fn retention(&self) -> Duration { Duration::weeks(i64::from(self.history_weeks)) }
}

// ─── Samples ─────────────────────────────────────────────────────────────────

/// One raw observation kept for reliability and trend computation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecentPoint {
  pub ts:           DateTime<Utc>,
  pub wait_minutes: Option<u32>,
  pub status:       RideStatus,
}

/// Outcome of one [`HistoryStore::ingest`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestReport {
  /// Attractions that contributed a new sample.
  pub recorded: usize,
  /// Attractions already sampled in their current slot.
  pub skipped:  usize,
}

/// One operating wait and the update time it was observed at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolSample {
  pub ts:   DateTime<Utc>,
  pub wait: u32,
}

/// Insert in time order, then drop the oldest samples over `max`.
fn push_bounded(pool: &mut VecDeque<PoolSample>, sample: PoolSample, max: usize) {
  let at = pool.partition_point(|s| s.ts <= sample.ts);
  pool.insert(at, sample);
  while pool.len() > max {
    pool.pop_front();
  }
}

fn windowed(pool: &VecDeque<PoolSample>, since: DateTime<Utc>) -> Option<PoolStat> {
  PoolStat::of(pool.iter().filter(|s| s.ts >= since).map(|s| &s.wait))
}

/// Bounded sample pools and recent points for one (park, attraction).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttractionHistory {
  /// Keyed by [`TimeKeys::bucket_key`].
  #[serde(default)]
  pub buckets:    BTreeMap<String, VecDeque<PoolSample>>,
  /// Keyed by [`TimeKeys::hour_key`].
  #[serde(default)]
  pub hours:      BTreeMap<String, VecDeque<PoolSample>>,
  #[serde(default)]
  pub global:     VecDeque<PoolSample>,
  /// Ordered oldest first.
  #[serde(default)]
  pub recent:     VecDeque<RecentPoint>,
  /// Every slot sampled since the retention cutoff.
  #[serde(default)]
  pub seen_slots: BTreeSet<i64>,
}

impl AttractionHistory {
  /// `true` when the slot of `state` has already contributed a sample.
  pub fn already_sampled(&self, state: &AttractionState) -> bool {
    self.seen_slots.contains(&slot_of(state.source_updated_at))
  }

  /// Record one observation. Pools only take operating numeric waits; the
  /// recent window takes everything.
  pub fn record(&mut self, state: &AttractionState, limits: &HistoryLimits) {
    self.seen_slots.insert(slot_of(state.source_updated_at));

    if let Some(wait) = state.operating_wait() {
      let sample = PoolSample { ts: state.source_updated_at, wait };
      let keys = TimeKeys::at(state.source_updated_at, limits.offset());
      push_bounded(
        self.buckets.entry(keys.bucket_key()).or_default(),
        sample,
        limits.max_bucket_samples,
      );
      push_bounded(
        self.hours.entry(keys.hour_key()).or_default(),
        sample,
        limits.max_hour_samples,
      );
      push_bounded(&mut self.global, sample, limits.max_global_samples);
    }

    let point = RecentPoint {
      ts:           state.source_updated_at,
      wait_minutes: state.wait_minutes,
      status:       state.status,
    };
    let at = self.recent.partition_point(|p| p.ts <= point.ts);
    self.recent.insert(at, point);

    if let Some(newest) = self.recent.back().map(|p| p.ts) {
      let horizon = newest - Duration::minutes(RECENT_WINDOW_MINUTES);
      while self.recent.front().is_some_and(|p| p.ts < horizon) {
        self.recent.pop_front();
      }
    }
    while self.recent.len() > limits.max_recent_points {
      self.recent.pop_front();
    }
  }

  /// Drop everything observed before `cutoff`.
  pub fn prune(&mut self, cutoff: DateTime<Utc>) {
    while self.recent.front().is_some_and(|p| p.ts < cutoff) {
      self.recent.pop_front();
    }
    for pool in self.buckets.values_mut().chain(self.hours.values_mut()) {
      while pool.front().is_some_and(|s| s.ts < cutoff) {
        pool.pop_front();
      }
    }
    self.buckets.retain(|_, pool| !pool.is_empty());
    self.hours.retain(|_, pool| !pool.is_empty());
    while self.global.front().is_some_and(|s| s.ts < cutoff) {
      self.global.pop_front();
    }
    self.seen_slots = self.seen_slots.split_off(&slot_of(cutoff));
  }

  /// Pool statistics over samples observed at or after `since`.
  pub fn tier_stats(&self, keys: &TimeKeys, since: DateTime<Utc>) -> TierStats {
    TierStats {
      bucket: self.buckets.get(&keys.bucket_key()).and_then(|p| windowed(p, since)),
      hour:   self.hours.get(&keys.hour_key()).and_then(|p| windowed(p, since)),
      global: windowed(&self.global, since),
    }
  }

  pub fn recent_since(&self, since: DateTime<Utc>) -> Vec<RecentPoint> {
    self.recent.iter().filter(|p| p.ts >= since).copied().collect()
  }
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over a history backend.
///
/// Implementations must serialise ingestion per park and may run different
/// parks concurrently. All methods return `Send` futures so the trait can be
/// used behind `axum` handlers.
pub trait HistoryStore: Send + Sync + 'static {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Record one sample per attraction of an accepted snapshot. Attractions
  /// already sampled in the 5-minute slot of their `source_updated_at` are
  /// skipped.
  fn ingest(
    &self,
    snapshot: &LiveSnapshot,
  ) -> impl Future<Output = Result<IngestReport, Self::Error>> + Send;

  /// Typical wait for `attraction_id` at the park-local slot containing `at`.
  fn baseline(
    &self,
    park_id: &str,
    attraction_id: &str,
    at: DateTime<Utc>,
  ) -> impl Future<Output = Result<BaselineResult, Self::Error>> + Send;

  /// Recent observations at or after `since`, oldest first.
  fn recent_points(
    &self,
    park_id: &str,
    attraction_id: &str,
    since: DateTime<Utc>,
  ) -> impl Future<Output = Result<Vec<RecentPoint>, Self::Error>> + Send;
}
