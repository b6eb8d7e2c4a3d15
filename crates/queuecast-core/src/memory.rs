//! [`MemoryHistoryStore`], the in-process implementation of [`HistoryStore`].
//!
//! Each park has its own lock, so ingestion for one park never waits on
//! another. Optionally the whole store is flushed to a JSON file on a
//! debounce timer and reloaded on startup.

use std::{
  collections::{BTreeMap, HashMap},
  path::PathBuf,
  sync::Arc,
  time::Duration,
};

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::{
  baseline::{resolve, BaselineResult, TimeKeys},
  clock::Clock,
  history::{AttractionHistory, HistoryLimits, HistoryStore, IngestReport, RecentPoint},
  persist::{self, FlushQueue, PersistedHistory, HISTORY_FILE_VERSION},
  snapshot::LiveSnapshot,
  Error, Result,
};

type ParkHistory = BTreeMap<String, AttractionHistory>;

struct Inner {
  parks:  RwLock<HashMap<String, Arc<Mutex<ParkHistory>>>>,
  limits: HistoryLimits,
  clock:  Clock,
  path:   Option<PathBuf>,
}

impl Inner {
  fn park(&self, park_id: &str) -> Arc<Mutex<ParkHistory>> {
    if let Some(park) = self.parks.read().get(park_id) {
      return park.clone();
    }
    self
      .parks
      .write()
      .entry(park_id.to_owned())
      .or_default()
      .clone()
  }

  fn existing_park(&self, park_id: &str) -> Option<Arc<Mutex<ParkHistory>>> {
    self.parks.read().get(park_id).cloned()
  }

  fn ingest(&self, snapshot: &LiveSnapshot) -> IngestReport {
    let cutoff = (self.clock)() - self.limits.retention();
    let park = self.park(&snapshot.park_id);
    let mut park = park.lock();

    let mut report = IngestReport::default();
    for state in &snapshot.attractions {
      let history = park.entry(state.attraction_id.clone()).or_default();
      if history.already_sampled(state) {
        report.skipped += 1;
        continue;
      }
      history.record(state, &self.limits);
      history.prune(cutoff);
      report.recorded += 1;
    }
    report
  }

  fn export(&self) -> PersistedHistory {
    let parks = self
      .parks
      .read()
      .iter()
      .map(|(id, park)| (id.clone(), park.lock().clone()))
      .collect();
    PersistedHistory {
      version: HISTORY_FILE_VERSION,
      updated_at: Some((self.clock)()),
      parks,
    }
  }

  fn restore(&self, saved: PersistedHistory) {
    let mut parks = self.parks.write();
    for (park_id, attractions) in saved.parks {
      parks.insert(park_id, Arc::new(Mutex::new(attractions)));
    }
  }

  async fn flush(&self) -> Result<bool> {
    let Some(path) = &self.path else {
      return Ok(false);
    };
    let snapshot = self.export();
    persist::write_snapshot(path, &snapshot).await?;
    debug!(path = %path.display(), parks = snapshot.parks.len(), "history flushed");
    Ok(true)
  }
}

// ─── Store ───────────────────────────────────────────────────────────────────

/// In-process bounded-buffer history.
pub struct MemoryHistoryStore {
  inner:   Arc<Inner>,
  flusher: Option<FlushQueue>,
}

impl MemoryHistoryStore {
  /// An ephemeral store.
  pub fn new(limits: HistoryLimits, clock: Clock) -> Self {
    Self {
      inner:   Arc::new(Inner {
        parks: RwLock::new(HashMap::new()),
        limits,
        clock,
        path: None,
      }),
      flusher: None,
    }
  }

  /// A store backed by the file at `path`.
  ///
  /// Existing history is loaded if present; an unreadable file is logged and
  /// ignored. Ingestion then schedules a write at most once per `debounce`.
  /// Must be called from within a Tokio runtime.
  pub fn with_persistence(
    limits: HistoryLimits,
    clock: Clock,
    path: impl Into<PathBuf>,
    debounce: Duration,
  ) -> Self {
    let path = path.into();
    let inner = Arc::new(Inner {
      parks: RwLock::new(HashMap::new()),
      limits,
      clock,
      path: Some(path.clone()),
    });

    match persist::load_snapshot(&path) {
      Ok(Some(saved)) => {
        info!(path = %path.display(), parks = saved.parks.len(), "history restored");
        inner.restore(saved);
      }
      Ok(None) => {}
      Err(e) => warn!(path = %path.display(), error = %e, "ignoring unreadable history file"),
    }

    let weak = Arc::downgrade(&inner);
    let flusher = persist::spawn_flusher(debounce, move || {
      let weak = weak.clone();
      async move {
        let Some(inner) = weak.upgrade() else {
          return false;
        };
        if let Err(e) = inner.flush().await {
          warn!(error = %e, "history flush failed");
        }
        true
      }
    });

    Self { inner, flusher: Some(flusher) }
  }

  pub fn limits(&self) -> &HistoryLimits { &self.inner.limits }

  /// Write the store to its file now. Returns `false` when the store has no
  /// file.
  pub async fn flush(&self) -> Result<bool> { self.inner.flush().await }

  /// Copy of every park's history in the on-disk format.
  pub fn export(&self) -> PersistedHistory { self.inner.export() }

  /// Replace the history of every park present in `saved`.
  pub fn restore(&self, saved: PersistedHistory) -> Result<()> {
    if saved.version != HISTORY_FILE_VERSION {
      return Err(Error::UnsupportedVersion(saved.version));
    }
    self.inner.restore(saved);
    Ok(())
  }
}

impl HistoryStore for MemoryHistoryStore {
  type Error = Error;

  async fn ingest(&self, snapshot: &LiveSnapshot) -> Result<IngestReport> {
    let report = self.inner.ingest(snapshot);
    if report.recorded > 0 {
      if let Some(flusher) = &self.flusher {
        flusher.request();
      }
    }
    Ok(report)
  }

  async fn baseline(
    &self,
    park_id: &str,
    attraction_id: &str,
    at: DateTime<Utc>,
  ) -> Result<BaselineResult> {
    let keys = TimeKeys::at(at, self.inner.limits.offset());
    let since = (self.inner.clock)() - self.inner.limits.retention();
    let Some(park) = self.inner.existing_park(park_id) else {
      return Ok(BaselineResult::fallback());
    };
    let park = park.lock();
    Ok(
      park
        .get(attraction_id)
        .map(|h| resolve(&h.tier_stats(&keys, since)))
        .unwrap_or_else(BaselineResult::fallback),
    )
  }

  async fn recent_points(
    &self,
    park_id: &str,
    attraction_id: &str,
    since: DateTime<Utc>,
  ) -> Result<Vec<RecentPoint>> {
    let Some(park) = self.inner.existing_park(park_id) else {
      return Ok(Vec::new());
    };
    let park = park.lock();
    Ok(
      park
        .get(attraction_id)
        .map(|h| h.recent_since(since))
        .unwrap_or_default(),
    )
  }
}

#[cfg(test)]
mod tests {
  use chrono::{Duration as ChronoDuration, TimeZone};

  use super::*;
  use crate::{
    attraction::{AttractionState, QueueKind, RideStatus},
    baseline::{BaselineSource, Confidence},
    catalog::ParkCatalog,
    clock::ManualClock,
  };

  fn start() -> DateTime<Utc> { Utc.with_ymd_and_hms(2026, 5, 6, 16, 0, 0).unwrap() }

  fn snapshot(at: DateTime<Utc>, waits: &[(&str, RideStatus, Option<u32>)]) -> LiveSnapshot {
    let park = ParkCatalog::orlando().get("disney-magic-kingdom").cloned().unwrap();
    let attractions = waits
      .iter()
      .map(|(id, status, wait)| AttractionState {
        park_id:           park.id.clone(),
        attraction_id:     (*id).to_owned(),
        name:              (*id).to_owned(),
        land:              None,
        status:            *status,
        wait_minutes:      *wait,
        queue_kind:        QueueKind::Standby,
        source_updated_at: at,
        ingested_at:       at,
        provider:          "test".into(),
      })
      .collect();
    LiveSnapshot::assemble(&park, "test", attractions, 10_800, at).unwrap()
  }

  #[tokio::test]
  async fn ingest_is_idempotent_within_a_slot() {
    let clock = ManualClock::new(start());
    let store = MemoryHistoryStore::new(HistoryLimits::default(), clock.clock());
    let snap = snapshot(start(), &[("space", RideStatus::Operating, Some(30))]);

    let first = store.ingest(&snap).await.unwrap();
    let second = store.ingest(&snap).await.unwrap();
    assert_eq!(first, IngestReport { recorded: 1, skipped: 0 });
    assert_eq!(second, IngestReport { recorded: 0, skipped: 1 });

    let later = snapshot(start() + ChronoDuration::minutes(5), &[(
      "space",
      RideStatus::Operating,
      Some(35),
    )]);
    assert_eq!(store.ingest(&later).await.unwrap().recorded, 1);
  }

  #[tokio::test]
  async fn three_samples_fall_back() {
    let clock = ManualClock::new(start());
    let store = MemoryHistoryStore::new(HistoryLimits::default(), clock.clock());
    for week in 0..3 {
      let at = start() + ChronoDuration::weeks(week);
      store
        .ingest(&snapshot(at, &[("space", RideStatus::Operating, Some(40))]))
        .await
        .unwrap();
    }
    let baseline = store
      .baseline("disney-magic-kingdom", "space", start())
      .await
      .unwrap();
    assert_eq!(baseline, BaselineResult::fallback());
  }

  #[tokio::test]
  async fn weekly_samples_build_a_bucket_baseline() {
    let clock = ManualClock::new(start());
    let limits = HistoryLimits { history_weeks: 52, ..Default::default() };
    let store = MemoryHistoryStore::new(limits, clock.clock());
    for week in 0..12 {
      let at = start() + ChronoDuration::weeks(week);
      store
        .ingest(&snapshot(at, &[("space", RideStatus::Operating, Some(30 + week as u32))]))
        .await
        .unwrap();
    }
    let baseline = store
      .baseline("disney-magic-kingdom", "space", start())
      .await
      .unwrap();
    assert_eq!(baseline.source, BaselineSource::Bucket);
    assert_eq!(baseline.confidence, Confidence::High);
    assert_eq!(baseline.sample_count, 12);
    // Median of 30..=41.
    assert_eq!(baseline.typical_wait_minutes, 36);
  }

  #[tokio::test]
  async fn baselines_age_out_of_the_history_window() {
    let clock = ManualClock::new(start());
    let store = MemoryHistoryStore::new(HistoryLimits::default(), clock.clock());
    for week in (0..9).rev() {
      let at = start() - ChronoDuration::weeks(week);
      store
        .ingest(&snapshot(at, &[("space", RideStatus::Operating, Some(40))]))
        .await
        .unwrap();
    }
    let baseline = store.baseline("disney-magic-kingdom", "space", start()).await.unwrap();
    assert_eq!(baseline.sample_count, 9);

    clock.set(start() + ChronoDuration::weeks(1));
    let baseline = store.baseline("disney-magic-kingdom", "space", start()).await.unwrap();
    assert_eq!(baseline.sample_count, 8);
  }

  #[tokio::test]
  async fn earlier_slot_is_not_sampled_twice() {
    let clock = ManualClock::new(start());
    let store = MemoryHistoryStore::new(HistoryLimits::default(), clock.clock());
    for at in [start(), start() + ChronoDuration::minutes(5)] {
      store
        .ingest(&snapshot(at, &[("space", RideStatus::Operating, Some(30))]))
        .await
        .unwrap();
    }
    let rollback = snapshot(start() + ChronoDuration::seconds(30), &[(
      "space",
      RideStatus::Operating,
      Some(45),
    )]);
    assert_eq!(store.ingest(&rollback).await.unwrap(), IngestReport { recorded: 0, skipped: 1 });
    let points = store
      .recent_points("disney-magic-kingdom", "space", start())
      .await
      .unwrap();
    assert_eq!(points.len(), 2);
  }

  #[tokio::test]
  async fn recent_points_include_non_operating() {
    let clock = ManualClock::new(start());
    let store = MemoryHistoryStore::new(HistoryLimits::default(), clock.clock());
    store
      .ingest(&snapshot(start(), &[("space", RideStatus::Operating, Some(30))]))
      .await
      .unwrap();
    store
      .ingest(&snapshot(start() + ChronoDuration::minutes(5), &[(
        "space",
        RideStatus::Down,
        None,
      )]))
      .await
      .unwrap();

    let points = store
      .recent_points("disney-magic-kingdom", "space", start())
      .await
      .unwrap();
    assert_eq!(points.len(), 2);
    assert_eq!(points[1].status, RideStatus::Down);
    assert!(store.recent_points("nowhere", "space", start()).await.unwrap().is_empty());
  }

  #[tokio::test]
  async fn persisted_store_reloads() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("history.json");
    let clock = ManualClock::new(start());

    let store = MemoryHistoryStore::with_persistence(
      HistoryLimits::default(),
      clock.clock(),
      &path,
      Duration::from_millis(50),
    );
    store
      .ingest(&snapshot(start(), &[("space", RideStatus::Operating, Some(30))]))
      .await
      .unwrap();
    assert!(store.flush().await.unwrap());
    drop(store);

    let reopened = MemoryHistoryStore::with_persistence(
      HistoryLimits::default(),
      clock.clock(),
      &path,
      Duration::from_millis(50),
    );
    let points = reopened
      .recent_points("disney-magic-kingdom", "space", start())
      .await
      .unwrap();
    assert_eq!(points.len(), 1);
    assert_eq!(points[0].wait_minutes, Some(30));
  }

  #[tokio::test]
  async fn ingestion_schedules_a_debounced_write() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("history.json");
    let clock = ManualClock::new(start());
    let store = MemoryHistoryStore::with_persistence(
      HistoryLimits::default(),
      clock.clock(),
      &path,
      Duration::from_millis(100),
    );
    store
      .ingest(&snapshot(start(), &[("space", RideStatus::Operating, Some(30))]))
      .await
      .unwrap();
    assert!(!path.exists());

    tokio::time::sleep(std::time::Duration::from_millis(500)).await;
    let saved = persist::load_snapshot(&path).unwrap().unwrap();
    assert!(saved.parks.contains_key("disney-magic-kingdom"));
  }

  #[tokio::test]
  async fn ephemeral_store_does_not_flush() {
    let store = MemoryHistoryStore::new(HistoryLimits::default(), ManualClock::new(start()).clock());
    assert!(!store.flush().await.unwrap());
  }
}
