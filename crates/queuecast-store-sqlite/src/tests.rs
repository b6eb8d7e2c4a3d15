//! Integration tests for `SqliteHistoryStore` against an in-memory database.

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use queuecast_core::{
  attraction::{AttractionState, QueueKind, RideStatus},
  baseline::{BaselineResult, BaselineSource, Confidence},
  catalog::ParkCatalog,
  clock::ManualClock,
  history::{HistoryLimits, HistoryStore, IngestReport},
  memory::MemoryHistoryStore,
  snapshot::LiveSnapshot,
};

use crate::SqliteHistoryStore;

const MK: &str = "disney-magic-kingdom";

async fn store() -> SqliteHistoryStore {
  SqliteHistoryStore::open_in_memory()
    .await
    .expect("in-memory store")
}

fn start() -> DateTime<Utc> { Utc.with_ymd_and_hms(2026, 5, 6, 16, 0, 0).unwrap() }

fn snapshot(at: DateTime<Utc>, rides: &[(&str, RideStatus, Option<u32>)]) -> LiveSnapshot {
  let park = ParkCatalog::orlando().get(MK).cloned().unwrap();
  let attractions = rides
    .iter()
    .map(|(id, status, wait)| AttractionState {
      park_id:           park.id.clone(),
      attraction_id:     (*id).to_owned(),
      name:              id.to_uppercase(),
      land:              Some("Tomorrowland".into()),
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

// ─── Ingestion ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn ingest_ignores_repeat_slot() {
  let s = store().await;
  let snap = snapshot(start(), &[("space", RideStatus::Operating, Some(30))]);

  assert_eq!(s.ingest(&snap).await.unwrap(), IngestReport { recorded: 1, skipped: 0 });
  assert_eq!(s.ingest(&snap).await.unwrap(), IngestReport { recorded: 0, skipped: 1 });

  let same_slot = snapshot(start() + Duration::seconds(90), &[("space", RideStatus::Operating, Some(35))]);
  assert_eq!(s.ingest(&same_slot).await.unwrap().skipped, 1);
  assert_eq!(s.observation_count().await.unwrap(), 1);
}

#[tokio::test]
async fn recent_points_are_ordered_and_windowed() {
  let s = store().await;
  for (i, (status, wait)) in [
    (RideStatus::Operating, Some(30)),
    (RideStatus::Down, None),
    (RideStatus::Operating, Some(20)),
  ]
  .into_iter()
  .enumerate()
  {
    let at = start() + Duration::minutes(5 * i as i64);
    s.ingest(&snapshot(at, &[("space", status, wait)])).await.unwrap();
  }

  let points = s.recent_points(MK, "space", start()).await.unwrap();
  let statuses: Vec<_> = points.iter().map(|p| p.status).collect();
  assert_eq!(statuses, vec![RideStatus::Operating, RideStatus::Down, RideStatus::Operating]);
  assert_eq!(points[1].wait_minutes, None);

  let later = s
    .recent_points(MK, "space", start() + Duration::minutes(6))
    .await
    .unwrap();
  assert_eq!(later.len(), 1);

  assert!(s.recent_points(MK, "nothing", start()).await.unwrap().is_empty());
}

#[tokio::test]
async fn recent_points_drop_anything_two_hours_behind_newest() {
  let s = store().await;
  s.ingest(&snapshot(start(), &[("space", RideStatus::Operating, Some(30))]))
    .await
    .unwrap();
  s.ingest(&snapshot(start() + Duration::hours(3), &[("space", RideStatus::Operating, Some(40))]))
    .await
    .unwrap();
  let points = s.recent_points(MK, "space", start()).await.unwrap();
  assert_eq!(points.len(), 1);
  assert_eq!(points[0].wait_minutes, Some(40));
}

// ─── Baselines ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn baseline_is_fallback_until_refreshed() {
  let s = store().await;
  for week in 0..12 {
    let at = start() - Duration::weeks(week);
    s.ingest(&snapshot(at, &[("space", RideStatus::Operating, Some(40))]))
      .await
      .unwrap();
  }
  assert_eq!(s.baseline(MK, "space", start()).await.unwrap(), BaselineResult::fallback());

  // Only the nine samples inside the eight-week window count.
  let report = s.refresh_baselines(start()).await.unwrap();
  assert_eq!(report.global_rows, 1);
  let b = s.baseline(MK, "space", start()).await.unwrap();
  assert_eq!(b.source, BaselineSource::Bucket);
  assert_eq!(b.sample_count, 9);
  assert_eq!(b.confidence, Confidence::Medium);
  assert_eq!(b.typical_wait_minutes, 40);
}

#[tokio::test]
async fn three_samples_everywhere_falls_back() {
  let s = store().await;
  for slot in 0..3 {
    let at = start() + Duration::minutes(5 * slot);
    s.ingest(&snapshot(at, &[("space", RideStatus::Operating, Some(40))]))
      .await
      .unwrap();
  }
  s.refresh_baselines(start() + Duration::hours(1)).await.unwrap();
  let b = s.baseline(MK, "space", start()).await.unwrap();
  assert_eq!(b.source, BaselineSource::Fallback);
  assert_eq!(b.confidence, Confidence::Low);
  assert_eq!(b.typical_wait_minutes, 0);
}

#[tokio::test]
async fn non_operating_rows_do_not_feed_baselines() {
  let s = store().await;
  for slot in 0..10 {
    let at = start() + Duration::minutes(5 * slot);
    s.ingest(&snapshot(at, &[("space", RideStatus::Down, Some(90))]))
      .await
      .unwrap();
  }
  let report = s.refresh_baselines(start() + Duration::hours(1)).await.unwrap();
  assert_eq!(report.global_rows, 0);
}

#[tokio::test]
async fn prune_removes_old_observations() {
  let s = store().await;
  s.ingest(&snapshot(start() - Duration::days(200), &[("space", RideStatus::Operating, Some(30))]))
    .await
    .unwrap();
  s.ingest(&snapshot(start(), &[("space", RideStatus::Operating, Some(30))]))
    .await
    .unwrap();

  let removed = s.prune_observations(Duration::days(120), start()).await.unwrap();
  assert_eq!(removed, 1);
  assert_eq!(s.observation_count().await.unwrap(), 1);
}

#[tokio::test]
async fn open_on_disk_persists_across_reopen() {
  let dir = tempfile::tempdir().unwrap();
  let path = dir.path().join("history.sqlite");
  {
    let s = SqliteHistoryStore::open(&path).await.unwrap();
    s.ingest(&snapshot(start(), &[("space", RideStatus::Operating, Some(30))]))
      .await
      .unwrap();
  }
  let reopened = SqliteHistoryStore::open(&path).await.unwrap();
  assert_eq!(reopened.observation_count().await.unwrap(), 1);
}

// ─── Parity ──────────────────────────────────────────────────────────────────

/// The same observations must yield the same baseline from either backend.
#[tokio::test]
async fn matches_in_process_store() {
  let limits = HistoryLimits { max_bucket_samples: 6, ..Default::default() };
  let sql = store().await.with_limits(limits);
  let clock = ManualClock::new(start());
  let memory = Arc::new(MemoryHistoryStore::new(limits, clock.clock()));

  // "bucket" puts nine samples in one slot, over the bound of six.
  // "hourly" spreads eleven across the hour. "sparse" is mostly down.
  // "aged" reaches back past the eight-week window.
  let mut snapshots = Vec::new();
  for week in (0..7).rev() {
    let at = start() - Duration::weeks(week);
    snapshots.push(snapshot(at, &[("bucket", RideStatus::Operating, Some(20 + 5 * week as u32))]));
  }
  for week in (0..12).rev() {
    let at = start() - Duration::weeks(week);
    snapshots.push(snapshot(at, &[("aged", RideStatus::Operating, Some(30 + 2 * week as u32))]));
  }
  for slot in 1..12 {
    let at = start() + Duration::minutes(5 * slot);
    snapshots.push(snapshot(at, &[
      ("bucket", RideStatus::Operating, Some(60)),
      ("hourly", RideStatus::Operating, Some(10 + slot as u32)),
      ("sparse", if slot % 4 == 0 { RideStatus::Operating } else { RideStatus::Down }, Some(15)),
    ]));
  }

  // The feed rolls back into an earlier slot.
  snapshots.push(snapshot(start() + Duration::seconds(30), &[("bucket", RideStatus::Operating, Some(99))]));

  for snap in &snapshots {
    let a = sql.ingest(snap).await.unwrap();
    let b = memory.ingest(snap).await.unwrap();
    assert_eq!(a, b, "ingest at {}", snap.source_updated_at);
  }
  clock.set(start() + Duration::hours(1));
  sql.refresh_baselines(start() + Duration::hours(1)).await.unwrap();

  let instants = [
    start(),
    start() + Duration::minutes(20),
    start() + Duration::minutes(50),
    start() + Duration::days(1),
  ];
  for id in ["bucket", "hourly", "sparse", "aged", "unknown"] {
    for at in instants {
      let a = sql.baseline(MK, id, at).await.unwrap();
      let b = memory.baseline(MK, id, at).await.unwrap();
      assert_eq!(a, b, "{id} at {at}");
    }
    let since = start();
    let a = sql.recent_points(MK, id, since).await.unwrap();
    let b = memory.recent_points(MK, id, since).await.unwrap();
    assert_eq!(a, b, "recent points for {id}");
  }
}

#[tokio::test]
async fn backends_agree_with_default_limits() {
  let sql = store().await;
  let clock = ManualClock::new(start());
  let memory = MemoryHistoryStore::new(HistoryLimits::default(), clock.clock());

  for week in (0..12).rev() {
    let snap = snapshot(start() - Duration::weeks(week), &[(
      "space",
      RideStatus::Operating,
      Some(40 + week as u32),
    )]);
    sql.ingest(&snap).await.unwrap();
    memory.ingest(&snap).await.unwrap();
  }
  sql.refresh_baselines(start()).await.unwrap();

  let a = sql.baseline(MK, "space", start()).await.unwrap();
  let b = memory.baseline(MK, "space", start()).await.unwrap();
  assert_eq!(a, b);
  assert_eq!(b.sample_count, 9);
  assert_eq!(b.typical_wait_minutes, 44);

  for at in [start() + Duration::minutes(16), start() + Duration::minutes(5), start() + Duration::seconds(30)] {
    let snap = snapshot(at, &[("space", RideStatus::Operating, Some(20))]);
    assert_eq!(sql.ingest(&snap).await.unwrap(), memory.ingest(&snap).await.unwrap());
  }
  let a = sql.recent_points(MK, "space", start()).await.unwrap();
  let b = memory.recent_points(MK, "space", start()).await.unwrap();
  assert_eq!(a.len(), 3);
  assert_eq!(a, b);
}
