//! [`SqliteHistoryStore`], the SQLite implementation of [`HistoryStore`].

use std::{collections::BTreeMap, path::Path};

use chrono::{DateTime, Duration, Utc};
use rusqlite::OptionalExtension as _;
use tracing::info;

use queuecast_core::{
  baseline::{resolve, BaselineResult, PoolStat, TierStats, TimeKeys},
  history::{slot_of, HistoryLimits, HistoryStore, IngestReport, RecentPoint, RECENT_WINDOW_MINUTES},
  snapshot::LiveSnapshot,
};

use crate::{
  encode::{decode_pool, encode_dt, read_pool, RawPoint, RawPool},
  schema::SCHEMA,
  Result,
};

/// Row counts written by one [`SqliteHistoryStore::refresh_baselines`] run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefreshReport {
  pub bucket_rows: usize,
  pub hour_rows:   usize,
  pub global_rows: usize,
}

// ─── Store ───────────────────────────────────────────────────────────────────

/// A history store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteHistoryStore {
  conn:   tokio_rusqlite::Connection,
  limits: HistoryLimits,
}

impl SqliteHistoryStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn, limits: HistoryLimits::default() };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store. Used by tests.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn, limits: HistoryLimits::default() };
    store.init_schema().await?;
    Ok(store)
  }

  /// Replace the pool bounds and local-time offset.
  pub fn with_limits(mut self, limits: HistoryLimits) -> Self {
    self.limits = limits;
    self
  }

  pub fn limits(&self) -> &HistoryLimits { &self.limits }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Rebuild the three baseline tables from observations inside the
  /// history window ending at `now`.
  ///
  /// Each pool keeps only its newest `max_*_samples` observations, matching
  /// the FIFO bound of the in-process store.
  pub async fn refresh_baselines(&self, now: DateTime<Utc>) -> Result<RefreshReport> {
    let since_ms = (now - self.limits.retention()).timestamp_millis();
    let refreshed_at = encode_dt(now);
    let limits = self.limits;

    let report = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        let mut buckets: BTreeMap<(String, i64, i64, String), Vec<u32>> = BTreeMap::new();
        let mut hours: BTreeMap<(String, i64, String), Vec<u32>> = BTreeMap::new();
        let mut globals: BTreeMap<(String, String), Vec<u32>> = BTreeMap::new();
        {
          let mut stmt = tx.prepare(
            "SELECT park_id, attraction_id, day_of_week, bucket_15m, hour_of_day, wait_minutes
             FROM wait_observations
             WHERE status = 'OPERATING' AND wait_minutes IS NOT NULL AND observed_ms >= ?1
             ORDER BY observed_ms ASC",
          )?;
          let rows = stmt.query_map(rusqlite::params![since_ms], |r| {
            Ok((
              r.get::<_, String>(0)?,
              r.get::<_, String>(1)?,
              r.get::<_, i64>(2)?,
              r.get::<_, i64>(3)?,
              r.get::<_, i64>(4)?,
              r.get::<_, i64>(5)?,
            ))
          })?;
          for row in rows {
            let (park, attraction, dow, bucket, hour, wait) = row?;
            let wait = u32::try_from(wait.max(0)).unwrap_or(u32::MAX);
            buckets
              .entry((park.clone(), dow, bucket, attraction.clone()))
              .or_default()
              .push(wait);
            hours.entry((park.clone(), hour, attraction.clone())).or_default().push(wait);
            globals.entry((park, attraction)).or_default().push(wait);
          }
        }

        tx.execute("DELETE FROM wait_baseline_15m", [])?;
        tx.execute("DELETE FROM wait_baseline_hour", [])?;
        tx.execute("DELETE FROM wait_baseline_global", [])?;

        let mut report = RefreshReport::default();
        {
          let mut stmt = tx.prepare(
            "INSERT INTO wait_baseline_15m
               (park_id, day_of_week, bucket_15m, attraction_id, median_wait_minutes, sample_count, refreshed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
          )?;
          for ((park, dow, bucket, attraction), waits) in &buckets {
            if let Some(stat) = newest_stat(waits, limits.max_bucket_samples) {
              stmt.execute(rusqlite::params![
                park, dow, bucket, attraction, stat.median, stat.count as i64, refreshed_at
              ])?;
              report.bucket_rows += 1;
            }
          }
        }
        {
          let mut stmt = tx.prepare(
            "INSERT INTO wait_baseline_hour
               (park_id, hour_of_day, attraction_id, median_wait_minutes, sample_count, refreshed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
          )?;
          for ((park, hour, attraction), waits) in &hours {
            if let Some(stat) = newest_stat(waits, limits.max_hour_samples) {
              stmt.execute(rusqlite::params![
                park, hour, attraction, stat.median, stat.count as i64, refreshed_at
              ])?;
              report.hour_rows += 1;
            }
          }
        }
        {
          let mut stmt = tx.prepare(
            "INSERT INTO wait_baseline_global
               (park_id, attraction_id, median_wait_minutes, sample_count, refreshed_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
          )?;
          for ((park, attraction), waits) in &globals {
            if let Some(stat) = newest_stat(waits, limits.max_global_samples) {
              stmt.execute(rusqlite::params![
                park, attraction, stat.median, stat.count as i64, refreshed_at
              ])?;
              report.global_rows += 1;
            }
          }
        }

        tx.commit()?;
        Ok(report)
      })
      .await?;

    info!(
      buckets = report.bucket_rows,
      hours = report.hour_rows,
      globals = report.global_rows,
      "baselines refreshed"
    );
    Ok(report)
  }

  /// Delete observations older than `retention` before `now`. Returns the
  /// number of rows removed.
  pub async fn prune_observations(&self, retention: Duration, now: DateTime<Utc>) -> Result<usize> {
    let cutoff_ms = (now - retention).timestamp_millis();
    let removed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "DELETE FROM wait_observations WHERE observed_ms < ?1",
          rusqlite::params![cutoff_ms],
        )?)
      })
      .await?;
    info!(removed, "observations pruned");
    Ok(removed)
  }

  /// Total stored observations, across all parks.
  pub async fn observation_count(&self) -> Result<usize> {
    let count: i64 = self
      .conn
      .call(|conn| {
        Ok(conn.query_row("SELECT COUNT(*) FROM wait_observations", [], |r| r.get(0))?)
      })
      .await?;
    Ok(usize::try_from(count).unwrap_or(0))
  }
}

/// Median of the newest `max` samples; `waits` is ordered oldest first.
fn newest_stat(waits: &[u32], max: usize) -> Option<PoolStat> {
  PoolStat::of(&waits[waits.len().saturating_sub(max)..])
}

// ─── HistoryStore impl ───────────────────────────────────────────────────────

impl HistoryStore for SqliteHistoryStore {
  type Error = crate::Error;

  async fn ingest(&self, snapshot: &LiveSnapshot) -> Result<IngestReport> {
    let offset = self.limits.offset();
    let rows: Vec<_> = snapshot
      .attractions
      .iter()
      .map(|a| {
        let keys = TimeKeys::at(a.source_updated_at, offset);
        (
          a.park_id.clone(),
          a.attraction_id.clone(),
          slot_of(a.source_updated_at),
          a.source_updated_at.timestamp_millis(),
          encode_dt(a.ingested_at),
          keys,
          a.name.clone(),
          a.land.clone(),
          a.status.as_str(),
          a.queue_kind.as_str(),
          a.wait_minutes,
          a.provider.clone(),
        )
      })
      .collect();

    let report = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let mut report = IngestReport::default();
        {
          let mut stmt = tx.prepare(
            "INSERT OR IGNORE INTO wait_observations
               (park_id, attraction_id, slot_5m, observed_ms, ingested_at,
                day_of_week, bucket_15m, hour_of_day,
                name, land, status, queue_kind, wait_minutes, provider)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
          )?;
          for (park, attraction, slot, observed, ingested, keys, name, land, status, kind, wait, provider) in rows {
            let inserted = stmt.execute(rusqlite::params![
              park,
              attraction,
              slot,
              observed,
              ingested,
              keys.day_of_week,
              keys.bucket_15m,
              keys.hour_of_day,
              name,
              land,
              status,
              kind,
              wait,
              provider,
            ])?;
            if inserted > 0 {
              report.recorded += 1;
            } else {
              report.skipped += 1;
            }
          }
        }
        tx.commit()?;
        Ok(report)
      })
      .await?;

    Ok(report)
  }

  async fn baseline(
    &self,
    park_id: &str,
    attraction_id: &str,
    at: DateTime<Utc>,
  ) -> Result<BaselineResult> {
    let keys = TimeKeys::at(at, self.limits.offset());
    let park = park_id.to_owned();
    let attraction = attraction_id.to_owned();

    let (bucket, hour, global): (Option<RawPool>, Option<RawPool>, Option<RawPool>) = self
      .conn
      .call(move |conn| {
        let bucket = conn
          .query_row(
            "SELECT median_wait_minutes, sample_count FROM wait_baseline_15m
             WHERE park_id = ?1 AND day_of_week = ?2 AND bucket_15m = ?3 AND attraction_id = ?4",
            rusqlite::params![park, keys.day_of_week, keys.bucket_15m, attraction],
            read_pool,
          )
          .optional()?;
        let hour = conn
          .query_row(
            "SELECT median_wait_minutes, sample_count FROM wait_baseline_hour
             WHERE park_id = ?1 AND hour_of_day = ?2 AND attraction_id = ?3",
            rusqlite::params![park, keys.hour_of_day, attraction],
            read_pool,
          )
          .optional()?;
        let global = conn
          .query_row(
            "SELECT median_wait_minutes, sample_count FROM wait_baseline_global
             WHERE park_id = ?1 AND attraction_id = ?2",
            rusqlite::params![park, attraction],
            read_pool,
          )
          .optional()?;

        Ok((bucket, hour, global))
      })
      .await?;

    Ok(resolve(&TierStats {
      bucket: bucket.map(decode_pool),
      hour:   hour.map(decode_pool),
      global: global.map(decode_pool),
    }))
  }

  async fn recent_points(
    &self,
    park_id: &str,
    attraction_id: &str,
    since: DateTime<Utc>,
  ) -> Result<Vec<RecentPoint>> {
    let park = park_id.to_owned();
    let attraction = attraction_id.to_owned();
    let since_ms = since.timestamp_millis();
    let window_ms = Duration::minutes(RECENT_WINDOW_MINUTES).num_milliseconds();
    let limit = self.limits.max_recent_points as i64;

    let raw: Vec<RawPoint> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT observed_ms, wait_minutes, status FROM wait_observations
           WHERE park_id = ?1 AND attraction_id = ?2 AND observed_ms >= ?3
             AND observed_ms >= (
               SELECT MAX(observed_ms) FROM wait_observations
               WHERE park_id = ?1 AND attraction_id = ?2
             ) - ?4
           ORDER BY observed_ms DESC
           LIMIT ?5",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![park, attraction, since_ms, window_ms, limit], |r| {
            Ok(RawPoint {
              observed_ms:  r.get(0)?,
              wait_minutes: r.get(1)?,
              status:       r.get(2)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    let mut points = raw
      .into_iter()
      .map(RawPoint::into_point)
      .collect::<Result<Vec<_>>>()?;
    points.reverse();
    Ok(points)
  }
}
