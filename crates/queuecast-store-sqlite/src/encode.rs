//! Encoding and decoding helpers between domain types and SQLite columns.
//!
//! Instants used for ordering and range queries are stored as epoch
//! milliseconds; informational timestamps as RFC 3339 strings.

use chrono::{DateTime, Utc};
use queuecast_core::{
  attraction::RideStatus,
  baseline::PoolStat,
  history::RecentPoint,
};

use crate::{Error, Result};

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_millis(ms: i64) -> Result<DateTime<Utc>> {
  DateTime::from_timestamp_millis(ms)
    .ok_or_else(|| Error::DateParse(format!("timestamp out of range: {ms}")))
}

pub fn decode_status(s: &str) -> Result<RideStatus> {
  RideStatus::parse(s).ok_or_else(|| Error::Decode { column: "status", value: s.to_owned() })
}

/// `(median_wait_minutes, sample_count)` as read from a baseline table.
pub type RawPool = (i64, i64);

pub fn read_pool(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawPool> {
  Ok((row.get(0)?, row.get(1)?))
}

pub fn decode_pool((median, count): RawPool) -> PoolStat {
  PoolStat {
    median: u32::try_from(median.max(0)).unwrap_or(u32::MAX),
    count:  usize::try_from(count.max(0)).unwrap_or(0),
  }
}

/// Raw row from `wait_observations` for recent-point queries.
pub struct RawPoint {
  pub observed_ms:  i64,
  pub wait_minutes: Option<i64>,
  pub status:       String,
}

impl RawPoint {
  pub fn into_point(self) -> Result<RecentPoint> {
    Ok(RecentPoint {
      ts:           decode_millis(self.observed_ms)?,
      wait_minutes: self.wait_minutes.and_then(|w| u32::try_from(w).ok()),
      status:       decode_status(&self.status)?,
    })
  }
}
