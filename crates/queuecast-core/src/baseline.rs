//! Baseline estimation, the pure half.
//!
//! Both history backends reduce their storage to a [`TierStats`] (median and
//! sample count per granularity) and hand it to [`resolve`]. Key derivation
//! ([`TimeKeys`]) lives here too so the backends agree on which slot a
//! timestamp falls into.

use chrono::{DateTime, Datelike, FixedOffset, Offset, Timelike, Utc};
use serde::{Deserialize, Serialize};

pub const BUCKET_SIZE_MINUTES: u32 = 15;

/// Minimum samples before a tier is trusted at all.
pub const MIN_BUCKET_SAMPLES: usize = 6;
pub const MIN_HOUR_SAMPLES: usize = 8;
pub const MIN_GLOBAL_SAMPLES: usize = 8;

/// Bucket samples needed for HIGH confidence.
pub const HIGH_BUCKET_SAMPLES: usize = 12;
/// Hour samples needed for MEDIUM confidence.
pub const MEDIUM_HOUR_SAMPLES: usize = 30;

// ─── Result types ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Confidence {
  Low,
  Medium,
  High,
}

impl Confidence {
  /// Multiplier applied to the opportunity score.
  pub fn weight(self) -> f64 {
    match self {
      Self::High => 1.0,
      Self::Medium => 0.86,
      Self::Low => 0.72,
    }
  }
}

/// Which granularity produced a baseline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BaselineSource {
  Bucket,
  Hour,
  Global,
  Fallback,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BaselineResult {
  pub typical_wait_minutes: u32,
  pub confidence:           Confidence,
  pub source:               BaselineSource,
  pub sample_count:         usize,
}

impl BaselineResult {
  /// "No usable history": zero typical wait, LOW confidence.
  pub fn fallback() -> Self {
    Self {
      typical_wait_minutes: 0,
      confidence:           Confidence::Low,
      source:               BaselineSource::Fallback,
      sample_count:         0,
    }
  }

  pub fn is_fallback(&self) -> bool { self.source == BaselineSource::Fallback }
}

// ─── Time keys ───────────────────────────────────────────────────────────────

/// Park-local slot coordinates of an instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimeKeys {
  /// 0 = Sunday.
  pub day_of_week: u8,
  /// 15-minute slot within the day, 0..96.
  pub bucket_15m:  u16,
  pub hour_of_day: u8,
}

impl TimeKeys {
  pub fn at(ts: DateTime<Utc>, offset: FixedOffset) -> Self {
    let local = ts.with_timezone(&offset);
    let minute_of_day = local.hour() * 60 + local.minute();
    Self {
      day_of_week: local.weekday().num_days_from_sunday() as u8,
      bucket_15m:  (minute_of_day / BUCKET_SIZE_MINUTES) as u16,
      hour_of_day: local.hour() as u8,
    }
  }

  pub fn bucket_key(&self) -> String { format!("{}-{}", self.day_of_week, self.bucket_15m) }

  pub fn hour_key(&self) -> String { self.hour_of_day.to_string() }
}

/// Build a [`FixedOffset`] from minutes east of UTC, clamping nonsense to UTC.
pub fn offset_from_minutes(minutes: i32) -> FixedOffset {
  FixedOffset::east_opt(minutes.saturating_mul(60)).unwrap_or_else(|| Utc.fix())
}

// ─── Statistics ──────────────────────────────────────────────────────────────

/// Round half towards positive infinity, e.g. `2.5 → 3`, `-2.5 → -2`.
pub fn round_half_up(value: f64) -> f64 { (value + 0.5).floor() }

/// Round to `places` decimal places, half up.
pub fn round_to(value: f64, places: i32) -> f64 {
  let factor = 10f64.powi(places);
  round_half_up(value * factor) / factor
}

/// Median of the samples; the mean of the two middle values (rounded) for
/// an even count.
pub fn median(values: &[u32]) -> Option<u32> {
  if values.is_empty() {
    return None;
  }
  let mut sorted = values.to_vec();
  sorted.sort_unstable();
  let mid = sorted.len() / 2;
  if sorted.len() % 2 == 0 {
    let pair = f64::from(sorted[mid - 1]) + f64::from(sorted[mid]);
    Some(round_half_up(pair / 2.0) as u32)
  } else {
    Some(sorted[mid])
  }
}

/// Median and size of one sample pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStat {
  pub median: u32,
  pub count:  usize,
}

impl PoolStat {
  pub fn of<'a>(values: impl IntoIterator<Item = &'a u32>) -> Option<Self> {
    let values: Vec<u32> = values.into_iter().copied().collect();
    median(&values).map(|median| Self { median, count: values.len() })
  }
}

/// The three candidate pools for one (attraction, instant).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TierStats {
  pub bucket: Option<PoolStat>,
  pub hour:   Option<PoolStat>,
  pub global: Option<PoolStat>,
}

pub fn confidence_for(sample_count: usize, source: BaselineSource) -> Confidence {
  match source {
    BaselineSource::Bucket if sample_count >= HIGH_BUCKET_SAMPLES => Confidence::High,
    BaselineSource::Bucket if sample_count >= MIN_BUCKET_SAMPLES => Confidence::Medium,
    BaselineSource::Hour if sample_count >= MEDIUM_HOUR_SAMPLES => Confidence::Medium,
    _ => Confidence::Low,
  }
}

/// Walk bucket → hour → global, taking the first tier with enough samples.
pub fn resolve(tiers: &TierStats) -> BaselineResult {
  let candidates = [
    (tiers.bucket, BaselineSource::Bucket, MIN_BUCKET_SAMPLES),
    (tiers.hour, BaselineSource::Hour, MIN_HOUR_SAMPLES),
    (tiers.global, BaselineSource::Global, MIN_GLOBAL_SAMPLES),
  ];

  candidates
    .into_iter()
    .find_map(|(stat, source, min)| {
      stat.filter(|s| s.count >= min).map(|s| BaselineResult {
        typical_wait_minutes: s.median,
        confidence:           confidence_for(s.count, source),
        source,
        sample_count:         s.count,
      })
    })
    .unwrap_or_else(BaselineResult::fallback)
}
