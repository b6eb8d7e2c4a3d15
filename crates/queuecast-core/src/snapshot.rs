//! Live snapshot: one park's reconciled state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
  attraction::AttractionState,
  baseline::round_half_up,
  catalog::ParkDefinition,
};

/// Provider key stamped on snapshots built without any upstream data.
pub const SYNTHETIC_PROVIDER: &str = "synthetic";

// ─── Summary ─────────────────────────────────────────────────────────────────

/// A named wait used for the shortest/longest summary slots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaitExtreme {
  pub name:    String,
  pub minutes: u32,
}

/// Derived park-wide figures. Always recomputed from the attraction list via
/// [`ParkSummary::from_attractions`]; never edited independently.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParkSummary {
  pub open_count:           usize,
  pub down_count:           usize,
  pub average_wait_minutes: Option<u32>,
  pub shortest_wait:        Option<WaitExtreme>,
  pub longest_wait:         Option<WaitExtreme>,
}

impl ParkSummary {
  pub fn from_attractions(attractions: &[AttractionState]) -> Self {
    let open_count = attractions
      .iter()
      .filter(|a| a.status.is_operating())
      .count();
    let down_count = attractions
      .iter()
      .filter(|a| a.status.is_unavailable())
      .count();

    let mut waits: Vec<(&str, u32)> = attractions
      .iter()
      .filter_map(|a| a.operating_wait().map(|w| (a.name.as_str(), w)))
      .collect();
    // Stable sort keeps provider order among equal waits.
    waits.sort_by_key(|(_, w)| *w);

    let average_wait_minutes = if waits.is_empty() {
      None
    } else {
      let total: u64 = waits.iter().map(|(_, w)| u64::from(*w)).sum();
      Some(round_half_up(total as f64 / waits.len() as f64) as u32)
    };

    let extreme = |entry: Option<&(&str, u32)>| {
      entry.map(|(name, minutes)| WaitExtreme {
        name:    (*name).to_owned(),
        minutes: *minutes,
      })
    };

    Self {
      open_count,
      down_count,
      average_wait_minutes,
      shortest_wait: extreme(waits.first()),
      longest_wait: extreme(waits.last()),
    }
  }
}

// ─── Snapshot ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveSnapshot {
  pub park_id:           String,
  pub park_name:         String,
  pub provider:          String,
  /// Newest `source_updated_at` among the attractions.
  pub source_updated_at: DateTime<Utc>,
  pub ingested_at:       DateTime<Utc>,
  /// Seconds between `source_updated_at` and assembly time.
  pub freshness_seconds: u64,
  pub stale:             bool,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub degraded_reason:   Option<String>,
  pub attractions:       Vec<AttractionState>,
  pub summary:           ParkSummary,
}

impl LiveSnapshot {
  /// Assemble a snapshot from one provider's attraction list.
  ///
  /// Returns `None` for an empty list. `stale_after_secs` is the provider's
  /// own staleness threshold.
  pub fn assemble(
    park: &ParkDefinition,
    provider: &str,
    attractions: Vec<AttractionState>,
    stale_after_secs: u64,
    now: DateTime<Utc>,
  ) -> Option<Self> {
    let source_updated_at = attractions.iter().map(|a| a.source_updated_at).max()?;
    let freshness_seconds = (now - source_updated_at).num_seconds().max(0) as u64;

    Some(Self {
      park_id: park.id.clone(),
      park_name: park.name.clone(),
      provider: provider.to_owned(),
      source_updated_at,
      ingested_at: now,
      freshness_seconds,
      stale: freshness_seconds > stale_after_secs,
      degraded_reason: None,
      summary: ParkSummary::from_attractions(&attractions),
      attractions,
    })
  }

  /// Replace the attraction list and recompute the summary with it.
  pub fn with_attractions(mut self, attractions: Vec<AttractionState>) -> Self {
    self.summary     = ParkSummary::from_attractions(&attractions);
    self.attractions = attractions;
    self
  }

  pub fn is_synthetic(&self) -> bool { self.provider == SYNTHETIC_PROVIDER }

  /// A sentence for the presentation layer explaining why guidance may be
  /// less reliable, or `None` when the snapshot is healthy.
  pub fn service_notice(&self) -> Option<String> {
    if self.is_synthetic() {
      return Some(
        "Live provider data is unavailable. Guidance may be less accurate \
         until feeds recover."
          .to_owned(),
      );
    }
    if let Some(reason) = &self.degraded_reason {
      return Some(reason.clone());
    }
    if self.stale {
      return Some(
        "Live data is older than expected. Recommendations are based on \
         delayed queue updates."
          .to_owned(),
      );
    }
    None
  }
}
