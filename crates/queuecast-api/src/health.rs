//! `GET /health/live`: force-refresh every catalogued park and report how
//! much of the service is running on degraded data.

use axum::{Json, extract::State};
use chrono::{DateTime, Utc};
use queuecast_core::{history::HistoryStore, snapshot::LiveSnapshot};
use serde::Serialize;
use tracing::warn;

use crate::AppState;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParkHealth {
  pub park_id:           String,
  pub provider:          String,
  pub stale:             bool,
  pub degraded_reason:   Option<String>,
  pub freshness_seconds: Option<u64>,
  pub attractions:       usize,
}

impl From<&LiveSnapshot> for ParkHealth {
  fn from(s: &LiveSnapshot) -> Self {
    Self {
      park_id:           s.park_id.clone(),
      provider:          s.provider.clone(),
      stale:             s.stale,
      degraded_reason:   s.degraded_reason.clone(),
      freshness_seconds: Some(s.freshness_seconds),
      attractions:       s.attractions.len(),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthSummary {
  pub parks:           usize,
  pub synthetic_count: usize,
  pub stale_count:     usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
  /// `true` when no park is being served synthetic data.
  pub ok:           bool,
  pub generated_at: DateTime<Utc>,
  pub summary:      HealthSummary,
  pub parks:        Vec<ParkHealth>,
}

pub async fn live<H: HistoryStore>(State(state): State<AppState<H>>) -> Json<HealthReport> {
  let mut parks = Vec::new();
  for park in state.aggregator.catalog().parks() {
    let entry = match state.aggregator.live_snapshot(&park.id, true).await {
      Ok(snapshot) => ParkHealth::from(&snapshot),
      Err(e) => {
        warn!(park = %park.id, error = %e, "health check could not load park");
        ParkHealth {
          park_id:           park.id.clone(),
          provider:          "none".to_owned(),
          stale:             true,
          degraded_reason:   Some("No data".to_owned()),
          freshness_seconds: None,
          attractions:       0,
        }
      }
    };
    parks.push(entry);
  }

  let synthetic_count = parks
    .iter()
    .filter(|p| p.provider == queuecast_core::snapshot::SYNTHETIC_PROVIDER)
    .count();
  let stale_count = parks.iter().filter(|p| p.stale).count();

  Json(HealthReport {
    ok:           synthetic_count == 0,
    generated_at: (state.clock)(),
    summary:      HealthSummary { parks: parks.len(), synthetic_count, stale_count },
    parks,
  })
}
