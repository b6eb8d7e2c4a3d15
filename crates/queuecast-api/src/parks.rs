//! Handlers for `/parks` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/parks` | Catalog listing |
//! | `GET`  | `/parks/{id}/live` | Optional `?refresh=true`; 404 for unknown parks |
//! | `GET`  | `/parks/{id}/opportunities` | Optional `?refresh=true` |

use axum::{
  Json,
  extract::{Path, Query, State, rejection::QueryRejection},
};
use chrono::{DateTime, Utc};
use queuecast_core::{
  catalog::ParkListing,
  history::HistoryStore,
  opportunity::OpportunitySnapshot,
  snapshot::LiveSnapshot,
};
use serde::{Deserialize, Serialize};

use crate::{AppState, error::ApiError};

// ─── Shared ──────────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct RefreshParams {
  #[serde(default)]
  pub refresh: bool,
}

/// Read `?refresh=`, turning a malformed query into a 400.
pub(crate) fn refresh_flag(
  query: Result<Query<RefreshParams>, QueryRejection>,
) -> Result<bool, ApiError> {
  let Query(params) = query.map_err(|e| ApiError::BadQuery(e.body_text()))?;
  Ok(params.refresh)
}

/// Where a response's data came from and how old it is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DataFreshness {
  pub provider:          String,
  pub source_updated_at: DateTime<Utc>,
  pub age_seconds:       u64,
  pub stale:             bool,
}

impl From<&LiveSnapshot> for DataFreshness {
  fn from(snapshot: &LiveSnapshot) -> Self {
    Self {
      provider:          snapshot.provider.clone(),
      source_updated_at: snapshot.source_updated_at,
      age_seconds:       snapshot.freshness_seconds,
      stale:             snapshot.stale,
    }
  }
}

// ─── List ────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct ParkList {
  pub parks: Vec<ParkListing>,
}

/// `GET /parks`
pub async fn list<H: HistoryStore>(State(state): State<AppState<H>>) -> Json<ParkList> {
  Json(ParkList { parks: state.aggregator.catalog().listings() })
}

// ─── Live ────────────────────────────────────────────────────────────────────

/// `GET /parks/{id}/live[?refresh=true]`
pub async fn live<H: HistoryStore>(
  State(state): State<AppState<H>>,
  Path(park_id): Path<String>,
  query: Result<Query<RefreshParams>, QueryRejection>,
) -> Result<Json<LiveSnapshot>, ApiError> {
  let refresh = refresh_flag(query)?;
  let snapshot = state.aggregator.live_snapshot(&park_id, refresh).await?;
  Ok(Json(snapshot))
}

// ─── Opportunities ───────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OpportunityResponse {
  #[serde(flatten)]
  pub opportunities:  OpportunitySnapshot,
  pub data_freshness: DataFreshness,
}

/// `GET /parks/{id}/opportunities[?refresh=true]`
pub async fn opportunities<H: HistoryStore>(
  State(state): State<AppState<H>>,
  Path(park_id): Path<String>,
  query: Result<Query<RefreshParams>, QueryRejection>,
) -> Result<Json<OpportunityResponse>, ApiError> {
  let refresh = refresh_flag(query)?;
  let snapshot = state.aggregator.live_snapshot(&park_id, refresh).await?;
  let opportunities = state.scorer.score(&snapshot).await;
  Ok(Json(OpportunityResponse {
    opportunities,
    data_freshness: DataFreshness::from(&snapshot),
  }))
}
