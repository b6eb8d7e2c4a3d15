//! `GET /parks/{id}/nudges`: proactive alerts against a freshly polled
//! snapshot.

use axum::{
  Json,
  extract::{Path, State},
};
use queuecast_core::{history::HistoryStore, nudge::Nudge};
use serde::Serialize;

use crate::{AppState, error::ApiError, parks::DataFreshness};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NudgeResponse {
  pub nudges:         Vec<Nudge>,
  pub data_freshness: DataFreshness,
}

/// Always polls upstream; nudges are deltas against the previous poll.
pub async fn handler<H: HistoryStore>(
  State(state): State<AppState<H>>,
  Path(park_id): Path<String>,
) -> Result<Json<NudgeResponse>, ApiError> {
  let snapshot = state.aggregator.live_snapshot(&park_id, true).await?;
  let nudges = state.nudges.evaluate(&snapshot).await;
  Ok(Json(NudgeResponse {
    nudges,
    data_freshness: DataFreshness::from(&snapshot),
  }))
}
