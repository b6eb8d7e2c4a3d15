//! JSON REST API for Queuecast.
//!
//! Exposes an axum [`Router`] over a [`SnapshotAggregator`], an
//! [`OpportunityScorer`] and a [`NudgeEngine`] sharing one history backend.
//! TLS, auth and transport concerns are the caller's responsibility.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", queuecast_api::api_router(state))
//! ```

pub mod error;
pub mod health;
pub mod nudges;
pub mod parks;

use std::sync::Arc;

use axum::{Router, routing::get};
use queuecast_core::{
  aggregator::SnapshotAggregator,
  clock::Clock,
  history::HistoryStore,
  nudge::{NudgeConfig, NudgeEngine},
  opportunity::OpportunityScorer,
};

pub use error::ApiError;

// ─── Application state ───────────────────────────────────────────────────────

/// Shared state threaded through all handlers.
pub struct AppState<H> {
  pub aggregator: Arc<SnapshotAggregator<H>>,
  pub scorer:     Arc<OpportunityScorer<H>>,
  pub nudges:     Arc<NudgeEngine<H>>,
  pub clock:      Clock,
}

// Manual impl: `H` itself need not be `Clone`.
impl<H> Clone for AppState<H> {
  fn clone(&self) -> Self {
    Self {
      aggregator: self.aggregator.clone(),
      scorer:     self.scorer.clone(),
      nudges:     self.nudges.clone(),
      clock:      self.clock.clone(),
    }
  }
}

impl<H: HistoryStore> AppState<H> {
  /// Wire a scorer and nudge engine onto the aggregator's history store.
  pub fn new(aggregator: SnapshotAggregator<H>, nudges: NudgeConfig, clock: Clock) -> Self {
    let scorer = Arc::new(OpportunityScorer::new(aggregator.history().clone(), clock.clone()));
    let engine = NudgeEngine::new(scorer.clone(), nudges, clock.clone());
    Self {
      aggregator: Arc::new(aggregator),
      scorer,
      nudges: Arc::new(engine),
      clock,
    }
  }
}

// ─── Router ──────────────────────────────────────────────────────────────────

/// Build the API router for `state`.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<H: HistoryStore>(state: AppState<H>) -> Router<()> {
  Router::new()
    // Parks
    .route("/parks", get(parks::list::<H>))
    .route("/parks/{id}/live", get(parks::live::<H>))
    .route("/parks/{id}/opportunities", get(parks::opportunities::<H>))
    .route("/parks/{id}/nudges", get(nudges::handler::<H>))
    // Health
    .route("/health/live", get(health::live::<H>))
    .with_state(state)
}

// ─── Tests ───────────────────────────────────────────────────────────────────
