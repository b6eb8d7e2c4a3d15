//! Periodic upkeep of the SQLite history backend.

use std::time::Duration;

use chrono::{DateTime, Utc};
use queuecast_core::clock::Clock;
use queuecast_store_sqlite::{RefreshReport, SqliteHistoryStore};
use tokio::{task::JoinHandle, time::MissedTickBehavior};
use tracing::warn;

/// Prune raw observations, then rebuild the baseline tables.
pub async fn run_once(
  store: &SqliteHistoryStore,
  retention: chrono::Duration,
  now: DateTime<Utc>,
) -> queuecast_store_sqlite::Result<RefreshReport> {
  store.prune_observations(retention, now).await?;
  store.refresh_baselines(now).await
}

/// Run [`run_once`] immediately and then every `every`. Failures are logged
/// and retried on the next tick.
pub fn spawn(
  store: SqliteHistoryStore,
  every: Duration,
  retention: chrono::Duration,
  clock: Clock,
) -> JoinHandle<()> {
  tokio::spawn(async move {
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
      ticker.tick().await;
      if let Err(e) = run_once(&store, retention, clock()).await {
        warn!(error = %e, "history maintenance failed");
      }
    }
  })
}
