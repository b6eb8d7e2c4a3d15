//! Queuecast server: configuration, upstream feeds and process wiring.
//!
//! The binary in `main.rs` picks a history backend and hands it to
//! [`serve`]; everything else is backend-agnostic.

pub mod config;
pub mod feed;
pub mod maintenance;

use std::sync::Arc;

use anyhow::Context as _;
use axum::Router;
use queuecast_api::{AppState, api_router};
use queuecast_core::{
  aggregator::SnapshotAggregator,
  catalog::ParkCatalog,
  clock::Clock,
  history::HistoryStore,
  provider::ProviderAdapter,
};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use crate::{
  config::{FeedConfig, LogFormat, ServerConfig},
  feed::FeedProvider,
};

/// Install the global subscriber. `RUST_LOG` overrides the `INFO` default.
pub fn init_tracing(format: LogFormat) {
  let filter = EnvFilter::builder()
    .with_default_directive(LevelFilter::INFO.into())
    .from_env_lossy();
  let builder = tracing_subscriber::fmt().with_env_filter(filter);
  match format {
    LogFormat::Text => builder.init(),
    LogFormat::Json => builder.json().init(),
  }
}

/// One [`FeedProvider`] per configured feed, in priority order.
pub fn build_providers(
  feeds: &[FeedConfig],
  clock: &Clock,
) -> anyhow::Result<Vec<Arc<dyn ProviderAdapter>>> {
  feeds
    .iter()
    .map(|cfg| {
      let provider = FeedProvider::new(cfg.clone(), clock.clone())
        .with_context(|| format!("failed to configure feed {:?}", cfg.key))?;
      Ok(Arc::new(provider) as Arc<dyn ProviderAdapter>)
    })
    .collect()
}

/// The API nested under `/api`, with request tracing.
pub fn app<H: HistoryStore>(state: AppState<H>) -> Router {
  Router::new()
    .nest("/api", api_router(state))
    .layer(TraceLayer::new_for_http())
}

/// Build the engines over `history` and serve until Ctrl-C.
pub async fn serve<H: HistoryStore>(
  cfg: &ServerConfig,
  history: Arc<H>,
  clock: Clock,
) -> anyhow::Result<()> {
  let providers = build_providers(&cfg.providers, &clock)?;
  if providers.is_empty() {
    tracing::warn!("no providers configured; every park will be synthesized");
  }

  let aggregator = SnapshotAggregator::new(
    Arc::new(ParkCatalog::orlando()),
    providers,
    history,
    cfg.aggregator,
    clock.clone(),
  );
  let state = AppState::new(aggregator, cfg.nudges, clock);

  let address = cfg.address();
  tracing::info!("Listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(listener, app(state))
    .with_graceful_shutdown(async {
      let _ = tokio::signal::ctrl_c().await;
      tracing::info!("shutting down");
    })
    .await
    .context("server error")?;

  Ok(())
}
