//! queuecast server binary.
//!
//! Reads `config.toml` (or the path given with `--config`), opens the
//! configured history backend and serves the JSON API over HTTP.

use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::Context as _;
use clap::Parser;
use queuecast_core::{clock::system_clock, memory::MemoryHistoryStore};
use queuecast_server::{
  config::{BackendKind, ServerConfig},
  init_tracing,
  maintenance,
  serve,
};
use queuecast_store_sqlite::SqliteHistoryStore;

#[derive(Parser)]
#[command(author, version, about = "Queuecast wait-time server")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "config.toml")]
  config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  let cli = Cli::parse();
  let cfg = ServerConfig::load(&cli.config)?;
  init_tracing(cfg.log_format);

  let clock = system_clock();
  let limits = cfg.history.limits();

  match cfg.backend.kind {
    BackendKind::Memory => {
      let store = match &cfg.history.persist_path {
        Some(path) => MemoryHistoryStore::with_persistence(
          limits,
          clock.clone(),
          path.clone(),
          cfg.history.flush_debounce(),
        ),
        None => MemoryHistoryStore::new(limits, clock.clone()),
      };
      let store = Arc::new(store);
      serve(&cfg, store.clone(), clock).await?;

      // Pending debounced writes would otherwise be lost.
      if let Err(e) = store.flush().await {
        tracing::error!(error = %e, "final history flush failed");
      }
    }
    BackendKind::Sqlite => {
      let path = &cfg.backend.sqlite_path;
      if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)
          .with_context(|| format!("failed to create {}", dir.display()))?;
      }
      let store = SqliteHistoryStore::open(path)
        .await
        .with_context(|| format!("failed to open store at {path:?}"))?
        .with_limits(limits);

      let upkeep = maintenance::spawn(
        store.clone(),
        Duration::from_secs(cfg.backend.baseline_refresh_secs.max(1)),
        chrono::Duration::days(i64::from(cfg.backend.prune_retention_days)),
        clock.clone(),
      );
      serve(&cfg, Arc::new(store), clock).await?;
      upkeep.abort();
    }
  }

  Ok(())
}
