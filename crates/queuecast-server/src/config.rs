//! Runtime server configuration.
//!
//! Read from `config.toml` (optional) and overridden by `QUEUECAST__*`
//! environment variables, e.g. `QUEUECAST__BACKEND__KIND=sqlite`.

use std::{collections::BTreeMap, path::{Path, PathBuf}, time::Duration};

use anyhow::Context as _;
use queuecast_core::{
  aggregator::AggregatorConfig,
  history::HistoryLimits,
  nudge::NudgeConfig,
  persist::DEFAULT_FLUSH_DEBOUNCE,
  provider::DEFAULT_STALE_AFTER_SECS,
};
use serde::Deserialize;

// ─── Sections ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
  #[default]
  Text,
  Json,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
  #[default]
  Memory,
  Sqlite,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
  pub kind:                  BackendKind,
  pub sqlite_path:           PathBuf,
  /// How often the aggregate baseline tables are rebuilt.
  pub baseline_refresh_secs: u64,
  /// Raw observations older than this are deleted on each refresh.
  pub prune_retention_days:  u32,
}

impl Default for BackendConfig {
  fn default() -> Self {
    Self {
      kind:                  BackendKind::Memory,
      sqlite_path:           PathBuf::from("data/queuecast.sqlite"),
      baseline_refresh_secs: 900,
      prune_retention_days:  120,
    }
  }
}

/// History limits plus the in-process store's persistence options.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
  pub history_weeks:      u32,
  pub max_bucket_samples: usize,
  pub max_hour_samples:   usize,
  pub max_global_samples: usize,
  pub max_recent_points:  usize,
  pub utc_offset_minutes: i32,
  /// Where the in-process store keeps its JSON snapshot. Unset disables
  /// persistence.
  pub persist_path:       Option<PathBuf>,
  pub flush_debounce_ms:  u64,
}

impl Default for HistoryConfig {
  fn default() -> Self {
    let limits = HistoryLimits::default();
    Self {
      history_weeks:      limits.history_weeks,
      max_bucket_samples: limits.max_bucket_samples,
      max_hour_samples:   limits.max_hour_samples,
      max_global_samples: limits.max_global_samples,
      max_recent_points:  limits.max_recent_points,
      utc_offset_minutes: limits.utc_offset_minutes,
      persist_path:       None,
      flush_debounce_ms:  DEFAULT_FLUSH_DEBOUNCE.as_millis() as u64,
    }
  }
}

impl HistoryConfig {
  pub fn limits(&self) -> HistoryLimits {
    HistoryLimits {
      history_weeks:      self.history_weeks,
      max_bucket_samples: self.max_bucket_samples,
      max_hour_samples:   self.max_hour_samples,
      max_global_samples: self.max_global_samples,
      max_recent_points:  self.max_recent_points,
      utc_offset_minutes: self.utc_offset_minutes,
    }
  }

  pub fn flush_debounce(&self) -> Duration { Duration::from_millis(self.flush_debounce_ms) }
}

fn default_stale_after() -> u64 { DEFAULT_STALE_AFTER_SECS }

fn default_feed_timeout() -> u64 { 8 }

/// One upstream JSON feed. Feeds are tried in the order listed.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FeedConfig {
  pub key:              String,
  /// `{park}` is replaced with the upstream park id.
  pub url_template:     String,
  #[serde(default = "default_stale_after")]
  pub stale_after_secs: u64,
  #[serde(default = "default_feed_timeout")]
  pub timeout_secs:     u64,
  /// Catalog park id → upstream park id. Unmapped parks use their own id.
  #[serde(default)]
  pub park_ids:         BTreeMap<String, String>,
}

// ─── Root ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
  pub host:       String,
  pub port:       u16,
  pub log_format: LogFormat,
  pub backend:    BackendConfig,
  pub aggregator: AggregatorConfig,
  pub history:    HistoryConfig,
  pub nudges:     NudgeConfig,
  pub providers:  Vec<FeedConfig>,
}

impl Default for ServerConfig {
  fn default() -> Self {
    Self {
      host:       "127.0.0.1".to_owned(),
      port:       8080,
      log_format: LogFormat::Text,
      backend:    BackendConfig::default(),
      aggregator: AggregatorConfig::default(),
      history:    HistoryConfig::default(),
      nudges:     NudgeConfig::default(),
      providers:  Vec::new(),
    }
  }
}

impl ServerConfig {
  /// Layer `path` (if it exists) under `QUEUECAST__*` environment variables.
  pub fn load(path: &Path) -> anyhow::Result<Self> {
    let settings = config::Config::builder()
      .add_source(config::File::from(path).required(false))
      .add_source(config::Environment::with_prefix("QUEUECAST").separator("__"))
      .build()
      .context("failed to read config file")?;

    settings
      .try_deserialize()
      .context("failed to deserialise ServerConfig")
  }

  pub fn address(&self) -> String { format!("{}:{}", self.host, self.port) }
}

#[cfg(test)]
mod tests {
  use config::{Config, File, FileFormat};

  use super::*;

  fn parse(toml: &str) -> ServerConfig {
    Config::builder()
      .add_source(File::from_str(toml, FileFormat::Toml))
      .build()
      .unwrap()
      .try_deserialize()
      .unwrap()
  }

  #[test]
  fn empty_file_gives_defaults() {
    let cfg = parse("");
    assert_eq!(cfg, ServerConfig::default());
    assert_eq!(cfg.history.limits(), HistoryLimits::default());
    assert_eq!(cfg.history.flush_debounce(), Duration::from_millis(3000));
    assert_eq!(cfg.address(), "127.0.0.1:8080");
  }

  #[test]
  fn sections_override_defaults() {
    let cfg = parse(
      r#"
        port = 9000
        log_format = "json"

        [backend]
        kind = "sqlite"
        sqlite_path = "/var/lib/queuecast/history.sqlite"

        [aggregator]
        cache_ttl_secs = 30

        [history]
        utc_offset_minutes = -240
        persist_path = "history.json"

        [nudges]
        quiet_hours_start = 22
        quiet_hours_end = 7

        [[providers]]
        key = "queuetimes"
        url_template = "https://example.test/parks/{park}/queue_times.json"

        [providers.park_ids]
        disney-magic-kingdom = "6"
      "#,
    );
    assert_eq!(cfg.port, 9000);
    assert_eq!(cfg.log_format, LogFormat::Json);
    assert_eq!(cfg.backend.kind, BackendKind::Sqlite);
    assert_eq!(cfg.backend.baseline_refresh_secs, 900);
    assert_eq!(cfg.aggregator.cache_ttl_secs, 30);
    assert_eq!(cfg.aggregator.provider_timeout_secs, 8);
    assert_eq!(cfg.history.limits().utc_offset_minutes, -240);
    assert_eq!(cfg.history.persist_path, Some(PathBuf::from("history.json")));
    assert_eq!(cfg.nudges.quiet_hours_start, 22);
    assert_eq!(cfg.nudges.cooldown_secs, 240);

    let feed = &cfg.providers[0];
    assert_eq!(feed.stale_after_secs, 10_800);
    assert_eq!(feed.timeout_secs, 8);
    assert_eq!(feed.park_ids["disney-magic-kingdom"], "6");
  }
}
