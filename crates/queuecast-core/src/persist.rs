//! Durable flush of the in-process history store.
//!
//! Writes are fire-and-forget: ingestion calls [`FlushQueue::request`], which
//! never blocks, and a background task coalesces every request that arrives
//! within the debounce window into a single write.

use std::{
  collections::BTreeMap,
  future::Future,
  io::ErrorKind,
  path::{Path, PathBuf},
  time::Duration,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::{history::AttractionHistory, Error, Result};

pub const HISTORY_FILE_VERSION: u32 = 2;

pub const DEFAULT_FLUSH_DEBOUNCE: Duration = Duration::from_millis(3000);

/// On-disk form of the whole in-process store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedHistory {
  pub version:    u32,
  pub updated_at: Option<DateTime<Utc>>,
  /// park id → attraction id → history.
  pub parks:      BTreeMap<String, BTreeMap<String, AttractionHistory>>,
}

/// Read a history file. A missing file is `Ok(None)`.
pub fn load_snapshot(path: &Path) -> Result<Option<PersistedHistory>> {
  let raw = match std::fs::read(path) {
    Ok(raw) => raw,
    Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
    Err(e) => return Err(e.into()),
  };
  let saved: PersistedHistory = serde_json::from_slice(&raw)?;
  if saved.version != HISTORY_FILE_VERSION {
    return Err(Error::UnsupportedVersion(saved.version));
  }
  Ok(Some(saved))
}

/// Write `history` to `path` via a sibling temp file and a rename, so a
/// crash mid-write leaves the previous file intact.
pub async fn write_snapshot(path: &Path, history: &PersistedHistory) -> Result<()> {
  let body = serde_json::to_vec(history)?;
  if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
    tokio::fs::create_dir_all(dir).await?;
  }
  let tmp = temp_path(path);
  tokio::fs::write(&tmp, body).await?;
  tokio::fs::rename(&tmp, path).await?;
  Ok(())
}

fn temp_path(path: &Path) -> PathBuf {
  let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
  name.push(".tmp");
  path.with_file_name(name)
}

// ─── Queue ───────────────────────────────────────────────────────────────────

/// Handle for requesting a flush. Dropping every handle stops the worker.
#[derive(Debug, Clone)]
pub struct FlushQueue {
  tx: mpsc::Sender<()>,
}

impl FlushQueue {
  /// Ask for a flush. Returns immediately; if one is already pending the
  /// request is folded into it.
  pub fn request(&self) { let _ = self.tx.try_send(()); }
}

/// Spawn the debounce worker.
///
/// `flush` is awaited once per coalesced burst; returning `false` stops the
/// worker. Must be called from within a Tokio runtime.
pub fn spawn_flusher<F, Fut>(debounce: Duration, flush: F) -> FlushQueue
where
  F: Fn() -> Fut + Send + 'static,
  Fut: Future<Output = bool> + Send + 'static,
{
  let (tx, mut rx) = mpsc::channel::<()>(1);
  tokio::spawn(async move {
    while rx.recv().await.is_some() {
      tokio::time::sleep(debounce).await;
      while rx.try_recv().is_ok() {}
      if !flush().await {
        break;
      }
    }
  });
  FlushQueue { tx }
}
