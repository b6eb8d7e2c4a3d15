//! Error types for `queuecast-core`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("unknown park: {0}")]
  UnknownPark(String),

  #[error("persistence error: {0}")]
  Persistence(#[from] std::io::Error),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),

  #[error("unsupported history file version {0}")]
  UnsupportedVersion(u32),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
