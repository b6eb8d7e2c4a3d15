//! The `ProviderAdapter` capability. One implementation per upstream feed.
//!
//! Each adapter owns its upstream schema and any entity-resolution caching,
//! and maps what it receives into [`AttractionState`]s. The aggregator never
//! sees upstream payloads.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::{attraction::AttractionState, catalog::ParkDefinition};

/// Default staleness threshold: three hours.
pub const DEFAULT_STALE_AFTER_SECS: u64 = 3 * 60 * 60;

/// Why an adapter returned nothing. Never surfaced past the aggregator.
#[derive(Debug, Error)]
pub enum ProviderError {
  #[error("timed out after {0:?}")]
  Timeout(Duration),

  #[error("transport error: {0}")]
  Transport(String),

  #[error("malformed payload: {0}")]
  Malformed(String),

  #[error("provider returned no attractions")]
  Empty,
}

#[async_trait]
pub trait ProviderAdapter: Send + Sync {
  /// Stable key recorded on snapshots, e.g. `"themeparks"`.
  fn key(&self) -> &str;

  /// Snapshots whose newest update is older than this are flagged stale.
  fn stale_after_secs(&self) -> u64 { DEFAULT_STALE_AFTER_SECS }

  /// Fetch the current attraction list for `park`. An empty list is
  /// treated by the aggregator exactly like [`ProviderError::Empty`].
  async fn fetch(
    &self,
    park: &ParkDefinition,
  ) -> Result<Vec<AttractionState>, ProviderError>;
}
