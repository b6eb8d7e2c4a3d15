//! A [`ProviderAdapter`] over a JSON wait-time feed.
//!
//! Feeds are expected to speak one schema: a `rides` list and/or a `lands`
//! list whose entries carry their own `rides`. Each ride has a `name` and any
//! of `id`, `wait_time`, `is_open`, `status`, `queue_type`, `last_updated`
//! and `land`.

use std::time::Duration;

use anyhow::Context as _;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use queuecast_core::{
  attraction::{AttractionState, QueueKind, RideStatus},
  baseline::round_half_up,
  catalog::ParkDefinition,
  clock::Clock,
  provider::{ProviderAdapter, ProviderError},
};
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use crate::config::FeedConfig;

// ─── Wire format ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RideId {
  Text(String),
  Number(u64),
}

impl RideId {
  fn into_string(self) -> String {
    match self {
      Self::Text(s) => s,
      Self::Number(n) => n.to_string(),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeedRide {
  #[serde(default)]
  pub id:           Option<RideId>,
  pub name:         String,
  #[serde(default)]
  pub land:         Option<String>,
  #[serde(default)]
  pub is_open:      Option<bool>,
  #[serde(default)]
  pub status:       Option<String>,
  #[serde(default)]
  pub wait_time:    Option<f64>,
  #[serde(default)]
  pub queue_type:   Option<String>,
  #[serde(default)]
  pub last_updated: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeedLand {
  pub name:  String,
  #[serde(default)]
  pub rides: Vec<FeedRide>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FeedPayload {
  #[serde(default)]
  pub lands: Vec<FeedLand>,
  #[serde(default)]
  pub rides: Vec<FeedRide>,
}

/// Map a feed payload onto attraction states for `park`.
///
/// Rides with a blank name are dropped. `is_open = false` wins over any
/// status label; a missing timestamp falls back to `now`.
pub fn parse_feed(
  park: &ParkDefinition,
  provider: &str,
  payload: FeedPayload,
  now: DateTime<Utc>,
) -> Vec<AttractionState> {
  let nested = payload.lands.into_iter().flat_map(|land| {
    let land_name = land.name;
    land.rides.into_iter().map(move |mut ride| {
      ride.land.get_or_insert_with(|| land_name.clone());
      ride
    })
  });

  nested
    .chain(payload.rides)
    .enumerate()
    .filter_map(|(index, ride)| {
      let name = ride.name.trim().to_owned();
      if name.is_empty() {
        return None;
      }
      let status = match (ride.is_open, ride.status.as_deref()) {
        (Some(false), _) => RideStatus::Down,
        (_, Some(label)) => RideStatus::from_label(label),
        (Some(true), None) => RideStatus::Operating,
        (None, None) => RideStatus::Unknown,
      };
      Some(AttractionState {
        park_id: park.id.clone(),
        attraction_id: ride
          .id
          .map(RideId::into_string)
          .unwrap_or_else(|| format!("{}-{index}", park.id)),
        name,
        land: ride.land,
        status,
        wait_minutes: ride
          .wait_time
          .filter(|w| w.is_finite())
          .map(|w| round_half_up(w.max(0.0)) as u32),
        queue_kind: QueueKind::from_label(ride.queue_type.as_deref().unwrap_or_default()),
        source_updated_at: ride.last_updated.unwrap_or(now),
        ingested_at: now,
        provider: provider.to_owned(),
      })
    })
    .collect()
}

// ─── Provider ────────────────────────────────────────────────────────────────

/// Polls one configured feed over HTTP.
pub struct FeedProvider {
  client: Client,
  config: FeedConfig,
  clock:  Clock,
}

impl FeedProvider {
  pub fn new(config: FeedConfig, clock: Clock) -> anyhow::Result<Self> {
    let client = Client::builder()
      .timeout(Duration::from_secs(config.timeout_secs))
      .build()
      .context("failed to build HTTP client")?;
    Ok(Self { client, config, clock })
  }

  pub fn url_for(&self, park: &ParkDefinition) -> String {
    let upstream = self
      .config
      .park_ids
      .get(&park.id)
      .map_or(park.id.as_str(), String::as_str);
    self.config.url_template.replace("{park}", upstream)
  }
}

#[async_trait]
impl ProviderAdapter for FeedProvider {
  fn key(&self) -> &str { &self.config.key }

  fn stale_after_secs(&self) -> u64 { self.config.stale_after_secs }

  async fn fetch(&self, park: &ParkDefinition) -> Result<Vec<AttractionState>, ProviderError> {
    let url = self.url_for(park);
    let resp = self.client.get(&url).send().await.map_err(|e| {
      if e.is_timeout() {
        ProviderError::Timeout(Duration::from_secs(self.config.timeout_secs))
      } else {
        ProviderError::Transport(e.to_string())
      }
    })?;

    if !resp.status().is_success() {
      return Err(ProviderError::Transport(format!("GET {url} → {}", resp.status())));
    }
    let payload: FeedPayload = resp
      .json()
      .await
      .map_err(|e| ProviderError::Malformed(e.to_string()))?;

    let rides = parse_feed(park, &self.config.key, payload, (self.clock)());
    debug!(park = %park.id, feed = %self.config.key, rides = rides.len(), "feed fetched");
    if rides.is_empty() {
      return Err(ProviderError::Empty);
    }
    Ok(rides)
  }
}
