//! Snapshot aggregator, the single gate between upstream feeds and the rest
//! of the system.
//!
//! A refresh polls every provider in priority order, keeps the best usable
//! response, filters out non-ride entities, caches the result with a TTL and
//! forwards it to history ingestion. When every provider fails the caller
//! still gets a snapshot: the last cached one marked stale, or a synthetic
//! one built from the park's headline attractions.

use std::{collections::HashMap, sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{
  attraction::{AttractionState, QueueKind, RideStatus},
  catalog::{ParkCatalog, ParkDefinition},
  clock::Clock,
  history::HistoryStore,
  provider::{ProviderAdapter, ProviderError},
  snapshot::{LiveSnapshot, ParkSummary, SYNTHETIC_PROVIDER},
  Error, Result,
};

/// A candidate within this many seconds of the current best does not
/// replace it.
pub const FRESHNESS_TOLERANCE_SECS: u64 = 60;

pub const STALE_CACHE_REASON: &str = "Serving last known data. Live providers unavailable.";
pub const SYNTHETIC_REASON: &str =
  "Live providers unavailable. Showing synthetic waits for UI continuity.";

/// Range of generated synthetic waits, inclusive.
pub const SYNTHETIC_WAIT_RANGE: (u32, u32) = (15, 70);

const NON_RIDE_WORDS: &[&str] = &[
  "restaurant", "restaurante", "dining", "diner", "cafe", "cafes", "grill", "grille", "inn",
  "tavern", "lounge", "snack", "market", "bakery", "bistro",
];

const RIDE_WORDS: &[&str] = &[
  "coaster", "mountain", "train", "railroad", "adventure", "flight", "journey", "run", "dash",
  "rapids", "safari", "speedway", "track", "expedition", "river", "mansion", "pirates", "spin",
  "tower",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregatorConfig {
  pub cache_ttl_secs:        u64,
  pub provider_timeout_secs: u64,
}

impl Default for AggregatorConfig {
  fn default() -> Self { Self { cache_ttl_secs: 45, provider_timeout_secs: 8 } }
}

// ─── Selection and filtering ─────────────────────────────────────────────────

/// `true` if `candidate` should replace `best`.
///
/// Not-stale always beats stale. Otherwise the candidate must be fresher by
/// more than [`FRESHNESS_TOLERANCE_SECS`], so nearly-equal providers do not
/// trade places on every poll.
pub fn is_preferred(candidate: &LiveSnapshot, best: &LiveSnapshot) -> bool {
  if candidate.stale != best.stale {
    return !candidate.stale;
  }
  candidate.freshness_seconds + FRESHNESS_TOLERANCE_SECS < best.freshness_seconds
}

fn words(name: &str) -> impl Iterator<Item = String> + '_ {
  name
    .split(|c: char| !c.is_ascii_alphanumeric())
    .filter(|w| !w.is_empty())
    .map(|w| w.to_ascii_lowercase())
}

fn normalize_name(name: &str) -> String { words(name).collect::<Vec<_>>().join(" ") }

fn mentions_any(name: &str, lexicon: &[&str]) -> bool {
  words(name).any(|w| lexicon.contains(&w.as_str()))
}

/// Whether an entity looks like a ride worth queueing for.
pub fn is_queue_relevant(attraction: &AttractionState, park_name: &str) -> bool {
  if normalize_name(&attraction.name) == normalize_name(park_name) {
    return false;
  }
  // Dining and retail are dropped even when they report a pseudo-queue.
  if mentions_any(&attraction.name, NON_RIDE_WORDS) {
    return false;
  }
  let has_queue_signal = attraction.wait_minutes.is_some() || attraction.queue_kind.is_known();
  if has_queue_signal {
    return true;
  }
  !attraction.status.is_operating() && mentions_any(&attraction.name, RIDE_WORDS)
}

/// Drop non-ride entities and recompute the summary. A filter that would
/// remove everything is not applied.
pub fn sanitize(snapshot: LiveSnapshot) -> LiveSnapshot {
  let kept: Vec<AttractionState> = snapshot
    .attractions
    .iter()
    .filter(|a| is_queue_relevant(a, &snapshot.park_name))
    .cloned()
    .collect();
  if kept.is_empty() {
    return snapshot;
  }
  snapshot.with_attractions(kept)
}

/// A structurally valid snapshot of random plausible waits over the park's
/// headline attractions.
pub fn synthesize(park: &ParkDefinition, now: DateTime<Utc>) -> LiveSnapshot {
  let mut rng = rand::thread_rng();
  let (low, high) = SYNTHETIC_WAIT_RANGE;
  let attractions: Vec<AttractionState> = park
    .headline_attractions
    .iter()
    .enumerate()
    .map(|(i, name)| AttractionState {
      park_id:           park.id.clone(),
      attraction_id:     format!("{}-synthetic-{}", park.id, i + 1),
      name:              name.clone(),
      land:              None,
      status:            RideStatus::Operating,
      wait_minutes:      Some(rng.gen_range(low..=high)),
      queue_kind:        QueueKind::Standby,
      source_updated_at: now,
      ingested_at:       now,
      provider:          SYNTHETIC_PROVIDER.to_owned(),
    })
    .collect();

  LiveSnapshot {
    park_id:           park.id.clone(),
    park_name:         park.name.clone(),
    provider:          SYNTHETIC_PROVIDER.to_owned(),
    source_updated_at: now,
    ingested_at:       now,
    freshness_seconds: 0,
    stale:             false,
    degraded_reason:   Some(SYNTHETIC_REASON.to_owned()),
    summary:           ParkSummary::from_attractions(&attractions),
    attractions,
  }
}

// ─── Aggregator ──────────────────────────────────────────────────────────────

struct CachedSnapshot {
  snapshot:   LiveSnapshot,
  expires_at: DateTime<Utc>,
  /// Bumped on every write; lets a caller that waited on the refresh lock
  /// notice that someone else already refreshed.
  generation: u64,
}

pub struct SnapshotAggregator<H> {
  catalog:   Arc<ParkCatalog>,
  providers: Vec<Arc<dyn ProviderAdapter>>,
  history:   Arc<H>,
  config:    AggregatorConfig,
  clock:     Clock,
  cache:     Mutex<HashMap<String, CachedSnapshot>>,
  refreshes: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl<H: HistoryStore> SnapshotAggregator<H> {
  /// `providers` are tried in the order given.
  pub fn new(
    catalog: Arc<ParkCatalog>,
    providers: Vec<Arc<dyn ProviderAdapter>>,
    history: Arc<H>,
    config: AggregatorConfig,
    clock: Clock,
  ) -> Self {
    Self {
      catalog,
      providers,
      history,
      config,
      clock,
      cache: Mutex::new(HashMap::new()),
      refreshes: Mutex::new(HashMap::new()),
    }
  }

  pub fn catalog(&self) -> &ParkCatalog { &self.catalog }

  pub fn history(&self) -> &Arc<H> { &self.history }

  /// The current snapshot for `park_id`.
  ///
  /// Serves the cache while it is fresh unless `force_refresh` is set. At
  /// most one refresh per park runs at a time; callers that queued behind
  /// it reuse its result. The only error is [`Error::UnknownPark`].
  pub async fn live_snapshot(&self, park_id: &str, force_refresh: bool) -> Result<LiveSnapshot> {
    let park = self
      .catalog
      .get(park_id)
      .ok_or_else(|| Error::UnknownPark(park_id.to_owned()))?;

    let seen = {
      let cache = self.cache.lock();
      let entry = cache.get(park_id);
      if !force_refresh {
        if let Some(entry) = entry.filter(|e| e.expires_at > (self.clock)()) {
          debug!(park = park_id, "serving cached snapshot");
          return Ok(entry.snapshot.clone());
        }
      }
      entry.map(|e| e.generation)
    };

    let lock = self.refresh_lock(park_id);
    let _guard = lock.lock().await;

    {
      let cache = self.cache.lock();
      if let Some(entry) = cache.get(park_id) {
        if Some(entry.generation) != seen {
          return Ok(entry.snapshot.clone());
        }
      }
    }

    Ok(self.refresh(park).await)
  }

  fn refresh_lock(&self, park_id: &str) -> Arc<tokio::sync::Mutex<()>> {
    self
      .refreshes
      .lock()
      .entry(park_id.to_owned())
      .or_default()
      .clone()
  }

  fn store(&self, snapshot: LiveSnapshot) {
    let expires_at =
      (self.clock)() + chrono::Duration::seconds(self.config.cache_ttl_secs as i64);
    let mut cache = self.cache.lock();
    let generation = cache.get(&snapshot.park_id).map_or(0, |e| e.generation + 1);
    cache.insert(snapshot.park_id.clone(), CachedSnapshot {
      snapshot,
      expires_at,
      generation,
    });
  }

  async fn refresh(&self, park: &ParkDefinition) -> LiveSnapshot {
    if let Some(best) = self.poll_providers(park).await {
      let snapshot = sanitize(best);
      self.store(snapshot.clone());
      match self.history.ingest(&snapshot).await {
        Ok(report) => debug!(
          park = %park.id,
          recorded = report.recorded,
          skipped = report.skipped,
          "history ingested"
        ),
        Err(e) => warn!(park = %park.id, error = %e, "history ingestion failed"),
      }
      return snapshot;
    }

    let cached = self.cache.lock().get(&park.id).map(|e| e.snapshot.clone());
    if let Some(mut last) = cached {
      warn!(park = %park.id, "all providers failed; serving last known snapshot");
      last.stale = true;
      if last.degraded_reason.is_none() {
        last.degraded_reason = Some(STALE_CACHE_REASON.to_owned());
      }
      return last;
    }

    warn!(park = %park.id, "all providers failed and nothing cached; synthesizing");
    let synthetic = synthesize(park, (self.clock)());
    self.store(synthetic.clone());
    synthetic
  }

  async fn poll_providers(&self, park: &ParkDefinition) -> Option<LiveSnapshot> {
    let timeout = Duration::from_secs(self.config.provider_timeout_secs);
    let mut best: Option<LiveSnapshot> = None;

    for provider in &self.providers {
      let result = tokio::time::timeout(timeout, provider.fetch(park))
        .await
        .unwrap_or(Err(ProviderError::Timeout(timeout)));
      let attractions = match result {
        Ok(list) if !list.is_empty() => list,
        Ok(_) => {
          warn!(park = %park.id, provider = provider.key(), error = %ProviderError::Empty, "provider failed");
          continue;
        }
        Err(e) => {
          warn!(park = %park.id, provider = provider.key(), error = %e, "provider failed");
          continue;
        }
      };

      let Some(candidate) = LiveSnapshot::assemble(
        park,
        provider.key(),
        attractions,
        provider.stale_after_secs(),
        (self.clock)(),
      ) else {
        continue;
      };

      best = match best {
        Some(current) if !is_preferred(&candidate, &current) => Some(current),
        _ => Some(candidate),
      };
    }

    if let Some(chosen) = &best {
      info!(
        park = %park.id,
        provider = %chosen.provider,
        freshness = chosen.freshness_seconds,
        stale = chosen.stale,
        "snapshot refreshed"
      );
    }
    best
  }
}
