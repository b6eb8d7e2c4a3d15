//! Opportunity scoring: which rides are unusually good or bad right now.
//!
//! Each operating attraction with a numeric wait is compared against its
//! baseline and penalised for recent flakiness. The ranking itself is a pure
//! function of the entries; only baseline and recent-point lookups touch the
//! history store.

use std::{cmp::Ordering, sync::Arc};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{
  attraction::AttractionState,
  baseline::{round_half_up, round_to, BaselineResult, BaselineSource, Confidence},
  clock::Clock,
  history::{HistoryStore, RecentPoint},
  snapshot::LiveSnapshot,
};

pub const LOOKBACK_MINUTES: i64 = 90;
pub const MAX_TREND_POINTS: usize = 18;
pub const MAX_LIST_LEN: usize = 3;

const RELATIVE_WEIGHT: f64 = 0.72;
const ABSOLUTE_WEIGHT: f64 = 0.28;
const LAND_BOOST: f64 = 0.04;
const RISK_PENALTY: f64 = 0.22;
/// A wait this short or shorter earns a positive absolute component.
const ABSOLUTE_PIVOT_MINUTES: f64 = 40.0;

pub const INSIGHT_HEALTHY: &str = "Baseline confidence is healthy for this park right now.";
pub const INSIGHT_LEARNING: &str =
  "Baseline is still learning; confidence improves as more historical samples accumulate.";

// ─── Types ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpportunityEntry {
  pub attraction_id:        String,
  pub attraction_name:      String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub land:                 Option<String>,
  pub current_wait_minutes: u32,
  pub typical_wait_minutes: u32,
  pub delta_minutes:        i64,
  pub delta_percent:        i64,
  pub confidence:           Confidence,
  pub baseline_source:      BaselineSource,
  pub score:                f64,
  pub reliability_risk:     f64,
  pub trend_points:         Vec<u32>,
}

impl OpportunityEntry {
  /// Trusted enough, and short enough to be worth walking to.
  pub fn is_best_move_candidate(&self) -> bool {
    self.confidence != Confidence::Low
      && self.baseline_source != BaselineSource::Fallback
      && self.current_wait_minutes > 0
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpportunitySnapshot {
  pub park_id:           String,
  pub generated_at:      DateTime<Utc>,
  pub hero:              Option<OpportunityEntry>,
  pub better_than_usual: Vec<OpportunityEntry>,
  pub worse_than_usual:  Vec<OpportunityEntry>,
  pub insight:           String,
}

/// Where to go next, with a few runners-up.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
  pub top:          Option<AttractionState>,
  pub alternatives: Vec<AttractionState>,
}

// ─── Pure scoring ────────────────────────────────────────────────────────────

/// Share of non-operating points plus a capped transition count, over the
/// points given. Fewer than two points carry no signal.
pub fn reliability_risk(points: &[RecentPoint]) -> f64 {
  if points.len() < 2 {
    return 0.0;
  }
  let down = points.iter().filter(|p| !p.status.is_operating()).count();
  let transitions = points
    .windows(2)
    .filter(|w| w[0].status != w[1].status)
    .count();
  let down_ratio = down as f64 / points.len() as f64;
  (down_ratio * 0.75 + transitions.min(8) as f64 / 8.0 * 0.25).min(1.0)
}

/// Numeric waits from `points`, subsampled at a fixed stride to at most
/// [`MAX_TREND_POINTS`]. Never empty.
pub fn trend_points(points: &[RecentPoint], current_wait: u32) -> Vec<u32> {
  let waits: Vec<u32> = points.iter().filter_map(|p| p.wait_minutes).collect();
  if waits.is_empty() {
    return vec![current_wait];
  }
  let stride = waits.len().div_ceil(MAX_TREND_POINTS).max(1);
  let sampled: Vec<u32> = waits.into_iter().step_by(stride).collect();
  let skip = sampled.len().saturating_sub(MAX_TREND_POINTS);
  sampled[skip..].to_vec()
}

/// Build the entry for one attraction. `None` unless it is operating with
/// a numeric wait.
pub fn build_entry(
  attraction: &AttractionState,
  baseline: &BaselineResult,
  recent: &[RecentPoint],
) -> Option<OpportunityEntry> {
  let current = attraction.operating_wait()?;
  // Without history an attraction sits at its own current wait.
  let typical = if baseline.is_fallback() { current } else { baseline.typical_wait_minutes };

  let delta_minutes = i64::from(current) - i64::from(typical);
  let (delta_percent, relative) = if typical > 0 {
    let typical = f64::from(typical);
    (
      round_half_up(100.0 * delta_minutes as f64 / typical) as i64,
      (typical - f64::from(current)) / typical,
    )
  } else {
    (0, 0.0)
  };

  let absolute = ((ABSOLUTE_PIVOT_MINUTES - f64::from(current)) / ABSOLUTE_PIVOT_MINUTES).clamp(-1.0, 1.0);
  let land_boost = if attraction.land.is_some() { LAND_BOOST } else { 0.0 };
  let risk = reliability_risk(recent);
  let score = (relative * RELATIVE_WEIGHT + absolute * ABSOLUTE_WEIGHT + land_boost)
    * baseline.confidence.weight()
    - risk * RISK_PENALTY;

  Some(OpportunityEntry {
    attraction_id: attraction.attraction_id.clone(),
    attraction_name: attraction.name.clone(),
    land: attraction.land.clone(),
    current_wait_minutes: current,
    typical_wait_minutes: typical,
    delta_minutes,
    delta_percent,
    confidence: baseline.confidence,
    baseline_source: baseline.source,
    score: round_to(score, 4),
    reliability_risk: round_to(risk, 3),
    trend_points: trend_points(recent, current),
  })
}

fn by_score_desc(a: &OpportunityEntry, b: &OpportunityEntry) -> Ordering {
  b.score.total_cmp(&a.score)
}

/// Split scored entries into the ranked lists and pick the hero.
pub fn rank(
  park_id: &str,
  entries: Vec<OpportunityEntry>,
  generated_at: DateTime<Utc>,
) -> OpportunitySnapshot {
  let mut better: Vec<OpportunityEntry> =
    entries.iter().filter(|e| e.delta_minutes < 0).cloned().collect();
  better.sort_by(|a, b| by_score_desc(a, b).then(a.delta_percent.cmp(&b.delta_percent)));
  better.truncate(MAX_LIST_LEN);

  let mut worse: Vec<OpportunityEntry> =
    entries.iter().filter(|e| e.delta_minutes > 0).cloned().collect();
  worse.sort_by(|a, b| {
    b.delta_percent
      .cmp(&a.delta_percent)
      .then(b.delta_minutes.cmp(&a.delta_minutes))
  });
  worse.truncate(MAX_LIST_LEN);

  let hero = better
    .iter()
    .find(|e| e.is_best_move_candidate())
    .or_else(|| {
      // First on ties, so earlier attractions win.
      entries
        .iter()
        .filter(|e| e.is_best_move_candidate())
        .reduce(|best, e| if e.score > best.score { e } else { best })
    })
    .cloned();

  let trusted = entries.iter().filter(|e| e.confidence != Confidence::Low).count();
  let insight = if trusted >= 3 { INSIGHT_HEALTHY } else { INSIGHT_LEARNING };

  OpportunitySnapshot {
    park_id: park_id.to_owned(),
    generated_at,
    hero,
    better_than_usual: better,
    worse_than_usual: worse,
    insight: insight.to_owned(),
  }
}

// ─── Scorer ──────────────────────────────────────────────────────────────────

/// Scores snapshots against a history store.
///
/// Store failures never fail a scoring pass: the attraction is scored with a
/// fallback baseline and no recent points.
pub struct OpportunityScorer<H> {
  history: Arc<H>,
  clock:   Clock,
}

impl<H: HistoryStore> OpportunityScorer<H> {
  pub fn new(history: Arc<H>, clock: Clock) -> Self { Self { history, clock } }

  pub async fn score(&self, snapshot: &LiveSnapshot) -> OpportunitySnapshot {
    let now = (self.clock)();
    let since = now - Duration::minutes(LOOKBACK_MINUTES);
    let mut entries = Vec::new();

    for attraction in &snapshot.attractions {
      if attraction.operating_wait().is_none() {
        continue;
      }
      let id = attraction.attraction_id.as_str();
      let baseline = self
        .history
        .baseline(&snapshot.park_id, id, now)
        .await
        .unwrap_or_else(|e| {
          warn!(park = %snapshot.park_id, attraction = id, error = %e, "baseline lookup failed");
          BaselineResult::fallback()
        });
      let recent = self
        .history
        .recent_points(&snapshot.park_id, id, since)
        .await
        .unwrap_or_else(|e| {
          warn!(park = %snapshot.park_id, attraction = id, error = %e, "recent points lookup failed");
          Vec::new()
        });
      entries.extend(build_entry(attraction, &baseline, &recent));
    }

    rank(&snapshot.park_id, entries, now)
  }

  /// The hero plus up to three further better-than-usual rides; without a
  /// hero, the shortest operating waits.
  pub async fn recommend_next(&self, snapshot: &LiveSnapshot) -> Recommendation {
    let opportunities = self.score(snapshot).await;
    let lookup = |id: &str| snapshot.attractions.iter().find(|a| a.attraction_id == id).cloned();

    if let Some(top) = opportunities.hero.as_ref().and_then(|h| lookup(&h.attraction_id)) {
      let alternatives = opportunities
        .better_than_usual
        .iter()
        .skip(1)
        .take(3)
        .filter_map(|e| lookup(&e.attraction_id))
        .collect();
      return Recommendation { top: Some(top), alternatives };
    }

    let mut open: Vec<&AttractionState> =
      snapshot.attractions.iter().filter(|a| a.operating_wait().is_some()).collect();
    open.sort_by_key(|a| a.wait_minutes);
    let mut open = open.into_iter().cloned();
    Recommendation {
      top:          open.next(),
      alternatives: open.take(3).collect(),
    }
  }
}
