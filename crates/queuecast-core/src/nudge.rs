//! Nudge engine: cooldown-limited alerts from consecutive snapshots.
//!
//! Each call diffs the snapshot against the previous one seen for the same
//! park. State lives for the lifetime of the engine and is not persisted.

use std::{collections::HashMap, sync::Arc};

use chrono::{DateTime, Duration, Timelike, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
  attraction::RideStatus,
  baseline::offset_from_minutes,
  clock::Clock,
  history::HistoryStore,
  opportunity::OpportunityScorer,
  snapshot::LiveSnapshot,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NudgeKind {
  WaitDrop,
  BestMove,
  Closure,
}

impl NudgeKind {
  pub fn priority(self) -> u32 {
    match self {
      Self::Closure => 100,
      Self::WaitDrop => 90,
      Self::BestMove => 70,
    }
  }

  fn slug(self) -> &'static str {
    match self {
      Self::WaitDrop => "waitdrop",
      Self::BestMove => "best",
      Self::Closure => "closure",
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Nudge {
  pub id:                    String,
  pub park_id:               String,
  #[serde(rename = "type")]
  pub kind:                  NudgeKind,
  pub title:                 String,
  pub message:               String,
  pub attraction_id:         Option<String>,
  pub attraction_name:       Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub previous_wait_minutes: Option<u32>,
  pub current_wait_minutes:  Option<u32>,
  pub priority:              u32,
  pub created_at:            DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NudgeConfig {
  pub wait_drop_min_from:  u32,
  pub wait_drop_min_delta: u32,
  pub best_move_max_wait:  u32,
  pub cooldown_secs:       u64,
  pub limit:               usize,
  /// Local hour at which quiet hours begin. Equal start and end disables
  /// them; start after end wraps past midnight.
  pub quiet_hours_start:   u32,
  pub quiet_hours_end:     u32,
  /// Park-local wall clock for quiet hours, minutes east of UTC.
  pub utc_offset_minutes:  i32,
}

impl Default for NudgeConfig {
  fn default() -> Self {
    Self {
      wait_drop_min_from:  20,
      wait_drop_min_delta: 8,
      best_move_max_wait:  45,
      cooldown_secs:       240,
      limit:               4,
      quiet_hours_start:   0,
      quiet_hours_end:     0,
      utc_offset_minutes:  -300,
    }
  }
}

impl NudgeConfig {
  pub fn in_quiet_hours(&self, at: DateTime<Utc>) -> bool {
    let (start, end) = (self.quiet_hours_start, self.quiet_hours_end);
    if start == end {
      return false;
    }
    let hour = at.with_timezone(&offset_from_minutes(self.utc_offset_minutes)).hour();
    if start > end {
      hour >= start || hour < end
    } else {
      hour >= start && hour < end
    }
  }
}

#[derive(Debug, Clone, Copy)]
struct Observed {
  wait_minutes: Option<u32>,
  status:       RideStatus,
}

/// Cooldown key: park, kind, and the attraction (or `"park"`).
type CooldownKey = (String, NudgeKind, String);

#[derive(Default)]
struct NudgeState {
  previous:     HashMap<String, HashMap<String, Observed>>,
  last_emitted: HashMap<CooldownKey, DateTime<Utc>>,
}

impl NudgeState {
  fn remember(&mut self, snapshot: &LiveSnapshot) {
    let observed = snapshot
      .attractions
      .iter()
      .map(|a| {
        (a.attraction_id.clone(), Observed { wait_minutes: a.wait_minutes, status: a.status })
      })
      .collect();
    self.previous.insert(snapshot.park_id.clone(), observed);
  }

  /// Claim the cooldown slot for `key` if it is free.
  fn try_claim(&mut self, key: CooldownKey, now: DateTime<Utc>, cooldown: Duration) -> bool {
    if let Some(last) = self.last_emitted.get(&key) {
      if now - *last <= cooldown {
        return false;
      }
    }
    self.last_emitted.insert(key, now);
    true
  }
}

// ─── Engine ──────────────────────────────────────────────────────────────────

pub struct NudgeEngine<H> {
  scorer: Arc<OpportunityScorer<H>>,
  config: NudgeConfig,
  clock:  Clock,
  state:  Mutex<NudgeState>,
}

impl<H: HistoryStore> NudgeEngine<H> {
  pub fn new(scorer: Arc<OpportunityScorer<H>>, config: NudgeConfig, clock: Clock) -> Self {
    Self { scorer, config, clock, state: Mutex::new(NudgeState::default()) }
  }

  pub fn config(&self) -> &NudgeConfig { &self.config }

  /// Nudges for `snapshot`, highest priority first. The snapshot always
  /// becomes the park's previous state, quiet hours included.
  pub async fn evaluate(&self, snapshot: &LiveSnapshot) -> Vec<Nudge> {
    let now = (self.clock)();
    if self.config.in_quiet_hours(now) {
      debug!(park = %snapshot.park_id, "quiet hours; nudges suppressed");
      self.state.lock().remember(snapshot);
      return Vec::new();
    }

    let recommendation = self.scorer.recommend_next(snapshot).await;
    let cooldown = Duration::seconds(self.config.cooldown_secs as i64);
    let park_id = snapshot.park_id.as_str();
    let mut nudges = Vec::new();

    let mut state = self.state.lock();
    let previous = state.previous.get(park_id).cloned().unwrap_or_default();

    for live in &snapshot.attractions {
      let Some(prev) = previous.get(&live.attraction_id) else {
        continue;
      };
      let key = |kind| (park_id.to_owned(), kind, live.attraction_id.clone());

      if let (Some(before), Some(after)) = (prev.wait_minutes, live.wait_minutes) {
        let dropped = before >= self.config.wait_drop_min_from
          && before.saturating_sub(after) >= self.config.wait_drop_min_delta;
        if dropped && state.try_claim(key(NudgeKind::WaitDrop), now, cooldown) {
          nudges.push(self.nudge(NudgeKind::WaitDrop, park_id, now, NudgeBody {
            title: format!("{} just got faster", live.name),
            message: format!(
              "Wait dropped from {before}m to {after}m. This is a good move now."
            ),
            attraction_id: Some(live.attraction_id.clone()),
            attraction_name: Some(live.name.clone()),
            previous_wait_minutes: Some(before),
            current_wait_minutes: Some(after),
            ..NudgeBody::default()
          }));
        }
      }

      let closed = prev.status.is_operating() && !live.status.is_operating();
      if closed && state.try_claim(key(NudgeKind::Closure), now, cooldown) {
        nudges.push(self.nudge(NudgeKind::Closure, park_id, now, NudgeBody {
          title: format!("{} is currently unavailable", live.name),
          message: "This ride just transitioned out of operating status. Replan to avoid queue \
                    dead time."
            .to_owned(),
          attraction_id: Some(live.attraction_id.clone()),
          attraction_name: Some(live.name.clone()),
          current_wait_minutes: live.wait_minutes,
          ..NudgeBody::default()
        }));
      }
    }

    if let Some(top) = recommendation.top {
      if let Some(wait) = top.wait_minutes.filter(|w| *w <= self.config.best_move_max_wait) {
        let key = (park_id.to_owned(), NudgeKind::BestMove, top.attraction_id.clone());
        if state.try_claim(key, now, cooldown) {
          nudges.push(self.nudge(NudgeKind::BestMove, park_id, now, NudgeBody {
            title: "Strong next move available".to_owned(),
            message: format!("{} is at {wait}m. Throughput is favorable if you go now.", top.name),
            attraction_id: Some(top.attraction_id.clone()),
            attraction_name: Some(top.name.clone()),
            current_wait_minutes: Some(wait),
            ..NudgeBody::default()
          }));
        }
      }
    }

    state.remember(snapshot);
    drop(state);

    nudges.sort_by(|a, b| b.priority.cmp(&a.priority));
    nudges.truncate(self.config.limit);
    nudges
  }

  fn nudge(&self, kind: NudgeKind, park_id: &str, now: DateTime<Utc>, body: NudgeBody) -> Nudge {
    let subject = body.attraction_id.as_deref().unwrap_or("park");
    Nudge {
      id: format!("nudge-{park_id}-{}-{subject}-{}", kind.slug(), now.timestamp_millis()),
      park_id: park_id.to_owned(),
      kind,
      title: body.title,
      message: body.message,
      attraction_id: body.attraction_id,
      attraction_name: body.attraction_name,
      previous_wait_minutes: body.previous_wait_minutes,
      current_wait_minutes: body.current_wait_minutes,
      priority: kind.priority(),
      created_at: now,
    }
  }
}

/// The kind-specific content of a nudge.
#[derive(Debug, Default)]
struct NudgeBody {
  title:                 String,
  message:               String,
  attraction_id:         Option<String>,
  attraction_name:       Option<String>,
  previous_wait_minutes: Option<u32>,
  current_wait_minutes:  Option<u32>,
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone;

  use super::*;
  use crate::{
    attraction::{AttractionState, QueueKind},
    catalog::ParkCatalog,
    clock::ManualClock,
    history::HistoryLimits,
    memory::MemoryHistoryStore,
  };

  // 11:00 local at UTC-5.
  fn start() -> DateTime<Utc> { Utc.with_ymd_and_hms(2026, 5, 6, 16, 0, 0).unwrap() }

  fn snapshot(at: DateTime<Utc>, rides: &[(&str, RideStatus, Option<u32>)]) -> LiveSnapshot {
    let park = ParkCatalog::orlando().get("disney-magic-kingdom").cloned().unwrap();
    let attractions = rides
      .iter()
      .map(|(name, status, wait)| AttractionState {
        park_id:           park.id.clone(),
        attraction_id:     name.to_lowercase().replace(' ', "-"),
        name:              (*name).to_owned(),
        land:              None,
        status:            *status,
        wait_minutes:      *wait,
        queue_kind:        QueueKind::Standby,
        source_updated_at: at,
        ingested_at:       at,
        provider:          "test".into(),
      })
      .collect();
    LiveSnapshot::assemble(&park, "test", attractions, 10_800, at).unwrap()
  }

  fn new_engine(clock: &ManualClock, config: NudgeConfig) -> NudgeEngine<MemoryHistoryStore> {
    let history = Arc::new(MemoryHistoryStore::new(HistoryLimits::default(), clock.clock()));
    let scorer = Arc::new(OpportunityScorer::new(history, clock.clock()));
    NudgeEngine::new(scorer, config, clock.clock())
  }

  fn of_kind(nudges: &[Nudge], kind: NudgeKind) -> Vec<&Nudge> {
    nudges.iter().filter(|n| n.kind == kind).collect()
  }

  #[tokio::test]
  async fn wait_drop_fires_on_second_poll() {
    let clock = ManualClock::new(start());
    let engine = new_engine(&clock, NudgeConfig::default());

    let first = engine
      .evaluate(&snapshot(start(), &[("Space Mountain", RideStatus::Operating, Some(40))]))
      .await;
    assert!(of_kind(&first, NudgeKind::WaitDrop).is_empty());

    clock.advance(Duration::seconds(60));
    let second = engine
      .evaluate(&snapshot(clock.now(), &[("Space Mountain", RideStatus::Operating, Some(15))]))
      .await;
    let drops = of_kind(&second, NudgeKind::WaitDrop);
    assert_eq!(drops.len(), 1);
    let nudge = drops[0];
    assert_eq!(nudge.title, "Space Mountain just got faster");
    assert_eq!(nudge.message, "Wait dropped from 40m to 15m. This is a good move now.");
    assert_eq!(nudge.previous_wait_minutes, Some(40));
    assert_eq!(nudge.priority, 90);
    assert_eq!(
      nudge.id,
      format!("nudge-disney-magic-kingdom-waitdrop-space-mountain-{}", clock.now().timestamp_millis())
    );
  }

  #[tokio::test]
  async fn cooldown_suppresses_repeat_drops() {
    let clock = ManualClock::new(start());
    let engine = new_engine(&clock, NudgeConfig::default());
    let ride = |wait| snapshot(start(), &[("Space Mountain", RideStatus::Operating, Some(wait))]);

    engine.evaluate(&ride(40)).await;
    clock.advance(Duration::seconds(30));
    let a = engine.evaluate(&ride(25)).await;
    engine.evaluate(&ride(40)).await;
    clock.advance(Duration::seconds(30));
    let b = engine.evaluate(&ride(25)).await;
    assert_eq!(of_kind(&a, NudgeKind::WaitDrop).len() + of_kind(&b, NudgeKind::WaitDrop).len(), 1);

    // Exactly at the boundary is still inside the window.
    clock.set(start() + Duration::seconds(30 + 240));
    engine.evaluate(&ride(40)).await;
    assert!(of_kind(&engine.evaluate(&ride(25)).await, NudgeKind::WaitDrop).is_empty());

    clock.advance(Duration::seconds(1));
    engine.evaluate(&ride(40)).await;
    assert_eq!(of_kind(&engine.evaluate(&ride(25)).await, NudgeKind::WaitDrop).len(), 1);
  }

  #[tokio::test]
  async fn small_or_low_drops_are_ignored() {
    let clock = ManualClock::new(start());
    let engine = new_engine(&clock, NudgeConfig::default());
    let at = start();
    engine
      .evaluate(&snapshot(at, &[
        ("Small", RideStatus::Operating, Some(30)),
        ("Low", RideStatus::Operating, Some(18)),
      ]))
      .await;
    let out = engine
      .evaluate(&snapshot(at, &[
        ("Small", RideStatus::Operating, Some(25)),
        ("Low", RideStatus::Operating, Some(5)),
      ]))
      .await;
    assert!(of_kind(&out, NudgeKind::WaitDrop).is_empty());
  }

  #[tokio::test]
  async fn closure_outranks_everything() {
    let clock = ManualClock::new(start());
    let engine = new_engine(&clock, NudgeConfig::default());
    engine
      .evaluate(&snapshot(start(), &[
        ("Space Mountain", RideStatus::Operating, Some(60)),
        ("Jungle Cruise", RideStatus::Operating, Some(30)),
      ]))
      .await;
    let out = engine
      .evaluate(&snapshot(start(), &[
        ("Space Mountain", RideStatus::Down, None),
        ("Jungle Cruise", RideStatus::Operating, Some(30)),
      ]))
      .await;
    assert_eq!(out[0].kind, NudgeKind::Closure);
    assert_eq!(out[0].attraction_name.as_deref(), Some("Space Mountain"));
    assert!(out.windows(2).all(|w| w[0].priority >= w[1].priority));
  }

  #[tokio::test]
  async fn unknown_status_counts_as_a_closure() {
    let clock = ManualClock::new(start());
    let engine = new_engine(&clock, NudgeConfig::default());
    engine
      .evaluate(&snapshot(start(), &[("Space Mountain", RideStatus::Operating, Some(60))]))
      .await;
    let out = engine
      .evaluate(&snapshot(start(), &[("Space Mountain", RideStatus::Unknown, None)]))
      .await;
    let closures = of_kind(&out, NudgeKind::Closure);
    assert_eq!(closures.len(), 1);
    assert_eq!(closures[0].title, "Space Mountain is currently unavailable");
    assert_eq!(closures[0].priority, 100);

    // Already down: no new transition.
    clock.advance(Duration::minutes(10));
    let again = engine
      .evaluate(&snapshot(clock.now(), &[("Space Mountain", RideStatus::Down, None)]))
      .await;
    assert!(of_kind(&again, NudgeKind::Closure).is_empty());
  }

  #[tokio::test]
  async fn best_move_respects_ceiling_and_cooldown() {
    let clock = ManualClock::new(start());
    let engine = new_engine(&clock, NudgeConfig::default());
    let snap = snapshot(start(), &[
      ("Space Mountain", RideStatus::Operating, Some(50)),
      ("Jungle Cruise", RideStatus::Operating, Some(30)),
    ]);

    let first = engine.evaluate(&snap).await;
    let best = of_kind(&first, NudgeKind::BestMove);
    assert_eq!(best.len(), 1);
    assert_eq!(best[0].attraction_id.as_deref(), Some("jungle-cruise"));
    assert_eq!(best[0].message, "Jungle Cruise is at 30m. Throughput is favorable if you go now.");

    assert!(of_kind(&engine.evaluate(&snap).await, NudgeKind::BestMove).is_empty());

    let busy = snapshot(start(), &[("Space Mountain", RideStatus::Operating, Some(50))]);
    let other = new_engine(&clock, NudgeConfig::default());
    assert!(other.evaluate(&busy).await.is_empty());
  }

  #[tokio::test]
  async fn quiet_hours_suppress_but_still_track_state() {
    let clock = ManualClock::new(start());
    // 10:00-12:00 local covers 11:00.
    let config = NudgeConfig { quiet_hours_start: 10, quiet_hours_end: 12, ..Default::default() };
    let engine = new_engine(&clock, config);

    engine
      .evaluate(&snapshot(start(), &[("Space Mountain", RideStatus::Operating, Some(40))]))
      .await;
    let quiet = engine
      .evaluate(&snapshot(start(), &[("Space Mountain", RideStatus::Operating, Some(15))]))
      .await;
    assert!(quiet.is_empty());

    // After quiet hours the 15 → 15 poll is not a drop.
    clock.set(start() + Duration::hours(2));
    let after = engine
      .evaluate(&snapshot(clock.now(), &[("Space Mountain", RideStatus::Operating, Some(15))]))
      .await;
    assert!(of_kind(&after, NudgeKind::WaitDrop).is_empty());
  }

  #[test]
  fn quiet_hours_wrap_midnight() {
    let config = NudgeConfig {
      quiet_hours_start: 22,
      quiet_hours_end: 6,
      utc_offset_minutes: 0,
      ..Default::default()
    };
    let at = |h| Utc.with_ymd_and_hms(2026, 5, 6, h, 30, 0).unwrap();
    assert!(config.in_quiet_hours(at(23)));
    assert!(config.in_quiet_hours(at(2)));
    assert!(!config.in_quiet_hours(at(6)));
    assert!(!config.in_quiet_hours(at(12)));
    assert!(!NudgeConfig::default().in_quiet_hours(at(3)));
  }

  #[tokio::test]
  async fn output_is_capped() {
    let clock = ManualClock::new(start());
    let config = NudgeConfig { limit: 2, ..Default::default() };
    let engine = new_engine(&clock, config);
    let names = ["A Ride", "B Ride", "C Ride", "D Ride"];
    let before: Vec<_> = names.iter().map(|n| (*n, RideStatus::Operating, Some(60))).collect();
    let after: Vec<_> = names.iter().map(|n| (*n, RideStatus::Operating, Some(20))).collect();
    engine.evaluate(&snapshot(start(), &before)).await;
    let out = engine.evaluate(&snapshot(start(), &after)).await;
    assert_eq!(out.len(), 2);
  }
}
