//! Attraction state: one provider's view of one ride at one instant.
//!
//! Adapters produce these and nothing downstream mutates them; the
//! aggregator only filters and copies.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ─── Status ──────────────────────────────────────────────────────────────────

/// Operating status reported for a ride.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RideStatus {
  Operating,
  Down,
  Closed,
  Refurbishment,
  #[default]
  Unknown,
}

impl RideStatus {
  pub fn is_operating(self) -> bool { matches!(self, Self::Operating) }

  /// `true` for the states that count towards a park's down tally.
  pub fn is_unavailable(self) -> bool {
    matches!(self, Self::Down | Self::Closed | Self::Refurbishment)
  }

  /// Map a loose upstream label ("Open", "Temporarily Closed", "refurb")
  /// onto a status. Unrecognised labels become [`RideStatus::Unknown`].
  pub fn from_label(label: &str) -> Self {
    let value = label.to_lowercase();
    if ["operating", "open", "up"].iter().any(|t| value.contains(t)) {
      return Self::Operating;
    }
    if ["down", "closed", "temporarily"].iter().any(|t| value.contains(t)) {
      return Self::Down;
    }
    if ["refurb", "maintenance"].iter().any(|t| value.contains(t)) {
      return Self::Refurbishment;
    }
    Self::Unknown
  }

  pub fn as_str(self) -> &'static str {
    match self {
      Self::Operating => "OPERATING",
      Self::Down => "DOWN",
      Self::Closed => "CLOSED",
      Self::Refurbishment => "REFURBISHMENT",
      Self::Unknown => "UNKNOWN",
    }
  }

  /// Inverse of [`RideStatus::as_str`].
  pub fn parse(s: &str) -> Option<Self> {
    match s {
      "OPERATING" => Some(Self::Operating),
      "DOWN" => Some(Self::Down),
      "CLOSED" => Some(Self::Closed),
      "REFURBISHMENT" => Some(Self::Refurbishment),
      "UNKNOWN" => Some(Self::Unknown),
      _ => None,
    }
  }
}

// ─── Queue kind ──────────────────────────────────────────────────────────────

/// Which line the reported wait belongs to.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QueueKind {
  Standby,
  SingleRider,
  Virtual,
  #[default]
  Unknown,
}

impl QueueKind {
  /// Map an upstream queue label onto a kind. An empty label is read as
  /// standby, which is what feeds omit when there is only one line.
  pub fn from_label(label: &str) -> Self {
    let value = label.to_lowercase();
    if value.contains("single") {
      return Self::SingleRider;
    }
    if value.contains("virtual") || value.contains("boarding") {
      return Self::Virtual;
    }
    if value.is_empty() || value.contains("standby") || value.contains("stand-by") {
      return Self::Standby;
    }
    Self::Unknown
  }

  pub fn is_known(self) -> bool { !matches!(self, Self::Unknown) }

  pub fn as_str(self) -> &'static str {
    match self {
      Self::Standby => "STANDBY",
      Self::SingleRider => "SINGLE_RIDER",
      Self::Virtual => "VIRTUAL",
      Self::Unknown => "UNKNOWN",
    }
  }

  pub fn parse(s: &str) -> Option<Self> {
    match s {
      "STANDBY" => Some(Self::Standby),
      "SINGLE_RIDER" => Some(Self::SingleRider),
      "VIRTUAL" => Some(Self::Virtual),
      "UNKNOWN" => Some(Self::Unknown),
      _ => None,
    }
  }
}

// ─── Attraction ──────────────────────────────────────────────────────────────

/// One attraction as reported by one provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttractionState {
  pub park_id:           String,
  pub attraction_id:     String,
  pub name:              String,
  /// Land or area tag, when the provider knows it.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub land:              Option<String>,
  pub status:            RideStatus,
  /// `None` means the provider gave no queue signal at all.
  pub wait_minutes:      Option<u32>,
  pub queue_kind:        QueueKind,
  /// When the upstream claims this value was last updated.
  pub source_updated_at: DateTime<Utc>,
  /// When we received it.
  pub ingested_at:       DateTime<Utc>,
  pub provider:          String,
}

impl AttractionState {
  /// The wait, but only when the ride is operating and reports one.
  pub fn operating_wait(&self) -> Option<u32> {
    if self.status.is_operating() { self.wait_minutes } else { None }
  }
}
