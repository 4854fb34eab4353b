//! Reputation ledger events and the emitter that derives them from
//! aggregated match outcomes.
//!
//! The ledger is append-only. A player's reputation is a sum over it, which is
//! computed elsewhere.

use std::{collections::HashMap, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use strum::IntoEnumIterator as _;
use uuid::Uuid;

use crate::{Error, Result, aggregate::AggregatedOutcome, matches::Match};

// ─── Event types ─────────────────────────────────────────────────────────────

/// The scored behaviours the closure job records.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
  strum::IntoStaticStr,
  strum::EnumString,
  strum::EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EventType {
  MatchCompleted,
  MatchOnTime,
  MatchLate,
  MatchNoShow,
  #[serde(rename = "review_received_1star")]
  #[strum(serialize = "review_received_1star")]
  ReviewReceived1Star,
  #[serde(rename = "review_received_2star")]
  #[strum(serialize = "review_received_2star")]
  ReviewReceived2Star,
  #[serde(rename = "review_received_3star")]
  #[strum(serialize = "review_received_3star")]
  ReviewReceived3Star,
  #[serde(rename = "review_received_4star")]
  #[strum(serialize = "review_received_4star")]
  ReviewReceived4Star,
  #[serde(rename = "review_received_5star")]
  #[strum(serialize = "review_received_5star")]
  ReviewReceived5Star,
}

impl EventType {
  /// The string stored in the `event_type` column.
  pub fn as_str(self) -> &'static str { self.into() }

  pub fn parse(s: &str) -> Result<Self> {
    Self::from_str(s).map_err(|_| Error::UnknownEventType(s.to_owned()))
  }

  /// The `review_received_{n}star` type for an aggregated rating.
  pub fn review(stars: u8) -> Option<Self> {
    match stars {
      1 => Some(Self::ReviewReceived1Star),
      2 => Some(Self::ReviewReceived2Star),
      3 => Some(Self::ReviewReceived3Star),
      4 => Some(Self::ReviewReceived4Star),
      5 => Some(Self::ReviewReceived5Star),
      _ => None,
    }
  }

  /// Built-in impact used when the configuration table is unavailable or
  /// does not list this type.
  pub fn default_impact(self) -> i32 {
    match self {
      Self::MatchCompleted => 12,
      Self::MatchOnTime => 3,
      Self::MatchLate => -10,
      Self::MatchNoShow => -50,
      Self::ReviewReceived5Star => 10,
      Self::ReviewReceived4Star => 5,
      Self::ReviewReceived3Star => 0,
      Self::ReviewReceived2Star => -5,
      Self::ReviewReceived1Star => -10,
    }
  }
}

// ─── Impact table ────────────────────────────────────────────────────────────

/// Event type → base impact, loaded once at the start of a closure run and
/// dropped when the run ends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImpactTable {
  impacts: HashMap<EventType, i32>,
}

impl ImpactTable {
  pub fn defaults() -> Self {
    Self {
      impacts: EventType::iter().map(|t| (t, t.default_impact())).collect(),
    }
  }

  /// Defaults, overlaid with whatever the configuration source provides.
  pub fn with_overrides(
    overrides: impl IntoIterator<Item = (EventType, i32)>,
  ) -> Self {
    let mut table = Self::defaults();
    table.impacts.extend(overrides);
    table
  }

  pub fn impact(&self, event_type: EventType) -> i32 {
    self
      .impacts
      .get(&event_type)
      .copied()
      .unwrap_or_else(|| event_type.default_impact())
  }
}

impl Default for ImpactTable {
  fn default() -> Self { Self::defaults() }
}

// ─── Ledger rows ─────────────────────────────────────────────────────────────

/// An immutable ledger entry. Never updated or deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReputationEvent {
  pub event_id:          Uuid,
  pub player_id:         Uuid,
  pub event_type:        EventType,
  pub base_impact:       i32,
  pub match_id:          Option<Uuid>,
  pub metadata:          serde_json::Value,
  pub event_occurred_at: DateTime<Utc>,
  /// Server-assigned timestamp.
  pub created_at:        DateTime<Utc>,
}

/// Input to [`crate::store::MatchStore::append_reputation_events`].
#[derive(Debug, Clone, PartialEq)]
pub struct NewReputationEvent {
  pub player_id:         Uuid,
  pub event_type:        EventType,
  pub base_impact:       i32,
  pub match_id:          Option<Uuid>,
  pub metadata:          serde_json::Value,
  pub event_occurred_at: DateTime<Utc>,
}

// ─── Emitter ─────────────────────────────────────────────────────────────────

/// Translate one participant's aggregated outcome into ledger events.
///
/// - showed up: `match_completed`, then `match_late` or `match_on_time` if
///   punctuality is known, then `review_received_{n}star` if rated;
/// - absent: `match_no_show` only;
/// - no feedback: nothing.
pub fn events_for(
  outcome: &AggregatedOutcome,
  played: &Match,
  impacts: &ImpactTable,
) -> Vec<NewReputationEvent> {
  let event = |event_type: EventType, metadata: serde_json::Value| NewReputationEvent {
    player_id: outcome.player_id,
    event_type,
    base_impact: impacts.impact(event_type),
    match_id: Some(played.match_id),
    metadata,
    event_occurred_at: played.scheduled_end,
  };
  let base = json!({ "feedback_count": outcome.feedback_count });

  match outcome.showed_up {
    None => Vec::new(),
    Some(false) => vec![event(EventType::MatchNoShow, base)],
    Some(true) => {
      let mut events = vec![event(EventType::MatchCompleted, base.clone())];
      match outcome.was_late {
        Some(true) => events.push(event(EventType::MatchLate, base.clone())),
        Some(false) => events.push(event(EventType::MatchOnTime, base.clone())),
        None => {}
      }
      if let Some(stars) = outcome.star_rating
        && let Some(review) = EventType::review(stars)
      {
        events.push(event(
          review,
          json!({
            "feedback_count": outcome.feedback_count,
            "star_rating": stars,
          }),
        ));
      }
      events
    }
  }
}
