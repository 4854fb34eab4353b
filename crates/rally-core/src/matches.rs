//! Matches, their participants, and peer feedback.
//!
//! A match is closed exactly once by the closure job and never re-opened.
//! Participant rows are written twice: once when the player self-reports an
//! outcome, and once when the closure job stores the aggregated verdict.
//! Feedback rows are immutable once written.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Outcome ─────────────────────────────────────────────────────────────────

/// A participant's own account of how the match went.
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
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MatchOutcome {
  Played,
  MutualCancel,
  OpponentNoShow,
}

impl MatchOutcome {
  /// The string stored in the `match_outcome` column.
  pub fn as_str(self) -> &'static str { self.into() }

  pub fn parse(s: &str) -> Result<Self> {
    Self::from_str(s).map_err(|_| Error::UnknownOutcome(s.to_owned()))
  }
}

// ─── Match ───────────────────────────────────────────────────────────────────

/// A scheduled play session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Match {
  pub match_id:           Uuid,
  pub scheduled_start:    DateTime<Utc>,
  pub scheduled_end:      DateTime<Utc>,
  pub created_at:         DateTime<Utc>,
  /// Set by the closure job; `None` until the match is processed.
  pub closed_at:          Option<DateTime<Utc>>,
  pub mutually_cancelled: bool,
}

impl Match {
  pub fn is_closed(&self) -> bool { self.closed_at.is_some() }
}

/// Input to [`crate::store::MatchStore::schedule_match`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewMatch {
  pub scheduled_start: DateTime<Utc>,
  pub scheduled_end:   DateTime<Utc>,
}

impl NewMatch {
  pub fn validate(&self) -> Result<()> {
    if self.scheduled_end <= self.scheduled_start {
      return Err(Error::InvalidSchedule);
    }
    Ok(())
  }
}

// ─── Participant ─────────────────────────────────────────────────────────────

/// One player's seat in one match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchParticipant {
  pub match_id:      Uuid,
  pub player_id:     Uuid,
  pub joined_at:     DateTime<Utc>,
  /// Self-reported by the player; `None` if they never reported.
  pub match_outcome: Option<MatchOutcome>,

  // Derived at closure time.
  pub showed_up:     Option<bool>,
  pub was_late:      Option<bool>,
  pub star_rating:   Option<u8>,
  pub aggregated_at: Option<DateTime<Utc>>,
}

// ─── Feedback ────────────────────────────────────────────────────────────────

/// One reviewer's report about one opponent in a match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchFeedback {
  pub feedback_id:  Uuid,
  pub match_id:     Uuid,
  pub reviewer_id:  Uuid,
  pub opponent_id:  Uuid,
  pub showed_up:    bool,
  pub was_late:     Option<bool>,
  pub star_rating:  Option<u8>,
  pub comment:      Option<String>,
  pub submitted_at: DateTime<Utc>,
}

/// Input to [`crate::store::MatchStore::submit_feedback`].
/// `submitted_at` is always set by the store.
#[derive(Debug, Clone)]
pub struct NewFeedback {
  pub match_id:    Uuid,
  pub reviewer_id: Uuid,
  pub opponent_id: Uuid,
  pub showed_up:   bool,
  pub was_late:    Option<bool>,
  pub star_rating: Option<u8>,
  pub comment:     Option<String>,
}

impl NewFeedback {
  /// Checks that do not need the store: no self-review, rating in range.
  pub fn validate(&self) -> Result<()> {
    if self.reviewer_id == self.opponent_id {
      return Err(Error::SelfReview);
    }
    if let Some(rating) = self.star_rating
      && !(1..=5).contains(&rating)
    {
      return Err(Error::RatingOutOfRange(rating));
    }
    Ok(())
  }
}
