//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are stored as fixed-width RFC 3339 strings (microseconds, `Z`
//! suffix) so that lexicographic order in SQL equals chronological order.
//! UUIDs are stored as hyphenated lowercase strings. Metadata is compact JSON.

use chrono::{DateTime, SecondsFormat, SubsecRound as _, Utc};
use rally_core::{
  matches::{Match, MatchFeedback, MatchOutcome, MatchParticipant},
  reputation::{EventType, ReputationEvent},
};
use rusqlite::Row;
use uuid::Uuid;

use crate::{Error, Result};

// ─── Uuid ─────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

// ─── DateTime<Utc> ────────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Drop sub-microsecond precision so values survive a round trip unchanged.
pub fn truncate_dt(dt: DateTime<Utc>) -> DateTime<Utc> { dt.trunc_subsecs(6) }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

fn decode_opt_dt(s: Option<String>) -> Result<Option<DateTime<Utc>>> {
  s.as_deref().map(decode_dt).transpose()
}

// ─── Row types ────────────────────────────────────────────────────────────────

pub const MATCH_COLUMNS: &str =
  "match_id, scheduled_start, scheduled_end, created_at, closed_at, mutually_cancelled";

/// A `matches` row as read from SQLite, before domain decoding.
pub struct RawMatch {
  pub match_id:           String,
  pub scheduled_start:    String,
  pub scheduled_end:      String,
  pub created_at:         String,
  pub closed_at:          Option<String>,
  pub mutually_cancelled: bool,
}

impl RawMatch {
  /// Map a row selected with [`MATCH_COLUMNS`].
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      match_id:           row.get(0)?,
      scheduled_start:    row.get(1)?,
      scheduled_end:      row.get(2)?,
      created_at:         row.get(3)?,
      closed_at:          row.get(4)?,
      mutually_cancelled: row.get(5)?,
    })
  }

  pub fn into_match(self) -> Result<Match> {
    Ok(Match {
      match_id:           decode_uuid(&self.match_id)?,
      scheduled_start:    decode_dt(&self.scheduled_start)?,
      scheduled_end:      decode_dt(&self.scheduled_end)?,
      created_at:         decode_dt(&self.created_at)?,
      closed_at:          decode_opt_dt(self.closed_at)?,
      mutually_cancelled: self.mutually_cancelled,
    })
  }
}

pub const PARTICIPANT_COLUMNS: &str = "match_id, player_id, joined_at, match_outcome, \
   showed_up, was_late, star_rating, aggregated_at";

pub struct RawParticipant {
  pub match_id:      String,
  pub player_id:     String,
  pub joined_at:     String,
  pub match_outcome: Option<String>,
  pub showed_up:     Option<bool>,
  pub was_late:      Option<bool>,
  pub star_rating:   Option<u8>,
  pub aggregated_at: Option<String>,
}

impl RawParticipant {
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      match_id:      row.get(0)?,
      player_id:     row.get(1)?,
      joined_at:     row.get(2)?,
      match_outcome: row.get(3)?,
      showed_up:     row.get(4)?,
      was_late:      row.get(5)?,
      star_rating:   row.get(6)?,
      aggregated_at: row.get(7)?,
    })
  }

  pub fn into_participant(self) -> Result<MatchParticipant> {
    Ok(MatchParticipant {
      match_id:      decode_uuid(&self.match_id)?,
      player_id:     decode_uuid(&self.player_id)?,
      joined_at:     decode_dt(&self.joined_at)?,
      match_outcome: self
        .match_outcome
        .as_deref()
        .map(MatchOutcome::parse)
        .transpose()?,
      showed_up:     self.showed_up,
      was_late:      self.was_late,
      star_rating:   self.star_rating,
      aggregated_at: decode_opt_dt(self.aggregated_at)?,
    })
  }
}

pub const FEEDBACK_COLUMNS: &str = "feedback_id, match_id, reviewer_id, opponent_id, \
   showed_up, was_late, star_rating, comment, submitted_at";

pub struct RawFeedback {
  pub feedback_id:  String,
  pub match_id:     String,
  pub reviewer_id:  String,
  pub opponent_id:  String,
  pub showed_up:    bool,
  pub was_late:     Option<bool>,
  pub star_rating:  Option<u8>,
  pub comment:      Option<String>,
  pub submitted_at: String,
}

impl RawFeedback {
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      feedback_id:  row.get(0)?,
      match_id:     row.get(1)?,
      reviewer_id:  row.get(2)?,
      opponent_id:  row.get(3)?,
      showed_up:    row.get(4)?,
      was_late:     row.get(5)?,
      star_rating:  row.get(6)?,
      comment:      row.get(7)?,
      submitted_at: row.get(8)?,
    })
  }

  pub fn into_feedback(self) -> Result<MatchFeedback> {
    Ok(MatchFeedback {
      feedback_id:  decode_uuid(&self.feedback_id)?,
      match_id:     decode_uuid(&self.match_id)?,
      reviewer_id:  decode_uuid(&self.reviewer_id)?,
      opponent_id:  decode_uuid(&self.opponent_id)?,
      showed_up:    self.showed_up,
      was_late:     self.was_late,
      star_rating:  self.star_rating,
      comment:      self.comment,
      submitted_at: decode_dt(&self.submitted_at)?,
    })
  }
}

pub const EVENT_COLUMNS: &str = "event_id, player_id, event_type, base_impact, match_id, \
   metadata, event_occurred_at, created_at";

pub struct RawEvent {
  pub event_id:          String,
  pub player_id:         String,
  pub event_type:        String,
  pub base_impact:       i32,
  pub match_id:          Option<String>,
  pub metadata:          String,
  pub event_occurred_at: String,
  pub created_at:        String,
}

impl RawEvent {
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      event_id:          row.get(0)?,
      player_id:         row.get(1)?,
      event_type:        row.get(2)?,
      base_impact:       row.get(3)?,
      match_id:          row.get(4)?,
      metadata:          row.get(5)?,
      event_occurred_at: row.get(6)?,
      created_at:        row.get(7)?,
    })
  }

  pub fn into_event(self) -> Result<ReputationEvent> {
    Ok(ReputationEvent {
      event_id:          decode_uuid(&self.event_id)?,
      player_id:         decode_uuid(&self.player_id)?,
      event_type:        EventType::parse(&self.event_type)?,
      base_impact:       self.base_impact,
      match_id:          self.match_id.as_deref().map(decode_uuid).transpose()?,
      metadata:          serde_json::from_str(&self.metadata)?,
      event_occurred_at: decode_dt(&self.event_occurred_at)?,
      created_at:        decode_dt(&self.created_at)?,
    })
  }
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone as _;

  use super::*;

  #[test]
  fn timestamps_are_fixed_width_and_sortable() {
    let whole = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap();
    let later = whole + chrono::Duration::microseconds(1500);

    let a = encode_dt(whole);
    let b = encode_dt(later);
    assert_eq!(a, "2026-03-01T09:00:00.000000Z");
    assert_eq!(a.len(), b.len());
    assert!(a < b);
    assert_eq!(decode_dt(&b).unwrap(), later);
  }

  #[test]
  fn bad_timestamp_is_a_parse_error() {
    assert!(matches!(decode_dt("yesterday"), Err(Error::DateParse(_))));
  }
}
