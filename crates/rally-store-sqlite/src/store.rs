//! [`SqliteStore`]: the SQLite implementation of [`MatchStore`].

use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::OptionalExtension as _;
use uuid::Uuid;

use rally_core::{
  aggregate::AggregatedOutcome,
  matches::{Match, MatchFeedback, MatchOutcome, MatchParticipant, NewFeedback, NewMatch},
  reputation::{EventType, NewReputationEvent, ReputationEvent},
  store::MatchStore,
};

use crate::{
  Error, Result,
  encode::{
    EVENT_COLUMNS, FEEDBACK_COLUMNS, MATCH_COLUMNS, PARTICIPANT_COLUMNS, RawEvent, RawFeedback,
    RawMatch, RawParticipant, encode_dt, encode_uuid, truncate_dt,
  },
  schema::SCHEMA,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// `true` when `err` is a UNIQUE or PRIMARY KEY violation. Inserts that race
/// past an existence check land here.
fn is_unique_violation(err: &tokio_rusqlite::Error) -> bool {
  match err {
    tokio_rusqlite::Error::Rusqlite(rusqlite::Error::SqliteFailure(e, _)) => {
      e.code == rusqlite::ErrorCode::ConstraintViolation
        && matches!(
          e.extended_code,
          rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE | rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
        )
    }
    _ => false,
  }
}


/// A Rally match store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store, mainly for tests.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Insert or replace the configured impact for one event type.
  pub async fn set_reputation_impact(&self, event_type: EventType, impact: i32) -> Result<()> {
    let type_str = event_type.as_str();
    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO reputation_config (event_type, default_impact) VALUES (?1, ?2)
           ON CONFLICT (event_type) DO UPDATE SET default_impact = excluded.default_impact",
          rusqlite::params![type_str, impact],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Fetch a match that still accepts intake writes.
  async fn open_match(&self, match_id: Uuid) -> Result<Match> {
    let found = self
      .get_match(match_id)
      .await?
      .ok_or(rally_core::Error::MatchNotFound(match_id))?;
    if found.is_closed() {
      return Err(rally_core::Error::MatchClosed(match_id).into());
    }
    Ok(found)
  }

  async fn get_participant(
    &self,
    match_id: Uuid,
    player_id: Uuid,
  ) -> Result<Option<MatchParticipant>> {
    let match_str  = encode_uuid(match_id);
    let player_str = encode_uuid(player_id);
    let sql = format!(
      "SELECT {PARTICIPANT_COLUMNS} FROM match_participants
       WHERE match_id = ?1 AND player_id = ?2"
    );

    let raw: Option<RawParticipant> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(&sql, rusqlite::params![match_str, player_str], RawParticipant::from_row)
            .optional()?,
        )
      })
      .await?;

    raw.map(RawParticipant::into_participant).transpose()
  }

  async fn require_participant(
    &self,
    match_id: Uuid,
    player_id: Uuid,
  ) -> Result<MatchParticipant> {
    self
      .get_participant(match_id, player_id)
      .await?
      .ok_or_else(|| rally_core::Error::ParticipantNotFound { match_id, player_id }.into())
  }

  async fn feedback_exists(
    &self,
    match_id: Uuid,
    reviewer_id: Uuid,
    opponent_id: Uuid,
  ) -> Result<bool> {
    let ids = (encode_uuid(match_id), encode_uuid(reviewer_id), encode_uuid(opponent_id));
    let exists = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT 1 FROM match_feedback
               WHERE match_id = ?1 AND reviewer_id = ?2 AND opponent_id = ?3",
              rusqlite::params![ids.0, ids.1, ids.2],
              |_| Ok(true),
            )
            .optional()?
            .unwrap_or(false),
        )
      })
      .await?;
    Ok(exists)
  }
}

// ─── MatchStore impl ─────────────────────────────────────────────────────────

impl MatchStore for SqliteStore {
  type Error = Error;

  // ── Intake ────────────────────────────────────────────────────────────────

  async fn schedule_match(&self, input: NewMatch) -> Result<Match> {
    input.validate()?;

    let scheduled = Match {
      match_id:           Uuid::new_v4(),
      scheduled_start:    truncate_dt(input.scheduled_start),
      scheduled_end:      truncate_dt(input.scheduled_end),
      created_at:         truncate_dt(Utc::now()),
      closed_at:          None,
      mutually_cancelled: false,
    };

    let id_str    = encode_uuid(scheduled.match_id);
    let start_str = encode_dt(scheduled.scheduled_start);
    let end_str   = encode_dt(scheduled.scheduled_end);
    let at_str    = encode_dt(scheduled.created_at);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO matches (match_id, scheduled_start, scheduled_end, created_at)
           VALUES (?1, ?2, ?3, ?4)",
          rusqlite::params![id_str, start_str, end_str, at_str],
        )?;
        Ok(())
      })
      .await?;

    Ok(scheduled)
  }

  async fn get_match(&self, match_id: Uuid) -> Result<Option<Match>> {
    let id_str = encode_uuid(match_id);
    let sql    = format!("SELECT {MATCH_COLUMNS} FROM matches WHERE match_id = ?1");

    let raw: Option<RawMatch> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(&sql, rusqlite::params![id_str], RawMatch::from_row)
            .optional()?,
        )
      })
      .await?;

    raw.map(RawMatch::into_match).transpose()
  }

  async fn join_match(&self, match_id: Uuid, player_id: Uuid) -> Result<MatchParticipant> {
    self.open_match(match_id).await?;
    if self.get_participant(match_id, player_id).await?.is_some() {
      return Err(rally_core::Error::AlreadyJoined { match_id, player_id }.into());
    }

    let participant = MatchParticipant {
      match_id,
      player_id,
      joined_at:     truncate_dt(Utc::now()),
      match_outcome: None,
      showed_up:     None,
      was_late:      None,
      star_rating:   None,
      aggregated_at: None,
    };

    let match_str  = encode_uuid(match_id);
    let player_str = encode_uuid(player_id);
    let at_str     = encode_dt(participant.joined_at);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO match_participants (match_id, player_id, joined_at) VALUES (?1, ?2, ?3)",
          rusqlite::params![match_str, player_str, at_str],
        )?;
        Ok(())
      })
      .await
      .map_err(|e| {
        if is_unique_violation(&e) {
          Error::from(rally_core::Error::AlreadyJoined { match_id, player_id })
        } else {
          Error::from(e)
        }
      })?;

    Ok(participant)
  }

  async fn report_outcome(
    &self,
    match_id:  Uuid,
    player_id: Uuid,
    outcome:   MatchOutcome,
  ) -> Result<MatchParticipant> {
    self.open_match(match_id).await?;
    let mut participant = self.require_participant(match_id, player_id).await?;

    let match_str   = encode_uuid(match_id);
    let player_str  = encode_uuid(player_id);
    let outcome_str = outcome.as_str();

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "UPDATE match_participants SET match_outcome = ?1
           WHERE match_id = ?2 AND player_id = ?3",
          rusqlite::params![outcome_str, match_str, player_str],
        )?;
        Ok(())
      })
      .await?;

    participant.match_outcome = Some(outcome);
    Ok(participant)
  }

  async fn submit_feedback(&self, input: NewFeedback) -> Result<MatchFeedback> {
    input.validate()?;
    self.open_match(input.match_id).await?;
    self.require_participant(input.match_id, input.reviewer_id).await?;
    self.require_participant(input.match_id, input.opponent_id).await?;

    if self
      .feedback_exists(input.match_id, input.reviewer_id, input.opponent_id)
      .await?
    {
      return Err(
        rally_core::Error::DuplicateFeedback {
          reviewer_id: input.reviewer_id,
          opponent_id: input.opponent_id,
        }
        .into(),
      );
    }

    let feedback = MatchFeedback {
      feedback_id:  Uuid::new_v4(),
      match_id:     input.match_id,
      reviewer_id:  input.reviewer_id,
      opponent_id:  input.opponent_id,
      showed_up:    input.showed_up,
      was_late:     input.was_late,
      star_rating:  input.star_rating,
      comment:      input.comment,
      submitted_at: truncate_dt(Utc::now()),
    };

    let id_str       = encode_uuid(feedback.feedback_id);
    let match_str    = encode_uuid(feedback.match_id);
    let reviewer_str = encode_uuid(feedback.reviewer_id);
    let opponent_str = encode_uuid(feedback.opponent_id);
    let at_str       = encode_dt(feedback.submitted_at);
    let (showed_up, was_late, star_rating) =
      (feedback.showed_up, feedback.was_late, feedback.star_rating);
    let comment      = feedback.comment.clone();

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO match_feedback (
             feedback_id, match_id, reviewer_id, opponent_id,
             showed_up, was_late, star_rating, comment, submitted_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
          rusqlite::params![
            id_str,
            match_str,
            reviewer_str,
            opponent_str,
            showed_up,
            was_late,
            star_rating,
            comment,
            at_str,
          ],
        )?;
        Ok(())
      })
      .await
      .map_err(|e| {
        if is_unique_violation(&e) {
          Error::from(rally_core::Error::DuplicateFeedback {
            reviewer_id: feedback.reviewer_id,
            opponent_id: feedback.opponent_id,
          })
        } else {
          Error::from(e)
        }
      })?;

    Ok(feedback)
  }

  // ── Closure reads ─────────────────────────────────────────────────────────

  async fn matches_ready_for_closure(
    &self,
    cutoff: DateTime<Utc>,
    limit:  usize,
  ) -> Result<Vec<Match>> {
    let cutoff_str = encode_dt(cutoff);
    let limit_val  = i64::try_from(limit).unwrap_or(i64::MAX);
    let sql = format!(
      "SELECT {MATCH_COLUMNS} FROM matches
       WHERE closed_at IS NULL AND scheduled_end < ?1
       ORDER BY scheduled_end
       LIMIT ?2"
    );

    let raws: Vec<RawMatch> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(rusqlite::params![cutoff_str, limit_val], RawMatch::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawMatch::into_match).collect()
  }

  async fn participants(&self, match_id: Uuid) -> Result<Vec<MatchParticipant>> {
    let match_str = encode_uuid(match_id);
    let sql = format!(
      "SELECT {PARTICIPANT_COLUMNS} FROM match_participants
       WHERE match_id = ?1
       ORDER BY joined_at, player_id"
    );

    let raws: Vec<RawParticipant> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(rusqlite::params![match_str], RawParticipant::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawParticipant::into_participant).collect()
  }

  async fn feedback(&self, match_id: Uuid) -> Result<Vec<MatchFeedback>> {
    let match_str = encode_uuid(match_id);
    let sql = format!(
      "SELECT {FEEDBACK_COLUMNS} FROM match_feedback
       WHERE match_id = ?1
       ORDER BY submitted_at, feedback_id"
    );

    let raws: Vec<RawFeedback> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(rusqlite::params![match_str], RawFeedback::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawFeedback::into_feedback).collect()
  }

  async fn reputation_impacts(&self) -> Result<Vec<(EventType, i32)>> {
    let rows: Vec<(String, i32)> = self
      .conn
      .call(|conn| {
        let mut stmt = conn.prepare("SELECT event_type, default_impact FROM reputation_config")?;
        let rows = stmt
          .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    rows
      .into_iter()
      .map(|(event_type, impact)| -> Result<(EventType, i32)> {
        Ok((EventType::parse(&event_type)?, impact))
      })
      .collect()
  }

  // ── Closure writes ────────────────────────────────────────────────────────

  async fn record_aggregate(
    &self,
    match_id:      Uuid,
    outcome:       AggregatedOutcome,
    aggregated_at: DateTime<Utc>,
  ) -> Result<()> {
    let match_str  = encode_uuid(match_id);
    let player_str = encode_uuid(outcome.player_id);
    let at_str     = encode_dt(aggregated_at);

    let updated = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE match_participants
           SET showed_up = ?1, was_late = ?2, star_rating = ?3, aggregated_at = ?4
           WHERE match_id = ?5 AND player_id = ?6",
          rusqlite::params![
            outcome.showed_up,
            outcome.was_late,
            outcome.star_rating,
            at_str,
            match_str,
            player_str,
          ],
        )?)
      })
      .await?;

    if updated == 0 {
      return Err(
        rally_core::Error::ParticipantNotFound { match_id, player_id: outcome.player_id }.into(),
      );
    }
    Ok(())
  }

  async fn append_reputation_events(
    &self,
    events: Vec<NewReputationEvent>,
  ) -> Result<Vec<ReputationEvent>> {
    if events.is_empty() {
      return Ok(Vec::new());
    }

    let created_at = truncate_dt(Utc::now());
    let stored: Vec<ReputationEvent> = events
      .into_iter()
      .map(|e| ReputationEvent {
        event_id: Uuid::new_v4(),
        player_id: e.player_id,
        event_type: e.event_type,
        base_impact: e.base_impact,
        match_id: e.match_id,
        metadata: e.metadata,
        event_occurred_at: truncate_dt(e.event_occurred_at),
        created_at,
      })
      .collect();

    let rows = stored
      .iter()
      .map(|e| -> Result<_> {
        Ok((
          encode_uuid(e.event_id),
          encode_uuid(e.player_id),
          e.event_type.as_str(),
          e.base_impact,
          e.match_id.map(encode_uuid),
          serde_json::to_string(&e.metadata)?,
          encode_dt(e.event_occurred_at),
          encode_dt(e.created_at),
        ))
      })
      .collect::<Result<Vec<_>>>()?;

    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        {
          let mut stmt = tx.prepare(
            "INSERT INTO reputation_events (
               event_id, player_id, event_type, base_impact, match_id,
               metadata, event_occurred_at, created_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
          )?;
          for row in &rows {
            stmt.execute(rusqlite::params![row.0, row.1, row.2, row.3, row.4, row.5, row.6, row.7])?;
          }
        }
        tx.commit()?;
        Ok(())
      })
      .await?;

    Ok(stored)
  }

  async fn close_match(
    &self,
    match_id:           Uuid,
    mutually_cancelled: bool,
    closed_at:          DateTime<Utc>,
  ) -> Result<bool> {
    let match_str = encode_uuid(match_id);
    let at_str    = encode_dt(closed_at);

    // Conditional on `closed_at IS NULL`: a match is closed at most once.
    let updated = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE matches SET closed_at = ?1, mutually_cancelled = ?2
           WHERE match_id = ?3 AND closed_at IS NULL",
          rusqlite::params![at_str, mutually_cancelled, match_str],
        )?)
      })
      .await?;

    Ok(updated == 1)
  }

  // ── Ledger reads ──────────────────────────────────────────────────────────

  async fn reputation_events(&self, player_id: Uuid) -> Result<Vec<ReputationEvent>> {
    let player_str = encode_uuid(player_id);
    let sql = format!(
      "SELECT {EVENT_COLUMNS} FROM reputation_events
       WHERE player_id = ?1
       ORDER BY event_occurred_at, created_at, rowid"
    );

    let raws: Vec<RawEvent> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(rusqlite::params![player_str], RawEvent::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawEvent::into_event).collect()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn duplicate_key_is_classified_as_unique_violation() {
    let store = SqliteStore::open_in_memory().await.unwrap();
    let insert = |conn: &mut rusqlite::Connection| -> tokio_rusqlite::Result<()> {
      conn.execute(
        "INSERT INTO reputation_config (event_type, default_impact) VALUES ('match_late', -10)",
        [],
      )?;
      Ok(())
    };

    store.conn.call(insert).await.unwrap();
    let err = store.conn.call(insert).await.unwrap_err();
    assert!(is_unique_violation(&err));

    let err = store
      .conn
      .call(|conn| {
        conn.execute("INSERT INTO no_such_table VALUES (1)", [])?;
        Ok(())
      })
      .await
      .unwrap_err();
    assert!(!is_unique_violation(&err));
  }
}
