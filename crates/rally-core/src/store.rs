//! The `MatchStore` trait.
//!
//! The trait is implemented by storage backends (e.g. `rally-store-sqlite`).
//! Higher layers (`rally-api`, `rally-closer`) depend on this abstraction, not
//! on any concrete backend.

use std::future::Future;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
  aggregate::AggregatedOutcome,
  matches::{Match, MatchFeedback, MatchOutcome, MatchParticipant, NewFeedback, NewMatch},
  reputation::{EventType, NewReputationEvent, ReputationEvent},
};

/// Abstraction over a Rally match store backend.
///
/// Feedback and reputation events are append-only. Matches and participants
/// are mutated only by the closure job (and by a player's own outcome report
/// before closure).
///
/// All methods return `Send` futures so the trait can be used in multi-threaded
/// async runtimes (e.g. tokio with `axum`).
pub trait MatchStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Intake ────────────────────────────────────────────────────────────

  /// Persist a new, open match.
  fn schedule_match(
    &self,
    input: NewMatch,
  ) -> impl Future<Output = Result<Match, Self::Error>> + Send + '_;

  /// Retrieve a match by UUID. Returns `None` if not found.
  fn get_match(
    &self,
    match_id: Uuid,
  ) -> impl Future<Output = Result<Option<Match>, Self::Error>> + Send + '_;

  /// Add a player to an open match.
  fn join_match(
    &self,
    match_id: Uuid,
    player_id: Uuid,
  ) -> impl Future<Output = Result<MatchParticipant, Self::Error>> + Send + '_;

  /// Record (or overwrite) a player's self-reported outcome. Rejected once the
  /// match is closed.
  fn report_outcome(
    &self,
    match_id: Uuid,
    player_id: Uuid,
    outcome: MatchOutcome,
  ) -> impl Future<Output = Result<MatchParticipant, Self::Error>> + Send + '_;

  /// Store one reviewer's feedback about one opponent. Both must be
  /// participants; each (reviewer, opponent) pair may report once.
  fn submit_feedback(
    &self,
    input: NewFeedback,
  ) -> impl Future<Output = Result<MatchFeedback, Self::Error>> + Send + '_;

  // ── Closure reads ─────────────────────────────────────────────────────

  /// Open matches whose scheduled end is before `cutoff`, at most `limit`.
  fn matches_ready_for_closure(
    &self,
    cutoff: DateTime<Utc>,
    limit: usize,
  ) -> impl Future<Output = Result<Vec<Match>, Self::Error>> + Send + '_;

  fn participants(
    &self,
    match_id: Uuid,
  ) -> impl Future<Output = Result<Vec<MatchParticipant>, Self::Error>> + Send + '_;

  fn feedback(
    &self,
    match_id: Uuid,
  ) -> impl Future<Output = Result<Vec<MatchFeedback>, Self::Error>> + Send + '_;

  /// The configured impact per event type. Types not listed fall back to
  /// their built-in default.
  fn reputation_impacts(
    &self,
  ) -> impl Future<Output = Result<Vec<(EventType, i32)>, Self::Error>> + Send + '_;

  // ── Closure writes ────────────────────────────────────────────────────

  /// Store the aggregated verdict on the participant row.
  fn record_aggregate(
    &self,
    match_id: Uuid,
    outcome: AggregatedOutcome,
    aggregated_at: DateTime<Utc>,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Append a batch of events atomically. Returns the persisted rows.
  fn append_reputation_events(
    &self,
    events: Vec<NewReputationEvent>,
  ) -> impl Future<Output = Result<Vec<ReputationEvent>, Self::Error>> + Send + '_;

  /// Mark a match closed. Returns `false` if it was already closed, in which
  /// case nothing is written.
  fn close_match(
    &self,
    match_id: Uuid,
    mutually_cancelled: bool,
    closed_at: DateTime<Utc>,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  // ── Ledger reads ──────────────────────────────────────────────────────

  /// All ledger entries for a player, oldest first.
  fn reputation_events(
    &self,
    player_id: Uuid,
  ) -> impl Future<Output = Result<Vec<ReputationEvent>, Self::Error>> + Send + '_;
}
