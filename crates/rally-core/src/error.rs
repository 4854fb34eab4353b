//! Error types for `rally-core`.

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum Error {
  #[error("match not found: {0}")]
  MatchNotFound(Uuid),

  #[error("player {player_id} is not a participant of match {match_id}")]
  ParticipantNotFound { match_id: Uuid, player_id: Uuid },

  #[error("player {player_id} already joined match {match_id}")]
  AlreadyJoined { match_id: Uuid, player_id: Uuid },

  #[error("match {0} is already closed")]
  MatchClosed(Uuid),

  #[error("match must end after it starts")]
  InvalidSchedule,

  #[error("a player cannot review themselves")]
  SelfReview,

  #[error("star rating must be between 1 and 5, got {0}")]
  RatingOutOfRange(u8),

  #[error("feedback from {reviewer_id} about {opponent_id} already submitted")]
  DuplicateFeedback { reviewer_id: Uuid, opponent_id: Uuid },

  #[error("unknown match outcome: {0:?}")]
  UnknownOutcome(String),

  #[error("unknown reputation event type: {0:?}")]
  UnknownEventType(String),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
