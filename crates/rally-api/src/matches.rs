//! Handlers for `/matches` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/matches` | Body: [`NewMatch`]; returns 201 + stored match |
//! | `GET`  | `/matches/:id` | 404 if not found |
//! | `GET`  | `/matches/:id/participants` | |
//! | `POST` | `/matches/:id/participants` | Body: `{"player_id":"..."}`; 409 if closed or already joined |
//! | `PUT`  | `/matches/:id/participants/:player_id/outcome` | Body: `{"match_outcome":"played"}` |
//! | `GET`  | `/matches/:id/feedback` | |
//! | `POST` | `/matches/:id/feedback` | Body: [`FeedbackBody`]; 409 if closed or duplicate |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, State},
  http::StatusCode,
  response::IntoResponse,
};
use rally_core::{
  matches::{Match, MatchFeedback, MatchOutcome, MatchParticipant, NewFeedback, NewMatch},
  store::MatchStore,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::ApiError;

async fn require_match<S>(store: &S, id: Uuid) -> Result<Match, ApiError>
where
  S: MatchStore,
{
  store
    .get_match(id)
    .await
    .map_err(ApiError::from_store)?
    .ok_or_else(|| ApiError::NotFound(format!("match {id} not found")))
}

// ─── Matches ──────────────────────────────────────────────────────────────────

/// `POST /matches`, body: `{"scheduled_start":"...","scheduled_end":"..."}`
pub async fn create<S>(
  State(store): State<Arc<S>>,
  Json(body): Json<NewMatch>,
) -> Result<impl IntoResponse, ApiError>
where
  S: MatchStore,
{
  let scheduled = store
    .schedule_match(body)
    .await
    .map_err(ApiError::from_store)?;
  Ok((StatusCode::CREATED, Json(scheduled)))
}

/// `GET /matches/:id`
pub async fn get_one<S>(
  State(store): State<Arc<S>>,
  Path(id): Path<Uuid>,
) -> Result<Json<Match>, ApiError>
where
  S: MatchStore,
{
  Ok(Json(require_match(store.as_ref(), id).await?))
}

// ─── Participants ─────────────────────────────────────────────────────────────

/// `GET /matches/:id/participants`
pub async fn list_participants<S>(
  State(store): State<Arc<S>>,
  Path(id): Path<Uuid>,
) -> Result<Json<Vec<MatchParticipant>>, ApiError>
where
  S: MatchStore,
{
  require_match(store.as_ref(), id).await?;
  let participants = store.participants(id).await.map_err(ApiError::from_store)?;
  Ok(Json(participants))
}

#[derive(Debug, Deserialize)]
pub struct JoinBody {
  pub player_id: Uuid,
}

/// `POST /matches/:id/participants`, body: `{"player_id":"..."}`
pub async fn join<S>(
  State(store): State<Arc<S>>,
  Path(id): Path<Uuid>,
  Json(body): Json<JoinBody>,
) -> Result<impl IntoResponse, ApiError>
where
  S: MatchStore,
{
  let participant = store
    .join_match(id, body.player_id)
    .await
    .map_err(ApiError::from_store)?;
  Ok((StatusCode::CREATED, Json(participant)))
}

#[derive(Debug, Deserialize)]
pub struct OutcomeBody {
  pub match_outcome: MatchOutcome,
}

/// `PUT /matches/:id/participants/:player_id/outcome`
pub async fn report_outcome<S>(
  State(store): State<Arc<S>>,
  Path((id, player_id)): Path<(Uuid, Uuid)>,
  Json(body): Json<OutcomeBody>,
) -> Result<Json<MatchParticipant>, ApiError>
where
  S: MatchStore,
{
  let participant = store
    .report_outcome(id, player_id, body.match_outcome)
    .await
    .map_err(ApiError::from_store)?;
  Ok(Json(participant))
}

// ─── Feedback ─────────────────────────────────────────────────────────────────

/// JSON body accepted by `POST /matches/:id/feedback`.
#[derive(Debug, Deserialize)]
pub struct FeedbackBody {
  pub reviewer_id: Uuid,
  pub opponent_id: Uuid,
  pub showed_up:   bool,
  pub was_late:    Option<bool>,
  /// 1 to 5.
  pub star_rating: Option<u8>,
  pub comment:     Option<String>,
}

impl FeedbackBody {
  fn into_new_feedback(self, match_id: Uuid) -> NewFeedback {
    NewFeedback {
      match_id,
      reviewer_id: self.reviewer_id,
      opponent_id: self.opponent_id,
      showed_up:   self.showed_up,
      was_late:    self.was_late,
      star_rating: self.star_rating,
      comment:     self.comment,
    }
  }
}

/// `POST /matches/:id/feedback`: returns 201 + the stored feedback row.
pub async fn submit_feedback<S>(
  State(store): State<Arc<S>>,
  Path(id): Path<Uuid>,
  Json(body): Json<FeedbackBody>,
) -> Result<impl IntoResponse, ApiError>
where
  S: MatchStore,
{
  let feedback = store
    .submit_feedback(body.into_new_feedback(id))
    .await
    .map_err(ApiError::from_store)?;
  Ok((StatusCode::CREATED, Json(feedback)))
}

/// `GET /matches/:id/feedback`
pub async fn list_feedback<S>(
  State(store): State<Arc<S>>,
  Path(id): Path<Uuid>,
) -> Result<Json<Vec<MatchFeedback>>, ApiError>
where
  S: MatchStore,
{
  require_match(store.as_ref(), id).await?;
  let feedback = store.feedback(id).await.map_err(ApiError::from_store)?;
  Ok(Json(feedback))
}
