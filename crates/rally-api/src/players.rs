//! Handler for `GET /players/:id/reputation-events`.
//!
//! Lists the player's ledger entries oldest first. Scores are derived from
//! the ledger by consumers; nothing here sums it.

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, State},
};
use rally_core::{reputation::ReputationEvent, store::MatchStore};
use uuid::Uuid;

use crate::error::ApiError;

pub async fn reputation_events<S>(
  State(store): State<Arc<S>>,
  Path(player_id): Path<Uuid>,
) -> Result<Json<Vec<ReputationEvent>>, ApiError>
where
  S: MatchStore,
{
  let events = store
    .reputation_events(player_id)
    .await
    .map_err(ApiError::from_store)?;
  Ok(Json(events))
}
