//! `POST /close-matches`: run one closure pass and report its summary.

use axum::{
  Json,
  extract::State,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use rally_core::store::MatchStore;

use crate::{AppState, auth::Authenticated};

pub async fn handler<S>(
  State(state): State<AppState<S>>,
  _auth: Authenticated,
) -> Response
where
  S: MatchStore + Clone + 'static,
{
  match state.closer.run().await {
    Ok(summary) => {
      let status = if summary.success {
        StatusCode::OK
      } else {
        StatusCode::INTERNAL_SERVER_ERROR
      };
      (status, Json(summary)).into_response()
    }
    Err(e) => e.into_response(),
  }
}
