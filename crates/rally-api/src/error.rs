//! API error type and [`axum::response::IntoResponse`] implementation.

use axum::{
  Json,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error("not found: {0}")]
  NotFound(String),

  #[error("bad request: {0}")]
  BadRequest(String),

  #[error("conflict: {0}")]
  Conflict(String),

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl ApiError {
  /// Classify a backend error by the domain error somewhere in its source
  /// chain. Anything unrecognised is an internal store failure.
  pub fn from_store<E>(err: E) -> Self
  where
    E: std::error::Error + Send + Sync + 'static,
  {
    let classified = std::iter::successors(
      Some(&err as &(dyn std::error::Error + 'static)),
      |e| e.source(),
    )
    .find_map(|e| e.downcast_ref::<rally_core::Error>())
    .and_then(Self::from_domain);

    classified.unwrap_or_else(|| Self::Store(Box::new(err)))
  }

  fn from_domain(e: &rally_core::Error) -> Option<Self> {
    use rally_core::Error as E;
    let message = e.to_string();
    match e {
      E::MatchNotFound(_) | E::ParticipantNotFound { .. } => Some(Self::NotFound(message)),
      E::MatchClosed(_) | E::AlreadyJoined { .. } | E::DuplicateFeedback { .. } => {
        Some(Self::Conflict(message))
      }
      E::InvalidSchedule | E::SelfReview | E::RatingOutOfRange(_) | E::UnknownOutcome(_) => {
        Some(Self::BadRequest(message))
      }
      E::UnknownEventType(_) | E::Serialization(_) => None,
    }
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let (status, message) = match &self {
      ApiError::NotFound(m) => (StatusCode::NOT_FOUND, m.clone()),
      ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m.clone()),
      ApiError::Conflict(m) => (StatusCode::CONFLICT, m.clone()),
      ApiError::Store(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    };
    (status, Json(json!({ "error": message }))).into_response()
  }
}
