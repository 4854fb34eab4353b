//! JSON intake API for Rally.
//!
//! Exposes an axum [`Router`] backed by any [`rally_core::store::MatchStore`]
//! through which matches, participants, self-reported outcomes and peer
//! feedback enter the store, and through which the reputation ledger is read.
//! Auth, TLS, and transport concerns are the caller's responsibility.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", rally_api::api_router(store.clone()))
//! ```

pub mod error;
pub mod matches;
pub mod players;

use std::sync::Arc;

use axum::{
  Router,
  routing::{get, post, put},
};
use rally_core::store::MatchStore;

pub use error::ApiError;

/// Build a fully-materialised API router for `store`.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<S>(store: Arc<S>) -> Router<()>
where
  S: MatchStore + 'static,
{
  Router::new()
    // Matches
    .route("/matches", post(matches::create::<S>))
    .route("/matches/{id}", get(matches::get_one::<S>))
    .route(
      "/matches/{id}/participants",
      get(matches::list_participants::<S>).post(matches::join::<S>),
    )
    .route(
      "/matches/{id}/participants/{player_id}/outcome",
      put(matches::report_outcome::<S>),
    )
    .route(
      "/matches/{id}/feedback",
      get(matches::list_feedback::<S>).post(matches::submit_feedback::<S>),
    )
    // Ledger
    .route("/players/{id}/reputation-events", get(players::reputation_events::<S>))
    .with_state(store)
}
