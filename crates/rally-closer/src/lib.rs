//! Match closure service for Rally.
//!
//! Exposes an axum [`Router`] with the closure trigger (`/close-matches`) and
//! the intake API (`/api`), plus the [`closer::MatchCloser`] that both the
//! trigger and the background schedule drive.

pub mod auth;
pub mod closer;
pub mod error;
pub mod handlers;

pub use error::Error;

use std::{path::PathBuf, sync::Arc, time::Duration};

use axum::{
  Router,
  http::{HeaderName, Method, header},
  routing::post,
};
use rally_core::store::MatchStore;
use serde::Deserialize;
use tower_http::{
  cors::{Any, CorsLayer},
  trace::TraceLayer,
};

use auth::AuthConfig;
use closer::{CloseSettings, MatchCloser};
use handlers::close;

// ─── Configuration ────────────────────────────────────────────────────────────

/// Runtime server configuration, deserialised from `config.toml` and
/// `RALLY_*` environment variables.
#[derive(Deserialize, Clone, Debug)]
pub struct ServerConfig {
  #[serde(default = "default_host")]
  pub host:                   String,
  #[serde(default = "default_port")]
  pub port:                   u16,
  pub store_path:             PathBuf,
  #[serde(default)]
  pub cron_secret:            Option<String>,
  #[serde(default = "default_grace_hours")]
  pub grace_hours:            i64,
  #[serde(default = "default_batch_size")]
  pub batch_size:             usize,
  /// Seconds between background runs; `0` disables the schedule.
  #[serde(default = "default_schedule_interval_secs")]
  pub schedule_interval_secs: u64,
}

fn default_host() -> String { "127.0.0.1".to_string() }
fn default_port() -> u16 { 8080 }
fn default_grace_hours() -> i64 { 48 }
fn default_batch_size() -> usize { 100 }
fn default_schedule_interval_secs() -> u64 { 3600 }

impl ServerConfig {
  pub fn close_settings(&self) -> CloseSettings {
    CloseSettings {
      grace:      chrono::Duration::hours(self.grace_hours),
      batch_size: self.batch_size,
    }
  }

  pub fn auth_config(&self) -> AuthConfig { AuthConfig::new(self.cron_secret.clone()) }

  pub fn schedule_interval(&self) -> Option<Duration> {
    (self.schedule_interval_secs > 0)
      .then(|| Duration::from_secs(self.schedule_interval_secs))
  }
}

// ─── Application state ────────────────────────────────────────────────────────

/// Shared state threaded through all axum handlers.
#[derive(Clone)]
pub struct AppState<S: MatchStore> {
  pub store:  Arc<S>,
  pub closer: Arc<MatchCloser<S>>,
  pub auth:   Arc<AuthConfig>,
}

impl<S: MatchStore> AppState<S> {
  pub fn new(store: Arc<S>, settings: CloseSettings, auth: AuthConfig) -> Self {
    Self {
      closer: Arc::new(MatchCloser::new(store.clone(), settings)),
      store,
      auth: Arc::new(auth),
    }
  }
}

// ─── Router ───────────────────────────────────────────────────────────────────

/// Build the service router: the closure trigger at `/close-matches` and the
/// intake API under `/api`.
pub fn router<S>(state: AppState<S>) -> Router
where
  S: MatchStore + Clone + 'static,
{
  let cors = CorsLayer::new()
    .allow_origin(Any)
    .allow_methods([Method::POST, Method::OPTIONS])
    .allow_headers([
      header::AUTHORIZATION,
      header::CONTENT_TYPE,
      HeaderName::from_static("x-client-info"),
      HeaderName::from_static("apikey"),
    ]);
  let api = rally_api::api_router(state.store.clone());

  Router::new()
    .route("/close-matches", post(close::handler::<S>))
    .layer(cors)
    .with_state(state)
    .nest("/api", api)
    .layer(TraceLayer::new_for_http())
}

// ─── Integration tests ───────────────────────────────────────────────────────
