//! Bearer-token extractor and standalone verifier for the closure trigger.

use axum::extract::FromRequestParts;
use axum::http::{HeaderMap, header, request::Parts};
use rally_core::store::MatchStore;
use sha2::{Digest as _, Sha256};

use crate::{AppState, error::Error};

/// The shared secret schedulers must present. `None` leaves the trigger open.
#[derive(Clone, Default)]
pub struct AuthConfig {
  pub cron_secret: Option<String>,
}

impl AuthConfig {
  pub fn new(cron_secret: Option<String>) -> Self {
    Self { cron_secret: cron_secret.filter(|s| !s.is_empty()) }
  }
}

/// Zero-size marker: present in the handler means the request was authenticated.
pub struct Authenticated;

/// Check `Authorization: Bearer <secret>` against the configured secret.
pub fn verify_auth(headers: &HeaderMap, config: &AuthConfig) -> Result<(), Error> {
  let Some(secret) = config.cron_secret.as_deref() else {
    return Ok(());
  };

  let token = headers
    .get(header::AUTHORIZATION)
    .and_then(|v| v.to_str().ok())
    .and_then(|v| v.strip_prefix("Bearer "))
    .ok_or(Error::Unauthorized)?;

  // Compare fixed-length digests rather than the raw strings.
  if Sha256::digest(token.trim().as_bytes()) != Sha256::digest(secret.as_bytes()) {
    return Err(Error::Unauthorized);
  }

  Ok(())
}

impl<S> FromRequestParts<AppState<S>> for Authenticated
where
  S: MatchStore + Clone + 'static,
{
  type Rejection = Error;

  async fn from_request_parts(
    parts: &mut Parts,
    state: &AppState<S>,
  ) -> Result<Self, Self::Rejection> {
    verify_auth(&parts.headers, &state.auth)?;
    Ok(Authenticated)
  }
}
