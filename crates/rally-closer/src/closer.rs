//! The closure run: find overdue matches, reconcile their feedback, write the
//! verdicts and ledger events, and close them.
//!
//! One [`MatchCloser`] is shared by the HTTP trigger and the background
//! schedule. It holds a run guard so at most one pass executes at a time.

use std::{sync::Arc, time::Instant};

use chrono::{DateTime, Utc};
use rally_core::{
  aggregate::{MatchVerdict, aggregate_match},
  matches::Match,
  reputation::{ImpactTable, events_for},
  store::MatchStore,
};
use serde::{Deserialize, Serialize};
use tokio::{
  sync::Mutex,
  task::JoinHandle,
  time::{self, MissedTickBehavior},
};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::{Error, Result};

// ─── Settings ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
pub struct CloseSettings {
  /// How long after its scheduled end a match stays open for feedback.
  pub grace:      chrono::Duration,
  /// Upper bound on matches handled by a single run.
  pub batch_size: usize,
}

impl Default for CloseSettings {
  fn default() -> Self {
    Self {
      grace:      chrono::Duration::hours(48),
      batch_size: 100,
    }
  }
}

// ─── Run summary ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
  Closed,
  MutualCancel,
  Error,
}

/// Terminal state of one match within a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchResult {
  pub match_id:                  Uuid,
  pub status:                    MatchStatus,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub error:                     Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub participants_processed:    Option<usize>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub reputation_events_created: Option<usize>,
}

impl MatchResult {
  fn failed(match_id: Uuid, error: String) -> Self {
    Self {
      match_id,
      status: MatchStatus::Error,
      error: Some(error),
      participants_processed: None,
      reputation_events_created: None,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
  pub success:                 bool,
  pub matches_processed:       usize,
  pub closed:                  usize,
  pub mutual_cancel:           usize,
  pub errors:                  usize,
  pub total_reputation_events: usize,
  #[serde(rename = "duration_ms")]
  pub duration_ms:             u64,
  pub results:                 Vec<MatchResult>,
}

impl RunSummary {
  fn from_results(results: Vec<MatchResult>, duration_ms: u64) -> Self {
    let count = |status: MatchStatus| results.iter().filter(|r| r.status == status).count();
    let closed = count(MatchStatus::Closed);
    let mutual_cancel = count(MatchStatus::MutualCancel);
    let errors = count(MatchStatus::Error);
    let total_reputation_events = results
      .iter()
      .filter_map(|r| r.reputation_events_created)
      .sum();
    let matches_processed = results.len();

    Self {
      // A run fails only when every match of a non-empty batch failed.
      success: matches_processed == 0 || errors < matches_processed,
      matches_processed,
      closed,
      mutual_cancel,
      errors,
      total_reputation_events,
      duration_ms,
      results,
    }
  }
}

// ─── Closer ──────────────────────────────────────────────────────────────────

pub struct MatchCloser<S> {
  store:    Arc<S>,
  settings: CloseSettings,
  running:  Mutex<()>,
}

impl<S: MatchStore> MatchCloser<S> {
  pub fn new(store: Arc<S>, settings: CloseSettings) -> Self {
    Self { store, settings, running: Mutex::new(()) }
  }

  pub fn settings(&self) -> CloseSettings { self.settings }

  /// Execute one closure pass.
  ///
  /// Fails only when another pass is in progress or the finder query fails.
  /// Errors on individual matches are reported in the summary instead.
  pub async fn run(&self) -> Result<RunSummary> {
    let _guard = self.running.try_lock().map_err(|_| Error::RunInProgress)?;

    let started = Instant::now();
    let cutoff = Utc::now() - self.settings.grace;
    let batch = self
      .store
      .matches_ready_for_closure(cutoff, self.settings.batch_size)
      .await
      .map_err(|e| Error::Store(Box::new(e)))?;

    info!(matches = batch.len(), %cutoff, "closure run started");

    let impacts = self.load_impacts().await;
    let mut results = Vec::with_capacity(batch.len());
    for played in &batch {
      let result = match self.close_one(played, &impacts).await {
        Ok(result) => result,
        Err(e) => {
          error!(match_id = %played.match_id, error = %e, "failed to close match");
          MatchResult::failed(played.match_id, e.to_string())
        }
      };
      results.push(result);
    }

    let elapsed = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
    let summary = RunSummary::from_results(results, elapsed);
    info!(
      processed = summary.matches_processed,
      closed = summary.closed,
      mutual_cancel = summary.mutual_cancel,
      errors = summary.errors,
      events = summary.total_reputation_events,
      duration_ms = summary.duration_ms,
      "closure run finished"
    );
    Ok(summary)
  }

  async fn load_impacts(&self) -> ImpactTable {
    match self.store.reputation_impacts().await {
      Ok(rows) => ImpactTable::with_overrides(rows),
      Err(e) => {
        warn!(error = %e, "reputation config unavailable, using default impacts");
        ImpactTable::defaults()
      }
    }
  }

  async fn close_one(
    &self,
    played: &Match,
    impacts: &ImpactTable,
  ) -> Result<MatchResult, S::Error> {
    let (participants, feedback) = tokio::try_join!(
      self.store.participants(played.match_id),
      self.store.feedback(played.match_id),
    )?;
    let now = Utc::now();

    let (status, created) = match aggregate_match(&participants, &feedback) {
      MatchVerdict::MutuallyCancelled => {
        self.finish(played.match_id, true, now).await?;
        (MatchStatus::MutualCancel, 0)
      }
      MatchVerdict::Aggregated(outcomes) => {
        let mut created = 0;
        for outcome in &outcomes {
          self.store.record_aggregate(played.match_id, *outcome, now).await?;
          let events = events_for(outcome, played, impacts);
          if !events.is_empty() {
            created += self.store.append_reputation_events(events).await?.len();
          }
        }
        self.finish(played.match_id, false, now).await?;
        (MatchStatus::Closed, created)
      }
    };

    debug!(
      match_id = %played.match_id,
      ?status,
      participants = participants.len(),
      events = created,
      "match processed"
    );
    Ok(MatchResult {
      match_id: played.match_id,
      status,
      error: None,
      participants_processed: Some(participants.len()),
      reputation_events_created: Some(created),
    })
  }

  async fn finish(
    &self,
    match_id: Uuid,
    mutually_cancelled: bool,
    closed_at: DateTime<Utc>,
  ) -> Result<(), S::Error> {
    if !self.store.close_match(match_id, mutually_cancelled, closed_at).await? {
      warn!(%match_id, "match was already closed by another run");
    }
    Ok(())
  }
}

// ─── Schedule ────────────────────────────────────────────────────────────────

/// Run `closer` every `every` in the background. The first pass happens one
/// full interval after startup.
pub fn spawn_schedule<S>(
  closer: Arc<MatchCloser<S>>,
  every: std::time::Duration,
) -> JoinHandle<()>
where
  S: MatchStore + 'static,
{
  tokio::spawn(async move {
    let mut ticker = time::interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    ticker.tick().await;

    loop {
      ticker.tick().await;
      match closer.run().await {
        Ok(summary) if !summary.success => {
          error!(errors = summary.errors, "scheduled closure run failed for every match");
        }
        Ok(_) => {}
        Err(Error::RunInProgress) => {
          info!("skipping scheduled closure run, another run is in progress");
        }
        Err(e) => error!(error = %e, "scheduled closure run failed"),
      }
    }
  })
}

#[cfg(test)]
mod tests;
