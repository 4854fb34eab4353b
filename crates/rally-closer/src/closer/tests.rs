//! Closure runs against an in-memory store, with optional injected faults.

use std::collections::HashSet;

use chrono::{Duration, Utc};
use rally_core::{
  aggregate::AggregatedOutcome,
  matches::{MatchFeedback, MatchOutcome, MatchParticipant, NewFeedback, NewMatch},
  reputation::{EventType, NewReputationEvent, ReputationEvent},
};
use rally_store_sqlite::SqliteStore;

use super::*;

// ─── Fault injection ─────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
enum FlakyError {
  #[error("injected failure")]
  Injected,
  #[error(transparent)]
  Store(#[from] rally_store_sqlite::Error),
}

#[derive(Default)]
struct Faults {
  finder:         bool,
  impacts:        bool,
  broken_matches: HashSet<Uuid>,
}

/// Delegates to a real store, failing the calls named in `faults`.
struct FlakyStore {
  inner:  SqliteStore,
  faults: Faults,
}

impl MatchStore for FlakyStore {
  type Error = FlakyError;

  async fn schedule_match(&self, input: NewMatch) -> Result<Match, FlakyError> {
    Ok(self.inner.schedule_match(input).await?)
  }

  async fn get_match(&self, match_id: Uuid) -> Result<Option<Match>, FlakyError> {
    Ok(self.inner.get_match(match_id).await?)
  }

  async fn join_match(
    &self,
    match_id: Uuid,
    player_id: Uuid,
  ) -> Result<MatchParticipant, FlakyError> {
    Ok(self.inner.join_match(match_id, player_id).await?)
  }

  async fn report_outcome(
    &self,
    match_id: Uuid,
    player_id: Uuid,
    outcome: MatchOutcome,
  ) -> Result<MatchParticipant, FlakyError> {
    Ok(self.inner.report_outcome(match_id, player_id, outcome).await?)
  }

  async fn submit_feedback(&self, input: NewFeedback) -> Result<MatchFeedback, FlakyError> {
    Ok(self.inner.submit_feedback(input).await?)
  }

  async fn matches_ready_for_closure(
    &self,
    cutoff: DateTime<Utc>,
    limit: usize,
  ) -> Result<Vec<Match>, FlakyError> {
    if self.faults.finder {
      return Err(FlakyError::Injected);
    }
    Ok(self.inner.matches_ready_for_closure(cutoff, limit).await?)
  }

  async fn participants(&self, match_id: Uuid) -> Result<Vec<MatchParticipant>, FlakyError> {
    if self.faults.broken_matches.contains(&match_id) {
      return Err(FlakyError::Injected);
    }
    Ok(self.inner.participants(match_id).await?)
  }

  async fn feedback(&self, match_id: Uuid) -> Result<Vec<MatchFeedback>, FlakyError> {
    Ok(self.inner.feedback(match_id).await?)
  }

  async fn reputation_impacts(&self) -> Result<Vec<(EventType, i32)>, FlakyError> {
    if self.faults.impacts {
      return Err(FlakyError::Injected);
    }
    Ok(self.inner.reputation_impacts().await?)
  }

  async fn record_aggregate(
    &self,
    match_id: Uuid,
    outcome: AggregatedOutcome,
    aggregated_at: DateTime<Utc>,
  ) -> Result<(), FlakyError> {
    Ok(self.inner.record_aggregate(match_id, outcome, aggregated_at).await?)
  }

  async fn append_reputation_events(
    &self,
    events: Vec<NewReputationEvent>,
  ) -> Result<Vec<ReputationEvent>, FlakyError> {
    Ok(self.inner.append_reputation_events(events).await?)
  }

  async fn close_match(
    &self,
    match_id: Uuid,
    mutually_cancelled: bool,
    closed_at: DateTime<Utc>,
  ) -> Result<bool, FlakyError> {
    Ok(self.inner.close_match(match_id, mutually_cancelled, closed_at).await?)
  }

  async fn reputation_events(&self, player_id: Uuid) -> Result<Vec<ReputationEvent>, FlakyError> {
    Ok(self.inner.reputation_events(player_id).await?)
  }
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

async fn store() -> Arc<SqliteStore> {
  Arc::new(SqliteStore::open_in_memory().await.unwrap())
}

fn closer<S: MatchStore>(store: Arc<S>) -> MatchCloser<S> {
  MatchCloser::new(store, CloseSettings::default())
}

/// A one-hour match that ended `ended_ago` before now, joined by `players`
/// fresh players.
async fn seed_match(
  s: &SqliteStore,
  ended_ago: Duration,
  players: usize,
) -> (Match, Vec<Uuid>) {
  let end = Utc::now() - ended_ago;
  let m = s
    .schedule_match(NewMatch {
      scheduled_start: end - Duration::hours(1),
      scheduled_end:   end,
    })
    .await
    .unwrap();
  let mut ids = Vec::with_capacity(players);
  for _ in 0..players {
    let id = Uuid::new_v4();
    s.join_match(m.match_id, id).await.unwrap();
    ids.push(id);
  }
  (m, ids)
}

async fn overdue(s: &SqliteStore, players: usize) -> (Match, Vec<Uuid>) {
  seed_match(s, Duration::days(3), players).await
}

async fn review(
  s: &SqliteStore,
  m: &Match,
  reviewer: Uuid,
  opponent: Uuid,
  showed_up: bool,
  was_late: Option<bool>,
  star_rating: Option<u8>,
) {
  s.submit_feedback(NewFeedback {
    match_id: m.match_id,
    reviewer_id: reviewer,
    opponent_id: opponent,
    showed_up,
    was_late,
    star_rating,
    comment: None,
  })
  .await
  .unwrap();
}

async fn ledger(s: &SqliteStore, player: Uuid) -> Vec<(EventType, i32)> {
  s.reputation_events(player)
    .await
    .unwrap()
    .into_iter()
    .map(|e| (e.event_type, e.base_impact))
    .collect()
}

async fn participant(s: &SqliteStore, m: &Match, player: Uuid) -> MatchParticipant {
  s.participants(m.match_id)
    .await
    .unwrap()
    .into_iter()
    .find(|p| p.player_id == player)
    .unwrap()
}

// ─── Happy path ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn friendly_match_closes_with_three_events_each() {
  let s = store().await;
  let (m, ids) = overdue(&s, 2).await;
  let (a, b) = (ids[0], ids[1]);
  review(&s, &m, a, b, true, Some(false), Some(5)).await;
  review(&s, &m, b, a, true, Some(false), Some(5)).await;

  let summary = closer(s.clone()).run().await.unwrap();
  assert!(summary.success);
  assert_eq!(summary.matches_processed, 1);
  assert_eq!(summary.closed, 1);
  assert_eq!(summary.total_reputation_events, 6);
  assert_eq!(summary.results[0].status, MatchStatus::Closed);
  assert_eq!(summary.results[0].participants_processed, Some(2));

  for player in [a, b] {
    let mut events = ledger(&s, player).await;
    events.sort_by_key(|(t, _)| t.as_str());
    assert_eq!(events, vec![
      (EventType::MatchCompleted, 12),
      (EventType::MatchOnTime, 3),
      (EventType::ReviewReceived5Star, 10),
    ]);

    let p = participant(&s, &m, player).await;
    assert_eq!(p.showed_up, Some(true));
    assert_eq!(p.was_late, Some(false));
    assert_eq!(p.star_rating, Some(5));
    assert!(p.aggregated_at.is_some());
  }

  let events = s.reputation_events(a).await.unwrap();
  assert!(events.iter().all(|e| e.event_occurred_at == m.scheduled_end));
  assert!(events.iter().all(|e| e.match_id == Some(m.match_id)));

  let closed = s.get_match(m.match_id).await.unwrap().unwrap();
  assert!(closed.is_closed());
  assert!(!closed.mutually_cancelled);
}

#[tokio::test]
async fn late_arrival_and_rounded_rating() {
  let s = store().await;
  let (m, ids) = overdue(&s, 3).await;
  let (a, b, c) = (ids[0], ids[1], ids[2]);
  review(&s, &m, b, a, true, Some(true), Some(4)).await;
  review(&s, &m, c, a, true, Some(true), Some(5)).await;

  closer(s.clone()).run().await.unwrap();

  let p = participant(&s, &m, a).await;
  assert_eq!(p.was_late, Some(true));
  // 4.5 rounds half up.
  assert_eq!(p.star_rating, Some(5));

  let events = ledger(&s, a).await;
  assert!(events.contains(&(EventType::MatchLate, -10)));
  assert!(events.contains(&(EventType::ReviewReceived5Star, 10)));
  assert!(!events.iter().any(|(t, _)| *t == EventType::MatchOnTime));
}

#[tokio::test]
async fn participant_without_feedback_gets_no_events() {
  let s = store().await;
  let (m, ids) = overdue(&s, 3).await;
  let (a, b, c) = (ids[0], ids[1], ids[2]);
  review(&s, &m, a, b, true, Some(false), Some(4)).await;
  review(&s, &m, b, a, true, Some(false), Some(4)).await;

  let summary = closer(s.clone()).run().await.unwrap();
  assert_eq!(summary.total_reputation_events, 6);
  assert_eq!(summary.results[0].participants_processed, Some(3));

  let silent = participant(&s, &m, c).await;
  assert!(silent.aggregated_at.is_some());
  assert_eq!(silent.showed_up, None);
  assert_eq!(silent.was_late, None);
  assert_eq!(silent.star_rating, None);
  assert!(ledger(&s, c).await.is_empty());
}

#[tokio::test]
async fn no_show_reviewers_are_not_trusted() {
  let s = store().await;
  let (m, ids) = overdue(&s, 3).await;
  let (a, b, c) = (ids[0], ids[1], ids[2]);
  review(&s, &m, b, a, false, None, None).await;
  review(&s, &m, c, a, false, None, None).await;
  // `a` did not show, so this accusation is discarded.
  review(&s, &m, a, b, false, None, None).await;

  let summary = closer(s.clone()).run().await.unwrap();
  assert_eq!(summary.total_reputation_events, 1);

  assert_eq!(ledger(&s, a).await, vec![(EventType::MatchNoShow, -50)]);
  assert!(ledger(&s, b).await.is_empty());
  assert_eq!(participant(&s, &m, a).await.showed_up, Some(false));
  assert_eq!(participant(&s, &m, b).await.showed_up, None);
}

// ─── Mutual cancellation ─────────────────────────────────────────────────────

#[tokio::test]
async fn majority_cancel_closes_without_events() {
  let s = store().await;
  let (m, ids) = overdue(&s, 4).await;
  for &player in &ids[..3] {
    s.report_outcome(m.match_id, player, MatchOutcome::MutualCancel).await.unwrap();
  }
  review(&s, &m, ids[0], ids[1], true, Some(false), Some(5)).await;

  let summary = closer(s.clone()).run().await.unwrap();
  assert_eq!(summary.mutual_cancel, 1);
  assert_eq!(summary.closed, 0);
  assert_eq!(summary.total_reputation_events, 0);
  let result = &summary.results[0];
  assert_eq!(result.status, MatchStatus::MutualCancel);
  assert_eq!(result.participants_processed, Some(4));
  assert_eq!(result.reputation_events_created, Some(0));

  let closed = s.get_match(m.match_id).await.unwrap().unwrap();
  assert!(closed.mutually_cancelled);
  assert!(closed.is_closed());
  for &player in &ids {
    assert!(ledger(&s, player).await.is_empty());
    assert!(participant(&s, &m, player).await.aggregated_at.is_none());
  }
}

#[tokio::test]
async fn half_cancel_is_not_a_majority() {
  let s = store().await;
  let (m, ids) = overdue(&s, 4).await;
  for &player in &ids[..2] {
    s.report_outcome(m.match_id, player, MatchOutcome::MutualCancel).await.unwrap();
  }

  let summary = closer(s.clone()).run().await.unwrap();
  assert_eq!(summary.results[0].status, MatchStatus::Closed);
  assert!(!s.get_match(m.match_id).await.unwrap().unwrap().mutually_cancelled);
}

// ─── Selection and idempotence ───────────────────────────────────────────────

#[tokio::test]
async fn rerun_finds_nothing() {
  let s = store().await;
  let (m, ids) = overdue(&s, 2).await;
  review(&s, &m, ids[0], ids[1], true, Some(false), Some(3)).await;
  let c = closer(s.clone());

  let first = c.run().await.unwrap();
  assert_eq!(first.matches_processed, 1);
  let events_after_first = ledger(&s, ids[1]).await.len();

  for _ in 0..2 {
    let again = c.run().await.unwrap();
    assert!(again.success);
    assert_eq!(again.matches_processed, 0);
    assert!(again.results.is_empty());
  }
  assert_eq!(ledger(&s, ids[1]).await.len(), events_after_first);
}

#[tokio::test]
async fn recent_match_waits_for_grace_period() {
  let s = store().await;
  let (m, _) = seed_match(&s, Duration::hours(1), 2).await;

  let summary = closer(s.clone()).run().await.unwrap();
  assert_eq!(summary.matches_processed, 0);
  assert!(!s.get_match(m.match_id).await.unwrap().unwrap().is_closed());
}

#[tokio::test]
async fn batch_size_bounds_each_run() {
  let s = store().await;
  for _ in 0..3 {
    overdue(&s, 2).await;
  }
  let c = MatchCloser::new(s.clone(), CloseSettings {
    batch_size: 2,
    ..CloseSettings::default()
  });

  assert_eq!(c.run().await.unwrap().matches_processed, 2);
  assert_eq!(c.run().await.unwrap().matches_processed, 1);
  assert_eq!(c.run().await.unwrap().matches_processed, 0);
}

// ─── Impact configuration ────────────────────────────────────────────────────

#[tokio::test]
async fn configured_impacts_override_defaults() {
  let s = store().await;
  s.set_reputation_impact(EventType::MatchCompleted, 20).await.unwrap();
  let (m, ids) = overdue(&s, 2).await;
  review(&s, &m, ids[0], ids[1], true, Some(false), None).await;

  closer(s.clone()).run().await.unwrap();

  let mut events = ledger(&s, ids[1]).await;
  events.sort_by_key(|(t, _)| t.as_str());
  assert_eq!(events, vec![(EventType::MatchCompleted, 20), (EventType::MatchOnTime, 3)]);
}

#[tokio::test]
async fn impact_config_failure_falls_back_to_defaults() {
  let inner = SqliteStore::open_in_memory().await.unwrap();
  inner.set_reputation_impact(EventType::MatchCompleted, 99).await.unwrap();
  let (m, ids) = overdue(&inner, 2).await;
  review(&inner, &m, ids[0], ids[1], true, None, None).await;

  let flaky = Arc::new(FlakyStore {
    inner,
    faults: Faults { impacts: true, ..Faults::default() },
  });
  let summary = closer(flaky.clone()).run().await.unwrap();
  assert!(summary.success);
  assert_eq!(summary.closed, 1);
  // No punctuality votes still counts as on time.
  let mut events = ledger(&flaky.inner, ids[1]).await;
  events.sort_by_key(|(t, _)| t.as_str());
  assert_eq!(events, vec![(EventType::MatchCompleted, 12), (EventType::MatchOnTime, 3)]);
}

// ─── Failure handling ────────────────────────────────────────────────────────

#[tokio::test]
async fn failing_match_does_not_stop_the_batch() {
  let inner = SqliteStore::open_in_memory().await.unwrap();
  let (bad, _) = seed_match(&inner, Duration::days(4), 2).await;
  let (good, ids) = overdue(&inner, 2).await;
  review(&inner, &good, ids[0], ids[1], true, Some(false), Some(4)).await;

  let flaky = Arc::new(FlakyStore {
    inner,
    faults: Faults {
      broken_matches: HashSet::from([bad.match_id]),
      ..Faults::default()
    },
  });
  let summary = closer(flaky.clone()).run().await.unwrap();

  assert!(summary.success);
  assert_eq!(summary.matches_processed, 2);
  assert_eq!(summary.errors, 1);
  assert_eq!(summary.closed, 1);

  let failed = summary.results.iter().find(|r| r.match_id == bad.match_id).unwrap();
  assert_eq!(failed.status, MatchStatus::Error);
  assert_eq!(failed.error.as_deref(), Some("injected failure"));
  assert_eq!(failed.participants_processed, None);

  // The failed match stays open for the next run.
  assert!(!flaky.inner.get_match(bad.match_id).await.unwrap().unwrap().is_closed());
  assert!(flaky.inner.get_match(good.match_id).await.unwrap().unwrap().is_closed());
}

#[tokio::test]
async fn run_fails_when_every_match_fails() {
  let inner = SqliteStore::open_in_memory().await.unwrap();
  let (first, _) = overdue(&inner, 2).await;
  let (second, _) = overdue(&inner, 2).await;

  let flaky = Arc::new(FlakyStore {
    inner,
    faults: Faults {
      broken_matches: HashSet::from([first.match_id, second.match_id]),
      ..Faults::default()
    },
  });
  let summary = closer(flaky).run().await.unwrap();
  assert!(!summary.success);
  assert_eq!(summary.errors, 2);
  assert_eq!(summary.matches_processed, 2);
}

#[tokio::test]
async fn finder_failure_aborts_the_run() {
  let flaky = Arc::new(FlakyStore {
    inner:  SqliteStore::open_in_memory().await.unwrap(),
    faults: Faults { finder: true, ..Faults::default() },
  });
  let err = closer(flaky).run().await.unwrap_err();
  assert!(matches!(err, Error::Store(_)));
}

#[tokio::test]
async fn concurrent_run_is_rejected() {
  let c = closer(store().await);
  let _held = c.running.try_lock().unwrap();
  assert!(matches!(c.run().await, Err(Error::RunInProgress)));
}

// ─── Summary shape ───────────────────────────────────────────────────────────

#[test]
fn summary_serialises_with_wire_names() {
  let id = Uuid::nil();
  let summary = RunSummary::from_results(
    vec![
      MatchResult {
        match_id:                  id,
        status:                    MatchStatus::MutualCancel,
        error:                     None,
        participants_processed:    Some(4),
        reputation_events_created: Some(0),
      },
      MatchResult::failed(id, "boom".into()),
    ],
    7,
  );
  let json = serde_json::to_value(&summary).unwrap();

  assert_eq!(json["success"], true);
  assert_eq!(json["matchesProcessed"], 2);
  assert_eq!(json["mutualCancel"], 1);
  assert_eq!(json["errors"], 1);
  assert_eq!(json["duration_ms"], 7);
  assert_eq!(json["results"][0]["status"], "mutual_cancel");
  assert_eq!(json["results"][0]["participantsProcessed"], 4);
  assert!(json["results"][0].get("error").is_none());
  assert_eq!(json["results"][1]["status"], "error");
  assert_eq!(json["results"][1]["error"], "boom");
  assert!(json["results"][1].get("reputationEventsCreated").is_none());
}

#[test]
fn empty_batch_is_a_success() {
  let summary = RunSummary::from_results(Vec::new(), 0);
  assert!(summary.success);
  assert_eq!(summary.matches_processed, 0);
}
