//! Peer-feedback reconciliation.
//!
//! Every participant of a match may review every opponent, so several reports
//! about the same player can disagree. This module reduces them to one verdict
//! per participant by simple majority vote. All ties resolve in favour of the
//! reviewed player.
//!
//! The functions here are pure; the closure job fetches the rows and persists
//! the results.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::matches::{MatchFeedback, MatchOutcome, MatchParticipant};

// ─── Results ─────────────────────────────────────────────────────────────────

/// The reconciled verdict for one participant.
///
/// When `feedback_count` is zero every other field is `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregatedOutcome {
  pub player_id:      Uuid,
  pub showed_up:      Option<bool>,
  /// Set for every player who showed up; `None` otherwise.
  pub was_late:       Option<bool>,
  /// Only set for players who showed up and received at least one rating.
  pub star_rating:    Option<u8>,
  pub feedback_count: usize,
}

impl AggregatedOutcome {
  fn without_feedback(player_id: Uuid) -> Self {
    Self {
      player_id,
      showed_up: None,
      was_late: None,
      star_rating: None,
      feedback_count: 0,
    }
  }
}

/// What the closure job should do with a whole match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchVerdict {
  /// A strict majority agreed no play happened. Nobody is scored.
  MutuallyCancelled,
  /// One outcome per participant, in participant order.
  Aggregated(Vec<AggregatedOutcome>),
}

// ─── Voting ──────────────────────────────────────────────────────────────────

#[derive(Debug, Default, Clone, Copy)]
struct Votes {
  yes: usize,
  no:  usize,
}

impl Votes {
  fn tally(ballots: impl IntoIterator<Item = bool>) -> Self {
    ballots.into_iter().fold(Self::default(), |mut votes, ballot| {
      if ballot {
        votes.yes += 1;
      } else {
        votes.no += 1;
      }
      votes
    })
  }

  /// Majority winner; an exact tie yields `tie`.
  fn decide(self, tie: bool) -> bool {
    match self.yes.cmp(&self.no) {
      std::cmp::Ordering::Greater => true,
      std::cmp::Ordering::Less => false,
      std::cmp::Ordering::Equal => tie,
    }
  }
}

// ─── Match-level checks ──────────────────────────────────────────────────────

/// `true` when strictly more than half of the participants self-reported
/// [`MatchOutcome::MutualCancel`].
pub fn is_mutually_cancelled(participants: &[MatchParticipant]) -> bool {
  let cancels = participants
    .iter()
    .filter(|p| p.match_outcome == Some(MatchOutcome::MutualCancel))
    .count();
  cancels * 2 > participants.len()
}

/// Participants whom the feedback written *about them* marks as absent.
///
/// The returned set is used to discard the opinions these players wrote *as
/// reviewers*: someone who did not attend cannot judge their opponents.
pub fn no_show_players(
  participants: &[MatchParticipant],
  feedback: &[MatchFeedback],
) -> HashSet<Uuid> {
  participants
    .iter()
    .map(|p| p.player_id)
    .filter(|&player_id| {
      let votes = Votes::tally(
        feedback
          .iter()
          .filter(|f| f.opponent_id == player_id)
          .map(|f| f.showed_up),
      );
      votes.no > votes.yes
    })
    .collect()
}

// ─── Per-participant aggregation ─────────────────────────────────────────────

/// Reduce the feedback rows about `player_id` to one verdict.
///
/// Callers pass only the rows they trust; rows about other players are
/// ignored.
pub fn aggregate<'a>(
  player_id: Uuid,
  rows: impl IntoIterator<Item = &'a MatchFeedback>,
) -> AggregatedOutcome {
  let rows: Vec<&MatchFeedback> = rows
    .into_iter()
    .filter(|f| f.opponent_id == player_id)
    .collect();

  if rows.is_empty() {
    return AggregatedOutcome::without_feedback(player_id);
  }

  let feedback_count = rows.len();
  let showed_up = Votes::tally(rows.iter().map(|f| f.showed_up)).decide(true);

  if !showed_up {
    return AggregatedOutcome {
      player_id,
      showed_up: Some(false),
      was_late: None,
      star_rating: None,
      feedback_count,
    };
  }

  // No punctuality votes is a 0-0 tie, which resolves to on time.
  let was_late = Votes::tally(rows.iter().filter_map(|f| f.was_late)).decide(false);

  AggregatedOutcome {
    player_id,
    showed_up: Some(true),
    was_late: Some(was_late),
    star_rating: mean_rating(rows.iter().filter_map(|f| f.star_rating)),
    feedback_count,
  }
}

/// Arithmetic mean rounded half-up, clamped into `1..=5`.
fn mean_rating(ratings: impl IntoIterator<Item = u8>) -> Option<u8> {
  let (sum, count) = ratings
    .into_iter()
    .fold((0_u32, 0_u32), |(sum, count), r| (sum + u32::from(r), count + 1));
  if count == 0 {
    return None;
  }
  // round(sum / count) for non-negative integers, without floats.
  let rounded = (2 * sum + count) / (2 * count);
  Some(rounded.clamp(1, 5) as u8)
}

/// Run the full reconciliation for one match.
pub fn aggregate_match(
  participants: &[MatchParticipant],
  feedback: &[MatchFeedback],
) -> MatchVerdict {
  if is_mutually_cancelled(participants) {
    return MatchVerdict::MutuallyCancelled;
  }

  let untrusted = no_show_players(participants, feedback);
  let trusted: Vec<&MatchFeedback> = feedback
    .iter()
    .filter(|f| !untrusted.contains(&f.reviewer_id))
    .collect();

  MatchVerdict::Aggregated(
    participants
      .iter()
      .map(|p| aggregate(p.player_id, trusted.iter().copied()))
      .collect(),
  )
}

#[cfg(test)]
mod tests {
  use chrono::Utc;

  use super::*;

  fn participant(match_id: Uuid, outcome: Option<MatchOutcome>) -> MatchParticipant {
    MatchParticipant {
      match_id,
      player_id: Uuid::new_v4(),
      joined_at: Utc::now(),
      match_outcome: outcome,
      showed_up: None,
      was_late: None,
      star_rating: None,
      aggregated_at: None,
    }
  }

  fn review(
    reviewer: Uuid,
    opponent: Uuid,
    showed_up: bool,
    was_late: Option<bool>,
    star_rating: Option<u8>,
  ) -> MatchFeedback {
    MatchFeedback {
      feedback_id: Uuid::new_v4(),
      match_id: Uuid::nil(),
      reviewer_id: reviewer,
      opponent_id: opponent,
      showed_up,
      was_late,
      star_rating,
      comment: None,
      submitted_at: Utc::now(),
    }
  }

  // ── Mutual cancellation ───────────────────────────────────────────────────

  #[test]
  fn three_of_four_cancelling_is_a_mutual_cancel() {
    let m = Uuid::new_v4();
    let mut players = vec![participant(m, Some(MatchOutcome::Played))];
    players.extend((0..3).map(|_| participant(m, Some(MatchOutcome::MutualCancel))));

    assert!(is_mutually_cancelled(&players));
    assert_eq!(aggregate_match(&players, &[]), MatchVerdict::MutuallyCancelled);
  }

  #[test]
  fn half_cancelling_is_not_a_majority() {
    let m = Uuid::new_v4();
    let players = vec![
      participant(m, Some(MatchOutcome::MutualCancel)),
      participant(m, Some(MatchOutcome::MutualCancel)),
      participant(m, Some(MatchOutcome::Played)),
      participant(m, None),
    ];
    assert!(!is_mutually_cancelled(&players));
  }

  #[test]
  fn empty_match_is_not_cancelled() {
    assert!(!is_mutually_cancelled(&[]));
    assert_eq!(aggregate_match(&[], &[]), MatchVerdict::Aggregated(vec![]));
  }

  // ── Attendance ────────────────────────────────────────────────────────────

  #[test]
  fn attendance_tie_gives_benefit_of_the_doubt() {
    let player = Uuid::new_v4();
    let rows = [
      review(Uuid::new_v4(), player, true, None, None),
      review(Uuid::new_v4(), player, false, None, None),
    ];
    let outcome = aggregate(player, &rows);
    assert_eq!(outcome.showed_up, Some(true));
    assert_eq!(outcome.feedback_count, 2);
  }

  #[test]
  fn majority_absent_clears_punctuality_and_rating() {
    let player = Uuid::new_v4();
    let rows = [
      review(Uuid::new_v4(), player, false, Some(true), Some(1)),
      review(Uuid::new_v4(), player, false, None, None),
      review(Uuid::new_v4(), player, true, Some(false), Some(5)),
    ];
    let outcome = aggregate(player, &rows);
    assert_eq!(outcome.showed_up, Some(false));
    assert_eq!(outcome.was_late, None);
    assert_eq!(outcome.star_rating, None);
    assert_eq!(outcome.feedback_count, 3);
  }

  #[test]
  fn no_feedback_yields_all_none() {
    let player = Uuid::new_v4();
    let about_someone_else = [review(Uuid::new_v4(), Uuid::new_v4(), true, None, Some(5))];
    let outcome = aggregate(player, &about_someone_else);
    assert_eq!(outcome, AggregatedOutcome::without_feedback(player));
  }

  // ── Punctuality ───────────────────────────────────────────────────────────

  #[test]
  fn punctuality_tie_resolves_on_time() {
    let player = Uuid::new_v4();
    let rows = [
      review(Uuid::new_v4(), player, true, Some(true), None),
      review(Uuid::new_v4(), player, true, Some(false), None),
      review(Uuid::new_v4(), player, true, None, None),
    ];
    assert_eq!(aggregate(player, &rows).was_late, Some(false));
  }

  #[test]
  fn punctuality_majority_late() {
    let player = Uuid::new_v4();
    let rows = [
      review(Uuid::new_v4(), player, true, Some(true), None),
      review(Uuid::new_v4(), player, true, Some(true), None),
      review(Uuid::new_v4(), player, true, Some(false), None),
    ];
    assert_eq!(aggregate(player, &rows).was_late, Some(true));
  }

  #[test]
  fn punctuality_without_votes_counts_as_on_time() {
    let player = Uuid::new_v4();
    let rows = [review(Uuid::new_v4(), player, true, None, Some(5))];
    let outcome = aggregate(player, &rows);
    assert_eq!(outcome.showed_up, Some(true));
    assert_eq!(outcome.was_late, Some(false));
    assert_eq!(outcome.star_rating, Some(5));
  }

  // ── Rating ────────────────────────────────────────────────────────────────

  #[test]
  fn rating_mean_rounds_half_up() {
    assert_eq!(mean_rating([4, 5]), Some(5));
    assert_eq!(mean_rating([3, 4, 4]), Some(4));
    assert_eq!(mean_rating([1, 2]), Some(2));
    assert_eq!(mean_rating([2, 2, 3]), Some(2));
  }

  #[test]
  fn rating_is_clamped() {
    assert_eq!(mean_rating([0]), Some(1));
    assert_eq!(mean_rating([9, 9]), Some(5));
    assert_eq!(mean_rating([]), None);
  }

  #[test]
  fn rating_mean_stays_within_bounds_for_valid_inputs() {
    for a in 1..=5_u8 {
      for b in 1..=5_u8 {
        for c in 1..=5_u8 {
          let r = mean_rating([a, b, c]).unwrap();
          assert!((1..=5).contains(&r), "{a},{b},{c} -> {r}");
        }
      }
    }
  }

  // ── No-show reviewers ─────────────────────────────────────────────────────

  #[test]
  fn no_show_reviewer_opinions_are_discarded() {
    let m = Uuid::new_v4();
    let players = vec![
      participant(m, Some(MatchOutcome::Played)),
      participant(m, Some(MatchOutcome::Played)),
      participant(m, Some(MatchOutcome::Played)),
    ];
    let (a, b, c) = (players[0].player_id, players[1].player_id, players[2].player_id);

    let feedback = vec![
      // Both opponents say C never came.
      review(a, c, false, None, None),
      review(b, c, false, None, None),
      // C claims A did not show either; A and B vouch for each other.
      review(c, a, false, None, None),
      review(b, a, true, Some(false), Some(4)),
      review(a, b, true, Some(false), Some(5)),
    ];

    let untrusted = no_show_players(&players, &feedback);
    assert_eq!(untrusted, HashSet::from([c]));

    let MatchVerdict::Aggregated(outcomes) = aggregate_match(&players, &feedback) else {
      panic!("expected aggregated verdict");
    };
    let for_a = outcomes.iter().find(|o| o.player_id == a).unwrap();
    assert_eq!(for_a.showed_up, Some(true));
    assert_eq!(for_a.feedback_count, 1, "C's review of A must be ignored");
    assert_eq!(for_a.star_rating, Some(4));

    // The no-show player's own verdict still counts the trusted reviews.
    let for_c = outcomes.iter().find(|o| o.player_id == c).unwrap();
    assert_eq!(for_c.showed_up, Some(false));
    assert_eq!(for_c.feedback_count, 2);
  }

  #[test]
  fn split_opinion_about_a_player_does_not_flag_them() {
    let m = Uuid::new_v4();
    let players = vec![participant(m, None), participant(m, None), participant(m, None)];
    let target = players[2].player_id;
    let feedback = vec![
      review(players[0].player_id, target, false, None, None),
      review(players[1].player_id, target, true, None, None),
    ];
    assert!(no_show_players(&players, &feedback).is_empty());
  }

  #[test]
  fn two_players_rating_each_other_five_stars() {
    let m = Uuid::new_v4();
    let players = vec![participant(m, Some(MatchOutcome::Played)), participant(m, None)];
    let (a, b) = (players[0].player_id, players[1].player_id);
    let feedback = vec![
      review(a, b, true, Some(false), Some(5)),
      review(b, a, true, Some(false), Some(5)),
    ];

    let MatchVerdict::Aggregated(outcomes) = aggregate_match(&players, &feedback) else {
      panic!("expected aggregated verdict");
    };
    assert_eq!(outcomes.len(), 2);
    for o in outcomes {
      assert_eq!(o.showed_up, Some(true));
      assert_eq!(o.was_late, Some(false));
      assert_eq!(o.star_rating, Some(5));
      assert_eq!(o.feedback_count, 1);
    }
  }
}
