//! Scoring and round state machine
//!
//! `Idle -> Active -> Ended`, with restart returning to `Active` from any
//! phase. Scoring anomalies are values, not errors: the caller counts and logs
//! them and the round carries on.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::game::state::{PlayerId, Round, RoundPhase, SimTime};

/// When an active round ends on its own
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum EndCondition {
    /// Only an explicit stop ends the round
    #[default]
    Manual,
    /// At most one unfinished player left while more than one is playing
    LastStanding,
    /// Everyone reached the win threshold
    AllFinished,
    /// Either of the above
    LastStandingOrAllFinished,
}

impl EndCondition {
    pub fn is_met(&self, unfinished: usize, total: usize) -> bool {
        let last_standing = unfinished <= 1 && total > 1;
        let all_finished = total > 0 && unfinished == 0;
        match self {
            EndCondition::Manual => false,
            EndCondition::LastStanding => last_standing,
            EndCondition::AllFinished => all_finished,
            EndCondition::LastStandingOrAllFinished => last_standing || all_finished,
        }
    }
}

/// Scoring parameters of the current arena
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoundRules {
    pub win_threshold: Option<u32>,
    pub end_condition: EndCondition,
    pub points_per_goal: u32,
}

/// Rejected round commands, reported back to the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum RoundError {
    #[error("Wait for players to join!")]
    NoPlayers,
    #[error("Round already in progress")]
    AlreadyActive,
    #[error("No round in progress")]
    NotActive,
}

/// Scoring events absorbed without any state change
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Anomaly {
    #[error("collision with an untagged marble")]
    UnattributedEvent,
    #[error("marble owner is no longer registered")]
    StalePlayerReference,
    #[error("body is not a tracked marble")]
    UnknownBody,
    #[error("round is not active")]
    ScoringFrozen,
    #[error("marble owner already finished")]
    AlreadyFinished,
}

/// Result of a successfully applied score
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScoreApplied {
    pub player: PlayerId,
    pub score: u32,
    /// The player crossed the win threshold on this point
    pub finished_now: bool,
}

impl Round {
    /// Start play from `Idle` or `Ended`. Round-scoped player state is reset.
    pub fn start(&mut self, now: SimTime) -> Result<(), RoundError> {
        if self.phase == RoundPhase::Active {
            return Err(RoundError::AlreadyActive);
        }
        self.begin(now)
    }

    /// Reset every player and begin a new round, whatever the current phase
    pub fn restart(&mut self, now: SimTime) -> Result<(), RoundError> {
        self.begin(now)
    }

    fn begin(&mut self, now: SimTime) -> Result<(), RoundError> {
        if self.registry.is_empty() {
            return Err(RoundError::NoPlayers);
        }

        self.registry.reset_round();
        self.phase = RoundPhase::Active;
        self.started_at = Some(now);
        self.ended_at = None;
        self.round_number += 1;

        info!(
            "Round {} started with {} players",
            self.round_number,
            self.registry.len()
        );
        Ok(())
    }

    /// Explicit stop: `Active -> Ended`
    pub fn stop(&mut self, now: SimTime) -> Result<(), RoundError> {
        if self.phase != RoundPhase::Active {
            return Err(RoundError::NotActive);
        }
        self.end(now);
        Ok(())
    }

    fn end(&mut self, now: SimTime) {
        self.phase = RoundPhase::Ended;
        self.ended_at = Some(now);
        info!(
            "Round {} ended after {}ms",
            self.round_number,
            self.elapsed(now)
        );
    }

    /// Award points for one scored marble
    pub fn apply_score(&mut self, player_id: PlayerId, rules: &RoundRules) -> Result<ScoreApplied, Anomaly> {
        if self.phase != RoundPhase::Active {
            return Err(Anomaly::ScoringFrozen);
        }
        let player = self
            .registry
            .get_mut(player_id)
            .ok_or(Anomaly::StalePlayerReference)?;
        if player.finished {
            return Err(Anomaly::AlreadyFinished);
        }

        player.score = player.score.saturating_add(rules.points_per_goal);

        let finished_now = matches!(rules.win_threshold, Some(threshold) if player.score >= threshold);
        if finished_now {
            player.finished = true;
            info!("{} finished with {} points", player.name, player.score);
        }

        Ok(ScoreApplied {
            player: player_id,
            score: player.score,
            finished_now,
        })
    }

    /// Evaluate the end condition; moves to `Ended` and returns true when met
    pub fn check_end(&mut self, rules: &RoundRules, now: SimTime) -> bool {
        if self.phase != RoundPhase::Active {
            return false;
        }
        let unfinished = self.registry.unfinished_count();
        let total = self.registry.len();
        if rules.end_condition.is_met(unfinished, total) {
            self.end(now);
            return true;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lobby::player::PortraitRef;
    use crate::lobby::registry::{PlayerRegistry, RoundDefaults};
    use uuid::Uuid;

    fn rules(win_threshold: Option<u32>, end_condition: EndCondition) -> RoundRules {
        RoundRules {
            win_threshold,
            end_condition,
            points_per_goal: 1,
        }
    }

    fn round_with(count: usize) -> (Round, Vec<PlayerId>) {
        let mut registry = PlayerRegistry::new(RoundDefaults::default());
        let ids: Vec<PlayerId> = (0..count).map(|_| Uuid::new_v4()).collect();
        for (i, id) in ids.iter().enumerate() {
            registry
                .register(*id, format!("P{}", i), PortraitRef::new("img"))
                .unwrap();
        }
        (Round::new(registry), ids)
    }

    #[test]
    fn test_start_without_players() {
        let (mut round, _) = round_with(0);

        assert_eq!(round.start(0), Err(RoundError::NoPlayers));
        assert_eq!(round.phase, RoundPhase::Idle);
        assert!(!round.is_active());
        assert_eq!(round.round_number, 0);
    }

    #[test]
    fn test_start_and_double_start() {
        let (mut round, _) = round_with(2);

        assert!(round.start(100).is_ok());
        assert_eq!(round.phase, RoundPhase::Active);
        assert_eq!(round.started_at, Some(100));
        assert_eq!(round.round_number, 1);

        assert_eq!(round.start(200), Err(RoundError::AlreadyActive));
        assert_eq!(round.started_at, Some(100));
    }

    #[test]
    fn test_stop() {
        let (mut round, _) = round_with(1);
        assert_eq!(round.stop(0), Err(RoundError::NotActive));

        round.start(0).unwrap();
        assert!(round.stop(5_000).is_ok());
        assert_eq!(round.phase, RoundPhase::Ended);
        assert_eq!(round.elapsed(99_000), 5_000);
    }

    #[test]
    fn test_restart_resets_players() {
        let (mut round, ids) = round_with(2);
        round.start(0).unwrap();
        let r = rules(Some(3), EndCondition::Manual);
        for _ in 0..3 {
            round.apply_score(ids[0], &r).unwrap();
        }
        round.registry.get_mut(ids[1]).unwrap().marbles_remaining = 4;

        round.restart(10_000).unwrap();

        assert_eq!(round.phase, RoundPhase::Active);
        assert_eq!(round.round_number, 2);
        for player in round.registry.iter() {
            assert_eq!(player.score, 0);
            assert!(!player.finished);
            assert_eq!(player.marbles_remaining, 50);
        }
        assert_eq!(round.registry.get(ids[0]).unwrap().name, "P0");
    }

    #[test]
    fn test_restart_from_ended() {
        let (mut round, _) = round_with(1);
        round.start(0).unwrap();
        round.stop(1).unwrap();
        assert!(round.restart(2).is_ok());
        assert!(round.is_active());
        assert_eq!(round.ended_at, None);
    }

    #[test]
    fn test_score_increments() {
        let (mut round, ids) = round_with(2);
        round.start(0).unwrap();

        let applied = round.apply_score(ids[0], &rules(None, EndCondition::Manual)).unwrap();

        assert_eq!(applied.score, 1);
        assert!(!applied.finished_now);
        assert_eq!(round.registry.get(ids[0]).unwrap().score, 1);
    }

    #[test]
    fn test_score_frozen_outside_active() {
        let (mut round, ids) = round_with(1);
        let r = rules(None, EndCondition::Manual);

        assert_eq!(round.apply_score(ids[0], &r), Err(Anomaly::ScoringFrozen));

        round.start(0).unwrap();
        round.stop(1).unwrap();
        assert_eq!(round.apply_score(ids[0], &r), Err(Anomaly::ScoringFrozen));
        assert_eq!(round.registry.get(ids[0]).unwrap().score, 0);
    }

    #[test]
    fn test_stale_player_is_noop() {
        let (mut round, _) = round_with(1);
        round.start(0).unwrap();

        let result = round.apply_score(Uuid::new_v4(), &rules(None, EndCondition::Manual));

        assert_eq!(result, Err(Anomaly::StalePlayerReference));
        assert!(round.is_active());
    }

    #[test]
    fn test_win_threshold_ends_round_on_same_event() {
        let (mut round, ids) = round_with(2);
        round.start(0).unwrap();
        let r = rules(Some(3), EndCondition::LastStanding);

        for _ in 0..2 {
            round.apply_score(ids[0], &r).unwrap();
            assert!(!round.check_end(&r, 10));
        }
        let applied = round.apply_score(ids[0], &r).unwrap();
        assert!(applied.finished_now);
        assert!(round.registry.get(ids[0]).unwrap().finished);

        assert!(round.check_end(&r, 20));
        assert_eq!(round.phase, RoundPhase::Ended);
    }

    #[test]
    fn test_finished_player_stops_scoring() {
        let (mut round, ids) = round_with(3);
        round.start(0).unwrap();
        let r = rules(Some(1), EndCondition::AllFinished);

        round.apply_score(ids[0], &r).unwrap();
        assert_eq!(round.apply_score(ids[0], &r), Err(Anomaly::AlreadyFinished));
        assert_eq!(round.registry.get(ids[0]).unwrap().score, 1);
    }

    #[test]
    fn test_all_finished_waits_for_everyone() {
        let (mut round, ids) = round_with(2);
        round.start(0).unwrap();
        let r = rules(Some(1), EndCondition::AllFinished);

        round.apply_score(ids[0], &r).unwrap();
        assert!(!round.check_end(&r, 0));
        round.apply_score(ids[1], &r).unwrap();
        assert!(round.check_end(&r, 0));
    }

    #[test]
    fn test_single_player_last_standing() {
        let (mut round, ids) = round_with(1);
        round.start(0).unwrap();
        let last = rules(Some(1), EndCondition::LastStanding);
        let either = rules(Some(1), EndCondition::LastStandingOrAllFinished);

        // A lone player is never "last standing"
        assert!(!round.check_end(&last, 0));
        round.apply_score(ids[0], &either).unwrap();
        assert!(!round.check_end(&last, 0));
        assert!(round.check_end(&either, 0));
    }

    #[test]
    fn test_manual_never_ends() {
        let (mut round, ids) = round_with(2);
        round.start(0).unwrap();
        let r = rules(Some(1), EndCondition::Manual);
        round.apply_score(ids[0], &r).unwrap();
        round.apply_score(ids[1], &r).unwrap();
        assert!(!round.check_end(&r, 0));
        assert!(round.is_active());
    }

    #[test]
    fn test_end_condition_table() {
        assert!(EndCondition::LastStanding.is_met(1, 2));
        assert!(EndCondition::LastStanding.is_met(0, 2));
        assert!(!EndCondition::LastStanding.is_met(1, 1));
        assert!(!EndCondition::LastStanding.is_met(2, 3));
        assert!(EndCondition::AllFinished.is_met(0, 3));
        assert!(!EndCondition::AllFinished.is_met(1, 3));
        assert!(!EndCondition::AllFinished.is_met(0, 0));
        assert!(EndCondition::LastStandingOrAllFinished.is_met(0, 1));
        assert!(!EndCondition::Manual.is_met(0, 5));
    }
}
