//! Round state definitions
//!
//! The `Round` aggregate is the single source of truth for everything the
//! arena mutates: the roster (with per-player round state) and the phase.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::lobby::registry::PlayerRegistry;

/// Unique player identifier (the transport session identity)
pub type PlayerId = Uuid;

/// Simulation clock in milliseconds since the loop started
pub type SimTime = u64;

/// Round phase
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum RoundPhase {
    /// No round has started yet
    #[default]
    Idle,
    /// Spawning and scoring enabled
    Active,
    /// Scoring frozen, leaderboard retained until restart
    Ended,
}

/// One play session
#[derive(Debug)]
pub struct Round {
    pub phase: RoundPhase,
    /// Set when the phase moves to `Active`
    pub started_at: Option<SimTime>,
    pub ended_at: Option<SimTime>,
    /// Number of rounds started since the process began
    pub round_number: u32,
    pub registry: PlayerRegistry,
}

impl Round {
    pub fn new(registry: PlayerRegistry) -> Self {
        Self {
            phase: RoundPhase::Idle,
            started_at: None,
            ended_at: None,
            round_number: 0,
            registry,
        }
    }

    pub fn is_active(&self) -> bool {
        self.phase == RoundPhase::Active
    }

    /// Elapsed round time, frozen once the round ends
    pub fn elapsed(&self, now: SimTime) -> SimTime {
        match (self.started_at, self.ended_at) {
            (Some(start), Some(end)) => end.saturating_sub(start),
            (Some(start), None) => now.saturating_sub(start),
            _ => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lobby::registry::RoundDefaults;

    #[test]
    fn test_new_round_is_idle() {
        let round = Round::new(PlayerRegistry::new(RoundDefaults::default()));
        assert_eq!(round.phase, RoundPhase::Idle);
        assert!(!round.is_active());
        assert!(round.started_at.is_none());
        assert_eq!(round.round_number, 0);
    }

    #[test]
    fn test_elapsed() {
        let mut round = Round::new(PlayerRegistry::new(RoundDefaults::default()));
        assert_eq!(round.elapsed(500), 0);

        round.started_at = Some(1_000);
        assert_eq!(round.elapsed(4_000), 3_000);

        round.ended_at = Some(2_500);
        assert_eq!(round.elapsed(9_000), 1_500);
    }
}
