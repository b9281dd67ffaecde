//! Leaderboard projection
//!
//! Read-only ranking derived from the registry. Recomputed after every score,
//! membership or reset mutation; never stored.

use serde::{Deserialize, Serialize};

use crate::game::state::PlayerId;
use crate::lobby::player::Player;
use crate::lobby::registry::PlayerRegistry;

/// One leaderboard row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub player_id: PlayerId,
    pub name: String,
    pub score: u32,
    pub finished: bool,
}

impl From<&Player> for LeaderboardEntry {
    fn from(player: &Player) -> Self {
        Self {
            player_id: player.id,
            name: player.name.clone(),
            score: player.score,
            finished: player.finished,
        }
    }
}

/// Players by score descending; first-registered wins ties
pub fn project(registry: &PlayerRegistry) -> Vec<LeaderboardEntry> {
    // `ordered` is registration order, so a stable sort keeps ties in join order
    let mut players = registry.ordered();
    players.sort_by(|a, b| b.score.cmp(&a.score));
    players.into_iter().map(LeaderboardEntry::from).collect()
}

/// Top entry, if any player has scored
pub fn leader(entries: &[LeaderboardEntry]) -> Option<&LeaderboardEntry> {
    entries.first().filter(|e| e.score > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lobby::player::PortraitRef;
    use uuid::Uuid;

    fn registry_with_scores(scores: &[(&str, u32)]) -> PlayerRegistry {
        let mut registry = PlayerRegistry::default();
        for (name, score) in scores {
            let id = Uuid::new_v4();
            registry
                .register(id, name.to_string(), PortraitRef::new("img"))
                .unwrap();
            registry.get_mut(id).unwrap().score = *score;
        }
        registry
    }

    fn names(entries: &[LeaderboardEntry]) -> Vec<&str> {
        entries.iter().map(|e| e.name.as_str()).collect()
    }

    #[test]
    fn test_sorted_by_score_with_registration_tiebreak() {
        let registry = registry_with_scores(&[("P1", 5), ("P2", 5), ("P3", 9)]);

        let board = project(&registry);

        assert_eq!(names(&board), vec!["P3", "P1", "P2"]);
    }

    #[test]
    fn test_all_tied_keeps_join_order() {
        let registry = registry_with_scores(&[("A", 0), ("B", 0), ("C", 0), ("D", 0)]);
        assert_eq!(names(&project(&registry)), vec!["A", "B", "C", "D"]);
    }

    #[test]
    fn test_reproducible() {
        let registry = registry_with_scores(&[("A", 2), ("B", 7), ("C", 2), ("D", 1), ("E", 7)]);
        let first = project(&registry);
        for _ in 0..10 {
            assert_eq!(project(&registry), first);
        }
        assert_eq!(names(&first), vec!["B", "E", "A", "C", "D"]);
    }

    #[test]
    fn test_empty() {
        let registry = PlayerRegistry::default();
        assert!(project(&registry).is_empty());
        assert!(leader(&[]).is_none());
    }

    #[test]
    fn test_leader_requires_points() {
        let registry = registry_with_scores(&[("A", 0), ("B", 0)]);
        assert!(leader(&project(&registry)).is_none());

        let registry = registry_with_scores(&[("A", 0), ("B", 3)]);
        assert_eq!(leader(&project(&registry)).map(|e| e.name.as_str()), Some("B"));
    }
}
