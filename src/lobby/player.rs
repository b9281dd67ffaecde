use serde::{Deserialize, Serialize};

use crate::game::state::{PlayerId, SimTime};

/// Opaque reference to the registration photo (a data URL from the studio)
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PortraitRef(pub String);

impl PortraitRef {
    pub fn new(data: impl Into<String>) -> Self {
        Self(data.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Registered participant
///
/// Registration identity (`id`, `name`, `portrait`, `join_seq`) never changes.
/// Everything else is round-scoped and restored by `reset_round`.
#[derive(Debug, Clone)]
pub struct Player {
    pub id: PlayerId,
    pub name: String,
    pub portrait: PortraitRef,
    /// Registration order, used to break leaderboard ties
    pub join_seq: u64,

    pub marbles_remaining: u32,
    pub score: u32,
    /// Spawns allowed once the clock reaches this value
    pub next_spawn_at: SimTime,
    /// Current delay between two spawns (ms)
    pub spawn_interval_ms: u64,
    /// Marbles issued this round (drives interval decay)
    pub marbles_spawned: u32,
    /// Reached the win threshold; no more spawns or scoring
    pub finished: bool,
}

impl Player {
    pub fn new(
        id: PlayerId,
        name: String,
        portrait: PortraitRef,
        join_seq: u64,
        marble_budget: u32,
        spawn_interval_ms: u64,
    ) -> Self {
        Self {
            id,
            name,
            portrait,
            join_seq,
            marbles_remaining: marble_budget,
            score: 0,
            next_spawn_at: 0,
            spawn_interval_ms,
            marbles_spawned: 0,
            finished: false,
        }
    }

    /// Restore round-scoped fields; spawning becomes eligible immediately
    pub fn reset_round(&mut self, marble_budget: u32, spawn_interval_ms: u64) {
        self.marbles_remaining = marble_budget;
        self.score = 0;
        self.next_spawn_at = 0;
        self.spawn_interval_ms = spawn_interval_ms;
        self.marbles_spawned = 0;
        self.finished = false;
    }

    /// Whether the scheduler may still issue marbles for this player
    pub fn can_spawn(&self) -> bool {
        !self.finished && self.marbles_remaining > 0
    }

    pub fn summary(&self) -> PlayerSummary {
        PlayerSummary {
            player_id: self.id,
            name: self.name.clone(),
            portrait: self.portrait.clone(),
            score: self.score,
            marbles_remaining: self.marbles_remaining,
            finished: self.finished,
        }
    }
}

/// What arena displays need to draw a player
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerSummary {
    pub player_id: PlayerId,
    pub name: String,
    pub portrait: PortraitRef,
    pub score: u32,
    pub marbles_remaining: u32,
    pub finished: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn create_player() -> Player {
        Player::new(
            Uuid::new_v4(),
            "Test".to_string(),
            PortraitRef::new("data:image/png;base64,AAAA"),
            0,
            50,
            2000,
        )
    }

    #[test]
    fn test_player_new() {
        let player = create_player();

        assert_eq!(player.marbles_remaining, 50);
        assert_eq!(player.score, 0);
        assert_eq!(player.next_spawn_at, 0);
        assert!(!player.finished);
        assert!(player.can_spawn());
    }

    #[test]
    fn test_player_reset_keeps_identity() {
        let mut player = create_player();
        let id = player.id;

        player.score = 12;
        player.marbles_remaining = 3;
        player.marbles_spawned = 47;
        player.finished = true;
        player.next_spawn_at = 99_000;
        player.spawn_interval_ms = 600;

        player.reset_round(50, 1000);

        assert_eq!(player.id, id);
        assert_eq!(player.name, "Test");
        assert_eq!(player.portrait.as_str(), "data:image/png;base64,AAAA");
        assert_eq!(player.score, 0);
        assert_eq!(player.marbles_remaining, 50);
        assert_eq!(player.marbles_spawned, 0);
        assert_eq!(player.next_spawn_at, 0);
        assert_eq!(player.spawn_interval_ms, 1000);
        assert!(!player.finished);
    }

    #[test]
    fn test_player_cannot_spawn_when_finished_or_empty() {
        let mut player = create_player();
        player.finished = true;
        assert!(!player.can_spawn());

        let mut player = create_player();
        player.marbles_remaining = 0;
        assert!(!player.can_spawn());
    }

    #[test]
    fn test_summary_carries_portrait() {
        let mut player = create_player();
        player.score = 4;

        let summary = player.summary();

        assert_eq!(summary.player_id, player.id);
        assert_eq!(summary.portrait, player.portrait);
        assert_eq!(summary.score, 4);
    }
}
