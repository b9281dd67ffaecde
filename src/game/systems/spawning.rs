//! Spawn scheduler
//!
//! Per-player rate-limited marble issuance. Every player runs on its own timer
//! so late joiners never disturb anyone else's cadence. The decision is a pure
//! function of the player's `(marbles_remaining, spawn_interval_ms,
//! next_spawn_at)` and the current time; only spawn positions are random, and
//! those are chosen by the caller.

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::game::constants::spawn;
use crate::game::physics::AssetCatalog;
use crate::game::state::{PlayerId, SimTime};
use crate::lobby::player::Player;
use crate::lobby::registry::PlayerRegistry;

/// How the inter-spawn delay evolves over a round
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpawnPolicy {
    /// Constant delay
    Fixed { interval_ms: u64 },
    /// Every `every`-th marble shortens the delay by `step_ms`, never below `floor_ms`
    Decaying {
        initial_ms: u64,
        step_ms: u64,
        every: u32,
        floor_ms: u64,
    },
}

impl SpawnPolicy {
    /// Policy used by the pachinko board
    pub fn pachinko() -> Self {
        SpawnPolicy::Decaying {
            initial_ms: spawn::DECAY_INITIAL_MS,
            step_ms: spawn::DECAY_STEP_MS,
            every: spawn::DECAY_EVERY,
            floor_ms: spawn::DECAY_FLOOR_MS,
        }
    }

    pub fn initial_interval(&self) -> u64 {
        match *self {
            SpawnPolicy::Fixed { interval_ms } => interval_ms,
            SpawnPolicy::Decaying { initial_ms, .. } => initial_ms,
        }
    }

    /// Interval after the `spawned`-th marble of the round has been issued
    pub fn next_interval(&self, current_ms: u64, spawned: u32) -> u64 {
        match *self {
            SpawnPolicy::Fixed { interval_ms } => interval_ms,
            SpawnPolicy::Decaying {
                step_ms,
                every,
                floor_ms,
                ..
            } => {
                if every > 0 && spawned > 0 && spawned % every == 0 {
                    current_ms.saturating_sub(step_ms).max(floor_ms)
                } else {
                    current_ms
                }
            }
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        match *self {
            SpawnPolicy::Fixed { interval_ms } => {
                if interval_ms == 0 {
                    return Err("spawn interval must be at least 1 ms".to_string());
                }
            }
            SpawnPolicy::Decaying {
                initial_ms,
                every,
                floor_ms,
                ..
            } => {
                if floor_ms == 0 {
                    return Err("spawn interval floor must be at least 1 ms".to_string());
                }
                if floor_ms > initial_ms {
                    return Err("spawn interval floor cannot exceed the initial interval".to_string());
                }
                if every == 0 {
                    return Err("decay period must be at least one marble".to_string());
                }
            }
        }
        Ok(())
    }
}

impl Default for SpawnPolicy {
    fn default() -> Self {
        SpawnPolicy::Fixed {
            interval_ms: spawn::FIXED_INTERVAL_MS,
        }
    }
}

/// Whether a player is due for a marble right now (ignoring asset readiness)
pub fn is_due(player: &Player, now: SimTime) -> bool {
    player.can_spawn() && now >= player.next_spawn_at
}

/// Book-keeping after one marble was issued for `player`
pub fn record_spawn(player: &mut Player, policy: &SpawnPolicy, now: SimTime) {
    player.marbles_remaining = player.marbles_remaining.saturating_sub(1);
    player.marbles_spawned += 1;
    player.spawn_interval_ms = policy.next_interval(player.spawn_interval_ms, player.marbles_spawned);
    player.next_spawn_at = now + player.spawn_interval_ms;
}

/// Run the scheduler for one tick.
///
/// Returns the players that get exactly one marble this tick, in registration
/// order. Their round state is already advanced; the caller issues the spawn
/// commands. Players whose portrait is not loaded yet are skipped without
/// consuming anything and retried next tick.
pub fn tick<A: AssetCatalog + ?Sized>(
    registry: &mut PlayerRegistry,
    policy: &SpawnPolicy,
    now: SimTime,
    assets: &A,
) -> SmallVec<[PlayerId; 8]> {
    let mut due: SmallVec<[(u64, PlayerId); 8]> = registry
        .iter()
        .filter(|p| is_due(p, now) && assets.portrait_ready(p.id))
        .map(|p| (p.join_seq, p.id))
        .collect();
    due.sort_unstable_by_key(|(seq, _)| *seq);

    let mut spawned = SmallVec::new();
    for (_, id) in due {
        if let Some(player) = registry.get_mut(id) {
            record_spawn(player, policy, now);
            spawned.push(id);
        }
    }
    spawned
}
