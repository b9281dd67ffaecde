//! Game constants and tunable defaults
//!
//! Values mirror the arena screens the game shipped with. Everything here can
//! be overridden through `ArenaConfig`; these are only the defaults.

/// Simulation loop constants
pub mod sim {
    /// Default simulation tick rate (Hz)
    pub const TICK_RATE: u32 = 60;
    /// Longest simulated step accepted from a single host tick (ms).
    /// A stalled host loop must not produce a burst of catch-up spawns.
    pub const MAX_TICK_DELTA_MS: u64 = 250;
    /// Status log interval (seconds)
    pub const STATUS_LOG_INTERVAL_SECS: u64 = 30;
}

/// Marble economy
pub mod marbles {
    /// Marbles each player may release per round
    pub const BUDGET: u32 = 50;
    /// Rendered marble radius on the wide arenas
    pub const RADIUS: f32 = 40.0;
    /// Rendered marble radius on the pachinko board
    pub const PACHINKO_RADIUS: f32 = 25.0;
    /// Points per scored marble
    pub const POINTS_PER_GOAL: u32 = 1;
}

/// Spawn cadence
pub mod spawn {
    /// Fixed interval used by the goal arenas (ms)
    pub const FIXED_INTERVAL_MS: u64 = 2000;
    /// Starting interval on the pachinko board (ms)
    pub const DECAY_INITIAL_MS: u64 = 1000;
    /// Interval reduction applied per decay step (ms)
    pub const DECAY_STEP_MS: u64 = 100;
    /// Decay is applied every this many marbles
    pub const DECAY_EVERY: u32 = 10;
    /// Interval never drops below this (ms)
    pub const DECAY_FLOOR_MS: u64 = 600;
    /// Horizontal padding kept free on both sides of the spawn line
    pub const SIDE_MARGIN: f32 = 50.0;
    /// Spawn line height (above the visible area)
    pub const SPAWN_Y: f32 = -100.0;
}

/// Default world and fixture geometry
pub mod layout {
    pub const DEFAULT_WIDTH: f32 = 1920.0;
    pub const DEFAULT_HEIGHT: f32 = 1080.0;
    /// Side walls and floor segments share this thickness
    pub const WALL_THICKNESS: f32 = 40.0;
    /// Share of the floor width that scores
    pub const SCORE_ZONE_FRACTION: f32 = 0.3;
    /// Goalkeeper width relative to the score zone
    pub const KEEPER_WIDTH_FRACTION: f32 = 0.4;
    pub const KEEPER_HEIGHT: f32 = 10.0;
    /// Goalkeeper distance above the bottom edge
    pub const KEEPER_OFFSET_Y: f32 = 60.0;
    /// Goalkeeper speed (units per tick)
    pub const KEEPER_SPEED: f32 = 3.0;
    /// Moving triangle speed (units per tick)
    pub const TRIANGLE_SPEED: f32 = 4.0;
    pub const TRIANGLE_HALF_WIDTH: f32 = 100.0;
    pub const TRIANGLE_HALF_HEIGHT: f32 = 20.0;
    /// Vertical gap between the two triangles
    pub const TRIANGLE_GAP: f32 = 60.0;
    /// Spinner blade length and thickness
    pub const SPINNER_LENGTH: f32 = 200.0;
    pub const SPINNER_THICKNESS: f32 = 20.0;
    /// Spinner angular velocity (radians per tick)
    pub const SPINNER_SPEED: f32 = 0.05;
    /// Pegs closer than this to a spinner hub are skipped
    pub const SPINNER_SAFE_RADIUS: f32 = 160.0;
}

/// Networking constants
pub mod net {
    /// Maximum reliable message size (photos travel inline as data URLs)
    pub const MAX_MESSAGE_SIZE: usize = 1024 * 1024;
    /// Largest accepted registration photo
    pub const MAX_PHOTO_BYTES: usize = 768 * 1024;
    /// Payload budget for one catch-up roster frame
    pub const ROSTER_CHUNK_BYTES: usize = MAX_MESSAGE_SIZE - 64 * 1024;
    /// Maximum display name length after sanitising
    pub const MAX_NAME_CHARS: usize = 24;
    /// Maximum collision reports accepted in one message
    pub const MAX_COLLISIONS_PER_MESSAGE: usize = 512;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decay_floor_below_initial() {
        assert!(spawn::DECAY_FLOOR_MS < spawn::DECAY_INITIAL_MS);
        assert!(spawn::DECAY_STEP_MS > 0);
    }

    #[test]
    fn test_photo_fits_in_frame() {
        assert!(net::MAX_PHOTO_BYTES < net::MAX_MESSAGE_SIZE);
        assert!(net::MAX_PHOTO_BYTES < net::ROSTER_CHUNK_BYTES);
    }

    #[test]
    fn test_keeper_fits_score_zone() {
        assert!(layout::KEEPER_WIDTH_FRACTION < 1.0);
        assert!(layout::SCORE_ZONE_FRACTION < 1.0);
    }
}
