pub mod constants;
pub mod engine;
pub mod layout;
pub mod leaderboard;
pub mod physics;
pub mod round;
pub mod state;
pub mod systems;
pub mod testing;
