//! Player roster
//!
//! Registered players and their per-round play state.

pub mod player;
pub mod registry;
