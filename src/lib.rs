//! Marble Arena Server Library
//!
//! Authoritative session engine for a live marble-drop party game, served to
//! arena displays and phones over WebTransport.
//!
//! - `lobby` - player registry and per-round player state
//! - `game` - spawn scheduling, collision scoring, round state machine
//! - `net` - wire protocol, physics-host adapter, simulation loop, transport

pub mod config;
pub mod util;
pub mod game;
pub mod lobby;
pub mod net;
pub mod metrics;
