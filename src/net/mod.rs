//! Networking: wire protocol, physics-host adapter, simulation loop and
//! WebTransport plumbing.

pub mod framing;
pub mod game_session;
pub mod gateway;
pub mod protocol;
pub mod remote_physics;
pub mod tls;
pub mod transport;
