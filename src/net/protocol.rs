use serde::{Deserialize, Serialize};

use crate::game::constants::net::{MAX_NAME_CHARS, MAX_PHOTO_BYTES, ROSTER_CHUNK_BYTES};
use crate::game::leaderboard::LeaderboardEntry;
use crate::game::physics::{BodyHandle, BodyKind, KinematicTransform};
use crate::game::state::{PlayerId, RoundPhase};
use crate::lobby::player::{PlayerSummary, PortraitRef};
use crate::util::vec2::Vec2;

/// Messages from client to server
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ClientMessage {
    /// Enrol as a player (phone / registration studio)
    Register { name: String, photo: String },
    /// Attach as an arena display; at most one display hosts the physics
    JoinAsDisplay { physics_host: bool },
    /// Operator commands
    StartRound,
    RestartRound,
    StopRound,
    /// Collision starts observed by the physics host since its last report
    Collisions(Vec<CollisionReport>),
    /// The physics host finished loading a player's portrait texture
    PortraitLoaded { player_id: PlayerId },
    /// Leave the session
    Leave,
    /// Ping for latency measurement
    Ping { timestamp: u64 },
}

/// Messages from server to client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ServerMessage {
    /// Registration accepted under the connection's identity
    Registered { player_id: PlayerId },
    RegistrationRejected { reason: String },
    /// An operator command failed
    CommandRejected { reason: String },
    PlayerJoined(PlayerSummary),
    PlayerLeft { player_id: PlayerId },
    Leaderboard(Vec<LeaderboardEntry>),
    RoundStarted,
    RoundEnded { final_leaderboard: Vec<LeaderboardEntry> },
    /// A player reached the win threshold; their marbles are gone
    PlayerFinished { player_id: PlayerId },
    /// Roster slice, sent in registration order when a display attaches
    Roster(Vec<PlayerSummary>),
    RoundPhase(RoundPhase),
    /// Flash a peg
    PegHit { handle: BodyHandle },
    /// Body command for the physics host
    Physics(PhysicsCommand),
    /// Every live body, for a physics host that attaches mid-session
    WorldSnapshot(Vec<BodyRecord>),
    /// Pong response with server timestamp
    Pong {
        client_timestamp: u64,
        server_timestamp: u64,
    },
}

/// Raw collision report from the physics host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollisionReport {
    pub body_a: BodyHandle,
    pub body_b: BodyHandle,
}

/// Body manipulation forwarded to the physics host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PhysicsCommand {
    Spawn {
        handle: BodyHandle,
        kind: BodyKind,
        position: Vec2,
        tag: Option<PlayerId>,
    },
    /// Teleport and zero all velocity
    Reposition { handle: BodyHandle, position: Vec2 },
    Destroy { handle: BodyHandle },
    SetKinematic {
        handle: BodyHandle,
        transform: KinematicTransform,
    },
}

impl PhysicsCommand {
    pub fn handle(&self) -> BodyHandle {
        match self {
            PhysicsCommand::Spawn { handle, .. }
            | PhysicsCommand::Reposition { handle, .. }
            | PhysicsCommand::Destroy { handle }
            | PhysicsCommand::SetKinematic { handle, .. } => *handle,
        }
    }
}

/// Live body as recorded by the server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BodyRecord {
    pub handle: BodyHandle,
    pub kind: BodyKind,
    pub tag: Option<PlayerId>,
    /// Last position the server commanded
    pub position: Vec2,
}

/// Clean up a display name.
///
/// Trims, drops control characters and markup-significant `<>&`, collapses
/// whitespace runs and caps the length. An empty result becomes
/// `Player xxxx` from the first four characters of the id.
pub fn sanitize_name(raw: &str, id: PlayerId) -> String {
    let cleaned: String = raw
        .chars()
        .filter(|c| !c.is_control() || c.is_whitespace())
        .filter(|c| !matches!(c, '<' | '>' | '&'))
        .collect();

    let collapsed = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");
    let name: String = collapsed.chars().take(MAX_NAME_CHARS).collect();
    let name = name.trim_end().to_string();

    if name.is_empty() {
        let short: String = id.simple().to_string().chars().take(4).collect();
        format!("Player {}", short)
    } else {
        name
    }
}

/// Accept a registration photo as an opaque portrait reference
pub fn validate_photo(photo: String) -> Result<PortraitRef, String> {
    if photo.len() > MAX_PHOTO_BYTES {
        return Err(format!(
            "Photo too large: {} bytes (max {})",
            photo.len(),
            MAX_PHOTO_BYTES
        ));
    }
    Ok(PortraitRef::new(photo))
}

/// Encoded size estimate for one roster entry
fn summary_weight(summary: &PlayerSummary) -> usize {
    summary.portrait.len() + summary.name.len() + 64
}

/// Split a roster into slices that each fit in one frame.
///
/// Photos travel inline, so a handful of players can already exceed the
/// frame limit. Order is preserved and no slice is empty.
pub fn roster_chunks(roster: Vec<PlayerSummary>) -> Vec<Vec<PlayerSummary>> {
    let mut chunks = Vec::new();
    let mut current = Vec::new();
    let mut weight = 0;

    for summary in roster {
        let w = summary_weight(&summary);
        if !current.is_empty() && weight + w > ROSTER_CHUNK_BYTES {
            chunks.push(std::mem::take(&mut current));
            weight = 0;
        }
        weight += w;
        current.push(summary);
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

/// Encode a message using bincode
/// Uses legacy config for fixed-size integers (compatible with the browser client)
pub fn encode<T: Serialize>(message: &T) -> Result<Vec<u8>, EncodeError> {
    bincode::serde::encode_to_vec(message, bincode::config::legacy())
        .map_err(|e| EncodeError(e.to_string()))
}

/// Decode a message using bincode
pub fn decode<T: for<'de> Deserialize<'de>>(data: &[u8]) -> Result<T, DecodeError> {
    bincode::serde::decode_from_slice(data, bincode::config::legacy())
        .map(|(msg, _)| msg)
        .map_err(|e| DecodeError(e.to_string()))
}

#[derive(Debug, thiserror::Error)]
#[error("Encode error: {0}")]
pub struct EncodeError(String);

#[derive(Debug, thiserror::Error)]
#[error("Decode error: {0}")]
pub struct DecodeError(String);
