//! Session broadcast gateway
//!
//! Fans engine events out to attached arena displays. Every connection owns an
//! unbounded outbox drained by its writer task, so a display sees messages in
//! exactly the order they were pushed here.

use hashbrown::HashMap;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::game::engine::ArenaEvent;
use crate::game::state::PlayerId;
use crate::net::protocol::ServerMessage;

/// Transport identity of a connection (doubles as the player id)
pub type ConnectionId = PlayerId;

/// Per-connection message queue
pub type Outbox = mpsc::UnboundedSender<ServerMessage>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayRole {
    Viewer,
    PhysicsHost,
}

#[derive(Debug)]
struct Connection {
    outbox: Outbox,
    display: Option<DisplayRole>,
}

/// Result of detaching a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Detached {
    pub was_display: bool,
    pub was_host: bool,
}

#[derive(Debug)]
pub struct BroadcastGateway {
    connections: HashMap<ConnectionId, Connection>,
    host: Option<ConnectionId>,
    max_displays: usize,
    sent: u64,
    /// Set when a closed outbox took the physics host with it
    host_lost: bool,
}

impl BroadcastGateway {
    pub fn new(max_displays: usize) -> Self {
        Self {
            connections: HashMap::new(),
            host: None,
            max_displays,
            sent: 0,
            host_lost: false,
        }
    }

    pub fn connect(&mut self, id: ConnectionId, outbox: Outbox) {
        self.connections.insert(
            id,
            Connection {
                outbox,
                display: None,
            },
        );
    }

    /// Forget a connection entirely
    pub fn disconnect(&mut self, id: ConnectionId) -> Detached {
        let detached = self.detach_display(id);
        self.connections.remove(&id);
        detached
    }

    /// Mark a connection as an arena display.
    ///
    /// The host role goes to the first display that asks for it; later
    /// requests attach as plain viewers.
    pub fn attach_display(&mut self, id: ConnectionId, physics_host: bool) -> Result<DisplayRole, String> {
        let displays = self.display_count();
        let max_displays = self.max_displays;
        let host_free = self.host.is_none();

        let connection = self
            .connections
            .get_mut(&id)
            .ok_or_else(|| "Unknown connection".to_string())?;

        if let Some(role) = connection.display {
            return Ok(role);
        }
        if displays >= max_displays {
            return Err(format!("Display limit reached ({})", max_displays));
        }

        let role = if physics_host && host_free {
            DisplayRole::PhysicsHost
        } else {
            if physics_host {
                info!("Physics host already attached, {} joins as viewer", id);
            }
            DisplayRole::Viewer
        };

        connection.display = Some(role);
        if role == DisplayRole::PhysicsHost {
            self.host = Some(id);
        }
        info!("Display attached: {} as {:?}", id, role);
        Ok(role)
    }

    /// Stop sending arena traffic to a connection; it stays connected
    pub fn detach_display(&mut self, id: ConnectionId) -> Detached {
        let was_display = self
            .connections
            .get_mut(&id)
            .and_then(|c| c.display.take())
            .is_some();
        let was_host = self.host == Some(id);
        if was_host {
            self.host = None;
            info!("Physics host detached: {}", id);
        }
        Detached { was_display, was_host }
    }

    pub fn is_host(&self, id: ConnectionId) -> bool {
        self.host == Some(id)
    }

    pub fn is_display(&self, id: ConnectionId) -> bool {
        self.connections
            .get(&id)
            .is_some_and(|c| c.display.is_some())
    }

    pub fn host(&self) -> Option<ConnectionId> {
        self.host
    }

    pub fn display_count(&self) -> usize {
        self.connections
            .values()
            .filter(|c| c.display.is_some())
            .count()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Whether the host was pruned since the last call. The owner must
    /// detach its physics world when this returns true.
    pub fn take_host_lost(&mut self) -> bool {
        std::mem::take(&mut self.host_lost)
    }

    /// Messages queued since creation
    pub fn sent(&self) -> u64 {
        self.sent
    }

    /// Direct reply to one connection
    pub fn send_to(&mut self, id: ConnectionId, message: ServerMessage) {
        let delivered = match self.connections.get(&id) {
            Some(connection) => connection.outbox.send(message).is_ok(),
            None => return,
        };
        if delivered {
            self.sent += 1;
        } else {
            self.prune(id);
        }
    }

    pub fn send_to_host(&mut self, message: ServerMessage) {
        if let Some(host) = self.host {
            self.send_to(host, message);
        }
    }

    /// Queue a message for every attached display
    pub fn broadcast(&mut self, message: &ServerMessage) {
        let mut closed = Vec::new();
        for (id, connection) in &self.connections {
            if connection.display.is_none() {
                continue;
            }
            if connection.outbox.send(message.clone()).is_ok() {
                self.sent += 1;
            } else {
                closed.push(*id);
            }
        }
        for id in closed {
            self.prune(id);
        }
    }

    fn prune(&mut self, id: ConnectionId) {
        debug!("Outbox closed for {}, dropping connection", id);
        if self.disconnect(id).was_host {
            self.host_lost = true;
        }
    }

    /// Translate engine events and broadcast them in order
    pub fn publish(&mut self, events: Vec<ArenaEvent>) {
        for event in events {
            self.broadcast(&to_message(event));
        }
    }
}

/// Wire form of an engine event
pub fn to_message(event: ArenaEvent) -> ServerMessage {
    match event {
        ArenaEvent::PlayerJoined(summary) => ServerMessage::PlayerJoined(summary),
        ArenaEvent::PlayerLeft(player_id) => ServerMessage::PlayerLeft { player_id },
        ArenaEvent::LeaderboardUpdated(board) => ServerMessage::Leaderboard(board),
        ArenaEvent::RoundStarted => ServerMessage::RoundStarted,
        ArenaEvent::RoundEnded(final_leaderboard) => ServerMessage::RoundEnded { final_leaderboard },
        ArenaEvent::PlayerFinished(player_id) => ServerMessage::PlayerFinished { player_id },
        ArenaEvent::PegHit(handle) => ServerMessage::PegHit { handle },
    }
}
