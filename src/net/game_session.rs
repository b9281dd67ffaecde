//! Game session - owns the arena engine and runs the simulation loop
//!
//! Connection tasks never touch the engine. They push `SessionCommand`s onto
//! a bounded crossbeam queue through a cloned `SessionHandle`; the loop drains
//! the queue at the start of every tick and applies each command to
//! completion before the engine steps.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::ArenaConfig;
use crate::game::constants::{net, sim};
use crate::game::engine::{ArenaEngine, EngineStats};
use crate::game::round::RoundError;
use crate::game::state::{PlayerId, RoundPhase, SimTime};
use crate::lobby::registry::RegistryError;
use crate::metrics::Metrics;
use crate::net::gateway::{BroadcastGateway, ConnectionId, DisplayRole, Outbox};
use crate::net::protocol::{roster_chunks, sanitize_name, validate_photo, ClientMessage, CollisionReport, ServerMessage};
use crate::net::remote_physics::RemoteArena;

/// Commands buffered between two ticks
pub const COMMAND_QUEUE_CAPACITY: usize = 4096;

/// Work handed from connection tasks to the simulation loop
#[derive(Debug)]
pub enum SessionCommand {
    Connect { conn_id: ConnectionId, outbox: Outbox },
    Client { conn_id: ConnectionId, message: ClientMessage },
    Disconnect { conn_id: ConnectionId },
    Status { reply: oneshot::Sender<SessionStatus> },
}

/// Point-in-time view of the session, for logs and tests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionStatus {
    pub phase: RoundPhase,
    pub players: usize,
    pub connections: usize,
    pub displays: usize,
    pub host_attached: bool,
    pub marbles_in_flight: usize,
    pub stats: EngineStats,
}

/// Errors reported back to the connection that issued a command
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Round(#[from] RoundError),
    #[error("Only the physics host may send {0}")]
    NotHost(&'static str),
    #[error("Only an arena display may send {0}")]
    NotDisplay(&'static str),
    #[error("{0}")]
    Invalid(String),
}

/// Queue errors seen by connection tasks
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("Session queue full")]
    Full,
    #[error("Session stopped")]
    Closed,
}

/// Clonable sender side of the command queue
#[derive(Debug, Clone)]
pub struct SessionHandle {
    sender: Sender<SessionCommand>,
}

impl SessionHandle {
    /// Submit a command without blocking
    pub fn try_send(&self, command: SessionCommand) -> Result<(), SessionError> {
        self.sender.try_send(command).map_err(|e| match e {
            TrySendError::Full(_) => SessionError::Full,
            TrySendError::Disconnected(_) => SessionError::Closed,
        })
    }

    pub fn connect(&self, conn_id: ConnectionId, outbox: Outbox) -> Result<(), SessionError> {
        self.try_send(SessionCommand::Connect { conn_id, outbox })
    }

    pub fn client_message(&self, conn_id: ConnectionId, message: ClientMessage) -> Result<(), SessionError> {
        self.try_send(SessionCommand::Client { conn_id, message })
    }

    /// Disconnects must not be lost, so a full queue is retried until it drains
    pub async fn disconnect(&self, conn_id: ConnectionId) {
        let mut command = SessionCommand::Disconnect { conn_id };
        loop {
            match self.sender.try_send(command) {
                Ok(()) => return,
                Err(TrySendError::Full(returned)) => {
                    command = returned;
                    tokio::time::sleep(Duration::from_millis(5)).await;
                }
                Err(TrySendError::Disconnected(_)) => return,
            }
        }
    }

    /// Ask the loop for a status snapshot; `None` once the loop is gone
    pub async fn status(&self) -> Option<SessionStatus> {
        let (reply, rx) = oneshot::channel();
        self.try_send(SessionCommand::Status { reply }).ok()?;
        rx.await.ok()
    }
}

/// Engine, gateway and command queue driven by the simulation loop
pub struct GameSession {
    engine: ArenaEngine<RemoteArena>,
    gateway: BroadcastGateway,
    commands: Receiver<SessionCommand>,
    metrics: Arc<Metrics>,
}

impl GameSession {
    pub fn new(config: ArenaConfig, max_displays: usize, metrics: Arc<Metrics>) -> (Self, SessionHandle) {
        let (sender, commands) = bounded(COMMAND_QUEUE_CAPACITY);
        let session = Self {
            engine: ArenaEngine::new(config, RemoteArena::new()),
            gateway: BroadcastGateway::new(max_displays),
            commands,
            metrics,
        };
        (session, SessionHandle { sender })
    }

    pub fn engine(&self) -> &ArenaEngine<RemoteArena> {
        &self.engine
    }

    pub fn status(&self) -> SessionStatus {
        SessionStatus {
            phase: self.engine.phase(),
            players: self.engine.registry().len(),
            connections: self.gateway.connection_count(),
            displays: self.gateway.display_count(),
            host_attached: self.engine.world().host_attached(),
            marbles_in_flight: self.engine.marbles_in_flight(),
            stats: self.engine.stats(),
        }
    }

    /// Apply every queued command, then advance the engine one tick
    pub fn tick(&mut self, now: SimTime, delta_ms: u64) {
        let pending: Vec<SessionCommand> = self.commands.try_iter().collect();
        for command in pending {
            self.handle_command(command);
        }

        let events = self.engine.tick(now, delta_ms);
        self.forward_physics();
        self.gateway.publish(events);
        self.reconcile_host();
        self.sync_metrics();
    }

    pub fn handle_command(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::Connect { conn_id, outbox } => {
                debug!("Connection opened: {}", conn_id);
                self.gateway.connect(conn_id, outbox);
            }
            SessionCommand::Client { conn_id, message } => {
                self.handle_client(conn_id, message);
            }
            SessionCommand::Disconnect { conn_id } => {
                debug!("Connection closed: {}", conn_id);
                self.leave(conn_id);
                self.gateway.disconnect(conn_id);
            }
            SessionCommand::Status { reply } => {
                let _ = reply.send(self.status());
            }
        }
        self.flush();
    }

    fn handle_client(&mut self, conn_id: ConnectionId, message: ClientMessage) {
        match message {
            ClientMessage::Register { name, photo } => {
                let reply = match self.register(conn_id, &name, photo) {
                    Ok(player_id) => ServerMessage::Registered { player_id },
                    Err(e) => {
                        warn!("Registration rejected for {}: {}", conn_id, e);
                        self.reject();
                        ServerMessage::RegistrationRejected { reason: e.to_string() }
                    }
                };
                self.gateway.send_to(conn_id, reply);
            }
            ClientMessage::JoinAsDisplay { physics_host } => {
                self.join_as_display(conn_id, physics_host);
            }
            ClientMessage::StartRound => {
                let result = self
                    .require_display(conn_id, "StartRound")
                    .and_then(|()| self.engine.start_round().map_err(CommandError::from));
                self.reply_to_command(conn_id, result);
            }
            ClientMessage::RestartRound => {
                let result = self
                    .require_display(conn_id, "RestartRound")
                    .and_then(|()| self.engine.restart_round().map_err(CommandError::from));
                self.reply_to_command(conn_id, result);
            }
            ClientMessage::StopRound => {
                let result = self
                    .require_display(conn_id, "StopRound")
                    .and_then(|()| self.engine.stop_round().map_err(CommandError::from));
                self.reply_to_command(conn_id, result);
            }
            ClientMessage::Collisions(reports) => {
                if let Err(e) = self.accept_collisions(conn_id, reports) {
                    warn!("Collision report from {} rejected: {}", conn_id, e);
                    self.reject();
                }
            }
            ClientMessage::PortraitLoaded { player_id } => {
                if !self.gateway.is_host(conn_id) {
                    warn!("Portrait report from {} rejected: {}", conn_id, CommandError::NotHost("PortraitLoaded"));
                    self.reject();
                } else if self.engine.registry().contains(player_id) {
                    self.engine.world_mut().mark_portrait_loaded(player_id);
                }
            }
            ClientMessage::Leave => {
                self.leave(conn_id);
            }
            ClientMessage::Ping { timestamp } => {
                let server_timestamp = std::time::SystemTime::now()
                    .duration_since(std::time::UNIX_EPOCH)
                    .unwrap_or_default()
                    .as_millis() as u64;
                self.gateway.send_to(
                    conn_id,
                    ServerMessage::Pong {
                        client_timestamp: timestamp,
                        server_timestamp,
                    },
                );
            }
        }
    }

    fn register(&mut self, conn_id: ConnectionId, name: &str, photo: String) -> Result<PlayerId, CommandError> {
        let portrait = validate_photo(photo).map_err(CommandError::Invalid)?;
        let name = sanitize_name(name, conn_id);
        Ok(self.engine.register(conn_id, name, portrait)?)
    }

    /// Attach a display and send it the catch-up burst before any delta
    fn join_as_display(&mut self, conn_id: ConnectionId, physics_host: bool) {
        // Deltas queued before the attach go out first, so the new display
        // cannot see a join twice.
        self.flush();

        let role = match self.gateway.attach_display(conn_id, physics_host) {
            Ok(role) => role,
            Err(reason) => {
                warn!("Display {} rejected: {}", conn_id, reason);
                self.reject();
                self.gateway.send_to(conn_id, ServerMessage::CommandRejected { reason });
                return;
            }
        };

        for chunk in roster_chunks(self.engine.roster()) {
            self.gateway.send_to(conn_id, ServerMessage::Roster(chunk));
        }
        self.gateway.send_to(conn_id, ServerMessage::Leaderboard(self.engine.leaderboard()));
        self.gateway.send_to(conn_id, ServerMessage::RoundPhase(self.engine.phase()));

        if role == DisplayRole::PhysicsHost && !self.engine.world().host_attached() {
            self.engine.world_mut().attach_host();
            let snapshot = self.engine.world().snapshot();
            info!("Physics host {} attached with {} bodies", conn_id, snapshot.len());
            self.gateway.send_to(conn_id, ServerMessage::WorldSnapshot(snapshot));
        }
    }

    fn accept_collisions(&mut self, conn_id: ConnectionId, mut reports: Vec<CollisionReport>) -> Result<(), CommandError> {
        if !self.gateway.is_host(conn_id) {
            return Err(CommandError::NotHost("Collisions"));
        }
        if reports.len() > net::MAX_COLLISIONS_PER_MESSAGE {
            warn!(
                "Host sent {} collision reports, keeping the first {}",
                reports.len(),
                net::MAX_COLLISIONS_PER_MESSAGE
            );
            reports.truncate(net::MAX_COLLISIONS_PER_MESSAGE);
        }
        self.engine.world_mut().report_collisions(reports);
        Ok(())
    }

    /// Round control belongs to the arena screens, not to phones
    fn require_display(&self, conn_id: ConnectionId, command: &'static str) -> Result<(), CommandError> {
        if self.gateway.is_display(conn_id) {
            Ok(())
        } else {
            Err(CommandError::NotDisplay(command))
        }
    }

    fn reply_to_command(&mut self, conn_id: ConnectionId, result: Result<(), CommandError>) {
        if let Err(e) = result {
            info!("Command from {} rejected: {}", conn_id, e);
            self.reject();
            self.gateway
                .send_to(conn_id, ServerMessage::CommandRejected { reason: e.to_string() });
        }
    }

    /// Drop the connection's player and display roles; the connection stays open
    fn leave(&mut self, conn_id: ConnectionId) {
        let detached = self.gateway.detach_display(conn_id);
        if detached.was_host {
            self.engine.world_mut().detach_host();
        }
        self.engine.remove(conn_id);
        self.engine.world_mut().forget_player(conn_id);
    }

    /// A host whose outbox closed was pruned by the gateway; its disconnect
    /// will no longer report `was_host`, so detach the world here.
    fn reconcile_host(&mut self) {
        if self.gateway.take_host_lost() && self.engine.world().host_attached() {
            warn!("Physics host connection lost, waiting for a new host");
            self.engine.world_mut().detach_host();
        }
    }

    fn reject(&self) {
        self.metrics.messages_rejected.fetch_add(1, Ordering::Relaxed);
    }

    fn forward_physics(&mut self) {
        for command in self.engine.world_mut().take_commands() {
            self.gateway.send_to_host(ServerMessage::Physics(command));
        }
    }

    /// Push everything commands produced since the last tick
    fn flush(&mut self) {
        self.forward_physics();
        let events = self.engine.drain_events();
        self.gateway.publish(events);
        self.reconcile_host();
    }

    fn sync_metrics(&self) {
        let metrics = &self.metrics;
        metrics.sync_engine(&self.engine.stats());
        metrics.set_round_phase(self.engine.phase());
        metrics
            .registered_players
            .store(self.engine.registry().len() as u64, Ordering::Relaxed);
        metrics
            .connected_displays
            .store(self.gateway.display_count() as u64, Ordering::Relaxed);
        metrics
            .physics_host_attached
            .store(self.engine.world().host_attached() as u64, Ordering::Relaxed);
        metrics
            .marbles_in_flight
            .store(self.engine.marbles_in_flight() as u64, Ordering::Relaxed);
        metrics.messages_sent.store(self.gateway.sent(), Ordering::Relaxed);
    }
}

/// Start the simulation loop background task
pub fn start_game_loop(mut session: GameSession, tick_rate: u32) -> JoinHandle<()> {
    let metrics = session.metrics.clone();

    tokio::spawn(async move {
        let tick_rate = tick_rate.max(1);
        let mut ticker = interval(Duration::from_micros(1_000_000 / tick_rate as u64));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!("Simulation loop started at {} Hz", tick_rate);
        let start = Instant::now();
        let mut last_now: SimTime = 0;
        let mut tick_count: u64 = 0;
        let status_every = tick_rate as u64 * sim::STATUS_LOG_INTERVAL_SECS;

        loop {
            ticker.tick().await;
            tick_count += 1;

            let now = start.elapsed().as_millis() as SimTime;
            let delta = now - last_now;
            last_now = now;

            let tick_start = Instant::now();
            session.tick(now, delta);
            metrics.record_tick_time(tick_start.elapsed());

            if tick_count % status_every == 0 {
                let status = session.status();
                info!(
                    "Arena: {}s, tick {}, {:?}, {} players, {} displays (host: {}), {} marbles | tick {}us",
                    start.elapsed().as_secs(),
                    tick_count,
                    status.phase,
                    status.players,
                    status.displays,
                    status.host_attached,
                    status.marbles_in_flight,
                    metrics.tick_time_us.load(Ordering::Relaxed)
                );
            }
        }
    })
}
