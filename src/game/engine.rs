//! Arena session engine
//!
//! Owns the round aggregate and drives the physics boundary. Everything that
//! mutates game state goes through this type on the simulation thread:
//! commands between ticks, collisions and spawns inside `tick`. Outbound
//! events accumulate in an internal queue and are drained by the caller.

use hashbrown::HashMap;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{debug, info};

use crate::config::{ArenaConfig, DeadZoneBehavior};
use crate::game::constants::sim;
use crate::game::layout::KinematicSpec;
use crate::game::leaderboard::{self, LeaderboardEntry};
use crate::game::physics::{AssetCatalog, BodyHandle, BodyKind, CollisionEvent, PhysicsWorld};
use crate::game::round::{Anomaly, RoundError, RoundRules};
use crate::game::state::{PlayerId, Round, RoundPhase, SimTime};
use crate::game::systems::kinematics::KinematicBody;
use crate::game::systems::spawning;
use crate::game::systems::zones::{self, Outcome};
use crate::lobby::player::{PlayerSummary, PortraitRef};
use crate::lobby::registry::{PlayerRegistry, RegistryError};
use crate::util::vec2::Vec2;

/// Outbound notification for arena displays
#[derive(Debug, Clone, PartialEq)]
pub enum ArenaEvent {
    PlayerJoined(PlayerSummary),
    PlayerLeft(PlayerId),
    LeaderboardUpdated(Vec<LeaderboardEntry>),
    RoundStarted,
    RoundEnded(Vec<LeaderboardEntry>),
    PlayerFinished(PlayerId),
    /// Transient visual cue for a peg or bumper
    PegHit(BodyHandle),
}

/// Running totals since the engine was created
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineStats {
    pub marbles_spawned: u64,
    pub marbles_scored: u64,
    pub marbles_recycled: u64,
    pub marbles_destroyed: u64,
    pub anomalies: u64,
    pub rounds_started: u64,
    pub rounds_ended: u64,
}

pub struct ArenaEngine<W> {
    config: ArenaConfig,
    rules: RoundRules,
    round: Round,
    world: W,
    rng: StdRng,
    /// In-flight marbles and their owners
    marbles: HashMap<BodyHandle, PlayerId>,
    fixtures: Vec<BodyHandle>,
    kinematics: Vec<KinematicBody>,
    events: Vec<ArenaEvent>,
    leaderboard_dirty: bool,
    now: SimTime,
    stats: EngineStats,
}

impl<W: PhysicsWorld + AssetCatalog> ArenaEngine<W> {
    /// Create the engine and lay out the arena fixtures
    pub fn new(config: ArenaConfig, world: W) -> Self {
        let registry = PlayerRegistry::new(config.round_defaults());
        let mut engine = Self {
            rules: config.rules(),
            rng: StdRng::seed_from_u64(config.seed),
            config,
            round: Round::new(registry),
            world,
            marbles: HashMap::new(),
            fixtures: Vec::new(),
            kinematics: Vec::new(),
            events: Vec::new(),
            leaderboard_dirty: false,
            now: 0,
            stats: EngineStats::default(),
        };
        engine.setup_fixtures();
        engine
    }

    // ========================================================================
    // Commands
    // ========================================================================

    /// Register a player under the caller's transport identity
    pub fn register(&mut self, id: PlayerId, name: String, portrait: PortraitRef) -> Result<PlayerId, RegistryError> {
        let id = self.round.registry.register(id, name, portrait)?;
        let summary = self.round.registry.get(id)?.summary();
        info!("Player registered: {} ({})", summary.name, id);

        self.events.push(ArenaEvent::PlayerJoined(summary));
        self.push_leaderboard();
        Ok(id)
    }

    /// Remove a player. Their in-flight marbles keep falling; any score they
    /// would produce is dropped as stale.
    pub fn remove(&mut self, id: PlayerId) {
        if let Some(player) = self.round.registry.remove(id) {
            info!("Player left: {} ({})", player.name, id);
            self.events.push(ArenaEvent::PlayerLeft(id));
            self.push_leaderboard();
        }
    }

    /// `Idle`/`Ended -> Active`
    pub fn start_round(&mut self) -> Result<(), RoundError> {
        self.round.start(self.now)?;
        self.on_round_begun();
        Ok(())
    }

    /// Reset every player and begin again from any phase
    pub fn restart_round(&mut self) -> Result<(), RoundError> {
        self.round.restart(self.now)?;
        self.on_round_begun();
        Ok(())
    }

    /// Explicit stop of an active round
    pub fn stop_round(&mut self) -> Result<(), RoundError> {
        self.round.stop(self.now)?;
        self.on_round_ended();
        Ok(())
    }

    fn on_round_begun(&mut self) {
        self.clear_marbles();
        self.setup_fixtures();
        self.stats.rounds_started += 1;
        self.events.push(ArenaEvent::RoundStarted);
        self.push_leaderboard();
    }

    fn on_round_ended(&mut self) {
        self.stats.rounds_ended += 1;
        self.flush_leaderboard();
        let board = leaderboard::project(&self.round.registry);
        match leaderboard::leader(&board) {
            Some(winner) => info!("Round won by {} with {} points", winner.name, winner.score),
            None => info!("Round ended without a score"),
        }
        self.events.push(ArenaEvent::RoundEnded(board));
    }

    // ========================================================================
    // Simulation
    // ========================================================================

    /// Advance one simulation tick and return the events it produced,
    /// including any queued by commands since the previous drain.
    pub fn tick(&mut self, now_ms: SimTime, delta_ms: u64) -> Vec<ArenaEvent> {
        self.now = now_ms;

        let collisions = self.world.step(delta_ms.min(sim::MAX_TICK_DELTA_MS));
        for event in &collisions {
            self.apply_collision(event);
        }

        for body in &mut self.kinematics {
            let transform = body.advance();
            self.world.set_kinematic_transform(body.handle, transform);
        }

        if self.round.is_active() {
            self.run_spawns(now_ms);
        }

        self.drain_events()
    }

    /// Take the events queued so far
    pub fn drain_events(&mut self) -> Vec<ArenaEvent> {
        self.flush_leaderboard();
        std::mem::take(&mut self.events)
    }

    fn run_spawns(&mut self, now: SimTime) {
        let due = spawning::tick(
            &mut self.round.registry,
            &self.config.spawn_policy,
            now,
            &self.world,
        );

        let radius = self.config.layout.marble_radius;
        for player_id in due {
            let position = self.config.layout.spawn_point(&mut self.rng);
            let handle = self
                .world
                .spawn_body(BodyKind::Marble { radius }, position, Some(player_id));
            self.marbles.insert(handle, player_id);
            self.stats.marbles_spawned += 1;
        }
    }

    /// Apply one collision-start event to the round
    pub fn apply_collision(&mut self, event: &CollisionEvent) {
        match zones::classify(event) {
            Outcome::Bounce { obstacle } => self.events.push(ArenaEvent::PegHit(obstacle)),
            Outcome::Score { player, marble } => {
                let consume = self.config.consume_scored_marbles;
                self.score(player, marble, consume);
            }
            Outcome::ScoreAndConsume { player, marble } => self.score(player, marble, true),
            Outcome::Recycle { marble } => self.recycle(marble),
            Outcome::Unattributed { .. } => self.record_anomaly(Anomaly::UnattributedEvent),
            Outcome::Ignore => {}
        }
    }

    fn score(&mut self, player: PlayerId, marble: BodyHandle, consume: bool) {
        if !self.marbles.contains_key(&marble) {
            self.record_anomaly(Anomaly::UnknownBody);
            return;
        }

        let result = self.round.apply_score(player, &self.rules);
        if consume {
            self.destroy_marble(marble);
        }

        let applied = match result {
            Ok(applied) => applied,
            Err(anomaly) => {
                self.record_anomaly(anomaly);
                return;
            }
        };

        self.stats.marbles_scored += 1;
        self.leaderboard_dirty = true;

        if applied.finished_now {
            self.consume_player_marbles(player);
            self.events.push(ArenaEvent::PlayerFinished(player));
        }

        if self.round.check_end(&self.rules, self.now) {
            self.on_round_ended();
        }
    }

    fn recycle(&mut self, marble: BodyHandle) {
        if !self.marbles.contains_key(&marble) {
            self.record_anomaly(Anomaly::UnknownBody);
            return;
        }
        if !self.round.is_active() {
            self.record_anomaly(Anomaly::ScoringFrozen);
            return;
        }

        match self.config.dead_zone {
            DeadZoneBehavior::Recycle => {
                let position = self.config.layout.spawn_point(&mut self.rng);
                self.world.reposition_body(marble, position);
                self.stats.marbles_recycled += 1;
            }
            DeadZoneBehavior::Destroy => self.destroy_marble(marble),
        }
    }

    fn record_anomaly(&mut self, anomaly: Anomaly) {
        self.stats.anomalies += 1;
        debug!("Dropped scoring event: {}", anomaly);
    }

    fn destroy_marble(&mut self, handle: BodyHandle) {
        if self.marbles.remove(&handle).is_some() {
            self.world.destroy_body(handle);
            self.stats.marbles_destroyed += 1;
        }
    }

    fn consume_player_marbles(&mut self, player: PlayerId) {
        let owned: Vec<BodyHandle> = self
            .marbles
            .iter()
            .filter(|(_, owner)| **owner == player)
            .map(|(handle, _)| *handle)
            .collect();
        for handle in owned {
            self.destroy_marble(handle);
        }
    }

    fn clear_marbles(&mut self) {
        let count = self.marbles.len();
        for (handle, _) in self.marbles.drain() {
            self.world.destroy_body(handle);
        }
        self.stats.marbles_destroyed += count as u64;
    }

    /// Tear down previous fixtures and create the layout from scratch
    fn setup_fixtures(&mut self) {
        for handle in self.fixtures.drain(..) {
            self.world.destroy_body(handle);
        }
        for body in self.kinematics.drain(..) {
            self.world.destroy_body(body.handle);
        }

        for spec in &self.config.layout.fixtures {
            let kind = BodyKind::Fixture {
                label: spec.label,
                shape: spec.shape.clone(),
                restitution: spec.restitution,
            };
            let handle = self.world.spawn_body(kind, spec.position, None);
            self.fixtures.push(handle);
        }

        for spec in &self.config.layout.kinematics {
            let (kind, position) = kinematic_body(spec);
            let handle = self.world.spawn_body(kind, position, None);
            self.kinematics.push(KinematicBody::from_spec(handle, spec));
        }

        debug!(
            "Arena laid out: {} fixtures, {} kinematic",
            self.fixtures.len(),
            self.kinematics.len()
        );
    }

    fn push_leaderboard(&mut self) {
        self.leaderboard_dirty = false;
        self.events
            .push(ArenaEvent::LeaderboardUpdated(leaderboard::project(&self.round.registry)));
    }

    fn flush_leaderboard(&mut self) {
        if self.leaderboard_dirty {
            self.push_leaderboard();
        }
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub fn leaderboard(&self) -> Vec<LeaderboardEntry> {
        leaderboard::project(&self.round.registry)
    }

    /// Every registered player in registration order
    pub fn roster(&self) -> Vec<PlayerSummary> {
        self.round
            .registry
            .ordered()
            .into_iter()
            .map(|p| p.summary())
            .collect()
    }

    pub fn phase(&self) -> RoundPhase {
        self.round.phase
    }

    pub fn round(&self) -> &Round {
        &self.round
    }

    pub fn registry(&self) -> &PlayerRegistry {
        &self.round.registry
    }

    pub fn config(&self) -> &ArenaConfig {
        &self.config
    }

    pub fn stats(&self) -> EngineStats {
        self.stats
    }

    pub fn marbles_in_flight(&self) -> usize {
        self.marbles.len()
    }

    pub fn marble_owner(&self, handle: BodyHandle) -> Option<PlayerId> {
        self.marbles.get(&handle).copied()
    }

    pub fn kinematics(&self) -> &[KinematicBody] {
        &self.kinematics
    }

    pub fn world(&self) -> &W {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut W {
        &mut self.world
    }
}

fn kinematic_body(spec: &KinematicSpec) -> (BodyKind, Vec2) {
    match spec {
        KinematicSpec::Oscillator {
            label,
            shape,
            origin,
            restitution,
            ..
        } => (
            BodyKind::Kinematic {
                label: *label,
                shape: shape.clone(),
                restitution: *restitution,
            },
            *origin,
        ),
        KinematicSpec::Spinner {
            label,
            shape,
            position,
            restitution,
            ..
        } => (
            BodyKind::Kinematic {
                label: *label,
                shape: shape.clone(),
                restitution: *restitution,
            },
            *position,
        ),
    }
}
