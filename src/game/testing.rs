//! In-memory physics substrate for tests and benchmarks
//!
//! `RecordingWorld` keeps a ledger of bodies and the commands it received.
//! Nothing moves on its own: tests place bodies and queue the collisions the
//! next `step` should report.

use hashbrown::{HashMap, HashSet};

use crate::game::physics::{
    AssetCatalog, BodyHandle, BodyKind, BodyLabel, BodyRef, CollisionEvent, KinematicTransform, PhysicsWorld,
};
use crate::game::state::PlayerId;
use crate::util::vec2::Vec2;

/// Body as the recording world sees it
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedBody {
    pub kind: BodyKind,
    pub tag: Option<PlayerId>,
    pub position: Vec2,
    pub velocity: Vec2,
    pub angular_velocity: f32,
}

impl RecordedBody {
    pub fn label(&self) -> BodyLabel {
        self.kind.label()
    }
}

#[derive(Debug, Default)]
pub struct RecordingWorld {
    next_handle: BodyHandle,
    bodies: HashMap<BodyHandle, RecordedBody>,
    pending: Vec<CollisionEvent>,
    blocked_portraits: HashSet<PlayerId>,
    transforms: HashMap<BodyHandle, usize>,
    steps: u64,
    elapsed_ms: u64,
}

impl RecordingWorld {
    pub fn new() -> Self {
        Self::default()
    }

    /// Collision between two live bodies, labelled from the ledger
    pub fn collision(&self, a: BodyHandle, b: BodyHandle) -> Option<CollisionEvent> {
        let body_ref = |handle: BodyHandle| {
            self.bodies.get(&handle).map(|body| BodyRef {
                handle,
                label: body.label(),
                tag: body.tag,
            })
        };
        Some(CollisionEvent::new(body_ref(a)?, body_ref(b)?))
    }

    /// Report a collision on the next `step`. Unknown handles are ignored.
    pub fn queue_collision(&mut self, a: BodyHandle, b: BodyHandle) {
        if let Some(event) = self.collision(a, b) {
            self.pending.push(event);
        }
    }

    /// Queue an arbitrary (possibly malformed) event
    pub fn queue_raw(&mut self, event: CollisionEvent) {
        self.pending.push(event);
    }

    pub fn block_portrait(&mut self, player_id: PlayerId) {
        self.blocked_portraits.insert(player_id);
    }

    pub fn mark_portrait_loaded(&mut self, player_id: PlayerId) {
        self.blocked_portraits.remove(&player_id);
    }

    pub fn body(&self, handle: BodyHandle) -> Option<&RecordedBody> {
        self.bodies.get(&handle)
    }

    pub fn is_alive(&self, handle: BodyHandle) -> bool {
        self.bodies.contains_key(&handle)
    }

    pub fn body_count(&self) -> usize {
        self.bodies.len()
    }

    /// Teleport without touching velocity, as if the body had fallen there
    pub fn move_body(&mut self, handle: BodyHandle, position: Vec2) {
        if let Some(body) = self.bodies.get_mut(&handle) {
            body.position = position;
        }
    }

    /// Lowest handle carrying `label`
    pub fn first_with_label(&self, label: BodyLabel) -> Option<BodyHandle> {
        self.bodies
            .iter()
            .filter(|(_, body)| body.label() == label)
            .map(|(handle, _)| *handle)
            .min()
    }

    /// Live marbles tagged with `player_id`, oldest first
    pub fn marbles_of(&self, player_id: PlayerId) -> Vec<BodyHandle> {
        let mut handles: Vec<BodyHandle> = self
            .bodies
            .iter()
            .filter(|(_, body)| body.label() == BodyLabel::Marble && body.tag == Some(player_id))
            .map(|(handle, _)| *handle)
            .collect();
        handles.sort_unstable();
        handles
    }

    pub fn marble_count(&self) -> usize {
        self.bodies
            .values()
            .filter(|body| body.label() == BodyLabel::Marble)
            .count()
    }

    /// How many kinematic updates `handle` received
    pub fn transforms_for(&self, handle: BodyHandle) -> usize {
        self.transforms.get(&handle).copied().unwrap_or(0)
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.elapsed_ms
    }
}

impl PhysicsWorld for RecordingWorld {
    fn step(&mut self, delta_ms: u64) -> Vec<CollisionEvent> {
        self.steps += 1;
        self.elapsed_ms += delta_ms;
        std::mem::take(&mut self.pending)
    }

    fn spawn_body(&mut self, kind: BodyKind, position: Vec2, tag: Option<PlayerId>) -> BodyHandle {
        self.next_handle += 1;
        let handle = self.next_handle;
        self.bodies.insert(
            handle,
            RecordedBody {
                kind,
                tag,
                position,
                velocity: Vec2::ZERO,
                angular_velocity: 0.0,
            },
        );
        handle
    }

    fn reposition_body(&mut self, handle: BodyHandle, position: Vec2) {
        if let Some(body) = self.bodies.get_mut(&handle) {
            body.position = position;
            body.velocity = Vec2::ZERO;
            body.angular_velocity = 0.0;
        }
    }

    fn destroy_body(&mut self, handle: BodyHandle) {
        self.bodies.remove(&handle);
    }

    fn set_kinematic_transform(&mut self, handle: BodyHandle, transform: KinematicTransform) {
        if let Some(body) = self.bodies.get_mut(&handle) {
            body.position = transform.position;
            body.velocity = transform.velocity;
            body.angular_velocity = transform.angular_velocity;
            *self.transforms.entry(handle).or_insert(0) += 1;
        }
    }
}

impl AssetCatalog for RecordingWorld {
    fn portrait_ready(&self, player_id: PlayerId) -> bool {
        !self.blocked_portraits.contains(&player_id)
    }
}
