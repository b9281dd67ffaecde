//! Physics boundary
//!
//! The arena never integrates physics itself. Rigid bodies live in an external
//! simulation (the physics-host display in production, `RecordingWorld` in
//! tests); the engine talks to it only through [`PhysicsWorld`] and learns
//! about texture readiness through [`AssetCatalog`].

use serde::{Deserialize, Serialize};

use crate::game::state::PlayerId;
use crate::util::vec2::Vec2;

/// Opaque handle to a body owned by the physics substrate
pub type BodyHandle = u64;

/// Semantic label attached to every body at creation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BodyLabel {
    /// Player marble
    Marble,
    /// Static peg or bumper (cosmetic flash on hit)
    Obstacle,
    /// Floor segment that awards a point
    ScoreZone,
    /// Penalty/dead segment
    DeadZone,
    /// Sensor that scores and always consumes the marble
    GoalSensor,
    /// Goalkeeper paddle
    Keeper,
    /// Walls, spinners and moving barriers with no game meaning
    Boundary,
}

/// Collision shape of a fixture or marble
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Shape {
    Circle { radius: f32 },
    Rect { half_width: f32, half_height: f32 },
    /// Convex polygon, vertices relative to the body centre
    Polygon { vertices: Vec<Vec2> },
}

/// What to create when spawning a body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BodyKind {
    /// Dynamic marble; its texture is the owning player's portrait
    Marble { radius: f32 },
    /// Static fixture that never moves
    Fixture {
        label: BodyLabel,
        shape: Shape,
        restitution: f32,
    },
    /// Body whose motion the engine drives every tick
    Kinematic {
        label: BodyLabel,
        shape: Shape,
        restitution: f32,
    },
}

impl BodyKind {
    pub fn label(&self) -> BodyLabel {
        match self {
            BodyKind::Marble { .. } => BodyLabel::Marble,
            BodyKind::Fixture { label, .. } | BodyKind::Kinematic { label, .. } => *label,
        }
    }
}

/// One participant of a collision, as seen by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BodyRef {
    pub handle: BodyHandle,
    pub label: BodyLabel,
    /// Owning player, attached to marbles at spawn time
    pub tag: Option<PlayerId>,
}

/// Collision-start notification from the physics substrate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollisionEvent {
    pub body_a: BodyRef,
    pub body_b: BodyRef,
}

impl CollisionEvent {
    pub fn new(body_a: BodyRef, body_b: BodyRef) -> Self {
        Self { body_a, body_b }
    }

    /// Same event with participants swapped
    pub fn swapped(&self) -> Self {
        Self {
            body_a: self.body_b,
            body_b: self.body_a,
        }
    }
}

/// Pose and velocity pushed to a kinematic body each tick
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct KinematicTransform {
    pub position: Vec2,
    /// Linear velocity (units per tick)
    pub velocity: Vec2,
    /// Angular velocity (radians per tick)
    pub angular_velocity: f32,
}

/// Commands the engine issues to the physics substrate
pub trait PhysicsWorld {
    /// Advance the substrate and return the collisions that started since the
    /// previous step, in arrival order.
    fn step(&mut self, delta_ms: u64) -> Vec<CollisionEvent>;

    /// Create a body and return its handle. `tag` travels with the body and
    /// comes back in every collision that involves it.
    fn spawn_body(&mut self, kind: BodyKind, position: Vec2, tag: Option<PlayerId>) -> BodyHandle;

    /// Teleport a body and zero its linear and angular velocity
    fn reposition_body(&mut self, handle: BodyHandle, position: Vec2);

    /// Remove a body. Unknown handles are ignored.
    fn destroy_body(&mut self, handle: BodyHandle);

    fn set_kinematic_transform(&mut self, handle: BodyHandle, transform: KinematicTransform);
}

/// Rendering-side readiness checks
pub trait AssetCatalog {
    /// Whether the player's portrait texture is loaded and a marble can be drawn
    fn portrait_ready(&self, player_id: PlayerId) -> bool;
}
