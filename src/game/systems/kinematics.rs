//! Kinematic fixtures
//!
//! Goalkeepers, moving barriers and spinners are driven by the engine, not by
//! the physics substrate. Motion is advanced once per simulation tick and is a
//! pure function of the current state.

use crate::game::layout::{Axis, KinematicSpec};
use crate::game::physics::{BodyHandle, KinematicTransform};
use crate::util::vec2::Vec2;

/// Live state of one kinematic fixture
#[derive(Debug, Clone, PartialEq)]
pub struct KinematicBody {
    pub handle: BodyHandle,
    pub motion: Motion,
    pub position: Vec2,
    /// Accumulated rotation (radians)
    pub angle: f32,
}

/// Motion law taken from the layout
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Motion {
    Oscillator {
        axis: Axis,
        min: f32,
        max: f32,
        speed: f32,
        direction: f32,
    },
    Spinner { angular_velocity: f32 },
}

impl KinematicBody {
    /// Fresh body at the layout origin and initial direction
    pub fn from_spec(handle: BodyHandle, spec: &KinematicSpec) -> Self {
        match spec {
            KinematicSpec::Oscillator {
                origin,
                axis,
                min,
                max,
                speed,
                direction,
                ..
            } => Self {
                handle,
                motion: Motion::Oscillator {
                    axis: *axis,
                    min: *min,
                    max: *max,
                    speed: *speed,
                    direction: direction.signum(),
                },
                position: *origin,
                angle: 0.0,
            },
            KinematicSpec::Spinner {
                position,
                angular_velocity,
                ..
            } => Self {
                handle,
                motion: Motion::Spinner {
                    angular_velocity: *angular_velocity,
                },
                position: *position,
                angle: 0.0,
            },
        }
    }

    /// Advance one tick and return the transform to push to the substrate
    pub fn advance(&mut self) -> KinematicTransform {
        match &mut self.motion {
            Motion::Oscillator {
                axis,
                min,
                max,
                speed,
                direction,
            } => {
                let (next, dir) = oscillate(axis_value(self.position, *axis), *direction, *speed, *min, *max);
                let previous = self.position;
                self.position = match axis {
                    Axis::X => self.position.with_x(next),
                    Axis::Y => self.position.with_y(next),
                };
                *direction = dir;

                KinematicTransform {
                    position: self.position,
                    velocity: self.position - previous,
                    angular_velocity: 0.0,
                }
            }
            Motion::Spinner { angular_velocity } => {
                self.angle += *angular_velocity;
                KinematicTransform {
                    position: self.position,
                    velocity: Vec2::ZERO,
                    angular_velocity: *angular_velocity,
                }
            }
        }
    }
}

fn axis_value(position: Vec2, axis: Axis) -> f32 {
    match axis {
        Axis::X => position.x,
        Axis::Y => position.y,
    }
}

/// One step of linear back-and-forth motion.
///
/// The position is clamped to the bound it crossed and the direction flips
/// there, so the body can never drift past `[min, max]`.
pub fn oscillate(current: f32, direction: f32, speed: f32, min: f32, max: f32) -> (f32, f32) {
    let next = current + speed * direction;
    if next >= max {
        (max, -1.0)
    } else if next <= min {
        (min, 1.0)
    } else {
        (next, direction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::physics::{BodyLabel, Shape};

    fn keeper_spec(origin_x: f32, direction: f32) -> KinematicSpec {
        KinematicSpec::Oscillator {
            label: BodyLabel::Keeper,
            shape: Shape::Rect {
                half_width: 10.0,
                half_height: 5.0,
            },
            origin: Vec2::new(origin_x, 500.0),
            axis: Axis::X,
            min: 100.0,
            max: 200.0,
            speed: 3.0,
            direction,
            restitution: 0.0,
        }
    }

    #[test]
    fn test_oscillate_moves() {
        assert_eq!(oscillate(150.0, 1.0, 3.0, 100.0, 200.0), (153.0, 1.0));
        assert_eq!(oscillate(150.0, -1.0, 3.0, 100.0, 200.0), (147.0, -1.0));
    }

    #[test]
    fn test_oscillate_clamps_at_bounds() {
        assert_eq!(oscillate(199.0, 1.0, 3.0, 100.0, 200.0), (200.0, -1.0));
        assert_eq!(oscillate(101.0, -1.0, 3.0, 100.0, 200.0), (100.0, 1.0));
    }

    #[test]
    fn test_oscillator_never_leaves_bounds() {
        let mut body = KinematicBody::from_spec(1, &keeper_spec(150.0, 1.0));
        for _ in 0..1_000 {
            body.advance();
            assert!(body.position.x >= 100.0 && body.position.x <= 200.0);
            assert_eq!(body.position.y, 500.0);
        }
    }

    #[test]
    fn test_oscillator_reverses() {
        let mut body = KinematicBody::from_spec(1, &keeper_spec(198.0, 1.0));

        let first = body.advance();
        assert_eq!(first.position.x, 200.0);
        assert_eq!(first.velocity.x, 2.0);

        let second = body.advance();
        assert_eq!(second.position.x, 197.0);
        assert_eq!(second.velocity.x, -3.0);
    }

    #[test]
    fn test_oscillator_deterministic() {
        let mut a = KinematicBody::from_spec(1, &keeper_spec(120.0, -1.0));
        let mut b = KinematicBody::from_spec(2, &keeper_spec(120.0, -1.0));
        for _ in 0..257 {
            assert_eq!(a.advance(), b.advance());
        }
    }

    #[test]
    fn test_spinner_constant_angular_velocity() {
        let spec = KinematicSpec::Spinner {
            label: BodyLabel::Boundary,
            shape: Shape::Rect {
                half_width: 100.0,
                half_height: 10.0,
            },
            position: Vec2::new(300.0, 300.0),
            angular_velocity: -0.05,
            restitution: 0.5,
        };
        let mut body = KinematicBody::from_spec(4, &spec);

        for _ in 0..10 {
            let transform = body.advance();
            assert_eq!(transform.angular_velocity, -0.05);
            assert_eq!(transform.position, Vec2::new(300.0, 300.0));
        }
        assert!((body.angle + 0.5).abs() < 1e-5);
    }
}
