//! Arena layout
//!
//! Static geometry is configuration data: pegs, floor zones, walls and the
//! kinematic fixtures the engine drives. The presets reproduce the three
//! arenas the game shipped with; custom layouts are loaded from JSON.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::game::constants::{layout, marbles, spawn};
use crate::game::physics::{BodyLabel, Shape};
use crate::util::vec2::Vec2;

/// Static fixture placed once per round
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixtureSpec {
    pub label: BodyLabel,
    pub shape: Shape,
    pub position: Vec2,
    #[serde(default)]
    pub restitution: f32,
}

/// Axis of linear oscillation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Axis {
    X,
    Y,
}

/// Fixture whose motion the engine computes every tick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum KinematicSpec {
    /// Back-and-forth motion along one axis, clamped to `[min, max]`
    Oscillator {
        label: BodyLabel,
        shape: Shape,
        origin: Vec2,
        axis: Axis,
        min: f32,
        max: f32,
        /// Units per tick
        speed: f32,
        /// Initial direction, +1 or -1
        direction: f32,
        #[serde(default)]
        restitution: f32,
    },
    /// Pinned body rotating at constant angular velocity
    Spinner {
        label: BodyLabel,
        shape: Shape,
        position: Vec2,
        /// Radians per tick, sign gives the direction
        angular_velocity: f32,
        #[serde(default)]
        restitution: f32,
    },
}

/// Complete arena geometry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArenaLayout {
    pub width: f32,
    pub height: f32,
    /// Height of the line marbles spawn on
    pub spawn_y: f32,
    /// Horizontal padding kept free at both ends of the spawn line
    pub spawn_margin: f32,
    pub marble_radius: f32,
    #[serde(default)]
    pub fixtures: Vec<FixtureSpec>,
    #[serde(default)]
    pub kinematics: Vec<KinematicSpec>,
}

impl ArenaLayout {
    /// Empty arena with only the spawn line configured
    pub fn empty(width: f32, height: f32) -> Self {
        Self {
            width,
            height,
            spawn_y: spawn::SPAWN_Y,
            spawn_margin: spawn::SIDE_MARGIN,
            marble_radius: marbles::RADIUS,
            fixtures: Vec::new(),
            kinematics: Vec::new(),
        }
    }

    /// Dense staggered peg board with no scoring zones
    pub fn pachinko(width: f32, height: f32, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut arena = Self::empty(width, height);
        arena.spawn_y = -50.0;
        arena.marble_radius = marbles::PACHINKO_RADIUS;

        arena.fixtures.extend(peg_grid(
            &mut rng,
            PegGrid {
                rows: 12,
                cols: 15,
                width,
                start_y: 150.0,
                spacing_y: height * 0.6 / 12.0,
                jitter: 5.0,
                radius: 6.0,
                restitution: 0.8,
            },
            &[],
        ));
        arena.fixtures.extend(side_walls(width, height, BodyLabel::Boundary));
        arena.fixtures.push(FixtureSpec {
            label: BodyLabel::Boundary,
            shape: Shape::Rect {
                half_width: width / 2.0,
                half_height: layout::WALL_THICKNESS / 2.0,
            },
            position: Vec2::new(width / 2.0, height + 200.0),
            restitution: 0.0,
        });
        arena
    }

    /// Sparse pegs around two spinners, split floor and a goalkeeper
    pub fn spinners(width: f32, height: f32, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut arena = Self::empty(width, height);

        let hub_y = height * 0.6;
        let hubs = [Vec2::new(width * 0.3, hub_y), Vec2::new(width * 0.7, hub_y)];

        arena.fixtures.extend(peg_grid(
            &mut rng,
            PegGrid {
                rows: 4,
                cols: 5,
                width,
                start_y: 200.0,
                spacing_y: height * 0.4 / 4.0,
                jitter: 10.0,
                radius: 10.0,
                restitution: 1.5,
            },
            &hubs,
        ));
        arena.fixtures.extend(side_walls(width, height, BodyLabel::Boundary));
        arena.fixtures.extend(split_floor(width, height));

        // Left spins counter-clockwise, right clockwise: both push outward
        for (i, hub) in hubs.iter().enumerate() {
            let angular_velocity = if i == 0 {
                -layout::SPINNER_SPEED
            } else {
                layout::SPINNER_SPEED
            };
            arena.kinematics.push(KinematicSpec::Spinner {
                label: BodyLabel::Boundary,
                shape: Shape::Rect {
                    half_width: layout::SPINNER_LENGTH / 2.0,
                    half_height: layout::SPINNER_THICKNESS / 2.0,
                },
                position: *hub,
                angular_velocity,
                restitution: 0.8,
            });
        }
        arena.kinematics.push(goalkeeper(width, height));
        arena
    }

    /// Pegs above two counter-moving triangle barriers; the walls recycle
    pub fn triangles(width: f32, height: f32, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut arena = Self::empty(width, height);

        arena.fixtures.extend(peg_grid(
            &mut rng,
            PegGrid {
                rows: 4,
                cols: 5,
                width,
                start_y: 200.0,
                spacing_y: height * 0.4 / 4.0,
                jitter: 10.0,
                radius: 10.0,
                restitution: 1.5,
            },
            &[],
        ));
        arena.fixtures.extend(side_walls(width, height, BodyLabel::DeadZone));
        arena.fixtures.extend(split_floor(width, height));

        let min = layout::WALL_THICKNESS + layout::TRIANGLE_HALF_WIDTH;
        let max = width - min;
        let upper_y = height * 0.7;
        let hw = layout::TRIANGLE_HALF_WIDTH;
        let hh = layout::TRIANGLE_HALF_HEIGHT;

        // Point up, moving right first
        arena.kinematics.push(KinematicSpec::Oscillator {
            label: BodyLabel::Boundary,
            shape: Shape::Polygon {
                vertices: vec![Vec2::new(0.0, -hh), Vec2::new(-hw, hh), Vec2::new(hw, hh)],
            },
            origin: Vec2::new(width / 2.0, upper_y),
            axis: Axis::X,
            min,
            max,
            speed: layout::TRIANGLE_SPEED,
            direction: 1.0,
            restitution: 1.2,
        });
        // Point down, moving left first
        arena.kinematics.push(KinematicSpec::Oscillator {
            label: BodyLabel::Boundary,
            shape: Shape::Polygon {
                vertices: vec![Vec2::new(0.0, hh), Vec2::new(-hw, -hh), Vec2::new(hw, -hh)],
            },
            origin: Vec2::new(width / 2.0, upper_y + layout::TRIANGLE_GAP),
            axis: Axis::X,
            min,
            max,
            speed: layout::TRIANGLE_SPEED,
            direction: -1.0,
            restitution: 1.2,
        });
        arena.kinematics.push(goalkeeper(width, height));
        arena
    }

    /// Parse a layout from JSON
    pub fn from_json(json: &str) -> Result<Self, LayoutError> {
        let layout: Self =
            serde_json::from_str(json).map_err(|e| LayoutError::Parse(e.to_string()))?;
        layout.validate()?;
        Ok(layout)
    }

    /// Load and validate a layout file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, LayoutError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| LayoutError::Io(format!("{}: {}", path.display(), e)))?;
        Self::from_json(&json)
    }

    pub fn validate(&self) -> Result<(), LayoutError> {
        if !(self.width.is_finite() && self.width > 0.0 && self.height.is_finite() && self.height > 0.0) {
            return Err(LayoutError::Invalid("world size must be positive".to_string()));
        }
        if !(self.spawn_margin >= 0.0 && self.spawn_margin * 2.0 < self.width) {
            return Err(LayoutError::Invalid(
                "spawn margin leaves no room on the spawn line".to_string(),
            ));
        }
        if !(self.marble_radius > 0.0) {
            return Err(LayoutError::Invalid("marble radius must be positive".to_string()));
        }
        if self.fixtures.iter().any(|f| !f.position.is_finite()) {
            return Err(LayoutError::Invalid("fixture position is not finite".to_string()));
        }
        if self.fixtures.iter().any(|f| f.label == BodyLabel::Marble) {
            return Err(LayoutError::Invalid("fixtures cannot be labelled as marbles".to_string()));
        }
        for spec in &self.kinematics {
            match spec {
                KinematicSpec::Oscillator {
                    label,
                    min,
                    max,
                    speed,
                    direction,
                    ..
                } => {
                    if *label == BodyLabel::Marble {
                        return Err(LayoutError::Invalid(
                            "kinematic fixtures cannot be labelled as marbles".to_string(),
                        ));
                    }
                    if !(min.is_finite() && max.is_finite() && min <= max) {
                        return Err(LayoutError::Invalid(format!(
                            "oscillator bounds [{}, {}] are invalid",
                            min, max
                        )));
                    }
                    if !(speed.is_finite() && *speed >= 0.0) {
                        return Err(LayoutError::Invalid("oscillator speed must be >= 0".to_string()));
                    }
                    if *direction == 0.0 || !direction.is_finite() {
                        return Err(LayoutError::Invalid(
                            "oscillator direction must be +1 or -1".to_string(),
                        ));
                    }
                }
                KinematicSpec::Spinner {
                    label,
                    angular_velocity,
                    ..
                } => {
                    if *label == BodyLabel::Marble {
                        return Err(LayoutError::Invalid(
                            "kinematic fixtures cannot be labelled as marbles".to_string(),
                        ));
                    }
                    if !angular_velocity.is_finite() {
                        return Err(LayoutError::Invalid(
                            "spinner angular velocity is not finite".to_string(),
                        ));
                    }
                }
            }
        }
        Ok(())
    }

    /// Random point on the spawn line
    pub fn spawn_point<R: Rng>(&self, rng: &mut R) -> Vec2 {
        let min = self.spawn_margin;
        let max = self.width - self.spawn_margin;
        Vec2::new(rng.gen_range(min..=max), self.spawn_y)
    }
}

struct PegGrid {
    rows: usize,
    cols: usize,
    width: f32,
    start_y: f32,
    spacing_y: f32,
    jitter: f32,
    radius: f32,
    restitution: f32,
}

/// Staggered peg rows; pegs within the safe radius of any hub are skipped
fn peg_grid(rng: &mut StdRng, grid: PegGrid, hubs: &[Vec2]) -> Vec<FixtureSpec> {
    let spacing_x = grid.width / grid.cols as f32;
    let mut pegs = Vec::with_capacity(grid.rows * grid.cols);

    for row in 0..grid.rows {
        for col in 0..grid.cols {
            let mut x = col as f32 * spacing_x + spacing_x / 2.0;
            if row % 2 == 1 {
                x += spacing_x / 2.0;
            }
            x += rng.gen_range(-grid.jitter..=grid.jitter);
            let position = Vec2::new(x, grid.start_y + row as f32 * grid.spacing_y);

            if hubs
                .iter()
                .any(|hub| position.distance_to(*hub) < layout::SPINNER_SAFE_RADIUS)
            {
                continue;
            }

            pegs.push(FixtureSpec {
                label: BodyLabel::Obstacle,
                shape: Shape::Circle {
                    radius: grid.radius,
                },
                position,
                restitution: grid.restitution,
            });
        }
    }
    pegs
}

fn side_walls(width: f32, height: f32, label: BodyLabel) -> [FixtureSpec; 2] {
    let half = layout::WALL_THICKNESS / 2.0;
    let shape = Shape::Rect {
        half_width: half,
        half_height: height / 2.0,
    };
    [
        FixtureSpec {
            label,
            shape: shape.clone(),
            position: Vec2::new(half, height / 2.0),
            restitution: 0.0,
        },
        FixtureSpec {
            label,
            shape,
            position: Vec2::new(width - half, height / 2.0),
            restitution: 0.0,
        },
    ]
}

/// Floor split into dead | score | dead
fn split_floor(width: f32, height: f32) -> [FixtureSpec; 3] {
    let half_height = layout::WALL_THICKNESS / 2.0;
    let y = height - half_height;
    let score_width = width * layout::SCORE_ZONE_FRACTION;
    let dead_width = (width - score_width) / 2.0;

    let dead = Shape::Rect {
        half_width: dead_width / 2.0,
        half_height,
    };
    [
        FixtureSpec {
            label: BodyLabel::DeadZone,
            shape: dead.clone(),
            position: Vec2::new(dead_width / 2.0, y),
            restitution: 0.0,
        },
        FixtureSpec {
            label: BodyLabel::ScoreZone,
            shape: Shape::Rect {
                half_width: score_width / 2.0,
                half_height,
            },
            position: Vec2::new(width / 2.0, y),
            restitution: 0.0,
        },
        FixtureSpec {
            label: BodyLabel::DeadZone,
            shape: dead,
            position: Vec2::new(width - dead_width / 2.0, y),
            restitution: 0.0,
        },
    ]
}

/// Paddle sweeping across the score zone
fn goalkeeper(width: f32, height: f32) -> KinematicSpec {
    let score_half = width * layout::SCORE_ZONE_FRACTION / 2.0;
    let keeper_width = score_half * 2.0 * layout::KEEPER_WIDTH_FRACTION;
    let center_x = width / 2.0;

    KinematicSpec::Oscillator {
        label: BodyLabel::Keeper,
        shape: Shape::Rect {
            half_width: keeper_width / 2.0,
            half_height: layout::KEEPER_HEIGHT / 2.0,
        },
        origin: Vec2::new(center_x, height - layout::KEEPER_OFFSET_Y),
        axis: Axis::X,
        min: center_x - score_half + keeper_width / 2.0,
        max: center_x + score_half - keeper_width / 2.0,
        speed: layout::KEEPER_SPEED,
        direction: 1.0,
        restitution: 1.2,
    }
}

/// Layout loading errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum LayoutError {
    #[error("Failed to read layout: {0}")]
    Io(String),
    #[error("Failed to parse layout: {0}")]
    Parse(String),
    #[error("Invalid layout: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn count(layout: &ArenaLayout, label: BodyLabel) -> usize {
        layout.fixtures.iter().filter(|f| f.label == label).count()
    }

    #[test]
    fn test_pachinko_has_no_scoring() {
        let arena = ArenaLayout::pachinko(1920.0, 1080.0, 7);

        assert_eq!(count(&arena, BodyLabel::Obstacle), 12 * 15);
        assert_eq!(count(&arena, BodyLabel::ScoreZone), 0);
        assert_eq!(count(&arena, BodyLabel::DeadZone), 0);
        assert!(arena.kinematics.is_empty());
        assert!(arena.validate().is_ok());
    }

    #[test]
    fn test_spinners_skip_pegs_near_hubs() {
        let arena = ArenaLayout::spinners(1920.0, 1080.0, 7);
        let hubs = [Vec2::new(1920.0 * 0.3, 648.0), Vec2::new(1920.0 * 0.7, 648.0)];

        for peg in arena.fixtures.iter().filter(|f| f.label == BodyLabel::Obstacle) {
            for hub in &hubs {
                assert!(peg.position.distance_to(*hub) >= layout::SPINNER_SAFE_RADIUS);
            }
        }
        assert_eq!(count(&arena, BodyLabel::ScoreZone), 1);
        assert_eq!(count(&arena, BodyLabel::DeadZone), 2);
        assert_eq!(arena.kinematics.len(), 3);
        assert!(arena.validate().is_ok());
    }

    #[test]
    fn test_triangles_walls_are_dead_zones() {
        let arena = ArenaLayout::triangles(1920.0, 1080.0, 7);

        // Two floor segments plus both walls
        assert_eq!(count(&arena, BodyLabel::DeadZone), 4);
        assert_eq!(count(&arena, BodyLabel::ScoreZone), 1);
        assert_eq!(arena.kinematics.len(), 3);
        assert!(arena.validate().is_ok());
    }

    #[test]
    fn test_goalkeeper_bounds_inside_score_zone() {
        let width = 1000.0;
        let KinematicSpec::Oscillator { min, max, .. } = goalkeeper(width, 800.0) else {
            panic!("goalkeeper must oscillate");
        };
        let zone_min = width / 2.0 - width * layout::SCORE_ZONE_FRACTION / 2.0;
        let zone_max = width / 2.0 + width * layout::SCORE_ZONE_FRACTION / 2.0;

        assert!(min > zone_min);
        assert!(max < zone_max);
        assert!(min < max);
    }

    #[test]
    fn test_preset_is_deterministic_for_seed() {
        assert_eq!(
            ArenaLayout::spinners(1280.0, 720.0, 42),
            ArenaLayout::spinners(1280.0, 720.0, 42)
        );
    }

    #[test]
    fn test_spawn_point_within_margins() {
        let arena = ArenaLayout::empty(400.0, 300.0);
        let mut rng = StdRng::seed_from_u64(1);

        for _ in 0..200 {
            let p = arena.spawn_point(&mut rng);
            assert!(p.x >= arena.spawn_margin && p.x <= 400.0 - arena.spawn_margin);
            assert_eq!(p.y, arena.spawn_y);
        }
    }

    #[test]
    fn test_json_roundtrip_of_custom_layout() {
        let arena = ArenaLayout::triangles(800.0, 600.0, 3);
        let json = serde_json::to_string(&arena).unwrap();
        let parsed = ArenaLayout::from_json(&json).unwrap();

        assert_eq!(parsed.width, arena.width);
        assert_eq!(parsed.fixtures.len(), arena.fixtures.len());
        assert_eq!(parsed.kinematics.len(), arena.kinematics.len());
        let labels: Vec<BodyLabel> = parsed.fixtures.iter().map(|f| f.label).collect();
        let expected: Vec<BodyLabel> = arena.fixtures.iter().map(|f| f.label).collect();
        assert_eq!(labels, expected);
    }

    #[test]
    fn test_invalid_layouts_rejected() {
        let mut arena = ArenaLayout::empty(100.0, 100.0);
        arena.spawn_margin = 60.0;
        assert!(matches!(arena.validate(), Err(LayoutError::Invalid(_))));

        let mut arena = ArenaLayout::empty(100.0, 100.0);
        arena.kinematics.push(KinematicSpec::Oscillator {
            label: BodyLabel::Keeper,
            shape: Shape::Circle { radius: 1.0 },
            origin: Vec2::ZERO,
            axis: Axis::X,
            min: 50.0,
            max: 10.0,
            speed: 1.0,
            direction: 1.0,
            restitution: 0.0,
        });
        assert!(matches!(arena.validate(), Err(LayoutError::Invalid(_))));

        assert!(matches!(ArenaLayout::from_json("{ not json"), Err(LayoutError::Parse(_))));
    }
}
