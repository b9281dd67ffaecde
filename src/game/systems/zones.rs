//! Collision classification
//!
//! Turns a raw collision-start event into a game outcome. Classification is a
//! pure function of the two participants and is symmetric: `(a, b)` and
//! `(b, a)` always produce the same outcome.

use crate::game::physics::{BodyHandle, BodyLabel, BodyRef, CollisionEvent};
use crate::game::state::PlayerId;

/// Game meaning of a single collision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Marble touched a peg or bumper
    Bounce { obstacle: BodyHandle },
    /// Marble reached a score zone
    Score { player: PlayerId, marble: BodyHandle },
    /// Marble reached a goal sensor; scores and always removes the marble
    ScoreAndConsume { player: PlayerId, marble: BodyHandle },
    /// Marble fell into a dead zone and goes back to the spawn line
    Recycle { marble: BodyHandle },
    /// Marble hit a zone but carries no owner
    Unattributed { marble: BodyHandle },
    /// Nothing the game cares about
    Ignore,
}

/// Classify one collision-start event
pub fn classify(event: &CollisionEvent) -> Outcome {
    let (marble, other) = match (event.body_a.label, event.body_b.label) {
        (BodyLabel::Marble, BodyLabel::Marble) => return Outcome::Ignore,
        (BodyLabel::Marble, _) => (&event.body_a, &event.body_b),
        (_, BodyLabel::Marble) => (&event.body_b, &event.body_a),
        _ => return Outcome::Ignore,
    };

    classify_marble_contact(marble, other)
}

fn classify_marble_contact(marble: &BodyRef, other: &BodyRef) -> Outcome {
    match other.label {
        BodyLabel::Obstacle => Outcome::Bounce {
            obstacle: other.handle,
        },
        BodyLabel::ScoreZone => match marble.tag {
            Some(player) => Outcome::Score {
                player,
                marble: marble.handle,
            },
            None => Outcome::Unattributed {
                marble: marble.handle,
            },
        },
        BodyLabel::GoalSensor => match marble.tag {
            Some(player) => Outcome::ScoreAndConsume {
                player,
                marble: marble.handle,
            },
            None => Outcome::Unattributed {
                marble: marble.handle,
            },
        },
        BodyLabel::DeadZone => Outcome::Recycle {
            marble: marble.handle,
        },
        BodyLabel::Keeper | BodyLabel::Boundary | BodyLabel::Marble => Outcome::Ignore,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn body(handle: BodyHandle, label: BodyLabel) -> BodyRef {
        BodyRef {
            handle,
            label,
            tag: None,
        }
    }

    fn marble(handle: BodyHandle, owner: Option<PlayerId>) -> BodyRef {
        BodyRef {
            handle,
            label: BodyLabel::Marble,
            tag: owner,
        }
    }

    #[test]
    fn test_score_zone() {
        let owner = Uuid::new_v4();
        let event = CollisionEvent::new(marble(7, Some(owner)), body(1, BodyLabel::ScoreZone));

        assert_eq!(
            classify(&event),
            Outcome::Score {
                player: owner,
                marble: 7
            }
        );
    }

    #[test]
    fn test_goal_sensor_consumes() {
        let owner = Uuid::new_v4();
        let event = CollisionEvent::new(body(3, BodyLabel::GoalSensor), marble(9, Some(owner)));

        assert_eq!(
            classify(&event),
            Outcome::ScoreAndConsume {
                player: owner,
                marble: 9
            }
        );
    }

    #[test]
    fn test_dead_zone_recycles_even_without_owner() {
        let event = CollisionEvent::new(marble(4, None), body(2, BodyLabel::DeadZone));
        assert_eq!(classify(&event), Outcome::Recycle { marble: 4 });
    }

    #[test]
    fn test_obstacle_bounce() {
        let event = CollisionEvent::new(body(12, BodyLabel::Obstacle), marble(4, None));
        assert_eq!(classify(&event), Outcome::Bounce { obstacle: 12 });
    }

    #[test]
    fn test_unattributed_marble() {
        let event = CollisionEvent::new(marble(5, None), body(1, BodyLabel::ScoreZone));
        assert_eq!(classify(&event), Outcome::Unattributed { marble: 5 });

        let event = CollisionEvent::new(marble(5, None), body(1, BodyLabel::GoalSensor));
        assert_eq!(classify(&event), Outcome::Unattributed { marble: 5 });
    }

    #[test]
    fn test_ignored_pairs() {
        let owner = Some(Uuid::new_v4());
        let cases = [
            CollisionEvent::new(marble(1, owner), marble(2, owner)),
            CollisionEvent::new(marble(1, owner), body(2, BodyLabel::Keeper)),
            CollisionEvent::new(marble(1, owner), body(2, BodyLabel::Boundary)),
            CollisionEvent::new(body(1, BodyLabel::Obstacle), body(2, BodyLabel::ScoreZone)),
            CollisionEvent::new(body(1, BodyLabel::Keeper), body(2, BodyLabel::Boundary)),
        ];

        for event in cases {
            assert_eq!(classify(&event), Outcome::Ignore, "{:?}", event);
        }
    }

    #[test]
    fn test_symmetric() {
        let owner = Some(Uuid::new_v4());
        let labels = [
            BodyLabel::Marble,
            BodyLabel::Obstacle,
            BodyLabel::ScoreZone,
            BodyLabel::DeadZone,
            BodyLabel::GoalSensor,
            BodyLabel::Keeper,
            BodyLabel::Boundary,
        ];

        for a in labels {
            for b in labels {
                let body_a = BodyRef {
                    handle: 1,
                    label: a,
                    tag: owner,
                };
                let body_b = BodyRef {
                    handle: 2,
                    label: b,
                    tag: None,
                };
                let event = CollisionEvent::new(body_a, body_b);
                assert_eq!(classify(&event), classify(&event.swapped()), "{:?} vs {:?}", a, b);
            }
        }
    }
}
