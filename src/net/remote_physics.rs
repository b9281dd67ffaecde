//! Physics boundary backed by the physics-host display
//!
//! The browser display that joined with `physics_host: true` runs the rigid
//! body simulation. `RemoteArena` is the server-side half: it hands out body
//! handles, remembers what every live body is, queues commands for the host
//! and turns the host's bare handle-pair reports back into labelled
//! collision events.

use hashbrown::{HashMap, HashSet};
use tracing::debug;

use crate::game::physics::{
    AssetCatalog, BodyHandle, BodyKind, BodyRef, CollisionEvent, KinematicTransform, PhysicsWorld,
};
use crate::game::state::PlayerId;
use crate::net::protocol::{BodyRecord, CollisionReport, PhysicsCommand};
use crate::util::vec2::Vec2;

#[derive(Debug, Clone)]
struct LiveBody {
    kind: BodyKind,
    tag: Option<PlayerId>,
    position: Vec2,
}

#[derive(Debug, Default)]
pub struct RemoteArena {
    next_handle: BodyHandle,
    bodies: HashMap<BodyHandle, LiveBody>,
    outbox: Vec<PhysicsCommand>,
    reports: Vec<CollisionReport>,
    loaded_portraits: HashSet<PlayerId>,
    host_attached: bool,
    dropped_reports: u64,
}

impl RemoteArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn host_attached(&self) -> bool {
        self.host_attached
    }

    /// A host took over. It starts from `snapshot()`, so nothing older is queued.
    pub fn attach_host(&mut self) {
        self.host_attached = true;
        self.outbox.clear();
        self.reports.clear();
        self.loaded_portraits.clear();
    }

    /// The host went away; textures must be reloaded by the next one
    pub fn detach_host(&mut self) {
        self.host_attached = false;
        self.outbox.clear();
        self.reports.clear();
        self.loaded_portraits.clear();
    }

    /// Queue host collision reports for the next `step`
    pub fn report_collisions(&mut self, reports: impl IntoIterator<Item = CollisionReport>) {
        self.reports.extend(reports);
    }

    pub fn mark_portrait_loaded(&mut self, player_id: PlayerId) {
        self.loaded_portraits.insert(player_id);
    }

    pub fn forget_player(&mut self, player_id: PlayerId) {
        self.loaded_portraits.remove(&player_id);
    }

    /// Commands produced since the last call
    pub fn take_commands(&mut self) -> Vec<PhysicsCommand> {
        std::mem::take(&mut self.outbox)
    }

    /// Every live body, oldest first
    pub fn snapshot(&self) -> Vec<BodyRecord> {
        let mut records: Vec<BodyRecord> = self
            .bodies
            .iter()
            .map(|(handle, body)| BodyRecord {
                handle: *handle,
                kind: body.kind.clone(),
                tag: body.tag,
                position: body.position,
            })
            .collect();
        records.sort_unstable_by_key(|r| r.handle);
        records
    }

    pub fn body_count(&self) -> usize {
        self.bodies.len()
    }

    /// Reports dropped because they named bodies that no longer exist
    pub fn dropped_reports(&self) -> u64 {
        self.dropped_reports
    }

    fn body_ref(&self, handle: BodyHandle) -> Option<BodyRef> {
        self.bodies.get(&handle).map(|body| BodyRef {
            handle,
            label: body.kind.label(),
            tag: body.tag,
        })
    }

    fn queue(&mut self, command: PhysicsCommand) {
        if self.host_attached {
            self.outbox.push(command);
        }
    }
}

impl PhysicsWorld for RemoteArena {
    fn step(&mut self, _delta_ms: u64) -> Vec<CollisionEvent> {
        let reports = std::mem::take(&mut self.reports);
        let mut events = Vec::with_capacity(reports.len());

        for report in reports {
            if report.body_a == report.body_b {
                self.dropped_reports += 1;
                continue;
            }
            match (self.body_ref(report.body_a), self.body_ref(report.body_b)) {
                (Some(a), Some(b)) => events.push(CollisionEvent::new(a, b)),
                _ => {
                    // Usually a marble destroyed while the report was in flight
                    self.dropped_reports += 1;
                    debug!(
                        "Dropped collision report for unknown bodies {} / {}",
                        report.body_a, report.body_b
                    );
                }
            }
        }

        events
    }

    fn spawn_body(&mut self, kind: BodyKind, position: Vec2, tag: Option<PlayerId>) -> BodyHandle {
        self.next_handle += 1;
        let handle = self.next_handle;

        self.bodies.insert(
            handle,
            LiveBody {
                kind: kind.clone(),
                tag,
                position,
            },
        );
        self.queue(PhysicsCommand::Spawn {
            handle,
            kind,
            position,
            tag,
        });
        handle
    }

    fn reposition_body(&mut self, handle: BodyHandle, position: Vec2) {
        if let Some(body) = self.bodies.get_mut(&handle) {
            body.position = position;
            self.queue(PhysicsCommand::Reposition { handle, position });
        }
    }

    fn destroy_body(&mut self, handle: BodyHandle) {
        if self.bodies.remove(&handle).is_some() {
            self.queue(PhysicsCommand::Destroy { handle });
        }
    }

    fn set_kinematic_transform(&mut self, handle: BodyHandle, transform: KinematicTransform) {
        if let Some(body) = self.bodies.get_mut(&handle) {
            body.position = transform.position;
            self.queue(PhysicsCommand::SetKinematic { handle, transform });
        }
    }
}

impl AssetCatalog for RemoteArena {
    fn portrait_ready(&self, player_id: PlayerId) -> bool {
        self.host_attached && self.loaded_portraits.contains(&player_id)
    }
}
