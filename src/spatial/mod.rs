// Spatial module
//
// Read-only view of the application's scene: entity transforms for the listener
// and attached emitters, plus the listener tracking state.

mod listener;

pub use listener::ListenerState;

use crate::math::{Pose, Vec3};

/// Identifier of an entity owned by the application's scene.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct EntityId(u64);

impl EntityId {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "EntityId({})", self.0)
    }
}

/// World transform and velocity of an entity for the current tick.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct EntityTransform {
    pub pose: Pose,
    pub velocity: Vec3,
}

impl EntityTransform {
    pub fn new(pose: Pose, velocity: Vec3) -> Self {
        Self { pose, velocity }
    }

    pub fn at(position: Vec3) -> Self {
        Self {
            pose: Pose::from_position(position),
            velocity: Vec3::ZERO,
        }
    }
}

/// Source of entity transforms. The director only ever reads from it.
pub trait SpatialEntityProvider: Send + Sync {
    /// Current transform, or `None` once the entity is destroyed or inactive.
    fn transform(&self, entity: EntityId) -> Option<EntityTransform>;

    /// Picks an entity suitable as the audio listener, if the scene has one.
    fn find_listener(&self) -> Option<EntityId>;
}
