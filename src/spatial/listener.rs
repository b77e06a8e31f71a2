use super::{EntityId, EntityTransform, SpatialEntityProvider};
use crate::backend::ListenerParams;
use crate::math::to_backend_axes;

/// Tracks which entity acts as the audio listener.
#[derive(Debug, Clone, Default)]
pub struct ListenerState {
    entity: Option<EntityId>,
    transform: EntityTransform,
}

impl ListenerState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entity(&self) -> Option<EntityId> {
        self.entity
    }

    pub fn designate(&mut self, entity: Option<EntityId>) {
        self.entity = entity;
    }

    /// Re-reads the listener transform for this tick.
    ///
    /// An invalid designated entity is dropped and the provider is asked for a
    /// replacement; without one the default transform (origin, facing -Z) is used.
    pub fn refresh(&mut self, entities: &dyn SpatialEntityProvider) -> EntityTransform {
        if let Some(entity) = self.entity {
            if let Some(transform) = entities.transform(entity) {
                self.transform = transform;
                return transform;
            }
            log::debug!("Listener {} is no longer valid, searching for another", entity);
            self.entity = None;
        }

        let found = entities
            .find_listener()
            .and_then(|candidate| entities.transform(candidate).map(|t| (candidate, t)));
        match found {
            Some((candidate, transform)) => {
                log::info!("Using {} as audio listener", candidate);
                self.entity = Some(candidate);
                self.transform = transform;
            }
            None => self.transform = EntityTransform::default(),
        }
        self.transform
    }

    /// Backend listener parameters for the last refreshed transform.
    pub fn params(&self, gain: f32) -> ListenerParams {
        let pose = self.transform.pose;
        ListenerParams {
            position: to_backend_axes(pose.position),
            velocity: to_backend_axes(self.transform.velocity),
            forward: to_backend_axes(pose.forward()),
            up: to_backend_axes(pose.up()),
            gain,
        }
    }
}
