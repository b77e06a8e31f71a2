//! Event types for PetalSonic Director

use crate::backend::VoiceHandle;
use crate::config::EnvironmentSettings;
use crate::playback::InstanceId;
use crate::spatial::EntityId;

/// Notifications emitted by the director, drained with
/// [`PlaybackDirector::poll_events`](crate::PlaybackDirector::poll_events).
#[derive(Debug, Clone, PartialEq)]
pub enum DirectorEvent {
    InstanceStarted {
        instance: InstanceId,
        voice: VoiceHandle,
    },
    InstanceFinished {
        instance: InstanceId,
    },
    /// Lost its voice to a higher-priority instance and was disposed
    InstanceEvicted {
        instance: InstanceId,
        by: InstanceId,
    },
    InstanceSuspended {
        instance: InstanceId,
    },
    InstanceResumed {
        instance: InstanceId,
    },
    /// Wants to play but every voice is leased
    VoiceStarved {
        instance: InstanceId,
    },
    ListenerChanged {
        entity: Option<EntityId>,
    },
    EnvironmentChanged {
        settings: EnvironmentSettings,
    },
    DeviceUnavailable {
        reason: String,
    },
}

impl DirectorEvent {
    pub fn instance_id(&self) -> Option<InstanceId> {
        match self {
            Self::InstanceStarted { instance, .. }
            | Self::InstanceFinished { instance }
            | Self::InstanceEvicted { instance, .. }
            | Self::InstanceSuspended { instance }
            | Self::InstanceResumed { instance }
            | Self::VoiceStarved { instance } => Some(*instance),
            _ => None,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::DeviceUnavailable { .. })
    }

    pub fn is_instance_event(&self) -> bool {
        self.instance_id().is_some()
    }
}
