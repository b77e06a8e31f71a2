//! Playback control and state management.
//!
//! This module provides the types describing one in-flight playback request:
//! - [`SoundInstance`]: the instance itself, driven by the director every tick
//! - [`Emitter`]: where the sound comes from (non-spatial, fixed point, attached entity)
//! - [`LoopMode`] and [`PlayState`]
//! - [`InstanceId`]: identity of an instance
//!
//! Instances are created through [`PlaybackDirector`](crate::PlaybackDirector) methods
//! like `play_sound()` and `play_sound_3d()`, never directly.

mod counters;
mod instance;

pub(crate) use counters::PlayCounters;
pub(crate) use instance::{InstanceContext, InstanceSetup};
pub use instance::SoundInstance;

use crate::math::Vec3;
use crate::spatial::EntityId;
use uuid::Uuid;

/// Default distance under which positional voices are not attenuated.
pub const DEFAULT_MIN_DISTANCE: f32 = 1.0;

/// Default distance beyond which positional voices are no longer attenuated further.
pub const DEFAULT_MAX_DISTANCE: f32 = 500.0;

/// Unique identity of one playback request.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct InstanceId(Uuid);

impl InstanceId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for InstanceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "InstanceId({})", self.0)
    }
}

/// Loop mode for audio playback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoopMode {
    /// Play once and finish
    #[default]
    Once,
    /// Loop until stopped
    Infinite,
}

/// Represents the current playback state of an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayState {
    /// Playing, or waiting for a voice to play on
    Playing,
    /// Paused by the caller (voice released, position retained)
    Paused,
    /// Finished or stopped; the instance is disposed
    Stopped,
}

/// Where an instance's sound is emitted from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Emitter {
    /// Non-positional playback, relative to the listener
    NonSpatial,
    /// Positional playback at a fixed world position
    Fixed(Vec3),
    /// Positional playback following an entity, offset in the entity's local space
    Attached { entity: EntityId, offset: Vec3 },
}

impl Emitter {
    pub fn is_spatial(&self) -> bool {
        !matches!(self, Self::NonSpatial)
    }

    /// Position before the first tick refreshes it.
    pub(crate) fn initial_position(&self) -> Vec3 {
        match self {
            Self::Fixed(position) => *position,
            Self::NonSpatial | Self::Attached { .. } => Vec3::ZERO,
        }
    }
}
