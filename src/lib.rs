//! # PetalSonic Director
//!
//! Voice management and playback scheduling for games running on top of a
//! hardware-voice audio API (OpenAL-style: a fixed set of voices, a listener and
//! per-voice buffer queues).
//!
//! The application owns a [`PlaybackDirector`] and calls [`PlaybackDirector::update`]
//! once per frame. Every play request becomes a [`SoundInstance`], which may or may
//! not currently hold one of the scarce voices. The director hands voices out by
//! priority, enforces per-category budgets, keeps the listener in sync with the scene
//! and feeds streamed audio from a background worker.
//!
//! ## Quick Start
//!
//! ```no_run
//! use petalsonic_director::*;
//! use std::sync::Arc;
//!
//! # fn run(
//! #     backend: Arc<dyn AudioBackend>,
//! #     assets: Arc<dyn AssetProvider>,
//! #     entities: Arc<dyn SpatialEntityProvider>,
//! #     player: EntityId,
//! # ) {
//! let mut director = PlaybackDirector::new(DirectorDesc::default(), backend, assets, entities);
//! director.initialize();
//! director.set_listener(Some(player));
//!
//! // Fire and forget
//! director.play_sound(&AssetRef::new("ui/confirm"));
//!
//! // Positional, budgeted and looping
//! let wind = director.play(
//!     &AssetRef::new("ambience/wind"),
//!     Emitter::Fixed(Vec3::new(0.0, 10.0, 0.0)),
//!     PlayParams::new()
//!         .category(SoundCategory::Ambient)
//!         .priority(3)
//!         .looping(),
//! );
//!
//! // Once per frame
//! director.update();
//! for event in director.poll_events() {
//!     if let DirectorEvent::InstanceFinished { instance } = event {
//!         println!("{} finished", instance);
//!     }
//! }
//!
//! wind.stop();
//! director.shutdown();
//! # }
//! ```
//!
//! ## Key Components
//!
//! - **[`PlaybackDirector`]**: owns voices, instances, budgets and the streaming worker
//! - **[`SoundInstance`]**: one playback request, shared with the caller
//! - **[`VoicePool`]**: the fixed set of voices probed from the backend
//! - **[`BudgetQueue`]**: per-category cap on audible instances
//! - **[`StreamingWorker`]**: background thread topping up streamed voices
//! - **[`AudioBackend`]**, **[`AssetProvider`]**, **[`SpatialEntityProvider`]**: the
//!   seams to the audio API, the asset system and the scene
//!
//! ## Threading
//!
//! The director and every instance operation run on the thread that owns the director.
//! The streaming worker only touches instances through their own lock and never holds
//! it together with the streaming queue lock.

pub mod assets;
pub mod backend;
pub mod budget;
pub mod config;
pub mod director;
pub mod error;
pub mod events;
pub mod math;
pub mod playback;
pub mod spatial;
pub mod streaming;
pub mod voice_pool;

#[cfg(test)]
mod test_support;

pub use assets::{AssetProvider, AssetRef, AudioStream};
pub use backend::{
    AudioBackend, BackendInfo, ListenerParams, NullBackend, VoiceHandle, VoiceParams,
    VoiceSource,
};
pub use budget::{BudgetQueue, SoundCategory};
pub use config::{DirectorDesc, DistanceModel, EnvironmentSettings, PlayParams, StreamingDesc};
pub use director::{DeviceState, DirectorStats, PlaybackDirector};
pub use error::PetalSonicError;
pub use events::DirectorEvent;
pub use math::{Pose, Quat, Vec3};
pub use playback::{
    DEFAULT_MAX_DISTANCE, DEFAULT_MIN_DISTANCE, Emitter, InstanceId, LoopMode, PlayState,
    SoundInstance,
};
pub use spatial::{EntityId, EntityTransform, SpatialEntityProvider};
pub use streaming::{StreamingQueue, StreamingWorker};
pub use voice_pool::VoicePool;
