//! Backend audio API seam.
//!
//! The director drives a low-level playback API through [`AudioBackend`]: device and
//! context lifecycle, a finite set of voices, per-voice control, and the global
//! listener/environment parameters. Mixing, attenuation and panning all happen behind
//! this trait.

use crate::assets::AssetRef;
use crate::config::EnvironmentSettings;
use crate::error::{PetalSonicError, Result};
use crate::math::Vec3;

/// Opaque identifier of one backend playback voice.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct VoiceHandle(u32);

impl VoiceHandle {
    pub fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for VoiceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "VoiceHandle({})", self.0)
    }
}

/// Information reported by the backend once a device and context are open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendInfo {
    pub device_name: String,
}

/// Listener parameters, already converted to the backend's axis convention.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ListenerParams {
    pub position: Vec3,
    pub velocity: Vec3,
    pub forward: Vec3,
    pub up: Vec3,
    pub gain: f32,
}

/// Per-voice parameters refreshed every tick while an instance holds the voice.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VoiceParams {
    pub gain: f32,
    /// Emitter position in backend axes; ignored when `relative` is set
    pub position: Vec3,
    /// Voice follows the listener (non-positional playback)
    pub relative: bool,
    pub min_distance: f32,
    pub max_distance: f32,
    /// Backend loops a resident buffer on its own
    pub looping: bool,
}

/// What a voice should play when started.
#[derive(Debug, Clone, Copy)]
pub enum VoiceSource<'a> {
    /// Fully resident asset data, starting `offset` frames in
    Resident { asset: &'a AssetRef, offset: usize },
    /// Buffers arrive incrementally through [`AudioBackend::queue_buffer`]
    Streamed,
}

/// Low-level playback API driven by the director.
///
/// All methods take `&self`; implementations guard their own state. Voices are only
/// created, started, stopped and destroyed from the frame thread, while
/// [`queue_buffer`](Self::queue_buffer) and [`queued_buffers`](Self::queued_buffers)
/// are also called from the streaming worker.
pub trait AudioBackend: Send + Sync {
    /// Opens the output device and creates the playback context.
    fn open(&self) -> Result<BackendInfo>;

    /// Creates one more voice. Fails once the device cannot provide more.
    fn create_voice(&self) -> Result<VoiceHandle>;

    fn destroy_voice(&self, voice: VoiceHandle);

    fn set_voice_params(&self, voice: VoiceHandle, params: &VoiceParams);

    fn start_voice(&self, voice: VoiceHandle, source: VoiceSource<'_>);

    /// Stops the voice and discards any queued buffers.
    fn stop_voice(&self, voice: VoiceHandle);

    fn is_voice_playing(&self, voice: VoiceHandle) -> bool;

    /// Frames played since the voice was last started.
    fn voice_offset(&self, voice: VoiceHandle) -> usize;

    /// Appends interleaved samples to a streamed voice.
    fn queue_buffer(&self, voice: VoiceHandle, samples: &[f32]) -> Result<()>;

    /// Buffers queued on the voice that have not finished playing.
    fn queued_buffers(&self, voice: VoiceHandle) -> usize;

    fn set_listener(&self, params: &ListenerParams);

    fn set_environment(&self, settings: &EnvironmentSettings);

    /// Destroys the playback context and closes the device.
    fn close(&self) -> Result<()>;

    /// Releases the backend library itself.
    fn unload(&self) -> Result<()>;
}

/// Backend for machines without audio output.
///
/// It never opens, so a director built on it stays unavailable and every play
/// request yields a silent instance.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullBackend;

impl AudioBackend for NullBackend {
    fn open(&self) -> Result<BackendInfo> {
        Err(PetalSonicError::Backend("No audio backend available".into()))
    }

    fn create_voice(&self) -> Result<VoiceHandle> {
        Err(PetalSonicError::VoiceAllocation(
            "Null backend has no voices".into(),
        ))
    }

    fn destroy_voice(&self, _voice: VoiceHandle) {}

    fn set_voice_params(&self, _voice: VoiceHandle, _params: &VoiceParams) {}

    fn start_voice(&self, _voice: VoiceHandle, _source: VoiceSource<'_>) {}

    fn stop_voice(&self, _voice: VoiceHandle) {}

    fn is_voice_playing(&self, _voice: VoiceHandle) -> bool {
        false
    }

    fn voice_offset(&self, _voice: VoiceHandle) -> usize {
        0
    }

    fn queue_buffer(&self, _voice: VoiceHandle, _samples: &[f32]) -> Result<()> {
        Err(PetalSonicError::Backend("No audio backend available".into()))
    }

    fn queued_buffers(&self, _voice: VoiceHandle) -> usize {
        0
    }

    fn set_listener(&self, _params: &ListenerParams) {}

    fn set_environment(&self, _settings: &EnvironmentSettings) {}

    fn close(&self) -> Result<()> {
        Ok(())
    }

    fn unload(&self) -> Result<()> {
        Ok(())
    }
}
