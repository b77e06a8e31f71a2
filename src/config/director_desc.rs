use crate::error::{PetalSonicError, Result};
use std::time::Duration;

/// Distance attenuation model applied by the backend to positional voices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DistanceModel {
    /// No distance attenuation
    None,
    Inverse,
    #[default]
    InverseClamped,
    Linear,
    LinearClamped,
    Exponent,
    ExponentClamped,
}

/// Global propagation parameters pushed to the backend.
///
/// Sent at initialization and again whenever the application signals a
/// settings change through [`PlaybackDirector::settings_notifier`](crate::PlaybackDirector::settings_notifier).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnvironmentSettings {
    /// Doppler exaggeration factor (0.0 disables doppler shift)
    pub doppler_factor: f32,
    /// Speed of sound in world units per second
    pub speed_of_sound: f32,
    /// Distance attenuation model
    pub distance_model: DistanceModel,
}

impl Default for EnvironmentSettings {
    fn default() -> Self {
        Self {
            doppler_factor: 1.0,
            speed_of_sound: 343.3,
            distance_model: DistanceModel::InverseClamped,
        }
    }
}

/// Tuning for the background streaming worker and streamed voices.
#[derive(Debug, Clone)]
pub struct StreamingDesc {
    /// Interleaved samples decoded per buffer refill
    pub chunk_samples: usize,
    /// Buffers kept queued on a streamed voice before the worker moves on
    pub max_queued_buffers: usize,
    /// How long the worker waits for a wake signal when nothing needs streaming
    pub idle_wait: Duration,
    /// A full round-robin pass faster than this counts as idle
    pub min_pass_duration: Duration,
    /// Sleep applied after an idle pass
    pub pass_backoff: Duration,
    /// Time the worker gets to exit on shutdown before it is detached
    pub shutdown_grace: Duration,
}

impl Default for StreamingDesc {
    fn default() -> Self {
        Self {
            chunk_samples: 8192,
            max_queued_buffers: 3,
            idle_wait: Duration::from_millis(100),
            min_pass_duration: Duration::from_millis(1),
            pass_backoff: Duration::from_millis(5),
            shutdown_grace: Duration::from_secs(1),
        }
    }
}

/// Configuration descriptor for a [`PlaybackDirector`](crate::PlaybackDirector)
#[derive(Debug, Clone)]
pub struct DirectorDesc {
    /// Upper bound on voices created while probing the backend
    pub max_voices: usize,
    /// Maximum concurrently audible ambient instances
    pub ambient_cap: usize,
    /// Maximum concurrently audible music instances
    pub music_cap: usize,
    /// Listener gain when not muted
    pub master_gain: f32,
    /// Initial propagation parameters
    pub environment: EnvironmentSettings,
    pub streaming: StreamingDesc,
}

impl Default for DirectorDesc {
    fn default() -> Self {
        Self {
            max_voices: 256,
            ambient_cap: 4,
            music_cap: 2,
            master_gain: 1.0,
            environment: EnvironmentSettings::default(),
            streaming: StreamingDesc::default(),
        }
    }
}

impl DirectorDesc {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_voices(mut self, max: usize) -> Self {
        self.max_voices = max;
        self
    }

    pub fn ambient_cap(mut self, cap: usize) -> Self {
        self.ambient_cap = cap;
        self
    }

    pub fn music_cap(mut self, cap: usize) -> Self {
        self.music_cap = cap;
        self
    }

    pub fn master_gain(mut self, gain: f32) -> Self {
        self.master_gain = gain;
        self
    }

    pub fn environment(mut self, environment: EnvironmentSettings) -> Self {
        self.environment = environment;
        self
    }

    pub fn streaming(mut self, streaming: StreamingDesc) -> Self {
        self.streaming = streaming;
        self
    }

    /// Rejects settings the director cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.streaming.chunk_samples == 0 {
            return Err(PetalSonicError::Configuration(
                "Streaming chunk size must be non-zero".into(),
            ));
        }
        if self.streaming.max_queued_buffers == 0 {
            return Err(PetalSonicError::Configuration(
                "At least one streaming buffer must be queued per voice".into(),
            ));
        }
        if !self.master_gain.is_finite() || self.master_gain < 0.0 {
            return Err(PetalSonicError::Configuration(format!(
                "Invalid master gain {}",
                self.master_gain
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_overrides_defaults() {
        let desc = DirectorDesc::new().max_voices(8).ambient_cap(2).music_cap(1);
        assert_eq!(desc.max_voices, 8);
        assert_eq!(desc.ambient_cap, 2);
        assert_eq!(desc.music_cap, 1);
        assert_eq!(desc.master_gain, 1.0);
        assert_eq!(desc.environment, EnvironmentSettings::default());
    }

    #[test]
    fn test_validate_rejects_empty_streaming_buffers() {
        assert!(DirectorDesc::default().validate().is_ok());

        let mut desc = DirectorDesc::default();
        desc.streaming.max_queued_buffers = 0;
        assert!(matches!(
            desc.validate(),
            Err(PetalSonicError::Configuration(_))
        ));

        assert!(DirectorDesc::default().master_gain(-1.0).validate().is_err());
    }
}
