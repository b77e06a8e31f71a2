use crate::budget::SoundCategory;
use crate::playback::LoopMode;

/// Per-request playback parameters.
///
/// Priority is taken as given: higher values play preferentially and are the
/// last to be evicted. No scaling by volume or category is applied.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayParams {
    pub category: SoundCategory,
    pub priority: i32,
    /// Volume multiplier (0.0 = silent, 1.0 = full volume)
    pub volume: f32,
    pub loop_mode: LoopMode,
}

impl Default for PlayParams {
    fn default() -> Self {
        Self {
            category: SoundCategory::Effect,
            priority: 0,
            volume: 1.0,
            loop_mode: LoopMode::Once,
        }
    }
}

impl PlayParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn category(mut self, category: SoundCategory) -> Self {
        self.category = category;
        self
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn volume(mut self, volume: f32) -> Self {
        self.volume = volume;
        self
    }

    pub fn looping(mut self) -> Self {
        self.loop_mode = LoopMode::Infinite;
        self
    }

    pub fn loop_mode(mut self, loop_mode: LoopMode) -> Self {
        self.loop_mode = loop_mode;
        self
    }
}
