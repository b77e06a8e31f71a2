//! Fixed-size pool of backend voices.

use crate::backend::{AudioBackend, VoiceHandle};

/// Free list of backend voices, sized once at startup.
///
/// A handle is either in the pool or leased to exactly one instance. The pool never
/// creates voices after [`probe`](Self::probe), so its capacity is what the device
/// reported it could support.
#[derive(Debug, Default)]
pub struct VoicePool {
    free: Vec<VoiceHandle>,
    capacity: usize,
}

impl VoicePool {
    /// Pool with no voices, used when the backend could not be initialized.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Discovers how many voices the backend supports by creating them until it
    /// refuses or `limit` is reached. Every voice created is kept.
    pub fn probe(backend: &dyn AudioBackend, limit: usize) -> Self {
        let mut free = Vec::new();
        while free.len() < limit {
            match backend.create_voice() {
                Ok(voice) => free.push(voice),
                Err(e) => {
                    log::debug!("Voice probing stopped after {} voices: {}", free.len(), e);
                    break;
                }
            }
        }

        if free.len() == limit {
            log::debug!("Voice probing reached the configured limit of {}", limit);
        }

        // Hand out the lowest handles first
        free.reverse();
        let capacity = free.len();
        Self { free, capacity }
    }

    /// Takes a free voice, or `None` if every voice is leased.
    pub fn acquire(&mut self) -> Option<VoiceHandle> {
        self.free.pop()
    }

    /// Returns a leased voice. The caller must no longer use the handle.
    pub fn release(&mut self, voice: VoiceHandle) {
        debug_assert!(
            !self.free.contains(&voice),
            "{} released twice",
            voice
        );
        debug_assert!(self.free.len() < self.capacity, "pool over capacity");
        self.free.push(voice);
    }

    /// Number of voices established at startup.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of voices not currently leased.
    pub fn available(&self) -> usize {
        self.free.len()
    }

    pub fn is_exhausted(&self) -> bool {
        self.free.is_empty()
    }

    /// Removes every free voice so it can be destroyed. Leased voices must have been
    /// released first.
    pub fn drain(&mut self) -> Vec<VoiceHandle> {
        if self.free.len() != self.capacity {
            log::warn!(
                "Draining voice pool with {} of {} voices still leased",
                self.capacity - self.free.len(),
                self.capacity
            );
        }
        self.capacity = 0;
        std::mem::take(&mut self.free)
    }
}
