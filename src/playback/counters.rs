use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
struct CounterState {
    per_asset: HashMap<String, usize>,
    playing_2d: usize,
    playing_3d: usize,
}

/// Live playback bookkeeping shared between the director and its instances.
///
/// Instances register on creation and unregister exactly once on disposal, so the
/// counts always match the set of live, non-disposed instances.
#[derive(Debug, Default)]
pub(crate) struct PlayCounters {
    state: Mutex<CounterState>,
}

impl PlayCounters {
    pub fn new() -> Self {
        Self::default()
    }

    /// `key` is the asset's stable identity, `None` for assets without one.
    pub fn register(&self, key: Option<&str>, is_3d: bool) {
        let mut state = self.lock();
        if is_3d {
            state.playing_3d += 1;
        } else {
            state.playing_2d += 1;
        }
        if let Some(key) = key {
            *state.per_asset.entry(key.to_owned()).or_insert(0) += 1;
        }
    }

    pub fn unregister(&self, key: Option<&str>, is_3d: bool) {
        let mut state = self.lock();
        let counter = if is_3d {
            &mut state.playing_3d
        } else {
            &mut state.playing_2d
        };
        *counter = counter.saturating_sub(1);

        if let Some(key) = key {
            match state.per_asset.get_mut(key) {
                Some(count) if *count > 1 => *count -= 1,
                Some(_) => {
                    state.per_asset.remove(key);
                }
                None => log::warn!("Unregistering {} which has no live playback", key),
            }
        }
    }

    pub fn count(&self, key: &str) -> usize {
        self.lock().per_asset.get(key).copied().unwrap_or(0)
    }

    pub fn playing_2d(&self) -> usize {
        self.lock().playing_2d
    }

    pub fn playing_3d(&self) -> usize {
        self.lock().playing_3d
    }

    fn lock(&self) -> MutexGuard<'_, CounterState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
