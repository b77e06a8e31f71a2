//! Asset and decoder seams.

use crate::error::Result;
use std::sync::Arc;

/// Reference to a sound asset as the application names it.
///
/// Cheap to clone. Whether the reference is currently loaded, runtime-only, or
/// streamed is decided by the [`AssetProvider`].
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct AssetRef(Arc<str>);

impl AssetRef {
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl From<&str> for AssetRef {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl std::fmt::Display for AssetRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Decoded PCM source for a streamed voice.
///
/// Called from the streaming worker only, so implementations may block on I/O.
/// Decoding failures are reported as [`PetalSonicError::Decode`](crate::PetalSonicError::Decode)
/// and end the stream.
pub trait AudioStream: Send {
    /// Fills `out` with interleaved samples and returns how many were written.
    /// Returning `0` signals the end of the data.
    fn read(&mut self, out: &mut [f32]) -> Result<usize>;

    /// Seeks back to the first sample.
    fn rewind(&mut self) -> Result<()>;
}

/// Resolves asset references for the director.
///
/// # Example
///
/// ```ignore
/// use petalsonic_director::assets::{AssetProvider, AssetRef, AudioStream};
/// use petalsonic_director::error::Result;
///
/// struct Bank;
///
/// impl AssetProvider for Bank {
///     fn is_available(&self, asset: &AssetRef) -> bool { true }
///     fn is_runtime_only(&self, asset: &AssetRef) -> bool { false }
///     fn stable_path(&self, asset: &AssetRef) -> Option<String> {
///         Some(format!("sounds/{}.ogg", asset))
///     }
///     fn open_stream(&self, asset: &AssetRef) -> Result<Option<Box<dyn AudioStream>>> {
///         Ok(None)
///     }
///     fn release_audio_content(&self) {}
/// }
/// ```
pub trait AssetProvider: Send + Sync {
    /// Whether the asset is loaded and can be played.
    fn is_available(&self, asset: &AssetRef) -> bool;

    /// Whether the asset was generated at runtime and has no persistent identity.
    fn is_runtime_only(&self, asset: &AssetRef) -> bool;

    /// Stable identity used as the per-asset playback counting key.
    fn stable_path(&self, asset: &AssetRef) -> Option<String>;

    /// Opens a decoder for assets too large to be resident. `None` means the asset
    /// is played from resident data.
    ///
    /// Called from [`PlaybackDirector::play`](crate::PlaybackDirector::play) on the
    /// frame thread, so it must not block: hand back a decoder that defers file and
    /// network I/O to its first [`AudioStream::read`], which runs on the streaming
    /// worker.
    fn open_stream(&self, asset: &AssetRef) -> Result<Option<Box<dyn AudioStream>>>;

    /// Drops every cached audio resource. Called once during director shutdown.
    fn release_audio_content(&self);
}
