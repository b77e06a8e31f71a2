//! Error types for PetalSonic Director

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PetalSonicError {
    #[error("Audio backend error: {0}")]
    Backend(String),

    #[error("Voice allocation error: {0}")]
    VoiceAllocation(String),

    #[error("Audio decode error: {0}")]
    Decode(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Worker error: {0}")]
    Worker(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

pub type Result<T> = std::result::Result<T, PetalSonicError>;
