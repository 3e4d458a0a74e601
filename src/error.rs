//! Error types shared across the player.
//!
//! None of these escape the transport operations of
//! [`MusicPlayer`](crate::player::MusicPlayer); they are logged there and the
//! player falls back to "no music playing".

use thiserror::Error;

/// Errors raised while preparing or starting music.
#[derive(Debug, Error)]
pub enum MusicError {
    /// The audio output device could not be opened.
    #[error("audio device unavailable: {0}")]
    DeviceUnavailable(String),

    /// No score or sequence exists for the requested page.
    #[error("no music data for page {page}")]
    DataUnavailable {
        /// Requested music page.
        page: u16,
    },

    /// The MIDI sequence for a page exists but could not be parsed.
    #[error("failed to load sequence for page {page}: {reason}")]
    SequenceLoad {
        /// Requested music page.
        page: u16,
        /// Parser message.
        reason: String,
    },

    /// The transient file handed to the host MIDI player could not be written.
    #[error("failed to create temporary file: {0}")]
    TransientFile(#[source] std::io::Error),

    /// Score bytes were present but not a valid decoded score.
    #[error("decode error: {0}")]
    Decode(String),

    /// Invalid configuration value.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Filesystem error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<bincode::Error> for MusicError {
    fn from(e: bincode::Error) -> Self {
        MusicError::Decode(e.to_string())
    }
}

/// Result alias used by the library.
pub type Result<T> = std::result::Result<T, MusicError>;
