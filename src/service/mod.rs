//! Host playback service for disc audio and MIDI files.
//!
//! The player delegates disc tracks and MIDI pages to a [`PlaybackService`].
//! Every call is best-effort: the player logs failures and carries on with
//! its own state changes.

pub mod local;

pub use local::LocalPlaybackService;

use std::path::Path;
use thiserror::Error;

/// Failure of a delegated playback call.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The host service could not be reached at all.
    #[error("playback service unreachable")]
    Unreachable,
    /// The service was reached but the call failed.
    #[error("playback service error: {0}")]
    Failed(String),
}

/// Result type for service calls.
pub type ServiceResult<T> = Result<T, ServiceError>;

/// Disc audio and MIDI playback provided by the host.
///
/// Positions are opaque progress values; zero means nothing is playing.
pub trait PlaybackService {
    /// Starts a disc track.
    fn start_disc_track(&mut self, track: u32, looping: bool) -> ServiceResult<()>;

    /// Stops disc playback.
    fn stop_disc_track(&mut self) -> ServiceResult<()>;

    /// Current disc position, zero once the track has ended.
    fn disc_position(&mut self) -> ServiceResult<u32>;

    /// Starts playing a Standard MIDI File.
    fn start_midi(&mut self, path: &Path, looping: bool) -> ServiceResult<()>;

    /// Stops MIDI playback.
    fn stop_midi(&mut self) -> ServiceResult<()>;

    /// Current MIDI position, zero once the file has ended.
    fn midi_position(&mut self) -> ServiceResult<u32>;
}

/// Service for hosts without disc or MIDI playback. Every call reports
/// [`ServiceError::Unreachable`].
#[derive(Debug, Default, Clone, Copy)]
pub struct NullPlaybackService;

impl PlaybackService for NullPlaybackService {
    fn start_disc_track(&mut self, _track: u32, _looping: bool) -> ServiceResult<()> {
        Err(ServiceError::Unreachable)
    }

    fn stop_disc_track(&mut self) -> ServiceResult<()> {
        Err(ServiceError::Unreachable)
    }

    fn disc_position(&mut self) -> ServiceResult<u32> {
        Err(ServiceError::Unreachable)
    }

    fn start_midi(&mut self, _path: &Path, _looping: bool) -> ServiceResult<()> {
        Err(ServiceError::Unreachable)
    }

    fn stop_midi(&mut self) -> ServiceResult<()> {
        Err(ServiceError::Unreachable)
    }

    fn midi_position(&mut self) -> ServiceResult<u32> {
        Err(ServiceError::Unreachable)
    }
}
