//! Audio output device.
//!
//! The player only needs to pause and resume the device around synthesizer
//! swaps; [`AudioOutput`] is that seam. [`RodioOutput`] opens the default
//! output with rodio and feeds it from a [`RenderSource`].

use super::render::{RenderSource, SynthSlot};
use crate::error::{MusicError, Result};
use rodio::{OutputStream, OutputStreamHandle, Sink};

/// Pausable audio output driving the render path.
pub trait AudioOutput {
    /// Stops pulling samples from the render path.
    fn pause(&self);

    /// Resumes pulling samples.
    fn resume(&self);
}

/// Default system output via rodio.
pub struct RodioOutput {
    /// Audio output stream (must be kept alive).
    _stream: OutputStream,
    _stream_handle: OutputStreamHandle,
    sink: Sink,
}

impl RodioOutput {
    /// Opens the default output device, initially paused, rendering from
    /// `slot`.
    ///
    /// # Errors
    ///
    /// Returns [`MusicError::DeviceUnavailable`] if no output device can be
    /// opened.
    pub fn open(slot: SynthSlot, sample_rate: u32, buffer_frames: usize) -> Result<Self> {
        let (stream, stream_handle) = OutputStream::try_default()
            .map_err(|e| MusicError::DeviceUnavailable(e.to_string()))?;
        let sink =
            Sink::try_new(&stream_handle).map_err(|e| MusicError::DeviceUnavailable(e.to_string()))?;

        sink.pause();
        sink.append(RenderSource::new(slot, sample_rate, buffer_frames));

        Ok(Self {
            _stream: stream,
            _stream_handle: stream_handle,
            sink,
        })
    }

    /// Returns true while the device is paused.
    pub fn is_paused(&self) -> bool {
        self.sink.is_paused()
    }
}

impl AudioOutput for RodioOutput {
    fn pause(&self) {
        self.sink.pause();
    }

    fn resume(&self) {
        self.sink.play();
    }
}
