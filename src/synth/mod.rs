//! Synthesizer backends rendered by the real-time audio path.
//!
//! A [`SynthBackend`] is created from decoded score bytes by a
//! [`SynthFactory`] each time an FM page starts, and destroyed when it stops.
//! The live instance is only ever touched through the render slot lock.

pub mod fm;

pub use fm::{FmPatch, FmScore, FmSynth, FmSynthFactory, ScoreEvent, ScoreEventKind};

use crate::error::Result;

/// Playback position reported by a synthesizer backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Mark {
    /// Last mark command reached in the score.
    pub mark: u32,
    /// Whether the score has jumped back to its loop point at least once.
    pub looped: bool,
}

/// Where a new backend begins playing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopStart {
    /// Play the intro, then loop.
    FromTop,
    /// Skip the intro and begin at the loop point (resume after load).
    InLoop,
}

/// A synthesizer producing interleaved 16-bit stereo frames.
pub trait SynthBackend: Send {
    /// Fills `out` with interleaved `L, R` samples. `out.len()` is even.
    fn render(&mut self, out: &mut [i16]);

    /// Current mark and loop flag.
    fn mark(&self) -> Mark;
}

/// Builds synthesizer backends from decoded score data.
pub trait SynthFactory {
    /// Creates a backend for `data` rendering at `sample_rate`.
    ///
    /// # Errors
    ///
    /// Returns [`MusicError::Decode`](crate::MusicError::Decode) if the data
    /// is not a score this factory understands.
    fn create(&self, data: &[u8], sample_rate: u32, start: LoopStart)
        -> Result<Box<dyn SynthBackend>>;
}
