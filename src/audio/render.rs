//! Real-time render path.
//!
//! The audio device pulls samples from a [`RenderSource`], which renders a
//! buffer at a time from whatever synthesizer currently sits in the shared
//! [`SynthSlot`]. The slot lock is held only while a buffer is rendered.

use crate::synth::{Mark, SynthBackend};
use rodio::Source;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Synthesizer slot shared between the player and the render path.
pub type SynthSlot = Arc<Mutex<RenderSlot>>;

/// Holds at most one live synthesizer.
///
/// Once closed, the render path ends its stream and never touches a
/// synthesizer again.
#[derive(Default)]
pub struct RenderSlot {
    synth: Option<Box<dyn SynthBackend>>,
    closed: bool,
}

impl RenderSlot {
    /// Creates an empty, open slot ready to be shared.
    pub fn shared() -> SynthSlot {
        Arc::new(Mutex::new(Self::default()))
    }

    /// Installs a synthesizer, returning the one it replaces.
    pub fn install(&mut self, synth: Box<dyn SynthBackend>) -> Option<Box<dyn SynthBackend>> {
        self.synth.replace(synth)
    }

    /// Removes the synthesizer.
    pub fn take(&mut self) -> Option<Box<dyn SynthBackend>> {
        self.synth.take()
    }

    /// Returns true if a synthesizer is installed.
    pub fn is_active(&self) -> bool {
        self.synth.is_some()
    }

    /// Mark of the installed synthesizer, or `(0, false)` when empty.
    pub fn mark(&self) -> Mark {
        self.synth.as_ref().map(|s| s.mark()).unwrap_or_default()
    }

    /// Renders into `out`, or fills it with silence when empty.
    pub fn render(&mut self, out: &mut [i16]) {
        match self.synth.as_mut() {
            Some(synth) => synth.render(out),
            None => out.fill(0),
        }
    }

    /// Drops the synthesizer and marks the slot closed.
    pub fn close(&mut self) {
        self.synth = None;
        self.closed = true;
    }

    /// Returns true once [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

/// Locks a slot, recovering the guard if a render call panicked.
pub fn lock_slot(slot: &SynthSlot) -> MutexGuard<'_, RenderSlot> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Audio source that renders from the synth slot.
/// Implements rodio's Source trait for playback.
pub struct RenderSource {
    slot: SynthSlot,
    sample_rate: u32,
    /// Interleaved stereo buffer.
    buffer: Vec<i16>,
    /// Next sample to hand out.
    buf_pos: usize,
}

impl RenderSource {
    /// Creates a source rendering `buffer_frames` stereo frames per lock.
    pub fn new(slot: SynthSlot, sample_rate: u32, buffer_frames: usize) -> Self {
        let len = buffer_frames.max(1) * 2;
        Self {
            slot,
            sample_rate,
            buffer: vec![0; len],
            buf_pos: len, // Start at end to trigger first render
        }
    }
}

impl Iterator for RenderSource {
    type Item = i16;

    fn next(&mut self) -> Option<i16> {
        if self.buf_pos >= self.buffer.len() {
            let (mut slot, poisoned) = match self.slot.lock() {
                Ok(slot) => (slot, false),
                Err(e) => (e.into_inner(), true),
            };
            if slot.is_closed() {
                return None;
            }
            if poisoned {
                // A panicked render leaves the synth in an unknown state
                self.buffer.fill(0);
            } else {
                slot.render(&mut self.buffer);
            }
            self.buf_pos = 0;
        }

        let sample = self.buffer[self.buf_pos];
        self.buf_pos += 1;
        Some(sample)
    }
}

impl Source for RenderSource {
    fn current_frame_len(&self) -> Option<usize> {
        None // Continuous stream
    }

    fn channels(&self) -> u16 {
        2
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn total_duration(&self) -> Option<Duration> {
        None
    }
}
