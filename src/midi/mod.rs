//! MIDI sequences for pages played through the host MIDI service.
//!
//! A page's sequence is decoded into a [`MidiSequence`], serialized to a
//! Standard MIDI File with [`MidiSequence::to_smf`], and handed to the
//! playback service as a transient file.

mod midi_export;
mod midi_import;
mod sequence;

pub use midi_export::{export_to_smf, LOOP_CONTROLLER};
pub use midi_import::{import_from_smf, MidiImportError};
pub use sequence::{ChannelMessage, MidiSequence, SequenceEvent, SequenceTrack};

/// Ticks per beat (quarter note) used for new sequences.
pub const TICKS_PER_BEAT: u32 = 480;

/// Default tempo in beats per minute.
pub const DEFAULT_TEMPO: u32 = 120;

/// Converts ticks to seconds.
///
/// # Arguments
///
/// * `ticks` - Number of ticks
/// * `tempo` - Tempo in beats per minute
/// * `ticks_per_beat` - Resolution of the tick count
pub fn ticks_to_seconds(ticks: u32, tempo: u32, ticks_per_beat: u32) -> f64 {
    let beats = ticks as f64 / ticks_per_beat.max(1) as f64;
    beats * 60.0 / tempo.max(1) as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tick_conversions() {
        // At 120 BPM, one beat = 0.5 seconds
        let seconds = ticks_to_seconds(TICKS_PER_BEAT, 120, TICKS_PER_BEAT);
        assert!((seconds - 0.5).abs() < 0.001);

        let seconds = ticks_to_seconds(96, 60, 48);
        assert!((seconds - 2.0).abs() < 0.001);
    }
}
