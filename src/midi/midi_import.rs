//! Standard MIDI File (SMF) import.
//!
//! Lets a page's sequence be supplied as a plain `.mid` file instead of a
//! decoded score. Format 0 and Format 1 files are accepted; ticks keep the
//! file's own resolution.
//!
//! # Limitations
//!
//! - Only note, program change and controller messages are imported
//! - The first tempo event sets the sequence tempo
//! - Controller 111 is taken as the loop point and not kept as an event

use super::midi_export::LOOP_CONTROLLER;
use super::sequence::{ChannelMessage, MidiSequence, SequenceTrack};
use midly::{Format, MetaMessage, MidiMessage, Smf, Timing, TrackEventKind};
use thiserror::Error;

/// Errors that can occur during MIDI import.
#[derive(Debug, Error)]
pub enum MidiImportError {
    /// MIDI parsing failed
    #[error("MIDI parse error: {0}")]
    ParseError(String),
    /// Unsupported MIDI format or timing
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),
}

/// Parses SMF bytes into a sequence.
///
/// # Errors
///
/// Returns error if the bytes are not a MIDI file, use SMPTE timing, or are
/// Format 2 (sequential).
pub fn import_from_smf(data: &[u8]) -> Result<MidiSequence, MidiImportError> {
    let smf = Smf::parse(data).map_err(|e| MidiImportError::ParseError(e.to_string()))?;

    let ticks_per_beat = match smf.header.timing {
        Timing::Metrical(tpb) => tpb.as_int(),
        Timing::Timecode(_, _) => {
            return Err(MidiImportError::UnsupportedFormat(
                "SMPTE timecode timing not supported".to_string(),
            ))
        }
    };
    if smf.header.format == Format::Sequential {
        return Err(MidiImportError::UnsupportedFormat(
            "Format 2 (sequential) MIDI files not supported".to_string(),
        ));
    }

    let mut sequence = MidiSequence::new();
    sequence.ticks_per_beat = ticks_per_beat;
    let mut tempo_found = false;

    for (track_idx, events) in smf.tracks.iter().enumerate() {
        let mut track = SequenceTrack::new(format!("Track {}", track_idx + 1));
        let mut current_tick: u32 = 0;

        for event in events {
            current_tick += event.delta.as_int();

            match event.kind {
                TrackEventKind::Meta(MetaMessage::TrackName(name_bytes)) => {
                    if let Ok(name) = std::str::from_utf8(name_bytes) {
                        track.name = name.to_string();
                    }
                }
                TrackEventKind::Meta(MetaMessage::Tempo(tempo_val)) => {
                    let usec_per_beat = tempo_val.as_int();
                    if !tempo_found && usec_per_beat > 0 {
                        sequence.tempo = 60_000_000 / usec_per_beat;
                        tempo_found = true;
                    }
                }
                TrackEventKind::Midi { channel, message } => {
                    let channel = channel.as_int();
                    let message = match message {
                        MidiMessage::NoteOn { key, vel } if vel.as_int() > 0 => {
                            ChannelMessage::NoteOn {
                                channel,
                                pitch: key.as_int(),
                                velocity: vel.as_int(),
                            }
                        }
                        // Note on with velocity 0 = note off
                        MidiMessage::NoteOn { key, .. } | MidiMessage::NoteOff { key, .. } => {
                            ChannelMessage::NoteOff {
                                channel,
                                pitch: key.as_int(),
                            }
                        }
                        MidiMessage::ProgramChange { program } => ChannelMessage::ProgramChange {
                            channel,
                            program: program.as_int(),
                        },
                        MidiMessage::Controller { controller, .. }
                            if controller.as_int() == LOOP_CONTROLLER =>
                        {
                            sequence.loop_tick.get_or_insert(current_tick);
                            continue;
                        }
                        MidiMessage::Controller { controller, value } => {
                            ChannelMessage::ControlChange {
                                channel,
                                controller: controller.as_int(),
                                value: value.as_int(),
                            }
                        }
                        _ => continue,
                    };
                    track.push(current_tick, message);
                }
                _ => {}
            }
        }

        // Conductor tracks carry no channel data
        if !track.events.is_empty() {
            sequence.tracks.push(track);
        }
    }

    Ok(sequence)
}

impl MidiSequence {
    /// Parses a Standard MIDI File. See [`import_from_smf`].
    pub fn from_smf(data: &[u8]) -> Result<Self, MidiImportError> {
        import_from_smf(data)
    }
}
