//! Standard MIDI File (SMF) serialization of page sequences.
//!
//! The host MIDI player consumes a file, so every MIDI page is written out
//! as SMF before it is started.
//!
//! # Format Details
//!
//! Writes SMF Format 1 (multi-track) with:
//! - Track 0: Tempo meta event and the loop marker
//! - Tracks 1-N: Channel messages of each sequence track
//!
//! The loop point is marked with controller 111 on channel 0, which hosts
//! that support looping treat as "loop back to here".
//!
//! When the sequence starts in its loop section, everything before the loop
//! point is dropped except program and controller changes, which are moved
//! to tick 0 so channels sound the same as they would have after the intro.

use super::sequence::{ChannelMessage, MidiSequence, SequenceTrack};

/// Controller number marking the loop start.
pub const LOOP_CONTROLLER: u8 = 111;

/// Writes a variable-length quantity (VLQ) used for delta times in MIDI.
///
/// VLQ encodes values using 7 bits per byte, with the MSB indicating
/// whether more bytes follow (1 = more bytes, 0 = last byte).
fn write_vlq(value: u32, buffer: &mut Vec<u8>) {
    if value == 0 {
        buffer.push(0);
        return;
    }

    let mut temp = value;
    let mut bytes = Vec::with_capacity(4);

    while temp > 0 {
        bytes.push((temp & 0x7F) as u8);
        temp >>= 7;
    }

    for (i, &byte) in bytes.iter().rev().enumerate() {
        if i < bytes.len() - 1 {
            buffer.push(byte | 0x80);
        } else {
            buffer.push(byte);
        }
    }
}

/// Events written to track chunks.
enum MidiEvent {
    Channel(ChannelMessage),
    /// Set tempo: microseconds per quarter note
    SetTempo { microseconds_per_beat: u32 },
    TrackName { name: String },
    EndOfTrack,
}

/// Represents a timed MIDI event for sorting and writing.
struct TimedEvent {
    /// Absolute tick position
    tick: u32,
    event: MidiEvent,
    /// Orders events at the same tick (lower = first). Setup before notes,
    /// note-offs before note-ons so retriggered pitches are not cut.
    priority: u8,
}

impl TimedEvent {
    fn new(tick: u32, event: MidiEvent, priority: u8) -> Self {
        Self {
            tick,
            event,
            priority,
        }
    }

    fn channel(tick: u32, message: ChannelMessage) -> Self {
        let priority = match message {
            ChannelMessage::ProgramChange { .. } => 1,
            ChannelMessage::ControlChange { .. } => 2,
            ChannelMessage::NoteOff { .. } => 10,
            ChannelMessage::NoteOn { .. } => 11,
        };
        Self::new(tick, MidiEvent::Channel(message), priority)
    }
}

/// Writes a single MIDI event to the buffer (without delta time).
fn write_event(event: &MidiEvent, buffer: &mut Vec<u8>) {
    match event {
        MidiEvent::Channel(ChannelMessage::NoteOn {
            channel,
            pitch,
            velocity,
        }) => {
            buffer.push(0x90 | (channel & 0x0F));
            buffer.push(pitch & 0x7F);
            buffer.push(velocity & 0x7F);
        }
        MidiEvent::Channel(ChannelMessage::NoteOff { channel, pitch }) => {
            buffer.push(0x80 | (channel & 0x0F));
            buffer.push(pitch & 0x7F);
            buffer.push(0);
        }
        MidiEvent::Channel(ChannelMessage::ProgramChange { channel, program }) => {
            buffer.push(0xC0 | (channel & 0x0F));
            buffer.push(program & 0x7F);
        }
        MidiEvent::Channel(ChannelMessage::ControlChange {
            channel,
            controller,
            value,
        }) => {
            buffer.push(0xB0 | (channel & 0x0F));
            buffer.push(controller & 0x7F);
            buffer.push(value & 0x7F);
        }
        MidiEvent::SetTempo {
            microseconds_per_beat,
        } => {
            // Meta event: FF 51 03 tt tt tt
            buffer.push(0xFF);
            buffer.push(0x51);
            buffer.push(0x03);
            buffer.push((microseconds_per_beat >> 16) as u8);
            buffer.push((microseconds_per_beat >> 8) as u8);
            buffer.push(*microseconds_per_beat as u8);
        }
        MidiEvent::TrackName { name } => {
            // Meta event: FF 03 len text
            buffer.push(0xFF);
            buffer.push(0x03);
            let name_bytes = name.as_bytes();
            write_vlq(name_bytes.len() as u32, buffer);
            buffer.extend_from_slice(name_bytes);
        }
        MidiEvent::EndOfTrack => {
            buffer.push(0xFF);
            buffer.push(0x2F);
            buffer.push(0x00);
        }
    }
}

/// Builds the track chunk data from a list of timed events.
///
/// Events are sorted by tick position and converted to delta times.
fn build_track_data(events: &mut [TimedEvent]) -> Vec<u8> {
    let mut buffer = Vec::new();
    events.sort_by(|a, b| a.tick.cmp(&b.tick).then(a.priority.cmp(&b.priority)));

    let mut last_tick = 0u32;
    for timed_event in events.iter() {
        let delta = timed_event.tick.saturating_sub(last_tick);
        write_vlq(delta, &mut buffer);
        write_event(&timed_event.event, &mut buffer);
        last_tick = timed_event.tick;
    }

    buffer
}

fn write_track_chunk(out: &mut Vec<u8>, track_data: &[u8]) {
    out.extend_from_slice(b"MTrk");
    out.extend_from_slice(&(track_data.len() as u32).to_be_bytes());
    out.extend_from_slice(track_data);
}

/// Collects a track's events, dropping or moving the intro when starting
/// at the loop point. Ticks are returned relative to the new start.
fn track_events(track: &SequenceTrack, skip_to: u32) -> Vec<TimedEvent> {
    track
        .events
        .iter()
        .filter_map(|e| {
            if e.tick >= skip_to {
                Some(TimedEvent::channel(e.tick - skip_to, e.message))
            } else if e.message.is_setup() {
                Some(TimedEvent::channel(0, e.message))
            } else {
                None
            }
        })
        .collect()
}

/// Serializes a sequence to Standard MIDI File bytes.
///
/// With `start_in_loop` set and a loop point present, the output begins at
/// the loop point and carries no loop marker.
#[allow(clippy::vec_init_then_push)]
pub fn export_to_smf(sequence: &MidiSequence, start_in_loop: bool) -> Vec<u8> {
    let skip_to = match sequence.loop_tick {
        Some(tick) if start_in_loop => tick,
        _ => 0,
    };
    let loop_marker = sequence.loop_tick.filter(|_| !start_in_loop);
    // End of Track must follow every event, the loop marker included
    let end = sequence.duration_ticks().max(loop_marker.unwrap_or(0));
    let duration = end.saturating_sub(skip_to);
    let num_tracks = 1 + sequence.tracks.len() as u16;

    let mut out = Vec::new();
    out.extend_from_slice(b"MThd");
    out.extend_from_slice(&6u32.to_be_bytes());
    out.extend_from_slice(&1u16.to_be_bytes()); // Format 1
    out.extend_from_slice(&num_tracks.to_be_bytes());
    out.extend_from_slice(&sequence.ticks_per_beat.to_be_bytes());

    // Track 0: conductor
    {
        let mut events = Vec::new();
        let microseconds_per_beat = 60_000_000 / sequence.tempo.max(1);
        events.push(TimedEvent::new(
            0,
            MidiEvent::SetTempo {
                microseconds_per_beat,
            },
            0,
        ));
        if let Some(loop_tick) = loop_marker {
            events.push(TimedEvent::channel(
                loop_tick,
                ChannelMessage::ControlChange {
                    channel: 0,
                    controller: LOOP_CONTROLLER,
                    value: 0,
                },
            ));
        }
        events.push(TimedEvent::new(duration, MidiEvent::EndOfTrack, 255));

        let track_data = build_track_data(&mut events);
        write_track_chunk(&mut out, &track_data);
    }

    for track in &sequence.tracks {
        let mut events = track_events(track, skip_to);
        events.push(TimedEvent::new(
            0,
            MidiEvent::TrackName {
                name: track.name.clone(),
            },
            0,
        ));
        events.push(TimedEvent::new(duration, MidiEvent::EndOfTrack, 255));

        let track_data = build_track_data(&mut events);
        write_track_chunk(&mut out, &track_data);
    }

    out
}

impl MidiSequence {
    /// Serializes this sequence as a Standard MIDI File. See [`export_to_smf`].
    pub fn to_smf(&self, start_in_loop: bool) -> Vec<u8> {
        export_to_smf(self, start_in_loop)
    }
}
