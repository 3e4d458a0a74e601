//! Decoded MIDI sequence for one music page.
//!
//! A sequence is what the page's MML score and its auxiliary channel data
//! decode to: a tempo, a set of tracks holding timed channel messages, and
//! an optional loop point.

use super::{DEFAULT_TEMPO, TICKS_PER_BEAT};
use serde::{Deserialize, Serialize};

/// A channel voice message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChannelMessage {
    NoteOn {
        channel: u8,
        pitch: u8,
        velocity: u8,
    },
    NoteOff {
        channel: u8,
        pitch: u8,
    },
    ProgramChange {
        channel: u8,
        program: u8,
    },
    ControlChange {
        channel: u8,
        controller: u8,
        value: u8,
    },
}

impl ChannelMessage {
    /// Returns true for messages that set up channel state rather than
    /// sound notes. These survive when a sequence starts at its loop point.
    pub fn is_setup(&self) -> bool {
        matches!(
            self,
            ChannelMessage::ProgramChange { .. } | ChannelMessage::ControlChange { .. }
        )
    }
}

/// A message at an absolute tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceEvent {
    pub tick: u32,
    pub message: ChannelMessage,
}

/// One part of a sequence.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceTrack {
    /// Display name written as the SMF track name.
    pub name: String,
    /// Events in tick order.
    pub events: Vec<SequenceEvent>,
}

impl SequenceTrack {
    /// Creates an empty track.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            events: Vec::new(),
        }
    }

    /// Appends a message at `tick`.
    pub fn push(&mut self, tick: u32, message: ChannelMessage) {
        self.events.push(SequenceEvent { tick, message });
    }

    /// Appends a note as an on/off pair.
    pub fn add_note(&mut self, channel: u8, pitch: u8, velocity: u8, start: u32, duration: u32) {
        self.push(
            start,
            ChannelMessage::NoteOn {
                channel,
                pitch,
                velocity,
            },
        );
        self.push(start + duration, ChannelMessage::NoteOff { channel, pitch });
    }

    /// Tick of the last event.
    pub fn duration_ticks(&self) -> u32 {
        self.events.iter().map(|e| e.tick).max().unwrap_or(0)
    }
}

/// A complete page sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MidiSequence {
    /// Tempo in beats per minute.
    pub tempo: u32,
    /// Resolution in ticks per quarter note.
    pub ticks_per_beat: u16,
    pub tracks: Vec<SequenceTrack>,
    /// Tick the sequence loops back to, if it loops.
    #[serde(default)]
    pub loop_tick: Option<u32>,
}

impl MidiSequence {
    /// Creates an empty sequence at the default tempo and resolution.
    pub fn new() -> Self {
        Self {
            tempo: DEFAULT_TEMPO,
            ticks_per_beat: TICKS_PER_BEAT as u16,
            tracks: Vec::new(),
            loop_tick: None,
        }
    }

    /// Total length in ticks.
    pub fn duration_ticks(&self) -> u32 {
        self.tracks
            .iter()
            .map(|t| t.duration_ticks())
            .max()
            .unwrap_or(0)
    }

    /// Serializes with bincode.
    pub fn to_bytes(&self) -> Result<Vec<u8>, bincode::Error> {
        bincode::serialize(self)
    }

    /// Deserializes from bincode.
    pub fn from_bytes(data: &[u8]) -> Result<Self, bincode::Error> {
        bincode::deserialize(data)
    }
}

impl Default for MidiSequence {
    fn default() -> Self {
        Self::new()
    }
}
