//! Two-operator FM synthesizer.
//!
//! Plays an [`FmScore`], the decoded form of a page's score data, on a small
//! bank of monophonic channels in the manner of an OPN-style sound chip.
//! Scores always loop: when the end tick is reached playback jumps back to
//! the loop point and the backend reports `looped`.

use super::{LoopStart, Mark, SynthBackend, SynthFactory};
use crate::error::{MusicError, Result};
use serde::{Deserialize, Serialize};
use std::f32::consts::{FRAC_PI_2, TAU};

/// Number of FM channels available to a score.
pub const FM_CHANNELS: usize = 6;

/// Headroom applied to the channel mix before conversion to i16.
const MASTER_GAIN: f32 = 0.3;

/// Fastest sequencer a score may request, in ticks per minute.
const MAX_TICKS_PER_MINUTE: u64 = 1_000_000;

/// Center pan position.
const PAN_CENTER: u8 = 64;

/// Operator settings for one instrument.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FmPatch {
    /// Modulator frequency as a multiple of the carrier frequency.
    pub ratio: f32,
    /// Modulation index (depth, in radians).
    pub index: f32,
    /// Attack time in seconds.
    pub attack: f32,
    /// Release time in seconds.
    pub release: f32,
    /// Output level (0.0 to 1.0).
    pub level: f32,
}

impl Default for FmPatch {
    fn default() -> Self {
        Self {
            ratio: 1.0,
            index: 1.5,
            attack: 0.01,
            release: 0.2,
            level: 0.8,
        }
    }
}

/// Score command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScoreEventKind {
    /// Start a note on a channel, replacing whatever it was playing.
    NoteOn {
        channel: u8,
        patch: u8,
        pitch: u8,
        velocity: u8,
    },
    /// Release the note on a channel.
    NoteOff { channel: u8 },
    /// Set channel pan (0 = left, 64 = center, 127 = right).
    Pan { channel: u8, pan: u8 },
    /// Update the mark reported to the engine.
    Mark(u32),
}

/// A score command at an absolute tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreEvent {
    pub tick: u32,
    pub kind: ScoreEventKind,
}

/// Decoded score and instrument data for one music page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FmScore {
    /// Tempo in beats per minute.
    pub tempo: u32,
    /// Sequencer resolution.
    pub ticks_per_beat: u32,
    /// Instruments referenced by `NoteOn::patch`.
    pub patches: Vec<FmPatch>,
    /// Commands, ordered by tick.
    pub events: Vec<ScoreEvent>,
    /// Tick playback returns to after reaching `end_tick`.
    pub loop_tick: u32,
    /// Length of the score in ticks.
    pub end_tick: u32,
}

impl FmScore {
    /// Creates an empty score.
    pub fn new(tempo: u32, ticks_per_beat: u32) -> Self {
        Self {
            tempo,
            ticks_per_beat,
            patches: Vec::new(),
            events: Vec::new(),
            loop_tick: 0,
            end_tick: 0,
        }
    }

    /// Appends a command, extending the score length to cover it.
    pub fn push(&mut self, tick: u32, kind: ScoreEventKind) {
        self.events.push(ScoreEvent { tick, kind });
        self.end_tick = self.end_tick.max(tick.saturating_add(1));
    }

    /// Serializes the score with bincode.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    /// Decodes and validates a score.
    ///
    /// # Errors
    ///
    /// Returns [`MusicError::Decode`] if the bytes are not a score, the tempo
    /// or resolution is zero or too fast, or the loop point is not before
    /// the end.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let mut score: Self = bincode::deserialize(data)?;
        score.validate()?;
        Ok(score)
    }

    fn validate(&mut self) -> Result<()> {
        if self.tempo == 0 || self.ticks_per_beat == 0 {
            return Err(MusicError::Decode("score has zero tempo".into()));
        }
        let ticks_per_minute = self.tempo as u64 * self.ticks_per_beat as u64;
        if ticks_per_minute > MAX_TICKS_PER_MINUTE {
            return Err(MusicError::Decode(format!(
                "score runs at {} ticks per minute",
                ticks_per_minute
            )));
        }
        if self.loop_tick >= self.end_tick {
            return Err(MusicError::Decode(format!(
                "loop point {} is not before end {}",
                self.loop_tick, self.end_tick
            )));
        }
        self.events.sort_by_key(|e| e.tick);
        Ok(())
    }
}

/// Converts a MIDI note number to a frequency in Hz.
fn pitch_to_freq(pitch: u8) -> f32 {
    440.0 * 2f32.powf((pitch as f32 - 69.0) / 12.0)
}

fn to_i16(sample: f32) -> i16 {
    (sample * 32767.0).clamp(-32768.0, 32767.0) as i16
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EnvStage {
    Off,
    Attack,
    Sustain,
    Release,
}

/// One FM channel: a modulator feeding a carrier.
#[derive(Debug, Clone, Copy)]
struct FmVoice {
    patch: FmPatch,
    freq: f32,
    carrier_phase: f32,
    modulator_phase: f32,
    velocity: f32,
    env: f32,
    stage: EnvStage,
    pan: u8,
}

impl FmVoice {
    fn new() -> Self {
        Self {
            patch: FmPatch::default(),
            freq: 0.0,
            carrier_phase: 0.0,
            modulator_phase: 0.0,
            velocity: 0.0,
            env: 0.0,
            stage: EnvStage::Off,
            pan: PAN_CENTER,
        }
    }

    fn note_on(&mut self, patch: FmPatch, pitch: u8, velocity: u8) {
        self.patch = patch;
        self.freq = pitch_to_freq(pitch);
        self.velocity = velocity.min(127) as f32 / 127.0;
        self.carrier_phase = 0.0;
        self.modulator_phase = 0.0;
        self.stage = EnvStage::Attack;
    }

    fn note_off(&mut self) {
        if self.stage != EnvStage::Off {
            self.stage = EnvStage::Release;
        }
    }

    fn next_sample(&mut self, sample_rate: f32) -> f32 {
        match self.stage {
            EnvStage::Off => return 0.0,
            EnvStage::Attack => {
                self.env += 1.0 / (self.patch.attack.max(1e-4) * sample_rate);
                if self.env >= 1.0 {
                    self.env = 1.0;
                    self.stage = EnvStage::Sustain;
                }
            }
            EnvStage::Sustain => {}
            EnvStage::Release => {
                self.env -= 1.0 / (self.patch.release.max(1e-4) * sample_rate);
                if self.env <= 0.0 {
                    self.env = 0.0;
                    self.stage = EnvStage::Off;
                    return 0.0;
                }
            }
        }

        let modulation = self.modulator_phase.sin() * self.patch.index;
        let out = (self.carrier_phase + modulation).sin() * self.env * self.patch.level * self.velocity;

        self.carrier_phase = (self.carrier_phase + TAU * self.freq / sample_rate) % TAU;
        self.modulator_phase =
            (self.modulator_phase + TAU * self.freq * self.patch.ratio / sample_rate) % TAU;
        out
    }

    /// Constant-power pan gains (left, right).
    fn gains(&self) -> (f32, f32) {
        let angle = self.pan.min(127) as f32 / 127.0 * FRAC_PI_2;
        (angle.cos(), angle.sin())
    }
}

/// FM synthesizer playing one [`FmScore`].
pub struct FmSynth {
    score: FmScore,
    sample_rate: f32,
    samples_per_tick: f64,
    sample_in_tick: f64,
    tick: u32,
    next_event: usize,
    voices: [FmVoice; FM_CHANNELS],
    mark: Mark,
}

impl FmSynth {
    /// Creates a synthesizer positioned at the top of the score, or at its
    /// loop point for [`LoopStart::InLoop`].
    ///
    /// # Errors
    ///
    /// Returns [`MusicError::Decode`] if a tick would be shorter than one
    /// sample at `sample_rate`, including a zero rate or tempo.
    pub fn new(score: FmScore, sample_rate: u32, start: LoopStart) -> Result<Self> {
        let ticks_per_minute = score.tempo as f64 * score.ticks_per_beat as f64;
        let samples_per_tick = sample_rate as f64 * 60.0 / ticks_per_minute;
        if !samples_per_tick.is_finite() || samples_per_tick < 1.0 {
            return Err(MusicError::Decode(format!(
                "score at {} ticks per minute cannot play at {} Hz",
                ticks_per_minute, sample_rate
            )));
        }
        let mut synth = Self {
            score,
            sample_rate: sample_rate as f32,
            samples_per_tick,
            sample_in_tick: 0.0,
            tick: 0,
            next_event: 0,
            voices: [FmVoice::new(); FM_CHANNELS],
            mark: Mark::default(),
        };

        if start == LoopStart::InLoop {
            synth.skip_intro();
        }
        Ok(synth)
    }

    /// Current sequencer tick.
    pub fn tick(&self) -> u32 {
        self.tick
    }

    /// Moves to the loop point, keeping pan settings made during the intro.
    fn skip_intro(&mut self) {
        let loop_tick = self.score.loop_tick;
        let intro: Vec<ScoreEventKind> = self
            .score
            .events
            .iter()
            .take_while(|e| e.tick < loop_tick)
            .filter(|e| matches!(e.kind, ScoreEventKind::Pan { .. }))
            .map(|e| e.kind)
            .collect();
        for kind in intro {
            self.apply(kind);
        }
        self.jump_to_loop();
    }

    fn jump_to_loop(&mut self) {
        let loop_tick = self.score.loop_tick;
        self.tick = loop_tick;
        self.next_event = self.score.events.partition_point(|e| e.tick < loop_tick);
    }

    fn apply(&mut self, kind: ScoreEventKind) {
        match kind {
            ScoreEventKind::NoteOn {
                channel,
                patch,
                pitch,
                velocity,
            } => {
                let patch = self
                    .score
                    .patches
                    .get(patch as usize)
                    .copied()
                    .unwrap_or_default();
                if let Some(voice) = self.voices.get_mut(channel as usize) {
                    voice.note_on(patch, pitch, velocity);
                }
            }
            ScoreEventKind::NoteOff { channel } => {
                if let Some(voice) = self.voices.get_mut(channel as usize) {
                    voice.note_off();
                }
            }
            ScoreEventKind::Pan { channel, pan } => {
                if let Some(voice) = self.voices.get_mut(channel as usize) {
                    voice.pan = pan;
                }
            }
            ScoreEventKind::Mark(mark) => self.mark.mark = mark,
        }
    }

    /// Fires due events, then advances one sample.
    fn step_sequencer(&mut self) {
        loop {
            let event = match self.score.events.get(self.next_event) {
                Some(e) if e.tick <= self.tick => *e,
                _ => break,
            };
            self.apply(event.kind);
            self.next_event += 1;
        }

        // A tick spans at least one sample
        self.sample_in_tick += 1.0;
        if self.sample_in_tick >= self.samples_per_tick {
            self.sample_in_tick -= self.samples_per_tick;
            self.tick += 1;
            if self.tick >= self.score.end_tick {
                self.jump_to_loop();
                self.mark.looped = true;
            }
        }
    }
}

impl SynthBackend for FmSynth {
    fn render(&mut self, out: &mut [i16]) {
        let sample_rate = self.sample_rate;
        for frame in out.chunks_exact_mut(2) {
            self.step_sequencer();

            let (mut left, mut right) = (0.0f32, 0.0f32);
            for voice in &mut self.voices {
                let sample = voice.next_sample(sample_rate);
                let (gain_l, gain_r) = voice.gains();
                left += sample * gain_l;
                right += sample * gain_r;
            }
            frame[0] = to_i16(left * MASTER_GAIN);
            frame[1] = to_i16(right * MASTER_GAIN);
        }
    }

    fn mark(&self) -> Mark {
        self.mark
    }
}

/// Builds [`FmSynth`] backends from bincode-encoded [`FmScore`] bytes.
#[derive(Debug, Default, Clone, Copy)]
pub struct FmSynthFactory;

impl SynthFactory for FmSynthFactory {
    fn create(
        &self,
        data: &[u8],
        sample_rate: u32,
        start: LoopStart,
    ) -> Result<Box<dyn SynthBackend>> {
        let score = FmScore::from_bytes(data)?;
        Ok(Box::new(FmSynth::new(score, sample_rate, start)?))
    }
}
