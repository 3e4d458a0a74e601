//! In-process playback service built on rodio and rustysynth.
//!
//! Disc tracks are read from ripped files named `trackNN.{wav,ogg,flac,mp3}`
//! in the disc directory, where `NN` is the track number the player asks
//! for. MIDI files are rendered through a SoundFont with rustysynth's
//! sequencer.

use super::{PlaybackService, ServiceError, ServiceResult};
use rodio::{Decoder, OutputStream, OutputStreamHandle, Sink, Source};
use rustysynth::{MidiFile, MidiFileSequencer, SoundFont, Synthesizer, SynthesizerSettings};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Audio buffer size for sequencer rendering.
const BUFFER_SIZE: usize = 1024;

/// File extensions tried for disc tracks, in order.
const DISC_EXTENSIONS: [&str; 4] = ["wav", "ogg", "flac", "mp3"];

/// Finds the ripped file for a disc track.
pub fn find_track_file(disc_dir: &Path, track: u32) -> Option<PathBuf> {
    DISC_EXTENSIONS
        .iter()
        .map(|ext| disc_dir.join(format!("track{:02}.{}", track, ext)))
        .find(|path| path.is_file())
}

/// Audio source that renders a MIDI file through the sequencer.
/// Implements rodio's Source trait for playback.
struct SequencerSource {
    sequencer: Arc<Mutex<MidiFileSequencer>>,
    sample_rate: u32,
    left_buf: Vec<f32>,
    right_buf: Vec<f32>,
    buf_pos: usize,
    /// Current channel (0 = left, 1 = right).
    channel: usize,
}

impl SequencerSource {
    fn new(sequencer: Arc<Mutex<MidiFileSequencer>>, sample_rate: u32) -> Self {
        Self {
            sequencer,
            sample_rate,
            left_buf: vec![0.0; BUFFER_SIZE],
            right_buf: vec![0.0; BUFFER_SIZE],
            buf_pos: BUFFER_SIZE, // Start at end to trigger first render
            channel: 0,
        }
    }
}

impl Iterator for SequencerSource {
    type Item = f32;

    fn next(&mut self) -> Option<f32> {
        if self.buf_pos >= BUFFER_SIZE {
            if let Ok(mut sequencer) = self.sequencer.lock() {
                sequencer.render(&mut self.left_buf, &mut self.right_buf);
            } else {
                self.left_buf.fill(0.0);
                self.right_buf.fill(0.0);
            }
            self.buf_pos = 0;
        }

        // Interleave stereo samples: L, R, L, R, ...
        let sample = if self.channel == 0 {
            self.left_buf[self.buf_pos]
        } else {
            self.right_buf[self.buf_pos]
        };

        self.channel = 1 - self.channel;
        if self.channel == 0 {
            self.buf_pos += 1;
        }

        Some(sample)
    }
}

impl Source for SequencerSource {
    fn current_frame_len(&self) -> Option<usize> {
        None
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

struct DiscSession {
    sink: Sink,
    started: Instant,
}

struct MidiSession {
    _sink: Sink,
    sequencer: Arc<Mutex<MidiFileSequencer>>,
}

/// Plays disc tracks and MIDI files on the default output device.
pub struct LocalPlaybackService {
    _stream: OutputStream,
    stream_handle: OutputStreamHandle,
    disc_dir: PathBuf,
    soundfont: Option<Arc<SoundFont>>,
    sample_rate: u32,
    disc: Option<DiscSession>,
    midi: Option<MidiSession>,
}

impl LocalPlaybackService {
    /// Opens the default output device.
    ///
    /// # Arguments
    ///
    /// * `disc_dir` - Directory holding ripped disc tracks
    /// * `soundfont_path` - SoundFont for MIDI playback; without one MIDI
    ///   calls fail
    /// * `sample_rate` - Rate the MIDI synthesizer renders at
    ///
    /// # Errors
    ///
    /// Returns error if the output device or the SoundFont cannot be opened.
    pub fn new(
        disc_dir: impl Into<PathBuf>,
        soundfont_path: Option<&Path>,
        sample_rate: u32,
    ) -> ServiceResult<Self> {
        let soundfont = match soundfont_path {
            Some(path) => Some(Arc::new(load_soundfont(path)?)),
            None => None,
        };

        let (stream, stream_handle) = OutputStream::try_default()
            .map_err(|e| ServiceError::Failed(format!("Failed to open audio output: {}", e)))?;

        Ok(Self {
            _stream: stream,
            stream_handle,
            disc_dir: disc_dir.into(),
            soundfont,
            sample_rate,
            disc: None,
            midi: None,
        })
    }

    fn new_sink(&self) -> ServiceResult<Sink> {
        Sink::try_new(&self.stream_handle)
            .map_err(|e| ServiceError::Failed(format!("Failed to create audio sink: {}", e)))
    }
}

fn load_soundfont(path: &Path) -> ServiceResult<SoundFont> {
    let file = File::open(path).map_err(|e| {
        ServiceError::Failed(format!("Failed to open SoundFont {}: {}", path.display(), e))
    })?;
    SoundFont::new(&mut BufReader::new(file))
        .map_err(|e| ServiceError::Failed(format!("Failed to load SoundFont: {:?}", e)))
}

impl PlaybackService for LocalPlaybackService {
    fn start_disc_track(&mut self, track: u32, looping: bool) -> ServiceResult<()> {
        self.stop_disc_track()?;

        let path = find_track_file(&self.disc_dir, track)
            .ok_or_else(|| ServiceError::Failed(format!("No file for disc track {}", track)))?;
        let reader = BufReader::new(
            File::open(&path).map_err(|e| ServiceError::Failed(e.to_string()))?,
        );

        let sink = self.new_sink()?;
        if looping {
            let source =
                Decoder::new_looped(reader).map_err(|e| ServiceError::Failed(e.to_string()))?;
            sink.append(source);
        } else {
            let source = Decoder::new(reader).map_err(|e| ServiceError::Failed(e.to_string()))?;
            sink.append(source);
        }

        tracing::debug!("Disc track {} started from {:?}", track, path);
        self.disc = Some(DiscSession {
            sink,
            started: Instant::now(),
        });
        Ok(())
    }

    fn stop_disc_track(&mut self) -> ServiceResult<()> {
        if let Some(session) = self.disc.take() {
            session.sink.stop();
        }
        Ok(())
    }

    fn disc_position(&mut self) -> ServiceResult<u32> {
        Ok(match &self.disc {
            Some(session) if !session.sink.empty() => {
                (session.started.elapsed().as_millis() as u32).max(1)
            }
            _ => 0,
        })
    }

    fn start_midi(&mut self, path: &Path, looping: bool) -> ServiceResult<()> {
        self.stop_midi()?;

        let soundfont = self
            .soundfont
            .as_ref()
            .ok_or_else(|| ServiceError::Failed("No SoundFont loaded".to_string()))?;

        let mut reader = BufReader::new(
            File::open(path).map_err(|e| ServiceError::Failed(e.to_string()))?,
        );
        let midi_file = Arc::new(
            MidiFile::new(&mut reader)
                .map_err(|e| ServiceError::Failed(format!("Failed to load MIDI: {:?}", e)))?,
        );

        let settings = SynthesizerSettings::new(self.sample_rate as i32);
        let synth = Synthesizer::new(soundfont, &settings)
            .map_err(|e| ServiceError::Failed(format!("Failed to create synthesizer: {:?}", e)))?;
        let mut sequencer = MidiFileSequencer::new(synth);
        sequencer.play(&midi_file, looping);
        let sequencer = Arc::new(Mutex::new(sequencer));

        let sink = self.new_sink()?;
        sink.append(SequencerSource::new(Arc::clone(&sequencer), self.sample_rate));

        tracing::debug!("MIDI started from {:?} (loop: {})", path, looping);
        self.midi = Some(MidiSession {
            _sink: sink,
            sequencer,
        });
        Ok(())
    }

    fn stop_midi(&mut self) -> ServiceResult<()> {
        if let Some(session) = self.midi.take() {
            if let Ok(mut sequencer) = session.sequencer.lock() {
                sequencer.stop();
            }
        }
        Ok(())
    }

    fn midi_position(&mut self) -> ServiceResult<u32> {
        let Some(session) = &self.midi else {
            return Ok(0);
        };
        let sequencer = session
            .sequencer
            .lock()
            .map_err(|_| ServiceError::Failed("MIDI sequencer poisoned".to_string()))?;
        if sequencer.end_of_sequence() {
            return Ok(0);
        }
        Ok(((sequencer.get_position() * 1000.0) as u32).max(1))
    }
}
