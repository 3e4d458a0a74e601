//! Page-based background music player.
//!
//! [`MusicPlayer`] decides, per music page, whether to play a disc track, an
//! FM score or a MIDI sequence, and drives the matching backend. FM scores
//! are rendered in-process by a synthesizer that lives in a slot shared with
//! the audio render path; disc tracks and MIDI files are delegated to the
//! host [`PlaybackService`].
//!
//! Transport operations never fail outward. Missing data, an unwritable
//! temporary file or an unreachable service are logged and leave the player
//! with no music playing.

use crate::archive::{ScoreLoader, SequenceLoader};
use crate::audio::{lock_slot, AudioOutput, RenderSlot, RodioOutput, SynthSlot};
use crate::config::PlayerConfig;
use crate::error::{MusicError, Result};
use crate::midi::ticks_to_seconds;
use crate::service::{PlaybackService, ServiceError, ServiceResult};
use crate::synth::{LoopStart, Mark, SynthFactory};
use crate::track_table::TrackTable;
use std::io::Write;
use std::path::PathBuf;
use tempfile::TempPath;

/// Backend used for pages without a disc track.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendMode {
    /// In-process FM synthesis.
    Fm,
    /// Host MIDI playback.
    Midi,
}

impl From<bool> for BackendMode {
    /// `true` selects FM.
    fn from(use_fm: bool) -> Self {
        if use_fm {
            BackendMode::Fm
        } else {
            BackendMode::Midi
        }
    }
}

/// Observable transport state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerState {
    Stopped,
    PlayingDisc,
    PlayingFm,
    PlayingMidi,
}

/// What is currently playing.
enum Playback {
    Stopped,
    Disc { page: u16, track: u8 },
    Fm { page: u16 },
    /// The SMF handed to the host is deleted when this is dropped.
    Midi { page: u16, file: TempPath },
}

impl Playback {
    fn page(&self) -> u16 {
        match self {
            Playback::Stopped => 0,
            Playback::Disc { page, .. } | Playback::Fm { page } | Playback::Midi { page, .. } => {
                *page
            }
        }
    }

    fn state(&self) -> PlayerState {
        match self {
            Playback::Stopped => PlayerState::Stopped,
            Playback::Disc { .. } => PlayerState::PlayingDisc,
            Playback::Fm { .. } => PlayerState::PlayingFm,
            Playback::Midi { .. } => PlayerState::PlayingMidi,
        }
    }
}

/// Loaders and services the player delegates to.
pub struct Collaborators {
    pub service: Box<dyn PlaybackService>,
    pub scores: Box<dyn ScoreLoader>,
    pub sequences: Box<dyn SequenceLoader>,
    pub factory: Box<dyn SynthFactory>,
}

/// Background music player.
pub struct MusicPlayer {
    playback: Playback,
    /// One-shot: the next successful `play` starts in the loop section.
    pending_loop_override: bool,
    track_table: TrackTable,
    mode: BackendMode,
    sample_rate: u32,
    temp_dir: Option<PathBuf>,
    /// Shared with the render path; only touched under its lock.
    slot: SynthSlot,
    /// `None` when the audio device could not be opened.
    output: Option<Box<dyn AudioOutput>>,
    service: Box<dyn PlaybackService>,
    scores: Box<dyn ScoreLoader>,
    sequences: Box<dyn SequenceLoader>,
    factory: Box<dyn SynthFactory>,
}

impl MusicPlayer {
    /// Creates a player, opening its audio output with `open_output`.
    ///
    /// `open_output` receives the synth slot the output must render from. If
    /// it fails, FM playback is disabled and pages without a disc track go
    /// through the MIDI service.
    pub fn new<F>(config: &PlayerConfig, collaborators: Collaborators, open_output: F) -> Self
    where
        F: FnOnce(SynthSlot) -> Result<Box<dyn AudioOutput>>,
    {
        let slot = RenderSlot::shared();
        let output = match open_output(SynthSlot::clone(&slot)) {
            Ok(output) => Some(output),
            Err(e) => {
                tracing::warn!("Audio output disabled: {}", e);
                None
            }
        };
        let mode = if output.is_some() {
            BackendMode::from(config.use_fm)
        } else {
            BackendMode::Midi
        };

        Self {
            playback: Playback::Stopped,
            pending_loop_override: false,
            track_table: TrackTable::from_config(config),
            mode,
            sample_rate: config.sample_rate,
            temp_dir: config.temp_dir.clone(),
            slot,
            output,
            service: collaborators.service,
            scores: collaborators.scores,
            sequences: collaborators.sequences,
            factory: collaborators.factory,
        }
    }

    /// Creates a player on the default rodio output device.
    pub fn with_default_output(config: &PlayerConfig, collaborators: Collaborators) -> Self {
        let sample_rate = config.sample_rate;
        let buffer_frames = config.buffer_frames;
        Self::new(config, collaborators, |slot| {
            let output = RodioOutput::open(slot, sample_rate, buffer_frames)?;
            Ok(Box::new(output) as Box<dyn AudioOutput>)
        })
    }

    /// Page currently playing, 0 when stopped.
    pub fn current_page(&self) -> u16 {
        self.playback.page()
    }

    /// Current transport state.
    pub fn state(&self) -> PlayerState {
        self.playback.state()
    }

    /// Backend used for pages without a disc track.
    pub fn backend_mode(&self) -> BackendMode {
        self.mode
    }

    /// Returns true if the audio output opened and FM playback is possible.
    pub fn has_audio_output(&self) -> bool {
        self.output.is_some()
    }

    /// Page to disc track mapping.
    pub fn track_table(&self) -> &TrackTable {
        &self.track_table
    }

    /// Makes the next started page begin in its loop section without
    /// looping. Used when resuming a saved game.
    pub fn set_loop_override(&mut self, enabled: bool) {
        self.pending_loop_override = enabled;
    }

    /// Returns true if the loop override is still waiting to be used.
    pub fn loop_override(&self) -> bool {
        self.pending_loop_override
    }

    /// Returns true if an FM synthesizer is live.
    pub fn has_active_synth(&self) -> bool {
        lock_slot(&self.slot).is_active()
    }

    /// Starts music for `page`.
    ///
    /// Does nothing if `page` is already playing. Otherwise stops the current
    /// music and starts the page on its backend. On failure the player stays
    /// stopped.
    pub fn play(&mut self, page: u16) {
        if page == self.current_page() {
            return;
        }
        self.stop();
        if page == 0 {
            return;
        }

        match self.start(page) {
            Ok(playback) => {
                tracing::info!("Playing page {} ({:?})", page, playback.state());
                self.playback = playback;
                self.pending_loop_override = false;
            }
            Err(e) => tracing::warn!("Cannot play page {}: {}", page, e),
        }
    }

    fn start(&mut self, page: u16) -> Result<Playback> {
        let looping = !self.pending_loop_override;

        if let Some(track) = self.track_table.disc_track(page) {
            delegate("start disc track", || {
                self.service.start_disc_track(track as u32 + 1, looping)
            });
            return Ok(Playback::Disc { page, track });
        }

        match self.mode {
            BackendMode::Fm => self.start_fm(page),
            BackendMode::Midi => self.start_midi(page, looping),
        }
    }

    fn start_fm(&mut self, page: u16) -> Result<Playback> {
        let output = self
            .output
            .as_ref()
            .ok_or_else(|| MusicError::DeviceUnavailable("no audio output".into()))?;

        let data = self.scores.load_score(page)?;
        let start = if self.pending_loop_override {
            LoopStart::InLoop
        } else {
            LoopStart::FromTop
        };
        let synth = self.factory.create(&data, self.sample_rate, start)?;

        let previous = lock_slot(&self.slot).install(synth);
        drop(previous);
        output.resume();

        Ok(Playback::Fm { page })
    }

    fn start_midi(&mut self, page: u16, looping: bool) -> Result<Playback> {
        let sequence = self.sequences.load_sequence(page)?;
        tracing::debug!(
            "Page {} sequence runs {:.1}s",
            page,
            ticks_to_seconds(
                sequence.duration_ticks(),
                sequence.tempo,
                sequence.ticks_per_beat as u32
            )
        );
        let smf = sequence.to_smf(self.pending_loop_override);
        let file = self.write_transient(&smf)?;

        delegate("start MIDI", || self.service.start_midi(&file, looping));
        Ok(Playback::Midi { page, file })
    }

    fn write_transient(&self, smf: &[u8]) -> Result<TempPath> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("pagetune-").suffix(".mid");
        let mut file = match &self.temp_dir {
            Some(dir) => builder.tempfile_in(dir),
            None => builder.tempfile(),
        }
        .map_err(MusicError::TransientFile)?;

        file.write_all(smf).map_err(MusicError::TransientFile)?;
        file.flush().map_err(MusicError::TransientFile)?;
        Ok(file.into_temp_path())
    }

    /// Stops whatever is playing. Does nothing when already stopped.
    pub fn stop(&mut self) {
        match std::mem::replace(&mut self.playback, Playback::Stopped) {
            Playback::Stopped => {}
            Playback::Disc { .. } => {
                delegate("stop disc track", || self.service.stop_disc_track());
            }
            Playback::Midi { file, .. } => {
                delegate("stop MIDI", || self.service.stop_midi());
                if let Err(e) = file.close() {
                    tracing::debug!("Failed to remove temporary MIDI file: {}", e);
                }
            }
            Playback::Fm { .. } => {
                // The device must not pull from the synth while it is destroyed
                if let Some(output) = &self.output {
                    output.pause();
                }
                let mut slot = lock_slot(&self.slot);
                drop(slot.take());
            }
        }
    }

    /// Checks whether the current track has reached its end condition.
    ///
    /// Always false when stopped. For FM, true until the score has looped.
    /// For disc and MIDI, true once the service reports position zero; an
    /// unreachable service counts as still playing.
    pub fn poll(&mut self) -> bool {
        match &self.playback {
            Playback::Stopped => false,
            Playback::Fm { .. } => !lock_slot(&self.slot).mark().looped,
            Playback::Disc { .. } => {
                delegate("query disc position", || self.service.disc_position())
                    .is_some_and(|position| position == 0)
            }
            Playback::Midi { .. } => {
                delegate("query MIDI position", || self.service.midi_position())
                    .is_some_and(|position| position == 0)
            }
        }
    }

    /// Mark of the FM synthesizer, `(0, false)` for other backends.
    pub fn read_mark(&self) -> Mark {
        lock_slot(&self.slot).mark()
    }

    /// Switches between FM and MIDI, restarting the current page on the
    /// new backend.
    pub fn set_backend_mode(&mut self, mode: BackendMode) {
        if mode == self.mode {
            return;
        }
        if mode == BackendMode::Fm && self.output.is_none() {
            tracing::warn!("FM synthesis unavailable without an audio device");
            return;
        }

        let page = self.current_page();
        self.stop();
        self.mode = mode;
        tracing::info!("Synthesizer switched to {:?}", mode);
        self.play(page);
    }

    /// Sound effect playback. Not supported.
    pub fn play_pcm(&mut self, page: u16, looping: bool) {
        tracing::warn!("play_pcm({}, {}) not implemented", page, looping);
    }

    /// Sound effect playback. Not supported.
    pub fn stop_pcm(&mut self) {}

    /// Sound effect playback. Never active.
    pub fn check_pcm(&self) -> bool {
        false
    }
}

impl Drop for MusicPlayer {
    fn drop(&mut self) {
        self.stop();
        // Closing under the lock ends the render stream before the device goes
        lock_slot(&self.slot).close();
        if let Some(output) = self.output.take() {
            output.pause();
        }
    }
}

/// Runs a service call, logging and discarding failures.
fn delegate<T>(what: &str, call: impl FnOnce() -> ServiceResult<T>) -> Option<T> {
    match call() {
        Ok(value) => Some(value),
        Err(ServiceError::Unreachable) => {
            tracing::debug!("{} skipped: service unreachable", what);
            None
        }
        Err(e) => {
            tracing::warn!("{} failed: {}", what, e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::midi::{MidiSequence, SequenceTrack};
    use crate::service::NullPlaybackService;
    use crate::synth::{FmScore, FmSynthFactory, ScoreEventKind, SynthBackend};
    use std::collections::HashMap;
    use std::fs;
    use std::path::Path;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Clone, PartialEq)]
    enum Event {
        StartDisc(u32, bool),
        StopDisc,
        DiscPosition,
        StartMidi { path: PathBuf, looping: bool, smf: Vec<u8> },
        StopMidi,
        MidiPosition,
        Pause,
        Resume,
        SynthCreated(LoopStart),
        SynthDropped,
    }

    type Log = Arc<Mutex<Vec<Event>>>;

    fn record(log: &Log, event: Event) {
        log.lock().unwrap().push(event);
    }

    struct FakeService {
        log: Log,
        disc_position: Arc<AtomicU32>,
        midi_position: Arc<AtomicU32>,
    }

    impl PlaybackService for FakeService {
        fn start_disc_track(&mut self, track: u32, looping: bool) -> ServiceResult<()> {
            record(&self.log, Event::StartDisc(track, looping));
            Ok(())
        }

        fn stop_disc_track(&mut self) -> ServiceResult<()> {
            record(&self.log, Event::StopDisc);
            Ok(())
        }

        fn disc_position(&mut self) -> ServiceResult<u32> {
            record(&self.log, Event::DiscPosition);
            Ok(self.disc_position.load(Ordering::SeqCst))
        }

        fn start_midi(&mut self, path: &Path, looping: bool) -> ServiceResult<()> {
            let smf = fs::read(path).map_err(|e| ServiceError::Failed(e.to_string()))?;
            record(
                &self.log,
                Event::StartMidi {
                    path: path.to_path_buf(),
                    looping,
                    smf,
                },
            );
            Ok(())
        }

        fn stop_midi(&mut self) -> ServiceResult<()> {
            record(&self.log, Event::StopMidi);
            Ok(())
        }

        fn midi_position(&mut self) -> ServiceResult<u32> {
            record(&self.log, Event::MidiPosition);
            Ok(self.midi_position.load(Ordering::SeqCst))
        }
    }

    struct FakeOutput {
        log: Log,
    }

    impl AudioOutput for FakeOutput {
        fn pause(&self) {
            record(&self.log, Event::Pause);
        }

        fn resume(&self) {
            record(&self.log, Event::Resume);
        }
    }

    struct StubSynth {
        log: Log,
        looped: Arc<AtomicBool>,
    }

    impl SynthBackend for StubSynth {
        fn render(&mut self, out: &mut [i16]) {
            out.fill(1);
        }

        fn mark(&self) -> Mark {
            Mark {
                mark: 42,
                looped: self.looped.load(Ordering::SeqCst),
            }
        }
    }

    impl Drop for StubSynth {
        fn drop(&mut self) {
            record(&self.log, Event::SynthDropped);
        }
    }

    struct StubFactory {
        log: Log,
        looped: Arc<AtomicBool>,
    }

    impl SynthFactory for StubFactory {
        fn create(
            &self,
            data: &[u8],
            _sample_rate: u32,
            start: LoopStart,
        ) -> Result<Box<dyn SynthBackend>> {
            if data.is_empty() {
                return Err(MusicError::Decode("empty score".into()));
            }
            record(&self.log, Event::SynthCreated(start));
            Ok(Box::new(StubSynth {
                log: Arc::clone(&self.log),
                looped: Arc::clone(&self.looped),
            }))
        }
    }

    struct FakeScores(HashMap<u16, Vec<u8>>);

    impl ScoreLoader for FakeScores {
        fn load_score(&self, page: u16) -> Result<Vec<u8>> {
            self.0
                .get(&page)
                .cloned()
                .ok_or(MusicError::DataUnavailable { page })
        }
    }

    struct FakeSequences(HashMap<u16, MidiSequence>);

    impl SequenceLoader for FakeSequences {
        fn load_sequence(&self, page: u16) -> Result<MidiSequence> {
            self.0
                .get(&page)
                .cloned()
                .ok_or(MusicError::DataUnavailable { page })
        }
    }

    struct Harness {
        log: Log,
        disc_position: Arc<AtomicU32>,
        midi_position: Arc<AtomicU32>,
        looped: Arc<AtomicBool>,
    }

    impl Harness {
        fn events(&self) -> Vec<Event> {
            self.log.lock().unwrap().clone()
        }

        fn clear(&self) {
            self.log.lock().unwrap().clear();
        }
    }

    fn sample_sequence() -> MidiSequence {
        let mut seq = MidiSequence::new();
        let mut track = SequenceTrack::new("theme");
        track.add_note(0, 60, 100, 0, 480);
        track.add_note(0, 64, 100, 960, 480);
        seq.tracks.push(track);
        seq.loop_tick = Some(960);
        seq
    }

    fn test_config(use_fm: bool) -> PlayerConfig {
        let mut config = PlayerConfig {
            use_fm,
            ..PlayerConfig::default()
        };
        config.disc_tracks.insert(5, 3);
        config.disc_tracks.insert(99, 8);
        config
    }

    fn collaborators(harness: &Harness) -> Collaborators {
        let mut scores = HashMap::new();
        scores.insert(101, vec![1, 2, 3]);
        scores.insert(20, vec![4, 5, 6]);
        scores.insert(30, vec![7]);
        scores.insert(21, Vec::new());

        let mut sequences = HashMap::new();
        sequences.insert(30, sample_sequence());
        sequences.insert(101, sample_sequence());

        Collaborators {
            service: Box::new(FakeService {
                log: Arc::clone(&harness.log),
                disc_position: Arc::clone(&harness.disc_position),
                midi_position: Arc::clone(&harness.midi_position),
            }),
            scores: Box::new(FakeScores(scores)),
            sequences: Box::new(FakeSequences(sequences)),
            factory: Box::new(StubFactory {
                log: Arc::clone(&harness.log),
                looped: Arc::clone(&harness.looped),
            }),
        }
    }

    fn harness() -> Harness {
        Harness {
            log: Arc::new(Mutex::new(Vec::new())),
            disc_position: Arc::new(AtomicU32::new(0)),
            midi_position: Arc::new(AtomicU32::new(0)),
            looped: Arc::new(AtomicBool::new(false)),
        }
    }

    fn build(config: &PlayerConfig) -> (MusicPlayer, Harness) {
        let harness = harness();
        let log = Arc::clone(&harness.log);
        let player = MusicPlayer::new(config, collaborators(&harness), move |_slot| {
            Ok(Box::new(FakeOutput { log }) as Box<dyn AudioOutput>)
        });
        (player, harness)
    }

    fn build_without_device(config: &PlayerConfig) -> (MusicPlayer, Harness) {
        let harness = harness();
        let player = MusicPlayer::new(config, collaborators(&harness), |_slot| {
            Err(MusicError::DeviceUnavailable("no device".into()))
        });
        (player, harness)
    }

    fn assert_invariant(player: &MusicPlayer) {
        assert_eq!(
            player.has_active_synth(),
            player.state() == PlayerState::PlayingFm
        );
        if player.current_page() == 0 {
            assert_eq!(player.state(), PlayerState::Stopped);
        }
    }

    #[test]
    fn test_disc_page_routes_track_plus_one() {
        let (mut player, harness) = build(&test_config(true));
        player.play(5);

        assert_eq!(harness.events(), vec![Event::StartDisc(4, true)]);
        assert_eq!(player.state(), PlayerState::PlayingDisc);
        assert_eq!(player.current_page(), 5);
        assert_invariant(&player);
    }

    #[test]
    fn test_play_same_page_is_noop() {
        let (mut player, harness) = build(&test_config(true));
        player.play(101);
        player.play(101);

        assert_eq!(
            harness.events(),
            vec![Event::SynthCreated(LoopStart::FromTop), Event::Resume]
        );

        harness.clear();
        player.play(5);
        player.play(5);
        let starts = harness
            .events()
            .iter()
            .filter(|e| matches!(e, Event::StartDisc(..)))
            .count();
        assert_eq!(starts, 1);
    }

    #[test]
    fn test_high_page_plays_fm() {
        let (mut player, harness) = build(&test_config(true));
        assert!(!player.track_table.clone().set(101, 3));

        player.play(101);

        assert_eq!(player.state(), PlayerState::PlayingFm);
        assert_eq!(player.current_page(), 101);
        assert!(player.has_active_synth());
        assert!(!harness
            .events()
            .iter()
            .any(|e| matches!(e, Event::StartDisc(..))));
        assert_invariant(&player);
    }

    #[test]
    fn test_missing_data_leaves_player_stopped() {
        let (mut player, harness) = build(&test_config(true));
        player.play(7);

        assert_eq!(player.current_page(), 0);
        assert_eq!(player.state(), PlayerState::Stopped);
        assert!(!player.has_active_synth());
        assert!(harness.events().is_empty());
    }

    #[test]
    fn test_undecodable_score_leaves_player_stopped() {
        let (mut player, harness) = build(&test_config(true));
        player.play(21);

        assert_eq!(player.current_page(), 0);
        assert!(harness.events().is_empty());
    }

    /// Player wired to the real FM factory. Page 102 holds a score whose
    /// ticks are shorter than a sample; page 103 a playable one.
    fn build_with_fm_scores(config: &PlayerConfig) -> (MusicPlayer, Harness) {
        let harness = harness();
        let mut fast = FmScore::new(1_000_000_000, 1_000_000_000);
        fast.push(0, ScoreEventKind::Mark(1));
        fast.end_tick = 1000;
        let mut steady = FmScore::new(120, 24);
        steady.push(0, ScoreEventKind::Mark(1));

        let mut scores = HashMap::new();
        scores.insert(102, bincode::serialize(&fast).unwrap());
        scores.insert(103, steady.to_bytes().unwrap());

        let collaborators = Collaborators {
            factory: Box::new(FmSynthFactory),
            scores: Box::new(FakeScores(scores)),
            ..collaborators(&harness)
        };
        let log = Arc::clone(&harness.log);
        let player = MusicPlayer::new(config, collaborators, move |_slot| {
            Ok(Box::new(FakeOutput { log }) as Box<dyn AudioOutput>)
        });
        (player, harness)
    }

    #[test]
    fn test_unplayable_tick_rate_leaves_player_stopped() {
        let (mut player, harness) = build_with_fm_scores(&test_config(true));
        player.play(102);

        assert_eq!(player.current_page(), 0);
        assert!(!player.has_active_synth());
        assert!(harness.events().is_empty());

        player.play(103);
        assert_eq!(player.state(), PlayerState::PlayingFm);
        assert!(player.has_active_synth());
        assert_invariant(&player);
    }

    #[test]
    fn test_zero_sample_rate_leaves_player_stopped() {
        let config = PlayerConfig {
            sample_rate: 0,
            ..test_config(true)
        };
        let (mut player, harness) = build_with_fm_scores(&config);
        player.play(103);

        assert_eq!(player.current_page(), 0);
        assert!(!player.has_active_synth());
        assert!(harness.events().is_empty());
    }

    #[test]
    fn test_failed_play_after_playing_is_stopped() {
        let (mut player, harness) = build(&test_config(true));
        player.play(101);
        harness.clear();

        player.play(7);

        assert_eq!(harness.events(), vec![Event::Pause, Event::SynthDropped]);
        assert_eq!(player.current_page(), 0);
        assert_invariant(&player);
    }

    #[test]
    fn test_stop_when_stopped_is_noop() {
        let (mut player, harness) = build(&test_config(true));
        player.stop();
        assert!(harness.events().is_empty());
    }

    #[test]
    fn test_stop_fm_pauses_before_destroying() {
        let (mut player, harness) = build(&test_config(true));
        player.play(101);
        harness.clear();

        player.stop();

        assert_eq!(harness.events(), vec![Event::Pause, Event::SynthDropped]);
        assert_eq!(player.current_page(), 0);
        assert_invariant(&player);
    }

    #[test]
    fn test_stop_disc() {
        let (mut player, harness) = build(&test_config(true));
        player.play(99);
        player.stop();

        assert_eq!(
            harness.events(),
            vec![Event::StartDisc(9, true), Event::StopDisc]
        );
    }

    #[test]
    fn test_loop_override_consumed_once() {
        let (mut player, harness) = build(&test_config(true));
        player.set_loop_override(true);
        player.play(5);
        assert!(!player.loop_override());
        player.stop();
        player.play(5);

        assert_eq!(
            harness.events(),
            vec![
                Event::StartDisc(4, false),
                Event::StopDisc,
                Event::StartDisc(4, true)
            ]
        );
    }

    #[test]
    fn test_loop_override_starts_fm_in_loop() {
        let (mut player, harness) = build(&test_config(true));
        player.set_loop_override(true);
        player.play(20);

        assert_eq!(
            harness.events(),
            vec![Event::SynthCreated(LoopStart::InLoop), Event::Resume]
        );
    }

    #[test]
    fn test_failed_play_keeps_loop_override() {
        let (mut player, _harness) = build(&test_config(true));
        player.set_loop_override(true);
        player.play(7);
        assert!(player.loop_override());
    }

    #[test]
    fn test_midi_page_writes_transient_file() {
        let (mut player, harness) = build(&test_config(false));
        player.play(30);

        assert_eq!(player.state(), PlayerState::PlayingMidi);
        let events = harness.events();
        let Some(Event::StartMidi { path, looping, smf }) = events.first() else {
            panic!("expected StartMidi, got {:?}", events);
        };
        assert!(*looping);
        assert_eq!(*smf, sample_sequence().to_smf(false));
        assert!(midly::Smf::parse(smf).is_ok());
        assert!(path.exists());

        player.stop();
        assert_eq!(harness.events().last(), Some(&Event::StopMidi));
        assert!(!path.exists());
        assert_invariant(&player);
    }

    #[test]
    fn test_midi_loop_override() {
        let (mut player, harness) = build(&test_config(false));
        player.set_loop_override(true);
        player.play(30);

        let events = harness.events();
        let Some(Event::StartMidi { looping, smf, .. }) = events.first() else {
            panic!("expected StartMidi, got {:?}", events);
        };
        assert!(!*looping);
        assert_eq!(*smf, sample_sequence().to_smf(true));
    }

    #[test]
    fn test_transient_file_failure_is_silent() {
        let mut config = test_config(false);
        config.temp_dir = Some(PathBuf::from("/nonexistent/pagetune/tmp"));
        let (mut player, harness) = build(&config);

        player.play(30);

        assert_eq!(player.current_page(), 0);
        assert!(harness.events().is_empty());
    }

    #[test]
    fn test_mode_switch_restarts_current_page() {
        let (mut player, harness) = build(&test_config(true));
        player.play(101);
        harness.clear();

        player.set_backend_mode(BackendMode::Midi);

        assert_eq!(player.current_page(), 101);
        assert_eq!(player.state(), PlayerState::PlayingMidi);
        let events = harness.events();
        assert_eq!(events[..2], [Event::Pause, Event::SynthDropped]);
        assert!(matches!(events[2], Event::StartMidi { .. }));
        assert_invariant(&player);

        harness.clear();
        player.set_backend_mode(BackendMode::Fm);
        assert_eq!(player.state(), PlayerState::PlayingFm);
        assert_eq!(player.current_page(), 101);
        assert_eq!(
            harness.events(),
            vec![
                Event::StopMidi,
                Event::SynthCreated(LoopStart::FromTop),
                Event::Resume
            ]
        );
        assert_invariant(&player);
    }

    #[test]
    fn test_mode_switch_same_mode_is_noop() {
        let (mut player, harness) = build(&test_config(true));
        player.play(101);
        harness.clear();

        player.set_backend_mode(BackendMode::Fm);
        assert!(harness.events().is_empty());
    }

    #[test]
    fn test_mode_switch_while_stopped() {
        let (mut player, harness) = build(&test_config(true));
        player.set_backend_mode(BackendMode::Midi);

        assert_eq!(player.backend_mode(), BackendMode::Midi);
        assert_eq!(player.state(), PlayerState::Stopped);
        assert!(harness.events().is_empty());
    }

    #[test]
    fn test_poll_stopped_is_false() {
        let (mut player, harness) = build(&test_config(true));
        assert!(!player.poll());
        assert!(harness.events().is_empty());
    }

    #[test]
    fn test_poll_fm_follows_loop_flag() {
        let (mut player, harness) = build(&test_config(true));
        player.play(101);

        assert!(player.poll());
        harness.looped.store(true, Ordering::SeqCst);
        assert!(!player.poll());
    }

    #[test]
    fn test_poll_disc_and_midi_positions() {
        let (mut player, harness) = build(&test_config(true));
        player.play(5);

        harness.disc_position.store(1500, Ordering::SeqCst);
        assert!(!player.poll());
        harness.disc_position.store(0, Ordering::SeqCst);
        assert!(player.poll());

        player.set_backend_mode(BackendMode::Midi);
        player.play(30);
        harness.midi_position.store(10, Ordering::SeqCst);
        assert!(!player.poll());
        harness.midi_position.store(0, Ordering::SeqCst);
        assert!(player.poll());
        assert_eq!(harness.events().last(), Some(&Event::MidiPosition));
    }

    #[test]
    fn test_read_mark_only_for_fm() {
        let (mut player, harness) = build(&test_config(true));
        assert_eq!(player.read_mark(), Mark::default());

        player.play(101);
        harness.looped.store(true, Ordering::SeqCst);
        assert_eq!(
            player.read_mark(),
            Mark {
                mark: 42,
                looped: true
            }
        );

        player.play(5);
        assert_eq!(player.read_mark(), Mark::default());
    }

    #[test]
    fn test_device_unavailable_forces_midi() {
        let (mut player, harness) = build_without_device(&test_config(true));
        assert!(!player.has_audio_output());
        assert_eq!(player.backend_mode(), BackendMode::Midi);

        player.set_backend_mode(BackendMode::Fm);
        assert_eq!(player.backend_mode(), BackendMode::Midi);

        player.play(101);
        assert_eq!(player.state(), PlayerState::PlayingMidi);
        assert!(matches!(harness.events()[0], Event::StartMidi { .. }));
        assert_invariant(&player);
    }

    #[test]
    fn test_unreachable_service_still_updates_state() {
        let harness = harness();
        let mut collaborators = collaborators(&harness);
        collaborators.service = Box::new(NullPlaybackService);
        let log = Arc::clone(&harness.log);
        let mut player = MusicPlayer::new(&test_config(true), collaborators, move |_slot| {
            Ok(Box::new(FakeOutput { log }) as Box<dyn AudioOutput>)
        });

        player.play(5);
        assert_eq!(player.current_page(), 5);
        assert!(!player.poll());

        player.stop();
        assert_eq!(player.current_page(), 0);
    }

    #[test]
    fn test_drop_closes_render_slot() {
        let (mut player, harness) = build(&test_config(true));
        player.play(101);
        let slot = SynthSlot::clone(&player.slot);
        harness.clear();

        drop(player);

        assert!(lock_slot(&slot).is_closed());
        assert!(!lock_slot(&slot).is_active());
        assert_eq!(
            harness.events(),
            vec![Event::Pause, Event::SynthDropped, Event::Pause]
        );
    }

    #[test]
    fn test_invariant_over_sequence() {
        let (mut player, _harness) = build(&test_config(true));
        for page in [5, 101, 101, 7, 20, 30, 0, 99, 20] {
            player.play(page);
            assert_invariant(&player);
            player.poll();
        }
        player.set_backend_mode(BackendMode::Midi);
        assert_invariant(&player);
        player.play(101);
        player.set_backend_mode(BackendMode::Fm);
        assert_invariant(&player);
        player.stop();
        assert_invariant(&player);
    }

    #[test]
    fn test_pcm_stubs() {
        let (mut player, harness) = build(&test_config(true));
        player.play_pcm(3, true);
        player.stop_pcm();
        assert!(!player.check_pcm());
        assert!(harness.events().is_empty());
    }
}
