//! pagetune - play a music page from the command line.
//!
//! Plays one page through the same player the engine uses, until its first
//! pass finishes or a time limit is reached.
//!
//! # Usage
//!
//! ```bash
//! pagetune 12                              # play page 12
//! pagetune --config game.json --midi 101   # force the MIDI backend
//! pagetune --resume 12                     # start in the loop section
//! pagetune --switch-after 10 101           # flip FM/MIDI after 10 seconds
//! pagetune --render page101.wav 101        # render the FM score to WAV
//! ```
//!
//! Set `RUST_LOG=debug` for player logging.

use anyhow::{bail, Context, Result};
use pagetune::audio::render_score_to_wav;
use pagetune::{
    BackendMode, Collaborators, FmSynthFactory, LocalPlaybackService, MusicArchive, MusicPlayer,
    NullPlaybackService, PlaybackService, PlayerConfig, PlayerState, ScoreLoader,
    SynthesizerSwitch,
};
use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

/// How often the player is polled.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Default upper bound on playback and render length.
const DEFAULT_MAX_SECS: f64 = 600.0;

/// Command-line options for the application.
struct CliOptions {
    /// Player configuration file.
    config: Option<PathBuf>,
    /// Use MIDI instead of FM for synthesized pages.
    midi: bool,
    /// Start in the loop section (resume semantics).
    resume: bool,
    /// Flip the synthesizer after this long.
    switch_after: Option<Duration>,
    /// Stop after this many seconds.
    max_secs: f64,
    /// Render the page's FM score to this WAV file instead of playing.
    render: Option<PathBuf>,
    /// Music page to play.
    page: u16,
}

impl CliOptions {
    /// Parses command-line arguments.
    fn parse() -> Result<Self> {
        let args: Vec<String> = std::env::args().collect();
        let mut config = None;
        let mut midi = false;
        let mut resume = false;
        let mut switch_after = None;
        let mut max_secs = DEFAULT_MAX_SECS;
        let mut render = None;
        let mut page = None;
        let mut i = 1;

        while i < args.len() {
            match args[i].as_str() {
                "--config" | "-c" => {
                    i += 1;
                    config = Some(PathBuf::from(arg_value(&args, i, "--config")?));
                }
                "--midi" => midi = true,
                "--resume" => resume = true,
                "--switch-after" => {
                    i += 1;
                    let secs: f64 = arg_value(&args, i, "--switch-after")?
                        .parse()
                        .context("--switch-after expects seconds")?;
                    switch_after = Some(Duration::from_secs_f64(secs.max(0.0)));
                }
                "--max-secs" => {
                    i += 1;
                    max_secs = arg_value(&args, i, "--max-secs")?
                        .parse()
                        .context("--max-secs expects seconds")?;
                }
                "--render" => {
                    i += 1;
                    render = Some(PathBuf::from(arg_value(&args, i, "--render")?));
                }
                "--help" | "-h" => {
                    print_help(&args);
                    std::process::exit(0);
                }
                other => {
                    let parsed = other
                        .parse::<u16>()
                        .with_context(|| format!("Unknown option: {}", other))?;
                    page = Some(parsed);
                }
            }
            i += 1;
        }

        let Some(page) = page else {
            print_help(&args);
            bail!("no page given");
        };

        Ok(Self {
            config,
            midi,
            resume,
            switch_after,
            max_secs,
            render,
            page,
        })
    }
}

fn arg_value<'a>(args: &'a [String], i: usize, flag: &str) -> Result<&'a String> {
    args.get(i)
        .with_context(|| format!("{} requires an argument", flag))
}

fn print_help(args: &[String]) {
    eprintln!("pagetune - play a background music page");
    eprintln!();
    eprintln!(
        "Usage: {} [OPTIONS] PAGE",
        args.first().map(String::as_str).unwrap_or("pagetune")
    );
    eprintln!();
    eprintln!("Options:");
    eprintln!("  -c, --config PATH       Player configuration (JSON)");
    eprintln!("      --midi              Use MIDI instead of FM synthesis");
    eprintln!("      --resume            Start in the loop section, without looping");
    eprintln!("      --switch-after SECS Flip between FM and MIDI after SECS");
    eprintln!("      --max-secs SECS     Stop after SECS (default 600)");
    eprintln!("      --render PATH       Render the FM score to a WAV file and exit");
    eprintln!("  -h, --help              Print this help message");
}

/// Main entry point.
fn main() -> Result<()> {
    let cli = CliOptions::parse()?;

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let mut config = match &cli.config {
        Some(path) => PlayerConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => PlayerConfig::default(),
    };
    if cli.midi {
        config.use_fm = false;
    }
    let archive = MusicArchive::new(&config.music_dir);

    if let Some(output) = &cli.render {
        let data = archive
            .load_score(cli.page)
            .with_context(|| format!("No FM score for page {}", cli.page))?;
        let frames = render_score_to_wav(
            &data,
            &FmSynthFactory,
            config.sample_rate,
            output,
            cli.max_secs,
            None::<fn(f32)>,
        )
        .context("Render failed")?;
        tracing::info!("Wrote {} frames to {}", frames, output.display());
        return Ok(());
    }

    let service: Box<dyn PlaybackService> = match LocalPlaybackService::new(
        &config.disc_dir,
        config.soundfont.as_deref(),
        config.sample_rate,
    ) {
        Ok(service) => Box::new(service),
        Err(e) => {
            tracing::warn!("Disc and MIDI playback unavailable: {}", e);
            Box::new(NullPlaybackService)
        }
    };
    let collaborators = Collaborators {
        service,
        scores: Box::new(archive.clone()),
        sequences: Box::new(archive),
        factory: Box::new(FmSynthFactory),
    };

    let mut player = MusicPlayer::with_default_output(&config, collaborators);
    player.set_loop_override(cli.resume);
    player.play(cli.page);
    if player.current_page() == 0 {
        bail!("page {} could not be played", cli.page);
    }

    let started = Instant::now();
    let limit = Duration::from_secs_f64(cli.max_secs.max(0.0));
    let mut switch_after = cli.switch_after;
    let mut last_mark = player.read_mark();

    while started.elapsed() < limit {
        thread::sleep(POLL_INTERVAL);

        if switch_after.is_some_and(|after| started.elapsed() >= after) {
            switch_after = None;
            let use_fm = player.backend_mode() != BackendMode::Fm;
            SynthesizerSwitch::new(&mut player).select_synthesizer(use_fm);
        }

        let mark = player.read_mark();
        if mark != last_mark {
            tracing::debug!("Mark {} (looped: {})", mark.mark, mark.looped);
            last_mark = mark;
        }

        let finished = match player.state() {
            PlayerState::Stopped => true,
            PlayerState::PlayingFm => mark.looped,
            PlayerState::PlayingDisc | PlayerState::PlayingMidi => player.poll(),
        };
        if finished {
            tracing::info!("Page {} finished", cli.page);
            break;
        }
    }

    player.stop();
    Ok(())
}
