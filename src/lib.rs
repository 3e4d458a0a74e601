//! pagetune - background music for page-scripted games.
//!
//! Scripts request music by page number. Each page is played from a disc
//! track, an FM score rendered in-process, or a MIDI sequence handed to the
//! host player, depending on the track table and the selected synthesizer.

pub mod archive;
pub mod audio;
pub mod config;
pub mod error;
pub mod midi;
pub mod player;
pub mod service;
pub mod synth;
pub mod track_table;
pub mod trigger;

// Re-export commonly used types
pub use archive::{MusicArchive, ScoreLoader, SequenceLoader};
pub use config::PlayerConfig;
pub use error::MusicError;
pub use player::{BackendMode, Collaborators, MusicPlayer, PlayerState};
pub use service::{LocalPlaybackService, NullPlaybackService, PlaybackService};
pub use synth::{FmSynthFactory, Mark, SynthBackend, SynthFactory};
pub use track_table::TrackTable;
pub use trigger::SynthesizerSwitch;
