//! Player configuration.
//!
//! Stored as pretty JSON, the same way projects are saved. Every field has a
//! default so a partial file (or no file at all) is valid.

use crate::error::{MusicError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Output sample rate of the audio device.
pub const SAMPLE_RATE: u32 = 44100;

/// Frames per render callback. Matches the device buffer requested at startup.
pub const DEFAULT_BUFFER_FRAMES: usize = 4096;

/// Highest page number that may be mapped to a disc track.
pub const MAX_DISC_PAGE: u16 = 99;

/// Settings for a [`MusicPlayer`](crate::player::MusicPlayer) and the
/// collaborators wired up by the binary.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// Use the FM synthesizer for pages without a disc track.
    /// When false, those pages are played through the MIDI service.
    pub use_fm: bool,

    /// Output sample rate in Hz.
    pub sample_rate: u32,

    /// Frames rendered per device callback.
    pub buffer_frames: usize,

    /// Directory holding `NNN.fm`, `NNN.seq` and `NNN.mid` page data.
    pub music_dir: PathBuf,

    /// Directory holding ripped disc tracks (`trackNN.wav` etc).
    pub disc_dir: PathBuf,

    /// SoundFont used by the local MIDI service.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub soundfont: Option<PathBuf>,

    /// Where transient MIDI files are written. System temp dir if unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temp_dir: Option<PathBuf>,

    /// Page number → disc track number. Pages must be in `1..=99`.
    pub disc_tracks: BTreeMap<u16, u8>,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            use_fm: true,
            sample_rate: SAMPLE_RATE,
            buffer_frames: DEFAULT_BUFFER_FRAMES,
            music_dir: PathBuf::from("music"),
            disc_dir: PathBuf::from("disc"),
            soundfont: None,
            temp_dir: None,
            disc_tracks: BTreeMap::new(),
        }
    }
}

impl PlayerConfig {
    /// Parses a configuration from a JSON string and validates it.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| MusicError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Loads a configuration file.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read, is not valid JSON, or maps a
    /// page outside `1..=99` to a disc track.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let json = fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Saves the configuration as pretty JSON.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json =
            serde_json::to_string_pretty(self).map_err(|e| MusicError::Config(e.to_string()))?;
        fs::write(path, json)?;
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            return Err(MusicError::Config("sample_rate must be nonzero".into()));
        }
        if self.buffer_frames == 0 {
            return Err(MusicError::Config("buffer_frames must be nonzero".into()));
        }
        if let Some(page) = self
            .disc_tracks
            .keys()
            .find(|&&p| p == 0 || p > MAX_DISC_PAGE)
        {
            return Err(MusicError::Config(format!(
                "disc track mapped to page {}, expected 1..={}",
                page, MAX_DISC_PAGE
            )));
        }
        Ok(())
    }
}
