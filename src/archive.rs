//! Page data loaders.
//!
//! The player asks for data by page number through [`ScoreLoader`] and
//! [`SequenceLoader`]. [`MusicArchive`] implements both over a directory:
//!
//! ```text
//! music/
//!   001.fm    bincode FmScore for page 1
//!   001.seq   bincode MidiSequence for page 1
//!   102.mid   Standard MIDI File for page 102
//! ```

use crate::error::{MusicError, Result};
use crate::midi::MidiSequence;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Supplies FM score data for a page.
pub trait ScoreLoader {
    /// Returns the encoded score for `page`.
    ///
    /// # Errors
    ///
    /// [`MusicError::DataUnavailable`] if the page has no score.
    fn load_score(&self, page: u16) -> Result<Vec<u8>>;
}

/// Supplies decoded MIDI sequences for a page.
pub trait SequenceLoader {
    /// Returns the decoded sequence for `page`.
    ///
    /// # Errors
    ///
    /// [`MusicError::DataUnavailable`] if the page has no sequence,
    /// [`MusicError::SequenceLoad`] if it exists but does not parse.
    fn load_sequence(&self, page: u16) -> Result<MidiSequence>;
}

/// Directory of per-page music files.
#[derive(Debug, Clone)]
pub struct MusicArchive {
    dir: PathBuf,
}

impl MusicArchive {
    /// Opens an archive rooted at `dir`. The directory is not read until a
    /// page is requested.
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    /// Path of a page file with the given extension.
    pub fn page_path(&self, page: u16, extension: &str) -> PathBuf {
        self.dir.join(format!("{:03}.{}", page, extension))
    }

    /// Reads a page file, or `None` if it does not exist.
    fn read_page(&self, page: u16, extension: &str) -> Result<Option<Vec<u8>>> {
        match fs::read(self.page_path(page, extension)) {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

impl ScoreLoader for MusicArchive {
    fn load_score(&self, page: u16) -> Result<Vec<u8>> {
        self.read_page(page, "fm")?
            .ok_or(MusicError::DataUnavailable { page })
    }
}

impl SequenceLoader for MusicArchive {
    fn load_sequence(&self, page: u16) -> Result<MidiSequence> {
        if let Some(data) = self.read_page(page, "seq")? {
            return MidiSequence::from_bytes(&data).map_err(|e| MusicError::SequenceLoad {
                page,
                reason: e.to_string(),
            });
        }
        if let Some(data) = self.read_page(page, "mid")? {
            return MidiSequence::from_smf(&data).map_err(|e| MusicError::SequenceLoad {
                page,
                reason: e.to_string(),
            });
        }
        Err(MusicError::DataUnavailable { page })
    }
}
