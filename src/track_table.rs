//! Static page → disc track mapping.

use crate::config::{PlayerConfig, MAX_DISC_PAGE};

/// Maps music pages `1..=99` to disc track numbers.
///
/// A zero entry means the page has no disc track and is synthesized.
/// Pages of 100 and above are never routed to disc.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackTable {
    tracks: [u8; MAX_DISC_PAGE as usize + 1],
}

impl TrackTable {
    /// Creates a table with no disc tracks.
    pub fn new() -> Self {
        Self {
            tracks: [0; MAX_DISC_PAGE as usize + 1],
        }
    }

    /// Builds the table from the `disc_tracks` map of a configuration.
    ///
    /// Entries outside `1..=99` are ignored; [`PlayerConfig::load`] already
    /// rejects them.
    pub fn from_config(config: &PlayerConfig) -> Self {
        let mut table = Self::new();
        for (&page, &track) in &config.disc_tracks {
            table.set(page, track);
        }
        table
    }

    /// Assigns a disc track to a page. Returns false if the page cannot
    /// carry a disc track.
    pub fn set(&mut self, page: u16, track: u8) -> bool {
        if page == 0 || page > MAX_DISC_PAGE {
            return false;
        }
        self.tracks[page as usize] = track;
        true
    }

    /// Returns the disc track for a page, or `None` if it is synthesized.
    pub fn disc_track(&self, page: u16) -> Option<u8> {
        if page > MAX_DISC_PAGE {
            return None;
        }
        match self.tracks[page as usize] {
            0 => None,
            track => Some(track),
        }
    }
}

impl Default for TrackTable {
    fn default() -> Self {
        Self::new()
    }
}
