//! Runtime synthesizer selection.
//!
//! The host UI flips between FM and MIDI playback through a
//! [`SynthesizerSwitch`], which holds the player it controls instead of
//! reaching for a process-wide instance.

use crate::player::{BackendMode, MusicPlayer};
use std::ops::DerefMut;

/// Entry point for switching the synthesis backend from outside the engine.
///
/// Generic over how the player is held: `&mut MusicPlayer`, a `Box`, a
/// `RefMut` or a mutex guard all work.
pub struct SynthesizerSwitch<P> {
    player: P,
}

impl<P> SynthesizerSwitch<P>
where
    P: DerefMut<Target = MusicPlayer>,
{
    /// Wraps a handle to the player.
    pub fn new(player: P) -> Self {
        Self { player }
    }

    /// Selects FM (`true`) or MIDI (`false`) synthesis. The current page,
    /// if any, restarts on the new backend.
    pub fn select_synthesizer(&mut self, use_fm: bool) {
        self.player.set_backend_mode(BackendMode::from(use_fm));
    }

    /// Returns true if FM synthesis is selected.
    pub fn uses_fm(&self) -> bool {
        self.player.backend_mode() == BackendMode::Fm
    }

    /// Releases the player handle.
    pub fn into_inner(self) -> P {
        self.player
    }
}
