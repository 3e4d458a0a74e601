//! Audio output for the FM backend.
//!
//! - `render`: the shared synthesizer slot and the rodio source that pulls from it
//! - `device`: the pausable output device
//! - `export`: offline rendering to WAV

pub mod device;
pub mod export;
pub mod render;

pub use device::{AudioOutput, RodioOutput};
pub use export::render_score_to_wav;
pub use render::{lock_slot, RenderSlot, RenderSource, SynthSlot};
