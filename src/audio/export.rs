//! Offline rendering of FM pages to WAV.
//!
//! Runs a synthesizer backend outside the real-time path and writes its
//! output to a 16-bit stereo WAV file. Useful for checking a score without
//! an audio device.

use crate::error::{MusicError, Result};
use crate::synth::{LoopStart, SynthFactory};
use hound::{SampleFormat, WavSpec, WavWriter};
use std::path::Path;

/// Frames rendered per chunk.
const RENDER_BUFFER_FRAMES: usize = 4096;

/// Renders score bytes to a WAV file.
///
/// Rendering stops when the backend reports that it has looped, or after
/// `max_seconds`, whichever comes first.
///
/// # Arguments
///
/// * `data` - Encoded score for the factory
/// * `factory` - Builds the synthesizer backend
/// * `sample_rate` - Output sample rate in Hz
/// * `output_path` - Path for the output WAV file
/// * `max_seconds` - Upper bound on the rendered length
/// * `progress_callback` - Optional callback for progress updates (0.0 to 1.0)
///
/// # Returns
///
/// Number of frames written.
///
/// # Errors
///
/// Returns error if the score cannot be decoded or the file cannot be written.
pub fn render_score_to_wav<P, F>(
    data: &[u8],
    factory: &dyn SynthFactory,
    sample_rate: u32,
    output_path: P,
    max_seconds: f64,
    mut progress_callback: Option<F>,
) -> Result<usize>
where
    P: AsRef<Path>,
    F: FnMut(f32),
{
    let mut synth = factory.create(data, sample_rate, LoopStart::FromTop)?;

    let spec = WavSpec {
        channels: 2,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut writer = WavWriter::create(output_path.as_ref(), spec).map_err(wav_error)?;

    let total_frames = (max_seconds.max(0.0) * sample_rate as f64) as usize;
    let mut buffer = vec![0i16; RENDER_BUFFER_FRAMES * 2];
    let mut written = 0usize;

    while written < total_frames && !synth.mark().looped {
        let frames = (total_frames - written).min(RENDER_BUFFER_FRAMES);
        let chunk = &mut buffer[..frames * 2];
        synth.render(chunk);
        for &sample in chunk.iter() {
            writer.write_sample(sample).map_err(wav_error)?;
        }
        written += frames;

        if let Some(ref mut callback) = progress_callback {
            callback(written as f32 / total_frames as f32);
        }
    }

    writer.finalize().map_err(wav_error)?;
    Ok(written)
}

fn wav_error(e: hound::Error) -> MusicError {
    match e {
        hound::Error::IoError(io) => MusicError::Io(io),
        other => MusicError::Io(std::io::Error::new(std::io::ErrorKind::Other, other)),
    }
}
