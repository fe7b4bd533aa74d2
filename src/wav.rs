//! WAV capture loading
//!
//! Reads the first channel of a recording into a [`SampleBuffer`]. Integer
//! formats are scaled to [-1, 1); float formats are taken as-is.

use anyhow::{Context, Result};
use hound::{SampleFormat, WavReader};
use mictester_core::SampleBuffer;
use std::path::Path;

/// Load the first channel of a WAV file
pub fn load_capture(path: &Path) -> Result<SampleBuffer> {
    let mut reader = WavReader::open(path)
        .with_context(|| format!("Failed to open WAV file {}", path.display()))?;
    let spec = reader.spec();
    let channels = spec.channels.max(1) as usize;

    let interleaved: Vec<f32> = match spec.sample_format {
        SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<Result<_, _>>()
            .with_context(|| format!("Corrupt sample data in {}", path.display()))?,
        SampleFormat::Int => {
            let scale = (1i64 << (spec.bits_per_sample.clamp(1, 32) - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<Result<_, _>>()
                .with_context(|| format!("Corrupt sample data in {}", path.display()))?
        }
    };

    let samples: Vec<f32> = interleaved.into_iter().step_by(channels).collect();
    tracing::debug!(
        path = %path.display(),
        channels,
        sample_rate = spec.sample_rate,
        frames = samples.len(),
        "Loaded capture"
    );

    Ok(SampleBuffer::new(samples, spec.sample_rate))
}
