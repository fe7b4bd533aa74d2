//! Buffer sanitizing before metric computation
//!
//! Raw captures arrive with a settling transient at the start and may contain
//! non-finite values or overflow spikes from the capture path. Preprocessing
//! never fails: malformed input is sanitized instead of rejected.

use serde::{Deserialize, Serialize};

/// Magnitude above which a sample is treated as a sensor glitch and zeroed
const GLITCH_MAGNITUDE: f32 = 10.0;

/// A captured mono recording
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleBuffer {
    /// Amplitude values, nominally in [-1, 1]
    pub samples: Vec<f32>,
    /// Sample rate in Hz
    pub sample_rate: u32,
}

impl SampleBuffer {
    /// Create a buffer from raw samples
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    /// Number of samples in the buffer
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether the buffer holds no samples
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Recording length in seconds
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

/// Clean and normalize a raw capture
///
/// Steps, in order:
/// 1. Drop the first `pre_roll_secs * sample_rate` samples, unless the buffer
///    is not longer than that (a short capture is kept whole).
/// 2. Zero non-finite values.
/// 3. Zero values whose magnitude exceeds 10.
/// 4. If the peak magnitude exceeds 1.0, divide everything by it. Quiet
///    buffers are never scaled up.
///
/// # Arguments
/// * `buffer` - Raw capture
/// * `pre_roll_secs` - Settling time to discard, in seconds
///
/// # Returns
/// A new buffer with the same sample rate
pub fn preprocess(buffer: &SampleBuffer, pre_roll_secs: f64) -> SampleBuffer {
    if buffer.is_empty() {
        return buffer.clone();
    }

    let pre_samples = (pre_roll_secs.max(0.0) * buffer.sample_rate as f64) as usize;
    let start = if buffer.len() > pre_samples {
        pre_samples
    } else {
        0
    };

    let mut non_finite = 0usize;
    let mut glitches = 0usize;
    let mut samples: Vec<f32> = buffer.samples[start..]
        .iter()
        .map(|&x| {
            if !x.is_finite() {
                non_finite += 1;
                0.0
            } else if x.abs() > GLITCH_MAGNITUDE {
                glitches += 1;
                0.0
            } else {
                x
            }
        })
        .collect();

    let max_abs = samples.iter().fold(0.0f32, |acc, x| acc.max(x.abs()));
    if max_abs > 1.0 {
        for x in &mut samples {
            *x /= max_abs;
        }
    }

    tracing::debug!(
        dropped = start,
        non_finite,
        glitches,
        max_abs,
        remaining = samples.len(),
        "Preprocessed capture"
    );

    SampleBuffer {
        samples,
        sample_rate: buffer.sample_rate,
    }
}
