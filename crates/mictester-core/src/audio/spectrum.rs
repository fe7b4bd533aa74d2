//! Spectral estimates for SNR and THD
//!
//! Two views of the same buffer:
//! - Welch's averaged periodogram (PSD, one-sided, density scaling) for the
//!   dominant frequency and the band-limited SNR
//! - A single full-length DFT restricted to strictly positive frequencies for
//!   harmonic distortion

use rustfft::{num_complex::Complex, FftPlanner};
use std::f64::consts::PI;

/// Default Welch segment length in samples
pub const WELCH_SEGMENT_LEN: usize = 1024;

/// One-sided power spectral density
#[derive(Debug, Clone, Default)]
pub struct Psd {
    /// Bin center frequencies in Hz, `k * fs / segment_len`
    pub frequencies: Vec<f64>,
    /// Power per Hz at each bin
    pub power: Vec<f64>,
}

impl Psd {
    /// Frequency of the bin with maximum power (first one on ties)
    pub fn peak_frequency(&self) -> f64 {
        let mut best = 0usize;
        for (i, &p) in self.power.iter().enumerate() {
            if p > self.power[best] {
                best = i;
            }
        }
        self.frequencies.get(best).copied().unwrap_or(0.0)
    }
}

/// DFT magnitudes at strictly positive frequencies
#[derive(Debug, Clone, Default)]
pub struct MagnitudeSpectrum {
    /// Bin frequencies in Hz, `k * fs / n` for `k = 1..=(n-1)/2`
    pub frequencies: Vec<f64>,
    /// Unnormalized magnitude `|X[k]|`
    pub magnitudes: Vec<f64>,
}

impl MagnitudeSpectrum {
    /// Index of the bin whose frequency is closest to `target` (first one on ties)
    pub fn nearest_bin(&self, target: f64) -> Option<usize> {
        let mut best: Option<(usize, f64)> = None;
        for (i, &f) in self.frequencies.iter().enumerate() {
            let distance = (f - target).abs();
            match best {
                Some((_, d)) if distance >= d => {}
                _ => best = Some((i, distance)),
            }
        }
        best.map(|(i, _)| i)
    }

    /// Whether the spectrum has no bins
    pub fn is_empty(&self) -> bool {
        self.magnitudes.is_empty()
    }
}

/// FFT-backed spectral estimator
///
/// Holds a planner for the Welch segment lengths, which are bounded by the
/// requested segment length. Full-length transforms are planned per call so
/// captures of arbitrary length do not accumulate cached plans.
pub struct SpectralAnalyzer {
    planner: FftPlanner<f64>,
}

impl SpectralAnalyzer {
    /// Create a new analyzer
    pub fn new() -> Self {
        Self {
            planner: FftPlanner::new(),
        }
    }

    /// Estimate the PSD with Welch's method
    ///
    /// Periodic Hann window, 50% overlap, per-segment mean removal, density
    /// scaling `1 / (fs * sum(w^2))`, one-sided (interior bins doubled), mean
    /// over segments. A buffer shorter than `segment_len` is treated as a
    /// single segment of its own length.
    ///
    /// # Arguments
    /// * `samples` - Preprocessed samples
    /// * `sample_rate` - Sample rate in Hz
    /// * `segment_len` - Requested segment length (typically [`WELCH_SEGMENT_LEN`])
    pub fn welch_psd(&mut self, samples: &[f32], sample_rate: u32, segment_len: usize) -> Psd {
        let nperseg = segment_len.min(samples.len());
        if nperseg == 0 || sample_rate == 0 {
            return Psd::default();
        }

        let fs = sample_rate as f64;
        let step = nperseg - nperseg / 2;
        let window = hann_periodic(nperseg);
        let window_power: f64 = window.iter().map(|w| w * w).sum();
        let scale = if window_power > 0.0 {
            1.0 / (fs * window_power)
        } else {
            0.0
        };

        let bins = nperseg / 2 + 1;
        let mut power = vec![0.0f64; bins];
        let segments = (samples.len() - nperseg) / step + 1;
        let fft = self.planner.plan_fft_forward(nperseg);
        let mut buffer = vec![Complex::new(0.0, 0.0); nperseg];

        for s in 0..segments {
            let segment = &samples[s * step..s * step + nperseg];
            let mean = segment.iter().map(|&x| x as f64).sum::<f64>() / nperseg as f64;

            for ((c, &x), w) in buffer.iter_mut().zip(segment).zip(&window) {
                *c = Complex::new((x as f64 - mean) * w, 0.0);
            }
            fft.process(&mut buffer);

            for (p, c) in power.iter_mut().zip(&buffer) {
                *p += c.norm_sqr() * scale;
            }
        }

        // One-sided: fold negative frequencies into the interior bins. DC and,
        // for even lengths, Nyquist have no mirror image.
        let last_doubled = if nperseg % 2 == 0 { bins - 1 } else { bins };
        for p in power.iter_mut().take(last_doubled).skip(1) {
            *p *= 2.0;
        }
        for p in &mut power {
            *p /= segments as f64;
        }

        let frequencies = (0..bins).map(|k| k as f64 * fs / nperseg as f64).collect();

        Psd { frequencies, power }
    }

    /// Full-length DFT magnitudes at strictly positive frequencies
    ///
    /// DC and (for even lengths) the Nyquist bin are excluded.
    pub fn positive_spectrum(&self, samples: &[f32], sample_rate: u32) -> MagnitudeSpectrum {
        let n = samples.len();
        if n < 3 || sample_rate == 0 {
            return MagnitudeSpectrum::default();
        }

        let mut buffer: Vec<Complex<f64>> =
            samples.iter().map(|&x| Complex::new(x as f64, 0.0)).collect();
        let fft = FftPlanner::<f64>::new().plan_fft_forward(n);
        fft.process(&mut buffer);

        let fs = sample_rate as f64;
        let positive = (n - 1) / 2;
        let frequencies = (1..=positive).map(|k| k as f64 * fs / n as f64).collect();
        let magnitudes = buffer[1..=positive].iter().map(|c| c.norm()).collect();

        MagnitudeSpectrum {
            frequencies,
            magnitudes,
        }
    }
}

impl Default for SpectralAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

/// Periodic Hann window (DFT-even), `0.5 - 0.5 cos(2πn/N)`
fn hann_periodic(len: usize) -> Vec<f64> {
    if len <= 1 {
        return vec![1.0; len];
    }
    (0..len)
        .map(|i| 0.5 - 0.5 * (2.0 * PI * i as f64 / len as f64).cos())
        .collect()
}
