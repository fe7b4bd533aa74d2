//! Signal metrics derived from a preprocessed capture
//!
//! Level and shape metrics (RMS, peak, MAV, crest factor) come straight from the
//! samples. Dominant frequency and SNR come from the Welch PSD, THD from a
//! full-length DFT with the fundamental pinned to the configured test tone.

use crate::audio::preprocess::SampleBuffer;
use crate::audio::spectrum::{Psd, SpectralAnalyzer, WELCH_SEGMENT_LEN};
use crate::SNR_INFINITE_SENTINEL;
use serde::{Serialize, Serializer};
use thiserror::Error;

/// Half-width of the SNR signal band around the test frequency, in Hz
pub const SNR_BAND_HALF_WIDTH_HZ: f64 = 100.0;

/// Highest harmonic order included in THD
pub const MAX_HARMONIC: u32 = 5;

/// Degenerate inputs for which THD is undefined
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ThdError {
    #[error("Buffer too short for a positive-frequency spectrum")]
    EmptyBuffer,

    #[error("Fundamental bin has zero magnitude")]
    ZeroFundamental,

    #[error("Test frequency must be positive and finite, got {0}")]
    InvalidTestFrequency(f64),
}

/// Derived signal metrics for one capture
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Metrics {
    /// Root-mean-square amplitude
    pub rms: f64,
    /// Maximum absolute sample value
    pub peak: f64,
    /// Mean absolute value
    pub mav: f64,
    /// peak / rms, 0 when rms is 0
    pub crest_factor: f64,
    /// Frequency of the PSD bin with maximum power, Hz
    pub dominant_frequency: f64,
    /// Band-limited SNR in dB, `f64::INFINITY` when there is no noise power
    /// and NaN when no PSD bin falls inside the signal band
    #[serde(serialize_with = "serialize_snr")]
    pub snr_db: f64,
    /// Total harmonic distortion as a ratio (0.1 = 10%)
    #[serde(rename = "thd_percent", serialize_with = "serialize_percent")]
    pub thd: f64,
}

impl Metrics {
    /// SNR as reported to users, with infinities replaced by ±999.0
    pub fn snr_for_output(&self) -> f64 {
        if self.snr_db == f64::INFINITY {
            SNR_INFINITE_SENTINEL
        } else if self.snr_db == f64::NEG_INFINITY {
            -SNR_INFINITE_SENTINEL
        } else {
            self.snr_db
        }
    }

    /// Whether no noise power was found outside the test band
    pub fn snr_is_infinite(&self) -> bool {
        self.snr_db == f64::INFINITY
    }

    /// Whether the signal band held no PSD bins, leaving SNR unmeasured
    pub fn snr_is_undefined(&self) -> bool {
        self.snr_db.is_nan()
    }

    /// THD as a percentage
    pub fn thd_percent(&self) -> f64 {
        self.thd * 100.0
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self {
            rms: 0.0,
            peak: 0.0,
            mav: 0.0,
            crest_factor: 0.0,
            dominant_frequency: 0.0,
            snr_db: f64::INFINITY,
            thd: 0.0,
        }
    }
}

fn serialize_snr<S: Serializer>(snr_db: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    if snr_db.is_nan() {
        return serializer.serialize_none();
    }
    let value = if snr_db.is_infinite() {
        SNR_INFINITE_SENTINEL.copysign(*snr_db)
    } else {
        *snr_db
    };
    serializer.serialize_f64(value)
}

fn serialize_percent<S: Serializer>(ratio: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(ratio * 100.0)
}

/// Computes [`Metrics`] from preprocessed captures
pub struct MetricCalculator {
    spectral: SpectralAnalyzer,
    segment_len: usize,
}

impl MetricCalculator {
    /// Create a calculator using the default Welch segment length
    pub fn new() -> Self {
        Self::with_segment_len(WELCH_SEGMENT_LEN)
    }

    /// Create a calculator with a custom Welch segment length
    pub fn with_segment_len(segment_len: usize) -> Self {
        Self {
            spectral: SpectralAnalyzer::new(),
            segment_len: segment_len.max(1),
        }
    }

    /// Compute all metrics for a buffer
    ///
    /// # Arguments
    /// * `buffer` - Preprocessed capture
    /// * `test_frequency` - Frequency of the test tone in Hz
    pub fn compute(&mut self, buffer: &SampleBuffer, test_frequency: f64) -> Metrics {
        let (rms, peak, mav) = level_metrics(&buffer.samples);
        let crest_factor = if rms > 0.0 { peak / rms } else { 0.0 };

        let psd = self
            .spectral
            .welch_psd(&buffer.samples, buffer.sample_rate, self.segment_len);
        let dominant_frequency = psd.peak_frequency();
        let snr_db = band_snr_db(&psd, test_frequency);

        let thd = match self.thd(&buffer.samples, buffer.sample_rate, test_frequency) {
            Ok(thd) => thd,
            Err(e) => {
                tracing::warn!(error = %e, "THD undefined for this capture, using 0");
                0.0
            }
        };

        let metrics = Metrics {
            rms,
            peak,
            mav,
            crest_factor,
            dominant_frequency,
            snr_db,
            thd,
        };
        tracing::debug!(?metrics, "Computed metrics");
        metrics
    }

    /// Total harmonic distortion relative to the test tone
    ///
    /// The fundamental is the DFT bin nearest `test_frequency`, not the loudest
    /// peak, so a dominant 2nd harmonic is still measured as distortion.
    /// Harmonics 2 through [`MAX_HARMONIC`] use the bin nearest
    /// `order * test_frequency`.
    ///
    /// # Returns
    /// `sqrt(sum(|H_n|^2) / |F|^2)` as a ratio
    pub fn thd(
        &self,
        samples: &[f32],
        sample_rate: u32,
        test_frequency: f64,
    ) -> Result<f64, ThdError> {
        if !test_frequency.is_finite() || test_frequency <= 0.0 {
            return Err(ThdError::InvalidTestFrequency(test_frequency));
        }

        let spectrum = self.spectral.positive_spectrum(samples, sample_rate);
        let fundamental = spectrum
            .nearest_bin(test_frequency)
            .ok_or(ThdError::EmptyBuffer)?;
        let fundamental_power = spectrum.magnitudes[fundamental].powi(2);
        if fundamental_power == 0.0 {
            return Err(ThdError::ZeroFundamental);
        }

        let harmonic_power: f64 = (2..=MAX_HARMONIC)
            .filter_map(|order| spectrum.nearest_bin(test_frequency * order as f64))
            .map(|bin| spectrum.magnitudes[bin].powi(2))
            .sum();

        Ok((harmonic_power / fundamental_power).sqrt())
    }
}

impl Default for MetricCalculator {
    fn default() -> Self {
        Self::new()
    }
}

/// Compute metrics with a one-shot calculator
pub fn compute_metrics(buffer: &SampleBuffer, test_frequency: f64) -> Metrics {
    MetricCalculator::new().compute(buffer, test_frequency)
}

/// RMS, peak, and mean absolute value; all zero for an empty slice
fn level_metrics(samples: &[f32]) -> (f64, f64, f64) {
    if samples.is_empty() {
        return (0.0, 0.0, 0.0);
    }

    let mut sum_sq = 0.0f64;
    let mut sum_abs = 0.0f64;
    let mut peak = 0.0f64;
    for &x in samples {
        let x = x as f64;
        sum_sq += x * x;
        sum_abs += x.abs();
        peak = peak.max(x.abs());
    }

    let n = samples.len() as f64;
    ((sum_sq / n).sqrt(), peak, sum_abs / n)
}

/// Mean PSD inside `[f - 100, f + 100]` over mean PSD outside, in dB
///
/// Infinite when there is no noise power. NaN when noise exists but no bin
/// lies inside the band (bin spacing wider than the band, or a test
/// frequency beyond Nyquist).
fn band_snr_db(psd: &Psd, test_frequency: f64) -> f64 {
    let low = test_frequency - SNR_BAND_HALF_WIDTH_HZ;
    let high = test_frequency + SNR_BAND_HALF_WIDTH_HZ;

    let (mut signal_sum, mut signal_bins) = (0.0f64, 0usize);
    let (mut noise_sum, mut noise_bins) = (0.0f64, 0usize);
    for (&f, &p) in psd.frequencies.iter().zip(&psd.power) {
        if f >= low && f <= high {
            signal_sum += p;
            signal_bins += 1;
        } else {
            noise_sum += p;
            noise_bins += 1;
        }
    }

    let noise_power = if noise_bins > 0 {
        noise_sum / noise_bins as f64
    } else {
        0.0
    };
    if noise_power <= 0.0 {
        return f64::INFINITY;
    }
    if signal_bins == 0 {
        tracing::debug!(test_frequency, "No PSD bins inside the SNR band");
        return f64::NAN;
    }

    10.0 * (signal_sum / signal_bins as f64 / noise_power).log10()
}
