//! Ordered pass/fail rules over computed metrics
//!
//! Rules run in a fixed order and each appends at most one [`Issue`]:
//!
//! 1. Loopback detection (short-circuits with a failure)
//! 2. Minimum volume (always on)
//! 3. THD
//! 4. Peak / clipping
//! 5. SNR
//! 6. Sensitivity against the reference microphone
//! 7. MAV window
//! 8. Crest factor window
//!
//! A capture passes when no issue was raised. The loopback thresholds are
//! fixed and not configurable.

use crate::audio::metrics::Metrics;
use crate::config::TestConfig;
use crate::quality::reference::ReferenceRecord;
use serde::{Serialize, Serializer};
use std::fmt;

/// RMS window of a digitally looped-back full-scale test tone
const LOOPBACK_RMS_RANGE: (f64, f64) = (0.65, 0.75);

/// Minimum peak of a looped-back tone
const LOOPBACK_MIN_PEAK: f64 = 0.98;

/// Looped-back tones are cleaner than any physical capture
const LOOPBACK_MIN_SNR_DB: f64 = 40.0;

/// Maximum THD ratio of a looped-back tone
const LOOPBACK_MAX_THD: f64 = 0.02;

/// A single diagnostic raised by the judge
#[derive(Debug, Clone, PartialEq)]
pub enum Issue {
    /// Capture designated the standard microphone, nothing was judged
    ReferenceSample,
    /// Capture looks like a sound-card monitor channel
    SuspectedLoopback,
    VolumeTooLow { rms: f64 },
    DistortionTooHigh { thd: f64 },
    Clipped { peak: f64 },
    SnrTooLow { snr_db: f64 },
    /// RMS below the reference by more than the tolerance
    SensitivityBelowReference { deviation_percent: f64 },
    MavTooLow { mav: f64 },
    MavTooHigh { mav: f64 },
    CrestFactorTooLow { crest_factor: f64 },
    CrestFactorTooHigh { crest_factor: f64 },
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Issue::ReferenceSample => {
                write!(f, "standard microphone — no pass/fail judgment applied")
            }
            Issue::SuspectedLoopback => write!(
                f,
                "suspected sound-card loopback channel (not a physical microphone)"
            ),
            Issue::VolumeTooLow { rms } => write!(f, "volume too low (RMS={rms:.4})"),
            Issue::DistortionTooHigh { thd } => {
                write!(f, "distortion too high (THD={:.1}%)", thd * 100.0)
            }
            Issue::Clipped { peak } => write!(f, "signal clipped (Peak={peak:.4})"),
            Issue::SnrTooLow { snr_db } => {
                write!(f, "signal-to-noise ratio too low (SNR={snr_db:.1}dB)")
            }
            Issue::SensitivityBelowReference { deviation_percent } => write!(
                f,
                "RMS too low ({:.1}%), sensitivity below reference microphone",
                deviation_percent.abs()
            ),
            Issue::MavTooLow { mav } => write!(f, "MAV too low ({mav:.4})"),
            Issue::MavTooHigh { mav } => write!(f, "MAV too high ({mav:.4})"),
            Issue::CrestFactorTooLow { crest_factor } => {
                write!(f, "crest factor too low ({crest_factor:.2})")
            }
            Issue::CrestFactorTooHigh { crest_factor } => {
                write!(f, "crest factor too high ({crest_factor:.2})")
            }
        }
    }
}

impl Serialize for Issue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Outcome of judging one capture
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Verdict {
    pub is_pass: bool,
    /// Diagnostics in rule order, empty for a normal capture
    pub issues: Vec<Issue>,
    /// `(rms - ref_rms) / ref_rms * 100`, present whenever the sensitivity
    /// check ran against a reference
    pub rms_deviation_percent: Option<f64>,
}

impl Verdict {
    fn from_issues(issues: Vec<Issue>, rms_deviation_percent: Option<f64>) -> Self {
        Self {
            is_pass: issues.is_empty(),
            issues,
            rms_deviation_percent,
        }
    }
}

/// Apply the ordered rule set to a capture's metrics
///
/// # Arguments
/// * `metrics` - Metrics of the capture under test
/// * `config` - Enable flags and thresholds
/// * `reference` - Current standard microphone, if one is set
/// * `is_setting_reference` - The capture is being designated the standard
///   microphone; every rule is skipped
pub fn judge(
    metrics: &Metrics,
    config: &TestConfig,
    reference: Option<&ReferenceRecord>,
    is_setting_reference: bool,
) -> Verdict {
    if is_setting_reference {
        return Verdict {
            is_pass: true,
            issues: vec![Issue::ReferenceSample],
            rms_deviation_percent: None,
        };
    }

    if config.enable_loopback_check && looks_like_loopback(metrics) {
        tracing::debug!(rms = metrics.rms, peak = metrics.peak, "Loopback signature matched");
        return Verdict::from_issues(vec![Issue::SuspectedLoopback], None);
    }

    let mut issues = Vec::new();

    if metrics.rms < config.min_rms {
        issues.push(Issue::VolumeTooLow { rms: metrics.rms });
    }

    if config.enable_thd_check && metrics.thd > config.thd_threshold {
        issues.push(Issue::DistortionTooHigh { thd: metrics.thd });
    }

    if config.enable_peak_check && metrics.peak > config.peak_threshold {
        issues.push(Issue::Clipped { peak: metrics.peak });
    }

    if config.enable_snr_check
        && !metrics.snr_is_infinite()
        && !metrics.snr_is_undefined()
        && metrics.snr_db < config.snr_threshold
    {
        issues.push(Issue::SnrTooLow {
            snr_db: metrics.snr_db,
        });
    }

    let mut rms_deviation_percent = None;
    if config.enable_sensitivity_check {
        if let Some(reference) = reference {
            let ref_rms = reference.metrics.rms;
            if ref_rms > 0.0 {
                let deviation = (metrics.rms - ref_rms) / ref_rms * 100.0;
                rms_deviation_percent = Some(deviation);

                // Only a quieter microphone fails; louder is never flagged
                if metrics.rms < ref_rms
                    && (ref_rms - metrics.rms) / ref_rms > config.sensitivity_tolerance
                {
                    issues.push(Issue::SensitivityBelowReference {
                        deviation_percent: deviation,
                    });
                }
            } else {
                tracing::warn!(
                    mic_id = %reference.mic_id,
                    "Reference RMS is zero, skipping sensitivity check"
                );
            }
        }
    }

    if config.enable_mav_check {
        if metrics.mav < config.mav_min {
            issues.push(Issue::MavTooLow { mav: metrics.mav });
        } else if metrics.mav > config.mav_max {
            issues.push(Issue::MavTooHigh { mav: metrics.mav });
        }
    }

    if config.enable_crest_factor_check {
        if metrics.crest_factor < config.crest_factor_min {
            issues.push(Issue::CrestFactorTooLow {
                crest_factor: metrics.crest_factor,
            });
        } else if metrics.crest_factor > config.crest_factor_max {
            issues.push(Issue::CrestFactorTooHigh {
                crest_factor: metrics.crest_factor,
            });
        }
    }

    Verdict::from_issues(issues, rms_deviation_percent)
}

fn looks_like_loopback(metrics: &Metrics) -> bool {
    (LOOPBACK_RMS_RANGE.0..=LOOPBACK_RMS_RANGE.1).contains(&metrics.rms)
        && metrics.peak >= LOOPBACK_MIN_PEAK
        && metrics.snr_db > LOOPBACK_MIN_SNR_DB
        && metrics.thd < LOOPBACK_MAX_THD
}
