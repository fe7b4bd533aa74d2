//! Test configuration
//!
//! A flat mapping of enable flags and thresholds shared by the metric
//! calculator and the judge. Missing keys fall back to their documented
//! defaults; the whole mapping is validated once when loaded or updated.
//! Persisting the mapping is left to the host.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from loading or updating a configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid configuration JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Configuration update must be a JSON object")]
    NotAnObject,

    #[error("Invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

fn default_sample_rate() -> u32 {
    crate::DEFAULT_SAMPLE_RATE
}

fn default_duration() -> f64 {
    3.0
}

fn default_test_frequency() -> f64 {
    1000.0
}

fn default_min_rms() -> f64 {
    0.01
}

fn default_max_rms() -> f64 {
    0.9
}

fn default_snr_threshold() -> f64 {
    20.0
}

fn default_sensitivity_tolerance() -> f64 {
    0.3
}

fn default_peak_threshold() -> f64 {
    0.98
}

fn default_thd_threshold() -> f64 {
    0.1
}

fn default_mav_min() -> f64 {
    0.01
}

fn default_mav_max() -> f64 {
    0.9
}

fn default_crest_factor_min() -> f64 {
    1.2
}

fn default_crest_factor_max() -> f64 {
    5.0
}

fn enabled() -> bool {
    true
}

/// Thresholds and enable flags for one acceptance-testing workflow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestConfig {
    /// Capture sample rate in Hz, used when a capture does not carry its own
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    /// Capture length in seconds
    #[serde(default = "default_duration")]
    pub duration: f64,
    /// Test tone frequency in Hz (SNR band center and THD fundamental)
    #[serde(default = "default_test_frequency")]
    pub test_frequency: f64,
    /// Minimum RMS; this check cannot be disabled
    #[serde(default = "default_min_rms")]
    pub min_rms: f64,
    /// Upper RMS hint for capture gain; not a judged rule
    #[serde(default = "default_max_rms")]
    pub max_rms: f64,
    /// Minimum band-limited SNR in dB
    #[serde(default = "default_snr_threshold")]
    pub snr_threshold: f64,
    /// Allowed fractional RMS shortfall against the reference microphone
    #[serde(default = "default_sensitivity_tolerance")]
    pub sensitivity_tolerance: f64,
    #[serde(default)]
    pub enable_thd_check: bool,
    #[serde(default = "enabled")]
    pub enable_peak_check: bool,
    #[serde(default = "enabled")]
    pub enable_snr_check: bool,
    #[serde(default = "enabled")]
    pub enable_sensitivity_check: bool,
    #[serde(default = "enabled")]
    pub enable_loopback_check: bool,
    #[serde(default = "enabled")]
    pub enable_mav_check: bool,
    #[serde(default = "enabled")]
    pub enable_crest_factor_check: bool,
    /// Peak above which a capture counts as clipped
    #[serde(default = "default_peak_threshold")]
    pub peak_threshold: f64,
    /// Maximum THD as a ratio (0.1 = 10%)
    #[serde(default = "default_thd_threshold")]
    pub thd_threshold: f64,
    #[serde(default = "default_mav_min")]
    pub mav_min: f64,
    #[serde(default = "default_mav_max")]
    pub mav_max: f64,
    #[serde(default = "default_crest_factor_min")]
    pub crest_factor_min: f64,
    #[serde(default = "default_crest_factor_max")]
    pub crest_factor_max: f64,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            sample_rate: default_sample_rate(),
            duration: default_duration(),
            test_frequency: default_test_frequency(),
            min_rms: default_min_rms(),
            max_rms: default_max_rms(),
            snr_threshold: default_snr_threshold(),
            sensitivity_tolerance: default_sensitivity_tolerance(),
            enable_thd_check: false,
            enable_peak_check: true,
            enable_snr_check: true,
            enable_sensitivity_check: true,
            enable_loopback_check: true,
            enable_mav_check: true,
            enable_crest_factor_check: true,
            peak_threshold: default_peak_threshold(),
            thd_threshold: default_thd_threshold(),
            mav_min: default_mav_min(),
            mav_max: default_mav_max(),
            crest_factor_min: default_crest_factor_min(),
            crest_factor_max: default_crest_factor_max(),
        }
    }
}

impl TestConfig {
    /// Parse and validate a configuration mapping
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Full mapping as pretty JSON, for the host to persist
    pub fn to_json_pretty(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Apply a partial update and return the full merged configuration
    ///
    /// Keys in `patch` overwrite current values; unknown keys are ignored.
    /// The result is validated as a whole, so `self` stays untouched when
    /// the update is rejected.
    pub fn merged(&self, patch: &serde_json::Value) -> Result<Self, ConfigError> {
        let updates = patch.as_object().ok_or(ConfigError::NotAnObject)?;

        let mut current = serde_json::to_value(self)?;
        if let Some(map) = current.as_object_mut() {
            for (key, value) in updates {
                if map.contains_key(key) {
                    map.insert(key.clone(), value.clone());
                } else {
                    tracing::warn!(key = %key, "Ignoring unknown config key");
                }
            }
        }

        let merged: Self = serde_json::from_value(current)?;
        merged.validate()?;
        Ok(merged)
    }

    /// Expected capture length in samples
    pub fn recording_samples(&self) -> usize {
        (self.sample_rate as f64 * self.duration).round() as usize
    }

    /// Check value ranges and min/max ordering
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sample_rate == 0 {
            return Err(invalid("sample_rate", "must be positive"));
        }
        if !(self.duration.is_finite() && self.duration > 0.0) {
            return Err(invalid("duration", "must be a positive number of seconds"));
        }
        if !(self.test_frequency.is_finite() && self.test_frequency > 0.0) {
            return Err(invalid("test_frequency", "must be a positive frequency"));
        }

        let thresholds = [
            ("min_rms", self.min_rms),
            ("max_rms", self.max_rms),
            ("snr_threshold", self.snr_threshold),
            ("sensitivity_tolerance", self.sensitivity_tolerance),
            ("peak_threshold", self.peak_threshold),
            ("thd_threshold", self.thd_threshold),
            ("mav_min", self.mav_min),
            ("mav_max", self.mav_max),
            ("crest_factor_min", self.crest_factor_min),
            ("crest_factor_max", self.crest_factor_max),
        ];
        for (field, value) in thresholds {
            if !value.is_finite() || value < 0.0 {
                return Err(invalid(field, format!("{value} is not a non-negative number")));
            }
        }

        if self.sensitivity_tolerance > 1.0 {
            return Err(invalid("sensitivity_tolerance", "must be within [0, 1]"));
        }
        if self.min_rms > self.max_rms {
            return Err(invalid("min_rms", "exceeds max_rms"));
        }
        if self.mav_min > self.mav_max {
            return Err(invalid("mav_min", "exceeds mav_max"));
        }
        if self.crest_factor_min > self.crest_factor_max {
            return Err(invalid("crest_factor_min", "exceeds crest_factor_max"));
        }

        Ok(())
    }
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}
