//! Test session context
//!
//! [`TestSession`] owns everything that persists between analyses: the active
//! configuration, the reference registry, and the ordered result store. The
//! hosting layer owns the session and passes it by reference; when calls can
//! arrive concurrently, wrap it in a [`SharedSession`] so that appending a
//! result, promoting a reference, and clearing are serialized.

pub mod store;

use crate::audio::metrics::MetricCalculator;
use crate::audio::preprocess::{preprocess, SampleBuffer};
use crate::config::{ConfigError, TestConfig};
use crate::quality::judge::judge;
use crate::quality::reference::{ReferenceRecord, ReferenceRegistry, ReferenceView};
use chrono::Utc;
use std::sync::{Arc, Mutex};
use store::{MicId, SessionStore, SessionSummary, TestResult};
use thiserror::Error;

/// Errors surfaced to callers of the session
#[derive(Error, Debug)]
pub enum TestError {
    #[error("Sample buffer is empty")]
    EmptyBuffer,

    #[error("Invalid microphone ID: {0:?}")]
    InvalidMicId(String),

    #[error("Invalid sample rate: {0}")]
    InvalidSampleRate(u32),

    #[error("No test result found for microphone {0}")]
    ReferenceNotFound(MicId),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl TestError {
    /// Whether the caller supplied unusable input (rejected before analysis)
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            TestError::EmptyBuffer | TestError::InvalidMicId(_) | TestError::InvalidSampleRate(_)
        )
    }
}

/// A session behind a single lock
pub type SharedSession = Arc<Mutex<TestSession>>;

/// Configuration, reference, and results for one batch of microphones
pub struct TestSession {
    config: TestConfig,
    calculator: MetricCalculator,
    reference: ReferenceRegistry,
    store: SessionStore,
    pre_roll_secs: f64,
}

impl TestSession {
    /// Create a session with a validated configuration
    pub fn new(config: TestConfig) -> Result<Self, TestError> {
        config.validate()?;
        Ok(Self {
            config,
            calculator: MetricCalculator::new(),
            reference: ReferenceRegistry::new(),
            store: SessionStore::new(),
            pre_roll_secs: crate::DEFAULT_PRE_ROLL_SECS,
        })
    }

    /// Override the settling time discarded from each capture
    pub fn with_pre_roll(mut self, pre_roll_secs: f64) -> Self {
        self.pre_roll_secs = pre_roll_secs.max(0.0);
        self
    }

    /// Wrap the session for use from several threads
    pub fn into_shared(self) -> SharedSession {
        Arc::new(Mutex::new(self))
    }

    /// Active configuration
    pub fn config(&self) -> &TestConfig {
        &self.config
    }

    /// Merge a partial update into the configuration
    ///
    /// On success the returned mapping is the full configuration for the host
    /// to persist. A rejected update leaves the active configuration unchanged.
    pub fn update_config(&mut self, patch: &serde_json::Value) -> Result<&TestConfig, TestError> {
        self.config = self.config.merged(patch)?;
        tracing::info!(config = ?self.config, "Configuration updated");
        Ok(&self.config)
    }

    /// Run the full pipeline on one capture and record the result
    ///
    /// # Arguments
    /// * `samples` - Raw capture
    /// * `sample_rate` - Capture rate in Hz, or `None` for the configured default
    /// * `mic_id` - Microphone under test
    /// * `is_setting_reference` - Designate this capture the standard
    ///   microphone instead of judging it
    ///
    /// # Returns
    /// The recorded result
    pub fn analyze(
        &mut self,
        samples: &[f32],
        sample_rate: Option<u32>,
        mic_id: MicId,
        is_setting_reference: bool,
    ) -> Result<TestResult, TestError> {
        if samples.is_empty() {
            return Err(TestError::EmptyBuffer);
        }
        let sample_rate = sample_rate.unwrap_or(self.config.sample_rate);
        if sample_rate == 0 {
            return Err(TestError::InvalidSampleRate(sample_rate));
        }

        tracing::debug!(
            %mic_id,
            sample_rate,
            samples = samples.len(),
            is_setting_reference,
            "Analyzing capture"
        );

        let raw = SampleBuffer::new(samples.to_vec(), sample_rate);
        let buffer = preprocess(&raw, self.pre_roll_secs);
        let metrics = self.calculator.compute(&buffer, self.config.test_frequency);
        let verdict = judge(
            &metrics,
            &self.config,
            self.reference.record(),
            is_setting_reference,
        );

        let result = TestResult {
            mic_id,
            timestamp: Utc::now(),
            sample_rate,
            metrics,
            rms_deviation_percent: verdict.rms_deviation_percent,
            is_pass: verdict.is_pass,
            is_reference: is_setting_reference,
            issues: verdict.issues,
        };

        if is_setting_reference {
            self.reference.set(ReferenceRecord::from(&result));
        }
        self.store.push(result.clone());

        Ok(result)
    }

    /// Make the latest result for `mic_id` the reference
    pub fn promote_to_reference(&mut self, mic_id: MicId) -> Result<ReferenceRecord, TestError> {
        let record = self
            .store
            .latest_for(mic_id)
            .map(ReferenceRecord::from)
            .ok_or(TestError::ReferenceNotFound(mic_id))?;
        self.reference.set(record.clone());
        Ok(record)
    }

    /// Current reference with its acceptable RMS window
    pub fn current_reference(&self) -> Option<ReferenceView> {
        self.reference.get(self.config.sensitivity_tolerance)
    }

    /// Every result in this session, oldest first
    pub fn all_results(&self) -> &[TestResult] {
        self.store.results()
    }

    /// Pass/fail counts over the session
    pub fn summary(&self) -> SessionSummary {
        self.store.summary()
    }

    /// Drop all results and forget the reference
    pub fn clear_session(&mut self) {
        let dropped = self.store.len();
        self.store.clear();
        self.reference.clear();
        tracing::info!(dropped, "Session cleared");
    }
}

impl Default for TestSession {
    fn default() -> Self {
        Self {
            config: TestConfig::default(),
            calculator: MetricCalculator::new(),
            reference: ReferenceRegistry::new(),
            store: SessionStore::new(),
            pre_roll_secs: crate::DEFAULT_PRE_ROLL_SECS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quality::judge::Issue;
    use serde_json::json;
    use std::f64::consts::PI;

    const RATE: u32 = 44100;

    /// One second of settling plus one second of tone
    fn capture(amplitude: f64) -> Vec<f32> {
        (0..2 * RATE as usize)
            .map(|i| (amplitude * (2.0 * PI * 1000.0 * i as f64 / RATE as f64).sin()) as f32)
            .collect()
    }

    #[test]
    fn test_empty_buffer_rejected() {
        let mut session = TestSession::default();
        let err = session.analyze(&[], None, MicId(1), false).unwrap_err();
        assert!(matches!(err, TestError::EmptyBuffer));
        assert!(err.is_input_error());
        assert!(session.all_results().is_empty());
    }

    #[test]
    fn test_zero_sample_rate_rejected() {
        let mut session = TestSession::default();
        let err = session
            .analyze(&capture(0.3), Some(0), MicId(1), false)
            .unwrap_err();
        assert!(matches!(err, TestError::InvalidSampleRate(0)));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = TestConfig {
            sample_rate: 0,
            ..TestConfig::default()
        };
        assert!(matches!(
            TestSession::new(config),
            Err(TestError::Config(_))
        ));
    }

    #[test]
    fn test_analyze_records_result() {
        let mut session = TestSession::default();
        let result = session
            .analyze(&capture(0.3), Some(RATE), MicId(4), false)
            .unwrap();
        assert!(result.is_pass, "issues: {}", result.diagnosis());
        assert_eq!(result.sample_rate, RATE);
        assert_eq!(session.all_results(), &[result]);
    }

    #[test]
    fn test_setting_reference_updates_registry() {
        let mut session = TestSession::default();
        let result = session
            .analyze(&capture(0.5), None, MicId(1), true)
            .unwrap();
        assert!(result.is_pass);
        assert!(result.is_reference);
        assert_eq!(result.issues, vec![Issue::ReferenceSample]);

        let view = session.current_reference().unwrap();
        assert_eq!(view.record.mic_id, MicId(1));
        assert_eq!(view.record.metrics, result.metrics);
    }

    #[test]
    fn test_quiet_mic_fails_against_reference() {
        let mut session = TestSession::default();
        session.analyze(&capture(0.5), None, MicId(1), true).unwrap();
        let result = session
            .analyze(&capture(0.25), None, MicId(2), false)
            .unwrap();
        assert!(!result.is_pass);
        assert!(result
            .issues
            .iter()
            .any(|i| matches!(i, Issue::SensitivityBelowReference { .. })));
        let deviation = result.rms_deviation_percent.unwrap();
        assert!((deviation + 50.0).abs() < 0.1, "deviation = {deviation}");
    }

    #[test]
    fn test_promote_latest_result() {
        let mut session = TestSession::default();
        session.analyze(&capture(0.2), None, MicId(3), false).unwrap();
        session.analyze(&capture(0.4), None, MicId(3), false).unwrap();

        let record = session.promote_to_reference(MicId(3)).unwrap();
        let latest_rms = session.all_results()[1].metrics.rms;
        assert_eq!(record.metrics.rms, latest_rms);
        assert_eq!(session.current_reference().unwrap().record, record);
        // Promotion copies, the stored result stays as it was
        assert!(!session.all_results()[1].is_reference);
    }

    #[test]
    fn test_promote_unknown_mic() {
        let mut session = TestSession::default();
        let err = session.promote_to_reference(MicId(99)).unwrap_err();
        assert!(matches!(err, TestError::ReferenceNotFound(MicId(99))));
        assert!(!err.is_input_error());
    }

    #[test]
    fn test_clear_session() {
        let mut session = TestSession::default();
        session.analyze(&capture(0.5), None, MicId(1), true).unwrap();
        session.clear_session();
        assert!(session.all_results().is_empty());
        assert!(session.current_reference().is_none());

        let result = session
            .analyze(&capture(0.1), None, MicId(2), false)
            .unwrap();
        assert_eq!(result.rms_deviation_percent, None);
    }

    #[test]
    fn test_update_config() {
        let mut session = TestSession::default();
        let updated = session
            .update_config(&json!({"test_frequency": 500.0}))
            .unwrap();
        assert_eq!(updated.test_frequency, 500.0);

        assert!(session.update_config(&json!({"mav_min": 2.0})).is_err());
        assert_eq!(session.config().mav_min, 0.01);
    }

    #[test]
    fn test_shared_session() {
        let shared = TestSession::default().into_shared();
        let handles: Vec<_> = (0..4u32)
            .map(|id| {
                let shared = Arc::clone(&shared);
                std::thread::spawn(move || {
                    let samples = capture(0.3);
                    let mut session = shared.lock().unwrap();
                    session.analyze(&samples, None, MicId(id), false).unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(shared.lock().unwrap().summary().total, 4);
    }
}
