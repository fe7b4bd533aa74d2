//! Mictester - Batch acceptance testing for microphone recordings
//!
//! This library re-exports the preprocessing, metric, judgment, and session
//! functionality from `mictester-core`. The `mictester` binary drives it over
//! WAV files.

pub mod wav;

pub use mictester_core::{audio, config, quality, session};

pub use mictester_core::{
    ConfigError, Issue, Metrics, MicId, ReferenceRecord, ReferenceRegistry, ReferenceView,
    RmsRange, SampleBuffer, SessionStore, SessionSummary, SharedSession, TestConfig, TestError,
    TestResult, TestSession, Verdict,
};
pub use mictester_core::{
    DEFAULT_PRE_ROLL_SECS, DEFAULT_SAMPLE_RATE, SNR_INFINITE_SENTINEL, VERSION,
};
