//! Mictester Core - Preprocessing, signal metrics, and quality judgment
//!
//! This library evaluates captured microphone recordings against a fixed set of
//! acceptance criteria (loudness, clipping, SNR, harmonic distortion, sensitivity
//! relative to a reference microphone, and waveform shape) and produces a
//! pass/fail verdict with human-readable diagnostics.
//!
//! Pipeline: [`audio::preprocess`] → [`audio::metrics`] → [`quality::judge`]
//! (reading [`quality::reference`]) → result appended to [`session::store`].

pub mod audio;
pub mod config;
pub mod quality;
pub mod session;

pub use audio::metrics::Metrics;
pub use audio::preprocess::SampleBuffer;
pub use config::{ConfigError, TestConfig};
pub use quality::judge::{Issue, Verdict};
pub use quality::reference::{ReferenceRecord, ReferenceRegistry, ReferenceView, RmsRange};
pub use session::store::{MicId, SessionStore, SessionSummary, TestResult};
pub use session::{SharedSession, TestError, TestSession};

/// Library version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default capture sample rate in Hz
pub const DEFAULT_SAMPLE_RATE: u32 = 44100;

/// Settling time discarded from the start of every recording, in seconds
pub const DEFAULT_PRE_ROLL_SECS: f64 = 0.3;

/// Output stand-in for an infinite SNR (no noise power outside the test band)
pub const SNR_INFINITE_SENTINEL: f64 = 999.0;
