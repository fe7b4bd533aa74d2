//! E2E tests for the analysis pipeline
//!
//! Drives captures through preprocessing, metrics, and judgment via the
//! session API and checks the invariants exporters rely on.

use mictester::audio::metrics::compute_metrics;
use mictester::audio::preprocess::preprocess;
use mictester::{Issue, MicId, SampleBuffer, TestSession};
use std::f64::consts::PI;

const RATE: u32 = 44100;

/// Two seconds of a 1 kHz tone (0.3 s of it is discarded as pre-roll)
fn tone(amplitude: f64) -> Vec<f32> {
    (0..2 * RATE as usize)
        .map(|i| (amplitude * (2.0 * PI * 1000.0 * i as f64 / RATE as f64).sin()) as f32)
        .collect()
}

/// Deterministic pseudo-random samples in [-amplitude, amplitude]
fn noise(seed: u64, amplitude: f32, len: usize) -> Vec<f32> {
    let mut state = seed;
    (0..len)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            let unit = (state >> 40) as f32 / (1u64 << 24) as f32;
            (unit * 2.0 - 1.0) * amplitude
        })
        .collect()
}

/// Test that a clean, moderately loud tone passes every default rule
#[test]
fn test_clean_tone_passes() {
    let mut session = TestSession::default();
    let result = session.analyze(&tone(0.3), None, MicId(1), false).unwrap();

    assert!(result.is_pass, "unexpected issues: {}", result.diagnosis());
    assert_eq!(result.diagnosis(), "normal");
    assert!((result.metrics.dominant_frequency - 1000.0).abs() < 44.0);
    assert!(result.metrics.thd < 0.001);
}

/// Test the all-zero round trip: zero metrics and a volume failure
#[test]
fn test_silence_round_trip() {
    let mut session = TestSession::default();
    let result = session
        .analyze(&vec![0.0; RATE as usize], None, MicId(2), false)
        .unwrap();

    assert_eq!(result.metrics.rms, 0.0);
    assert_eq!(result.metrics.peak, 0.0);
    assert_eq!(result.metrics.mav, 0.0);
    assert_eq!(result.metrics.crest_factor, 0.0);
    assert!(!result.is_pass);
    assert_eq!(result.issues[0], Issue::VolumeTooLow { rms: 0.0 });
}

/// Test that a full-scale digital tone is flagged as a loopback channel only
#[test]
fn test_full_scale_tone_detected_as_loopback() {
    let mut session = TestSession::default();
    let result = session.analyze(&tone(1.0), None, MicId(3), false).unwrap();

    assert!(!result.is_pass);
    assert_eq!(result.issues, vec![Issue::SuspectedLoopback]);
}

/// Test that a setting-reference capture always passes with the fixed note
#[test]
fn test_reference_capture_always_passes() {
    let mut session = TestSession::default();
    // Silence would fail every level rule if it were judged
    let result = session
        .analyze(&vec![0.0; RATE as usize], None, MicId(0), true)
        .unwrap();

    assert!(result.is_pass);
    assert_eq!(result.issues.len(), 1);
    assert_eq!(
        result.diagnosis(),
        "standard microphone — no pass/fail judgment applied"
    );
    assert_eq!(result.rms_deviation_percent, None);
}

/// Test that overflowing captures are normalized before measuring
#[test]
fn test_hot_capture_is_normalized() {
    let mut session = TestSession::default();
    let hot: Vec<f32> = tone(4.0);
    let result = session.analyze(&hot, None, MicId(4), false).unwrap();

    assert!(result.metrics.peak <= 1.0);
    assert!((result.metrics.peak - 1.0).abs() < 1e-6);
}

/// Test peak >= rms >= 0 and the crest-factor identity on arbitrary input
#[test]
fn test_level_invariants_on_noise() {
    for seed in 1..20u64 {
        let raw = SampleBuffer::new(noise(seed * 7919, 0.8, 8192), RATE);
        let metrics = compute_metrics(&preprocess(&raw, 0.0), 1000.0);

        assert!(metrics.rms >= 0.0);
        assert!(metrics.peak >= metrics.rms, "seed {}", seed);
        assert!((metrics.crest_factor - metrics.peak / metrics.rms).abs() < 1e-9);
        assert!(metrics.thd >= 0.0);
    }
}

/// Test that a second preprocessing pass is a no-op
#[test]
fn test_preprocess_idempotent() {
    let mut raw = noise(42, 3.0, 20000);
    raw[10] = f32::NAN;
    raw[500] = 25.0;
    raw[900] = f32::NEG_INFINITY;

    let once = preprocess(&SampleBuffer::new(raw, RATE), 0.3);
    let twice = preprocess(&once, 0.0);
    assert_eq!(once, twice);
}

/// Test that results accumulate in call order
#[test]
fn test_results_in_call_order() {
    let mut session = TestSession::default();
    for id in [5u32, 2, 9] {
        session.analyze(&tone(0.3), None, MicId(id), false).unwrap();
    }
    let ids: Vec<MicId> = session.all_results().iter().map(|r| r.mic_id).collect();
    assert_eq!(ids, vec![MicId(5), MicId(2), MicId(9)]);
    assert_eq!(session.summary().passed, 3);
}

/// Test that a capture too short to resolve the SNR band raises no SNR issue
#[test]
fn test_short_capture_leaves_snr_unjudged() {
    let mut session = TestSession::default();
    // 200 samples give 220.5 Hz bins, none of which lands in 900..=1100 Hz
    let short: Vec<f32> = tone(0.3).into_iter().take(200).collect();
    let result = session.analyze(&short, None, MicId(6), false).unwrap();

    assert!(result.metrics.snr_is_undefined());
    assert!(!result
        .issues
        .iter()
        .any(|i| matches!(i, Issue::SnrTooLow { .. })));

    let json = serde_json::to_value(&result).unwrap();
    assert!(json["snr_db"].is_null());
}
