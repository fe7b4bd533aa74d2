//! Ordered storage of test results
//!
//! Results are appended once per analysis and never modified afterwards.
//! Exporters read the full sequence plus [`SessionSummary`].

use crate::audio::metrics::Metrics;
use crate::quality::judge::Issue;
use crate::session::TestError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Diagnosis text for a result without issues
pub const NORMAL_DIAGNOSIS: &str = "normal";

/// Microphone identifier as printed on the unit under test
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MicId(pub u32);

impl fmt::Display for MicId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl FromStr for MicId {
    type Err = TestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<u32>()
            .map(MicId)
            .map_err(|_| TestError::InvalidMicId(s.to_string()))
    }
}

impl From<u32> for MicId {
    fn from(id: u32) -> Self {
        MicId(id)
    }
}

/// Outcome of analyzing one capture
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TestResult {
    pub mic_id: MicId,
    pub timestamp: DateTime<Utc>,
    /// Sample rate the capture was analyzed at
    pub sample_rate: u32,
    #[serde(flatten)]
    pub metrics: Metrics,
    /// Deviation from the reference RMS in percent, when compared
    pub rms_deviation_percent: Option<f64>,
    pub is_pass: bool,
    /// Capture was designated the standard microphone
    pub is_reference: bool,
    /// Diagnostics in rule order
    pub issues: Vec<Issue>,
}

impl TestResult {
    /// Issues joined with `"; "`, or `"normal"` when there are none
    pub fn diagnosis(&self) -> String {
        if self.issues.is_empty() {
            return NORMAL_DIAGNOSIS.to_string();
        }
        self.issues
            .iter()
            .map(|issue| issue.to_string())
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Aggregate counts over a session
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct SessionSummary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    /// Passed over total in percent, 0 for an empty session
    pub pass_rate_percent: f64,
}

/// Append-only list of results for the current session
#[derive(Debug, Default)]
pub struct SessionStore {
    results: Vec<TestResult>,
}

impl SessionStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a result
    pub fn push(&mut self, result: TestResult) {
        tracing::info!(
            mic_id = %result.mic_id,
            is_pass = result.is_pass,
            position = self.results.len(),
            "Result recorded"
        );
        self.results.push(result);
    }

    /// All results in insertion order
    pub fn results(&self) -> &[TestResult] {
        &self.results
    }

    /// Most recent result for a microphone
    pub fn latest_for(&self, mic_id: MicId) -> Option<&TestResult> {
        self.results.iter().rev().find(|r| r.mic_id == mic_id)
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Total, passed, failed, and pass rate
    pub fn summary(&self) -> SessionSummary {
        let total = self.results.len();
        let passed = self.results.iter().filter(|r| r.is_pass).count();
        let pass_rate_percent = if total > 0 {
            passed as f64 / total as f64 * 100.0
        } else {
            0.0
        };
        SessionSummary {
            total,
            passed,
            failed: total - passed,
            pass_rate_percent,
        }
    }

    /// Drop every result
    pub fn clear(&mut self) {
        self.results.clear();
    }
}
