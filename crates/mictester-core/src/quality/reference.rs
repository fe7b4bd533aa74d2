//! Standard microphone registry
//!
//! Holds at most one reference record. Designating a new reference overwrites
//! the previous one outright.

use crate::audio::metrics::Metrics;
use crate::session::store::{MicId, TestResult};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Snapshot of the standard microphone's measurement
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReferenceRecord {
    pub mic_id: MicId,
    /// When the reference capture was analyzed
    pub timestamp: DateTime<Utc>,
    pub metrics: Metrics,
}

impl From<&TestResult> for ReferenceRecord {
    fn from(result: &TestResult) -> Self {
        Self {
            mic_id: result.mic_id,
            timestamp: result.timestamp,
            metrics: result.metrics,
        }
    }
}

/// Acceptable RMS window around the reference
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RmsRange {
    pub min: f64,
    pub max: f64,
}

impl RmsRange {
    /// `[rms * (1 - tolerance), rms * (1 + tolerance)]`
    pub fn around(rms: f64, tolerance: f64) -> Self {
        Self {
            min: rms * (1.0 - tolerance),
            max: rms * (1.0 + tolerance),
        }
    }

    pub fn contains(&self, rms: f64) -> bool {
        rms >= self.min && rms <= self.max
    }
}

/// The current reference together with its derived RMS window
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReferenceView {
    #[serde(flatten)]
    pub record: ReferenceRecord,
    pub rms_range: RmsRange,
}

/// Holds zero or one [`ReferenceRecord`]
#[derive(Debug, Default)]
pub struct ReferenceRegistry {
    record: Option<ReferenceRecord>,
}

impl ReferenceRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a reference, replacing any previous one
    pub fn set(&mut self, record: ReferenceRecord) {
        if let Some(previous) = &self.record {
            tracing::info!(
                previous = %previous.mic_id,
                mic_id = %record.mic_id,
                "Replacing reference microphone"
            );
        } else {
            tracing::info!(
                mic_id = %record.mic_id,
                rms = record.metrics.rms,
                "Reference microphone set"
            );
        }
        self.record = Some(record);
    }

    /// The stored reference, if any
    pub fn record(&self) -> Option<&ReferenceRecord> {
        self.record.as_ref()
    }

    /// The stored reference with its acceptable RMS window
    ///
    /// # Arguments
    /// * `tolerance` - Fractional sensitivity tolerance (0.3 = ±30%)
    pub fn get(&self, tolerance: f64) -> Option<ReferenceView> {
        self.record.as_ref().map(|record| ReferenceView {
            record: record.clone(),
            rms_range: RmsRange::around(record.metrics.rms, tolerance),
        })
    }

    pub fn is_set(&self) -> bool {
        self.record.is_some()
    }

    /// Forget the reference
    pub fn clear(&mut self) {
        self.record = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn record(mic_id: u32, rms: f64) -> ReferenceRecord {
        ReferenceRecord {
            mic_id: MicId(mic_id),
            timestamp: Utc::now(),
            metrics: Metrics {
                rms,
                ..Metrics::default()
            },
        }
    }

    #[test]
    fn test_registry_starts_empty() {
        let registry = ReferenceRegistry::new();
        assert!(!registry.is_set());
        assert!(registry.get(0.3).is_none());
    }

    #[test]
    fn test_set_overwrites() {
        let mut registry = ReferenceRegistry::new();
        registry.set(record(1, 0.5));
        registry.set(record(2, 0.2));
        let stored = registry.record().unwrap();
        assert_eq!(stored.mic_id, MicId(2));
        assert_eq!(stored.metrics.rms, 0.2);
    }

    #[test]
    fn test_rms_range() {
        let mut registry = ReferenceRegistry::new();
        registry.set(record(7, 0.5));
        let view = registry.get(0.3).unwrap();
        assert_abs_diff_eq!(view.rms_range.min, 0.35, epsilon = 1e-12);
        assert_abs_diff_eq!(view.rms_range.max, 0.65, epsilon = 1e-12);
        assert!(view.rms_range.contains(0.5));
        assert!(!view.rms_range.contains(0.3));
    }

    #[test]
    fn test_clear() {
        let mut registry = ReferenceRegistry::new();
        registry.set(record(1, 0.5));
        registry.clear();
        assert!(registry.record().is_none());
    }

    #[test]
    fn test_view_serializes_flat() {
        let mut registry = ReferenceRegistry::new();
        registry.set(record(3, 0.4));
        let json = serde_json::to_value(registry.get(0.25).unwrap()).unwrap();
        assert_eq!(json["mic_id"], 3);
        assert!(json["metrics"]["rms"].is_number());
        assert!(json["rms_range"]["min"].is_number());
    }
}
