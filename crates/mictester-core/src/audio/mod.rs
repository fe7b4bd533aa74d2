//! Audio analysis module
//!
//! This module contains the signal side of the pipeline:
//! - Buffer sanitizing and peak normalization ([`preprocess`])
//! - Welch PSD and positive-frequency DFT magnitudes ([`spectrum`])
//! - Level, shape, SNR, and THD metrics ([`metrics`])

pub mod metrics;
pub mod preprocess;
pub mod spectrum;
