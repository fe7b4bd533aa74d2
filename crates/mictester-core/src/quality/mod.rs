//! Quality judgment module
//!
//! - Ordered pass/fail rules and diagnostics ([`judge`])
//! - Standard microphone registry for sensitivity comparison ([`reference`])

pub mod judge;
pub mod reference;
