//! Mictester - batch microphone acceptance testing
//!
//! Entry point for the command-line tool.

use anyhow::{Context, Result};
use mictester::{wav, MicId, TestConfig, TestResult, TestSession};
use std::path::{Path, PathBuf};
use tracing::{error, warn};

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("mictester=info".parse()?),
        )
        .init();

    // Parse command line arguments
    let args: Vec<String> = std::env::args().collect();

    let mut config_path: Option<PathBuf> = None;
    let mut reference_path: Option<PathBuf> = None;
    let mut captures: Vec<PathBuf> = Vec::new();
    let mut i = 1;

    while i < args.len() {
        match args[i].as_str() {
            "--version" | "-v" => {
                println!("mictester {}", mictester::VERSION);
                return Ok(());
            }
            "--help" | "-h" => {
                print_help();
                return Ok(());
            }
            "--config" | "-c" => {
                if i + 1 >= args.len() {
                    eprintln!("Error: --config requires a file path");
                    return Ok(());
                }
                config_path = Some(PathBuf::from(&args[i + 1]));
                i += 2;
                continue;
            }
            "--reference" | "-r" => {
                if i + 1 >= args.len() {
                    eprintln!("Error: --reference requires a WAV file");
                    return Ok(());
                }
                reference_path = Some(PathBuf::from(&args[i + 1]));
                i += 2;
                continue;
            }
            arg if arg.starts_with('-') => {
                eprintln!("Unknown argument: {}", arg);
                print_help();
                return Ok(());
            }
            _ => captures.push(PathBuf::from(&args[i])),
        }
        i += 1;
    }

    if captures.is_empty() && reference_path.is_none() {
        print_help();
        return Ok(());
    }

    println!("╔════════════════════════════════════════════════════════════╗");
    println!(
        "║          Mictester v{} - Microphone Acceptance Test        ║",
        mictester::VERSION
    );
    println!("╚════════════════════════════════════════════════════════════╝");
    println!();

    let config = match config_path {
        Some(path) => load_config(&path)?,
        None => TestConfig::default(),
    };
    let mut session = TestSession::new(config)?;

    let mut errors = 0usize;
    if let Some(path) = reference_path {
        if !run_capture(&mut session, &path, MicId(0), true) {
            errors += 1;
        }
    }
    for (index, path) in captures.iter().enumerate() {
        if !run_capture(&mut session, path, MicId(index as u32 + 1), false) {
            errors += 1;
        }
    }

    let summary = session.summary();
    println!("────────────────────────────────────────");
    println!(
        "Total: {} | Passed: {} | Failed: {} | Errors: {} | Pass rate: {:.1}%",
        summary.total, summary.passed, summary.failed, errors, summary.pass_rate_percent
    );

    if batch_failed(summary.failed, errors) {
        std::process::exit(1);
    }
    Ok(())
}

fn print_help() {
    println!("Usage: mictester [OPTIONS] CAPTURE.wav...");
    println!();
    println!("Options:");
    println!("  -c, --config FILE      Load thresholds from a JSON configuration");
    println!("  -r, --reference FILE   Capture of the standard microphone (analyzed first, ID 0)");
    println!("  -v, --version          Show version");
    println!("  -h, --help             Show this help");
    println!();
    println!("Captures are numbered 1..N in the order given.");
    println!();
    println!("Examples:");
    println!("  mictester -r golden.wav mic_*.wav");
    println!("  mictester -c config.json unit42.wav");
}

fn load_config(path: &Path) -> Result<TestConfig> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config {}", path.display()))?;
    let config = TestConfig::from_json(&contents)
        .with_context(|| format!("Invalid config {}", path.display()))?;
    tracing::info!(path = %path.display(), "Loaded config from disk");
    Ok(config)
}

/// A batch fails when any capture failed judgment or could not be analyzed
fn batch_failed(failed: usize, errors: usize) -> bool {
    failed > 0 || errors > 0
}

/// Load, analyze, and print one capture
///
/// Returns false when the capture could not be loaded or was rejected.
fn run_capture(session: &mut TestSession, path: &Path, mic_id: MicId, is_reference: bool) -> bool {
    let buffer = match wav::load_capture(path) {
        Ok(buffer) => buffer,
        Err(e) => {
            error!("Failed to load capture: {:#}", e);
            println!("Mic {:>4} | {} | ERROR: {:#}", mic_id, path.display(), e);
            return false;
        }
    };

    let expected_secs = session.config().duration;
    if buffer.duration_secs() < expected_secs {
        warn!(
            path = %path.display(),
            duration = buffer.duration_secs(),
            expected = expected_secs,
            "Capture shorter than configured duration"
        );
    }

    match session.analyze(&buffer.samples, Some(buffer.sample_rate), mic_id, is_reference) {
        Ok(result) => {
            println!("{}", format_result(&result));
            true
        }
        Err(e) => {
            error!(%mic_id, "Analysis rejected: {}", e);
            println!("Mic {:>4} | {} | ERROR: {}", mic_id, path.display(), e);
            false
        }
    }
}

fn format_result(result: &TestResult) -> String {
    let status = if result.is_reference {
        "REF "
    } else if result.is_pass {
        "PASS"
    } else {
        "FAIL"
    };
    let deviation = result
        .rms_deviation_percent
        .map(|d| format!("{:>+6.1}%", d))
        .unwrap_or_else(|| "      -".to_string());
    let snr = if result.metrics.snr_is_undefined() {
        "   n/a".to_string()
    } else {
        format!("{:>6.1}", result.metrics.snr_for_output())
    };
    format!(
        "Mic {:>4} | RMS {:.4} ({}) | Peak {:.4} | SNR {} dB | THD {:>5.2}% | {} | {}",
        result.mic_id,
        result.metrics.rms,
        deviation,
        result.metrics.peak,
        snr,
        result.metrics.thd_percent(),
        status,
        result.diagnosis()
    )
}
