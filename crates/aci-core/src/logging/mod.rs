//! Structured logging with `tracing`.
//!
//! This module provides:
//! - [`init_subscriber`] for setting up the process-wide `tracing` subscriber
//!   (stderr, plus an optional append-only log file)
//! - [`capture_logs`] for installing a thread-scoped capturing subscriber in
//!   tests
//!
//! # Architecture
//!
//! Library code never installs a subscriber. It only emits `tracing` events
//! with structured fields; the binary decides where they go. Background tasks
//! spawned by the supervisor carry the dispatcher that was current when they
//! were spawned, so a test that installs [`capture_logs`] sees events from
//! every task of the session it drives.

pub mod test_utils;

use std::fs::{File, OpenOptions};
use std::path::Path;
use std::sync::Mutex;

pub use test_utils::{CapturedEvent, CapturedLogs, capture_logs};

/// Initialize the global tracing subscriber.
///
/// Call once at application startup. Subsequent calls are no-ops.
/// Human-readable output always goes to stderr; when `log_file` is given the
/// same events are appended to that file without ANSI colours.
///
/// # Arguments
///
/// * `level` - Minimum log level when `RUST_LOG` is unset (e.g. `"info"`).
/// * `log_file` - Optional path of a log file to append to.
pub fn init_subscriber(level: &str, log_file: Option<&Path>) -> std::io::Result<()> {
    use tracing_subscriber::EnvFilter;
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_writer(std::io::stderr)
        .compact();

    let file_layer = match log_file {
        Some(path) => Some(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_ansi(false)
                .with_writer(Mutex::new(open_log_file(path)?)),
        ),
        None => None,
    };

    // try_init is a no-op if a global subscriber is already set
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init();

    Ok(())
}

/// Open `path` for appending, creating it and its parent directory if needed.
pub fn open_log_file(path: &Path) -> std::io::Result<File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    OpenOptions::new().create(true).append(true).open(path)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
