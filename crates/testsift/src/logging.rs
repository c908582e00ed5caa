//! Subscriber setup for callers that do not install their own.
//!
//! testsift only emits `tracing` events. Embedding tools usually own the
//! subscriber; [`init`] is for small drivers and tests.

use crate::config::LogLevel;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Output format of the installed subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Compact human-readable lines
    #[default]
    Compact,
    /// One JSON object per event
    Json,
}

fn filter_for(level: LogLevel) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("testsift={}", level.filter_directive())))
}

/// Install a global subscriber at `level`; `RUST_LOG` overrides it
///
/// Returns false when a subscriber was already installed.
pub fn init(level: LogLevel) -> bool {
    init_with_format(level, LogFormat::Compact)
}

/// Install a global subscriber with an explicit output format
pub fn init_with_format(level: LogLevel, format: LogFormat) -> bool {
    let registry = tracing_subscriber::registry().with(filter_for(level));
    let installed = match format {
        LogFormat::Compact => registry
            .with(tracing_subscriber::fmt::layer().with_target(false).compact())
            .try_init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_target(true))
            .try_init(),
    };
    installed.is_ok()
}

/// Subscriber for unit tests: writes through the test harness capture
pub fn init_test_logging() {
    let _ = tracing_subscriber::registry()
        .with(filter_for(LogLevel::Debug))
        .with(tracing_subscriber::fmt::layer().with_test_writer().compact())
        .try_init();
}
