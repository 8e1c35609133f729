//! Logging setup and span constructors shared by the Xalo binaries.

use std::sync::Once;
use tracing::Span;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static INIT: Once = Once::new();

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// JSON structured logs (for production).
    Json,
    /// Pretty-printed logs (for development).
    #[default]
    Pretty,
}

/// Initializes the logging subsystem.
///
/// Safe to call multiple times; only the first call installs a subscriber.
/// Levels come from `RUST_LOG` (e.g. `info`, `xalo_core=debug`).
///
/// ```rust
/// use xalo_core::observability::{init_logging, LogFormat};
///
/// init_logging(LogFormat::Pretty);
/// ```
pub fn init_logging(format: LogFormat) {
    INIT.call_once(|| {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        // try_init: a test harness may already own the global subscriber
        let result = match format {
            LogFormat::Json => tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json())
                .try_init(),
            LogFormat::Pretty => tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().pretty())
                .try_init(),
        };
        if let Err(e) = result {
            eprintln!("logging already initialized: {e}");
        }
    });
}

/// Span for schedule operations.
#[must_use]
pub fn schedule_span(operation: &str, schedule_id: Option<&str>) -> Span {
    tracing::info_span!(
        "schedule",
        op = operation,
        schedule_id = schedule_id.unwrap_or("-"),
    )
}

/// Span for a gallery reconciliation pass.
///
/// ```rust
/// use xalo_core::observability::gallery_span;
///
/// let span = gallery_span(2, 3);
/// let _guard = span.enter();
/// ```
#[must_use]
pub fn gallery_span(retained: usize, pending: usize) -> Span {
    tracing::info_span!("gallery", retained = retained, pending = pending)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_logging_is_idempotent() {
        init_logging(LogFormat::Pretty);
        init_logging(LogFormat::Json);
    }

    #[test]
    fn span_helpers_create_spans() {
        let span = schedule_span("update", Some("01HZX"));
        let _guard = span.enter();
        tracing::info!("inside schedule span");

        let span = gallery_span(1, 2);
        let _guard = span.enter();
        tracing::info!("inside gallery span");
    }
}
