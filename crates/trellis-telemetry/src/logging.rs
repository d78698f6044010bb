//! Structured logging for Trellis.
//!
//! Procedures emit `tracing` events inside a `procedure` span carrying the
//! procedure name and a per-invocation ID. This module installs a
//! `tracing-subscriber` stack that renders them as JSON (production) or
//! pretty text (development).
//!
//! # Example
//!
//! ```rust,ignore
//! use trellis_telemetry::logging::{LogConfig, init_logging};
//!
//! init_logging(&LogConfig::production())?;
//!
//! tracing::info!(procedure = "greet", "ready");
//! ```

use crate::error::TelemetryError;
use crate::TelemetryResult;
use tracing::Subscriber;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    /// Whether logging is enabled.
    pub enabled: bool,

    /// Filter directives (e.g., "info", "trellis_middleware=debug").
    pub level: String,

    /// Whether to output JSON format.
    pub json_format: bool,

    /// Whether to colorize pretty output.
    pub ansi: bool,

    /// Whether to include span events (new, close).
    pub span_events: bool,

    /// Whether to include file/line info.
    pub file_line_info: bool,

    /// Whether to include thread IDs.
    pub thread_ids: bool,

    /// Whether to include target (module path).
    pub include_target: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            level: "info".to_string(),
            json_format: true,
            ansi: false,
            span_events: false,
            file_line_info: false,
            thread_ids: false,
            include_target: true,
        }
    }
}

impl LogConfig {
    /// Creates a development configuration with human-readable output.
    #[must_use]
    pub fn development() -> Self {
        Self {
            enabled: true,
            level: "debug".to_string(),
            json_format: false,
            ansi: true,
            span_events: true,
            file_line_info: true,
            thread_ids: false,
            include_target: true,
        }
    }

    /// Creates a production configuration with JSON output.
    #[must_use]
    pub fn production() -> Self {
        Self::default()
    }
}

/// Builds the subscriber described by `config`, writing to `writer`.
///
/// [`init_logging`] installs this with stdout as the writer; tests pass a
/// [`LogCapture`](crate::LogCapture) instead.
///
/// # Errors
///
/// Returns `TelemetryError::InvalidFilter` if `config.level` does not parse.
pub fn build_subscriber<W>(config: &LogConfig, writer: W) -> TelemetryResult<Box<dyn Subscriber + Send + Sync>>
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let filter = create_env_filter(&config.level)?;

    let span_events = if config.span_events {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    let subscriber: Box<dyn Subscriber + Send + Sync> = if config.json_format {
        let fmt_layer = tracing_subscriber::fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(false)
            .with_writer(writer)
            .with_span_events(span_events)
            .with_file(config.file_line_info)
            .with_line_number(config.file_line_info)
            .with_thread_ids(config.thread_ids)
            .with_target(config.include_target)
            .with_filter(filter);
        Box::new(tracing_subscriber::registry().with(fmt_layer))
    } else {
        let fmt_layer = tracing_subscriber::fmt::layer()
            .pretty()
            .with_ansi(config.ansi)
            .with_writer(writer)
            .with_span_events(span_events)
            .with_file(config.file_line_info)
            .with_line_number(config.file_line_info)
            .with_thread_ids(config.thread_ids)
            .with_target(config.include_target)
            .with_filter(filter);
        Box::new(tracing_subscriber::registry().with(fmt_layer))
    };

    Ok(subscriber)
}

/// Initializes the global logging subscriber.
///
/// Does nothing when `config.enabled` is false.
///
/// # Errors
///
/// Returns `TelemetryError::LoggingInit` if a global subscriber is already
/// installed, or `TelemetryError::InvalidFilter` for a bad filter.
pub fn init_logging(config: &LogConfig) -> TelemetryResult<()> {
    if !config.enabled {
        return Ok(());
    }

    let subscriber = build_subscriber(config, std::io::stdout)?;
    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| TelemetryError::LoggingInit(e.to_string()))
}

/// Creates an env filter from a string.
///
/// # Errors
///
/// Returns error if the filter string is invalid.
pub fn create_env_filter(filter: &str) -> TelemetryResult<EnvFilter> {
    EnvFilter::try_new(filter).map_err(|e| TelemetryError::InvalidFilter {
        filter: filter.to_string(),
        reason: e.to_string(),
    })
}

/// Field names Trellis procedures log with.
pub mod fields {
    /// Procedure name, recorded on the `procedure` span.
    pub const PROCEDURE: &str = "procedure";

    /// Per-invocation UUID v7, recorded on the `procedure` span.
    pub const INVOCATION_ID: &str = "invocation_id";

    /// Name of the stage that short-circuited.
    pub const STAGE: &str = "stage";

    /// Error code name of a failure.
    pub const CODE: &str = "code";

    /// Duration field name (in milliseconds).
    pub const DURATION_MS: &str = "duration_ms";

    /// Panic message of a caught panic.
    pub const PANIC: &str = "panic";
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::LogCapture;

    #[test]
    fn test_default_config() {
        let config = LogConfig::default();
        assert!(config.enabled);
        assert!(config.json_format);
        assert_eq!(config.level, "info");
    }

    #[test]
    fn test_development_config() {
        let config = LogConfig::development();
        assert!(!config.json_format);
        assert!(config.span_events);
        assert!(config.file_line_info);
        assert_eq!(config.level, "debug");
    }

    #[test]
    fn test_production_is_default() {
        assert_eq!(LogConfig::production(), LogConfig::default());
    }

    #[test]
    fn test_create_env_filter() {
        assert!(create_env_filter("info,trellis_middleware=trace").is_ok());
        assert!(matches!(
            create_env_filter("trellis=loud"),
            Err(TelemetryError::InvalidFilter { .. })
        ));
    }

    #[test]
    fn test_disabled_logging() {
        let config = LogConfig {
            enabled: false,
            ..Default::default()
        };

        // Should return Ok even when disabled
        assert!(init_logging(&config).is_ok());
    }

    #[test]
    fn test_json_subscriber_writes_span_fields() {
        let capture = LogCapture::new();
        let subscriber = build_subscriber(&LogConfig::default(), capture.clone()).unwrap();

        tracing::subscriber::with_default(subscriber, || {
            let span = tracing::info_span!("procedure", procedure = "greet");
            let _entered = span.enter();
            tracing::info!(stage = "validation", "procedure short-circuited");
            tracing::debug!("filtered out at info");
        });

        let events = capture.json_lines();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0]["fields"]["stage"], "validation");
        assert_eq!(events[0]["span"][fields::PROCEDURE], "greet");
    }

    #[test]
    fn test_pretty_subscriber_writes_text() {
        let capture = LogCapture::new();
        let config = LogConfig {
            ansi: false,
            ..LogConfig::development()
        };
        let subscriber = build_subscriber(&config, capture.clone()).unwrap();

        tracing::subscriber::with_default(subscriber, || {
            tracing::warn!("slow procedure invocation");
        });

        assert!(capture.contents().contains("slow procedure invocation"));
    }
}
