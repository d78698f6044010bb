//! Configuration section types.
//!
//! Each section maps to a table in the configuration file and converts into
//! the runtime type it configures.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use trellis_core::INTERNAL_ERROR_MESSAGE;
use trellis_middleware::stages::PayloadLimit;
use trellis_middleware::ProcedureOptions;
use trellis_telemetry::LogConfig;

fn default_true() -> bool {
    true
}

// ============================================================================
// Procedure
// ============================================================================

/// Procedure invocation settings.
///
/// These are shared by every procedure built with
/// [`to_procedure_options`](Self::to_procedure_options).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ProcedureConfig {
    /// Return panic messages to callers instead of the generic message.
    #[serde(default)]
    pub expose_internal_errors: bool,

    /// Message returned for caught panics when internal errors are hidden.
    #[serde(default = "default_internal_error_message")]
    pub internal_error_message: String,

    /// Invocations slower than this are logged at `warn`.
    #[serde(default)]
    pub slow_invocation_threshold_ms: Option<u64>,

    /// Largest raw input accepted by a [`PayloadLimit`] stage.
    #[serde(default)]
    pub max_payload_bytes: Option<usize>,
}

impl Default for ProcedureConfig {
    fn default() -> Self {
        Self {
            expose_internal_errors: false,
            internal_error_message: default_internal_error_message(),
            slow_invocation_threshold_ms: None,
            max_payload_bytes: None,
        }
    }
}

fn default_internal_error_message() -> String {
    INTERNAL_ERROR_MESSAGE.to_string()
}

impl ProcedureConfig {
    /// Converts to the options a [`ProcedureBuilder`](trellis_middleware::ProcedureBuilder) takes.
    #[must_use]
    pub fn to_procedure_options(&self) -> ProcedureOptions {
        let options = ProcedureOptions::default()
            .expose_internal_errors(self.expose_internal_errors)
            .internal_error_message(self.internal_error_message.clone());

        match self.slow_invocation_threshold_ms {
            Some(ms) => options.slow_invocation_threshold(Duration::from_millis(ms)),
            None => options,
        }
    }

    /// Returns the payload limit stage, if a limit is configured.
    #[must_use]
    pub fn payload_limit(&self) -> Option<PayloadLimit> {
        self.max_payload_bytes.map(PayloadLimit::new)
    }
}

// ============================================================================
// Logging
// ============================================================================

/// Log output format.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// One JSON object per line.
    #[default]
    Json,
    /// Human-readable multi-line output.
    Pretty,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Enable logging.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Filter directives (e.g. "info" or "info,trellis_middleware=debug").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log output format.
    #[serde(default)]
    pub format: LogFormat,

    /// Include ANSI color codes in pretty output.
    #[serde(default)]
    pub ansi_enabled: bool,

    /// Include source file and line in logs.
    #[serde(default)]
    pub include_location: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            level: default_log_level(),
            format: LogFormat::default(),
            ansi_enabled: false,
            include_location: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl LoggingConfig {
    /// Converts to the subscriber settings used by
    /// [`init_logging`](trellis_telemetry::init_logging).
    ///
    /// Pretty output also logs span open and close events.
    #[must_use]
    pub fn to_log_config(&self) -> LogConfig {
        let pretty = self.format == LogFormat::Pretty;
        LogConfig {
            enabled: self.enabled,
            level: self.level.clone(),
            json_format: !pretty,
            ansi: self.ansi_enabled,
            span_events: pretty,
            file_line_info: self.include_location,
            ..LogConfig::default()
        }
    }
}

/// Telemetry configuration section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(deny_unknown_fields)]
pub struct TelemetryConfigSection {
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}
