//! Main configuration types.
//!
//! This module provides the top-level [`TrellisConfig`] struct and its builder.

use serde::{Deserialize, Serialize};
use trellis_telemetry::create_env_filter;

use crate::{ConfigError, LogFormat, ProcedureConfig, TelemetryConfigSection};

/// Complete Trellis configuration.
///
/// Use [`ConfigLoader`](crate::ConfigLoader) to load it from files and
/// environment variables.
///
/// # Example
///
/// ```
/// use trellis_config::TrellisConfig;
///
/// let config = TrellisConfig::default();
/// assert!(!config.procedure.expose_internal_errors);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(deny_unknown_fields)]
pub struct TrellisConfig {
    /// Procedure invocation settings.
    #[serde(default)]
    pub procedure: ProcedureConfig,

    /// Telemetry configuration.
    #[serde(default)]
    pub telemetry: TelemetryConfigSection,
}

impl TrellisConfig {
    /// Create a new configuration builder.
    #[must_use]
    pub fn builder() -> TrellisConfigBuilder {
        TrellisConfigBuilder::new()
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if:
    /// - The internal error message is empty
    /// - The slow invocation threshold or payload limit is zero
    /// - The log level is not a valid filter
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.procedure.internal_error_message.trim().is_empty() {
            return Err(ConfigError::invalid_value(
                "procedure.internal_error_message",
                "must not be empty",
            ));
        }

        if self.procedure.slow_invocation_threshold_ms == Some(0) {
            return Err(ConfigError::invalid_value(
                "procedure.slow_invocation_threshold_ms",
                "must be greater than zero",
            ));
        }

        if self.procedure.max_payload_bytes == Some(0) {
            return Err(ConfigError::invalid_value(
                "procedure.max_payload_bytes",
                "must be greater than zero",
            ));
        }

        if let Err(e) = create_env_filter(&self.telemetry.logging.level) {
            return Err(ConfigError::invalid_value(
                "telemetry.logging.level",
                e.to_string(),
            ));
        }

        Ok(())
    }

    /// Create a development configuration preset.
    ///
    /// - Pretty log formatting with ANSI colors and source locations
    /// - Debug log level
    /// - Panic messages returned to callers
    ///
    /// # Example
    ///
    /// ```
    /// use trellis_config::{LogFormat, TrellisConfig};
    ///
    /// let config = TrellisConfig::development();
    /// assert_eq!(config.telemetry.logging.format, LogFormat::Pretty);
    /// assert!(config.procedure.expose_internal_errors);
    /// ```
    #[must_use]
    pub fn development() -> Self {
        let mut config = Self::default();
        config.procedure.expose_internal_errors = true;
        config.telemetry.logging.level = "debug".to_string();
        config.telemetry.logging.format = LogFormat::Pretty;
        config.telemetry.logging.ansi_enabled = true;
        config.telemetry.logging.include_location = true;
        config
    }

    /// Create a production configuration preset.
    ///
    /// JSON logs at `info`, internal errors hidden, and invocations slower
    /// than one second logged as slow.
    #[must_use]
    pub fn production() -> Self {
        let mut config = Self::default();
        config.procedure.expose_internal_errors = false;
        config.procedure.slow_invocation_threshold_ms = Some(1_000);
        config.telemetry.logging.level = "info".to_string();
        config.telemetry.logging.format = LogFormat::Json;
        config.telemetry.logging.ansi_enabled = false;
        config
    }
}

/// Builder for [`TrellisConfig`].
#[derive(Debug, Default)]
pub struct TrellisConfigBuilder {
    config: TrellisConfig,
}

impl TrellisConfigBuilder {
    /// Create a new builder with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the procedure section.
    #[must_use]
    pub fn procedure(mut self, procedure: ProcedureConfig) -> Self {
        self.config.procedure = procedure;
        self
    }

    /// Set the telemetry section.
    #[must_use]
    pub fn telemetry(mut self, telemetry: TelemetryConfigSection) -> Self {
        self.config.telemetry = telemetry;
        self
    }

    /// Build the configuration without validation.
    #[must_use]
    pub fn build(self) -> TrellisConfig {
        self.config
    }

    /// Build and validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if validation fails.
    pub fn build_validated(self) -> Result<TrellisConfig, ConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }
}
