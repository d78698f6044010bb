//! Typed configuration for Trellis.
//!
//! This crate provides a strongly-typed configuration system with support for:
//! - TOML and JSON configuration files
//! - Environment variable overrides
//! - Strict validation (fails on unknown fields)
//! - Layered configuration (defaults → file → env)
//!
//! The root [`TrellisConfig`] has two sections:
//!
//! - [`ProcedureConfig`] - panic redaction, slow-invocation threshold, payload limit
//! - [`TelemetryConfigSection`] - logging
//!
//! # Example
//!
//! ```no_run
//! use trellis_config::ConfigLoader;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ConfigLoader::new()
//!     .with_file("trellis.toml")?
//!     .with_env_prefix("TRELLIS")
//!     .load()?;
//!
//! trellis_telemetry::init_logging(&config.telemetry.logging.to_log_config())?;
//! let options = config.procedure.to_procedure_options();
//! # let _ = options;
//! # Ok(())
//! # }
//! ```
//!
//! # Configuration File Format
//!
//! ```toml
//! [procedure]
//! expose_internal_errors = false
//! internal_error_message = "An internal error occurred"
//! slow_invocation_threshold_ms = 1000
//! max_payload_bytes = 65536
//!
//! [telemetry.logging]
//! enabled = true
//! level = "info"
//! format = "json"
//! ```
//!
//! # Environment Variable Overrides
//!
//! Values can be overridden with `PREFIX__SECTION__KEY` variables:
//!
//! - `TRELLIS__PROCEDURE__MAX_PAYLOAD_BYTES=1024`
//! - `TRELLIS__TELEMETRY__LOGGING__FORMAT=pretty`

#![warn(missing_docs)]

mod config;
mod error;
mod loader;
mod schema;

pub use config::{TrellisConfig, TrellisConfigBuilder};
pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use schema::{LogFormat, LoggingConfig, ProcedureConfig, TelemetryConfigSection};
