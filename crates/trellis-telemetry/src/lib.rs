//! Structured logging for Trellis.
//!
//! Procedures log through `tracing`; this crate decides where those events go
//! and how they look:
//!
//! - **JSON** for production, one object per line with the current span's
//!   fields (`procedure`, `invocation_id`) attached
//! - **Pretty** text for development, with span open/close events
//! - **Capture** into memory for tests via [`LogCapture`]
//!
//! # Example
//!
//! ```rust,ignore
//! use trellis_telemetry::{init_logging, LogConfig};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     init_logging(&LogConfig::development())?;
//!     // procedures now log to stdout
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]

pub mod capture;
pub mod error;
pub mod logging;

pub use capture::LogCapture;
pub use error::TelemetryError;
pub use logging::{build_subscriber, create_env_filter, fields, init_logging, LogConfig};

/// Result type for telemetry operations.
pub type TelemetryResult<T> = Result<T, TelemetryError>;
