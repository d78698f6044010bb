//! # Trellis
//!
//! **Typed middleware chains for remote procedures**
//!
//! A procedure is an ordered chain of stages followed by a resolver. Each
//! stage receives the previous stage's parameters and either forwards new
//! ones or short-circuits with an error; the resolver produces the result.
//! Every outcome is an [`Envelope`](core::Envelope): success data or a
//! failure from a fixed error code table.
//!
//! - **Type-checked chains** – a stage's output type is the next stage's input
//! - **Forward once or reject** – stages settle through a consumable `Next`
//! - **Validation and context swap** – stock stages for input checking and
//!   context narrowing (authentication, tenancy)
//! - **Panics contained** – a panicking stage becomes `INTERNAL_SERVER_ERROR`
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use trellis::prelude::*;
//!
//! #[derive(serde::Deserialize)]
//! struct Hello {
//!     hello: String,
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ConfigLoader::new().with_env_prefix("TRELLIS").load()?;
//!     init_logging(&config.telemetry.logging.to_log_config())?;
//!
//!     let greet = Procedure::<Params<RequestContext>, String>::builder()
//!         .named("greet")
//!         .options(config.procedure.to_procedure_options())
//!         .stage(require_user())
//!         .stage(validate_json::<Hello>())
//!         .resolve(|params: Params<Authenticated<RequestContext>, Hello>| async move {
//!             Envelope::success(format!("{} from {}", params.input.hello, params.ctx.user().id))
//!         });
//!
//!     let ctx = RequestContext::new().with_caller(CallerIdentity::user("42"));
//!     let result = greet
//!         .invoke(Params::with_raw_input(ctx, serde_json::json!({"hello": "hi"})))
//!         .await;
//!     println!("{}", serde_json::to_string(&result)?);
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! invoke(params) → stage 1 → stage 2 → … → resolver
//!                     ↓ reject   ↓ reject        ↓
//! Envelope ←──────────┴──────────┴───────────────┘
//! ```

#![doc(html_root_url = "https://docs.rs/trellis/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

// Re-export core types
pub use trellis_core as core;

// Re-export middleware and procedure types
pub use trellis_middleware as middleware;

// Re-export the procedure! macro
pub use trellis_middleware::procedure;

// Re-export logging setup
pub use trellis_telemetry as telemetry;

// Re-export configuration
pub use trellis_config as config;

/// Prelude module for convenient imports.
///
/// # Example
///
/// ```rust,ignore
/// use trellis::prelude::*;
/// ```
pub mod prelude {
    pub use trellis_core::{
        Authenticated, CallerContext, CallerIdentity, Envelope, ErrorCode, ErrorData, Params,
        RawInput, RequestContext, RequestId, UserIdentity,
    };

    pub use trellis_middleware::{
        BoxFuture, Middleware, Next, Procedure, ProcedureBuilder, ProcedureOptions, Settled,
    };

    // Stock stages
    pub use trellis_middleware::stages::{
        require_role, require_user, validate_json, ContextSwapMiddleware, Guard, JsonValidator,
        PayloadLimit, Schema, ValidationMiddleware, Validator,
    };

    pub use trellis_middleware::procedure;

    pub use trellis_config::{ConfigLoader, TrellisConfig};
    pub use trellis_telemetry::{init_logging, LogConfig};
}
