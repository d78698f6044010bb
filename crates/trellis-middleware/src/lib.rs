//! # Trellis Middleware
//!
//! Procedures: ordered chains of middleware stages around a terminal
//! resolver.
//!
//! ```text
//! invoke(P0) → stage 1 → stage 2 → … → stage n → resolver
//!                 │          │             │          │
//! Envelope ←──────┴──────────┴─────────────┴──────────┘
//! ```
//!
//! Each stage either forwards new params to the next stage or short-circuits
//! with a failure. Whatever the resolver returns flows back up unchanged.
//!
//! ## Key Features
//!
//! - **Typed chaining**: each stage declares what it receives and what it
//!   forwards; mismatched stages do not compile
//! - **Exactly-once forwarding**: [`Next`] is consumed by forwarding or
//!   rejecting, and the [`Settled`] value a stage returns cannot be built
//!   any other way
//! - **Failures are values**: panics in stages, validators, context
//!   derivations, and resolvers are caught and returned as
//!   `INTERNAL_SERVER_ERROR`
//! - **Reusable stages**: validation, context swap, authentication, guards,
//!   payload limits
//!
//! ## Example
//!
//! ```
//! use serde::Deserialize;
//! use serde_json::json;
//! use trellis_core::{Authenticated, CallerIdentity, Envelope, ErrorCode, Params, RequestContext};
//! use trellis_middleware::stages::{require_user, validate_json};
//! use trellis_middleware::Procedure;
//!
//! #[derive(Deserialize)]
//! struct Greeting {
//!     hello: String,
//! }
//!
//! # tokio_test::block_on(async {
//! let greet = Procedure::<Params<RequestContext>, String>::builder()
//!     .named("greet")
//!     .stage(require_user())
//!     .stage(validate_json::<Greeting>())
//!     .resolve(|params: Params<Authenticated<RequestContext>, Greeting>| async move {
//!         Envelope::success(format!("{} from {}", params.input.hello, params.ctx.user().id))
//!     });
//!
//! let ctx = RequestContext::new().with_caller(CallerIdentity::user("42"));
//! let ok = greet.invoke(Params::with_raw_input(ctx, json!({"hello": "hi"}))).await;
//! assert_eq!(ok, Envelope::success("hi from 42".to_string()));
//!
//! let anonymous = greet.invoke(Params::new(RequestContext::new())).await;
//! assert_eq!(anonymous.code(), Some(ErrorCode::Unauthorized));
//! # });
//! ```

#![doc(html_root_url = "https://docs.rs/trellis-middleware/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod middleware;
pub mod procedure;
pub mod stages;

// Re-export main types at crate root
pub use middleware::{BoxFuture, FnMiddleware, Middleware, Next, Settled};
pub use procedure::{Procedure, ProcedureBuilder, ProcedureOptions, StageDescriptor};
