//! Reusable middleware stages.
//!
//! Unlike a fixed pipeline, procedures pick the stages they need and the
//! order they run in. These are the building blocks most procedures share:
//!
//! - [`validation`] - turn raw input into a typed value, or `BAD_REQUEST`
//! - [`context_swap`] - derive a new context, or short-circuit
//! - [`authentication`] - require a user (`UNAUTHORIZED`) and roles (`FORBIDDEN`)
//! - [`guard`] - forward unchanged when a predicate passes
//! - [`payload_limit`] - reject oversized raw input (`PAYLOAD_TOO_LARGE`)

pub mod authentication;
pub mod context_swap;
pub mod guard;
pub mod payload_limit;
pub mod validation;

pub use authentication::{require_role, require_user, AuthenticationMiddleware, RequireUser, RoleGate};
pub use context_swap::{ContextSwapMiddleware, DeriveContext, FnDerive};
pub use guard::Guard;
pub use payload_limit::PayloadLimit;
pub use validation::{
    validate_json, AsyncFnValidator, FieldType, FnValidator, JsonValidator, Schema, SchemaBuilder,
    SchemaValidator, SchemaViolations, ValidationMiddleware, Validator, Violation,
};
