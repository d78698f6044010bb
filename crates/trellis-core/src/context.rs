//! Request identifiers and a ready-made request context.

use crate::identity::{CallerContext, CallerIdentity};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use uuid::Uuid;

/// A unique identifier using UUID v7.
///
/// UUID v7 is time-ordered, which keeps log correlation sortable. Procedures
/// also mint one per invocation for their tracing span.
///
/// # Example
///
/// ```
/// use trellis_core::RequestId;
///
/// let id = RequestId::new();
/// assert_ne!(id, RequestId::new());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(Uuid);

impl RequestId {
    /// Creates a new unique ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Creates an ID from an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for RequestId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// A general-purpose initial context.
///
/// Applications with their own context type only need to implement
/// [`CallerContext`] to use the authentication stage; this type is for the
/// common case.
///
/// # Example
///
/// ```
/// use trellis_core::{CallerContext, CallerIdentity, RequestContext};
///
/// let ctx = RequestContext::new().with_caller(CallerIdentity::user("42"));
/// assert_eq!(ctx.user().unwrap().id, "42");
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct RequestContext {
    request_id: RequestId,
    caller: CallerIdentity,
    operation_id: Option<String>,
    started_at: Instant,
}

impl RequestContext {
    /// Creates an anonymous context with a fresh request ID.
    #[must_use]
    pub fn new() -> Self {
        Self::with_request_id(RequestId::new())
    }

    /// Creates an anonymous context with the given request ID.
    #[must_use]
    pub fn with_request_id(request_id: RequestId) -> Self {
        Self {
            request_id,
            caller: CallerIdentity::Anonymous,
            operation_id: None,
            started_at: Instant::now(),
        }
    }

    /// Sets the caller.
    #[must_use]
    pub fn with_caller(mut self, caller: CallerIdentity) -> Self {
        self.caller = caller;
        self
    }

    /// Sets the operation ID.
    #[must_use]
    pub fn with_operation_id(mut self, operation_id: impl Into<String>) -> Self {
        self.operation_id = Some(operation_id.into());
        self
    }

    /// Returns the request ID.
    #[must_use]
    pub const fn request_id(&self) -> RequestId {
        self.request_id
    }

    /// Returns the operation ID, if set.
    #[must_use]
    pub fn operation_id(&self) -> Option<&str> {
        self.operation_id.as_deref()
    }

    /// Returns the time elapsed since the context was created.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new()
    }
}

impl CallerContext for RequestContext {
    fn caller(&self) -> &CallerIdentity {
        &self.caller
    }
}
