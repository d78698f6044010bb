//! Authentication and role checks.
//!
//! [`require_user`] is a context swap: it reads the caller from any
//! [`CallerContext`] and, when the caller is a user, forwards an
//! [`Authenticated`] context whose user is always present. Anonymous callers,
//! API keys, and services are rejected with `UNAUTHORIZED`.
//!
//! [`require_role`] runs after it and rejects users missing a role with
//! `FORBIDDEN`.
//!
//! ```text
//! Params<C> → [authentication] → Params<Authenticated<C>> → [role:admin] → …
//!                   ↓                                            ↓
//!             UNAUTHORIZED                                   FORBIDDEN
//! ```

use super::context_swap::{ContextSwapMiddleware, DeriveContext};
use crate::middleware::{BoxFuture, Middleware, Next, Settled};
use std::future::ready;
use trellis_core::{Authenticated, CallerContext, ErrorData, Params};

/// Derivation that requires the caller to be a user.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequireUser;

impl<C, I> DeriveContext<C, I> for RequireUser
where
    C: CallerContext + Clone + Send + Sync + 'static,
    I: Send + Sync + 'static,
{
    type Context = Authenticated<C>;

    fn derive<'a>(&'a self, params: &'a Params<C, I>) -> BoxFuture<'a, Result<Authenticated<C>, ErrorData>> {
        let outcome = match params.ctx.user() {
            Some(user) => Ok(Authenticated::new(user.clone(), params.ctx.clone())),
            None => {
                tracing::debug!(caller = %params.ctx.caller().log_id(), "caller is not an authenticated user");
                Err(ErrorData::unauthorized())
            }
        };
        Box::pin(ready(outcome))
    }
}

/// The authentication stage.
pub type AuthenticationMiddleware = ContextSwapMiddleware<RequireUser>;

/// Creates the authentication stage.
pub const fn require_user() -> AuthenticationMiddleware {
    ContextSwapMiddleware::new("authentication", RequireUser)
}

/// Rejects authenticated users that lack a role.
#[derive(Debug, Clone)]
pub struct RoleGate {
    role: String,
}

impl RoleGate {
    /// Returns the required role.
    pub fn role(&self) -> &str {
        &self.role
    }
}

/// Creates a stage that requires `role`.
pub fn require_role(role: impl Into<String>) -> RoleGate {
    RoleGate { role: role.into() }
}

impl<C, I, R> Middleware<Params<Authenticated<C>, I>, R> for RoleGate
where
    C: Send + 'static,
    I: Send + 'static,
    R: Send + 'static,
{
    type Output = Params<Authenticated<C>, I>;

    fn name(&self) -> &'static str {
        "role_gate"
    }

    fn process<'a>(
        &'a self,
        params: Params<Authenticated<C>, I>,
        next: Next<Params<Authenticated<C>, I>, R>,
    ) -> BoxFuture<'a, Settled<R>> {
        Box::pin(async move {
            if !params.ctx.user().has_role(&self.role) {
                tracing::debug!(user = %params.ctx.user().id, role = %self.role, "missing required role");
                return next.reject(ErrorData::forbidden().with_message(format!("requires role '{}'", self.role)));
            }
            next.run(params).await
        })
    }
}
