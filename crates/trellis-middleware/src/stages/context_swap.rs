//! Context swap stage.
//!
//! Derives a new context from the incoming params and forwards the same
//! input under it. Derivation either yields the new context or an
//! [`ErrorData`], which is returned as-is without forwarding.
//!
//! Authentication is the canonical use: see
//! [`require_user`](super::require_user), which swaps a context with an
//! optional user for one where the user is guaranteed.
//!
//! # Example
//!
//! ```
//! use trellis_core::{Envelope, ErrorData, Params};
//! use trellis_middleware::{stages::ContextSwapMiddleware, Procedure};
//!
//! struct Tenant(String);
//!
//! let tenant = ContextSwapMiddleware::from_fn("tenant", |params: &Params<Option<String>>| {
//!     params
//!         .ctx
//!         .clone()
//!         .map(Tenant)
//!         .ok_or_else(ErrorData::forbidden)
//! });
//!
//! let whoami = Procedure::<Params<Option<String>>, String>::builder()
//!     .stage(tenant)
//!     .resolve(|params: Params<Tenant>| async move { Envelope::success(params.ctx.0) });
//! # let _ = whoami;
//! ```

use crate::middleware::{panic_failure, panic_message, BoxFuture, Middleware, Next, Settled};
use futures_util::FutureExt;
use std::fmt;
use std::future::ready;
use std::marker::PhantomData;
use std::panic::AssertUnwindSafe;
use trellis_core::{ErrorData, Params};

/// Derives a replacement context.
pub trait DeriveContext<C, I>: Send + Sync + 'static {
    /// The context handed downstream.
    type Context: Send + 'static;

    /// Derives the new context from `params`, or fails.
    fn derive<'a>(&'a self, params: &'a Params<C, I>) -> BoxFuture<'a, Result<Self::Context, ErrorData>>;
}

/// A [`DeriveContext`] backed by a synchronous closure.
pub struct FnDerive<F, D> {
    func: F,
    _marker: PhantomData<fn() -> D>,
}

impl<F, D> FnDerive<F, D> {
    /// Wraps `func`.
    pub const fn new(func: F) -> Self {
        Self {
            func,
            _marker: PhantomData,
        }
    }
}

impl<F, D> fmt::Debug for FnDerive<F, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnDerive").finish_non_exhaustive()
    }
}

impl<C, I, D, F> DeriveContext<C, I> for FnDerive<F, D>
where
    F: Fn(&Params<C, I>) -> Result<D, ErrorData> + Send + Sync + 'static,
    D: Send + 'static,
{
    type Context = D;

    fn derive<'a>(&'a self, params: &'a Params<C, I>) -> BoxFuture<'a, Result<D, ErrorData>> {
        Box::pin(ready((self.func)(params)))
    }
}

/// The context swap stage.
#[derive(Debug, Clone)]
pub struct ContextSwapMiddleware<Dv> {
    name: &'static str,
    derive: Dv,
}

impl<Dv> ContextSwapMiddleware<Dv> {
    /// Creates a stage named `name` around `derive`.
    pub const fn new(name: &'static str, derive: Dv) -> Self {
        Self { name, derive }
    }

    /// Returns the derivation.
    pub const fn derivation(&self) -> &Dv {
        &self.derive
    }
}

impl<F, D> ContextSwapMiddleware<FnDerive<F, D>> {
    /// Creates a stage from a synchronous derivation closure.
    pub fn from_fn<C, I>(name: &'static str, func: F) -> Self
    where
        F: Fn(&Params<C, I>) -> Result<D, ErrorData> + Send + Sync + 'static,
        D: Send + 'static,
    {
        Self::new(name, FnDerive::new(func))
    }
}

impl<C, I, R, Dv> Middleware<Params<C, I>, R> for ContextSwapMiddleware<Dv>
where
    Dv: DeriveContext<C, I>,
    C: Send + Sync + 'static,
    I: Send + Sync + 'static,
    R: Send + 'static,
{
    type Output = Params<Dv::Context, I>;

    fn name(&self) -> &'static str {
        self.name
    }

    fn process<'a>(
        &'a self,
        params: Params<C, I>,
        next: Next<Params<Dv::Context, I>, R>,
    ) -> BoxFuture<'a, Settled<R>> {
        Box::pin(async move {
            let derived = AssertUnwindSafe(async { self.derive.derive(&params).await })
                .catch_unwind()
                .await;

            match derived {
                Ok(Ok(ctx)) => next.run(params.with_ctx(ctx)).await,
                Ok(Err(error)) => {
                    tracing::debug!(stage = self.name, code = %error.code(), "context derivation refused");
                    next.reject(error)
                }
                Err(payload) => {
                    tracing::error!(
                        stage = self.name,
                        panic = %panic_message(payload.as_ref()),
                        "context derivation panicked"
                    );
                    next.reject(panic_failure(payload.as_ref()))
                }
            }
        })
    }
}
