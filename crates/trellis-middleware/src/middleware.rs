//! Core middleware trait and types.
//!
//! This module defines the [`Middleware`] trait that every stage implements.
//! A stage receives the params produced by the stage before it and a [`Next`]
//! token for the rest of the chain. It then does exactly one of two things:
//!
//! - forwards new params with [`Next::run`] and returns whatever the rest of
//!   the chain produced, or
//! - short-circuits with [`Next::reject`].
//!
//! Both methods consume the token, and the [`Settled`] value a stage must
//! return can only be obtained from them. A stage therefore cannot forward
//! twice, and it cannot hand back a result the chain did not produce.
//!
//! # Example
//!
//! ```
//! use trellis_core::{ErrorData, Params};
//! use trellis_middleware::{BoxFuture, Middleware, Next, Settled};
//!
//! /// Rejects inputs larger than a fixed bound.
//! struct AtMost(u32);
//!
//! impl<C: Send + 'static, R: Send + 'static> Middleware<Params<C, u32>, R> for AtMost {
//!     type Output = Params<C, u32>;
//!
//!     fn name(&self) -> &'static str {
//!         "at_most"
//!     }
//!
//!     fn process<'a>(
//!         &'a self,
//!         params: Params<C, u32>,
//!         next: Next<Params<C, u32>, R>,
//!     ) -> BoxFuture<'a, Settled<R>> {
//!         Box::pin(async move {
//!             if params.input > self.0 {
//!                 return next.reject(ErrorData::bad_request().with_message("too large"));
//!             }
//!             next.run(params).await
//!         })
//!     }
//! }
//! ```

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::Arc;
use trellis_core::{Envelope, ErrorCode, ErrorData};

/// A boxed, sendable future.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A single stage in a procedure chain.
///
/// `P` is what the stage receives, [`Middleware::Output`] is what it forwards,
/// and `R` is the data type of the procedure's final envelope. Most stages are
/// generic over `R` because they never look at the resolver's data.
///
/// # Invariants
///
/// - A stage decides exactly once: forward or short-circuit
/// - A stage returns the downstream result unchanged when it forwards
/// - A stage never mutates the params it received; it builds new ones
pub trait Middleware<P, R>: Send + Sync + 'static {
    /// The params type handed to the next stage.
    type Output: Send + 'static;

    /// Returns the name of this stage.
    ///
    /// Used in logs and in [`crate::StageDescriptor`]s.
    fn name(&self) -> &'static str;

    /// Processes `params` and settles the invocation through `next`.
    fn process<'a>(&'a self, params: P, next: Next<Self::Output, R>) -> BoxFuture<'a, Settled<R>>;
}

/// One hop of an assembled chain: either a stage or the resolver.
pub(crate) trait Link<P, R>: Send + Sync + 'static {
    fn dispatch(&self, params: P) -> BoxFuture<'_, Settled<R>>;
}

/// The outcome of an invocation as seen by a stage.
///
/// Only [`Next`] can produce one, which is what keeps a stage from returning
/// anything other than the downstream result or its own rejection.
#[must_use = "a stage must return the value settled by its `Next`"]
pub struct Settled<R> {
    envelope: Envelope<R>,
    rejected_by: Option<&'static str>,
}

impl<R> Settled<R> {
    pub(crate) const fn resolved(envelope: Envelope<R>) -> Self {
        Self {
            envelope,
            rejected_by: None,
        }
    }

    /// Returns the envelope produced downstream.
    pub const fn envelope(&self) -> &Envelope<R> {
        &self.envelope
    }

    /// Returns true if the envelope is a success.
    pub const fn is_success(&self) -> bool {
        self.envelope.is_success()
    }

    /// Returns the name of the stage that short-circuited, if any.
    ///
    /// `None` means the resolver ran, whatever its outcome.
    pub const fn rejected_by(&self) -> Option<&'static str> {
        self.rejected_by
    }

    pub(crate) fn into_envelope(self) -> Envelope<R> {
        self.envelope
    }
}

impl<R: fmt::Debug> fmt::Debug for Settled<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settled")
            .field("envelope", &self.envelope)
            .field("rejected_by", &self.rejected_by)
            .finish()
    }
}

/// The rest of the chain after the current stage.
///
/// Consumed by [`Next::run`] or [`Next::reject`], so it can be used once.
pub struct Next<P, R> {
    stage: &'static str,
    downstream: Arc<dyn Link<P, R>>,
}

impl<P, R> Next<P, R> {
    pub(crate) fn new(stage: &'static str, downstream: Arc<dyn Link<P, R>>) -> Self {
        Self { stage, downstream }
    }

    /// Forwards `params` to the next stage (or the resolver) and returns its
    /// result.
    pub async fn run(self, params: P) -> Settled<R>
    where
        P: 'static,
        R: 'static,
    {
        self.downstream.dispatch(params).await
    }

    /// Short-circuits the chain with `error`.
    ///
    /// No later stage and no resolver will run.
    pub fn reject(self, error: impl Into<ErrorData>) -> Settled<R> {
        Settled {
            envelope: Envelope::Failure(error.into()),
            rejected_by: Some(self.stage),
        }
    }

    /// Returns the name of the stage holding this token.
    pub const fn stage(&self) -> &'static str {
        self.stage
    }
}

impl<P, R> fmt::Debug for Next<P, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Next").field("stage", &self.stage).finish_non_exhaustive()
    }
}

/// A stage built from an async closure.
///
/// # Example
///
/// ```
/// use trellis_core::Params;
/// use trellis_middleware::{FnMiddleware, Next};
///
/// let double = FnMiddleware::new("double", |params: Params<(), u32>, next: Next<Params<(), u32>, u32>| async move {
///     let doubled = params.input * 2;
///     next.run(params.with_input(doubled)).await
/// });
/// # let _ = double;
/// ```
pub struct FnMiddleware<F, P, Out, R> {
    name: &'static str,
    func: F,
    _marker: PhantomData<fn(P) -> (Out, R)>,
}

impl<F, P, Out, R> FnMiddleware<F, P, Out, R> {
    /// Creates a new function-based stage.
    pub fn new<Fut>(name: &'static str, func: F) -> Self
    where
        F: Fn(P, Next<Out, R>) -> Fut,
        Fut: Future<Output = Settled<R>>,
    {
        Self {
            name,
            func,
            _marker: PhantomData,
        }
    }
}

impl<F, Fut, P, Out, R> Middleware<P, R> for FnMiddleware<F, P, Out, R>
where
    F: Fn(P, Next<Out, R>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Settled<R>> + Send + 'static,
    P: 'static,
    Out: Send + 'static,
    R: 'static,
{
    type Output = Out;

    fn name(&self) -> &'static str {
        self.name
    }

    fn process<'a>(&'a self, params: P, next: Next<Out, R>) -> BoxFuture<'a, Settled<R>> {
        Box::pin((self.func)(params, next))
    }
}

/// The cause attached to failures built from a caught panic.
///
/// [`Procedure::invoke`](crate::Procedure::invoke) replaces it with the
/// configured internal error message unless internal errors are exposed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct CaughtPanic(pub(crate) String);

impl fmt::Display for CaughtPanic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for CaughtPanic {}

/// Builds the `INTERNAL_SERVER_ERROR` failure for a caught panic.
pub(crate) fn panic_failure(payload: &(dyn Any + Send)) -> ErrorData {
    ErrorData::new(ErrorCode::InternalServerError).caused_by(CaughtPanic(panic_message(payload)))
}

/// Renders a caught panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "panic with a non-string payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Terminal {
        calls: Arc<AtomicUsize>,
    }

    impl Link<u32, u32> for Terminal {
        fn dispatch(&self, params: u32) -> BoxFuture<'_, Settled<u32>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Box::pin(async move { Settled::resolved(Envelope::success(params + 1)) })
        }
    }

    fn terminal() -> (Arc<AtomicUsize>, Arc<dyn Link<u32, u32>>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let link = Arc::new(Terminal {
            calls: Arc::clone(&calls),
        });
        (calls, link)
    }

    #[tokio::test]
    async fn test_run_dispatches_downstream() {
        let (calls, link) = terminal();
        let settled = Next::new("stage", link).run(41).await;

        assert_eq!(settled.envelope(), &Envelope::success(42));
        assert!(settled.rejected_by().is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_reject_skips_downstream() {
        let (calls, link) = terminal();
        let settled = Next::new("stage", link).reject(ErrorCode::Forbidden);

        assert!(!settled.is_success());
        assert_eq!(settled.rejected_by(), Some("stage"));
        assert_eq!(settled.envelope().code(), Some(ErrorCode::Forbidden));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_fn_middleware() {
        let (calls, link) = terminal();
        let mw = FnMiddleware::new("triple", |n: u32, next: Next<u32, u32>| async move {
            next.run(n * 3).await
        });
        assert_eq!(Middleware::<u32, u32>::name(&mw), "triple");

        let settled = mw.process(5, Next::new("triple", link)).await;
        assert_eq!(settled.into_envelope(), Envelope::success(16));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_panic_failure_carries_message() {
        let payload: Box<dyn Any + Send> = Box::new("validator bug");
        let error = panic_failure(payload.as_ref());

        assert_eq!(error.code(), ErrorCode::InternalServerError);
        let cause = error.cause().and_then(|c| c.downcast_ref::<CaughtPanic>());
        assert_eq!(cause, Some(&CaughtPanic("validator bug".to_string())));
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");

        let payload: Box<dyn Any + Send> = Box::new(String::from("owned boom"));
        assert_eq!(panic_message(payload.as_ref()), "owned boom");

        let payload: Box<dyn Any + Send> = Box::new(7_u8);
        assert_eq!(panic_message(payload.as_ref()), "panic with a non-string payload");
    }
}
