//! Predicate stage.
//!
//! A [`Guard`] inspects the params and either forwards them untouched or
//! short-circuits with the error its check returned. Useful for rules that
//! do not change the params type, such as feature flags or ownership checks.
//!
//! # Example
//!
//! ```
//! use trellis_core::{ErrorData, Params};
//! use trellis_middleware::stages::Guard;
//!
//! let positive = Guard::new("positive", |params: &Params<(), i64>| {
//!     if params.input > 0 {
//!         Ok(())
//!     } else {
//!         Err(ErrorData::bad_request().with_message("must be positive"))
//!     }
//! });
//! # let _ = positive;
//! ```

use crate::middleware::{BoxFuture, Middleware, Next, Settled};
use std::fmt;
use trellis_core::ErrorData;

/// Forwards params unchanged when `check` passes.
pub struct Guard<F> {
    name: &'static str,
    check: F,
}

impl<F> Guard<F> {
    /// Creates a guard named `name`.
    pub const fn new<P>(name: &'static str, check: F) -> Self
    where
        F: Fn(&P) -> Result<(), ErrorData>,
    {
        Self { name, check }
    }
}

impl<F> fmt::Debug for Guard<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Guard").field("name", &self.name).finish_non_exhaustive()
    }
}

impl<P, R, F> Middleware<P, R> for Guard<F>
where
    F: Fn(&P) -> Result<(), ErrorData> + Send + Sync + 'static,
    P: Send + 'static,
    R: Send + 'static,
{
    type Output = P;

    fn name(&self) -> &'static str {
        self.name
    }

    fn process<'a>(&'a self, params: P, next: Next<P, R>) -> BoxFuture<'a, Settled<R>> {
        let verdict = (self.check)(&params);
        Box::pin(async move {
            match verdict {
                Ok(()) => next.run(params).await,
                Err(error) => next.reject(error),
            }
        })
    }
}
