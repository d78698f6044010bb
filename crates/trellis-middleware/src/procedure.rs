//! Procedure assembly and invocation.
//!
//! A [`ProcedureBuilder`] collects stages front to back and is finished with
//! a resolver, producing an immutable [`Procedure`]. The builder tracks the
//! params type at the end of the chain, so a stage whose input does not match
//! the previous stage's output is a compile error rather than a runtime one.
//!
//! ```text
//! invoke(params) → stage 0 → stage 1 → … → resolver
//!                     ↓          ↓
//!                  reject     reject          (any stage may short-circuit)
//! ```
//!
//! Assembly happens once, when [`ProcedureBuilder::resolve`] is called: the
//! chain is linked back to front, with each stage holding an owned handle to
//! the rest of the chain. Invocations share the linked chain and never touch
//! the builder again.

use crate::middleware::{panic_message, BoxFuture, CaughtPanic, FnMiddleware, Link, Middleware, Next, Settled};
use futures_util::FutureExt;
use std::any::type_name;
use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::Instrument;
use trellis_core::{Envelope, ErrorCode, ErrorData, RequestId, INTERNAL_ERROR_MESSAGE};

const DEFAULT_PROCEDURE_NAME: &str = "procedure";

/// Invocation-time behavior of a procedure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcedureOptions {
    /// Put the panic message into the failure envelope when a stage or the
    /// resolver panics. Leave off in production.
    pub expose_internal_errors: bool,
    /// Message used for panics when `expose_internal_errors` is off.
    pub internal_error_message: String,
    /// Invocations slower than this are logged at `WARN`.
    pub slow_invocation_threshold: Option<Duration>,
}

impl Default for ProcedureOptions {
    fn default() -> Self {
        Self {
            expose_internal_errors: false,
            internal_error_message: INTERNAL_ERROR_MESSAGE.to_string(),
            slow_invocation_threshold: None,
        }
    }
}

impl ProcedureOptions {
    /// Sets whether panic messages are exposed.
    pub fn expose_internal_errors(mut self, expose: bool) -> Self {
        self.expose_internal_errors = expose;
        self
    }

    /// Sets the message used for redacted panics.
    pub fn internal_error_message(mut self, message: impl Into<String>) -> Self {
        self.internal_error_message = message.into();
        self
    }

    /// Sets the slow invocation threshold.
    pub fn slow_invocation_threshold(mut self, threshold: Duration) -> Self {
        self.slow_invocation_threshold = Some(threshold);
        self
    }
}

/// Describes one stage of an assembled procedure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageDescriptor {
    /// Zero-based position in the chain.
    pub index: usize,
    /// The stage's [`Middleware::name`].
    pub name: &'static str,
    /// Type name of the params the stage receives.
    pub input: &'static str,
    /// Type name of the params the stage forwards.
    pub output: &'static str,
}

impl fmt::Display for StageDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} ({} -> {})", self.index, self.name, self.input, self.output)
    }
}

struct StageLink<M, P, R>
where
    M: Middleware<P, R>,
{
    middleware: M,
    name: &'static str,
    index: usize,
    downstream: Arc<dyn Link<M::Output, R>>,
    _marker: PhantomData<fn(P)>,
}

impl<M, P, R> Link<P, R> for StageLink<M, P, R>
where
    M: Middleware<P, R>,
    P: Send + 'static,
    R: Send + 'static,
{
    fn dispatch(&self, params: P) -> BoxFuture<'_, Settled<R>> {
        tracing::trace!(stage = self.name, index = self.index, "entering stage");
        let next = Next::new(self.name, Arc::clone(&self.downstream));
        self.middleware.process(params, next)
    }
}

struct ResolverLink<F, P> {
    resolver: F,
    _marker: PhantomData<fn(P)>,
}

impl<F, Fut, P, R> Link<P, R> for ResolverLink<F, P>
where
    F: Fn(P) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Envelope<R>> + Send + 'static,
    P: Send + 'static,
    R: Send + 'static,
{
    fn dispatch(&self, params: P) -> BoxFuture<'_, Settled<R>> {
        Box::pin(async move {
            tracing::trace!("invoking resolver");
            Settled::resolved((self.resolver)(params).await)
        })
    }
}

type Assemble<In, Cur, R> = Box<dyn FnOnce(Arc<dyn Link<Cur, R>>) -> Arc<dyn Link<In, R>> + Send>;

/// Builds a [`Procedure`].
///
/// `In` is the params type callers pass to [`Procedure::invoke`], `Cur` the
/// params type produced by the last stage added so far, and `R` the data type
/// of the resolver's envelope.
///
/// # Example
///
/// ```
/// use trellis_core::{Envelope, Params};
/// use trellis_middleware::{Next, Procedure};
///
/// # tokio_test::block_on(async {
/// let procedure = Procedure::<Params<(), u32>, u32>::builder()
///     .named("increment")
///     .stage_fn("double", |params: Params<(), u32>, next: Next<Params<(), u32>, u32>| async move {
///         let doubled = params.input * 2;
///         next.run(params.with_input(doubled)).await
///     })
///     .resolve(|params: Params<(), u32>| async move { Envelope::success(params.input + 1) });
///
/// let result = procedure.invoke(Params::from_parts((), 20)).await;
/// assert_eq!(result, Envelope::success(41));
/// # });
/// ```
pub struct ProcedureBuilder<In, Cur, R> {
    name: String,
    options: ProcedureOptions,
    stages: Vec<StageDescriptor>,
    assemble: Assemble<In, Cur, R>,
}

impl<In, R> ProcedureBuilder<In, In, R>
where
    In: Send + 'static,
    R: Send + 'static,
{
    /// Creates a builder with no stages.
    pub fn new() -> Self {
        Self {
            name: DEFAULT_PROCEDURE_NAME.to_string(),
            options: ProcedureOptions::default(),
            stages: Vec::new(),
            assemble: Box::new(|tail| tail),
        }
    }
}

impl<In, R> Default for ProcedureBuilder<In, In, R>
where
    In: Send + 'static,
    R: Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<In, Cur, R> ProcedureBuilder<In, Cur, R>
where
    In: Send + 'static,
    Cur: Send + 'static,
    R: Send + 'static,
{
    /// Sets the procedure name used in logs.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets the invocation options.
    pub fn options(mut self, options: ProcedureOptions) -> Self {
        self.options = options;
        self
    }

    /// Appends a stage.
    ///
    /// The stage must accept exactly what the chain currently produces; the
    /// returned builder produces the stage's output.
    pub fn stage<M>(self, middleware: M) -> ProcedureBuilder<In, M::Output, R>
    where
        M: Middleware<Cur, R>,
    {
        let index = self.stages.len();
        let name = middleware.name();
        let mut stages = self.stages;
        stages.push(StageDescriptor {
            index,
            name,
            input: type_name::<Cur>(),
            output: type_name::<M::Output>(),
        });

        let assemble = self.assemble;
        ProcedureBuilder {
            name: self.name,
            options: self.options,
            stages,
            assemble: Box::new(move |downstream: Arc<dyn Link<M::Output, R>>| {
                let link: Arc<dyn Link<Cur, R>> = Arc::new(StageLink {
                    middleware,
                    name,
                    index,
                    downstream,
                    _marker: PhantomData,
                });
                assemble(link)
            }),
        }
    }

    /// Appends a stage built from an async closure.
    pub fn stage_fn<Out, F, Fut>(self, name: &'static str, func: F) -> ProcedureBuilder<In, Out, R>
    where
        F: Fn(Cur, Next<Out, R>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Settled<R>> + Send + 'static,
        Out: Send + 'static,
    {
        self.stage(FnMiddleware::new(name, func))
    }

    /// Returns the stages added so far.
    pub fn stages(&self) -> &[StageDescriptor] {
        &self.stages
    }

    /// Finishes the chain with `resolver` and links it.
    pub fn resolve<F, Fut>(self, resolver: F) -> Procedure<In, R>
    where
        F: Fn(Cur) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Envelope<R>> + Send + 'static,
    {
        let terminal: Arc<dyn Link<Cur, R>> = Arc::new(ResolverLink {
            resolver,
            _marker: PhantomData,
        });
        let entry = (self.assemble)(terminal);

        tracing::debug!(
            procedure = %self.name,
            stages = ?self.stages.iter().map(|s| s.name).collect::<Vec<_>>(),
            "procedure assembled"
        );

        Procedure {
            inner: Arc::new(ProcedureInner {
                name: self.name,
                options: self.options,
                stages: self.stages,
                entry,
            }),
        }
    }
}

impl<In, Cur, R> fmt::Debug for ProcedureBuilder<In, Cur, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcedureBuilder")
            .field("name", &self.name)
            .field("stages", &self.stages)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

struct ProcedureInner<In, R> {
    name: String,
    options: ProcedureOptions,
    stages: Vec<StageDescriptor>,
    entry: Arc<dyn Link<In, R>>,
}

/// An assembled chain of stages ending in a resolver.
///
/// Cheap to clone; clones share the same chain. Concurrent invocations do not
/// share any per-invocation state.
pub struct Procedure<In, R> {
    inner: Arc<ProcedureInner<In, R>>,
}

impl<In, R> Clone for Procedure<In, R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<In, R> Procedure<In, R>
where
    In: Send + 'static,
    R: Send + 'static,
{
    /// Starts building a procedure.
    pub fn builder() -> ProcedureBuilder<In, In, R> {
        ProcedureBuilder::new()
    }

    /// Runs the chain with `params` and returns the final envelope.
    ///
    /// Never panics: a panic in a stage or in the resolver, whether raised
    /// while building its future or while polling it, is caught and returned
    /// as an `INTERNAL_SERVER_ERROR` failure. Its message is replaced by
    /// [`ProcedureOptions::internal_error_message`] unless internal errors
    /// are exposed.
    pub async fn invoke(&self, params: In) -> Envelope<R> {
        let invocation_id = RequestId::new();
        let span = tracing::info_span!(
            "procedure",
            procedure = %self.inner.name,
            invocation_id = %invocation_id,
        );
        self.run(params).instrument(span).await
    }

    async fn run(&self, params: In) -> Envelope<R> {
        let started = Instant::now();
        let dispatched = AssertUnwindSafe(async { self.inner.entry.dispatch(params).await })
            .catch_unwind()
            .await;
        let elapsed = started.elapsed();

        let envelope = match dispatched {
            Ok(settled) => {
                if let Some(stage) = settled.rejected_by() {
                    tracing::debug!(
                        stage,
                        code = settled.envelope().code().map_or("", ErrorCode::name),
                        "procedure short-circuited"
                    );
                }
                match settled.into_envelope() {
                    Envelope::Failure(error) => Envelope::Failure(self.redact_panic(error)),
                    success => success,
                }
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                tracing::error!(panic = %message, "procedure panicked");
                Envelope::Failure(self.panic_failure(message))
            }
        };

        if let Envelope::Failure(error) = &envelope {
            if error.category().is_server() {
                tracing::warn!(code = %error.code(), error = %error, "procedure failed");
            }
        }

        let duration_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
        if let Some(threshold) = self.inner.options.slow_invocation_threshold {
            if elapsed > threshold {
                tracing::warn!(
                    duration_ms,
                    threshold_ms = u64::try_from(threshold.as_millis()).unwrap_or(u64::MAX),
                    "slow procedure invocation"
                );
            }
        }
        tracing::debug!(duration_ms, success = envelope.is_success(), "procedure completed");

        envelope
    }

    // Stages that catch panics themselves leave the raw message in the cause.
    fn redact_panic(&self, error: ErrorData) -> ErrorData {
        let message = error
            .cause()
            .and_then(|cause| cause.downcast_ref::<CaughtPanic>())
            .map(|caught| caught.0.clone());
        match message {
            Some(message) => self.panic_failure(message),
            None => error,
        }
    }

    fn panic_failure(&self, message: String) -> ErrorData {
        let error = ErrorData::new(ErrorCode::InternalServerError);
        if self.inner.options.expose_internal_errors {
            error.with_message(message)
        } else {
            error.with_message(self.inner.options.internal_error_message.clone())
        }
    }
}

impl<In, R> Procedure<In, R> {
    /// Returns the procedure name.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Returns the invocation options.
    pub fn options(&self) -> &ProcedureOptions {
        &self.inner.options
    }

    /// Returns the stages in invocation order.
    pub fn stages(&self) -> &[StageDescriptor] {
        &self.inner.stages
    }

    /// Returns the stage names in invocation order.
    pub fn stage_names(&self) -> Vec<&'static str> {
        self.inner.stages.iter().map(|s| s.name).collect()
    }

    /// Returns the number of stages, excluding the resolver.
    pub fn stage_count(&self) -> usize {
        self.inner.stages.len()
    }
}

impl<In, R> fmt::Debug for Procedure<In, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Procedure")
            .field("name", &self.inner.name)
            .field("stages", &self.inner.stages)
            .field("options", &self.inner.options)
            .finish_non_exhaustive()
    }
}

/// Assembles a [`Procedure`] from stages and a resolver.
///
/// `procedure![a, b => resolver]` is shorthand for
/// `Procedure::builder().stage(a).stage(b).resolve(resolver)`.
///
/// # Example
///
/// ```
/// use trellis_core::{Envelope, Params};
/// use trellis_middleware::{procedure, stages::PayloadLimit, Procedure};
///
/// let echo: Procedure<Params<()>, usize> = procedure![
///     PayloadLimit::new(1024) => |params: Params<()>| async move {
///         Envelope::success(params.raw_input().map_or(0, |v| v.to_string().len()))
///     }
/// ];
/// assert_eq!(echo.stage_names(), vec!["payload_limit"]);
/// ```
#[macro_export]
macro_rules! procedure {
    ($($stage:expr),* $(,)? => $resolver:expr $(,)?) => {
        $crate::Procedure::builder()
            $(.stage($stage))*
            .resolve($resolver)
    };
}
