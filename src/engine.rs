//! Guard engine.
//!
//! A [`Guard`] owns a handler registry and produces [`Guarded`] callables.
//! Every invocation of a guarded callable walks the same state machine:
//!
//! ```text
//! IDLE ─validate─▶ RUNNING ─value──────────────────────────┐
//!                     │ no value ─▶ ELSE ──────────────────┤
//!                     │ failure ─▶ DISPATCHING ─handled────┤
//!                     │                 └─unhandled/debug──┤
//!                     ▼                                    ▼
//!                                                    FINALIZING ─▶ DONE
//! ```
//!
//! The invocation's [`Context`] is opened after validation and closed after
//! the finally stage on every path.

use std::future::Future;
use std::pin::pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::task::{Context as TaskContext, Poll};
use std::thread::{self, Thread};

use futures::task::{self as future_task, ArcWake};
use tracing::{Instrument, debug, trace};

use crate::call::{Handler, Outcome};
use crate::config::GuardConfig;
use crate::context::{Activation, Context};
use crate::error::Result;
use crate::failure::{Failure, FailureType};
use crate::observability::metrics::{self, FailureOutcome};
use crate::observability::{FailureRecord, FailureSink, TracingSink};
use crate::registry::{HandlerEntry, HandlerOptions, HandlerRegistry};

// ============================================================================
// Guard
// ============================================================================

struct GuardInner<A, T> {
    logger_name: String,
    debug: AtomicBool,
    sink: Arc<dyn FailureSink>,
    registry: RwLock<HandlerRegistry<A, T>>,
}

/// Reusable failure-handling policy.
///
/// Cloning is cheap; clones share one registry, so handlers registered
/// through any clone (or after [`Guard::wrap`]) apply to every guarded
/// callable produced by it.
pub struct Guard<A, T> {
    inner: Arc<GuardInner<A, T>>,
}

impl<A, T> Clone for Guard<A, T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<A, T> std::fmt::Debug for Guard<A, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Guard")
            .field("logger_name", &self.inner.logger_name)
            .field("debug", &self.debug())
            .field("handlers", &self.registry().len())
            .finish_non_exhaustive()
    }
}

impl<A, T> Guard<A, T> {
    /// Starts building a guard.
    #[must_use]
    pub fn builder() -> GuardBuilder<A, T> {
        GuardBuilder::new()
    }

    /// Creates a guard with no handlers from `config`.
    #[must_use]
    pub fn new(config: GuardConfig) -> Self {
        GuardBuilder::new().config(config).build()
    }

    /// Name reported with every caught failure.
    #[must_use]
    pub fn logger_name(&self) -> &str {
        &self.inner.logger_name
    }

    /// Global debug default.
    #[must_use]
    pub fn debug(&self) -> bool {
        self.inner.debug.load(Ordering::SeqCst)
    }

    /// Changes the global debug default for subsequent failures.
    pub fn set_debug(&self, enabled: bool) {
        self.inner.debug.store(enabled, Ordering::SeqCst);
    }

    /// Associates every type in `types` with `handler`.
    pub fn register_handler<I>(&self, types: I, handler: Handler<A, T>, options: HandlerOptions)
    where
        I: IntoIterator<Item = FailureType>,
    {
        self.registry_mut().register_handler(types, &handler, &options);
    }

    /// Registers `handler` for every failure.
    pub fn register_catch_all(&self, handler: Handler<A, T>) {
        self.registry_mut().register_catch_all(&handler);
    }

    /// Sets the else handler, replacing any previous one.
    pub fn register_else(&self, handler: Handler<A, T>) {
        self.registry_mut().register_else(handler);
    }

    /// Sets the finally handler, replacing any previous one.
    pub fn register_finally(&self, handler: Handler<A, T>) {
        self.registry_mut().register_finally(handler);
    }

    /// Checks the registry as an invocation would.
    ///
    /// # Errors
    ///
    /// Returns [`crate::GuardError::Configuration`] for an else handler
    /// without failure handlers.
    pub fn validate(&self) -> Result<()> {
        self.registry().validate()
    }

    /// Entry that would handle `failure` right now, if any.
    #[must_use]
    pub fn resolve(&self, failure: &Failure) -> Option<HandlerEntry<A, T>> {
        self.registry().resolve(failure).cloned()
    }

    /// Wraps `body` so that every call runs through this guard.
    #[must_use]
    pub fn wrap(&self, body: Handler<A, T>) -> Guarded<A, T> {
        Guarded {
            guard: self.clone(),
            body,
        }
    }

    fn registry(&self) -> RwLockReadGuard<'_, HandlerRegistry<A, T>> {
        self.inner
            .registry
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn registry_mut(&self) -> RwLockWriteGuard<'_, HandlerRegistry<A, T>> {
        self.inner
            .registry
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

// ============================================================================
// GuardBuilder
// ============================================================================

/// Builder for [`Guard`].
pub struct GuardBuilder<A, T> {
    config: GuardConfig,
    sink: Option<Arc<dyn FailureSink>>,
    registry: HandlerRegistry<A, T>,
}

impl<A, T> GuardBuilder<A, T> {
    fn new() -> Self {
        Self {
            config: GuardConfig::default(),
            sink: None,
            registry: HandlerRegistry::new(),
        }
    }

    /// Applies a whole configuration, replacing name and debug.
    #[must_use]
    pub fn config(mut self, config: GuardConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the logger name.
    #[must_use]
    pub fn logger_name(mut self, name: impl Into<String>) -> Self {
        self.config.logger_name = name.into();
        self
    }

    /// Sets the global debug default.
    #[must_use]
    pub fn debug(mut self, enabled: bool) -> Self {
        self.config.debug = enabled;
        self
    }

    /// Replaces the default [`TracingSink`].
    #[must_use]
    pub fn sink(mut self, sink: Arc<dyn FailureSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Registers `handler` for every type in `types`.
    #[must_use]
    pub fn catch<I>(mut self, types: I, handler: Handler<A, T>, options: HandlerOptions) -> Self
    where
        I: IntoIterator<Item = FailureType>,
    {
        self.registry.register_handler(types, &handler, &options);
        self
    }

    /// Registers `handler` for every failure.
    #[must_use]
    pub fn catch_all(mut self, handler: Handler<A, T>) -> Self {
        self.registry.register_catch_all(&handler);
        self
    }

    /// Sets the else handler.
    #[must_use]
    pub fn on_else(mut self, handler: Handler<A, T>) -> Self {
        self.registry.register_else(handler);
        self
    }

    /// Sets the finally handler.
    #[must_use]
    pub fn on_finally(mut self, handler: Handler<A, T>) -> Self {
        self.registry.register_finally(handler);
        self
    }

    /// Finishes the guard.
    ///
    /// The registry is not validated here; validation happens on every
    /// call so that later registrations are taken into account.
    #[must_use]
    pub fn build(self) -> Guard<A, T> {
        Guard {
            inner: Arc::new(GuardInner {
                logger_name: self.config.logger_name,
                debug: AtomicBool::new(self.config.debug),
                sink: self.sink.unwrap_or_else(|| Arc::new(TracingSink)),
                registry: RwLock::new(self.registry),
            }),
        }
    }
}

// ============================================================================
// Invocation state machine
// ============================================================================

/// Result carried from one stage to the next.
enum Pending<T> {
    /// Stage settled with a value (or none).
    Value(Option<T>),
    /// Stage settled with a failure to propagate.
    Raise(Failure),
}

impl<T> From<Outcome<T>> for Pending<T> {
    fn from(outcome: Outcome<T>) -> Self {
        match outcome {
            Ok(value) => Self::Value(value),
            Err(failure) => Self::Raise(failure),
        }
    }
}

impl<T> Pending<T> {
    fn into_outcome(self) -> Outcome<T> {
        match self {
            Self::Value(value) => Ok(value),
            Self::Raise(failure) => Err(failure),
        }
    }
}

impl<A, T> Guard<A, T>
where
    A: Clone + Send + 'static,
    T: Send + 'static,
{
    async fn run_else(&self, args: A, ctx: &Context) -> Pending<T> {
        let handler = self.registry().else_handler().cloned();
        let Some(handler) = handler else {
            trace!("no value and no else handler");
            return Pending::Value(None);
        };
        trace!("no value; running else handler");
        metrics::record_else(self.logger_name());
        Pending::from(handler.call(args, ctx).await)
    }

    async fn dispatch(&self, failure: Failure, args: A, ctx: &Context) -> Pending<T> {
        let entry = self.registry().resolve(&failure).cloned();
        let Some(entry) = entry else {
            debug!(failure = %failure, "no handler registered; propagating");
            metrics::record_failure(self.logger_name(), FailureOutcome::Unhandled);
            return Pending::Raise(failure);
        };

        self.inner.sink.record(&FailureRecord::new(
            self.logger_name(),
            &failure,
            &entry.failure_type,
        ));

        if entry.debug.resolve(self.debug()) {
            debug!(failure_type = %entry.failure_type, "debug enabled; re-raising");
            metrics::record_failure(self.logger_name(), FailureOutcome::Bypassed);
            return Pending::Raise(failure);
        }

        if let Some(alias) = &entry.alias {
            if let Err(err) = ctx.set(alias.clone(), failure.clone()) {
                return Pending::Raise(err.into());
            }
        }

        debug!(failure_type = %entry.failure_type, "invoking handler");
        metrics::record_failure(self.logger_name(), FailureOutcome::Handled);
        let outcome = entry.handler.call(args, ctx).await;

        // the handler may have removed the alias itself
        if let Some(alias) = &entry.alias {
            if ctx.contains(alias).unwrap_or(false) {
                let _ = ctx.remove(alias);
            }
        }

        Pending::from(outcome)
    }

    async fn finalize(&self, pending: Pending<T>, args: A, ctx: &Context) -> Pending<T> {
        let handler = self.registry().finally_handler().cloned();
        let Some(handler) = handler else {
            return pending;
        };
        trace!("running finally handler");
        match (handler.call(args, ctx).await, pending) {
            (Err(failure), _) => {
                debug!(failure = %failure, "finally handler failed");
                Pending::Raise(failure)
            }
            (Ok(Some(value)), Pending::Value(previous)) => {
                if previous.is_some() {
                    metrics::record_finally_override(self.logger_name());
                }
                Pending::Value(Some(value))
            }
            (Ok(_), pending) => pending,
        }
    }
}

// ============================================================================
// Guarded
// ============================================================================

/// A callable wrapped by a [`Guard`].
pub struct Guarded<A, T> {
    guard: Guard<A, T>,
    body: Handler<A, T>,
}

impl<A, T> Clone for Guarded<A, T> {
    fn clone(&self) -> Self {
        Self {
            guard: self.guard.clone(),
            body: Arc::clone(&self.body),
        }
    }
}

impl<A, T> Guarded<A, T>
where
    A: Clone + Send + 'static,
    T: Send + 'static,
{
    /// The guard this callable runs under.
    #[must_use]
    pub const fn guard(&self) -> &Guard<A, T> {
        &self.guard
    }

    /// Runs one guarded invocation.
    ///
    /// Returns the final value (`None` if no stage produced one), or the
    /// failure that escaped: the original failure object when unhandled or
    /// bypassed, a handler's own failure, or a
    /// [`crate::GuardError`] wrapped in a [`Failure`] for engine errors.
    ///
    /// # Errors
    ///
    /// See above; failures are never wrapped or swallowed.
    pub async fn call(&self, args: A) -> Outcome<T> {
        metrics::record_invocation(self.guard.logger_name());
        self.guard.validate()?;

        let ctx = Context::open();
        let activation = Activation::new(ctx.clone());
        let span = tracing::debug_span!(
            "guarded_call",
            logger = %self.guard.logger_name(),
            context_id = ctx.id(),
        );

        let pending = ctx.scope(self.run(args, &ctx)).instrument(span).await;
        drop(activation);
        pending.into_outcome()
    }

    /// Runs one guarded invocation on the current thread.
    ///
    /// May be nested: a blocking stage can itself call another guarded
    /// callable's `call_blocking`. Stages that rely on a tokio runtime
    /// (timers, sockets) need [`Guarded::call`] from inside that runtime
    /// instead.
    ///
    /// # Errors
    ///
    /// Same as [`Guarded::call`].
    pub fn call_blocking(&self, args: A) -> Outcome<T> {
        drive(self.call(args))
    }

    async fn run(&self, args: A, ctx: &Context) -> Pending<T> {
        trace!("running body");
        let pending = match self.body.call(args.clone(), ctx).await {
            Ok(Some(value)) => {
                trace!("body returned a value; else skipped");
                Pending::Value(Some(value))
            }
            Ok(None) => self.guard.run_else(args.clone(), ctx).await,
            Err(failure) => self.guard.dispatch(failure, args.clone(), ctx).await,
        };
        self.guard.finalize(pending, args, ctx).await
    }
}

// ============================================================================
// Blocking driver
// ============================================================================

/// Wakes a parked thread and remembers that it did.
///
/// The flag keeps a wake-up from being lost when a nested driver on the
/// same thread consumes the park token.
struct ThreadWaker {
    thread: Thread,
    woken: AtomicBool,
}

impl ArcWake for ThreadWaker {
    fn wake_by_ref(arc_self: &Arc<Self>) {
        arc_self.woken.store(true, Ordering::Release);
        arc_self.thread.unpark();
    }
}

/// Polls `fut` to completion on the current thread, parking between polls.
///
/// Unlike an executor, this takes no enter guard, so it can be re-entered
/// from inside a future it is driving.
fn drive<F: Future>(fut: F) -> F::Output {
    let state = Arc::new(ThreadWaker {
        thread: thread::current(),
        woken: AtomicBool::new(false),
    });
    let waker = future_task::waker(Arc::clone(&state));
    let mut cx = TaskContext::from_waker(&waker);
    let mut fut = pin!(fut);
    loop {
        if let Poll::Ready(output) = fut.as_mut().poll(&mut cx) {
            return output;
        }
        while !state.woken.swap(false, Ordering::Acquire) {
            thread::park();
        }
    }
}
