//! Uniform invocation of blocking and suspending callables.
//!
//! Guarded bodies and handlers are all [`Handler`]s: an object-safe
//! [`Call`] behind an `Arc`. The engine awaits every stage through the same
//! interface whether the callable returns immediately ([`Blocking`]) or
//! hands back a future ([`Suspending`]), so bodies and handlers may mix
//! calling conventions freely.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use crate::context::Context;
use crate::failure::Failure;

/// What every stage produces: a value, no value, or a failure.
///
/// `Ok(None)` means "returned without a meaningful value".
pub type Outcome<T> = Result<Option<T>, Failure>;

/// A callable the engine can invoke with forwarded arguments.
#[async_trait]
pub trait Call<A, T>: Send + Sync {
    /// Invokes the callable and yields its outcome.
    ///
    /// Failures are returned exactly as the callable produced them.
    async fn call(&self, args: A, ctx: &Context) -> Outcome<T>;
}

/// Shared, type-erased callable.
pub type Handler<A, T> = Arc<dyn Call<A, T>>;

/// A callable that returns its outcome immediately.
///
/// Runs inline on the invoking task; no thread hop is introduced.
pub struct Blocking<F>(pub F);

#[async_trait]
impl<A, T, F> Call<A, T> for Blocking<F>
where
    A: Send + 'static,
    T: Send + 'static,
    F: Fn(A, &Context) -> Outcome<T> + Send + Sync + 'static,
{
    async fn call(&self, args: A, ctx: &Context) -> Outcome<T> {
        (self.0)(args, ctx)
    }
}

/// A callable that returns a future to be awaited.
///
/// The future receives an owned [`Context`] handle so it can hold it
/// across await points.
pub struct Suspending<F>(pub F);

#[async_trait]
impl<A, T, F, Fut> Call<A, T> for Suspending<F>
where
    A: Send + 'static,
    T: Send + 'static,
    F: Fn(A, Context) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Outcome<T>> + Send + 'static,
{
    async fn call(&self, args: A, ctx: &Context) -> Outcome<T> {
        (self.0)(args, ctx.clone()).await
    }
}

/// Builds a [`Handler`] from a blocking closure.
pub fn blocking<A, T, F>(f: F) -> Handler<A, T>
where
    A: Send + 'static,
    T: Send + 'static,
    F: Fn(A, &Context) -> Outcome<T> + Send + Sync + 'static,
{
    Arc::new(Blocking(f))
}

/// Builds a [`Handler`] from a closure returning a future.
pub fn suspending<A, T, F, Fut>(f: F) -> Handler<A, T>
where
    A: Send + 'static,
    T: Send + 'static,
    F: Fn(A, Context) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Outcome<T>> + Send + 'static,
{
    Arc::new(Suspending(f))
}
