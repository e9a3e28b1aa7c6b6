//! Endpoints and middlewares.
//!
//! An [`Endpoint`] is one unit of business logic: a typed request in, a typed
//! response out, nothing transport-specific on either side. A [`Middleware`]
//! turns one endpoint into another endpoint of the same shape, which is where
//! cross-cutting behavior (timing, auth checks, logging) lives.
//!
//! # Storage
//!
//! Endpoints of different concrete types have to sit behind one type inside a
//! [`Server`](crate::Server) and inside middleware closures, so they are
//! stored as trait objects:
//!
//! ```text
//! |ctx, req| async { … }              ← user writes this
//!        ↓ endpoint_fn(…)
//! EndpointFn(closure)                 ← implements Endpoint<I, O>
//!        ↓ Arc::new(…)
//! BoxEndpoint<I, O>                   ← Arc<dyn Endpoint<I, O>>
//!        ↓ middleware(endpoint)
//! BoxEndpoint<I, O>                   ← same shape, new behavior
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::context::Context;
use crate::error::BoxError;

/// A heap-allocated, type-erased future.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A unit of business logic.
///
/// `call` may complete asynchronously; the returned future owns everything it
/// needs so the caller can await it after `&self` is gone.
pub trait Endpoint<I, O>: Send + Sync + 'static {
    fn call(&self, ctx: Context, request: I) -> BoxFuture<'static, Result<O, BoxError>>;
}

/// A shared, type-erased endpoint.
pub type BoxEndpoint<I, O> = Arc<dyn Endpoint<I, O>>;

impl<I, O, E> Endpoint<I, O> for Arc<E>
where
    E: Endpoint<I, O> + ?Sized,
{
    fn call(&self, ctx: Context, request: I) -> BoxFuture<'static, Result<O, BoxError>> {
        (**self).call(ctx, request)
    }
}

/// Adapts an async closure into an [`Endpoint`].
///
/// ```rust
/// use tsu_kit::{endpoint_fn, BoxError, Context, Endpoint};
///
/// let double = endpoint_fn(|_ctx: Context, n: u32| async move { Ok::<_, BoxError>(n * 2) });
/// # let _ = double;
/// ```
pub fn endpoint_fn<F>(f: F) -> EndpointFn<F> {
    EndpointFn(f)
}

/// See [`endpoint_fn`].
#[derive(Clone, Copy)]
pub struct EndpointFn<F>(F);

impl<F, Fut, I, O> Endpoint<I, O> for EndpointFn<F>
where
    F: Fn(Context, I) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<O, BoxError>> + Send + 'static,
{
    fn call(&self, ctx: Context, request: I) -> BoxFuture<'static, Result<O, BoxError>> {
        Box::pin((self.0)(ctx, request))
    }
}

// ── Middleware ───────────────────────────────────────────────────────────────

/// Wraps an endpoint in another endpoint of the same signature.
pub type Middleware<I, O> = Arc<dyn Fn(BoxEndpoint<I, O>) -> BoxEndpoint<I, O> + Send + Sync>;

/// Composes middlewares into one.
///
/// Requests traverse them in the order they are declared: `outer` is the
/// outermost wrapper, so for `chain(a, [b, c])` a request flows
/// `a → b → c → endpoint` and the response flows back `c → b → a`.
pub fn chain<I, O>(
    outer: Middleware<I, O>,
    others: impl IntoIterator<Item = Middleware<I, O>>,
) -> Middleware<I, O>
where
    I: 'static,
    O: 'static,
{
    let others: Vec<Middleware<I, O>> = others.into_iter().collect();
    Arc::new(move |mut next: BoxEndpoint<I, O>| {
        for mw in others.iter().rev() {
            next = mw(next);
        }
        outer(next)
    })
}

// ── Failer ───────────────────────────────────────────────────────────────────

/// Optional capability of response types that carry a business-logic error.
///
/// When `failed` returns `Some`, an encoder may choose to encode the response
/// differently from a regular success. The pipeline itself does not look at
/// it: a failed response is still on the success path.
pub trait Failer {
    fn failed(&self) -> Option<&(dyn std::error::Error + Send + Sync + 'static)>;
}
