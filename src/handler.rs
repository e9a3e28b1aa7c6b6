//! Handler trait and type erasure.
//!
//! # How handlers are stored
//!
//! The router holds handlers of *different* types in one
//! `HashMap<Method, Tree>`: pipelines over any request/response pair, and
//! plain async functions. Both are hidden behind `dyn ErasedHandler`:
//!
//! ```text
//! Server<I, O>   or   async fn(Request) -> Response   ← user builds this
//!        ↓ router.on(Method::GET, "/", handler)
//! handler.into_boxed_handler()                         ← Handler impls
//!        ↓  stored as BoxedHandler = Arc<dyn ErasedHandler>
//! handler.call(req)  at request time                   ← one vtable dispatch
//! ```

use std::future::Future;
use std::sync::Arc;

use crate::endpoint::BoxFuture;
use crate::request::Request;
use crate::response::Response;
use crate::server::Server;

/// Internal dispatch interface.
///
/// `#[doc(hidden)] pub` rather than `pub(crate)` because it appears in the
/// return type of the public `Handler` trait's `into_boxed_handler` method.
#[doc(hidden)]
pub trait ErasedHandler {
    fn call(&self, req: Request) -> BoxFuture<'static, Response>;
}

/// A type-erased handler shared across concurrent requests.
#[doc(hidden)]
pub type BoxedHandler = Arc<dyn ErasedHandler + Send + Sync + 'static>;

/// Anything the router can dispatch to.
///
/// Implemented for every [`Server`] and for any
/// `async fn name(req: Request) -> Response`. The trait is sealed.
pub trait Handler: private::Sealed + Send + Sync + 'static {
    #[doc(hidden)]
    fn into_boxed_handler(self) -> BoxedHandler;
}

mod private {
    pub trait Sealed {}
}

// ── Pipelines ─────────────────────────────────────────────────────────────────

impl<I, O> private::Sealed for Server<I, O>
where
    I: Send + 'static,
    O: Send + 'static,
{
}

impl<I, O> Handler for Server<I, O>
where
    I: Send + 'static,
    O: Send + 'static,
{
    fn into_boxed_handler(self) -> BoxedHandler {
        Arc::new(self)
    }
}

impl<I, O> ErasedHandler for Server<I, O>
where
    I: Send + 'static,
    O: Send + 'static,
{
    fn call(&self, req: Request) -> BoxFuture<'static, Response> {
        let server = self.clone();
        Box::pin(async move { server.serve(&req).await })
    }
}

// ── Plain functions ───────────────────────────────────────────────────────────

impl<F, Fut> private::Sealed for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Response> + Send + 'static,
{
}

impl<F, Fut> Handler for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Response> + Send + 'static,
{
    fn into_boxed_handler(self) -> BoxedHandler {
        Arc::new(FnHandler(self))
    }
}

/// Newtype bridging a plain async function to [`ErasedHandler`].
struct FnHandler<F>(F);

impl<F, Fut> ErasedHandler for FnHandler<F>
where
    F: Fn(Request) -> Fut + Send + Sync,
    Fut: Future<Output = Response> + Send + 'static,
{
    fn call(&self, req: Request) -> BoxFuture<'static, Response> {
        Box::pin((self.0)(req))
    }
}
