//! Radix-tree request router.
//!
//! One tree per HTTP method. O(path-length) lookup. You register a path and
//! a handler, usually a [`Server`](crate::Server) pipeline; the listener asks
//! the router which handler a request belongs to.

use std::collections::HashMap;
use std::sync::Arc;

use http::Method;
use matchit::Router as MatchitRouter;

use crate::handler::{BoxedHandler, Handler};

/// The application router.
///
/// Build it once at startup and pass it to [`Listener::serve`](crate::Listener::serve).
/// Each registration returns `self` so calls chain.
pub struct Router {
    routes: HashMap<Method, MatchitRouter<BoxedHandler>>,
}

impl Router {
    pub fn new() -> Self {
        Self { routes: HashMap::new() }
    }

    /// Register a handler for a method + path pair.
    ///
    /// Path parameters use `{name}` syntax; `req.param("name")` retrieves them:
    ///
    /// ```rust,no_run
    /// # use http::Method;
    /// # use tsu_kit::{Request, Response, Router};
    /// # async fn get_user(_: Request) -> Response { Response::text("") }
    /// # async fn delete_user(_: Request) -> Response { Response::text("") }
    /// Router::new()
    ///     .on(Method::DELETE, "/users/{id}", delete_user)
    ///     .on(Method::GET,    "/users/{id}", get_user);
    /// ```
    ///
    /// # Panics
    ///
    /// Panics if `path` is malformed or conflicts with a route already
    /// registered for `method`. Routes are fixed at startup.
    pub fn on(mut self, method: Method, path: &str, handler: impl Handler) -> Self {
        self.routes
            .entry(method)
            .or_default()
            .insert(path, handler.into_boxed_handler())
            .unwrap_or_else(|e| panic!("invalid route `{path}`: {e}"));
        self
    }

    pub fn get(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::GET, path, handler)
    }

    pub fn post(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::POST, path, handler)
    }

    pub fn put(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::PUT, path, handler)
    }

    pub fn delete(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::DELETE, path, handler)
    }

    pub(crate) fn lookup(
        &self,
        method: &Method,
        path: &str,
    ) -> Option<(BoxedHandler, HashMap<String, String>)> {
        let tree = self.routes.get(method)?;
        let matched = tree.at(path).ok()?;
        let handler = Arc::clone(matched.value);
        let params = matched
            .params
            .iter()
            .map(|(k, v)| (k.to_owned(), v.to_owned()))
            .collect();
        Some((handler, params))
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}
