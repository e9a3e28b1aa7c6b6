//! The HTTP server pipeline.
//!
//! A [`Server`] binds one [`Endpoint`] to HTTP. For every request it runs:
//!
//! ```text
//! context ─► (wrap writer, if finalizers) ─► before hooks ─► decode ─► endpoint
//!                                                               │          │
//!                                                          error│     ok   │ error
//!                                                               ▼     ▼    ▼
//!                                      error handler ◄──── after hooks ─► encode
//!                                            │                              │
//!                                      error encoder                         │
//!                                            └───────────► finalizers ◄─────┘
//! ```
//!
//! # Guarantees
//!
//! - Hooks run in registration order and thread the context: hook *n + 1*
//!   sees the context hook *n* returned.
//! - After-hooks only run when decoding and the endpoint both succeeded.
//! - The response is terminated exactly once, on every path.
//! - Finalizers run exactly once per request, last registered first, after
//!   the response is complete. They run from a drop guard, so they also run
//!   when the request future is dropped before completion.
//!
//! # Failure policy
//!
//! Hooks cannot return errors. A panicking before-hook, decoder, endpoint or
//! after-hook is caught and handled like a failed decode: error handler, then
//! error encoder. An encoder failure goes down the same branch as long as the
//! response is not terminated yet; once it is, the error is only reported to
//! the error handler. Before the error encoder runs, the open response is
//! reset, dropping any status, headers and body the failed stage wrote.
//! Panics in the error handler, the error encoder or a finalizer are logged
//! and processing continues.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use futures_util::FutureExt;
use http::StatusCode;

use crate::context::Context;
use crate::encode::default_error_encoder;
use crate::endpoint::{BoxEndpoint, Endpoint};
use crate::error::{BoxError, Error, Stage};
use crate::intercept::InterceptingWriter;
use crate::log::{Logger, TracingLogger};
use crate::request::Request;
use crate::response::Response;
use crate::transport::{
    CONTEXT_KEY_RESPONSE_HEADERS, CONTEXT_KEY_RESPONSE_SIZE, DecodeRequestFn, EncodeResponseFn,
    ErrorEncoder, ErrorHandler, LogErrorHandler, RequestFn, ResponseWriter, ServerFinalizerFn,
    ServerResponseFn,
};

/// An endpoint bound to HTTP.
///
/// Configuration is fixed when [`ServerBuilder::build`] returns; the server
/// is then cloned (one `Arc` increment) into every connection task.
pub struct Server<I, O> {
    inner: Arc<Inner<I, O>>,
}

struct Inner<I, O> {
    endpoint: BoxEndpoint<I, O>,
    dec: DecodeRequestFn<I>,
    enc: EncodeResponseFn<O>,
    before: Vec<RequestFn>,
    after: Vec<ServerResponseFn>,
    error_encoder: ErrorEncoder,
    error_handler: Arc<dyn ErrorHandler>,
    finalizers: Vec<ServerFinalizerFn>,
    logger: Arc<dyn Logger>,
}

impl<I, O> Clone for Server<I, O> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

impl<I, O> Server<I, O>
where
    I: Send + 'static,
    O: Send + 'static,
{
    /// A server with default options.
    pub fn new(
        endpoint: impl Endpoint<I, O>,
        dec: impl Fn(&Context, &Request) -> Result<I, BoxError> + Send + Sync + 'static,
        enc: impl Fn(&Context, &mut dyn ResponseWriter, &O) -> Result<(), BoxError> + Send + Sync + 'static,
    ) -> Self {
        Self::builder(endpoint, dec, enc).build()
    }

    pub fn builder(
        endpoint: impl Endpoint<I, O>,
        dec: impl Fn(&Context, &Request) -> Result<I, BoxError> + Send + Sync + 'static,
        enc: impl Fn(&Context, &mut dyn ResponseWriter, &O) -> Result<(), BoxError> + Send + Sync + 'static,
    ) -> ServerBuilder<I, O> {
        ServerBuilder {
            endpoint: Arc::new(endpoint),
            dec: Arc::new(dec),
            enc: Arc::new(enc),
            before: Vec::new(),
            after: Vec::new(),
            error_encoder: Arc::new(default_error_encoder),
            error_handler: None,
            finalizers: Vec::new(),
            logger: Arc::new(TracingLogger),
        }
    }

    /// Handles one request, writing the outcome to `w`.
    pub async fn serve_http(&self, w: &mut dyn ResponseWriter, req: &Request) {
        let s = &*self.inner;
        let ctx = Context::background();

        if s.finalizers.is_empty() {
            let mut ctx = ctx;
            s.run(&mut ctx, w, req).await;
            return;
        }

        // Finalizers run when `deferred` drops: at the end of this scope, or
        // wherever the enclosing future is dropped.
        let mut deferred = Deferred {
            ctx,
            writer: InterceptingWriter::new(w),
            request: req,
            finalizers: &s.finalizers,
            logger: &*s.logger,
        };
        s.run(&mut deferred.ctx, &mut deferred.writer, req).await;
    }

    /// Handles one request into a fresh buffered [`Response`].
    pub async fn serve(&self, req: &Request) -> Response {
        let mut res = Response::new();
        self.serve_http(&mut res, req).await;
        res
    }
}

impl<I, O> Inner<I, O>
where
    I: Send + 'static,
    O: Send + 'static,
{
    async fn run(&self, ctx: &mut Context, w: &mut dyn ResponseWriter, req: &Request) {
        if let Err(err) = self.exchange(ctx, w, req).await {
            self.fail(ctx, &err, w);
        }
        if !w.is_ended() {
            self.logger.warn("encoder returned without terminating the response", &[]);
            w.end();
        }
    }

    async fn exchange(
        &self,
        ctx: &mut Context,
        w: &mut dyn ResponseWriter,
        req: &Request,
    ) -> Result<(), Error> {
        for before in &self.before {
            *ctx = guard(Stage::Before, || before(ctx.clone(), req))?;
        }

        let request = guard(Stage::Decode, || (self.dec)(&*ctx, req))?.map_err(Error::Decode)?;

        let pending = guard(Stage::Endpoint, || self.endpoint.call(ctx.clone(), request))?;
        let response = AssertUnwindSafe(pending)
            .catch_unwind()
            .await
            .map_err(|payload| Error::Panic {
                stage: Stage::Endpoint,
                message: panic_message(payload.as_ref()),
            })?
            .map_err(Error::Endpoint)?;

        for after in &self.after {
            *ctx = guard(Stage::After, || after(ctx.clone(), &mut *w))?;
        }

        guard(Stage::Encode, || (self.enc)(&*ctx, &mut *w, &response))?.map_err(Error::Encode)
    }

    fn fail(&self, ctx: &Context, err: &Error, w: &mut dyn ResponseWriter) {
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| self.error_handler.handle(ctx, err))) {
            self.logger.error(
                "error handler panicked",
                &[("panic", &panic_message(payload.as_ref())), ("err", err)],
            );
        }

        if w.is_ended() {
            self.logger.warn("response already terminated, error not encoded", &[("err", err)]);
            return;
        }
        // Drop whatever a failed stage left behind so the error response
        // starts from scratch.
        w.reset();

        match panic::catch_unwind(AssertUnwindSafe(|| (self.error_encoder)(ctx, err, &mut *w))) {
            Err(payload) => {
                self.logger.error("error encoder panicked", &[("panic", &panic_message(payload.as_ref()))]);
            }
            Ok(()) if !w.is_ended() => {
                self.logger.warn("error encoder returned without terminating the response", &[]);
            }
            Ok(()) => return,
        }
        // Only reached with an open response; a committed status wins.
        w.write_header(StatusCode::INTERNAL_SERVER_ERROR);
        w.end();
    }
}

// ── Finalization ─────────────────────────────────────────────────────────────

/// Per-request state that outlives every pipeline stage.
///
/// Dropping it runs the finalizers, so they run on every exit path.
struct Deferred<'a> {
    ctx: Context,
    writer: InterceptingWriter<'a>,
    request: &'a Request,
    finalizers: &'a [ServerFinalizerFn],
    logger: &'a dyn Logger,
}

impl Drop for Deferred<'_> {
    fn drop(&mut self) {
        let ctx = self
            .ctx
            .with_value(&CONTEXT_KEY_RESPONSE_HEADERS, self.writer.headers().clone())
            .with_value(&CONTEXT_KEY_RESPONSE_SIZE, self.writer.written());
        let code = self.writer.code();

        for finalizer in self.finalizers.iter().rev() {
            let run = panic::catch_unwind(AssertUnwindSafe(|| finalizer(&ctx, code, self.request)));
            if let Err(payload) = run {
                self.logger.error("finalizer panicked", &[("panic", &panic_message(payload.as_ref()))]);
            }
        }
    }
}

// ── Builder ──────────────────────────────────────────────────────────────────

/// Options for a [`Server`]. Obtain via [`Server::builder`].
///
/// Hook methods append; calling one several times registers several hooks.
pub struct ServerBuilder<I, O> {
    endpoint: BoxEndpoint<I, O>,
    dec: DecodeRequestFn<I>,
    enc: EncodeResponseFn<O>,
    before: Vec<RequestFn>,
    after: Vec<ServerResponseFn>,
    error_encoder: ErrorEncoder,
    error_handler: Option<Arc<dyn ErrorHandler>>,
    finalizers: Vec<ServerFinalizerFn>,
    logger: Arc<dyn Logger>,
}

impl<I, O> ServerBuilder<I, O>
where
    I: Send + 'static,
    O: Send + 'static,
{
    /// Runs on the raw request before it is decoded.
    pub fn before(mut self, f: impl Fn(Context, &Request) -> Context + Send + Sync + 'static) -> Self {
        self.before.push(Arc::new(f));
        self
    }

    /// Runs on the response sink after the endpoint succeeded, before encoding.
    pub fn after(
        mut self,
        f: impl Fn(Context, &mut dyn ResponseWriter) -> Context + Send + Sync + 'static,
    ) -> Self {
        self.after.push(Arc::new(f));
        self
    }

    /// Replaces [`default_error_encoder`].
    pub fn error_encoder(
        mut self,
        f: impl Fn(&Context, &Error, &mut dyn ResponseWriter) + Send + Sync + 'static,
    ) -> Self {
        self.error_encoder = Arc::new(f);
        self
    }

    /// Replaces the default handler, which logs through the server's logger.
    pub fn error_handler(mut self, handler: impl ErrorHandler + 'static) -> Self {
        self.error_handler = Some(Arc::new(handler));
        self
    }

    /// Runs at the end of every request. By default there are none.
    pub fn finalizer(mut self, f: impl Fn(&Context, StatusCode, &Request) + Send + Sync + 'static) -> Self {
        self.finalizers.push(Arc::new(f));
        self
    }

    /// Logger for the server's own diagnostics and the default error handler.
    pub fn logger(mut self, logger: impl Logger + 'static) -> Self {
        self.logger = Arc::new(logger);
        self
    }

    pub fn build(self) -> Server<I, O> {
        let logger = self.logger;
        let error_handler = self
            .error_handler
            .unwrap_or_else(|| Arc::new(LogErrorHandler::new(Arc::clone(&logger))));

        Server {
            inner: Arc::new(Inner {
                endpoint: self.endpoint,
                dec: self.dec,
                enc: self.enc,
                before: self.before,
                after: self.after,
                error_encoder: self.error_encoder,
                error_handler,
                finalizers: self.finalizers,
                logger,
            }),
        }
    }
}

fn guard<T>(stage: Stage, f: impl FnOnce() -> T) -> Result<T, Error> {
    panic::catch_unwind(AssertUnwindSafe(f)).map_err(|payload| Error::Panic {
        stage,
        message: panic_message(payload.as_ref()),
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_owned()
    }
}
