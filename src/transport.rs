//! Transport contracts.
//!
//! These are the function shapes a [`Server`](crate::Server) is assembled
//! from. Each one is a shared closure so one server value can be cloned into
//! every connection task and called concurrently without locks.
//!
//! | Shape | Called | May fail |
//! |---|---|---|
//! | [`RequestFn`] | before decoding, in registration order | no |
//! | [`DecodeRequestFn`] | once | yes → error branch |
//! | [`ServerResponseFn`] | after a successful endpoint call, in registration order | no |
//! | [`EncodeResponseFn`] | once, success path | yes |
//! | [`ErrorHandler`] | error branch, first | no |
//! | [`ErrorEncoder`] | error branch, second | no |
//! | [`ServerFinalizerFn`] | after the response, last registered first | no |

use std::sync::Arc;

use http::header::{self, HeaderMap, HeaderName, HeaderValue};
use http::StatusCode;
use serde::Serialize;

use crate::context::{Context, Key};
use crate::endpoint::Failer;
use crate::error::{BoxError, Error};
use crate::log::Logger;
use crate::request::Request;

// ── Response sink ────────────────────────────────────────────────────────────

/// The outbound side of one HTTP exchange.
///
/// The first `write_header` commits the status; a `write` before any
/// `write_header` commits `200 OK`. `end` terminates the response: writes
/// after it fail, and a second `end` has no effect.
///
/// `reset` discards status, headers and body of a response that is not
/// terminated yet, so it can be written again from scratch. It has no effect
/// on a terminated response.
pub trait ResponseWriter: Send {
    fn headers(&self) -> &HeaderMap;
    fn headers_mut(&mut self) -> &mut HeaderMap;
    fn write_header(&mut self, status: StatusCode);
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize>;
    fn reset(&mut self);
    fn end(&mut self);
    fn is_ended(&self) -> bool;
}

// ── Function shapes ──────────────────────────────────────────────────────────

/// Extracts a typed request from the raw HTTP request.
pub type DecodeRequestFn<I> = Arc<dyn Fn(&Context, &Request) -> Result<I, BoxError> + Send + Sync>;

/// Writes a typed response. Must terminate the response.
pub type EncodeResponseFn<O> =
    Arc<dyn Fn(&Context, &mut dyn ResponseWriter, &O) -> Result<(), BoxError> + Send + Sync>;

/// Before-hook: moves information from the raw request into the context.
pub type RequestFn = Arc<dyn Fn(Context, &Request) -> Context + Send + Sync>;

/// After-hook: runs against the response sink after the endpoint succeeded
/// and before anything is written.
pub type ServerResponseFn = Arc<dyn Fn(Context, &mut dyn ResponseWriter) -> Context + Send + Sync>;

/// Writes an error to the response. Must terminate the response.
pub type ErrorEncoder = Arc<dyn Fn(&Context, &Error, &mut dyn ResponseWriter) + Send + Sync>;

/// Runs after the response has been written, on every request.
///
/// Besides the status code, the response headers and size are available
/// under [`CONTEXT_KEY_RESPONSE_HEADERS`] and [`CONTEXT_KEY_RESPONSE_SIZE`].
pub type ServerFinalizerFn = Arc<dyn Fn(&Context, StatusCode, &Request) + Send + Sync>;

// ── Error handler ────────────────────────────────────────────────────────────

/// Receives every error of the error branch, for diagnostics only.
///
/// Closures with the matching signature are error handlers.
pub trait ErrorHandler: Send + Sync {
    fn handle(&self, ctx: &Context, err: &Error);
}

impl<F> ErrorHandler for F
where
    F: Fn(&Context, &Error) + Send + Sync,
{
    fn handle(&self, ctx: &Context, err: &Error) {
        self(ctx, err)
    }
}

/// Logs each error at `error` level.
pub struct LogErrorHandler {
    logger: Arc<dyn Logger>,
}

impl LogErrorHandler {
    pub fn new(logger: Arc<dyn Logger>) -> Self {
        Self { logger }
    }
}

impl ErrorHandler for LogErrorHandler {
    fn handle(&self, _ctx: &Context, err: &Error) {
        match err.stage() {
            Some(stage) => self.logger.error("transport error", &[("stage", &stage), ("err", err)]),
            None => self.logger.error("transport error", &[("err", err)]),
        }
    }
}

// ── Capabilities ─────────────────────────────────────────────────────────────

/// Chooses the status code a response or error is encoded with.
pub trait StatusCoder {
    fn status_code(&self) -> StatusCode;
}

/// Supplies headers to add to the response.
pub trait Headerer {
    fn headers(&self) -> &HeaderMap;
}

/// A response the JSON encoder can write.
///
/// The capability queries default to `None`; override the ones the type
/// supports.
///
/// ```rust
/// use http::StatusCode;
/// use serde::Serialize;
/// use tsu_kit::{Reply, StatusCoder};
///
/// #[derive(Serialize)]
/// struct Created { id: u64 }
///
/// impl StatusCoder for Created {
///     fn status_code(&self) -> StatusCode { StatusCode::CREATED }
/// }
///
/// impl Reply for Created {
///     fn as_status_coder(&self) -> Option<&dyn StatusCoder> { Some(self) }
/// }
/// ```
pub trait Reply: Serialize {
    fn as_status_coder(&self) -> Option<&dyn StatusCoder> {
        None
    }

    fn as_headerer(&self) -> Option<&dyn Headerer> {
        None
    }

    fn as_failer(&self) -> Option<&dyn Failer> {
        None
    }
}

impl Reply for serde_json::Value {}

// ── Request and response funcs ───────────────────────────────────────────────

/// An after-hook setting the `Content-Type` header.
pub fn set_content_type(
    value: HeaderValue,
) -> impl Fn(Context, &mut dyn ResponseWriter) -> Context + Send + Sync + 'static {
    set_response_header(header::CONTENT_TYPE, value)
}

/// An after-hook setting one response header.
pub fn set_response_header(
    name: HeaderName,
    value: HeaderValue,
) -> impl Fn(Context, &mut dyn ResponseWriter) -> Context + Send + Sync + 'static {
    move |ctx: Context, w: &mut dyn ResponseWriter| {
        w.headers_mut().insert(name.clone(), value.clone());
        ctx
    }
}

pub const CONTEXT_KEY_REQUEST_METHOD: Key<String> = Key::new("request-method");
pub const CONTEXT_KEY_REQUEST_URI: Key<String> = Key::new("request-uri");
pub const CONTEXT_KEY_REQUEST_PATH: Key<String> = Key::new("request-path");
pub const CONTEXT_KEY_REQUEST_PROTO: Key<String> = Key::new("request-proto");
pub const CONTEXT_KEY_REQUEST_HOST: Key<String> = Key::new("request-host");
pub const CONTEXT_KEY_REQUEST_REMOTE_ADDR: Key<String> = Key::new("request-remote-addr");
pub const CONTEXT_KEY_REQUEST_X_FORWARDED_FOR: Key<String> = Key::new("request-x-forwarded-for");
pub const CONTEXT_KEY_REQUEST_X_FORWARDED_PROTO: Key<String> = Key::new("request-x-forwarded-proto");
pub const CONTEXT_KEY_REQUEST_AUTHORIZATION: Key<String> = Key::new("request-authorization");
pub const CONTEXT_KEY_REQUEST_REFERER: Key<String> = Key::new("request-referer");
pub const CONTEXT_KEY_REQUEST_USER_AGENT: Key<String> = Key::new("request-user-agent");
pub const CONTEXT_KEY_REQUEST_X_REQUEST_ID: Key<String> = Key::new("request-x-request-id");
pub const CONTEXT_KEY_REQUEST_ACCEPT: Key<String> = Key::new("request-accept");

/// Response headers as they were when finalizers started.
pub const CONTEXT_KEY_RESPONSE_HEADERS: Key<HeaderMap> = Key::new("response-headers");
/// Bytes of response body written.
pub const CONTEXT_KEY_RESPONSE_SIZE: Key<u64> = Key::new("response-size");

/// A before-hook storing request metadata under the `CONTEXT_KEY_REQUEST_*`
/// keys. Headers missing from the request are not stored.
pub fn populate_request_context(ctx: Context, req: &Request) -> Context {
    let mut ctx = ctx
        .with_value(&CONTEXT_KEY_REQUEST_METHOD, req.method().to_string())
        .with_value(&CONTEXT_KEY_REQUEST_URI, req.uri().to_string())
        .with_value(&CONTEXT_KEY_REQUEST_PATH, req.path().to_owned())
        .with_value(&CONTEXT_KEY_REQUEST_PROTO, format!("{:?}", req.version()));

    if let Some(host) = req.host() {
        ctx = ctx.with_value(&CONTEXT_KEY_REQUEST_HOST, host.to_owned());
    }
    if let Some(addr) = req.remote_addr() {
        ctx = ctx.with_value(&CONTEXT_KEY_REQUEST_REMOTE_ADDR, addr.to_string());
    }

    let headers = [
        (&CONTEXT_KEY_REQUEST_X_FORWARDED_FOR, "x-forwarded-for"),
        (&CONTEXT_KEY_REQUEST_X_FORWARDED_PROTO, "x-forwarded-proto"),
        (&CONTEXT_KEY_REQUEST_AUTHORIZATION, "authorization"),
        (&CONTEXT_KEY_REQUEST_REFERER, "referer"),
        (&CONTEXT_KEY_REQUEST_USER_AGENT, "user-agent"),
        (&CONTEXT_KEY_REQUEST_X_REQUEST_ID, "x-request-id"),
        (&CONTEXT_KEY_REQUEST_ACCEPT, "accept"),
    ];
    for (key, name) in headers {
        if let Some(value) = req.header(name) {
            ctx = ctx.with_value(key, value.to_owned());
        }
    }
    ctx
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;
    use crate::response::Response;

    fn request() -> Request {
        let req = http::Request::builder()
            .method("POST")
            .uri("http://api.local/users?page=2")
            .header("user-agent", "curl/8.0")
            .header("x-request-id", "req-1")
            .body(Bytes::new())
            .unwrap();
        Request::from(req).with_remote_addr("10.0.0.7:5123".parse().unwrap())
    }

    #[test]
    fn populate_request_context_stores_request_metadata() {
        let ctx = populate_request_context(Context::background(), &request());

        let get = |key: &Key<String>| ctx.value(key).cloned();
        assert_eq!(get(&CONTEXT_KEY_REQUEST_METHOD).as_deref(), Some("POST"));
        assert_eq!(get(&CONTEXT_KEY_REQUEST_PATH).as_deref(), Some("/users"));
        assert_eq!(get(&CONTEXT_KEY_REQUEST_URI).as_deref(), Some("http://api.local/users?page=2"));
        assert_eq!(get(&CONTEXT_KEY_REQUEST_PROTO).as_deref(), Some("HTTP/1.1"));
        assert_eq!(get(&CONTEXT_KEY_REQUEST_HOST).as_deref(), Some("api.local"));
        assert_eq!(get(&CONTEXT_KEY_REQUEST_REMOTE_ADDR).as_deref(), Some("10.0.0.7:5123"));
        assert_eq!(get(&CONTEXT_KEY_REQUEST_USER_AGENT).as_deref(), Some("curl/8.0"));
        assert_eq!(get(&CONTEXT_KEY_REQUEST_X_REQUEST_ID).as_deref(), Some("req-1"));
        assert_eq!(get(&CONTEXT_KEY_REQUEST_AUTHORIZATION), None);
    }

    #[test]
    fn set_content_type_overrides_the_header() {
        let mut w = Response::new();
        w.headers_mut().insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain"));

        let hook = set_content_type(HeaderValue::from_static("application/xml"));
        let _ = hook(Context::background(), &mut w);

        assert_eq!(w.headers()[header::CONTENT_TYPE], "application/xml");
    }

    #[test]
    fn closures_are_error_handlers() {
        let seen = std::sync::Mutex::new(Vec::new());
        let handler = |_ctx: &Context, err: &Error| seen.lock().unwrap().push(err.to_string());

        handler.handle(&Context::background(), &Error::Decode("bad json".into()));
        assert_eq!(*seen.lock().unwrap(), ["bad json"]);
    }
}
