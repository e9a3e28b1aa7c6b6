//! JSON endpoints behind the server pipeline.
//!
//! Run with:
//!   RUST_LOG=info cargo run --example basic
//!
//! Try:
//!   curl http://localhost:3000/users/42
//!   curl -X POST http://localhost:3000/users \
//!        -H 'content-type: application/json' \
//!        -d '{"name":"alice"}'
//!   curl -X POST http://localhost:3000/users -d 'not json'

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use http::StatusCode;
use http::header::{self, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use tracing::info;
use tracing_subscriber::EnvFilter;
use tsu_kit::transport::{
    CONTEXT_KEY_REQUEST_METHOD, CONTEXT_KEY_REQUEST_PATH, CONTEXT_KEY_RESPONSE_SIZE,
    populate_request_context,
};
use tsu_kit::{
    BoxEndpoint, BoxError, Context, Endpoint, Headerer, HttpError, Key, Listener, Middleware, Reply,
    Request, Router, Server, StatusCoder, chain, encode_json_response, endpoint_fn,
};

#[derive(Serialize)]
struct User {
    id: u64,
    name: String,
}

impl Reply for User {}

#[derive(Deserialize)]
struct CreateUser {
    name: String,
}

#[derive(Serialize)]
struct Created {
    #[serde(flatten)]
    user: User,
    #[serde(skip)]
    headers: HeaderMap,
}

impl StatusCoder for Created {
    fn status_code(&self) -> StatusCode {
        StatusCode::CREATED
    }
}

impl Headerer for Created {
    fn headers(&self) -> &HeaderMap {
        &self.headers
    }
}

impl Reply for Created {
    fn as_status_coder(&self) -> Option<&dyn StatusCoder> {
        Some(self)
    }

    fn as_headerer(&self) -> Option<&dyn Headerer> {
        Some(self)
    }
}

#[tokio::main]
async fn main() -> Result<(), tsu_kit::Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let next_id = Arc::new(AtomicU64::new(100));

    let get_user = endpoint_fn(|_ctx: Context, id: u64| async move {
        Ok::<_, BoxError>(User { id, name: "alice".to_owned() })
    });

    let create_user = endpoint_fn(move |_ctx: Context, req: CreateUser| {
        let id = next_id.fetch_add(1, Ordering::Relaxed);
        async move {
            let mut headers = HeaderMap::new();
            let location = HeaderValue::from_str(&format!("/users/{id}"))?;
            headers.insert(header::LOCATION, location);
            Ok::<_, BoxError>(Created { user: User { id, name: req.name }, headers })
        }
    });
    let create_user: BoxEndpoint<CreateUser, Created> =
        chain(request_id(), [timing("create_user")])(Arc::new(create_user));

    let app = Router::new()
        .get(
            "/users/{id}",
            Server::builder(get_user, decode_user_id, encode_json_response)
                .before(populate_request_context)
                .finalizer(access_log)
                .build(),
        )
        .post(
            "/users",
            Server::builder(create_user, decode_create_user, encode_json_response)
                .before(populate_request_context)
                .finalizer(access_log)
                .build(),
        );

    Listener::bind("0.0.0.0:3000")?.serve(app).await
}

fn decode_user_id(_ctx: &Context, req: &Request) -> Result<u64, BoxError> {
    let id = req.param("id").unwrap_or_default();
    id.parse().map_err(|_| HttpError::bad_request(format!("invalid user id `{id}`")).into())
}

fn decode_create_user(_ctx: &Context, req: &Request) -> Result<CreateUser, BoxError> {
    serde_json::from_slice(req.body())
        .map_err(|e| HttpError::bad_request(format!("invalid body: {e}")).into())
}

const REQUEST_ID: Key<u64> = Key::new("request-id");

/// Tags each call with a sequential id the inner endpoints can read.
fn request_id<I, O>() -> Middleware<I, O>
where
    I: Send + 'static,
    O: Send + 'static,
{
    let counter = Arc::new(AtomicU64::new(1));
    Arc::new(move |next: BoxEndpoint<I, O>| -> BoxEndpoint<I, O> {
        let counter = counter.clone();
        Arc::new(endpoint_fn(move |ctx: Context, req: I| {
            let id = counter.fetch_add(1, Ordering::Relaxed);
            next.call(ctx.with_value(&REQUEST_ID, id), req)
        }))
    })
}

fn access_log(ctx: &Context, code: StatusCode, _req: &Request) {
    let method = ctx.value(&CONTEXT_KEY_REQUEST_METHOD).map_or("-", String::as_str);
    let path = ctx.value(&CONTEXT_KEY_REQUEST_PATH).map_or("-", String::as_str);
    let size = ctx.value(&CONTEXT_KEY_RESPONSE_SIZE).copied().unwrap_or_default();
    info!(%method, %path, status = code.as_u16(), size, "request");
}

/// Logs how long each call through the wrapped endpoint took.
fn timing<I, O>(name: &'static str) -> Middleware<I, O>
where
    I: Send + 'static,
    O: Send + 'static,
{
    Arc::new(move |next: BoxEndpoint<I, O>| -> BoxEndpoint<I, O> {
        Arc::new(endpoint_fn(move |ctx: Context, req: I| {
            let next = next.clone();
            let ctx_id = ctx.value(&REQUEST_ID).copied();
            async move {
                let start = std::time::Instant::now();
                let res = next.call(ctx, req).await;
                let id = ctx_id.unwrap_or_default();
                info!(endpoint = name, request_id = id, elapsed = ?start.elapsed(), "called");
                res
            }
        }))
    })
}
