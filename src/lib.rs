//! # tsu-kit
//!
//! Endpoints, middlewares and an HTTP server pipeline around them.
//!
//! ## The pieces
//!
//! - An [`Endpoint`] is one async operation: typed request in, typed
//!   response or error out. It knows nothing about HTTP.
//! - A [`Middleware`] wraps an endpoint into another endpoint. [`chain`]
//!   composes several; the first one listed is the outermost.
//! - A [`Context`] carries request-scoped values down the call. It is
//!   immutable: adding a value returns a new context.
//! - A [`Server`] binds an endpoint to HTTP with a decoder, an encoder and
//!   optional hooks, and runs every request through the same pipeline
//!   (see [`server`](crate::Server) for the order and the guarantees).
//! - A [`Router`] and a [`Listener`] put servers on a socket.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use serde::{Deserialize, Serialize};
//! use tsu_kit::{
//!     encode_json_response, endpoint_fn, BoxError, Context, Listener, Reply, Request, Router,
//!     Server,
//! };
//!
//! #[derive(Deserialize)]
//! struct Greet { name: String }
//!
//! #[derive(Serialize)]
//! struct Greeting { message: String }
//!
//! impl Reply for Greeting {}
//!
//! fn decode(_ctx: &Context, req: &Request) -> Result<Greet, BoxError> {
//!     Ok(serde_json::from_slice(req.body())?)
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), tsu_kit::Error> {
//!     let greet = endpoint_fn(|_ctx: Context, req: Greet| async move {
//!         Ok::<_, BoxError>(Greeting { message: format!("hello, {}", req.name) })
//!     });
//!
//!     let app = Router::new().post("/greet", Server::new(greet, decode, encode_json_response));
//!
//!     Listener::bind("0.0.0.0:3000")?.serve(app).await
//! }
//! ```

mod context;
mod encode;
mod endpoint;
mod error;
mod handler;
mod intercept;
mod listener;
mod request;
mod response;
mod router;
mod server;

pub mod log;
pub mod transport;

pub use context::{Context, Key};
pub use encode::{default_error_encoder, encode_json_response};
pub use endpoint::{chain, endpoint_fn, BoxEndpoint, BoxFuture, Endpoint, EndpointFn, Failer, Middleware};
pub use error::{BoxError, Error, HttpError, Stage};
pub use handler::Handler;
pub use intercept::InterceptingWriter;
pub use listener::Listener;
pub use log::{Logger, NopLogger, TracingLogger};
pub use request::Request;
pub use response::{ContentType, Response};
pub use router::Router;
pub use server::{Server, ServerBuilder};
pub use transport::{ErrorHandler, Headerer, Reply, ResponseWriter, StatusCoder};
