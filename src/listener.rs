//! TCP listener and graceful shutdown.
//!
//! # Graceful shutdown
//!
//! On **SIGTERM** or Ctrl-C the listener:
//! 1. Immediately stops accepting new connections.
//! 2. Lets every in-flight connection task run to completion.
//! 3. Returns from [`Listener::serve`], which lets `main` exit cleanly.
//!
//! In-flight requests therefore still run their finalizers.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use http::StatusCode;
use http_body_util::{BodyExt, Full};
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::error::Error;
use crate::request::Request;
use crate::response::Response;
use crate::router::Router;

/// Accepts HTTP/1.1 and HTTP/2 connections and hands each request to a
/// [`Router`].
pub struct Listener {
    addr: SocketAddr,
}

impl Listener {
    /// Configures the listener to bind to `addr` when [`serve`](Listener::serve)
    /// is called.
    ///
    /// ```rust
    /// use tsu_kit::Listener;
    ///
    /// assert!(Listener::bind("0.0.0.0:3000").is_ok());
    /// assert!(Listener::bind("not an address").is_err());
    /// ```
    pub fn bind(addr: &str) -> Result<Self, Error> {
        Ok(Self { addr: addr.parse()? })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Starts accepting connections and dispatching them through `router`.
    ///
    /// Returns only after a full graceful shutdown.
    pub async fn serve(self, router: Router) -> Result<(), Error> {
        let listener = TcpListener::bind(self.addr).await?;
        let router = Arc::new(router);

        info!(addr = %self.addr, "listening");

        let mut tasks = tokio::task::JoinSet::new();

        let shutdown = shutdown_signal();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                // Check shutdown first so a signal stops accepting at once,
                // even with connections queued.
                biased;

                () = &mut shutdown => {
                    info!(in_flight = tasks.len(), "shutdown signal received, draining connections");
                    break;
                }

                res = listener.accept() => {
                    let (stream, remote_addr) = match res {
                        Ok(v) => v,
                        Err(e) => {
                            error!("accept error: {e}");
                            continue;
                        }
                    };

                    let router = Arc::clone(&router);
                    let io = TokioIo::new(stream);

                    tasks.spawn(async move {
                        // Called once per request on the connection.
                        let svc = service_fn(move |req| {
                            let router = Arc::clone(&router);
                            async move { dispatch(&router, req, remote_addr).await }
                        });

                        if let Err(e) = ConnBuilder::new(TokioExecutor::new())
                            .serve_connection(io, svc)
                            .await
                        {
                            error!(peer = %remote_addr, "connection error: {e}");
                        }
                    });
                }

                // Reap finished tasks so the set does not grow without bound.
                Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
            }
        }

        while tasks.join_next().await.is_some() {}

        info!("stopped");
        Ok(())
    }
}

// ── Request dispatch ──────────────────────────────────────────────────────────

/// Routes one request and produces one response.
///
/// Failures become responses (400, 404) so hyper never sees an error.
async fn dispatch(
    router: &Router,
    req: hyper::Request<hyper::body::Incoming>,
    remote_addr: SocketAddr,
) -> Result<http::Response<Full<Bytes>>, Infallible> {
    let (parts, body) = req.into_parts();

    let Some((handler, params)) = router.lookup(&parts.method, parts.uri.path()) else {
        return Ok(Response::empty(StatusCode::NOT_FOUND).into_inner());
    };

    let body = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            warn!(peer = %remote_addr, "request body not read: {e}");
            return Ok(Response::empty(StatusCode::BAD_REQUEST).into_inner());
        }
    };

    let req = Request::from_parts(parts, body)
        .with_remote_addr(remote_addr)
        .with_params(params);

    Ok(handler.call(req).await.into_inner())
}

// ── Shutdown signal ───────────────────────────────────────────────────────────

/// Resolves on the first SIGTERM or Ctrl-C the process receives.
///
/// A signal that cannot be installed is logged and never fires.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Ctrl-C handler not installed: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let sigterm = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("SIGTERM handler not installed: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c   => {}
        () = sigterm  => {}
    }
}
