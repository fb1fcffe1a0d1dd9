//! HTTP server and graceful shutdown.
//!
//! # Request flow
//!
//! Each request body is read in full, then the router runs in a task of its
//! own, writing into a [`HyperWriter`] decorated by [`writer::wrap`]. hyper
//! gets the response head as soon as the handler returns or first flushes.
//! Every response therefore carries the latency header, and a handler that
//! writes nothing answers `200 OK`.
//!
//! # Graceful shutdown
//!
//! On SIGTERM or Ctrl-C (or the future given to
//! [`Server::serve_with_shutdown`]) the server:
//! 1. stops accepting connections,
//! 2. tells every open connection to finish its in-flight requests and close,
//! 3. returns once all connection tasks are done.

use std::convert::Infallible;
use std::future::{self, Future};
use std::net::SocketAddr;
use std::sync::Arc;

use http::{HeaderName, StatusCode};
use http_body_util::BodyExt;
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use tokio::net::TcpListener;
use tokio::sync::{oneshot, watch};
use tracing::{error, info, warn};

use crate::config::ServerConfig;
use crate::error::Error;
use crate::request::Request;
use crate::response::ResponseWriter;
use crate::router::Router;
use crate::transport::{HyperWriter, ResponseBody};
use crate::writer::{self, DEFAULT_RESPONSE_TIME_HEADER, Instrumented};

enum Bind {
    Addr(SocketAddr),
    Listener(TcpListener),
}

/// The HTTP server.
pub struct Server {
    bind: Bind,
    response_time_header: HeaderName,
}

impl Server {
    /// Configures the server to bind to `addr` when [`serve`](Server::serve)
    /// is called.
    ///
    /// ```rust,no_run
    /// use loupe::Server;
    /// let server = Server::bind(([0, 0, 0, 0], 3000).into());
    /// ```
    pub fn bind(addr: SocketAddr) -> Self {
        Self { bind: Bind::Addr(addr), response_time_header: DEFAULT_RESPONSE_TIME_HEADER }
    }

    /// Serves on a listener that is already bound, e.g. to port 0 in tests.
    pub fn from_listener(listener: TcpListener) -> Self {
        Self { bind: Bind::Listener(listener), response_time_header: DEFAULT_RESPONSE_TIME_HEADER }
    }

    pub fn from_config(config: &ServerConfig) -> Result<Self, Error> {
        Ok(Self::bind(config.bind_address).response_time_header(config.response_time_header()?))
    }

    /// Name of the latency header. Defaults to `x-response-time`.
    pub fn response_time_header(mut self, name: HeaderName) -> Self {
        self.response_time_header = name;
        self
    }

    /// Starts accepting connections and dispatching them through `router`.
    ///
    /// Returns after a full graceful shutdown triggered by SIGTERM or Ctrl-C.
    pub async fn serve(self, router: Router) -> Result<(), Error> {
        self.serve_with_shutdown(router, shutdown_signal()).await
    }

    /// Like [`serve`](Self::serve), but shuts down when `signal` resolves.
    pub async fn serve_with_shutdown(
        self,
        router: Router,
        signal: impl Future<Output = ()> + Send,
    ) -> Result<(), Error> {
        let listener = match self.bind {
            Bind::Addr(addr) => TcpListener::bind(addr).await?,
            Bind::Listener(listener) => listener,
        };
        let router = Arc::new(router);
        let header = self.response_time_header;

        info!(addr = %listener.local_addr()?, "listening");

        // Flips to `true` once; every connection task watches it.
        let (stop_tx, stop_rx) = watch::channel(false);
        let mut tasks = tokio::task::JoinSet::new();

        tokio::pin!(signal);

        loop {
            tokio::select! {
                biased;

                () = &mut signal => {
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
                    let header = header.clone();
                    let mut stop = stop_rx.clone();
                    let io = TokioIo::new(stream);

                    tasks.spawn(async move {
                        let svc = service_fn(move |req| {
                            dispatch(Arc::clone(&router), header.clone(), req, remote_addr)
                        });

                        let builder = ConnBuilder::new(TokioExecutor::new());
                        let conn = builder.serve_connection(io, svc);
                        tokio::pin!(conn);

                        let res = tokio::select! {
                            res = conn.as_mut() => res,
                            _ = stop.changed() => {
                                conn.as_mut().graceful_shutdown();
                                conn.await
                            }
                        };
                        if let Err(e) = res {
                            error!(peer = %remote_addr, "connection error: {e}");
                        }
                    });
                }

                Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
            }
        }

        drop(listener);
        let _ = stop_tx.send(true);
        while tasks.join_next().await.is_some() {}

        info!("stopped");
        Ok(())
    }
}

// ── Request dispatch ──────────────────────────────────────────────────────────

/// Runs one request through the router and hands hyper the response head.
///
/// Never fails: unreadable bodies answer `400`, a handler task that dies
/// without responding answers `500`.
async fn dispatch(
    router: Arc<Router>,
    header: HeaderName,
    req: hyper::Request<Incoming>,
    remote_addr: SocketAddr,
) -> Result<http::Response<ResponseBody>, Infallible> {
    let (parts, body) = req.into_parts();
    let body = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            warn!(peer = %remote_addr, "failed to read request body: {e}");
            return Ok(status_only(StatusCode::BAD_REQUEST));
        }
    };

    let req = Request::from_parts(parts, body, Some(remote_addr));
    let proto_major = req.proto_major();
    let (head_tx, head_rx) = oneshot::channel();

    // The handler may keep streaming after hyper has the head, so it cannot
    // run inside this future.
    tokio::spawn(async move {
        let mut w = writer::wrap(HyperWriter::new(head_tx), proto_major, Some(header));
        router.serve(req, &mut w).await;

        if w.code().is_none() {
            // implicit 200, through the decorator so it gets the latency header
            let _ = w.write_header(StatusCode::OK);
        }
        w.into_inner().finish();
    });

    Ok(head_rx.await.unwrap_or_else(|_| {
        error!(peer = %remote_addr, "handler ended without a response");
        status_only(StatusCode::INTERNAL_SERVER_ERROR)
    }))
}

fn status_only(status: StatusCode) -> http::Response<ResponseBody> {
    let mut response = http::Response::new(ResponseBody::empty());
    *response.status_mut() = status;
    response
}

// ── Shutdown signal ───────────────────────────────────────────────────────────

/// Resolves on SIGTERM or SIGINT (Ctrl-C); on non-Unix platforms on Ctrl-C
/// only. A handler that cannot be installed never fires.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("cannot listen for Ctrl-C: {e}");
            future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let sigterm = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("cannot listen for SIGTERM: {e}");
                future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let sigterm = future::pending::<()>();

    tokio::select! {
        () = ctrl_c  => {}
        () = sigterm => {}
    }
}
