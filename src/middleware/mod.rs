//! Middleware layer.
//!
//! Middleware sees the request before the handler and the response writer
//! while the handler uses it. It is the right place for cross-cutting
//! concerns: request ids, deadlines, contextual loggers, access logs.
//!
//! A middleware gets the request, the writer, and a [`Next`] that runs the
//! rest of the chain. It may replace either the request or the writer before
//! calling on, for example to decorate the writer:
//!
//! ```rust
//! use loupe::handler::BoxFuture;
//! use loupe::middleware::{Middleware, Next};
//! use loupe::writer::{self, Instrumented};
//! use loupe::{Request, ResponseWriter};
//!
//! struct StatusLog;
//!
//! impl Middleware for StatusLog {
//!     fn handle<'a>(
//!         &'a self,
//!         req: Request,
//!         w: &'a mut dyn ResponseWriter,
//!         next: Next<'a>,
//!     ) -> BoxFuture<'a, ()> {
//!         Box::pin(async move {
//!             let path = req.path().to_owned();
//!             let mut w = writer::wrap(w, req.proto_major(), None);
//!             next.run(req, &mut w).await;
//!             tracing::info!(%path, status = ?w.code(), "done");
//!         })
//!     }
//! }
//! ```
//!
//! Register middleware for every route with
//! [`Router::layer`](crate::Router::layer), or for a single handler with
//! [`Stack`].

pub mod log;
pub mod logger;
pub mod request_id;
pub mod timeout;

use std::sync::Arc;

use crate::handler::{BoxFuture, BoxedHandler, Handler};
use crate::request::Request;
use crate::response::ResponseWriter;

pub use log::RequestLog;
pub use logger::AttachLogger;
pub use request_id::{RequestId, RequestIdLayer, X_REQUEST_ID};
pub use timeout::{Deadline, Timeout};

/// A step in the request chain.
pub trait Middleware: Send + Sync + 'static {
    fn handle<'a>(
        &'a self,
        req: Request,
        w: &'a mut dyn ResponseWriter,
        next: Next<'a>,
    ) -> BoxFuture<'a, ()>;
}

/// The rest of the chain after the current middleware.
#[derive(Clone, Copy)]
pub struct Next<'a> {
    chain: &'a [Arc<dyn Middleware>],
    endpoint: &'a dyn Handler,
}

impl<'a> Next<'a> {
    pub(crate) fn new(chain: &'a [Arc<dyn Middleware>], endpoint: &'a dyn Handler) -> Self {
        Self { chain, endpoint }
    }

    /// Runs the remaining middleware and then the handler.
    ///
    /// `w` may be a different writer from the one this middleware received,
    /// as long as it outlives the call.
    pub fn run<'w>(self, req: Request, w: &'w mut dyn ResponseWriter) -> BoxFuture<'w, ()>
    where
        'a: 'w,
    {
        match self.chain.split_first() {
            Some((first, rest)) => first.handle(req, w, Next::new(rest, self.endpoint)),
            None => self.endpoint.call(req, w),
        }
    }
}

/// A handler with its own middleware, outermost first.
///
/// ```rust
/// use std::time::Duration;
/// use loupe::middleware::{RequestLog, Stack, Timeout};
/// use loupe::{Router, handler_fn};
///
/// let upload = Stack::new(handler_fn(|_req, w| Box::pin(async move {
///     let _ = w.write_all(b"stored");
/// })))
/// .layer(Timeout::new(Duration::from_secs(5)))
/// .layer(RequestLog::new());
///
/// let app = Router::new().post("/upload", upload);
/// ```
pub struct Stack {
    middleware: Vec<Arc<dyn Middleware>>,
    endpoint: BoxedHandler,
}

impl Stack {
    pub fn new(endpoint: impl Handler) -> Self {
        Self { middleware: Vec::new(), endpoint: Arc::new(endpoint) }
    }

    /// Appends `m`; it runs after every middleware added before it.
    pub fn layer(mut self, m: impl Middleware) -> Self {
        self.middleware.push(Arc::new(m));
        self
    }
}

impl Handler for Stack {
    fn call<'a>(&'a self, req: Request, w: &'a mut dyn ResponseWriter) -> BoxFuture<'a, ()> {
        Next::new(&self.middleware, &*self.endpoint).run(req, w)
    }
}
