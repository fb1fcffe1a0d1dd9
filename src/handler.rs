//! Handler trait and type erasure.
//!
//! # How handlers are stored
//!
//! The router holds handlers of *different* types in one map, so every
//! handler is stored as a trait object (`Arc<dyn Handler>`). [`Handler`] is
//! object-safe on purpose: its only method returns a boxed future instead of
//! being an `async fn`.
//!
//! The future borrows the response writer for as long as it runs:
//!
//! ```text
//! call<'a>(&'a self, req: Request, w: &'a mut dyn ResponseWriter) -> BoxFuture<'a, ()>
//! ```
//!
//! That lifetime is what lets middleware decorate a writer on its own stack
//! and hand the decorated one down the chain.
//!
//! # Writing a handler
//!
//! Closures go through [`handler_fn`], which pins down the higher-ranked
//! signature so the compiler can infer the closure's lifetimes:
//!
//! ```rust
//! use loupe::{Router, handler_fn};
//!
//! let app = Router::new().get("/", handler_fn(|_req, w| Box::pin(async move {
//!     let _ = w.write_all(b"hello");
//! })));
//! ```
//!
//! Types with state implement [`Handler`] directly.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use http::StatusCode;

use crate::request::Request;
use crate::response::ResponseWriter;

/// A heap-allocated, type-erased future borrowing from the call site for `'a`.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A handler shared across concurrent requests.
pub type BoxedHandler = Arc<dyn Handler>;

/// Serves one request by writing to `w`.
pub trait Handler: Send + Sync + 'static {
    fn call<'a>(&'a self, req: Request, w: &'a mut dyn ResponseWriter) -> BoxFuture<'a, ()>;
}

impl Handler for BoxedHandler {
    fn call<'a>(&'a self, req: Request, w: &'a mut dyn ResponseWriter) -> BoxFuture<'a, ()> {
        (**self).call(req, w)
    }
}

/// Turns a closure into a [`Handler`].
pub fn handler_fn<F>(f: F) -> HandlerFn<F>
where
    F: for<'a> Fn(Request, &'a mut dyn ResponseWriter) -> BoxFuture<'a, ()> + Send + Sync + 'static,
{
    HandlerFn(f)
}

/// Handler returned by [`handler_fn`].
#[derive(Clone)]
pub struct HandlerFn<F>(F);

impl<F> Handler for HandlerFn<F>
where
    F: for<'a> Fn(Request, &'a mut dyn ResponseWriter) -> BoxFuture<'a, ()> + Send + Sync + 'static,
{
    fn call<'a>(&'a self, req: Request, w: &'a mut dyn ResponseWriter) -> BoxFuture<'a, ()> {
        (self.0)(req, w)
    }
}

/// Answers `404 Not Found` with a short plain-text body.
pub(crate) struct NotFound;

impl Handler for NotFound {
    fn call<'a>(&'a self, _req: Request, w: &'a mut dyn ResponseWriter) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            w.headers().insert(
                http::header::CONTENT_TYPE,
                http::HeaderValue::from_static("text/plain; charset=utf-8"),
            );
            // the client may already be gone; nothing left to do about it
            if w.write_header(StatusCode::NOT_FOUND).is_ok() {
                let _ = w.write_all(b"404 page not found");
            }
        })
    }
}
