//! # loupe
//!
//! A small HTTP framework on hyper whose responses are observable.
//!
//! Handlers write into a [`ResponseWriter`] instead of returning a response
//! value. The server wraps every writer in an instrumented decorator
//! ([`writer::wrap`]) that
//!
//! - records the status code, implying `200 OK` on the first body write,
//! - measures the time until the status line went out and stamps it into an
//!   `x-response-time: <n>ms` header,
//! - can copy the body to a second sink, which is how [`RequestLog`]
//!   captures responses,
//! - forwards exactly the optional capabilities (flush, hijack, read-from,
//!   push) the underlying writer has.
//!
//! On top of that sit middleware for request ids, per-request deadlines,
//! contextual loggers and structured request logs.
//!
//! [`RequestLog`]: middleware::RequestLog
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::time::Duration;
//!
//! use http::StatusCode;
//! use loupe::logger::RequestLogger;
//! use loupe::middleware::{AttachLogger, RequestIdLayer, RequestLog, Timeout};
//! use loupe::{Router, Server, handler_fn, write_json};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), loupe::Error> {
//!     let app = Router::new()
//!         .get("/users/{id}", handler_fn(|req, w| Box::pin(async move {
//!             let body = format!(r#"{{"id":"{}"}}"#, req.param("id").unwrap_or_default());
//!             let _ = write_json(w, StatusCode::OK, body.as_bytes());
//!         })))
//!         .layer(RequestIdLayer)
//!         .layer(AttachLogger::new(RequestLogger::default()))
//!         .layer(Timeout::new(Duration::from_secs(30)))
//!         .layer(RequestLog::new());
//!
//!     Server::bind(([0, 0, 0, 0], 3000).into()).serve(app).await
//! }
//! ```

mod error;
mod request;
mod router;
mod server;
mod transport;

pub mod config;
pub mod handler;
pub mod logger;
pub mod logging;
pub mod middleware;
pub mod response;
pub mod testing;
pub mod writer;

pub use config::Config;
pub use error::Error;
pub use handler::{Handler, handler_fn};
pub use logger::RequestLogger;
pub use request::Request;
pub use response::{ResponseWriter, write_json};
pub use router::Router;
pub use server::Server;
