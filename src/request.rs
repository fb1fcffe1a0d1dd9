//! Incoming HTTP request type.

use std::collections::HashMap;
use std::future::{self, Future};
use std::net::SocketAddr;

use bytes::Bytes;
use http::request::Parts;
use http::{Extensions, HeaderMap, Method, Uri, Version};

use crate::logger::RequestLogger;
use crate::middleware::request_id::RequestId;
use crate::middleware::timeout::Deadline;

/// An incoming HTTP request with its body already read.
pub struct Request {
    pub(crate) parts: Parts,
    pub(crate) body: Bytes,
    pub(crate) params: HashMap<String, String>,
    pub(crate) remote_addr: Option<SocketAddr>,
}

impl Request {
    pub(crate) fn from_parts(parts: Parts, body: Bytes, remote_addr: Option<SocketAddr>) -> Self {
        Self { parts, body, params: HashMap::new(), remote_addr }
    }

    /// Sets the peer address, e.g. for requests built in tests.
    pub fn with_remote_addr(mut self, addr: SocketAddr) -> Self {
        self.remote_addr = Some(addr);
        self
    }

    pub fn method(&self) -> &Method { &self.parts.method }
    pub fn uri(&self) -> &Uri { &self.parts.uri }
    pub fn path(&self) -> &str { self.parts.uri.path() }
    pub fn version(&self) -> Version { self.parts.version }
    pub fn headers(&self) -> &HeaderMap { &self.parts.headers }
    pub fn body(&self) -> &Bytes { &self.body }
    pub fn remote_addr(&self) -> Option<SocketAddr> { self.remote_addr }
    pub fn extensions(&self) -> &Extensions { &self.parts.extensions }
    pub fn extensions_mut(&mut self) -> &mut Extensions { &mut self.parts.extensions }

    /// Major HTTP version: 2 for HTTP/2, 3 for HTTP/3, 1 for everything else.
    pub fn proto_major(&self) -> u8 {
        match self.parts.version {
            Version::HTTP_2 => 2,
            Version::HTTP_3 => 3,
            _ => 1,
        }
    }

    /// Case-insensitive header lookup. Values that are not visible ASCII are
    /// skipped.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.parts.headers.get(name)?.to_str().ok()
    }

    /// Returns a named path parameter.
    ///
    /// For a route `/users/{id}`, `req.param("id")` on `/users/42` returns `Some("42")`.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    /// The logger attached by [`AttachLogger`](crate::middleware::AttachLogger),
    /// or a disabled one.
    pub fn logger(&self) -> RequestLogger {
        self.extensions()
            .get::<RequestLogger>()
            .cloned()
            .unwrap_or_else(RequestLogger::disabled)
    }

    /// The id assigned by [`RequestIdLayer`](crate::middleware::RequestIdLayer).
    pub fn request_id(&self) -> Option<&str> {
        self.extensions().get::<RequestId>().map(RequestId::as_str)
    }

    /// The deadline set by [`Timeout`](crate::middleware::Timeout).
    pub fn deadline(&self) -> Option<Deadline> {
        self.extensions().get::<Deadline>().copied()
    }

    /// Resolves when the request deadline passes. Never resolves when there
    /// is no deadline.
    ///
    /// ```rust,no_run
    /// # use loupe::{Request, ResponseWriter};
    /// # async fn slow_work() {}
    /// async fn handler(req: Request, w: &mut dyn ResponseWriter) {
    ///     tokio::select! {
    ///         () = req.cancelled() => return,
    ///         () = slow_work() => {}
    ///     }
    ///     let _ = w.write_all(b"done");
    /// }
    /// ```
    pub fn cancelled(&self) -> impl Future<Output = ()> + Send + use<> {
        let deadline = self.deadline();
        async move {
            match deadline {
                Some(d) => d.elapsed().await,
                None => future::pending().await,
            }
        }
    }
}

impl From<http::Request<Bytes>> for Request {
    fn from(req: http::Request<Bytes>) -> Self {
        let (parts, body) = req.into_parts();
        Self::from_parts(parts, body, None)
    }
}
