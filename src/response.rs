//! The outgoing response, seen as a writer.
//!
//! Handlers do not return a response value. They receive a
//! [`ResponseWriter`] and push headers, a status line and body bytes into it,
//! in that order. Whatever sits underneath (the hyper connection, a test
//! [`Recorder`](crate::testing::Recorder), a decorator from
//! [`writer`](crate::writer)) decides what "sending" means.
//!
//! # Optional capabilities
//!
//! Some writers can do more than write: flush partial output, hand over the
//! raw transport, copy straight from a reader, or push a resource over
//! HTTP/2. Each of those is its own trait, and a writer advertises it through
//! the matching `as_*` accessor:
//!
//! ```rust,no_run
//! # use loupe::ResponseWriter;
//! fn stream_chunk(w: &mut dyn ResponseWriter, chunk: &[u8]) -> std::io::Result<()> {
//!     w.write_all(chunk)?;
//!     if let Some(flusher) = w.as_flusher() {
//!         flusher.flush()?;
//!     }
//!     Ok(())
//! }
//! ```
//!
//! A writer that does not support a capability returns `None`, which is an
//! ordinary answer and not an error.

use std::io;

use bytes::BytesMut;
use http::header::{CONTENT_TYPE, X_CONTENT_TYPE_OPTIONS};
use http::{HeaderMap, HeaderValue, Method, StatusCode};
use tokio::io::{AsyncRead, AsyncWrite};

use crate::writer::Instrumented;

// ── ResponseWriter ────────────────────────────────────────────────────────────

/// Sink for one HTTP response.
///
/// The call order mirrors the wire: mutate [`headers`](Self::headers), send
/// the status line with [`write_header`](Self::write_header), then stream the
/// body with [`write`](Self::write). Writing body bytes before a status line
/// implies `200 OK`.
pub trait ResponseWriter: Send {
    /// The live header map. Changes made after the status line has been sent
    /// have no effect on the response.
    fn headers(&mut self) -> &mut HeaderMap;

    /// Sends the status line and the current headers.
    fn write_header(&mut self, status: StatusCode) -> io::Result<()>;

    /// Writes part of the body and returns how many bytes were accepted.
    fn write(&mut self, buf: &[u8]) -> io::Result<usize>;

    /// Writes the whole buffer, retrying partial writes.
    fn write_all(&mut self, mut buf: &[u8]) -> io::Result<()> {
        while !buf.is_empty() {
            match self.write(buf)? {
                0 => return Err(io::ErrorKind::WriteZero.into()),
                n => buf = &buf[n..],
            }
        }
        Ok(())
    }

    fn as_flusher(&mut self) -> Option<&mut dyn Flusher> {
        None
    }

    fn as_hijacker(&mut self) -> Option<&mut dyn Hijacker> {
        None
    }

    fn as_reader_from(&mut self) -> Option<&mut dyn ReaderFrom> {
        None
    }

    fn as_pusher(&mut self) -> Option<&mut dyn Pusher> {
        None
    }

    /// Status, latency and body tee of an instrumented writer. See
    /// [`writer::wrap`](crate::writer::wrap).
    fn as_instrumented(&mut self) -> Option<&mut dyn Instrumented> {
        None
    }
}

impl<W: ResponseWriter + ?Sized> ResponseWriter for &mut W {
    fn headers(&mut self) -> &mut HeaderMap {
        (**self).headers()
    }

    fn write_header(&mut self, status: StatusCode) -> io::Result<()> {
        (**self).write_header(status)
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        (**self).write(buf)
    }

    fn as_flusher(&mut self) -> Option<&mut dyn Flusher> {
        (**self).as_flusher()
    }

    fn as_hijacker(&mut self) -> Option<&mut dyn Hijacker> {
        (**self).as_hijacker()
    }

    fn as_reader_from(&mut self) -> Option<&mut dyn ReaderFrom> {
        (**self).as_reader_from()
    }

    fn as_pusher(&mut self) -> Option<&mut dyn Pusher> {
        (**self).as_pusher()
    }

    fn as_instrumented(&mut self) -> Option<&mut dyn Instrumented> {
        (**self).as_instrumented()
    }
}

// ── Capabilities ──────────────────────────────────────────────────────────────

/// Sends buffered body bytes to the client now.
pub trait Flusher {
    fn flush(&mut self) -> io::Result<()>;
}

/// Takes over the underlying connection.
///
/// After a successful hijack the writer must not be used again; the caller
/// owns the transport and is responsible for closing it.
pub trait Hijacker {
    fn hijack(&mut self) -> io::Result<Hijacked>;
}

/// Copies a reader straight into the response body.
pub trait ReaderFrom {
    fn read_from(&mut self, reader: &mut dyn io::Read) -> io::Result<u64>;
}

/// HTTP/2 server push.
pub trait Pusher {
    /// Starts pushing `target` (an absolute path or full URL) on a separate
    /// stream. The current response is not touched.
    fn push(&mut self, target: &str, opts: Option<&PushOptions>) -> io::Result<()>;
}

/// A raw, bidirectional transport handed out by [`Hijacker::hijack`].
pub trait Connection: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> Connection for T {}

/// Result of a hijack: the connection plus any request bytes the server had
/// already read from it but not consumed.
pub struct Hijacked {
    pub conn: Box<dyn Connection>,
    pub buffered: BytesMut,
}

/// Options for [`Pusher::push`].
#[derive(Clone, Debug, Default)]
pub struct PushOptions {
    /// Method of the promised request. `GET` when `None`.
    pub method: Option<Method>,
    /// Extra headers of the promised request.
    pub headers: HeaderMap,
}

// ── Helpers ───────────────────────────────────────────────────────────────────

const JSON_UTF8: HeaderValue = HeaderValue::from_static("application/json; charset=utf-8");
const NOSNIFF: HeaderValue = HeaderValue::from_static("nosniff");

/// Writes a complete JSON response: content type, `nosniff`, status, body.
///
/// `data` must already be serialised, e.g. with `serde_json::to_vec`.
pub fn write_json(w: &mut dyn ResponseWriter, status: StatusCode, data: &[u8]) -> io::Result<()> {
    let headers = w.headers();
    headers.insert(CONTENT_TYPE, JSON_UTF8);
    headers.insert(X_CONTENT_TYPE_OPTIONS, NOSNIFF);

    w.write_header(status)?;
    w.write_all(data)
}
