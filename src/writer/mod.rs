//! Instrumented response writers.
//!
//! [`wrap`] decorates any [`ResponseWriter`] so that it records the status
//! code, measures the time until the status line went out, stamps that time
//! into a response header, and can copy every body byte to a second sink.
//!
//! # The latency header
//!
//! At the first header-write, whether explicit or implied by the first body
//! write, flush or bulk copy, the decorator appends
//!
//! ```text
//! x-response-time: 42ms
//! ```
//!
//! to the header map before forwarding the status line. The value is the
//! elapsed time since the writer was created, truncated to whole
//! milliseconds. The header name is configurable.
//!
//! # Capability forwarding
//!
//! Handlers probe writers for optional capabilities (`as_flusher`,
//! `as_hijacker`, ...). A decorator that claimed every capability would lie
//! to them; one that claimed none would break streaming. [`wrap`] therefore
//! probes the wrapped writer once, classifies it as one of the
//! [`Capabilities`], and builds the variant that exposes exactly that set:
//!
//! | protocol | wrapped writer supports | variant | exposes |
//! |---|---|---|---|
//! | HTTP/2 | flush + push | [`Http2Writer`] | flush, push |
//! | HTTP/1 | flush + hijack + read-from | [`Http1Writer`] | flush, hijack, read-from |
//! | any | flush | [`FlushWriter`] | flush |
//! | any | anything else | [`InstrumentedWriter`] | nothing |
//!
//! The classification is fixed for the life of the writer.
//!
//! Flush and read-from send body bytes, so on a fresh writer they first
//! imply `200 OK`, like [`ResponseWriter::write`]. Hijack and push do not:
//! the former takes the connection before any response exists, the latter
//! opens a different stream.

mod instrumented;
mod tee;
mod variants;

use std::io;
use std::time::Duration;

use http::{HeaderMap, HeaderName, StatusCode};

use crate::response::{Flusher, Hijacker, Pusher, ReaderFrom, ResponseWriter};

pub use instrumented::InstrumentedWriter;
pub use tee::SharedBuffer;
pub use variants::{FlushWriter, Http1Writer, Http2Writer};

/// Header used for the response latency when no other name is configured.
pub const DEFAULT_RESPONSE_TIME_HEADER: HeaderName = HeaderName::from_static("x-response-time");

/// Read-back side of an instrumented writer.
pub trait Instrumented {
    /// Status sent with the first header-write, `None` before that.
    fn code(&self) -> Option<StatusCode>;

    /// Time from construction to the first header-write, zero before that.
    fn duration(&self) -> Duration;

    /// Installs (or replaces) the sink that receives a copy of every body
    /// byte written from now on. Bytes already written are not replayed.
    fn set_tee(&mut self, tee: Box<dyn io::Write + Send>);
}

// ── Capability probe ──────────────────────────────────────────────────────────

/// Which optional capabilities a wrapped writer gets to forward.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Capabilities {
    None,
    Flush,
    /// Flush, hijack and read-from on an HTTP/1 connection.
    Http1,
    /// Flush and push on an HTTP/2 connection.
    Http2,
}

impl Capabilities {
    /// Classifies `w` for a connection speaking HTTP `proto_major`.
    ///
    /// Only the `as_*` accessors are consulted; nothing is written.
    pub fn probe<W: ResponseWriter + ?Sized>(w: &mut W, proto_major: u8) -> Self {
        let flush = w.as_flusher().is_some();

        match proto_major {
            2 if flush && w.as_pusher().is_some() => Self::Http2,
            1 if flush && w.as_hijacker().is_some() && w.as_reader_from().is_some() => Self::Http1,
            _ if flush => Self::Flush,
            _ => Self::None,
        }
    }
}

// ── Variant selection ─────────────────────────────────────────────────────────

/// Decorates `inner` for one request.
///
/// `proto_major` is the HTTP major version of the connection (1 or 2).
/// `header_name` defaults to [`DEFAULT_RESPONSE_TIME_HEADER`].
///
/// ```rust
/// use http::StatusCode;
/// use loupe::testing::Recorder;
/// use loupe::writer::{self, Instrumented};
/// use loupe::ResponseWriter;
///
/// let mut rec = Recorder::new();
/// let mut w = writer::wrap(&mut rec, 1, None);
/// w.write_all(b"hello").unwrap();
/// assert_eq!(w.code(), Some(StatusCode::OK));
/// drop(w);
///
/// assert!(rec.header("x-response-time").unwrap().ends_with("ms"));
/// ```
pub fn wrap<W: ResponseWriter>(
    mut inner: W,
    proto_major: u8,
    header_name: Option<HeaderName>,
) -> Wrapped<W> {
    let caps = Capabilities::probe(&mut inner, proto_major);
    let core = InstrumentedWriter::new(inner, header_name);

    match caps {
        Capabilities::None => Wrapped::Base(core),
        Capabilities::Flush => Wrapped::Flush(FlushWriter::new(core)),
        Capabilities::Http1 => Wrapped::Http1(Http1Writer::new(core)),
        Capabilities::Http2 => Wrapped::Http2(Http2Writer::new(core)),
    }
}

/// The variant chosen by [`wrap`].
pub enum Wrapped<W> {
    Base(InstrumentedWriter<W>),
    Flush(FlushWriter<W>),
    Http1(Http1Writer<W>),
    Http2(Http2Writer<W>),
}

impl<W: ResponseWriter> Wrapped<W> {
    pub fn capabilities(&self) -> Capabilities {
        match self {
            Self::Base(_) => Capabilities::None,
            Self::Flush(_) => Capabilities::Flush,
            Self::Http1(_) => Capabilities::Http1,
            Self::Http2(_) => Capabilities::Http2,
        }
    }

    pub fn core(&self) -> &InstrumentedWriter<W> {
        match self {
            Self::Base(w) => w,
            Self::Flush(w) => w.core(),
            Self::Http1(w) => w.core(),
            Self::Http2(w) => w.core(),
        }
    }

    fn core_mut(&mut self) -> &mut InstrumentedWriter<W> {
        match self {
            Self::Base(w) => w,
            Self::Flush(w) => w.core_mut(),
            Self::Http1(w) => w.core_mut(),
            Self::Http2(w) => w.core_mut(),
        }
    }

    pub fn into_inner(self) -> W {
        match self {
            Self::Base(w) => w.into_inner(),
            Self::Flush(w) => w.into_core().into_inner(),
            Self::Http1(w) => w.into_core().into_inner(),
            Self::Http2(w) => w.into_core().into_inner(),
        }
    }
}

impl<W: ResponseWriter> ResponseWriter for Wrapped<W> {
    fn headers(&mut self) -> &mut HeaderMap {
        self.core_mut().headers()
    }

    fn write_header(&mut self, status: StatusCode) -> io::Result<()> {
        self.core_mut().write_header(status)
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.core_mut().write(buf)
    }

    fn as_flusher(&mut self) -> Option<&mut dyn Flusher> {
        match self {
            Self::Base(_) => None,
            Self::Flush(w) => w.as_flusher(),
            Self::Http1(w) => w.as_flusher(),
            Self::Http2(w) => w.as_flusher(),
        }
    }

    fn as_hijacker(&mut self) -> Option<&mut dyn Hijacker> {
        match self {
            Self::Http1(w) => w.as_hijacker(),
            _ => None,
        }
    }

    fn as_reader_from(&mut self) -> Option<&mut dyn ReaderFrom> {
        match self {
            Self::Http1(w) => w.as_reader_from(),
            _ => None,
        }
    }

    fn as_pusher(&mut self) -> Option<&mut dyn Pusher> {
        match self {
            Self::Http2(w) => w.as_pusher(),
            _ => None,
        }
    }

    fn as_instrumented(&mut self) -> Option<&mut dyn Instrumented> {
        Some(self.core_mut())
    }
}

impl<W: ResponseWriter> Instrumented for Wrapped<W> {
    fn code(&self) -> Option<StatusCode> {
        self.core().code()
    }

    fn duration(&self) -> Duration {
        self.core().duration()
    }

    fn set_tee(&mut self, tee: Box<dyn io::Write + Send>) {
        self.core_mut().set_tee(tee);
    }
}

fn unsupported(capability: &str) -> io::Error {
    io::Error::new(
        io::ErrorKind::Unsupported,
        format!("wrapped writer no longer supports {capability}"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Recorder;

    #[test]
    fn probe_follows_protocol_and_capabilities() {
        let cases = [
            (Recorder::new(), 1, Capabilities::None),
            (Recorder::new(), 2, Capabilities::None),
            (Recorder::new().with_flush(), 1, Capabilities::Flush),
            (Recorder::new().with_flush(), 2, Capabilities::Flush),
            (Recorder::new().with_flush().with_hijack().with_read_from(), 1, Capabilities::Http1),
            (Recorder::new().with_flush().with_push(), 2, Capabilities::Http2),
            // right capabilities, wrong protocol
            (Recorder::new().with_flush().with_hijack().with_read_from(), 2, Capabilities::Flush),
            (Recorder::new().with_flush().with_push(), 1, Capabilities::Flush),
            // incomplete sets fall back to flush only
            (Recorder::new().with_flush().with_hijack(), 1, Capabilities::Flush),
            (Recorder::new().with_hijack().with_read_from(), 1, Capabilities::None),
            (Recorder::new().with_push(), 2, Capabilities::None),
        ];

        for (i, (mut rec, proto, expected)) in cases.into_iter().enumerate() {
            assert_eq!(Capabilities::probe(&mut rec, proto), expected, "case {i}");
        }
    }

    #[test]
    fn probe_has_no_side_effects() {
        let mut rec = Recorder::new().with_flush().with_push();
        Capabilities::probe(&mut rec, 2);
        assert_eq!(rec.status(), None);
        assert!(rec.headers_snapshot().is_empty());
        assert_eq!(rec.flushes(), 0);
    }

    #[test]
    fn flush_only_variant_hides_other_capabilities() {
        let mut rec = Recorder::new().with_flush().with_push();
        let mut w = wrap(&mut rec, 1, None);

        assert_eq!(w.capabilities(), Capabilities::Flush);
        assert!(w.as_flusher().is_some());
        assert!(w.as_hijacker().is_none());
        assert!(w.as_reader_from().is_none());
        assert!(w.as_pusher().is_none());
        assert!(w.as_instrumented().is_some());
    }

    #[test]
    fn http1_variant_exposes_hijack_and_read_from() {
        let mut rec = Recorder::new().with_flush().with_hijack().with_read_from();
        let mut w = wrap(&mut rec, 1, None);

        assert_eq!(w.capabilities(), Capabilities::Http1);
        assert!(w.as_flusher().is_some());
        assert!(w.as_hijacker().is_some());
        assert!(w.as_reader_from().is_some());
        assert!(w.as_pusher().is_none());
    }

    #[test]
    fn http2_variant_exposes_push_and_flush_only() {
        let mut rec = Recorder::new().with_flush().with_push().with_hijack().with_read_from();
        let mut w = wrap(&mut rec, 2, None);

        assert_eq!(w.capabilities(), Capabilities::Http2);
        assert!(w.as_flusher().is_some());
        assert!(w.as_pusher().is_some());
        assert!(w.as_hijacker().is_none());
        assert!(w.as_reader_from().is_none());
    }

    #[test]
    fn custom_header_name_is_used() {
        let mut rec = Recorder::new();
        let name = HeaderName::from_static("x-elapsed");
        let mut w = wrap(&mut rec, 1, Some(name));
        w.write_header(StatusCode::NO_CONTENT).unwrap();
        drop(w);

        assert!(rec.header("x-elapsed").is_some());
        assert!(rec.header(DEFAULT_RESPONSE_TIME_HEADER).is_none());
    }

    #[test]
    fn into_inner_returns_wrapped_writer() {
        let w = wrap(Recorder::new().with_flush(), 1, None);
        let mut rec = w.into_inner();
        assert!(rec.as_flusher().is_some());
    }
}
