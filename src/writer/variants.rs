use std::io;

use http::{HeaderMap, StatusCode};

use super::{Instrumented, InstrumentedWriter, unsupported};
use crate::response::{Flusher, Hijacked, Hijacker, PushOptions, Pusher, ReaderFrom, ResponseWriter};

/// Everything except the optional capabilities goes through the core.
macro_rules! forward_core {
    () => {
        fn headers(&mut self) -> &mut HeaderMap {
            self.0.headers()
        }

        fn write_header(&mut self, status: StatusCode) -> io::Result<()> {
            self.0.write_header(status)
        }

        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.write(buf)
        }

        fn as_instrumented(&mut self) -> Option<&mut dyn Instrumented> {
            Some(&mut self.0)
        }
    };
}

macro_rules! core_access {
    ($ty:ident) => {
        impl<W: ResponseWriter> $ty<W> {
            pub(super) fn new(core: InstrumentedWriter<W>) -> Self {
                Self(core)
            }

            pub fn core(&self) -> &InstrumentedWriter<W> {
                &self.0
            }

            pub(super) fn core_mut(&mut self) -> &mut InstrumentedWriter<W> {
                &mut self.0
            }

            pub fn into_core(self) -> InstrumentedWriter<W> {
                self.0
            }
        }
    };
}

// Flush and read-from put body bytes on the wire, so both settle the status
// line first. Hijack and push leave it alone.

fn flush<W: ResponseWriter>(core: &mut InstrumentedWriter<W>) -> io::Result<()> {
    core.ensure_header()?;
    core.get_mut()
        .as_flusher()
        .ok_or_else(|| unsupported("flush"))?
        .flush()
}

// ── Flush only ────────────────────────────────────────────────────────────────

/// Forwards flushing and nothing else.
pub struct FlushWriter<W>(InstrumentedWriter<W>);

core_access!(FlushWriter);

impl<W: ResponseWriter> ResponseWriter for FlushWriter<W> {
    forward_core!();

    fn as_flusher(&mut self) -> Option<&mut dyn Flusher> {
        Some(self)
    }
}

impl<W: ResponseWriter> Flusher for FlushWriter<W> {
    fn flush(&mut self) -> io::Result<()> {
        flush(&mut self.0)
    }
}

// ── HTTP/1 ────────────────────────────────────────────────────────────────────

/// Forwards flush, hijack and read-from of an HTTP/1 writer.
pub struct Http1Writer<W>(InstrumentedWriter<W>);

core_access!(Http1Writer);

impl<W: ResponseWriter> ResponseWriter for Http1Writer<W> {
    forward_core!();

    fn as_flusher(&mut self) -> Option<&mut dyn Flusher> {
        Some(self)
    }

    fn as_hijacker(&mut self) -> Option<&mut dyn Hijacker> {
        Some(self)
    }

    fn as_reader_from(&mut self) -> Option<&mut dyn ReaderFrom> {
        Some(self)
    }
}

impl<W: ResponseWriter> Flusher for Http1Writer<W> {
    fn flush(&mut self) -> io::Result<()> {
        flush(&mut self.0)
    }
}

impl<W: ResponseWriter> Hijacker for Http1Writer<W> {
    fn hijack(&mut self) -> io::Result<Hijacked> {
        self.0
            .get_mut()
            .as_hijacker()
            .ok_or_else(|| unsupported("hijack"))?
            .hijack()
    }
}

impl<W: ResponseWriter> ReaderFrom for Http1Writer<W> {
    /// Goes straight to the wrapped writer, so the tee does not see these
    /// bytes.
    fn read_from(&mut self, reader: &mut dyn io::Read) -> io::Result<u64> {
        self.0.ensure_header()?;
        self.0
            .get_mut()
            .as_reader_from()
            .ok_or_else(|| unsupported("read_from"))?
            .read_from(reader)
    }
}

// ── HTTP/2 ────────────────────────────────────────────────────────────────────

/// Forwards flush and server push of an HTTP/2 writer.
pub struct Http2Writer<W>(InstrumentedWriter<W>);

core_access!(Http2Writer);

impl<W: ResponseWriter> ResponseWriter for Http2Writer<W> {
    forward_core!();

    fn as_flusher(&mut self) -> Option<&mut dyn Flusher> {
        Some(self)
    }

    fn as_pusher(&mut self) -> Option<&mut dyn Pusher> {
        Some(self)
    }
}

impl<W: ResponseWriter> Flusher for Http2Writer<W> {
    fn flush(&mut self) -> io::Result<()> {
        flush(&mut self.0)
    }
}

impl<W: ResponseWriter> Pusher for Http2Writer<W> {
    fn push(&mut self, target: &str, opts: Option<&PushOptions>) -> io::Result<()> {
        self.0
            .get_mut()
            .as_pusher()
            .ok_or_else(|| unsupported("push"))?
            .push(target, opts)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::testing::{Recorder, SharedBuffer};
    use crate::writer::{DEFAULT_RESPONSE_TIME_HEADER, wrap};

    #[test]
    fn flush_implies_ok_and_forwards() {
        let mut rec = Recorder::new().with_flush();
        let mut w = wrap(&mut rec, 1, None);

        w.as_flusher().unwrap().flush().unwrap();
        assert_eq!(w.code(), Some(StatusCode::OK));
        drop(w);

        assert_eq!(rec.status(), Some(StatusCode::OK));
        assert_eq!(rec.flushes(), 1);
        assert!(rec.header(DEFAULT_RESPONSE_TIME_HEADER).is_some());
    }

    #[test]
    fn flush_after_explicit_status_keeps_it() {
        let mut rec = Recorder::new().with_flush();
        let mut w = wrap(&mut rec, 1, None);

        w.write_header(StatusCode::CREATED).unwrap();
        w.as_flusher().unwrap().flush().unwrap();
        w.as_flusher().unwrap().flush().unwrap();
        drop(w);

        assert_eq!(rec.status(), Some(StatusCode::CREATED));
        assert_eq!(rec.header_writes(), 1);
        assert_eq!(rec.flushes(), 2);
    }

    #[test]
    fn read_from_implies_ok_and_bypasses_tee() {
        let mut rec = Recorder::new().with_flush().with_hijack().with_read_from();
        let tee = SharedBuffer::new();
        let mut w = wrap(&mut rec, 1, None);
        w.set_tee(Box::new(tee.clone()));

        let copied = w
            .as_reader_from()
            .unwrap()
            .read_from(&mut Cursor::new(b"bulk body".to_vec()))
            .unwrap();
        assert_eq!(copied, 9);
        assert_eq!(w.code(), Some(StatusCode::OK));
        drop(w);

        assert_eq!(rec.status(), Some(StatusCode::OK));
        assert_eq!(rec.body(), b"bulk body");
        assert!(tee.contents().is_empty());
    }

    #[tokio::test]
    async fn hijack_does_not_write_a_status() {
        let mut rec = Recorder::new().with_flush().with_hijack().with_read_from();
        let mut w = wrap(&mut rec, 1, None);

        let hijacked = w.as_hijacker().unwrap().hijack().unwrap();
        assert!(hijacked.buffered.is_empty());
        assert_eq!(w.code(), None);
        drop(w);

        assert_eq!(rec.status(), None);
        assert_eq!(rec.hijacks(), 1);
        assert!(rec.header(DEFAULT_RESPONSE_TIME_HEADER).is_none());
    }

    #[test]
    fn push_does_not_write_a_status() {
        let mut rec = Recorder::new().with_flush().with_push();
        let mut w = wrap(&mut rec, 2, None);

        w.as_pusher().unwrap().push("/app.css", None).unwrap();
        assert_eq!(w.code(), None);
        drop(w);

        assert_eq!(rec.status(), None);
        assert_eq!(rec.pushed(), vec!["/app.css".to_owned()]);
    }

    #[test]
    fn variant_writes_still_tee() {
        let mut rec = Recorder::new().with_flush().with_push();
        let tee = SharedBuffer::new();
        let mut w = wrap(&mut rec, 2, None);
        w.set_tee(Box::new(tee.clone()));

        w.write_all(b"ab").unwrap();
        w.as_flusher().unwrap().flush().unwrap();
        w.write_all(b"cd").unwrap();
        drop(w);

        assert_eq!(tee.contents(), b"abcd");
        assert_eq!(rec.body(), b"abcd");
    }

    #[test]
    fn variant_reports_instrumentation() {
        let mut rec = Recorder::new().with_flush();
        let mut w = wrap(&mut rec, 1, None);
        w.write_header(StatusCode::NOT_FOUND).unwrap();

        let instrumented = w.as_instrumented().unwrap();
        assert_eq!(instrumented.code(), Some(StatusCode::NOT_FOUND));
    }
}
