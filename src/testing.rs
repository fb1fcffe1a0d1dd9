//! In-memory response writer for tests.
//!
//! [`Recorder`] stands in for a real connection: it keeps the headers as
//! they were at the moment the status line was sent, the body, and counters
//! for every call it received. Optional capabilities are off unless switched
//! on, so the same type can play any writer a handler might meet.
//!
//! ```rust
//! use http::StatusCode;
//! use loupe::ResponseWriter;
//! use loupe::testing::Recorder;
//!
//! let mut rec = Recorder::new().with_flush();
//! rec.write_all(b"hi").unwrap();
//! rec.as_flusher().unwrap().flush().unwrap();
//!
//! assert_eq!(rec.status(), Some(StatusCode::OK));
//! assert_eq!(rec.body(), b"hi");
//! assert_eq!(rec.flushes(), 1);
//! ```

use std::io;

use bytes::BytesMut;
use http::header::AsHeaderName;
use http::{HeaderMap, StatusCode};

use crate::response::{
    Flusher, Hijacked, Hijacker, PushOptions, Pusher, ReaderFrom, ResponseWriter,
};

pub use crate::writer::SharedBuffer;

#[derive(Clone, Copy, Debug, Default)]
struct Supports {
    flush: bool,
    hijack: bool,
    read_from: bool,
    push: bool,
}

/// Records everything written to it.
#[derive(Debug, Default)]
pub struct Recorder {
    headers: HeaderMap,
    sent_headers: Option<HeaderMap>,
    status: Option<StatusCode>,
    body: Vec<u8>,
    header_writes: usize,
    writes: usize,
    flushes: usize,
    hijacks: usize,
    pushed: Vec<String>,
    supports: Supports,
    max_write: Option<usize>,
    fail_writes: bool,
    fail_header: bool,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_flush(mut self) -> Self {
        self.supports.flush = true;
        self
    }

    pub fn with_hijack(mut self) -> Self {
        self.supports.hijack = true;
        self
    }

    pub fn with_read_from(mut self) -> Self {
        self.supports.read_from = true;
        self
    }

    pub fn with_push(mut self) -> Self {
        self.supports.push = true;
        self
    }

    /// Accept at most `n` bytes per [`write`](ResponseWriter::write) call.
    pub fn with_max_write(mut self, n: usize) -> Self {
        self.max_write = Some(n.max(1));
        self
    }

    /// Every body write fails with `BrokenPipe`, as after a client
    /// disconnect.
    pub fn fail_writes(mut self) -> Self {
        self.fail_writes = true;
        self
    }

    /// The status line cannot be sent.
    pub fn fail_header(mut self) -> Self {
        self.fail_header = true;
        self
    }

    pub fn status(&self) -> Option<StatusCode> {
        self.status
    }

    /// Headers as sent with the status line, or the live map if nothing was
    /// sent yet.
    pub fn headers_snapshot(&self) -> &HeaderMap {
        self.sent_headers.as_ref().unwrap_or(&self.headers)
    }

    /// First value of `key` in [`headers_snapshot`](Self::headers_snapshot),
    /// if it is visible ASCII.
    pub fn header<K: AsHeaderName>(&self, key: K) -> Option<&str> {
        self.headers_snapshot().get(key)?.to_str().ok()
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn body_str(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Number of explicit `write_header` calls received.
    pub fn header_writes(&self) -> usize {
        self.header_writes
    }

    pub fn writes(&self) -> usize {
        self.writes
    }

    pub fn flushes(&self) -> usize {
        self.flushes
    }

    pub fn hijacks(&self) -> usize {
        self.hijacks
    }

    pub fn pushed(&self) -> Vec<String> {
        self.pushed.clone()
    }

    fn send_head(&mut self, status: StatusCode) {
        if self.status.is_none() {
            self.status = Some(status);
            self.sent_headers = Some(self.headers.clone());
        }
    }
}

impl ResponseWriter for Recorder {
    fn headers(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    fn write_header(&mut self, status: StatusCode) -> io::Result<()> {
        self.header_writes += 1;
        if self.fail_header {
            return Err(io::Error::new(io::ErrorKind::ConnectionReset, "status line rejected"));
        }
        self.send_head(status);
        Ok(())
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.send_head(StatusCode::OK);
        self.writes += 1;
        if self.fail_writes {
            return Err(io::ErrorKind::BrokenPipe.into());
        }

        let n = self.max_write.map_or(buf.len(), |max| buf.len().min(max));
        self.body.extend_from_slice(&buf[..n]);
        Ok(n)
    }

    fn as_flusher(&mut self) -> Option<&mut dyn Flusher> {
        if self.supports.flush { Some(self) } else { None }
    }

    fn as_hijacker(&mut self) -> Option<&mut dyn Hijacker> {
        if self.supports.hijack { Some(self) } else { None }
    }

    fn as_reader_from(&mut self) -> Option<&mut dyn ReaderFrom> {
        if self.supports.read_from { Some(self) } else { None }
    }

    fn as_pusher(&mut self) -> Option<&mut dyn Pusher> {
        if self.supports.push { Some(self) } else { None }
    }
}

impl Flusher for Recorder {
    fn flush(&mut self) -> io::Result<()> {
        self.send_head(StatusCode::OK);
        self.flushes += 1;
        Ok(())
    }
}

impl Hijacker for Recorder {
    fn hijack(&mut self) -> io::Result<Hijacked> {
        self.hijacks += 1;
        let (conn, _peer) = tokio::io::duplex(64);
        Ok(Hijacked { conn: Box::new(conn), buffered: BytesMut::new() })
    }
}

impl ReaderFrom for Recorder {
    fn read_from(&mut self, reader: &mut dyn io::Read) -> io::Result<u64> {
        self.send_head(StatusCode::OK);
        let before = self.body.len();
        reader.read_to_end(&mut self.body)?;
        Ok((self.body.len() - before) as u64)
    }
}

impl Pusher for Recorder {
    fn push(&mut self, target: &str, _opts: Option<&PushOptions>) -> io::Result<()> {
        self.pushed.push(target.to_owned());
        Ok(())
    }
}
