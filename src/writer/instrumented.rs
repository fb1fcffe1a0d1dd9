use std::fmt;
use std::io;
use std::time::{Duration, Instant};

use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};

use super::{DEFAULT_RESPONSE_TIME_HEADER, Instrumented};
use crate::response::ResponseWriter;

/// The base decorator: status, latency header and body tee, no optional
/// capabilities.
///
/// Usually obtained through [`wrap`](super::wrap), which also picks a variant
/// that forwards the wrapped writer's capabilities.
pub struct InstrumentedWriter<W> {
    inner: W,
    start: Instant,
    // `Some` once the status line has been sent; never reset.
    status: Option<StatusCode>,
    duration: Duration,
    header_name: HeaderName,
    tee: Option<Box<dyn io::Write + Send>>,
}

impl<W: ResponseWriter> InstrumentedWriter<W> {
    pub fn new(inner: W, header_name: Option<HeaderName>) -> Self {
        Self {
            inner,
            start: Instant::now(),
            status: None,
            duration: Duration::ZERO,
            header_name: header_name.unwrap_or(DEFAULT_RESPONSE_TIME_HEADER),
            tee: None,
        }
    }

    pub fn header_written(&self) -> bool {
        self.status.is_some()
    }

    pub fn get_mut(&mut self) -> &mut W {
        &mut self.inner
    }

    pub fn into_inner(self) -> W {
        self.inner
    }

    /// Sends `200 OK` unless a status line already went out.
    pub(super) fn ensure_header(&mut self) -> io::Result<()> {
        if self.status.is_none() {
            self.write_header(StatusCode::OK)?;
        }
        Ok(())
    }
}

impl<W: ResponseWriter> ResponseWriter for InstrumentedWriter<W> {
    fn headers(&mut self) -> &mut HeaderMap {
        self.inner.headers()
    }

    /// First call wins. The header-sent transition happens before the call is
    /// forwarded and stays even if forwarding fails.
    fn write_header(&mut self, status: StatusCode) -> io::Result<()> {
        if self.status.is_some() {
            return Ok(());
        }

        self.duration = self.start.elapsed();
        self.status = Some(status);

        let value = HeaderValue::from(millis(self.duration));
        self.inner.headers().append(self.header_name.clone(), value);

        self.inner.write_header(status)
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.ensure_header()?;

        let n = self.inner.write(buf)?;
        if let Some(tee) = self.tee.as_mut() {
            // the bytes are already on their way; a tee failure still surfaces
            tee.write_all(&buf[..n])?;
        }
        Ok(n)
    }

    fn as_instrumented(&mut self) -> Option<&mut dyn Instrumented> {
        Some(self)
    }
}

impl<W: ResponseWriter> Instrumented for InstrumentedWriter<W> {
    fn code(&self) -> Option<StatusCode> {
        self.status
    }

    fn duration(&self) -> Duration {
        self.duration
    }

    fn set_tee(&mut self, tee: Box<dyn io::Write + Send>) {
        self.tee = Some(tee);
    }
}

impl<W: fmt::Debug> fmt::Debug for InstrumentedWriter<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstrumentedWriter")
            .field("inner", &self.inner)
            .field("status", &self.status)
            .field("duration", &self.duration)
            .field("header_name", &self.header_name)
            .field("tee", &self.tee.is_some())
            .finish()
    }
}

/// Formats a duration as whole milliseconds, truncated: `"42ms"`.
fn millis(d: Duration) -> HeaderValue {
    // digits plus "ms" is always a valid header value
    HeaderValue::try_from(format!("{}ms", d.as_millis()))
        .unwrap_or_else(|_| HeaderValue::from_static("0ms"))
}
