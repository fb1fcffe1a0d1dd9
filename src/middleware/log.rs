//! Structured request logging.
//!
//! [`RequestLog`] fills the request's [`RequestLogger`](crate::logger::RequestLogger)
//! with what is known about the request before the handler runs, and with the
//! response status, latency and body afterwards, then emits a single
//! `request completed` event.
//!
//! A log entry, rendered as JSON, looks like:
//!
//! ```text
//! {
//!   "id": "6a1f…",
//!   "method": "POST",
//!   "remote_address": "192.0.2.1:51234",
//!   "url": "/users?notify=1",
//!   "request_headers": { "content-type": "application/json", "accept": ["a", "b"] },
//!   "request": { "name": "Ada" },
//!   "response": { "id": 7 },
//!   "status": 201,
//!   "duration_ms": 3
//! }
//! ```
//!
//! Bodies that parse as JSON are logged as JSON, numbers exactly as sent.
//! Anything else, and JSON too long for the configured limit, is logged as a
//! string cut to fit. Only the first `limit` bytes of a response are kept
//! while it streams.

use std::io;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use http::{HeaderMap, StatusCode};
use serde_json::{Map, Value};

use crate::handler::BoxFuture;
use crate::logger::Fields;
use crate::middleware::{Middleware, Next};
use crate::request::Request;
use crate::response::ResponseWriter;
use crate::writer::{self, Instrumented};

/// Body limit used by [`RequestLog::new`].
pub const DEFAULT_MAX_BODY_SIZE: usize = 8 * 1024;

const ELLIPSIS: &str = "...";

/// Logs every request passing through, with its bodies.
///
/// Needs a logger on the request, usually from
/// [`AttachLogger`](crate::middleware::AttachLogger) registered before it;
/// without one the fields are collected and dropped.
#[derive(Clone, Copy, Debug)]
pub struct RequestLog {
    // `None` logs bodies in full.
    max_body_size: Option<usize>,
}

impl RequestLog {
    pub fn new() -> Self {
        Self { max_body_size: Some(DEFAULT_MAX_BODY_SIZE) }
    }

    /// Caps logged bodies at `n` bytes. Zero selects the default.
    pub fn max_body_size(mut self, n: usize) -> Self {
        self.max_body_size = Some(if n == 0 { DEFAULT_MAX_BODY_SIZE } else { n });
        self
    }

    /// Logs bodies in full.
    pub fn unlimited(mut self) -> Self {
        self.max_body_size = None;
        self
    }

    fn record_request(&self, req: &Request, fields: &mut Fields) {
        if let Some(id) = req.request_id() {
            fields.insert("id".into(), Value::from(id));
        }

        let remote = req.remote_addr().map(|a| a.to_string()).unwrap_or_default();
        fields.insert("method".into(), Value::from(req.method().as_str()));
        fields.insert("remote_address".into(), Value::from(remote));
        fields.insert("url".into(), Value::from(req.uri().to_string()));
        fields.insert("request_headers".into(), Value::Object(lowercase_headers(req.headers())));

        if !req.body().is_empty() {
            fields.insert("request".into(), log_body(req.body(), self.max_body_size));
        }
    }
}

impl Default for RequestLog {
    fn default() -> Self {
        Self::new()
    }
}

impl Middleware for RequestLog {
    fn handle<'a>(
        &'a self,
        req: Request,
        w: &'a mut dyn ResponseWriter,
        next: Next<'a>,
    ) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            let logger = req.logger();
            logger.update(|f| self.record_request(&req, f));

            let response = Capture::new(self.max_body_size);
            let proto_major = req.proto_major();

            // Reuse the writer's own instrumentation when the server already
            // decorated it, so the latency header is stamped once.
            let instrumented = match w.as_instrumented() {
                Some(inst) => {
                    inst.set_tee(Box::new(response.clone()));
                    true
                }
                None => false,
            };

            let sent = if instrumented {
                next.run(req, &mut *w).await;
                settle(&mut *w)
            } else {
                let mut wrapped = writer::wrap(&mut *w, proto_major, None);
                wrapped.set_tee(Box::new(response.clone()));
                next.run(req, &mut wrapped).await;
                settle(&mut wrapped)
            };

            logger.update(|f| {
                if let Some(body) = response.render() {
                    f.insert("response".into(), body);
                }
                if let Some((code, duration)) = sent {
                    let millis = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
                    f.insert("status".into(), Value::from(code.as_u16()));
                    f.insert("duration_ms".into(), Value::from(millis));
                }
            });

            match sent {
                Some((code, _)) if code.is_server_error() => logger.error("request completed"),
                _ => logger.info("request completed"),
            }
        })
    }
}

/// Status and latency of the finished response. A chain that wrote nothing
/// gets its implicit 200 here, so the log describes what the client receives.
fn settle(w: &mut dyn ResponseWriter) -> Option<(StatusCode, Duration)> {
    if w.as_instrumented()?.code().is_none() {
        let _ = w.write_header(StatusCode::OK);
    }
    let inst = w.as_instrumented()?;
    Some((inst.code()?, inst.duration()))
}

/// Tee sink that keeps at most `limit` bytes of the response and remembers
/// whether more were written.
#[derive(Clone, Debug)]
struct Capture(Arc<Mutex<Captured>>);

#[derive(Debug)]
struct Captured {
    bytes: Vec<u8>,
    limit: Option<usize>,
    overflowed: bool,
}

impl Capture {
    fn new(limit: Option<usize>) -> Self {
        Self(Arc::new(Mutex::new(Captured { bytes: Vec::new(), limit, overflowed: false })))
    }

    /// The captured body as a log value, `None` when nothing was written.
    fn render(&self) -> Option<Value> {
        let captured = self.lock();
        if captured.bytes.is_empty() {
            return None;
        }

        Some(match captured.limit {
            Some(max) if captured.overflowed => {
                Value::String(truncate(&String::from_utf8_lossy(&captured.bytes), max))
            }
            limit => log_body(&captured.bytes, limit),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Captured> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl io::Write for Capture {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut captured = self.lock();
        let room = match captured.limit {
            Some(max) => max.saturating_sub(captured.bytes.len()),
            None => buf.len(),
        };
        let keep = room.min(buf.len());

        captured.bytes.extend_from_slice(&buf[..keep]);
        captured.overflowed |= keep < buf.len();
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Header map keyed by lower-case name. A header sent once maps to its
/// value, a repeated one to the array of its values.
fn lowercase_headers(headers: &HeaderMap) -> Map<String, Value> {
    headers
        .keys()
        .map(|name| {
            let mut values: Vec<Value> = headers
                .get_all(name)
                .iter()
                .map(|v| Value::from(String::from_utf8_lossy(v.as_bytes()).into_owned()))
                .collect();

            let value = match values.len() {
                0 => Value::from(""),
                1 => values.remove(0),
                _ => Value::Array(values),
            };
            (name.as_str().to_ascii_lowercase(), value)
        })
        .collect()
}

/// Renders a body for the log, at most `limit` bytes long once serialised
/// as a string.
fn log_body(body: &[u8], limit: Option<usize>) -> Value {
    match serde_json::from_slice::<Value>(body) {
        Ok(json) => {
            let compact = json.to_string();
            match limit {
                Some(max) if compact.len() > max => Value::String(truncate(&compact, max)),
                _ => json,
            }
        }
        Err(_) => {
            let text = String::from_utf8_lossy(body);
            match limit {
                Some(max) if text.len() > max => Value::String(truncate(&text, max)),
                _ => Value::String(text.into_owned()),
            }
        }
    }
}

// Cuts on a char boundary at or below `max - 3` and appends the ellipsis.
// Limits too small for the ellipsis get a bare cut.
fn truncate(s: &str, max: usize) -> String {
    let ellipsis = if max < ELLIPSIS.len() { "" } else { ELLIPSIS };
    let mut end = (max - ellipsis.len()).min(s.len());
    while !s.is_char_boundary(end) {
        end -= 1;
    }

    let mut out = String::with_capacity(end + ellipsis.len());
    out.push_str(&s[..end]);
    out.push_str(ellipsis);
    out
}
