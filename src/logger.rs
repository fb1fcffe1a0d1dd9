//! Contextual request logger.
//!
//! A [`RequestLogger`] is a `tracing` span plus a set of JSON fields that
//! grows while the request is handled. Middleware adds what it knows (method,
//! url, request id, bodies, status) with [`RequestLogger::update`]; every
//! event emitted through the logger carries the fields collected so far.
//!
//! Clones share the field set. [`RequestLogger::child`] starts a new,
//! independent set from a copy, which is what
//! [`AttachLogger`](crate::middleware::AttachLogger) does once per request.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::{Map, Value};
use tracing::{Level, Span};

pub type Fields = Map<String, Value>;

#[derive(Clone)]
pub struct RequestLogger {
    span: Span,
    fields: Arc<Mutex<Fields>>,
    disabled: bool,
}

impl RequestLogger {
    /// A logger emitting inside `span`.
    pub fn new(span: Span) -> Self {
        Self { span, fields: Arc::default(), disabled: false }
    }

    /// A logger that records fields but never emits.
    pub fn disabled() -> Self {
        Self { span: Span::none(), fields: Arc::default(), disabled: true }
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    pub fn span(&self) -> &Span {
        &self.span
    }

    /// A logger with a copy of the current fields, emitting inside a child
    /// span named `request`. Updates on either side stay on that side.
    pub fn child(&self) -> Self {
        if self.disabled {
            return Self { fields: Arc::new(Mutex::new(self.fields())), ..self.clone() };
        }

        Self {
            span: tracing::info_span!(parent: &self.span, "request"),
            fields: Arc::new(Mutex::new(self.fields())),
            disabled: false,
        }
    }

    /// Edits the context fields in place.
    pub fn update(&self, f: impl FnOnce(&mut Fields)) {
        f(&mut self.lock());
    }

    pub fn field(&self, key: &str) -> Option<Value> {
        self.lock().get(key).cloned()
    }

    /// Snapshot of the context fields.
    pub fn fields(&self) -> Fields {
        self.lock().clone()
    }

    pub fn debug(&self, message: &str) {
        self.emit(Level::DEBUG, message);
    }

    pub fn info(&self, message: &str) {
        self.emit(Level::INFO, message);
    }

    pub fn warn(&self, message: &str) {
        self.emit(Level::WARN, message);
    }

    pub fn error(&self, message: &str) {
        self.emit(Level::ERROR, message);
    }

    // The well-known request fields become event fields of their own; the
    // rest travels as one JSON `context` field.
    fn emit(&self, level: Level, message: &str) {
        if self.disabled {
            return;
        }

        let mut fields = self.fields();
        let id = take_str(&mut fields, "id");
        let method = take_str(&mut fields, "method");
        let url = take_str(&mut fields, "url");
        let status = take_u64(&mut fields, "status");
        let duration_ms = take_u64(&mut fields, "duration_ms");
        let context = (!fields.is_empty()).then(|| Value::Object(fields).to_string());

        macro_rules! event {
            ($level:expr) => {
                tracing::event!(
                    $level,
                    id = id.as_deref(),
                    method = method.as_deref(),
                    url = url.as_deref(),
                    status,
                    duration_ms,
                    context = context.as_deref(),
                    "{}",
                    message
                )
            };
        }

        let _enter = self.span.enter();
        match level {
            Level::ERROR => event!(Level::ERROR),
            Level::WARN => event!(Level::WARN),
            Level::INFO => event!(Level::INFO),
            Level::DEBUG => event!(Level::DEBUG),
            _ => event!(Level::TRACE),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Fields> {
        self.fields.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn take_str(fields: &mut Fields, key: &str) -> Option<String> {
    if !fields.get(key)?.is_string() {
        return None;
    }
    match fields.shift_remove(key) {
        Some(Value::String(s)) => Some(s),
        _ => None,
    }
}

fn take_u64(fields: &mut Fields, key: &str) -> Option<u64> {
    let n = fields.get(key)?.as_u64()?;
    fields.shift_remove(key);
    Some(n)
}

impl Default for RequestLogger {
    fn default() -> Self {
        Self::new(tracing::info_span!("http"))
    }
}

impl fmt::Debug for RequestLogger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestLogger")
            .field("span", &self.span)
            .field("fields", &self.fields())
            .field("disabled", &self.disabled)
            .finish()
    }
}
