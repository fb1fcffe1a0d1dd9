//! Request id assignment.

use http::{HeaderName, HeaderValue};
use uuid::Uuid;

use crate::handler::BoxFuture;
use crate::middleware::{Middleware, Next};
use crate::request::Request;
use crate::response::ResponseWriter;

/// Header carrying the request id, inbound and outbound.
pub static X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

// Longer incoming ids are replaced rather than trusted.
const MAX_INCOMING_LEN: usize = 128;

/// A request id, stored in the request extensions.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RequestId(String);

impl RequestId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn from_header(value: &HeaderValue) -> Option<Self> {
        let s = value.to_str().ok()?.trim();
        if s.is_empty() || s.len() > MAX_INCOMING_LEN {
            return None;
        }
        Some(Self(s.to_owned()))
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

/// Assigns each request an id.
///
/// A usable `x-request-id` from the client is kept; otherwise a UUID v4 is
/// generated. The id is stored for [`Request::request_id`] and echoed in the
/// response headers.
#[derive(Clone, Copy, Debug, Default)]
pub struct RequestIdLayer;

impl Middleware for RequestIdLayer {
    fn handle<'a>(
        &'a self,
        mut req: Request,
        w: &'a mut dyn ResponseWriter,
        next: Next<'a>,
    ) -> BoxFuture<'a, ()> {
        let id = req
            .headers()
            .get(&X_REQUEST_ID)
            .and_then(RequestId::from_header)
            .unwrap_or_default();

        if let Ok(value) = HeaderValue::from_str(id.as_str()) {
            w.headers().insert(X_REQUEST_ID.clone(), value);
        }
        req.extensions_mut().insert(id);
        next.run(req, w)
    }
}
