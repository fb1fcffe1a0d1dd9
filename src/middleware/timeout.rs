//! Per-request deadlines.

use std::time::Duration;

use tokio::time::Instant;

use crate::handler::BoxFuture;
use crate::middleware::{Middleware, Next};
use crate::request::Request;
use crate::response::ResponseWriter;

/// The moment a request should be abandoned.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub struct Deadline(Instant);

impl Deadline {
    pub fn after(timeout: Duration) -> Self {
        Self(Instant::now() + timeout)
    }

    pub fn is_expired(self) -> bool {
        Instant::now() >= self.0
    }

    /// Time left, zero once expired.
    pub fn remaining(self) -> Duration {
        self.0.saturating_duration_since(Instant::now())
    }

    /// Resolves when the deadline passes.
    pub async fn elapsed(self) {
        tokio::time::sleep_until(self.0).await;
    }
}

/// Sets a deadline on every request passing through.
///
/// The middleware only records the deadline; it never cuts a handler off or
/// writes a response. Handlers that care race their work against
/// [`Request::cancelled`]:
///
/// ```rust
/// use std::time::Duration;
/// use loupe::middleware::{Stack, Timeout};
/// use loupe::handler_fn;
///
/// let slow = Stack::new(handler_fn(|req, w| Box::pin(async move {
///     tokio::select! {
///         () = req.cancelled() => {
///             let _ = w.write_header(http::StatusCode::GATEWAY_TIMEOUT);
///         }
///         () = tokio::time::sleep(Duration::from_secs(2)) => {
///             let _ = w.write_all(b"done");
///         }
///     }
/// })))
/// .layer(Timeout::new(Duration::from_secs(1)));
/// ```
///
/// When a deadline is already set, the earlier of the two is kept, so an
/// inner `Timeout` can shorten an outer one but never extend it.
#[derive(Clone, Copy, Debug)]
pub struct Timeout {
    timeout: Duration,
}

impl Timeout {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Middleware for Timeout {
    fn handle<'a>(
        &'a self,
        mut req: Request,
        w: &'a mut dyn ResponseWriter,
        next: Next<'a>,
    ) -> BoxFuture<'a, ()> {
        let ours = Deadline::after(self.timeout);
        let deadline = match req.deadline() {
            Some(existing) => existing.min(ours),
            None => ours,
        };
        req.extensions_mut().insert(deadline);
        next.run(req, w)
    }
}
