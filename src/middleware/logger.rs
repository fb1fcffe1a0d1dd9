//! Per-request logger attachment.

use crate::handler::BoxFuture;
use crate::logger::RequestLogger;
use crate::middleware::{Middleware, Next};
use crate::request::Request;
use crate::response::ResponseWriter;

/// Gives every request its own [`RequestLogger`], derived from a base one.
///
/// Each request gets a [`child`](RequestLogger::child) of the base: same
/// starting fields, separate field set, so middleware on concurrent requests
/// never write into each other's context. Handlers fetch it with
/// [`Request::logger`].
pub struct AttachLogger {
    base: RequestLogger,
}

impl AttachLogger {
    pub fn new(base: RequestLogger) -> Self {
        Self { base }
    }
}

impl Middleware for AttachLogger {
    fn handle<'a>(
        &'a self,
        mut req: Request,
        w: &'a mut dyn ResponseWriter,
        next: Next<'a>,
    ) -> BoxFuture<'a, ()> {
        req.extensions_mut().insert(self.base.child());
        next.run(req, w)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use bytes::Bytes;
    use serde_json::json;

    use super::*;
    use crate::handler::{Handler, handler_fn};
    use crate::middleware::Stack;
    use crate::testing::Recorder;

    fn request() -> Request {
        http::Request::builder().uri("/attach").body(Bytes::new()).unwrap().into()
    }

    #[tokio::test]
    async fn handler_sees_attached_logger() {
        let stack = Stack::new(handler_fn(|req, w| Box::pin(async move {
            let body: &[u8] = if req.logger().is_disabled() { b"failed" } else { b"success" };
            let _ = w.write_all(body);
        })))
        .layer(AttachLogger::new(RequestLogger::default()));

        let mut rec = Recorder::new();
        stack.call(request(), &mut rec).await;
        assert_eq!(rec.body(), b"success");
    }

    #[tokio::test]
    async fn requests_do_not_share_context() {
        let base = RequestLogger::default();
        base.update(|f| {
            f.insert("service".into(), json!("api"));
        });

        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let stack = Stack::new(handler_fn(move |req, _w| {
            let sink = Arc::clone(&sink);
            Box::pin(async move {
                let logger = req.logger();
                let count = logger.fields().len();
                logger.update(|f| {
                    f.insert("touched".into(), json!(true));
                });
                sink.lock().unwrap().push(count);
            })
        }))
        .layer(AttachLogger::new(base.clone()));

        for _ in 0..2 {
            stack.call(request(), &mut Recorder::new()).await;
        }

        assert_eq!(*seen.lock().unwrap(), [1, 1]);
        assert_eq!(base.field("touched"), None);
    }
}
