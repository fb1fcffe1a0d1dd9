//! Radix-tree request router.
//!
//! One tree per HTTP method. O(path-length) lookup. Middleware registered
//! with [`Router::layer`] wraps every request, matched or not.

use std::collections::HashMap;
use std::sync::Arc;

use http::Method;
use matchit::Router as MatchitRouter;

use crate::handler::{BoxedHandler, Handler, NotFound};
use crate::middleware::{Middleware, Next};
use crate::request::Request;
use crate::response::ResponseWriter;

/// The application router.
///
/// Build it once at startup; pass it to [`Server::serve`](crate::Server::serve)
/// or call [`Router::serve`] directly. Each registration returns `self` so
/// calls chain naturally.
pub struct Router {
    routes: HashMap<Method, MatchitRouter<BoxedHandler>>,
    middleware: Vec<Arc<dyn Middleware>>,
    not_found: BoxedHandler,
}

impl Router {
    pub fn new() -> Self {
        Self { routes: HashMap::new(), middleware: Vec::new(), not_found: Arc::new(NotFound) }
    }

    /// Register a handler for a method + path pair. Returns `self` for chaining.
    ///
    /// Path parameters use `{name}` syntax; `req.param("name")` retrieves them.
    ///
    /// # Panics
    ///
    /// Panics if `path` is not a valid route or conflicts with one already
    /// registered for `method`.
    pub fn on(mut self, method: Method, path: &str, handler: impl Handler) -> Self {
        self.routes
            .entry(method)
            .or_default()
            .insert(path, Arc::new(handler))
            .unwrap_or_else(|e| panic!("invalid route `{path}`: {e}"));
        self
    }

    pub fn get(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::GET, path, handler)
    }

    pub fn post(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::POST, path, handler)
    }

    pub fn put(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::PUT, path, handler)
    }

    pub fn patch(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::PATCH, path, handler)
    }

    pub fn delete(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::DELETE, path, handler)
    }

    /// Appends middleware that runs for every request, in registration order.
    pub fn layer(mut self, m: impl Middleware) -> Self {
        self.middleware.push(Arc::new(m));
        self
    }

    /// Dispatches one request: middleware first, then the matched handler or
    /// a `404`.
    pub async fn serve(&self, mut req: Request, w: &mut dyn ResponseWriter) {
        let handler = match self.lookup(req.method(), req.path()) {
            Some((handler, params)) => {
                req.params = params;
                handler
            }
            None => Arc::clone(&self.not_found),
        };

        Next::new(&self.middleware, &*handler).run(req, w).await;
    }

    fn lookup(&self, method: &Method, path: &str) -> Option<(BoxedHandler, HashMap<String, String>)> {
        let tree = self.routes.get(method)?;
        let matched = tree.at(path).ok()?;
        let handler = Arc::clone(matched.value);
        let params = matched.params.iter()
            .map(|(k, v)| (k.to_owned(), v.to_owned()))
            .collect();
        Some((handler, params))
    }
}

impl Default for Router {
    fn default() -> Self { Self::new() }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use http::StatusCode;

    use super::*;
    use crate::handler::handler_fn;
    use crate::testing::Recorder;

    fn request(method: Method, uri: &str) -> Request {
        http::Request::builder().method(method).uri(uri).body(Bytes::new()).unwrap().into()
    }

    fn app() -> Router {
        Router::new()
            .get("/users/{id}", handler_fn(|req, w| Box::pin(async move {
                let id = req.param("id").unwrap_or("unknown").to_owned();
                let _ = w.write_all(id.as_bytes());
            })))
            .delete("/users/{id}", handler_fn(|_req, w| Box::pin(async move {
                let _ = w.write_header(StatusCode::NO_CONTENT);
            })))
    }

    #[tokio::test]
    async fn routes_by_method_and_path() {
        let app = app();

        let mut rec = Recorder::new();
        app.serve(request(Method::GET, "/users/42"), &mut rec).await;
        assert_eq!(rec.status(), Some(StatusCode::OK));
        assert_eq!(rec.body(), b"42");

        let mut rec = Recorder::new();
        app.serve(request(Method::DELETE, "/users/42"), &mut rec).await;
        assert_eq!(rec.status(), Some(StatusCode::NO_CONTENT));
    }

    #[tokio::test]
    async fn unknown_route_is_404() {
        let app = app();

        let mut rec = Recorder::new();
        app.serve(request(Method::GET, "/nope"), &mut rec).await;
        assert_eq!(rec.status(), Some(StatusCode::NOT_FOUND));
        assert_eq!(rec.body_str(), "404 page not found");

        let mut rec = Recorder::new();
        app.serve(request(Method::POST, "/users/42"), &mut rec).await;
        assert_eq!(rec.status(), Some(StatusCode::NOT_FOUND));
    }

    #[test]
    #[should_panic(expected = "invalid route")]
    fn conflicting_route_panics() {
        let h = || handler_fn(|_req, _w| Box::pin(async {}));
        let _ = Router::new().get("/a/{id}", h()).get("/a/{name}", h());
    }
}
