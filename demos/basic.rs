//! Minimal loupe service with request logging: JSON endpoints plus a
//! streamed response and a slow endpoint that respects its deadline.
//!
//! Run with:
//!   cargo run --example basic                    # defaults
//!   cargo run --example basic -- loupe.toml      # from a config file
//!
//! Try:
//!   curl -i http://localhost:3000/users/42
//!   curl -i -X POST http://localhost:3000/users \
//!        -H 'content-type: application/json' \
//!        -d '{"name":"alice"}'
//!   curl -N http://localhost:3000/stream
//!   curl -i http://localhost:3000/slow

use std::time::Duration;

use http::StatusCode;
use loupe::middleware::{AttachLogger, RequestIdLayer, Timeout};
use loupe::{Config, Request, RequestLogger, ResponseWriter, Router, Server, handler_fn, logging, write_json};

#[tokio::main]
async fn main() -> Result<(), loupe::Error> {
    let config = match std::env::args().nth(1) {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    logging::init(&config.log);

    let mut app = Router::new()
        .get("/users/{id}", handler_fn(|req, w| Box::pin(get_user(req, w))))
        .post("/users", handler_fn(|req, w| Box::pin(create_user(req, w))))
        .get("/stream", handler_fn(|req, w| Box::pin(stream(req, w))))
        .get("/slow", handler_fn(|req, w| Box::pin(slow(req, w))))
        .layer(RequestIdLayer)
        .layer(AttachLogger::new(RequestLogger::default()));

    if let Some(timeout) = config.middleware.request_timeout() {
        app = app.layer(Timeout::new(timeout));
    }
    let app = app.layer(config.middleware.request_log());

    Server::from_config(&config.server)?.serve(app).await
}

// GET /users/{id}
async fn get_user(req: Request, w: &mut dyn ResponseWriter) {
    let id = req.param("id").unwrap_or("unknown");
    let body = serde_json::json!({ "id": id, "name": "alice" });
    let _ = write_json(w, StatusCode::OK, body.to_string().as_bytes());
}

// POST /users
async fn create_user(req: Request, w: &mut dyn ResponseWriter) {
    let input: serde_json::Value = match serde_json::from_slice(req.body()) {
        Ok(v) => v,
        Err(e) => {
            req.logger().warn(&format!("rejecting body: {e}"));
            let _ = w.write_header(StatusCode::BAD_REQUEST);
            return;
        }
    };

    w.headers().insert(http::header::LOCATION, http::HeaderValue::from_static("/users/99"));
    let body = serde_json::json!({ "id": "99", "name": input["name"] });
    let _ = write_json(w, StatusCode::CREATED, body.to_string().as_bytes());
}

// GET /stream: one line every 200ms, flushed as it is written
async fn stream(req: Request, w: &mut dyn ResponseWriter) {
    let logger = req.logger();
    for i in 0..5 {
        logger.debug(&format!("tick {i}"));
        if w.write_all(format!("tick {i}\n").as_bytes()).is_err() {
            return;
        }
        if let Some(flusher) = w.as_flusher() {
            if flusher.flush().is_err() {
                return;
            }
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
    }
}

// GET /slow: gives up when the request deadline passes
async fn slow(req: Request, w: &mut dyn ResponseWriter) {
    tokio::select! {
        () = req.cancelled() => {
            let _ = w.write_header(StatusCode::GATEWAY_TIMEOUT);
        }
        () = tokio::time::sleep(Duration::from_secs(5)) => {
            let _ = w.write_all(b"done");
        }
    }
}
