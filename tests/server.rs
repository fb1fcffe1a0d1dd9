//! End-to-end tests over a real socket.

use std::time::Duration;

use http::{HeaderName, StatusCode};
use loupe::middleware::{RequestIdLayer, Timeout};
use loupe::{ResponseWriter, Router, handler_fn, write_json};

mod common;

use common::{TestServer, is_latency};

fn app() -> Router {
    Router::new()
        .get("/hello", handler_fn(|_req, w| Box::pin(async move {
            let _ = w.write_all(b"hello");
        })))
        .get("/empty", handler_fn(|_req, _w| Box::pin(async {})))
        .post("/echo", handler_fn(|req, w| Box::pin(async move {
            let _ = write_json(w, StatusCode::CREATED, req.body());
        })))
        .get("/stream", handler_fn(|_req, w| Box::pin(async move {
            for chunk in ["one ", "two ", "three"] {
                if w.write_all(chunk.as_bytes()).is_err() {
                    return;
                }
                if let Some(flusher) = w.as_flusher() {
                    let _ = flusher.flush();
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })))
        .get("/slow", handler_fn(|req, w| Box::pin(async move {
            tokio::select! {
                () = req.cancelled() => {
                    let _ = w.write_header(StatusCode::GATEWAY_TIMEOUT);
                }
                () = tokio::time::sleep(Duration::from_secs(10)) => {
                    let _ = w.write_all(b"too late");
                }
            }
        })))
        .get("/crash", handler_fn(|req, _w| Box::pin(async move {
            if req.path() == "/crash" {
                panic!("handler failed");
            }
        })))
        .layer(RequestIdLayer)
        .layer(Timeout::new(Duration::from_millis(100)))
}

fn latency(res: &reqwest::Response, name: &str) -> Option<String> {
    let mut values = res.headers().get_all(name).iter();
    let first = values.next()?.to_str().ok()?.to_owned();
    assert!(values.next().is_none(), "{name} sent more than once");
    Some(first)
}

#[tokio::test]
async fn body_write_implies_200_and_latency_header() {
    let server = TestServer::start(app()).await;
    let client = reqwest::Client::new();

    let res = client.get(server.url("/hello")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert!(is_latency(&latency(&res, "x-response-time").unwrap()));
    assert!(res.headers().contains_key("x-request-id"));
    assert_eq!(res.text().await.unwrap(), "hello");

    drop(client);
    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn silent_handler_still_answers_200() {
    let server = TestServer::start(app()).await;

    let res = reqwest::get(server.url("/empty")).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert!(is_latency(&latency(&res, "x-response-time").unwrap()));
    assert_eq!(res.text().await.unwrap(), "");

    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn json_echo_and_not_found() {
    let server = TestServer::start(app()).await;
    let client = reqwest::Client::new();

    let res = client.post(server.url("/echo")).body(r#"{"name":"ada"}"#).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    assert_eq!(res.headers()["content-type"], "application/json; charset=utf-8");
    assert_eq!(res.headers()["x-content-type-options"], "nosniff");
    assert_eq!(res.text().await.unwrap(), r#"{"name":"ada"}"#);

    let res = client.get(server.url("/missing")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    assert!(latency(&res, "x-response-time").is_some());
    assert_eq!(res.text().await.unwrap(), "404 page not found");

    drop(client);
    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn flushed_response_arrives_whole() {
    let server = TestServer::start(app()).await;

    let res = reqwest::get(server.url("/stream")).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert!(latency(&res, "x-response-time").is_some());
    assert_eq!(res.text().await.unwrap(), "one two three");

    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn deadline_reaches_the_handler() {
    let server = TestServer::start(app()).await;

    let res = reqwest::get(server.url("/slow")).await.unwrap();
    assert_eq!(res.status(), StatusCode::GATEWAY_TIMEOUT);

    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn crashed_handler_answers_500() {
    let server = TestServer::start(app()).await;

    let res = reqwest::get(server.url("/crash")).await.unwrap();
    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);

    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn custom_latency_header_name() {
    let server = TestServer::start_with(app(), |s| {
        s.response_time_header(HeaderName::from_static("x-elapsed"))
    })
    .await;

    let res = reqwest::get(server.url("/hello")).await.unwrap();
    assert!(is_latency(&latency(&res, "x-elapsed").unwrap()));
    assert!(res.headers().get("x-response-time").is_none());

    server.shutdown().await.unwrap();
}
