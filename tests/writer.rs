//! The instrumented writer seen from outside the crate.

use std::io;
use std::thread;
use std::time::Duration;

use http::StatusCode;
use loupe::ResponseWriter;
use loupe::testing::{Recorder, SharedBuffer};
use loupe::writer::{self, Capabilities, DEFAULT_RESPONSE_TIME_HEADER, Instrumented};

mod common;

use common::is_latency;

#[test]
fn first_write_without_header_sends_200() {
    let mut rec = Recorder::new();
    let mut w = writer::wrap(&mut rec, 1, None);

    thread::sleep(Duration::from_millis(2));
    w.write_all(b"hello").unwrap();

    assert_eq!(w.code(), Some(StatusCode::OK));
    assert!(w.duration() > Duration::ZERO);
    drop(w);

    assert_eq!(rec.status(), Some(StatusCode::OK));
    assert_eq!(rec.body(), b"hello");
    let values: Vec<_> = rec.headers_snapshot().get_all(DEFAULT_RESPONSE_TIME_HEADER).iter().collect();
    assert_eq!(values.len(), 1);
    assert!(is_latency(values[0].to_str().unwrap()));
}

#[test]
fn tee_sees_every_byte_in_order() {
    let mut rec = Recorder::new();
    let tee = SharedBuffer::new();
    let mut w = writer::wrap(&mut rec, 1, None);

    w.set_tee(Box::new(tee.clone()));
    w.write_all(b"ab").unwrap();
    w.write_all(b"cd").unwrap();
    drop(w);

    assert_eq!(tee.contents(), b"abcd");
    assert_eq!(rec.body(), b"abcd");
}

#[test]
fn latency_covers_time_before_first_write() {
    let mut rec = Recorder::new();
    let mut w = writer::wrap(&mut rec, 1, None);

    thread::sleep(Duration::from_millis(30));
    w.write_header(StatusCode::ACCEPTED).unwrap();
    let measured = w.duration();

    thread::sleep(Duration::from_millis(5));
    w.write_header(StatusCode::BAD_GATEWAY).unwrap();
    assert_eq!(w.duration(), measured);
    assert_eq!(w.code(), Some(StatusCode::ACCEPTED));
    drop(w);

    let value = rec.header(DEFAULT_RESPONSE_TIME_HEADER).unwrap();
    let millis: u64 = value.trim_end_matches("ms").parse().unwrap();
    assert!(millis >= 30, "{value}");
    assert_eq!(rec.header_writes(), 1);
}

#[test]
fn variants_forward_their_capabilities() {
    let mut rec = Recorder::new().with_flush().with_hijack().with_read_from();
    let mut w = writer::wrap(&mut rec, 1, None);
    assert_eq!(w.capabilities(), Capabilities::Http1);

    let copied = w.as_reader_from().unwrap().read_from(&mut &b"bulk"[..]).unwrap();
    assert_eq!(copied, 4);
    w.as_flusher().unwrap().flush().unwrap();
    assert_eq!(w.code(), Some(StatusCode::OK));
    drop(w);
    assert_eq!(rec.body(), b"bulk");
    assert_eq!(rec.flushes(), 1);

    let mut rec = Recorder::new().with_flush().with_push();
    let mut w = writer::wrap(&mut rec, 2, None);
    assert_eq!(w.capabilities(), Capabilities::Http2);
    w.as_pusher().unwrap().push("/app.css", None).unwrap();
    assert_eq!(w.code(), None, "push does not send the status line");
    drop(w);
    assert_eq!(rec.pushed(), ["/app.css"]);
}

#[test]
fn underlying_failures_propagate() {
    let mut rec = Recorder::new().fail_writes();
    let tee = SharedBuffer::new();
    let mut w = writer::wrap(&mut rec, 1, None);
    w.set_tee(Box::new(tee.clone()));

    let err = w.write(b"lost").unwrap_err();
    assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    assert_eq!(w.code(), Some(StatusCode::OK));
    assert!(tee.is_empty());
}
