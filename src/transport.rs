//! The [`ResponseWriter`] the server hands to handlers.
//!
//! Handlers run in their own task and write into a [`HyperWriter`]; hyper
//! waits on the other end of a oneshot channel for the response head. By
//! default the whole body is buffered and sent as one [`Full`] body when the
//! handler returns. The first [`flush`](Flusher::flush) sends the head
//! early and switches the body to a channel of chunks, so long-running
//! handlers can stream.

use std::convert::Infallible;
use std::io::{self, Read};
use std::mem;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::{Bytes, BytesMut};
use http::{HeaderMap, Response, StatusCode};
use http_body_util::Full;
use hyper::body::{Body, Frame, SizeHint};
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use crate::response::{Flusher, ReaderFrom, ResponseWriter};

/// Body of a response produced by a [`HyperWriter`].
pub enum ResponseBody {
    Full(Full<Bytes>),
    Stream(mpsc::UnboundedReceiver<Bytes>),
}

impl ResponseBody {
    pub fn empty() -> Self {
        Self::Full(Full::new(Bytes::new()))
    }
}

impl Body for ResponseBody {
    type Data = Bytes;
    type Error = Infallible;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Bytes>, Infallible>>> {
        match self.get_mut() {
            Self::Full(full) => Pin::new(full).poll_frame(cx),
            Self::Stream(rx) => rx.poll_recv(cx).map(|chunk| chunk.map(|b| Ok(Frame::data(b)))),
        }
    }

    fn is_end_stream(&self) -> bool {
        match self {
            Self::Full(full) => full.is_end_stream(),
            Self::Stream(_) => false,
        }
    }

    fn size_hint(&self) -> SizeHint {
        match self {
            Self::Full(full) => full.size_hint(),
            Self::Stream(_) => SizeHint::default(),
        }
    }
}

enum State {
    // hyper is waiting for the head
    Pending(oneshot::Sender<Response<ResponseBody>>),
    // head sent, body chunks follow
    Streaming(mpsc::UnboundedSender<Bytes>),
    Closed,
}

/// Response handle backed by a hyper connection.
///
/// Supports flush and read-from. Once the client is gone, writes fail with
/// `BrokenPipe`.
pub struct HyperWriter {
    headers: HeaderMap,
    // status and the headers as they were when it was written
    head: Option<(StatusCode, HeaderMap)>,
    buffer: BytesMut,
    state: State,
}

impl HyperWriter {
    pub fn new(tx: oneshot::Sender<Response<ResponseBody>>) -> Self {
        Self {
            headers: HeaderMap::new(),
            head: None,
            buffer: BytesMut::new(),
            state: State::Pending(tx),
        }
    }

    /// Sends whatever has not been sent yet and ends the response.
    pub fn finish(mut self) {
        match mem::replace(&mut self.state, State::Closed) {
            State::Pending(tx) => {
                let body = ResponseBody::Full(Full::new(self.buffer.split().freeze()));
                let response = self.response(body);
                if tx.send(response).is_err() {
                    debug!("client went away before the response was sent");
                }
            }
            State::Streaming(tx) => {
                if !self.buffer.is_empty() {
                    let _ = tx.send(self.buffer.split().freeze());
                }
            }
            State::Closed => {}
        }
    }

    fn is_closed(&self) -> bool {
        match &self.state {
            State::Pending(tx) => tx.is_closed(),
            State::Streaming(tx) => tx.is_closed(),
            State::Closed => true,
        }
    }

    fn response(&mut self, body: ResponseBody) -> Response<ResponseBody> {
        let (status, headers) =
            self.head.take().unwrap_or_else(|| (StatusCode::OK, self.headers.clone()));

        let mut response = Response::new(body);
        *response.status_mut() = status;
        *response.headers_mut() = headers;
        response
    }

    fn ensure_head(&mut self) {
        if self.head.is_none() {
            self.head = Some((StatusCode::OK, self.headers.clone()));
        }
    }
}

fn broken_pipe() -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, "client disconnected")
}

impl ResponseWriter for HyperWriter {
    fn headers(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    fn write_header(&mut self, status: StatusCode) -> io::Result<()> {
        if let Some((sent, _)) = &self.head {
            debug!(status = status.as_u16(), sent = sent.as_u16(), "superfluous write_header call");
            return Ok(());
        }
        self.head = Some((status, self.headers.clone()));
        Ok(())
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.ensure_head();
        if self.is_closed() {
            return Err(broken_pipe());
        }

        self.buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn as_flusher(&mut self) -> Option<&mut dyn Flusher> {
        Some(self)
    }

    fn as_reader_from(&mut self) -> Option<&mut dyn ReaderFrom> {
        Some(self)
    }
}

impl Flusher for HyperWriter {
    fn flush(&mut self) -> io::Result<()> {
        self.ensure_head();

        // left closed if anything below fails
        let tx = match mem::replace(&mut self.state, State::Closed) {
            State::Pending(head_tx) => {
                let (chunk_tx, chunk_rx) = mpsc::unbounded_channel();
                let response = self.response(ResponseBody::Stream(chunk_rx));
                head_tx.send(response).map_err(|_| broken_pipe())?;
                chunk_tx
            }
            State::Streaming(tx) => tx,
            State::Closed => return Err(broken_pipe()),
        };

        if !self.buffer.is_empty() {
            tx.send(self.buffer.split().freeze()).map_err(|_| broken_pipe())?;
        }
        self.state = State::Streaming(tx);
        Ok(())
    }
}

impl ReaderFrom for HyperWriter {
    fn read_from(&mut self, reader: &mut dyn Read) -> io::Result<u64> {
        self.ensure_head();
        if self.is_closed() {
            return Err(broken_pipe());
        }

        let mut chunk = Vec::new();
        let n = reader.read_to_end(&mut chunk)?;
        self.buffer.extend_from_slice(&chunk);
        Ok(n as u64)
    }
}
