//! Shared helpers for the integration tests.

use std::net::SocketAddr;

use loupe::{Error, Router, Server};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// A server running on an ephemeral local port.
pub struct TestServer {
    pub addr: SocketAddr,
    stop: oneshot::Sender<()>,
    handle: JoinHandle<Result<(), Error>>,
}

impl TestServer {
    pub async fn start(router: Router) -> Self {
        Self::start_with(router, |server| server).await
    }

    pub async fn start_with(router: Router, configure: impl FnOnce(Server) -> Server) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (stop, stopped) = oneshot::channel::<()>();

        let server = configure(Server::from_listener(listener));
        let handle = tokio::spawn(server.serve_with_shutdown(router, async move {
            let _ = stopped.await;
        }));

        Self { addr, stop, handle }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }

    /// Signals shutdown and waits for the server to drain.
    pub async fn shutdown(self) -> Result<(), Error> {
        let _ = self.stop.send(());
        self.handle.await.unwrap()
    }
}

/// True for values like `"0ms"` or `"125ms"`.
#[allow(dead_code)]
pub fn is_latency(value: &str) -> bool {
    value
        .strip_suffix("ms")
        .is_some_and(|digits| !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()))
}
