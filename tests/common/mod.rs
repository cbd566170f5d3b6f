//! Shared utilities for integration and load testing.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use forward_proxy::config::ProxyConfig;
use forward_proxy::lifecycle::Shutdown;
use forward_proxy::net::{Listener, SessionTracker};
use forward_proxy::ProxyServer;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// A running proxy on an ephemeral port.
#[allow(dead_code)]
pub struct ProxyHandle {
    pub addr: SocketAddr,
    pub shutdown: Shutdown,
    pub tracker: SessionTracker,
    pub task: JoinHandle<()>,
}

/// Start the proxy with `config`, overriding the bind address.
pub async fn start_proxy(mut config: ProxyConfig) -> ProxyHandle {
    config.listener.bind_address = "127.0.0.1:0".into();
    let listener = Listener::bind(&config.listener).await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = ProxyServer::new(config);
    let tracker = server.tracker().clone();
    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.subscribe();

    let task = tokio::spawn(async move {
        let _ = server.run(listener, server_shutdown).await;
    });

    ProxyHandle {
        addr,
        shutdown,
        tracker,
        task,
    }
}

/// A mock origin that records request heads and answers every connection
/// with the same bytes, then closes.
#[allow(dead_code)]
pub struct MockOrigin {
    pub addr: SocketAddr,
    pub requests: mpsc::UnboundedReceiver<Vec<u8>>,
    pub accepted: Arc<AtomicUsize>,
}

#[allow(dead_code)]
impl MockOrigin {
    pub fn accepted(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }

    pub async fn next_request(&mut self) -> String {
        let head = self.requests.recv().await.expect("origin saw no request");
        String::from_utf8(head).unwrap()
    }
}

/// Start a mock origin that replies with `response`.
pub async fn start_origin(response: Vec<u8>) -> MockOrigin {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = mpsc::unbounded_channel();
    let accepted = Arc::new(AtomicUsize::new(0));
    let response = Arc::new(response);
    let counter = accepted.clone();

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    counter.fetch_add(1, Ordering::SeqCst);
                    let tx = tx.clone();
                    let response = response.clone();
                    tokio::spawn(async move {
                        let head = read_head(&mut socket).await;
                        let _ = tx.send(head);
                        let _ = socket.write_all(&response).await;
                        let _ = socket.shutdown().await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    MockOrigin {
        addr,
        requests: rx,
        accepted,
    }
}

async fn read_head(socket: &mut TcpStream) -> Vec<u8> {
    let mut head = Vec::new();
    let mut chunk = [0u8; 1024];
    while !head.windows(4).any(|w| w == b"\r\n\r\n") {
        match socket.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => head.extend_from_slice(&chunk[..n]),
        }
    }
    head
}

/// Send raw bytes through the proxy and read until it closes the connection.
#[allow(dead_code)]
pub async fn send_raw(proxy: SocketAddr, request: &[u8]) -> Vec<u8> {
    let mut stream = TcpStream::connect(proxy).await.unwrap();
    stream.write_all(request).await.unwrap();
    let mut response = Vec::new();
    stream.read_to_end(&mut response).await.unwrap();
    response
}

/// Split a response into its head and body at the first blank line.
#[allow(dead_code)]
pub fn split_response(response: &[u8]) -> (String, Vec<u8>) {
    let at = response
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .expect("response has no header terminator");
    (
        String::from_utf8(response[..at + 4].to_vec()).unwrap(),
        response[at + 4..].to_vec(),
    )
}
