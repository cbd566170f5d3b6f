//! Per-connection session.
//!
//! # State Transitions
//! ```text
//! Accepted → RequestParsed → Forwarding → Relaying → Closed
//!     │            │              │
//!     └────────────┴──────────────┴──→ Rejected → Closed
//! ```
//! - `Rejected`: malformed request, unsupported method, missing host or an
//!   unreachable origin. The client receives an HTML error page.
//! - `Relaying → Closed`: origin finished, or an I/O error cut the relay short.
//!   Relay errors are not reported to the client.
//!
//! Both sockets are closed on every path: the origin stream when `serve`
//! returns, the client stream when `run` returns.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::Instrument;

use crate::config::ProxyConfig;
use crate::http::normalize::{normalize, RejectReason};
use crate::http::parser::ParseError;
use crate::http::request::{read_request, ReadLimits};
use crate::http::response::ErrorResponse;
use crate::net::{self, ConnectError, OriginConnector, RelayBuffer, RelayError, SessionGuard, SessionId};
use crate::observability::metrics;
use crate::resilience::{deadline, SessionTimeouts};

/// Session lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Accepted,
    RequestParsed,
    Rejected,
    Forwarding,
    Relaying,
    Closed,
}

/// Everything that can end a session early.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Rejected(#[from] RejectReason),

    #[error(transparent)]
    Connect(#[from] ConnectError),

    #[error(transparent)]
    Relay(#[from] RelayError),
}

impl SessionError {
    /// The error page owed to the client, if one can still be sent.
    pub fn response(&self) -> Option<ErrorResponse> {
        match self {
            SessionError::Parse(_) => Some(ErrorResponse::BAD_REQUEST),
            SessionError::Rejected(RejectReason::NotImplemented(_)) => Some(ErrorResponse::NOT_IMPLEMENTED),
            SessionError::Rejected(RejectReason::BadRequest) => Some(ErrorResponse::BAD_REQUEST),
            SessionError::Connect(_) => Some(ErrorResponse::SERVICE_UNAVAILABLE),
            SessionError::Relay(_) => None,
        }
    }
}

/// How a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    /// The origin response was relayed to end of stream.
    Relayed,
    /// An error page with this status was sent instead.
    Rejected(u16),
    /// Relaying stopped on an I/O error or idle timeout.
    Aborted,
}

impl SessionOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            SessionOutcome::Relayed => "relayed",
            SessionOutcome::Rejected(_) => "rejected",
            SessionOutcome::Aborted => "relay_error",
        }
    }
}

/// Immutable settings shared by every session.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub limits: ReadLimits,
    pub timeouts: SessionTimeouts,
    pub relay_buffer_size: usize,
    pub connector: OriginConnector,
}

impl From<&ProxyConfig> for SessionSettings {
    fn from(config: &ProxyConfig) -> Self {
        let timeouts = SessionTimeouts::from(&config.timeouts);
        Self {
            limits: ReadLimits::from(&config.limits),
            timeouts,
            relay_buffer_size: config.limits.relay_buffer_size,
            connector: OriginConnector::new(timeouts.connect),
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self::from(&ProxyConfig::default())
    }
}

/// Byte counters reported when the session closes.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SessionStats {
    pub request_bytes: u64,
    pub response_bytes: u64,
}

/// One accepted client connection, driven to completion by `run`.
pub struct Session {
    guard: SessionGuard,
    peer: SocketAddr,
    state: SessionState,
    stats: SessionStats,
    settings: Arc<SessionSettings>,
}

impl Session {
    pub fn new(guard: SessionGuard, peer: SocketAddr, settings: Arc<SessionSettings>) -> Self {
        Self {
            guard,
            peer,
            state: SessionState::Accepted,
            stats: SessionStats::default(),
            settings,
        }
    }

    pub fn id(&self) -> SessionId {
        self.guard.id()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Handle the client connection from first byte to close.
    pub async fn run<S>(self, stream: S) -> SessionOutcome
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let span = tracing::info_span!("session", session_id = %self.id(), peer = %self.peer);
        self.run_inner(stream).instrument(span).await
    }

    async fn run_inner<S>(mut self, stream: S) -> SessionOutcome
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let started = Instant::now();
        let mut client = BufReader::new(stream);

        let outcome = match self.serve(&mut client).await {
            Ok(()) => SessionOutcome::Relayed,
            Err(err) => match err.response() {
                Some(response) => {
                    self.transition(SessionState::Rejected);
                    tracing::info!(status = response.status, error = %err, "Request rejected");
                    metrics::record_rejection(response.status);
                    let bytes = response.to_bytes();
                    if let Err(e) = net::send(client.get_mut(), &bytes, self.settings.timeouts.idle).await {
                        tracing::debug!(error = %e, "Could not deliver error response");
                    }
                    SessionOutcome::Rejected(response.status)
                }
                None => {
                    tracing::warn!(error = %err, "Relay aborted");
                    SessionOutcome::Aborted
                }
            },
        };

        if let Err(e) = client.get_mut().shutdown().await {
            tracing::trace!(error = %e, "Client shutdown failed");
        }
        self.transition(SessionState::Closed);
        metrics::record_session(outcome.label(), started);
        tracing::info!(
            outcome = outcome.label(),
            request_bytes = self.stats.request_bytes,
            response_bytes = self.stats.response_bytes,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Session closed"
        );
        outcome
    }

    /// Parse, normalize, connect, forward and relay. The origin stream is
    /// dropped (closed) when this returns.
    async fn serve<S>(&mut self, client: &mut BufReader<S>) -> Result<(), SessionError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let settings = Arc::clone(&self.settings);
        let timeouts = settings.timeouts;

        let request = deadline(
            timeouts.header_read,
            read_request(client, settings.limits),
            || ParseError::Timeout,
        )
        .await?;
        self.transition(SessionState::RequestParsed);
        tracing::debug!(
            method = %request.method,
            path = %request.path,
            host = ?request.host,
            headers = request.headers.len(),
            "Request parsed"
        );

        let outbound = normalize(&request)?;
        self.transition(SessionState::Forwarding);

        let mut origin = settings.connector.connect(outbound.host(), outbound.port()).await?;
        net::send(&mut origin, outbound.as_bytes(), timeouts.idle).await?;
        self.stats.request_bytes = outbound.len() as u64;

        self.transition(SessionState::Relaying);
        let mut buffer = RelayBuffer::new(settings.relay_buffer_size);
        let relayed = net::relay(&mut origin, client.get_mut(), &mut buffer, timeouts.idle).await?;
        self.stats.response_bytes = relayed;
        metrics::record_response_bytes(relayed);
        Ok(())
    }

    fn transition(&mut self, next: SessionState) {
        tracing::trace!(from = ?self.state, to = ?next, "Session state");
        self.state = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::SessionTracker;
    use std::time::Duration;
    use tokio::io::{duplex, AsyncReadExt};
    use tokio::net::TcpListener;

    fn peer() -> SocketAddr {
        "127.0.0.1:40000".parse().unwrap()
    }

    async fn exchange(settings: SessionSettings, request: &[u8]) -> (SessionOutcome, String) {
        let tracker = SessionTracker::new();
        let session = Session::new(tracker.track(), peer(), Arc::new(settings));
        let (mut client, server) = duplex(64 * 1024);

        let task = tokio::spawn(session.run(server));
        client.write_all(request).await.unwrap();
        let mut response = Vec::new();
        client.read_to_end(&mut response).await.unwrap();

        let outcome = task.await.unwrap();
        assert_eq!(tracker.active_count(), 0);
        (outcome, String::from_utf8(response).unwrap())
    }

    #[test]
    fn error_mapping() {
        assert_eq!(
            SessionError::from(ParseError::Incomplete).response(),
            Some(ErrorResponse::BAD_REQUEST)
        );
        assert_eq!(
            SessionError::from(RejectReason::NotImplemented("POST".into())).response(),
            Some(ErrorResponse::NOT_IMPLEMENTED)
        );
        assert_eq!(
            SessionError::from(RejectReason::BadRequest).response(),
            Some(ErrorResponse::BAD_REQUEST)
        );
        assert_eq!(
            SessionError::from(ConnectError::Timeout("h:80".into())).response(),
            Some(ErrorResponse::SERVICE_UNAVAILABLE)
        );
        assert_eq!(
            SessionError::from(RelayError::Idle(Duration::from_secs(1))).response(),
            None
        );
    }

    async fn serve_once(request: &[u8]) -> (Result<(), SessionError>, SessionState) {
        let tracker = SessionTracker::new();
        let mut session = Session::new(tracker.track(), peer(), Arc::new(SessionSettings::default()));
        let (mut client, server) = duplex(64 * 1024);
        client.write_all(request).await.unwrap();
        client.shutdown().await.unwrap();

        let mut reader = BufReader::new(server);
        let result = session.serve(&mut reader).await;
        (result, session.state())
    }

    #[tokio::test]
    async fn state_records_how_far_the_session_got() {
        let (result, state) = serve_once(b"GET http://example.com/\r\n\r\n").await;
        assert!(matches!(result, Err(SessionError::Parse(ParseError::RequestLine))));
        assert_eq!(state, SessionState::Accepted);

        let (result, state) = serve_once(b"POST http://127.0.0.1:1/ HTTP/1.1\r\n\r\n").await;
        assert!(matches!(result, Err(SessionError::Rejected(RejectReason::NotImplemented(_)))));
        assert_eq!(state, SessionState::RequestParsed);

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        let request = format!("GET http://127.0.0.1:{}/ HTTP/1.0\r\n\r\n", port);
        let (result, state) = serve_once(request.as_bytes()).await;
        assert!(matches!(result, Err(SessionError::Connect(_))));
        assert_eq!(state, SessionState::Forwarding);
    }

    #[tokio::test]
    async fn post_is_not_implemented() {
        let (outcome, response) = exchange(
            SessionSettings::default(),
            b"POST http://127.0.0.1:1/ HTTP/1.1\r\nHost: 127.0.0.1\r\n\r\n",
        )
        .await;
        assert_eq!(outcome, SessionOutcome::Rejected(501));
        assert!(response.starts_with("HTTP/1.0 501 Not Implemented\r\n"));
    }

    #[tokio::test]
    async fn missing_version_is_bad_request() {
        let (outcome, response) = exchange(SessionSettings::default(), b"GET http://example.com/\r\n\r\n").await;
        assert_eq!(outcome, SessionOutcome::Rejected(400));
        assert!(response.starts_with("HTTP/1.0 400 Bad Request\r\n"));
    }

    #[tokio::test]
    async fn origin_form_without_host_is_bad_request() {
        let (outcome, _) = exchange(SessionSettings::default(), b"GET /index.html HTTP/1.0\r\n\r\n").await;
        assert_eq!(outcome, SessionOutcome::Rejected(400));
    }

    #[tokio::test]
    async fn unreachable_origin_is_service_unavailable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let request = format!("GET http://127.0.0.1:{}/ HTTP/1.0\r\n\r\n", port);
        let (outcome, response) = exchange(SessionSettings::default(), request.as_bytes()).await;
        assert_eq!(outcome, SessionOutcome::Rejected(503));
        assert!(response.starts_with("HTTP/1.0 503 Service Unavailable\r\n"));
    }

    #[tokio::test]
    async fn slow_headers_time_out_with_bad_request() {
        let mut settings = SessionSettings::default();
        settings.timeouts.header_read = Duration::from_millis(100);

        let tracker = SessionTracker::new();
        let session = Session::new(tracker.track(), peer(), Arc::new(settings));
        let (mut client, server) = duplex(1024);
        let task = tokio::spawn(session.run(server));

        client.write_all(b"GET http://example.com/ HTTP/1.1\r\n").await.unwrap();
        let mut response = Vec::new();
        client.read_to_end(&mut response).await.unwrap();

        assert_eq!(task.await.unwrap(), SessionOutcome::Rejected(400));
        assert!(response.starts_with(b"HTTP/1.0 400 Bad Request\r\n"));
    }

    #[tokio::test]
    async fn relays_origin_response() {
        let origin = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = origin.local_addr().unwrap().port();
        let origin_task = tokio::spawn(async move {
            let (mut socket, _) = origin.accept().await.unwrap();
            let mut reader = BufReader::new(&mut socket);
            let mut head = Vec::new();
            while !head.ends_with(b"\r\n\r\n") {
                let mut byte = [0u8; 1];
                reader.read_exact(&mut byte).await.unwrap();
                head.push(byte[0]);
            }
            socket.write_all(b"HTTP/1.0 200 OK\r\n\r\nbody").await.unwrap();
            String::from_utf8(head).unwrap()
        });

        let request = format!("GET http://127.0.0.1:{}/x HTTP/1.1\r\nAccept: */*\r\n\r\n", port);
        let (outcome, response) = exchange(SessionSettings::default(), request.as_bytes()).await;

        assert_eq!(outcome, SessionOutcome::Relayed);
        assert_eq!(response, "HTTP/1.0 200 OK\r\n\r\nbody");
        let head = origin_task.await.unwrap();
        assert!(head.starts_with("GET /x HTTP/1.0\r\nAccept: */*\r\nUser-Agent: "));
    }
}
