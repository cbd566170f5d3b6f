//! Origin connection establishment.
//!
//! # Responsibilities
//! - Resolve `host:port` from the outbound request
//! - Open one TCP stream to the first address that accepts
//!
//! # Design Decisions
//! - No pooling or reuse: one origin connection per session
//! - Resolution and connect share a single deadline
//! - Failures are never retried; the session answers 503

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;
use tokio::net::{lookup_host, TcpStream};

use crate::resilience::deadline;

/// Why the origin could not be reached.
#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("invalid origin port '{0}'")]
    InvalidPort(String),

    #[error("failed to resolve {host}: {source}")]
    Resolve {
        host: String,
        #[source]
        source: io::Error,
    },

    #[error("{0} resolved to no addresses")]
    NoAddresses(String),

    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("connecting to {0} timed out")]
    Timeout(String),
}

/// Opens origin connections with a bounded connect time.
#[derive(Debug, Clone)]
pub struct OriginConnector {
    connect_timeout: Duration,
}

impl OriginConnector {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }

    /// Resolve and connect to `host:port`.
    pub async fn connect(&self, host: &str, port: &str) -> Result<TcpStream, ConnectError> {
        let port: u16 = port
            .parse()
            .map_err(|_| ConnectError::InvalidPort(port.to_string()))?;
        // IPv6 literals arrive bracketed from URL parsing.
        let host = host.trim_start_matches('[').trim_end_matches(']');

        let label = format!("{}:{}", host, port);
        deadline(self.connect_timeout, connect_any(host, port), || ConnectError::Timeout(label)).await
    }
}

async fn connect_any(host: &str, port: u16) -> Result<TcpStream, ConnectError> {
    let addrs = lookup_host((host, port)).await.map_err(|source| ConnectError::Resolve {
        host: host.to_string(),
        source,
    })?;

    let mut last_err = None;
    for addr in addrs {
        match TcpStream::connect(addr).await {
            Ok(stream) => {
                tracing::debug!(origin = %addr, "Origin connected");
                return Ok(stream);
            }
            Err(source) => {
                tracing::debug!(origin = %addr, error = %source, "Origin address refused");
                last_err = Some(ConnectError::Connect { addr, source });
            }
        }
    }
    Err(last_err.unwrap_or_else(|| ConnectError::NoAddresses(host.to_string())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn connects_to_listening_origin() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port().to_string();

        let connector = OriginConnector::new(Duration::from_secs(2));
        let stream = connector.connect("127.0.0.1", &port).await.unwrap();
        assert_eq!(stream.peer_addr().unwrap(), listener.local_addr().unwrap());
    }

    #[tokio::test]
    async fn refused_connection_is_connect_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port().to_string();
        drop(listener);

        let connector = OriginConnector::new(Duration::from_secs(2));
        let err = connector.connect("127.0.0.1", &port).await.unwrap_err();
        assert!(matches!(err, ConnectError::Connect { .. }), "got {:?}", err);
    }

    #[tokio::test]
    async fn bracketed_ipv6_literal_accepted() {
        let listener = match TcpListener::bind("[::1]:0").await {
            Ok(l) => l,
            // No IPv6 loopback in this environment.
            Err(_) => return,
        };
        let port = listener.local_addr().unwrap().port().to_string();

        let connector = OriginConnector::new(Duration::from_secs(2));
        assert!(connector.connect("[::1]", &port).await.is_ok());
    }

    #[tokio::test]
    async fn non_numeric_port_rejected() {
        let connector = OriginConnector::new(Duration::from_secs(2));
        let err = connector.connect("127.0.0.1", "http").await.unwrap_err();
        assert!(matches!(err, ConnectError::InvalidPort(p) if p == "http"));
    }
}
