//! Bounded client listener.
//!
//! A session slot is taken *before* `accept` so that, at the limit, new
//! clients queue in the kernel backlog instead of being accepted and stalled.

use std::net::SocketAddr;
use std::sync::Arc;

use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};

use crate::config::ListenerConfig;

#[derive(Debug, Error)]
pub enum ListenerError {
    #[error("invalid bind address {0:?}")]
    Address(String),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to accept: {0}")]
    Accept(#[source] std::io::Error),

    /// The slot semaphore was closed; no further sessions can start.
    #[error("listener closed")]
    Closed,
}

/// Client listener that admits at most `max_sessions` live sessions.
pub struct Listener {
    inner: TcpListener,
    slots: Arc<Semaphore>,
    max_sessions: usize,
}

impl Listener {
    pub async fn bind(config: &ListenerConfig) -> Result<Self, ListenerError> {
        let addr: SocketAddr = config
            .bind_address
            .parse()
            .map_err(|_| ListenerError::Address(config.bind_address.clone()))?;
        let inner = TcpListener::bind(addr)
            .await
            .map_err(|source| ListenerError::Bind { addr, source })?;

        Ok(Self {
            inner,
            slots: Arc::new(Semaphore::new(config.max_connections)),
            max_sessions: config.max_connections,
        })
    }

    /// Wait for a free session slot, then for a client.
    ///
    /// The returned permit must live as long as the session.
    pub async fn accept(&self) -> Result<(TcpStream, SocketAddr, ConnectionPermit), ListenerError> {
        let permit = match Arc::clone(&self.slots).try_acquire_owned() {
            Ok(permit) => permit,
            Err(TryAcquireError::NoPermits) => {
                tracing::warn!(max_sessions = self.max_sessions, "Session limit reached, accept paused");
                Arc::clone(&self.slots)
                    .acquire_owned()
                    .await
                    .map_err(|_| ListenerError::Closed)?
            }
            Err(TryAcquireError::Closed) => return Err(ListenerError::Closed),
        };

        let (stream, peer) = self.inner.accept().await.map_err(ListenerError::Accept)?;
        Ok((stream, peer, ConnectionPermit { _slot: permit }))
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.inner.local_addr()
    }

    pub fn max_sessions(&self) -> usize {
        self.max_sessions
    }
}

/// A held session slot, released on drop (including when the task panics).
#[derive(Debug)]
pub struct ConnectionPermit {
    _slot: OwnedSemaphorePermit,
}
