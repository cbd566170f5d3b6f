//! Session supervisor.
//!
//! # Responsibilities
//! - Accept client connections from the bounded listener
//! - Spawn one detached task per connection running a `Session`
//! - Keep accepting through transient accept errors
//! - On shutdown: stop accepting, then drain live sessions for a grace period

use std::sync::Arc;
use std::time::Duration;

use crate::config::ProxyConfig;
use crate::http::session::{Session, SessionSettings};
use crate::lifecycle::ShutdownListener;
use crate::net::{Listener, SessionTracker};

/// Pause after a failed accept, e.g. when out of file descriptors.
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// The forward proxy server.
pub struct ProxyServer {
    settings: Arc<SessionSettings>,
    tracker: SessionTracker,
    shutdown_grace: Duration,
}

impl ProxyServer {
    pub fn new(config: ProxyConfig) -> Self {
        Self {
            settings: Arc::new(SessionSettings::from(&config)),
            tracker: SessionTracker::new(),
            shutdown_grace: Duration::from_secs(config.timeouts.shutdown_grace_secs),
        }
    }

    /// Live session counter, shared with every spawned session.
    pub fn tracker(&self) -> &SessionTracker {
        &self.tracker
    }

    /// Accept and serve connections until `shutdown` fires.
    pub async fn run(self, listener: Listener, mut shutdown: ShutdownListener) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, max_sessions = listener.max_sessions(), "Proxy accepting connections");

        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer, permit)) => {
                        let session = Session::new(self.tracker.track(), peer, Arc::clone(&self.settings));
                        tokio::spawn(async move {
                            session.run(stream).await;
                            drop(permit);
                        });
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Accept failed");
                        tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                    }
                },
                _ = shutdown.wait() => {
                    tracing::info!("Shutdown requested, no longer accepting");
                    break;
                }
            }
        }

        drop(listener);
        let active = self.tracker.active_count();
        if active > 0 {
            tracing::info!(active_sessions = active, grace = ?self.shutdown_grace, "Draining sessions");
            if !self.tracker.drain(self.shutdown_grace).await {
                tracing::warn!(
                    active_sessions = self.tracker.active_count(),
                    "Sessions still active after grace period"
                );
            }
        }

        tracing::info!("Proxy stopped");
        Ok(())
    }
}
