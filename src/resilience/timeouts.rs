//! Timeout enforcement.
//!
//! # Responsibilities
//! - Bound the header read, the origin connect and every relay read/write
//! - Convert expiry into the caller's own error type
//!
//! # Design Decisions
//! - Uses Tokio's timeout facilities
//! - Timeout errors are distinct variants in each subsystem's error enum
//! - A stalled peer only ever holds up its own session

use std::future::Future;
use std::time::Duration;

use crate::config::TimeoutConfig;

/// Per-session deadlines derived from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionTimeouts {
    pub connect: Duration,
    pub header_read: Duration,
    pub idle: Duration,
}

impl From<&TimeoutConfig> for SessionTimeouts {
    fn from(config: &TimeoutConfig) -> Self {
        Self {
            connect: Duration::from_secs(config.connect_secs),
            header_read: Duration::from_secs(config.header_read_secs),
            idle: Duration::from_secs(config.idle_secs),
        }
    }
}

impl Default for SessionTimeouts {
    fn default() -> Self {
        Self::from(&TimeoutConfig::default())
    }
}

/// Run a fallible future with a deadline, mapping expiry to `on_timeout()`.
pub async fn deadline<F, T, E>(limit: Duration, fut: F, on_timeout: impl FnOnce() -> E) -> Result<T, E>
where
    F: Future<Output = Result<T, E>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(on_timeout()),
    }
}
