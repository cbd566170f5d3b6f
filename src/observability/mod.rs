//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Sessions and the supervisor produce:
//!     → logging.rs (structured tracing events, one span per session)
//!     → metrics.rs (counters, gauge, histogram)
//!
//! Consumers:
//!     → stdout via the fmt layer
//!     → Prometheus scrape endpoint (optional)
//! ```
//!
//! # Design Decisions
//! - Session ID and peer address ride on the session span
//! - Metric calls are no-ops until an exporter is installed

pub mod logging;
pub mod metrics;
