//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Session phases:
//!     read request head  → header_read deadline → 400 on expiry
//!     connect to origin  → connect deadline     → 503 on expiry
//!     relay each chunk   → idle deadline        → session closed
//! ```
//!
//! # Design Decisions
//! - Every blocking step of a session has a deadline
//! - Nothing is retried; a failed origin connect is answered with 503

pub mod timeouts;

pub use timeouts::{deadline, SessionTimeouts};
