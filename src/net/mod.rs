//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (accept loop, connection limits)
//!     → connection.rs (session id, live-session count)
//!     → Hand off to the HTTP session
//!
//! Outbound:
//!     connector.rs (resolve + connect to origin)
//!     → relay.rs (request out, response streamed back)
//! ```
//!
//! # Design Decisions
//! - Bounded accept prevents resource exhaustion
//! - Each session tracked for graceful shutdown
//! - One origin connection per session, never pooled

pub mod connection;
pub mod connector;
pub mod listener;
pub mod relay;

pub use connection::{SessionGuard, SessionId, SessionTracker};
pub use connector::{ConnectError, OriginConnector};
pub use listener::{ConnectionPermit, Listener, ListenerError};
pub use relay::{relay, send, RelayBuffer, RelayError};
