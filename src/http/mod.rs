//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! Accepted TCP connection
//!     → server.rs (supervisor: spawn one session per connection)
//!     → session.rs (state machine)
//!         → request.rs + parser.rs (read and classify the request head)
//!         → normalize.rs (build the HTTP/1.0 outbound request)
//!         → net::connector (origin connect) → net::relay (stream response)
//!         → response.rs (HTML error page when the request is refused)
//! ```

pub mod normalize;
pub mod parser;
pub mod request;
pub mod response;
pub mod server;
pub mod session;

pub use normalize::{normalize, OutboundRequest, RejectReason, USER_AGENT};
pub use parser::{Header, Method, ParseError};
pub use request::{read_request, ParsedRequest, ReadLimits};
pub use response::ErrorResponse;
pub use server::ProxyServer;
pub use session::{Session, SessionError, SessionOutcome, SessionSettings, SessionState};
