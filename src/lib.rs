//! HTTP/1.x Forward Proxy Library
//!
//! Accepts client connections, rewrites each GET request into canonical
//! HTTP/1.0 form with a fixed `User-Agent`, forwards it to the origin named
//! by the request and streams the origin's response back unchanged.
//!
//! # Architecture Overview
//!
//! ```text
//!   client ──▶ net::listener ──▶ http::server ──spawn──▶ http::session
//!                                                          │
//!                      http::request / http::parser ◀──────┤ read head
//!                      http::normalize              ◀──────┤ rewrite
//!                      net::connector               ◀──────┤ connect
//!                      net::relay                   ◀──────┘ forward + stream
//!
//!   cross-cutting: config, resilience (deadlines), lifecycle, observability
//! ```

// Core subsystems
pub mod config;
pub mod http;
pub mod net;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;
pub mod resilience;

pub use config::ProxyConfig;
pub use http::ProxyServer;
pub use lifecycle::Shutdown;
