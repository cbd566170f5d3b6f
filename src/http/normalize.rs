//! Outbound request construction.
//!
//! Turns a `ParsedRequest` into the HTTP/1.0 request sent to the origin:
//!
//! ```text
//! GET <path> HTTP/1.0\r\n
//! <every received header except User-Agent, in order>\r\n
//! User-Agent: <USER_AGENT>\r\n
//! \r\n
//! ```

use thiserror::Error;

use crate::http::parser::Method;
use crate::http::request::ParsedRequest;

/// Identifying header value sent on every forwarded request.
pub const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64; rv:3.10.0) Gecko/20230411 Firefox/63.0.1";

/// Port used when neither the target nor `Host` names one.
pub const DEFAULT_PORT: &str = "80";

/// Why a parsed request is not forwarded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RejectReason {
    #[error("method {0} is not supported")]
    NotImplemented(String),

    #[error("request names no origin host")]
    BadRequest,
}

/// The request as it will be written to the origin. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundRequest {
    host: String,
    port: String,
    bytes: Vec<u8>,
}

impl OutboundRequest {
    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> &str {
        &self.port
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Build the outbound request, or say why the request must be refused.
///
/// A request with no forwardable headers at all is still valid.
pub fn normalize(request: &ParsedRequest) -> Result<OutboundRequest, RejectReason> {
    if let Method::Other(method) = &request.method {
        return Err(RejectReason::NotImplemented(method.clone()));
    }

    let host = match request.host.as_deref() {
        Some(h) if !h.is_empty() => h.to_string(),
        _ => return Err(RejectReason::BadRequest),
    };
    let port = request.port.clone().unwrap_or_else(|| DEFAULT_PORT.to_string());

    let mut out = format!("{} {} HTTP/1.0\r\n", Method::Get, request.path);
    for header in request.headers.iter().filter(|h| !h.is("User-Agent")) {
        out.push_str(&header.name);
        out.push_str(": ");
        out.push_str(&header.value);
        out.push_str("\r\n");
    }
    out.push_str("User-Agent: ");
    out.push_str(USER_AGENT);
    out.push_str("\r\n\r\n");

    Ok(OutboundRequest {
        host,
        port,
        bytes: out.into_bytes(),
    })
}
