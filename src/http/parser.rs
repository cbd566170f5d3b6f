//! Request and header line classification.
//!
//! # Responsibilities
//! - Classify one raw line as request line, header line or the blank line
//! - Extract method, target (host, port, path) and version from request lines
//! - Split header lines into name and value text
//!
//! # Design Decisions
//! - Pure functions over a single line; the read loop in `request.rs` owns
//!   all accumulated state
//! - Malformed input is an `Err(ParseError)`, never a panic
//! - Absolute-URI targets go through `url`, keeping path and query as sent

use thiserror::Error;
use url::Url;

/// Reasons a request cannot be parsed. Every variant maps to a 400 response.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("malformed request line")]
    RequestLine,

    #[error("malformed request target '{0}'")]
    Target(String),

    #[error("unsupported HTTP version '{0}'")]
    Version(String),

    #[error("malformed header line")]
    HeaderLine,

    #[error("request line or header exceeds {0} bytes")]
    LineTooLong(usize),

    #[error("request carries more than {0} headers")]
    TooManyHeaders(usize),

    #[error("request is not valid UTF-8")]
    Encoding,

    #[error("connection ended before the end of the request headers")]
    Incomplete,

    #[error("timed out waiting for request headers")]
    Timeout,

    #[error("failed to read request: {0}")]
    Io(#[from] std::io::Error),
}

/// Request method. Only GET is forwarded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Method {
    Get,
    Other(String),
}

impl Method {
    fn parse(token: &str) -> Self {
        if token == "GET" {
            Method::Get
        } else {
            Method::Other(token.to_string())
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Method::Get => "GET",
            Method::Other(m) => m,
        }
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Protocol version announced by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Version {
    Http10,
    Http11,
}

/// Where the request is headed, as far as the target alone tells us.
///
/// Origin-form targets (`/path`) carry no host; the `Host` header fills it in later.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestTarget {
    pub host: Option<String>,
    pub port: Option<String>,
    pub path: String,
}

/// A parsed `METHOD SP TARGET SP VERSION` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestLine {
    pub method: Method,
    pub target: RequestTarget,
    pub version: Version,
}

/// A header exactly as received: name and value text are never rewritten.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub name: String,
    pub value: String,
}

impl Header {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    /// Case-insensitive header name comparison.
    pub fn is(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }
}

/// Classification of a single line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Line {
    Request(RequestLine),
    Header(Header),
    /// End of the header block.
    Blank,
}

/// Classify one line of the request head.
///
/// `expect_request_line` is true only for the first line of a request.
/// A trailing `\r\n` or `\n` is ignored if present.
pub fn parse_line(line: &str, expect_request_line: bool) -> Result<Line, ParseError> {
    let line = strip_terminator(line);
    if line.is_empty() {
        return Ok(Line::Blank);
    }
    if expect_request_line {
        parse_request_line(line).map(Line::Request)
    } else {
        parse_header_line(line).map(Line::Header)
    }
}

fn strip_terminator(line: &str) -> &str {
    match line.strip_suffix('\n') {
        Some(rest) => rest.strip_suffix('\r').unwrap_or(rest),
        None => line,
    }
}

fn parse_request_line(line: &str) -> Result<RequestLine, ParseError> {
    let mut tokens = line.split_ascii_whitespace();
    let (method, target, version) = match (tokens.next(), tokens.next(), tokens.next(), tokens.next()) {
        (Some(m), Some(t), Some(v), None) => (m, t, v),
        _ => return Err(ParseError::RequestLine),
    };

    let version = match version {
        "HTTP/1.0" => Version::Http10,
        "HTTP/1.1" => Version::Http11,
        other => return Err(ParseError::Version(other.to_string())),
    };

    Ok(RequestLine {
        method: Method::parse(method),
        target: parse_target(target)?,
        version,
    })
}

/// Split a request target into host, port and path.
pub fn parse_target(target: &str) -> Result<RequestTarget, ParseError> {
    if target.starts_with('/') {
        return Ok(RequestTarget {
            host: None,
            port: None,
            path: target.to_string(),
        });
    }

    let url = Url::parse(target).map_err(|_| ParseError::Target(target.to_string()))?;
    if url.scheme() != "http" {
        return Err(ParseError::Target(target.to_string()));
    }
    let host = match url.host_str() {
        Some(h) if !h.is_empty() => h.to_string(),
        _ => return Err(ParseError::Target(target.to_string())),
    };

    Ok(RequestTarget {
        host: Some(host),
        port: url.port().map(|p| p.to_string()),
        path: raw_path(target),
    })
}

/// The path and query exactly as the client wrote them, minus any fragment.
///
/// `Url` normalizes dot-segments and percent-encoding, so the path is sliced
/// from the raw target instead.
fn raw_path(target: &str) -> String {
    let rest = target.split_once("://").map_or(target, |(_, rest)| rest);
    let after_authority = rest.find(['/', '?', '#']).map_or("", |at| &rest[at..]);
    let path = after_authority.split('#').next().unwrap_or("");
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{}", path)
    }
}

/// Parse a `Host` header value into host and optional port.
///
/// Returns `None` for anything that is not a bare authority.
pub fn parse_authority(value: &str) -> Option<(String, Option<String>)> {
    let value = value.trim();
    if value.is_empty() || value.contains(['/', '?', '#', '@']) {
        return None;
    }
    let url = Url::parse(&format!("http://{}", value)).ok()?;
    let host = url.host_str().filter(|h| !h.is_empty())?.to_string();
    Some((host, url.port().map(|p| p.to_string())))
}

fn parse_header_line(line: &str) -> Result<Header, ParseError> {
    let (name, value) = line.split_once(':').ok_or(ParseError::HeaderLine)?;
    if name.is_empty() || name.bytes().any(|b| b.is_ascii_whitespace() || b.is_ascii_control()) {
        return Err(ParseError::HeaderLine);
    }
    let value = value.trim_start_matches([' ', '\t']);
    if value.bytes().any(|b| b.is_ascii_control() && b != b'\t') {
        return Err(ParseError::HeaderLine);
    }
    Ok(Header::new(name, value))
}
