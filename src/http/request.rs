//! Request head reading.
//!
//! # Responsibilities
//! - Pull `\n`-terminated lines from the client with a hard length bound
//! - Feed them to the line parser and accumulate a `ParsedRequest`
//! - Resolve origin-form targets against the `Host` header
//!
//! # Design Decisions
//! - Lines longer than the configured bound fail closed (400), they are never
//!   truncated and forwarded
//! - Header order and text are preserved exactly as received
//! - A connection that closes before the blank line is an incomplete request

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};

use crate::config::LimitsConfig;
use crate::http::parser::{parse_authority, parse_line, Header, Line, Method, ParseError, Version};

/// Bounds applied while reading a request head.
#[derive(Debug, Clone, Copy)]
pub struct ReadLimits {
    pub max_line_length: usize,
    pub max_headers: usize,
}

impl From<&LimitsConfig> for ReadLimits {
    fn from(limits: &LimitsConfig) -> Self {
        Self {
            max_line_length: limits.max_line_length,
            max_headers: limits.max_headers,
        }
    }
}

impl Default for ReadLimits {
    fn default() -> Self {
        Self::from(&LimitsConfig::default())
    }
}

/// A request line plus its headers, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedRequest {
    pub method: Method,
    pub version: Version,
    pub path: String,
    /// Origin host from the target, or from `Host` for origin-form targets.
    pub host: Option<String>,
    /// Explicit port, if any. Defaulting happens during normalization.
    pub port: Option<String>,
    pub headers: Vec<Header>,
}

/// Read and parse a complete request head from the client.
pub async fn read_request<R>(reader: &mut R, limits: ReadLimits) -> Result<ParsedRequest, ParseError>
where
    R: AsyncBufRead + Unpin,
{
    let mut buf = Vec::with_capacity(256);

    if !read_line(reader, limits.max_line_length, &mut buf).await? {
        return Err(ParseError::Incomplete);
    }
    let request_line = match parse_line(as_str(&buf)?, true)? {
        Line::Request(r) => r,
        _ => return Err(ParseError::RequestLine),
    };

    let mut headers = Vec::new();
    loop {
        if !read_line(reader, limits.max_line_length, &mut buf).await? {
            return Err(ParseError::Incomplete);
        }
        match parse_line(as_str(&buf)?, false)? {
            Line::Blank => break,
            Line::Header(header) => {
                if headers.len() == limits.max_headers {
                    return Err(ParseError::TooManyHeaders(limits.max_headers));
                }
                headers.push(header);
            }
            Line::Request(_) => return Err(ParseError::HeaderLine),
        }
    }

    let target = request_line.target;
    let (host, port) = match target.host {
        Some(host) => (Some(host), target.port),
        None => match headers.iter().find(|h| h.is("Host")).and_then(|h| parse_authority(&h.value)) {
            Some((host, port)) => (Some(host), port),
            None => (None, None),
        },
    };

    Ok(ParsedRequest {
        method: request_line.method,
        version: request_line.version,
        path: target.path,
        host,
        port,
        headers,
    })
}

/// Read one line into `buf`. Returns `false` on a clean end of stream.
async fn read_line<R>(reader: &mut R, max: usize, buf: &mut Vec<u8>) -> Result<bool, ParseError>
where
    R: AsyncBufRead + Unpin,
{
    buf.clear();
    let n = (&mut *reader).take(max as u64).read_until(b'\n', buf).await?;
    if n == 0 {
        return Ok(false);
    }
    if buf.last() != Some(&b'\n') {
        return Err(if n >= max {
            ParseError::LineTooLong(max)
        } else {
            ParseError::Incomplete
        });
    }
    Ok(true)
}

fn as_str(buf: &[u8]) -> Result<&str, ParseError> {
    std::str::from_utf8(buf).map_err(|_| ParseError::Encoding)
}
