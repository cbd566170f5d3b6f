//! Synthesized error responses.
//!
//! # Responsibilities
//! - Build the HTML error page sent when a request is refused
//! - Keep `Content-Length` equal to the body's byte length
//!
//! # Design Decisions
//! - Error pages go to the client only, never to the origin
//! - Origin responses are never touched; they are relayed verbatim

/// An error page sent in place of an origin response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorResponse {
    pub status: u16,
    pub reason: &'static str,
    pub detail: &'static str,
}

impl ErrorResponse {
    /// Unparsable request line or headers.
    pub const BAD_REQUEST: Self = Self {
        status: 400,
        reason: "Bad Request",
        detail: "malformed request",
    };

    /// Any method other than GET.
    pub const NOT_IMPLEMENTED: Self = Self {
        status: 501,
        reason: "Not Implemented",
        detail: "method not supported",
    };

    /// The origin could not be resolved or connected to.
    pub const SERVICE_UNAVAILABLE: Self = Self {
        status: 503,
        reason: "Service Unavailable",
        detail: "could not reach origin",
    };

    pub fn body(&self) -> String {
        format!(
            "<html><head><title>{code} {reason}</title></head>\r\n\
             <body><h1>{code}: {reason}</h1><p>{detail}</p></body></html>\r\n",
            code = self.status,
            reason = self.reason,
            detail = self.detail,
        )
    }

    /// Full HTTP/1.0 response: status line, headers, blank line, body.
    pub fn to_bytes(&self) -> Vec<u8> {
        let body = self.body();
        format!(
            "HTTP/1.0 {} {}\r\nContent-Type: text/html\r\nContent-Length: {}\r\n\r\n{}",
            self.status,
            self.reason,
            body.len(),
            body
        )
        .into_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn split(bytes: &[u8]) -> (String, String) {
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        let (head, body) = text.split_once("\r\n\r\n").unwrap();
        (head.to_string(), body.to_string())
    }

    #[test]
    fn content_length_matches_body() {
        for resp in [
            ErrorResponse::BAD_REQUEST,
            ErrorResponse::NOT_IMPLEMENTED,
            ErrorResponse::SERVICE_UNAVAILABLE,
        ] {
            let (head, body) = split(&resp.to_bytes());
            let length: usize = head
                .lines()
                .find_map(|l| l.strip_prefix("Content-Length: "))
                .unwrap()
                .parse()
                .unwrap();
            assert_eq!(length, body.len());
        }
    }

    #[test]
    fn status_line_and_body() {
        let (head, body) = split(&ErrorResponse::NOT_IMPLEMENTED.to_bytes());
        assert!(head.starts_with("HTTP/1.0 501 Not Implemented\r\n"));
        assert!(head.contains("Content-Type: text/html"));
        assert!(body.contains("<h1>501: Not Implemented</h1><p>method not supported</p>"));
    }

    #[test]
    fn service_unavailable_text() {
        let (head, body) = split(&ErrorResponse::SERVICE_UNAVAILABLE.to_bytes());
        assert!(head.starts_with("HTTP/1.0 503 Service Unavailable\r\n"));
        assert!(body.contains("<h1>503: Service Unavailable</h1><p>could not reach origin</p>"));
    }
}
