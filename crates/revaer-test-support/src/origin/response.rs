//! HTTP/1.0 response assembly.

use std::fmt::Write as _;

/// Statuses the origin double emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Whole file served.
    Ok,
    /// Byte range served.
    Partial,
    /// Redirect.
    MovedPermanently,
    /// No such file.
    NotFound,
    /// Range outside the file.
    RangeNotSatisfiable,
    /// File could not be read or is too large.
    InternalError,
}

impl Status {
    /// Numeric status code.
    #[must_use]
    pub const fn code(self) -> u16 {
        match self {
            Self::Ok => 200,
            Self::Partial => 206,
            Self::MovedPermanently => 301,
            Self::NotFound => 404,
            Self::RangeNotSatisfiable => 416,
            Self::InternalError => 503,
        }
    }

    /// Reason phrase written on the status line.
    #[must_use]
    pub const fn reason(self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::Partial => "Partial",
            Self::MovedPermanently => "Moved Permanently",
            Self::NotFound => "Not Found",
            Self::RangeNotSatisfiable => "Requested Range Not Satisfiable",
            Self::InternalError => "Internal Error",
        }
    }
}

/// Response to one request; always closes the connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// Status line.
    pub status: Status,
    /// Headers written after `content-length` and `connection`.
    pub headers: Vec<(&'static str, String)>,
    /// Payload.
    pub body: Vec<u8>,
}

impl Response {
    /// Empty-bodied response.
    #[must_use]
    pub const fn new(status: Status) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    /// Redirect to `location`.
    #[must_use]
    pub fn redirect(location: &str) -> Self {
        Self::new(Status::MovedPermanently).with_header("Location", location)
    }

    /// Append a header.
    #[must_use]
    pub fn with_header(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.headers.push((name, value.into()));
        self
    }

    /// Replace the body.
    #[must_use]
    pub fn with_body(mut self, body: Vec<u8>) -> Self {
        self.body = body;
        self
    }

    /// First header named `name`, compared case-insensitively.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(field, _)| field.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Status line and headers, terminated by the blank line.
    #[must_use]
    pub fn head(&self) -> String {
        let mut head = format!(
            "HTTP/1.0 {} {}\r\ncontent-length: {}\r\nconnection: close\r\n",
            self.status.code(),
            self.status.reason(),
            self.body.len()
        );
        for (name, value) in &self.headers {
            let _ = write!(head, "{name}: {value}\r\n");
        }
        head.push_str("\r\n");
        head
    }

    /// Head followed by body, ready for the socket.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = self.head().into_bytes();
        bytes.extend_from_slice(&self.body);
        bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn head_lists_fixed_headers_first() {
        let response = Response::new(Status::Partial)
            .with_header("Content-Encoding", "gzip")
            .with_body(b"abc".to_vec());
        assert_eq!(
            response.head(),
            "HTTP/1.0 206 Partial\r\ncontent-length: 3\r\nconnection: close\r\n\
             Content-Encoding: gzip\r\n\r\n"
        );
        assert!(response.to_bytes().ends_with(b"\r\n\r\nabc"));
    }

    #[test]
    fn redirect_carries_location() {
        let response = Response::redirect("/test_file");
        assert_eq!(response.status.code(), 301);
        assert_eq!(response.header("location"), Some("/test_file"));
        assert!(response.head().starts_with("HTTP/1.0 301 Moved Permanently\r\n"));
    }

    #[test]
    fn reasons_match_status_codes() {
        let cases = [
            (Status::Ok, 200, "OK"),
            (Status::NotFound, 404, "Not Found"),
            (Status::InternalError, 503, "Internal Error"),
            (Status::RangeNotSatisfiable, 416, "Requested Range Not Satisfiable"),
        ];
        for (status, code, reason) in cases {
            assert_eq!(status.code(), code);
            assert_eq!(status.reason(), reason);
        }
    }
}
