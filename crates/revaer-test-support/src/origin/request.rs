//! Incremental HTTP/1.x request parsing and `Range` interpretation.

use thiserror::Error;

/// Largest request (head plus body) the origin double buffers.
pub const MAX_REQUEST_SIZE: usize = 10_000;

const HEAD_TERMINATOR: &[u8] = b"\r\n\r\n";

/// Reasons a buffered request cannot be parsed.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RequestError {
    /// The head is not valid HTTP.
    #[error("malformed request")]
    Malformed {
        /// Static reason describing the violation.
        reason: &'static str,
    },
    /// The request does not fit the receive buffer.
    #[error("request exceeds buffer")]
    TooLarge,
}

/// Parsed request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// Method token as sent.
    pub method: String,
    /// Request target, query string included.
    pub target: String,
    /// Header fields in arrival order.
    pub headers: Vec<(String, String)>,
    /// Body as delimited by `Content-Length`.
    pub body: Vec<u8>,
}

impl Request {
    /// First header named `name`, compared case-insensitively.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(field, _)| field.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Target without its query string.
    #[must_use]
    pub fn path(&self) -> &str {
        self.target
            .split_once('?')
            .map_or(self.target.as_str(), |(path, _)| path)
    }

    /// Whether the origin double answers this method.
    #[must_use]
    pub fn is_supported_method(&self) -> bool {
        matches!(self.method.as_str(), "GET" | "POST")
    }
}

/// Result of feeding the receive buffer to [`parse_request`].
#[derive(Debug, PartialEq, Eq)]
pub enum ParseStatus {
    /// More bytes are needed.
    Incomplete,
    /// A full request is buffered.
    Complete(Request),
}

/// Try to parse a request from everything received so far.
///
/// # Errors
///
/// Returns [`RequestError::Malformed`] for an unparsable head and
/// [`RequestError::TooLarge`] once the buffer is full without a complete
/// request.
pub fn parse_request(buffer: &[u8]) -> Result<ParseStatus, RequestError> {
    let Some(head_len) = buffer
        .windows(HEAD_TERMINATOR.len())
        .position(|window| window == HEAD_TERMINATOR)
    else {
        return incomplete(buffer.len());
    };

    let head = std::str::from_utf8(&buffer[..head_len]).map_err(|_| RequestError::Malformed {
        reason: "request head is not utf-8",
    })?;
    let mut lines = head.split("\r\n");
    let request_line = lines.next().unwrap_or_default();
    let mut parts = request_line.split_ascii_whitespace();
    let (Some(method), Some(target), Some(version)) = (parts.next(), parts.next(), parts.next())
    else {
        return Err(RequestError::Malformed {
            reason: "request line needs method, target and version",
        });
    };
    if !version.starts_with("HTTP/") {
        return Err(RequestError::Malformed {
            reason: "unknown protocol version",
        });
    }

    let mut headers = Vec::new();
    for line in lines {
        let (name, value) = line.split_once(':').ok_or(RequestError::Malformed {
            reason: "header line without colon",
        })?;
        headers.push((name.trim().to_string(), value.trim().to_string()));
    }

    let mut request = Request {
        method: method.to_string(),
        target: target.to_string(),
        headers,
        body: Vec::new(),
    };

    let body_len = match request.header("content-length") {
        Some(value) => value.parse::<usize>().map_err(|_| RequestError::Malformed {
            reason: "content-length is not a number",
        })?,
        None => 0,
    };
    let body_start = head_len + HEAD_TERMINATOR.len();
    let body_end = body_start
        .checked_add(body_len)
        .filter(|end| *end <= MAX_REQUEST_SIZE)
        .ok_or(RequestError::TooLarge)?;
    let Some(body) = buffer.get(body_start..body_end) else {
        return Ok(ParseStatus::Incomplete);
    };
    request.body = body.to_vec();
    Ok(ParseStatus::Complete(request))
}

fn incomplete(buffered: usize) -> Result<ParseStatus, RequestError> {
    if buffered >= MAX_REQUEST_SIZE {
        Err(RequestError::TooLarge)
    } else {
        Ok(ParseStatus::Incomplete)
    }
}

/// Inclusive byte span of a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    /// First byte served.
    pub start: u64,
    /// Last byte served.
    pub end: u64,
}

impl ByteRange {
    /// Number of bytes covered.
    #[must_use]
    pub const fn byte_count(self) -> u64 {
        self.end - self.start + 1
    }
}

/// Interpretation of a `Range` header against a file length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeRequest {
    /// No usable single `bytes` range; serve the whole file.
    Ignored,
    /// Serve the given span.
    Span(ByteRange),
    /// The range lies outside the file.
    Unsatisfiable,
}

/// Interpret a `Range` header value for a file of `len` bytes.
///
/// `bytes=a-b`, `bytes=a-` and `bytes=-n` are accepted. An end past the file
/// is clamped; a start past the file or after the end is unsatisfiable.
/// Anything else, multi-range requests included, is ignored.
#[must_use]
pub fn parse_range(value: &str, len: u64) -> RangeRequest {
    let Some(spec) = value.trim().strip_prefix("bytes=") else {
        return RangeRequest::Ignored;
    };
    let Some((first, last)) = spec.trim().split_once('-') else {
        return RangeRequest::Ignored;
    };
    let first = first.trim();
    let last = last.trim();

    let bounds = match (first.is_empty(), last.is_empty()) {
        (false, false) => first.parse::<u64>().ok().zip(last.parse::<u64>().ok()),
        (false, true) => first.parse::<u64>().ok().map(|start| (start, u64::MAX)),
        (true, false) => match last.parse::<u64>() {
            Ok(0) => return RangeRequest::Unsatisfiable,
            Ok(suffix) => Some((len.saturating_sub(suffix), u64::MAX)),
            Err(_) => None,
        },
        (true, true) => None,
    };
    let Some((start, end)) = bounds else {
        return RangeRequest::Ignored;
    };

    if start >= len || start > end {
        return RangeRequest::Unsatisfiable;
    }
    RangeRequest::Span(ByteRange {
        start,
        end: end.min(len - 1),
    })
}
