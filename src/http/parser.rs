use crate::http::multipart;
use crate::http::request::{Method, Request, parse_query};
use std::collections::HashMap;
use std::fmt;

pub const DEFAULT_MAX_HEADER_SIZE: usize = 8 * 1024;
pub const DEFAULT_MAX_BODY_SIZE: usize = 1024 * 1024;

/// Upper bounds applied while parsing one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseLimits {
    /// Request line plus header block, terminator included
    pub max_header_size: usize,
    /// Largest accepted `Content-Length`
    pub max_body_size: usize,
}

impl Default for ParseLimits {
    fn default() -> Self {
        Self {
            max_header_size: DEFAULT_MAX_HEADER_SIZE,
            max_body_size: DEFAULT_MAX_BODY_SIZE,
        }
    }
}

/// Why a buffer could not be turned into a request.
///
/// `Incomplete` is not a failure: the caller keeps the buffer and retries
/// once more bytes arrive. Every other variant is final.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    InvalidRequest,
    InvalidHeader,
    InvalidContentLength,
    InvalidMultipart,
    HeadersTooLarge,
    PayloadTooLarge,
    Incomplete,
}

impl ParseError {
    pub fn is_incomplete(&self) -> bool {
        matches!(self, ParseError::Incomplete)
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            ParseError::InvalidRequest => "malformed request line",
            ParseError::InvalidHeader => "malformed header line",
            ParseError::InvalidContentLength => "invalid Content-Length",
            ParseError::InvalidMultipart => "malformed multipart body",
            ParseError::HeadersTooLarge => "header block too large",
            ParseError::PayloadTooLarge => "request body too large",
            ParseError::Incomplete => "incomplete request",
        };
        f.write_str(msg)
    }
}

impl std::error::Error for ParseError {}

/// Parses one request from the front of `buf` with default limits.
///
/// On success returns the request and the number of bytes it occupied, so a
/// pipelined buffer can be advanced request by request.
pub fn parse_http_request(buf: &[u8]) -> Result<(Request, usize), ParseError> {
    parse_http_request_with_limits(buf, &ParseLimits::default())
}

pub fn parse_http_request_with_limits(
    buf: &[u8],
    limits: &ParseLimits,
) -> Result<(Request, usize), ParseError> {
    // Request line
    let line_end = match find_bytes(buf, b"\r\n", 0) {
        Some(end) => end,
        None => return Err(incomplete_headers(buf, limits)),
    };
    let request_line =
        std::str::from_utf8(&buf[..line_end]).map_err(|_| ParseError::InvalidRequest)?;
    let (method, target, version) = split_request_line(request_line)?;

    // Headers
    let mut headers = HashMap::new();
    let mut offset = line_end + 2;
    loop {
        let next_end = match find_bytes(buf, b"\r\n", offset) {
            Some(end) => end,
            None => return Err(incomplete_headers(buf, limits)),
        };
        if next_end == offset {
            offset += 2;
            break;
        }

        let line = std::str::from_utf8(&buf[offset..next_end])
            .map_err(|_| ParseError::InvalidHeader)?;
        let (key, value) = split_header_line(line).ok_or(ParseError::InvalidHeader)?;
        headers.insert(key.to_ascii_lowercase(), value.to_string());
        offset = next_end + 2;
    }

    if offset > limits.max_header_size {
        return Err(ParseError::HeadersTooLarge);
    }

    // Body
    let content_length = declared_content_length(&headers)?;
    if content_length > limits.max_body_size {
        return Err(ParseError::PayloadTooLarge);
    }

    let total_consumed = offset + content_length;
    if buf.len() < total_consumed {
        return Err(ParseError::Incomplete);
    }
    let body = buf[offset..total_consumed].to_vec();

    let (path, query_string) = match target.split_once('?') {
        Some((path, query)) => (path, query),
        None => (target, ""),
    };

    let mut request = Request {
        method: Method::parse(method),
        path: path.to_string(),
        query_string: query_string.to_string(),
        query_params: parse_query(query_string),
        version: version.to_string(),
        headers,
        body,
        form_fields: HashMap::new(),
        uploaded_files: Vec::new(),
    };

    if let Some(content_type) = request.header("Content-Type") {
        if multipart::is_multipart(content_type) {
            let boundary =
                multipart::boundary(content_type).ok_or(ParseError::InvalidMultipart)?;
            let form = multipart::parse_multipart(&request.body, &boundary)?;
            request.form_fields = form.fields;
            request.uploaded_files = form.files;
        }
    }

    Ok((request, total_consumed))
}

/// Splits a request line into method, target and version.
///
/// A missing version is read as HTTP/1.0, the way pre-1.0 style
/// `GET /path` lines were answered historically.
fn split_request_line(line: &str) -> Result<(&str, &str, &str), ParseError> {
    let (method, rest) = line.split_once(' ').ok_or(ParseError::InvalidRequest)?;
    let (target, version) = rest.split_once(' ').unwrap_or((rest, "HTTP/1.0"));

    if method.is_empty() || target.is_empty() {
        return Err(ParseError::InvalidRequest);
    }

    Ok((method, target, version))
}

/// Splits `Key: value` on the first colon, trimming both sides.
pub(crate) fn split_header_line(line: &str) -> Option<(&str, &str)> {
    let (key, value) = line.split_once(':')?;
    let key = key.trim();
    if key.is_empty() {
        return None;
    }
    Some((key, value.trim()))
}

fn declared_content_length(headers: &HashMap<String, String>) -> Result<usize, ParseError> {
    match headers.get("content-length") {
        None => Ok(0),
        Some(value) => {
            let declared: i64 = value
                .trim()
                .parse()
                .map_err(|_| ParseError::InvalidContentLength)?;
            usize::try_from(declared.max(0)).map_err(|_| ParseError::InvalidContentLength)
        }
    }
}

fn incomplete_headers(buf: &[u8], limits: &ParseLimits) -> ParseError {
    if buf.len() > limits.max_header_size {
        ParseError::HeadersTooLarge
    } else {
        ParseError::Incomplete
    }
}

/// Position of the first `needle` in `haystack` at or after `from`.
pub(crate) fn find_bytes(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if needle.is_empty() || from >= haystack.len() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|p| p + from)
}
