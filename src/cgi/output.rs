use crate::http::parser::{find_bytes, split_header_line};
use crate::http::response::{Response, ResponseBuilder, StatusCode};

const DEFAULT_CONTENT_TYPE: &str = "text/html";

/// Script stdout split into its header block and body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessResult {
    /// Headers printed by the script, in order, `Content-Type` and `Status` excluded
    pub headers: Vec<(String, String)>,
    pub content_type: String,
    /// Code from a `Status:` header, if the script sent one
    pub status: Option<u16>,
    pub body: Vec<u8>,
}

impl ProcessResult {
    /// Splits raw output at the first blank line.
    ///
    /// Both `\r\n\r\n` and `\n\n` count as the separator, whichever comes
    /// first. When there is no separator, or the text before it is not a
    /// header block, the whole output is the body.
    pub fn from_output(raw: Vec<u8>) -> Self {
        let mut result = ProcessResult {
            headers: Vec::new(),
            content_type: DEFAULT_CONTENT_TYPE.to_string(),
            status: None,
            body: Vec::new(),
        };

        let Some((head_end, body_start)) = header_boundary(&raw) else {
            result.body = raw;
            return result;
        };

        let head = String::from_utf8_lossy(&raw[..head_end]);
        let Some(parsed) = parse_header_block(&head) else {
            result.body = raw;
            return result;
        };

        for (key, value) in parsed {
            if key.eq_ignore_ascii_case("Content-Type") {
                result.content_type = value;
            } else if key.eq_ignore_ascii_case("Status") {
                result.status = value
                    .split_whitespace()
                    .next()
                    .and_then(|code| code.parse().ok());
            } else {
                result.headers.push((key, value));
            }
        }
        result.body = raw[body_start..].to_vec();
        result
    }

    pub fn into_response(self) -> Response {
        let status = match self.status {
            None => StatusCode::Ok,
            Some(code) => StatusCode::from_u16(code).unwrap_or_else(|| {
                tracing::warn!(code, "script sent an unsupported status, answering 502");
                StatusCode::BadGateway
            }),
        };

        let mut builder = ResponseBuilder::new(status);
        for (key, value) in self.headers {
            // Framing headers belong to the server.
            if key.eq_ignore_ascii_case("Content-Length") || key.eq_ignore_ascii_case("Connection")
            {
                continue;
            }
            builder = builder.header(key, value);
        }
        builder
            .header("Content-Type", self.content_type)
            .body(self.body)
            .build()
    }
}

/// End of the header block and start of the body, if a blank line exists.
fn header_boundary(raw: &[u8]) -> Option<(usize, usize)> {
    let crlf = find_bytes(raw, b"\r\n\r\n", 0).map(|p| (p, p + 4));
    let lf = find_bytes(raw, b"\n\n", 0).map(|p| (p, p + 2));
    match (crlf, lf) {
        (Some(a), Some(b)) => Some(if a.0 <= b.0 { a } else { b }),
        (a, b) => a.or(b),
    }
}

/// Every non-empty line must be `Name: value` with a space-free name.
fn parse_header_block(head: &str) -> Option<Vec<(String, String)>> {
    head.lines()
        .map(|line| line.trim_end_matches('\r'))
        .filter(|line| !line.is_empty())
        .map(|line| {
            let (key, value) = split_header_line(line)?;
            if key.contains(char::is_whitespace) {
                return None;
            }
            Some((key.to_string(), value.to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crlf_header_block() {
        let out = ProcessResult::from_output(
            b"Content-Type: text/plain\r\nX-Trace: 1\r\n\r\nhello".to_vec(),
        );
        assert_eq!(out.content_type, "text/plain");
        assert_eq!(out.headers, vec![("X-Trace".to_string(), "1".to_string())]);
        assert_eq!(out.body, b"hello");
    }

    #[test]
    fn lf_only_header_block() {
        let out = ProcessResult::from_output(b"Content-Type: text/html\n\n<p>hi</p>\n".to_vec());
        assert_eq!(out.content_type, "text/html");
        assert_eq!(out.body, b"<p>hi</p>\n");
    }

    #[test]
    fn no_separator_is_all_body() {
        let out = ProcessResult::from_output(b"just text".to_vec());
        assert_eq!(out.content_type, DEFAULT_CONTENT_TYPE);
        assert!(out.headers.is_empty());
        assert_eq!(out.body, b"just text");
    }

    #[test]
    fn html_before_blank_line_is_not_headers() {
        let raw = b"<html>\n\n<body>x</body></html>".to_vec();
        let out = ProcessResult::from_output(raw.clone());
        assert_eq!(out.body, raw);
    }

    #[test]
    fn status_header_sets_response_status() {
        let out = ProcessResult::from_output(b"Status: 404 Not Found\r\n\r\nmissing".to_vec());
        assert_eq!(out.status, Some(404));
        let resp = out.into_response();
        assert_eq!(resp.status, StatusCode::NotFound);
        assert_eq!(resp.header("Content-Length"), Some("7"));
    }
}
