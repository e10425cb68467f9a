use std::io::{self, Write};

use bytes::{Buf, BytesMut};

use crate::http::response::Response;

const HTTP_VERSION: &str = "HTTP/1.1";

pub fn serialize_response(resp: &Response) -> Vec<u8> {
    let mut buf = serialize_head(resp);
    buf.extend_from_slice(&resp.body);
    buf
}

/// Status line and headers only, as sent for HEAD requests.
pub fn serialize_head(resp: &Response) -> Vec<u8> {
    let mut buf = Vec::with_capacity(128 + resp.body.len());

    // Status line
    let status_line = format!(
        "{} {} {}\r\n",
        HTTP_VERSION,
        resp.status.as_u16(),
        resp.status.reason_phrase()
    );
    buf.extend_from_slice(status_line.as_bytes());

    // Headers
    for (k, v) in &resp.headers {
        buf.extend_from_slice(k.as_bytes());
        buf.extend_from_slice(b": ");
        buf.extend_from_slice(v.as_bytes());
        buf.extend_from_slice(b"\r\n");
    }

    // Header/body separator
    buf.extend_from_slice(b"\r\n");

    buf
}

/// Outcome of pushing buffered bytes into a non-blocking sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushStatus {
    /// Everything buffered was written
    Drained,
    /// The sink stopped accepting bytes; the rest stays buffered
    WouldBlock,
}

/// Writes as much of `buf` as `sink` accepts without blocking.
///
/// Written bytes are removed from the front of `buf`, so calling this again
/// after the next writable event resumes exactly where it stopped.
pub fn flush_to<W: Write>(buf: &mut BytesMut, sink: &mut W) -> io::Result<FlushStatus> {
    while !buf.is_empty() {
        match sink.write(&buf[..]) {
            Ok(0) => {
                return Err(io::Error::new(
                    io::ErrorKind::WriteZero,
                    "connection closed while writing",
                ));
            }
            Ok(n) => buf.advance(n),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                return Ok(FlushStatus::WouldBlock);
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }

    Ok(FlushStatus::Drained)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::response::{ResponseBuilder, StatusCode};

    /// Accepts at most `chunk` bytes per call, then blocks once `budget` is spent.
    struct Trickle {
        out: Vec<u8>,
        chunk: usize,
        budget: usize,
    }

    impl Write for Trickle {
        fn write(&mut self, data: &[u8]) -> io::Result<usize> {
            if self.budget == 0 {
                return Err(io::ErrorKind::WouldBlock.into());
            }
            let n = data.len().min(self.chunk).min(self.budget);
            self.out.extend_from_slice(&data[..n]);
            self.budget -= n;
            Ok(n)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn status_line_and_headers() {
        let resp = ResponseBuilder::new(StatusCode::NotFound)
            .header("Content-Type", "text/plain")
            .body(b"nope".to_vec())
            .build();
        let bytes = serialize_response(&resp);
        assert_eq!(
            bytes,
            b"HTTP/1.1 404 Not Found\r\nContent-Length: 4\r\nContent-Type: text/plain\r\n\r\nnope"
        );
    }

    #[test]
    fn flush_resumes_after_would_block() {
        let mut buf = BytesMut::from(&b"0123456789"[..]);
        let mut sink = Trickle {
            out: Vec::new(),
            chunk: 3,
            budget: 4,
        };

        assert_eq!(flush_to(&mut buf, &mut sink).unwrap(), FlushStatus::WouldBlock);
        assert_eq!(&buf[..], b"456789");

        sink.budget = usize::MAX;
        assert_eq!(flush_to(&mut buf, &mut sink).unwrap(), FlushStatus::Drained);
        assert_eq!(sink.out, b"0123456789");
        assert!(buf.is_empty());
    }

    #[test]
    fn zero_length_write_is_an_error() {
        let mut buf = BytesMut::from(&b"x"[..]);
        let mut sink: &mut [u8] = &mut [];
        let err = flush_to(&mut buf, &mut sink).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::WriteZero);
    }
}
