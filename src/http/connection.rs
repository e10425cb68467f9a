use std::io::{self, Read, Write};
use std::net::SocketAddr;

use bytes::{Buf, BytesMut};
use tracing::{debug, info, warn};

use crate::config::ServerConfig;
use crate::handler::{Handler, error_response, match_route};
use crate::http::SERVER_SOFTWARE;
use crate::http::parser::{ParseError, parse_http_request_with_limits};
use crate::http::request::{Method, Request};
use crate::http::response::{Response, StatusCode};
use crate::http::writer::{FlushStatus, flush_to, serialize_head, serialize_response};

const READ_CHUNK: usize = 4096;

/// What the reactor should do with a connection after an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    KeepOpen,
    Close,
}

/// One client connection on a non-blocking stream.
///
/// Bytes read are accumulated in `inbound` until they parse into complete
/// requests. A serialized response waits in `outbound` until the socket
/// takes it, and the next buffered request is not answered before then.
/// Nothing here blocks: every read and write stops at `WouldBlock`.
pub struct Connection<S> {
    stream: S,
    /// Index of the virtual server whose listener accepted this connection
    server: usize,
    peer: Option<SocketAddr>,
    inbound: BytesMut,
    outbound: BytesMut,
    /// Set once a response that ends the connection has been queued
    close_after_flush: bool,
    /// The peer shut down its sending side
    peer_closed: bool,
}

impl<S: Read + Write> Connection<S> {
    pub fn new(stream: S, server: usize, peer: Option<SocketAddr>) -> Self {
        Self {
            stream,
            server,
            peer,
            inbound: BytesMut::with_capacity(READ_CHUNK),
            outbound: BytesMut::new(),
            close_after_flush: false,
            peer_closed: false,
        }
    }

    pub fn server(&self) -> usize {
        self.server
    }

    pub fn peer(&self) -> Option<SocketAddr> {
        self.peer
    }

    /// Bytes received but not yet part of a complete request.
    pub fn buffered_input(&self) -> usize {
        self.inbound.len()
    }

    /// Response bytes the socket has not accepted yet.
    pub fn pending_output(&self) -> usize {
        self.outbound.len()
    }

    /// True while responses are waiting for write readiness.
    pub fn wants_write(&self) -> bool {
        !self.outbound.is_empty()
    }

    /// Reads what the peer sent and answers it.
    ///
    /// While an answer is still waiting for the socket nothing new is read:
    /// the pending output is flushed and the reactor should wait for write
    /// readiness instead.
    pub fn on_readable(&mut self, server: &ServerConfig, handler: &dyn Handler) -> Step {
        if !self.wants_write() {
            match self.fill_inbound() {
                Ok(true) => self.peer_closed = true,
                Ok(false) => {}
                Err(e) => {
                    warn!(peer = ?self.peer, error = %e, "read failed");
                    return Step::Close;
                }
            }
        }
        self.advance(server, handler)
    }

    /// Resumes after write readiness: finishes the pending answer, then
    /// moves on to requests that were left buffered behind it.
    pub fn on_writable(&mut self, server: &ServerConfig, handler: &dyn Handler) -> Step {
        self.advance(server, handler)
    }

    /// Alternates between flushing and answering the next buffered request,
    /// so at most one answer is ever queued. The close decision is only
    /// acted on once the queue is empty.
    fn advance(&mut self, server: &ServerConfig, handler: &dyn Handler) -> Step {
        loop {
            match flush_to(&mut self.outbound, &mut self.stream) {
                Ok(FlushStatus::WouldBlock) => return Step::KeepOpen,
                Ok(FlushStatus::Drained) => {}
                Err(e) => {
                    debug!(peer = ?self.peer, error = %e, "write failed");
                    return Step::Close;
                }
            }

            if self.close_after_flush {
                return Step::Close;
            }
            if !self.answer_next(server, handler) {
                break;
            }
        }

        if self.peer_closed {
            debug!(peer = ?self.peer, unparsed = self.inbound.len(), "peer closed");
            return Step::Close;
        }
        Step::KeepOpen
    }

    /// Appends to `inbound` until the stream would block. Returns whether
    /// the peer closed its side.
    fn fill_inbound(&mut self) -> io::Result<bool> {
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            match self.stream.read(&mut chunk) {
                Ok(0) => return Ok(true),
                Ok(n) => {
                    // Input after a closing response is never answered.
                    if !self.close_after_flush {
                        self.inbound.extend_from_slice(&chunk[..n]);
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(false),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) if e.kind() == io::ErrorKind::ConnectionReset => {
                    debug!(peer = ?self.peer, "connection reset by peer");
                    return Ok(true);
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Parses the request at the head of `inbound` and queues its answer.
    /// Returns false when there is no complete request to answer.
    fn answer_next(&mut self, server: &ServerConfig, handler: &dyn Handler) -> bool {
        if self.inbound.is_empty() {
            return false;
        }

        match parse_http_request_with_limits(&self.inbound, &server.parse_limits()) {
            Err(ParseError::Incomplete) => return false,
            Err(e) => {
                let status = match e {
                    ParseError::HeadersTooLarge => StatusCode::HeaderFieldsTooLarge,
                    ParseError::PayloadTooLarge => StatusCode::PayloadTooLarge,
                    _ => StatusCode::BadRequest,
                };
                debug!(peer = ?self.peer, error = %e, "rejecting request");
                self.queue(None, error_response(status, server), true);
            }
            Ok((request, consumed)) => {
                self.inbound.advance(consumed);

                let (response, close) = match match_route(&request.path, &server.routes) {
                    Some(route) => (handler.handle(&request, server, route), !request.keep_alive()),
                    None => (error_response(StatusCode::NotFound, server), true),
                };
                self.queue(Some(&request), response, close);
            }
        }

        if self.close_after_flush {
            self.inbound.clear();
        }
        true
    }

    fn queue(&mut self, request: Option<&Request>, mut response: Response, close: bool) {
        response.set_header("Connection", if close { "close" } else { "keep-alive" });
        response.set_header("Server", SERVER_SOFTWARE);

        let head_only = request.is_some_and(|r| r.method == Method::HEAD);
        let bytes = if head_only {
            serialize_head(&response)
        } else {
            serialize_response(&response)
        };

        match request {
            Some(req) => info!(
                peer = ?self.peer,
                method = %req.method,
                path = %req.path,
                status = response.status.as_u16(),
                bytes = bytes.len(),
                "request served"
            ),
            None => info!(
                peer = ?self.peer,
                status = response.status.as_u16(),
                bytes = bytes.len(),
                "request rejected"
            ),
        }

        self.outbound.extend_from_slice(&bytes);
        if close {
            self.close_after_flush = true;
        }
    }
}
