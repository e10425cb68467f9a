//! HTTP protocol implementation.
//!
//! This module implements the HTTP/1.x side of the server: incremental
//! request parsing, response serialisation and the per-connection state
//! machine driven by the reactor.
//!
//! # Architecture
//!
//! - **`connection`**: Per-client buffers and the read/parse/dispatch/write cycle
//! - **`parser`**: Parses requests from an accumulating byte buffer
//! - **`multipart`**: Decodes `multipart/form-data` bodies
//! - **`request`**: HTTP request representation and keep-alive rules
//! - **`response`**: HTTP response representation with builder pattern
//! - **`writer`**: Serialises responses and flushes them without blocking
//! - **`mime`**: MIME type detection based on file extensions
//!
//! # Connection State Machine
//!
//! States are implicit in which buffers hold data and which readiness
//! interest is registered:
//!
//! ```text
//!        ┌─────────────┐
//!        │   Reading   │ ← Readable: append bytes to the inbound buffer
//!        └──────┬──────┘
//!               │ Complete request(s) in buffer
//!               ▼
//!        ┌──────────────────┐
//!        │   Dispatching    │ ← Route + build response, append to outbound
//!        └──────┬───────────┘
//!               │ Response bytes queued
//!               ▼
//!        ┌──────────────────┐
//!        │    Writing       │ ← Flush; on WouldBlock wait for Writable
//!        └──────┬───────────┘
//!               │ Outbound drained
//!               ├─ Keep-Alive → Reading (same connection)
//!               └─ Close → Closed
//! ```
//!
//! Partial input never fails: the parser reports `Incomplete` and the bytes
//! stay buffered until the next readable event.

/// Value of the `Server` header and the CGI `SERVER_SOFTWARE` variable.
pub const SERVER_SOFTWARE: &str = concat!("webserv/", env!("CARGO_PKG_VERSION"));

pub mod connection;
pub mod mime;
pub mod multipart;
pub mod parser;
pub mod request;
pub mod response;
pub mod writer;
