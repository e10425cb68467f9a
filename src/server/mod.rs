//! Socket side of the server: readiness polling, listeners and the
//! single-threaded reactor loop.

pub mod closed;
pub mod listener;
pub mod poller;
pub mod reactor;

pub use reactor::Server;
