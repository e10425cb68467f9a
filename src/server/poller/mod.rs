//! Readiness polling over raw file descriptors.
//!
//! epoll on Linux, kqueue on the BSDs and macOS. Both expose the same
//! inherent API and one of them is picked at compile time as [`Poller`]:
//!
//! - `register(fd, interest)`
//! - `modify(fd, interest)`
//! - `unregister(fd)`
//! - `wait(timeout) -> Vec<Event>`
//!
//! Registrations are level-triggered: a descriptor keeps being reported for
//! as long as it stays ready.

use std::fmt;
use std::ops::{BitAnd, BitOr};
use std::os::unix::io::RawFd;

#[cfg(any(target_os = "linux", target_os = "android"))]
mod epoll;
#[cfg(any(target_os = "linux", target_os = "android"))]
pub use epoll::Epoll as Poller;

#[cfg(any(
    target_os = "macos",
    target_os = "ios",
    target_os = "freebsd",
    target_os = "openbsd",
    target_os = "dragonfly"
))]
mod kqueue;
#[cfg(any(
    target_os = "macos",
    target_os = "ios",
    target_os = "freebsd",
    target_os = "openbsd",
    target_os = "dragonfly"
))]
pub use kqueue::Kqueue as Poller;

/// Upper bound on events returned by one `wait`.
pub const MAX_EVENTS: usize = 1024;

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Interest(u8);

impl Interest {
    pub const READABLE: Interest = Interest(0b01);
    pub const WRITABLE: Interest = Interest(0b10);
    pub const BOTH: Interest = Interest(0b11);

    pub(crate) const NONE: Interest = Interest(0);

    pub fn is_readable(self) -> bool {
        (self.0 & Self::READABLE.0) != 0
    }

    pub fn is_writable(self) -> bool {
        (self.0 & Self::WRITABLE.0) != 0
    }
}

impl BitOr for Interest {
    type Output = Self;

    fn bitor(self, other: Self) -> Self {
        Interest(self.0 | other.0)
    }
}

impl BitAnd for Interest {
    type Output = Self;

    fn bitand(self, other: Self) -> Self {
        Interest(self.0 & other.0)
    }
}

impl fmt::Debug for Interest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.is_readable(), self.is_writable()) {
            (true, true) => f.write_str("READABLE | WRITABLE"),
            (true, false) => f.write_str("READABLE"),
            (false, true) => f.write_str("WRITABLE"),
            (false, false) => f.write_str("NONE"),
        }
    }
}

/// One ready descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Event {
    pub fd: RawFd,
    /// Errors and hang-ups are reported as readable so the next read
    /// surfaces them.
    pub readiness: Interest,
}

impl Event {
    pub fn new(fd: RawFd, readiness: Interest) -> Self {
        Self { fd, readiness }
    }

    pub fn is_readable(&self) -> bool {
        self.readiness.is_readable()
    }

    pub fn is_writable(&self) -> bool {
        self.readiness.is_writable()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::os::unix::io::AsRawFd;
    use std::os::unix::net::UnixStream;
    use std::time::Duration;

    #[test]
    fn interest_bits() {
        assert!(Interest::BOTH.is_readable());
        assert!(Interest::BOTH.is_writable());
        assert_eq!(Interest::READABLE | Interest::WRITABLE, Interest::BOTH);
        assert!(!(Interest::READABLE & Interest::WRITABLE).is_readable());
    }

    #[test]
    fn reports_readable_after_write() {
        let (mut a, b) = UnixStream::pair().unwrap();
        let mut poller = Poller::new().unwrap();
        poller.register(b.as_raw_fd(), Interest::READABLE).unwrap();

        let idle = poller.wait(Some(Duration::from_millis(20))).unwrap();
        assert!(idle.is_empty());

        a.write_all(b"ping").unwrap();
        let events = poller.wait(Some(Duration::from_secs(1))).unwrap();
        assert!(events.iter().any(|e| e.fd == b.as_raw_fd() && e.is_readable()));
    }

    #[test]
    fn modify_adds_writable() {
        let (_a, b) = UnixStream::pair().unwrap();
        let mut poller = Poller::new().unwrap();
        poller.register(b.as_raw_fd(), Interest::READABLE).unwrap();
        poller.modify(b.as_raw_fd(), Interest::BOTH).unwrap();

        let events = poller.wait(Some(Duration::from_secs(1))).unwrap();
        assert!(events.iter().any(|e| e.fd == b.as_raw_fd() && e.is_writable()));
    }

    #[test]
    fn unregistered_fd_is_silent() {
        let (mut a, b) = UnixStream::pair().unwrap();
        let mut poller = Poller::new().unwrap();
        poller.register(b.as_raw_fd(), Interest::READABLE).unwrap();
        poller.unregister(b.as_raw_fd()).unwrap();

        a.write_all(b"ping").unwrap();
        let events = poller.wait(Some(Duration::from_millis(20))).unwrap();
        assert!(events.is_empty());
    }
}
