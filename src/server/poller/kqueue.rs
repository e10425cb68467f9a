use std::io;
use std::os::unix::io::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::ptr;
use std::time::Duration;

use super::{Event, Interest, MAX_EVENTS};

/// kqueue keeps one filter per direction, so an interest change is a set
/// of add/delete operations on the read and write filters.
pub struct Kqueue {
    kq: OwnedFd,
    events: Vec<libc::kevent>,
}

impl Kqueue {
    pub fn new() -> io::Result<Self> {
        let fd = unsafe { libc::kqueue() };
        if fd < 0 {
            return Err(io::Error::last_os_error());
        }

        Ok(Self {
            // SAFETY: `fd` was just returned by kqueue() and is owned by nobody else.
            kq: unsafe { OwnedFd::from_raw_fd(fd) },
            events: Vec::with_capacity(MAX_EVENTS),
        })
    }

    pub fn register(&mut self, fd: RawFd, interest: Interest) -> io::Result<()> {
        if interest.is_readable() {
            self.change(fd, libc::EVFILT_READ, libc::EV_ADD)?;
        }
        if interest.is_writable() {
            self.change(fd, libc::EVFILT_WRITE, libc::EV_ADD)?;
        }
        Ok(())
    }

    pub fn modify(&mut self, fd: RawFd, interest: Interest) -> io::Result<()> {
        if interest.is_readable() {
            self.change(fd, libc::EVFILT_READ, libc::EV_ADD)?;
        } else {
            self.delete(fd, libc::EVFILT_READ)?;
        }
        if interest.is_writable() {
            self.change(fd, libc::EVFILT_WRITE, libc::EV_ADD)?;
        } else {
            self.delete(fd, libc::EVFILT_WRITE)?;
        }
        Ok(())
    }

    pub fn unregister(&mut self, fd: RawFd) -> io::Result<()> {
        self.delete(fd, libc::EVFILT_READ)?;
        self.delete(fd, libc::EVFILT_WRITE)
    }

    /// Blocks until something is ready or `timeout` passes; `None` waits
    /// forever. An interrupted wait returns no events.
    pub fn wait(&mut self, timeout: Option<Duration>) -> io::Result<Vec<Event>> {
        let ts = timeout.map(|d| libc::timespec {
            tv_sec: d.as_secs() as libc::time_t,
            tv_nsec: d.subsec_nanos() as _,
        });
        let ts_ptr = ts
            .as_ref()
            .map_or(ptr::null(), |t| t as *const libc::timespec);

        self.events.clear();
        let n = unsafe {
            libc::kevent(
                self.kq.as_raw_fd(),
                ptr::null(),
                0,
                self.events.as_mut_ptr(),
                MAX_EVENTS as _,
                ts_ptr,
            )
        };
        if n < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                return Ok(Vec::new());
            }
            return Err(err);
        }
        // SAFETY: the kernel initialised the first `n` entries.
        unsafe { self.events.set_len(n as usize) };

        Ok(self
            .events
            .iter()
            .map(|ev| {
                let eof_or_error = ev.flags & (libc::EV_EOF | libc::EV_ERROR) != 0;
                let readiness = if ev.filter == libc::EVFILT_WRITE && !eof_or_error {
                    Interest::WRITABLE
                } else {
                    Interest::READABLE
                };
                Event::new(ev.ident as RawFd, readiness)
            })
            .collect())
    }

    fn change(&self, fd: RawFd, filter: i16, flags: u16) -> io::Result<()> {
        // SAFETY: kevent is a plain C struct; all-zero is a valid value.
        let mut ev: libc::kevent = unsafe { std::mem::zeroed() };
        ev.ident = fd as _;
        ev.filter = filter as _;
        ev.flags = flags as _;

        let rc = unsafe {
            libc::kevent(
                self.kq.as_raw_fd(),
                &ev,
                1,
                ptr::null_mut(),
                0,
                ptr::null(),
            )
        };
        if rc < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    /// Removing a filter that was never added is not an error here.
    fn delete(&self, fd: RawFd, filter: i16) -> io::Result<()> {
        match self.change(fd, filter, libc::EV_DELETE) {
            Err(e) if e.raw_os_error() == Some(libc::ENOENT) => Ok(()),
            other => other,
        }
    }
}
