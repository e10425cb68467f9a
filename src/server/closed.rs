use std::collections::HashMap;
use std::os::unix::io::RawFd;
use std::time::{Duration, Instant};

/// How long a closed descriptor is remembered.
pub const CLOSED_FD_TTL: Duration = Duration::from_secs(5);

/// Descriptors closed recently, with the time they were closed.
///
/// One poll batch can mention a descriptor more than once, and the OS
/// reuses descriptor numbers quickly. Events for a descriptor in this set
/// are stale and get dropped. Entries age out so the set stays small, and
/// an accepted connection that reuses a number removes it explicitly.
#[derive(Debug)]
pub struct ClosedSet {
    closed_at: HashMap<RawFd, Instant>,
    ttl: Duration,
}

impl ClosedSet {
    pub fn new(ttl: Duration) -> Self {
        Self {
            closed_at: HashMap::new(),
            ttl,
        }
    }

    pub fn mark(&mut self, fd: RawFd) {
        self.closed_at.insert(fd, Instant::now());
    }

    pub fn contains(&self, fd: RawFd) -> bool {
        self.closed_at.contains_key(&fd)
    }

    /// The descriptor number is live again.
    pub fn forget(&mut self, fd: RawFd) {
        self.closed_at.remove(&fd);
    }

    pub fn evict_expired(&mut self, now: Instant) {
        let ttl = self.ttl;
        self.closed_at
            .retain(|_, closed| now.saturating_duration_since(*closed) < ttl);
    }

    pub fn len(&self) -> usize {
        self.closed_at.len()
    }

    pub fn is_empty(&self) -> bool {
        self.closed_at.is_empty()
    }
}

impl Default for ClosedSet {
    fn default() -> Self {
        Self::new(CLOSED_FD_TTL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mark_and_forget() {
        let mut set = ClosedSet::default();
        set.mark(7);
        assert!(set.contains(7));
        assert!(!set.contains(8));
        set.forget(7);
        assert!(!set.contains(7));
        assert!(set.is_empty());
    }

    #[test]
    fn old_entries_are_evicted() {
        let mut set = ClosedSet::new(Duration::from_millis(100));
        set.mark(3);
        set.mark(4);

        set.evict_expired(Instant::now());
        assert_eq!(set.len(), 2);

        set.evict_expired(Instant::now() + Duration::from_secs(1));
        assert!(set.is_empty());
    }
}
