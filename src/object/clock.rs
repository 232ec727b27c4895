//! Process-wide modification clock.
//!
//! Every mutation in a pipeline context draws its stamp from one shared
//! [`Clock`], so any two stamps taken anywhere in the context are totally
//! ordered. Staleness checks (`update time < pipeline mtime`) rely on that.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Monotonic counter shared by all objects of a pipeline context.
#[derive(Debug, Default)]
pub struct Clock {
    counter: AtomicU64,
}

impl Clock {
    /// Create a clock that has not issued any stamp yet.
    pub fn new() -> Self {
        Self {
            counter: AtomicU64::new(0),
        }
    }

    /// Create a clock behind an `Arc`, ready to be handed to a pipeline.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Advance the clock and return the new value.
    ///
    /// The returned value is strictly greater than every value previously
    /// returned by this clock, from any thread.
    #[inline]
    pub fn tick(&self) -> u64 {
        self.counter.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Last value issued (0 if none).
    #[inline]
    pub fn now(&self) -> u64 {
        self.counter.load(Ordering::Acquire)
    }
}

/// A single recorded point on a [`Clock`].
///
/// Zero means "never stamped" and compares below every issued value.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimeStamp(u64);

impl TimeStamp {
    pub const NEVER: TimeStamp = TimeStamp(0);

    /// Record the current instant of `clock`.
    #[inline]
    pub fn modified(&mut self, clock: &Clock) {
        self.0 = clock.tick();
    }

    #[inline]
    pub fn get(self) -> u64 {
        self.0
    }

    /// Raw construction, used when a time has to be pushed onto another object.
    #[inline]
    pub fn from_raw(value: u64) -> Self {
        Self(value)
    }
}

impl fmt::Debug for TimeStamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t{}", self.0)
    }
}

impl fmt::Display for TimeStamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_tick_is_strictly_increasing() {
        let clock = Clock::new();
        let a = clock.tick();
        let b = clock.tick();
        assert!(b > a);
        assert_eq!(clock.now(), b);
    }

    #[test]
    fn test_timestamp_ordering() {
        let clock = Clock::new();
        let mut first = TimeStamp::default();
        let mut second = TimeStamp::default();
        assert_eq!(first, TimeStamp::NEVER);
        first.modified(&clock);
        second.modified(&clock);
        assert!(first > TimeStamp::NEVER);
        assert!(second > first);
    }

    #[test]
    fn test_shared_clock_across_threads() {
        let clock = Clock::shared();
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let clock = clock.clone();
                thread::spawn(move || (0..1000).map(|_| clock.tick()).collect::<Vec<_>>())
            })
            .collect();

        let mut all: Vec<u64> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        all.sort_unstable();
        all.dedup();
        assert_eq!(all.len(), 4000);
        assert_eq!(clock.now(), 4000);
    }
}
