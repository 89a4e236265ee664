//! Simulation time sources
//!
//! Time is an unsigned millisecond tick count that wraps around. Always
//! subtract with [`elapsed`] rather than `-`.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Milliseconds since some arbitrary origin, wrapping at `u32::MAX`
pub type TickCount = u32;

/// Wraparound-safe `now - earlier`
#[inline]
pub fn elapsed(now: TickCount, earlier: TickCount) -> u32 {
    now.wrapping_sub(earlier)
}

/// Source of the current tick count
pub trait TimeSource: Send + Sync {
    fn now(&self) -> TickCount;
}

/// Monotonic wall clock
#[derive(Debug, Clone)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for SystemClock {
    fn now(&self) -> TickCount {
        // Truncation is the wraparound
        self.origin.elapsed().as_millis() as u32
    }
}

/// Manually advanced clock. Clones share the same time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<AtomicU32>,
}

impl ManualClock {
    pub fn new(start: TickCount) -> Self {
        Self {
            now: Arc::new(AtomicU32::new(start)),
        }
    }

    /// Move time forward (wrapping)
    pub fn advance(&self, ms: u32) {
        let current = self.now.load(Ordering::SeqCst);
        self.now.store(current.wrapping_add(ms), Ordering::SeqCst);
    }

    pub fn set(&self, now: TickCount) {
        self.now.store(now, Ordering::SeqCst);
    }
}

impl TimeSource for ManualClock {
    fn now(&self) -> TickCount {
        self.now.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_elapsed_wraps() {
        assert_eq!(elapsed(10, 5), 5);
        assert_eq!(elapsed(5, u32::MAX - 4), 10);
    }

    #[test]
    fn test_manual_clock_is_shared() {
        let clock = ManualClock::new(100);
        let handle = clock.clone();
        handle.advance(50);
        assert_eq!(clock.now(), 150);

        handle.set(u32::MAX);
        clock.advance(2);
        assert_eq!(handle.now(), 1);
    }

    #[test]
    fn test_system_clock_is_monotonic() {
        let clock = SystemClock::new();
        let a = clock.now();
        let b = clock.now();
        assert!(elapsed(b, a) < 1000);
    }
}
