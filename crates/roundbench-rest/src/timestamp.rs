//! Request timestamps with monotonic guarantees.
//!
//! Each signed request carries a wall-clock millisecond `timestamp`. The venue
//! checks it against `recvWindow`, and two requests from the same client must
//! never share or reverse a timestamp, even if the system clock steps back.

use std::sync::atomic::{AtomicU64, Ordering};

/// Source of wall-clock time, replaceable in tests.
pub trait Clock: Send + Sync {
    /// Milliseconds since the Unix epoch.
    fn now_ms(&self) -> u64;
}

/// Real system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default()
    }
}

/// Issues strictly increasing request timestamps.
///
/// Returns `max(last + 1, now)`; thread-safe via a CAS loop.
pub struct TimestampGenerator<C: Clock> {
    last: AtomicU64,
    clock: C,
}

impl<C: Clock> TimestampGenerator<C> {
    #[must_use]
    pub fn new(clock: C) -> Self {
        Self {
            last: AtomicU64::new(0),
            clock,
        }
    }

    /// Next timestamp; always greater than every value returned before.
    pub fn next(&self) -> u64 {
        let now = self.clock.now_ms();

        loop {
            let current = self.last.load(Ordering::Acquire);
            let next_val = current.saturating_add(1).max(now);

            match self.last.compare_exchange_weak(
                current,
                next_val,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return next_val,
                Err(_) => continue,
            }
        }
    }

    /// Last issued timestamp, 0 before the first call.
    #[must_use]
    pub fn last(&self) -> u64 {
        self.last.load(Ordering::Acquire)
    }
}

impl TimestampGenerator<SystemClock> {
    #[must_use]
    pub fn with_system_clock() -> Self {
        Self::new(SystemClock)
    }
}

impl Default for TimestampGenerator<SystemClock> {
    fn default() -> Self {
        Self::with_system_clock()
    }
}
