//! Wraparound-safe millisecond timestamps.
//!
//! The scheduler samples a monotonic clock once per tick and hands the
//! value down; nothing in the library reads time on its own.

/// Milliseconds since boot, truncated to 32 bits (wraps after ~49 days).
pub type Millis = u32;

/// Time from `since` to `now`, correct across a single wrap.
#[inline]
pub fn elapsed_ms(now: Millis, since: Millis) -> u32 {
    now.wrapping_sub(since)
}

/// `true` once `deadline` has been reached.
#[inline]
pub fn is_due(now: Millis, deadline: Millis) -> bool {
    // Anything less than half the range behind `now` counts as past.
    elapsed_ms(now, deadline) < u32::MAX / 2
}

/// Fixed-period timer polled from the scheduler.
#[derive(Clone, Copy, Debug)]
pub struct Periodic {
    period_ms: u32,
    last: Millis,
}

impl Periodic {
    pub const fn new(period_ms: u32, start: Millis) -> Self {
        Self {
            period_ms,
            last: start,
        }
    }

    /// Returns `true` (and re-arms) when more than one period has passed.
    pub fn poll(&mut self, now: Millis) -> bool {
        if elapsed_ms(now, self.last) > self.period_ms {
            self.last = now;
            true
        } else {
            false
        }
    }

    pub fn reset(&mut self, now: Millis) {
        self.last = now;
    }
}
