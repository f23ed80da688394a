//! Cooperative periodic dispatcher.
//!
//! Grounded on the fixed-period task table pattern in `BlinkSample`'s
//! `Scheduler`: a small number of cadences (here 10ms and 100ms, matching
//! `DccDecoder.cpp::cycle()`'s FIFO-drain rate and `CalM.h`'s `cycle100()`),
//! each advanced by comparing a millisecond counter against a stored
//! deadline -- no heap, no task objects, just counters checked once per
//! main-loop iteration.

/// One cadence's due-or-not bookkeeping.
#[derive(Debug, Clone, Copy)]
pub struct Cadence {
    period_ms: u32,
    next_due_ms: u32,
}

impl Cadence {
    pub const fn new(period_ms: u32) -> Self {
        Self {
            period_ms,
            next_due_ms: 0,
        }
    }

    /// Returns `true` at most once per call if `now_ms` has reached the next
    /// deadline, and rearms for the following period. Catches up by at most
    /// one period per call -- a long stall does not fire a backlog of ticks.
    pub fn poll(&mut self, now_ms: u32) -> bool {
        if now_ms.wrapping_sub(self.next_due_ms) < u32::MAX / 2 {
            self.next_due_ms = self.next_due_ms.wrapping_add(self.period_ms);
            true
        } else {
            false
        }
    }
}

/// The firmware's two standing cadences: a fast one for packet-FIFO
/// draining/classification/ramp stepping, a slow one for calibration
/// housekeeping and the alive-LED blink.
pub struct Dispatcher {
    pub fast: Cadence,
    pub slow: Cadence,
}

impl Dispatcher {
    pub const fn new(fast_period_ms: u32, slow_period_ms: u32) -> Self {
        Self {
            fast: Cadence::new(fast_period_ms),
            slow: Cadence::new(slow_period_ms),
        }
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new(10, 100)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fires_once_per_period_not_per_call() {
        let mut c = Cadence::new(10);
        assert!(c.poll(0));
        assert!(!c.poll(5));
        assert!(c.poll(10));
        assert!(!c.poll(15));
        assert!(c.poll(20));
    }

    #[test]
    fn a_stall_advances_the_deadline_by_exactly_one_period() {
        let mut c = Cadence::new(10);
        c.poll(0); // next_due_ms is now 10
        // A long gap: `now` is way past the deadline, but the deadline only
        // moves forward by one period -- it does not jump to catch up with
        // `now`, so a stall does not fire a backlog of ticks in one call.
        assert!(c.poll(1_000));
        assert_eq!(c.next_due_ms, 20);
    }

    #[test]
    fn default_dispatcher_uses_10ms_and_100ms_cadences() {
        let d = Dispatcher::default();
        assert_eq!(d.fast.period_ms, 10);
        assert_eq!(d.slow.period_ms, 100);
    }
}
