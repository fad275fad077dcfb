// Drift-free periodic schedule for the bridge workers.
//
// Deadlines are computed from an absolute anchor plus an integer multiple of
// the period, never from "now + period", so sleep jitter cannot accumulate
// into phase drift. spin_sleep keeps the wakeups accurate well below the
// millisecond periods used here.

use std::time::{Duration, Instant};

/// Repeating schedule anchored at its start instant.
#[derive(Debug)]
pub struct PeriodicScheduler {
    anchor: Instant,
    period: Duration,
    ticks: u64,
}

impl PeriodicScheduler {
    /// Begin a schedule with the given period, anchored at the current
    /// instant. The first `wait_next` returns one period from now.
    pub fn start(period: Duration) -> Self {
        assert!(!period.is_zero(), "scheduler period must be non-zero");
        Self {
            anchor: Instant::now(),
            period,
            ticks: 0,
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Block until the next scheduled instant.
    ///
    /// If the caller's work overran the period, this returns immediately and
    /// the schedule stays in phase with the anchor: slots that already
    /// passed are skipped rather than fired in a burst, so one long overrun
    /// is absorbed instead of compounding.
    pub fn wait_next(&mut self) {
        self.ticks += 1;
        let deadline = self.anchor + self.period * self.ticks as u32;
        let now = Instant::now();
        if now < deadline {
            spin_sleep::sleep(deadline - now);
            return;
        }

        let slots_passed = (now - self.anchor).as_nanos() / self.period.as_nanos();
        self.ticks = self.ticks.max(slots_passed as u64);
    }
}
