//! Timer handles on a logical millisecond clock.
//!
//! Nothing here sleeps. A handle only records when it is due; whoever owns it
//! asks whether it has come due. Cancelling is dropping the handle.

/// Fixed tick used for elapsed-time accounting.
pub const TICK_MS: u64 = 1000;

/// One-shot delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeout {
    due_ms: u64,
}

impl Timeout {
    pub fn after(now_ms: u64, delay_ms: u64) -> Self {
        Self {
            due_ms: now_ms.saturating_add(delay_ms),
        }
    }

    pub fn due_ms(&self) -> u64 {
        self.due_ms
    }

    pub fn is_due(&self, now_ms: u64) -> bool {
        self.due_ms <= now_ms
    }
}

/// Fixed-period repeating timer. The first firing is one period after arming.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interval {
    period_ms: u64,
    next_ms: u64,
}

impl Interval {
    pub fn every(now_ms: u64, period_ms: u64) -> Self {
        // A zero period would fire forever without the clock moving.
        let period_ms = period_ms.max(1);
        Self {
            period_ms,
            next_ms: now_ms.saturating_add(period_ms),
        }
    }

    pub fn next_ms(&self) -> u64 {
        self.next_ms
    }

    pub fn period_ms(&self) -> u64 {
        self.period_ms
    }

    /// Consume the pending firing and schedule the next one. Returns the
    /// time the consumed firing was due.
    pub fn fire(&mut self) -> u64 {
        let fired = self.next_ms;
        self.next_ms = fired.saturating_add(self.period_ms);
        fired
    }
}

pub fn minutes_to_ms(minutes: u32) -> u64 {
    u64::from(minutes) * 60 * 1000
}
