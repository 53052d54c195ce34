//! The four-phase breathing cycle.
//!
//! ```text
//! Inhale -> Hold -> Exhale -> Hold2 -> Inhale -> ...
//! ```
//!
//! Each phase lasts the duration configured when it was entered; changing the
//! durations mid-phase restarts the current phase with its new length. Entering
//! `Inhale` expands the pacer, entering `Exhale` returns it to neutral, and the
//! holds leave it where it is.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, warn};

use crate::timer::Timeout;

pub const EXPANDED_SCALE: f64 = 1.5;
pub const NEUTRAL_SCALE: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Inhale,
    Hold,
    Exhale,
    Hold2,
}

impl Phase {
    pub fn next(self) -> Self {
        match self {
            Phase::Inhale => Phase::Hold,
            Phase::Hold => Phase::Exhale,
            Phase::Exhale => Phase::Hold2,
            Phase::Hold2 => Phase::Inhale,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Inhale => "inhale",
            Phase::Hold => "hold",
            Phase::Exhale => "exhale",
            Phase::Hold2 => "hold2",
        }
    }

    /// Label shown to the user; both holds read the same.
    pub fn label(self) -> &'static str {
        match self {
            Phase::Inhale => "Inhale",
            Phase::Hold | Phase::Hold2 => "Hold",
            Phase::Exhale => "Exhale",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Phase lengths in milliseconds. `hold_ms` is used for both holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Durations {
    #[serde(default = "default_inhale_ms")]
    pub inhale_ms: u64,
    #[serde(default = "default_hold_ms")]
    pub hold_ms: u64,
    #[serde(default = "default_exhale_ms")]
    pub exhale_ms: u64,
}

fn default_inhale_ms() -> u64 {
    4000
}
fn default_hold_ms() -> u64 {
    2000
}
fn default_exhale_ms() -> u64 {
    4000
}

impl Default for Durations {
    fn default() -> Self {
        Self {
            inhale_ms: default_inhale_ms(),
            hold_ms: default_hold_ms(),
            exhale_ms: default_exhale_ms(),
        }
    }
}

impl Durations {
    pub fn for_phase(&self, phase: Phase) -> u64 {
        match phase {
            Phase::Inhale => self.inhale_ms,
            Phase::Hold | Phase::Hold2 => self.hold_ms,
            Phase::Exhale => self.exhale_ms,
        }
    }

    pub fn cycle_ms(&self) -> u64 {
        self.inhale_ms
            .saturating_add(self.hold_ms.saturating_mul(2))
            .saturating_add(self.exhale_ms)
    }

    pub fn is_zero(&self) -> bool {
        self.inhale_ms == 0 && self.hold_ms == 0 && self.exhale_ms == 0
    }
}

/// Drives the phase cycle. Owns the pending transition, if any.
#[derive(Debug, Clone)]
pub struct PhaseTimer {
    phase: Phase,
    scale: f64,
    durations: Durations,
    pending: Option<Timeout>,
}

impl PhaseTimer {
    pub fn new(durations: Durations) -> Self {
        Self {
            phase: Phase::Inhale,
            scale: NEUTRAL_SCALE,
            durations,
            pending: None,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    pub fn durations(&self) -> Durations {
        self.durations
    }

    pub fn is_active(&self) -> bool {
        self.pending.is_some()
    }

    pub fn next_due(&self) -> Option<u64> {
        self.pending.map(|t| t.due_ms())
    }

    /// Replace the durations. While active, the pending transition is
    /// cancelled and the current phase restarts at `now_ms` with its new
    /// length.
    pub fn set_durations(&mut self, durations: Durations, now_ms: u64) {
        self.durations = durations;
        if self.pending.take().is_some() {
            self.enter(self.phase, now_ms);
        }
    }

    /// Begin the cycle at `Inhale`.
    pub fn activate(&mut self, now_ms: u64) {
        self.enter(Phase::Inhale, now_ms);
    }

    /// Cancel the pending transition. Phase and scale are kept.
    pub fn deactivate(&mut self) {
        self.pending = None;
    }

    /// Cancel and go back to `Inhale` without touching the scale.
    pub fn rewind(&mut self) {
        self.deactivate();
        self.phase = Phase::Inhale;
    }

    /// Fire the pending transition if it is due by `now_ms`. Returns the phase
    /// entered and the time it was entered at.
    pub fn fire(&mut self, now_ms: u64) -> Option<(Phase, u64)> {
        let timeout = self.pending.filter(|t| t.is_due(now_ms))?;
        self.pending = None;
        let next = self.phase.next();
        self.enter(next, timeout.due_ms());
        Some((next, timeout.due_ms()))
    }

    fn enter(&mut self, phase: Phase, at_ms: u64) {
        self.phase = phase;
        match phase {
            Phase::Inhale => self.scale = EXPANDED_SCALE,
            Phase::Exhale => self.scale = NEUTRAL_SCALE,
            Phase::Hold | Phase::Hold2 => {}
        }

        if self.durations.is_zero() {
            warn!("All phase durations are zero; breathing cycle halted");
            self.pending = None;
            return;
        }

        let delay = self.durations.for_phase(phase);
        debug!(%phase, at_ms, delay, "Entered phase");
        self.pending = Some(Timeout::after(at_ms, delay));
    }
}
