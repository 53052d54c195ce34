//! Session tracking: elapsed time, status, and completion.
//!
//! The tracker is driven by the caller on a logical millisecond clock. It owns
//! the elapsed-time tick and the phase timer, and both are only armed while
//! the status is `Running`.
//!
//! ## State Transitions
//!
//! ```text
//! Idle -> Running -> (Paused -> Running) -> Finished
//!   ^________________ reset ________________|
//! ```
//!
//! Resuming restarts the session from zero, the same as `start`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::phase::{Durations, Phase, PhaseTimer};
use crate::store::SessionStore;
use crate::timer::{Interval, TICK_MS, minutes_to_ms};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Idle,
    Running,
    Paused,
    Finished,
}

/// A completed session, as persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    #[serde(with = "iso_millis")]
    pub date: DateTime<Utc>,
    /// Session length in minutes.
    pub duration: u32,
}

impl SessionRecord {
    pub fn completed_now(duration: u32) -> Self {
        Self {
            date: Utc::now(),
            duration,
        }
    }
}

/// Timestamps are written as `2024-05-01T08:30:00.000Z`.
mod iso_millis {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(date: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&date.to_rfc3339_opts(SecondsFormat::Millis, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(d)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|date| date.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    PhaseChanged { phase: Phase, scale: f64, at_ms: u64 },
    Ticked { elapsed_ms: u64 },
    Completed(SessionRecord),
}

pub struct SessionTracker<S> {
    status: Status,
    elapsed_ms: u64,
    session_minutes: u32,
    phases: PhaseTimer,
    ticker: Option<Interval>,
    store: S,
}

impl<S: SessionStore> SessionTracker<S> {
    pub fn new(durations: Durations, session_minutes: u32, store: S) -> Self {
        Self {
            status: Status::Idle,
            elapsed_ms: 0,
            session_minutes,
            phases: PhaseTimer::new(durations),
            ticker: None,
            store,
        }
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.elapsed_ms
    }

    pub fn session_minutes(&self) -> u32 {
        self.session_minutes
    }

    pub fn target_ms(&self) -> u64 {
        minutes_to_ms(self.session_minutes)
    }

    pub fn phase(&self) -> Phase {
        self.phases.phase()
    }

    pub fn scale(&self) -> f64 {
        self.phases.scale()
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Text for the pacer: the phase, or a completion notice.
    pub fn headline(&self) -> &'static str {
        match self.status {
            Status::Finished => "Session Complete",
            _ => self.phases.phase().label(),
        }
    }

    /// `M:SS / M:00`
    pub fn clock(&self) -> String {
        format_clock(self.elapsed_ms, self.session_minutes)
    }

    /// 0.0 .. 1.0 progress toward the target.
    pub fn progress(&self) -> f64 {
        let target = self.target_ms();
        if target == 0 {
            return 0.0;
        }
        (self.elapsed_ms as f64 / target as f64).min(1.0)
    }

    /// Earliest time at which `advance_to` has work to do.
    pub fn next_deadline(&self) -> Option<u64> {
        let tick = self.ticker.map(|t| t.next_ms());
        match (tick, self.phases.next_due()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    // ── Commands ─────────────────────────────────────────────────────

    pub fn start(&mut self, now_ms: u64) {
        self.elapsed_ms = 0;
        self.phases.activate(now_ms);
        self.ticker = Some(Interval::every(now_ms, TICK_MS));
        self.status = Status::Running;
        info!(minutes = self.session_minutes, "Session started");
    }

    pub fn pause(&mut self) {
        if self.status != Status::Running {
            debug!(status = ?self.status, "Pause ignored");
            return;
        }
        self.halt();
        self.status = Status::Paused;
        info!(elapsed_ms = self.elapsed_ms, "Session paused");
    }

    /// Starts over from zero; nothing from the paused session is kept.
    pub fn resume(&mut self, now_ms: u64) {
        self.start(now_ms);
    }

    pub fn reset(&mut self) {
        self.halt();
        self.phases.rewind();
        self.elapsed_ms = 0;
        self.status = Status::Idle;
        info!("Session reset");
    }

    /// Restarts the current phase at `now_ms` if the cycle is running.
    pub fn set_durations(&mut self, durations: Durations, now_ms: u64) {
        self.phases.set_durations(durations, now_ms);
    }

    /// Takes effect at the next tick.
    pub fn set_session_minutes(&mut self, minutes: u32) {
        self.session_minutes = minutes;
    }

    /// Fire every timer due by `now_ms`, in deadline order. On a tie the tick
    /// goes first, so a session ending on a cycle boundary ends before the
    /// next phase is entered.
    pub fn advance_to(&mut self, now_ms: u64) -> Vec<Event> {
        let mut events = Vec::new();
        loop {
            let tick_due = self.ticker.map(|t| t.next_ms()).filter(|&t| t <= now_ms);
            let phase_due = self.phases.next_due().filter(|&t| t <= now_ms);
            match (tick_due, phase_due) {
                (Some(tick), Some(phase)) if phase < tick => self.fire_phase(now_ms, &mut events),
                (Some(_), _) => self.tick(&mut events),
                (None, Some(_)) => self.fire_phase(now_ms, &mut events),
                (None, None) => break,
            }
        }
        events
    }

    fn fire_phase(&mut self, now_ms: u64, events: &mut Vec<Event>) {
        if let Some((phase, at_ms)) = self.phases.fire(now_ms) {
            events.push(Event::PhaseChanged {
                phase,
                scale: self.phases.scale(),
                at_ms,
            });
        }
    }

    fn tick(&mut self, events: &mut Vec<Event>) {
        let Some(ticker) = self.ticker.as_mut() else {
            return;
        };
        ticker.fire();
        self.elapsed_ms += TICK_MS;

        let target = self.target_ms();
        if self.elapsed_ms < target {
            events.push(Event::Ticked {
                elapsed_ms: self.elapsed_ms,
            });
            return;
        }

        self.elapsed_ms = target;
        self.halt();
        self.status = Status::Finished;

        let record = SessionRecord::completed_now(self.session_minutes);
        if let Err(e) = self.store.append(&record) {
            warn!("Failed to save session record: {e}");
        }
        info!(minutes = record.duration, "Session complete");
        events.push(Event::Completed(record));
    }

    fn halt(&mut self) {
        self.ticker = None;
        self.phases.deactivate();
    }
}

pub fn format_clock(elapsed_ms: u64, session_minutes: u32) -> String {
    let minutes = elapsed_ms / 60_000;
    let seconds = (elapsed_ms % 60_000) / 1000;
    format!("{minutes}:{seconds:02} / {session_minutes}:00")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Error, Result};

    fn tracker(minutes: u32) -> SessionTracker<Vec<SessionRecord>> {
        SessionTracker::new(Durations::default(), minutes, Vec::new())
    }

    struct BrokenStore;

    impl SessionStore for BrokenStore {
        fn load(&self) -> Vec<SessionRecord> {
            Vec::new()
        }

        fn append(&mut self, _record: &SessionRecord) -> Result<()> {
            Err(Error::io(
                "/nowhere",
                std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
            ))
        }
    }

    #[test]
    fn starts_idle() {
        let t = tracker(5);
        assert_eq!(t.status(), Status::Idle);
        assert_eq!(t.elapsed_ms(), 0);
        assert_eq!(t.phase(), Phase::Inhale);
        assert_eq!(t.next_deadline(), None);
    }

    #[test]
    fn one_minute_session_timeline() {
        let mut t = tracker(1);
        t.start(0);

        let samples = [
            (3999, Phase::Inhale),
            (4000, Phase::Hold),
            (5999, Phase::Hold),
            (6000, Phase::Exhale),
            (10_000, Phase::Hold2),
            (12_000, Phase::Inhale),
            (16_000, Phase::Hold),
            (59_999, Phase::Hold2),
        ];
        for (at, expected) in samples {
            t.advance_to(at);
            assert_eq!(t.phase(), expected, "phase at {at}ms");
            assert_eq!(t.status(), Status::Running);
        }

        let events = t.advance_to(60_000);
        assert_eq!(t.status(), Status::Finished);
        assert_eq!(t.elapsed_ms(), 60_000);
        assert_eq!(t.phase(), Phase::Hold2);
        assert!(matches!(
            events.as_slice(),
            [Event::Completed(SessionRecord { duration: 1, .. })]
        ));
        assert_eq!(t.store().len(), 1);
        assert_eq!(t.store()[0].duration, 1);
    }

    #[test]
    fn finished_session_stays_finished() {
        let mut t = tracker(1);
        t.start(0);
        t.advance_to(60_000);

        assert!(t.advance_to(600_000).is_empty());
        assert_eq!(t.elapsed_ms(), 60_000);
        assert_eq!(t.store().len(), 1);
        assert_eq!(t.next_deadline(), None);
        assert_eq!(t.headline(), "Session Complete");
    }

    #[test]
    fn completes_for_every_session_length() {
        for minutes in [1, 2, 7, 30] {
            let mut t = tracker(minutes);
            t.start(0);
            t.advance_to(minutes_to_ms(minutes) - 1);
            assert_eq!(t.status(), Status::Running);
            t.advance_to(minutes_to_ms(minutes));
            assert_eq!(t.status(), Status::Finished);
            assert_eq!(t.store().len(), 1);
            assert_eq!(t.store()[0].duration, minutes);
        }
    }

    #[test]
    fn elapsed_grows_by_one_tick_at_a_time() {
        let mut t = tracker(2);
        t.start(0);
        for n in 1..=120u64 {
            t.advance_to(n * TICK_MS);
            assert_eq!(t.elapsed_ms(), n * TICK_MS);
            assert!(t.elapsed_ms() <= t.target_ms());
        }
        t.advance_to(500_000);
        assert_eq!(t.elapsed_ms(), t.target_ms());
    }

    #[test]
    fn ticks_are_relative_to_start_time() {
        let mut t = tracker(1);
        t.start(250);
        t.advance_to(1249);
        assert_eq!(t.elapsed_ms(), 0);
        t.advance_to(1250);
        assert_eq!(t.elapsed_ms(), 1000);
    }

    #[test]
    fn pause_freezes_elapsed_and_phase() {
        let mut t = tracker(5);
        t.start(0);
        t.advance_to(7000);
        assert_eq!(t.phase(), Phase::Exhale);

        t.pause();
        assert_eq!(t.status(), Status::Paused);
        assert_eq!(t.next_deadline(), None);

        assert!(t.advance_to(100_000).is_empty());
        assert_eq!(t.elapsed_ms(), 7000);
        assert_eq!(t.phase(), Phase::Exhale);
    }

    #[test]
    fn resume_starts_over() {
        let mut t = tracker(5);
        t.start(0);
        t.advance_to(7000);
        t.pause();

        t.resume(20_000);
        assert_eq!(t.status(), Status::Running);
        assert_eq!(t.elapsed_ms(), 0);
        assert_eq!(t.phase(), Phase::Inhale);
        assert_eq!(t.next_deadline(), Some(21_000));
    }

    #[test]
    fn pause_is_ignored_unless_running() {
        let mut t = tracker(1);
        t.pause();
        assert_eq!(t.status(), Status::Idle);

        t.start(0);
        t.advance_to(60_000);
        t.pause();
        assert_eq!(t.status(), Status::Finished);
    }

    #[test]
    fn reset_from_any_status() {
        let mut idle = tracker(1);
        idle.reset();

        let mut running = tracker(1);
        running.start(0);
        running.advance_to(9000);
        running.reset();

        let mut paused = tracker(1);
        paused.start(0);
        paused.advance_to(5000);
        paused.pause();
        paused.reset();

        let mut finished = tracker(1);
        finished.start(0);
        finished.advance_to(60_000);
        finished.reset();

        for t in [&idle, &running, &paused, &finished] {
            assert_eq!(t.elapsed_ms(), 0);
            assert_eq!(t.phase(), Phase::Inhale);
            assert_eq!(t.status(), Status::Idle);
            assert_eq!(t.next_deadline(), None);
        }
    }

    #[test]
    fn restarting_mid_session_does_not_record() {
        let mut t = tracker(1);
        t.start(0);
        t.advance_to(45_000);
        t.start(45_000);
        assert_eq!(t.elapsed_ms(), 0);

        t.advance_to(104_999);
        assert_eq!(t.status(), Status::Running);
        assert!(t.store().is_empty());

        t.advance_to(105_000);
        assert_eq!(t.status(), Status::Finished);
        assert_eq!(t.store().len(), 1);
    }

    #[test]
    fn lowering_target_mid_session_clamps_elapsed() {
        let mut t = tracker(5);
        t.start(0);
        t.advance_to(90_000);

        t.set_session_minutes(1);
        let events = t.advance_to(91_000);
        assert_eq!(t.status(), Status::Finished);
        assert_eq!(t.elapsed_ms(), 60_000);
        assert!(matches!(
            events.last(),
            Some(Event::Completed(SessionRecord { duration: 1, .. }))
        ));
    }

    #[test]
    fn duration_edit_rearms_current_phase() {
        let mut t = tracker(5);
        t.start(0);
        t.advance_to(3000);
        t.set_durations(
            Durations {
                inhale_ms: 8000,
                ..Durations::default()
            },
            3000,
        );

        t.advance_to(4000);
        assert_eq!(t.phase(), Phase::Inhale);
        assert_eq!(t.phases.next_due(), Some(11_000));
        assert_eq!(t.elapsed_ms(), 4000);

        t.advance_to(11_000);
        assert_eq!(t.phase(), Phase::Hold);
        assert_eq!(t.phases.next_due(), Some(13_000));
    }

    #[test]
    fn duration_edit_with_zero_hold_passes_through() {
        let mut t = tracker(5);
        t.start(0);
        t.advance_to(4500);
        assert_eq!(t.phase(), Phase::Hold);

        t.set_durations(
            Durations {
                inhale_ms: 2000,
                hold_ms: 0,
                exhale_ms: 2000,
            },
            4500,
        );
        let events = t.advance_to(4500);
        let phases: Vec<Phase> = events
            .iter()
            .filter_map(|e| match e {
                Event::PhaseChanged { phase, .. } => Some(*phase),
                _ => None,
            })
            .collect();
        assert_eq!(phases, vec![Phase::Exhale]);
        assert_eq!(t.phases.next_due(), Some(6500));
    }

    #[test]
    fn duration_edit_while_paused_waits_for_restart() {
        let mut t = tracker(5);
        t.start(0);
        t.advance_to(2000);
        t.pause();
        t.set_durations(
            Durations {
                inhale_ms: 6000,
                ..Durations::default()
            },
            2500,
        );
        assert_eq!(t.next_deadline(), None);

        t.resume(3000);
        assert_eq!(t.phases.next_due(), Some(9000));
    }

    #[test]
    fn start_with_huge_durations_does_not_overflow() {
        let durations = Durations {
            inhale_ms: 4000,
            hold_ms: u64::MAX / 2 + 1,
            exhale_ms: 4000,
        };
        let mut t = SessionTracker::new(durations, 1, Vec::<SessionRecord>::new());
        t.start(0);
        t.advance_to(60_000);
        assert_eq!(t.phase(), Phase::Hold);
        assert_eq!(t.status(), Status::Finished);
    }

    #[test]
    fn events_are_in_time_order() {
        let mut t = tracker(5);
        t.start(0);
        let events = t.advance_to(4000);

        assert_eq!(
            events,
            vec![
                Event::Ticked { elapsed_ms: 1000 },
                Event::Ticked { elapsed_ms: 2000 },
                Event::Ticked { elapsed_ms: 3000 },
                Event::Ticked { elapsed_ms: 4000 },
                Event::PhaseChanged {
                    phase: Phase::Hold,
                    scale: 1.5,
                    at_ms: 4000
                },
            ]
        );
    }

    #[test]
    fn failed_save_still_completes() {
        let mut t = SessionTracker::new(Durations::default(), 1, BrokenStore);
        t.start(0);
        let events = t.advance_to(60_000);
        assert_eq!(t.status(), Status::Finished);
        assert!(matches!(events.as_slice(), [Event::Completed(_)]));
    }

    #[test]
    fn clock_formatting() {
        assert_eq!(format_clock(0, 5), "0:00 / 5:00");
        assert_eq!(format_clock(61_000, 5), "1:01 / 5:00");
        assert_eq!(format_clock(599_000, 10), "9:59 / 10:00");

        let mut t = tracker(3);
        t.start(0);
        t.advance_to(75_000);
        assert_eq!(t.clock(), "1:15 / 3:00");
        assert!((t.progress() - 75.0 / 180.0).abs() < 1e-9);
    }

    #[test]
    fn record_serializes_with_millisecond_timestamp() {
        let record = SessionRecord {
            date: DateTime::parse_from_rfc3339("2024-05-01T08:30:00Z")
                .unwrap()
                .with_timezone(&Utc),
            duration: 5,
        };
        let json = serde_json::to_string(&record).unwrap();
        assert_eq!(json, r#"{"date":"2024-05-01T08:30:00.000Z","duration":5}"#);

        let back: SessionRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);
    }
}
