//! Elapsed-time tracking for work days and tasks.
//!
//! A [`TimerState`] accumulates active seconds across any number of
//! start/pause/resume cycles and ends in a terminal `Completed` state. Every
//! operation takes `now` from the caller, so the tracker never reads the clock
//! itself and a UI can evaluate many trackers against the same instant.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::TrackerError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimerStatus {
    #[default]
    NotStarted,
    InProgress,
    Paused,
    Completed,
}

impl fmt::Display for TimerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TimerStatus::NotStarted => "not started",
            TimerStatus::InProgress => "in progress",
            TimerStatus::Paused => "paused",
            TimerStatus::Completed => "completed",
        };
        f.write_str(label)
    }
}

/// User-driven events that move a tracker between states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimerEvent {
    Start,
    Pause,
    Resume,
    Finish,
}

impl TimerEvent {
    pub const ALL: [TimerEvent; 4] = [
        TimerEvent::Start,
        TimerEvent::Pause,
        TimerEvent::Resume,
        TimerEvent::Finish,
    ];
}

impl fmt::Display for TimerEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TimerEvent::Start => "start",
            TimerEvent::Pause => "pause",
            TimerEvent::Resume => "resume",
            TimerEvent::Finish => "finish",
        };
        f.write_str(label)
    }
}

/// The transition table. `None` means the event is rejected from `from`.
pub fn next_status(from: TimerStatus, event: TimerEvent) -> Option<TimerStatus> {
    use TimerEvent::*;
    use TimerStatus::*;
    match (from, event) {
        (NotStarted | Paused, Start) => Some(InProgress),
        (Paused, Resume) => Some(InProgress),
        (InProgress, Pause) => Some(Paused),
        (NotStarted | InProgress | Paused, Finish) => Some(Completed),
        _ => None,
    }
}

/// One closed interval of active work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    /// Whole seconds, never negative even when the clock went backwards.
    pub duration: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawTimerState")]
pub struct TimerState {
    status: TimerStatus,
    accumulated_duration: u64,
    current_session_start: Option<DateTime<Utc>>,
    sessions: Vec<SessionRecord>,
    actual_start_time: Option<DateTime<Utc>>,
    actual_end_time: Option<DateTime<Utc>>,
}

impl TimerState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self) -> TimerStatus {
        self.status
    }

    /// Seconds from closed sessions only.
    pub fn accumulated_duration(&self) -> u64 {
        self.accumulated_duration
    }

    pub fn current_session_start(&self) -> Option<DateTime<Utc>> {
        self.current_session_start
    }

    pub fn sessions(&self) -> &[SessionRecord] {
        &self.sessions
    }

    pub fn actual_start_time(&self) -> Option<DateTime<Utc>> {
        self.actual_start_time
    }

    pub fn actual_end_time(&self) -> Option<DateTime<Utc>> {
        self.actual_end_time
    }

    pub fn is_running(&self) -> bool {
        self.status == TimerStatus::InProgress
    }

    pub fn is_completed(&self) -> bool {
        self.status == TimerStatus::Completed
    }

    pub fn can(&self, event: TimerEvent) -> bool {
        next_status(self.status, event).is_some()
    }

    pub fn can_start(&self) -> bool {
        self.can(TimerEvent::Start)
    }

    pub fn can_pause(&self) -> bool {
        self.can(TimerEvent::Pause)
    }

    pub fn can_resume(&self) -> bool {
        self.can(TimerEvent::Resume)
    }

    pub fn can_finish(&self) -> bool {
        self.can(TimerEvent::Finish)
    }

    /// Events that are legal right now, in a stable order.
    pub fn available_events(&self) -> Vec<TimerEvent> {
        TimerEvent::ALL
            .into_iter()
            .filter(|event| self.can(*event))
            .collect()
    }

    fn check(&self, event: TimerEvent) -> Result<(), TrackerError> {
        if self.can(event) {
            Ok(())
        } else {
            Err(TrackerError::InvalidStateTransition {
                from: self.status,
                event,
            })
        }
    }

    pub fn start(&mut self, now: DateTime<Utc>) -> Result<(), TrackerError> {
        self.check(TimerEvent::Start)?;
        self.open_session(now);
        Ok(())
    }

    pub fn pause(&mut self, now: DateTime<Utc>) -> Result<(), TrackerError> {
        self.check(TimerEvent::Pause)?;
        self.close_session(now);
        self.status = TimerStatus::Paused;
        Ok(())
    }

    pub fn resume(&mut self, now: DateTime<Utc>) -> Result<(), TrackerError> {
        self.check(TimerEvent::Resume)?;
        self.open_session(now);
        Ok(())
    }

    /// Closes any open session and locks the tracker. Finishing a tracker
    /// that never started is allowed and leaves it with zero duration.
    pub fn finish(&mut self, now: DateTime<Utc>) -> Result<(), TrackerError> {
        self.check(TimerEvent::Finish)?;
        if self.status == TimerStatus::InProgress {
            self.close_session(now);
        }
        self.status = TimerStatus::Completed;
        self.actual_end_time = Some(now);
        Ok(())
    }

    pub fn apply(&mut self, event: TimerEvent, now: DateTime<Utc>) -> Result<(), TrackerError> {
        match event {
            TimerEvent::Start => self.start(now),
            TimerEvent::Pause => self.pause(now),
            TimerEvent::Resume => self.resume(now),
            TimerEvent::Finish => self.finish(now),
        }
    }

    /// The event a single play/pause button maps to from the current state.
    pub fn toggle_event(&self) -> Option<TimerEvent> {
        match self.status {
            TimerStatus::NotStarted => Some(TimerEvent::Start),
            TimerStatus::InProgress => Some(TimerEvent::Pause),
            TimerStatus::Paused => Some(TimerEvent::Resume),
            TimerStatus::Completed => None,
        }
    }

    pub fn toggle(&mut self, now: DateTime<Utc>) -> Result<TimerEvent, TrackerError> {
        let event = self.toggle_event().ok_or(TrackerError::InvalidStateTransition {
            from: self.status,
            event: TimerEvent::Start,
        })?;
        self.apply(event, now)?;
        Ok(event)
    }

    /// Accumulated seconds plus the live part of an open session. Reads only.
    pub fn display_duration(&self, now: DateTime<Utc>) -> u64 {
        match (self.status, self.current_session_start) {
            (TimerStatus::InProgress, Some(started)) => self
                .accumulated_duration
                .saturating_add(elapsed_secs(started, now).max(0) as u64),
            _ => self.accumulated_duration,
        }
    }

    fn open_session(&mut self, now: DateTime<Utc>) {
        self.status = TimerStatus::InProgress;
        self.current_session_start = Some(now);
        self.actual_start_time.get_or_insert(now);
    }

    fn close_session(&mut self, now: DateTime<Utc>) {
        let Some(started) = self.current_session_start.take() else {
            return;
        };
        let elapsed = elapsed_secs(started, now);
        if elapsed < 0 {
            warn!(
                skew_secs = -elapsed,
                session_start = %started,
                now = %now,
                "clock moved backwards during a session, clamping its duration to zero"
            );
        }
        let duration = elapsed.max(0) as u64;
        self.sessions.push(SessionRecord {
            start_time: started,
            end_time: now,
            duration,
        });
        self.accumulated_duration = self.accumulated_duration.saturating_add(duration);
    }

    fn validate(&self) -> Result<(), TrackerError> {
        let running = self.status == TimerStatus::InProgress;
        if running != self.current_session_start.is_some() {
            return Err(TrackerError::Corrupt(format!(
                "status is {} but an open session is {}",
                self.status,
                if self.current_session_start.is_some() {
                    "recorded"
                } else {
                    "missing"
                }
            )));
        }
        let total: u64 = self.sessions.iter().map(|s| s.duration).sum();
        if total != self.accumulated_duration {
            return Err(TrackerError::Corrupt(format!(
                "accumulated duration {} does not match session total {}",
                self.accumulated_duration, total
            )));
        }
        if (running || !self.sessions.is_empty()) && self.actual_start_time.is_none() {
            return Err(TrackerError::Corrupt(
                "timer has run without an actual start time".to_string(),
            ));
        }
        if self.is_completed() != self.actual_end_time.is_some() {
            return Err(TrackerError::Corrupt(format!(
                "status is {} but actual end time is {}",
                self.status,
                if self.actual_end_time.is_some() {
                    "set"
                } else {
                    "unset"
                }
            )));
        }
        Ok(())
    }
}

/// Mirror of [`TimerState`] used to check invariants before accepting
/// persisted data.
#[derive(Deserialize)]
struct RawTimerState {
    #[serde(default)]
    status: TimerStatus,
    #[serde(default)]
    accumulated_duration: u64,
    #[serde(default)]
    current_session_start: Option<DateTime<Utc>>,
    #[serde(default)]
    sessions: Vec<SessionRecord>,
    #[serde(default)]
    actual_start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    actual_end_time: Option<DateTime<Utc>>,
}

impl TryFrom<RawTimerState> for TimerState {
    type Error = TrackerError;

    fn try_from(raw: RawTimerState) -> Result<Self, Self::Error> {
        let state = TimerState {
            status: raw.status,
            accumulated_duration: raw.accumulated_duration,
            current_session_start: raw.current_session_start,
            sessions: raw.sessions,
            actual_start_time: raw.actual_start_time,
            actual_end_time: raw.actual_end_time,
        };
        state.validate()?;
        Ok(state)
    }
}

fn elapsed_secs(from: DateTime<Utc>, to: DateTime<Utc>) -> i64 {
    (to - from).num_seconds()
}

/// Sums the display durations of a parent and its children at one instant.
pub fn aggregate_display_duration<'a, I>(now: DateTime<Utc>, trackers: I) -> u64
where
    I: IntoIterator<Item = &'a TimerState>,
{
    trackers
        .into_iter()
        .fold(0u64, |total, tracker| {
            total.saturating_add(tracker.display_duration(now))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 4, h, m, s).unwrap()
    }

    fn assert_invariants(state: &TimerState) {
        assert_eq!(
            state.is_running(),
            state.current_session_start().is_some(),
            "running flag and open session disagree"
        );
        let total: u64 = state.sessions().iter().map(|s| s.duration).sum();
        assert_eq!(state.accumulated_duration(), total);
    }

    #[test]
    fn display_counts_open_session() {
        let mut timer = TimerState::new();
        timer.start(at(9, 0, 0)).unwrap();
        assert_eq!(timer.display_duration(at(9, 0, 5)), 5);
        assert_eq!(timer.accumulated_duration(), 0);
    }

    #[test]
    fn pause_closes_session() {
        let mut timer = TimerState::new();
        timer.start(at(9, 0, 0)).unwrap();
        timer.pause(at(9, 30, 0)).unwrap();

        assert_eq!(timer.accumulated_duration(), 1800);
        assert_eq!(
            timer.sessions(),
            &[SessionRecord {
                start_time: at(9, 0, 0),
                end_time: at(9, 30, 0),
                duration: 1800,
            }]
        );
        assert_eq!(timer.status(), TimerStatus::Paused);
        assert_eq!(timer.current_session_start(), None);
    }

    #[test]
    fn resume_then_finish_accumulates_both_sessions() {
        let mut timer = TimerState::new();
        timer.start(at(9, 0, 0)).unwrap();
        timer.pause(at(9, 30, 0)).unwrap();
        timer.resume(at(10, 0, 0)).unwrap();
        timer.finish(at(10, 5, 0)).unwrap();

        assert_eq!(timer.accumulated_duration(), 2100);
        assert_eq!(timer.sessions().len(), 2);
        assert_eq!(timer.status(), TimerStatus::Completed);
        assert_eq!(timer.actual_end_time(), Some(at(10, 5, 0)));
        assert_eq!(timer.actual_start_time(), Some(at(9, 0, 0)));
    }

    #[test]
    fn finish_without_start() {
        let mut timer = TimerState::new();
        timer.finish(at(17, 0, 0)).unwrap();

        assert_eq!(timer.accumulated_duration(), 0);
        assert_eq!(timer.status(), TimerStatus::Completed);
        assert_eq!(timer.actual_end_time(), Some(at(17, 0, 0)));
        assert!(timer.sessions().is_empty());
        assert_eq!(timer.actual_start_time(), None);
    }

    #[test]
    fn finish_from_paused_adds_no_session() {
        let mut timer = TimerState::new();
        timer.start(at(9, 0, 0)).unwrap();
        timer.pause(at(9, 10, 0)).unwrap();
        timer.finish(at(12, 0, 0)).unwrap();

        assert_eq!(timer.sessions().len(), 1);
        assert_eq!(timer.accumulated_duration(), 600);
    }

    #[test]
    fn parent_and_child_aggregate_at_same_instant() {
        let t0 = at(8, 0, 0);
        let day = TimerState {
            status: TimerStatus::InProgress,
            accumulated_duration: 3600,
            current_session_start: Some(t0),
            sessions: vec![SessionRecord {
                start_time: at(6, 0, 0),
                end_time: at(7, 0, 0),
                duration: 3600,
            }],
            actual_start_time: Some(at(6, 0, 0)),
            actual_end_time: None,
        };
        let task = TimerState {
            status: TimerStatus::InProgress,
            accumulated_duration: 600,
            current_session_start: Some(t0),
            sessions: vec![SessionRecord {
                start_time: at(7, 0, 0),
                end_time: at(7, 10, 0),
                duration: 600,
            }],
            actual_start_time: Some(at(7, 0, 0)),
            actual_end_time: None,
        };
        let now = t0 + Duration::seconds(60);

        assert_eq!(day.display_duration(now), 3660);
        assert_eq!(task.display_duration(now), 660);
        assert_eq!(aggregate_display_duration(now, [&day, &task]), 4320);
    }

    #[test]
    fn resume_keeps_first_start_time() {
        let mut timer = TimerState::new();
        timer.start(at(9, 0, 0)).unwrap();
        timer.pause(at(9, 1, 0)).unwrap();
        timer.resume(at(9, 2, 0)).unwrap();
        timer.pause(at(9, 3, 0)).unwrap();
        timer.start(at(9, 4, 0)).unwrap();

        assert_eq!(timer.actual_start_time(), Some(at(9, 0, 0)));
        assert_eq!(timer.current_session_start(), Some(at(9, 4, 0)));
    }

    #[test]
    fn completed_is_terminal() {
        let mut timer = TimerState::new();
        timer.start(at(9, 0, 0)).unwrap();
        timer.finish(at(9, 10, 0)).unwrap();
        let frozen = timer.clone();

        for event in TimerEvent::ALL {
            let err = timer.apply(event, at(10, 0, 0)).unwrap_err();
            assert_eq!(
                err,
                TrackerError::InvalidStateTransition {
                    from: TimerStatus::Completed,
                    event,
                }
            );
            assert_eq!(timer, frozen);
        }
        assert!(timer.toggle(at(10, 0, 0)).is_err());
        assert!(timer.available_events().is_empty());
    }

    #[test]
    fn rejected_transitions_leave_state_unchanged() {
        let mut timer = TimerState::new();
        assert!(timer.pause(at(9, 0, 0)).is_err());
        assert!(timer.resume(at(9, 0, 0)).is_err());
        assert_eq!(timer, TimerState::new());

        timer.start(at(9, 0, 0)).unwrap();
        let running = timer.clone();
        assert!(timer.start(at(9, 5, 0)).is_err());
        assert!(timer.resume(at(9, 5, 0)).is_err());
        assert_eq!(timer, running);
    }

    #[test]
    fn backwards_clock_is_clamped() {
        let mut timer = TimerState::new();
        timer.start(at(9, 0, 0)).unwrap();
        assert_eq!(timer.display_duration(at(8, 59, 0)), 0);

        timer.pause(at(8, 59, 0)).unwrap();
        assert_eq!(timer.sessions()[0].duration, 0);
        assert_eq!(timer.accumulated_duration(), 0);
    }

    #[test]
    fn display_is_idempotent() {
        let mut timer = TimerState::new();
        timer.start(at(9, 0, 0)).unwrap();
        let now = at(11, 22, 33);
        assert_eq!(timer.display_duration(now), timer.display_duration(now));
    }

    #[test]
    fn partial_seconds_are_floored() {
        let mut timer = TimerState::new();
        let start = at(9, 0, 0);
        timer.start(start).unwrap();
        timer
            .pause(start + Duration::milliseconds(2_999))
            .unwrap();
        assert_eq!(timer.accumulated_duration(), 2);
    }

    #[test]
    fn invariants_hold_through_a_long_run() {
        let mut timer = TimerState::new();
        let mut now = at(6, 0, 0);
        let mut last_accumulated = 0;
        for step in 0..40u32 {
            now += Duration::seconds(i64::from(step % 7) * 13);
            let event = timer.toggle_event().unwrap();
            timer.apply(event, now).unwrap();
            assert_invariants(&timer);
            assert!(timer.accumulated_duration() >= last_accumulated);
            last_accumulated = timer.accumulated_duration();
        }
        timer.finish(now + Duration::seconds(30)).unwrap();
        assert_invariants(&timer);
        assert!(timer.accumulated_duration() >= last_accumulated);
    }

    #[test]
    fn available_events_follow_status() {
        let mut timer = TimerState::new();
        assert_eq!(
            timer.available_events(),
            vec![TimerEvent::Start, TimerEvent::Finish]
        );
        timer.start(at(9, 0, 0)).unwrap();
        assert_eq!(
            timer.available_events(),
            vec![TimerEvent::Pause, TimerEvent::Finish]
        );
        timer.pause(at(9, 1, 0)).unwrap();
        assert_eq!(
            timer.available_events(),
            vec![TimerEvent::Start, TimerEvent::Resume, TimerEvent::Finish]
        );
    }

    #[test]
    fn deserialize_accepts_valid_state() {
        let mut timer = TimerState::new();
        timer.start(at(9, 0, 0)).unwrap();
        timer.pause(at(9, 30, 0)).unwrap();

        let json = serde_json::to_string(&timer).unwrap();
        let back: TimerState = serde_json::from_str(&json).unwrap();
        assert_eq!(back, timer);
    }

    #[test]
    fn deserialize_rejects_running_without_session_start() {
        let json = r#"{"status":"in_progress","accumulated_duration":0,"sessions":[]}"#;
        let err = serde_json::from_str::<TimerState>(json).unwrap_err();
        assert!(err.to_string().contains("corrupt timer state"));
    }

    #[test]
    fn deserialize_rejects_mismatched_total() {
        let json = r#"{
            "status": "paused",
            "accumulated_duration": 99,
            "sessions": [{
                "start_time": "2024-03-04T09:00:00Z",
                "end_time": "2024-03-04T09:00:10Z",
                "duration": 10
            }],
            "actual_start_time": "2024-03-04T09:00:00Z"
        }"#;
        assert!(serde_json::from_str::<TimerState>(json).is_err());
    }
}
