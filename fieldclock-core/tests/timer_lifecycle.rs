use chrono::{DateTime, Duration, TimeZone, Utc};
use fieldclock_core::{
    aggregate_display_duration, format_hms, next_status, TimerEvent, TimerState, TimerStatus,
    TrackerError,
};

fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 4, h, m, s).unwrap()
}

#[test]
fn field_day_with_two_tasks() {
    let mut day = TimerState::new();
    let mut survey = TimerState::new();
    let mut report = TimerState::new();

    day.start(at(8, 0, 0)).unwrap();
    survey.start(at(8, 15, 0)).unwrap();
    survey.pause(at(9, 0, 0)).unwrap();
    report.start(at(9, 0, 0)).unwrap();
    day.pause(at(12, 0, 0)).unwrap();
    day.resume(at(12, 30, 0)).unwrap();

    let now = at(13, 0, 0);
    assert_eq!(day.display_duration(now), 4 * 3600 + 1800);
    assert_eq!(survey.display_duration(now), 2700);
    assert_eq!(report.display_duration(now), 4 * 3600);
    assert_eq!(
        aggregate_display_duration(now, [&day, &survey, &report]),
        4 * 3600 + 1800 + 2700 + 4 * 3600
    );

    report.finish(at(13, 0, 0)).unwrap();
    survey.finish(at(13, 0, 0)).unwrap();
    day.finish(at(16, 30, 0)).unwrap();

    assert_eq!(day.accumulated_duration(), 8 * 3600);
    assert_eq!(format_hms(day.accumulated_duration()), "08:00:00");
    assert_eq!(day.sessions().len(), 2);
    assert_eq!(survey.sessions().len(), 1);
    assert_eq!(report.actual_end_time(), Some(at(13, 0, 0)));
}

#[test]
fn transition_table_matches_tracker() {
    let statuses = [
        TimerStatus::NotStarted,
        TimerStatus::InProgress,
        TimerStatus::Paused,
        TimerStatus::Completed,
    ];
    for status in statuses {
        let mut timer = TimerState::new();
        let t0 = at(9, 0, 0);
        match status {
            TimerStatus::NotStarted => {}
            TimerStatus::InProgress => timer.start(t0).unwrap(),
            TimerStatus::Paused => {
                timer.start(t0).unwrap();
                timer.pause(t0).unwrap();
            }
            TimerStatus::Completed => timer.finish(t0).unwrap(),
        }
        for event in TimerEvent::ALL {
            let mut attempt = timer.clone();
            let result = attempt.apply(event, t0 + Duration::minutes(1));
            match next_status(status, event) {
                Some(expected) => {
                    assert!(result.is_ok(), "{event} from {status}");
                    assert_eq!(attempt.status(), expected);
                }
                None => {
                    assert_eq!(
                        result,
                        Err(TrackerError::InvalidStateTransition { from: status, event })
                    );
                    assert_eq!(attempt, timer);
                }
            }
        }
    }
}

#[test]
fn error_messages_name_the_transition() {
    let mut timer = TimerState::new();
    let err = timer.pause(at(9, 0, 0)).unwrap_err();
    assert_eq!(err.to_string(), "cannot pause a timer that is not started");
}
