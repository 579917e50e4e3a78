use crate::config::Config;
use crate::persistence::{Record, Repository, SaveOutcome};
use chrono::{DateTime, NaiveDate, Utc};
use fieldclock_core::{
    aggregate_display_duration, Command, DaySummary, Response, SessionRecord, StatusReport, Target,
    TaskSummary, TimerEvent, TimerState, TimerStatus, TrackerError,
};
use serde::{Deserialize, Serialize};
use std::iter;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug, PartialEq, Eq)]
pub enum AppError {
    #[error(transparent)]
    Tracker(#[from] TrackerError),

    #[error("no task with id {0}")]
    UnknownTask(u32),

    #[error("task description cannot be empty")]
    EmptyDescription,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: u32,
    pub description: String,
    pub tracker: TimerState,
    pub created_at: DateTime<Utc>,
}

impl Task {
    pub fn summary(&self, now: DateTime<Utc>) -> TaskSummary {
        TaskSummary {
            id: self.id,
            description: self.description.clone(),
            status: self.tracker.status(),
            elapsed: self.tracker.display_duration(now),
        }
    }
}

/// One calendar day of work. The day and every task carry their own tracker.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkDay {
    pub date: NaiveDate,
    pub tracker: TimerState,
    pub tasks: Vec<Task>,
    pub next_task_id: u32,
    /// Bumped on every committed local change.
    pub version: u64,
}

impl Record for WorkDay {
    fn record_id(&self) -> String {
        day_key(self.date)
    }

    fn version(&self) -> u64 {
        self.version
    }
}

pub fn day_key(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

impl WorkDay {
    pub fn new(date: NaiveDate) -> Self {
        Self {
            date,
            tracker: TimerState::new(),
            tasks: vec![],
            next_task_id: 1,
            version: 0,
        }
    }

    pub fn task(&self, id: u32) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    pub fn tracker(&self, target: Target) -> Result<&TimerState, AppError> {
        match target {
            Target::Day => Ok(&self.tracker),
            Target::Task(id) => self
                .task(id)
                .map(|t| &t.tracker)
                .ok_or(AppError::UnknownTask(id)),
        }
    }

    pub fn tracker_mut(&mut self, target: Target) -> Result<&mut TimerState, AppError> {
        match target {
            Target::Day => Ok(&mut self.tracker),
            Target::Task(id) => self
                .tasks
                .iter_mut()
                .find(|t| t.id == id)
                .map(|t| &mut t.tracker)
                .ok_or(AppError::UnknownTask(id)),
        }
    }

    /// The day's own time plus every task's, all read at `now`.
    pub fn total_display(&self, now: DateTime<Utc>) -> u64 {
        aggregate_display_duration(
            now,
            iter::once(&self.tracker).chain(self.tasks.iter().map(|t| &t.tracker)),
        )
    }

    pub fn add_task(&mut self, description: &str, now: DateTime<Utc>) -> Result<u32, AppError> {
        let description = description.trim();
        if description.is_empty() {
            return Err(AppError::EmptyDescription);
        }
        let id = self.next_task_id;
        self.tasks.push(Task {
            id,
            description: description.to_string(),
            tracker: TimerState::new(),
            created_at: now,
        });
        self.next_task_id += 1;
        Ok(id)
    }

    pub fn remove_task(&mut self, id: u32) -> Result<Task, AppError> {
        let index = self
            .tasks
            .iter()
            .position(|t| t.id == id)
            .ok_or(AppError::UnknownTask(id))?;
        Ok(self.tasks.remove(index))
    }

    pub fn is_anything_running(&self) -> bool {
        self.tracker.is_running() || self.tasks.iter().any(|t| t.tracker.is_running())
    }

    pub fn running_tasks(&self) -> usize {
        self.tasks.iter().filter(|t| t.tracker.is_running()).count()
    }

    pub fn task_summaries(&self, now: DateTime<Utc>) -> Vec<TaskSummary> {
        self.tasks.iter().map(|t| t.summary(now)).collect()
    }

    pub fn summary(&self, now: DateTime<Utc>) -> DaySummary {
        DaySummary {
            date: self.date,
            status: self.tracker.status(),
            elapsed: self.tracker.display_duration(now),
            total: self.total_display(now),
            task_count: self.tasks.len(),
        }
    }

    /// Summary of a day that is no longer current. A session left open is
    /// not extended past the last committed transition.
    pub fn settled_summary(&self) -> DaySummary {
        let elapsed = self.tracker.accumulated_duration();
        let total = self
            .tasks
            .iter()
            .fold(elapsed, |sum, t| sum.saturating_add(t.tracker.accumulated_duration()));
        DaySummary {
            date: self.date,
            status: self.tracker.status(),
            elapsed,
            total,
            task_count: self.tasks.len(),
        }
    }

    pub fn status_report(&self, now: DateTime<Utc>, target_secs: u64) -> StatusReport {
        StatusReport {
            date: self.date,
            status: self.tracker.status(),
            elapsed: self.tracker.display_duration(now),
            total: self.total_display(now),
            target: target_secs,
            running_tasks: self.running_tasks(),
            available: self.tracker.available_events(),
        }
    }
}

#[derive(Default, Clone, PartialEq, Debug)]
pub enum AppMode {
    #[default]
    Normal,
    AddingTask,
    ShowSessions,
    ShowHelp,
}

pub struct App {
    pub day: WorkDay,
    pub selected_task: usize,
    pub mode: AppMode,
    pub input_buffer: String,
    pub config: Config,
    pub should_quit: bool,
    /// Last rejected action, shown in the status bar until the next key.
    pub status_message: Option<String>,
    target_notified: bool,
    dirty: bool,
    /// Earlier days whose last save failed, retried before the current one.
    pending: Vec<WorkDay>,
    repo: Box<dyn Repository<WorkDay>>,
}

impl App {
    /// Loads today's record, or starts a fresh day if the latest stored day
    /// belongs to another date.
    pub fn open(
        config: Config,
        repo: Box<dyn Repository<WorkDay>>,
        today: NaiveDate,
        now: DateTime<Utc>,
    ) -> anyhow::Result<Self> {
        let day = match repo.get(&day_key(today))? {
            Some(day) => day,
            None => {
                let previous = repo
                    .list()?
                    .into_iter()
                    .filter(|d| d.date < today)
                    .max_by_key(|d| d.date);
                if let Some(previous) = previous {
                    warn_if_left_open(&previous);
                }
                WorkDay::new(today)
            }
        };
        let target_notified = day.total_display(now) >= config.day.target_secs();
        info!(date = %day.date, version = day.version, tasks = day.tasks.len(), "work day loaded");
        let mut app = Self {
            day,
            selected_task: 0,
            mode: AppMode::Normal,
            input_buffer: String::new(),
            config,
            should_quit: false,
            status_message: None,
            target_notified,
            dirty: false,
            pending: Vec::new(),
            repo,
        };
        if app.day.version == 0 {
            app.commit();
        }
        Ok(app)
    }

    /// Replaces the current day once the local date has moved on. The old
    /// record stays in the repository unchanged. If it could not be saved it
    /// is kept aside and retried by every later `sync`.
    pub fn roll_over(&mut self, today: NaiveDate) {
        if self.day.date == today {
            return;
        }
        self.sync();
        warn_if_left_open(&self.day);
        info!(from = %self.day.date, to = %today, "starting a new work day");
        let previous = std::mem::replace(&mut self.day, WorkDay::new(today));
        if self.dirty {
            warn!(
                date = %previous.date,
                version = previous.version,
                "previous work day not saved yet"
            );
            self.pending.push(previous);
        }
        self.selected_task = 0;
        self.target_notified = false;
        self.commit();
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty || !self.pending.is_empty()
    }

    /// Records a local change and tries to persist it. A failed save keeps the
    /// change and leaves the day dirty for the next autosave.
    fn commit(&mut self) {
        self.day.version += 1;
        self.dirty = true;
        self.sync();
    }

    pub fn sync(&mut self) {
        let repo = self.repo.as_mut();
        self.pending.retain(|day| !save_day(repo, day));
        if self.dirty && save_day(self.repo.as_mut(), &self.day) {
            self.dirty = false;
        }
    }

    pub fn apply(
        &mut self,
        target: Target,
        event: TimerEvent,
        now: DateTime<Utc>,
    ) -> Result<(), AppError> {
        self.day.tracker_mut(target)?.apply(event, now)?;
        debug!(?target, %event, "timer transition");
        self.commit();
        Ok(())
    }

    pub fn add_task(&mut self, description: &str, now: DateTime<Utc>) -> Result<u32, AppError> {
        let id = self.day.add_task(description, now)?;
        self.selected_task = self.day.tasks.len() - 1;
        self.commit();
        Ok(id)
    }

    pub fn selected(&self) -> Option<&Task> {
        self.day.tasks.get(self.selected_task)
    }

    pub fn toggle_selected_task(&mut self, now: DateTime<Utc>) {
        let Some(task) = self.selected() else { return };
        let id = task.id;
        match task.tracker.toggle_event() {
            Some(event) => self.guarded(Target::Task(id), event, now),
            None => self.reject(TrackerError::InvalidStateTransition {
                from: TimerStatus::Completed,
                event: TimerEvent::Start,
            }),
        }
    }

    pub fn finish_selected_task(&mut self, now: DateTime<Utc>) {
        if let Some(id) = self.selected().map(|t| t.id) {
            self.guarded(Target::Task(id), TimerEvent::Finish, now);
        }
    }

    pub fn toggle_day(&mut self, now: DateTime<Utc>) {
        match self.day.tracker.toggle_event() {
            Some(event) => self.guarded(Target::Day, event, now),
            None => self.reject(TrackerError::InvalidStateTransition {
                from: TimerStatus::Completed,
                event: TimerEvent::Start,
            }),
        }
    }

    pub fn finish_day(&mut self, now: DateTime<Utc>) {
        self.guarded(Target::Day, TimerEvent::Finish, now);
    }

    /// UI path: rejected transitions are ignored apart from a status hint.
    fn guarded(&mut self, target: Target, event: TimerEvent, now: DateTime<Utc>) {
        if let Err(e) = self.apply(target, event, now) {
            self.reject(e);
        }
    }

    fn reject(&mut self, error: impl Into<AppError>) {
        let error = error.into();
        debug!(%error, "ignored action");
        self.status_message = Some(error.to_string());
    }

    pub fn delete_selected_task(&mut self) {
        let Some(id) = self.selected().map(|t| t.id) else {
            return;
        };
        if self.day.remove_task(id).is_ok() {
            if !self.day.tasks.is_empty() && self.selected_task >= self.day.tasks.len() {
                self.selected_task = self.day.tasks.len() - 1;
            }
            self.commit();
        }
    }

    pub fn move_selection_up(&mut self) {
        self.selected_task = self.selected_task.saturating_sub(1);
    }

    pub fn move_selection_down(&mut self) {
        if !self.day.tasks.is_empty() {
            self.selected_task = (self.selected_task + 1).min(self.day.tasks.len() - 1);
        }
    }

    pub fn handle_char(&mut self, c: char, now: DateTime<Utc>) {
        if self.mode != AppMode::AddingTask {
            return;
        }
        if c == '\n' {
            let description = std::mem::take(&mut self.input_buffer);
            if !description.trim().is_empty() {
                if let Err(e) = self.add_task(&description, now) {
                    self.reject(e);
                }
            }
            self.mode = AppMode::Normal;
        } else {
            self.input_buffer.push(c);
        }
    }

    pub fn handle_backspace(&mut self) {
        if self.mode == AppMode::AddingTask {
            self.input_buffer.pop();
        }
    }

    /// Returns the notification text the first time the day's total reaches
    /// its target while the day clock is running.
    pub fn take_target_notification(&mut self, now: DateTime<Utc>) -> Option<(String, String)> {
        let target = self.config.day.target_secs();
        if self.target_notified || target == 0 || !self.day.tracker.is_running() {
            return None;
        }
        if self.day.total_display(now) < target {
            return None;
        }
        self.target_notified = true;
        Some((
            "Daily target reached".to_string(),
            format!(
                "{} of work logged for {}",
                fieldclock_core::format_hms(self.day.total_display(now)),
                self.day.date
            ),
        ))
    }

    /// Like `take_target_notification`, but respects `day.notify`. The caller
    /// shows the result with `send_notification` once the app lock is released.
    pub fn due_notification(&mut self, now: DateTime<Utc>) -> Option<(String, String)> {
        if !self.config.day.notify {
            return None;
        }
        self.take_target_notification(now)
    }

    /// Stored days with the in-memory days standing in for their own records.
    /// Only the current day keeps counting; earlier days are settled.
    pub fn history(&self, now: DateTime<Utc>) -> anyhow::Result<Vec<DaySummary>> {
        let current = day_key(self.day.date);
        let pending: Vec<String> = self.pending.iter().map(|d| d.record_id()).collect();
        let mut days: Vec<DaySummary> = self
            .repo
            .list()?
            .into_iter()
            .filter(|d| {
                let key = d.record_id();
                key != current && !pending.contains(&key)
            })
            .map(|d| d.settled_summary())
            .collect();
        days.extend(self.pending.iter().map(WorkDay::settled_summary));
        days.push(self.day.summary(now));
        days.sort_by_key(|d| d.date);
        Ok(days)
    }

    pub fn sessions(&self, target: Target) -> Result<Vec<SessionRecord>, AppError> {
        Ok(self.day.tracker(target)?.sessions().to_vec())
    }

    /// Executes one IPC command against the current day.
    pub fn handle_command(&mut self, command: Command, now: DateTime<Utc>) -> Response {
        match command {
            Command::Start(target) => respond(self.apply(target, TimerEvent::Start, now)),
            Command::Pause(target) => respond(self.apply(target, TimerEvent::Pause, now)),
            Command::Resume(target) => respond(self.apply(target, TimerEvent::Resume, now)),
            Command::Finish(target) => respond(self.apply(target, TimerEvent::Finish, now)),
            Command::Status => {
                Response::Status(self.day.status_report(now, self.config.day.target_secs()))
            }
            Command::AddTask { description } => respond(self.add_task(&description, now)),
            Command::ListTasks => Response::Tasks(self.day.task_summaries(now)),
            Command::Sessions(target) => match self.sessions(target) {
                Ok(sessions) => Response::Sessions(sessions),
                Err(e) => Response::Error(e.to_string()),
            },
            Command::History => match self.history(now) {
                Ok(days) => Response::History(days),
                Err(e) => Response::Error(format!("{:#}", e)),
            },
        }
    }
}

fn respond<T>(result: Result<T, AppError>) -> Response {
    match result {
        Ok(_) => Response::Ok,
        Err(e) => Response::Error(e.to_string()),
    }
}

fn save_day(repo: &mut dyn Repository<WorkDay>, day: &WorkDay) -> bool {
    match repo.save(day) {
        Ok(outcome) => {
            if outcome == SaveOutcome::AlreadyCurrent {
                debug!(date = %day.date, version = day.version, "work day already persisted");
            }
            true
        }
        Err(e) => {
            warn!(
                error = %e,
                date = %day.date,
                version = day.version,
                "failed to save work day, will retry"
            );
            false
        }
    }
}

fn warn_if_left_open(day: &WorkDay) {
    if day.tracker.is_running() {
        warn!(date = %day.date, "previous work day was left running");
    }
}

pub fn send_notification(title: &str, body: &str) {
    if let Err(e) = notify_rust::Notification::new()
        .summary(title)
        .body(body)
        .appname("fieldclock")
        .show()
    {
        warn!(error = %e, "failed to send notification");
    }
}
