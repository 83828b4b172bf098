// reminder.rs
use crate::error::ScheduleRejected;
use crate::todo::Task;
use chrono::{DateTime, Local, NaiveDateTime, TimeZone};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// "Jan 05, 2025" + "08:30 AM", joined with a space.
pub const DATE_FORMAT: &str = "%b %d, %Y";
pub const TIME_FORMAT: &str = "%I:%M %p";

const DEFAULT_TITLE: &str = "Reminder";

/// What the notification shows when the alarm fires.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReminderPayload {
    pub title: String,
    pub message: String,
    /// Id of the task, or 0 when it was never saved.
    pub task_id: i64,
}

impl ReminderPayload {
    pub fn for_task(task: &Task, date: &str, time: &str) -> Self {
        let title = if task.title.trim().is_empty() {
            DEFAULT_TITLE.to_string()
        } else {
            task.title.clone()
        };
        Self {
            title,
            message: format!("You have a task scheduled at {} on {}.", time, date),
            task_id: task.id.unwrap_or(0),
        }
    }
}

/// Something that can fire a one-shot callback at a wall-clock time.
pub trait AlarmService: Send + Sync {
    fn can_schedule_exact(&self) -> bool;

    /// Asks the user for exact-alarm access. Does not wait for an answer.
    fn request_exact_permission(&self);

    /// Registers the alarm, replacing any pending one with the same id.
    fn set_exact(&self, request_id: i64, at: DateTime<Local>, payload: ReminderPayload);

    /// Drops the pending alarm with this id, if any.
    fn cancel(&self, request_id: i64);
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ScheduleOutcome {
    /// The task has no date or no time.
    NotRequested,
    Registered {
        request_id: i64,
        at: DateTime<Local>,
    },
    /// Permission was requested; call again once it is granted.
    Deferred,
}

pub fn parse_reminder_time(date: &str, time: &str) -> Result<DateTime<Local>, ScheduleRejected> {
    let joined = format!("{} {}", date.trim(), time.trim());
    let naive = NaiveDateTime::parse_from_str(&joined, &format!("{} {}", DATE_FORMAT, TIME_FORMAT))
        .map_err(|e| ScheduleRejected::Parse(format!("'{}': {}", joined, e)))?;
    Local
        .from_local_datetime(&naive)
        .earliest()
        .ok_or_else(|| ScheduleRejected::Parse(format!("'{}' does not exist in local time", joined)))
}

pub struct ReminderScheduler {
    alarms: Arc<dyn AlarmService>,
}

impl ReminderScheduler {
    pub fn new(alarms: Arc<dyn AlarmService>) -> Self {
        Self { alarms }
    }

    pub fn schedule(&self, task: &Task) -> Result<ScheduleOutcome, ScheduleRejected> {
        self.schedule_at(task, Local::now())
    }

    /// Same as `schedule` with an explicit notion of "now". The task's
    /// recurrence is not consulted: every reminder fires once.
    pub fn schedule_at(
        &self,
        task: &Task,
        now: DateTime<Local>,
    ) -> Result<ScheduleOutcome, ScheduleRejected> {
        let (Some(date), Some(time)) = (task.date.as_deref(), task.time.as_deref()) else {
            return Ok(ScheduleOutcome::NotRequested);
        };

        let at = parse_reminder_time(date, time).inspect_err(|e| {
            warn!(error = %e, "failed to schedule reminder");
        })?;
        if at <= now {
            return Err(ScheduleRejected::PastTime);
        }

        if !self.alarms.can_schedule_exact() {
            info!("exact alarms not permitted; requesting permission");
            self.alarms.request_exact_permission();
            return Ok(ScheduleOutcome::Deferred);
        }

        let request_id = match task.id {
            Some(id) if id > 0 => id,
            _ => now.timestamp_millis(),
        };
        let payload = ReminderPayload::for_task(task, date, time);
        self.alarms.set_exact(request_id, at, payload);
        info!(request_id, at = %at, "reminder registered");
        Ok(ScheduleOutcome::Registered { request_id, at })
    }

    /// Drops any pending reminder keyed by the task's id. Unsaved tasks have
    /// no stable key, so there is nothing to drop for them.
    pub fn cancel(&self, task: &Task) {
        if let Some(id) = task.id.filter(|id| *id > 0) {
            self.alarms.cancel(id);
        }
    }

    /// Registers reminders for stored tasks after a restart, since pending
    /// alarms do not outlive the process. Returns how many were registered.
    pub fn rearm(&self, tasks: &[Task]) -> usize {
        let now = Local::now();
        tasks
            .iter()
            .filter(|t| !t.is_remote && !t.completed)
            .filter(|t| match self.schedule_at(t, now) {
                Ok(ScheduleOutcome::Registered { .. }) => true,
                Ok(_) => false,
                Err(e) => {
                    debug!(id = ?t.id, reason = %e, "not re-arming reminder");
                    false
                }
            })
            .count()
    }
}
