//daemon.rs
use crate::reminder::{AlarmService, ReminderPayload};
use chrono::{DateTime, Local};
use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};

#[cfg(all(unix, not(target_os = "macos")))]
use notify_rust::Notification;

#[cfg(target_os = "windows")]
use notifica::notify;

#[cfg(target_os = "macos")]
use mac_notification_sys::send_notification;

// Upper bound on a single sleep so wall-clock jumps are picked up.
const POLL_INTERVAL: Duration = Duration::from_secs(60);

/// Shows a fired reminder to the user.
pub trait NotificationSink: Send + Sync {
    fn present(&self, payload: &ReminderPayload);
}

pub struct DesktopNotifier;

impl NotificationSink for DesktopNotifier {
    fn present(&self, payload: &ReminderPayload) {
        if let Err(e) = show_notification(&payload.title, &payload.message) {
            warn!(task_id = payload.task_id, error = %e, "failed to show notification");
        }
    }
}

#[cfg(all(unix, not(target_os = "macos")))]
fn show_notification(title: &str, body: &str) -> Result<(), String> {
    Notification::new()
        .summary(title)
        .body(body)
        .appname("todo-reminder")
        .show()
        .map(|_| ())
        .map_err(|e| e.to_string())
}

#[cfg(target_os = "windows")]
fn show_notification(title: &str, body: &str) -> Result<(), String> {
    notify(title, body).map_err(|e| format!("{:?}", e))
}

#[cfg(target_os = "macos")]
fn show_notification(title: &str, body: &str) -> Result<(), String> {
    send_notification(title, None, body, None)
        .map(|_| ())
        .map_err(|e| e.to_string())
}

struct PendingAlarm {
    at: DateTime<Local>,
    payload: ReminderPayload,
}

#[derive(Default)]
struct AlarmTable {
    pending: HashMap<i64, PendingAlarm>,
    shutdown: bool,
}

struct Shared {
    table: Mutex<AlarmTable>,
    wake: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, AlarmTable> {
        self.table.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// In-process alarm clock: one worker thread, one pending alarm per request
/// id, each alarm fires at most once.
pub struct DesktopAlarms {
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl DesktopAlarms {
    pub fn start(sink: Arc<dyn NotificationSink>) -> Self {
        let shared = Arc::new(Shared {
            table: Mutex::new(AlarmTable::default()),
            wake: Condvar::new(),
        });
        let worker_shared = shared.clone();
        let worker = thread::spawn(move || run_worker(&worker_shared, sink.as_ref()));
        Self {
            shared,
            worker: Mutex::new(Some(worker)),
        }
    }

    pub fn pending(&self) -> Vec<i64> {
        let mut ids: Vec<i64> = self.shared.lock().pending.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn shutdown(&self) {
        self.shared.lock().shutdown = true;
        self.shared.wake.notify_all();
        let handle = self
            .worker
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(handle) = handle {
            let _ = handle.join();
        }
    }
}

impl Drop for DesktopAlarms {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl AlarmService for DesktopAlarms {
    fn can_schedule_exact(&self) -> bool {
        true
    }

    fn request_exact_permission(&self) {}

    fn set_exact(&self, request_id: i64, at: DateTime<Local>, payload: ReminderPayload) {
        let replaced = self
            .shared
            .lock()
            .pending
            .insert(request_id, PendingAlarm { at, payload })
            .is_some();
        if replaced {
            debug!(request_id, "replaced pending alarm");
        }
        self.shared.wake.notify_all();
    }

    fn cancel(&self, request_id: i64) {
        if self.shared.lock().pending.remove(&request_id).is_some() {
            debug!(request_id, "alarm cancelled");
            self.shared.wake.notify_all();
        }
    }
}

fn run_worker(shared: &Shared, sink: &dyn NotificationSink) {
    let mut table = shared.lock();
    loop {
        if table.shutdown {
            return;
        }

        let now = Local::now();
        let due: Vec<i64> = table
            .pending
            .iter()
            .filter(|(_, alarm)| alarm.at <= now)
            .map(|(id, _)| *id)
            .collect();

        if !due.is_empty() {
            let fired: Vec<(i64, PendingAlarm)> = due
                .into_iter()
                .filter_map(|id| table.pending.remove(&id).map(|alarm| (id, alarm)))
                .collect();
            drop(table);
            for (id, alarm) in fired {
                info!(request_id = id, "reminder fired");
                sink.present(&alarm.payload);
            }
            table = shared.lock();
            continue;
        }

        let wait = table
            .pending
            .values()
            .map(|alarm| alarm.at)
            .min()
            .map(|next| (next - now).to_std().unwrap_or(Duration::ZERO).min(POLL_INTERVAL))
            .unwrap_or(POLL_INTERVAL);
        table = match shared.wake.wait_timeout(table, wait) {
            Ok((guard, _)) => guard,
            Err(poisoned) => poisoned.into_inner().0,
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use std::sync::mpsc;

    struct ChannelSink(Mutex<mpsc::Sender<ReminderPayload>>);

    impl NotificationSink for ChannelSink {
        fn present(&self, payload: &ReminderPayload) {
            let _ = self.0.lock().unwrap().send(payload.clone());
        }
    }

    fn alarms() -> (DesktopAlarms, mpsc::Receiver<ReminderPayload>) {
        let (tx, rx) = mpsc::channel();
        (DesktopAlarms::start(Arc::new(ChannelSink(Mutex::new(tx)))), rx)
    }

    fn payload(task_id: i64, title: &str) -> ReminderPayload {
        ReminderPayload {
            title: title.into(),
            message: "You have a task scheduled at 08:30 AM on Jan 05, 2025.".into(),
            task_id,
        }
    }

    #[test]
    fn fires_once_when_due() {
        let (alarms, rx) = alarms();
        alarms.set_exact(
            3,
            Local::now() + ChronoDuration::milliseconds(50),
            payload(3, "soon"),
        );
        let got = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(got.task_id, 3);
        assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());
        assert!(alarms.pending().is_empty());
    }

    #[test]
    fn same_id_replaces_pending_alarm() {
        let (alarms, rx) = alarms();
        alarms.set_exact(7, Local::now() + ChronoDuration::hours(1), payload(7, "old"));
        alarms.set_exact(
            7,
            Local::now() + ChronoDuration::milliseconds(50),
            payload(7, "new"),
        );
        assert_eq!(alarms.pending(), vec![7]);

        let got = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(got.title, "new");
        assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());
        assert!(alarms.pending().is_empty());
    }

    #[test]
    fn cancelled_alarm_never_fires() {
        let (alarms, rx) = alarms();
        alarms.set_exact(
            1,
            Local::now() + ChronoDuration::milliseconds(200),
            payload(1, "x"),
        );
        alarms.cancel(1);
        assert!(alarms.pending().is_empty());
        assert!(rx.recv_timeout(Duration::from_millis(500)).is_err());
    }

    #[test]
    fn shutdown_stops_worker_with_alarms_pending() {
        let (alarms, _rx) = alarms();
        alarms.set_exact(9, Local::now() + ChronoDuration::hours(2), payload(9, "later"));
        alarms.shutdown();
        assert_eq!(alarms.pending(), vec![9]);
    }
}
