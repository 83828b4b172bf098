// app.rs
use crate::error::{ScheduleRejected, TaskError};
use crate::live::Subscription;
use crate::reminder::{ReminderScheduler, ScheduleOutcome};
use crate::store::TaskStore;
use crate::sync::{RefreshState, SyncedTaskView};
use crate::todo::{Recurrence, Task};
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver};
use tracing::debug;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Route {
    TaskList,
    EditTask(Option<i64>),
}

/// Something the screen layer should do in response to an event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UiEvent {
    PopBackStack,
    Navigate(Route),
    ShowMessage {
        message: String,
        action: Option<String>,
    },
}

impl UiEvent {
    fn message(message: &str) -> Self {
        UiEvent::ShowMessage {
            message: message.to_string(),
            action: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TaskListEvent {
    OpenTask(Task),
    DeleteTask(Task),
    ToggleDone(Task, bool),
    UndoDelete,
    AddTask,
    Refresh,
    DismissError,
}

/// List screen logic. Owns the one-deep undo slot for deletions.
pub struct TaskListSession {
    store: Arc<TaskStore>,
    view: Arc<SyncedTaskView>,
    scheduler: Arc<ReminderScheduler>,
    last_deleted: Option<Task>,
}

impl TaskListSession {
    pub fn new(
        store: Arc<TaskStore>,
        view: Arc<SyncedTaskView>,
        scheduler: Arc<ReminderScheduler>,
    ) -> Self {
        Self {
            store,
            view,
            scheduler,
            last_deleted: None,
        }
    }

    pub fn last_deleted(&self) -> Option<&Task> {
        self.last_deleted.as_ref()
    }

    pub fn on_event(&mut self, event: TaskListEvent) -> Option<UiEvent> {
        match event {
            TaskListEvent::OpenTask(task) => {
                if task.is_remote {
                    Some(UiEvent::message("Online todos cannot be edited"))
                } else {
                    Some(UiEvent::Navigate(Route::EditTask(task.id)))
                }
            }
            TaskListEvent::DeleteTask(task) => {
                if task.is_remote {
                    return Some(UiEvent::message("Online todos cannot be deleted"));
                }
                self.store.delete(&task);
                self.scheduler.cancel(&task);
                // A second delete overwrites the slot; only the latest can be undone.
                self.last_deleted = Some(task);
                Some(UiEvent::ShowMessage {
                    message: "Todo deleted".to_string(),
                    action: Some("Undo".to_string()),
                })
            }
            TaskListEvent::ToggleDone(task, completed) => {
                if task.is_remote {
                    return Some(UiEvent::message("Online todos are read-only"));
                }
                let stored = self.store.insert(Task { completed, ..task });
                if completed {
                    self.scheduler.cancel(&stored);
                } else {
                    self.restore_reminder(&stored);
                }
                None
            }
            TaskListEvent::UndoDelete => {
                if let Some(task) = self.last_deleted.take() {
                    debug!(id = ?task.id, "restoring deleted task");
                    let stored = self.store.insert(task);
                    if !stored.completed {
                        self.restore_reminder(&stored);
                    }
                }
                None
            }
            TaskListEvent::AddTask => Some(UiEvent::Navigate(Route::EditTask(None))),
            TaskListEvent::Refresh => {
                // Detached; the result arrives through the live feeds.
                let _ = self.view.refresh();
                None
            }
            TaskListEvent::DismissError => {
                self.view.dismiss_error();
                None
            }
        }
    }

    // No message here: a stale or missing schedule just means no reminder.
    fn restore_reminder(&self, task: &Task) {
        if let Err(e) = self.scheduler.schedule(task) {
            debug!(id = ?task.id, reason = %e, "reminder not restored");
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EditorEvent {
    TitleChanged(String),
    DescriptionChanged(String),
    DateChanged(String),
    TimeChanged(String),
    RecurrenceChanged(Recurrence),
    Save,
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() { None } else { Some(s) }
}

/// Add/edit screen logic.
pub struct TaskEditor {
    store: Arc<TaskStore>,
    scheduler: Arc<ReminderScheduler>,
    loaded: Option<Task>,
    pub title: String,
    pub description: String,
    pub date: String,
    pub time: String,
    pub recurrence: Recurrence,
}

impl TaskEditor {
    /// Starts blank, or pre-filled when `id` names a stored task.
    pub fn new(store: Arc<TaskStore>, scheduler: Arc<ReminderScheduler>, id: Option<i64>) -> Self {
        let loaded = id.and_then(|id| store.get_by_id(id));
        let mut editor = Self {
            store,
            scheduler,
            loaded: None,
            title: String::new(),
            description: String::new(),
            date: String::new(),
            time: String::new(),
            recurrence: Recurrence::None,
        };
        if let Some(task) = loaded {
            editor.title = task.title.clone();
            editor.description = task.description.clone().unwrap_or_default();
            editor.date = task.date.clone().unwrap_or_default();
            editor.time = task.time.clone().unwrap_or_default();
            editor.recurrence = task
                .recurrence
                .as_deref()
                .and_then(|r| r.parse().ok())
                .unwrap_or_default();
            editor.loaded = Some(task);
        }
        editor
    }

    pub fn editing_id(&self) -> Option<i64> {
        self.loaded.as_ref().and_then(|t| t.id)
    }

    pub fn on_event(&mut self, event: EditorEvent) -> Result<Vec<UiEvent>, TaskError> {
        match event {
            EditorEvent::TitleChanged(title) => self.title = title,
            EditorEvent::DescriptionChanged(description) => self.description = description,
            EditorEvent::DateChanged(date) => self.date = date,
            EditorEvent::TimeChanged(time) => self.time = time,
            EditorEvent::RecurrenceChanged(recurrence) => self.recurrence = recurrence,
            EditorEvent::Save => return self.save(),
        }
        Ok(Vec::new())
    }

    fn save(&mut self) -> Result<Vec<UiEvent>, TaskError> {
        if self.title.trim().is_empty() {
            return Err(TaskError::Validation("The title can't be empty".to_string()));
        }

        let task = Task {
            id: self.editing_id(),
            title: self.title.clone(),
            description: non_empty(self.description.clone()),
            completed: self.loaded.as_ref().map(|t| t.completed).unwrap_or(false),
            date: non_empty(self.date.trim().to_string()),
            time: non_empty(self.time.trim().to_string()),
            recurrence: Some(self.recurrence.label().to_string()),
            is_remote: false,
        };
        let stored = self.store.insert(task);
        self.loaded = Some(stored.clone());

        let mut events = Vec::new();
        if let Some(message) = self.reminder_message(&stored) {
            events.push(UiEvent::message(&message));
        }
        events.push(UiEvent::PopBackStack);
        Ok(events)
    }

    fn reminder_message(&self, task: &Task) -> Option<String> {
        let date = task.date.as_deref().unwrap_or_default();
        let time = task.time.as_deref().unwrap_or_default();
        let outcome = self.scheduler.schedule(task);
        if !matches!(outcome, Ok(ScheduleOutcome::Registered { .. })) {
            // An earlier reminder for this task must not outlive the edit.
            self.scheduler.cancel(task);
        }
        match outcome {
            Ok(ScheduleOutcome::NotRequested) => None,
            Ok(ScheduleOutcome::Registered { .. }) => {
                Some(format!("Reminder set for {} on {}", time, date))
            }
            Ok(ScheduleOutcome::Deferred) => {
                Some("Please enable exact alarms for reminders.".to_string())
            }
            Err(ScheduleRejected::PastTime) => {
                Some("Please select a future time for the reminder".to_string())
            }
            Err(ScheduleRejected::Parse(_)) => Some("Failed to set reminder".to_string()),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    Editing,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EditField {
    Title,
    Description,
    Date,
    Time,
}

impl EditField {
    pub fn next(self) -> Self {
        match self {
            EditField::Title => EditField::Description,
            EditField::Description => EditField::Date,
            EditField::Date => EditField::Time,
            EditField::Time => EditField::Title,
        }
    }
}

enum Inbound {
    Tasks(Vec<Task>),
    Refresh(RefreshState),
}

/// Everything the terminal front end needs in one place.
pub struct App {
    pub tasks: Vec<Task>,
    pub refresh: RefreshState,
    pub selected: usize,
    pub message: Option<(String, Option<String>)>,
    pub input_mode: InputMode,
    pub edit_field: EditField,
    pub editor: Option<TaskEditor>,
    store: Arc<TaskStore>,
    scheduler: Arc<ReminderScheduler>,
    session: TaskListSession,
    inbound: Receiver<Inbound>,
    _feed: Subscription,
    _status: Subscription,
}

impl App {
    pub fn new(
        store: Arc<TaskStore>,
        view: Arc<SyncedTaskView>,
        scheduler: Arc<ReminderScheduler>,
    ) -> Self {
        let (tx, inbound) = mpsc::channel();
        let status_tx = tx.clone();
        let feed = view.combined_feed(move |tasks| {
            let _ = tx.send(Inbound::Tasks(tasks.clone()));
        });
        let status = view.subscribe_state(move |state| {
            let _ = status_tx.send(Inbound::Refresh(state.clone()));
        });
        let mut app = Self {
            tasks: Vec::new(),
            refresh: RefreshState::Idle,
            selected: 0,
            message: None,
            input_mode: InputMode::Normal,
            edit_field: EditField::Title,
            editor: None,
            session: TaskListSession::new(store.clone(), view, scheduler.clone()),
            store,
            scheduler,
            inbound,
            _feed: feed,
            _status: status,
        };
        app.drain_inbound();
        app
    }

    /// Applies every update that arrived since the last frame.
    pub fn drain_inbound(&mut self) {
        for update in self.inbound.try_iter() {
            match update {
                Inbound::Tasks(tasks) => self.tasks = tasks,
                Inbound::Refresh(state) => self.refresh = state,
            }
        }
        if self.selected >= self.tasks.len() {
            self.selected = self.tasks.len().saturating_sub(1);
        }
    }

    pub fn selected_task(&self) -> Option<&Task> {
        self.tasks.get(self.selected)
    }

    pub fn select_next(&mut self) {
        if self.selected + 1 < self.tasks.len() {
            self.selected += 1;
        }
    }

    pub fn select_prev(&mut self) {
        self.selected = self.selected.saturating_sub(1);
    }

    pub fn list_event(&mut self, event: TaskListEvent) {
        if let Some(ui) = self.session.on_event(event) {
            self.handle_ui_event(ui);
        }
        self.drain_inbound();
    }

    pub fn editor_event(&mut self, event: EditorEvent) {
        let Some(editor) = self.editor.as_mut() else {
            return;
        };
        match editor.on_event(event) {
            Ok(events) => {
                for ui in events {
                    self.handle_ui_event(ui);
                }
            }
            Err(e) => self.message = Some((e.to_string(), None)),
        }
        self.drain_inbound();
    }

    pub fn can_undo(&self) -> bool {
        self.session.last_deleted().is_some()
    }

    pub fn cancel_edit(&mut self) {
        self.handle_ui_event(UiEvent::PopBackStack);
    }

    fn handle_ui_event(&mut self, event: UiEvent) {
        match event {
            UiEvent::Navigate(Route::EditTask(id)) => {
                self.editor = Some(TaskEditor::new(
                    self.store.clone(),
                    self.scheduler.clone(),
                    id,
                ));
                self.edit_field = EditField::Title;
                self.input_mode = InputMode::Editing;
                self.message = None;
            }
            UiEvent::Navigate(Route::TaskList) | UiEvent::PopBackStack => {
                self.editor = None;
                self.input_mode = InputMode::Normal;
            }
            UiEvent::ShowMessage { message, action } => self.message = Some((message, action)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reminder::tests::RecordingAlarms;
    use crate::sync::tests::{ScriptedSource, listing, remote};

    struct Fixture {
        store: Arc<TaskStore>,
        view: Arc<SyncedTaskView>,
        alarms: Arc<RecordingAlarms>,
        scheduler: Arc<ReminderScheduler>,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(TaskStore::in_memory());
        let view = Arc::new(SyncedTaskView::new(
            &store,
            Box::new(ScriptedSource::new(vec![listing(vec![remote(41, 3)])])),
        ));
        let alarms = Arc::new(RecordingAlarms::default());
        let scheduler = Arc::new(ReminderScheduler::new(alarms.clone()));
        Fixture {
            store,
            view,
            alarms,
            scheduler,
        }
    }

    fn online(id: i64) -> Task {
        remote(id, 3).into_task()
    }

    #[test]
    fn undo_restores_the_deleted_task_field_for_field() {
        let f = fixture();
        let mut session =
            TaskListSession::new(f.store.clone(), f.view.clone(), f.scheduler.clone());
        let task = f.store.insert(Task {
            description: Some("milk, eggs".into()),
            recurrence: Some("Weekly".into()),
            ..Task::new("groceries").with_schedule("Jan 05, 2030", "08:30 AM")
        });

        let shown = session.on_event(TaskListEvent::DeleteTask(task.clone()));
        assert_eq!(
            shown,
            Some(UiEvent::ShowMessage {
                message: "Todo deleted".into(),
                action: Some("Undo".into())
            })
        );
        assert!(f.store.snapshot().is_empty());

        session.on_event(TaskListEvent::UndoDelete);
        assert_eq!(f.store.snapshot(), vec![task]);
        assert!(session.last_deleted().is_none());
    }

    #[test]
    fn undo_after_two_deletes_restores_only_the_second() {
        let f = fixture();
        let mut session =
            TaskListSession::new(f.store.clone(), f.view.clone(), f.scheduler.clone());
        let first = f.store.insert(Task::new("first"));
        let second = f.store.insert(Task::new("second"));

        session.on_event(TaskListEvent::DeleteTask(first));
        session.on_event(TaskListEvent::DeleteTask(second.clone()));
        session.on_event(TaskListEvent::UndoDelete);
        session.on_event(TaskListEvent::UndoDelete);

        assert_eq!(f.store.snapshot(), vec![second]);
    }

    #[test]
    fn online_tasks_reject_edit_delete_and_toggle() {
        let f = fixture();
        let mut session =
            TaskListSession::new(f.store.clone(), f.view.clone(), f.scheduler.clone());
        f.view.refresh_blocking();

        let msg = |m: &str| Some(UiEvent::message(m));
        assert_eq!(
            session.on_event(TaskListEvent::OpenTask(online(41))),
            msg("Online todos cannot be edited")
        );
        assert_eq!(
            session.on_event(TaskListEvent::DeleteTask(online(41))),
            msg("Online todos cannot be deleted")
        );
        assert_eq!(
            session.on_event(TaskListEvent::ToggleDone(online(41), true)),
            msg("Online todos are read-only")
        );
        assert!(session.last_deleted().is_none());
        assert!(f.store.snapshot().is_empty());
        assert_eq!(f.view.merged().len(), 1);
    }

    #[test]
    fn toggle_done_rewrites_local_task() {
        let f = fixture();
        let mut session =
            TaskListSession::new(f.store.clone(), f.view.clone(), f.scheduler.clone());
        let task = f.store.insert(Task::new("walk"));
        session.on_event(TaskListEvent::ToggleDone(task.clone(), true));
        assert!(f.store.get_by_id(task.id.unwrap()).unwrap().completed);
    }

    #[test]
    fn open_local_task_navigates_to_editor() {
        let f = fixture();
        let mut session =
            TaskListSession::new(f.store.clone(), f.view.clone(), f.scheduler.clone());
        let task = f.store.insert(Task::new("walk"));
        assert_eq!(
            session.on_event(TaskListEvent::OpenTask(task.clone())),
            Some(UiEvent::Navigate(Route::EditTask(task.id)))
        );
        assert_eq!(
            session.on_event(TaskListEvent::AddTask),
            Some(UiEvent::Navigate(Route::EditTask(None)))
        );
    }

    #[test]
    fn blank_title_never_reaches_the_store() {
        let f = fixture();
        f.store.insert(Task::new("existing"));
        let before = f.store.snapshot();

        let mut editor = TaskEditor::new(f.store.clone(), f.scheduler.clone(), None);
        editor.on_event(EditorEvent::TitleChanged("   ".into())).unwrap();
        let res = editor.on_event(EditorEvent::Save);

        assert_eq!(
            res,
            Err(TaskError::Validation("The title can't be empty".into()))
        );
        assert_eq!(f.store.snapshot(), before);
    }

    #[test]
    fn saving_new_task_schedules_under_its_assigned_id() {
        let f = fixture();
        let mut editor = TaskEditor::new(f.store.clone(), f.scheduler.clone(), None);
        editor.on_event(EditorEvent::TitleChanged("pay rent".into())).unwrap();
        editor.on_event(EditorEvent::DateChanged("Jan 05, 2999".into())).unwrap();
        editor.on_event(EditorEvent::TimeChanged("08:30 AM".into())).unwrap();
        editor
            .on_event(EditorEvent::RecurrenceChanged(Recurrence::Monthly))
            .unwrap();
        let events = editor.on_event(EditorEvent::Save).unwrap();

        assert_eq!(
            events,
            vec![
                UiEvent::message("Reminder set for 08:30 AM on Jan 05, 2999"),
                UiEvent::PopBackStack
            ]
        );
        let stored = f.store.snapshot();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].recurrence.as_deref(), Some("Monthly"));
        assert_eq!(stored[0].description, None);
        let id = stored[0].id.unwrap();
        assert!(f.alarms.pending.lock().unwrap().contains_key(&id));
    }

    #[test]
    fn editing_keeps_id_and_completion() {
        let f = fixture();
        let original = f.store.insert(Task {
            completed: true,
            recurrence: Some("Hourly".into()),
            ..Task::new("draft")
        });

        let mut editor =
            TaskEditor::new(f.store.clone(), f.scheduler.clone(), original.id);
        assert_eq!(editor.title, "draft");
        assert_eq!(editor.recurrence, Recurrence::Hourly);
        editor.on_event(EditorEvent::TitleChanged("final".into())).unwrap();
        let events = editor.on_event(EditorEvent::Save).unwrap();

        assert_eq!(events, vec![UiEvent::PopBackStack]);
        let stored = f.store.get_by_id(original.id.unwrap()).unwrap();
        assert_eq!(stored.title, "final");
        assert!(stored.completed);
        assert_eq!(f.store.snapshot().len(), 1);
    }

    #[test]
    fn past_reminder_still_saves_task() {
        let f = fixture();
        let mut editor = TaskEditor::new(f.store.clone(), f.scheduler.clone(), None);
        editor.on_event(EditorEvent::TitleChanged("late".into())).unwrap();
        editor.on_event(EditorEvent::DateChanged("Jan 01, 2020".into())).unwrap();
        editor.on_event(EditorEvent::TimeChanged("09:00 AM".into())).unwrap();
        let events = editor.on_event(EditorEvent::Save).unwrap();

        assert_eq!(events[0], UiEvent::message("Please select a future time for the reminder"));
        assert_eq!(f.store.snapshot().len(), 1);
        assert!(f.alarms.pending.lock().unwrap().is_empty());
    }

    #[test]
    fn deleting_drops_the_reminder_and_undo_brings_it_back() {
        let f = fixture();
        let mut session =
            TaskListSession::new(f.store.clone(), f.view.clone(), f.scheduler.clone());
        let task = f
            .store
            .insert(Task::new("dentist").with_schedule("Jan 05, 2999", "08:30 AM"));
        let id = task.id.unwrap();
        f.scheduler.schedule(&task).unwrap();

        session.on_event(TaskListEvent::DeleteTask(task));
        assert!(f.alarms.pending.lock().unwrap().is_empty());

        session.on_event(TaskListEvent::UndoDelete);
        assert!(f.alarms.pending.lock().unwrap().contains_key(&id));
    }

    #[test]
    fn completing_drops_the_reminder_and_reopening_rearms_it() {
        let f = fixture();
        let mut session =
            TaskListSession::new(f.store.clone(), f.view.clone(), f.scheduler.clone());
        let task = f
            .store
            .insert(Task::new("dentist").with_schedule("Jan 05, 2999", "08:30 AM"));
        let id = task.id.unwrap();
        f.scheduler.schedule(&task).unwrap();

        session.on_event(TaskListEvent::ToggleDone(task.clone(), true));
        assert!(f.alarms.pending.lock().unwrap().is_empty());

        session.on_event(TaskListEvent::ToggleDone(task, false));
        assert!(f.alarms.pending.lock().unwrap().contains_key(&id));
    }

    #[test]
    fn clearing_the_schedule_drops_the_pending_reminder() {
        let f = fixture();
        let task = f
            .store
            .insert(Task::new("dentist").with_schedule("Jan 05, 2999", "08:30 AM"));
        f.scheduler.schedule(&task).unwrap();

        let mut editor = TaskEditor::new(f.store.clone(), f.scheduler.clone(), task.id);
        editor.on_event(EditorEvent::TimeChanged("  ".into())).unwrap();
        let events = editor.on_event(EditorEvent::Save).unwrap();

        assert_eq!(events, vec![UiEvent::PopBackStack]);
        assert!(f.alarms.pending.lock().unwrap().is_empty());
        assert_eq!(f.store.get_by_id(task.id.unwrap()).unwrap().time, None);
    }

    #[test]
    fn date_and_time_keep_spaces_while_typing() {
        let f = fixture();
        let mut editor = TaskEditor::new(f.store.clone(), f.scheduler.clone(), None);
        editor.on_event(EditorEvent::TitleChanged("pay rent".into())).unwrap();
        editor.on_event(EditorEvent::DateChanged(" ".into())).unwrap();
        assert_eq!(editor.date, " ");
        editor.on_event(EditorEvent::DateChanged(" Jan 05, 2999".into())).unwrap();
        editor.on_event(EditorEvent::TimeChanged("08:30 AM ".into())).unwrap();
        editor.on_event(EditorEvent::Save).unwrap();

        let stored = &f.store.snapshot()[0];
        assert_eq!(stored.date.as_deref(), Some("Jan 05, 2999"));
        assert_eq!(stored.time.as_deref(), Some("08:30 AM"));
    }

    #[test]
    fn undo_is_offered_only_after_a_delete() {
        let f = fixture();
        let task = f.store.insert(Task::new("walk"));
        let mut app = App::new(f.store.clone(), f.view.clone(), f.scheduler.clone());
        assert!(!app.can_undo());

        app.list_event(TaskListEvent::DeleteTask(task));
        assert!(app.can_undo());
        app.list_event(TaskListEvent::UndoDelete);
        assert!(!app.can_undo());
        assert_eq!(app.tasks.len(), 1);
    }

    #[test]
    fn app_tracks_merged_list_and_editor_flow() {
        let f = fixture();
        f.store.insert(Task::new("local"));
        let mut app = App::new(f.store.clone(), f.view.clone(), f.scheduler.clone());
        assert_eq!(app.tasks.len(), 1);

        f.view.refresh_blocking();
        app.drain_inbound();
        assert_eq!(app.tasks.len(), 2);
        assert_eq!(app.refresh, RefreshState::Idle);

        app.list_event(TaskListEvent::AddTask);
        assert_eq!(app.input_mode, InputMode::Editing);
        app.editor_event(EditorEvent::Save);
        assert_eq!(
            app.message,
            Some(("The title can't be empty".to_string(), None))
        );
        app.editor_event(EditorEvent::TitleChanged("another".into()));
        app.editor_event(EditorEvent::Save);
        assert_eq!(app.input_mode, InputMode::Normal);
        assert!(app.editor.is_none());
        assert_eq!(app.tasks.len(), 3);
        assert_eq!(app.tasks.iter().filter(|t| t.is_remote).count(), 1);
    }
}
